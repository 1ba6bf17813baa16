pub mod booking;
pub mod cancellation;
pub mod charge;
pub mod event;
pub mod job;
pub mod notification;
pub mod user;

pub use booking::{Booking, BookingConfirmation, BookingStatus, ConfirmationSource, Tickets};
pub use cancellation::{ActiveTicketsUpdate, Cancellation, RefundStatus};
pub use charge::{ChargeRule, ChargeType};
pub use event::{Event, EventMeta};
pub use job::{Job, JobKind, JobStatus};
pub use notification::{
    BroadcastType, DeliveryStatus, InboxEntry, MasterNotification, NewMasterNotification,
    NewNotification, Notification, NotificationKind, NotificationSource, Page, Priority,
    UserNotification,
};
pub use user::{User, UserContact};
