pub mod booking;
pub mod cancellation;
pub mod charges;
pub mod locks;
pub mod notifications;
pub mod payments;
pub mod tickets;

pub use booking::{BookingService, BookingSettings};
pub use cancellation::CancellationLedger;
pub use locks::KeyedLocks;
pub use notifications::{EventNotifier, NotificationPipeline, NotificationSettings};
pub use payments::PaymentWebhooks;
pub use tickets::TicketIssuer;
