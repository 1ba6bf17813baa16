use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{admin, bookings, health_check, notifications};
use crate::state::AppState;

fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/get_booking_summary", post(bookings::get_booking_summary))
        .route("/initiate_booking", post(bookings::initiate_booking))
        .route("/create_order", post(bookings::create_order))
        .route("/verify_payment", post(bookings::verify_payment))
        .route("/finalize_booking", post(bookings::finalize_booking))
        .route("/webhook", post(bookings::payment_webhook))
        .route("/confirm_booked_summary", post(bookings::confirm_booked_summary))
        .route("/my_bookings", post(bookings::my_bookings))
        .route("/cancel_booking", post(bookings::cancel_booking))
        .route("/cancellations", post(bookings::cancellations))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/send", post(notifications::send_notification))
        .route("/fetch", post(notifications::fetch_notifications))
        .route("/inbox", post(notifications::inbox))
        .route("/mark-read", post(notifications::mark_read))
        .route("/mark-all-read", post(notifications::mark_all_read))
        .route("/event-created", post(notifications::event_created))
        .route("/event-updated", post(notifications::event_updated))
        .route("/remind", post(notifications::remind))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/failed", get(admin::failed_jobs))
        .route("/jobs/:id/retry", post(admin::retry_job))
}

/// Full application router. `cors_origins` is the raw configured origin
/// list; `production` switches on HSTS.
pub fn create_routes(state: AppState, cors_origins: Option<&str>, production: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api/booking", booking_routes())
        .nest("/api/notification", notification_routes())
        .nest("/api/admin", admin_routes())
        .with_state(state);

    create_security_headers_layer(router, production)
        .layer(create_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}
