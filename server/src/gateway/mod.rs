//! Interfaces to the services this backend depends on but does not own:
//! the payment gateway, object storage for QR images and the push provider.
use thiserror::Error;

pub mod blob;
pub mod payment;
pub mod push;
pub mod signature;

pub use blob::{BlobStore, FsBlobStore, InMemoryBlobStore};
pub use payment::{GatewayOrder, PaymentGateway, RazorpayGateway};
pub use push::{HttpPushSender, NoopPushSender, PushMessage, PushSender};
pub use signature::WebhookVerifier;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} responded with {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| UpstreamError::Http { service, source }
    }
}
