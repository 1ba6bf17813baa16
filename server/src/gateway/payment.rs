use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::signature::{checkout_message, verify};
use super::UpstreamError;

const SERVICE: &str = "payment gateway";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOrder {
    pub order_id: String,
    /// Amount in minor currency units (paise for INR).
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, UpstreamError>;

    /// Checks the checkout signature the client received from the gateway.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

/// Razorpay Orders API client.
pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, UpstreamError> {
        if amount_minor <= 0 {
            return Err(UpstreamError::Rejected {
                service: SERVICE,
                message: "order amount must be positive".to_string(),
            });
        }

        debug!(amount_minor, currency, receipt, "Creating payment order");

        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderRequest {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let order: OrderResponse = response.json().await.map_err(UpstreamError::http(SERVICE))?;
        info!(order_id = %order.id, "Payment order created");

        Ok(GatewayOrder {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
        })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify(
            self.key_secret.as_bytes(),
            checkout_message(order_id, payment_id).as_bytes(),
            signature,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::signature::sign;

    #[test]
    fn verifies_checkout_signature_with_key_secret() {
        let gateway = RazorpayGateway::new(
            reqwest::Client::new(),
            "https://api.razorpay.com/",
            "rzp_test_key",
            "key-secret",
        );
        let signature = sign(b"key-secret", b"order_1|pay_1");

        assert!(gateway.verify_signature("order_1", "pay_1", &signature));
        assert!(!gateway.verify_signature("order_1", "pay_2", &signature));
        assert_eq!(gateway.base_url, "https://api.razorpay.com");
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts_without_calling_out() {
        let gateway = RazorpayGateway::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "k",
            "s",
        );

        let err = gateway.create_order(0, "INR", "rcpt").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Rejected { .. }));
    }
}
