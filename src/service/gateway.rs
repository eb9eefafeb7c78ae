// service/gateway.rs
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::service::error::FlowError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub receipt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

impl GatewayOrder {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}

impl GatewayPayment {
    pub fn is_captured(&self) -> bool {
        self.status == "captured"
    }
}

/// REST adapter for the payment gateway. Orders are created in paise; the
/// checkout signature is HMAC-SHA256 over `"{order_id}|{payment_id}"`, the
/// webhook signature over the raw request body, both hex-encoded and
/// compared in constant time.
pub struct PaymentGatewayService {
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl PaymentGatewayService {
    pub fn new(config: &Config) -> Self {
        Self {
            key_id: config.gateway_key_id.clone(),
            key_secret: config.gateway_key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
            base_url: config.gateway_base_url.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        receipt: &str,
        notes: Option<serde_json::Value>,
    ) -> Result<GatewayOrder, FlowError> {
        let payload = serde_json::json!({
            "amount": amount_paise,
            "currency": currency,
            "receipt": receipt,
            "notes": notes.unwrap_or(serde_json::json!({})),
        });

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&payload)
            .send()
            .await
            .map_err(|e| FlowError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gateway order creation failed ({}): {}", status, body);
            return Err(FlowError::GatewayUnavailable(format!(
                "order creation returned {}",
                status
            )));
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| FlowError::GatewayUnavailable(e.to_string()))
    }

    pub async fn fetch_order(&self, external_order_id: &str) -> Result<GatewayOrder, FlowError> {
        let response = self
            .client
            .get(format!("{}/orders/{}", self.base_url, external_order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| FlowError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FlowError::GatewayUnavailable(format!(
                "order fetch returned {}",
                response.status()
            )));
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| FlowError::GatewayUnavailable(e.to_string()))
    }

    /// Payments made against an order, newest first per the gateway.
    pub async fn fetch_order_payments(
        &self,
        external_order_id: &str,
    ) -> Result<Vec<GatewayPayment>, FlowError> {
        #[derive(Deserialize)]
        struct PaymentList {
            items: Vec<GatewayPayment>,
        }

        let response = self
            .client
            .get(format!("{}/orders/{}/payments", self.base_url, external_order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| FlowError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FlowError::GatewayUnavailable(format!(
                "order payments fetch returned {}",
                response.status()
            )));
        }

        let list = response
            .json::<PaymentList>()
            .await
            .map_err(|e| FlowError::GatewayUnavailable(e.to_string()))?;
        Ok(list.items)
    }

    pub async fn fetch_payment(&self, external_payment_id: &str) -> Result<GatewayPayment, FlowError> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, external_payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| FlowError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FlowError::GatewayUnavailable(format!(
                "payment fetch returned {}",
                response.status()
            )));
        }

        response
            .json::<GatewayPayment>()
            .await
            .map_err(|e| FlowError::GatewayUnavailable(e.to_string()))
    }

    /// Checkout signature check: HMAC-SHA256 of `order_id|payment_id` keyed
    /// by the gateway secret.
    pub fn verify_signature(
        &self,
        external_order_id: &str,
        external_payment_id: &str,
        signature: &str,
    ) -> Result<(), FlowError> {
        let message = format!("{}|{}", external_order_id, external_payment_id);
        if hmac_hex_matches(self.key_secret.as_bytes(), message.as_bytes(), signature) {
            Ok(())
        } else {
            Err(FlowError::BadSignature)
        }
    }

    /// Webhook ingress check: HMAC-SHA256 over the raw body keyed by the
    /// webhook secret (a separate credential from the API key).
    pub fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> Result<(), FlowError> {
        if hmac_hex_matches(self.webhook_secret.as_bytes(), raw_body, signature) {
            Ok(())
        } else {
            Err(FlowError::BadSignature)
        }
    }
}

pub fn hmac_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

fn hmac_hex_matches(secret: &[u8], message: &[u8], candidate_hex: &str) -> bool {
    let expected = hmac_hex(secret, message);
    // Constant-time comparison over the hex strings; a length mismatch is
    // an immediate (public) failure.
    expected.as_bytes().ct_eq(candidate_hex.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_matching_signature() {
        let secret = b"gateway_secret";
        let message = b"order_abc|pay_xyz";
        let signature = hmac_hex(secret, message);
        assert!(hmac_hex_matches(secret, message, &signature));
    }

    #[test]
    fn verify_rejects_tampered_payment_id() {
        let secret = b"gateway_secret";
        let signature = hmac_hex(secret, b"order_abc|pay_xyz");
        assert!(!hmac_hex_matches(secret, b"order_abc|pay_other", &signature));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let signature = hmac_hex(b"secret_a", b"order_abc|pay_xyz");
        assert!(!hmac_hex_matches(b"secret_b", b"order_abc|pay_xyz", &signature));
    }

    #[test]
    fn verify_rejects_truncated_signature() {
        let secret = b"gateway_secret";
        let mut signature = hmac_hex(secret, b"order_abc|pay_xyz");
        signature.truncate(10);
        assert!(!hmac_hex_matches(secret, b"order_abc|pay_xyz", &signature));
    }

    #[test]
    fn webhook_signature_covers_raw_body() {
        let secret = b"webhook_secret";
        let body = br#"{"event":"payment.captured","payload":{}}"#;
        let signature = hmac_hex(secret, body);
        assert!(hmac_hex_matches(secret, body, &signature));
        assert!(!hmac_hex_matches(secret, br#"{"event":"other"}"#, &signature));
    }
}
