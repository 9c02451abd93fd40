//! Webhook signature verification.

use tracing::warn;

use crate::token;

/// Checks that a webhook body was signed by the media platform.
///
/// Fails closed: any missing header or verification error yields `false`.
/// Clock skew is only checked through the token's own `exp`/`nbf`; the
/// timestamp header must be present but is not otherwise interpreted.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    api_key: String,
    api_secret: String,
}

impl WebhookVerifier {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn verify(&self, body: &[u8], signature: Option<&str>, timestamp: Option<&str>) -> bool {
        let (Some(signature), Some(_)) = (signature, timestamp) else {
            warn!("Webhook missing signature or timestamp header");
            return false;
        };

        match token::verify_webhook(body, signature, &self.api_key, &self.api_secret) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Webhook verification failed");
                false
            }
        }
    }
}
