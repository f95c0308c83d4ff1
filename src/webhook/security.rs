//! Signature verification for inbound events and authorization for
//! feedback submission.
//!
//! Events are signed with HMAC-SHA256 over the raw body. Verification
//! accepts both the bare hex digest and the `sha256=<hex>` prefixed form;
//! the prefix is a webhook convention, not a semantic difference.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Config;

type HmacSha256 = Hmac<Sha256>;

/// Prefix on outbound signatures.
pub const SIGNATURE_PREFIX: &str = "sha256=";
/// Primary header carrying the HMAC signature of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
/// Alternate signature header some senders use.
pub const SECRET_HEADER: &str = "x-webhook-secret";

/// Verify an HMAC-SHA256 signature over the raw request body.
///
/// The comparison happens inside the MAC, in constant time. Never panics;
/// malformed input is simply not a valid signature.
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    if signature.is_empty() || secret.is_empty() {
        return false;
    }
    let hex_digest = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Sign a body the way senders are expected to; always emits the
/// `sha256=`-prefixed form.
pub fn generate_signature(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(body);
    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Security policy for the webhook surface: an optional shared secret for
/// event signatures and an optional API key for feedback submission.
#[derive(Clone, Default)]
pub struct WebhookSecurity {
    secret: Option<String>,
    api_key: Option<String>,
}

impl WebhookSecurity {
    pub fn new(secret: Option<String>, api_key: Option<String>) -> Self {
        Self { secret, api_key }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            secret: config.webhook_secret.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Whether inbound events must carry a valid signature.
    pub fn requires_signature(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify_signature(&self, body: &[u8], signature: &str) -> bool {
        match &self.secret {
            Some(secret) => verify_signature(body, signature, secret),
            None => false,
        }
    }

    /// Authorize a feedback caller. With no API key configured all callers
    /// are allowed, which is the development-mode bypass. Otherwise the
    /// header must match exactly or as `Bearer <key>`.
    pub fn verify_authorization(&self, authorization: Option<&str>) -> bool {
        let Some(api_key) = &self.api_key else {
            return true;
        };
        let Some(authorization) = authorization else {
            return false;
        };
        let token = authorization
            .strip_prefix("Bearer ")
            .unwrap_or(authorization);
        token == api_key
    }

    /// Sign an outbound body, or `None` when no secret is configured.
    pub fn generate_signature(&self, body: &[u8]) -> Option<String> {
        self.secret
            .as_ref()
            .map(|secret| generate_signature(body, secret))
    }
}
