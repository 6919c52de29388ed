//! HMAC-SHA256 payload signing.
//!
//! Every outbound delivery carries an [`SIGNATURE_HEADER`] header whose value
//! is the lowercase hex HMAC-SHA256 of the exact request body, keyed with the
//! webhook's secret. Receivers recompute the digest to authenticate the sender.
//!
//! # Examples
//!
//! ```rust
//! use hookline_core::signer;
//! use hookline_core::WebhookSecret;
//!
//! let secret = WebhookSecret::new("my-secret").unwrap();
//! let signature = signer::sign(&secret, br#"{"id":1}"#).unwrap();
//! assert!(signer::verify(&secret, br#"{"id":1}"#, &signature).is_ok());
//! ```

use crate::{webhook::WebhookSecret, ValidationError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex signature
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Header carrying the event type
pub const EVENT_TYPE_HEADER: &str = "X-Webhook-Event-Type";

/// Header carrying the event id
pub const EVENT_ID_HEADER: &str = "X-Webhook-Event-ID";

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(secret: &WebhookSecret) -> Result<HmacSha256, ValidationError> {
    HmacSha256::new_from_slice(secret.expose_bytes()).map_err(|_| ValidationError::InvalidFormat {
        field: "secret".to_string(),
        message: "secret cannot be used as HMAC key".to_string(),
    })
}

/// Compute the lowercase hex HMAC-SHA256 of `payload`
pub fn sign(secret: &WebhookSecret, payload: &[u8]) -> Result<String, ValidationError> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature produced by [`sign`]
///
/// Accepts an optional `sha256=` prefix. The digest comparison is constant time.
pub fn verify(secret: &WebhookSecret, payload: &[u8], signature: &str) -> Result<(), ValidationError> {
    let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);
    let sig_bytes = hex::decode(hex_part).map_err(|_| ValidationError::InvalidFormat {
        field: "signature".to_string(),
        message: "signature is not valid hex".to_string(),
    })?;

    let mut mac = keyed_mac(secret)?;
    mac.update(payload);

    mac.verify_slice(&sig_bytes).map_err(|_| ValidationError::InvalidFormat {
        field: "signature".to_string(),
        message: "HMAC-SHA256 digest does not match".to_string(),
    })
}

#[cfg(test)]
#[path = "signer_tests.rs"]
mod tests;
