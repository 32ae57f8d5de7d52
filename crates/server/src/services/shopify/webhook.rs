//! Shopify webhook signature verification.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the base64 HMAC-SHA256 of the raw body.
pub const HMAC_HEADER: &str = "X-Shopify-Hmac-Sha256";
pub const TOPIC_HEADER: &str = "X-Shopify-Topic";
pub const SHOP_HEADER: &str = "X-Shopify-Shop-Domain";

/// Check `signature` (base64) against the HMAC-SHA256 of `raw_body`.
///
/// `raw_body` must be the bytes exactly as received; parsed and
/// re-serialized JSON will not match. Comparison is constant time.
#[must_use]
pub fn verify_signature(raw_body: &[u8], signature: &str, secret: &[u8]) -> bool {
    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&provided).is_ok()
}

/// Compute the signature Shopify would send for `raw_body`.
///
/// # Errors
///
/// Never in practice; HMAC accepts keys of any length.
pub fn sign(raw_body: &[u8], secret: &[u8]) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)?;
    mac.update(raw_body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"id":820982911946154508,"order_number":1001}"#;

    #[test]
    fn test_accepts_original_body() {
        let signature = sign(BODY, b"hush").unwrap();
        assert!(verify_signature(BODY, &signature, b"hush"));
    }

    #[test]
    fn test_rejects_altered_byte() {
        let signature = sign(BODY, b"hush").unwrap();
        let mut altered = BODY.to_vec();
        altered[7] = b'9';
        assert!(!verify_signature(&altered, &signature, b"hush"));
    }

    #[test]
    fn test_rejects_wrong_secret_and_garbage() {
        let signature = sign(BODY, b"other").unwrap();
        assert!(!verify_signature(BODY, &signature, b"hush"));
        assert!(!verify_signature(BODY, "not base64!", b"hush"));
        assert!(!verify_signature(BODY, "", b"hush"));
    }
}
