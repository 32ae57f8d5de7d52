//! Twilio request signatures (`X-Twilio-Signature`).
//!
//! The signature is base64 HMAC-SHA1, keyed by the account auth token, over
//! the full request URL followed by every POST parameter as `key` + `value`
//! with keys in sorted order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

type HmacSha1 = Hmac<Sha1>;

fn mac_for(url: &str, params: &[(String, String)], auth_token: &str) -> Option<HmacSha1> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Some(mac)
}

/// Compute the signature Twilio would send.
#[must_use]
pub fn compute(url: &str, params: &[(String, String)], auth_token: &str) -> Option<String> {
    mac_for(url, params, auth_token).map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a provided signature.
#[must_use]
pub fn verify(url: &str, params: &[(String, String)], signature: &str, auth_token: &str) -> bool {
    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    mac_for(url, params, auth_token).is_some_and(|mac| mac.verify_slice(&provided).is_ok())
}
