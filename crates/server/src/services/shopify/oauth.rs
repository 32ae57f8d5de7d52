//! Shopify OAuth install flow helpers.
//!
//! The install starts at [`authorization_url`] with a fresh anti-forgery
//! `state`; the callback must echo it and carry a valid `hmac` over the
//! remaining query parameters ([`verify_callback_hmac`]).

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use voice_confirm_core::ShopDomain;

use crate::config::ShopifyAppConfig;

type HmacSha256 = Hmac<Sha256>;

/// A fresh anti-forgery token for one install attempt.
#[must_use]
pub fn new_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Build the URL the merchant is sent to in order to approve the app.
///
/// No `grant_options[]` is requested, so Shopify issues an offline token
/// that keeps working for webhook-driven calls after the merchant logs out.
#[must_use]
pub fn authorization_url(
    config: &ShopifyAppConfig,
    shop: &ShopDomain,
    redirect_uri: &str,
    state: &str,
) -> String {
    let scope = config.scopes.join(",");
    format!(
        "https://{shop}/admin/oauth/authorize?client_id={}&scope={}&redirect_uri={}&state={}",
        urlencoding::encode(&config.api_key),
        urlencoding::encode(&scope),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(state)
    )
}

/// Verify the `hmac` query parameter of an OAuth callback.
///
/// The message is every other parameter except `signature`, sorted by key
/// and joined as `k=v&k=v`; the digest is hex-encoded HMAC-SHA256 keyed by
/// the app secret.
#[must_use]
pub fn verify_callback_hmac(params: &HashMap<String, String>, secret: &SecretString) -> bool {
    let Some(provided) = params.get("hmac") else {
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };

    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "hmac" && k.as_str() != "signature")
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.sort_unstable();

    let message = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(message.as_bytes());
    mac.verify_slice(&provided).is_ok()
}
