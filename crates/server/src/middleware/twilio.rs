//! Authentication of telephony provider callbacks.

use axum::{
    body::{Body, Bytes, to_bytes},
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use tracing::warn;

use crate::services::telephony::signature::{SIGNATURE_HEADER, verify};
use crate::state::AppState;

/// Largest callback body we buffer for verification.
const MAX_CALLBACK_BODY: usize = 64 * 1024;

/// Reject provider callbacks whose `X-Twilio-Signature` does not match.
///
/// The signed URL is rebuilt from the configured public base URL, since
/// behind a proxy the request's own host is not the one Twilio called.
/// Disabled when `TWILIO_VALIDATE_SIGNATURES=false`.
pub async fn verify_twilio_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let config = state.config();
    if !config.twilio.validate_signatures {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_CALLBACK_BODY).await else {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    };

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    // Nesting strips the `/api` prefix from `parts.uri`
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map_or(&parts.uri, |original| &original.0);
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());
    let url = format!("{}{path_and_query}", config.base_url);
    let params = form_pairs(&bytes);

    if !verify(
        &url,
        &params,
        signature,
        config.twilio.auth_token.expose_secret(),
    ) {
        warn!(url = %url, "Rejected telephony callback with bad signature");
        return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn form_pairs(body: &Bytes) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
