//! Telephony adapter.
//!
//! [`Telephony`] is the seam the call workflow talks through; [`TwilioClient`]
//! is the production implementation. [`twiml`] renders the voice menu the
//! provider fetches from our public voice endpoints, and [`signature`]
//! authenticates those provider requests.

pub mod signature;
mod twilio;
pub mod twiml;

pub use twilio::TwilioClient;
pub use twiml::Ivr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use voice_confirm_core::{CallStatus, PhoneNumber};

/// Order number used for test calls that are not tied to any order.
pub const TEST_ORDER_NUMBER: &str = "TEST-ORDER";

/// Errors that can occur when talking to the telephony provider.
#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the request.
    #[error("Twilio API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider has no record of the call.
    #[error("call not found")]
    NotFound,

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Voice markup could not be rendered.
    #[error("render error: {0}")]
    Render(String),
}

/// Outcome of a call placement.
///
/// Placement never fails with an error: a rejected call comes back with
/// `status = "failed"` and the provider's message in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallPlacement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    /// Provider status string, e.g. `queued`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CallPlacement {
    #[must_use]
    pub fn placed(call_sid: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            call_sid: Some(call_sid.into()),
            status: status.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            call_sid: None,
            status: "failed".to_string(),
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// Call status right after placement: `calling` or `failed`.
    #[must_use]
    pub fn call_status(&self) -> CallStatus {
        if self.error.is_some() || self.call_sid.is_none() {
            return CallStatus::Failed;
        }
        match CallStatus::from_provider(&self.status) {
            CallStatus::Failed => CallStatus::Failed,
            _ => CallStatus::Calling,
        }
    }
}

/// A call as the provider currently reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderCallStatus {
    pub call_sid: String,
    pub status: String,
    pub duration: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// Outbound calls.
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Dial `to` and point the provider at the menu for `order_number`.
    async fn place_call(&self, to: &PhoneNumber, order_number: &str) -> CallPlacement;

    /// # Errors
    ///
    /// `NotFound` if the provider has no record of `call_sid`.
    async fn fetch_call_status(&self, call_sid: &str)
    -> Result<ProviderCallStatus, TelephonyError>;
}
