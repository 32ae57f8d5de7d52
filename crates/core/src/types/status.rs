//! The two orthogonal order axes: business disposition and call disposition.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a status string is not one of the known values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} {value:?}; expected one of: {expected}")]
pub struct StatusParseError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// Business disposition of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "voice.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Called,
    Confirmed,
    Cancelled,
    Support,
}

impl OrderStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Called,
        Self::Confirmed,
        Self::Cancelled,
        Self::Support,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Called => "called",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Support => "support",
        }
    }

    /// The customer (or an agent) has decided the order; no more calls are
    /// needed.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled | Self::Support)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StatusParseError {
                kind: "order status",
                value: s.to_owned(),
                expected: "pending, called, confirmed, cancelled, support",
            })
    }
}

/// Telephony disposition of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "voice.call_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    NotCalled,
    Calling,
    Completed,
    Failed,
}

impl CallStatus {
    pub const ALL: [Self; 4] = [
        Self::NotCalled,
        Self::Calling,
        Self::Completed,
        Self::Failed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotCalled => "not_called",
            Self::Calling => "calling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Map a Twilio call status onto the call disposition.
    ///
    /// In-progress provider states map to `Calling`; anything the provider
    /// reports as ended without a conversation maps to `Failed`. Unknown
    /// strings are treated as failures so an order never sticks in
    /// `Calling` on a value we cannot interpret.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "queued" | "initiated" | "ringing" | "in-progress" | "in_progress" => Self::Calling,
            "completed" => Self::Completed,
            _ => Self::Failed,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StatusParseError {
                kind: "call status",
                value: s.to_owned(),
                expected: "not_called, calling, completed, failed",
            })
    }
}
