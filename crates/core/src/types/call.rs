//! Call audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CallStatus;

/// One entry of an order's append-only `callHistory`.
///
/// `status` is the call disposition the attempt produced; `response`
/// carries either the caller's menu choice, the provider status string, or
/// the provider error for a failed placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl CallHistoryEntry {
    #[must_use]
    pub const fn new(timestamp: DateTime<Utc>, status: CallStatus) -> Self {
        Self {
            timestamp,
            status,
            duration: None,
            response: None,
        }
    }

    #[must_use]
    pub const fn with_duration(mut self, duration: Option<u32>) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let entry = CallHistoryEntry::new(
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            CallStatus::Calling,
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"timestamp": "2024-01-01T00:00:00Z", "status": "calling"})
        );
    }

    #[test]
    fn test_builder() {
        let entry = CallHistoryEntry::new(Utc::now(), CallStatus::Failed)
            .with_duration(Some(12))
            .with_response("no-answer");
        assert_eq!(entry.duration, Some(12));
        assert_eq!(entry.response.as_deref(), Some("no-answer"));
    }
}
