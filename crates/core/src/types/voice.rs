//! Per-store IVR configuration.

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceSettingsError {
    #[error("retryAttempts must be at most {max}")]
    TooManyRetries { max: u32 },
    #[error("retryDelay must be between {min} and {max} seconds")]
    RetryDelayOutOfRange { min: u32, max: u32 },
    #[error("voiceId must be 1-64 characters of letters, digits, '.', '-' or '_'")]
    InvalidVoiceId,
}

/// Speech locale of the menu prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VoiceLanguage {
    #[default]
    #[serde(rename = "ur")]
    Urdu,
    #[serde(rename = "en")]
    English,
}

impl VoiceLanguage {
    /// BCP-47 locale passed to the provider's speech synthesis.
    #[must_use]
    pub const fn locale(self) -> &'static str {
        match self {
            Self::Urdu => "ur-PK",
            Self::English => "en-US",
        }
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Urdu => "ur",
            Self::English => "en",
        }
    }
}

impl fmt::Display for VoiceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Voice settings stored with each store.
///
/// Serialized in camelCase (`language`, `voiceId`, `retryAttempts`,
/// `retryDelay`); missing fields fall back to the defaults so partially
/// written records stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceSettings {
    pub language: VoiceLanguage,
    /// Synthesis voice; `"default"` leaves the choice to the provider.
    pub voice_id: String,
    /// Maximum number of automatic redials after a failed call.
    pub retry_attempts: u32,
    /// Seconds between a failed call and the next automatic redial.
    pub retry_delay: u32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            language: VoiceLanguage::Urdu,
            voice_id: Self::DEFAULT_VOICE.to_owned(),
            retry_attempts: 3,
            retry_delay: 300,
        }
    }
}

impl VoiceSettings {
    pub const DEFAULT_VOICE: &'static str = "default";
    pub const MAX_RETRY_ATTEMPTS: u32 = 10;
    pub const MIN_RETRY_DELAY: u32 = 30;
    pub const MAX_RETRY_DELAY: u32 = 86_400;

    /// # Errors
    ///
    /// Returns the first constraint the settings violate.
    pub fn validate(&self) -> Result<(), VoiceSettingsError> {
        if self.retry_attempts > Self::MAX_RETRY_ATTEMPTS {
            return Err(VoiceSettingsError::TooManyRetries {
                max: Self::MAX_RETRY_ATTEMPTS,
            });
        }
        if !(Self::MIN_RETRY_DELAY..=Self::MAX_RETRY_DELAY).contains(&self.retry_delay) {
            return Err(VoiceSettingsError::RetryDelayOutOfRange {
                min: Self::MIN_RETRY_DELAY,
                max: Self::MAX_RETRY_DELAY,
            });
        }
        let voice_ok = !self.voice_id.is_empty()
            && self.voice_id.len() <= 64
            && self
                .voice_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !voice_ok {
            return Err(VoiceSettingsError::InvalidVoiceId);
        }
        Ok(())
    }

    /// The explicit voice to request, or `None` for the provider default.
    #[must_use]
    pub fn voice(&self) -> Option<&str> {
        (self.voice_id != Self::DEFAULT_VOICE).then_some(self.voice_id.as_str())
    }

    /// Apply a partial update and validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged settings are invalid; `self` is left
    /// untouched in that case.
    pub fn merged(&self, patch: VoiceSettingsPatch) -> Result<Self, VoiceSettingsError> {
        let merged = Self {
            language: patch.language.unwrap_or(self.language),
            voice_id: patch.voice_id.unwrap_or_else(|| self.voice_id.clone()),
            retry_attempts: patch.retry_attempts.unwrap_or(self.retry_attempts),
            retry_delay: patch.retry_delay.unwrap_or(self.retry_delay),
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// Field-level update of [`VoiceSettings`]; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoiceSettingsPatch {
    pub language: Option<VoiceLanguage>,
    pub voice_id: Option<String>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<u32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wire_format() {
        let json = serde_json::to_value(VoiceSettings::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "language": "ur",
                "voiceId": "default",
                "retryAttempts": 3,
                "retryDelay": 300
            })
        );
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: VoiceSettings = serde_json::from_str(r#"{"language":"en"}"#).unwrap();
        assert_eq!(settings.language, VoiceLanguage::English);
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.voice(), None);
    }

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let patch: VoiceSettingsPatch =
            serde_json::from_str(r#"{"retryAttempts":5,"voiceId":"Polly.Aditi"}"#).unwrap();
        let merged = VoiceSettings::default().merged(patch).unwrap();
        assert_eq!(merged.retry_attempts, 5);
        assert_eq!(merged.retry_delay, 300);
        assert_eq!(merged.language, VoiceLanguage::Urdu);
        assert_eq!(merged.voice(), Some("Polly.Aditi"));
    }

    #[test]
    fn test_merge_rejects_invalid() {
        let patch = VoiceSettingsPatch {
            retry_delay: Some(5),
            ..VoiceSettingsPatch::default()
        };
        assert!(matches!(
            VoiceSettings::default().merged(patch),
            Err(VoiceSettingsError::RetryDelayOutOfRange { .. })
        ));

        let patch = VoiceSettingsPatch {
            retry_attempts: Some(50),
            ..VoiceSettingsPatch::default()
        };
        assert!(VoiceSettings::default().merged(patch).is_err());

        let patch = VoiceSettingsPatch {
            voice_id: Some("<Say>".to_owned()),
            ..VoiceSettingsPatch::default()
        };
        assert_eq!(
            VoiceSettings::default().merged(patch),
            Err(VoiceSettingsError::InvalidVoiceId)
        );
    }

    #[test]
    fn test_patch_rejects_unknown_language_and_keys() {
        assert!(serde_json::from_str::<VoiceSettingsPatch>(r#"{"language":"fr"}"#).is_err());
        assert!(serde_json::from_str::<VoiceSettingsPatch>(r#"{"speed":2}"#).is_err());
    }

    #[test]
    fn test_locale() {
        assert_eq!(VoiceLanguage::Urdu.locale(), "ur-PK");
        assert_eq!(VoiceLanguage::English.locale(), "en-US");
    }
}
