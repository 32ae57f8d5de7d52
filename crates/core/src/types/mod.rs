//! Core types for Voice Confirm.

pub mod call;
pub mod email;
pub mod id;
pub mod menu;
pub mod phone;
pub mod shop;
pub mod status;
pub mod voice;

pub use call::CallHistoryEntry;
pub use email::{Email, EmailError};
pub use id::*;
pub use menu::MenuChoice;
pub use phone::{PhoneNumber, PhoneNumberError};
pub use shop::{ShopDomain, ShopDomainError};
pub use status::*;
pub use voice::{VoiceLanguage, VoiceSettings, VoiceSettingsError, VoiceSettingsPatch};
