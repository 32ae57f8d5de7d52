//! E.164 phone numbers.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneNumberError {
    #[error("phone number cannot be empty")]
    Empty,
    #[error("phone number contains invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("phone number must have between 8 and 15 digits, got {0}")]
    InvalidLength(usize),
    #[error("phone number has no country code")]
    MissingCountryCode,
}

/// A phone number normalized to E.164 (`+` followed by 8 to 15 digits).
///
/// Formatting characters (spaces, dashes, dots, parentheses) are stripped.
/// International numbers may start with `+` or `00`. National numbers are
/// only accepted through [`PhoneNumber::parse_with_country_code`].
///
/// ```
/// use voice_confirm_core::PhoneNumber;
///
/// let phone = PhoneNumber::parse("+92 300 123-4567").unwrap();
/// assert_eq!(phone.as_str(), "+923001234567");
///
/// let national = PhoneNumber::parse_with_country_code("0300 1234567", Some("92")).unwrap();
/// assert_eq!(national, phone);
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    const MIN_DIGITS: usize = 8;
    const MAX_DIGITS: usize = 15;

    /// Parse an international number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, contains letters, lacks an
    /// international prefix, or has the wrong number of digits.
    pub fn parse(s: &str) -> Result<Self, PhoneNumberError> {
        Self::parse_with_country_code(s, None)
    }

    /// Parse a number, treating a national number as belonging to
    /// `country_code` (digits only, without `+`). One leading trunk `0` is
    /// dropped from national numbers.
    ///
    /// # Errors
    ///
    /// Same as [`PhoneNumber::parse`]; a national number without a country
    /// code yields [`PhoneNumberError::MissingCountryCode`].
    pub fn parse_with_country_code(
        s: &str,
        country_code: Option<&str>,
    ) -> Result<Self, PhoneNumberError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PhoneNumberError::Empty);
        }

        let (international, rest) = if let Some(rest) = s.strip_prefix('+') {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix("00") {
            (true, rest)
        } else {
            (false, s)
        };

        let mut digits = String::with_capacity(rest.len());
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                other => return Err(PhoneNumberError::InvalidCharacter(other)),
            }
        }

        if !international {
            let code = country_code
                .map(|code| code.trim_start_matches('+'))
                .filter(|code| !code.is_empty())
                .ok_or(PhoneNumberError::MissingCountryCode)?;
            let national = digits.strip_prefix('0').unwrap_or(&digits);
            digits = format!("{code}{national}");
        }

        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len()) {
            return Err(PhoneNumberError::InvalidLength(digits.len()));
        }

        Ok(Self(format!("+{digits}")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PhoneNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for PhoneNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for PhoneNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for PhoneNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_international_formats() {
        assert_eq!(
            PhoneNumber::parse("+1 (415) 555-0100").unwrap().as_str(),
            "+14155550100"
        );
        assert_eq!(
            PhoneNumber::parse("0044 20 7946 0958").unwrap().as_str(),
            "+442079460958"
        );
    }

    #[test]
    fn test_national_requires_country_code() {
        assert_eq!(
            PhoneNumber::parse("03001234567"),
            Err(PhoneNumberError::MissingCountryCode)
        );
        let phone = PhoneNumber::parse_with_country_code("03001234567", Some("+92")).unwrap();
        assert_eq!(phone.as_str(), "+923001234567");
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(PhoneNumber::parse("  "), Err(PhoneNumberError::Empty));
        assert_eq!(
            PhoneNumber::parse("+1-800-FLOWERS"),
            Err(PhoneNumberError::InvalidCharacter('F'))
        );
        assert_eq!(
            PhoneNumber::parse("+12345"),
            Err(PhoneNumberError::InvalidLength(5))
        );
        assert_eq!(
            PhoneNumber::parse("+1234567890123456"),
            Err(PhoneNumberError::InvalidLength(16))
        );
    }
}
