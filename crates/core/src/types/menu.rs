//! IVR keypad menu.

use crate::OrderStatus;

/// What the caller selected from the order menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuChoice {
    /// Digit `1`.
    Confirm,
    /// Digit `0`.
    Cancel,
    /// Digit `2`, transfers to the support line.
    Support,
    /// Anything else, including no input at all.
    Invalid,
}

impl MenuChoice {
    /// Interpret the `Digits` value gathered by the provider.
    ///
    /// Surrounding whitespace is ignored; any multi-digit or empty value is
    /// `Invalid`.
    #[must_use]
    pub fn from_digits(digits: Option<&str>) -> Self {
        match digits.map(str::trim) {
            Some("1") => Self::Confirm,
            Some("0") => Self::Cancel,
            Some("2") => Self::Support,
            _ => Self::Invalid,
        }
    }

    /// The order status this choice moves the order to, if any.
    #[must_use]
    pub const fn resulting_status(self) -> Option<OrderStatus> {
        match self {
            Self::Confirm => Some(OrderStatus::Confirmed),
            Self::Cancel => Some(OrderStatus::Cancelled),
            Self::Support => Some(OrderStatus::Support),
            Self::Invalid => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::Support => "support",
            Self::Invalid => "invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_mapping() {
        assert_eq!(MenuChoice::from_digits(Some("1")), MenuChoice::Confirm);
        assert_eq!(MenuChoice::from_digits(Some("0")), MenuChoice::Cancel);
        assert_eq!(MenuChoice::from_digits(Some("2")), MenuChoice::Support);
        assert_eq!(MenuChoice::from_digits(Some(" 1 ")), MenuChoice::Confirm);
    }

    #[test]
    fn test_everything_else_is_invalid() {
        for digits in [Some("3"), Some("9"), Some("*"), Some("#"), Some("12"), Some(""), None] {
            assert_eq!(MenuChoice::from_digits(digits), MenuChoice::Invalid, "{digits:?}");
        }
    }

    #[test]
    fn test_resulting_status() {
        assert_eq!(
            MenuChoice::Confirm.resulting_status(),
            Some(OrderStatus::Confirmed)
        );
        assert_eq!(
            MenuChoice::Cancel.resulting_status(),
            Some(OrderStatus::Cancelled)
        );
        assert_eq!(
            MenuChoice::Support.resulting_status(),
            Some(OrderStatus::Support)
        );
        assert_eq!(MenuChoice::Invalid.resulting_status(), None);
    }
}
