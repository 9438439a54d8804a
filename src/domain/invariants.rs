// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions
//!
//! Input validation that runs before any event log I/O. Every function is
//! pure and returns a [`ValidationError`], which maps onto
//! [`CommandError::InvalidArgument`] with a stable id and message key.

use std::time::Duration;
use url::{ParseError, Url};

use crate::errors::CommandError;

/// Validation result with detailed error information
pub type ValidationResult = Result<(), ValidationError>;

/// Validation error with context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("username is empty, too long or contains whitespace")]
    InvalidUsername,

    #[error("required field {0} is empty")]
    MissingField(&'static str),

    #[error("unknown quota unit: {0}")]
    UnknownQuotaUnit(String),

    #[error("quota reset interval must be at least one minute")]
    ResetIntervalTooShort,

    #[error("quota amount must be positive")]
    AmountZero,

    #[error("notification callback url cannot be parsed: {0}")]
    CallUrlUnparseable(String),

    #[error("notification callback url needs scheme and host: {0}")]
    CallUrlIncomplete(String),

    #[error("notification percent must be positive")]
    NotificationPercentZero,

    #[error("lifetime must be positive")]
    NonPositiveLifetime,

    #[error("requested scope {0} was not granted")]
    ScopeWidened(String),
}

impl From<ValidationError> for CommandError {
    fn from(err: ValidationError) -> Self {
        let (id, key) = match err {
            ValidationError::InvalidDomain(_) => ("ORG-R24hb", "Errors.Org.InvalidDomain"),
            ValidationError::InvalidUsername => ("USER-2bs9v", "Errors.User.Username.Invalid"),
            ValidationError::MissingField(_) => ("COMMAND-Mx9qP", "Errors.Invalid.Argument"),
            ValidationError::UnknownQuotaUnit(_) => {
                ("QUOTA-OTeSh", "Errors.Quota.Invalid.Unimplemented")
            }
            ValidationError::ResetIntervalTooShort => {
                ("QUOTA-R5otd", "Errors.Quota.Invalid.ResetInterval")
            }
            ValidationError::AmountZero => ("QUOTA-hOKSJ", "Errors.Quota.Invalid.Amount"),
            ValidationError::CallUrlUnparseable(_) => {
                ("QUOTA-bZ0Fj", "Errors.Quota.Invalid.CallURL")
            }
            ValidationError::CallUrlIncomplete(_) => {
                ("QUOTA-HAYmN", "Errors.Quota.Invalid.CallURL")
            }
            ValidationError::NotificationPercentZero => {
                ("QUOTA-pBfjq", "Errors.Quota.Invalid.Percent")
            }
            ValidationError::NonPositiveLifetime => {
                ("SESSION-asEG4", "Errors.Session.PositiveLifetime")
            }
            ValidationError::ScopeWidened(_) => {
                ("OIDCS-Wq8rn", "Errors.OIDCSession.RefreshTokenInvalid")
            }
        };
        CommandError::invalid_argument(id, key)
    }
}

/// Reject blank required strings
pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// Callback urls must be absolute `http` or `https` urls with a host
pub fn validate_call_url(url: &str) -> ValidationResult {
    let url = url.trim();
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(ParseError::RelativeUrlWithoutBase | ParseError::EmptyHost) => {
            return Err(ValidationError::CallUrlIncomplete(url.to_string()));
        }
        Err(_) => return Err(ValidationError::CallUrlUnparseable(url.to_string())),
    };
    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(ValidationError::CallUrlUnparseable(url.to_string())),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::CallUrlIncomplete(url.to_string()));
    }
    Ok(())
}

/// Quota periods shorter than a minute are rejected
pub fn validate_reset_interval(interval: Duration) -> ValidationResult {
    if interval < Duration::from_secs(60) {
        return Err(ValidationError::ResetIntervalTooShort);
    }
    Ok(())
}

/// Session lifetimes come in as signed durations and must be positive
pub fn validate_lifetime(lifetime: chrono::Duration) -> Result<Duration, ValidationError> {
    if lifetime <= chrono::Duration::zero() {
        return Err(ValidationError::NonPositiveLifetime);
    }
    lifetime
        .to_std()
        .map_err(|_| ValidationError::NonPositiveLifetime)
}

/// Narrow a granted scope to the requested one
///
/// An empty request keeps the granted scope. Every requested scope must
/// already be granted; a refresh can only narrow, never widen.
pub fn narrow_scope(granted: &[String], requested: &[String]) -> Result<Vec<String>, ValidationError> {
    if requested.is_empty() {
        return Ok(granted.to_vec());
    }
    for scope in requested {
        if !granted.contains(scope) {
            return Err(ValidationError::ScopeWidened(scope.clone()));
        }
    }
    Ok(requested.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("https://example.com/callback" ; "https with path")]
    #[test_case("http://localhost:8080" ; "http with port")]
    #[test_case("https://[::1]:8443/hook" ; "ipv6 host")]
    #[test_case(" https://hooks.acme.test/quota " ; "surrounding whitespace")]
    fn test_valid_call_urls(url: &str) {
        assert!(validate_call_url(url).is_ok());
    }

    #[test_case("https://exa mple.com", "QUOTA-bZ0Fj" ; "whitespace")]
    #[test_case("example.com/callback", "QUOTA-HAYmN" ; "missing scheme")]
    #[test_case("https://", "QUOTA-HAYmN" ; "missing host")]
    #[test_case("ftp://example.com", "QUOTA-bZ0Fj" ; "unsupported scheme")]
    #[test_case("https://[::1", "QUOTA-bZ0Fj" ; "unclosed ipv6 host")]
    #[test_case("https://host:notaport/", "QUOTA-bZ0Fj" ; "non numeric port")]
    #[test_case("https://exa%zzmple.com", "QUOTA-bZ0Fj" ; "bad percent escape in host")]
    fn test_invalid_call_urls(url: &str, id: &str) {
        let err: CommandError = validate_call_url(url).unwrap_err().into();
        assert!(matches!(err, CommandError::InvalidArgument { id: got, .. } if got == id));
    }

    #[test]
    fn test_reset_interval_minimum() {
        assert!(validate_reset_interval(Duration::from_secs(59)).is_err());
        assert!(validate_reset_interval(Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_lifetime_must_be_positive() {
        assert!(validate_lifetime(chrono::Duration::seconds(-1)).is_err());
        assert!(validate_lifetime(chrono::Duration::zero()).is_err());
        assert_eq!(
            validate_lifetime(chrono::Duration::minutes(5)).unwrap(),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_narrow_scope() {
        let granted = vec!["openid".to_string(), "profile".to_string()];
        assert_eq!(narrow_scope(&granted, &[]).unwrap(), granted);
        assert_eq!(
            narrow_scope(&granted, &["openid".to_string()]).unwrap(),
            vec!["openid".to_string()]
        );
        assert_eq!(
            narrow_scope(&granted, &["email".to_string()]),
            Err(ValidationError::ScopeWidened("email".to_string()))
        );
    }
}
