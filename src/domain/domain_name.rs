// Copyright (c) 2025 - Cowboy AI, Inc.
//! Organization domain names

use serde::{Deserialize, Serialize};
use std::fmt;

use super::invariants::ValidationError;

/// DNS domain claimed by an organization
///
/// Stored lowercase; labels follow RFC 1123:
/// - total length ≤ 253
/// - each label 1..=63 characters of `[a-z0-9-]`
/// - labels do not start or end with a hyphen
/// - the top level label is not all numeric
///
/// ```rust
/// use cim_iam_commands::domain::DomainName;
///
/// let domain = DomainName::new("Caos.CH").unwrap();
/// assert_eq!(domain.as_str(), "caos.ch");
/// assert!(DomainName::new("-bad.ch").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    pub const MAX_LENGTH: usize = 253;
    pub const MAX_LABEL_LENGTH: usize = 63;

    pub fn new(domain: impl AsRef<str>) -> Result<Self, ValidationError> {
        let domain = domain.as_ref().trim().to_ascii_lowercase();

        if domain.is_empty() || domain.len() > Self::MAX_LENGTH {
            return Err(ValidationError::InvalidDomain(domain));
        }

        let labels: Vec<&str> = domain.split('.').collect();
        for label in &labels {
            if !Self::valid_label(label) {
                return Err(ValidationError::InvalidDomain(domain.clone()));
            }
        }

        if let Some(tld) = labels.last() {
            if labels.len() > 1 && tld.chars().all(|c| c.is_ascii_digit()) {
                return Err(ValidationError::InvalidDomain(domain.clone()));
            }
        }

        Ok(Self(domain))
    }

    fn valid_label(label: &str) -> bool {
        !label.is_empty()
            && label.len() <= Self::MAX_LABEL_LENGTH
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `login_name` is `<something>@<this domain>`
    pub fn suffixes(&self, login_name: &str) -> bool {
        login_name
            .rsplit_once('@')
            .map(|(_, domain)| domain.eq_ignore_ascii_case(&self.0))
            .unwrap_or(false)
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for DomainName {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
