// Copyright (c) 2025 - Cowboy AI, Inc.
//! Login names

use serde::{Deserialize, Serialize};
use std::fmt;

use super::invariants::ValidationError;

/// A user's login name
///
/// Whitespace is trimmed. Uniqueness is case-insensitive, see [`Username::unique_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub const MAX_LENGTH: usize = 200;

    pub fn new(username: impl AsRef<str>) -> Result<Self, ValidationError> {
        let username = username.as_ref().trim();
        if username.is_empty() || username.len() > Self::MAX_LENGTH {
            return Err(ValidationError::InvalidUsername);
        }
        if username.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidUsername);
        }
        Ok(Self(username.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the `username` uniqueness claim
    pub fn unique_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
