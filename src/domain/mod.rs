// Copyright (c) 2025 - Cowboy AI, Inc.
//! IAM Domain Value Objects
//!
//! Validated value objects and pure rules shared by events and commands.
//!
//! - [`Username`] - login names, unique case-insensitively per instance
//! - [`DomainName`] - organization domains (RFC 1123)
//! - [`QuotaUnit`] / [`QuotaNotification`] - usage quota configuration
//! - [`period_start`] - rolling quota period arithmetic
//! - [`invariants`] - pure input validation

pub mod domain_name;
pub mod invariants;
pub mod quota;
pub mod username;

pub use domain_name::DomainName;
pub use invariants::{ValidationError, ValidationResult};
pub use quota::{period_start, used_percent, QuotaNotification, QuotaUnit};
pub use username::Username;
