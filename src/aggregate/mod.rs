// Copyright (c) 2025 - Cowboy AI, Inc.
//! Write Models per Aggregate
//!
//! Each write model is the in-process reduction of one aggregate's facts (or,
//! for search models, of a payload-filtered slice of facts). Commands load
//! them through the event log, decide against them, and fold the appended
//! facts back in.
//!
//! # Fold Pattern
//!
//! ```rust,ignore
//! let mut model = SessionWriteModel::new(instance_id, session_id);
//! let facts = event_log.filter(&model.query()).await?;
//! apply_facts(&mut model, &facts);
//! model.check_is_active(now)?;
//! ```
//!
//! # Pure Reduction
//!
//! All `reduce` implementations follow these principles:
//! 1. **No Side Effects**: No I/O, no clock reads
//! 2. **Derived Time**: Expirations come from the fact's `created_at`
//! 3. **Additive**: Facts of other aggregates are ignored
//! 4. **Exhaustive**: Every payload variant is matched explicitly

pub mod auth_request;
pub mod instance;
pub mod oidc_session;
pub mod org;
pub mod project;
pub mod quota;
pub mod session;
pub mod user;

pub use auth_request::{AuthRequestWriteModel, LinkedSession, SamlRequestWriteModel};
pub use instance::{InstanceWriteModel, TokenLifetimes};
pub use oidc_session::{OidcSessionWriteModel, SamlSessionWriteModel};
pub use org::OrgWriteModel;
pub use project::{ProjectGrantsSearchModel, ProjectWriteModel, UserGrantWriteModel};
pub use quota::{QuotaConfig, QuotaWriteModel};
pub use session::SessionWriteModel;
pub use user::{IdpLinksSearchModel, UserWriteModel, UsernamesSearchModel};
