// Copyright (c) 2025 - Cowboy AI, Inc.
//! IAM Domain Events
//!
//! Facts are immutable records of something that happened to one aggregate.
//! The event log assigns each fact a per-aggregate sequence and a creation
//! timestamp when it is appended.
//!
//! # Event Sourcing Principles
//!
//! 1. **Facts are immutable**: once appended, a fact never changes
//! 2. **Facts are past tense**: `UserChecked`, not `CheckUser`
//! 3. **Ordering is per aggregate**: total within `(instance, aggregate type, aggregate id)`
//! 4. **Nothing is erased**: entities end with a terminal fact (removed, terminated)
//!
//! # Event Flow
//!
//! ```text
//! Command → WriteModel (load) → decide → PendingFacts → EventLog.append
//!                                                          ↓
//!                                              Facts (sequence, created_at)
//!                                                          ↓
//!                                             WriteModel.reduce (post-state)
//! ```
//!
//! # Module Organization
//!
//! - [`instance`] - tenant lifecycle, features and OIDC settings
//! - [`org`] - organizations, domains, IDP configs, members
//! - [`user`] - human users, IDP links, token audit
//! - [`project`] - projects, roles and user grants
//! - [`session`] - login sessions and their checks
//! - [`auth_request`] - OIDC auth requests and SAML requests
//! - [`oidc_session`] - OIDC and SAML sessions with their tokens
//! - [`quota`] - quota configuration and notification records

pub mod auth_request;
pub mod instance;
pub mod oidc_session;
pub mod org;
pub mod project;
pub mod quota;
pub mod session;
pub mod user;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use auth_request::{AuthMethod, AuthRequestEvent, ResponseType, SamlRequestEvent};
pub use instance::{FeatureChanges, InstanceEvent, OidcSettingsChanges};
pub use oidc_session::{OidcSessionEvent, SamlSessionEvent, TokenReason};
pub use org::{IdpConfigChanges, OrgEvent};
pub use project::{ProjectEvent, UserGrantEvent};
pub use quota::{QuotaChanges, QuotaEvent};
pub use session::{SessionEvent, UserAgent};
pub use user::{IdpLink, UserEvent};

/// Kinds of aggregates facts can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    Instance,
    Org,
    User,
    Project,
    UserGrant,
    Session,
    AuthRequest,
    SamlRequest,
    OidcSession,
    SamlSession,
    Quota,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Instance => "instance",
            AggregateType::Org => "org",
            AggregateType::User => "user",
            AggregateType::Project => "project",
            AggregateType::UserGrant => "usergrant",
            AggregateType::Session => "session",
            AggregateType::AuthRequest => "auth_request",
            AggregateType::SamlRequest => "saml_request",
            AggregateType::OidcSession => "oidc_session",
            AggregateType::SamlSession => "saml_session",
            AggregateType::Quota => "quota",
        }
    }

    /// Schema version stamped onto new facts of this aggregate type
    pub fn schema_version(&self) -> u16 {
        match self {
            AggregateType::Session
            | AggregateType::AuthRequest
            | AggregateType::SamlRequest
            | AggregateType::OidcSession
            | AggregateType::SamlSession => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the aggregate a fact belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregate {
    pub id: String,
    pub aggregate_type: AggregateType,
    /// Tenant
    pub instance_id: String,
    /// Organization (or instance) owning the aggregate
    pub resource_owner: String,
    pub version: u16,
}

impl Aggregate {
    pub fn new(
        aggregate_type: AggregateType,
        id: impl Into<String>,
        instance_id: impl Into<String>,
        resource_owner: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            aggregate_type,
            instance_id: instance_id.into(),
            resource_owner: resource_owner.into(),
            version: aggregate_type.schema_version(),
        }
    }

    /// Key identifying the ordered fact stream of this aggregate
    pub fn stream_key(&self) -> StreamKey {
        StreamKey {
            instance_id: self.instance_id.clone(),
            aggregate_type: self.aggregate_type,
            aggregate_id: self.id.clone(),
        }
    }
}

/// `(instance, aggregate type, aggregate id)`; ordering is total within one key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub instance_id: String,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
}

/// An appended, immutable fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub aggregate: Aggregate,
    /// Position within the aggregate's stream, starting at 1
    pub sequence: u64,
    /// Sequence of the previous fact of the same aggregate, 0 for the first
    pub previous_sequence: u64,
    pub created_at: DateTime<Utc>,
    /// Actor that caused the fact
    pub creator: String,
    pub payload: IamEvent,
}

impl Fact {
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate.id
    }

    pub fn instance_id(&self) -> &str {
        &self.aggregate.instance_id
    }

    pub fn resource_owner(&self) -> &str {
        &self.aggregate.resource_owner
    }
}

/// Polymorphic payload of every fact
///
/// Each variant groups the facts of one aggregate type. Write models match on
/// the variants they care about and ignore the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregate_type", content = "event", rename_all = "snake_case")]
pub enum IamEvent {
    Instance(InstanceEvent),
    Org(OrgEvent),
    User(UserEvent),
    Project(ProjectEvent),
    UserGrant(UserGrantEvent),
    Session(SessionEvent),
    AuthRequest(AuthRequestEvent),
    SamlRequest(SamlRequestEvent),
    OidcSession(OidcSessionEvent),
    SamlSession(SamlSessionEvent),
    Quota(QuotaEvent),
}

impl IamEvent {
    /// Aggregate type the payload belongs to
    pub fn aggregate_type(&self) -> AggregateType {
        match self {
            IamEvent::Instance(_) => AggregateType::Instance,
            IamEvent::Org(_) => AggregateType::Org,
            IamEvent::User(_) => AggregateType::User,
            IamEvent::Project(_) => AggregateType::Project,
            IamEvent::UserGrant(_) => AggregateType::UserGrant,
            IamEvent::Session(_) => AggregateType::Session,
            IamEvent::AuthRequest(_) => AggregateType::AuthRequest,
            IamEvent::SamlRequest(_) => AggregateType::SamlRequest,
            IamEvent::OidcSession(_) => AggregateType::OidcSession,
            IamEvent::SamlSession(_) => AggregateType::SamlSession,
            IamEvent::Quota(_) => AggregateType::Quota,
        }
    }

    /// Dotted event type name, e.g. `quota.notification.due`
    pub fn event_type(&self) -> &'static str {
        match self {
            IamEvent::Instance(e) => e.event_type(),
            IamEvent::Org(e) => e.event_type(),
            IamEvent::User(e) => e.event_type(),
            IamEvent::Project(e) => e.event_type(),
            IamEvent::UserGrant(e) => e.event_type(),
            IamEvent::Session(e) => e.event_type(),
            IamEvent::AuthRequest(e) => e.event_type(),
            IamEvent::SamlRequest(e) => e.event_type(),
            IamEvent::OidcSession(e) => e.event_type(),
            IamEvent::SamlSession(e) => e.event_type(),
            IamEvent::Quota(e) => e.event_type(),
        }
    }

    /// The inner payload as JSON, used by payload field predicates
    pub fn payload_value(&self) -> serde_json::Value {
        let value = match self {
            IamEvent::Instance(e) => serde_json::to_value(e),
            IamEvent::Org(e) => serde_json::to_value(e),
            IamEvent::User(e) => serde_json::to_value(e),
            IamEvent::Project(e) => serde_json::to_value(e),
            IamEvent::UserGrant(e) => serde_json::to_value(e),
            IamEvent::Session(e) => serde_json::to_value(e),
            IamEvent::AuthRequest(e) => serde_json::to_value(e),
            IamEvent::SamlRequest(e) => serde_json::to_value(e),
            IamEvent::OidcSession(e) => serde_json::to_value(e),
            IamEvent::SamlSession(e) => serde_json::to_value(e),
            IamEvent::Quota(e) => serde_json::to_value(e),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

/// `at + lifetime`, saturating at the maximum representable time
pub fn expires_at(at: DateTime<Utc>, lifetime: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
