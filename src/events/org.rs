// Copyright (c) 2025 - Cowboy AI, Inc.
//! Organization events: lifecycle, domains, IDP configs and members

use serde::{Deserialize, Serialize};

use crate::domain::DomainName;

/// Changed fields of an IDP config; `None` means unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpConfigChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl IdpConfigChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrgEvent {
    Added {
        name: String,
    },
    Changed {
        name: String,
    },
    DomainAdded {
        domain: DomainName,
    },
    DomainVerified {
        domain: DomainName,
    },
    DomainPrimarySet {
        domain: DomainName,
    },
    DomainRemoved {
        domain: DomainName,
        was_verified: bool,
    },
    IdpConfigAdded {
        idp_id: String,
        name: String,
        issuer: String,
        client_id: String,
        scopes: Vec<String>,
    },
    IdpConfigChanged {
        idp_id: String,
        #[serde(flatten)]
        changes: IdpConfigChanges,
    },
    IdpConfigRemoved {
        idp_id: String,
        name: String,
    },
    MemberAdded {
        user_id: String,
        roles: Vec<String>,
    },
    MemberChanged {
        user_id: String,
        roles: Vec<String>,
    },
    MemberRemoved {
        user_id: String,
    },
}

impl OrgEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrgEvent::Added { .. } => "org.added",
            OrgEvent::Changed { .. } => "org.changed",
            OrgEvent::DomainAdded { .. } => "org.domain.added",
            OrgEvent::DomainVerified { .. } => "org.domain.verified",
            OrgEvent::DomainPrimarySet { .. } => "org.domain.primary.set",
            OrgEvent::DomainRemoved { .. } => "org.domain.removed",
            OrgEvent::IdpConfigAdded { .. } => "org.idp.config.added",
            OrgEvent::IdpConfigChanged { .. } => "org.idp.config.changed",
            OrgEvent::IdpConfigRemoved { .. } => "org.idp.config.removed",
            OrgEvent::MemberAdded { .. } => "org.member.added",
            OrgEvent::MemberChanged { .. } => "org.member.changed",
            OrgEvent::MemberRemoved { .. } => "org.member.removed",
        }
    }
}
