// Copyright (c) 2025 - Cowboy AI, Inc.
//! Project and user grant events

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectEvent {
    Added { name: String },
    RoleAdded { key: String, display_name: String },
    RoleRemoved { key: String },
}

impl ProjectEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::Added { .. } => "project.added",
            ProjectEvent::RoleAdded { .. } => "project.role.added",
            ProjectEvent::RoleRemoved { .. } => "project.role.removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserGrantEvent {
    Added {
        user_id: String,
        project_id: String,
        role_keys: Vec<String>,
    },
    Changed {
        role_keys: Vec<String>,
    },
    /// Roles changed because a project role was removed
    CascadeChanged {
        role_keys: Vec<String>,
    },
    Removed {
        user_id: String,
        project_id: String,
    },
}

impl UserGrantEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            UserGrantEvent::Added { .. } => "user.grant.added",
            UserGrantEvent::Changed { .. } => "user.grant.changed",
            UserGrantEvent::CascadeChanged { .. } => "user.grant.cascade.changed",
            UserGrantEvent::Removed { .. } => "user.grant.removed",
        }
    }
}
