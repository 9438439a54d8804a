// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-sourced command engine for multi-tenant identity and access management
//!
//! Every state change is a command that loads the facts of the aggregates it
//! touches, folds them into write models, decides which facts to emit and
//! appends them with optimistic concurrency and uniqueness claims.
//!
//! The two largest state machines built on the engine are the login flow
//! (session, auth request, OIDC/SAML session, tokens) and usage quotas
//! (rolling periods and at-most-once threshold notifications).

pub mod aggregate;
pub mod command;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod errors;
pub mod event_store;
pub mod events;
pub mod id;
pub mod notification;
pub mod projection;
pub mod state_machine;

// Re-export commonly used types
pub use command::{CommandContext, Commands, CommandsBuilder, Created};
pub use config::{init_tracing, EngineConfig};
pub use crypto::{AesGcmTokenCipher, PasswordVerifier, TokenCipher};
pub use errors::{CommandError, CommandResult, EventLogError};
pub use event_store::{EventLog, InMemoryEventLog, PendingFact, SearchQuery, UniqueConstraint};
pub use events::{Aggregate, AggregateType, Fact, IamEvent};
pub use id::{Clock, FixedClock, IdGenerator, SequentialIdGenerator, SystemClock, UuidV7Generator};
pub use notification::{LoggingNotifier, NotifyError, QuotaNotifier};
pub use projection::{ObjectDetails, WriteModel};
