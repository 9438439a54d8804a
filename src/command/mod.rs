// Copyright (c) 2025 - Cowboy AI, Inc.
//! Command Engine
//!
//! Every command runs the same three phases against the event log:
//!
//! ```text
//! load:   SearchQuery ──> EventLog.filter ──> WriteModel (fold)
//! decide: WriteModel + input ──> PendingFacts + UniqueConstraints (pure)
//! commit: EventLog.append ──> Facts ──> WriteModel (fold, no re-read)
//! ```
//!
//! A stale expected sequence makes the append fail with a conflict. The
//! engine then re-runs all three phases, up to `max_append_retries` times.
//! Business failures are never retried.
//!
//! Commands are grouped per aggregate in the submodules; all of them are
//! methods on [`Commands`].

pub mod auth_request;
pub mod instance;
pub mod oidc_session;
pub mod org;
pub mod project;
pub mod quota;
pub mod saml_session;
pub mod session;
pub mod user;

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::aggregate::{InstanceWriteModel, TokenLifetimes};
use crate::config::EngineConfig;
use crate::crypto::{PasswordVerifier, TokenCipher};
use crate::errors::{CommandError, CommandResult, EventLogError};
use crate::event_store::{EventLog, PendingFact, SearchQuery, UniqueConstraint};
use crate::events::Fact;
use crate::id::{Clock, IdGenerator, SystemClock, UuidV7Generator};
use crate::notification::QuotaNotifier;
use crate::projection::{apply_facts, ObjectDetails, WriteModel};

pub use auth_request::{AddAuthRequest, AddSamlRequest};
pub use oidc_session::OidcSession;
pub use org::AddIdpConfig;
pub use quota::QuotaUsage;
pub use saml_session::SamlSession;
pub use session::{SessionChanged, SessionCheck, SessionChanges};
pub use user::AddHumanUser;

/// Prefix of ids of aggregates created by the login flows
pub const V2_ID_PREFIX: &str = "V2_";

/// Who is calling, for which tenant, until when
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub instance_id: String,
    /// Actor recorded as creator of every appended fact
    pub user_id: String,
    /// Organization the caller acts in
    pub org_id: String,
    /// Login UI client that owns auth requests it created
    pub login_client: Option<String>,
    pub deadline: Option<Instant>,
}

impl CommandContext {
    pub fn new(instance_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            user_id: user_id.into(),
            org_id: String::new(),
            login_client: None,
            deadline: None,
        }
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = org_id.into();
        self
    }

    pub fn with_login_client(mut self, login_client: impl Into<String>) -> Self {
        self.login_client = Some(login_client.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

/// An aggregate created by a command together with its details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub id: String,
    pub details: ObjectDetails,
}

/// The command engine
///
/// Holds the event log and every injected capability. Cheap to clone.
#[derive(Clone)]
pub struct Commands {
    event_log: Arc<dyn EventLog>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    token_cipher: Arc<dyn TokenCipher>,
    password_verifier: Arc<dyn PasswordVerifier>,
    notifier: Arc<dyn QuotaNotifier>,
    config: EngineConfig,
}

impl std::fmt::Debug for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commands")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Commands`]
///
/// # Example
///
/// ```rust,ignore
/// let commands = Commands::builder(event_log, cipher, verifier)
///     .clock(Arc::new(FixedClock::new(now)))
///     .ids(Arc::new(SequentialIdGenerator::new("id")))
///     .build()?;
/// ```
pub struct CommandsBuilder {
    event_log: Arc<dyn EventLog>,
    token_cipher: Arc<dyn TokenCipher>,
    password_verifier: Arc<dyn PasswordVerifier>,
    ids: Option<Arc<dyn IdGenerator>>,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Arc<dyn QuotaNotifier>>,
    config: EngineConfig,
}

impl CommandsBuilder {
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn QuotaNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Finish the engine, filling unset capabilities with production defaults
    ///
    /// # Errors
    ///
    /// - `Internal` if the HTTP notifier cannot be constructed
    pub fn build(self) -> CommandResult<Commands> {
        let notifier = match self.notifier {
            Some(notifier) => notifier,
            None => default_notifier(&self.config)?,
        };
        Ok(Commands {
            event_log: self.event_log,
            ids: self.ids.unwrap_or_else(|| Arc::new(UuidV7Generator)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            token_cipher: self.token_cipher,
            password_verifier: self.password_verifier,
            notifier,
            config: self.config,
        })
    }
}

#[cfg(feature = "http-notifier")]
fn default_notifier(config: &EngineConfig) -> CommandResult<Arc<dyn QuotaNotifier>> {
    let notifier = crate::notification::HttpNotifier::new(config.notification_timeout())
        .map_err(|e| CommandError::Internal(e.to_string()))?;
    Ok(Arc::new(notifier))
}

#[cfg(not(feature = "http-notifier"))]
fn default_notifier(_config: &EngineConfig) -> CommandResult<Arc<dyn QuotaNotifier>> {
    Ok(Arc::new(crate::notification::LoggingNotifier))
}

impl Commands {
    pub fn builder(
        event_log: Arc<dyn EventLog>,
        token_cipher: Arc<dyn TokenCipher>,
        password_verifier: Arc<dyn PasswordVerifier>,
    ) -> CommandsBuilder {
        CommandsBuilder {
            event_log,
            token_cipher,
            password_verifier,
            ids: None,
            clock: None,
            notifier: None,
            config: EngineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn next_id(&self) -> String {
        self.ids.next_id()
    }

    /// Run an event log call, bounded by the caller's deadline
    async fn bounded<T>(
        ctx: &CommandContext,
        call: impl Future<Output = Result<T, EventLogError>>,
    ) -> CommandResult<T> {
        match ctx.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CommandError::DeadlineExceeded),
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| CommandError::DeadlineExceeded)?
                .map_err(Into::into),
            None => call.await.map_err(Into::into),
        }
    }

    pub(crate) async fn filter(
        &self,
        ctx: &CommandContext,
        query: &SearchQuery,
    ) -> CommandResult<Vec<Fact>> {
        Self::bounded(ctx, self.event_log.filter(query)).await
    }

    /// Fold the current history of `model` into it
    pub(crate) async fn load<W: WriteModel + Send>(
        &self,
        ctx: &CommandContext,
        model: &mut W,
    ) -> CommandResult<()> {
        let facts = self.filter(ctx, &model.query()).await?;
        apply_facts(model, &facts);
        Ok(())
    }

    pub(crate) async fn push(
        &self,
        ctx: &CommandContext,
        facts: Vec<PendingFact>,
        constraints: Vec<UniqueConstraint>,
    ) -> CommandResult<Vec<Fact>> {
        if facts.is_empty() {
            return Ok(Vec::new());
        }
        let pushed = Self::bounded(
            ctx,
            self.event_log
                .append(&ctx.instance_id, &ctx.user_id, facts, constraints),
        )
        .await?;
        debug!(
            instance_id = %ctx.instance_id,
            count = pushed.len(),
            "facts appended"
        );
        Ok(pushed)
    }

    /// Append, then fold the appended facts into `model`
    pub(crate) async fn push_and_reduce<W: WriteModel + Send>(
        &self,
        ctx: &CommandContext,
        model: &mut W,
        facts: Vec<PendingFact>,
        constraints: Vec<UniqueConstraint>,
    ) -> CommandResult<Vec<Fact>> {
        let pushed = self.push(ctx, facts, constraints).await?;
        apply_facts(model, &pushed);
        Ok(pushed)
    }

    /// Re-run `attempt` while it fails with a sequence conflict
    ///
    /// Each attempt must load its write models afresh.
    pub(crate) async fn retry_on_conflict<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> CommandResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CommandResult<T>>,
    {
        let max_attempts = self.config.max_append_retries.saturating_add(1);
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(err) if err.is_retryable() && tries < max_attempts => {
                    debug!(operation, attempt = tries, error = %err, "append conflict, retrying");
                }
                Err(err) if err.is_retryable() => {
                    warn!(operation, attempts = tries, error = %err, "append conflict retries exhausted");
                    return Err(err);
                }
                result => return result,
            }
        }
    }

    /// Effective token lifetimes of the caller's instance
    pub(crate) async fn token_lifetimes(&self, ctx: &CommandContext) -> CommandResult<TokenLifetimes> {
        let mut instance = InstanceWriteModel::new(&ctx.instance_id);
        self.load(ctx, &mut instance).await?;
        Ok(instance.token_lifetimes(&self.config))
    }

    pub(crate) fn token_cipher(&self) -> &dyn TokenCipher {
        self.token_cipher.as_ref()
    }

    pub(crate) fn password_verifier(&self) -> &dyn PasswordVerifier {
        self.password_verifier.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn QuotaNotifier {
        self.notifier.as_ref()
    }
}
