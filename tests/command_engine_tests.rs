// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for the command engine
//!
//! Covers uniqueness claims under concurrency, bounded retry on sequence
//! conflicts, no-op commands and the best-effort cascades.

mod fixtures;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use cim_iam_commands::command::{AddIdpConfig, SessionCheck};
use cim_iam_commands::errors::ErrorKind;
use cim_iam_commands::events::{
    FeatureChanges, IamEvent, IdpConfigChanges, IdpLink, OidcSettingsChanges, ResponseType, UserEvent, UserGrantEvent,
};
use cim_iam_commands::{
    Aggregate, AggregateType, CommandError, EventLog, EventLogError, Fact, InMemoryEventLog, PendingFact, SearchQuery,
    UniqueConstraint,
};
use fixtures::*;

/// Rejects the first `conflicts` appends with a sequence conflict
struct ConflictingLog {
    inner: Arc<InMemoryEventLog>,
    conflicts: u32,
    appends: AtomicU32,
}

impl ConflictingLog {
    fn new(inner: Arc<InMemoryEventLog>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts,
            appends: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl EventLog for ConflictingLog {
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Fact>, EventLogError> {
        self.inner.filter(query).await
    }

    async fn append(
        &self,
        instance_id: &str,
        creator: &str,
        facts: Vec<PendingFact>,
        constraints: Vec<UniqueConstraint>,
    ) -> Result<Vec<Fact>, EventLogError> {
        let attempt = self.appends.fetch_add(1, Ordering::SeqCst);
        if attempt < self.conflicts {
            let first = &facts[0].aggregate;
            return Err(EventLogError::SequenceConflict {
                aggregate_type: first.aggregate_type,
                aggregate_id: first.id.clone(),
                expected: facts[0].expected_sequence.unwrap_or_default(),
                actual: facts[0].expected_sequence.unwrap_or_default() + 1,
            });
        }
        self.inner.append(instance_id, creator, facts, constraints).await
    }
}

async fn facts_of(harness: &Harness, event_type: &str) -> Vec<Fact> {
    harness
        .log
        .facts()
        .await
        .into_iter()
        .filter(|fact| fact.event_type() == event_type)
        .collect()
}

#[tokio::test]
async fn test_concurrent_org_names_claim_once() {
    let harness = Harness::new();
    harness.commands.add_instance(&harness.ctx(), "Test").await.unwrap();
    let ctx = harness.ctx();

    let (first, second) = tokio::join!(
        harness.commands.add_org(&ctx, "Umbrella"),
        harness.commands.add_org(&ctx, "umbrella"),
    );

    let failures: Vec<CommandError> = [first, second].into_iter().filter_map(Result::err).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind(), ErrorKind::AlreadyExists);
    assert_eq!(facts_of(&harness, "org.added").await.len(), 1);
    assert!(harness.log.is_claimed(INSTANCE_ID, "org_name", "umbrella").await);
}

#[tokio::test]
async fn test_rename_releases_old_claim() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();

    harness
        .commands
        .change_org_name(&ctx, &tenant.org_id, "ACME Corp")
        .await
        .unwrap();

    assert!(!harness.log.is_claimed(INSTANCE_ID, "org_name", "acme").await);
    harness.commands.add_org(&ctx, "ACME").await.unwrap();
}

#[tokio::test]
async fn test_unchanged_name_is_not_changed() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;

    let err = harness
        .commands
        .change_org_name(&harness.ctx(), &tenant.org_id, "ACME")
        .await
        .unwrap_err();

    assert_eq!(err.message_key(), Some("Errors.NoChangesFound"));
    assert_eq!(facts_of(&harness, "org.changed").await.len(), 0);
}

/// Lands `concurrent` in the log right before the first append it forwards
struct InterleavingLog {
    inner: Arc<InMemoryEventLog>,
    concurrent: Mutex<Option<PendingFact>>,
}

impl InterleavingLog {
    fn new(inner: Arc<InMemoryEventLog>, concurrent: PendingFact) -> Self {
        Self {
            inner,
            concurrent: Mutex::new(Some(concurrent)),
        }
    }
}

#[async_trait]
impl EventLog for InterleavingLog {
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Fact>, EventLogError> {
        self.inner.filter(query).await
    }

    async fn append(
        &self,
        instance_id: &str,
        creator: &str,
        facts: Vec<PendingFact>,
        constraints: Vec<UniqueConstraint>,
    ) -> Result<Vec<Fact>, EventLogError> {
        let concurrent = self.concurrent.lock().unwrap().take();
        if let Some(concurrent) = concurrent {
            self.inner
                .append(instance_id, "someone-else", vec![concurrent], vec![])
                .await?;
        }
        self.inner.append(instance_id, creator, facts, constraints).await
    }
}

#[tokio::test]
async fn test_conflict_is_retried_with_fresh_state() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let racing = Arc::new(ConflictingLog::new(harness.log.clone(), 2));
    let commands = harness.commands_over(racing.clone());

    commands
        .change_org_name(&harness.ctx(), &tenant.org_id, "ACME Corp")
        .await
        .unwrap();

    assert_eq!(racing.appends.load(Ordering::SeqCst), 3);
    assert_eq!(facts_of(&harness, "org.changed").await.len(), 1);
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let racing = Arc::new(ConflictingLog::new(harness.log.clone(), u32::MAX));
    let commands = harness.commands_over(racing.clone());

    let err = commands
        .change_org_name(&harness.ctx(), &tenant.org_id, "ACME Corp")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    // one attempt plus the configured retries
    assert_eq!(racing.appends.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_session_creation_is_retried_on_conflict() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let racing = Arc::new(ConflictingLog::new(harness.log.clone(), 1));
    let commands = harness.commands_over(racing.clone());

    let session = commands
        .create_session(&harness.login_ctx(), None, &user_and_password(&tenant.user_id))
        .await
        .unwrap();

    assert!(session.session_token.is_some());
    assert_eq!(racing.appends.load(Ordering::SeqCst), 2);
    assert_eq!(facts_of(&harness, "session.added").await.len(), 1);
}

#[tokio::test]
async fn test_wrong_password_survives_concurrent_user_change() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    // another session's password check lands while this one is deciding
    let concurrent = PendingFact::new(
        Aggregate::new(AggregateType::User, &tenant.user_id, INSTANCE_ID, &tenant.org_id),
        IamEvent::User(UserEvent::PasswordCheckSucceeded),
    );
    let racing = Arc::new(InterleavingLog::new(harness.log.clone(), concurrent));
    let commands = harness.commands_over(racing);
    let mut changes = user_and_password(&tenant.user_id);
    changes.checks[1] = SessionCheck::Password {
        password: "wrong".into(),
    };

    let err = commands
        .create_session(&harness.login_ctx(), None, &changes)
        .await
        .unwrap_err();

    assert_eq!(err.message_key(), Some("Errors.User.Password.Invalid"));
    assert_eq!(facts_of(&harness, "user.human.password.check.failed").await.len(), 1);
    assert!(facts_of(&harness, "session.added").await.is_empty());
}

#[tokio::test]
async fn test_role_removal_cascades_into_grants() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    let project = harness
        .commands
        .add_project(&ctx, &tenant.org_id, "Portal")
        .await
        .unwrap();
    for key in ["admin", "viewer"] {
        harness
            .commands
            .add_project_role(&ctx, &project.id, key, key)
            .await
            .unwrap();
    }
    let roles = vec!["admin".to_string(), "viewer".to_string()];
    harness
        .commands
        .add_user_grant(&ctx, &tenant.org_id, &tenant.user_id, &project.id, &roles)
        .await
        .unwrap();

    harness
        .commands
        .remove_project_role(&ctx, &project.id, "admin")
        .await
        .unwrap();

    let cascaded = facts_of(&harness, "user.grant.cascade.changed").await;
    assert_eq!(cascaded.len(), 1);
    match &cascaded[0].payload {
        IamEvent::UserGrant(UserGrantEvent::CascadeChanged { role_keys }) => {
            assert_eq!(role_keys, &vec!["viewer".to_string()]);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let err = harness
        .commands
        .remove_project_role(&ctx, &project.id, "admin")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_grant_with_unknown_role_is_rejected() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    let project = harness
        .commands
        .add_project(&ctx, &tenant.org_id, "Portal")
        .await
        .unwrap();

    let result = harness
        .commands
        .add_user_grant(
            &ctx,
            &tenant.org_id,
            &tenant.user_id,
            &project.id,
            &["ghost".to_string()],
        )
        .await;

    assert!(result.is_err());
    assert_eq!(facts_of(&harness, "user.grant.added").await.len(), 0);
}

#[tokio::test]
async fn test_idp_removal_unlinks_users() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    let idp = harness
        .commands
        .add_org_idp_config(
            &ctx,
            &tenant.org_id,
            &AddIdpConfig {
                name: "Corporate SSO".into(),
                issuer: "https://sso.acme.test".into(),
                client_id: "iam".into(),
                scopes: vec!["openid".into()],
            },
        )
        .await
        .unwrap();
    let link = IdpLink {
        idp_id: idp.id.clone(),
        external_user_id: "ext-alice".into(),
    };
    harness
        .commands
        .add_user_idp_link(&ctx, &tenant.user_id, &link, "alice")
        .await
        .unwrap();

    harness
        .commands
        .remove_org_idp_config(&ctx, &tenant.org_id, &idp.id)
        .await
        .unwrap();

    assert_eq!(
        facts_of(&harness, "user.human.externalidp.cascade.removed").await.len(),
        1
    );
    assert!(
        !harness
            .log
            .is_claimed(INSTANCE_ID, "external_idps", &link.unique_key())
            .await
    );
}

#[tokio::test]
async fn test_verified_domain_claims_foreign_usernames() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    let owner = harness.commands.add_org(&ctx, "Acme Holding").await.unwrap();
    harness
        .commands
        .add_org_domain(&ctx, &owner.id, "acme.test")
        .await
        .unwrap();

    harness
        .commands
        .verify_org_domain(&ctx, &owner.id, "acme.test")
        .await
        .unwrap();

    let claimed = facts_of(&harness, "user.domain.claimed").await;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].aggregate_id(), tenant.user_id);
    match &claimed[0].payload {
        IamEvent::User(UserEvent::DomainClaimed { username, old_username }) => {
            assert_eq!(old_username.as_str(), "alice@acme.test");
            assert!(username.as_str().ends_with("@temporary.invalid"));
        }
        other => panic!("unexpected payload {other:?}"),
    }
    // the old login name is free again
    harness
        .commands
        .add_human_user(&ctx, &owner.id, &human_user("alice@acme.test"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_verified_domain_is_claimed_once() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    let other = harness.commands.add_org(&ctx, "Other").await.unwrap();
    for org_id in [&tenant.org_id, &other.id] {
        harness
            .commands
            .add_org_domain(&ctx, org_id, "shared.test")
            .await
            .unwrap();
    }
    harness
        .commands
        .verify_org_domain(&ctx, &tenant.org_id, "shared.test")
        .await
        .unwrap();

    let err = harness
        .commands
        .verify_org_domain(&ctx, &other.id, "shared.test")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;

    let err = harness
        .commands
        .add_human_user(&harness.ctx(), &tenant.org_id, &human_user("ALICE@acme.test"))
        .await
        .unwrap_err();

    assert_eq!(err.message_key(), Some("Errors.User.AlreadyExists"));
}

#[tokio::test]
async fn test_commands_are_isolated_per_instance() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let foreign = cim_iam_commands::CommandContext::new("instance2", ADMIN_ID);

    let err = harness
        .commands
        .change_org_name(&foreign, &tenant.org_id, "Hijacked")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_org_member_lifecycle() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    let owner = vec!["ORG_OWNER".to_string()];

    harness
        .commands
        .add_org_member(&ctx, &tenant.org_id, &tenant.user_id, &owner)
        .await
        .unwrap();
    let err = harness
        .commands
        .add_org_member(&ctx, &tenant.org_id, &tenant.user_id, &owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let err = harness
        .commands
        .change_org_member(&ctx, &tenant.org_id, &tenant.user_id, &owner)
        .await
        .unwrap_err();
    assert!(err.is_not_changed());

    harness
        .commands
        .remove_org_member(&ctx, &tenant.org_id, &tenant.user_id)
        .await
        .unwrap();
    harness
        .commands
        .remove_org_member(&ctx, &tenant.org_id, &tenant.user_id)
        .await
        .unwrap();
    assert_eq!(facts_of(&harness, "org.member.removed").await.len(), 1);
}

#[tokio::test]
async fn test_identical_features_emit_nothing() {
    let harness = Harness::new();
    seed_tenant(&harness).await;
    let features = FeatureChanges {
        login_default_org: Some(true),
        ..FeatureChanges::default()
    };

    harness
        .commands
        .set_instance_features(&harness.ctx(), &features)
        .await
        .unwrap();
    harness
        .commands
        .set_instance_features(&harness.ctx(), &features)
        .await
        .unwrap();

    assert_eq!(facts_of(&harness, "instance.features.set").await.len(), 1);
}

#[tokio::test]
async fn test_tenant_lifetimes_override_defaults() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    harness
        .commands
        .set_oidc_settings(
            &ctx,
            &OidcSettingsChanges {
                access_token_lifetime_secs: Some(300),
                ..OidcSettingsChanges::default()
            },
        )
        .await
        .unwrap();
    let request_id =
        linked_auth_request(&harness, &tenant.user_id, &["openid"], ResponseType::Code).await;

    let oidc = harness
        .commands
        .create_oidc_session_from_auth_request(&ctx, &request_id, false)
        .await
        .unwrap();

    assert_eq!(
        oidc.access_token_expiration,
        Some(fixed_timestamp() + chrono::Duration::minutes(5))
    );
}

#[tokio::test]
async fn test_zero_lifetime_override_is_rejected() {
    let harness = Harness::new();
    seed_tenant(&harness).await;

    let err = harness
        .commands
        .set_oidc_settings(
            &harness.ctx(),
            &OidcSettingsChanges {
                refresh_token_expiration_secs: Some(0),
                ..OidcSettingsChanges::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_username_change_swaps_claims() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();

    let err = harness
        .commands
        .change_username(&ctx, &tenant.user_id, "alice@acme.test")
        .await
        .unwrap_err();
    assert!(err.is_not_changed());

    harness
        .commands
        .change_username(&ctx, &tenant.user_id, "alice.doe@acme.test")
        .await
        .unwrap();
    assert!(!harness.log.is_claimed(INSTANCE_ID, "usernames", "alice@acme.test").await);
    assert!(harness.log.is_claimed(INSTANCE_ID, "usernames", "alice.doe@acme.test").await);
}

#[tokio::test]
async fn test_deactivated_user_cannot_sign_in() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    harness.commands.deactivate_user(&ctx, &tenant.user_id).await.unwrap();

    let err = harness
        .commands
        .create_session(&harness.login_ctx(), None, &user_and_password(&tenant.user_id))
        .await
        .unwrap_err();
    assert_eq!(err.message_key(), Some("Errors.User.NotActive"));

    let err = harness
        .commands
        .deactivate_user(&ctx, &tenant.user_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    harness.commands.reactivate_user(&ctx, &tenant.user_id).await.unwrap();
    authenticated_session(&harness, &tenant.user_id).await;
}

#[tokio::test]
async fn test_removed_user_releases_claims() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();

    harness.commands.remove_user(&ctx, &tenant.user_id).await.unwrap();

    assert!(!harness.log.is_claimed(INSTANCE_ID, "usernames", "alice@acme.test").await);
    let err = harness
        .commands
        .remove_user(&ctx, &tenant.user_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    harness
        .commands
        .add_human_user(&ctx, &tenant.org_id, &human_user("alice@acme.test"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_primary_domain_rules() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    harness
        .commands
        .add_org_domain(&ctx, &tenant.org_id, "acme.test")
        .await
        .unwrap();

    let err = harness
        .commands
        .set_primary_org_domain(&ctx, &tenant.org_id, "acme.test")
        .await
        .unwrap_err();
    assert_eq!(err.message_key(), Some("Errors.Org.Domain.NotVerified"));

    harness
        .commands
        .verify_org_domain(&ctx, &tenant.org_id, "acme.test")
        .await
        .unwrap();
    harness
        .commands
        .set_primary_org_domain(&ctx, &tenant.org_id, "acme.test")
        .await
        .unwrap();
    let err = harness
        .commands
        .remove_org_domain(&ctx, &tenant.org_id, "acme.test")
        .await
        .unwrap_err();
    assert_eq!(err.message_key(), Some("Errors.Org.Domain.PrimaryNotRemovable"));
    // users of the verifying org keep their login names
    assert!(facts_of(&harness, "user.domain.claimed").await.is_empty());
}

#[tokio::test]
async fn test_removing_verified_domain_releases_claim() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    for domain in ["acme.test", "acme.example"] {
        harness
            .commands
            .add_org_domain(&ctx, &tenant.org_id, domain)
            .await
            .unwrap();
        harness
            .commands
            .verify_org_domain(&ctx, &tenant.org_id, domain)
            .await
            .unwrap();
    }
    harness
        .commands
        .set_primary_org_domain(&ctx, &tenant.org_id, "acme.test")
        .await
        .unwrap();

    harness
        .commands
        .remove_org_domain(&ctx, &tenant.org_id, "acme.example")
        .await
        .unwrap();

    assert!(!harness.log.is_claimed(INSTANCE_ID, "org_domain", "acme.example").await);
    assert!(harness.log.is_claimed(INSTANCE_ID, "org_domain", "acme.test").await);
}

#[tokio::test]
async fn test_user_grant_lifecycle() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    let project = harness
        .commands
        .add_project(&ctx, &tenant.org_id, "Portal")
        .await
        .unwrap();
    for key in ["admin", "viewer"] {
        harness
            .commands
            .add_project_role(&ctx, &project.id, key, key)
            .await
            .unwrap();
    }
    let viewer = vec!["viewer".to_string()];
    let grant = harness
        .commands
        .add_user_grant(&ctx, &tenant.org_id, &tenant.user_id, &project.id, &viewer)
        .await
        .unwrap();

    let err = harness
        .commands
        .add_user_grant(&ctx, &tenant.org_id, &tenant.user_id, &project.id, &viewer)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let err = harness
        .commands
        .change_user_grant(&ctx, &grant.id, &viewer)
        .await
        .unwrap_err();
    assert!(err.is_not_changed());
    harness
        .commands
        .change_user_grant(&ctx, &grant.id, &["admin".to_string(), "viewer".to_string()])
        .await
        .unwrap();

    harness.commands.remove_user_grant(&ctx, &grant.id).await.unwrap();
    harness
        .commands
        .add_user_grant(&ctx, &tenant.org_id, &tenant.user_id, &project.id, &viewer)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_idp_config_rename_and_link_removal() {
    let harness = Harness::new();
    let tenant = seed_tenant(&harness).await;
    let ctx = harness.ctx();
    let idp = harness
        .commands
        .add_org_idp_config(
            &ctx,
            &tenant.org_id,
            &AddIdpConfig {
                name: "SSO".into(),
                issuer: "https://sso.acme.test".into(),
                client_id: "iam".into(),
                scopes: vec![],
            },
        )
        .await
        .unwrap();
    let link = IdpLink {
        idp_id: idp.id.clone(),
        external_user_id: "ext-alice".into(),
    };
    harness
        .commands
        .add_user_idp_link(&ctx, &tenant.user_id, &link, "alice")
        .await
        .unwrap();

    harness
        .commands
        .remove_user_idp_link(&ctx, &tenant.user_id, &link)
        .await
        .unwrap();
    let err = harness
        .commands
        .remove_user_idp_link(&ctx, &tenant.user_id, &link)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let rename = IdpConfigChanges {
        name: Some("Corporate SSO".into()),
        ..IdpConfigChanges::default()
    };
    for _ in 0..2 {
        harness
            .commands
            .change_org_idp_config(&ctx, &tenant.org_id, &idp.id, &rename)
            .await
            .unwrap();
    }
    assert_eq!(facts_of(&harness, "org.idp.config.changed").await.len(), 1);
    harness
        .commands
        .add_org_idp_config(
            &ctx,
            &tenant.org_id,
            &AddIdpConfig {
                name: "SSO".into(),
                issuer: "https://sso2.acme.test".into(),
                client_id: "iam".into(),
                scopes: vec![],
            },
        )
        .await
        .unwrap();

    let unknown = IdpLink {
        idp_id: "ghost".into(),
        external_user_id: "ext-alice".into(),
    };
    let err = harness
        .commands
        .add_user_idp_link(&ctx, &tenant.user_id, &unknown, "alice")
        .await
        .unwrap_err();
    assert_eq!(err.message_key(), Some("Errors.IDPConfig.NotExisting"));
}

#[tokio::test]
async fn test_removed_instance_releases_every_claim() {
    let harness = Harness::new();
    seed_tenant(&harness).await;
    let ctx = harness.ctx();

    harness.commands.remove_instance(&ctx).await.unwrap();

    assert!(!harness.log.is_claimed(INSTANCE_ID, "org_name", "acme").await);
    assert!(!harness.log.is_claimed(INSTANCE_ID, "usernames", "alice@acme.test").await);
    let err = harness.commands.remove_instance(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
