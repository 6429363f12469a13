//! Crowd application composition root
//!
//! Wires repositories, the notification dispatcher and the domain services
//! into a single [`CrowdApp`]. PostgreSQL is used when a database URL is
//! configured; otherwise every store lives in memory.

use std::sync::Arc;

use crowd_common::config::{Config, IdentityConfig};
use crowd_identity::{
    Account, AccountRepository, AccountStore, Argon2Config, InMemoryAccountRepository,
    IssuedToken, PasswordHasher, PgAccountRepository, RegistrationAttrs, TokenIssuer,
};
use crowd_notify::{DispatcherFactory, NotificationDispatcher, NotifyConfig};
use crowd_publications::{
    InMemoryPublicationLinkRepository, PgPublicationLinkRepository, PublicationLinkRepository,
};
use crowd_teams::{InMemoryTeamRepository, InvitationWorkflow, PgTeamRepository, TeamRepository};
use sqlx::PgPool;

/// Fully wired application services
#[derive(Clone)]
pub struct CrowdApp {
    pub accounts: AccountStore,
    pub tokens: TokenIssuer,
    pub invitations: InvitationWorkflow,
    pub publication_links: Arc<dyn PublicationLinkRepository>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
}

impl CrowdApp {
    /// In-memory stores with the dispatcher selected by `notify`
    pub fn in_memory(identity: IdentityConfig, notify: NotifyConfig) -> anyhow::Result<Self> {
        let dispatcher: Arc<dyn NotificationDispatcher> =
            Arc::from(DispatcherFactory::create(notify)?);
        Ok(Self::in_memory_with(
            identity,
            dispatcher,
            Argon2Config::default(),
        ))
    }

    /// In-memory stores around an explicit dispatcher and hashing cost
    pub fn in_memory_with(
        identity: IdentityConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
        argon2: Argon2Config,
    ) -> Self {
        Self::assemble(
            Arc::new(InMemoryAccountRepository::new()),
            Arc::new(InMemoryTeamRepository::new()),
            Arc::new(InMemoryPublicationLinkRepository::new()),
            dispatcher,
            PasswordHasher::new(argon2),
            identity,
        )
    }

    /// Connect to PostgreSQL and apply pending migrations
    pub async fn connect(
        database_url: &str,
        identity: IdentityConfig,
        notify: NotifyConfig,
    ) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to database");
            anyhow::anyhow!("Database connection failed: {}", e)
        })?;

        sqlx::migrate!("../../migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        let dispatcher: Arc<dyn NotificationDispatcher> =
            Arc::from(DispatcherFactory::create(notify)?);
        Ok(Self::assemble(
            Arc::new(PgAccountRepository::new(pool.clone())),
            Arc::new(PgTeamRepository::new(pool.clone())),
            Arc::new(PgPublicationLinkRepository::new(pool)),
            dispatcher,
            PasswordHasher::default(),
            identity,
        ))
    }

    /// Pick PostgreSQL or in-memory stores based on `config`
    pub async fn from_config(
        config: &Config,
        identity: IdentityConfig,
        notify: NotifyConfig,
    ) -> anyhow::Result<Self> {
        match &config.database_url {
            Some(url) => Self::connect(url, identity, notify).await,
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores");
                Self::in_memory(identity, notify)
            }
        }
    }

    /// Register an account and send its confirmation instructions
    pub async fn sign_up(
        &self,
        attrs: RegistrationAttrs,
    ) -> crowd_common::Result<(Account, IssuedToken)> {
        let account = self.accounts.register(attrs).await?;
        let issued = self.tokens.issue_confirmation(account.id).await?;
        Ok((account, issued))
    }

    fn assemble(
        accounts: Arc<dyn AccountRepository>,
        teams: Arc<dyn TeamRepository>,
        publication_links: Arc<dyn PublicationLinkRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        hasher: PasswordHasher,
        identity: IdentityConfig,
    ) -> Self {
        let tokens = TokenIssuer::new(
            accounts.clone(),
            dispatcher.clone(),
            hasher.clone(),
            identity.clone(),
        );
        let store = AccountStore::new(accounts.clone(), tokens.clone(), hasher, identity.clone());
        let invitations = InvitationWorkflow::new(teams, accounts, dispatcher.clone(), identity);

        Self {
            accounts: store,
            tokens,
            invitations,
            publication_links,
            dispatcher,
        }
    }
}
