use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::{cipher::LicenseCipher, password::PasswordHasher, token::TokenService};
use crate::db::{create_pool, PgStore};
use crate::error::Result;
use crate::limiter::{AttemptPolicy, AttemptStore, AttemptTracker, MemoryAttemptStore, RedisAttemptStore};
use crate::repositories::{
    audit::AuditRepository, license::LicenseRepository, memory::MemoryStore, role::RoleRepository,
    user::UserRepository,
};

/// `DATABASE_URL` scheme that selects the process-local store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

/// Scope of the license validation/activation attempt counter.
pub const LICENSE_SCOPE: &str = "license";
/// Scope of the login attempt counter.
pub const LOGIN_SCOPE: &str = "login";

/// The credential store, one handle per record kind.
#[derive(Clone)]
pub struct Repositories {
    pub licenses: Arc<dyn LicenseRepository>,
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub audit: Arc<dyn AuditRepository>,
}

impl Repositories {
    /// Uses one store for every record kind.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: LicenseRepository + UserRepository + RoleRepository + AuditRepository + 'static,
    {
        Self {
            licenses: store.clone(),
            users: store.clone(),
            roles: store.clone(),
            audit: store,
        }
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// The credential store.
    pub repos: Repositories,
    /// Cipher for license keys in transit.
    pub cipher: LicenseCipher,
    /// Access token issuer.
    pub tokens: TokenService,
    /// Password hasher.
    pub passwords: PasswordHasher,
    /// Failed license validations/activations per caller IP.
    pub license_attempts: AttemptTracker,
    /// Failed logins per caller IP.
    pub login_attempts: AttemptTracker,
}

impl AppState {
    /// Creates a new `AppState`, connecting to the configured backends.
    ///
    /// `DATABASE_URL=memory://` selects the in-memory store; anything else is
    /// a PostgreSQL URL and the schema is applied. With `REDIS_URL` set the
    /// attempt counters live in Redis.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let repos = if config.database_url.starts_with(MEMORY_DATABASE_URL) {
            tracing::warn!("⚠️ Using the in-memory store; data is lost on restart");
            Repositories::from_store(Arc::new(MemoryStore::new()))
        } else {
            let pool = create_pool(&config.database_url)?;
            tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");
            let store = PgStore::new(pool);
            store.migrate().await?;
            Repositories::from_store(Arc::new(store))
        };

        let redis = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let manager = ConnectionManager::new(client).await?;
                tracing::info!("✅ Redis Connection Manager initialized (shared attempt counters)");
                Some(manager)
            }
            None => {
                tracing::info!("✅ Attempt counters kept in process memory");
                None
            }
        };

        Self::build(config, repos, redis)
    }

    /// Assembles the state over already-connected backends.
    pub fn build(config: &Config, repos: Repositories, redis: Option<ConnectionManager>) -> Result<Self> {
        let policy = AttemptPolicy {
            threshold: config.attempt_threshold,
            window: config.attempt_window,
        };
        let attempt_store = |redis: &Option<ConnectionManager>| -> Arc<dyn AttemptStore> {
            match redis {
                Some(manager) => Arc::new(RedisAttemptStore::new(manager.clone())),
                None => Arc::new(MemoryAttemptStore::new()),
            }
        };

        Ok(Self {
            config: Arc::new(config.clone()),
            repos,
            cipher: LicenseCipher::new(&config.license_key, &config.license_iv),
            tokens: TokenService::new(&config.jwt_secret, config.token_ttl),
            passwords: PasswordHasher::new(config.password_policy)?,
            license_attempts: AttemptTracker::new(LICENSE_SCOPE, policy, attempt_store(&redis)),
            login_attempts: AttemptTracker::new(LOGIN_SCOPE, policy, attempt_store(&redis)),
        })
    }
}
