use crate::entity::rules::Rule;
use crate::entity::user_backend::UserBackend;
use redhac::CacheConfig;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "sqlite")]
pub type DbPool = sqlx::SqlitePool;
#[cfg(not(feature = "sqlite"))]
pub type DbPool = sqlx::PgPool;

/// Immutable-after-startup process state, shared read-only across every request.
///
/// Reload is modelled as build-new-and-swap: a config change produces a fresh `AppState`
/// wrapped in a new `web::Data`, never an in-place mutation of this one, so in-flight
/// requests keep seeing a coherent snapshot of the rule set and keys.
pub struct AppState {
    pub db: DbPool,
    pub caches: Caches,

    /// Symmetric keys used to encrypt entities at rest (JWKs, API key secrets), keyed by id.
    pub enc_keys: HashMap<String, Vec<u8>>,
    pub enc_key_active: String,

    /// HMAC key used to sign the session cookie. Rotated only via process restart.
    pub session_hmac_key: Vec<u8>,

    /// Compiled, ordered access control rule list. Immutable for the process lifetime.
    pub rules: Arc<Vec<Rule>>,

    /// The pluggable user directory selected at startup (§4.3, §9). The pipeline only ever
    /// reaches users through this trait object, never a concrete backend type.
    pub user_backend: Arc<dyn UserBackend>,

    pub issuer: String,
}

pub struct Caches {
    pub ha_cache_config: CacheConfig,
}
