use crate::app_state::AppState;
use actix_web::web;
use rauthy_common::constants::{CACHE_NAME_12HR, IDX_JWK_LATEST};
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_common::utils::{decrypt, encrypt, get_rand_bytes};
use redhac::{cache_get, cache_get_from, cache_get_value, cache_put};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Key material backing session cookie HMAC signing (§4.2, §5). The OIDC provider's full
/// JWKS/signing surface (RSA/EdDSA key pairs, `/oidc/certs`) is out of scope per §1; this
/// entity only persists the symmetric key this core itself needs, encrypted at rest the
/// same way the teacher's JWKS rows are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKey {
    pub kid: String,
    pub created_at: i64,
    pub enc_key_id: String,
    pub key: Vec<u8>,
}

impl SigningKey {
    /// Returns the latest signing key, generating and persisting one on first use.
    pub async fn find_latest(data: &web::Data<AppState>) -> Result<Self, ErrorResponse> {
        if let Some(key) = cache_get!(
            SigningKey,
            CACHE_NAME_12HR.to_string(),
            IDX_JWK_LATEST.to_string(),
            &data.caches.ha_cache_config,
            false
        )
        .await?
        {
            return Ok(key);
        }

        let row = sqlx::query!(
            "SELECT kid, created_at, enc_key_id, jwk FROM jwks ORDER BY created_at DESC LIMIT 1"
        )
        .fetch_optional(&data.db)
        .await?;

        let key = match row {
            Some(r) => {
                let enc_key = data.enc_keys.get(&r.enc_key_id).ok_or_else(|| {
                    ErrorResponse::new(
                        ErrorResponseType::Internal,
                        "Cannot decrypt signing key".to_string(),
                    )
                })?;
                SigningKey {
                    kid: r.kid,
                    created_at: r.created_at,
                    enc_key_id: r.enc_key_id,
                    key: decrypt(&r.jwk, enc_key)?,
                }
            }
            None => Self::generate_and_persist(data).await?,
        };

        cache_put(
            CACHE_NAME_12HR.to_string(),
            IDX_JWK_LATEST.to_string(),
            &data.caches.ha_cache_config,
            &key,
        )
        .await?;

        Ok(key)
    }

    async fn generate_and_persist(data: &web::Data<AppState>) -> Result<Self, ErrorResponse> {
        let key = get_rand_bytes(32);
        let enc_key = data.enc_keys.get(&data.enc_key_active).ok_or_else(|| {
            ErrorResponse::new(
                ErrorResponseType::Internal,
                "No active encryption key configured".to_string(),
            )
        })?;
        let encrypted = encrypt(&key, enc_key)?;

        let signing_key = SigningKey {
            kid: uuid::Uuid::new_v4().to_string(),
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            enc_key_id: data.enc_key_active.clone(),
            key,
        };

        sqlx::query!(
            r#"INSERT INTO jwks (kid, created_at, enc_key_id, jwk) VALUES ($1, $2, $3, $4)"#,
            signing_key.kid,
            signing_key.created_at,
            signing_key.enc_key_id,
            encrypted,
        )
        .execute(&data.db)
        .await?;

        Ok(signing_key)
    }
}
