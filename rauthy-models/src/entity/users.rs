use crate::app_state::{AppState, DbPool};
use crate::entity::user_backend::{BackendError, CredentialCheckDetails, UserBackend, UserDetails};
use actix_web::web;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use async_trait::async_trait;
use rand_core::OsRng;
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

/// The concrete, storage-backed user record. The core only ever reaches this through the
/// `UserBackend` capability set (§4.3); this struct additionally backs the admin user
/// management surface retained from the teacher (`rauthy-handlers::admin_users`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub display_name: String,
    pub email: String,
    pub email_verified: bool,
    pub groups: String,
    pub webauthn_enabled: bool,
    pub totp_enabled: bool,
}

impl User {
    pub fn groups_vec(&self) -> Vec<String> {
        if self.groups.is_empty() {
            Vec::new()
        } else {
            self.groups.split(',').map(|s| s.to_string()).collect()
        }
    }

    pub fn has_webauthn_enabled(&self) -> bool {
        self.webauthn_enabled
    }

    pub async fn find(data: &web::Data<AppState>, id_or_username: &str) -> Result<Self, ErrorResponse> {
        let user = sqlx::query_as!(
            User,
            r#"SELECT id as "id!", username, password_hash, display_name, email, email_verified,
            groups, webauthn_enabled, totp_enabled
            FROM users WHERE id = $1 OR username = $1"#,
            id_or_username,
        )
        .fetch_one(&data.db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(data: &web::Data<AppState>, email: &str) -> Result<Self, ErrorResponse> {
        let user = sqlx::query_as!(
            User,
            r#"SELECT id as "id!", username, password_hash, display_name, email, email_verified,
            groups, webauthn_enabled, totp_enabled
            FROM users WHERE email = $1"#,
            email,
        )
        .fetch_one(&data.db)
        .await?;
        Ok(user)
    }

    pub async fn find_all(data: &web::Data<AppState>) -> Result<Vec<Self>, ErrorResponse> {
        let users = sqlx::query_as!(
            User,
            r#"SELECT id as "id!", username, password_hash, display_name, email, email_verified,
            groups, webauthn_enabled, totp_enabled
            FROM users"#,
        )
        .fetch_all(&data.db)
        .await?;
        Ok(users)
    }

    pub async fn create_from_new(
        data: &web::Data<AppState>,
        username: String,
        email: String,
        display_name: String,
    ) -> Result<Self, ErrorResponse> {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            password_hash: None,
            display_name,
            email,
            email_verified: false,
            groups: String::new(),
            webauthn_enabled: false,
            totp_enabled: false,
        };

        sqlx::query!(
            r#"INSERT INTO users
            (id, username, password_hash, display_name, email, email_verified, groups,
            webauthn_enabled, totp_enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
            user.id,
            user.username,
            user.password_hash,
            user.display_name,
            user.email,
            user.email_verified,
            user.groups,
            user.webauthn_enabled,
            user.totp_enabled,
        )
        .execute(&data.db)
        .await?;

        Ok(user)
    }

    pub async fn save(&self, data: &web::Data<AppState>) -> Result<(), ErrorResponse> {
        sqlx::query!(
            r#"UPDATE users SET password_hash = $1, display_name = $2, email = $3,
            email_verified = $4, groups = $5, webauthn_enabled = $6, totp_enabled = $7
            WHERE id = $8"#,
            self.password_hash,
            self.display_name,
            self.email,
            self.email_verified,
            self.groups,
            self.webauthn_enabled,
            self.totp_enabled,
            self.id,
        )
        .execute(&data.db)
        .await?;
        Ok(())
    }

    /// Hashes and stores a new password for the user, used by both the admin surface and
    /// the identity-verification password reset flow.
    pub async fn apply_password_rules(
        &mut self,
        data: &web::Data<AppState>,
        new_password: &str,
    ) -> Result<(), ErrorResponse> {
        self.password_hash = Some(hash_password(new_password)?);
        self.save(data).await
    }
}

fn argon2_params() -> Params {
    Params::new(19_456, 2, 1, None).expect("valid argon2 params")
}

fn hash_password(password: &str) -> Result<String, ErrorResponse> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params());
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| {
            ErrorResponse::new(ErrorResponseType::Internal, "Password hashing failed".to_string())
        })
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// The default pluggable user backend: the `users` table managed above. LDAP would be a
/// second, equally narrow implementor of `UserBackend` selected at startup from config;
/// the pipeline itself never branches on which one is active (§9).
pub struct SqlUserBackend {
    pub db: DbPool,
}

#[async_trait]
impl UserBackend for SqlUserBackend {
    async fn check_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<CredentialCheckDetails, BackendError> {
        let row = sqlx::query!(
            "SELECT password_hash FROM users WHERE username = $1",
            username,
        )
        .fetch_optional(&self.db)
        .await
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let Some(row) = row else {
            // Constant work regardless of whether the user exists, so existence cannot be
            // inferred from response timing.
            let _ = Argon2::default();
            return Err(BackendError::NotFound);
        };

        match row.password_hash {
            Some(hash) if verify_password(password, &hash) => {
                Ok(CredentialCheckDetails { locked: false })
            }
            _ => Err(BackendError::InvalidCredentials),
        }
    }

    async fn get_details(&self, username: &str) -> Result<UserDetails, BackendError> {
        let row = sqlx::query!(
            "SELECT display_name, email, groups FROM users WHERE username = $1",
            username,
        )
        .fetch_optional(&self.db)
        .await
        .map_err(|e| BackendError::Unavailable(e.to_string()))?
        .ok_or(BackendError::NotFound)?;

        let groups = if row.groups.is_empty() {
            Vec::new()
        } else {
            row.groups.split(',').map(|s| s.to_string()).collect()
        };

        Ok(UserDetails {
            display_name: row.display_name,
            emails: vec![row.email],
            groups,
        })
    }

    async fn update_password(&self, username: &str, new_password: &str) -> Result<(), BackendError> {
        let hash = hash_password(new_password).map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        debug!("updating password for {} at {}", username, now);

        let result = sqlx::query!(
            "UPDATE users SET password_hash = $1 WHERE username = $2",
            hash,
            username,
        )
        .execute(&self.db)
        .await
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong", &hash));
    }
}
