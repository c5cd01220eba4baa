use crate::app_state::DbPool;
use rauthy_common::error_response::ErrorResponse;
use tracing::{debug, info};

/// Bootstraps the schema this core owns. Configuration decoding, CLI wiring and a real
/// migration runner (sqlx-migrate / refinery) are out of scope for this core per §1; this
/// mirrors the teacher's idempotent startup bootstrap (`anti_lockout`) rather than a full
/// migration framework.
pub async fn migrate(db: &DbPool) -> Result<(), ErrorResponse> {
    debug!("running schema bootstrap");

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT,
            display_name TEXT NOT NULL,
            email TEXT NOT NULL,
            email_verified BOOLEAN NOT NULL DEFAULT FALSE,
            groups TEXT NOT NULL DEFAULT '',
            webauthn_enabled BOOLEAN NOT NULL DEFAULT FALSE,
            totp_enabled BOOLEAN NOT NULL DEFAULT FALSE
        )"#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            expires BIGINT NOT NULL
        )"#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS authentication_log (
            time BIGINT NOT NULL,
            successful BOOLEAN NOT NULL,
            username TEXT NOT NULL,
            typ TEXT NOT NULL,
            remote_ip TEXT NOT NULL,
            request_uri TEXT NOT NULL,
            request_method TEXT NOT NULL
        )"#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS totp_configs (
            username TEXT PRIMARY KEY,
            secret BLOB NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT FALSE,
            last_step BIGINT
        )"#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS webauthn_credentials (
            credential_id BLOB PRIMARY KEY,
            username TEXT NOT NULL,
            passkey BLOB NOT NULL,
            counter BIGINT NOT NULL DEFAULT 0
        )"#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS identity_verification_tokens (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            purpose TEXT NOT NULL,
            issued_at BIGINT NOT NULL,
            expires_at BIGINT NOT NULL,
            consumed_at BIGINT
        )"#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS regulator_bans (
            username TEXT PRIMARY KEY,
            banned_until BIGINT NOT NULL
        )"#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS jwks (
            kid TEXT PRIMARY KEY,
            created_at BIGINT NOT NULL,
            enc_key_id TEXT NOT NULL,
            jwk BLOB NOT NULL
        )"#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS api_keys (
            name TEXT PRIMARY KEY,
            secret BLOB NOT NULL,
            created BIGINT NOT NULL,
            expires BIGINT,
            enc_key_id TEXT NOT NULL,
            access BLOB NOT NULL
        )"#,
    )
    .execute(db)
    .await?;

    info!("schema bootstrap complete");
    Ok(())
}
