use crate::app_state::AppState;
use actix_web::web;
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_common::utils::get_rand;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purpose {
    PasswordReset,
    DeviceRegistration,
    Elevation,
}

impl Purpose {
    fn as_str(&self) -> &'static str {
        match self {
            Purpose::PasswordReset => "password_reset",
            Purpose::DeviceRegistration => "device_registration",
            Purpose::Elevation => "elevation",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "password_reset" => Some(Purpose::PasswordReset),
            "device_registration" => Some(Purpose::DeviceRegistration),
            "elevation" => Some(Purpose::Elevation),
            _ => None,
        }
    }
}

/// `(token-id, username, purpose, issued-at, expires-at, consumed-at?)` — single-use,
/// purpose-bound (§3, §4.6). `Consume` is atomic: `consumed_at` is set on first successful
/// use via a conditional UPDATE, so a concurrent second consumer sees zero rows affected.
pub struct IdentVerificationToken;

const TOKEN_LEN: usize = 48;

impl IdentVerificationToken {
    /// `Issue(username, purpose, ttl) → opaque token`.
    pub async fn issue(
        data: &web::Data<AppState>,
        username: &str,
        purpose: Purpose,
        ttl_secs: i64,
    ) -> Result<String, ErrorResponse> {
        let token = get_rand(TOKEN_LEN);
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let purpose_str = purpose.as_str();

        sqlx::query!(
            r#"INSERT INTO identity_verification_tokens
            (id, username, purpose, issued_at, expires_at, consumed_at)
            VALUES ($1, $2, $3, $4, $5, NULL)"#,
            token,
            username,
            purpose_str,
            now,
            now + ttl_secs,
        )
        .execute(&data.db)
        .await?;

        Ok(token)
    }

    /// `Consume(token, purpose) → username`. Fails closed on unknown token, purpose
    /// mismatch, expiry, or prior consumption.
    pub async fn consume(
        data: &web::Data<AppState>,
        token: &str,
        purpose: Purpose,
    ) -> Result<String, ErrorResponse> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let purpose_str = purpose.as_str();

        let row = sqlx::query!(
            r#"SELECT username, purpose, expires_at, consumed_at
            FROM identity_verification_tokens WHERE id = $1"#,
            token,
        )
        .fetch_optional(&data.db)
        .await?;

        let row = row.ok_or_else(|| {
            ErrorResponse::new(ErrorResponseType::BadRequest, "Invalid token".to_string())
        })?;

        if row.consumed_at.is_some() {
            return Err(ErrorResponse::new(
                ErrorResponseType::BadRequest,
                "Token already used".to_string(),
            ));
        }
        if row.purpose != purpose_str {
            return Err(ErrorResponse::new(
                ErrorResponseType::BadRequest,
                "Token purpose mismatch".to_string(),
            ));
        }
        if row.expires_at < now {
            return Err(ErrorResponse::new(
                ErrorResponseType::BadRequest,
                "Token expired".to_string(),
            ));
        }

        let result = sqlx::query!(
            r#"UPDATE identity_verification_tokens SET consumed_at = $1
            WHERE id = $2 AND consumed_at IS NULL"#,
            now,
            token,
        )
        .execute(&data.db)
        .await?;

        if result.rows_affected() != 1 {
            // Lost the race to a concurrent consumer.
            return Err(ErrorResponse::new(
                ErrorResponseType::BadRequest,
                "Token already used".to_string(),
            ));
        }

        Ok(row.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_round_trips_through_string() {
        for p in [
            Purpose::PasswordReset,
            Purpose::DeviceRegistration,
            Purpose::Elevation,
        ] {
            assert_eq!(Purpose::from_str(p.as_str()), Some(p));
        }
    }
}
