use crate::app_state::AppState;
use crate::entity::sessions::Session;
use crate::mfa::{Challenge, MfaVerifier, VerifyOutcome};
use actix_web::web;
use async_trait::async_trait;
use rauthy_common::constants::{TOTP_DIGITS, TOTP_PERIOD_SEC};
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_common::utils::get_rand;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use totp_rs::{Algorithm, Secret, TOTP};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpConfiguration {
    pub username: String,
    pub secret: Vec<u8>,
    pub enabled: bool,
}

impl TotpConfiguration {
    pub async fn load(
        data: &web::Data<AppState>,
        username: &str,
    ) -> Result<Option<Self>, ErrorResponse> {
        let row = sqlx::query!(
            "SELECT secret, enabled FROM totp_configs WHERE username = $1",
            username,
        )
        .fetch_optional(&data.db)
        .await?;

        Ok(row.map(|r| TotpConfiguration {
            username: username.to_string(),
            secret: r.secret,
            enabled: r.enabled,
        }))
    }

    pub async fn save(&self, data: &web::Data<AppState>) -> Result<(), ErrorResponse> {
        sqlx::query!(
            r#"INSERT INTO totp_configs (username, secret, enabled)
            VALUES ($1, $2, $3)
            ON CONFLICT(username) DO UPDATE SET secret = $2, enabled = $3"#,
            self.username,
            self.secret,
            self.enabled,
        )
        .execute(&data.db)
        .await?;
        Ok(())
    }

    fn totp(&self) -> Result<TOTP, ErrorResponse> {
        TOTP::new(
            Algorithm::SHA1,
            *TOTP_DIGITS as usize,
            1,
            *TOTP_PERIOD_SEC,
            Secret::Raw(self.secret.clone()).to_bytes().map_err(|_| {
                ErrorResponse::new(ErrorResponseType::Internal, "Invalid TOTP secret".to_string())
            })?,
            None,
            self.username.clone(),
        )
        .map_err(|_| {
            ErrorResponse::new(ErrorResponseType::Internal, "Invalid TOTP configuration".to_string())
        })
    }

    fn current_step(&self, now: i64) -> u64 {
        now as u64 / *TOTP_PERIOD_SEC
    }
}

/// `UpdateTOTPConfigurationStep(user, step)`: the last accepted step, preventing a given
/// `(user, step)` pair from succeeding more than once within its validity window (§4.4, §8).
async fn step_already_consumed(
    data: &web::Data<AppState>,
    username: &str,
    step: u64,
) -> Result<bool, ErrorResponse> {
    let step = step as i64;
    let row = sqlx::query!(
        "SELECT last_step FROM totp_configs WHERE username = $1",
        username,
    )
    .fetch_optional(&data.db)
    .await?;

    Ok(matches!(row, Some(r) if r.last_step.map(|s| s >= step).unwrap_or(false)))
}

async fn record_consumed_step(
    data: &web::Data<AppState>,
    username: &str,
    step: u64,
) -> Result<(), ErrorResponse> {
    let step = step as i64;
    sqlx::query!(
        "UPDATE totp_configs SET last_step = $1 WHERE username = $2",
        step,
        username,
    )
    .execute(&data.db)
    .await?;
    Ok(())
}

pub struct TotpVerifier {
    pub data: web::Data<AppState>,
}

#[async_trait]
impl MfaVerifier for TotpVerifier {
    async fn enroll(&self, username: &str, _session: &mut Session) -> Result<Challenge, ErrorResponse> {
        let secret = Secret::generate_secret();
        let cfg = TotpConfiguration {
            username: username.to_string(),
            secret: secret.to_bytes().map_err(|_| {
                ErrorResponse::new(ErrorResponseType::Internal, "Secret generation failed".to_string())
            })?,
            enabled: false,
        };
        cfg.save(&self.data).await?;

        Ok(Challenge {
            challenge_id: get_rand(16),
            payload: serde_json::json!({ "secret": secret.to_encoded().to_string() }),
        })
    }

    async fn initiate(&self, _username: &str, session: &mut Session) -> Result<Challenge, ErrorResponse> {
        // TOTP has no server-issued challenge payload beyond a correlation nonce; the
        // client derives its code locally from the shared secret and the current time.
        let nonce = get_rand(16);
        session.mfa.totp_nonce = Some(nonce.clone());
        Ok(Challenge {
            challenge_id: nonce,
            payload: serde_json::Value::Null,
        })
    }

    async fn verify(
        &self,
        username: &str,
        session: &mut Session,
        response: &str,
    ) -> Result<VerifyOutcome, ErrorResponse> {
        let Some(cfg) = TotpConfiguration::load(&self.data, username).await? else {
            return Ok(VerifyOutcome::Rejected);
        };
        if !cfg.enabled {
            return Ok(VerifyOutcome::Rejected);
        }

        let totp = cfg.totp()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let current_step = cfg.current_step(now);

        // Accept the current step and one previous step to allow for clock skew.
        let mut accepted_step = None;
        for step in [current_step, current_step.saturating_sub(1)] {
            let step_time = step * *TOTP_PERIOD_SEC;
            if totp
                .check(response, step_time)
            {
                accepted_step = Some(step);
                break;
            }
        }

        let Some(step) = accepted_step else {
            return Ok(VerifyOutcome::Rejected);
        };

        if step_already_consumed(&self.data, username, step).await? {
            return Ok(VerifyOutcome::Rejected);
        }
        record_consumed_step(&self.data, username, step).await?;
        session.mfa.totp_nonce = None;

        Ok(VerifyOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_is_derived_from_period() {
        let cfg = TotpConfiguration {
            username: "alice".to_string(),
            secret: vec![1, 2, 3, 4],
            enabled: true,
        };
        assert_eq!(cfg.current_step(0), 0);
        assert_eq!(cfg.current_step(30), 1);
        assert_eq!(cfg.current_step(59), 1);
        assert_eq!(cfg.current_step(60), 2);
    }
}
