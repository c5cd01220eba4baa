use crate::app_state::AppState;
use crate::entity::auth_log::AuthenticationLog;
use actix_web::web;
use rauthy_common::constants::{REGULATOR_BAN_SEC, REGULATOR_THRESHOLD, REGULATOR_WINDOW_SEC};
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use time::OffsetDateTime;
use tracing::info;

/// Sliding-window failed-attempt limiter keyed by username (§4.5). The failure count itself
/// is derived from the authentication log, but once a ban is triggered it is persisted in
/// `regulator_bans` independent of the log window: the ban must outlive `REGULATOR_WINDOW_SEC`
/// (§8's "after ban_duration it returns to normal" — not "after window_duration").
pub struct Regulator;

impl Regulator {
    /// Rejects with `AuthBanned` before any verifier is invoked. First checks for a still-
    /// active persisted ban; only if none is active does it recompute the failure count over
    /// the last `REGULATOR_WINDOW_SEC` (counting only failures since the most recent success)
    /// and, on crossing `REGULATOR_THRESHOLD`, anchors a fresh `REGULATOR_BAN_SEC` ban on this
    /// very call rather than on the timestamp of the last failure.
    pub async fn check(data: &web::Data<AppState>, username: &str) -> Result<(), ErrorResponse> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        if let Some(banned_until) = Self::load_ban(data, username).await? {
            if banned_until > now {
                info!("user {} is banned, rejecting without verifier", username);
                return Err(ErrorResponse::new(
                    ErrorResponseType::AuthBanned,
                    "Too many failed attempts".to_string(),
                ));
            }
        }

        let window_start = now - *REGULATOR_WINDOW_SEC;
        let rows = AuthenticationLog::list_recent(data, username, window_start).await?;

        let mut failures_since_success = 0u32;
        for row in rows.iter().rev() {
            if row.successful {
                break;
            }
            failures_since_success += 1;
        }

        if failures_since_success >= *REGULATOR_THRESHOLD {
            let banned_until = now + *REGULATOR_BAN_SEC;
            Self::persist_ban(data, username, banned_until).await?;
            info!("user {} crossed the failure threshold, banning", username);
            return Err(ErrorResponse::new(
                ErrorResponseType::AuthBanned,
                "Too many failed attempts".to_string(),
            ));
        }

        Ok(())
    }

    async fn load_ban(data: &web::Data<AppState>, username: &str) -> Result<Option<i64>, ErrorResponse> {
        let row = sqlx::query!(
            "SELECT banned_until FROM regulator_bans WHERE username = $1",
            username,
        )
        .fetch_optional(&data.db)
        .await?;
        Ok(row.map(|r| r.banned_until))
    }

    async fn persist_ban(
        data: &web::Data<AppState>,
        username: &str,
        banned_until: i64,
    ) -> Result<(), ErrorResponse> {
        sqlx::query!(
            r#"INSERT INTO regulator_bans (username, banned_until)
            VALUES ($1, $2)
            ON CONFLICT(username) DO UPDATE SET banned_until = $2"#,
            username,
            banned_until,
        )
        .execute(&data.db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::auth_log::{AuthenticationLog, AuthType};

    fn log(time: i64, successful: bool) -> AuthenticationLog {
        AuthenticationLog {
            time,
            successful,
            username: "bob".to_string(),
            typ: AuthType::OneFactor,
            remote_ip: "127.0.0.1".to_string(),
            request_uri: "/api/firstfactor".to_string(),
            request_method: "POST".to_string(),
        }
    }

    fn failures_since_success(rows: &[AuthenticationLog]) -> u32 {
        let mut n = 0;
        for row in rows.iter().rev() {
            if row.successful {
                break;
            }
            n += 1;
        }
        n
    }

    #[test]
    fn success_breaks_the_window() {
        let rows = vec![log(0, false), log(1, false), log(2, true), log(3, false)];
        assert_eq!(failures_since_success(&rows), 1);
    }

    #[test]
    fn all_failures_counted_when_no_success() {
        let rows = vec![log(0, false), log(1, false), log(2, false)];
        assert_eq!(failures_since_success(&rows), 3);
    }
}
