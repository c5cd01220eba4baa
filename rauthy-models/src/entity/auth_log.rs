use crate::app_state::AppState;
use actix_web::web;
use rauthy_common::error_response::ErrorResponse;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    OneFactor,
    Totp,
    U2f,
    Duo,
}

impl AuthType {
    fn as_str(&self) -> &'static str {
        match self {
            AuthType::OneFactor => "1FA",
            AuthType::Totp => "TOTP",
            AuthType::U2f => "U2F",
            AuthType::Duo => "DUO",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "TOTP" => AuthType::Totp,
            "U2F" => AuthType::U2f,
            "DUO" => AuthType::Duo,
            _ => AuthType::OneFactor,
        }
    }
}

/// Append-only authentication log row (§3, §8). Every failed or successful verification
/// writes exactly one row synchronously before the response returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationLog {
    pub time: i64,
    pub successful: bool,
    pub username: String,
    pub typ: AuthType,
    pub remote_ip: String,
    pub request_uri: String,
    pub request_method: String,
}

impl AuthenticationLog {
    pub fn new(
        successful: bool,
        username: &str,
        typ: AuthType,
        remote_ip: &str,
        request_uri: &str,
        request_method: &str,
    ) -> Self {
        Self {
            time: OffsetDateTime::now_utc().unix_timestamp(),
            successful,
            username: username.to_string(),
            typ,
            remote_ip: remote_ip.to_string(),
            request_uri: request_uri.to_string(),
            request_method: request_method.to_string(),
        }
    }

    /// `InsertAuthenticationLog`: strictly append, never updated or deleted.
    pub async fn insert(&self, data: &web::Data<AppState>) -> Result<(), ErrorResponse> {
        let typ = self.typ.as_str();
        sqlx::query!(
            r#"INSERT INTO authentication_log
            (time, successful, username, typ, remote_ip, request_uri, request_method)
            VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            self.time,
            self.successful,
            self.username,
            typ,
            self.remote_ip,
            self.request_uri,
            self.request_method,
        )
        .execute(&data.db)
        .await?;
        Ok(())
    }

    /// `ListRecentAuthenticationsByUsername(username, since)`, ordered ascending by time so
    /// callers can walk backwards to find the break at the most recent success.
    pub async fn list_recent(
        data: &web::Data<AppState>,
        username: &str,
        since: i64,
    ) -> Result<Vec<AuthenticationLog>, ErrorResponse> {
        let rows = sqlx::query!(
            r#"SELECT time, successful, username, typ, remote_ip, request_uri, request_method
            FROM authentication_log
            WHERE username = $1 AND time >= $2
            ORDER BY time ASC"#,
            username,
            since,
        )
        .fetch_all(&data.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AuthenticationLog {
                time: r.time,
                successful: r.successful,
                username: r.username,
                typ: AuthType::from_str(&r.typ),
                remote_ip: r.remote_ip,
                request_uri: r.request_uri,
                request_method: r.request_method,
            })
            .collect())
    }
}
