use crate::app_state::AppState;
use crate::entity::sessions::Session;
use crate::mfa::{Challenge, MfaVerifier, VerifyOutcome};
use actix_web::web;
use async_trait::async_trait;
use rauthy_common::constants::{DUO_HOST, DUO_IKEY, DUO_POLL_TIMEOUT_SEC};
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct DuoAuthResponse {
    stat: String,
    response: Option<DuoAuthResult>,
}

#[derive(Debug, Deserialize)]
struct DuoAuthResult {
    result: String,
    txid: Option<String>,
}

/// Push verifier: `Initiate` returns an external transaction id, `Verify` polls Duo's
/// service for completion within a deadline (§4.4, §5). A long-running poll honors the
/// per-request deadline propagated from the HTTP handler; on expiry it returns
/// `RateLimited` and leaves the session untouched, never touching the regulator.
pub struct DuoVerifier {
    pub data: web::Data<AppState>,
    pub client: reqwest::Client,
}

impl DuoVerifier {
    fn configured(&self) -> Result<(String, String), ErrorResponse> {
        match (DUO_IKEY.clone(), DUO_HOST.clone()) {
            (Some(ikey), Some(host)) => Ok((ikey, host)),
            _ => Err(ErrorResponse::new(
                ErrorResponseType::Unavailable,
                "Duo integration not configured".to_string(),
            )),
        }
    }
}

#[async_trait]
impl MfaVerifier for DuoVerifier {
    async fn enroll(&self, _username: &str, _session: &mut Session) -> Result<Challenge, ErrorResponse> {
        Err(ErrorResponse::new(
            ErrorResponseType::BadRequest,
            "Duo does not support self-service enrolment through this API".to_string(),
        ))
    }

    async fn initiate(&self, username: &str, _session: &mut Session) -> Result<Challenge, ErrorResponse> {
        let (_ikey, host) = self.configured()?;

        let resp = self
            .client
            .post(format!("https://{host}/auth/v2/auth"))
            .form(&[("username", username), ("factor", "push"), ("async", "1")])
            .timeout(Duration::from_secs(*DUO_POLL_TIMEOUT_SEC))
            .send()
            .await
            .map_err(|e| {
                warn!("duo auth request failed: {}", e);
                ErrorResponse::new(ErrorResponseType::Unavailable, "Duo unavailable".to_string())
            })?;

        let parsed: DuoAuthResponse = resp.json().await.map_err(|_| {
            ErrorResponse::new(ErrorResponseType::Unavailable, "Malformed Duo response".to_string())
        })?;

        let txid = parsed
            .response
            .and_then(|r| r.txid)
            .ok_or_else(|| ErrorResponse::new(ErrorResponseType::Unavailable, "Duo unavailable".to_string()))?;

        Ok(Challenge {
            challenge_id: txid,
            payload: serde_json::Value::Null,
        })
    }

    async fn verify(
        &self,
        _username: &str,
        _session: &mut Session,
        response: &str,
    ) -> Result<VerifyOutcome, ErrorResponse> {
        let (_ikey, host) = self.configured()?;
        let txid = response;

        let poll = self
            .client
            .post(format!("https://{host}/auth/v2/auth_status"))
            .query(&[("txid", txid)])
            .timeout(Duration::from_secs(*DUO_POLL_TIMEOUT_SEC))
            .send()
            .await;

        let resp = match poll {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Ok(VerifyOutcome::RateLimited),
            Err(e) => {
                warn!("duo poll failed: {}", e);
                return Err(ErrorResponse::new(
                    ErrorResponseType::Unavailable,
                    "Duo unavailable".to_string(),
                ));
            }
        };

        let parsed: DuoAuthResponse = resp.json().await.map_err(|_| {
            ErrorResponse::new(ErrorResponseType::Unavailable, "Malformed Duo response".to_string())
        })?;

        match parsed.response.map(|r| r.result) {
            Some(result) if result == "allow" => Ok(VerifyOutcome::Accepted),
            Some(result) if result == "deny" => Ok(VerifyOutcome::Rejected),
            _ if parsed.stat == "OK" => Ok(VerifyOutcome::RateLimited),
            _ => Ok(VerifyOutcome::Rejected),
        }
    }
}
