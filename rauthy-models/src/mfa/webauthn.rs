use crate::app_state::AppState;
use crate::entity::sessions::Session;
use crate::mfa::{Challenge, MfaVerifier, VerifyOutcome};
use actix_web::web;
use async_trait::async_trait;
use rauthy_common::constants::{WEBAUTHN_RP_ID, WEBAUTHN_RP_ORIGIN};
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use serde::{Deserialize, Serialize};
use url::Url;
use webauthn_rs::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasskeyEntity {
    pub username: String,
    pub credential_id: Vec<u8>,
    pub passkey: Passkey,
    pub counter: i64,
}

impl PasskeyEntity {
    pub async fn load_all(
        data: &web::Data<AppState>,
        username: &str,
    ) -> Result<Vec<Self>, ErrorResponse> {
        let rows = sqlx::query!(
            r#"SELECT credential_id as "credential_id!", passkey, counter FROM webauthn_credentials WHERE username = $1"#,
            username,
        )
        .fetch_all(&data.db)
        .await?;

        rows.into_iter()
            .map(|r| {
                let passkey: Passkey = serde_json::from_slice(&r.passkey)?;
                Ok(PasskeyEntity {
                    username: username.to_string(),
                    credential_id: r.credential_id,
                    passkey,
                    counter: r.counter,
                })
            })
            .collect()
    }

    pub async fn save(&self, data: &web::Data<AppState>) -> Result<(), ErrorResponse> {
        let passkey_bytes = serde_json::to_vec(&self.passkey)?;
        sqlx::query!(
            r#"INSERT INTO webauthn_credentials (username, credential_id, passkey, counter)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(credential_id) DO UPDATE SET passkey = $3, counter = $4"#,
            self.username,
            self.credential_id,
            passkey_bytes,
            self.counter,
        )
        .execute(&data.db)
        .await?;
        Ok(())
    }

    /// Signature counter, if present, must be strictly greater than the stored counter
    /// (§4.4) — rejects cloned authenticators replaying a captured assertion.
    pub async fn update_counter(
        &self,
        data: &web::Data<AppState>,
        new_counter: i64,
    ) -> Result<(), ErrorResponse> {
        if new_counter <= self.counter {
            return Err(ErrorResponse::new(
                ErrorResponseType::AuthFailed,
                "WebAuthn signature counter did not advance".to_string(),
            ));
        }
        sqlx::query!(
            "UPDATE webauthn_credentials SET counter = $1 WHERE credential_id = $2",
            new_counter,
            self.credential_id,
        )
        .execute(&data.db)
        .await?;
        Ok(())
    }
}

fn webauthn() -> Result<Webauthn, ErrorResponse> {
    let rp_origin = Url::parse(&WEBAUTHN_RP_ORIGIN).map_err(|_| {
        ErrorResponse::new(ErrorResponseType::Internal, "Invalid WebAuthn RP origin".to_string())
    })?;
    WebauthnBuilder::new(&WEBAUTHN_RP_ID, &rp_origin)
        .and_then(|b| b.build())
        .map_err(|e| {
            ErrorResponse::new(ErrorResponseType::Internal, format!("WebAuthn setup failed: {e}"))
        })
}

pub struct WebauthnVerifier {
    pub data: web::Data<AppState>,
}

#[async_trait]
impl MfaVerifier for WebauthnVerifier {
    async fn enroll(&self, username: &str, session: &mut Session) -> Result<Challenge, ErrorResponse> {
        if !session.is_elevated() {
            return Err(ErrorResponse::new(
                ErrorResponseType::Forbidden,
                "Device registration requires a fresh re-authentication".to_string(),
            ));
        }

        let wa = webauthn()?;
        let existing = PasskeyEntity::load_all(&self.data, username).await?;
        let exclude: Vec<CredentialID> = existing.iter().map(|p| p.passkey.cred_id().clone()).collect();

        let user_id = Uuid::new_v4();
        let (ccr, reg_state) = wa
            .start_passkey_registration(user_id, username, username, Some(exclude))
            .map_err(|e| {
                ErrorResponse::new(ErrorResponseType::Internal, format!("WebAuthn registration failed: {e}"))
            })?;

        session.mfa.webauthn_challenge = Some(serde_json::to_string(&reg_state)?);

        Ok(Challenge {
            challenge_id: user_id.to_string(),
            payload: serde_json::to_value(ccr)?,
        })
    }

    async fn initiate(&self, username: &str, session: &mut Session) -> Result<Challenge, ErrorResponse> {
        let wa = webauthn()?;
        let creds = PasskeyEntity::load_all(&self.data, username).await?;
        if creds.is_empty() {
            return Err(ErrorResponse::new(
                ErrorResponseType::Forbidden,
                "No WebAuthn credentials enrolled".to_string(),
            ));
        }
        let passkeys: Vec<Passkey> = creds.into_iter().map(|c| c.passkey).collect();

        let (rcr, auth_state) = wa.start_passkey_authentication(&passkeys).map_err(|e| {
            ErrorResponse::new(ErrorResponseType::Internal, format!("WebAuthn challenge failed: {e}"))
        })?;

        session.mfa.webauthn_challenge = Some(serde_json::to_string(&auth_state)?);

        Ok(Challenge {
            challenge_id: username.to_string(),
            payload: serde_json::to_value(rcr)?,
        })
    }

    async fn verify(
        &self,
        username: &str,
        session: &mut Session,
        response: &str,
    ) -> Result<VerifyOutcome, ErrorResponse> {
        let Some(state_json) = session.mfa.webauthn_challenge.take() else {
            return Ok(VerifyOutcome::Rejected);
        };

        let wa = webauthn()?;
        let auth_state: PasskeyAuthentication = serde_json::from_str(&state_json)?;
        let credential: PublicKeyCredential = serde_json::from_str(response)
            .map_err(|_| ErrorResponse::new(ErrorResponseType::BadRequest, "Malformed assertion".to_string()))?;

        let result = wa.finish_passkey_authentication(&credential, &auth_state);
        let auth_result = match result {
            Ok(r) => r,
            Err(_) => return Ok(VerifyOutcome::Rejected),
        };

        let creds = PasskeyEntity::load_all(&self.data, username).await?;
        let Some(matched) = creds
            .iter()
            .find(|c| c.passkey.cred_id() == auth_result.cred_id())
        else {
            return Ok(VerifyOutcome::Rejected);
        };

        if matched
            .update_counter(&self.data, auth_result.counter() as i64)
            .await
            .is_err()
        {
            return Ok(VerifyOutcome::Rejected);
        }

        Ok(VerifyOutcome::Accepted)
    }
}
