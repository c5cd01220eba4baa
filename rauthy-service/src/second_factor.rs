use actix_web::{web, HttpRequest};
use rauthy_common::constants::HEADER_FWD_FOR;
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_models::app_state::AppState;
use rauthy_models::entity::auth_log::{AuthenticationLog, AuthType};
use rauthy_models::entity::regulator::Regulator;
use rauthy_models::entity::sessions::{get_header_value, AuthLevel, Session};
use rauthy_models::mfa::duo::DuoVerifier;
use rauthy_models::mfa::totp::TotpVerifier;
use rauthy_models::mfa::webauthn::WebauthnVerifier;
use rauthy_models::mfa::{Challenge, MfaVerifier, VerifyOutcome};
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondFactorMethod {
    Totp,
    Webauthn,
    Duo,
}

impl SecondFactorMethod {
    fn verifier(self, data: &web::Data<AppState>) -> Box<dyn MfaVerifier> {
        match self {
            SecondFactorMethod::Totp => Box::new(TotpVerifier { data: data.clone() }),
            SecondFactorMethod::Webauthn => Box::new(WebauthnVerifier { data: data.clone() }),
            SecondFactorMethod::Duo => Box::new(DuoVerifier {
                data: data.clone(),
                client: reqwest::Client::new(),
            }),
        }
    }

    fn auth_type(self) -> AuthType {
        match self {
            SecondFactorMethod::Totp => AuthType::Totp,
            SecondFactorMethod::Webauthn => AuthType::U2f,
            SecondFactorMethod::Duo => AuthType::Duo,
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            SecondFactorMethod::Totp => "/api/secondfactor/totp",
            SecondFactorMethod::Webauthn => "/api/secondfactor/webauthn",
            SecondFactorMethod::Duo => "/api/secondfactor/duo",
        }
    }
}

/// `POST /api/secondfactor/{method}/start` (§4.8). Requires a session already at
/// `OneFactor`; issues a verifier-specific challenge without mutating the auth level.
pub async fn initiate(
    data: &web::Data<AppState>,
    method: SecondFactorMethod,
    session: &mut Session,
) -> Result<Challenge, ErrorResponse> {
    require_one_factor(session)?;
    let username = session_username(session)?;
    method.verifier(data).initiate(&username, session).await
}

/// `POST /api/secondfactor/{method}` (§4.8). Checks the regulator, dispatches to the
/// matching verifier, logs exactly one row regardless of outcome, and on success ratchets
/// the session to `TwoFactor` and regenerates its identifier (§5).
#[tracing::instrument(level = "debug", skip_all, fields(method = ?method))]
pub async fn verify(
    data: &web::Data<AppState>,
    req: &HttpRequest,
    method: SecondFactorMethod,
    mut session: Session,
    response: &str,
) -> Result<Session, ErrorResponse> {
    require_one_factor(&session)?;
    let username = session_username(&session)?;

    Regulator::check(data, &username).await?;

    let remote_ip = get_header_value(req, &HEADER_FWD_FOR).unwrap_or("-").to_string();
    let outcome = method
        .verifier(data)
        .verify(&username, &mut session, response)
        .await?;

    let successful = outcome == VerifyOutcome::Accepted;
    AuthenticationLog::new(
        successful,
        &username,
        method.auth_type(),
        &remote_ip,
        method.endpoint(),
        "POST",
    )
    .insert(data)
    .await?;

    match outcome {
        VerifyOutcome::Accepted => {
            session.level = AuthLevel::TwoFactor;
            session.second_factor_ts = Some(OffsetDateTime::now_utc().unix_timestamp());
            let session = session.regenerate(data).await?;
            info!("second factor ({:?}) succeeded for {}", method, username);
            Ok(session)
        }
        VerifyOutcome::Rejected => Err(ErrorResponse::new(
            ErrorResponseType::AuthFailed,
            "Second factor verification failed".to_string(),
        )),
        VerifyOutcome::RateLimited => Err(ErrorResponse::new(
            ErrorResponseType::RateLimited,
            "Second factor verifier is temporarily unavailable".to_string(),
        )),
    }
}

fn require_one_factor(session: &Session) -> Result<(), ErrorResponse> {
    if session.level < AuthLevel::OneFactor {
        return Err(ErrorResponse::new(
            ErrorResponseType::Unauthorized,
            "First factor required before second factor".to_string(),
        ));
    }
    Ok(())
}

fn session_username(session: &Session) -> Result<String, ErrorResponse> {
    session.username.clone().ok_or_else(|| {
        ErrorResponse::new(ErrorResponseType::Unauthorized, "No active session".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_session_cannot_start_second_factor() {
        let session = Session::new_anonymous();
        assert!(require_one_factor(&session).is_err());
    }

    #[test]
    fn one_factor_session_may_start_second_factor() {
        let mut session = Session::new_anonymous();
        session.level = AuthLevel::OneFactor;
        assert!(require_one_factor(&session).is_ok());
    }

    #[test]
    fn two_factor_session_still_satisfies_the_guard() {
        let mut session = Session::new_anonymous();
        session.level = AuthLevel::TwoFactor;
        assert!(require_one_factor(&session).is_ok());
    }

    #[test]
    fn each_method_maps_to_its_own_auth_type_and_endpoint() {
        assert_eq!(SecondFactorMethod::Totp.auth_type(), AuthType::Totp);
        assert_eq!(SecondFactorMethod::Webauthn.auth_type(), AuthType::U2f);
        assert_eq!(SecondFactorMethod::Duo.auth_type(), AuthType::Duo);

        assert_eq!(SecondFactorMethod::Totp.endpoint(), "/api/secondfactor/totp");
        assert_eq!(SecondFactorMethod::Webauthn.endpoint(), "/api/secondfactor/webauthn");
        assert_eq!(SecondFactorMethod::Duo.endpoint(), "/api/secondfactor/duo");
    }
}
