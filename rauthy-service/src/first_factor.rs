use actix_web::{web, HttpRequest};
use rauthy_common::constants::HEADER_FWD_FOR;
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_models::app_state::AppState;
use rauthy_models::entity::auth_log::{AuthenticationLog, AuthType};
use rauthy_models::entity::regulator::Regulator;
use rauthy_models::entity::sessions::{get_header_value, AuthLevel, Session};
use rauthy_models::entity::user_backend::UserBackend;
use rauthy_models::request::FirstFactorRequest;
use rauthy_models::response::FirstFactorResponse;
use time::OffsetDateTime;
use tracing::info;

/// `POST /api/firstfactor` (§4.8). The regulator is consulted before the backend so a
/// banned username is rejected without ever reaching the credential check; exactly one
/// authentication-log row is written per attempt regardless of outcome.
#[tracing::instrument(level = "debug", skip_all, fields(username = body.username))]
pub async fn first_factor(
    data: &web::Data<AppState>,
    backend: &dyn UserBackend,
    req: &HttpRequest,
    mut session: Session,
    body: FirstFactorRequest,
) -> Result<(FirstFactorResponse, Session), ErrorResponse> {
    let remote_ip = get_header_value(req, &HEADER_FWD_FOR).unwrap_or("-").to_string();

    Regulator::check(data, &body.username).await?;

    let check = backend.check_credentials(&body.username, &body.password).await;
    let successful = check.is_ok();

    AuthenticationLog::new(
        successful,
        &body.username,
        AuthType::OneFactor,
        &remote_ip,
        "/api/firstfactor",
        "POST",
    )
    .insert(data)
    .await?;

    let details_check = check?;
    if details_check.locked {
        return Err(ErrorResponse::new(
            ErrorResponseType::Forbidden,
            "Account is locked".to_string(),
        ));
    }

    let details = backend.get_details(&body.username).await?;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    session.username = Some(body.username.clone());
    session.display_name = Some(details.display_name);
    session.emails = details.emails;
    session.groups = details.groups.into_iter().collect();
    session.level = AuthLevel::OneFactor;
    session.first_factor_ts = Some(now);
    session.second_factor_ts = None;
    session.redirect_url = body.redirect_url.clone();
    if body.remember_me {
        session.set_remember_me();
    }

    let session = session.regenerate(data).await?;

    info!("first factor succeeded for {}", body.username);

    let response = FirstFactorResponse {
        level: session.level,
        redirect_url: session.redirect_url.clone(),
    };
    Ok((response, session))
}
