use actix_web::web;
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_models::app_state::AppState;
use rauthy_models::entity::ident_token::{IdentVerificationToken, Purpose};
use rauthy_models::entity::sessions::Session;
use tracing::debug;

const ELEVATION_TOKEN_TTL_SEC: i64 = 300;

/// `POST /api/elevate/request` (§4.2): issues a single-use, purpose-bound elevation token for
/// the already-authenticated session's username. Delivery is out-of-band, same as password
/// reset; this endpoint only requires the caller to already hold a `OneFactor`+ session, it
/// does not re-check the password.
pub async fn request_elevation(data: &web::Data<AppState>, session: &Session) -> Result<(), ErrorResponse> {
    let username = session.username.clone().ok_or_else(|| {
        ErrorResponse::new(ErrorResponseType::Unauthorized, "No authenticated session".to_string())
    })?;

    let token = IdentVerificationToken::issue(data, &username, Purpose::Elevation, ELEVATION_TOKEN_TTL_SEC).await?;
    debug!("issued elevation token for {}", username);
    let _ = token;
    Ok(())
}

/// `POST /api/elevate/confirm` (§4.2): consumes an elevation token and, only if it was issued
/// for the same username as the current session, grants elevation on that session. A token
/// issued for a different user never elevates someone else's session.
pub async fn confirm_elevation(
    data: &web::Data<AppState>,
    mut session: Session,
    token: &str,
) -> Result<Session, ErrorResponse> {
    let username = IdentVerificationToken::consume(data, token, Purpose::Elevation).await?;

    if session.username.as_deref() != Some(username.as_str()) {
        return Err(ErrorResponse::new(
            ErrorResponseType::BadRequest,
            "Token does not belong to this session".to_string(),
        ));
    }

    session.grant_elevation();
    session.save(data).await?;
    Ok(session)
}
