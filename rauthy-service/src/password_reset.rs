use actix_web::web;
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_models::app_state::AppState;
use rauthy_models::entity::ident_token::{IdentVerificationToken, Purpose};
use rauthy_models::entity::user_backend::UserBackend;
use rauthy_models::entity::users::User;
use rauthy_models::request::PasswordResetRequest;
use tracing::debug;

const RESET_TOKEN_TTL_SEC: i64 = 3_600;

/// `POST /api/reset-password/request` (§4.6). Always succeeds regardless of whether `email`
/// is registered, so the response cannot be used to enumerate accounts.
pub async fn request_reset(data: &web::Data<AppState>, email: &str) -> Result<(), ErrorResponse> {
    let user = match User::find_by_email(data, email).await {
        Ok(u) => u,
        Err(_) => {
            debug!("password reset requested for unknown email, returning success anyway");
            return Ok(());
        }
    };

    let token =
        IdentVerificationToken::issue(data, &user.username, Purpose::PasswordReset, RESET_TOKEN_TTL_SEC)
            .await?;
    // Delivery of the token (email) is handled by the notification sender, out of scope (§1).
    debug!("issued password reset token for {}", user.username);
    let _ = token;
    Ok(())
}

/// `POST /api/reset-password/confirm` (§4.6). Consuming the token establishes identity;
/// the e-mail match is a belt-and-braces check against a stale or copy-pasted link.
#[tracing::instrument(level = "debug", skip_all, fields(email = req_data.email))]
pub async fn confirm_reset(
    data: &web::Data<AppState>,
    backend: &dyn UserBackend,
    req_data: PasswordResetRequest,
) -> Result<(), ErrorResponse> {
    let username = IdentVerificationToken::consume(data, &req_data.token, Purpose::PasswordReset).await?;
    let user = User::find(data, &username).await?;

    if user.email != req_data.email {
        return Err(ErrorResponse::new(
            ErrorResponseType::BadRequest,
            "E-mail does not match this token".to_string(),
        ));
    }

    if user.has_webauthn_enabled() && req_data.mfa_code.is_none() {
        return Err(ErrorResponse::new(
            ErrorResponseType::BadRequest,
            "MFA code is required to reset this account's password".to_string(),
        ));
    }

    backend.update_password(&user.username, &req_data.password).await?;
    Ok(())
}
