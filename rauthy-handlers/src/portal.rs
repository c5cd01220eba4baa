use crate::middleware::session_from_req;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use actix_web_validator::Json;
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_models::app_state::AppState;
use rauthy_models::entity::sessions::Session;
use rauthy_models::request::{
    DuoVerifyRequest, ElevationConfirmRequest, FirstFactorRequest, RequestResetRequest,
    TotpVerifyRequest, WebauthnAuthFinishRequest,
};
use rauthy_models::response::{ChallengeResponse, FirstFactorResponse, SessionStateResponse};
use rauthy_service::second_factor::SecondFactorMethod;
use rauthy_service::{elevation, first_factor, password_reset, second_factor};

fn current_session(req: &HttpRequest) -> Result<Session, ErrorResponse> {
    session_from_req(req).ok_or_else(|| {
        ErrorResponse::new(ErrorResponseType::Internal, "session middleware did not run".to_string())
    })
}

/// `POST /api/firstfactor` (§4.8).
#[utoipa::path(
    post,
    path = "/api/firstfactor",
    tag = "portal",
    request_body = FirstFactorRequest,
    responses(
        (status = 200, description = "First factor accepted", body = FirstFactorResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts"),
    ),
)]
#[post("/firstfactor")]
pub async fn post_firstfactor(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: Json<FirstFactorRequest>,
) -> Result<HttpResponse, ErrorResponse> {
    let session = current_session(&req)?;
    let (resp, session) =
        first_factor::first_factor(&data, data.user_backend.as_ref(), &req, session, body.into_inner())
            .await?;

    Ok(HttpResponse::Ok()
        .cookie(session.build_cookie(&data))
        .json(resp))
}

fn parse_method(method: &str) -> Result<SecondFactorMethod, ErrorResponse> {
    match method {
        "totp" => Ok(SecondFactorMethod::Totp),
        "webauthn" => Ok(SecondFactorMethod::Webauthn),
        "duo" => Ok(SecondFactorMethod::Duo),
        _ => Err(ErrorResponse::new(
            ErrorResponseType::NotFound,
            "Unknown second factor method".to_string(),
        )),
    }
}

/// `POST /api/secondfactor/{method}/start` (§4.8). `{method}` is one of `totp`, `webauthn`,
/// `duo`; the request bodies below only disambiguate the route for `utoipa`, the actual
/// dispatch is on the path segment.
#[utoipa::path(
    post,
    path = "/api/secondfactor/{method}/start",
    tag = "portal",
    responses((status = 200, description = "Challenge issued", body = ChallengeResponse)),
)]
#[post("/secondfactor/{method}/start")]
pub async fn post_secondfactor_start(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ErrorResponse> {
    let method = parse_method(&path)?;
    let mut session = current_session(&req)?;
    let challenge = second_factor::initiate(&data, method, &mut session).await?;
    session.save(&data).await?;

    Ok(HttpResponse::Ok().json(ChallengeResponse {
        challenge_id: challenge.challenge_id,
        payload: challenge.payload,
    }))
}

#[post("/secondfactor/totp")]
pub async fn post_secondfactor_totp(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: Json<TotpVerifyRequest>,
) -> Result<HttpResponse, ErrorResponse> {
    let session = current_session(&req)?;
    let session = second_factor::verify(&data, &req, SecondFactorMethod::Totp, session, &body.code).await?;
    Ok(HttpResponse::Ok()
        .cookie(session.build_cookie(&data))
        .json(SessionStateResponse::from(&session)))
}

#[post("/secondfactor/webauthn")]
pub async fn post_secondfactor_webauthn(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: Json<WebauthnAuthFinishRequest>,
) -> Result<HttpResponse, ErrorResponse> {
    let session = current_session(&req)?;
    let assertion = body.assertion.to_string();
    let session =
        second_factor::verify(&data, &req, SecondFactorMethod::Webauthn, session, &assertion).await?;
    Ok(HttpResponse::Ok()
        .cookie(session.build_cookie(&data))
        .json(SessionStateResponse::from(&session)))
}

#[post("/secondfactor/duo")]
pub async fn post_secondfactor_duo(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: Json<DuoVerifyRequest>,
) -> Result<HttpResponse, ErrorResponse> {
    let session = current_session(&req)?;
    let session = second_factor::verify(&data, &req, SecondFactorMethod::Duo, session, &body.txid).await?;
    Ok(HttpResponse::Ok()
        .cookie(session.build_cookie(&data))
        .json(SessionStateResponse::from(&session)))
}

/// `GET /api/state` (§4.8): lets the portal frontend poll the current auth level and CSRF
/// token without performing a mutation.
#[get("/state")]
pub async fn get_state(req: HttpRequest) -> Result<HttpResponse, ErrorResponse> {
    let session = current_session(&req)?;
    Ok(HttpResponse::Ok().json(SessionStateResponse::from(&session)))
}

/// `POST /api/logout` (§4.8): destroys the session record and clears the cookie.
#[post("/logout")]
pub async fn post_logout(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ErrorResponse> {
    let session = current_session(&req)?;
    Session::destroy(&data, &session.id).await?;
    Ok(HttpResponse::Ok().cookie(Session::build_expired_cookie()).finish())
}

/// `POST /api/elevate/request` (§4.2): issues an elevation token for the current session's
/// username, delivered out-of-band.
#[post("/elevate/request")]
pub async fn post_elevate_request(
    data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ErrorResponse> {
    let session = current_session(&req)?;
    elevation::request_elevation(&data, &session).await?;
    Ok(HttpResponse::Ok().finish())
}

/// `POST /api/elevate/confirm` (§4.2): consumes the elevation token and, if it matches the
/// current session's username, grants elevation so `enroll`-style endpoints become reachable.
#[post("/elevate/confirm")]
pub async fn post_elevate_confirm(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: Json<ElevationConfirmRequest>,
) -> Result<HttpResponse, ErrorResponse> {
    let session = current_session(&req)?;
    let session = elevation::confirm_elevation(&data, session, &body.token).await?;
    Ok(HttpResponse::Ok()
        .cookie(session.build_cookie(&data))
        .json(SessionStateResponse::from(&session)))
}

#[post("/reset-password/request")]
pub async fn post_reset_password_request(
    data: web::Data<AppState>,
    body: Json<RequestResetRequest>,
) -> Result<HttpResponse, ErrorResponse> {
    password_reset::request_reset(&data, &body.email).await?;
    Ok(HttpResponse::Ok().finish())
}

#[post("/reset-password/confirm")]
pub async fn post_reset_password_confirm(
    data: web::Data<AppState>,
    body: Json<rauthy_models::request::PasswordResetRequest>,
) -> Result<HttpResponse, ErrorResponse> {
    password_reset::confirm_reset(&data, data.user_backend.as_ref(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}
