use actix_web::dev::ServiceRequest;
use actix_web::{web, Error, HttpMessage};
use rauthy_models::app_state::AppState;
use rauthy_models::entity::sessions::Session;

/// Role/permission extractor for `actix-web-grants`, wrapped around the whole app (§9's
/// "pipeline never branches on identity" carried into the handler layer: this is the only
/// place a request's session is loaded and its groups turned into grant strings). Stashes
/// the loaded `Session` into the request's extensions so handlers can pull it back out via
/// `web::ReqData<Session>` instead of reloading it.
pub async fn extract_session_roles(req: &ServiceRequest) -> Result<Vec<String>, Error> {
    let Some(data) = req.app_data::<web::Data<AppState>>().cloned() else {
        return Ok(Vec::new());
    };

    let session = Session::load(&data, req.request()).await;
    let roles: Vec<String> = session.groups.iter().cloned().collect();
    req.extensions_mut().insert(session);

    Ok(roles)
}

/// Pulls the session stashed by [`extract_session_roles`] back out of the request.
/// Always present by the time a handler runs: the extractor installs it unconditionally,
/// defaulting to an anonymous session when no cookie is present.
pub fn session_from_req(req: &actix_web::HttpRequest) -> Option<Session> {
    req.extensions().get::<Session>().cloned()
}
