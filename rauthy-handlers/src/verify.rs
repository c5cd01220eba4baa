use actix_web::{get, post, web, HttpRequest, HttpResponse};
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_models::app_state::AppState;
use rauthy_models::entity::sessions::Session;
use rauthy_service::pipeline::{self, portal_redirect, Verdict, VerifyResult};

/// Sub-request entrypoint a reverse proxy calls before forwarding to the upstream (§4.7,
/// §6). Renders `200` with identity headers on `Allow`, `401` with a portal redirect on
/// step-up, `403` on deny.
#[utoipa::path(
    get,
    path = "/api/verify",
    tag = "verify",
    responses(
        (status = 200, description = "Request is authorized"),
        (status = 401, description = "Step-up required"),
        (status = 403, description = "Denied"),
    ),
)]
#[get("/verify")]
pub async fn get_verify(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ErrorResponse> {
    render_verdict(pipeline::verify(&data, &req).await?)
}

#[post("/verify")]
pub async fn post_verify(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ErrorResponse> {
    render_verdict(pipeline::verify(&data, &req).await?)
}

fn render_verdict(result: VerifyResult) -> Result<HttpResponse, ErrorResponse> {
    let mut response = match result.verdict {
        Verdict::Allow { headers } => {
            let mut builder = HttpResponse::Ok();
            for (name, value) in headers {
                builder.insert_header((name, value));
            }
            builder.finish()
        }
        Verdict::StepUp { required, redirect_url } => {
            let location = portal_redirect(&redirect_url);
            HttpResponse::Unauthorized()
                .insert_header(("Location", location.clone()))
                .json(serde_json::json!({
                    "required_level": required,
                    "rd": location,
                }))
        }
        Verdict::Denied => HttpResponse::Forbidden().finish(),
    };

    // scenario 6: a rejected (tampered/malformed) session cookie must not be echoed back.
    if result.clear_cookie {
        response
            .add_cookie(&Session::build_expired_cookie())
            .map_err(|e| ErrorResponse::new(ErrorResponseType::Internal, e.to_string()))?;
    }

    Ok(response)
}
