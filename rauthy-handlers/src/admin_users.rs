use actix_web::{get, post, web, HttpResponse};
use actix_web_grants::proc_macro::has_roles;
use actix_web_validator::Json;
use rauthy_common::error_response::ErrorResponse;
use rauthy_models::app_state::AppState;
use rauthy_models::entity::users::User;
use rauthy_models::request::NewUserRequest;
use rauthy_models::response::UserResponse;

/// Returns all users.
///
/// **Permissions**
/// - rauthy_admin
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin_users",
    responses(
        (status = 200, description = "Ok", body = [UserResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
)]
#[get("/users")]
#[has_roles("rauthy_admin")]
pub async fn get_users(data: web::Data<AppState>) -> Result<HttpResponse, ErrorResponse> {
    let users = User::find_all(&data).await?;
    let res: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(HttpResponse::Ok().json(res))
}

/// Adds a new user record. The password is set separately, through first login plus a
/// password reset, or an identity-verification token (§4.6) — never accepted here.
///
/// **Permissions**
/// - rauthy_admin
#[utoipa::path(
    post,
    path = "/admin/users",
    tag = "admin_users",
    request_body = NewUserRequest,
    responses(
        (status = 200, description = "Ok", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
)]
#[post("/users")]
#[has_roles("rauthy_admin")]
pub async fn post_users(
    data: web::Data<AppState>,
    body: Json<NewUserRequest>,
) -> Result<HttpResponse, ErrorResponse> {
    let body = body.into_inner();
    let user = User::create_from_new(&data, body.username, body.email, body.display_name).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}
