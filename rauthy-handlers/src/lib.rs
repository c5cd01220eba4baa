pub mod admin_users;
pub mod middleware;
pub mod portal;
pub mod verify;

use actix_web::web;

/// Route wiring shared by the binary crate's `main.rs`, mirroring the teacher's scoped
/// `web::scope` layout (`/api`, `/admin`).
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(verify::get_verify)
            .service(verify::post_verify)
            .service(portal::post_firstfactor)
            .service(portal::post_secondfactor_start)
            .service(portal::post_secondfactor_totp)
            .service(portal::post_secondfactor_webauthn)
            .service(portal::post_secondfactor_duo)
            .service(portal::get_state)
            .service(portal::post_logout)
            .service(portal::post_elevate_request)
            .service(portal::post_elevate_confirm)
            .service(portal::post_reset_password_request)
            .service(portal::post_reset_password_confirm),
    );

    cfg.service(
        web::scope("/admin")
            .service(admin_users::get_users)
            .service(admin_users::post_users),
    );
}
