pub mod api_keys;
pub mod auth_log;
pub mod ident_token;
pub mod jwk;
pub mod regulator;
pub mod rules;
pub mod sessions;
pub mod user_backend;
pub mod users;
pub mod well_known;
