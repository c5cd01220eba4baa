use lazy_static::lazy_static;
use std::env;
use std::str::FromStr;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_or_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

lazy_static! {
    // session / cookie
    pub static ref COOKIE_SESSION: String = env_or_string("COOKIE_SESSION", "rauthy-session");
    pub static ref COOKIE_MFA: String = env_or_string("COOKIE_MFA", "rauthy-mfa");
    pub static ref COOKIE_DOMAIN: Option<String> = env::var("COOKIE_DOMAIN").ok();
    pub static ref PWD_RESET_COOKIE: String = env_or_string("PWD_RESET_COOKIE", "rauthy-pwd-reset");
    pub static ref PWD_CSRF_HEADER: String = env_or_string("PWD_CSRF_HEADER", "x-csrf-token");

    pub static ref SESSION_LIFETIME_SEC: i64 = env_or("SESSION_LIFETIME", 14_400);
    pub static ref SESSION_IDLE_TIMEOUT_SEC: i64 = env_or("SESSION_TIMEOUT", 5_400);
    pub static ref SESSION_REMEMBER_ME_SEC: i64 = env_or("SESSION_REMEMBER_ME_LIFETIME", 2_592_000);
    pub static ref ELEVATION_TTL_SEC: i64 = env_or("ELEVATION_TTL", 300);

    // policy
    pub static ref DEFAULT_POLICY: String = env_or_string("DEFAULT_POLICY", "deny");

    // portal: base URL the step-up `401` redirects a browser to (§4.7 step 5, §6).
    pub static ref PORTAL_URL: String = env_or_string("PORTAL_URL", "https://auth.example.com");

    // regulator
    pub static ref REGULATOR_WINDOW_SEC: i64 = env_or("REGULATOR_WINDOW_SEC", 120);
    pub static ref REGULATOR_THRESHOLD: u32 = env_or("REGULATOR_THRESHOLD", 7);
    pub static ref REGULATOR_BAN_SEC: i64 = env_or("REGULATOR_BAN_SEC", 1_800);

    // totp
    pub static ref TOTP_PERIOD_SEC: u64 = env_or("TOTP_PERIOD_SEC", 30);
    pub static ref TOTP_DIGITS: u32 = env_or("TOTP_DIGITS", 6);

    // webauthn
    pub static ref WEBAUTHN_RP_ID: String = env_or_string("WEBAUTHN_RP_ID", "localhost");
    pub static ref WEBAUTHN_RP_ORIGIN: String =
        env_or_string("WEBAUTHN_RP_ORIGIN", "http://localhost:8080");
    pub static ref WEBAUTHN_REQ_EXP_SEC: i64 = env_or("WEBAUTHN_REQ_EXP_SEC", 90);

    // duo
    pub static ref DUO_IKEY: Option<String> = env::var("DUO_IKEY").ok();
    pub static ref DUO_HOST: Option<String> = env::var("DUO_HOST").ok();
    pub static ref DUO_POLL_TIMEOUT_SEC: u64 = env_or("DUO_POLL_TIMEOUT_SEC", 60);

    // reverse-proxy integration contract: fixed header names, must match proxy config
    pub static ref HEADER_FWD_METHOD: String = env_or_string("HEADER_FWD_METHOD", "X-Forwarded-Method");
    pub static ref HEADER_FWD_HOST: String = env_or_string("HEADER_FWD_HOST", "X-Forwarded-Host");
    pub static ref HEADER_FWD_URI: String = env_or_string("HEADER_FWD_URI", "X-Forwarded-Uri");
    pub static ref HEADER_FWD_PROTO: String = env_or_string("HEADER_FWD_PROTO", "X-Forwarded-Proto");
    pub static ref HEADER_FWD_FOR: String = env_or_string("HEADER_FWD_FOR", "X-Forwarded-For");
    pub static ref HEADER_ORIGINAL_URL: String = env_or_string("HEADER_ORIGINAL_URL", "X-Original-URL");

    pub static ref HEADER_REMOTE_USER: String = env_or_string("HEADER_REMOTE_USER", "Remote-User");
    pub static ref HEADER_REMOTE_NAME: String = env_or_string("HEADER_REMOTE_NAME", "Remote-Name");
    pub static ref HEADER_REMOTE_EMAIL: String = env_or_string("HEADER_REMOTE_EMAIL", "Remote-Email");
    pub static ref HEADER_REMOTE_GROUPS: String = env_or_string("HEADER_REMOTE_GROUPS", "Remote-Groups");

    pub static ref APP_ID_HEADER: String = env_or_string("APP_ID_HEADER", "rauthy-app-id");
    pub static ref HEADER_HTML: (String, String) =
        ("content-type".to_string(), "text/html; charset=utf-8".to_string());

    pub static ref DEV_MODE: bool = env_or("DEV_MODE", false);
    pub static ref ADMIN_FORCE_MFA: bool = env_or("ADMIN_FORCE_MFA", true);
}

pub const API_KEY_LENGTH: usize = 64;
pub const CACHE_NAME_12HR: &str = "12hr";
pub const CACHE_NAME_SESSION: &str = "session";
pub const CACHE_NAME_REGULATOR: &str = "regulator";

pub const IDX_JWKS: &str = "jwks_all";
pub const IDX_JWK_KID: &str = "jwk_kid";
pub const IDX_JWK_LATEST: &str = "jwk_latest";

pub const OPEN_USER_REG: bool = false;
pub const USER_REG_DOMAIN_RESTRICTION: Option<&str> = None;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Sqlite,
    Postgres,
}

lazy_static! {
    pub static ref DB_TYPE: DbType = {
        match env::var("DATABASE_URL") {
            Ok(url) if url.starts_with("postgres") => DbType::Postgres,
            _ => DbType::Sqlite,
        }
    };
}
