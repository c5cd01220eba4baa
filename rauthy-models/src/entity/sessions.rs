use crate::app_state::AppState;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpRequest};
use rauthy_common::constants::{
    CACHE_NAME_SESSION, COOKIE_DOMAIN, COOKIE_SESSION, ELEVATION_TTL_SEC,
    SESSION_IDLE_TIMEOUT_SEC, SESSION_LIFETIME_SEC, SESSION_REMEMBER_ME_SEC,
};
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use rauthy_common::utils::{base64_url_encode, constant_time_eq, get_rand, get_rand_bytes};
use redhac::{cache_del, cache_get, cache_get_from, cache_get_value, cache_put};
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// `Anonymous < OneFactor < TwoFactor`. All comparisons in the core are over this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema)]
pub enum AuthLevel {
    Anonymous,
    OneFactor,
    TwoFactor,
}

impl Default for AuthLevel {
    fn default() -> Self {
        Self::Anonymous
    }
}

/// Per-session TOTP / WebAuthn challenge material, cleared on successful second-factor
/// verification or whenever a new challenge is issued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MfaContext {
    /// Anti-replay nonce bound to the currently outstanding TOTP challenge, if any.
    pub totp_nonce: Option<String>,
    /// Base64url-encoded WebAuthn challenge bytes the client's assertion must echo back.
    pub webauthn_challenge: Option<String>,
}

/// A session-scoped, time-bounded capability obtained via an identity-verification token,
/// independent from `AuthLevel`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Elevation {
    pub granted_at: Option<i64>,
    pub expires_at: Option<i64>,
}

impl Elevation {
    pub fn is_active(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if exp > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub groups: BTreeSet<String>,
    pub emails: Vec<String>,
    pub level: AuthLevel,
    pub first_factor_ts: Option<i64>,
    pub second_factor_ts: Option<i64>,
    pub last_activity: i64,
    pub expires: i64,
    pub redirect_url: Option<String>,
    pub elevation: Elevation,
    pub csrf_token: String,
    pub mfa: MfaContext,
    pub remember_me: bool,
}

impl Session {
    /// Creates a brand new anonymous session with a fresh 256-bit identifier.
    pub fn new_anonymous() -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            id: new_session_id(),
            username: None,
            display_name: None,
            groups: BTreeSet::new(),
            emails: Vec::new(),
            level: AuthLevel::Anonymous,
            first_factor_ts: None,
            second_factor_ts: None,
            last_activity: now,
            expires: now + *SESSION_LIFETIME_SEC,
            redirect_url: None,
            elevation: Elevation::default(),
            csrf_token: get_rand(32),
            mfa: MfaContext::default(),
            remember_me: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.level >= AuthLevel::OneFactor
    }

    /// §8 invariant: `level ≥ OneFactor ⇒ username non-empty and first_factor_ts set`;
    /// `level = TwoFactor ⇒ second_factor_ts set and ≥ first_factor_ts`; `last_activity ≤ expires`.
    pub fn check_invariants(&self) -> Result<(), ErrorResponse> {
        if self.level >= AuthLevel::OneFactor {
            if self.username.as_deref().unwrap_or("").is_empty() {
                return Err(ErrorResponse::new(
                    ErrorResponseType::Internal,
                    "session invariant violated: authenticated session without username"
                        .to_string(),
                ));
            }
            if self.first_factor_ts.is_none() {
                return Err(ErrorResponse::new(
                    ErrorResponseType::Internal,
                    "session invariant violated: missing first_factor_ts".to_string(),
                ));
            }
        }
        if self.level == AuthLevel::TwoFactor {
            match (self.second_factor_ts, self.first_factor_ts) {
                (Some(second), Some(first)) if second >= first => {}
                _ => {
                    return Err(ErrorResponse::new(
                        ErrorResponseType::Internal,
                        "session invariant violated: second_factor_ts missing or out of order"
                            .to_string(),
                    ))
                }
            }
        }
        if self.last_activity > self.expires {
            return Err(ErrorResponse::new(
                ErrorResponseType::Internal,
                "session invariant violated: last_activity after expiry".to_string(),
            ));
        }
        Ok(())
    }
}

fn new_session_id() -> String {
    base64_url_encode(&get_rand_bytes(32))
}

fn cache_idx(id: &str) -> String {
    format!("session_{}", id)
}

fn sign(hmac_key: &[u8], id: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, hmac_key);
    let tag = hmac::sign(&key, id.as_bytes());
    base64_url_encode(tag.as_ref())
}

fn verify_signature(hmac_key: &[u8], id: &str, sig: &str) -> bool {
    let expected = sign(hmac_key, id);
    constant_time_eq(expected.as_bytes(), sig.as_bytes())
}

impl Session {
    /// `Load(cookie) → SessionRecord | Anonymous`. Thin wrapper over [`Session::load_checked`]
    /// for callers that don't need to distinguish "no cookie" from "rejected cookie".
    pub async fn load(data: &web::Data<AppState>, req: &HttpRequest) -> Session {
        Self::load_checked(data, req).await.0
    }

    /// Validates the cookie's HMAC signature, looks up the record, checks `expires` and the
    /// idle timeout. Any failure mode (bad signature, decode error, unknown id, expired
    /// record) yields Anonymous without surfacing an error to the caller. The returned `bool`
    /// is `true` only when a cookie was present but rejected (malformed or bad signature) —
    /// scenario 6's tamper path — so the caller can clear it in the response; a request with
    /// no cookie at all is legitimately anonymous and the flag is `false`.
    pub async fn load_checked(data: &web::Data<AppState>, req: &HttpRequest) -> (Session, bool) {
        let Some(cookie) = req.cookie(&COOKIE_SESSION) else {
            return (Session::new_anonymous(), false);
        };

        let Some((id, sig)) = cookie.value().split_once('.') else {
            warn!("malformed session cookie");
            return (Session::new_anonymous(), true);
        };

        if !verify_signature(&data.session_hmac_key, id, sig) {
            warn!("session cookie signature mismatch, treating as anonymous");
            return (Session::new_anonymous(), true);
        }

        let session = match Self::find_by_id(data, id).await {
            Ok(Some(s)) => s,
            Ok(None) => return (Session::new_anonymous(), true),
            Err(err) => {
                warn!("session lookup failed: {:?}", err);
                return (Session::new_anonymous(), false);
            }
        };

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if session.expires < now {
            debug!("session {} past absolute expiry, destroying", session.id);
            let _ = Session::destroy(data, &session.id).await;
            return (Session::new_anonymous(), false);
        }
        if !session.remember_me && session.last_activity + *SESSION_IDLE_TIMEOUT_SEC < now {
            debug!("session {} idle timeout exceeded, destroying", session.id);
            let _ = Session::destroy(data, &session.id).await;
            return (Session::new_anonymous(), false);
        }

        (session, false)
    }

    async fn find_by_id(
        data: &web::Data<AppState>,
        id: &str,
    ) -> Result<Option<Session>, ErrorResponse> {
        let idx = cache_idx(id);
        if let Some(cached) = cache_get!(
            Session,
            CACHE_NAME_SESSION.to_string(),
            idx.clone(),
            &data.caches.ha_cache_config,
            false
        )
        .await?
        {
            return Ok(Some(cached));
        }

        let row = sqlx::query!(
            "SELECT data FROM sessions WHERE id = $1",
            id
        )
        .fetch_optional(&data.db)
        .await?;

        match row {
            Some(r) => {
                let session: Session = serde_json::from_str(&r.data)?;
                cache_put(
                    CACHE_NAME_SESSION.to_string(),
                    idx,
                    &data.caches.ha_cache_config,
                    &session,
                )
                .await?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// `Save(record)`: atomic upsert.
    pub async fn save(&self, data: &web::Data<AppState>) -> Result<(), ErrorResponse> {
        self.check_invariants()?;
        let json = serde_json::to_string(self)?;

        sqlx::query!(
            r#"INSERT INTO sessions (id, data, expires)
            VALUES ($1, $2, $3)
            ON CONFLICT(id) DO UPDATE SET data = $2, expires = $3"#,
            self.id,
            json,
            self.expires,
        )
        .execute(&data.db)
        .await?;

        cache_put(
            CACHE_NAME_SESSION.to_string(),
            cache_idx(&self.id),
            &data.caches.ha_cache_config,
            self,
        )
        .await?;

        Ok(())
    }

    /// `Regenerate(record) → new identifier`. Issues a new identifier, copies fields,
    /// invalidates the old one. Called at every authentication level transition and on
    /// explicit elevate/de-elevate, so any parallel request still holding the old id
    /// downgrades to Anonymous on its next `Load` (§5 optimistic-concurrency model).
    pub async fn regenerate(
        mut self,
        data: &web::Data<AppState>,
    ) -> Result<Session, ErrorResponse> {
        let old_id = self.id.clone();
        self.id = new_session_id();
        self.save(data).await?;
        Session::destroy(data, &old_id).await?;
        Ok(self)
    }

    pub async fn destroy(data: &web::Data<AppState>, id: &str) -> Result<(), ErrorResponse> {
        sqlx::query!("DELETE FROM sessions WHERE id = $1", id)
            .execute(&data.db)
            .await?;
        cache_del(
            CACHE_NAME_SESSION.to_string(),
            cache_idx(id),
            &data.caches.ha_cache_config,
        )
        .await?;
        Ok(())
    }

    /// Builds the signed `Set-Cookie` header value for this session's identifier.
    pub fn build_cookie<'a>(&self, data: &web::Data<AppState>) -> Cookie<'a> {
        let sig = sign(&data.session_hmac_key, &self.id);
        let value = format!("{}.{}", self.id, sig);
        let max_age_secs = self.expires - OffsetDateTime::now_utc().unix_timestamp();

        let mut builder = Cookie::build(COOKIE_SESSION.clone(), value)
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age_secs.max(0)));
        if let Some(domain) = COOKIE_DOMAIN.clone() {
            builder = builder.domain(domain);
        }
        builder.finish()
    }

    /// Clears the session cookie in the response, used when a tamper attempt is detected.
    pub fn build_expired_cookie<'a>() -> Cookie<'a> {
        Cookie::build(COOKIE_SESSION.clone(), "")
            .path("/")
            .max_age(time::Duration::ZERO)
            .finish()
    }

    /// Grants elevation for `ELEVATION_TTL_SEC`, called only by the identity-verification
    /// token service, never by the first/second-factor endpoints.
    pub fn grant_elevation(&mut self) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.elevation = Elevation {
            granted_at: Some(now),
            expires_at: Some(now + *ELEVATION_TTL_SEC),
        };
    }

    pub fn is_elevated(&self) -> bool {
        self.elevation
            .is_active(OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn touch(&mut self) {
        self.last_activity = OffsetDateTime::now_utc().unix_timestamp();
    }

    pub fn set_remember_me(&mut self) {
        self.remember_me = true;
        self.expires = OffsetDateTime::now_utc().unix_timestamp() + *SESSION_REMEMBER_ME_SEC;
    }

    pub fn extract_validate_csrf(&self, req: &HttpRequest) -> Result<(), ErrorResponse> {
        let header = req
            .headers()
            .get("x-csrf-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if constant_time_eq(header.as_bytes(), self.csrf_token.as_bytes()) {
            Ok(())
        } else {
            Err(ErrorResponse::new(
                ErrorResponseType::Unauthorized,
                "Invalid CSRF token".to_string(),
            ))
        }
    }
}

/// Reads a reverse-proxy supplied header, trimming surrounding whitespace. Missing headers
/// yield `None` so callers can apply their own wildcard/default semantics.
pub fn get_header_value<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_anonymous_session_is_anonymous() {
        let s = Session::new_anonymous();
        assert_eq!(s.level, AuthLevel::Anonymous);
        assert!(!s.is_authenticated());
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn level_ordering() {
        assert!(AuthLevel::Anonymous < AuthLevel::OneFactor);
        assert!(AuthLevel::OneFactor < AuthLevel::TwoFactor);
    }

    #[test]
    fn invariant_rejects_authenticated_session_without_username() {
        let mut s = Session::new_anonymous();
        s.level = AuthLevel::OneFactor;
        assert!(s.check_invariants().is_err());
    }

    #[test]
    fn invariant_rejects_two_factor_before_one_factor_ts() {
        let mut s = Session::new_anonymous();
        s.username = Some("alice".to_string());
        s.level = AuthLevel::TwoFactor;
        s.first_factor_ts = Some(200);
        s.second_factor_ts = Some(100);
        assert!(s.check_invariants().is_err());
    }

    #[test]
    fn signature_round_trips() {
        let key = get_rand_bytes(32);
        let sig = sign(&key, "abc123");
        assert!(verify_signature(&key, "abc123", &sig));
        assert!(!verify_signature(&key, "abc124", &sig));
    }
}
