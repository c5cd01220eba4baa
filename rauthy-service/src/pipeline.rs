use actix_web::{web, HttpRequest};
use rauthy_common::constants::{
    DEFAULT_POLICY, HEADER_FWD_FOR, HEADER_FWD_HOST, HEADER_FWD_METHOD, HEADER_FWD_PROTO,
    HEADER_FWD_URI, HEADER_ORIGINAL_URL, HEADER_REMOTE_EMAIL, HEADER_REMOTE_GROUPS,
    HEADER_REMOTE_NAME, HEADER_REMOTE_USER, PORTAL_URL,
};
use rauthy_common::error_response::ErrorResponse;
use rauthy_models::app_state::AppState;
use rauthy_models::entity::api_keys::{AccessGroup, AccessRights, ApiKeyEntity};
use rauthy_models::entity::rules::{evaluate, parse_policy, Fingerprint, RequiredLevel};
use rauthy_models::entity::sessions::{get_header_value, AuthLevel, Session};
use std::net::IpAddr;
use std::str::FromStr;
use tracing::debug;

/// Outcome of the verify pipeline (§4.7). Never mutates the session; a step-up verdict
/// sends the caller to the portal instead, carrying the URL the proxy was originally asked
/// for so the portal can redirect back to it after the missing factor is satisfied (§4.7
/// step 5, §6).
#[derive(Debug)]
pub enum Verdict {
    Allow { headers: Vec<(String, String)> },
    StepUp { required: AuthLevel, redirect_url: String },
    Denied,
}

/// `clear_cookie` is `true` only when the request carried a session cookie that was rejected
/// outright (malformed or bad signature, scenario 6) — the caller should clear it in the
/// response rather than leave the client replaying a cookie that will never validate.
pub struct VerifyResult {
    pub verdict: Verdict,
    pub clear_cookie: bool,
}

/// `GET/POST /api/verify`, the sub-request entrypoint reverse proxies call before forwarding
/// to the upstream. Loads the session from its cookie, derives the request fingerprint from
/// the proxy's forwarded headers, evaluates the compiled rule set, and renders a verdict.
///
/// A machine caller can skip the cookie entirely with `Authorization: ApiKey <name>$<secret>`,
/// validated against the `Rules`/`Read` access right — a second, narrower entrypoint alongside
/// the session-based one, not a replacement for it.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn verify(data: &web::Data<AppState>, req: &HttpRequest) -> Result<VerifyResult, ErrorResponse> {
    if let Some(token) = api_key_token(req) {
        let api_key = ApiKeyEntity::api_key_from_token_validated(data, token).await?;
        api_key.validate_access(&AccessGroup::Rules, &AccessRights::Read)?;
        return Ok(VerifyResult {
            verdict: Verdict::Allow { headers: Vec::new() },
            clear_cookie: false,
        });
    }

    let (session, clear_cookie) = Session::load_checked(data, req).await;
    let fp = fingerprint_from_request(req, &session);
    let redirect_url = original_request_url(&fp);

    let default_policy = parse_policy(DEFAULT_POLICY.as_str());
    let eval = evaluate(&data.rules, default_policy, &fp);

    debug!(
        "verify: host={} path={} session_level={:?} required={:?} would_have_matched={}",
        fp.host, fp.path, session.level, eval.required, eval.would_have_matched_at_higher_level
    );

    let verdict = match eval.required {
        RequiredLevel::Bypass => Verdict::Allow {
            headers: forward_headers(&session),
        },
        RequiredLevel::OneFactor if session.level >= AuthLevel::OneFactor => Verdict::Allow {
            headers: forward_headers(&session),
        },
        RequiredLevel::OneFactor => Verdict::StepUp {
            required: AuthLevel::OneFactor,
            redirect_url: redirect_url.clone(),
        },
        RequiredLevel::TwoFactor if session.level >= AuthLevel::TwoFactor => Verdict::Allow {
            headers: forward_headers(&session),
        },
        RequiredLevel::TwoFactor => Verdict::StepUp {
            required: AuthLevel::TwoFactor,
            redirect_url: redirect_url.clone(),
        },
        // A subject-gated rule further down the list was skipped only because the current
        // session lacks first factor — that is a step-up, not an outright deny (§4.1, §9).
        RequiredLevel::Denied
            if eval.would_have_matched_at_higher_level && session.level < AuthLevel::OneFactor =>
        {
            Verdict::StepUp {
                required: AuthLevel::OneFactor,
                redirect_url: redirect_url.clone(),
            }
        }
        RequiredLevel::Denied => Verdict::Denied,
    };

    Ok(VerifyResult { verdict, clear_cookie })
}

/// Reconstructs the absolute URL the proxy was originally asked for, preferring the proxy's
/// own `X-Original-URL`-style header when present and falling back to the forwarded
/// scheme/host/path/query fields otherwise.
fn original_request_url(fp: &Fingerprint) -> String {
    if let Some(original) = &fp.original_url {
        return original.clone();
    }
    if fp.query.is_empty() {
        format!("{}://{}{}", fp.scheme, fp.host, fp.path)
    } else {
        format!("{}://{}{}?{}", fp.scheme, fp.host, fp.path, fp.query)
    }
}

/// Builds the portal redirect target for a step-up response (§4.7 step 5, §6): the portal's
/// base URL with the original request URL echoed back in `rd` so the portal can send the
/// browser on after the missing factor is satisfied.
pub fn portal_redirect(redirect_url: &str) -> String {
    format!("{}/?rd={}", PORTAL_URL.trim_end_matches('/'), redirect_url)
}

fn api_key_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("ApiKey "))
}

fn fingerprint_from_request(req: &HttpRequest, session: &Session) -> Fingerprint {
    let method = get_header_value(req, &HEADER_FWD_METHOD)
        .unwrap_or("GET")
        .to_string();
    let host = get_header_value(req, &HEADER_FWD_HOST).unwrap_or_default().to_string();
    let scheme = get_header_value(req, &HEADER_FWD_PROTO)
        .unwrap_or("https")
        .to_string();
    let uri = get_header_value(req, &HEADER_FWD_URI).unwrap_or("/").to_string();
    let original_url = get_header_value(req, &HEADER_ORIGINAL_URL).map(|s| s.to_string());

    let client_ip = get_header_value(req, &HEADER_FWD_FOR)
        .and_then(|v| v.split(',').next())
        .and_then(|v| IpAddr::from_str(v.trim()).ok())
        .or_else(|| req.peer_addr().map(|a| a.ip()))
        .unwrap_or(IpAddr::from([0, 0, 0, 0]));

    let (path, query) = match uri.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (uri, String::new()),
    };

    Fingerprint {
        method,
        scheme,
        host,
        path,
        query,
        client_ip,
        original_url,
        username: None,
        groups: Vec::new(),
        oauth2_client: None,
        session_level: session.level,
    }
    .from_session(session)
}

/// Headers forwarded to the upstream on an `Allow` verdict, mirroring the identity headers
/// the teacher's reverse-proxy integration contract expects (§6, §9).
fn forward_headers(session: &Session) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    if let Some(username) = &session.username {
        headers.push((HEADER_REMOTE_USER.clone(), username.clone()));
    }
    if let Some(display_name) = &session.display_name {
        headers.push((HEADER_REMOTE_NAME.clone(), display_name.clone()));
    }
    if let Some(email) = session.emails.first() {
        headers.push((HEADER_REMOTE_EMAIL.clone(), email.clone()));
    }
    if !session.groups.is_empty() {
        headers.push((
            HEADER_REMOTE_GROUPS.clone(),
            session.groups.iter().cloned().collect::<Vec<_>>().join(","),
        ));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn api_key_token_requires_the_apikey_scheme() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "ApiKey my-key$supersecret"))
            .to_http_request();
        assert_eq!(api_key_token(&req), Some("my-key$supersecret"));

        let bearer = TestRequest::default()
            .insert_header(("Authorization", "Bearer sometoken"))
            .to_http_request();
        assert_eq!(api_key_token(&bearer), None);

        let none = TestRequest::default().to_http_request();
        assert_eq!(api_key_token(&none), None);
    }

    fn session_with(username: &str, groups: &[&str], level: AuthLevel) -> Session {
        let mut s = Session::new_anonymous();
        s.username = Some(username.to_string());
        s.display_name = Some("Jane Doe".to_string());
        s.emails = vec!["jane@example.com".to_string()];
        s.groups = groups.iter().map(|g| g.to_string()).collect();
        s.level = level;
        s
    }

    #[test]
    fn fingerprint_carries_identity_from_session_not_headers() {
        let req = TestRequest::default()
            .insert_header((HEADER_FWD_HOST.as_str(), "app.example.com"))
            .insert_header((HEADER_FWD_METHOD.as_str(), "GET"))
            .insert_header((HEADER_FWD_URI.as_str(), "/dashboard?x=1"))
            .to_http_request();
        let session = session_with("jane", &["admins"], AuthLevel::TwoFactor);

        let fp = fingerprint_from_request(&req, &session);

        assert_eq!(fp.host, "app.example.com");
        assert_eq!(fp.path, "/dashboard");
        assert_eq!(fp.query, "x=1");
        assert_eq!(fp.username.as_deref(), Some("jane"));
        assert_eq!(fp.groups, vec!["admins".to_string()]);
        assert_eq!(fp.session_level, AuthLevel::TwoFactor);
    }

    #[test]
    fn fingerprint_defaults_missing_headers() {
        let req = TestRequest::default().to_http_request();
        let session = Session::new_anonymous();

        let fp = fingerprint_from_request(&req, &session);

        assert_eq!(fp.method, "GET");
        assert_eq!(fp.scheme, "https");
        assert_eq!(fp.path, "/");
        assert!(fp.username.is_none());
    }

    #[test]
    fn forward_headers_empty_for_anonymous_session() {
        let session = Session::new_anonymous();
        assert!(forward_headers(&session).is_empty());
    }

    #[test]
    fn forward_headers_carries_identity_for_authenticated_session() {
        let session = session_with("jane", &["admins", "staff"], AuthLevel::OneFactor);
        let headers = forward_headers(&session);

        let find = |name: &str| headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());
        assert_eq!(find(HEADER_REMOTE_USER.as_str()), Some("jane".to_string()));
        assert_eq!(find(HEADER_REMOTE_NAME.as_str()), Some("Jane Doe".to_string()));
        assert_eq!(find(HEADER_REMOTE_EMAIL.as_str()), Some("jane@example.com".to_string()));
        assert_eq!(find(HEADER_REMOTE_GROUPS.as_str()), Some("admins,staff".to_string()));
    }
}
