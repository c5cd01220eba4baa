use crate::entity::sessions::{AuthLevel, Session};
use crate::entity::users::User;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub email_verified: bool,
    pub groups: Vec<String>,
    pub webauthn_enabled: bool,
    pub totp_enabled: bool,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        let groups = u.groups_vec();
        Self {
            id: u.id,
            username: u.username,
            display_name: u.display_name,
            email: u.email,
            email_verified: u.email_verified,
            groups,
            webauthn_enabled: u.webauthn_enabled,
            totp_enabled: u.totp_enabled,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStateResponse {
    pub level: AuthLevel,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub groups: Vec<String>,
    pub csrf_token: String,
}

impl From<&Session> for SessionStateResponse {
    fn from(s: &Session) -> Self {
        Self {
            level: s.level,
            username: s.username.clone(),
            display_name: s.display_name.clone(),
            groups: s.groups.iter().cloned().collect(),
            csrf_token: s.csrf_token.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FirstFactorResponse {
    pub level: AuthLevel,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub payload: serde_json::Value,
}
