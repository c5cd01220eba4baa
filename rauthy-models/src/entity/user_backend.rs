use async_trait::async_trait;
use rauthy_common::error_response::{ErrorResponse, ErrorResponseType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetails {
    pub display_name: String,
    pub emails: Vec<String>,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialCheckDetails {
    pub locked: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<BackendError> for ErrorResponse {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::NotFound => {
                ErrorResponse::new(ErrorResponseType::AuthFailed, "Invalid credentials".to_string())
            }
            BackendError::InvalidCredentials => {
                ErrorResponse::new(ErrorResponseType::AuthFailed, "Invalid credentials".to_string())
            }
            BackendError::Unavailable(msg) => {
                ErrorResponse::new(ErrorResponseType::Unavailable, msg)
            }
        }
    }
}

/// Capability set a pluggable user directory (LDAP, file-based) must provide (§4.3). The
/// pipeline never caches credentials across requests; it may cache `UserDetails` on the
/// session record.
#[async_trait]
pub trait UserBackend: Send + Sync {
    async fn check_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<CredentialCheckDetails, BackendError>;

    async fn get_details(&self, username: &str) -> Result<UserDetails, BackendError>;

    async fn update_password(&self, username: &str, new_password: &str) -> Result<(), BackendError>;
}
