use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct FirstFactorRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TotpVerifyRequest {
    #[validate(length(equal = 6))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WebauthnAuthStartRequest {}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebauthnAuthFinishRequest {
    pub assertion: serde_json::Value,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DuoVerifyRequest {
    pub txid: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RequestResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    pub token: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
    pub mfa_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ElevationConfirmRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct NewUserRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub display_name: String,
}
