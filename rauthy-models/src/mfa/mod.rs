pub mod duo;
pub mod totp;
pub mod webauthn;

use crate::entity::sessions::Session;
use rauthy_common::error_response::ErrorResponse;
use serde::{Deserialize, Serialize};

/// Uniform outcome of an MFA `Verify` call (§4.4). Distinct from `ErrorResponse` because a
/// verifier's own 3-way outcome, not a transport-level failure, drives the regulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Accepted,
    Rejected,
    RateLimited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    pub payload: serde_json::Value,
}

/// Capability set every MFA verifier exposes (§4.4, §9). `enroll` is optional — verifiers
/// without an enrolment step (Duo) implement it as a no-op error.
#[async_trait::async_trait]
pub trait MfaVerifier: Send + Sync {
    /// Requires elevation; mutates the session's per-method challenge context only through
    /// the narrow `Session` argument, never via a back-pointer into the session store.
    async fn enroll(&self, username: &str, session: &mut Session) -> Result<Challenge, ErrorResponse>;

    async fn initiate(&self, username: &str, session: &mut Session) -> Result<Challenge, ErrorResponse>;

    async fn verify(
        &self,
        username: &str,
        session: &mut Session,
        response: &str,
    ) -> Result<VerifyOutcome, ErrorResponse>;
}
