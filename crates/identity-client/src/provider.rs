//! The identity provider seam.

use crate::{
    IdentityResult, OtpDestination, Profile, Session, SignUpOutcome, SignUpRequest,
};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Receiver side of the provider's push-style session-change subscription.
///
/// Every provider-side change is pushed, including silent background
/// refreshes; `None` means the provider no longer holds a session. The
/// subscription is the source of truth for "is the session currently
/// valid", not an event to be ignored once local state agrees.
pub type SessionChanges = broadcast::Receiver<Option<Session>>;

/// Remote auth service operations consumed by the session lifecycle.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Password sign-in.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<Session>;

    /// Sign-up with a redirect URL for email confirmation.
    async fn sign_up(&self, request: &SignUpRequest) -> IdentityResult<SignUpOutcome>;

    /// Revoke the current session server-side.
    async fn sign_out(&self, access_token: &str) -> IdentityResult<()>;

    /// Dispatch a password-reset email. Also carries the 6-digit email OTP
    /// flow; correct code delivery depends on provider-side template
    /// configuration.
    async fn send_password_reset(&self, email: &str, redirect_to: Option<&str>)
        -> IdentityResult<()>;

    /// Re-send the sign-up verification email.
    async fn resend_signup_verification(&self, email: &str) -> IdentityResult<()>;

    /// Dispatch an OTP over the SMS channel.
    async fn send_sms_otp(&self, phone: &str) -> IdentityResult<()>;

    /// Verify an OTP. `verification_type` uses the provider vocabulary
    /// (`email`, `sms`, `signup`, `recovery`). Returns the session when the
    /// provider issues one with the verification.
    async fn verify_otp(
        &self,
        destination: &OtpDestination,
        token: &str,
        verification_type: &str,
    ) -> IdentityResult<Option<Session>>;

    /// Update the authenticated user's password.
    async fn update_password(&self, access_token: &str, new_password: &str) -> IdentityResult<()>;

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> IdentityResult<Session>;

    /// Exchange an OAuth authorization code for a session.
    async fn exchange_code(&self, code: &str) -> IdentityResult<Session>;

    /// Build the browser authorization URL for a redirect provider.
    fn authorize_url(&self, provider: &str, redirect_to: &str) -> String;

    /// Native single-sign-on: exchange a platform-issued identity token for
    /// a session, in-process.
    async fn sign_in_with_id_token(
        &self,
        provider: &str,
        id_token: &str,
        nonce: Option<&str>,
    ) -> IdentityResult<Session>;

    /// Read the onboarding flag from the user's profile record.
    /// Returns `None` when no profile row exists.
    async fn fetch_onboarding_complete(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> IdentityResult<Option<bool>>;

    /// Create the profile row for a new user.
    async fn create_profile(
        &self,
        user_id: &str,
        access_token: &str,
        onboarding_completed: bool,
    ) -> IdentityResult<()>;

    /// Write the full onboarding profile, atomically flipping
    /// `onboarding_completed` to true in the same request.
    async fn update_profile(
        &self,
        user_id: &str,
        access_token: &str,
        profile: &Profile,
    ) -> IdentityResult<()>;

    /// Subscribe to provider-side session changes.
    fn subscribe_session_changes(&self) -> SessionChanges;
}
