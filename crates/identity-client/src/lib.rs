//! Identity provider client for the Thrive app.
//!
//! This crate wraps the remote auth service behind the [`IdentityProvider`]
//! trait:
//! - password, OTP, OAuth, and native single-sign-on flows
//! - token refresh and authorization-code exchange
//! - profile-row access for the onboarding flag
//! - a push-style session-change subscription
//!
//! [`GoTrueClient`] is the concrete implementation against a
//! Supabase-compatible REST surface.

mod error;
mod gotrue;
mod provider;
mod types;

pub use error::{IdentityError, IdentityResult};
pub use gotrue::GoTrueClient;
pub use provider::{IdentityProvider, SessionChanges};
pub use types::{
    OtpDestination, OtpPurpose, Profile, Session, SessionUser, SignUpOutcome, SignUpRequest,
    NATIVE_PROVIDER_ID,
};
