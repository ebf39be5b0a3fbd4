//! Derived authentication status.

use serde::{Deserialize, Serialize};

/// The single authoritative status consumed by application UI.
///
/// Never stored and never set directly: always recomputed from the three
/// inputs via [`resolve_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthStatus {
    /// Startup restore is still in flight.
    Loading,
    /// No session.
    SignedOut,
    /// Session exists but onboarding has not been completed.
    Onboarding,
    /// Session exists and onboarding is complete.
    SignedIn,
}

/// Pure projection of `(session, onboarding_complete, is_initializing)`
/// onto [`AuthStatus`].
///
/// Initialization dominates everything else; without a session the
/// onboarding flag is irrelevant.
pub fn resolve_status(
    has_session: bool,
    onboarding_complete: bool,
    is_initializing: bool,
) -> AuthStatus {
    if is_initializing {
        return AuthStatus::Loading;
    }
    if !has_session {
        return AuthStatus::SignedOut;
    }
    if !onboarding_complete {
        return AuthStatus::Onboarding;
    }
    AuthStatus::SignedIn
}
