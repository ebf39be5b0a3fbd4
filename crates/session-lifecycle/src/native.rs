//! Platform-native single-sign-on seam.

use crate::{LifecycleError, LifecycleResult};
use async_trait::async_trait;

/// Identity token obtained from the platform's native sign-in dialog.
#[derive(Debug, Clone)]
pub struct NativeCredentials {
    /// Platform-issued identity token (JWT).
    pub id_token: String,
    /// Nonce used when requesting the token, if the platform provides one.
    pub nonce: Option<String>,
}

/// Device-integrated identity dialog (e.g. Sign in with Apple).
///
/// Produces an identity token the provider exchanges in-process; no browser
/// redirect is involved.
#[async_trait]
pub trait NativeSignIn: Send + Sync {
    /// Run the platform dialog and return its identity token.
    async fn acquire_credentials(&self) -> LifecycleResult<NativeCredentials>;
}

/// Host without device-integrated identity.
pub struct UnsupportedNativeSignIn;

#[async_trait]
impl NativeSignIn for UnsupportedNativeSignIn {
    async fn acquire_credentials(&self) -> LifecycleResult<NativeCredentials> {
        Err(LifecycleError::NativeSignIn(
            "native sign-in is not supported on this host".to_string(),
        ))
    }
}
