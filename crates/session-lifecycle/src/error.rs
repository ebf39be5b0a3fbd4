//! Session lifecycle error types.

use thiserror::Error;

/// Session lifecycle error type.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// No active session for an operation that requires one
    #[error("No active session")]
    NoSession,

    /// Biometric hardware or enrollment is unavailable
    #[error("Biometric authentication is not available: {0}")]
    BiometricsUnavailable(String),

    /// The in-app browser session could not be started
    #[error("In-app browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// No browser could be launched at all
    #[error("Failed to open browser: {0}")]
    BrowserLaunch(String),

    /// Platform-native sign-in could not produce an identity token
    #[error("Native sign-in failed: {0}")]
    NativeSignIn(String),

    /// Configuration or path error
    #[error(transparent)]
    Core(#[from] app_config::CoreError),

    /// Identity provider error
    #[error(transparent)]
    Identity(#[from] identity_client::IdentityError),

    /// Local storage error
    #[error(transparent)]
    Storage(#[from] client_storage::StorageError),

    /// Biometric prompt error
    #[error(transparent)]
    Biometric(#[from] biometric_gate::BiometricError),
}

/// Result type alias using LifecycleError.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
