//! Biometric gate error types.

use thiserror::Error;

/// Biometric gate error type.
#[derive(Error, Debug)]
pub enum BiometricError {
    /// No biometric hardware on this device
    #[error("Biometric hardware not available")]
    HardwareUnavailable,

    /// Hardware exists but nothing is enrolled
    #[error("No biometrics enrolled on this device")]
    NotEnrolled,

    /// The user cancelled or failed the interactive prompt
    #[error("Biometric authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Platform-specific error
    #[error("Platform biometric error: {0}")]
    Platform(String),
}

/// Result type alias using BiometricError.
pub type BiometricResult<T> = Result<T, BiometricError>;
