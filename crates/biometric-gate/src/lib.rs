//! Biometric gate for the Thrive client.
//!
//! Device biometrics (fingerprint / face unlock) are used only to release a
//! locally stored refresh token, never to authenticate directly with the
//! identity provider. The platform prompt itself sits behind the
//! [`BiometricGate`] trait; hosts supply the OS implementation.

mod error;

pub use error::{BiometricError, BiometricResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a device capability probe.
///
/// Both predicates are required for the gate to be usable; availability is
/// re-checked on every app start, never cached across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricAvailability {
    /// Biometric hardware exists on this device.
    pub hardware_present: bool,
    /// At least one biometric (fingerprint, face) is enrolled.
    pub enrolled: bool,
}

impl BiometricAvailability {
    /// Hardware present and enrolled.
    pub fn is_available(&self) -> bool {
        self.hardware_present && self.enrolled
    }

    /// A device with no usable biometrics.
    pub fn unavailable() -> Self {
        Self {
            hardware_present: false,
            enrolled: false,
        }
    }
}

/// Platform biometric hardware query and interactive prompt.
#[async_trait]
pub trait BiometricGate: Send + Sync {
    /// Probe hardware presence and enrollment.
    async fn availability(&self) -> BiometricResult<BiometricAvailability>;

    /// Run an interactive biometric prompt with the given reason string.
    /// Resolves Ok(()) only on a fresh successful confirmation.
    async fn authenticate(&self, reason: &str) -> BiometricResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_requires_both_predicates() {
        let both = BiometricAvailability {
            hardware_present: true,
            enrolled: true,
        };
        assert!(both.is_available());

        let hardware_only = BiometricAvailability {
            hardware_present: true,
            enrolled: false,
        };
        assert!(!hardware_only.is_available());

        let enrolled_only = BiometricAvailability {
            hardware_present: false,
            enrolled: true,
        };
        assert!(!enrolled_only.is_available());

        assert!(!BiometricAvailability::unavailable().is_available());
    }
}
