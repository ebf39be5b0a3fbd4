//! Storage key constants.

/// Storage keys used by the session lifecycle
pub struct StorageKeys;

impl StorageKeys {
    /// Serialized session blob (persistent KV)
    pub const SESSION: &'static str = "session";

    /// Onboarding completion flag, "true"/"false" (persistent KV)
    pub const ONBOARDING_COMPLETE: &'static str = "onboarding-complete";

    /// Biometric fast-login enabled flag, "true"/"false" (persistent KV)
    pub const BIOMETRIC_ENABLED: &'static str = "biometric-enabled";

    /// Refresh token released by the biometric gate (secure store)
    pub const BIOMETRIC_REFRESH_TOKEN: &'static str = "biometric-refresh-token";

    /// Web-system access token, best-effort only (secure store)
    pub const WEB_SYSTEM_ACCESS_TOKEN: &'static str = "secondary-system-access-token";
}
