//! Auth data types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider id of the platform-native identity (in-process token exchange
/// instead of a browser redirect).
pub const NATIVE_PROVIDER_ID: &str = "apple";

/// User identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// User ID from the identity provider
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Opaque credential bundle issued by the identity provider.
///
/// Replaced wholesale on every refresh, never mutated field-by-field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Short-lived access token (JWT)
    pub access_token: String,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// When the access token expires (RFC 3339)
    pub expires_at: String,
    /// The authenticated subject
    pub user: SessionUser,
}

impl Session {
    /// Whether the access token has passed its expiry.
    ///
    /// An unparseable expiry counts as expired: better a spurious refresh
    /// than trusting a token of unknown age.
    pub fn is_expired(&self) -> bool {
        match DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(expires_at) => expires_at <= Utc::now(),
            Err(_) => true,
        }
    }
}

/// Sign-up request parameters.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
    /// Redirect URL for the email confirmation link
    pub redirect_url: String,
}

/// Outcome of a sign-up call.
///
/// `session` is None when the provider requires email verification before
/// issuing tokens.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub session: Option<Session>,
    pub user_id: Option<String>,
}

/// Where a one-time password is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpDestination {
    Email(String),
    Phone(String),
}

impl OtpDestination {
    /// The raw address or number.
    pub fn value(&self) -> &str {
        match self {
            OtpDestination::Email(email) => email,
            OtpDestination::Phone(phone) => phone,
        }
    }
}

/// Application-level OTP purpose, mapped onto the provider's
/// verification-type vocabulary at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Email,
    Sms,
    Signup,
    Reset,
}

impl OtpPurpose {
    /// Map to the provider's verification type.
    ///
    /// Phone destinations always verify as `sms` regardless of purpose.
    pub fn provider_type(&self, destination: &OtpDestination) -> &'static str {
        if matches!(destination, OtpDestination::Phone(_)) {
            return "sms";
        }
        match self {
            OtpPurpose::Reset => "recovery",
            OtpPurpose::Signup => "signup",
            OtpPurpose::Email | OtpPurpose::Sms => "email",
        }
    }
}

/// Onboarding questionnaire answers persisted to the provider's profile
/// record when onboarding completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    /// Primary goal (e.g. weight_loss, muscle_gain, general_fitness)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_goal: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dietary_preferences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<String>,
}
