//! The profile sync seam.

use crate::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identity fields used to register the user with the web system.
#[derive(Debug, Clone, Serialize)]
pub struct WebRegistration {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Reduced profile payload pushed after onboarding.
///
/// Deliberately a subset of the provider profile; the web system only
/// needs display fields and the primary goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebProfilePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_goal: Option<String>,
}

/// Web-system operations consumed fire-and-forget by the session lifecycle.
#[async_trait]
pub trait ProfileSyncSink: Send + Sync {
    /// Register the user, returning a web-system access token.
    async fn register_user(&self, registration: &WebRegistration) -> SyncResult<String>;

    /// Push the reduced profile payload.
    async fn push_profile(&self, access_token: &str, payload: &WebProfilePayload)
        -> SyncResult<()>;
}
