//! REST client for the web system.

use crate::sink::{ProfileSyncSink, WebProfilePayload, WebRegistration};
use crate::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    access_token: String,
}

/// HTTP client for the web-system REST API.
pub struct WebSystemClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl WebSystemClient {
    /// Create a new client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn rejection(response: reqwest::Response) -> SyncError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        SyncError::Rejected { status, message }
    }
}

#[async_trait]
impl ProfileSyncSink for WebSystemClient {
    async fn register_user(&self, registration: &WebRegistration) -> SyncResult<String> {
        let url = self.api_url("users/register");

        debug!(url = %url, "Registering user with web system");

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(registration)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let data: RegisterResponse = response.json().await?;
        info!("Registered with web system");
        Ok(data.access_token)
    }

    async fn push_profile(
        &self,
        access_token: &str,
        payload: &WebProfilePayload,
    ) -> SyncResult<()> {
        let url = self.api_url("profile");

        debug!(url = %url, "Pushing profile to web system");

        let response = self
            .http_client
            .put(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        info!("Profile pushed to web system");
        Ok(())
    }
}
