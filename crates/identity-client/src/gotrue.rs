//! Supabase-compatible auth REST client.

use crate::provider::{IdentityProvider, SessionChanges};
use crate::{
    IdentityError, IdentityResult, OtpDestination, Profile, Session, SessionUser, SignUpOutcome,
    SignUpRequest,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Buffer size for the session-change broadcast.
const SESSION_EVENT_CAPACITY: usize = 16;

/// Token grant response from the auth service.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = Utc::now() + Duration::seconds(self.expires_in);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: expires_at.to_rfc3339(),
            user: SessionUser {
                id: self.user.id,
                email: self.user.email,
                phone: self.user.phone,
            },
        }
    }
}

/// Refresh-token grant request body.
#[derive(Debug, Serialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Profile row subset read for the onboarding flag.
#[derive(Debug, Deserialize)]
struct OnboardingRow {
    #[serde(default)]
    onboarding_completed: bool,
}

/// Client for a Supabase-compatible auth and REST surface.
pub struct GoTrueClient {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
    session_events: broadcast::Sender<Option<Session>>,
}

impl GoTrueClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_url` - The project API URL (e.g., `https://xyz.supabase.co`)
    /// * `publishable_key` - The publishable API key
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        let (session_events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            publishable_key: publishable_key.into(),
            session_events,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    /// Push a session change to subscribers. Dropped silently when no
    /// receiver is attached.
    fn emit(&self, session: Option<Session>) {
        let _ = self.session_events.send(session);
    }

    /// Turn a non-success response into an explicit provider error.
    async fn provider_error(response: reqwest::Response) -> IdentityError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Provider request failed");

        let parsed: Option<serde_json::Value> = serde_json::from_str(&body).ok();
        let field = |names: &[&str]| -> Option<String> {
            let value = parsed.as_ref()?;
            names
                .iter()
                .find_map(|name| value.get(name))
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        let code = field(&["error_code", "error", "code"])
            .unwrap_or_else(|| status.as_u16().to_string());
        let message = field(&["msg", "message", "error_description"]).unwrap_or(body);

        IdentityError::Provider { code, message }
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> IdentityResult<Session> {
        let url = format!("{}?grant_type={}", self.auth_url("token"), grant_type);

        debug!(url = %url, "Requesting token grant");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let data: TokenResponse = response.json().await?;
        Ok(data.into_session())
    }

    /// POST a fire-and-forget auth request (no session in the response).
    async fn auth_post(&self, path: &str, body: serde_json::Value) -> IdentityResult<()> {
        let url = self.auth_url(path);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<Session> {
        debug!(email = %email, "Attempting password sign-in");

        let session = self
            .token_grant(
                "password",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;

        info!(user_id = %session.user.id, "Password sign-in successful");
        self.emit(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> IdentityResult<SignUpOutcome> {
        let url = format!(
            "{}?redirect_to={}",
            self.auth_url("signup"),
            urlencode(&request.redirect_url)
        );

        debug!(email = %request.email, "Attempting sign-up");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "email": request.email,
                "password": request.password,
                "data": {
                    "full_name": request.full_name,
                    "phone": request.phone,
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        // With email confirmation enabled the response is a bare user
        // record; otherwise it carries a full token grant.
        let body: serde_json::Value = response.json().await?;

        if body.get("access_token").is_some() {
            let data: TokenResponse = serde_json::from_value(body)?;
            let session = data.into_session();
            info!(user_id = %session.user.id, "Sign-up issued immediate session");
            self.emit(Some(session.clone()));
            return Ok(SignUpOutcome {
                user_id: Some(session.user.id.clone()),
                session: Some(session),
            });
        }

        let user_id = body
            .get("id")
            .or_else(|| body.get("user").and_then(|u| u.get("id")))
            .and_then(|v| v.as_str())
            .map(String::from);

        info!("Sign-up pending email verification");
        Ok(SignUpOutcome {
            session: None,
            user_id,
        })
    }

    async fn sign_out(&self, access_token: &str) -> IdentityResult<()> {
        let url = self.auth_url("logout");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        info!("Signed out");
        self.emit(None);
        Ok(())
    }

    async fn send_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> IdentityResult<()> {
        let path = match redirect_to {
            Some(redirect) => format!("recover?redirect_to={}", urlencode(redirect)),
            None => "recover".to_string(),
        };
        self.auth_post(&path, serde_json::json!({ "email": email }))
            .await
    }

    async fn resend_signup_verification(&self, email: &str) -> IdentityResult<()> {
        self.auth_post(
            "resend",
            serde_json::json!({ "type": "signup", "email": email }),
        )
        .await
    }

    async fn send_sms_otp(&self, phone: &str) -> IdentityResult<()> {
        self.auth_post(
            "otp",
            serde_json::json!({ "phone": phone, "channel": "sms" }),
        )
        .await
    }

    async fn verify_otp(
        &self,
        destination: &OtpDestination,
        token: &str,
        verification_type: &str,
    ) -> IdentityResult<Option<Session>> {
        let body = match destination {
            OtpDestination::Email(email) => serde_json::json!({
                "type": verification_type,
                "email": email,
                "token": token,
            }),
            OtpDestination::Phone(phone) => serde_json::json!({
                "type": verification_type,
                "phone": phone,
                "token": token,
            }),
        };

        let url = self.auth_url("verify");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let body: serde_json::Value = response.json().await?;
        if body.get("access_token").is_none() {
            return Ok(None);
        }

        let data: TokenResponse = serde_json::from_value(body)?;
        let session = data.into_session();
        info!(user_id = %session.user.id, "OTP verified, session issued");
        self.emit(Some(session.clone()));
        Ok(Some(session))
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> IdentityResult<()> {
        let url = self.auth_url("user");

        let response = self
            .http_client
            .put(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "password": new_password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        info!("Password updated");
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> IdentityResult<Session> {
        let session = self
            .token_grant(
                "refresh_token",
                serde_json::to_value(RefreshRequest {
                    refresh_token: refresh_token.to_string(),
                })?,
            )
            .await?;

        info!(user_id = %session.user.id, "Session refreshed");
        self.emit(Some(session.clone()));
        Ok(session)
    }

    async fn exchange_code(&self, code: &str) -> IdentityResult<Session> {
        let session = self
            .token_grant("pkce", serde_json::json!({ "auth_code": code }))
            .await?;

        info!(user_id = %session.user.id, "Authorization code exchanged");
        self.emit(Some(session.clone()));
        Ok(session)
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str) -> String {
        format!(
            "{}?provider={}&redirect_to={}",
            self.auth_url("authorize"),
            urlencode(provider),
            urlencode(redirect_to)
        )
    }

    async fn sign_in_with_id_token(
        &self,
        provider: &str,
        id_token: &str,
        nonce: Option<&str>,
    ) -> IdentityResult<Session> {
        let mut body = serde_json::json!({
            "provider": provider,
            "id_token": id_token,
        });
        if let Some(nonce) = nonce {
            body["nonce"] = serde_json::json!(nonce);
        }

        let session = self.token_grant("id_token", body).await?;

        info!(user_id = %session.user.id, provider = %provider, "Native sign-in successful");
        self.emit(Some(session.clone()));
        Ok(session)
    }

    async fn fetch_onboarding_complete(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> IdentityResult<Option<bool>> {
        let url = format!(
            "{}?id=eq.{}&select=onboarding_completed&limit=1",
            self.rest_url("profiles"),
            user_id
        );

        debug!(user_id = %user_id, "Fetching onboarding flag from profile");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let rows: Vec<OnboardingRow> = response.json().await?;
        Ok(rows.into_iter().next().map(|row| row.onboarding_completed))
    }

    async fn create_profile(
        &self,
        user_id: &str,
        access_token: &str,
        onboarding_completed: bool,
    ) -> IdentityResult<()> {
        let url = self.rest_url("profiles");

        debug!(user_id = %user_id, "Creating profile row");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({
                "id": user_id,
                "onboarding_completed": onboarding_completed,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        info!(user_id = %user_id, "Profile row created");
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        access_token: &str,
        profile: &Profile,
    ) -> IdentityResult<()> {
        let url = format!("{}?id=eq.{}", self.rest_url("profiles"), user_id);

        // One atomic write: answers plus the completion flag.
        let mut body = serde_json::to_value(profile)?;
        body["onboarding_completed"] = serde_json::json!(true);
        body["updated_at"] = serde_json::json!(Utc::now().to_rfc3339());

        debug!(user_id = %user_id, "Writing onboarding profile");

        let response = self
            .http_client
            .patch(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        info!(user_id = %user_id, "Onboarding profile written");
        Ok(())
    }

    fn subscribe_session_changes(&self) -> SessionChanges {
        self.session_events.subscribe()
    }
}

/// Percent-encode a query value.
fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
