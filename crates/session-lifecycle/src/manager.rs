//! The session lifecycle manager.
//!
//! Orchestrates the identity provider, the two local stores, the biometric
//! gate, and the web-system sink into one authoritative [`AuthStatus`].
//! Three feeds can write the session concurrently at startup (cold-start
//! restore, provider push, deep link); all of them go through setters that
//! share one write lock, so each write fully persists before another feed
//! can interleave and last-write-wins holds on the one session slot.

use crate::deep_link::AuthRedirect;
use crate::{
    resolve_status, AuthOutcome, AuthStatus, BrowserLauncher, LifecycleError, NativeSignIn,
};
use biometric_gate::{BiometricAvailability, BiometricGate};
use client_storage::{CredentialVault, KeyValueStore, StorageKeys};
use identity_client::{
    IdentityProvider, OtpDestination, OtpPurpose, Profile, Session, SessionUser, SignUpRequest,
    NATIVE_PROVIDER_ID,
};
use profile_sync_sink::{ProfileSyncSink, WebProfilePayload, WebRegistration};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the UI observes, published through a watch channel.
///
/// `status()` is the only way to read the authentication status; it is
/// recomputed on every call and never stored.
#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub session: Option<Session>,
    pub onboarding_complete: bool,
    pub is_initializing: bool,
    pub biometrics_available: bool,
    pub biometrics_enabled: bool,
}

impl AuthSnapshot {
    /// The derived authentication status.
    pub fn status(&self) -> AuthStatus {
        resolve_status(
            self.session.is_some(),
            self.onboarding_complete,
            self.is_initializing,
        )
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&SessionUser> {
        self.session.as_ref().map(|s| &s.user)
    }
}

/// Owns the session, the onboarding flag, and the biometric fast-login
/// credential. One instance per app; created by the host composition root
/// and driven through `init()`/`dispose()`.
pub struct SessionLifecycleManager {
    provider: Arc<dyn IdentityProvider>,
    kv: Arc<dyn KeyValueStore>,
    vault: Arc<CredentialVault>,
    biometrics: Arc<dyn BiometricGate>,
    native: Arc<dyn NativeSignIn>,
    browser: Arc<dyn BrowserLauncher>,
    sync_sink: Arc<dyn ProfileSyncSink>,
    auth_redirect_url: String,
    /// Serializes persist + in-memory update for the session slot and the
    /// onboarding flag. Never held across an await.
    write_lock: Mutex<()>,
    state_tx: watch::Sender<AuthSnapshot>,
    push_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionLifecycleManager {
    /// Create a new manager. No I/O happens until `init()`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        kv: Arc<dyn KeyValueStore>,
        vault: Arc<CredentialVault>,
        biometrics: Arc<dyn BiometricGate>,
        native: Arc<dyn NativeSignIn>,
        browser: Arc<dyn BrowserLauncher>,
        sync_sink: Arc<dyn ProfileSyncSink>,
        auth_redirect_url: impl Into<String>,
    ) -> Self {
        let (state_tx, _) = watch::channel(AuthSnapshot {
            session: None,
            onboarding_complete: true,
            is_initializing: true,
            biometrics_available: false,
            biometrics_enabled: false,
        });

        Self {
            provider,
            kv,
            vault,
            biometrics,
            native,
            browser,
            sync_sink,
            auth_redirect_url: auth_redirect_url.into(),
            write_lock: Mutex::new(()),
            state_tx,
            push_task: Mutex::new(None),
        }
    }

    // ==========================================
    // Observable state
    // ==========================================

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state_tx.subscribe()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Current derived status.
    pub fn status(&self) -> AuthStatus {
        self.state_tx.borrow().status()
    }

    /// Current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.state_tx.borrow().session.clone()
    }

    /// Current authenticated user, if any.
    pub fn user(&self) -> Option<SessionUser> {
        self.state_tx.borrow().user().cloned()
    }

    /// Whether onboarding has been completed.
    pub fn onboarding_complete(&self) -> bool {
        self.state_tx.borrow().onboarding_complete
    }

    /// Whether biometric hardware is present and enrolled.
    pub fn biometrics_available(&self) -> bool {
        self.state_tx.borrow().biometrics_available
    }

    /// Whether biometric fast-login is enabled.
    pub fn biometrics_enabled(&self) -> bool {
        self.state_tx.borrow().biometrics_enabled
    }

    // ==========================================
    // Lifecycle
    // ==========================================

    /// Restore persisted state, rehydrate the session, and start listening
    /// for provider pushes and deep links.
    ///
    /// Storage and rehydration failures fail open toward `signedOut`; the
    /// status leaves `loading` only once restore has settled.
    pub async fn init(self: Arc<Self>) {
        // Availability is probed fresh on every start, never cached. If
        // biometrics were enabled but the device no longer supports them,
        // the stored credential would be a stale bypass; purge it.
        let availability = match self.biometrics.availability().await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "Biometric availability probe failed");
                BiometricAvailability::unavailable()
            }
        };
        self.state_tx
            .send_modify(|s| s.biometrics_available = availability.is_available());

        let stored_enabled = self
            .load_flag(StorageKeys::BIOMETRIC_ENABLED)
            .unwrap_or(false);
        if stored_enabled && !availability.is_available() {
            info!("Biometrics no longer available on this device, purging stored credential");
            self.disable_biometrics().await;
        } else {
            self.set_biometrics_enabled(stored_enabled);
        }

        // A signed-out user is never shown onboarding, so the flag defaults
        // to true when no session was persisted.
        let stored_session = self.load_stored_session();
        let onboarding = self
            .load_flag(StorageKeys::ONBOARDING_COMPLETE)
            .unwrap_or_else(|| stored_session.is_none());
        self.set_onboarding_complete(onboarding);

        match stored_session {
            None => {
                debug!("No persisted session");
                self.set_session(None);
            }
            Some(session) if session.is_expired() => {
                info!(user_id = %session.user.id, "Persisted session expired, refreshing");
                match self.provider.refresh_session(&session.refresh_token).await {
                    Ok(fresh) => self.set_session(Some(fresh)),
                    Err(e) if e.is_transient() => {
                        // Offline start: keep the session, the provider push
                        // or the next operation will settle it.
                        warn!(error = %e, "Startup refresh failed transiently, keeping session");
                        self.set_session(Some(session));
                    }
                    Err(e) => {
                        warn!(error = %e, "Startup refresh rejected, clearing session");
                        self.set_session(None);
                    }
                }
            }
            Some(session) => {
                info!(user_id = %session.user.id, "Restored persisted session");
                self.set_session(Some(session));
            }
        }

        // Provider pushes every session change, including silent background
        // refreshes; they are the source of truth for session validity.
        let mut changes = self.provider.subscribe_session_changes();
        let manager = Arc::clone(&self);
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(session) => {
                        debug!(has_session = session.is_some(), "Provider session change");
                        manager.set_session(session);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed provider session changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.push_task.lock().unwrap() = Some(task);

        self.state_tx.send_modify(|s| s.is_initializing = false);
        info!(status = ?self.status(), "Session lifecycle initialized");
    }

    /// Stop the provider push listener.
    pub fn dispose(&self) {
        if let Some(task) = self.push_task.lock().unwrap().take() {
            task.abort();
        }
    }

    // ==========================================
    // Credential sign-in / sign-up
    // ==========================================

    /// Password sign-in.
    ///
    /// The onboarding flag is resolved from the provider's profile record
    /// before the session is published; the profile is the source of truth
    /// and the local cache only a startup optimization. Publishing both in
    /// one write keeps observers from seeing the new session paired with a
    /// stale flag.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome {
        let session = match self.provider.sign_in_with_password(email, password).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                return AuthOutcome::failure(e.to_string());
            }
        };

        let onboarding = self.resolve_onboarding_from_profile(&session, false).await;
        self.set_session_and_onboarding(session.clone(), onboarding);

        info!(user_id = %session.user.id, "Signed in");
        AuthOutcome::ok()
    }

    /// Sign up with email confirmation.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        phone: Option<&str>,
    ) -> AuthOutcome {
        let request = SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
            phone: phone.map(str::to_string),
            redirect_url: self.auth_redirect_url.clone(),
        };

        let outcome = match self.provider.sign_up(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Sign-up failed");
                return AuthOutcome::failure(e.to_string());
            }
        };

        let session = match outcome.session {
            Some(session) => session,
            None => {
                // Provider withheld the session pending email verification;
                // nothing is persisted until the user comes back.
                info!("Sign-up accepted, awaiting email verification");
                return AuthOutcome::verification_required();
            }
        };

        if let Err(e) = self
            .provider
            .create_profile(&session.user.id, &session.access_token, false)
            .await
        {
            if e.is_duplicate_row() {
                debug!(user_id = %session.user.id, "Profile row already exists");
            } else {
                warn!(error = %e, "Failed to create profile row");
            }
        }
        self.set_session_and_onboarding(session.clone(), false);

        info!(user_id = %session.user.id, "Signed up");
        AuthOutcome::ok()
    }

    /// Revoke the session and clear local state. Idempotent.
    pub async fn sign_out(&self) -> AuthOutcome {
        if let Some(session) = self.session() {
            if let Err(e) = self.provider.sign_out(&session.access_token).await {
                warn!(error = %e, "Provider sign-out failed, clearing local session anyway");
            }
        }

        self.set_session(None);

        if let Err(e) = self.vault.clear_web_system_token() {
            warn!(error = %e, "Failed to clear web-system token");
        }

        info!("Signed out");
        AuthOutcome::ok()
    }

    /// Send a password-reset email. No local state changes.
    pub async fn reset_password(&self, email: &str) -> AuthOutcome {
        match self
            .provider
            .send_password_reset(email, Some(&self.auth_redirect_url))
            .await
        {
            Ok(()) => AuthOutcome::ok(),
            Err(e) => AuthOutcome::failure(e.to_string()),
        }
    }

    /// Re-send the sign-up verification email. No local state changes.
    pub async fn resend_verification(&self, email: &str) -> AuthOutcome {
        match self.provider.resend_signup_verification(email).await {
            Ok(()) => AuthOutcome::ok(),
            Err(e) => AuthOutcome::failure(e.to_string()),
        }
    }

    // ==========================================
    // OAuth / native providers
    // ==========================================

    /// Sign in with a third-party provider.
    ///
    /// The native provider exchanges credentials in-process and resolves
    /// fully here. Redirect providers only get their browser launched;
    /// completion arrives later through [`handle_auth_redirect`], so a
    /// successful outcome means "browser opened", not "signed in".
    ///
    /// [`handle_auth_redirect`]: SessionLifecycleManager::handle_auth_redirect
    pub async fn sign_in_with_provider(&self, provider_id: &str) -> AuthOutcome {
        if provider_id == NATIVE_PROVIDER_ID {
            return self.sign_in_native().await;
        }

        let url = self
            .provider
            .authorize_url(provider_id, &self.auth_redirect_url);

        match self.browser.open_in_app(&url).await {
            Ok(()) => AuthOutcome::ok(),
            Err(LifecycleError::BrowserUnavailable(reason)) => {
                debug!(reason = %reason, "In-app browser unavailable, using OS browser");
                match open::that(&url) {
                    Ok(()) => AuthOutcome::ok(),
                    Err(e) => {
                        warn!(error = %e, "Failed to open OS browser");
                        AuthOutcome::failure(LifecycleError::BrowserLaunch(e.to_string()).to_string())
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to open in-app browser");
                AuthOutcome::failure(e.to_string())
            }
        }
    }

    async fn sign_in_native(&self) -> AuthOutcome {
        let credentials = match self.native.acquire_credentials().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Native sign-in failed");
                return AuthOutcome::failure(e.to_string());
            }
        };

        let session = match self
            .provider
            .sign_in_with_id_token(
                NATIVE_PROVIDER_ID,
                &credentials.id_token,
                credentials.nonce.as_deref(),
            )
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Native token exchange failed");
                return AuthOutcome::failure(e.to_string());
            }
        };

        // Native sign-in may be the user's very first contact, so create the
        // profile row if it does not exist yet.
        let onboarding = self.resolve_onboarding_from_profile(&session, true).await;
        self.set_session_and_onboarding(session.clone(), onboarding);

        info!(user_id = %session.user.id, "Signed in with native provider");
        AuthOutcome::ok()
    }

    /// Unified entry point for OAuth redirect deep links, fed by both the
    /// live URL-event adapter and the cold-start launch-URL adapter.
    pub async fn handle_auth_redirect(&self, url: &str) -> AuthOutcome {
        match AuthRedirect::parse(url) {
            AuthRedirect::Error(description) => {
                warn!(error = %description, "OAuth redirect reported an error");
                AuthOutcome::failure(description)
            }
            AuthRedirect::AuthorizationCode(code) => {
                let session = match self.provider.exchange_code(&code).await {
                    Ok(session) => session,
                    Err(e) => {
                        warn!(error = %e, "Authorization code exchange failed");
                        return AuthOutcome::failure(e.to_string());
                    }
                };
                let onboarding = self.resolve_onboarding_from_profile(&session, true).await;
                self.set_session_and_onboarding(session.clone(), onboarding);
                info!(user_id = %session.user.id, "Signed in via OAuth redirect");
                AuthOutcome::ok()
            }
            AuthRedirect::Unrelated => AuthOutcome::ok(),
        }
    }

    // ==========================================
    // Biometric fast login
    // ==========================================

    /// Enable biometric fast-login for the current session.
    ///
    /// Requires a live session, usable hardware, and a fresh interactive
    /// confirmation; never enables silently.
    pub async fn enable_biometrics(&self) -> AuthOutcome {
        let session = match self.session() {
            Some(session) => session,
            None => return AuthOutcome::failure(LifecycleError::NoSession.to_string()),
        };

        let availability = match self.biometrics.availability().await {
            Ok(a) => a,
            Err(e) => return AuthOutcome::failure(e.to_string()),
        };
        self.state_tx
            .send_modify(|s| s.biometrics_available = availability.is_available());

        if !availability.hardware_present {
            return AuthOutcome::failure("Biometric hardware is not present on this device");
        }
        if !availability.enrolled {
            return AuthOutcome::failure("No biometrics are enrolled on this device");
        }

        if let Err(e) = self
            .biometrics
            .authenticate("Confirm to enable biometric sign-in")
            .await
        {
            warn!(error = %e, "Biometric confirmation failed");
            return AuthOutcome::failure(e.to_string());
        }

        if let Err(e) = self.vault.set_biometric_refresh_token(&session.refresh_token) {
            warn!(error = %e, "Failed to store biometric credential");
            return AuthOutcome::failure(e.to_string());
        }
        self.set_biometrics_enabled(true);

        info!("Biometric sign-in enabled");
        AuthOutcome::ok()
    }

    /// Disable biometric fast-login and purge the stored credential.
    /// Idempotent.
    pub async fn disable_biometrics(&self) -> AuthOutcome {
        if let Err(e) = self.vault.clear_biometric_refresh_token() {
            warn!(error = %e, "Failed to clear biometric credential");
        }
        self.set_biometrics_enabled(false);
        AuthOutcome::ok()
    }

    /// Sign in by releasing the stored refresh token behind a biometric
    /// prompt.
    ///
    /// Hardware loss and provider rejection both self-heal by disabling
    /// biometrics; a transient network failure does not.
    pub async fn sign_in_with_biometrics(&self) -> AuthOutcome {
        let availability = match self.biometrics.availability().await {
            Ok(a) => a,
            Err(e) => {
                self.disable_biometrics().await;
                return AuthOutcome::failure(e.to_string());
            }
        };
        self.state_tx
            .send_modify(|s| s.biometrics_available = availability.is_available());

        if !availability.is_available() {
            self.disable_biometrics().await;
            return AuthOutcome::failure(
                LifecycleError::BiometricsUnavailable(
                    "hardware missing or no biometrics enrolled".to_string(),
                )
                .to_string(),
            );
        }

        if let Err(e) = self.biometrics.authenticate("Sign in to Thrive").await {
            return AuthOutcome::failure(e.to_string());
        }

        let refresh_token = match self.vault.get_biometric_refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                self.disable_biometrics().await;
                return AuthOutcome::failure("No stored biometric credential");
            }
            Err(e) => {
                warn!(error = %e, "Failed to read biometric credential");
                self.disable_biometrics().await;
                return AuthOutcome::failure(e.to_string());
            }
        };

        match self.provider.refresh_session(&refresh_token).await {
            Ok(session) => {
                // The provider rotates refresh tokens on use; keep the vault
                // in step or the next biometric login would fail.
                if let Err(e) = self.vault.set_biometric_refresh_token(&session.refresh_token) {
                    warn!(error = %e, "Failed to rotate biometric credential");
                }
                self.set_session(Some(session.clone()));
                info!(user_id = %session.user.id, "Signed in with biometrics");
                AuthOutcome::ok()
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Biometric refresh failed transiently");
                AuthOutcome::failure(e.to_string())
            }
            Err(e) => {
                warn!(error = %e, "Biometric refresh rejected, disabling biometrics");
                self.disable_biometrics().await;
                AuthOutcome::failure(e.to_string())
            }
        }
    }

    // ==========================================
    // Onboarding
    // ==========================================

    /// Complete onboarding: flip the flag locally, write the profile to the
    /// provider, then mirror it into the web system.
    ///
    /// The flag flips before the network write so the UI unlocks
    /// immediately; a failed provider write is the only path that reverts
    /// it. The web-system sync is detached and its outcome discarded after
    /// logging.
    pub async fn complete_onboarding(&self, profile: Profile) -> AuthOutcome {
        let session = match self.session() {
            Some(session) => session,
            None => return AuthOutcome::failure(LifecycleError::NoSession.to_string()),
        };

        self.set_onboarding_complete(true);

        if let Err(e) = self
            .provider
            .update_profile(&session.user.id, &session.access_token, &profile)
            .await
        {
            warn!(error = %e, "Profile write failed, reverting onboarding flag");
            self.set_onboarding_complete(false);
            return AuthOutcome::failure(e.to_string());
        }

        self.spawn_web_system_sync(&session, &profile);

        info!(user_id = %session.user.id, "Onboarding complete");
        AuthOutcome::ok()
    }

    /// Detached best-effort mirror into the web system. Registers the user
    /// there first if no web-system token exists yet.
    fn spawn_web_system_sync(&self, session: &Session, profile: &Profile) {
        let sink = Arc::clone(&self.sync_sink);
        let vault = Arc::clone(&self.vault);
        let email = session.user.email.clone();
        let full_name = profile.full_name.clone();
        let phone = profile.phone.clone();
        let payload = WebProfilePayload {
            full_name: profile.full_name.clone(),
            phone: profile.phone.clone(),
            primary_goal: profile.primary_goal.clone(),
        };

        tokio::spawn(async move {
            let token = match vault.get_web_system_token() {
                Ok(Some(token)) => token,
                Ok(None) => {
                    let Some(email) = email else {
                        warn!("Session has no email, skipping web-system sync");
                        return;
                    };
                    let registration = WebRegistration {
                        email,
                        full_name,
                        phone,
                    };
                    match sink.register_user(&registration).await {
                        Ok(token) => {
                            if let Err(e) = vault.set_web_system_token(&token) {
                                warn!(error = %e, "Failed to store web-system token");
                            }
                            token
                        }
                        Err(e) => {
                            warn!(error = %e, "Web-system registration failed");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read web-system token");
                    return;
                }
            };

            if let Err(e) = sink.push_profile(&token, &payload).await {
                warn!(error = %e, "Web-system profile sync failed");
            }
        });
    }

    /// Resolve the onboarding flag from the provider's profile record.
    ///
    /// Pure resolution, no state writes: callers publish the result together
    /// with the session through [`set_session_and_onboarding`]. A missing
    /// row or a failed fetch both resolve to "not complete": fail-safe
    /// toward re-onboarding rather than silently unlocking the app.
    ///
    /// [`set_session_and_onboarding`]: SessionLifecycleManager::set_session_and_onboarding
    async fn resolve_onboarding_from_profile(
        &self,
        session: &Session,
        create_if_absent: bool,
    ) -> bool {
        match self
            .provider
            .fetch_onboarding_complete(&session.user.id, &session.access_token)
            .await
        {
            Ok(Some(flag)) => flag,
            Ok(None) => {
                if create_if_absent {
                    if let Err(e) = self
                        .provider
                        .create_profile(&session.user.id, &session.access_token, false)
                        .await
                    {
                        if e.is_duplicate_row() {
                            debug!(user_id = %session.user.id, "Profile row already exists");
                        } else {
                            warn!(error = %e, "Failed to create profile row");
                        }
                    }
                }
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch onboarding status, treating as incomplete");
                false
            }
        }
    }

    // ==========================================
    // OTP
    // ==========================================

    /// Send a one-time password to the destination.
    ///
    /// Phone codes use the SMS channel; email codes ride the password-reset
    /// template (delivery of a 6-digit code depends on provider-side
    /// template configuration).
    pub async fn send_otp(&self, destination: &OtpDestination) -> AuthOutcome {
        let result = match destination {
            OtpDestination::Phone(phone) => self.provider.send_sms_otp(phone).await,
            OtpDestination::Email(email) => self.provider.send_password_reset(email, None).await,
        };
        match result {
            Ok(()) => AuthOutcome::ok(),
            Err(e) => {
                warn!(error = %e, "Failed to send OTP");
                AuthOutcome::failure(e.to_string())
            }
        }
    }

    /// Re-send a one-time password.
    pub async fn resend_otp(&self, destination: &OtpDestination) -> AuthOutcome {
        self.send_otp(destination).await
    }

    /// Verify a one-time password; persists the session when the provider
    /// issues one with the verification.
    pub async fn verify_otp(
        &self,
        destination: &OtpDestination,
        token: &str,
        purpose: OtpPurpose,
    ) -> AuthOutcome {
        let verification_type = purpose.provider_type(destination);
        match self
            .provider
            .verify_otp(destination, token, verification_type)
            .await
        {
            Ok(Some(session)) => {
                info!(user_id = %session.user.id, "OTP verified, session issued");
                self.set_session(Some(session));
                AuthOutcome::ok()
            }
            Ok(None) => AuthOutcome::ok(),
            Err(e) => {
                warn!(error = %e, "OTP verification failed");
                AuthOutcome::failure(e.to_string())
            }
        }
    }

    /// Verify a password-reset OTP, then set the new password.
    ///
    /// Short-circuits with the verification failure; the password update
    /// only runs against the session the verification established.
    pub async fn reset_password_with_otp(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> AuthOutcome {
        let destination = OtpDestination::Email(email.to_string());
        let verification_type = OtpPurpose::Reset.provider_type(&destination);

        let session = match self
            .provider
            .verify_otp(&destination, token, verification_type)
            .await
        {
            Ok(Some(session)) => {
                self.set_session(Some(session.clone()));
                session
            }
            Ok(None) => match self.session() {
                Some(session) => session,
                None => {
                    return AuthOutcome::failure("Verification did not establish a session");
                }
            },
            Err(e) => {
                warn!(error = %e, "Password-reset OTP verification failed");
                return AuthOutcome::failure(e.to_string());
            }
        };

        match self
            .provider
            .update_password(&session.access_token, new_password)
            .await
        {
            Ok(()) => {
                info!("Password updated");
                AuthOutcome::ok()
            }
            Err(e) => {
                warn!(error = %e, "Password update failed");
                AuthOutcome::failure(e.to_string())
            }
        }
    }

    // ==========================================
    // Single-writer state mutation
    // ==========================================

    /// Session writer for the restore, push, sign-out, and OTP paths.
    /// Sign-in flows that also resolve the onboarding flag go through
    /// [`set_session_and_onboarding`] instead. Persistence and the
    /// in-memory update happen under one lock, so a concurrent feed can
    /// never observe one without the other.
    ///
    /// [`set_session_and_onboarding`]: SessionLifecycleManager::set_session_and_onboarding
    fn set_session(&self, session: Option<Session>) {
        let _guard = self.write_lock.lock().unwrap();

        match &session {
            Some(s) => match serde_json::to_string(s) {
                Ok(blob) => {
                    if let Err(e) = self.kv.set(StorageKeys::SESSION, &blob) {
                        warn!(error = %e, "Failed to persist session");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to serialize session"),
            },
            None => {
                if let Err(e) = self.kv.remove(StorageKeys::SESSION) {
                    warn!(error = %e, "Failed to remove persisted session");
                }
            }
        }

        self.state_tx.send_modify(|s| s.session = session);
    }

    /// Publish a freshly issued session together with its resolved
    /// onboarding flag. One locked write, one notification: observers never
    /// see the new session paired with the previous flag.
    fn set_session_and_onboarding(&self, session: Session, onboarding_complete: bool) {
        let _guard = self.write_lock.lock().unwrap();

        match serde_json::to_string(&session) {
            Ok(blob) => {
                if let Err(e) = self.kv.set(StorageKeys::SESSION, &blob) {
                    warn!(error = %e, "Failed to persist session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session"),
        }

        if let Err(e) = self.kv.set(
            StorageKeys::ONBOARDING_COMPLETE,
            if onboarding_complete { "true" } else { "false" },
        ) {
            warn!(error = %e, "Failed to persist onboarding flag");
        }

        self.state_tx.send_modify(|s| {
            s.session = Some(session);
            s.onboarding_complete = onboarding_complete;
        });
    }

    /// The one entry point for onboarding-flag writes.
    fn set_onboarding_complete(&self, complete: bool) {
        let _guard = self.write_lock.lock().unwrap();

        if let Err(e) = self.kv.set(
            StorageKeys::ONBOARDING_COMPLETE,
            if complete { "true" } else { "false" },
        ) {
            warn!(error = %e, "Failed to persist onboarding flag");
        }

        self.state_tx.send_modify(|s| s.onboarding_complete = complete);
    }

    fn set_biometrics_enabled(&self, enabled: bool) {
        let _guard = self.write_lock.lock().unwrap();

        if let Err(e) = self.kv.set(
            StorageKeys::BIOMETRIC_ENABLED,
            if enabled { "true" } else { "false" },
        ) {
            warn!(error = %e, "Failed to persist biometric flag");
        }

        self.state_tx.send_modify(|s| s.biometrics_enabled = enabled);
    }

    // ==========================================
    // Persistence helpers
    // ==========================================

    fn load_stored_session(&self) -> Option<Session> {
        let blob = match self.kv.get(StorageKeys::SESSION) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };
        match serde_json::from_str(&blob) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Persisted session blob corrupt, ignoring");
                None
            }
        }
    }

    fn load_flag(&self, key: &str) -> Option<bool> {
        match self.kv.get(key) {
            Ok(Some(value)) => Some(value == "true"),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read persisted flag");
                None
            }
        }
    }
}

impl Drop for SessionLifecycleManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeCredentials;
    use biometric_gate::{BiometricError, BiometricResult};
    use chrono::{Duration, Utc};
    use client_storage::{MemoryKvStore, SecureStore, StorageResult};
    use identity_client::{IdentityError, IdentityResult, SignUpOutcome};
    use profile_sync_sink::{SyncError, SyncResult};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn test_session(user_id: &str) -> Session {
        Session {
            access_token: format!("access-{user_id}"),
            refresh_token: format!("refresh-{user_id}"),
            expires_at: (Utc::now() + Duration::hours(1)).to_rfc3339(),
            user: SessionUser {
                id: user_id.to_string(),
                email: Some(format!("{user_id}@example.com")),
                phone: None,
            },
        }
    }

    fn expired_session(user_id: &str) -> Session {
        let mut session = test_session(user_id);
        session.expires_at = (Utc::now() - Duration::hours(1)).to_rfc3339();
        session
    }

    struct FakeProvider {
        issued_session: std::sync::Mutex<Option<Session>>,
        sign_up_outcome: std::sync::Mutex<Option<SignUpOutcome>>,
        refresh_session: std::sync::Mutex<Option<Session>>,
        refresh_transient: AtomicBool,
        refresh_calls: AtomicUsize,
        exchange_session: std::sync::Mutex<Option<Session>>,
        exchange_calls: AtomicUsize,
        verify_session: std::sync::Mutex<Option<Session>>,
        verify_rejects: AtomicBool,
        onboarding_row: std::sync::Mutex<Option<bool>>,
        fetch_fails: AtomicBool,
        hold_fetch: AtomicBool,
        fetch_entered: Notify,
        release_fetch: Notify,
        update_profile_fails: AtomicBool,
        create_duplicate: AtomicBool,
        created_profiles: std::sync::Mutex<Vec<String>>,
        updated_profiles: std::sync::Mutex<Vec<Profile>>,
        password_updates: std::sync::Mutex<Vec<String>>,
        otp_sends: std::sync::Mutex<Vec<String>>,
        events: broadcast::Sender<Option<Session>>,
    }

    impl FakeProvider {
        fn new() -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                issued_session: std::sync::Mutex::new(None),
                sign_up_outcome: std::sync::Mutex::new(None),
                refresh_session: std::sync::Mutex::new(None),
                refresh_transient: AtomicBool::new(false),
                refresh_calls: AtomicUsize::new(0),
                exchange_session: std::sync::Mutex::new(None),
                exchange_calls: AtomicUsize::new(0),
                verify_session: std::sync::Mutex::new(None),
                verify_rejects: AtomicBool::new(false),
                onboarding_row: std::sync::Mutex::new(None),
                fetch_fails: AtomicBool::new(false),
                hold_fetch: AtomicBool::new(false),
                fetch_entered: Notify::new(),
                release_fetch: Notify::new(),
                update_profile_fails: AtomicBool::new(false),
                create_duplicate: AtomicBool::new(false),
                created_profiles: std::sync::Mutex::new(Vec::new()),
                updated_profiles: std::sync::Mutex::new(Vec::new()),
                password_updates: std::sync::Mutex::new(Vec::new()),
                otp_sends: std::sync::Mutex::new(Vec::new()),
                events,
            }
        }

        fn rejection() -> IdentityError {
            IdentityError::Provider {
                code: "invalid_grant".to_string(),
                message: "Invalid login credentials".to_string(),
            }
        }
    }

    #[async_trait::async_trait]
    impl IdentityProvider for FakeProvider {
        async fn sign_in_with_password(
            &self,
            _email: &str,
            _password: &str,
        ) -> IdentityResult<Session> {
            self.issued_session
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(Self::rejection)
        }

        async fn sign_up(&self, _request: &SignUpRequest) -> IdentityResult<SignUpOutcome> {
            self.sign_up_outcome
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(Self::rejection)
        }

        async fn sign_out(&self, _access_token: &str) -> IdentityResult<()> {
            Ok(())
        }

        async fn send_password_reset(
            &self,
            email: &str,
            _redirect_to: Option<&str>,
        ) -> IdentityResult<()> {
            self.otp_sends.lock().unwrap().push(format!("email:{email}"));
            Ok(())
        }

        async fn resend_signup_verification(&self, _email: &str) -> IdentityResult<()> {
            Ok(())
        }

        async fn send_sms_otp(&self, phone: &str) -> IdentityResult<()> {
            self.otp_sends.lock().unwrap().push(format!("sms:{phone}"));
            Ok(())
        }

        async fn verify_otp(
            &self,
            _destination: &OtpDestination,
            _token: &str,
            _verification_type: &str,
        ) -> IdentityResult<Option<Session>> {
            if self.verify_rejects.load(Ordering::SeqCst) {
                return Err(Self::rejection());
            }
            Ok(self.verify_session.lock().unwrap().clone())
        }

        async fn update_password(
            &self,
            _access_token: &str,
            new_password: &str,
        ) -> IdentityResult<()> {
            self.password_updates
                .lock()
                .unwrap()
                .push(new_password.to_string());
            Ok(())
        }

        async fn refresh_session(&self, _refresh_token: &str) -> IdentityResult<Session> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_transient.load(Ordering::SeqCst) {
                return Err(IdentityError::Provider {
                    code: "503".to_string(),
                    message: "service unavailable".to_string(),
                });
            }
            self.refresh_session
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(Self::rejection)
        }

        async fn exchange_code(&self, _code: &str) -> IdentityResult<Session> {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            self.exchange_session
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(Self::rejection)
        }

        fn authorize_url(&self, provider: &str, redirect_to: &str) -> String {
            format!("https://auth.example/authorize?provider={provider}&redirect_to={redirect_to}")
        }

        async fn sign_in_with_id_token(
            &self,
            _provider: &str,
            _id_token: &str,
            _nonce: Option<&str>,
        ) -> IdentityResult<Session> {
            self.issued_session
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(Self::rejection)
        }

        async fn fetch_onboarding_complete(
            &self,
            _user_id: &str,
            _access_token: &str,
        ) -> IdentityResult<Option<bool>> {
            if self.hold_fetch.load(Ordering::SeqCst) {
                self.fetch_entered.notify_one();
                self.release_fetch.notified().await;
            }
            if self.fetch_fails.load(Ordering::SeqCst) {
                return Err(IdentityError::Provider {
                    code: "503".to_string(),
                    message: "profile service unavailable".to_string(),
                });
            }
            Ok(*self.onboarding_row.lock().unwrap())
        }

        async fn create_profile(
            &self,
            user_id: &str,
            _access_token: &str,
            _onboarding_completed: bool,
        ) -> IdentityResult<()> {
            if self.create_duplicate.load(Ordering::SeqCst) {
                return Err(IdentityError::Provider {
                    code: "23505".to_string(),
                    message: "duplicate key value".to_string(),
                });
            }
            self.created_profiles.lock().unwrap().push(user_id.to_string());
            Ok(())
        }

        async fn update_profile(
            &self,
            _user_id: &str,
            _access_token: &str,
            profile: &Profile,
        ) -> IdentityResult<()> {
            if self.update_profile_fails.load(Ordering::SeqCst) {
                return Err(Self::rejection());
            }
            self.updated_profiles.lock().unwrap().push(profile.clone());
            Ok(())
        }

        fn subscribe_session_changes(&self) -> identity_client::SessionChanges {
            self.events.subscribe()
        }
    }

    struct MemorySecureStore {
        data: std::sync::Mutex<HashMap<String, String>>,
    }

    impl MemorySecureStore {
        fn new() -> Self {
            Self {
                data: std::sync::Mutex::new(HashMap::new()),
            }
        }
    }

    impl SecureStore for MemorySecureStore {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn delete(&self, key: &str) -> StorageResult<bool> {
            Ok(self.data.lock().unwrap().remove(key).is_some())
        }
    }

    struct FakeGate {
        hardware: AtomicBool,
        enrolled: AtomicBool,
        prompt_succeeds: AtomicBool,
    }

    impl FakeGate {
        fn available() -> Self {
            Self {
                hardware: AtomicBool::new(true),
                enrolled: AtomicBool::new(true),
                prompt_succeeds: AtomicBool::new(true),
            }
        }
    }

    #[async_trait::async_trait]
    impl BiometricGate for FakeGate {
        async fn availability(&self) -> BiometricResult<BiometricAvailability> {
            Ok(BiometricAvailability {
                hardware_present: self.hardware.load(Ordering::SeqCst),
                enrolled: self.enrolled.load(Ordering::SeqCst),
            })
        }

        async fn authenticate(&self, _reason: &str) -> BiometricResult<()> {
            if self.prompt_succeeds.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(BiometricError::AuthenticationFailed(
                    "prompt dismissed".to_string(),
                ))
            }
        }
    }

    struct FakeNative;

    #[async_trait::async_trait]
    impl NativeSignIn for FakeNative {
        async fn acquire_credentials(&self) -> crate::LifecycleResult<NativeCredentials> {
            Ok(NativeCredentials {
                id_token: "native-id-token".to_string(),
                nonce: Some("nonce".to_string()),
            })
        }
    }

    struct FakeBrowser {
        launched: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl BrowserLauncher for FakeBrowser {
        async fn open_in_app(&self, url: &str) -> crate::LifecycleResult<()> {
            self.launched.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    struct FakeSink {
        fail: AtomicBool,
        registrations: std::sync::Mutex<Vec<WebRegistration>>,
        pushes: std::sync::Mutex<Vec<WebProfilePayload>>,
        done: Notify,
    }

    impl FakeSink {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                registrations: std::sync::Mutex::new(Vec::new()),
                pushes: std::sync::Mutex::new(Vec::new()),
                done: Notify::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl ProfileSyncSink for FakeSink {
        async fn register_user(&self, registration: &WebRegistration) -> SyncResult<String> {
            if self.fail.load(Ordering::SeqCst) {
                self.done.notify_one();
                return Err(SyncError::Rejected {
                    status: 500,
                    message: "web system down".to_string(),
                });
            }
            self.registrations.lock().unwrap().push(registration.clone());
            Ok("web-token".to_string())
        }

        async fn push_profile(
            &self,
            _access_token: &str,
            payload: &WebProfilePayload,
        ) -> SyncResult<()> {
            let result = if self.fail.load(Ordering::SeqCst) {
                Err(SyncError::Rejected {
                    status: 500,
                    message: "web system down".to_string(),
                })
            } else {
                self.pushes.lock().unwrap().push(payload.clone());
                Ok(())
            };
            self.done.notify_one();
            result
        }
    }

    struct Harness {
        provider: Arc<FakeProvider>,
        kv: Arc<MemoryKvStore>,
        vault: Arc<CredentialVault>,
        gate: Arc<FakeGate>,
        browser: Arc<FakeBrowser>,
        sink: Arc<FakeSink>,
        manager: Arc<SessionLifecycleManager>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_kv(Arc::new(MemoryKvStore::new()))
        }

        fn with_kv(kv: Arc<MemoryKvStore>) -> Self {
            let provider = Arc::new(FakeProvider::new());
            let vault = Arc::new(CredentialVault::new(Box::new(MemorySecureStore::new())));
            let gate = Arc::new(FakeGate::available());
            let browser = Arc::new(FakeBrowser {
                launched: std::sync::Mutex::new(Vec::new()),
            });
            let sink = Arc::new(FakeSink::new());

            let manager = Arc::new(SessionLifecycleManager::new(
                provider.clone(),
                kv.clone(),
                vault.clone(),
                gate.clone(),
                Arc::new(FakeNative),
                browser.clone(),
                sink.clone(),
                "thrive://auth/callback",
            ));

            Self {
                provider,
                kv,
                vault,
                gate,
                browser,
                sink,
                manager,
            }
        }

        async fn init(&self) {
            self.manager.clone().init().await;
        }

        /// Sign the harness in directly through the provider path.
        async fn signed_in(&self, user_id: &str) -> Session {
            let session = test_session(user_id);
            *self.provider.issued_session.lock().unwrap() = Some(session.clone());
            *self.provider.onboarding_row.lock().unwrap() = Some(true);
            let outcome = self.manager.sign_in(&format!("{user_id}@example.com"), "pw").await;
            assert!(outcome.success);
            session
        }

        async fn wait_for_sink(&self) {
            tokio::time::timeout(std::time::Duration::from_secs(1), self.sink.done.notified())
                .await
                .expect("web-system sync did not run");
        }
    }

    async fn wait_for_session(manager: &SessionLifecycleManager, expected: Option<&Session>) {
        let mut rx = manager.subscribe();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                if manager.session().as_ref() == expected {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("session did not converge");
    }

    // ==========================================
    // Startup
    // ==========================================

    #[tokio::test]
    async fn test_cold_start_without_session_is_signed_out() {
        let harness = Harness::new();
        assert_eq!(harness.manager.status(), AuthStatus::Loading);

        harness.init().await;

        assert_eq!(harness.manager.status(), AuthStatus::SignedOut);
        // Signed-out users are never shown onboarding.
        assert!(harness.manager.onboarding_complete());
    }

    #[tokio::test]
    async fn test_cold_start_restores_persisted_session_unchanged() {
        let kv = Arc::new(MemoryKvStore::new());
        let stored = test_session("user-1");
        kv.set(
            StorageKeys::SESSION,
            &serde_json::to_string(&stored).unwrap(),
        )
        .unwrap();
        kv.set(StorageKeys::ONBOARDING_COMPLETE, "true").unwrap();

        let harness = Harness::with_kv(kv);
        harness.init().await;

        // Byte-identical fields, no refresh round-trip.
        assert_eq!(harness.manager.session(), Some(stored));
        assert_eq!(harness.provider.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.manager.status(), AuthStatus::SignedIn);
    }

    #[tokio::test]
    async fn test_cold_start_refreshes_expired_session() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(
            StorageKeys::SESSION,
            &serde_json::to_string(&expired_session("user-1")).unwrap(),
        )
        .unwrap();
        kv.set(StorageKeys::ONBOARDING_COMPLETE, "true").unwrap();

        let harness = Harness::with_kv(kv);
        let fresh = test_session("user-1");
        *harness.provider.refresh_session.lock().unwrap() = Some(fresh.clone());
        harness.init().await;

        assert_eq!(harness.provider.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.manager.session(), Some(fresh));
    }

    #[tokio::test]
    async fn test_cold_start_rejected_refresh_clears_session() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(
            StorageKeys::SESSION,
            &serde_json::to_string(&expired_session("user-1")).unwrap(),
        )
        .unwrap();

        let harness = Harness::with_kv(kv);
        // refresh_session left at None => provider rejection
        harness.init().await;

        assert_eq!(harness.manager.session(), None);
        assert_eq!(harness.manager.status(), AuthStatus::SignedOut);
        assert_eq!(harness.kv.get(StorageKeys::SESSION).unwrap(), None);
    }

    #[tokio::test]
    async fn test_cold_start_corrupt_session_blob_fails_open() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(StorageKeys::SESSION, "not-json{{{").unwrap();

        let harness = Harness::with_kv(kv);
        harness.init().await;

        assert_eq!(harness.manager.status(), AuthStatus::SignedOut);
    }

    #[tokio::test]
    async fn test_init_purges_stale_biometric_credential() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(StorageKeys::BIOMETRIC_ENABLED, "true").unwrap();

        let harness = Harness::with_kv(kv);
        harness.vault.set_biometric_refresh_token("stale").unwrap();
        harness.gate.enrolled.store(false, Ordering::SeqCst);
        harness.init().await;

        assert!(!harness.manager.biometrics_enabled());
        assert_eq!(harness.vault.get_biometric_refresh_token().unwrap(), None);
        assert_eq!(
            harness.kv.get(StorageKeys::BIOMETRIC_ENABLED).unwrap(),
            Some("false".to_string())
        );
    }

    #[tokio::test]
    async fn test_provider_push_wins_last_write() {
        let harness = Harness::new();
        harness.init().await;

        let pushed = test_session("pushed-user");
        harness.provider.events.send(Some(pushed.clone())).unwrap();
        wait_for_session(&harness.manager, Some(&pushed)).await;
        assert_eq!(
            harness.kv.get(StorageKeys::SESSION).unwrap(),
            Some(serde_json::to_string(&pushed).unwrap())
        );

        // Provider revokes: local state follows.
        harness.provider.events.send(None).unwrap();
        wait_for_session(&harness.manager, None).await;
        assert_eq!(harness.kv.get(StorageKeys::SESSION).unwrap(), None);
    }

    // ==========================================
    // Sign-in / sign-up / sign-out
    // ==========================================

    #[tokio::test]
    async fn test_sign_in_resolves_onboarding_from_profile() {
        let harness = Harness::new();
        harness.init().await;

        *harness.provider.issued_session.lock().unwrap() = Some(test_session("user-1"));
        *harness.provider.onboarding_row.lock().unwrap() = Some(true);

        let outcome = harness.manager.sign_in("user-1@example.com", "pw").await;
        assert!(outcome.success);
        assert_eq!(harness.manager.status(), AuthStatus::SignedIn);
        assert_eq!(
            harness.kv.get(StorageKeys::ONBOARDING_COMPLETE).unwrap(),
            Some("true".to_string())
        );
    }

    #[tokio::test]
    async fn test_sign_in_profile_fetch_failure_forces_onboarding() {
        let harness = Harness::new();
        harness.init().await;

        *harness.provider.issued_session.lock().unwrap() = Some(test_session("user-1"));
        harness.provider.fetch_fails.store(true, Ordering::SeqCst);

        let outcome = harness.manager.sign_in("user-1@example.com", "pw").await;
        assert!(outcome.success);
        // Fail-safe toward re-onboarding, never toward signed-in.
        assert_eq!(harness.manager.status(), AuthStatus::Onboarding);
    }

    #[tokio::test]
    async fn test_sign_in_rejection_surfaces_error() {
        let harness = Harness::new();
        harness.init().await;

        let outcome = harness.manager.sign_in("user-1@example.com", "wrong").await;
        assert!(!outcome.success);
        assert!(outcome
            .error
            .unwrap()
            .contains("Invalid login credentials"));
        assert_eq!(harness.manager.status(), AuthStatus::SignedOut);
    }

    #[tokio::test]
    async fn test_sign_in_withholds_session_until_onboarding_resolves() {
        let harness = Harness::new();
        harness.init().await;

        *harness.provider.issued_session.lock().unwrap() = Some(test_session("user-1"));
        *harness.provider.onboarding_row.lock().unwrap() = Some(true);
        harness.provider.hold_fetch.store(true, Ordering::SeqCst);

        let manager = harness.manager.clone();
        let sign_in =
            tokio::spawn(async move { manager.sign_in("user-1@example.com", "pw").await });

        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            harness.provider.fetch_entered.notified(),
        )
        .await
        .expect("onboarding fetch never started");

        // The profile round-trip is still in flight: nothing is published
        // yet, so observers cannot see the session with a stale flag.
        assert_eq!(harness.manager.status(), AuthStatus::SignedOut);
        assert_eq!(harness.manager.session(), None);

        harness.provider.release_fetch.notify_one();
        let outcome = sign_in.await.unwrap();
        assert!(outcome.success);
        assert_eq!(harness.manager.status(), AuthStatus::SignedIn);
    }

    #[tokio::test]
    async fn test_sign_up_with_immediate_session_starts_onboarding() {
        let harness = Harness::new();
        harness.init().await;

        let session = test_session("new-user");
        *harness.provider.sign_up_outcome.lock().unwrap() = Some(SignUpOutcome {
            session: Some(session.clone()),
            user_id: Some(session.user.id.clone()),
        });

        let outcome = harness
            .manager
            .sign_up("new@example.com", "pw", "New User", None)
            .await;
        assert!(outcome.success);
        assert!(!outcome.needs_verification);
        assert!(!harness.manager.onboarding_complete());
        assert_eq!(harness.manager.status(), AuthStatus::Onboarding);
        assert_eq!(
            *harness.provider.created_profiles.lock().unwrap(),
            vec!["new-user".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sign_up_without_session_needs_verification() {
        let harness = Harness::new();
        harness.init().await;

        *harness.provider.sign_up_outcome.lock().unwrap() = Some(SignUpOutcome {
            session: None,
            user_id: Some("new-user".to_string()),
        });

        let outcome = harness
            .manager
            .sign_up("new@example.com", "pw", "New User", None)
            .await;
        assert!(outcome.success);
        assert!(outcome.needs_verification);
        // Nothing persisted until the user verifies.
        assert_eq!(harness.kv.get(StorageKeys::SESSION).unwrap(), None);
        assert_eq!(harness.manager.status(), AuthStatus::SignedOut);
    }

    #[tokio::test]
    async fn test_sign_up_tolerates_duplicate_profile_row() {
        let harness = Harness::new();
        harness.init().await;

        let session = test_session("returning-user");
        *harness.provider.sign_up_outcome.lock().unwrap() = Some(SignUpOutcome {
            session: Some(session.clone()),
            user_id: Some(session.user.id.clone()),
        });
        harness.provider.create_duplicate.store(true, Ordering::SeqCst);

        let outcome = harness
            .manager
            .sign_up("returning@example.com", "pw", "Returning", None)
            .await;
        assert!(outcome.success);
        assert_eq!(harness.manager.status(), AuthStatus::Onboarding);
    }

    #[tokio::test]
    async fn test_sign_out_is_idempotent() {
        let harness = Harness::new();
        harness.init().await;
        harness.signed_in("user-1").await;
        harness.vault.set_web_system_token("web-token").unwrap();

        let first = harness.manager.sign_out().await;
        assert!(first.success);
        assert_eq!(harness.manager.session(), None);
        assert_eq!(harness.manager.status(), AuthStatus::SignedOut);
        assert_eq!(harness.vault.get_web_system_token().unwrap(), None);

        let second = harness.manager.sign_out().await;
        assert!(second.success);
        assert!(second.error.is_none());
        assert_eq!(harness.manager.status(), AuthStatus::SignedOut);
    }

    // ==========================================
    // OAuth / deep links
    // ==========================================

    #[tokio::test]
    async fn test_redirect_provider_opens_browser_with_callback() {
        let harness = Harness::new();
        harness.init().await;

        let outcome = harness.manager.sign_in_with_provider("google").await;
        assert!(outcome.success);
        // Launch only; no session until the deep link arrives.
        assert_eq!(harness.manager.session(), None);

        let launched = harness.browser.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert!(launched[0].contains("provider=google"));
        assert!(launched[0].contains("thrive://auth/callback"));
    }

    #[tokio::test]
    async fn test_native_provider_signs_in_and_creates_profile() {
        let harness = Harness::new();
        harness.init().await;

        *harness.provider.issued_session.lock().unwrap() = Some(test_session("apple-user"));
        // No profile row yet.

        let outcome = harness.manager.sign_in_with_provider("apple").await;
        assert!(outcome.success);
        assert_eq!(harness.manager.status(), AuthStatus::Onboarding);
        assert_eq!(
            *harness.provider.created_profiles.lock().unwrap(),
            vec!["apple-user".to_string()]
        );
    }

    #[tokio::test]
    async fn test_deep_link_error_surfaces_without_mutation() {
        let harness = Harness::new();
        harness.init().await;

        let outcome = harness
            .manager
            .handle_auth_redirect("thrive://auth/callback?error_description=access_denied")
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("access_denied"));
        assert_eq!(harness.manager.session(), None);
        assert_eq!(harness.provider.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deep_link_code_exchanges_once_and_persists() {
        let harness = Harness::new();
        harness.init().await;

        let session = test_session("oauth-user");
        *harness.provider.exchange_session.lock().unwrap() = Some(session.clone());
        *harness.provider.onboarding_row.lock().unwrap() = Some(true);

        let outcome = harness
            .manager
            .handle_auth_redirect("thrive://auth/callback?code=abc")
            .await;
        assert!(outcome.success);
        assert_eq!(harness.provider.exchange_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.manager.session(), Some(session.clone()));
        assert_eq!(
            harness.kv.get(StorageKeys::SESSION).unwrap(),
            Some(serde_json::to_string(&session).unwrap())
        );
        assert_eq!(harness.manager.status(), AuthStatus::SignedIn);
    }

    #[tokio::test]
    async fn test_unrelated_deep_link_is_a_no_op() {
        let harness = Harness::new();
        harness.init().await;

        let outcome = harness.manager.handle_auth_redirect("thrive://bookings/42").await;
        assert!(outcome.success);
        assert_eq!(harness.manager.session(), None);
    }

    #[tokio::test]
    async fn test_launch_url_adapter_completes_oauth() {
        let harness = Harness::new();
        harness.init().await;

        let session = test_session("oauth-user");
        *harness.provider.exchange_session.lock().unwrap() = Some(session.clone());
        *harness.provider.onboarding_row.lock().unwrap() = Some(true);

        // Cold starts without a launch URL do nothing.
        crate::deep_link::handle_launch_url(&harness.manager, None).await;
        assert_eq!(harness.provider.exchange_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.manager.session(), None);

        crate::deep_link::handle_launch_url(
            &harness.manager,
            Some("thrive://auth/callback?code=abc"),
        )
        .await;
        assert_eq!(harness.provider.exchange_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.manager.session(), Some(session));
        assert_eq!(harness.manager.status(), AuthStatus::SignedIn);
    }

    #[tokio::test]
    async fn test_url_event_adapter_completes_oauth() {
        let harness = Harness::new();
        harness.init().await;

        let session = test_session("oauth-user");
        *harness.provider.exchange_session.lock().unwrap() = Some(session.clone());
        *harness.provider.onboarding_row.lock().unwrap() = Some(true);

        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        let adapter = crate::deep_link::attach_url_events(harness.manager.clone(), events_rx);

        events_tx.send("thrive://bookings/42".to_string()).unwrap();
        events_tx
            .send("thrive://auth/callback?code=abc".to_string())
            .unwrap();

        wait_for_session(&harness.manager, Some(&session)).await;
        assert_eq!(harness.provider.exchange_calls.load(Ordering::SeqCst), 1);

        // The adapter stops once the event stream closes.
        drop(events_tx);
        tokio::time::timeout(std::time::Duration::from_secs(1), adapter)
            .await
            .expect("url-event adapter did not stop")
            .unwrap();
    }

    // ==========================================
    // Biometrics
    // ==========================================

    #[tokio::test]
    async fn test_enable_biometrics_requires_session() {
        let harness = Harness::new();
        harness.init().await;

        let outcome = harness.manager.enable_biometrics().await;
        assert!(!outcome.success);
        assert_eq!(harness.vault.get_biometric_refresh_token().unwrap(), None);
        assert!(!harness.manager.biometrics_enabled());
    }

    #[tokio::test]
    async fn test_enable_biometrics_requires_enrollment() {
        let harness = Harness::new();
        harness.init().await;
        harness.signed_in("user-1").await;
        harness.gate.enrolled.store(false, Ordering::SeqCst);

        let outcome = harness.manager.enable_biometrics().await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("enrolled"));
        assert_eq!(harness.vault.get_biometric_refresh_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_enable_biometrics_requires_fresh_confirmation() {
        let harness = Harness::new();
        harness.init().await;
        harness.signed_in("user-1").await;
        harness.gate.prompt_succeeds.store(false, Ordering::SeqCst);

        let outcome = harness.manager.enable_biometrics().await;
        assert!(!outcome.success);
        assert_eq!(harness.vault.get_biometric_refresh_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_enable_biometrics_stores_refresh_token() {
        let harness = Harness::new();
        harness.init().await;
        let session = harness.signed_in("user-1").await;

        let outcome = harness.manager.enable_biometrics().await;
        assert!(outcome.success);
        assert!(harness.manager.biometrics_enabled());
        assert_eq!(
            harness.vault.get_biometric_refresh_token().unwrap(),
            Some(session.refresh_token)
        );
        assert_eq!(
            harness.kv.get(StorageKeys::BIOMETRIC_ENABLED).unwrap(),
            Some("true".to_string())
        );
    }

    #[tokio::test]
    async fn test_biometric_sign_in_hardware_loss_self_heals() {
        let harness = Harness::new();
        harness.init().await;
        harness.vault.set_biometric_refresh_token("stored").unwrap();
        harness.manager.set_biometrics_enabled(true);
        harness.gate.hardware.store(false, Ordering::SeqCst);

        let outcome = harness.manager.sign_in_with_biometrics().await;
        assert!(!outcome.success);
        assert!(!harness.manager.biometrics_enabled());
        assert_eq!(harness.vault.get_biometric_refresh_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_biometric_sign_in_provider_rejection_disables() {
        let harness = Harness::new();
        harness.init().await;
        harness.vault.set_biometric_refresh_token("revoked").unwrap();
        harness.manager.set_biometrics_enabled(true);
        // refresh_session left at None => provider rejection

        let outcome = harness.manager.sign_in_with_biometrics().await;
        assert!(!outcome.success);
        assert!(!harness.manager.biometrics_enabled());
        assert_eq!(harness.vault.get_biometric_refresh_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_biometric_sign_in_transient_failure_keeps_enabled() {
        let harness = Harness::new();
        harness.init().await;
        harness.vault.set_biometric_refresh_token("stored").unwrap();
        harness.manager.set_biometrics_enabled(true);
        harness.provider.refresh_transient.store(true, Ordering::SeqCst);

        let outcome = harness.manager.sign_in_with_biometrics().await;
        assert!(!outcome.success);
        assert!(harness.manager.biometrics_enabled());
        assert_eq!(
            harness.vault.get_biometric_refresh_token().unwrap(),
            Some("stored".to_string())
        );
    }

    #[tokio::test]
    async fn test_biometric_sign_in_rotates_stored_token() {
        let harness = Harness::new();
        harness.init().await;
        harness.vault.set_biometric_refresh_token("old-token").unwrap();
        harness.manager.set_biometrics_enabled(true);

        let fresh = test_session("user-1");
        *harness.provider.refresh_session.lock().unwrap() = Some(fresh.clone());

        let outcome = harness.manager.sign_in_with_biometrics().await;
        assert!(outcome.success);
        assert_eq!(harness.manager.session(), Some(fresh.clone()));
        assert_eq!(
            harness.vault.get_biometric_refresh_token().unwrap(),
            Some(fresh.refresh_token)
        );
    }

    // ==========================================
    // Onboarding completion
    // ==========================================

    fn onboarding_profile() -> Profile {
        Profile {
            full_name: Some("Test User".to_string()),
            primary_goal: Some("general_fitness".to_string()),
            ..Profile::default()
        }
    }

    #[tokio::test]
    async fn test_complete_onboarding_signs_in_and_syncs() {
        let harness = Harness::new();
        harness.init().await;
        harness.signed_in("user-1").await;
        harness.manager.set_onboarding_complete(false);

        let outcome = harness.manager.complete_onboarding(onboarding_profile()).await;
        assert!(outcome.success);
        assert_eq!(harness.manager.status(), AuthStatus::SignedIn);
        assert_eq!(harness.provider.updated_profiles.lock().unwrap().len(), 1);

        harness.wait_for_sink().await;
        assert_eq!(harness.sink.registrations.lock().unwrap().len(), 1);
        let pushes = harness.sink.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].primary_goal.as_deref(), Some("general_fitness"));
        assert_eq!(
            harness.vault.get_web_system_token().unwrap(),
            Some("web-token".to_string())
        );
    }

    #[tokio::test]
    async fn test_complete_onboarding_survives_sink_failure() {
        let harness = Harness::new();
        harness.init().await;
        harness.signed_in("user-1").await;
        harness.manager.set_onboarding_complete(false);
        harness.sink.fail.store(true, Ordering::SeqCst);

        let outcome = harness.manager.complete_onboarding(onboarding_profile()).await;
        assert!(outcome.success);

        harness.wait_for_sink().await;
        // The web system being down never rolls the user back to onboarding.
        assert_eq!(harness.manager.status(), AuthStatus::SignedIn);
    }

    #[tokio::test]
    async fn test_complete_onboarding_provider_failure_reverts_flag() {
        let harness = Harness::new();
        harness.init().await;
        harness.signed_in("user-1").await;
        harness.manager.set_onboarding_complete(false);
        harness.provider.update_profile_fails.store(true, Ordering::SeqCst);

        let outcome = harness.manager.complete_onboarding(onboarding_profile()).await;
        assert!(!outcome.success);
        assert_eq!(harness.manager.status(), AuthStatus::Onboarding);
        assert_eq!(
            harness.kv.get(StorageKeys::ONBOARDING_COMPLETE).unwrap(),
            Some("false".to_string())
        );
        assert!(harness.sink.registrations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_onboarding_reuses_existing_web_token() {
        let harness = Harness::new();
        harness.init().await;
        harness.signed_in("user-1").await;
        harness.manager.set_onboarding_complete(false);
        harness.vault.set_web_system_token("existing").unwrap();

        let outcome = harness.manager.complete_onboarding(onboarding_profile()).await;
        assert!(outcome.success);

        harness.wait_for_sink().await;
        assert!(harness.sink.registrations.lock().unwrap().is_empty());
        assert_eq!(harness.sink.pushes.lock().unwrap().len(), 1);
    }

    // ==========================================
    // OTP
    // ==========================================

    #[tokio::test]
    async fn test_send_otp_picks_channel_by_destination() {
        let harness = Harness::new();
        harness.init().await;

        let email = OtpDestination::Email("a@b.c".to_string());
        let phone = OtpDestination::Phone("+15550100".to_string());
        assert!(harness.manager.send_otp(&email).await.success);
        assert!(harness.manager.send_otp(&phone).await.success);

        assert_eq!(
            *harness.provider.otp_sends.lock().unwrap(),
            vec!["email:a@b.c".to_string(), "sms:+15550100".to_string()]
        );
    }

    #[tokio::test]
    async fn test_verify_otp_persists_issued_session() {
        let harness = Harness::new();
        harness.init().await;

        let session = test_session("otp-user");
        *harness.provider.verify_session.lock().unwrap() = Some(session.clone());

        let destination = OtpDestination::Phone("+15550100".to_string());
        let outcome = harness
            .manager
            .verify_otp(&destination, "123456", OtpPurpose::Sms)
            .await;
        assert!(outcome.success);
        assert_eq!(harness.manager.session(), Some(session));
    }

    #[tokio::test]
    async fn test_verify_otp_rejection_leaves_state_alone() {
        let harness = Harness::new();
        harness.init().await;
        harness.provider.verify_rejects.store(true, Ordering::SeqCst);

        let destination = OtpDestination::Email("a@b.c".to_string());
        let outcome = harness
            .manager
            .verify_otp(&destination, "000000", OtpPurpose::Reset)
            .await;
        assert!(!outcome.success);
        assert_eq!(harness.manager.session(), None);
    }

    #[tokio::test]
    async fn test_reset_password_with_otp_short_circuits_on_verify_failure() {
        let harness = Harness::new();
        harness.init().await;
        harness.provider.verify_rejects.store(true, Ordering::SeqCst);

        let outcome = harness
            .manager
            .reset_password_with_otp("a@b.c", "000000", "new-pass")
            .await;
        assert!(!outcome.success);
        assert!(harness.provider.password_updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_password_with_otp_updates_password() {
        let harness = Harness::new();
        harness.init().await;

        *harness.provider.verify_session.lock().unwrap() = Some(test_session("user-1"));

        let outcome = harness
            .manager
            .reset_password_with_otp("user-1@example.com", "123456", "new-pass")
            .await;
        assert!(outcome.success);
        assert_eq!(
            *harness.provider.password_updates.lock().unwrap(),
            vec!["new-pass".to_string()]
        );
        assert!(harness.manager.session().is_some());
    }
}
