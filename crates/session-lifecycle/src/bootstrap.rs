//! Host composition helpers.

use crate::{BrowserLauncher, LifecycleResult, NativeSignIn, SessionLifecycleManager};
use app_config::{Config, Paths};
use biometric_gate::BiometricGate;
use client_storage::{create_credential_vault, FileKvStore};
use identity_client::GoTrueClient;
use profile_sync_sink::WebSystemClient;
use std::sync::Arc;
use tracing::info;

/// Wire up a manager against the real provider, the on-disk KV store, and
/// the platform secure store.
///
/// The three platform seams (biometrics, native sign-in, browser) are
/// host-specific and supplied by the caller. The returned manager still
/// needs `init()` driven on a runtime.
pub fn build_manager(
    config: &Config,
    biometrics: Arc<dyn BiometricGate>,
    native: Arc<dyn NativeSignIn>,
    browser: Arc<dyn BrowserLauncher>,
) -> LifecycleResult<Arc<SessionLifecycleManager>> {
    let paths = Paths::new()?;
    paths.ensure_dirs()?;

    let kv = Arc::new(FileKvStore::open(paths.kv_store_file())?);
    let vault = Arc::new(create_credential_vault()?);
    let provider = Arc::new(GoTrueClient::new(
        config.supabase_url.clone(),
        config.supabase_publishable_key.clone(),
    ));
    let sink = Arc::new(WebSystemClient::new(config.web_system_url.clone()));

    info!(base_dir = %paths.base_dir().display(), "Session lifecycle assembled");

    Ok(Arc::new(SessionLifecycleManager::new(
        provider,
        kv,
        vault,
        biometrics,
        native,
        browser,
        sink,
        config.auth_redirect_url.clone(),
    )))
}
