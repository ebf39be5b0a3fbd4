//! Browser launch seam for OAuth redirect providers.

use crate::{LifecycleError, LifecycleResult};
use async_trait::async_trait;

/// In-app browser session used for OAuth redirect sign-in.
///
/// Hosts with an embeddable browser (mobile custom tabs, webview) implement
/// this; when it reports unavailable, the manager falls back to the OS
/// default browser. Completion is always delivered via the auth redirect
/// deep link, never through this seam.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Open the URL in an in-app browser session.
    ///
    /// `Err(LifecycleError::BrowserUnavailable)` triggers the OS-browser
    /// fallback; any other error is surfaced to the caller.
    async fn open_in_app(&self, url: &str) -> LifecycleResult<()>;
}

/// Host without an in-app browser; every launch goes to the OS browser.
pub struct NoInAppBrowser;

#[async_trait]
impl BrowserLauncher for NoInAppBrowser {
    async fn open_in_app(&self, _url: &str) -> LifecycleResult<()> {
        Err(LifecycleError::BrowserUnavailable(
            "no in-app browser on this host".to_string(),
        ))
    }
}
