//! OAuth redirect deep links.
//!
//! The same logical event arrives over two mutually exclusive paths
//! depending on platform: a URL event while the app is running, or a launch
//! URL queried once at cold start. Both adapters below feed the manager's
//! single [`handle_auth_redirect`] entry point.
//!
//! [`handle_auth_redirect`]: crate::SessionLifecycleManager::handle_auth_redirect

use crate::SessionLifecycleManager;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// What an incoming URL means for authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRedirect {
    /// OAuth completed; the code must be exchanged for a session.
    AuthorizationCode(String),
    /// The provider reported a failure (e.g. user denied consent).
    Error(String),
    /// Not an auth redirect; ignore.
    Unrelated,
}

impl AuthRedirect {
    /// Classify an incoming URL.
    ///
    /// An error description takes precedence over a code; anything that
    /// carries neither (including unparseable URLs) is unrelated.
    pub fn parse(url: &str) -> Self {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                debug!(url = %url, error = %e, "Ignoring unparseable URL event");
                return AuthRedirect::Unrelated;
            }
        };

        let mut code = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "error_description" => return AuthRedirect::Error(value.into_owned()),
                "code" => code = Some(value.into_owned()),
                _ => {}
            }
        }

        match code {
            Some(code) => AuthRedirect::AuthorizationCode(code),
            None => AuthRedirect::Unrelated,
        }
    }
}

/// Cold-start adapter: feed the URL the app was launched with, if any.
pub async fn handle_launch_url(manager: &SessionLifecycleManager, launch_url: Option<&str>) {
    if let Some(url) = launch_url {
        debug!(url = %url, "Processing launch URL");
        let outcome = manager.handle_auth_redirect(url).await;
        if let Some(error) = outcome.error {
            warn!(error = %error, "Launch URL auth redirect failed");
        }
    }
}

/// Live-event adapter: drain OS URL events for the life of the app.
///
/// The returned handle is owned by the caller; aborting it detaches the
/// adapter without touching the manager.
pub fn attach_url_events(
    manager: Arc<SessionLifecycleManager>,
    mut events: mpsc::UnboundedReceiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(url) = events.recv().await {
            debug!(url = %url, "Processing URL event");
            let outcome = manager.handle_auth_redirect(&url).await;
            if let Some(error) = outcome.error {
                warn!(error = %error, "Auth redirect failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code() {
        assert_eq!(
            AuthRedirect::parse("thrive://auth/callback?code=abc123"),
            AuthRedirect::AuthorizationCode("abc123".to_string())
        );
    }

    #[test]
    fn test_parse_error_description_wins_over_code() {
        assert_eq!(
            AuthRedirect::parse(
                "thrive://auth/callback?error=access_denied&error_description=access_denied&code=abc"
            ),
            AuthRedirect::Error("access_denied".to_string())
        );
    }

    #[test]
    fn test_parse_unrelated() {
        assert_eq!(
            AuthRedirect::parse("thrive://bookings/42"),
            AuthRedirect::Unrelated
        );
        assert_eq!(AuthRedirect::parse("not a url"), AuthRedirect::Unrelated);
        assert_eq!(
            AuthRedirect::parse("thrive://auth/callback"),
            AuthRedirect::Unrelated
        );
    }

    #[test]
    fn test_parse_decodes_percent_encoding() {
        assert_eq!(
            AuthRedirect::parse(
                "thrive://auth/callback?error_description=User%20denied%20access"
            ),
            AuthRedirect::Error("User denied access".to_string())
        );
    }
}
