//! Authentication and session lifecycle for the Thrive client.
//!
//! One [`SessionLifecycleManager`] instance owns the session, the
//! onboarding flag, and the biometric fast-login credential, and projects
//! them into a single derived [`AuthStatus`] the UI observes. Three feeds
//! can write the session (cold-start restore, provider push, OAuth deep
//! link); all of them funnel through one serialized write path, so
//! last-write-wins holds on the single session slot.
//!
//! The manager talks to its collaborators only through traits:
//! [`IdentityProvider`](identity_client::IdentityProvider) for the remote
//! auth service, [`KeyValueStore`](client_storage::KeyValueStore) and
//! [`CredentialVault`](client_storage::CredentialVault) for persistence,
//! [`BiometricGate`](biometric_gate::BiometricGate) for the device prompt,
//! and [`ProfileSyncSink`](profile_sync_sink::ProfileSyncSink) for the
//! fire-and-forget web-system mirror.

mod bootstrap;
mod browser;
mod deep_link;
mod error;
mod manager;
mod native;
mod outcome;
mod status;

pub use bootstrap::build_manager;
pub use browser::{BrowserLauncher, NoInAppBrowser};
pub use deep_link::{attach_url_events, handle_launch_url, AuthRedirect};
pub use error::{LifecycleError, LifecycleResult};
pub use manager::{AuthSnapshot, SessionLifecycleManager};
pub use native::{NativeCredentials, NativeSignIn, UnsupportedNativeSignIn};
pub use outcome::AuthOutcome;
pub use status::{resolve_status, AuthStatus};
