//! Best-effort profile mirror into the web system.
//!
//! The web system is a separate backend the app opportunistically mirrors
//! profile data into after onboarding. It is never authoritative for auth
//! state: every call here is fire-and-forget from the session lifecycle's
//! point of view, and failures are logged and swallowed.

mod client;
mod error;
mod sink;

pub use client::WebSystemClient;
pub use error::{SyncError, SyncResult};
pub use sink::{ProfileSyncSink, WebProfilePayload, WebRegistration};
