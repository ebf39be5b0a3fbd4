//! Storage abstractions for the Thrive client.
//!
//! Two stores back the session lifecycle:
//! - **Persistent KV store**: durable, non-secure key/value state that
//!   survives app restarts (session blob, onboarding flag, biometric flag).
//! - **Secure credential store**: platform-backed encryption-at-rest for
//!   the biometric refresh token and the web-system token:
//!   - **macOS**: Keychain Access via `security-framework`
//!   - **Linux**: Secret Service (GNOME Keyring / KWallet) via `secret-service`
//!   - **Windows**: Credential Vault via `windows` crate

mod keys;
mod kv;
mod traits;
mod vault;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "windows")]
mod windows;

pub use keys::StorageKeys;
pub use kv::{FileKvStore, KeyValueStore, MemoryKvStore};
pub use traits::SecureStore;
pub use vault::CredentialVault;

use thiserror::Error;

/// Service name used for all secure storage operations.
/// Must match the mobile app's service name to share keychain entries.
pub const SERVICE_NAME: &str = "club.thrive.app";

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default platform-specific secure store implementation.
pub fn create_secure_store() -> StorageResult<Box<dyn SecureStore>> {
    #[cfg(target_os = "macos")]
    {
        let store = macos::KeychainStore::new(SERVICE_NAME)?;
        Ok(Box::new(store))
    }

    #[cfg(target_os = "linux")]
    {
        let store = linux::SecretServiceStore::new(SERVICE_NAME)?;
        Ok(Box::new(store))
    }

    #[cfg(target_os = "windows")]
    {
        let store = windows::CredentialStore::new(SERVICE_NAME)?;
        Ok(Box::new(store))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(StorageError::Platform(
            "No secure storage implementation available for this platform".to_string(),
        ))
    }
}

/// Create a CredentialVault with the default platform secure store.
pub fn create_credential_vault() -> StorageResult<CredentialVault> {
    let store = create_secure_store()?;
    Ok(CredentialVault::new(store))
}
