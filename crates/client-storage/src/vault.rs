//! High-level API for the secure credential store.

use crate::{SecureStore, StorageKeys, StorageResult};

/// Typed accessors over the platform secure store.
///
/// Holds exactly one biometric refresh token and the best-effort
/// web-system access token.
pub struct CredentialVault {
    store: Box<dyn SecureStore>,
}

impl CredentialVault {
    /// Create a new vault with the given secure store backend.
    pub fn new(store: Box<dyn SecureStore>) -> Self {
        Self { store }
    }

    // ==========================================
    // Biometric refresh token
    // ==========================================

    /// Store the refresh token released by a successful biometric prompt.
    pub fn set_biometric_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::BIOMETRIC_REFRESH_TOKEN, token)
    }

    /// Retrieve the biometric refresh token.
    pub fn get_biometric_refresh_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::BIOMETRIC_REFRESH_TOKEN)
    }

    /// Check whether a biometric refresh token is stored.
    pub fn has_biometric_refresh_token(&self) -> StorageResult<bool> {
        self.store.has(StorageKeys::BIOMETRIC_REFRESH_TOKEN)
    }

    /// Remove the biometric refresh token. Idempotent.
    pub fn clear_biometric_refresh_token(&self) -> StorageResult<()> {
        self.store.delete(StorageKeys::BIOMETRIC_REFRESH_TOKEN)?;
        Ok(())
    }

    // ==========================================
    // Web-system token (best-effort mirror backend)
    // ==========================================

    /// Store the web-system access token.
    pub fn set_web_system_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::WEB_SYSTEM_ACCESS_TOKEN, token)
    }

    /// Retrieve the web-system access token.
    pub fn get_web_system_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::WEB_SYSTEM_ACCESS_TOKEN)
    }

    /// Remove the web-system access token. Idempotent.
    pub fn clear_web_system_token(&self) -> StorageResult<()> {
        self.store.delete(StorageKeys::WEB_SYSTEM_ACCESS_TOKEN)?;
        Ok(())
    }

    /// Remove every credential this vault manages.
    pub fn clear_all(&self) -> StorageResult<()> {
        self.store.delete(StorageKeys::BIOMETRIC_REFRESH_TOKEN)?;
        self.store.delete(StorageKeys::WEB_SYSTEM_ACCESS_TOKEN)?;
        Ok(())
    }
}
