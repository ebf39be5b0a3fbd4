//! Windows Credential Vault implementation.

use crate::{SecureStore, StorageError, StorageResult};
use tracing::debug;
use windows::{
    core::HSTRING,
    Security::Credentials::{PasswordCredential, PasswordVault},
};

/// Credential Vault based secure store for Windows.
pub struct CredentialStore {
    resource_name: String,
}

impl CredentialStore {
    /// Create a new Credential Vault store instance.
    pub fn new(service_name: &str) -> StorageResult<Self> {
        // Verify we can access the vault
        PasswordVault::new().map_err(|e| {
            StorageError::Platform(format!("Failed to access Credential Vault: {}", e))
        })?;

        Ok(Self {
            resource_name: service_name.to_string(),
        })
    }

    fn get_vault(&self) -> StorageResult<PasswordVault> {
        PasswordVault::new().map_err(|e| {
            StorageError::Platform(format!("Failed to access Credential Vault: {}", e))
        })
    }

    fn make_credential(&self, key: &str, value: &str) -> StorageResult<PasswordCredential> {
        let resource = HSTRING::from(&self.resource_name);
        let user_name = HSTRING::from(key);
        let password = HSTRING::from(value);

        PasswordCredential::CreatePasswordCredential(&resource, &user_name, &password)
            .map_err(|e| StorageError::Platform(format!("Failed to create credential: {}", e)))
    }
}

impl SecureStore for CredentialStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(resource = %self.resource_name, key = %key, "Setting credential");

        let vault = self.get_vault()?;

        // Delete existing credential first (ignore errors if it doesn't exist)
        let _ = self.delete(key);

        let credential = self.make_credential(key, value)?;
        vault
            .Add(&credential)
            .map_err(|e| StorageError::Platform(format!("Failed to add credential: {}", e)))?;

        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        debug!(resource = %self.resource_name, key = %key, "Getting credential");

        let vault = self.get_vault()?;
        let resource = HSTRING::from(&self.resource_name);
        let user_name = HSTRING::from(key);

        match vault.Retrieve(&resource, &user_name) {
            Ok(credential) => {
                // RetrievePassword populates the Password field
                credential.RetrievePassword().map_err(|e| {
                    StorageError::Platform(format!("Failed to retrieve password: {}", e))
                })?;

                let password = credential
                    .Password()
                    .map_err(|e| StorageError::Platform(format!("Failed to get password: {}", e)))?;

                Ok(Some(password.to_string()))
            }
            Err(e) => {
                // ERROR_NOT_FOUND = 0x80070490
                let error_code = e.code().0 as u32;
                if error_code == 0x80070490 {
                    Ok(None)
                } else {
                    Err(StorageError::Platform(format!(
                        "Failed to retrieve credential: {}",
                        e
                    )))
                }
            }
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(resource = %self.resource_name, key = %key, "Deleting credential");

        let vault = self.get_vault()?;
        let resource = HSTRING::from(&self.resource_name);
        let user_name = HSTRING::from(key);

        match vault.Retrieve(&resource, &user_name) {
            Ok(credential) => {
                vault.Remove(&credential).map_err(|e| {
                    StorageError::Platform(format!("Failed to remove credential: {}", e))
                })?;
                Ok(true)
            }
            Err(e) => {
                let error_code = e.code().0 as u32;
                if error_code == 0x80070490 {
                    Ok(false)
                } else {
                    Err(StorageError::Platform(format!(
                        "Failed to find credential for deletion: {}",
                        e
                    )))
                }
            }
        }
    }
}
