//! Password hashing off the async workers.
//!
//! Argon2id holds a CPU for tens of milliseconds, so every hash and verify
//! runs on the blocking pool, with at most `concurrency` in flight.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::utils::{hash_password, verify_password, Argon2Settings, Password, PasswordHashString};

#[derive(Clone)]
pub struct CredentialVault {
    settings: Argon2Settings,
    permits: Arc<Semaphore>,
}

impl CredentialVault {
    pub fn new(settings: Argon2Settings, concurrency: usize) -> Self {
        Self {
            settings,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub async fn hash(&self, password: Password) -> Result<PasswordHashString, anyhow::Error> {
        let permit = self.permits.clone().acquire_owned().await?;
        let settings = self.settings.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            hash_password(&password, &settings)
        })
        .await?
    }

    /// `Ok(false)` for a wrong password or an unparseable hash.
    pub async fn verify(
        &self,
        password: Password,
        password_hash: PasswordHashString,
    ) -> Result<bool, anyhow::Error> {
        let permit = self.permits.clone().acquire_owned().await?;

        let matches = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            verify_password(&password, &password_hash)
        })
        .await?;

        Ok(matches)
    }
}
