//! # Administrative Access
//!
//! Two gates guard staff functions:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Back office login   ──►  AdminSecret   (salted argon2 hash in a file)  │
//! │  Terminal admin mode ──►  AdminAccess   (PIN setting, or a token that   │
//! │                                          belongs to an admin account)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The secret file is replaced by writing `<path>.tmp`, syncing it and
//! renaming over the old file, so a crash leaves either the old or the new
//! hash on disk. Until the first change the factory default applies.
//!
//! [`AdminSecret`] does blocking file I/O and hashing; async callers should
//! run it under `spawn_blocking`.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use kasse_core::{Account, Clock};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::DbResult;
use crate::repository::account::AccountRepository;
use crate::settings::Settings;

/// Secret accepted while no secret file exists.
pub const FACTORY_DEFAULT_SECRET: &str = "admin";

/// Errors from the administrator secret file.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Secret file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Secret hashing failed: {0}")]
    Hash(String),

    #[error("Secret must not be empty")]
    EmptySecret,
}

// =============================================================================
// Back Office Secret
// =============================================================================

/// The back-office administrator secret, stored as an argon2 PHC string.
#[derive(Debug, Clone)]
pub struct AdminSecret {
    path: PathBuf,
}

impl AdminSecret {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AdminSecret { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while the secret was never changed.
    pub fn is_factory_default(&self) -> bool {
        !self.path.exists()
    }

    /// Checks `candidate` against the stored secret.
    ///
    /// ## Returns
    /// * `Ok(true)` - Matches
    /// * `Ok(false)` - Does not match
    /// * `Err(_)` - The file exists but could not be read or parsed
    pub fn verify(&self, candidate: &str) -> Result<bool, AccessError> {
        let stored = match fs::read_to_string(&self.path) {
            Ok(stored) => stored,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(candidate == FACTORY_DEFAULT_SECRET);
            }
            Err(e) => return Err(AccessError::Io(e)),
        };

        let parsed = PasswordHash::new(stored.trim()).map_err(|e| {
            warn!(path = %self.path.display(), "Secret file is not a valid hash");
            AccessError::Hash(e.to_string())
        })?;

        Ok(Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok())
    }

    /// Replaces the stored secret with a fresh salted hash of `new_secret`.
    pub fn set(&self, new_secret: &str) -> Result<(), AccessError> {
        if new_secret.is_empty() {
            return Err(AccessError::EmptySecret);
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(new_secret.as_bytes(), &salt)
            .map_err(|e| AccessError::Hash(e.to_string()))?
            .to_string();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(hash.as_bytes())?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        info!(path = %self.path.display(), "Administrator secret replaced");
        Ok(())
    }
}

// =============================================================================
// Terminal Admin Mode
// =============================================================================

/// Checks for entering admin mode on the terminal.
#[derive(Debug, Clone)]
pub struct AdminAccess {
    settings: Settings,
    accounts: AccountRepository,
    clock: Arc<dyn Clock>,
}

impl AdminAccess {
    pub fn new(settings: Settings, accounts: AccountRepository, clock: Arc<dyn Clock>) -> Self {
        AdminAccess {
            settings,
            accounts,
            clock,
        }
    }

    /// True when `pin` equals the configured admin PIN.
    pub async fn check_pin(&self, pin: &str) -> DbResult<bool> {
        let expected = self.settings.admin_pin().await?;
        Ok(!expected.is_empty() && pin.trim() == expected)
    }

    /// Returns the admin account owning `token`, if it may grant admin mode today.
    pub async fn check_admin_token(&self, token: &str) -> DbResult<Option<Account>> {
        let today = self.clock.today();
        let account = self.accounts.find_by_token(token).await?;
        Ok(account.filter(|a| a.grants_admin_on(today)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use kasse_core::{AccountCategory, AccountDraft, SettingKey, SystemClock};

    #[test]
    fn test_factory_default_until_first_change() {
        let dir = tempfile::tempdir().unwrap();
        let secret = AdminSecret::new(dir.path().join("admin_secret"));

        assert!(secret.is_factory_default());
        assert!(secret.verify(FACTORY_DEFAULT_SECRET).unwrap());
        assert!(!secret.verify("letmein").unwrap());

        secret.set("s3cret-pass").unwrap();
        assert!(!secret.is_factory_default());
        assert!(secret.verify("s3cret-pass").unwrap());
        assert!(!secret.verify(FACTORY_DEFAULT_SECRET).unwrap());
        assert!(!dir.path().join("admin_secret.tmp").exists());

        // Stored as a salted hash, never in plain form
        let stored = fs::read_to_string(secret.path()).unwrap();
        assert!(stored.starts_with("$argon2"));
        assert!(!stored.contains("s3cret-pass"));
    }

    #[test]
    fn test_set_replaces_previous_secret() {
        let dir = tempfile::tempdir().unwrap();
        let secret = AdminSecret::new(dir.path().join("nested").join("admin_secret"));

        secret.set("first").unwrap();
        secret.set("second").unwrap();
        assert!(!secret.verify("first").unwrap());
        assert!(secret.verify("second").unwrap());
        assert!(matches!(secret.set(""), Err(AccessError::EmptySecret)));
        assert!(secret.verify("second").unwrap());
    }

    #[test]
    fn test_corrupt_secret_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin_secret");
        fs::write(&path, "not a hash").unwrap();
        assert!(matches!(AdminSecret::new(path).verify("admin"), Err(AccessError::Hash(_))));
    }

    #[tokio::test]
    async fn test_pin_and_admin_token() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.bootstrap().await.unwrap();
        let access = AdminAccess::new(db.settings(), db.accounts(), Arc::new(SystemClock));

        assert!(access.check_pin("1234").await.unwrap());
        assert!(!access.check_pin("0000").await.unwrap());
        db.settings().set(SettingKey::AdminPin, "9876").await.unwrap();
        assert!(access.check_pin("9876").await.unwrap());

        db.accounts()
            .insert(
                &AccountDraft::standard("Staff")
                    .with_token("STAFF1")
                    .with_category(AccountCategory::Admin),
            )
            .await
            .unwrap();
        db.accounts()
            .insert(&AccountDraft::standard("Alice").with_token("ALICE1"))
            .await
            .unwrap();

        assert_eq!(
            access.check_admin_token("STAFF1").await.unwrap().map(|a| a.name),
            Some("Staff".to_string())
        );
        assert!(access.check_admin_token("ALICE1").await.unwrap().is_none());
        assert!(access.check_admin_token("NOBODY").await.unwrap().is_none());
    }
}
