//! Key-value settings store
//!
//! The host's option storage, reduced to get/set per key plus two
//! primitives the credential lifecycle depends on:
//!
//! - `write` applies several changes atomically, so the access token,
//!   refresh token and DID land together
//! - `write_if` applies changes only when one key still holds an expected
//!   value (compare-and-swap), so a refresh started against an old refresh
//!   token cannot clobber credentials written by a newer login
//!
//! `Database` provides the persistent implementation; `MemorySettings` is
//! used in tests and embedding scenarios.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;

/// Keys used by Skyshare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Domain,
    Identifier,
    /// Transient; cleared after a successful login
    Password,
    AccessToken,
    RefreshToken,
    Did,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::Domain,
        SettingKey::Identifier,
        SettingKey::Password,
        SettingKey::AccessToken,
        SettingKey::RefreshToken,
        SettingKey::Did,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Domain => "domain",
            SettingKey::Identifier => "identifier",
            SettingKey::Password => "password",
            SettingKey::AccessToken => "access_token",
            SettingKey::RefreshToken => "refresh_token",
            SettingKey::Did => "did",
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change applied by `SettingsStore::write`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange<'a> {
    Set(SettingKey, &'a str),
    Clear(SettingKey),
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a key; empty values read as `None`
    async fn get(&self, key: SettingKey) -> Result<Option<String>>;

    /// Apply all changes atomically
    async fn write(&self, changes: &[SettingChange<'_>]) -> Result<()>;

    /// Apply all changes atomically if `key` currently holds `expected`
    ///
    /// Returns `false`, writing nothing, when the current value differs.
    async fn write_if(
        &self,
        key: SettingKey,
        expected: Option<&str>,
        changes: &[SettingChange<'_>],
    ) -> Result<bool>;

    async fn set(&self, key: SettingKey, value: &str) -> Result<()> {
        self.write(&[SettingChange::Set(key, value)]).await
    }

    async fn clear(&self, key: SettingKey) -> Result<()> {
        self.write(&[SettingChange::Clear(key)]).await
    }
}

/// Normalize a stored value: empty strings count as absent
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<SettingKey, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(values: &mut HashMap<SettingKey, String>, changes: &[SettingChange<'_>]) {
        for change in changes {
            match *change {
                SettingChange::Set(key, value) => {
                    values.insert(key, value.to_string());
                }
                SettingChange::Clear(key) => {
                    values.remove(&key);
                }
            }
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: SettingKey) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(non_empty(values.get(&key).cloned()))
    }

    async fn write(&self, changes: &[SettingChange<'_>]) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Self::apply(&mut values, changes);
        Ok(())
    }

    async fn write_if(
        &self,
        key: SettingKey,
        expected: Option<&str>,
        changes: &[SettingChange<'_>],
    ) -> Result<bool> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let current = values.get(&key).map(String::as_str).filter(|v| !v.is_empty());
        if current != expected {
            return Ok(false);
        }
        Self::apply(&mut values, changes);
        Ok(true)
    }
}
