//! Credential vault port for broker API keys.
//!
//! The engine only needs the gate semantics: while the vault is locked,
//! `get_key` returns nothing regardless of stored content. Durable backends
//! live outside the core; a corrupted or unreachable backend must not halt
//! trading.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Keyed secret storage with an explicit lock/unlock gate.
pub trait CredentialVault: Send + Sync {
    /// Store a secret for a service, replacing any previous value.
    fn store_key(&self, service: &str, secret: &str);

    /// Fetch a secret. Always `None` while the vault is locked.
    fn get_key(&self, service: &str) -> Option<String>;

    /// Remove a secret. Returns whether one was present.
    fn remove_key(&self, service: &str) -> bool;

    /// Close the gate.
    fn lock(&self);

    /// Open the gate.
    fn unlock(&self);

    /// Whether the gate is closed.
    fn is_locked(&self) -> bool;
}

/// Process-local vault. Starts unlocked.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    entries: RwLock<HashMap<String, String>>,
    locked: AtomicBool,
}

impl InMemoryVault {
    /// Create an empty, unlocked vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialVault for InMemoryVault {
    fn store_key(&self, service: &str, secret: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(service.to_string(), secret.to_string());
    }

    fn get_key(&self, service: &str) -> Option<String> {
        if self.locked.load(Ordering::SeqCst) {
            return None;
        }
        self.entries.read().unwrap().get(service).cloned()
    }

    fn remove_key(&self, service: &str) -> bool {
        self.entries.write().unwrap().remove(service).is_some()
    }

    fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_fetch() {
        let vault = InMemoryVault::new();
        vault.store_key("alpaca", "secret-key");
        assert_eq!(vault.get_key("alpaca").as_deref(), Some("secret-key"));
        assert!(vault.get_key("missing").is_none());
    }

    #[test]
    fn locked_vault_returns_nothing_despite_content() {
        let vault = InMemoryVault::new();
        vault.store_key("alpaca", "secret-key");

        vault.lock();
        assert!(vault.is_locked());
        assert!(vault.get_key("alpaca").is_none());

        vault.unlock();
        assert_eq!(vault.get_key("alpaca").as_deref(), Some("secret-key"));
    }

    #[test]
    fn remove_reports_presence() {
        let vault = InMemoryVault::new();
        vault.store_key("alpaca", "secret-key");
        assert!(vault.remove_key("alpaca"));
        assert!(!vault.remove_key("alpaca"));
        assert!(vault.get_key("alpaca").is_none());
    }

    #[test]
    fn storing_while_locked_is_allowed() {
        let vault = InMemoryVault::new();
        vault.lock();
        vault.store_key("alpaca", "secret-key");
        assert!(vault.get_key("alpaca").is_none());

        vault.unlock();
        assert_eq!(vault.get_key("alpaca").as_deref(), Some("secret-key"));
    }
}
