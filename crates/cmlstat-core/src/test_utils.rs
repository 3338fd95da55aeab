//! Shared test utilities for unit tests
//!
//! Configuration tests read real environment variables, so they serialize on
//! [`ENV_MUTEX`] and restore the environment through [`EnvVarGuard`].

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::env;

// Global mutex to serialize environment variable modifications in tests
pub static ENV_MUTEX: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Restores every variable it touched to its prior value on drop
#[derive(Default)]
pub struct EnvVarGuard {
    saved: BTreeMap<String, Option<String>>,
}

impl EnvVarGuard {
    /// Start from an environment where all of `keys` are unset
    pub fn cleared(keys: &[&str]) -> Self {
        let mut guard = Self::default();
        for key in keys {
            guard.save(key);
            // SAFETY: callers hold ENV_MUTEX, so no other test touches the environment
            unsafe { env::remove_var(key) };
        }
        guard
    }

    /// Set `key` for the lifetime of the guard
    pub fn set(&mut self, key: &str, value: &str) {
        self.save(key);
        // SAFETY: see `cleared`
        unsafe { env::set_var(key, value) };
    }

    fn save(&mut self, key: &str) {
        self.saved
            .entry(key.to_string())
            .or_insert_with(|| env::var(key).ok());
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            // SAFETY: see `cleared`
            unsafe {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
