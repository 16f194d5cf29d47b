// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the relay.
//!
//! # Example
//!
//! ```
//! use event_relay::{BackendTypes, RelayConfig};
//!
//! // Minimal config (uses defaults)
//! let config = RelayConfig::default();
//! assert_eq!(config.backend, BackendTypes::Local);
//! assert_eq!(config.max_retries, 5);
//!
//! // Full config
//! let config = RelayConfig {
//!     backend: BackendTypes::Cloudant,
//!     workers: 4,
//!     cache_sync_timeout_ms: 5_000,
//!     ..Default::default()
//! };
//! assert_eq!(config.workers, 4);
//! ```

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::handlers::BackendTypes;

/// Environment variable selecting the backend handler.
pub const BACKEND_ENV: &str = "BACKENDHANDLERTYPE";
const WORKERS_ENV: &str = "RELAY_WORKERS";
const MAX_RETRIES_ENV: &str = "RELAY_MAX_RETRIES";
const CACHE_SYNC_TIMEOUT_ENV: &str = "RELAY_CACHE_SYNC_TIMEOUT_MS";

/// Configuration for the relay.
///
/// All fields have defaults. The backend is read again on every dispatch, so
/// publishing a new config through the controller's channel switches backends
/// at runtime.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayConfig {
    /// Backend to relay records to (unknown names fall back to `local`)
    #[serde(default)]
    pub backend: BackendTypes,

    /// Number of worker tasks draining the queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Retries per record before it is dropped and reported
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long to wait for the initial cache listing
    #[serde(default = "default_cache_sync_timeout_ms")]
    pub cache_sync_timeout_ms: u64,

    /// Per-item retry backoff
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Overall retry token bucket (qps <= 0 disables it)
    #[serde(default = "default_overall_qps")]
    pub overall_qps: f64,
    #[serde(default = "default_overall_burst")]
    pub overall_burst: u32,
}

fn default_workers() -> usize { 1 }
fn default_max_retries() -> u32 { 5 }
fn default_cache_sync_timeout_ms() -> u64 { 30_000 }
fn default_retry_base_delay_ms() -> u64 { 5 }
fn default_retry_max_delay_ms() -> u64 { 1_000_000 } // 1000 s
fn default_overall_qps() -> f64 { 10.0 }
fn default_overall_burst() -> u32 { 100 }

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: BackendTypes::default(),
            workers: default_workers(),
            max_retries: default_max_retries(),
            cache_sync_timeout_ms: default_cache_sync_timeout_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            overall_qps: default_overall_qps(),
            overall_burst: default_overall_burst(),
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by `lookup`. Unparseable numbers keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(backend) = lookup(BACKEND_ENV) {
            config.backend = BackendTypes::from(backend.as_str());
        }
        override_parsed(&lookup, WORKERS_ENV, &mut config.workers);
        override_parsed(&lookup, MAX_RETRIES_ENV, &mut config.max_retries);
        override_parsed(&lookup, CACHE_SYNC_TIMEOUT_ENV, &mut config.cache_sync_timeout_ms);
        config
    }

    #[must_use]
    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_sync_timeout_ms)
    }

    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    #[must_use]
    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(name) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(variable = name, value = %raw, "Ignoring unparseable setting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.cache_sync_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry_base_delay(), Duration::from_millis(5));
        assert_eq!(config.retry_max_delay(), Duration::from_secs(1000));
    }

    #[test]
    fn test_env_overrides() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("BACKENDHANDLERTYPE", "aurora"),
            ("RELAY_WORKERS", "8"),
            ("RELAY_MAX_RETRIES", "2"),
            ("RELAY_CACHE_SYNC_TIMEOUT_MS", "250"),
        ]));
        assert_eq!(config.backend, BackendTypes::Aurora);
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.cache_sync_timeout_ms, 250);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("BACKENDHANDLERTYPE", "kafka"),
            ("RELAY_WORKERS", "many"),
        ]));
        assert_eq!(config.backend, BackendTypes::Local);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"backend": "Cloudant", "workers": 3}"#).unwrap();
        assert_eq!(config.backend, BackendTypes::Cloudant);
        assert_eq!(config.workers, 3);
        assert_eq!(config.max_retries, 5);
    }
}
