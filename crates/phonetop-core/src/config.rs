// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adapter configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming the rendezvous socket directory.
pub const SOCKET_DIR_ENV: &str = "TSYNE_SOCKET_DIR";

/// Environment variable overriding the post-launch settle delay (milliseconds).
pub const SETTLE_MS_ENV: &str = "PHONETOP_SETTLE_MS";

/// How a background launch decides the worker has had time to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessPolicy {
    /// Always wait the full settle delay.
    Settle,
    /// Return as soon as the rendezvous socket exists, bounded by the settle delay.
    SocketBound,
}

/// Settings for the bridge adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// File name of the Go bridge shared library.
    pub bridge_library: String,
    /// File name of the Node.js shared library.
    pub node_library: String,
    /// Socket directory used when none has been set.
    pub default_socket_dir: PathBuf,
    /// Socket directory chosen at startup, if any.
    pub socket_dir: Option<PathBuf>,
    /// Wait after spawning a background worker before returning to the host.
    pub settle_delay_ms: u64,
    /// Readiness policy for server launches that create the rendezvous socket.
    pub readiness: ReadinessPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_library: "libtsyne-bridge.so".into(),
            node_library: "libnode.so".into(),
            default_socket_dir: PathBuf::from("/data/local/tmp"),
            socket_dir: None,
            settle_delay_ms: 500,
            readiness: ReadinessPolicy::Settle,
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a key lookup (normally the environment).
    ///
    /// Empty values are ignored; an unparsable settle delay keeps the default.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(SOCKET_DIR_ENV).filter(|d| !d.is_empty()) {
            self.socket_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = lookup(SETTLE_MS_ENV).and_then(|v| v.trim().parse().ok()) {
            self.settle_delay_ms = ms;
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_android_layout() {
        let config = BridgeConfig::default();
        assert_eq!(config.bridge_library, "libtsyne-bridge.so");
        assert_eq!(config.node_library, "libnode.so");
        assert_eq!(config.default_socket_dir, PathBuf::from("/data/local/tmp"));
        assert!(config.socket_dir.is_none());
        assert_eq!(config.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.readiness, ReadinessPolicy::Settle);
    }

    #[test]
    fn environment_sets_socket_dir_and_delay() {
        let mut config = BridgeConfig::default();
        config.apply_overrides(lookup(&[
            (SOCKET_DIR_ENV, "/data/user/0/com.tsyne.phonetop/cache"),
            (SETTLE_MS_ENV, "250"),
        ]));
        assert_eq!(
            config.socket_dir,
            Some(PathBuf::from("/data/user/0/com.tsyne.phonetop/cache"))
        );
        assert_eq!(config.settle_delay_ms, 250);
    }

    #[test]
    fn empty_or_bad_overrides_are_ignored() {
        let mut config = BridgeConfig::default();
        config.apply_overrides(lookup(&[(SOCKET_DIR_ENV, ""), (SETTLE_MS_ENV, "soon")]));
        assert!(config.socket_dir.is_none());
        assert_eq!(config.settle_delay_ms, 500);
    }

    #[test]
    fn config_serializes_to_json() {
        let config = BridgeConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: BridgeConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.bridge_library, config.bridge_library);
        assert_eq!(back.readiness, ReadinessPolicy::Settle);
    }
}
