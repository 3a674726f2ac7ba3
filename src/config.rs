// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Key/value configuration, loaded from the file named by `WUMPUS_CONFIG_FILE`.
//!
//! Unknown keys are preserved (and ignored) rather than rejected — the
//! original tool family has a long tail of keys this core doesn't consume
//! (auth, daemons, tokenizers); rejecting them would make one config file
//! unusable across components that don't need every key.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, WumpusError};
use crate::types::{DocLevelPolicy, StemmingLevel};

pub const ENV_VAR: &str = "WUMPUS_CONFIG_FILE";

/// How the hybrid manager reacts when the accumulator exceeds its memory
/// budget (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    Immediate,
    Log,
    Sqrt,
}

/// Partial-flush policy (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialFlush {
    Auto,
    Off,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub read_only: bool,
    pub all_indices_in_memory: bool,
    pub compression_mode: crate::types::CompressionMode,
    pub max_update_space: u64,
    pub update_strategy: UpdateStrategy,
    pub partial_flush: PartialFlush,
    pub long_list_threshold: u64,
    pub stemming_level: StemmingLevel,
    pub doc_level_policy: DocLevelPolicy,
    pub fork_on_query: bool,
    pub password_file: Option<String>,
    pub append_reset: bool,
    raw: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            read_only: false,
            all_indices_in_memory: false,
            compression_mode: crate::types::CompressionMode::VByte,
            max_update_space: 64 * 1024 * 1024,
            update_strategy: UpdateStrategy::Log,
            partial_flush: PartialFlush::Auto,
            long_list_threshold: 1 << 20,
            stemming_level: StemmingLevel::Off,
            doc_level_policy: DocLevelPolicy::Off,
            fork_on_query: true,
            password_file: None,
            append_reset: false,
            raw: HashMap::new(),
        }
    }
}

impl Config {
    /// Load from the path named by `WUMPUS_CONFIG_FILE`, or defaults if the
    /// variable isn't set.
    pub fn from_env() -> Result<Self> {
        match std::env::var(ENV_VAR) {
            Ok(path) => Self::from_file(&path),
            Err(_) => Ok(Config::default()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| WumpusError::Io(e))?;
        Ok(Self::from_str(&text))
    }

    pub fn from_str(text: &str) -> Self {
        let mut raw = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                raw.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        let mut cfg = Config::default();
        cfg.apply_raw(&raw);
        cfg.raw = raw;
        cfg
    }

    fn apply_raw(&mut self, raw: &HashMap<String, String>) {
        if let Some(v) = raw.get("READ_ONLY") {
            self.read_only = parse_bool(v);
        }
        if let Some(v) = raw.get("ALL_INDICES_IN_MEMORY") {
            self.all_indices_in_memory = parse_bool(v);
        }
        if let Some(v) = raw.get("INDEX_COMPRESSION_MODE") {
            self.compression_mode = match v.to_ascii_uppercase().as_str() {
                "GAMMA" => crate::types::CompressionMode::Gamma,
                "NULL" => crate::types::CompressionMode::Null,
                _ => crate::types::CompressionMode::VByte,
            };
        }
        if let Some(v) = raw.get("MAX_UPDATE_SPACE") {
            if let Ok(n) = v.parse() {
                self.max_update_space = n;
            }
        }
        if let Some(v) = raw.get("UPDATE_STRATEGY") {
            self.update_strategy = match v.to_ascii_uppercase().as_str() {
                "IMMEDIATE" => UpdateStrategy::Immediate,
                "SQRT" => UpdateStrategy::Sqrt,
                _ => UpdateStrategy::Log,
            };
        }
        if let Some(v) = raw.get("PARTIAL_FLUSH") {
            self.partial_flush = match v.to_ascii_lowercase().as_str() {
                "auto" => PartialFlush::Auto,
                _ => PartialFlush::Off,
            };
        }
        if let Some(v) = raw.get("LONG_LIST_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.long_list_threshold = n;
            }
        }
        if let Some(v) = raw.get("STEMMING_LEVEL") {
            self.stemming_level = match v.as_str() {
                "1" => StemmingLevel::Dual,
                "2" => StemmingLevel::StemmedOnly,
                _ => StemmingLevel::Off,
            };
        }
        if let Some(v) = raw.get("FORK_ON_QUERY") {
            self.fork_on_query = parse_bool(v);
        }
        if let Some(v) = raw.get("PASSWORD_FILE") {
            self.password_file = Some(v.clone());
        }
        if let Some(v) = raw.get("SUPPORT_APPEND_TAIT") {
            self.append_reset = parse_bool(v);
        }
        if let Some(v) = raw.get("DOC_LEVEL_INDEXING") {
            self.doc_level_policy = match v.as_str() {
                "1" => DocLevelPolicy::Basic,
                "2" => DocLevelPolicy::Saturating,
                _ => DocLevelPolicy::Off,
            };
        }
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(!cfg.read_only);
        assert_eq!(cfg.update_strategy, UpdateStrategy::Log);
    }

    #[test]
    fn parses_known_keys() {
        let text = "READ_ONLY=true\nMAX_UPDATE_SPACE=1048576\nUPDATE_STRATEGY=sqrt\n# comment\nSOME_OTHER_DAEMON_KEY=whatever\n";
        let cfg = Config::from_str(text);
        assert!(cfg.read_only);
        assert_eq!(cfg.max_update_space, 1048576);
        assert_eq!(cfg.update_strategy, UpdateStrategy::Sqrt);
        assert_eq!(cfg.get_raw("SOME_OTHER_DAEMON_KEY"), Some("whatever"));
    }
}
