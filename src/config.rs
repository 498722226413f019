// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Configuration for the validation pipeline.
//!
//! Layered sources, later ones winning: built-in defaults, the user config
//! file (`~/.config/maid-lsp/config.toml`), an explicit `--config` file,
//! and `MAID_LSP_*` environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::validate::ValidationMode;

/// Pipeline configuration. Only these four knobs affect core behavior.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Debounce delay between an edit and validation, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Validator subprocess timeout, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// The validator command (name on `$PATH` or an absolute path).
    #[serde(default = "default_runner")]
    pub runner: String,

    /// Validation mode passed to the validator.
    #[serde(default)]
    pub mode: ValidationMode,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_runner() -> String {
    "maid".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            timeout_ms: default_timeout_ms(),
            runner: default_runner(),
            mode: ValidationMode::default(),
        }
    }
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a config source exists but cannot be parsed.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("debounce_ms", default_debounce_ms())?
            .set_default("timeout_ms", default_timeout_ms())?
            .set_default("runner", default_runner())?;

        // 2. Load from user config directory (~/.config/maid-lsp/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("maid-lsp").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Load from environment variables (MAID_LSP_TIMEOUT_MS, etc.)
        builder = builder.add_source(config::Environment::with_prefix("MAID_LSP"));

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Debounce delay as a [`Duration`].
    #[must_use]
    pub const fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Validator timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.runner, "maid");
        assert_eq!(config.mode, ValidationMode::FullChain);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "debounce_ms = 250\nrunner = \"/opt/maid/bin/maid\"\nmode = \"behavioral\""
        )
        .unwrap();

        let config = Config::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.runner, "/opt/maid/bin/maid");
        assert_eq!(config.mode, ValidationMode::Behavioral);
    }
}
