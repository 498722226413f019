// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! maid-lsp entry point.
//!
//! Speaks LSP over stdin/stdout; everything human-readable (logs) goes to
//! stderr so the protocol channel stays clean.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use maid_lsp::config::Config;
use maid_lsp::server::Server;
use maid_lsp::validate::ValidationMode;

/// Command-line arguments for maid-lsp.
#[derive(Parser, Debug)]
#[command(name = "maid-lsp")]
#[command(about = "Language server for MAID manifest files")]
#[command(version = env!("MAID_LSP_VERSION"))]
struct Args {
    /// Path to configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validator command to invoke (name on $PATH or absolute path).
    #[arg(long)]
    runner: Option<String>,

    /// Debounce delay between an edit and validation, in milliseconds.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Validator subprocess timeout, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Validation mode (schema, artifacts, behavioral, implementation,
    /// full-chain).
    #[arg(long)]
    mode: Option<ValidationMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("maid_lsp=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config)?;
    if let Some(runner) = args.runner {
        config.runner = runner;
    }
    if let Some(debounce_ms) = args.debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    info!(
        "Starting maid-lsp {} (validator: {}, mode: {}, debounce: {}ms, timeout: {}ms)",
        env!("MAID_LSP_VERSION"),
        config.runner,
        config.mode.as_str(),
        config.debounce_ms,
        config.timeout_ms,
    );

    let server = Server::new(config, tokio::io::stdout());
    server.run(tokio::io::stdin()).await
}
