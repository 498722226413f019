// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! A configurable mock of the `maid` validator CLI, used by integration
//! tests.
//!
//! It implements just enough of the real validator's contract: the
//! `validate` subcommand, the `--json-output` payload shape, and non-zero
//! exit when issues are found. Failure modes (slow runs, garbage output,
//! forced exit codes) are switched through `MOCKMAID_*` environment
//! variables so tests can trigger them through a real server process.

#![allow(clippy::print_stdout, reason = "The JSON payload goes to stdout")]
#![allow(clippy::print_stderr, reason = "Crash simulation writes to stderr")]

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "mockmaid")]
#[command(about = "Mock MAID validator for integration tests")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a manifest and print a JSON report.
    Validate {
        /// Path to the manifest file.
        path: PathBuf,

        /// Validation mode (accepted and echoed, never interpreted).
        #[arg(long, default_value = "full-chain")]
        validation_mode: String,

        /// Follow the manifest chain (accepted for contract fidelity).
        #[arg(long)]
        use_manifest_chain: bool,

        /// Emit machine-readable JSON on stdout.
        #[arg(long)]
        json_output: bool,
    },
}

/// Fields every manifest must declare.
const REQUIRED_FIELDS: &[&str] = &["goal", "taskType", "expectedArtifacts"];

fn main() -> ExitCode {
    let args = Args::parse();
    let Command::Validate {
        path,
        validation_mode,
        ..
    } = args.command;

    if let Some(ms) = env_u64("MOCKMAID_SLEEP_MS") {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }

    if std::env::var("MOCKMAID_GARBAGE").is_ok_and(|v| v == "1") {
        println!("mockmaid exploded");
        eprintln!("internal validator crash");
        return ExitCode::from(2);
    }

    let report = validate(&path);
    let success = report
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut payload = report;
    payload["metadata"] = json!({
        "validator": "mockmaid",
        "mode": validation_mode,
    });
    println!("{payload}");

    if let Some(code) = env_u64("MOCKMAID_EXIT_CODE") {
        return ExitCode::from(u8::try_from(code).unwrap_or(1));
    }
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn validate(path: &Path) -> Value {
    let Ok(text) = std::fs::read_to_string(path) else {
        return report(vec![issue(
            "MAID-003",
            &format!("Manifest file '{}' could not be read", path.display()),
            path,
            1,
        )]);
    };

    let Ok(manifest) = serde_json::from_str::<Value>(&text) else {
        return report(vec![issue(
            "MAID-001",
            "Manifest is not valid JSON",
            path,
            1,
        )]);
    };

    let mut errors = Vec::new();
    for field in REQUIRED_FIELDS {
        if manifest.get(field).is_none() {
            errors.push(issue(
                "MAID-002",
                &format!("Missing required field '{field}'"),
                path,
                1,
            ));
        }
    }

    // Expected source files must exist relative to the manifest
    if let Some(file) = manifest
        .pointer("/expectedArtifacts/file")
        .and_then(Value::as_str)
    {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if !base.join(file).exists() {
            errors.push(issue(
                "MAID-003",
                &format!("Referenced file '{file}' does not exist"),
                path,
                1,
            ));
        }
    }

    report(errors)
}

fn issue(code: &str, message: &str, path: &Path, line: u64) -> Value {
    json!({
        "code": code,
        "message": message,
        "file": path.to_string_lossy(),
        "line": line,
        "column": 1,
        "severity": "error",
    })
}

fn report(errors: Vec<Value>) -> Value {
    json!({
        "success": errors.is_empty(),
        "errors": errors,
        "warnings": [],
    })
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}
