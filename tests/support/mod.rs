// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Shared harness for integration tests: spawns the real server binary and
//! speaks Content-Length framed JSON-RPC with it over pipes.

#![allow(dead_code, reason = "Not every test binary uses every helper")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Tests use unwrap/panic for clear failure messages"
)]

use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// A fresh workspace directory for one test.
pub fn workspace() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create workspace dir")
}

/// Writes a manifest file under the workspace, creating parent directories.
pub fn write_manifest(root: &Path, relative: &str, text: &str) -> PathBuf {
    write_file(root, relative, text)
}

/// Writes a Python source file under the workspace.
pub fn write_source(root: &Path, relative: &str, text: &str) -> PathBuf {
    write_file(root, relative, text)
}

fn write_file(root: &Path, relative: &str, text: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    std::fs::write(&path, text).expect("Failed to write file");
    path.canonicalize().expect("Failed to canonicalize path")
}

/// The `file://` URI for a path, as a JSON-ready string.
pub fn file_uri(path: &Path) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    maid_lsp::uri::path_to_uri(&canonical)
        .expect("Failed to build URI")
        .as_str()
        .to_string()
}

/// A running server process plus the framed pipe to talk to it.
pub struct LspServer {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: i64,
    /// publishDiagnostics params received while waiting for something else.
    stashed: Vec<Value>,
}

impl LspServer {
    pub fn spawn(root: &Path, extra_args: &[&str]) -> Self {
        Self::spawn_with_env(root, extra_args, &[])
    }

    pub fn spawn_with_env(root: &Path, extra_args: &[&str], env: &[(&str, &str)]) -> Self {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_maid-lsp"));
        cmd.arg("--runner")
            .arg(env!("CARGO_BIN_EXE_mockmaid"))
            .arg("--debounce-ms")
            .arg("50")
            .args(extra_args)
            .current_dir(root)
            // Isolate from any user-level config
            .env("XDG_CONFIG_HOME", root);
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().expect("Failed to spawn maid-lsp");
        let stdin = child.stdin.take().expect("Failed to take stdin");
        let stdout = BufReader::new(child.stdout.take().expect("Failed to take stdout"));
        Self {
            child,
            stdin,
            stdout,
            next_id: 1,
            stashed: Vec::new(),
        }
    }

    /// Performs the initialize handshake against `root`.
    pub fn initialize(&mut self, root: &Path) {
        let root = root.canonicalize().expect("Failed to canonicalize root");
        let result = self.request(
            "initialize",
            json!({
                "rootUri": file_uri(&root),
                "capabilities": {}
            }),
        );
        assert!(result["capabilities"]["textDocumentSync"].is_number());
        self.notify("initialized", json!({}));
    }

    pub fn did_open(&mut self, uri: &str, text: &str) {
        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": "json",
                    "version": 1,
                    "text": text
                }
            }),
        );
    }

    pub fn did_change(&mut self, uri: &str, version: i64, text: &str) {
        self.notify(
            "textDocument/didChange",
            json!({
                "textDocument": {"uri": uri, "version": version},
                "contentChanges": [{"text": text}]
            }),
        );
    }

    pub fn notify(&mut self, method: &str, params: Value) {
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        }));
    }

    /// Sends a request and blocks until its response, stashing any
    /// diagnostics that arrive in between. Panics on an error response.
    pub fn request(&mut self, method: &str, params: Value) -> Value {
        let message = self.roundtrip(method, params);
        assert!(
            message.get("error").is_none(),
            "unexpected error response: {message}"
        );
        message["result"].clone()
    }

    /// Sends a request expected to fail and returns the error object.
    pub fn request_expect_error(&mut self, method: &str, params: Value) -> Value {
        let message = self.roundtrip(method, params);
        message
            .get("error")
            .cloned()
            .expect("expected an error response")
    }

    fn roundtrip(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        }));

        loop {
            let message = self.recv();
            if message["id"] == id {
                return message;
            }
            if message["method"] == "textDocument/publishDiagnostics" {
                self.stashed.push(message["params"].clone());
            }
        }
    }

    /// Blocks until a publishDiagnostics notification for `uri` arrives.
    pub fn wait_for_diagnostics(&mut self, uri: &str) -> Value {
        if let Some(pos) = self.stashed.iter().position(|p| p["uri"] == uri) {
            return self.stashed.remove(pos);
        }
        loop {
            let message = self.recv();
            if message["method"] == "textDocument/publishDiagnostics" {
                let params = message["params"].clone();
                if params["uri"] == uri {
                    return params;
                }
                self.stashed.push(params);
            }
        }
    }

    /// Blocks until a publish with an empty diagnostic set for `uri`,
    /// discarding intermediate non-empty sets from earlier versions.
    pub fn wait_for_clean_diagnostics(&mut self, uri: &str) -> Value {
        loop {
            let params = self.wait_for_diagnostics(uri);
            if params["diagnostics"].as_array().is_some_and(Vec::is_empty) {
                return params;
            }
        }
    }

    /// Diagnostics received while waiting for responses, without blocking.
    pub fn pending_diagnostics(&self) -> &[Value] {
        &self.stashed
    }

    pub fn shutdown_and_exit(&mut self) {
        let _ = self.request("shutdown", Value::Null);
        self.notify("exit", Value::Null);
        let _ = self.child.wait();
    }

    fn send(&mut self, message: &Value) {
        let body = serde_json::to_string(message).expect("Failed to serialize");
        write!(self.stdin, "Content-Length: {}\r\n\r\n{}", body.len(), body)
            .expect("Failed to write to server");
        self.stdin.flush().expect("Failed to flush");
    }

    fn recv(&mut self) -> Value {
        let mut content_length = None;
        loop {
            let mut line = String::new();
            let read = self
                .stdout
                .read_line(&mut line)
                .expect("Failed to read header");
            assert!(read > 0, "server closed its output stream");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some(value) = line.strip_prefix("Content-Length:") {
                content_length = Some(value.trim().parse::<usize>().expect("bad length"));
            }
        }
        let length = content_length.expect("missing Content-Length header");
        let mut body = vec![0_u8; length];
        self.stdout
            .read_exact(&mut body)
            .expect("Failed to read body");
        serde_json::from_slice(&body).expect("Failed to parse message")
    }
}

impl Drop for LspServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}
