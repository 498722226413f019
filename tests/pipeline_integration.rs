// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! End-to-end tests of the validation pipeline: a real server process
//! speaking LSP over stdin/stdout, with `mockmaid` standing in for the
//! validator CLI.

#![allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]

mod support;

use serde_json::{Value, json};
use support::LspServer;

#[test]
fn missing_field_produces_diagnostic_and_quick_fix() {
    let workspace = support::workspace();
    let manifest = support::write_manifest(
        workspace.path(),
        "task.manifest.json",
        "{\n  \"goal\": \"x\",\n  \"expectedArtifacts\": {}\n}\n",
    );
    let mut server = LspServer::spawn(workspace.path(), &[]);
    server.initialize(workspace.path());

    let uri = support::file_uri(&manifest);
    server.did_open(&uri, "{\n  \"goal\": \"x\",\n  \"expectedArtifacts\": {}\n}\n");

    let params = server.wait_for_diagnostics(&uri);
    let diagnostics = params["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1, "one missing field: {diagnostics:?}");
    assert_eq!(diagnostics[0]["code"], "MAID-002");
    assert!(
        diagnostics[0]["message"]
            .as_str()
            .unwrap()
            .contains("taskType")
    );
    assert_eq!(diagnostics[0]["severity"], 1);

    // The MAID-002 diagnostic carries an insert-field quick fix
    let response = server.request(
        "textDocument/codeAction",
        json!({
            "textDocument": {"uri": uri},
            "range": diagnostics[0]["range"],
            "context": {"diagnostics": [diagnostics[0]]}
        }),
    );
    let actions = response.as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["title"], "Add missing field 'taskType'");
    assert_eq!(actions[0]["kind"], "quickfix");
    let edit = &actions[0]["edit"]["changes"][uri.as_str()][0];
    assert!(edit["newText"].as_str().unwrap().contains("\"taskType\""));

    server.shutdown_and_exit();
}

#[test]
fn fixing_the_manifest_clears_diagnostics() {
    let workspace = support::workspace();
    support::write_source(workspace.path(), "src/worker.py", "def run():\n    pass\n");
    let broken = "{\n  \"goal\": \"x\"\n}\n";
    let manifest = support::write_manifest(workspace.path(), "task.manifest.json", broken);
    let mut server = LspServer::spawn(workspace.path(), &[]);
    server.initialize(workspace.path());

    let uri = support::file_uri(&manifest);
    server.did_open(&uri, broken);
    let params = server.wait_for_diagnostics(&uri);
    assert!(!params["diagnostics"].as_array().unwrap().is_empty());

    let fixed = "{\n  \"goal\": \"x\",\n  \"taskType\": \"feature\",\n  \"expectedArtifacts\": {\"file\": \"src/worker.py\"}\n}\n";
    server.did_change(&uri, 2, fixed);
    let params = server.wait_for_diagnostics(&uri);
    assert_eq!(
        params["diagnostics"].as_array().unwrap().len(),
        0,
        "fixed manifest must publish an empty diagnostic set"
    );

    server.shutdown_and_exit();
}

#[test]
fn an_edit_burst_settles_on_the_last_version() {
    let workspace = support::workspace();
    let broken = "{\n  \"goal\": \"x\"\n}\n";
    let manifest = support::write_manifest(workspace.path(), "task.manifest.json", broken);
    let mut server = LspServer::spawn(workspace.path(), &[]);
    server.initialize(workspace.path());

    let uri = support::file_uri(&manifest);
    server.did_open(&uri, broken);

    // Rapid edits; only the last state matters
    for version in 2..6 {
        server.did_change(&uri, version, broken);
    }
    let fixed =
        "{\n  \"goal\": \"x\",\n  \"taskType\": \"fix\",\n  \"expectedArtifacts\": {}\n}\n";
    server.did_change(&uri, 6, fixed);

    let params = server.wait_for_clean_diagnostics(&uri);
    assert_eq!(params["version"], 6);

    server.shutdown_and_exit();
}

#[test]
fn closing_a_document_clears_its_diagnostics() {
    let workspace = support::workspace();
    let broken = "{\n  \"goal\": \"x\"\n}\n";
    let manifest = support::write_manifest(workspace.path(), "task.manifest.json", broken);
    let mut server = LspServer::spawn(workspace.path(), &[]);
    server.initialize(workspace.path());

    let uri = support::file_uri(&manifest);
    server.did_open(&uri, broken);
    let params = server.wait_for_diagnostics(&uri);
    assert!(!params["diagnostics"].as_array().unwrap().is_empty());

    server.notify(
        "textDocument/didClose",
        json!({"textDocument": {"uri": uri}}),
    );
    let params = server.wait_for_diagnostics(&uri);
    assert_eq!(params["diagnostics"].as_array().unwrap().len(), 0);

    server.shutdown_and_exit();
}

#[test]
fn validator_timeout_becomes_an_internal_diagnostic() {
    let workspace = support::workspace();
    let broken = "{\n  \"goal\": \"x\"\n}\n";
    let manifest = support::write_manifest(workspace.path(), "task.manifest.json", broken);
    let mut server = LspServer::spawn_with_env(
        workspace.path(),
        &["--timeout-ms", "200"],
        &[("MOCKMAID_SLEEP_MS", "10000")],
    );
    server.initialize(workspace.path());

    let uri = support::file_uri(&manifest);
    server.did_open(&uri, broken);

    let params = server.wait_for_diagnostics(&uri);
    let diagnostics = params["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["code"], "MAID-000");
    assert!(
        diagnostics[0]["message"]
            .as_str()
            .unwrap()
            .contains("timed out")
    );

    server.shutdown_and_exit();
}

#[test]
fn validator_crash_becomes_an_internal_diagnostic() {
    let workspace = support::workspace();
    let broken = "{\n  \"goal\": \"x\"\n}\n";
    let manifest = support::write_manifest(workspace.path(), "task.manifest.json", broken);
    let mut server =
        LspServer::spawn_with_env(workspace.path(), &[], &[("MOCKMAID_GARBAGE", "1")]);
    server.initialize(workspace.path());

    let uri = support::file_uri(&manifest);
    server.did_open(&uri, broken);

    let params = server.wait_for_diagnostics(&uri);
    let diagnostics = params["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["code"], "MAID-000");

    server.shutdown_and_exit();
}

#[test]
fn unknown_request_gets_method_not_found() {
    let workspace = support::workspace();
    let mut server = LspServer::spawn(workspace.path(), &[]);
    server.initialize(workspace.path());

    let error = server.request_expect_error("workspace/unknownFeature", json!({}));
    assert_eq!(error["code"], -32601);

    server.shutdown_and_exit();
}

#[test]
fn python_edits_do_not_spawn_the_validator() {
    let workspace = support::workspace();
    let source = support::write_source(workspace.path(), "src/worker.py", "def run():\n    pass\n");
    // MOCKMAID_GARBAGE would poison diagnostics if the validator ever ran
    let mut server =
        LspServer::spawn_with_env(workspace.path(), &[], &[("MOCKMAID_GARBAGE", "1")]);
    server.initialize(workspace.path());

    let uri = support::file_uri(&source);
    server.did_open(&uri, "def run():\n    pass\n");
    server.did_change(&uri, 2, "def run():\n    return 1\n");

    // Give any (erroneous) validation time to complete before the sync point
    std::thread::sleep(std::time::Duration::from_millis(300));

    // The server is healthy and responsive, with no diagnostics published
    let response = server.request(
        "textDocument/definition",
        json!({
            "textDocument": {"uri": uri},
            "position": {"line": 0, "character": 5}
        }),
    );
    assert!(response.is_array());
    assert!(server.pending_diagnostics().is_empty());

    server.shutdown_and_exit();
}

#[test]
fn version_flag_prints_and_exits() {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_maid-lsp"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("maid-lsp"));
}

#[test]
fn mockmaid_honors_the_validator_contract() {
    let dir = support::workspace();
    let manifest = support::write_manifest(dir.path(), "task.manifest.json", "{}");

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_mockmaid"))
        .arg("validate")
        .arg(&manifest)
        .arg("--validation-mode")
        .arg("full-chain")
        .arg("--use-manifest-chain")
        .arg("--json-output")
        .output()
        .unwrap();

    // Issues present: non-zero exit, but a parseable JSON payload
    assert_eq!(output.status.code(), Some(1));
    let payload: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["errors"].as_array().unwrap().len(), 3);
    assert_eq!(payload["metadata"]["validator"], "mockmaid");
}
