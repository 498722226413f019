// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! End-to-end navigation tests: hover, definition, and references across
//! manifests and Python sources, driven through a real server process.

#![allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]

mod support;

use serde_json::json;
use support::LspServer;

const MANIFEST: &str = r#"{
  "goal": "Add batch processing",
  "taskType": "feature",
  "expectedArtifacts": {
    "file": "src/worker.py",
    "contains": [
      {"name": "process", "type": "function", "class": "Worker"}
    ]
  }
}
"#;

const SOURCE: &str = "\
class Worker:
    def process(self, batch):
        return batch


def run(worker, batch):
    return worker.process(batch)
";

struct Fixture {
    workspace: tempfile::TempDir,
    manifest_uri: String,
    source_uri: String,
}

/// Writes the manifest and source before the server starts, so everything
/// is picked up by workspace pre-indexing.
fn fixture() -> Fixture {
    let workspace = support::workspace();
    let manifest = support::write_manifest(workspace.path(), "task.manifest.json", MANIFEST);
    let source = support::write_source(workspace.path(), "src/worker.py", SOURCE);
    Fixture {
        manifest_uri: support::file_uri(&manifest),
        source_uri: support::file_uri(&source),
        workspace,
    }
}

#[test]
fn initialize_advertises_navigation_capabilities() {
    let fx = fixture();
    let mut server = LspServer::spawn(fx.workspace.path(), &[]);
    let result = server.request(
        "initialize",
        json!({
            "rootUri": support::file_uri(&fx.workspace.path().canonicalize().unwrap()),
            "capabilities": {}
        }),
    );
    let caps = &result["capabilities"];
    assert_eq!(caps["textDocumentSync"], 1);
    assert_eq!(caps["hoverProvider"], true);
    assert_eq!(caps["definitionProvider"], true);
    assert_eq!(caps["referencesProvider"], true);
    assert_eq!(caps["codeActionProvider"], true);
    assert_eq!(result["serverInfo"]["name"], "maid-lsp");

    server.notify("initialized", json!({}));
    server.shutdown_and_exit();
}

#[test]
fn definition_jumps_from_manifest_to_source() {
    let fx = fixture();
    let mut server = LspServer::spawn(fx.workspace.path(), &[]);
    server.initialize(fx.workspace.path());

    // Cursor inside "process" in the manifest's contains entry, without the
    // document ever being opened: pre-indexing must be enough.
    let result = server.request(
        "textDocument/definition",
        json!({
            "textDocument": {"uri": fx.manifest_uri},
            "position": {"line": 6, "character": 17}
        }),
    );
    let locations = result.as_array().unwrap();
    let in_source = locations
        .iter()
        .find(|l| l["uri"] == fx.source_uri)
        .expect("expected a declaration in worker.py");
    assert_eq!(in_source["range"]["start"]["line"], 1);
    assert_eq!(in_source["range"]["start"]["character"], 8);
    // The manifest entry under the cursor is not a jump target
    assert!(locations.iter().all(|l| l["uri"] != fx.manifest_uri));

    server.shutdown_and_exit();
}

#[test]
fn definition_from_source_call_site() {
    let fx = fixture();
    let mut server = LspServer::spawn(fx.workspace.path(), &[]);
    server.initialize(fx.workspace.path());

    // Cursor on "process" in `worker.process(batch)`
    let result = server.request(
        "textDocument/definition",
        json!({
            "textDocument": {"uri": fx.source_uri},
            "position": {"line": 6, "character": 20}
        }),
    );
    let locations = result.as_array().unwrap();
    assert!(
        locations
            .iter()
            .any(|l| l["uri"] == fx.source_uri && l["range"]["start"]["line"] == 1)
    );

    server.shutdown_and_exit();
}

#[test]
fn references_find_the_call_site() {
    let fx = fixture();
    let mut server = LspServer::spawn(fx.workspace.path(), &[]);
    server.initialize(fx.workspace.path());

    let result = server.request(
        "textDocument/references",
        json!({
            "textDocument": {"uri": fx.manifest_uri},
            "position": {"line": 6, "character": 17},
            "context": {"includeDeclaration": false}
        }),
    );
    let locations = result.as_array().unwrap();
    assert!(
        locations
            .iter()
            .any(|l| l["uri"] == fx.source_uri
                && l["range"]["start"]["line"] == 6
                && l["range"]["start"]["character"] == 18),
        "expected the worker.process call site, got {locations:?}"
    );

    server.shutdown_and_exit();
}

#[test]
fn references_can_include_declarations() {
    let fx = fixture();
    let mut server = LspServer::spawn(fx.workspace.path(), &[]);
    server.initialize(fx.workspace.path());

    let without = server.request(
        "textDocument/references",
        json!({
            "textDocument": {"uri": fx.source_uri},
            "position": {"line": 1, "character": 10},
            "context": {"includeDeclaration": false}
        }),
    );
    let with = server.request(
        "textDocument/references",
        json!({
            "textDocument": {"uri": fx.source_uri},
            "position": {"line": 1, "character": 10},
            "context": {"includeDeclaration": true}
        }),
    );
    assert!(with.as_array().unwrap().len() > without.as_array().unwrap().len());
    // Declarations come first, and include the manifest's expectation
    assert!(
        with.as_array().unwrap()[..2]
            .iter()
            .any(|l| l["uri"] == fx.manifest_uri)
    );

    server.shutdown_and_exit();
}

#[test]
fn hover_summarizes_the_artifact() {
    let fx = fixture();
    let mut server = LspServer::spawn(fx.workspace.path(), &[]);
    server.initialize(fx.workspace.path());

    let result = server.request(
        "textDocument/hover",
        json!({
            "textDocument": {"uri": fx.manifest_uri},
            "position": {"line": 6, "character": 17}
        }),
    );
    assert_eq!(result["contents"]["kind"], "markdown");
    let value = result["contents"]["value"].as_str().unwrap();
    assert!(value.contains("**function** `Worker.process`"), "{value}");
    assert!(value.contains("worker.py"), "{value}");
    assert!(value.contains("Expected by:"), "{value}");
    assert!(value.contains("task.manifest.json"), "{value}");

    server.shutdown_and_exit();
}

#[test]
fn hover_on_an_unknown_word_is_null() {
    let fx = fixture();
    let mut server = LspServer::spawn(fx.workspace.path(), &[]);
    server.initialize(fx.workspace.path());

    // "goal" is a manifest key, not an artifact
    let result = server.request(
        "textDocument/hover",
        json!({
            "textDocument": {"uri": fx.manifest_uri},
            "position": {"line": 1, "character": 4}
        }),
    );
    assert!(result.is_null());

    server.shutdown_and_exit();
}

#[test]
fn edits_to_an_open_buffer_retarget_navigation() {
    let fx = fixture();
    let mut server = LspServer::spawn(fx.workspace.path(), &[]);
    server.initialize(fx.workspace.path());

    // Move the method down by two lines in the open buffer only
    let edited = format!("# moved\n# moved\n{SOURCE}");
    server.did_open(&fx.source_uri, SOURCE);
    server.did_change(&fx.source_uri, 2, &edited);

    let result = server.request(
        "textDocument/definition",
        json!({
            "textDocument": {"uri": fx.manifest_uri},
            "position": {"line": 6, "character": 17}
        }),
    );
    let locations = result.as_array().unwrap();
    let in_source = locations
        .iter()
        .find(|l| l["uri"] == fx.source_uri)
        .expect("expected a declaration in worker.py");
    assert_eq!(in_source["range"]["start"]["line"], 3);

    server.shutdown_and_exit();
}
