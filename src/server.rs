// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! The LSP server: wire loop, capability dispatch, and the validation
//! pipeline wiring.
//!
//! All mutable state (documents, index, debounce timers) is owned by the
//! single event loop. Timers and validator subprocesses run as tasks and
//! re-enter the loop through an mpsc channel, so no handler ever takes a
//! lock. Navigation requests are answered synchronously from cached state.

use anyhow::{Context, Result};
use bytes::BytesMut;
use lsp_types::{
    CodeActionOrCommand, CodeActionParams, CodeActionProviderCapability, Diagnostic,
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverContents, HoverParams,
    HoverProviderCapability, InitializeParams, InitializeResult, Location, MarkupContent,
    MarkupKind, OneOf, Position, PublishDiagnosticsParams, Range, ReferenceParams,
    ServerCapabilities, ServerInfo,
    TextDocumentPositionParams, TextDocumentSyncCapability, TextDocumentSyncKind, Uri,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::actions::{actions_for, diagnostics_in_range};
use crate::config::Config;
use crate::debounce::Debouncer;
use crate::documents::{DocumentStore, InflightValidation, text_hash};
use crate::index::{CrossRefIndex, manifest::index_manifest, source::index_source, word_at};
use crate::protocol::{
    self, IncomingMessage, METHOD_NOT_FOUND, NotificationMessage, RequestId, ResponseMessage,
};
use crate::uri::{path_to_uri, uri_to_path};
use crate::validate::runner::{MaidRunner, RunnerError};
use crate::validate::translate::{infra_diagnostic, translate};

/// Events re-entering the dispatch loop from background tasks.
#[derive(Debug)]
pub enum LoopEvent {
    /// A debounce timer elapsed for a document.
    DebounceFired {
        /// The document whose timer fired.
        uri: Uri,
    },
    /// A validation task finished (or failed).
    ValidationDone {
        /// The validated document.
        uri: Uri,
        /// The document version the validation ran against.
        version: i32,
        /// Hash of the text that was validated.
        text_hash: u64,
        /// Translated diagnostics, or the infrastructure failure.
        outcome: Result<Vec<Diagnostic>, RunnerError>,
    },
}

/// Whether the loop keeps running after a message.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// The server, generic over its output stream for testability.
pub struct Server<W> {
    writer: W,
    config: Config,
    runner: MaidRunner,
    documents: DocumentStore,
    index: CrossRefIndex,
    debouncer: Debouncer<String>,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<LoopEvent>>,
    shutdown_requested: bool,
}

impl<W: AsyncWrite + Unpin> Server<W> {
    /// Creates a server writing protocol messages to `writer`.
    #[must_use]
    pub fn new(config: Config, writer: W) -> Self {
        let runner = MaidRunner::new(&config.runner, config.timeout());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            writer,
            config,
            runner,
            documents: DocumentStore::new(),
            index: CrossRefIndex::new(),
            debouncer: Debouncer::new(),
            events_tx,
            events_rx: Some(events_rx),
            shutdown_requested: false,
        }
    }

    /// Runs the event loop until the client disconnects or sends `exit`.
    ///
    /// # Errors
    ///
    /// Returns an error on unrecoverable I/O failures on either stream.
    pub async fn run<R: AsyncRead + Unpin>(mut self, mut reader: R) -> Result<()> {
        let mut events_rx = self
            .events_rx
            .take()
            .context("Server::run called more than once")?;
        let mut buffer = BytesMut::with_capacity(8192);
        let mut chunk = [0u8; 4096];

        loop {
            tokio::select! {
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => {
                        info!("Client closed the input stream");
                        return Ok(());
                    }
                    Ok(n) => {
                        buffer.extend_from_slice(&chunk[..n]);
                        while let Some(body) = protocol::try_parse_message(&mut buffer)? {
                            if self.handle_message(&body).await? == Flow::Exit {
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => return Err(e).context("Failed to read from client"),
                },
                Some(event) = events_rx.recv() => {
                    self.handle_event(event).await?;
                }
            }
        }
    }

    async fn handle_message(&mut self, body: &str) -> Result<Flow> {
        let message: IncomingMessage = match serde_json::from_str(body) {
            Ok(m) => m,
            Err(e) => {
                warn!("Dropping unparseable message: {e}");
                return Ok(Flow::Continue);
            }
        };
        trace!("<- {}", message.method);

        match message.id {
            Some(id) => self.handle_request(id, &message.method, message.params).await,
            None => self.handle_notification(&message.method, message.params).await,
        }
    }

    async fn handle_request(
        &mut self,
        id: RequestId,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Flow> {
        let response = match method {
            "initialize" => self.handle_initialize(id, params),
            "shutdown" => {
                self.shutdown_requested = true;
                ResponseMessage::ok(id, serde_json::Value::Null)
            }
            "textDocument/hover" => self.handle_hover(id, params),
            "textDocument/definition" => self.handle_definition(id, params),
            "textDocument/references" => self.handle_references(id, params),
            "textDocument/codeAction" => self.handle_code_action(id, params),
            other => {
                debug!("Unsupported request: {other}");
                ResponseMessage::err(id, METHOD_NOT_FOUND, format!("Unsupported method: {other}"))
            }
        };
        self.send(&response).await?;
        Ok(Flow::Continue)
    }

    async fn handle_notification(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Flow> {
        match method {
            "initialized" => {}
            "exit" => {
                info!(
                    "Exiting ({})",
                    if self.shutdown_requested {
                        "after shutdown"
                    } else {
                        "without shutdown"
                    }
                );
                return Ok(Flow::Exit);
            }
            "textDocument/didOpen" => self.handle_did_open(params),
            "textDocument/didChange" => self.handle_did_change(params),
            "textDocument/didClose" => self.handle_did_close(params).await?,
            other => trace!("Ignoring notification: {other}"),
        }
        Ok(Flow::Continue)
    }

    fn handle_initialize(&mut self, id: RequestId, params: serde_json::Value) -> ResponseMessage {
        let params: InitializeParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return ResponseMessage::err(
                    id,
                    protocol::INVALID_PARAMS,
                    format!("Invalid initialize params: {e}"),
                );
            }
        };

        for root in workspace_roots(&params) {
            self.index_workspace(&root);
        }

        let result = InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "maid-lsp".to_string(),
                version: Some(env!("MAID_LSP_VERSION").to_string()),
            }),
        };

        match serde_json::to_value(result) {
            Ok(value) => ResponseMessage::ok(id, value),
            Err(e) => ResponseMessage::err(
                id,
                protocol::INVALID_PARAMS,
                format!("Failed to serialize initialize result: {e}"),
            ),
        }
    }

    /// Pre-indexes every manifest and Python file under `root` so
    /// navigation works before any document is opened.
    fn index_workspace(&mut self, root: &Path) {
        let mut files = 0_usize;
        for entry in ignore::WalkBuilder::new(root).build().flatten() {
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(path) else {
                continue;
            };
            if is_manifest_path(path) {
                self.index.update_file(path.to_path_buf(), index_manifest(path, &text));
                files += 1;
            } else if is_python_path(path) {
                self.index.update_file(path.to_path_buf(), index_source(path, &text));
                files += 1;
            }
        }
        info!("Indexed {files} file(s) under {}", root.display());
    }

    fn handle_did_open(&mut self, params: serde_json::Value) {
        let Ok(params) = serde_json::from_value::<DidOpenTextDocumentParams>(params) else {
            warn!("Invalid didOpen params");
            return;
        };
        let doc = params.text_document;
        self.documents
            .open(doc.uri.clone(), doc.text.clone(), doc.version);
        self.refresh_index(&doc.uri, &doc.text);
        self.schedule_validation(&doc.uri);
    }

    fn handle_did_change(&mut self, params: serde_json::Value) {
        let Ok(mut params) = serde_json::from_value::<DidChangeTextDocumentParams>(params) else {
            warn!("Invalid didChange params");
            return;
        };
        // Full sync: the last change carries the whole document.
        let Some(change) = params.content_changes.pop() else {
            return;
        };
        let uri = params.text_document.uri;
        if !self
            .documents
            .change(&uri, change.text.clone(), params.text_document.version)
        {
            warn!("didChange for unopened document {uri:?}");
            return;
        }
        self.refresh_index(&uri, &change.text);
        self.schedule_validation(&uri);
    }

    async fn handle_did_close(&mut self, params: serde_json::Value) -> Result<()> {
        let Ok(params) = serde_json::from_value::<DidCloseTextDocumentParams>(params) else {
            warn!("Invalid didClose params");
            return Ok(());
        };
        let uri = params.text_document.uri;
        self.debouncer.cancel(&uri.as_str().to_string());
        // Dropping the entry aborts any in-flight validation. Index entries
        // survive the close: the file still exists on disk.
        drop(self.documents.close(&uri));
        self.publish(uri, Vec::new(), None).await
    }

    /// Re-parses one document's index entries from its buffer text.
    fn refresh_index(&mut self, uri: &Uri, text: &str) {
        let Ok(path) = uri_to_path(uri) else {
            return;
        };
        if is_manifest_path(&path) {
            self.index.update_file(path.clone(), index_manifest(&path, text));
        } else if is_python_path(&path) {
            self.index.update_file(path.clone(), index_source(&path, text));
        }
    }

    /// Arms (or re-arms) the debounce timer. Only manifests are validated;
    /// source edits refresh the index but never spawn the validator.
    fn schedule_validation(&mut self, uri: &Uri) {
        let Ok(path) = uri_to_path(uri) else {
            return;
        };
        if !is_manifest_path(&path) {
            return;
        }
        let tx = self.events_tx.clone();
        let fired = uri.clone();
        self.debouncer.schedule(
            uri.as_str().to_string(),
            self.config.debounce_delay(),
            move || {
                // The loop may already be gone during shutdown.
                let _ = tx.send(LoopEvent::DebounceFired { uri: fired });
            },
        );
    }

    async fn handle_event(&mut self, event: LoopEvent) -> Result<()> {
        match event {
            LoopEvent::DebounceFired { uri } => {
                self.start_validation(&uri);
                Ok(())
            }
            LoopEvent::ValidationDone {
                uri,
                version,
                text_hash,
                outcome,
            } => self.finish_validation(uri, version, text_hash, outcome).await,
        }
    }

    /// Spawns one validation task for the document's current text, aborting
    /// any validation already in flight for it.
    fn start_validation(&mut self, uri: &Uri) {
        let Ok(path) = uri_to_path(uri) else {
            return;
        };
        let Some(entry) = self.documents.get_mut(uri) else {
            // Closed while the timer was pending
            return;
        };

        let hash = text_hash(&entry.text);
        if entry.last_validated_hash == Some(hash) {
            debug!("Skipping validation of {uri:?}: text unchanged");
            return;
        }

        entry.abort_inflight();

        let version = entry.version;
        let text = entry.text.clone();
        let runner = self.runner.clone();
        let mode = self.config.mode;
        let tx = self.events_tx.clone();
        let event_uri = uri.clone();

        let handle = tokio::spawn(async move {
            let outcome = validate_snapshot(&runner, mode, &path, &text).await;
            let _ = tx.send(LoopEvent::ValidationDone {
                uri: event_uri,
                version,
                text_hash: hash,
                outcome,
            });
        });
        entry.inflight = Some(InflightValidation { version, handle });
    }

    /// Applies a finished validation, unless the document moved on.
    async fn finish_validation(
        &mut self,
        uri: Uri,
        version: i32,
        text_hash: u64,
        outcome: Result<Vec<Diagnostic>, RunnerError>,
    ) -> Result<()> {
        let Some(entry) = self.documents.get_mut(&uri) else {
            return Ok(());
        };
        if entry.version != version {
            debug!(
                "Discarding stale result for {uri:?} (ran against v{version}, now v{})",
                entry.version
            );
            return Ok(());
        }

        entry.inflight = None;
        entry.last_validated_hash = Some(text_hash);
        let diagnostics = match outcome {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                warn!("Validation of {uri:?} failed: {e}");
                vec![infra_diagnostic(&e)]
            }
        };
        entry.diagnostics.clone_from(&diagnostics);
        self.publish(uri, diagnostics, Some(version)).await
    }

    async fn publish(
        &mut self,
        uri: Uri,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    ) -> Result<()> {
        let params = PublishDiagnosticsParams {
            uri,
            diagnostics,
            version,
        };
        let notification = NotificationMessage::new(
            "textDocument/publishDiagnostics",
            serde_json::to_value(params).context("Failed to serialize diagnostics")?,
        );
        self.send(&notification).await
    }

    fn handle_hover(&self, id: RequestId, params: serde_json::Value) -> ResponseMessage {
        let Ok(params) = serde_json::from_value::<HoverParams>(params) else {
            return ResponseMessage::err(id, protocol::INVALID_PARAMS, "Invalid hover params");
        };
        let Some(word) = self.word_under_cursor(&params.text_document_position_params) else {
            return ResponseMessage::ok(id, serde_json::Value::Null);
        };

        let declarations = self.index.declarations_of(&word);
        if declarations.is_empty() {
            return ResponseMessage::ok(id, serde_json::Value::Null);
        }

        let mut value = String::new();
        for decl in &declarations {
            if is_manifest_path(&decl.path) {
                continue;
            }
            value.push_str(&format!(
                "**{}** `{}`\n\nDeclared in `{}:{}`\n",
                decl.kind.as_str(),
                decl.name,
                decl.path.display(),
                decl.range.start.line + 1,
            ));
        }
        let expecting: Vec<&PathBuf> = declarations
            .iter()
            .filter(|d| is_manifest_path(&d.path))
            .map(|d| &d.path)
            .collect();
        if !expecting.is_empty() {
            value.push_str("\nExpected by:\n");
            for path in expecting {
                value.push_str(&format!("- `{}`\n", path.display()));
            }
        }
        if value.is_empty() {
            return ResponseMessage::ok(id, serde_json::Value::Null);
        }

        let hover = Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            }),
            range: None,
        };
        respond_with(id, &hover)
    }

    fn handle_definition(&self, id: RequestId, params: serde_json::Value) -> ResponseMessage {
        let Ok(params) = serde_json::from_value::<GotoDefinitionParams>(params) else {
            return ResponseMessage::err(id, protocol::INVALID_PARAMS, "Invalid definition params");
        };
        let Some(word) = self.word_under_cursor(&params.text_document_position_params) else {
            return ResponseMessage::ok(id, serde_json::Value::Null);
        };

        // Ambiguity is returned as-is; the editor presents the choice. The
        // declaration under the cursor is dropped so a manifest entry jumps
        // to the source instead of back to itself.
        let request_uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let locations: Vec<Location> = self
            .index
            .declarations_of(&word)
            .into_iter()
            .filter_map(|decl| {
                path_to_uri(&decl.path).ok().map(|uri| Location {
                    uri,
                    range: decl.range,
                })
            })
            .filter(|loc| !(loc.uri == *request_uri && range_contains(loc.range, position)))
            .collect();
        respond_with(id, &GotoDefinitionResponse::Array(locations))
    }

    fn handle_references(&self, id: RequestId, params: serde_json::Value) -> ResponseMessage {
        let Ok(params) = serde_json::from_value::<ReferenceParams>(params) else {
            return ResponseMessage::err(id, protocol::INVALID_PARAMS, "Invalid references params");
        };
        let Some(word) = self.word_under_cursor(&params.text_document_position) else {
            return ResponseMessage::ok(id, serde_json::Value::Null);
        };

        let mut locations = Vec::new();
        if params.context.include_declaration {
            for decl in self.index.declarations_of(&word) {
                if let Ok(uri) = path_to_uri(&decl.path) {
                    locations.push(Location {
                        uri,
                        range: decl.range,
                    });
                }
            }
        }
        for reference in self.index.references_of(&word) {
            if let Ok(uri) = path_to_uri(&reference.path) {
                locations.push(Location {
                    uri,
                    range: reference.range,
                });
            }
        }
        respond_with(id, &locations)
    }

    fn handle_code_action(&self, id: RequestId, params: serde_json::Value) -> ResponseMessage {
        let Ok(params) = serde_json::from_value::<CodeActionParams>(params) else {
            return ResponseMessage::err(id, protocol::INVALID_PARAMS, "Invalid codeAction params");
        };
        let uri = params.text_document.uri;
        let Some(entry) = self.documents.get(&uri) else {
            return ResponseMessage::ok(id, serde_json::json!([]));
        };

        let actions: Vec<CodeActionOrCommand> =
            diagnostics_in_range(&entry.diagnostics, params.range)
                .into_iter()
                .flat_map(|diagnostic| actions_for(diagnostic, &uri, &entry.text))
                .map(CodeActionOrCommand::CodeAction)
                .collect();
        respond_with(id, &actions)
    }

    /// The identifier under the cursor, looked up in the open buffer first
    /// and the on-disk file otherwise.
    fn word_under_cursor(&self, position: &TextDocumentPositionParams) -> Option<String> {
        let pos = position.position;
        if let Some(entry) = self.documents.get(&position.text_document.uri) {
            return word_at(&entry.text, pos.line, pos.character);
        }
        let path = uri_to_path(&position.text_document.uri).ok()?;
        let text = std::fs::read_to_string(path).ok()?;
        word_at(&text, pos.line, pos.character)
    }

    async fn send<T: serde::Serialize>(&mut self, message: &T) -> Result<()> {
        let framed = protocol::frame(message)?;
        self.writer
            .write_all(&framed)
            .await
            .context("Failed to write to client")?;
        self.writer.flush().await.context("Failed to flush output")
    }
}

/// Serializes a typed result into a success response, degrading to an
/// internal error response if serialization fails.
fn respond_with<T: serde::Serialize>(id: RequestId, result: &T) -> ResponseMessage {
    match serde_json::to_value(result) {
        Ok(value) => ResponseMessage::ok(id, value),
        Err(e) => ResponseMessage::err(
            id,
            protocol::INVALID_PARAMS,
            format!("Failed to serialize response: {e}"),
        ),
    }
}

const fn range_contains(range: Range, position: Position) -> bool {
    let after_start = position.line > range.start.line
        || (position.line == range.start.line && position.character >= range.start.character);
    let before_end = position.line < range.end.line
        || (position.line == range.end.line && position.character <= range.end.character);
    after_start && before_end
}

/// Runs the validator against a same-directory snapshot of the buffer.
///
/// The snapshot lives next to the real manifest so the validator's
/// relative-path resolution still works, and is deleted when this future
/// completes or is dropped.
async fn validate_snapshot(
    runner: &MaidRunner,
    mode: crate::validate::ValidationMode,
    path: &Path,
    text: &str,
) -> Result<Vec<Diagnostic>, RunnerError> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut snapshot = tempfile::Builder::new()
        .prefix(".maid-lsp-")
        .suffix(".manifest.json")
        .tempfile_in(dir)
        .map_err(RunnerError::Io)?;
    snapshot
        .write_all(text.as_bytes())
        .and_then(|()| snapshot.flush())
        .map_err(RunnerError::Io)?;

    let raw = runner.validate(snapshot.path(), mode).await?;
    Ok(translate(&raw, snapshot.path(), path).into_diagnostics())
}

/// Filesystem roots named by the initialize request.
fn workspace_roots(params: &InitializeParams) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(folders) = &params.workspace_folders {
        for folder in folders {
            if let Ok(path) = uri_to_path(&folder.uri) {
                roots.push(path);
            }
        }
    }
    #[allow(deprecated, reason = "rootUri is all that older clients send")]
    if roots.is_empty() {
        if let Some(root_uri) = &params.root_uri {
            if let Ok(path) = uri_to_path(root_uri) {
                roots.push(path);
            }
        }
    }
    roots
}

/// Whether `path` names a MAID manifest: `*.manifest.json`, or any `.json`
/// under a `manifests/` directory.
#[must_use]
pub fn is_manifest_path(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.ends_with(".manifest.json") {
        return true;
    }
    path.extension().is_some_and(|e| e == "json")
        && path.components().any(|c| c.as_os_str() == "manifests")
}

fn is_python_path(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "py")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    #[test]
    fn manifest_classification() {
        assert!(is_manifest_path(Path::new("/w/task.manifest.json")));
        assert!(is_manifest_path(Path::new("/w/manifests/task.json")));
        assert!(!is_manifest_path(Path::new("/w/settings.json")));
        assert!(!is_manifest_path(Path::new("/w/manifests/readme.md")));
        assert!(!is_manifest_path(Path::new("/w/src/worker.py")));
    }

    #[test]
    fn range_contains_is_inclusive() {
        let range = Range {
            start: Position::new(6, 16),
            end: Position::new(6, 23),
        };
        assert!(range_contains(range, Position::new(6, 16)));
        assert!(range_contains(range, Position::new(6, 20)));
        assert!(range_contains(range, Position::new(6, 23)));
        assert!(!range_contains(range, Position::new(6, 24)));
        assert!(!range_contains(range, Position::new(5, 20)));
    }

    #[test]
    fn python_classification() {
        assert!(is_python_path(Path::new("/w/src/worker.py")));
        assert!(!is_python_path(Path::new("/w/src/worker.pyc")));
    }

    #[test]
    fn workspace_roots_prefer_folders() {
        let params: InitializeParams = serde_json::from_value(serde_json::json!({
            "rootUri": "file:///old/root",
            "workspaceFolders": [
                {"uri": "file:///work/a", "name": "a"},
                {"uri": "file:///work/b", "name": "b"}
            ],
            "capabilities": {}
        }))
        .unwrap();
        assert_eq!(
            workspace_roots(&params),
            vec![PathBuf::from("/work/a"), PathBuf::from("/work/b")]
        );
    }

    #[test]
    fn workspace_roots_fall_back_to_root_uri() {
        let params: InitializeParams = serde_json::from_value(serde_json::json!({
            "rootUri": "file:///old/root",
            "capabilities": {}
        }))
        .unwrap();
        assert_eq!(workspace_roots(&params), vec![PathBuf::from("/old/root")]);
    }
}
