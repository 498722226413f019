// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Open-document state: buffer text, versions, published diagnostics, and
//! the single in-flight validation per document.

use lsp_types::{Diagnostic, Uri};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tokio::task::JoinHandle;
use tracing::debug;

/// The one validation currently running for a document.
#[derive(Debug)]
pub struct InflightValidation {
    /// The document version the validation was started against.
    pub version: i32,
    /// The task driving the validator subprocess.
    pub handle: JoinHandle<()>,
}

/// State tracked for one open document.
#[derive(Debug)]
pub struct DocumentEntry {
    /// Current buffer contents.
    pub text: String,
    /// Editor-assigned version, monotonically increasing per document.
    pub version: i32,
    /// Hash of the text last handed to the validator, for skip-if-unchanged.
    pub last_validated_hash: Option<u64>,
    /// Diagnostics currently published for this document.
    pub diagnostics: Vec<Diagnostic>,
    /// The in-flight validation, if one is running.
    pub inflight: Option<InflightValidation>,
}

impl DocumentEntry {
    fn new(text: String, version: i32) -> Self {
        Self {
            text,
            version,
            last_validated_hash: None,
            diagnostics: Vec::new(),
            inflight: None,
        }
    }

    /// Aborts the in-flight validation, if any. Aborting the task drops the
    /// subprocess future, which kills the child.
    pub fn abort_inflight(&mut self) {
        if let Some(inflight) = self.inflight.take() {
            debug!("Aborting validation for version {}", inflight.version);
            inflight.handle.abort();
        }
    }
}

impl Drop for DocumentEntry {
    fn drop(&mut self) {
        self.abort_inflight();
    }
}

/// All documents the editor currently has open.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: HashMap<Uri, DocumentEntry>,
}

impl DocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly opened document.
    pub fn open(&mut self, uri: Uri, text: String, version: i32) {
        self.docs.insert(uri, DocumentEntry::new(text, version));
    }

    /// Replaces a document's text with a full-sync update. Returns false if
    /// the document is not open.
    pub fn change(&mut self, uri: &Uri, text: String, version: i32) -> bool {
        match self.docs.get_mut(uri) {
            Some(entry) => {
                entry.text = text;
                entry.version = version;
                true
            }
            None => false,
        }
    }

    /// Removes a closed document, aborting any in-flight validation.
    pub fn close(&mut self, uri: &Uri) -> Option<DocumentEntry> {
        self.docs.remove(uri)
    }

    /// The entry for `uri`, if open.
    #[must_use]
    pub fn get(&self, uri: &Uri) -> Option<&DocumentEntry> {
        self.docs.get(uri)
    }

    /// Mutable entry for `uri`, if open.
    pub fn get_mut(&mut self, uri: &Uri) -> Option<&mut DocumentEntry> {
        self.docs.get_mut(uri)
    }

    /// URIs of all open documents.
    pub fn uris(&self) -> impl Iterator<Item = &Uri> {
        self.docs.keys()
    }
}

/// Hashes document text for skip-if-unchanged checks.
///
/// Not a content address, only a cheap same-process equality proxy.
#[must_use]
pub fn text_hash(text: &str) -> u64 {
    let mut hasher = std::hash::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn open_change_close_lifecycle() {
        let mut store = DocumentStore::new();
        let u = uri("file:///work/task.manifest.json");

        store.open(u.clone(), "{}".to_string(), 1);
        assert_eq!(store.get(&u).unwrap().text, "{}");
        assert_eq!(store.get(&u).unwrap().version, 1);

        assert!(store.change(&u, r#"{"goal": "x"}"#.to_string(), 2));
        assert_eq!(store.get(&u).unwrap().version, 2);

        assert!(store.close(&u).is_some());
        assert!(store.get(&u).is_none());
    }

    #[test]
    fn change_to_unknown_document_is_rejected() {
        let mut store = DocumentStore::new();
        assert!(!store.change(&uri("file:///nope.json"), String::new(), 1));
    }

    #[test]
    fn text_hash_distinguishes_contents() {
        assert_eq!(text_hash("abc"), text_hash("abc"));
        assert_ne!(text_hash("abc"), text_hash("abd"));
    }

    #[tokio::test]
    async fn abort_inflight_stops_the_task() {
        let mut store = DocumentStore::new();
        let u = uri("file:///work/task.manifest.json");
        store.open(u.clone(), String::new(), 1);

        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        let entry = store.get_mut(&u).unwrap();
        entry.inflight = Some(InflightValidation { version: 1, handle });

        entry.abort_inflight();
        assert!(entry.inflight.is_none());
    }
}
