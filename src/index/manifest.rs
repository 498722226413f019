// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Artifact extraction from MAID manifest JSON.
//!
//! The manifest's `expectedArtifacts` section declares which functions,
//! classes, and attributes a unit of work must produce. Those entries are
//! the manifest-side declarations; any other quoted occurrence of an
//! artifact name in the manifest counts as a reference.

use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use super::{ArtifactKind, Declaration, FileEntries, Reference, span_range};

fn name_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Positions come from the raw text, not the parsed tree, so spans point
    // at the quoted value of each "name" pair.
    RE.get_or_init(|| {
        Regex::new(r#""name"\s*:\s*"(?P<value>[A-Za-z_][A-Za-z0-9_.]*)""#)
            .unwrap_or_else(|_| unreachable!("static regex is valid"))
    })
}

/// One `expectedArtifacts.contains[]` entry, carrying enough to build
/// hovers and declarations.
#[derive(Debug, Clone)]
pub struct ExpectedArtifact {
    /// Qualified artifact name (`Class.method` when a `class` is given).
    pub name: String,
    /// Artifact kind; entries with unknown `type` default to function.
    pub kind: ArtifactKind,
    /// The Python file the artifact is expected in, as written.
    pub file: String,
}

/// Parses the manifest's expected artifacts.
///
/// Tolerates `expectedArtifacts` being a single object or an array of
/// objects; entries without a `name` are skipped.
#[must_use]
pub fn expected_artifacts(manifest: &Value) -> Vec<ExpectedArtifact> {
    let Some(section) = manifest.get("expectedArtifacts") else {
        return Vec::new();
    };

    let groups: Vec<&Value> = match section {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut artifacts = Vec::new();
    for group in groups {
        let file = group
            .get("file")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(contains) = group.get("contains").and_then(Value::as_array) else {
            continue;
        };
        for entry in contains {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            let kind = entry
                .get("type")
                .and_then(Value::as_str)
                .and_then(ArtifactKind::parse)
                .unwrap_or(ArtifactKind::Function);
            let qualified = entry.get("class").and_then(Value::as_str).map_or_else(
                || name.to_string(),
                |class| format!("{class}.{name}"),
            );
            artifacts.push(ExpectedArtifact {
                name: qualified,
                kind,
                file: file.clone(),
            });
        }
    }
    artifacts
}

/// Indexes one manifest document: declarations at each `"name": "..."`
/// pair, references at every other quoted occurrence of an artifact name.
#[must_use]
pub fn index_manifest(path: &Path, text: &str) -> FileEntries {
    let Ok(parsed) = serde_json::from_str::<Value>(text) else {
        debug!("Manifest {} is not valid JSON, skipping", path.display());
        return FileEntries::default();
    };

    let artifacts = expected_artifacts(&parsed);
    let mut entries = FileEntries::default();

    // The last segment is what appears in the "name" pair for qualified
    // entries; spans are located through it.
    for artifact in &artifacts {
        let written = artifact.name.rsplit('.').next().unwrap_or(&artifact.name);
        let mut declared_at = None;

        for capture in name_pair_regex().captures_iter(text) {
            let Some(value) = capture.name("value") else {
                continue;
            };
            if value.as_str() == written {
                declared_at = Some(value.range());
                break;
            }
        }

        if let Some(span) = &declared_at {
            entries.declarations.push(Declaration {
                name: artifact.name.clone(),
                kind: artifact.kind,
                path: path.to_path_buf(),
                range: span_range(text, span.start, span.len()),
            });
        }

        // Other quoted occurrences (test commands, descriptions) reference
        // the artifact.
        let quoted = format!("\"{written}\"");
        let mut from = 0;
        while let Some(found) = text[from..].find(&quoted) {
            let offset = from + found + 1;
            from = offset + written.len();
            if declared_at.as_ref().is_some_and(|span| span.start == offset) {
                continue;
            }
            entries.references.push(Reference {
                name: artifact.name.clone(),
                path: path.to_path_buf(),
                range: span_range(text, offset, written.len()),
            });
        }
    }

    entries
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const MANIFEST: &str = r#"{
  "goal": "Add batch processing to the worker",
  "taskType": "feature",
  "expectedArtifacts": {
    "file": "src/worker.py",
    "contains": [
      {"name": "process", "type": "function", "class": "Worker"},
      {"name": "Worker", "type": "class"},
      {"name": "BATCH_SIZE", "type": "constant"}
    ]
  },
  "validation": {
    "command": "pytest tests/test_worker.py -k process"
  }
}"#;

    fn path() -> PathBuf {
        PathBuf::from("/work/manifests/worker.manifest.json")
    }

    #[test]
    fn extracts_qualified_artifacts() {
        let parsed: Value = serde_json::from_str(MANIFEST).unwrap();
        let artifacts = expected_artifacts(&parsed);
        assert_eq!(artifacts.len(), 3);
        assert_eq!(artifacts[0].name, "Worker.process");
        assert_eq!(artifacts[0].kind, ArtifactKind::Function);
        assert_eq!(artifacts[0].file, "src/worker.py");
        assert_eq!(artifacts[1].name, "Worker");
        assert_eq!(artifacts[1].kind, ArtifactKind::Class);
        assert_eq!(artifacts[2].kind, ArtifactKind::Attribute);
    }

    #[test]
    fn declarations_point_at_name_values() {
        let entries = index_manifest(&path(), MANIFEST);
        assert_eq!(entries.declarations.len(), 3);

        let process = entries
            .declarations
            .iter()
            .find(|d| d.name == "Worker.process")
            .unwrap();
        // "process" appears on the first contains line
        assert_eq!(process.range.start.line, 6);
        let line = MANIFEST.lines().nth(6).unwrap();
        let col = process.range.start.character as usize;
        assert_eq!(&line[col..col + "process".len()], "process");
    }

    #[test]
    fn other_quoted_occurrences_are_references() {
        let text = r#"{
  "expectedArtifacts": {
    "file": "src/worker.py",
    "contains": [{"name": "process", "type": "function"}]
  },
  "notes": "process"
}"#;
        let entries = index_manifest(&path(), text);
        assert_eq!(entries.declarations.len(), 1);
        assert_eq!(entries.references.len(), 1);
        assert_eq!(entries.references[0].range.start.line, 5);
    }

    #[test]
    fn invalid_json_yields_empty_entries() {
        let entries = index_manifest(&path(), "{ not json");
        assert!(entries.declarations.is_empty());
        assert!(entries.references.is_empty());
    }

    #[test]
    fn array_form_of_expected_artifacts_is_accepted() {
        let text = r#"{
  "expectedArtifacts": [
    {"file": "src/a.py", "contains": [{"name": "alpha", "type": "function"}]},
    {"file": "src/b.py", "contains": [{"name": "beta", "type": "function"}]}
  ]
}"#;
        let parsed: Value = serde_json::from_str(text).unwrap();
        let artifacts = expected_artifacts(&parsed);
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].file, "src/a.py");
        assert_eq!(artifacts[1].file, "src/b.py");
    }
}
