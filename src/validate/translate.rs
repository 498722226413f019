// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Translates raw validator output into LSP diagnostics.
//!
//! Translation is per-issue fallible: a malformed issue entry is skipped
//! and counted, never allowed to abort the rest of the payload. When any
//! issues were skipped, one trailing note diagnostic reports the count.

use lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, Location, NumberOrString,
    Position, Range,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{DiagnosticCode, INTERNAL_CODE, RawOutput, runner::RunnerError};
use crate::uri::path_to_uri;

/// Diagnostic source tag shown by editors.
const SOURCE: &str = "maid";

/// The outcome of translating one validator payload.
#[derive(Debug, Default)]
pub struct Translation {
    /// Successfully translated diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Number of issue entries that could not be parsed.
    pub skipped: usize,
}

impl Translation {
    /// Consumes the translation, appending the "N issues were unparseable"
    /// note when any entries were skipped.
    #[must_use]
    pub fn into_diagnostics(mut self) -> Vec<Diagnostic> {
        if self.skipped > 0 {
            self.diagnostics.push(unparseable_note(self.skipped));
        }
        self.diagnostics
    }
}

/// Translates a raw validator payload for the document at `document_path`.
///
/// `snapshot_path` is the temp file actually handed to the validator;
/// issue locations naming it are rewritten back to `document_path` so
/// diagnostics never leak snapshot names into the editor.
#[must_use]
pub fn translate(raw: &RawOutput, snapshot_path: &Path, document_path: &Path) -> Translation {
    let mut translation = Translation::default();

    for issue in raw.errors.iter().chain(raw.warnings.iter()) {
        match translate_issue(issue, snapshot_path, document_path) {
            Some(diagnostic) => translation.diagnostics.push(diagnostic),
            None => {
                debug!("Skipping malformed validator issue: {issue}");
                translation.skipped += 1;
            }
        }
    }

    translation
}

/// Translates a single issue entry. `None` means the entry is malformed.
fn translate_issue(issue: &Value, snapshot_path: &Path, document_path: &Path) -> Option<Diagnostic> {
    let code = DiagnosticCode::parse(issue.get("code")?.as_str()?)?;
    let message = issue.get("message")?.as_str()?.to_string();

    let severity = issue.get("severity").and_then(Value::as_str).map_or_else(
        || code.default_severity(),
        |s| parse_severity(s, code),
    );

    let issue_file = issue
        .get("file")
        .and_then(Value::as_str)
        .map(|f| resolve_issue_path(f, snapshot_path, document_path));

    let range = issue_range(issue);

    // An issue placed in a different file still surfaces on the validated
    // document, with the real location attached as related information.
    let (own_range, mut related) = match issue_file {
        Some(path) if path != document_path => {
            let entry = related_entry(&path, range, &message);
            (Range::default(), entry.into_iter().collect::<Vec<_>>())
        }
        _ => (range, Vec::new()),
    };

    if let Some(extra) = issue.get("related").and_then(Value::as_array) {
        for item in extra {
            let Some(file) = item.get("file").and_then(Value::as_str) else {
                continue;
            };
            let path = resolve_issue_path(file, snapshot_path, document_path);
            let item_message = item
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("related location");
            related.extend(related_entry(&path, issue_range(item), item_message));
        }
    }

    Some(Diagnostic {
        range: own_range,
        severity: Some(severity),
        code: Some(NumberOrString::String(code.as_str().to_string())),
        source: Some(SOURCE.to_string()),
        message,
        related_information: (!related.is_empty()).then_some(related),
        ..Diagnostic::default()
    })
}

/// Maps a severity string, falling back to warning for unrecognized values.
fn parse_severity(s: &str, code: DiagnosticCode) -> DiagnosticSeverity {
    match s {
        "error" => DiagnosticSeverity::ERROR,
        "warning" => DiagnosticSeverity::WARNING,
        other => {
            warn!(
                "Unrecognized severity '{other}' on {} issue, defaulting to warning",
                code.as_str()
            );
            DiagnosticSeverity::WARNING
        }
    }
}

/// Extracts the zero-based range from an issue's 1-based `line`/`column`.
///
/// Issues without a location land at the zero range (top of file).
fn issue_range(issue: &Value) -> Range {
    let line = issue
        .get("line")
        .and_then(Value::as_u64)
        .map_or(0, |l| l.saturating_sub(1));
    let character = issue
        .get("column")
        .and_then(Value::as_u64)
        .map_or(0, |c| c.saturating_sub(1));

    let position = Position {
        line: u32::try_from(line).unwrap_or(u32::MAX),
        character: u32::try_from(character).unwrap_or(u32::MAX),
    };
    Range {
        start: position,
        end: position,
    }
}

/// Resolves an issue's `file` field to an absolute path, mapping the
/// snapshot file back to the real document.
fn resolve_issue_path(file: &str, snapshot_path: &Path, document_path: &Path) -> PathBuf {
    let path = Path::new(file);
    if path == snapshot_path {
        return document_path.to_path_buf();
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        // Relative paths are validator-root relative; anchor at the
        // document's directory, matching how the validator was invoked.
        document_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |dir| dir.join(path))
    }
}

/// Builds a related-information entry, dropping it if the path cannot be
/// expressed as a URI.
fn related_entry(
    path: &Path,
    range: Range,
    message: &str,
) -> Option<DiagnosticRelatedInformation> {
    let uri = path_to_uri(path).ok()?;
    Some(DiagnosticRelatedInformation {
        location: Location { uri, range },
        message: message.to_string(),
    })
}

/// The note appended when issue entries were skipped during translation.
fn unparseable_note(skipped: usize) -> Diagnostic {
    Diagnostic {
        range: Range::default(),
        severity: Some(DiagnosticSeverity::WARNING),
        code: Some(NumberOrString::String(INTERNAL_CODE.to_string())),
        source: Some(SOURCE.to_string()),
        message: format!("{skipped} validator issue(s) could not be parsed and were skipped"),
        ..Diagnostic::default()
    }
}

/// Maps an infrastructure failure to the single synthetic diagnostic that
/// tells the editor why validation is unavailable.
#[must_use]
pub fn infra_diagnostic(error: &RunnerError) -> Diagnostic {
    Diagnostic {
        range: Range::default(),
        severity: Some(DiagnosticSeverity::ERROR),
        code: Some(NumberOrString::String(INTERNAL_CODE.to_string())),
        source: Some(SOURCE.to_string()),
        message: format!("maid validation unavailable: {error}"),
        ..Diagnostic::default()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> PathBuf {
        PathBuf::from("/work/manifests/task.manifest.json")
    }

    fn snap() -> PathBuf {
        PathBuf::from("/work/manifests/.task.maid-lsp.json")
    }

    fn raw_with_errors(errors: Vec<Value>) -> RawOutput {
        RawOutput {
            success: errors.is_empty(),
            errors,
            warnings: Vec::new(),
            metadata: Value::Null,
        }
    }

    #[test]
    fn well_formed_issue_translates() {
        let raw = raw_with_errors(vec![json!({
            "code": "MAID-002",
            "message": "Missing required field 'taskType'",
            "line": 1,
            "column": 1
        })]);

        let diagnostics = translate(&raw, &snap(), &doc()).into_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        let d = &diagnostics[0];
        assert_eq!(
            d.code,
            Some(NumberOrString::String("MAID-002".to_string()))
        );
        assert_eq!(d.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(d.range.start, Position::new(0, 0));
        assert!(d.message.contains("taskType"));
    }

    #[test]
    fn partial_failure_keeps_good_issues_and_appends_note() {
        let raw = raw_with_errors(vec![
            json!({"code": "MAID-001", "message": "a", "line": 1}),
            json!({"code": "MAID-004", "message": "b", "line": 2}),
            json!({"code": "MAID-003", "message": "c", "line": 3}),
            json!({"code": "MAID-099", "message": "unknown code"}),
        ]);

        let diagnostics = translate(&raw, &snap(), &doc()).into_diagnostics();
        // 3 well-formed + 1 synthetic note
        assert_eq!(diagnostics.len(), 4);
        let note = diagnostics.last().unwrap();
        assert_eq!(
            note.code,
            Some(NumberOrString::String(INTERNAL_CODE.to_string()))
        );
        assert_eq!(note.severity, Some(DiagnosticSeverity::WARNING));
        assert!(note.message.contains('1'));
    }

    #[test]
    fn issue_missing_message_is_skipped() {
        let raw = raw_with_errors(vec![json!({"code": "MAID-001", "line": 3})]);
        let translation = translate(&raw, &snap(), &doc());
        assert!(translation.diagnostics.is_empty());
        assert_eq!(translation.skipped, 1);
    }

    #[test]
    fn coherence_defaults_to_warning() {
        let raw = RawOutput {
            success: true,
            errors: Vec::new(),
            warnings: vec![json!({"code": "coherence", "message": "drift"})],
            metadata: Value::Null,
        };
        let diagnostics = translate(&raw, &snap(), &doc()).into_diagnostics();
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(
            diagnostics[0].code,
            Some(NumberOrString::String("MAID-008".to_string()))
        );
    }

    #[test]
    fn explicit_severity_overrides_table() {
        let raw = raw_with_errors(vec![json!({
            "code": "MAID-001",
            "message": "soft schema issue",
            "severity": "warning"
        })]);
        let diagnostics = translate(&raw, &snap(), &doc()).into_diagnostics();
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::WARNING));
    }

    #[test]
    fn unrecognized_severity_defaults_to_warning() {
        let raw = raw_with_errors(vec![json!({
            "code": "MAID-001",
            "message": "m",
            "severity": "catastrophic"
        })]);
        let diagnostics = translate(&raw, &snap(), &doc()).into_diagnostics();
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::WARNING));
    }

    #[test]
    fn one_based_locations_become_zero_based() {
        let raw = raw_with_errors(vec![json!({
            "code": "MAID-002",
            "message": "m",
            "line": 12,
            "column": 5
        })]);
        let diagnostics = translate(&raw, &snap(), &doc()).into_diagnostics();
        assert_eq!(diagnostics[0].range.start, Position::new(11, 4));
    }

    #[test]
    fn snapshot_path_maps_back_to_document() {
        let raw = raw_with_errors(vec![json!({
            "code": "MAID-002",
            "message": "m",
            "file": snap().to_string_lossy(),
            "line": 2
        })]);
        let diagnostics = translate(&raw, &snap(), &doc()).into_diagnostics();
        // Treated as the document itself: range kept, no related info
        assert_eq!(diagnostics[0].range.start.line, 1);
        assert!(diagnostics[0].related_information.is_none());
    }

    #[test]
    fn foreign_file_issue_gets_related_location() {
        let raw = raw_with_errors(vec![json!({
            "code": "MAID-007",
            "message": "broken chain link",
            "file": "/work/manifests/other.manifest.json",
            "line": 4,
            "column": 2
        })]);
        let diagnostics = translate(&raw, &snap(), &doc()).into_diagnostics();
        let d = &diagnostics[0];
        // Surfaces at the top of the validated document
        assert_eq!(d.range, Range::default());
        let related = d.related_information.as_ref().unwrap();
        assert_eq!(related.len(), 1);
        assert!(
            related[0]
                .location
                .uri
                .as_str()
                .ends_with("other.manifest.json")
        );
        assert_eq!(related[0].location.range.start, Position::new(3, 1));
    }

    #[test]
    fn infra_failure_becomes_internal_diagnostic() {
        let error = RunnerError::Timeout(std::time::Duration::from_secs(10));
        let d = infra_diagnostic(&error);
        assert_eq!(
            d.code,
            Some(NumberOrString::String(INTERNAL_CODE.to_string()))
        );
        assert_eq!(d.severity, Some(DiagnosticSeverity::ERROR));
        assert!(d.message.contains("timed out"));
    }
}
