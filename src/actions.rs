// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Quick fixes for validator diagnostics.
//!
//! Dispatch is a closed table over the diagnostic code set: each code maps
//! to a fix builder or to nothing. Unknown codes can never reach this
//! module because translation rejects them.

use lsp_types::{
    CodeAction, CodeActionKind, Diagnostic, NumberOrString, Position, Range, TextEdit, Uri,
    WorkspaceEdit,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::index::offset_to_position;
use crate::validate::DiagnosticCode;

fn field_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"'(?P<field>[A-Za-z_][A-Za-z0-9_]*)'")
            .unwrap_or_else(|_| unreachable!("static regex is valid"))
    })
}

/// Builds the quick fixes available for one diagnostic on one document.
///
/// `text` is the current buffer contents, used to position insertions.
#[must_use]
pub fn actions_for(diagnostic: &Diagnostic, uri: &Uri, text: &str) -> Vec<CodeAction> {
    let Some(NumberOrString::String(code)) = &diagnostic.code else {
        return Vec::new();
    };
    let Some(code) = DiagnosticCode::parse(code) else {
        return Vec::new();
    };

    match code {
        DiagnosticCode::MissingField => {
            add_missing_field(diagnostic, uri, text).into_iter().collect()
        }
        // No fix is currently offered for the remaining codes.
        DiagnosticCode::Schema
        | DiagnosticCode::FileReference
        | DiagnosticCode::Artifact
        | DiagnosticCode::Behavioral
        | DiagnosticCode::Implementation
        | DiagnosticCode::ManifestChain
        | DiagnosticCode::Coherence => Vec::new(),
    }
}

/// The `MAID-002` fix: insert a skeleton entry for the missing field right
/// after the manifest's opening brace.
fn add_missing_field(diagnostic: &Diagnostic, uri: &Uri, text: &str) -> Option<CodeAction> {
    let field = field_name_regex()
        .captures(&diagnostic.message)?
        .name("field")?
        .as_str()
        .to_string();

    let brace = text.find('{')?;
    let after = text[brace + 1..].trim_start();

    let skeleton = match field.as_str() {
        "expectedArtifacts" | "validation" => "{}",
        _ => "\"\"",
    };
    // No trailing comma into an otherwise-empty object
    let separator = if after.starts_with('}') { "" } else { "," };
    let new_text = format!("\n  \"{field}\": {skeleton}{separator}");

    let at = offset_to_position(text, brace + 1);
    let edit = TextEdit {
        range: Range {
            start: at,
            end: at,
        },
        new_text,
    };

    let mut changes = HashMap::new();
    changes.insert(uri.clone(), vec![edit]);

    Some(CodeAction {
        title: format!("Add missing field '{field}'"),
        kind: Some(CodeActionKind::QUICKFIX),
        diagnostics: Some(vec![diagnostic.clone()]),
        edit: Some(WorkspaceEdit {
            changes: Some(changes),
            ..WorkspaceEdit::default()
        }),
        ..CodeAction::default()
    })
}

/// Filters the published diagnostics down to those overlapping the
/// code-action request range.
#[must_use]
pub fn diagnostics_in_range(diagnostics: &[Diagnostic], range: Range) -> Vec<&Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| ranges_overlap(d.range, range))
        .collect()
}

fn ranges_overlap(a: Range, b: Range) -> bool {
    position_le(a.start, b.end) && position_le(b.start, a.end)
}

const fn position_le(a: Position, b: Position) -> bool {
    a.line < b.line || (a.line == b.line && a.character <= b.character)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use lsp_types::DiagnosticSeverity;

    fn missing_field_diagnostic(message: &str) -> Diagnostic {
        Diagnostic {
            range: Range::default(),
            severity: Some(DiagnosticSeverity::ERROR),
            code: Some(NumberOrString::String("MAID-002".to_string())),
            source: Some("maid".to_string()),
            message: message.to_string(),
            ..Diagnostic::default()
        }
    }

    fn uri() -> Uri {
        "file:///work/manifests/task.manifest.json".parse().unwrap()
    }

    #[test]
    fn missing_field_gets_insert_fix() {
        let diagnostic = missing_field_diagnostic("Missing required field 'taskType'");
        let text = "{\n  \"goal\": \"x\"\n}\n";

        let actions = actions_for(&diagnostic, &uri(), text);
        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(action.title, "Add missing field 'taskType'");
        assert_eq!(action.kind, Some(CodeActionKind::QUICKFIX));

        let changes = action.edit.as_ref().unwrap().changes.as_ref().unwrap();
        let edits = changes.get(&uri()).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_text, "\n  \"taskType\": \"\",");
        assert_eq!(edits[0].range.start, Position::new(0, 1));
    }

    #[test]
    fn empty_object_gets_no_trailing_comma() {
        let diagnostic = missing_field_diagnostic("Missing required field 'goal'");
        let actions = actions_for(&diagnostic, &uri(), "{}\n");
        assert_eq!(actions[0].edit.as_ref().unwrap().changes.as_ref().unwrap()[&uri()][0].new_text, "\n  \"goal\": \"\"");
    }

    #[test]
    fn object_valued_fields_get_object_skeleton() {
        let diagnostic =
            missing_field_diagnostic("Missing required field 'expectedArtifacts'");
        let actions = actions_for(&diagnostic, &uri(), "{\n  \"goal\": \"x\"\n}\n");
        let changes = actions[0].edit.as_ref().unwrap().changes.as_ref().unwrap();
        assert!(changes[&uri()][0].new_text.contains("\"expectedArtifacts\": {}"));
    }

    #[test]
    fn message_without_field_name_yields_no_fix() {
        let diagnostic = missing_field_diagnostic("A required field is missing");
        assert!(actions_for(&diagnostic, &uri(), "{}").is_empty());
    }

    #[test]
    fn other_codes_yield_no_fix() {
        let mut diagnostic = missing_field_diagnostic("Missing required field 'goal'");
        diagnostic.code = Some(NumberOrString::String("MAID-005".to_string()));
        assert!(actions_for(&diagnostic, &uri(), "{}").is_empty());
    }

    #[test]
    fn range_overlap_selects_diagnostics() {
        let mut d1 = missing_field_diagnostic("Missing required field 'goal'");
        d1.range = Range {
            start: Position::new(2, 0),
            end: Position::new(2, 10),
        };
        let mut d2 = d1.clone();
        d2.range = Range {
            start: Position::new(8, 0),
            end: Position::new(8, 5),
        };

        let all = vec![d1, d2];
        let selected = diagnostics_in_range(
            &all,
            Range {
                start: Position::new(2, 3),
                end: Position::new(2, 3),
            },
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].range.start.line, 2);
    }
}
