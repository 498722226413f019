// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Declaration and reference extraction from Python source.
//!
//! This is a line scanner, not a parser: it recognizes module-level `def`,
//! `class`, and assignment forms, qualifies methods under their enclosing
//! class, and records every other identifier occurrence as a reference.
//! Good enough for navigation; never used for validation.

use lsp_types::{Position, Range};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use super::{ArtifactKind, Declaration, FileEntries, Reference};

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*")
            .unwrap_or_else(|_| unreachable!("static regex is valid"))
    })
}

/// Words that can never be artifact names or references.
const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "self", "try",
    "while", "with", "yield",
];

/// Indexes one Python file.
#[must_use]
pub fn index_source(path: &Path, text: &str) -> FileEntries {
    let mut entries = FileEntries::default();
    // The class whose suite we are currently inside, if any.
    let mut enclosing_class: Option<String> = None;

    for (line_idx, raw_line) in text.lines().enumerate() {
        let line = strip_comment(raw_line);
        if line.trim().is_empty() {
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        if indent == 0 && !line.trim_start().starts_with(')') {
            enclosing_class = None;
        }

        let declared = declaration_on(line, line_idx, indent, enclosing_class.as_deref(), path);
        if let Some(decl) = &declared {
            if decl.kind == ArtifactKind::Class {
                enclosing_class = Some(decl.name.clone());
            }
        }

        let declared_span = declared.as_ref().map(|d| d.range.start);
        if let Some(decl) = declared {
            entries.declarations.push(decl);
        }

        for found in identifier_regex().find_iter(line) {
            let word = found.as_str();
            if KEYWORDS.contains(&word) {
                continue;
            }
            let start = Position {
                line: position_u32(line_idx),
                character: position_u32(found.start()),
            };
            if declared_span == Some(start) {
                continue;
            }
            entries.references.push(Reference {
                name: word.to_string(),
                path: path.to_path_buf(),
                range: Range {
                    start,
                    end: Position {
                        line: start.line,
                        character: position_u32(found.end()),
                    },
                },
            });
        }
    }

    entries
}

/// Recognizes the declaration introduced by one line, if any.
fn declaration_on(
    line: &str,
    line_idx: usize,
    indent: usize,
    enclosing_class: Option<&str>,
    path: &Path,
) -> Option<Declaration> {
    let trimmed = line.trim_start();

    if let Some(rest) = trimmed.strip_prefix("class ") {
        let name = leading_identifier(rest)?;
        return Some(declaration(
            name.to_string(),
            ArtifactKind::Class,
            line_idx,
            indent + "class ".len(),
            name.len(),
            path,
        ));
    }

    if let Some(rest) = trimmed
        .strip_prefix("def ")
        .or_else(|| trimmed.strip_prefix("async def "))
    {
        let keyword_len = trimmed.len() - rest.len();
        let name = leading_identifier(rest)?;
        // An indented def inside a class suite is a method.
        let qualified = match (indent > 0, enclosing_class) {
            (true, Some(class)) => format!("{class}.{name}"),
            _ => name.to_string(),
        };
        return Some(declaration(
            qualified,
            ArtifactKind::Function,
            line_idx,
            indent + keyword_len,
            name.len(),
            path,
        ));
    }

    // Module-level assignment: `NAME = ...` or `NAME: Type = ...`
    if indent == 0 {
        let name = leading_identifier(trimmed)?;
        let after = trimmed[name.len()..].trim_start();
        if after.starts_with('=') && !after.starts_with("==")
            || after.starts_with(':') && after.contains('=')
        {
            return Some(declaration(
                name.to_string(),
                ArtifactKind::Attribute,
                line_idx,
                0,
                name.len(),
                path,
            ));
        }
    }

    None
}

fn declaration(
    name: String,
    kind: ArtifactKind,
    line_idx: usize,
    column: usize,
    len: usize,
    path: &Path,
) -> Declaration {
    let start = Position {
        line: position_u32(line_idx),
        character: position_u32(column),
    };
    Declaration {
        name,
        kind,
        path: path.to_path_buf(),
        range: Range {
            start,
            end: Position {
                line: start.line,
                character: position_u32(column + len),
            },
        },
    }
}

fn leading_identifier(s: &str) -> Option<&str> {
    let end = s
        .char_indices()
        .find(|(i, c)| {
            if *i == 0 {
                !(c.is_ascii_alphabetic() || *c == '_')
            } else {
                !(c.is_ascii_alphanumeric() || *c == '_')
            }
        })
        .map_or(s.len(), |(i, _)| i);
    (end > 0).then(|| &s[..end])
}

/// Drops a `#` comment tail, ignoring `#` inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string: Option<char> = None;
    for (i, c) in line.char_indices() {
        match in_string {
            Some(quote) if c == quote => in_string = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => in_string = Some(c),
            None if c == '#' => return &line[..i],
            None => {}
        }
    }
    line
}

fn position_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SOURCE: &str = "\
import json

BATCH_SIZE = 100
RETRY_LIMIT: int = 3


class Worker:
    def __init__(self, queue):
        self.queue = queue

    def process(self, batch):
        return json.dumps(batch)


def run(worker):
    # drain the queue completely
    return worker.process(worker.queue)
";

    fn path() -> PathBuf {
        PathBuf::from("/work/src/worker.py")
    }

    fn declarations(text: &str) -> Vec<Declaration> {
        index_source(&path(), text).declarations
    }

    #[test]
    fn finds_all_declaration_forms() {
        let names: Vec<(String, ArtifactKind)> = declarations(SOURCE)
            .into_iter()
            .map(|d| (d.name, d.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("BATCH_SIZE".to_string(), ArtifactKind::Attribute),
                ("RETRY_LIMIT".to_string(), ArtifactKind::Attribute),
                ("Worker".to_string(), ArtifactKind::Class),
                ("Worker.__init__".to_string(), ArtifactKind::Function),
                ("Worker.process".to_string(), ArtifactKind::Function),
                ("run".to_string(), ArtifactKind::Function),
            ]
        );
    }

    #[test]
    fn method_declaration_has_precise_span() {
        let decls = declarations(SOURCE);
        let process = decls.iter().find(|d| d.name == "Worker.process").unwrap();
        assert_eq!(process.range.start, Position::new(10, 8));
        assert_eq!(process.range.end, Position::new(10, 15));
    }

    #[test]
    fn module_level_def_is_not_qualified() {
        let decls = declarations(SOURCE);
        assert!(decls.iter().any(|d| d.name == "run"));
        assert!(!decls.iter().any(|d| d.name == "Worker.run"));
    }

    #[test]
    fn references_exclude_declaration_site_and_comments() {
        let entries = index_source(&path(), SOURCE);
        let process_refs: Vec<&Reference> = entries
            .references
            .iter()
            .filter(|r| r.name == "process")
            .collect();
        // Only the call in run(), not the def line
        assert_eq!(process_refs.len(), 1);
        assert_eq!(process_refs[0].range.start.line, 16);

        assert!(
            !entries.references.iter().any(|r| r.name == "drain"),
            "comment text must not produce references"
        );
    }

    #[test]
    fn comparison_is_not_an_assignment() {
        let decls = declarations("x == 3\n");
        assert!(decls.is_empty());
    }

    #[test]
    fn class_scope_ends_at_next_top_level_line() {
        let decls = declarations(SOURCE);
        let run = decls.iter().find(|d| d.name == "run").unwrap();
        assert_eq!(run.kind, ArtifactKind::Function);
        assert_eq!(run.range.start.line, 14);
    }

    #[test]
    fn async_def_is_recognized() {
        let decls = declarations("async def fetch(url):\n    pass\n");
        assert_eq!(decls[0].name, "fetch");
        assert_eq!(decls[0].range.start.character, 10);
    }
}
