// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Cross-reference index linking manifest artifact names to Python
//! declarations and back.
//!
//! The index is flat and file-attributed: every entry remembers which file
//! produced it, and re-parsing a file atomically replaces that file's
//! entries without touching any other file's.

/// Extraction of artifact declarations and references from manifests.
pub mod manifest;
/// Line-scanning of Python sources for declarations and references.
pub mod source;

use lsp_types::{Position, Range};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The kind of code artifact a manifest can expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A function or method.
    Function,
    /// A class.
    Class,
    /// A module-level attribute or constant.
    Attribute,
}

impl ArtifactKind {
    /// Human-readable kind name, as shown in hovers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Attribute => "attribute",
        }
    }

    /// Parses the manifest's `type` field.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" | "method" => Some(Self::Function),
            "class" => Some(Self::Class),
            "attribute" | "constant" | "variable" => Some(Self::Attribute),
            _ => None,
        }
    }
}

/// A declaration of an artifact: where a name is introduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Qualified name (`Class.method` for methods).
    pub name: String,
    /// What kind of artifact the declaration introduces.
    pub kind: ArtifactKind,
    /// The file holding the declaration.
    pub path: PathBuf,
    /// The name's span within the file.
    pub range: Range,
}

/// A mention of a name that is not its declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The mentioned name, as written (unqualified in Python source).
    pub name: String,
    /// The file holding the mention.
    pub path: PathBuf,
    /// The mention's span within the file.
    pub range: Range,
}

/// Everything one parse of one file contributed.
#[derive(Debug, Clone, Default)]
pub struct FileEntries {
    /// Declarations introduced by the file.
    pub declarations: Vec<Declaration>,
    /// Name mentions found in the file.
    pub references: Vec<Reference>,
}

/// The workspace-wide index.
#[derive(Debug, Default)]
pub struct CrossRefIndex {
    files: HashMap<PathBuf, FileEntries>,
}

impl CrossRefIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all entries attributed to `path` in one step.
    pub fn update_file(&mut self, path: PathBuf, entries: FileEntries) {
        self.files.insert(path, entries);
    }

    /// Drops all entries attributed to `path`.
    pub fn remove_file(&mut self, path: &Path) {
        self.files.remove(path);
    }

    /// All declarations matching `name` across the workspace.
    ///
    /// An unqualified name matches qualified declarations by their last
    /// segment, so `method` finds `Worker.method`. Ambiguity is returned,
    /// never resolved by guessing.
    #[must_use]
    pub fn declarations_of(&self, name: &str) -> Vec<&Declaration> {
        let mut found: Vec<&Declaration> = self
            .files
            .values()
            .flat_map(|entries| entries.declarations.iter())
            .filter(|decl| name_matches(&decl.name, name))
            .collect();
        found.sort_by(|a, b| {
            (&a.path, a.range.start.line, a.range.start.character).cmp(&(
                &b.path,
                b.range.start.line,
                b.range.start.character,
            ))
        });
        found
    }

    /// All references to `name`, in deterministic order: mentions in files
    /// that declare the name come first, then the rest by ascending path,
    /// then by position within each file.
    #[must_use]
    pub fn references_of(&self, name: &str) -> Vec<&Reference> {
        let declaring: Vec<&Path> = self
            .files
            .iter()
            .filter(|(_, entries)| {
                entries
                    .declarations
                    .iter()
                    .any(|decl| name_matches(&decl.name, name))
            })
            .map(|(path, _)| path.as_path())
            .collect();

        let mut found: Vec<&Reference> = self
            .files
            .values()
            .flat_map(|entries| entries.references.iter())
            .filter(|r| name_matches(name, &r.name) || name_matches(&r.name, name))
            .collect();

        found.sort_by_key(|r| {
            (
                !declaring.contains(&r.path.as_path()),
                r.path.clone(),
                r.range.start.line,
                r.range.start.character,
            )
        });
        found
    }

    /// Paths currently contributing entries.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }
}

/// Whether the token `query` names the (possibly qualified) `full` name:
/// either exactly, or as its final `.`-separated segment.
#[must_use]
pub fn name_matches(full: &str, query: &str) -> bool {
    full == query || full.rsplit('.').next() == Some(query)
}

/// Extracts the identifier under the cursor. Dots split words, so a cursor
/// inside `worker.process` yields just the segment under it; qualified
/// declarations are still found through [`name_matches`].
#[must_use]
pub fn word_at(text: &str, line: u32, character: u32) -> Option<String> {
    let line_text = text.lines().nth(line as usize)?;
    let col = character as usize;
    if col >= line_text.len() {
        return None;
    }

    let bytes = line_text.as_bytes();
    let start = (0..=col)
        .rev()
        .find(|&i| !is_word_char(bytes[i]))
        .map_or(0, |i| i + 1);
    let end = (col..bytes.len())
        .find(|&i| !is_word_char(bytes[i]))
        .unwrap_or(bytes.len());

    if start >= end {
        return None;
    }
    Some(line_text[start..end].to_string())
}

const fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Converts a byte offset within `text` to an LSP position.
#[must_use]
pub fn offset_to_position(text: &str, offset: usize) -> Position {
    let prefix = &text[..offset.min(text.len())];
    let line = prefix.bytes().filter(|&b| b == b'\n').count();
    let character = prefix
        .rsplit('\n')
        .next()
        .map_or(0, |tail| tail.chars().count());
    Position {
        line: u32::try_from(line).unwrap_or(u32::MAX),
        character: u32::try_from(character).unwrap_or(u32::MAX),
    }
}

/// The span `[offset, offset + len)` as an LSP range. `len` is in bytes of
/// an ASCII identifier, so characters equal bytes.
#[must_use]
pub fn span_range(text: &str, offset: usize, len: usize) -> Range {
    let start = offset_to_position(text, offset);
    let end = Position {
        line: start.line,
        character: start.character.saturating_add(u32::try_from(len).unwrap_or(u32::MAX)),
    };
    Range { start, end }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    fn decl(name: &str, path: &str, line: u32) -> Declaration {
        Declaration {
            name: name.to_string(),
            kind: ArtifactKind::Function,
            path: PathBuf::from(path),
            range: Range {
                start: Position::new(line, 4),
                end: Position::new(line, 4),
            },
        }
    }

    fn reference(name: &str, path: &str, line: u32, character: u32) -> Reference {
        Reference {
            name: name.to_string(),
            path: PathBuf::from(path),
            range: Range {
                start: Position::new(line, character),
                end: Position::new(line, character),
            },
        }
    }

    #[test]
    fn update_file_replaces_atomically() {
        let mut index = CrossRefIndex::new();
        let path = PathBuf::from("/work/src/worker.py");

        index.update_file(
            path.clone(),
            FileEntries {
                declarations: vec![decl("old_name", "/work/src/worker.py", 1)],
                references: Vec::new(),
            },
        );
        assert_eq!(index.declarations_of("old_name").len(), 1);

        index.update_file(
            path,
            FileEntries {
                declarations: vec![decl("new_name", "/work/src/worker.py", 1)],
                references: Vec::new(),
            },
        );
        assert!(index.declarations_of("old_name").is_empty());
        assert_eq!(index.declarations_of("new_name").len(), 1);
    }

    #[test]
    fn unqualified_query_matches_method() {
        let mut index = CrossRefIndex::new();
        index.update_file(
            PathBuf::from("/work/src/worker.py"),
            FileEntries {
                declarations: vec![decl("Worker.process", "/work/src/worker.py", 10)],
                references: Vec::new(),
            },
        );
        assert_eq!(index.declarations_of("process").len(), 1);
        assert_eq!(index.declarations_of("Worker.process").len(), 1);
        assert!(index.declarations_of("Worker").is_empty());
    }

    #[test]
    fn ambiguous_name_returns_all_declarations() {
        let mut index = CrossRefIndex::new();
        for path in ["/work/src/b.py", "/work/src/a.py"] {
            index.update_file(
                PathBuf::from(path),
                FileEntries {
                    declarations: vec![decl("run", path, 1)],
                    references: Vec::new(),
                },
            );
        }
        let found = index.declarations_of("run");
        assert_eq!(found.len(), 2);
        // Path-ascending order
        assert_eq!(found[0].path, PathBuf::from("/work/src/a.py"));
    }

    #[test]
    fn references_order_declaring_file_first() {
        let mut index = CrossRefIndex::new();
        index.update_file(
            PathBuf::from("/work/src/zz_worker.py"),
            FileEntries {
                declarations: vec![decl("process", "/work/src/zz_worker.py", 3)],
                references: vec![reference("process", "/work/src/zz_worker.py", 9, 0)],
            },
        );
        index.update_file(
            PathBuf::from("/work/src/aa_caller.py"),
            FileEntries {
                declarations: Vec::new(),
                references: vec![
                    reference("process", "/work/src/aa_caller.py", 7, 12),
                    reference("process", "/work/src/aa_caller.py", 2, 4),
                ],
            },
        );

        let refs = index.references_of("process");
        assert_eq!(refs.len(), 3);
        // Declaring file first despite sorting after the caller by path
        assert_eq!(refs[0].path, PathBuf::from("/work/src/zz_worker.py"));
        // Then remaining files by path, positions ascending within a file
        assert_eq!(refs[1].range.start, Position::new(2, 4));
        assert_eq!(refs[2].range.start, Position::new(7, 12));
    }

    #[test]
    fn remove_file_drops_its_entries() {
        let mut index = CrossRefIndex::new();
        let path = PathBuf::from("/work/src/worker.py");
        index.update_file(
            path.clone(),
            FileEntries {
                declarations: vec![decl("run", "/work/src/worker.py", 1)],
                references: Vec::new(),
            },
        );
        index.remove_file(&path);
        assert!(index.declarations_of("run").is_empty());
    }

    #[test]
    fn word_at_splits_on_dots() {
        let text = "result = worker.process(batch)\n";
        assert_eq!(word_at(text, 0, 0), Some("result".to_string()));
        assert_eq!(word_at(text, 0, 11), Some("worker".to_string()));
        assert_eq!(word_at(text, 0, 18), Some("process".to_string()));
        assert_eq!(word_at(text, 0, 25), Some("batch".to_string()));
        assert_eq!(word_at(text, 0, 8), None); // whitespace
    }

    #[test]
    fn instance_qualified_call_site_resolves_to_method() {
        let mut index = CrossRefIndex::new();
        index.update_file(
            PathBuf::from("/work/src/worker.py"),
            FileEntries {
                declarations: vec![decl("Worker.process", "/work/src/worker.py", 1)],
                references: Vec::new(),
            },
        );

        // Cursor inside "process" of `worker.process(batch)`
        let word = word_at("    return worker.process(batch)\n", 0, 20).unwrap();
        assert_eq!(word, "process");
        assert_eq!(index.declarations_of(&word).len(), 1);
    }

    #[test]
    fn offset_to_position_counts_lines() {
        let text = "first\nsecond line\n";
        assert_eq!(offset_to_position(text, 0), Position::new(0, 0));
        assert_eq!(offset_to_position(text, 6), Position::new(1, 0));
        assert_eq!(offset_to_position(text, 13), Position::new(1, 7));
    }
}
