// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Validation pipeline types: modes, the raw validator output model, and
//! the fixed diagnostic code table.

/// Subprocess invocation of the external validator.
pub mod runner;
/// Translation of raw validator output into LSP diagnostics.
pub mod translate;

use lsp_types::DiagnosticSeverity;
use serde::{Deserialize, Serialize};

/// The internal diagnostic code used for infrastructure failures
/// (timeout, spawn failure, unparseable validator output) and for the
/// "N issues were unparseable" note. Not part of the validator's table.
pub const INTERNAL_CODE: &str = "MAID-000";

/// Validation mode passed to the validator's `--validation-mode` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    /// Manifest schema checks only.
    Schema,
    /// Expected-artifact presence and shape checks.
    Artifacts,
    /// Behavioral (test-command) checks.
    Behavioral,
    /// Implementation-level checks.
    Implementation,
    /// Every check, following the manifest chain.
    #[default]
    FullChain,
}

impl ValidationMode {
    /// The flag value understood by the validator CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Artifacts => "artifacts",
            Self::Behavioral => "behavioral",
            Self::Implementation => "implementation",
            Self::FullChain => "full-chain",
        }
    }
}

impl std::str::FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schema" => Ok(Self::Schema),
            "artifacts" => Ok(Self::Artifacts),
            "behavioral" => Ok(Self::Behavioral),
            "implementation" => Ok(Self::Implementation),
            "full-chain" => Ok(Self::FullChain),
            other => Err(format!(
                "unknown validation mode '{other}' (expected one of: schema, \
                 artifacts, behavioral, implementation, full-chain)"
            )),
        }
    }
}

/// The validator's machine-readable output, as printed with `--json-output`.
///
/// Issue entries stay as raw JSON values so translation can fail per-issue
/// instead of rejecting the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOutput {
    /// Whether validation passed overall.
    #[serde(default)]
    pub success: bool,
    /// Error-level issues.
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    /// Warning-level issues.
    #[serde(default)]
    pub warnings: Vec<serde_json::Value>,
    /// Free-form metadata (validator version, counts, timings).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// The closed set of diagnostic categories the validator reports.
///
/// The code strings (`MAID-001`..`MAID-008`) and their default severities
/// are a stable contract with editors and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// `MAID-001` — manifest violates the schema.
    Schema,
    /// `MAID-002` — a required manifest field is missing.
    MissingField,
    /// `MAID-003` — a referenced file does not exist.
    FileReference,
    /// `MAID-004` — an expected artifact is missing or malformed.
    Artifact,
    /// `MAID-005` — behavioral validation failed.
    Behavioral,
    /// `MAID-006` — implementation validation failed.
    Implementation,
    /// `MAID-007` — a manifest-chain link is broken.
    ManifestChain,
    /// `MAID-008` — cross-manifest coherence concern (warning).
    Coherence,
}

impl DiagnosticCode {
    /// All eight categories, in code order.
    pub const ALL: [Self; 8] = [
        Self::Schema,
        Self::MissingField,
        Self::FileReference,
        Self::Artifact,
        Self::Behavioral,
        Self::Implementation,
        Self::ManifestChain,
        Self::Coherence,
    ];

    /// The stable wire code, e.g. `MAID-002`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "MAID-001",
            Self::MissingField => "MAID-002",
            Self::FileReference => "MAID-003",
            Self::Artifact => "MAID-004",
            Self::Behavioral => "MAID-005",
            Self::Implementation => "MAID-006",
            Self::ManifestChain => "MAID-007",
            Self::Coherence => "MAID-008",
        }
    }

    /// The category name used in validator output.
    #[must_use]
    pub const fn category(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::MissingField => "missing-field",
            Self::FileReference => "file-reference",
            Self::Artifact => "artifact",
            Self::Behavioral => "behavioral",
            Self::Implementation => "implementation",
            Self::ManifestChain => "manifest-chain",
            Self::Coherence => "coherence",
        }
    }

    /// Parses either the wire code (`MAID-004`) or the category name
    /// (`artifact`). Unknown strings yield `None` — callers must treat
    /// the issue as malformed rather than guess a category.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s || code.category() == s)
    }

    /// The severity mandated by the code table: `MAID-008` is a warning,
    /// everything else an error.
    #[must_use]
    pub const fn default_severity(self) -> DiagnosticSeverity {
        match self {
            Self::Coherence => DiagnosticSeverity::WARNING,
            _ => DiagnosticSeverity::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_table_is_stable() {
        let expected = [
            ("MAID-001", "schema"),
            ("MAID-002", "missing-field"),
            ("MAID-003", "file-reference"),
            ("MAID-004", "artifact"),
            ("MAID-005", "behavioral"),
            ("MAID-006", "implementation"),
            ("MAID-007", "manifest-chain"),
            ("MAID-008", "coherence"),
        ];
        for (code, (wire, category)) in DiagnosticCode::ALL.into_iter().zip(expected) {
            assert_eq!(code.as_str(), wire);
            assert_eq!(code.category(), category);
        }
    }

    #[test]
    fn only_coherence_is_warning() {
        for code in DiagnosticCode::ALL {
            let expected = if code == DiagnosticCode::Coherence {
                DiagnosticSeverity::WARNING
            } else {
                DiagnosticSeverity::ERROR
            };
            assert_eq!(code.default_severity(), expected, "{}", code.as_str());
        }
    }

    #[test]
    fn parse_accepts_wire_code_and_category() {
        assert_eq!(
            DiagnosticCode::parse("MAID-002"),
            Some(DiagnosticCode::MissingField)
        );
        assert_eq!(
            DiagnosticCode::parse("missing-field"),
            Some(DiagnosticCode::MissingField)
        );
        assert_eq!(DiagnosticCode::parse("MAID-099"), None);
        assert_eq!(DiagnosticCode::parse(""), None);
    }

    #[test]
    fn mode_round_trips_through_str() {
        for mode in [
            ValidationMode::Schema,
            ValidationMode::Artifacts,
            ValidationMode::Behavioral,
            ValidationMode::Implementation,
            ValidationMode::FullChain,
        ] {
            assert_eq!(mode.as_str().parse::<ValidationMode>(), Ok(mode));
        }
        assert!("bogus".parse::<ValidationMode>().is_err());
    }

    #[test]
    fn raw_output_tolerates_missing_fields() {
        let raw: RawOutput = serde_json::from_str("{}").unwrap_or_default();
        assert!(!raw.success);
        assert!(raw.errors.is_empty());
        assert!(raw.warnings.is_empty());
    }
}
