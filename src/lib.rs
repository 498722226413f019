// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! maid-lsp is a Language Server Protocol server for MAID manifest files.
//!
//! It turns edits to manifest files into real-time validation feedback by
//! invoking the external `maid` validator as a subprocess, and indexes
//! manifests alongside the Python sources they describe for bidirectional
//! go-to-definition and find-references.

/// Code-action lookup table keyed by diagnostic code.
pub mod actions;
/// Configuration handling for the validator command and pipeline timings.
pub mod config;
/// Per-key debounce timers for collapsing rapid change bursts.
pub mod debounce;
/// Open-document state: text buffers, versions, cached diagnostics.
pub mod documents;
/// Cross-reference index between manifests and Python sources.
pub mod index;
/// Content-Length framed JSON-RPC codec and message types.
pub mod protocol;
/// The LSP server event loop and capability dispatch.
pub mod server;
/// URI/path conversion helpers.
pub mod uri;
/// Validator invocation and result translation.
pub mod validate;
