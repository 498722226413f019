// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Conversions between `lsp_types::Uri` and filesystem paths.
//!
//! Goes through the `url` crate so percent-encoded paths (spaces, unicode)
//! survive the round trip.

use anyhow::{Result, anyhow};
use lsp_types::Uri;
use std::path::{Path, PathBuf};
use url::Url;

/// Converts an absolute filesystem path to a `file://` URI.
///
/// # Errors
///
/// Returns an error if the path is not absolute or cannot be expressed
/// as a URL.
pub fn path_to_uri(path: &Path) -> Result<Uri> {
    let url = Url::from_file_path(path)
        .map_err(|()| anyhow!("Path is not absolute: {}", path.display()))?;
    url.as_str()
        .parse()
        .map_err(|e| anyhow!("Invalid URI for {}: {e}", path.display()))
}

/// Converts a `file://` URI back to a filesystem path.
///
/// # Errors
///
/// Returns an error if the URI is not a valid `file` URL.
pub fn uri_to_path(uri: &Uri) -> Result<PathBuf> {
    let url = Url::parse(uri.as_str()).map_err(|e| anyhow!("Invalid URI {uri:?}: {e}"))?;
    url.to_file_path()
        .map_err(|()| anyhow!("Not a file URI: {uri:?}"))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_path() {
        let path = Path::new("/home/user/project/task.manifest.json");
        let uri = path_to_uri(path).unwrap();
        assert!(uri.as_str().starts_with("file:///"));
        assert_eq!(uri_to_path(&uri).unwrap(), path);
    }

    #[test]
    fn round_trips_path_with_spaces() {
        let path = Path::new("/home/user/my project/task.manifest.json");
        let uri = path_to_uri(path).unwrap();
        // Percent-encoded on the wire, decoded on the way back
        assert!(uri.as_str().contains("my%20project"));
        assert_eq!(uri_to_path(&uri).unwrap(), path);
    }

    #[test]
    fn rejects_relative_path() {
        assert!(path_to_uri(Path::new("relative/path.json")).is_err());
    }

    #[test]
    fn rejects_non_file_uri() {
        let uri: Uri = "https://example.com/x".parse().unwrap();
        assert!(uri_to_path(&uri).is_err());
    }
}
