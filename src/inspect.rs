//! Filesystem collaborators for the store.
//!
//! The store never touches the filesystem directly. It asks a
//! [`PathInspector`] whether a path exists and, once per create, what can
//! be inferred about it. [`LocalInspector`] reads `std::fs` metadata.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::Path;

pub trait PathInspector: Send + Sync {
    /// Whether `path` currently exists.
    fn exists(&self, path: &str) -> bool;

    /// Attributes recorded once as `inferred_tags` when a file is created.
    fn infer(&self, path: &str) -> Map<String, Value>;
}

/// Inspects the local filesystem.
///
/// Inferred keys: `size_bytes`, `is_dir`, `readonly`, `extension`,
/// `modified`, plus `os_owner_uid`, `os_group_gid` and `mode` on Unix.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalInspector;

impl PathInspector for LocalInspector {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn infer(&self, path: &str) -> Map<String, Value> {
        let mut out = Map::new();
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path, error = %e, "no metadata to infer");
                return out;
            }
        };

        out.insert("size_bytes".into(), Value::from(meta.len()));
        out.insert("is_dir".into(), Value::Bool(meta.is_dir()));
        out.insert(
            "readonly".into(),
            Value::Bool(meta.permissions().readonly()),
        );
        out.insert(
            "extension".into(),
            Path::new(path)
                .extension()
                .map(|e| Value::String(e.to_string_lossy().to_lowercase()))
                .unwrap_or(Value::Null),
        );
        out.insert(
            "modified".into(),
            meta.modified()
                .ok()
                .map(|t| Value::String(DateTime::<Utc>::from(t).to_rfc3339()))
                .unwrap_or(Value::Null),
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            out.insert("os_owner_uid".into(), Value::from(meta.uid()));
            out.insert("os_group_gid".into(), Value::from(meta.gid()));
            out.insert(
                "mode".into(),
                Value::String(format!("{:o}", meta.mode() & 0o7777)),
            );
        }

        out
    }
}

/// Last component of `filepath`, or the whole path when it has none.
pub fn filename_of(filepath: &str) -> String {
    Path::new(filepath)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filepath.to_string())
}
