//! Canonical-path resolution for prefix containment.
//!
//! Canonicalize directly when the target exists (resolving symlinks and
//! `..`), otherwise walk up to the nearest existing ancestor, canonicalize
//! that, and re-append the not-yet-existing tail so a write/move
//! destination still canonicalizes meaningfully for containment purposes.

use std::path::{Path, PathBuf};

/// Canonicalize `path` (joining against `base` first if relative) for the
/// purpose of prefix-containment comparison. Never fails: falls back to
/// the joined, non-canonicalized path if canonicalization is altogether
/// impossible (e.g. every ancestor is unreadable).
pub fn canonicalize_for_containment(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    if let Ok(canon) = joined.canonicalize() {
        return canon;
    }

    // Walk up to the nearest existing ancestor, canonicalize that, and
    // re-append the tail components that don't exist yet.
    let mut existing = joined.as_path();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.parent() {
            Some(parent) => {
                tail.push(existing.file_name().unwrap_or_default().to_os_string());
                if parent.exists() {
                    existing = parent;
                    break;
                }
                existing = parent;
            }
            None => break,
        }
    }

    let mut result = existing.canonicalize().unwrap_or_else(|_| existing.to_path_buf());
    for component in tail.into_iter().rev() {
        result.push(component);
    }
    result
}
