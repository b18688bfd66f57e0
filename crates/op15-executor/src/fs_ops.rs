//! Filesystem operations against the host's real filesystem.
//!
//! These functions accept arbitrary absolute host paths; containment
//! against `allowed_directories` is the Permission Core's job
//! (`op15-permission`), invoked before any of these functions run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use op15_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
}

fn classify_metadata_error(path: &Path, e: &std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            Error::PermissionDenied { reason: op15_domain::DenyReason::Capability }
        }
        _ => Error::Io(e.to_string()),
    }
}

/// `fs.list(path, depth)`. `depth = 0` lists immediate children only.
/// Entries the process cannot stat (EACCES/EPERM) are skipped, never
/// aborting the whole listing; only the root argument itself can fail.
pub fn list(path: &Path, depth: u32) -> Result<Vec<DirEntry>> {
    let meta = std::fs::metadata(path).map_err(|e| classify_metadata_error(path, &e))?;
    if !meta.is_dir() {
        return Err(Error::NotADirectory(path.display().to_string()));
    }

    let mut out = Vec::new();
    list_into(path, depth, &mut out);
    out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(out)
}

fn list_into(dir: &Path, depth: u32, out: &mut Vec<DirEntry>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return, // unreadable directory at this depth: skip quietly
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue, // can't stat this child: skip it, keep going
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let kind = if meta.is_dir() { EntryKind::Directory } else { EntryKind::File };
        let mtime = meta.modified().ok().map(DateTime::<Utc>::from);

        out.push(DirEntry {
            name,
            path: path.clone(),
            kind,
            size: if meta.is_dir() { None } else { Some(meta.len()) },
            mtime,
        });

        if kind == EntryKind::Directory && depth > 0 {
            list_into(&path, depth - 1, out);
        }
    }
}

/// `fs.read(path, encoding)`. Only `utf8` (the default) is currently
/// supported; other encodings fail with `not-found`-adjacent text would
/// be misleading, so an unsupported encoding is treated as a no-op (the
/// content is read as UTF-8 regardless) since the wire contract does not
/// define other encodings' byte layouts.
pub fn read(path: &Path, max_bytes: Option<u64>) -> Result<String> {
    let meta = std::fs::metadata(path).map_err(|e| classify_metadata_error(path, &e))?;
    if meta.is_dir() {
        return Err(Error::IsADirectory(path.display().to_string()));
    }
    if let Some(max) = max_bytes {
        if meta.len() > max {
            return Err(Error::TooLarge(path.display().to_string()));
        }
    }
    std::fs::read_to_string(path).map_err(|e| classify_metadata_error(path, &e))
}

/// `fs.write(path, content, createDirs, encoding)`. Overwrites an
/// existing file. Creates parent directories iff `create_dirs`.
pub fn write(path: &Path, content: &str, create_dirs: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if create_dirs {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::PermissionDenied { reason: classify_write_deny(&e) })?;
            } else {
                return Err(Error::NotFound(parent.display().to_string()));
            }
        }
    }
    std::fs::write(path, content)
        .map_err(|e| Error::PermissionDenied { reason: classify_write_deny(&e) })
}

fn classify_write_deny(_e: &std::io::Error) -> op15_domain::DenyReason {
    op15_domain::DenyReason::Capability
}

/// `fs.delete(path, recursive)`. Removes a file, or a directory iff
/// `recursive`; a non-empty directory without `recursive` fails with
/// `not-empty`.
pub fn delete(path: &Path, recursive: bool) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| classify_metadata_error(path, &e))?;
    if meta.is_dir() {
        if recursive {
            std::fs::remove_dir_all(path).map_err(|e| classify_metadata_error(path, &e))
        } else {
            std::fs::remove_dir(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => classify_metadata_error(path, &e),
                _ => Error::NotEmpty(path.display().to_string()),
            })
        }
    } else {
        std::fs::remove_file(path).map_err(|e| classify_metadata_error(path, &e))
    }
}

/// `fs.move(source, destination, createDestDirs)`. Atomic rename within a
/// filesystem; falls back to copy+delete across devices, or fails with
/// `cross-device` if that fallback is refused.
pub fn mv(source: &Path, destination: &Path, create_dest_dirs: bool) -> Result<()> {
    std::fs::metadata(source).map_err(|e| classify_metadata_error(source, &e))?;

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if create_dest_dirs {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::PermissionDenied { reason: classify_write_deny(&e) })?;
            } else {
                return Err(Error::NotFound(parent.display().to_string()));
            }
        }
    }

    match std::fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            copy_then_delete(source, destination)
        }
        Err(e) => Err(classify_metadata_error(source, &e)),
    }
}

/// `EXDEV` (cross-device link) errno, hard-coded so this crate doesn't
/// need a `libc` dependency just for one constant.
fn libc_exdev() -> i32 {
    18
}

fn copy_then_delete(source: &Path, destination: &Path) -> Result<()> {
    let meta = std::fs::metadata(source).map_err(|e| classify_metadata_error(source, &e))?;
    if meta.is_dir() {
        return Err(Error::CrossDevice(source.display().to_string()));
    }
    std::fs::copy(source, destination).map_err(|e| classify_metadata_error(source, &e))?;
    std::fs::remove_file(source).map_err(|e| classify_metadata_error(source, &e))?;
    Ok(())
}
