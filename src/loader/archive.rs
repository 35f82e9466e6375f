//! tar+gzip handling for OCI layers.
//!
//! Release vector artifacts carry a single document inside the archive;
//! ansible-role bundles carry one or more role directories that are
//! extracted as a whole.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::core::VectorError;
use crate::utils::ensure_dir;

/// Renames the first path component of extracted entries.
///
/// Used to install an aliased role under its alias instead of the name it
/// was packaged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameFilter {
    /// Top-level directory name inside the archive
    pub from: String,
    /// Name it is extracted as
    pub to: String,
}

impl RenameFilter {
    /// Create a filter renaming `from` to `to`.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    fn apply(&self, path: &Path) -> PathBuf {
        let mut components = path.components();
        match components.next() {
            Some(Component::Normal(first)) if first == self.from.as_str() => {
                Path::new(&self.to).join(components.as_path())
            }
            _ => path.to_path_buf(),
        }
    }
}

/// Return the UTF-8 content of a single archive member.
///
/// A leading `./` on entry names is ignored.
pub fn extract_member(bytes: &[u8], member: &str, reference: &str) -> Result<String> {
    let wanted = Path::new(member.trim_start_matches("./"));
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive.entries().map_err(|e| archive_error(reference, &e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| archive_error(reference, &e))?;
        let path = entry.path().map_err(|e| archive_error(reference, &e))?.into_owned();
        if strip_cur_dir(&path) != wanted {
            continue;
        }

        let mut content = String::new();
        entry.read_to_string(&mut content).map_err(|e| archive_error(reference, &e))?;
        return Ok(content);
    }

    Err(VectorError::ArchiveMemberNotFound {
        member: member.to_string(),
        reference: reference.to_string(),
    }
    .into())
}

/// Unpack every entry under `dest`, applying the optional rename filter to
/// the top-level component.
///
/// Entries with absolute paths or `..` components are rejected before
/// anything is written for them, as are hard links, symlinks pointing out of
/// the archive and entries whose path runs through an extracted symlink. Returns the distinct top-level directories
/// that were written, in archive order.
pub fn extract_all(
    bytes: &[u8],
    dest: &Path,
    rename: Option<&RenameFilter>,
    reference: &str,
) -> Result<Vec<PathBuf>> {
    ensure_dir(dest)?;

    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive.entries().map_err(|e| archive_error(reference, &e))?;
    let mut top_level = Vec::new();

    for entry in entries {
        let mut entry = entry.map_err(|e| archive_error(reference, &e))?;
        let raw = entry.path().map_err(|e| archive_error(reference, &e))?.into_owned();
        let relative = sanitize(&raw).ok_or_else(|| VectorError::ArchiveError {
            reference: reference.to_string(),
            reason: format!("refusing to extract unsafe path {}", raw.display()),
        })?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let relative = rename.map_or_else(|| relative.clone(), |filter| filter.apply(&relative));

        if let Some(Component::Normal(first)) = relative.components().next() {
            let first = dest.join(first);
            if !top_level.contains(&first) {
                top_level.push(first);
            }
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_hard_link() {
            return Err(unsafe_entry(reference, &raw, "hard links are not supported").into());
        }
        if entry_type.is_symlink() {
            let link = entry.link_name().map_err(|e| archive_error(reference, &e))?;
            if link.as_deref().and_then(sanitize).is_none() {
                return Err(unsafe_entry(reference, &raw, "symlink target leaves the archive").into());
            }
        }
        reject_symlinked_path(dest, &relative, &raw, reference)?;

        let target = dest.join(&relative);
        if entry_type.is_dir() {
            ensure_dir(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        entry
            .unpack(&target)
            .with_context(|| format!("Failed to extract {} from {}", raw.display(), reference))?;
    }

    Ok(top_level)
}

fn strip_cur_dir(path: &Path) -> PathBuf {
    path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}

// None if the path would escape the destination
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(clean)
}

// Writing through an already extracted symlink would land outside `dest`
fn reject_symlinked_path(dest: &Path, relative: &Path, raw: &Path, reference: &str) -> Result<()> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        let is_symlink = std::fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink());
        if is_symlink {
            return Err(unsafe_entry(reference, raw, "path goes through a symlink").into());
        }
    }
    Ok(())
}

fn unsafe_entry(reference: &str, raw: &Path, reason: &str) -> VectorError {
    VectorError::ArchiveError {
        reference: reference.to_string(),
        reason: format!("refusing to extract {}: {reason}", raw.display()),
    }
}

fn archive_error(reference: &str, error: &std::io::Error) -> VectorError {
    VectorError::ArchiveError {
        reference: reference.to_string(),
        reason: error.to_string(),
    }
}
