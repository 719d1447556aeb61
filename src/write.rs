//! Build output: page writes and the static tree copy.
//!
//! ## Output Structure
//!
//! ```text
//! build/
//! ├── index.html
//! ├── e/
//! │   ├── my-talk.html
//! │   └── workshop.html
//! └── css/                     # mirrored from static/
//!     └── style.css
//! ```
//!
//! Pages are written to a hidden temporary sibling and renamed into place, so
//! an interrupted build never leaves a truncated page behind. Output paths are
//! a pure function of the slug; distinct slugs never share a file.
//!
//! The static copy mirrors directories and regular files, re-creates symlinks
//! as symlinks, and carries over permission bits and (best effort) ownership.
//! Metadata that cannot be reproduced is reported as a [`CopyWarning`] rather
//! than failing the build. When the output root is not cleaned, an entry whose
//! type changed since the last build (file, directory, symlink) replaces the
//! stale one.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("static directory not found: {}", .0.display())]
    MissingStatic(PathBuf),
    #[error("failed to walk {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> WriteError + '_ {
    move |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Something the static copy could not reproduce exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for CopyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Totals from one static tree copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub files: usize,
    pub symlinks: usize,
    pub dirs: usize,
    pub warnings: Vec<CopyWarning>,
}

impl CopyReport {
    fn warn(&mut self, path: &Path, message: impl Into<String>) {
        let warning = CopyWarning {
            path: path.to_path_buf(),
            message: message.into(),
        };
        log::warn!("{warning}");
        self.warnings.push(warning);
    }
}

/// Writes pages under one output root.
#[derive(Debug, Clone)]
pub struct BuildWriter {
    root: PathBuf,
    entries_dir: String,
}

impl BuildWriter {
    pub fn new(root: impl Into<PathBuf>, entries_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            entries_dir: entries_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.html")
    }

    pub fn entry_path(&self, slug: &str) -> PathBuf {
        self.root
            .join(&self.entries_dir)
            .join(format!("{slug}.html"))
    }

    /// Remove the output root and everything in it. Absent roots are fine.
    pub fn clean(&self) -> Result<(), WriteError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                log::debug!("removed {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.root)(e)),
        }
    }

    /// Write `<root>/index.html`.
    pub fn write_index(&self, bytes: &[u8]) -> Result<PathBuf, WriteError> {
        let path = self.index_path();
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Write `<root>/<entries_dir>/<slug>.html`.
    pub fn write_entry(&self, slug: &str, bytes: &[u8]) -> Result<PathBuf, WriteError> {
        let path = self.entry_path(slug);
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Mirror `src` into `dst`.
    pub fn copy_static_tree(&self, src: &Path, dst: &Path) -> Result<CopyReport, WriteError> {
        copy_tree(src, dst)
    }
}

/// Write through a temporary sibling, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_error(parent))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));

    fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_error(path)(e));
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> Result<CopyReport, WriteError> {
    if !src.is_dir() {
        return Err(WriteError::MissingStatic(src.to_path_buf()));
    }
    fs::create_dir_all(dst).map_err(io_error(dst))?;

    let mut report = CopyReport::default();
    let mut dir_modes = Vec::new();
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|source| WriteError::Walk {
            root: src.to_path_buf(),
            source,
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| entry.path());
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            if copy_symlink(entry.path(), &target, &mut report)? {
                report.symlinks += 1;
            }
            continue;
        }

        let metadata = entry.metadata().map_err(|source| WriteError::Walk {
            root: src.to_path_buf(),
            source,
        })?;
        if file_type.is_dir() {
            clear_target(&target, true)?;
            fs::create_dir_all(&target).map_err(io_error(&target))?;
            dir_modes.push((target.clone(), metadata.clone()));
            report.dirs += 1;
        } else if file_type.is_file() {
            clear_target(&target, false)?;
            fs::copy(entry.path(), &target).map_err(io_error(&target))?;
            copy_permissions(&metadata, &target, &mut report);
            report.files += 1;
        } else {
            report.warn(entry.path(), "not a file, directory or symlink; skipped");
            continue;
        }
        copy_ownership(&metadata, &target, &mut report);
    }

    // Deepest first: a read-only directory mode must not block its children.
    for (target, metadata) in dir_modes.iter().rev() {
        copy_permissions(metadata, target, &mut report);
    }
    log::debug!(
        "copied {} files, {} symlinks, {} dirs from {}",
        report.files,
        report.symlinks,
        report.dirs,
        src.display()
    );
    Ok(report)
}

/// Clear whatever a previous build left at `target` that would block the new
/// entry. Symlinks are removed rather than followed; a real directory is kept
/// only when a directory is about to be created there.
fn clear_target(target: &Path, keep_dir: bool) -> Result<(), WriteError> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => {
            if keep_dir {
                Ok(())
            } else {
                fs::remove_dir_all(target).map_err(io_error(target))
            }
        }
        Ok(_) => fs::remove_file(target).map_err(io_error(target)),
        Err(_) => Ok(()),
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, target: &Path, report: &mut CopyReport) -> Result<bool, WriteError> {
    use std::os::unix::fs::MetadataExt;

    let link = fs::read_link(src).map_err(io_error(src))?;
    clear_target(target, false)?;
    std::os::unix::fs::symlink(&link, target).map_err(io_error(target))?;

    if let Ok(meta) = fs::symlink_metadata(src) {
        lchown_if_needed(target, meta.uid(), meta.gid(), report);
    }
    Ok(true)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _target: &Path, report: &mut CopyReport) -> Result<bool, WriteError> {
    report.warn(src, "symlinks are not supported on this platform; skipped");
    Ok(false)
}

fn copy_permissions(metadata: &fs::Metadata, target: &Path, report: &mut CopyReport) {
    if let Err(e) = fs::set_permissions(target, metadata.permissions()) {
        report.warn(target, format!("could not copy permissions: {e}"));
    }
}

#[cfg(unix)]
fn copy_ownership(metadata: &fs::Metadata, target: &Path, report: &mut CopyReport) {
    use std::os::unix::fs::MetadataExt;
    lchown_if_needed(target, metadata.uid(), metadata.gid(), report);
}

#[cfg(not(unix))]
fn copy_ownership(_metadata: &fs::Metadata, _target: &Path, _report: &mut CopyReport) {}

#[cfg(unix)]
fn lchown_if_needed(target: &Path, uid: u32, gid: u32, report: &mut CopyReport) {
    use std::os::unix::fs::MetadataExt;

    let unchanged = fs::symlink_metadata(target)
        .map(|m| m.uid() == uid && m.gid() == gid)
        .unwrap_or(false);
    if unchanged {
        return;
    }
    if let Err(e) = std::os::unix::fs::lchown(target, Some(uid), Some(gid)) {
        report.warn(target, format!("could not copy ownership {uid}:{gid}: {e}"));
    }
}
