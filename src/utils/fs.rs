//! File system utilities for staging.
//!
//! Provides copy operations with automatic directory creation, optional
//! symlink preservation and path-carrying errors.

use crate::error::{ErrorExt, Result};
use std::{io, path::Path};
use tokio::fs;

/// Makes a symbolic link to a directory.
#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a directory.
#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(unix)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(windows)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

/// Copies a regular file, creating the destination's parent directories.
///
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        crate::bail!("{} is not a file", from.display());
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("copying file", from)?;
    Ok(())
}

/// Recursively copies a directory.
///
/// See [`copy_dir_filtered`].
pub async fn copy_dir(from: &Path, to: &Path, deref_symlinks: bool) -> Result<()> {
    copy_dir_filtered(from, to, &|_| true, deref_symlinks).await
}

/// Recursively copies the entries of `from` accepted by `include`.
///
/// `include` receives the absolute source path of every entry below `from`;
/// a rejected directory is skipped with its whole subtree. With
/// `deref_symlinks` the link targets are copied, otherwise the links are
/// recreated with their original target.
pub async fn copy_dir_filtered(
    from: &Path,
    to: &Path,
    include: &(dyn Fn(&Path) -> bool + Send + Sync),
    deref_symlinks: bool,
) -> Result<()> {
    if !from.is_dir() {
        crate::bail!("{} is not a directory", from.display());
    }
    fs::create_dir_all(to)
        .await
        .fs_context("creating directory", to)?;

    let entries = walkdir::WalkDir::new(from)
        .min_depth(1)
        .follow_links(deref_symlinks)
        .into_iter()
        .filter_entry(|entry| include(entry.path()));

    for entry in entries {
        let entry = entry?;
        debug_assert!(entry.path().starts_with(from));
        let rel_path = entry.path().strip_prefix(from)?;
        let dest_path = to.join(rel_path);

        if entry.path_is_symlink() && !deref_symlinks {
            let target = fs::read_link(entry.path())
                .await
                .fs_context("reading symlink", entry.path())?;
            let linked = if entry.path().is_dir() {
                symlink_dir(&target, &dest_path)
            } else {
                symlink_file(&target, &dest_path)
            };
            linked.fs_context("creating symlink", &dest_path)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)
                .await
                .fs_context("creating directory", &dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)
                .await
                .fs_context("copying file", entry.path())?;
        }
    }

    Ok(())
}

/// Copies a file or a directory tree to `to`.
pub async fn copy_path(from: &Path, to: &Path, deref_symlinks: bool) -> Result<()> {
    if from.is_dir() {
        copy_dir(from, to, deref_symlinks).await
    } else {
        copy_file(from, to).await
    }
}

/// Removes a file or directory tree; a missing path is not an error.
pub async fn remove_if_present(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).fs_context("reading metadata", path),
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    match removed {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e).fs_context("removing", path),
        _ => Ok(()),
    }
}
