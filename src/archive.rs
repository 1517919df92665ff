//! Packing the staged app into a single-file archive.

use crate::BoxFuture;
use crate::error::{Error, ErrorExt, Result};
use crate::options::ArchiveOptions;
use crate::utils::fs::{copy_file, remove_if_present};
use std::io;
use std::path::{Path, PathBuf};
use tar::HeaderMode;
use walkdir::WalkDir;

/// File name of the archived payload inside the resources directory.
pub const ARCHIVE_NAME: &str = "app.archive";

/// Packs a directory into one file.
pub trait Archiver: Send + Sync {
    /// Packs `src` into `dest`.
    ///
    /// Files selected by `options` are written beside the archive under
    /// `<dest>.unpacked/` instead of into it. `src` is left untouched.
    fn pack<'a>(
        &'a self,
        src: &'a Path,
        dest: &'a Path,
        options: &'a ArchiveOptions,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Default archiver: an uncompressed tar container with deterministic headers.
#[derive(Clone, Debug, Default)]
pub struct TarArchiver;

impl TarArchiver {
    /// Creates the archiver.
    pub fn new() -> Self {
        Self
    }
}

/// Compiled unpack rules.
struct UnpackRules {
    files: Option<glob::Pattern>,
    files_by_name: bool,
    dirs: Option<glob::Pattern>,
}

impl UnpackRules {
    fn new(options: &ArchiveOptions) -> Result<Self> {
        Ok(Self {
            files: options.unpack.as_deref().map(glob::Pattern::new).transpose()?,
            files_by_name: options.unpack.as_deref().is_some_and(|p| !p.contains('/')),
            dirs: options.unpack_dir.as_deref().map(glob::Pattern::new).transpose()?,
        })
    }

    /// `rel` is `/`-separated and relative to the packed directory.
    fn unpack_file(&self, rel: &str) -> bool {
        let by_file = self.files.as_ref().is_some_and(|pattern| {
            let subject = if self.files_by_name {
                rel.rsplit('/').next().unwrap_or(rel)
            } else {
                rel
            };
            pattern.matches(subject)
        });
        by_file || self.unpack_dir(rel)
    }

    /// Whether any parent directory of `rel` matches the directory rule.
    fn unpack_dir(&self, rel: &str) -> bool {
        let Some(pattern) = &self.dirs else {
            return false;
        };
        let mut prefix = rel;
        while let Some((parent, _)) = prefix.rsplit_once('/') {
            if pattern.matches(parent) {
                return true;
            }
            prefix = parent;
        }
        false
    }
}

fn pack_blocking(src: &Path, dest: &Path, options: &ArchiveOptions) -> Result<()> {
    let rules = UnpackRules::new(options)?;
    let unpacked_root = unpacked_dir(dest);

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    }
    let file = std::fs::File::create(dest).fs_context("creating archive", dest)?;
    let mut tar = tar::Builder::new(file);

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let rel_path = path.strip_prefix(src)?;
        let rel = rel_path.to_string_lossy().replace('\\', "/");
        let metadata = std::fs::symlink_metadata(path).fs_context("reading metadata", path)?;

        if metadata.file_type().is_symlink() {
            let link = std::fs::read_link(path).fs_context("reading symlink", path)?;
            let mut header = tar::Header::new_gnu();
            header.set_metadata_in_mode(&metadata, HeaderMode::Deterministic);
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            tar.append_link(&mut header, rel_path, &link)?;
        } else if metadata.is_dir() {
            let mut header = tar::Header::new_gnu();
            header.set_metadata_in_mode(&metadata, HeaderMode::Deterministic);
            tar.append_data(&mut header, rel_path, &mut io::empty())?;
        } else if rules.unpack_file(&rel) {
            log::debug!("Leaving {} unpacked", rel);
            let target = unpacked_root.join(rel_path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
            }
            std::fs::copy(path, &target).fs_context("copying unpacked file", path)?;
        } else {
            let mut header = tar::Header::new_gnu();
            header.set_metadata_in_mode(&metadata, HeaderMode::Deterministic);
            let mut file = std::fs::File::open(path).fs_context("opening file", path)?;
            tar.append_data(&mut header, rel_path, &mut file)?;
        }
    }

    tar.into_inner()?;
    Ok(())
}

impl Archiver for TarArchiver {
    fn pack<'a>(
        &'a self,
        src: &'a Path,
        dest: &'a Path,
        options: &'a ArchiveOptions,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (src, dest, options) = (src.to_path_buf(), dest.to_path_buf(), options.clone());
            tokio::task::spawn_blocking(move || pack_blocking(&src, &dest, &options)).await?
        })
    }
}

/// Directory holding files left out of the archive at `archive`.
pub fn unpacked_dir(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".unpacked");
    PathBuf::from(name)
}

/// Packs the staged app directory and removes it.
///
/// Any failure of the archiver is reported as [`Error::Archive`].
pub async fn archive_app(
    archiver: &dyn Archiver,
    app_dir: &Path,
    dest: &Path,
    options: &ArchiveOptions,
) -> Result<()> {
    log::info!("Packing {} into {}", app_dir.display(), dest.display());
    archiver
        .pack(app_dir, dest, options)
        .await
        .map_err(|e| match e {
            Error::Archive(_) => e,
            other => Error::Archive(other.to_string()),
        })?;
    remove_if_present(app_dir).await
}

/// Copies a user-supplied archive verbatim to `dest`.
pub async fn copy_prebuilt(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_file() {
        crate::bail!("prebuilt archive {} must be an archive file", src.display());
    }
    log::info!("Using prebuilt archive {}", src.display());
    copy_file(src, dest).await
}

/// Hex SHA-256 of a file.
pub async fn sha256_hex(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn app() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib/native")).unwrap();
        fs::write(dir.path().join("main.js"), "require('./lib')").unwrap();
        fs::write(dir.path().join("lib/index.js"), "").unwrap();
        fs::write(dir.path().join("lib/addon.node"), "bin").unwrap();
        fs::write(dir.path().join("lib/native/helper.dll"), "bin").unwrap();
        dir
    }

    fn entries(archive: &Path) -> Vec<String> {
        let mut tar = tar::Archive::new(fs::File::open(archive).unwrap());
        tar.entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[tokio::test]
    async fn test_pack_leaves_matching_files_unpacked() {
        let src = app();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join(ARCHIVE_NAME);
        let options = ArchiveOptions {
            unpack: Some("*.node".into()),
            unpack_dir: Some("lib/native".into()),
        };

        TarArchiver::new().pack(src.path(), &dest, &options).await.unwrap();

        let packed = entries(&dest);
        assert!(packed.contains(&"main.js".to_string()));
        assert!(packed.contains(&"lib/index.js".to_string()));
        assert!(!packed.iter().any(|p| p.ends_with("addon.node")));
        assert!(!packed.iter().any(|p| p.ends_with("helper.dll")));
        let unpacked = unpacked_dir(&dest);
        assert!(unpacked.join("lib/addon.node").is_file());
        assert!(unpacked.join("lib/native/helper.dll").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pack_keeps_symlinks_as_links() {
        let src = app();
        fs::create_dir_all(src.path().join("node_modules")).unwrap();
        std::os::unix::fs::symlink("../lib", src.path().join("node_modules/linked")).unwrap();
        std::os::unix::fs::symlink("missing.js", src.path().join("dangling.js")).unwrap();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join(ARCHIVE_NAME);

        TarArchiver::new()
            .pack(src.path(), &dest, &ArchiveOptions::default())
            .await
            .unwrap();

        let mut tar = tar::Archive::new(fs::File::open(&dest).unwrap());
        let links: Vec<(String, String)> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.header().entry_type() == tar::EntryType::Symlink)
            .map(|e| {
                (
                    e.path().unwrap().to_string_lossy().into_owned(),
                    e.link_name().unwrap().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect();
        assert_eq!(
            links,
            vec![
                ("dangling.js".to_string(), "missing.js".to_string()),
                ("node_modules/linked".to_string(), "../lib".to_string()),
            ]
        );
        assert!(!entries(&dest).iter().any(|p| p.starts_with("node_modules/linked/")));
    }

    #[tokio::test]
    async fn test_archive_app_removes_directory() {
        let src = app();
        let app_dir = src.path().to_path_buf();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join(ARCHIVE_NAME);

        archive_app(&TarArchiver::new(), &app_dir, &dest, &ArchiveOptions::default())
            .await
            .unwrap();

        assert!(dest.is_file());
        assert!(!app_dir.exists());
    }

    #[tokio::test]
    async fn test_archiver_failure_is_archive_error() {
        let out = tempfile::tempdir().unwrap();
        let err = archive_app(
            &TarArchiver::new(),
            &out.path().join("missing"),
            &out.path().join(ARCHIVE_NAME),
            &ArchiveOptions::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.category(), "archive");
    }

    #[tokio::test]
    async fn test_copy_prebuilt_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_prebuilt(dir.path(), &dir.path().join("out")).await.unwrap_err();
        assert!(err.to_string().contains("must be an archive file"));
    }

    #[tokio::test]
    async fn test_sha256_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, "").unwrap();
        assert_eq!(
            sha256_hex(&path).await.unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
