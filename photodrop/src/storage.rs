//! On-disk storage for uploaded photos.
//!
//! Uploads are streamed into a hidden staging file inside the upload directory and only get
//! their final `<userId>-<millis><ext>` name once the whole request has been read, so the form
//! fields may arrive in any order. Final names are created by hard-linking the staging file,
//! which fails on an existing name: a stored photo is never overwritten.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{Error, Result};

/// How many successive millisecond values are tried when a name is already taken.
const MAX_NAME_ATTEMPTS: i64 = 1000;

/// Common filesystem limit on a single path component.
pub const MAX_FILENAME_BYTES: usize = 255;

/// Staging files are dotfiles, which the static file server never exposes.
pub const STAGING_PREFIX: &str = ".incoming-";

/// The upload directory and the URL prefix it is served under.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
    url_prefix: String,
}

impl PhotoStore {
    /// `subdir` is both the location below `public_dir` and the URL path the static server
    /// exposes it at.
    pub fn new(public_dir: &Path, subdir: &Path) -> Self {
        let segments: Vec<_> = subdir
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        Self {
            dir: public_dir.join(subdir),
            url_prefix: format!("/{}", segments.join("/")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the upload directory (and parents). An existing directory is fine.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    /// Root-relative URL of a stored photo.
    pub fn public_path(&self, filename: &str) -> String {
        format!("{}/{}", self.url_prefix, filename)
    }

    /// Open a fresh staging file for an incoming upload.
    pub async fn stage(&self) -> Result<StagedPhoto> {
        let path = self.dir.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(Error::io("create staging file"))?;

        debug!(path = %path.display(), "Staging upload");

        Ok(StagedPhoto {
            path: Some(path),
            file,
            size: 0,
        })
    }

    /// Link a fully received upload under its final name and return that name.
    ///
    /// When `<user_id>-<millis><ext>` already exists the millisecond component is bumped until a
    /// free name is found. The photo appears with its complete contents or not at all.
    pub async fn commit(&self, mut staged: StagedPhoto, user_id: &str, millis: i64, ext: &str) -> Result<String> {
        staged.file.flush().await.map_err(Error::io("flush upload"))?;

        let staging_path = staged
            .path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("staged upload already committed"))?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let filename = photo_filename(user_id, millis + attempt, ext);
            let target = self.dir.join(&filename);

            // hard_link refuses an existing target
            match fs::hard_link(&staging_path, &target).await {
                Ok(()) => {
                    staged.discard().await;
                    return Ok(filename);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(filename = %filename, "Photo name taken, trying next millisecond");
                }
                Err(e) => {
                    staged.discard().await;
                    return Err(Error::io("link photo into place")(e));
                }
            }
        }

        staged.discard().await;
        Err(anyhow::anyhow!("no free photo name for user {user_id:?} after {MAX_NAME_ATTEMPTS} attempts").into())
    }
}

/// An upload being written to its staging file.
///
/// Dropping it without [`PhotoStore::commit`] removes the staging file, so rejected or
/// abandoned uploads leave nothing behind.
#[derive(Debug)]
pub struct StagedPhoto {
    path: Option<PathBuf>,
    file: File,
    size: u64,
}

impl StagedPhoto {
    /// Append a chunk, refusing to grow past `limit` bytes.
    pub async fn write_chunk(&mut self, chunk: &[u8], limit: u64) -> Result<()> {
        let size = self.size + chunk.len() as u64;
        if size > limit {
            return Err(Error::PayloadTooLarge { limit });
        }

        self.file.write_all(chunk).await.map_err(Error::io("write upload"))?;
        self.size = size;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Remove the staging file now rather than when the value is dropped.
    pub async fn discard(mut self) {
        if let Some(path) = self.path.take() {
            let result = fs::remove_file(&path).await;
            log_discard(&path, result);
        }
    }
}

impl Drop for StagedPhoto {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = fs::remove_file(&path).await;
                    log_discard(&path, result);
                });
            }
            Err(_) => {
                let result = std::fs::remove_file(&path);
                log_discard(&path, result);
            }
        }
    }
}

fn log_discard(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!(path = %path.display(), "Discarded staged upload"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to discard staged upload"),
    }
}

/// `<user_id>-<millis><ext>`
pub fn photo_filename(user_id: &str, millis: i64, ext: &str) -> String {
    format!("{user_id}-{millis}{ext}")
}

/// Extension of a client-supplied filename, including the leading dot.
///
/// Only the last path segment is considered and leading dots do not start an extension, so
/// `.bashrc` has none while `photo.tar.gz` yields `.gz`.
pub fn extension_of(original_name: &str) -> &str {
    let base = original_name.rsplit(['/', '\\']).next().unwrap_or(original_name);
    let stem_start = base.len() - base.trim_start_matches('.').len();

    match base[stem_start..].rfind('.') {
        Some(idx) => &base[stem_start + idx..],
        None => "",
    }
}

/// A user id can be embedded in a filename without escaping the upload directory.
pub fn is_safe_user_id(user_id: &str) -> bool {
    !user_id.contains(['/', '\\', '\0'])
}
