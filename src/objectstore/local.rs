use std::path::{Path, PathBuf};

use url::Url;

use super::{basename, ObjectStore};
use crate::error::{Error, Result};

/// `file://` urls on the local (or NFS-mounted) filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalObjectStore;

fn local_path(url: &str) -> Result<PathBuf> {
    let parsed = Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))?;
    if parsed.scheme() != "file" {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    parsed
        .to_file_path()
        .map_err(|_| Error::InvalidUrl(url.to_string()))
}

impl ObjectStore for LocalObjectStore {
    fn get(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let src = local_path(url)?;
        if !src.is_file() {
            return Err(Error::not_found("blob", url));
        }
        let dest = dest_dir.join(basename(url)?);
        info!("downloading {} to {}", url, dest.display());
        std::fs::copy(&src, &dest)?;
        Ok(dest)
    }

    fn put(&self, path: &Path, url: &str) -> Result<()> {
        let dest = local_path(url)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("uploading {} to {}", path.display(), url);
        std::fs::copy(path, &dest)?;
        Ok(())
    }

    fn remove_all(&self, url: &str) -> Result<()> {
        let path = local_path(url)?;
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else if path.exists() {
            std::fs::remove_file(&path)?;
        } else {
            debug!("{} already absent", url);
            return Ok(());
        }
        info!("removed {}", url);
        Ok(())
    }
}
