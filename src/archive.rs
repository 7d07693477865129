//! Package tarballs: writing one from an export directory and unpacking one
//! for import.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::manifest::MANIFEST_FILE;

/// Written tarball.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    /// `sha256:<hex>` of the tarball bytes.
    pub digest: String,
    pub size: u64,
}

/// io::Write that hashes everything on its way to the file.
struct HashAndWrite<W: Write> {
    inner: W,
    digest: Sha256,
    size: u64,
}

impl<W: Write> HashAndWrite<W> {
    fn new(inner: W) -> HashAndWrite<W> {
        HashAndWrite {
            inner,
            digest: Sha256::new(),
            size: 0,
        }
    }

    fn finish(mut self) -> std::io::Result<(String, u64)> {
        self.inner.flush()?;
        Ok((format!("sha256:{:x}", self.digest.finalize()), self.size))
    }
}

impl<W: Write> Write for HashAndWrite<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.digest.update(&buf[..written]);
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Tars `src_dir` into `tar_path` with the directory's own name as the only
/// top-level entry.
///
/// The tarball is written under a temporary name and renamed into place, so
/// `tar_path` only ever holds a complete archive.
pub fn pack(src_dir: &Path, tar_path: &Path) -> Result<ArchiveInfo> {
    let root = src_dir
        .file_name()
        .ok_or_else(|| Error::not_found("export directory", src_dir.display().to_string()))?;
    let mut partial = tar_path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let written = write_tar(src_dir, Path::new(root), &partial);
    let (digest, size) = match written {
        Ok(done) => done,
        Err(e) => {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }
    };
    std::fs::rename(&partial, tar_path)?;
    info!("wrote {} ({} bytes, {})", tar_path.display(), size, digest);
    Ok(ArchiveInfo {
        path: tar_path.to_path_buf(),
        digest,
        size,
    })
}

fn write_tar(src_dir: &Path, root: &Path, dest: &Path) -> Result<(String, u64)> {
    let writer = HashAndWrite::new(BufWriter::new(File::create(dest)?));
    let mut builder = tar::Builder::new(writer);
    builder.append_dir_all(root, src_dir)?;
    let writer = builder.into_inner()?;
    Ok(writer.finish()?)
}

/// An unpacked package. The scratch directory goes away on drop.
#[derive(Debug)]
pub struct Extracted {
    _scratch: TempDir,
    root: PathBuf,
}

impl Extracted {
    /// Directory holding `manifest.json` and the blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }
}

/// Unpacks `tar_path` into a fresh scratch directory next to it and finds
/// the package root by looking for `manifest.json`, at the top first and
/// then one directory down.
pub fn unpack(tar_path: &Path) -> Result<Extracted> {
    if !tar_path.is_file() {
        return Err(Error::not_found(
            "SDS package file",
            tar_path.display().to_string(),
        ));
    }
    let parent = match tar_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let scratch = tempfile::Builder::new()
        .prefix(".sdspkg-import-")
        .tempdir_in(parent)?;
    debug!(
        "extracting {} into {}",
        tar_path.display(),
        scratch.path().display()
    );
    tar::Archive::new(File::open(tar_path)?).unpack(scratch.path())?;

    let root = find_package_root(scratch.path())?.ok_or_else(|| {
        Error::not_found("manifest", format!("{} in {}", MANIFEST_FILE, tar_path.display()))
    })?;
    debug!("package root: {}", root.display());
    Ok(Extracted {
        _scratch: scratch,
        root,
    })
}

fn find_package_root(dir: &Path) -> Result<Option<PathBuf>> {
    if dir.join(MANIFEST_FILE).is_file() {
        return Ok(Some(dir.to_path_buf()));
    }
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();
    if candidates.len() > 1 {
        warn!(
            "{} package roots found, using {}",
            candidates.len(),
            candidates[0].display()
        );
    }
    Ok(candidates.into_iter().next())
}
