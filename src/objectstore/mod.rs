//! Blob transfer between the local filesystem and object stores.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use url::Url;

use crate::error::{Error, Result};

mod local;
mod s3;

pub use local::LocalObjectStore;
pub use s3::{S3Location, S3ObjectStore};

pub trait ObjectStore {
    /// Downloads `url` into `dest_dir`, keeping its basename. Returns the
    /// local path.
    fn get(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;

    fn put(&self, path: &Path, url: &str) -> Result<()>;

    /// Removes the object at `url` and anything stored under it. Succeeds
    /// when nothing is there.
    fn remove_all(&self, url: &str) -> Result<()>;
}

/// Last path component of a blob url, percent-decoded. A bare relative
/// name (as written in a manifest) is taken as is.
pub fn basename(url: &str) -> Result<String> {
    let name = if url.contains("://") {
        Url::parse(url).ok().and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .and_then(|segment| urlencoding::decode(segment).ok())
                .map(|name| name.into_owned())
        })
    } else {
        url.trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(str::to_string)
    };
    match name {
        Some(name) if !name.is_empty() && name != "." && name != ".." && !name.contains('/') => {
            Ok(name)
        }
        _ => Err(Error::InvalidUrl(url.to_string())),
    }
}

pub fn join_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/'))
}

fn scheme(url: &str) -> Result<String> {
    Url::parse(url)
        .map(|parsed| parsed.scheme().to_string())
        .map_err(|_| Error::InvalidUrl(url.to_string()))
}

/// Dispatches on url scheme: `file://` to the local filesystem, `s3://` to
/// S3. The S3 client is only built once an `s3://` url shows up.
pub struct ObjectStoreRouter {
    local: LocalObjectStore,
    s3_endpoint_url: Option<String>,
    s3: RefCell<Option<Rc<S3ObjectStore>>>,
}

impl ObjectStoreRouter {
    pub fn new(s3_endpoint_url: Option<String>) -> ObjectStoreRouter {
        ObjectStoreRouter {
            local: LocalObjectStore,
            s3_endpoint_url,
            s3: RefCell::new(None),
        }
    }

    fn s3(&self) -> Result<Rc<S3ObjectStore>> {
        if let Some(store) = self.s3.borrow().as_ref() {
            return Ok(Rc::clone(store));
        }
        let store = Rc::new(S3ObjectStore::new(self.s3_endpoint_url.clone())?);
        *self.s3.borrow_mut() = Some(Rc::clone(&store));
        Ok(store)
    }

    fn with_store<T>(&self, url: &str, f: impl FnOnce(&dyn ObjectStore) -> Result<T>) -> Result<T> {
        match scheme(url)?.as_str() {
            "file" => f(&self.local),
            "s3" => {
                let store = self.s3()?;
                f(store.as_ref())
            }
            _ => Err(Error::InvalidUrl(url.to_string())),
        }
    }
}

impl ObjectStore for ObjectStoreRouter {
    fn get(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        self.with_store(url, |store| store.get(url, dest_dir))
    }

    fn put(&self, path: &Path, url: &str) -> Result<()> {
        self.with_store(url, |store| store.put(path, url))
    }

    fn remove_all(&self, url: &str) -> Result<()> {
        self.with_store(url, |store| store.remove_all(url))
    }
}
