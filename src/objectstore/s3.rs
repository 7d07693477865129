use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;
use url::Url;

use super::{basename, ObjectStore};
use crate::error::{Error, Result};

const SERVICE: &str = "s3";
const FALLBACK_REGION: &str = "us-east-1";

/// `s3://<endpoint>/<bucket>/<key>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub endpoint: String,
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn parse(url: &str) -> Result<S3Location> {
        let invalid = || Error::InvalidUrl(url.to_string());
        let parsed = Url::parse(url).map_err(|_| invalid())?;
        if parsed.scheme() != "s3" {
            return Err(invalid());
        }
        let endpoint = match (parsed.host_str(), parsed.port()) {
            (Some(host), _) if host.is_empty() => return Err(invalid()),
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(invalid()),
        };
        let mut segments = Vec::new();
        for segment in parsed.path_segments().into_iter().flatten() {
            let decoded = urlencoding::decode(segment).map_err(|_| invalid())?;
            segments.push(decoded.into_owned());
        }
        let mut segments = segments.into_iter();
        let bucket = segments.next().unwrap_or_default();
        if bucket.is_empty() {
            return Err(invalid());
        }
        let key = segments.collect::<Vec<_>>().join("/");
        Ok(S3Location {
            endpoint,
            bucket,
            key: key.trim_end_matches('/').to_string(),
        })
    }

    /// Keys `remove_all` deletes: the object itself and anything under it
    /// as a directory.
    fn covers(&self, key: &str) -> bool {
        if self.key.is_empty() {
            return true;
        }
        key == self.key
            || key
                .strip_prefix(self.key.as_str())
                .map_or(false, |rest| rest.starts_with('/'))
    }
}

fn upstream<E: std::error::Error>(e: E) -> Error {
    Error::upstream(SERVICE, DisplayErrorContext(e))
}

/// S3 (or S3-compatible) object store.
///
/// The SDK is async; calls are driven one at a time on a private
/// current-thread runtime. One client is kept per endpoint since export
/// and import may touch different clusters' buckets.
pub struct S3ObjectStore {
    runtime: Runtime,
    endpoint_url: Option<String>,
    clients: RefCell<HashMap<String, Client>>,
}

impl S3ObjectStore {
    /// `endpoint_url` overrides the `https://<endpoint>` derived from each
    /// blob url.
    pub fn new(endpoint_url: Option<String>) -> Result<S3ObjectStore> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(S3ObjectStore {
            runtime,
            endpoint_url,
            clients: RefCell::new(HashMap::new()),
        })
    }

    fn client(&self, endpoint: &str) -> Client {
        if let Some(client) = self.clients.borrow().get(endpoint) {
            return client.clone();
        }
        let endpoint_url = self
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", endpoint));
        debug!("creating s3 client for {}", endpoint_url);
        let region = RegionProviderChain::default_provider().or_else(Region::new(FALLBACK_REGION));
        let shared = self.runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load(),
        );
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();
        let client = Client::from_conf(config);
        self.clients
            .borrow_mut()
            .insert(endpoint.to_string(), client.clone());
        client
    }

    async fn list_keys(client: &Client, location: &S3Location) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let page = client
                .list_objects_v2()
                .bucket(&location.bucket)
                .prefix(&location.key)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(upstream)?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter(|key| location.covers(key))
                    .map(str::to_string),
            );
            match page.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }
}

impl ObjectStore for S3ObjectStore {
    fn get(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let location = S3Location::parse(url)?;
        let client = self.client(&location.endpoint);
        let dest = dest_dir.join(basename(url)?);
        info!("downloading {} to {}", url, dest.display());
        self.runtime.block_on(async {
            let object = client
                .get_object()
                .bucket(&location.bucket)
                .key(&location.key)
                .send()
                .await
                .map_err(upstream)?;
            let mut body = object.body.into_async_read();
            let mut file = tokio::fs::File::create(&dest).await?;
            tokio::io::copy(&mut body, &mut file).await?;
            file.flush().await?;
            Ok::<_, Error>(())
        })?;
        Ok(dest)
    }

    fn put(&self, path: &Path, url: &str) -> Result<()> {
        let location = S3Location::parse(url)?;
        let client = self.client(&location.endpoint);
        info!("uploading {} to {}", path.display(), url);
        self.runtime.block_on(async {
            let body = ByteStream::from_path(path)
                .await
                .map_err(|e| Error::upstream(SERVICE, e))?;
            client
                .put_object()
                .bucket(&location.bucket)
                .key(&location.key)
                .body(body)
                .send()
                .await
                .map_err(upstream)?;
            Ok::<_, Error>(())
        })
    }

    fn remove_all(&self, url: &str) -> Result<()> {
        let location = S3Location::parse(url)?;
        let client = self.client(&location.endpoint);
        self.runtime.block_on(async {
            let keys = Self::list_keys(&client, &location).await?;
            if keys.is_empty() {
                debug!("{} already absent", url);
            }
            for key in keys {
                client
                    .delete_object()
                    .bucket(&location.bucket)
                    .key(&key)
                    .send()
                    .await
                    .map_err(upstream)?;
                info!("removed s3://{}/{}/{}", location.endpoint, location.bucket, key);
            }
            Ok::<_, Error>(())
        })
    }
}
