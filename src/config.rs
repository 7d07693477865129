use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_ES_PORT: u16 = 9200;

/// User SDS settings, read from the YAML file written by `sds configure`.
///
/// Only the keys this tool needs are declared; the rest of the file is
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Host of the primary (mozart) catalog.
    #[serde(rename = "MOZART_ES_PVT_IP")]
    pub mozart_es_pvt_ip: String,
    /// Host of the secondary (grq) catalog.
    #[serde(rename = "GRQ_ES_PVT_IP")]
    pub grq_es_pvt_ip: String,
    #[serde(rename = "ES_PORT", default = "default_es_port")]
    pub es_port: u16,
    /// Bucket that imported blobs are uploaded to.
    #[serde(rename = "CODE_BUCKET", default)]
    pub code_bucket: Option<String>,
    #[serde(rename = "S3_ENDPOINT", default)]
    pub s3_endpoint: Option<String>,
    /// Overrides the `s3://<S3_ENDPOINT>/<CODE_BUCKET>` import destination.
    #[serde(rename = "CODE_BUCKET_URL", default)]
    pub code_bucket_url: Option<String>,
    /// HTTP(S) endpoint handed to the S3 client.
    #[serde(rename = "S3_ENDPOINT_URL", default)]
    pub s3_endpoint_url: Option<String>,
}

fn default_es_port() -> u16 {
    DEFAULT_ES_PORT
}

/// `~/.sds/config`
pub fn default_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".sds").join("config"))
        .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings> {
        debug!("settings file: {}", path.display());
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Settings::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Settings> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn mozart_es_url(&self) -> String {
        format!("http://{}:{}", self.mozart_es_pvt_ip, self.es_port)
    }

    pub fn grq_es_url(&self) -> String {
        format!("http://{}:{}", self.grq_es_pvt_ip, self.es_port)
    }

    /// Base URL imported blobs are uploaded under. Independent of wherever
    /// the package was exported from.
    pub fn code_bucket_url(&self) -> Result<String> {
        if let Some(url) = &self.code_bucket_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match (&self.s3_endpoint, &self.code_bucket) {
            (Some(endpoint), Some(bucket)) => Ok(format!("s3://{}/{}", endpoint, bucket)),
            _ => Err(Error::Config(
                "CODE_BUCKET and S3_ENDPOINT (or CODE_BUCKET_URL) must be set".to_string(),
            )),
        }
    }
}
