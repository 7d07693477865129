//! Package manifest and the catalog documents it carries.
//!
//! Documents keep every field they were read with: only the fields this tool
//! reasons about are typed, everything else rides along in `extra` so an
//! export/import round trip is lossless. An explicit `null` stays `null`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::catalog::CatalogKind;
use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    /// Blob reference. Relative filename inside an archive, absolute URL in
    /// a catalog.
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyImage {
    pub container_image_name: String,
    pub container_image_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    /// Id of the container this job spec runs.
    pub container: String,
    /// Outer `None`: field absent. `Some(None)`: field present and `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub dependency_images: Option<Option<Vec<DependencyImage>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobSpec {
    pub fn dependency_images(&self) -> &[DependencyImage] {
        match &self.dependency_images {
            Some(Some(images)) => images,
            _ => &[],
        }
    }

    pub fn dependency_images_mut(&mut self) -> impl Iterator<Item = &mut DependencyImage> {
        self.dependency_images.iter_mut().flatten().flatten()
    }
}

// Only called when the field is in the document, so a `null` here becomes
// `Some(None)` instead of collapsing into "absent".
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HysdsIo {
    pub id: String,
    #[serde(rename = "job-specification")]
    pub job_specification: String,
    /// `component` and `allowed_accounts` live here untyped so whatever the
    /// source holds (including `null`) is written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HysdsIo {
    pub fn component(&self) -> Option<&str> {
        self.extra.get("component").and_then(Value::as_str)
    }

    /// Catalog this document belongs in, derived from `component` alone.
    pub fn catalog(&self) -> CatalogKind {
        CatalogKind::for_component(self.component())
    }

    /// Removes the account ACL, returning it if the field was present.
    pub fn take_allowed_accounts(&mut self) -> Option<Value> {
        self.extra.remove("allowed_accounts")
    }
}

/// Root of an exported package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub containers: Container,
    pub job_specs: Vec<JobSpec>,
    pub hysds_ios: Vec<HysdsIo>,
}

impl Manifest {
    /// Pretty JSON, two space indent, keys sorted at every level.
    pub fn to_json(&self) -> Result<String> {
        let value = sort_keys(serde_json::to_value(self)?);
        Ok(serde_json::to_string_pretty(&value)?)
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, self.to_json()?)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Manifest> {
        let raw = std::fs::read(path)
            .map_err(|_| Error::not_found("manifest", path.display().to_string()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Every job spec must run the packaged container and every hysds_io
    /// must describe a packaged job spec.
    pub fn check_references(&self) -> Result<()> {
        let container_id = &self.containers.id;
        for job_spec in &self.job_specs {
            if &job_spec.container != container_id {
                return Err(Error::InvalidDocument {
                    what: "job_spec",
                    id: job_spec.id.clone(),
                    message: format!(
                        "references container {} instead of {}",
                        job_spec.container, container_id
                    ),
                });
            }
        }
        let job_spec_ids: HashSet<&str> = self.job_specs.iter().map(|j| j.id.as_str()).collect();
        for hysds_io in &self.hysds_ios {
            if !job_spec_ids.contains(hysds_io.job_specification.as_str()) {
                return Err(Error::InvalidDocument {
                    what: "hysds_io",
                    id: hysds_io.id.clone(),
                    message: format!(
                        "references job spec {} which is not in the package",
                        hysds_io.job_specification
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Reads a catalog document as a typed entity.
pub fn from_document<T: DeserializeOwned>(what: &'static str, id: &str, doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| Error::InvalidDocument {
        what,
        id: id.to_string(),
        message: e.to_string(),
    })
}

pub fn to_document<T: Serialize>(entity: &T) -> Result<Value> {
    Ok(serde_json::to_value(entity)?)
}

// Rebuilt through a BTreeMap so ordering holds even if serde_json's
// preserve_order feature gets unified in.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
