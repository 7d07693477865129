//! `sdspkg import`: restore an exported package into this cluster.
//!
//! Every write is an upsert keyed by the document id, so importing the same
//! package again converges on the same state. A failure half way leaves
//! whatever was already written in place; re-running the import finishes
//! the job.

use std::path::{Path, PathBuf};

use crate::archive;
use crate::catalog::{Catalogs, CONTAINERS, HYSDS_IOS, JOB_SPECS};
use crate::error::{Error, Result};
use crate::manifest::{to_document, Manifest};
use crate::objectstore::{basename, join_url, ObjectStore};
use crate::resolve::DependencyImages;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub container_id: String,
    pub job_specs: usize,
    pub hysds_ios: usize,
    /// Container blob plus distinct dependency images.
    pub blobs_uploaded: usize,
}

pub struct Importer<'a> {
    catalogs: Catalogs<'a>,
    objects: &'a dyn ObjectStore,
    destination: String,
}

impl<'a> Importer<'a> {
    /// Blobs are uploaded under `destination`, a base url taken from this
    /// cluster's settings rather than from the package.
    pub fn new(
        catalogs: Catalogs<'a>,
        objects: &'a dyn ObjectStore,
        destination: impl Into<String>,
    ) -> Importer<'a> {
        Importer {
            catalogs,
            objects,
            destination: destination.into(),
        }
    }

    pub fn import(&self, tar_path: &Path) -> Result<ImportSummary> {
        // the scratch directory is removed when `extracted` drops, whether
        // or not the loop below finishes
        let extracted = archive::unpack(tar_path)?;
        let mut manifest = Manifest::read(&extracted.manifest_path())?;
        manifest.check_references()?;
        let root = extracted.root();

        let container = &mut manifest.containers;
        container.url = self.upload(root, &container.url)?;
        self.catalogs
            .primary
            .upsert(CONTAINERS, &container.id, &to_document(container)?)?;
        info!("indexed container {}", container.id);

        let mut images = DependencyImages::new();
        for job_spec in manifest.job_specs.iter_mut() {
            for image in job_spec.dependency_images_mut() {
                images.resolve(image, |name| self.upload(root, name))?;
            }
            self.catalogs
                .primary
                .upsert(JOB_SPECS, &job_spec.id, &to_document(job_spec)?)?;
            info!("indexed job spec {}", job_spec.id);
        }

        for hysds_io in &manifest.hysds_ios {
            let kind = hysds_io.catalog();
            self.catalogs
                .get(kind)
                .upsert(HYSDS_IOS, &hysds_io.id, &to_document(hysds_io)?)?;
            info!("indexed hysds_io {} on {}", hysds_io.id, kind);
        }

        Ok(ImportSummary {
            container_id: manifest.containers.id.clone(),
            job_specs: manifest.job_specs.len(),
            hysds_ios: manifest.hysds_ios.len(),
            blobs_uploaded: 1 + images.len(),
        })
    }

    /// Uploads a packaged blob and returns its new url.
    fn upload(&self, root: &Path, packaged: &str) -> Result<String> {
        let name = basename(packaged)?;
        let local: PathBuf = root.join(&name);
        if !local.is_file() {
            return Err(Error::not_found("packaged blob", name));
        }
        let url = join_url(&self.destination, &name);
        self.objects.put(&local, &url)?;
        Ok(url)
    }
}
