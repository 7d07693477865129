//! `sdspkg export`: snapshot a container, its job specs and their hysds_ios
//! into a self-contained tarball.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use crate::archive::{self, ArchiveInfo};
use crate::catalog::{Catalogs, CONTAINERS};
use crate::error::{Error, Result};
use crate::manifest::{from_document, Container, HysdsIo, JobSpec, Manifest, MANIFEST_FILE};
use crate::objectstore::{basename, ObjectStore};
use crate::resolve::{self, DependencyImages};

/// `<id>.sdspkg`, with `:` swapped for `-` so it is a portable file name.
pub fn export_name(container_id: &str) -> String {
    format!("{}.sdspkg", container_id.replace(':', "-"))
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub archive: ArchiveInfo,
    pub job_specs: usize,
    pub hysds_ios: usize,
    /// Distinct dependency images packaged.
    pub dependency_images: usize,
}

pub struct Exporter<'a> {
    catalogs: Catalogs<'a>,
    objects: &'a dyn ObjectStore,
    keep_accounts: bool,
}

impl<'a> Exporter<'a> {
    pub fn new(catalogs: Catalogs<'a>, objects: &'a dyn ObjectStore) -> Exporter<'a> {
        Exporter {
            catalogs,
            objects,
            keep_accounts: false,
        }
    }

    /// Keep `allowed_accounts` on exported hysds_ios. Off by default so
    /// authorization lists do not travel with the package.
    pub fn keep_accounts(mut self, keep: bool) -> Exporter<'a> {
        self.keep_accounts = keep;
        self
    }

    /// Writes `<outdir>/<id>.sdspkg.tar`.
    ///
    /// Nothing is overwritten: an existing export directory or tarball
    /// stops the export before any catalog or object store call. On
    /// failure the half-built export directory is left for inspection; no
    /// tarball is produced.
    pub fn export(&self, container_id: &str, outdir: &Path) -> Result<ExportSummary> {
        let name = export_name(container_id);
        let export_dir = outdir.join(&name);
        let tar_path = outdir.join(format!("{}.tar", name));
        for existing in [&export_dir, &tar_path].iter() {
            if existing.exists() {
                error!(
                    "SDS package export target {} exists. Not continuing.",
                    existing.display()
                );
                return Err(Error::AlreadyExists(existing.to_path_buf()));
            }
        }

        let doc = self
            .catalogs
            .primary
            .get_by_id(CONTAINERS, container_id)?
            .ok_or_else(|| Error::not_found("SDS package", container_id))?;
        let mut container: Container = from_document("container", container_id, doc)?;
        debug!("container {}: {}", container_id, container.url);

        create_export_dir(outdir, &export_dir)?;
        let mut staging = Staging::new(&export_dir);
        container.url = self.fetch(&mut staging, &container.url)?;

        let mut images = DependencyImages::new();
        let job_specs = self.job_specs(container_id, &mut staging, &mut images)?;
        let mut hysds_ios = self.hysds_ios(&job_specs)?;
        info!(
            "found {} job specs and {} hysds_ios for {}",
            job_specs.len(),
            hysds_ios.len(),
            container_id
        );

        if !self.keep_accounts {
            for hysds_io in hysds_ios.iter_mut() {
                if hysds_io.take_allowed_accounts().is_some() {
                    debug!("dropped allowed_accounts from {}", hysds_io.id);
                }
            }
        }

        let manifest = Manifest {
            containers: container,
            job_specs,
            hysds_ios,
        };
        manifest.write(&export_dir)?;

        let archive = archive::pack(&export_dir, &tar_path)?;
        std::fs::remove_dir_all(&export_dir)?;

        Ok(ExportSummary {
            archive,
            job_specs: manifest.job_specs.len(),
            hysds_ios: manifest.hysds_ios.len(),
            dependency_images: images.len(),
        })
    }

    /// Downloads a blob into the export directory and returns the name it
    /// is stored under there.
    fn fetch(&self, staging: &mut Staging<'_>, url: &str) -> Result<String> {
        match staging.claim(url)? {
            Claim::Fresh(name) => {
                // private landing spot so a same-named blob is never clobbered
                let incoming = tempfile::Builder::new()
                    .prefix(".incoming-")
                    .tempdir_in(staging.dir)?;
                let downloaded = self.objects.get(url, incoming.path())?;
                std::fs::rename(&downloaded, staging.dir.join(&name))?;
                Ok(name)
            }
            Claim::Staged(name) => {
                debug!("{} already staged as {}", url, name);
                Ok(name)
            }
        }
    }

    fn job_specs(
        &self,
        container_id: &str,
        staging: &mut Staging<'_>,
        images: &mut DependencyImages,
    ) -> Result<Vec<JobSpec>> {
        let mut job_specs = Vec::new();
        for hit in resolve::job_spec_hits(&self.catalogs, container_id)? {
            let mut job_spec: JobSpec = from_document("job_spec", &hit.id, hit.source)?;
            for image in job_spec.dependency_images_mut() {
                images.resolve(image, |url| self.fetch(staging, url))?;
            }
            job_specs.push(job_spec);
        }
        Ok(job_specs)
    }

    /// Which catalog a hysds_io came from is not kept; import routes on
    /// `component`.
    fn hysds_ios(&self, job_specs: &[JobSpec]) -> Result<Vec<HysdsIo>> {
        let mut hysds_ios = Vec::new();
        for job_spec in job_specs {
            for (_, hit) in resolve::hysds_io_hits(&self.catalogs, &job_spec.id)? {
                hysds_ios.push(from_document("hysds_io", &hit.id, hit.source)?);
            }
        }
        Ok(hysds_ios)
    }
}

enum Claim {
    /// Not downloaded yet; store it under this name.
    Fresh(String),
    /// Same url already downloaded under this name.
    Staged(String),
}

/// File names handed out inside one export directory. Blobs are named after
/// their url's last segment; a different url with a name already in use (or
/// clashing with the manifest) gets a numbered prefix instead of overwriting.
struct Staging<'d> {
    dir: &'d Path,
    by_url: HashMap<String, String>,
    taken: HashSet<String>,
}

impl<'d> Staging<'d> {
    fn new(dir: &'d Path) -> Staging<'d> {
        Staging {
            dir,
            by_url: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    fn claim(&mut self, url: &str) -> Result<Claim> {
        if let Some(name) = self.by_url.get(url) {
            return Ok(Claim::Staged(name.clone()));
        }
        let base = basename(url)?;
        let mut name = base.clone();
        let mut n = 1;
        while name == MANIFEST_FILE || self.taken.contains(&name) {
            n += 1;
            name = format!("{}-{}", n, base);
        }
        if name != base {
            warn!("{} is packaged as {}, {} is already in use", url, name, base);
        }
        self.taken.insert(name.clone());
        self.by_url.insert(url.to_string(), name.clone());
        Ok(Claim::Fresh(name))
    }
}

fn create_export_dir(outdir: &Path, export_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(outdir)?;
    match std::fs::create_dir(export_dir) {
        Ok(()) => Ok(()),
        // lost a race with another export of the same id
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(Error::AlreadyExists(export_dir.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}
