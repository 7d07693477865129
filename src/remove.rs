//! `sdspkg rm`: cascading delete of a package.
//!
//! There is no transaction spanning the object store and two catalogs, so
//! removal is planned up front (read only) and then carried out as an
//! ordered list of steps that each tolerate already being done. The
//! container document goes last: as long as any step is left, the package
//! can still be found and `rm` can simply be run again.

use std::fmt;

use serde_json::Value;

use crate::catalog::{CatalogKind, Catalogs, CONTAINERS, HYSDS_IOS, JOB_SPECS};
use crate::error::{Error, Result};
use crate::objectstore::ObjectStore;
use crate::resolve;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    RemoveBlob {
        url: String,
    },
    DeleteDocument {
        catalog: CatalogKind,
        index: &'static str,
        id: String,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::RemoveBlob { url } => write!(f, "remove blob {}", url),
            Step::DeleteDocument { catalog, index, id } => {
                write!(f, "delete {}/{} from {}", index, id, catalog)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    pub container_id: String,
    pub steps: Vec<Step>,
}

impl RemovalPlan {
    pub fn documents(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::DeleteDocument { .. }))
            .count()
    }

    pub fn blobs(&self) -> usize {
        self.steps.len() - self.documents()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveSummary {
    pub documents_deleted: usize,
    pub blobs_removed: usize,
}

pub struct Remover<'a> {
    catalogs: Catalogs<'a>,
    objects: &'a dyn ObjectStore,
}

impl<'a> Remover<'a> {
    pub fn new(catalogs: Catalogs<'a>, objects: &'a dyn ObjectStore) -> Remover<'a> {
        Remover { catalogs, objects }
    }

    pub fn remove(&self, container_id: &str) -> Result<RemoveSummary> {
        let plan = self.plan(container_id)?;
        self.execute(&plan)
    }

    /// Works out every step without changing anything. Fails with
    /// `NotFound` when the container document is gone.
    pub fn plan(&self, container_id: &str) -> Result<RemovalPlan> {
        let container = self
            .catalogs
            .primary
            .get_by_id(CONTAINERS, container_id)?
            .ok_or_else(|| Error::not_found("SDS package", container_id))?;

        let mut steps = Vec::new();
        match container.get("url").and_then(Value::as_str) {
            Some(url) => steps.push(Step::RemoveBlob {
                url: url.to_string(),
            }),
            None => warn!("container {} has no blob url", container_id),
        }

        for job_spec in resolve::job_spec_hits(&self.catalogs, container_id)? {
            for (catalog, hysds_io) in resolve::hysds_io_hits(&self.catalogs, &job_spec.id)? {
                steps.push(Step::DeleteDocument {
                    catalog,
                    index: HYSDS_IOS,
                    id: hysds_io.id,
                });
            }
            steps.push(Step::DeleteDocument {
                catalog: CatalogKind::Primary,
                index: JOB_SPECS,
                id: job_spec.id,
            });
        }

        steps.push(Step::DeleteDocument {
            catalog: CatalogKind::Primary,
            index: CONTAINERS,
            id: container_id.to_string(),
        });
        Ok(RemovalPlan {
            container_id: container_id.to_string(),
            steps,
        })
    }

    /// Runs the steps in order, stopping at the first failure.
    pub fn execute(&self, plan: &RemovalPlan) -> Result<RemoveSummary> {
        let mut summary = RemoveSummary {
            documents_deleted: 0,
            blobs_removed: 0,
        };
        for (n, step) in plan.steps.iter().enumerate() {
            debug!("{} step {}/{}: {}", plan.container_id, n + 1, plan.steps.len(), step);
            let done = match step {
                Step::RemoveBlob { url } => self.objects.remove_all(url),
                Step::DeleteDocument { catalog, index, id } => {
                    self.catalogs.get(*catalog).delete_by_id(index, id)
                }
            };
            if let Err(e) = done {
                error!(
                    "removing {} stopped at \"{}\": {}; run rm again to finish",
                    plan.container_id, step, e
                );
                return Err(e);
            }
            match step {
                Step::RemoveBlob { .. } => summary.blobs_removed += 1,
                Step::DeleteDocument { .. } => summary.documents_deleted += 1,
            }
        }
        info!(
            "removed {}: {} documents, {} blobs",
            plan.container_id, summary.documents_deleted, summary.blobs_removed
        );
        Ok(summary)
    }
}
