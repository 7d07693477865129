//! HySDS package management.
//!
//! A package is one container image plus the job specs that run it and the
//! hysds_ios describing those job specs. `export` snapshots a package out of
//! a cluster's catalogs and object store into a portable tarball, `import`
//! restores it into a (possibly different) cluster, `rm` deletes it.
//!
//! ```text
//! <id>.sdspkg.tar
//! └── <id>.sdspkg/
//!     ├── manifest.json     # {containers, job_specs, hysds_ios}
//!     ├── <container blob>
//!     └── <dependency image blobs, one per image name>
//! ```
#[macro_use]
extern crate log;

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod list;
pub mod manifest;
pub mod objectstore;
pub mod remove;
pub mod resolve;

pub use catalog::{Catalog, CatalogKind, Catalogs, ElasticCatalog};
pub use error::{Error, Result};
pub use export::{ExportSummary, Exporter};
pub use import::{ImportSummary, Importer};
pub use list::list_packages;
pub use manifest::Manifest;
pub use objectstore::{ObjectStore, ObjectStoreRouter};
pub use remove::{RemoveSummary, Remover};
