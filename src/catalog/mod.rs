//! Metadata catalogs.
//!
//! A cluster keeps its documents in two independently queried catalogs:
//! the primary one (mozart) holds containers, job specs and the hysds_ios of
//! mozart/figaro components, the secondary one (grq) holds every other
//! hysds_io.

use std::fmt;

use serde_json::Value;

use crate::error::Result;

mod elastic;

pub use elastic::ElasticCatalog;

pub const CONTAINERS: &str = "containers";
pub const JOB_SPECS: &str = "job_specs";
pub const HYSDS_IOS: &str = "hysds_ios";

/// Component assumed for hysds_ios that do not name one.
pub const DEFAULT_COMPONENT: &str = "tosca";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Primary,
    Secondary,
}

impl CatalogKind {
    pub fn for_component(component: Option<&str>) -> CatalogKind {
        match component.unwrap_or(DEFAULT_COMPONENT) {
            "mozart" | "figaro" => CatalogKind::Primary,
            _ => CatalogKind::Secondary,
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKind::Primary => write!(f, "mozart"),
            CatalogKind::Secondary => write!(f, "grq"),
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub source: Value,
}

/// Document store with id-keyed writes.
///
/// `query` returns every matching hit; paging is the implementation's
/// business. `delete_by_id` must succeed when the document is already gone.
pub trait Catalog {
    fn get_by_id(&self, index: &str, id: &str) -> Result<Option<Value>>;
    fn query(&self, index: &str, body: &Value) -> Result<Vec<Hit>>;
    fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()>;
    fn delete_by_id(&self, index: &str, id: &str) -> Result<()>;
}

/// The catalog pair an operation runs against.
#[derive(Clone, Copy)]
pub struct Catalogs<'a> {
    pub primary: &'a dyn Catalog,
    pub secondary: &'a dyn Catalog,
}

impl<'a> Catalogs<'a> {
    pub fn new(primary: &'a dyn Catalog, secondary: &'a dyn Catalog) -> Catalogs<'a> {
        Catalogs { primary, secondary }
    }

    pub fn get(&self, kind: CatalogKind) -> &'a dyn Catalog {
        match kind {
            CatalogKind::Primary => self.primary,
            CatalogKind::Secondary => self.secondary,
        }
    }

    /// Both catalogs, primary first.
    pub fn both(&self) -> [(CatalogKind, &'a dyn Catalog); 2] {
        [
            (CatalogKind::Primary, self.primary),
            (CatalogKind::Secondary, self.secondary),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_routing() {
        assert_eq!(CatalogKind::for_component(Some("mozart")), CatalogKind::Primary);
        assert_eq!(CatalogKind::for_component(Some("figaro")), CatalogKind::Primary);
        assert_eq!(CatalogKind::for_component(Some("tosca")), CatalogKind::Secondary);
        assert_eq!(CatalogKind::for_component(Some("grq")), CatalogKind::Secondary);
        assert_eq!(CatalogKind::for_component(None), CatalogKind::Secondary);
    }

    #[test]
    fn display_names() {
        assert_eq!(CatalogKind::Primary.to_string(), "mozart");
        assert_eq!(CatalogKind::Secondary.to_string(), "grq");
    }
}
