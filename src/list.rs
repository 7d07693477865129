use serde_json::json;

use crate::catalog::{Catalog, CONTAINERS};
use crate::error::Result;

/// Ids of every package (container) in the catalog, sorted.
pub fn list_packages(catalog: &dyn Catalog) -> Result<Vec<String>> {
    let hits = catalog.query(CONTAINERS, &json!({ "query": { "match_all": {} } }))?;
    debug!("{} containers", hits.len());
    let mut ids: Vec<String> = hits.into_iter().map(|hit| hit.id).collect();
    ids.sort();
    Ok(ids)
}
