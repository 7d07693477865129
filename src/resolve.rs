//! Finding the documents that reference a package, across catalog mapping
//! generations.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::catalog::{CatalogKind, Catalogs, Hit, HYSDS_IOS, JOB_SPECS};
use crate::error::Result;
use crate::manifest::DependencyImage;

/// How a "field equals value" lookup is phrased. Older catalogs were
/// created with mappings that lack the `.keyword` sub-field, so a lookup
/// walks [`FALLBACK_SHAPES`] until one of them matches something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// `term` on the `.keyword` sub-field.
    Keyword,
    /// `term` on the `.raw` multi-field.
    Raw,
    /// Phrase `query_string` against the analyzed field.
    QueryString,
}

pub const FALLBACK_SHAPES: &[QueryShape] =
    &[QueryShape::Keyword, QueryShape::Raw, QueryShape::QueryString];

impl QueryShape {
    pub fn build(self, field: &str, value: &str) -> Value {
        match self {
            QueryShape::Keyword => json!({ "query": { "term": { (format!("{}.keyword", field)): value } } }),
            QueryShape::Raw => json!({ "query": { "term": { (format!("{}.raw", field)): value } } }),
            QueryShape::QueryString => json!({
                "query": {
                    "query_string": {
                        "query": format!("{}:\"{}\"", field, escape_phrase(value))
                    }
                }
            }),
        }
    }
}

fn escape_phrase(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A "documents in `index` whose `field` is X" lookup.
#[derive(Debug, Clone, Copy)]
pub struct Lookup {
    pub index: &'static str,
    pub field: &'static str,
}

pub const JOB_SPECS_BY_CONTAINER: Lookup = Lookup {
    index: JOB_SPECS,
    field: "container",
};

pub const HYSDS_IOS_BY_JOB_SPEC: Lookup = Lookup {
    index: HYSDS_IOS,
    field: "job-specification",
};

/// Runs `lookup` against one catalog, trying each query shape in order
/// until one yields hits.
///
/// Loose shapes can match neighbours (`foo` also matches `foo:v2` through
/// an analyzed field), so hits are kept only when the field is exactly
/// `value`.
pub fn find_referencing(
    catalogs: &Catalogs<'_>,
    kind: CatalogKind,
    lookup: Lookup,
    value: &str,
) -> Result<Vec<Hit>> {
    let catalog = catalogs.get(kind);
    for &shape in FALLBACK_SHAPES {
        let hits: Vec<Hit> = catalog
            .query(lookup.index, &shape.build(lookup.field, value))?
            .into_iter()
            .filter(|hit| hit.source.get(lookup.field).and_then(Value::as_str) == Some(value))
            .collect();
        info!(
            "found {} {} on {} for {} ({:?} query)",
            hits.len(),
            lookup.index,
            kind,
            value,
            shape
        );
        if !hits.is_empty() {
            return Ok(hits);
        }
    }
    debug!("no {} on {} reference {}", lookup.index, kind, value);
    Ok(Vec::new())
}

/// Job specs running `container_id`. They only live in the primary catalog.
pub fn job_spec_hits(catalogs: &Catalogs<'_>, container_id: &str) -> Result<Vec<Hit>> {
    find_referencing(catalogs, CatalogKind::Primary, JOB_SPECS_BY_CONTAINER, container_id)
}

/// hysds_ios describing `job_spec_id`, from both catalogs, tagged with the
/// catalog they were found in.
pub fn hysds_io_hits(
    catalogs: &Catalogs<'_>,
    job_spec_id: &str,
) -> Result<Vec<(CatalogKind, Hit)>> {
    let mut found = Vec::new();
    for &(kind, _) in catalogs.both().iter() {
        let hits = find_referencing(catalogs, kind, HYSDS_IOS_BY_JOB_SPEC, job_spec_id)?;
        found.extend(hits.into_iter().map(|hit| (kind, hit)));
    }
    Ok(found)
}

/// Dependency images already moved in this run, by image name. Job specs
/// commonly share a base image; it is transferred once and every later
/// reference reuses the first result.
#[derive(Debug, Default)]
pub struct DependencyImages {
    resolved: HashMap<String, String>,
}

impl DependencyImages {
    pub fn new() -> DependencyImages {
        DependencyImages::default()
    }

    /// Points `image` at its transferred location, calling `transfer` with
    /// the current url only the first time its name is seen.
    pub fn resolve<F>(&mut self, image: &mut DependencyImage, transfer: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        if let Some(url) = self.resolved.get(&image.container_image_name) {
            debug!(
                "dependency image {} already transferred as {}",
                image.container_image_name, url
            );
            image.container_image_url = url.clone();
            return Ok(());
        }
        let url = transfer(&image.container_image_url)?;
        self.resolved
            .insert(image.container_image_name.clone(), url.clone());
        image.container_image_url = url;
        Ok(())
    }

    /// Distinct images transferred so far.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
