use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use url::Url;

use super::{Catalog, Hit};
use crate::error::{Error, Result};

const SERVICE: &str = "elasticsearch";
const SCROLL_KEEPALIVE: &str = "2m";
const PAGE_SIZE: usize = 100;

/// Catalog backed by an Elasticsearch cluster (7+ `_doc` endpoints).
pub struct ElasticCatalog {
    base_url: Url,
    client: Client,
}

impl ElasticCatalog {
    pub fn new(base_url: &str) -> Result<ElasticCatalog> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::Config(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("{} cannot be a base url", base_url)));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| Error::upstream(SERVICE, e))?;
        Ok(ElasticCatalog { base_url, client })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // checked in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn read_json(response: Response) -> Result<Value> {
        let response = response
            .error_for_status()
            .map_err(|e| Error::upstream(SERVICE, e))?;
        response.json().map_err(|e| Error::upstream(SERVICE, e))
    }

    fn send(request: reqwest::blocking::RequestBuilder) -> Result<Response> {
        request.send().map_err(|e| Error::upstream(SERVICE, e))
    }

    fn clear_scroll(&self, scroll_id: &str) {
        let request = self
            .client
            .delete(self.endpoint(&["_search", "scroll"]))
            .json(&json!({ "scroll_id": scroll_id }));
        match Self::send(request).and_then(Self::read_json) {
            Ok(_) => {}
            Err(e) => warn!("failed to clear scroll {}: {}", scroll_id, e),
        }
    }

    /// Collects hits from `page` and every scroll page after it. `scroll_id`
    /// holds the latest id seen, also when a later page fails, so the caller
    /// can always clear it.
    fn drain_scroll(
        &self,
        mut page: Value,
        scroll_id: &mut Option<String>,
        hits: &mut Vec<Hit>,
    ) -> Result<()> {
        loop {
            let next = page["_scroll_id"].as_str().map(str::to_string);
            if next.is_some() {
                *scroll_id = next.clone();
            }
            let more = page_hits(&page)?;
            let exhausted = more.is_empty();
            hits.extend(more);
            let next = match next {
                Some(id) if !exhausted => id,
                _ => return Ok(()),
            };
            let request = self
                .client
                .post(self.endpoint(&["_search", "scroll"]))
                .json(&json!({ "scroll": SCROLL_KEEPALIVE, "scroll_id": next }));
            page = Self::send(request).and_then(Self::read_json)?;
        }
    }
}

fn page_hits(page: &Value) -> Result<Vec<Hit>> {
    let hits = page["hits"]["hits"]
        .as_array()
        .ok_or_else(|| Error::upstream(SERVICE, "search response without hits"))?;
    hits.iter()
        .map(|hit| {
            let id = hit["_id"]
                .as_str()
                .ok_or_else(|| Error::upstream(SERVICE, "hit without _id"))?;
            Ok(Hit {
                id: id.to_string(),
                source: hit["_source"].clone(),
            })
        })
        .collect()
}

impl Catalog for ElasticCatalog {
    fn get_by_id(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let response = Self::send(self.client.get(self.endpoint(&[index, "_doc", id])))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc = Self::read_json(response)?;
        if doc["found"].as_bool() == Some(false) {
            return Ok(None);
        }
        Ok(Some(doc["_source"].clone()))
    }

    fn query(&self, index: &str, body: &Value) -> Result<Vec<Hit>> {
        debug!("{}/{} query: {}", self.base_url, index, body);
        let mut url = self.endpoint(&[index, "_search"]);
        url.query_pairs_mut()
            .append_pair("scroll", SCROLL_KEEPALIVE)
            .append_pair("size", &PAGE_SIZE.to_string());
        let response = Self::send(self.client.post(url).json(body))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("index {} does not exist on {}", index, self.base_url);
            return Ok(Vec::new());
        }
        let first = Self::read_json(response)?;
        let mut scroll_id = None;
        let mut hits = Vec::new();
        let drained = self.drain_scroll(first, &mut scroll_id, &mut hits);
        if let Some(scroll_id) = scroll_id {
            self.clear_scroll(&scroll_id);
        }
        drained.map(|()| hits)
    }

    fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        let request = self.client.put(self.endpoint(&[index, "_doc", id])).json(doc);
        let result = Self::send(request).and_then(Self::read_json)?;
        debug!("indexed {}/{}: {}", index, id, result["result"]);
        Ok(())
    }

    fn delete_by_id(&self, index: &str, id: &str) -> Result<()> {
        let response = Self::send(self.client.delete(self.endpoint(&[index, "_doc", id])))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{}/{} already absent", index, id);
            return Ok(());
        }
        Self::read_json(response)?;
        Ok(())
    }
}
