#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use sdspkg::catalog::{Catalog, Hit};
use sdspkg::objectstore::{LocalObjectStore, ObjectStore};
use sdspkg::{Error, Result};

/// In-memory catalog that understands the handful of query shapes the
/// package tool sends.
#[derive(Default)]
pub struct MemoryCatalog {
    indices: RefCell<BTreeMap<String, BTreeMap<String, Value>>>,
    /// Documents indexed without `.keyword`/`.raw` sub-fields.
    legacy_mapping: bool,
    calls: Cell<usize>,
    deleted: Cell<usize>,
    /// Remaining deletes before every further delete fails.
    deletes_before_failure: Cell<Option<usize>>,
    failing_queries: Cell<bool>,
}

impl MemoryCatalog {
    pub fn new() -> MemoryCatalog {
        MemoryCatalog::default()
    }

    pub fn legacy() -> MemoryCatalog {
        MemoryCatalog {
            legacy_mapping: true,
            ..MemoryCatalog::default()
        }
    }

    pub fn insert(&self, index: &str, doc: Value) {
        let id = doc["id"].as_str().expect("document id").to_string();
        self.indices
            .borrow_mut()
            .entry(index.to_string())
            .or_default()
            .insert(id, doc);
    }

    pub fn doc(&self, index: &str, id: &str) -> Option<Value> {
        self.indices
            .borrow()
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn ids(&self, index: &str) -> Vec<String> {
        self.indices
            .borrow()
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.indices.borrow().values().map(|docs| docs.len()).sum()
    }

    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.indices.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Documents actually removed (deletes of absent ids do not count).
    pub fn deleted(&self) -> usize {
        self.deleted.get()
    }

    pub fn fail_deletes_after(&self, n: usize) {
        self.deletes_before_failure.set(Some(n));
    }

    pub fn fail_queries(&self) {
        self.failing_queries.set(true);
    }

    pub fn heal(&self) {
        self.deletes_before_failure.set(None);
        self.failing_queries.set(false);
    }

    fn matches(&self, query: &Value, doc: &Value) -> bool {
        if query.get("match_all").is_some() {
            return true;
        }
        if let Some(term) = query.get("term").and_then(Value::as_object) {
            return term.iter().all(|(key, value)| {
                let field = match key
                    .strip_suffix(".keyword")
                    .or_else(|| key.strip_suffix(".raw"))
                {
                    Some(field) if !self.legacy_mapping => field,
                    Some(_) => return false,
                    None => key.as_str(),
                };
                doc.get(field) == Some(value)
            });
        }
        if let Some(q) = query["query_string"]["query"].as_str() {
            // field:"phrase", matched loosely like an analyzed field would
            if let Some((field, phrase)) = q.split_once(':') {
                let phrase = phrase.trim_matches('"');
                return doc
                    .get(field)
                    .and_then(Value::as_str)
                    .map_or(false, |v| v.contains(phrase));
            }
        }
        false
    }
}

impl Catalog for MemoryCatalog {
    fn get_by_id(&self, index: &str, id: &str) -> Result<Option<Value>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.doc(index, id))
    }

    fn query(&self, index: &str, body: &Value) -> Result<Vec<Hit>> {
        self.calls.set(self.calls.get() + 1);
        if self.failing_queries.get() {
            return Err(Error::upstream("memory", "search timed out"));
        }
        let indices = self.indices.borrow();
        let docs = match indices.get(index) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };
        Ok(docs
            .iter()
            .filter(|(_, doc)| self.matches(&body["query"], doc))
            .map(|(id, doc)| Hit {
                id: id.clone(),
                source: doc.clone(),
            })
            .collect())
    }

    fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        self.indices
            .borrow_mut()
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    fn delete_by_id(&self, index: &str, id: &str) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        if let Some(left) = self.deletes_before_failure.get() {
            if left == 0 {
                return Err(Error::upstream("memory", "connection reset"));
            }
            self.deletes_before_failure.set(Some(left - 1));
        }
        let removed = self
            .indices
            .borrow_mut()
            .get_mut(index)
            .and_then(|docs| docs.remove(id));
        if removed.is_some() {
            self.deleted.set(self.deleted.get() + 1);
        }
        Ok(())
    }
}

/// `file://` store that records every call.
#[derive(Default)]
pub struct RecordingStore {
    inner: LocalObjectStore,
    pub log: RefCell<Vec<String>>,
    fail_gets: Cell<bool>,
    /// Remaining puts before every further put fails.
    puts_before_failure: Cell<Option<usize>>,
}

impl RecordingStore {
    pub fn new() -> RecordingStore {
        RecordingStore::default()
    }

    pub fn calls(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn fail_gets(&self) {
        self.fail_gets.set(true);
    }

    pub fn fail_puts_after(&self, n: usize) {
        self.puts_before_failure.set(Some(n));
    }
}

impl ObjectStore for RecordingStore {
    fn get(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        self.log.borrow_mut().push(format!("get {}", url));
        if self.fail_gets.get() {
            return Err(Error::upstream("recording", "download failed"));
        }
        self.inner.get(url, dest_dir)
    }

    fn put(&self, path: &Path, url: &str) -> Result<()> {
        self.log.borrow_mut().push(format!("put {}", url));
        if let Some(left) = self.puts_before_failure.get() {
            if left == 0 {
                return Err(Error::upstream("recording", "upload failed"));
            }
            self.puts_before_failure.set(Some(left - 1));
        }
        self.inner.put(path, url)
    }

    fn remove_all(&self, url: &str) -> Result<()> {
        self.log.borrow_mut().push(format!("rm {}", url));
        self.inner.remove_all(url)
    }
}

pub fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path).expect("absolute path").to_string()
}

/// Source cluster: blobs under `<root>/source`, two catalogs.
pub struct Cluster {
    pub root: tempfile::TempDir,
    pub mozart: MemoryCatalog,
    pub grq: MemoryCatalog,
}

impl Cluster {
    pub fn empty() -> Cluster {
        Cluster::with_catalogs(MemoryCatalog::new(), MemoryCatalog::new())
    }

    pub fn with_catalogs(mozart: MemoryCatalog, grq: MemoryCatalog) -> Cluster {
        Cluster {
            root: tempfile::tempdir().expect("tempdir"),
            mozart,
            grq,
        }
    }

    pub fn catalogs(&self) -> sdspkg::Catalogs<'_> {
        sdspkg::Catalogs::new(&self.mozart, &self.grq)
    }

    pub fn blob(&self, name: &str, contents: &[u8]) -> String {
        let path = self.root.path().join("source").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        file_url(&path)
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    /// Container `C1` with job specs `J1`, `J2` sharing dependency image
    /// `base`; `H1` (mozart) describes `J1`, `H2` (tosca) describes `J2`.
    pub fn scenario() -> Cluster {
        let cluster = Cluster::empty();
        cluster.populate_scenario();
        cluster
    }

    pub fn populate_scenario(&self) {
        let cluster = self;
        let container_url = cluster.blob("container-c1.tar.gz", b"c1 image");
        let base_url = cluster.blob("base.tar", b"base image");

        cluster.mozart.insert(
            "containers",
            json!({"id": "C1", "url": container_url, "version": "v1", "resource": "container"}),
        );
        for (job_spec, command) in &[("J1", "run-a.sh"), ("J2", "run-b.sh")] {
            cluster.mozart.insert(
                "job_specs",
                json!({
                    "id": job_spec,
                    "container": "C1",
                    "command": command,
                    "dependency_images": [
                        {"container_image_name": "base", "container_image_url": base_url, "container_mappings": {"/data": "/data"}}
                    ]
                }),
            );
        }
        cluster.mozart.insert(
            "hysds_ios",
            json!({"id": "H1", "component": "mozart", "job-specification": "J1",
                   "allowed_accounts": ["ops", "dev"], "params": []}),
        );
        cluster.grq.insert(
            "hysds_ios",
            json!({"id": "H2", "component": "tosca", "job-specification": "J2",
                   "allowed_accounts": {"users": ["ops"]}, "params": [{"name": "x"}]}),
        );
    }
}

/// Reads one entry of a tarball.
pub fn tar_entry(tar_path: &Path, name: &str) -> Option<Vec<u8>> {
    use std::io::Read;
    let mut archive = tar::Archive::new(std::fs::File::open(tar_path).ok()?);
    for entry in archive.entries().ok()? {
        let mut entry = entry.ok()?;
        if entry.path().ok()?.to_str() == Some(name) {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).ok()?;
            return Some(buf);
        }
    }
    None
}

/// Regular files in a tarball.
pub fn tar_files(tar_path: &Path) -> Vec<String> {
    let mut archive = tar::Archive::new(std::fs::File::open(tar_path).expect("tarball"));
    let mut names: Vec<String> = archive
        .entries()
        .expect("entries")
        .map(|e| e.expect("entry"))
        .filter(|e| e.header().entry_type().is_file())
        .map(|e| e.path().expect("path").display().to_string())
        .collect();
    names.sort();
    names
}
