//! Unified Resource Graph index (spec §4.J): in-memory inverted/type/
//! source/tenant indexes over normalized `Resource`s, backed by one
//! append-only JSONL shard per tenant per day. Grounded on
//! `original_source/.../graph/index.py`'s `URGIndex`, reshaped per
//! REDESIGN FLAGS: the module-level `_index` singleton (`get_index()`)
//! becomes an instance the caller constructs and injects, rather than a
//! process-wide global guarded by a second lock.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::models::resource::graph_id;
use crate::domain::models::Resource;
use crate::domain::ports::errors::OrchestratorError;
use crate::services::jsonl::append_jsonl_line;

#[derive(Debug, Default)]
struct Indexes {
    resources: HashMap<String, Resource>,
    inverted: HashMap<String, HashSet<String>>,
    by_type: HashMap<String, HashSet<String>>,
    by_source: HashMap<String, HashSet<String>>,
    by_tenant: HashMap<String, HashSet<String>>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl Indexes {
    fn index(&mut self, id: String, resource: Resource) {
        self.by_type.entry(resource.resource_type.clone()).or_default().insert(id.clone());
        self.by_source.entry(resource.source.clone()).or_default().insert(id.clone());
        self.by_tenant.entry(resource.tenant.clone()).or_default().insert(id.clone());

        let mut searchable = vec![resource.title.clone(), resource.snippet.clone()];
        searchable.extend(resource.participants.iter().cloned());
        searchable.extend(resource.labels.iter().cloned());

        for text in searchable {
            for token in tokenize(&text) {
                self.inverted.entry(token).or_default().insert(id.clone());
            }
        }

        self.resources.insert(id, resource);
    }

    fn unindex(&mut self, id: &str) {
        let Some(resource) = self.resources.remove(id) else {
            return;
        };
        if let Some(set) = self.by_type.get_mut(&resource.resource_type) {
            set.remove(id);
        }
        if let Some(set) = self.by_source.get_mut(&resource.source) {
            set.remove(id);
        }
        if let Some(set) = self.by_tenant.get_mut(&resource.tenant) {
            set.remove(id);
        }
        for set in self.inverted.values_mut() {
            set.remove(id);
        }
    }
}

/// Statistics returned by `stats()`, mirroring `get_stats()`'s breakdown.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub total: usize,
    pub by_type: HashMap<String, usize>,
    pub by_source: HashMap<String, usize>,
    pub by_tenant: HashMap<String, usize>,
}

/// In-memory URG index with JSONL shard persistence under
/// `{root}/{tenant}/{YYYY-MM-DD}.jsonl`. Writes are serialized through an
/// async mutex (shard append is the only I/O); the in-memory indexes use a
/// sync `RwLock` since lookups never cross an await point.
pub struct UrgIndex {
    root: PathBuf,
    indexes: RwLock<Indexes>,
    write_lock: AsyncMutex<()>,
}

impl UrgIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexes: RwLock::new(Indexes::default()),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Load every existing shard under `root` into memory, as
    /// `URGIndex.__init__`'s `_load_shards` does at construction time.
    pub async fn load(root: impl Into<PathBuf>) -> Result<Self, OrchestratorError> {
        let index = Self::new(root);
        index.rebuild().await?;
        Ok(index)
    }

    async fn rebuild(&self) -> Result<(), OrchestratorError> {
        {
            let mut guard = self.indexes.write().expect("urg index lock poisoned");
            *guard = Indexes::default();
        }

        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(());
        }

        let mut tenant_dirs = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| OrchestratorError::fatal(format!("reading {}: {e}", self.root.display())))?;

        while let Some(tenant_dir) = tenant_dirs
            .next_entry()
            .await
            .map_err(|e| OrchestratorError::fatal(format!("walking {}: {e}", self.root.display())))?
        {
            if !tenant_dir.path().is_dir() {
                continue;
            }
            let mut shards = tokio::fs::read_dir(tenant_dir.path())
                .await
                .map_err(|e| OrchestratorError::fatal(format!("reading shard dir: {e}")))?;

            while let Some(shard) = shards.next_entry().await.map_err(|e| OrchestratorError::fatal(format!("walking shards: {e}")))? {
                if shard.path().extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let Ok(contents) = tokio::fs::read_to_string(shard.path()).await else {
                    continue;
                };
                let mut guard = self.indexes.write().expect("urg index lock poisoned");
                for line in contents.lines() {
                    if let Ok(resource) = serde_json::from_str::<Resource>(line) {
                        let id = graph_id(&resource.source, &resource.resource_type, &resource.id);
                        guard.index(id, resource);
                    }
                }
            }
        }

        Ok(())
    }

    fn shard_path(&self, tenant: &str) -> PathBuf {
        let date = Utc::now().date_naive();
        self.root.join(tenant).join(format!("{date}.jsonl"))
    }

    /// Normalize, store, and index `resource`, returning its graph URN.
    /// Replaces any prior version of the same resource, matching the
    /// unindex-then-reindex sequence in `upsert()`.
    pub async fn upsert(&self, resource: Resource) -> Result<String, OrchestratorError> {
        let _guard = self.write_lock.lock().await;

        let id = graph_id(&resource.source, &resource.resource_type, &resource.id);
        let tenant = resource.tenant.clone();

        {
            let mut indexes = self.indexes.write().expect("urg index lock poisoned");
            indexes.unindex(&id);
            indexes.index(id.clone(), resource.clone());
        }

        append_jsonl_line(self.shard_path(&tenant), &resource).await?;
        Ok(id)
    }

    /// Tenant-isolated lookup: returns `None` if the resource belongs to a
    /// different tenant, never leaking its existence across tenants.
    pub fn get(&self, id: &str, tenant: &str) -> Option<Resource> {
        let indexes = self.indexes.read().expect("urg index lock poisoned");
        indexes.resources.get(id).filter(|r| r.tenant == tenant).cloned()
    }

    pub fn list_by_tenant(&self, tenant: &str, limit: usize) -> Vec<Resource> {
        let indexes = self.indexes.read().expect("urg index lock poisoned");
        let mut resources: Vec<Resource> = indexes
            .by_tenant
            .get(tenant)
            .into_iter()
            .flatten()
            .filter_map(|id| indexes.resources.get(id).cloned())
            .collect();
        resources.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        resources.truncate(limit);
        resources
    }

    /// Full-text search over the tokenized title/snippet/participants/
    /// labels fields, scoped to one tenant. Results are the intersection
    /// of tenant membership and every query token's postings.
    pub fn search(&self, tenant: &str, query: &str, limit: usize) -> Vec<Resource> {
        let indexes = self.indexes.read().expect("urg index lock poisoned");
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return self.list_by_tenant(tenant, limit);
        }

        let mut candidates: Option<HashSet<String>> = None;
        for token in &tokens {
            let postings = indexes.inverted.get(token).cloned().unwrap_or_default();
            candidates = Some(match candidates {
                Some(existing) => existing.intersection(&postings).cloned().collect(),
                None => postings,
            });
        }

        let tenant_ids = indexes.by_tenant.get(tenant).cloned().unwrap_or_default();
        let mut results: Vec<Resource> = candidates
            .unwrap_or_default()
            .into_iter()
            .filter(|id| tenant_ids.contains(id))
            .filter_map(|id| indexes.resources.get(&id).cloned())
            .collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results.truncate(limit);
        results
    }

    pub fn stats(&self, tenant: Option<&str>) -> IndexStats {
        let indexes = self.indexes.read().expect("urg index lock poisoned");
        let scoped: Vec<&Resource> = match tenant {
            Some(t) => indexes
                .by_tenant
                .get(t)
                .into_iter()
                .flatten()
                .filter_map(|id| indexes.resources.get(id))
                .collect(),
            None => indexes.resources.values().collect(),
        };

        let mut stats = IndexStats {
            total: scoped.len(),
            ..Default::default()
        };
        for resource in scoped {
            *stats.by_type.entry(resource.resource_type.clone()).or_insert(0) += 1;
            *stats.by_source.entry(resource.source.clone()).or_insert(0) += 1;
            *stats.by_tenant.entry(resource.tenant.clone()).or_insert(0) += 1;
        }
        stats
    }
}
