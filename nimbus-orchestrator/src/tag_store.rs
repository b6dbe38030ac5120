use anyhow::{Context, Result};
use nimbus_common::TagSet;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Durable mapping from instance id to tag set, scoped to one cluster. The
/// backing file is shared per host and keyed by cluster name; every mutation
/// rewrites this cluster's section wholesale so a partial mapping is never
/// observable on disk.
#[derive(Debug)]
pub struct TagStore {
    cluster_name: String,
    path: PathBuf,
    entries: BTreeMap<String, TagSet>,
}

type FileLayout = BTreeMap<String, BTreeMap<String, TagSet>>;

impl TagStore {
    pub fn new(cluster_name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            path,
            entries: BTreeMap::new(),
        }
    }

    /// Reads this cluster's section from the durable file into memory.
    /// Returns false when no file exists yet (first boot on this host).
    pub fn load(&mut self) -> Result<bool> {
        if !self.path.is_file() {
            return Ok(false);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading tag file {}", self.path.display()))?;
        let all: FileLayout = serde_json::from_str(&text)
            .with_context(|| format!("parsing tag file {}", self.path.display()))?;
        self.entries = all.get(&self.cluster_name).cloned().unwrap_or_default();
        debug!(
            cluster = %self.cluster_name,
            entries = self.entries.len(),
            "tag store loaded"
        );
        Ok(true)
    }

    /// Serializes the complete id-to-tags mapping and replaces the durable
    /// file as a single unit. Sections belonging to other clusters on this
    /// host are carried over untouched.
    pub fn save(&self) -> Result<()> {
        let mut all: FileLayout = if self.path.is_file() {
            let text = fs::read_to_string(&self.path)
                .with_context(|| format!("reading tag file {}", self.path.display()))?;
            serde_json::from_str(&text).unwrap_or_default()
        } else {
            BTreeMap::new()
        };
        all.insert(self.cluster_name.clone(), self.entries.clone());

        let tmp = self.path.with_extension("tmp");
        let text = serde_json::to_string(&all)?;
        fs::write(&tmp, text)
            .with_context(|| format!("writing tag file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing tag file {}", self.path.display()))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TagSet> {
        self.entries.get(id)
    }

    /// Merges `tags` into the existing set for `id`, overwriting overlapping
    /// keys. In-memory only; callers persist via `save`.
    pub fn merge(&mut self, id: &str, tags: TagSet) {
        self.entries.entry(id.to_string()).or_default().extend(tags);
    }

    pub fn remove(&mut self, id: &str) -> Option<TagSet> {
        self.entries.remove(id)
    }

    pub fn retain(&mut self, keep: impl FnMut(&String, &mut TagSet) -> bool) {
        self.entries.retain(keep);
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &TagSet)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TagStore::new("dev", dir.path().join("tags.json"));
        assert!(!store.load().unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");

        let mut store = TagStore::new("dev", path.clone());
        store.merge("inst-1", tags(&[("kind", "head"), ("name", "dev-head-a")]));
        store.merge("inst-2", tags(&[("kind", "worker")]));
        store.save().unwrap();

        let mut reloaded = TagStore::new("dev", path);
        assert!(reloaded.load().unwrap());
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get("inst-1").unwrap().get("name").unwrap(),
            "dev-head-a"
        );
    }

    #[test]
    fn merge_overwrites_overlapping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TagStore::new("dev", dir.path().join("tags.json"));
        store.merge("inst-1", tags(&[("status", "uninitialized")]));
        store.merge("inst-1", tags(&[("status", "up-to-date"), ("extra", "x")]));
        let entry = store.get("inst-1").unwrap();
        assert_eq!(entry.get("status").unwrap(), "up-to-date");
        assert_eq!(entry.get("extra").unwrap(), "x");
    }

    #[test]
    fn other_clusters_survive_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");

        let mut staging = TagStore::new("staging", path.clone());
        staging.merge("inst-9", tags(&[("kind", "head")]));
        staging.save().unwrap();

        let mut dev = TagStore::new("dev", path.clone());
        dev.load().unwrap();
        dev.merge("inst-1", tags(&[("kind", "worker")]));
        dev.save().unwrap();

        let mut staging_again = TagStore::new("staging", path);
        assert!(staging_again.load().unwrap());
        assert_eq!(staging_again.len(), 1);
        assert!(staging_again.get("inst-9").is_some());
    }
}
