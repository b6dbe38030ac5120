use std::collections::HashSet;

/// Tombstones for ids whose delete has been issued. An eventually-consistent
/// cloud listing may keep returning a deleted instance for a while; the
/// ledger masks those until they age out of the listing. Entries live for the
/// process lifetime (cloud ids are not reused within a cluster's lifetime);
/// the single exception is restarting a stopped node, which clears its
/// tombstone so it can be listed again.
#[derive(Debug, Default)]
pub struct DeletionLedger {
    ids: HashSet<String>,
}

impl DeletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Re-admits an id. Only used when a stopped instance is restarted by the
    /// stop-and-reuse path.
    pub fn clear(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
