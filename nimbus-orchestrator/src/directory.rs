use nimbus_common::Instance;
use std::collections::HashMap;

/// Cache of the most recently observed raw instance records, keyed by id.
/// Refreshed wholesale per id on every successful listing pass; reads between
/// refreshes serve the last observation.
#[derive(Debug, Default)]
pub struct InstanceDirectory {
    nodes: HashMap<String, Instance>,
}

impl InstanceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Overwrites the record for this id with the latest observation.
    pub fn insert(&mut self, instance: Instance) {
        self.nodes.insert(instance.id.clone(), instance);
    }

    pub fn remove(&mut self, id: &str) -> Option<Instance> {
        self.nodes.remove(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
