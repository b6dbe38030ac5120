use crate::{CloudApiClient, CloudError, FloatingIpPrototype, InstanceAction, InstancePrototype};
use async_trait::async_trait;
use nimbus_common::{
    FloatingIp, FloatingIpTarget, Instance, InstanceStatus, IpRef, NetworkInterface,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// In-memory stand-in for the cloud, used by orchestrator tests. Supports the
/// failure modes the orchestrator must recover from: stale listings after a
/// delete, create conflicts, and quota exhaustion.
#[derive(Default)]
pub struct MockCloud {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    instances: HashMap<String, Instance>,
    floating_ips: HashMap<String, FloatingIp>,
    /// Deleted ids still returned by `list_instances` (eventually-consistent
    /// listing emulation). `get_instance` answers NotFound for these.
    ghosts: HashSet<String>,
    stale_listings: bool,
    quota: Option<usize>,
    conflict_on_next_create: bool,
    seq: u32,
    created: u32,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep deleted instances visible in raw listings, as an
    /// eventually-consistent cloud would for a while.
    pub fn enable_stale_listings(&self) {
        self.state.lock().unwrap().stale_listings = true;
    }

    /// Fail creates with QuotaExceeded once this many instances exist.
    pub fn set_quota(&self, max_instances: usize) {
        self.state.lock().unwrap().quota = Some(max_instances);
    }

    /// The next create registers the instance but reports Conflict, as if an
    /// earlier identical request had already succeeded.
    pub fn fail_next_create_with_conflict(&self) {
        self.state.lock().unwrap().conflict_on_next_create = true;
    }

    pub fn set_status(&self, id: &str, status: InstanceStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(instance) = state.instances.get_mut(id) {
            instance.status = status;
        }
    }

    pub fn set_all_status(&self, status: InstanceStatus) {
        let mut state = self.state.lock().unwrap();
        for instance in state.instances.values_mut() {
            instance.status = status;
        }
    }

    pub fn created_count(&self) -> u32 {
        self.state.lock().unwrap().created
    }

    pub fn live_instance_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<String> = state
            .instances
            .keys()
            .filter(|id| !state.ghosts.contains(*id))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn floating_ip_count(&self) -> usize {
        self.state.lock().unwrap().floating_ips.len()
    }

    /// Registers a pre-existing instance, bypassing quota and counters.
    pub fn seed_instance(&self, name: &str, status: InstanceStatus) -> String {
        let mut state = self.state.lock().unwrap();
        let instance = state.new_instance(name, status);
        let id = instance.id.clone();
        state.instances.insert(id.clone(), instance);
        id
    }
}

impl MockState {
    fn new_instance(&mut self, name: &str, status: InstanceStatus) -> Instance {
        self.seq += 1;
        let seq = self.seq;
        Instance {
            id: format!("inst-{seq:04}"),
            name: name.to_string(),
            status,
            network_interfaces: vec![NetworkInterface {
                id: format!("nic-{seq:04}"),
                primary_ip: Some(IpRef {
                    address: format!("10.240.0.{}", seq),
                }),
            }],
            floating_ips: Vec::new(),
            created_at: None,
        }
    }

    fn live_count(&self) -> usize {
        self.instances
            .keys()
            .filter(|id| !self.ghosts.contains(*id))
            .count()
    }
}

#[async_trait]
impl CloudApiClient for MockCloud {
    async fn list_instances(&self, name: Option<&str>) -> crate::Result<Vec<Instance>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .instances
            .values()
            .filter(|i| name.is_none_or(|n| i.name == n))
            .filter(|i| state.stale_listings || !state.ghosts.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn get_instance(&self, id: &str) -> crate::Result<Instance> {
        let state = self.state.lock().unwrap();
        if state.ghosts.contains(id) {
            return Err(CloudError::NotFound);
        }
        state.instances.get(id).cloned().ok_or(CloudError::NotFound)
    }

    async fn create_instance(&self, prototype: &InstancePrototype) -> crate::Result<Instance> {
        let mut state = self.state.lock().unwrap();
        if let Some(quota) = state.quota {
            if state.live_count() >= quota {
                return Err(CloudError::QuotaExceeded(format!(
                    "instance quota of {quota} reached"
                )));
            }
        }
        let conflict = std::mem::take(&mut state.conflict_on_next_create);
        let instance = state.new_instance(&prototype.name, InstanceStatus::Pending);
        state.instances.insert(instance.id.clone(), instance.clone());
        state.created += 1;
        if conflict {
            return Err(CloudError::Conflict(format!(
                "instance with name {} already exists",
                prototype.name
            )));
        }
        Ok(instance)
    }

    async fn delete_instance(&self, id: &str) -> crate::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.instances.contains_key(id) || state.ghosts.contains(id) {
            return Err(CloudError::NotFound);
        }
        if state.stale_listings {
            state.ghosts.insert(id.to_string());
            if let Some(instance) = state.instances.get_mut(id) {
                instance.status = InstanceStatus::Deleting;
            }
        } else {
            state.instances.remove(id);
        }
        Ok(())
    }

    async fn instance_action(&self, id: &str, action: InstanceAction) -> crate::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.ghosts.contains(id) {
            return Err(CloudError::NotFound);
        }
        let instance = state.instances.get_mut(id).ok_or(CloudError::NotFound)?;
        instance.status = match action {
            InstanceAction::Start => InstanceStatus::Starting,
            InstanceAction::Stop => InstanceStatus::Stopped,
        };
        Ok(())
    }

    async fn list_floating_ips(&self) -> crate::Result<Vec<FloatingIp>> {
        let state = self.state.lock().unwrap();
        Ok(state.floating_ips.values().cloned().collect())
    }

    async fn create_floating_ip(
        &self,
        prototype: &FloatingIpPrototype,
    ) -> crate::Result<FloatingIp> {
        let mut state = self.state.lock().unwrap();
        let seq = state.floating_ips.len() + 1;
        let fip = FloatingIp {
            id: format!("fip-{seq:04}"),
            address: format!("198.51.100.{seq}"),
            name: prototype.name.clone(),
            target: None,
        };
        state.floating_ips.insert(fip.id.clone(), fip.clone());
        Ok(fip)
    }

    async fn delete_floating_ip(&self, id: &str) -> crate::Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .floating_ips
            .remove(id)
            .map(|_| ())
            .ok_or(CloudError::NotFound)
    }

    async fn attach_floating_ip(
        &self,
        instance_id: &str,
        nic_id: &str,
        ip_id: &str,
    ) -> crate::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.instances.contains_key(instance_id) {
            return Err(CloudError::NotFound);
        }
        let fip = state.floating_ips.get_mut(ip_id).ok_or(CloudError::NotFound)?;
        fip.target = Some(FloatingIpTarget {
            id: nic_id.to_string(),
        });
        Ok(())
    }

    async fn list_nic_floating_ips(
        &self,
        _instance_id: &str,
        nic_id: &str,
    ) -> crate::Result<Vec<FloatingIp>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .floating_ips
            .values()
            .filter(|fip| fip.target.as_ref().is_some_and(|t| t.id == nic_id))
            .cloned()
            .collect())
    }
}
