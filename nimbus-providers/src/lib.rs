use async_trait::async_trait;
use nimbus_common::{FloatingIp, Instance};
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::CloudError;

pub type Result<T> = std::result::Result<T, CloudError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
    Start,
    Stop,
}

impl InstanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceAction::Start => "start",
            InstanceAction::Stop => "stop",
        }
    }
}

/// Full creation payload for one instance. Assembled by the orchestrator from
/// the node spec plus the generated name and the configured zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstancePrototype {
    pub name: String,
    pub zone_name: String,
    pub profile_name: String,
    pub image_id: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub key_id: String,
    pub resource_group_id: String,
    pub boot_volume_capacity_gb: u32,
    pub volume_tier_name: String,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub metadata_service: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatingIpPrototype {
    pub name: String,
    pub zone_name: String,
    pub resource_group_id: String,
}

/// Transport-level cloud client, consumed (not designed) by the orchestrator.
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait CloudApiClient: Send + Sync {
    /// Lists instances, following pagination until exhausted. An optional
    /// exact-name filter narrows the result server-side.
    async fn list_instances(&self, name: Option<&str>) -> Result<Vec<Instance>>;

    async fn get_instance(&self, id: &str) -> Result<Instance>;

    async fn create_instance(&self, prototype: &InstancePrototype) -> Result<Instance>;

    async fn delete_instance(&self, id: &str) -> Result<()>;

    /// start/stop, applied asynchronously by the cloud.
    async fn instance_action(&self, id: &str, action: InstanceAction) -> Result<()>;

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>>;

    async fn create_floating_ip(&self, prototype: &FloatingIpPrototype) -> Result<FloatingIp>;

    async fn delete_floating_ip(&self, id: &str) -> Result<()>;

    async fn attach_floating_ip(&self, instance_id: &str, nic_id: &str, ip_id: &str)
        -> Result<()>;

    /// Floating IPs currently bound to one network interface.
    async fn list_nic_floating_ips(&self, instance_id: &str, nic_id: &str)
        -> Result<Vec<FloatingIp>>;
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "vpc")]
pub mod vpc;
