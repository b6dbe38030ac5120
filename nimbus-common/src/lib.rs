use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Tags ---

/// Tag mapping attached to exactly one instance. Ordered so the durable
/// per-cluster file serializes deterministically.
pub type TagSet = BTreeMap<String, String>;

/// Well-known tag keys shared with the external autoscaler.
pub mod tags {
    pub const CLUSTER_NAME: &str = "nimbus-cluster-name";
    pub const NODE_KIND: &str = "nimbus-node-kind";
    pub const NODE_NAME: &str = "nimbus-node-name";
    pub const NODE_STATUS: &str = "nimbus-node-status";
    pub const USER_NODE_TYPE: &str = "nimbus-user-node-type";
    pub const RUNTIME_CONFIG: &str = "nimbus-runtime-config";
    pub const FILE_MOUNTS_CONTENTS: &str = "nimbus-file-mounts-contents";

    pub const STATUS_UP_TO_DATE: &str = "up-to-date";
}

// --- Enums ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Head,
    Worker,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Head => "head",
            NodeKind::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "head" => Some(NodeKind::Head),
            "worker" => Some(NodeKind::Worker),
            _ => None,
        }
    }
}

/// Instance status as reported by the cloud. Observed, never owned: the
/// orchestrator only reads these and must not invent transitions.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Deleting,
    Failed,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Running => "running",
            InstanceStatus::Stopping => "stopping",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Deleting => "deleting",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Unknown => "unknown",
        }
    }
}

/// Statuses the autoscaler treats as alive. Everything else (or an id we no
/// longer know about) counts as terminated.
pub const ACTIVE_STATUSES: [InstanceStatus; 3] = [
    InstanceStatus::Pending,
    InstanceStatus::Starting,
    InstanceStatus::Running,
];

/// Statuses that make a cached instance a restart candidate when the
/// stop-and-reuse policy is enabled.
pub const REUSABLE_STATUSES: [InstanceStatus; 2] =
    [InstanceStatus::Stopped, InstanceStatus::Stopping];

/// Statuses that disqualify a cached tag entry during startup reconciliation.
pub const DEFUNCT_STATUSES: [InstanceStatus; 2] =
    [InstanceStatus::Deleting, InstanceStatus::Failed];

pub fn is_terminated_status(status: InstanceStatus) -> bool {
    !ACTIVE_STATUSES.contains(&status)
}

// --- Entities (mirrored read-only from the cloud) ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IpRef {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkInterface {
    pub id: String,
    #[serde(default)]
    pub primary_ip: Option<IpRef>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FloatingIpTarget {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FloatingIp {
    pub id: String,
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub target: Option<FloatingIpTarget>,
}

impl FloatingIp {
    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    /// Populated by the orchestrator during listing for head-kind nodes;
    /// not part of the raw instance document on every cloud.
    #[serde(default)]
    pub floating_ips: Vec<FloatingIp>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Instance {
    pub fn primary_nic(&self) -> Option<&NetworkInterface> {
        self.network_interfaces.first()
    }

    pub fn primary_ip(&self) -> Option<&str> {
        self.primary_nic()
            .and_then(|nic| nic.primary_ip.as_ref())
            .map(|ip| ip.address.as_str())
    }

    pub fn first_floating_ip(&self) -> Option<&FloatingIp> {
        self.floating_ips.first()
    }
}

// --- Node spec (placement inputs, supplied by the autoscaler config) ---

/// Per-node-type creation parameters. Which VPC/image/profile to use is
/// policy decided upstream; this struct just carries it to the cloud call.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeSpec {
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub image_id: String,
    pub key_id: String,
    pub resource_group_id: String,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub volume_tier_name: Option<String>,
    #[serde(default)]
    pub boot_volume_capacity_gb: Option<u32>,
    /// Pre-allocated address for the head node. Reused only if an existing
    /// floating IP carries this exact address and is unbound.
    #[serde(default)]
    pub head_ip: Option<String>,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub metadata_service: Option<serde_json::Value>,
}
