use crate::bootstrap;
use crate::directory::InstanceDirectory;
use crate::errors::NodeError;
use crate::floating_ip;
use crate::ledger::DeletionLedger;
use crate::naming;
use crate::pending::{PendingTracker, PendingVerdict};
use crate::settings::Settings;
use crate::tag_store::TagStore;
use anyhow::{anyhow, Result};
use futures_util::future::join_all;
use nimbus_common::{
    is_terminated_status, tags, FloatingIp, Instance, InstanceStatus, NodeKind, NodeSpec, TagSet,
    ACTIVE_STATUSES, DEFUNCT_STATUSES, REUSABLE_STATUSES,
};
use nimbus_providers::{CloudApiClient, CloudError, InstanceAction, InstancePrototype};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const PROFILE_NAME_DEFAULT: &str = "cx2-2x4";
const VOLUME_TIER_NAME_DEFAULT: &str = "general-purpose";
const BOOT_VOLUME_CAPACITY_DEFAULT_GB: u32 = 100;

const TAGGING_ATTEMPTS: u32 = 3;
const TAGGING_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Everything the single mutex protects: the in-memory tag map, the pending
/// map, the deletion ledger, the instance directory, and (through
/// `TagStore::save`) the durable tag file.
struct CacheState {
    tags: TagStore,
    directory: InstanceDirectory,
    pending: PendingTracker,
    ledger: DeletionLedger,
}

struct Inner {
    settings: Settings,
    cloud: Arc<dyn CloudApiClient>,
    state: Mutex<CacheState>,
}

/// Public operation surface consumed by the external autoscaler. Safe under
/// concurrent invocation of any operation. Runs no background loop itself;
/// polling cadence belongs to the caller, and the pending-timeout check only
/// acts during a listing pass.
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    inner: Arc<Inner>,
}

impl LifecycleOrchestrator {
    /// Builds the orchestrator and reconciles the durable tag store against
    /// live instance existence. On a host whose durable file does not exist
    /// yet and whose hostname matches the head naming convention, the store
    /// is seeded with the head tag set instead.
    pub async fn new(settings: Settings, cloud: Arc<dyn CloudApiClient>) -> Result<Self> {
        info!(cluster = %settings.cluster_name, "initializing node lifecycle orchestrator");
        let mut store = TagStore::new(&settings.cluster_name, settings.tags_path.clone());
        let had_durable_file = store.load()?;

        let orchestrator = Self {
            inner: Arc::new(Inner {
                settings,
                cloud,
                state: Mutex::new(CacheState {
                    tags: store,
                    directory: InstanceDirectory::new(),
                    pending: PendingTracker::new(),
                    ledger: DeletionLedger::new(),
                }),
            }),
        };

        if had_durable_file {
            orchestrator.reconcile_loaded_tags().await?;
        } else {
            orchestrator.seed_head_tags().await?;
        }
        Ok(orchestrator)
    }

    /// Drops cached tag entries whose instance is gone or in a terminal
    /// failure state, then persists the filtered store.
    async fn reconcile_loaded_tags(&self) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        let cached_ids: Vec<String> = state.tags.ids().cloned().collect();
        for id in cached_ids {
            match inner.cloud.get_instance(&id).await {
                Ok(instance) if !DEFUNCT_STATUSES.contains(&instance.status) => {}
                Ok(instance) => {
                    warn!(%id, status = instance.status.as_str(), "cached instance is defunct, dropping from tag store");
                    state.tags.remove(&id);
                }
                Err(CloudError::NotFound) => {
                    warn!(%id, "cached instance no longer exists, dropping from tag store");
                    state.tags.remove(&id);
                }
                Err(err) => return Err(err.into()),
            }
        }
        state.tags.save()?;
        debug!(entries = state.tags.len(), "tag store reconciled");
        Ok(())
    }

    /// First boot of a cluster on this host: if we are the head node, seed
    /// the store with head tags derived from the local bootstrap config.
    async fn seed_head_tags(&self) -> Result<()> {
        let inner = &self.inner;
        let Some(local_name) = inner.settings.local_node_name() else {
            debug!("local node name unavailable, skipping head tag seeding");
            return Ok(());
        };
        if naming::kind_from_name(&inner.settings.cluster_name, &local_name)
            != Some(NodeKind::Head)
        {
            return Ok(());
        }

        let listed = inner.cloud.list_instances(Some(&local_name)).await?;
        let Some(instance) = listed.first() else {
            debug!(%local_name, "local head name not found in the cloud, skipping seeding");
            return Ok(());
        };

        if !inner.settings.bootstrap_config_path.is_file() {
            warn!(
                path = %inner.settings.bootstrap_config_path.display(),
                "bootstrap config missing, head tags not seeded"
            );
            return Ok(());
        }
        let config = bootstrap::read_bootstrap_config(&inner.settings.bootstrap_config_path)?;
        let head_tags =
            bootstrap::head_node_tags(&inner.settings.cluster_name, &local_name, &config);

        info!(id = %instance.id, %local_name, "seeding head node tags");
        let mut state = inner.state.lock().await;
        state.tags.merge(&instance.id, head_tags);
        state.tags.save()
    }

    /// Returns the ids of non-terminated nodes matching the tag filters,
    /// refreshing the instance directory as a side effect. Tombstoned ids are
    /// masked, hung pending instances are deleted, and head nodes without a
    /// bound floating IP are withheld until the address shows up.
    pub async fn non_terminated_nodes(&self, tag_filters: &TagSet) -> Result<Vec<String>> {
        debug!(?tag_filters, "listing non-terminated nodes");
        let mut state = self.inner.state.lock().await;
        let ids = self.refresh_locked(&mut state, tag_filters).await?;
        debug!(count = ids.len(), "listing pass complete");
        Ok(ids)
    }

    async fn refresh_locked(
        &self,
        state: &mut CacheState,
        tag_filters: &TagSet,
    ) -> Result<Vec<String>> {
        let inner = &self.inner;
        let candidates = self.matching_nodes_locked(state, tag_filters).await?;

        let mut surviving = Vec::new();
        for mut node in candidates {
            if state.ledger.contains(&node.id) {
                debug!(id = %node.id, "scheduled for delete, masking from listing");
                continue;
            }
            if !ACTIVE_STATUSES.contains(&node.status) {
                debug!(id = %node.id, status = node.status.as_str(), "not in an active status, skipping");
                continue;
            }

            if state.pending.check(&node.id, node.status, inner.settings.pending_timeout)
                == PendingVerdict::Hung
            {
                error!(
                    id = %node.id,
                    timeout_secs = inner.settings.pending_timeout.as_secs(),
                    "pending timeout reached, deleting instance"
                );
                // A hung node is never trusted enough to keep around, even
                // when the stop-and-reuse policy is on.
                hard_delete_locked(inner, state, &node.id).await?;
                continue;
            }

            if naming::kind_from_name(&inner.settings.cluster_name, &node.name)
                == Some(NodeKind::Head)
            {
                let Some(nic) = node.primary_nic() else {
                    warn!(id = %node.id, "head node has no network interface yet, skipping");
                    continue;
                };
                let bound = inner.cloud.list_nic_floating_ips(&node.id, &nic.id).await?;
                if bound.is_empty() {
                    // A head node must be externally reachable before the
                    // autoscaler may see it.
                    debug!(id = %node.id, "head node missing its floating ip, withholding");
                    continue;
                }
                node.floating_ips = bound;
            }

            state.directory.insert(node.clone());
            surviving.push(node.id);
        }
        Ok(surviving)
    }

    /// Raw candidates for a listing pass. An empty or kind-only filter goes
    /// through the cloud listing (and adopts instances this process has never
    /// tagged); richer filters are answered from the tag store.
    async fn matching_nodes_locked(
        &self,
        state: &mut CacheState,
        tag_filters: &TagSet,
    ) -> Result<Vec<Instance>> {
        let inner = &self.inner;
        let cluster_name = &inner.settings.cluster_name;
        let kind_only = tag_filters.is_empty()
            || (tag_filters.len() == 1 && tag_filters.contains_key(tags::NODE_KIND));

        if kind_only {
            let wanted_kind = tag_filters
                .get(tags::NODE_KIND)
                .and_then(|v| NodeKind::parse(v));
            let mut nodes = Vec::new();
            for instance in inner.cloud.list_instances(None).await? {
                let Some(kind) = naming::kind_from_name(cluster_name, &instance.name) else {
                    continue;
                };
                if state.ledger.contains(&instance.id) {
                    continue;
                }
                if wanted_kind.is_some_and(|wanted| wanted != kind) {
                    continue;
                }
                let mut seeded = TagSet::new();
                seeded.insert(tags::CLUSTER_NAME.to_string(), cluster_name.clone());
                seeded.insert(tags::NODE_KIND.to_string(), kind.as_str().to_string());
                state.tags.merge(&instance.id, seeded);
                nodes.push(instance);
            }
            Ok(nodes)
        } else {
            let matching_ids: Vec<String> = state
                .tags
                .entries()
                .filter(|(_, node_tags)| {
                    tag_filters
                        .iter()
                        .all(|(key, value)| node_tags.get(key) == Some(value))
                })
                .map(|(id, _)| id.clone())
                .collect();

            let mut nodes = Vec::new();
            for id in matching_ids {
                match inner.cloud.get_instance(&id).await {
                    Ok(instance) => nodes.push(instance),
                    Err(CloudError::NotFound) => {
                        warn!(%id, "tagged instance no longer exists, skipping");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Ok(nodes)
        }
    }

    /// Refresh and get info for this node, updating the directory.
    async fn refresh_node(&self, node_id: &str) -> Result<Instance> {
        let mut state = self.inner.state.lock().await;
        self.refresh_locked(&mut state, &TagSet::new()).await?;
        if let Some(node) = state.directory.get(node_id) {
            return Ok(node.clone());
        }
        let instance = self.inner.cloud.get_instance(node_id).await?;
        state.directory.insert(instance.clone());
        Ok(instance)
    }

    /// Directory lookup, falling back to one forced refresh.
    async fn cached_node(&self, node_id: &str) -> Result<Instance> {
        {
            let state = self.inner.state.lock().await;
            if let Some(node) = state.directory.get(node_id) {
                return Ok(node.clone());
            }
        }
        self.refresh_node(node_id).await
    }

    pub async fn is_running(&self, node_id: &str) -> bool {
        match self.cached_node(node_id).await {
            Ok(node) => node.status == InstanceStatus::Running,
            Err(_) => false,
        }
    }

    /// Conservative: an id we cannot resolve anymore counts as terminated.
    pub async fn is_terminated(&self, node_id: &str) -> bool {
        match self.cached_node(node_id).await {
            Ok(node) => is_terminated_status(node.status),
            Err(_) => true,
        }
    }

    /// Cached tag mapping for the node; empty if unknown. Never fails.
    pub async fn node_tags(&self, node_id: &str) -> TagSet {
        let state = self.inner.state.lock().await;
        state.tags.get(node_id).cloned().unwrap_or_default()
    }

    /// Private address of the node's primary interface.
    pub async fn internal_ip(&self, node_id: &str) -> Result<Option<String>> {
        if let Ok(node) = self.cached_node(node_id).await {
            if let Some(ip) = node.primary_ip() {
                return Ok(Some(ip.to_string()));
            }
        }
        match self.refresh_node(node_id).await {
            Ok(node) => Ok(node.primary_ip().map(String::from)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Externally reachable address. Under the hybrid-IP policy workers
    /// answer with their private address and only head nodes resolve a
    /// floating IP.
    pub async fn external_ip(&self, node_id: &str) -> Result<Option<String>> {
        debug!(%node_id, "resolving external ip");
        if self.inner.settings.use_hybrid_ips {
            return self.hybrid_ip(node_id).await;
        }
        self.floating_address(node_id).await
    }

    async fn hybrid_ip(&self, node_id: &str) -> Result<Option<String>> {
        let node = match self.cached_node(node_id).await {
            Ok(node) => node,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(err),
        };
        match naming::kind_from_name(&self.inner.settings.cluster_name, &node.name) {
            Some(NodeKind::Head) => self.floating_address(node_id).await,
            _ => self.internal_ip(node_id).await,
        }
    }

    async fn floating_address(&self, node_id: &str) -> Result<Option<String>> {
        if let Ok(node) = self.cached_node(node_id).await {
            if let Some(fip) = node.first_floating_ip() {
                return Ok(Some(fip.address.clone()));
            }
        }
        match self.refresh_node(node_id).await {
            Ok(node) => Ok(node.first_floating_ip().map(|fip| fip.address.clone())),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Merges tags for one node and persists the whole store. Calling with
    /// `None, None` flushes the in-memory store to durable storage without
    /// mutating it (used by startup reconciliation).
    pub async fn set_node_tags(
        &self,
        node_id: Option<&str>,
        node_tags: Option<TagSet>,
    ) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if let (Some(id), Some(node_tags)) = (node_id, node_tags) {
            debug!(%id, ?node_tags, "setting node tags");
            state.tags.merge(id, node_tags);
        }
        state.tags.save()
    }

    /// Acquires `count` nodes: restarts matching stopped instances first when
    /// the stop-and-reuse policy is enabled, then fans independent creation
    /// tasks across a worker pool sized to the remainder. Individual failures
    /// do not cancel siblings; the first failure is surfaced once the whole
    /// batch has completed.
    pub async fn create_nodes(
        &self,
        spec: &NodeSpec,
        node_tags: TagSet,
        count: usize,
    ) -> Result<HashMap<String, Instance>> {
        info!(count, ?node_tags, "create nodes requested");
        let mut acquired: HashMap<String, Instance> = HashMap::new();
        let mut remaining = count;

        if self.inner.settings.cache_stopped_nodes && remaining > 0 {
            let reused = self.restart_stopped_nodes(&node_tags, remaining).await?;
            if !reused.is_empty() {
                info!(
                    ids = ?reused.keys().collect::<Vec<_>>(),
                    "reusing stopped nodes; disable with cache_stopped_nodes=false"
                );
            }
            remaining -= reused.len();
            acquired.extend(reused);
        }

        if remaining > 0 {
            let mut handles = Vec::with_capacity(remaining);
            for _ in 0..remaining {
                let inner = Arc::clone(&self.inner);
                let spec = spec.clone();
                let node_tags = node_tags.clone();
                handles.push(tokio::spawn(create_one_node(inner, spec, node_tags)));
            }

            let mut first_error: Option<anyhow::Error> = None;
            for joined in join_all(handles).await {
                match joined {
                    Ok(Ok((id, instance))) => {
                        acquired.insert(id, instance);
                    }
                    Ok(Err(err)) => {
                        error!(%err, "node creation failed");
                        first_error.get_or_insert(err);
                    }
                    Err(join_err) => {
                        first_error.get_or_insert(join_err.into());
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        Ok(acquired)
    }

    /// Restarts up to `limit` stopped instances whose cached tags match the
    /// requested cluster and kind, re-tagging them and clearing any
    /// tombstones so they can be listed again.
    async fn restart_stopped_nodes(
        &self,
        node_tags: &TagSet,
        limit: usize,
    ) -> Result<HashMap<String, Instance>> {
        let inner = &self.inner;
        let Some(kind) = node_tags.get(tags::NODE_KIND) else {
            return Ok(HashMap::new());
        };

        let candidate_ids: Vec<String> = {
            let state = inner.state.lock().await;
            state
                .tags
                .entries()
                .filter(|(_, cached)| {
                    cached.get(tags::CLUSTER_NAME) == Some(&inner.settings.cluster_name)
                        && cached.get(tags::NODE_KIND) == Some(kind)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut reused = HashMap::new();
        for id in candidate_ids {
            if reused.len() >= limit {
                break;
            }
            let instance = match inner.cloud.get_instance(&id).await {
                Ok(instance) => instance,
                Err(CloudError::NotFound) => continue,
                Err(err) => return Err(err.into()),
            };
            if !REUSABLE_STATUSES.contains(&instance.status) {
                continue;
            }

            info!(%id, "restarting stopped instance");
            inner.cloud.instance_action(&id, InstanceAction::Start).await?;

            let mut state = inner.state.lock().await;
            state.tags.merge(&id, node_tags.clone());
            state.ledger.clear(&id);
            state.tags.save()?;
            drop(state);

            reused.insert(id, instance);
        }
        Ok(reused)
    }

    /// Stops the node when the stop-and-reuse policy is enabled, otherwise
    /// hard-deletes it. Idempotent either way.
    pub async fn terminate_node(&self, node_id: &str) -> Result<()> {
        terminate_one(&self.inner, node_id).await
    }

    /// Batch terminate: one worker per id, all awaited, first failure
    /// re-raised after every worker has finished.
    pub async fn terminate_nodes(&self, node_ids: &[String]) -> Result<()> {
        if node_ids.is_empty() {
            return Ok(());
        }
        let mut handles = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let inner = Arc::clone(&self.inner);
            let node_id = node_id.clone();
            handles.push(tokio::spawn(async move {
                terminate_one(&inner, &node_id).await
            }));
        }

        let mut first_error: Option<anyhow::Error> = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(%err, "node termination failed");
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    first_error.get_or_insert(join_err.into());
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn terminate_one(inner: &Inner, node_id: &str) -> Result<()> {
    info!(%node_id, "terminate node");
    if inner.settings.cache_stopped_nodes {
        info!(%node_id, "stopping instance instead of deleting; disable with cache_stopped_nodes=false");
        match inner.cloud.instance_action(node_id, InstanceAction::Stop).await {
            Ok(()) | Err(CloudError::NotFound) => Ok(()),
            Err(err) => Err(err.into()),
        }
    } else {
        let mut state = inner.state.lock().await;
        hard_delete_locked(inner, &mut state, node_id).await
    }
}

/// Deletes the instance and everything we remember about it: tombstones the
/// id, purges tag/pending/directory entries, rewrites the durable store, and
/// releases disposable floating IPs. NotFound at any step means the work was
/// already done.
async fn hard_delete_locked(inner: &Inner, state: &mut CacheState, node_id: &str) -> Result<()> {
    debug!(%node_id, "hard deleting instance");

    // Capture floating IPs before the instance document disappears.
    let floating_ips: Vec<FloatingIp> = match state.directory.get(node_id) {
        Some(node) => node.floating_ips.clone(),
        None => match inner.cloud.get_instance(node_id).await {
            Ok(node) => match node.primary_nic() {
                Some(nic) => inner
                    .cloud
                    .list_nic_floating_ips(&node.id, &nic.id)
                    .await
                    .unwrap_or_default(),
                None => Vec::new(),
            },
            Err(_) => Vec::new(),
        },
    };

    match inner.cloud.delete_instance(node_id).await {
        Ok(()) | Err(CloudError::NotFound) => {}
        Err(err) => return Err(err.into()),
    }

    state.tags.remove(node_id);
    state.pending.remove(node_id);
    state.directory.remove(node_id);
    state.ledger.record(node_id);
    state.tags.save()?;

    floating_ip::release_disposable(inner.cloud.as_ref(), &floating_ips).await;
    info!(%node_id, "instance deleted");
    Ok(())
}

/// One worker of the creation pool: validate and generate the name, create
/// the instance (adopting a pre-existing one on Conflict), register it as
/// pending, persist the seeded tags, and bind a floating IP for head nodes.
async fn create_one_node(
    inner: Arc<Inner>,
    spec: NodeSpec,
    mut node_tags: TagSet,
) -> Result<(String, Instance)> {
    let settings = &inner.settings;
    let kind = node_tags
        .get(tags::NODE_KIND)
        .and_then(|v| NodeKind::parse(v))
        .unwrap_or(NodeKind::Worker);
    let user_tag = node_tags
        .get(tags::NODE_NAME)
        .cloned()
        .unwrap_or_else(|| "default".to_string());

    // Rejected before any cloud call.
    let name = naming::generate(&settings.cluster_name, kind, &user_tag)?;

    let prototype = build_prototype(settings, &spec, &name);
    let instance = match inner.cloud.create_instance(&prototype).await {
        Ok(instance) => instance,
        Err(CloudError::Conflict(message)) => {
            warn!(%name, %message, "instance already exists, adopting it");
            fetch_by_name(inner.cloud.as_ref(), &name).await?
        }
        Err(CloudError::QuotaExceeded(message)) => {
            error!(%name, %message, "instance creation failed due to quota limit");
            return Err(CloudError::QuotaExceeded(message).into());
        }
        Err(err) => {
            error!(%name, %err, "instance creation failed");
            return Err(err.into());
        }
    };
    info!(id = %instance.id, %name, "instance created");

    node_tags.insert(tags::CLUSTER_NAME.to_string(), settings.cluster_name.clone());
    node_tags.insert(tags::NODE_KIND.to_string(), kind.as_str().to_string());
    node_tags.insert(tags::NODE_NAME.to_string(), name.clone());

    // Record creation time (used to discover hung nodes) and persist the
    // seeded tags. An instance we cannot tag would be unreachable by every
    // future listing, so persistent failure deletes it again.
    let mut saved = false;
    for attempt in 1..=TAGGING_ATTEMPTS {
        let result = {
            let mut state = inner.state.lock().await;
            if attempt == 1 {
                state.pending.record(&instance.id);
                state.tags.merge(&instance.id, node_tags.clone());
            }
            state.tags.save()
        };
        match result {
            Ok(()) => {
                saved = true;
                break;
            }
            Err(err) => {
                warn!(id = %instance.id, attempt, %err, "persisting seeded tags failed");
                if attempt < TAGGING_ATTEMPTS {
                    tokio::time::sleep(TAGGING_RETRY_DELAY).await;
                }
            }
        }
    }
    if !saved {
        error!(id = %instance.id, "tag persistence kept failing, deleting orphaned instance");
        let mut state = inner.state.lock().await;
        if let Err(err) = hard_delete_locked(&inner, &mut state, &instance.id).await {
            warn!(id = %instance.id, %err, "cleanup of untagged instance failed");
        }
        return Err(NodeError::TaggingFailed {
            id: instance.id.clone(),
            attempts: TAGGING_ATTEMPTS,
        }
        .into());
    }

    if kind == NodeKind::Head {
        let fip = floating_ip::provision(inner.cloud.as_ref(), &spec, &settings.zone_name).await?;
        floating_ip::attach(inner.cloud.as_ref(), &instance, &fip).await?;
    }

    Ok((instance.id.clone(), instance))
}

async fn fetch_by_name(cloud: &dyn CloudApiClient, name: &str) -> Result<Instance> {
    let listed = cloud.list_instances(Some(name)).await?;
    listed
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("instance {name} reported as existing but not listed"))
}

fn build_prototype(settings: &Settings, spec: &NodeSpec, name: &str) -> InstancePrototype {
    InstancePrototype {
        name: name.to_string(),
        zone_name: settings.zone_name.clone(),
        profile_name: spec
            .profile_name
            .clone()
            .unwrap_or_else(|| PROFILE_NAME_DEFAULT.to_string()),
        image_id: spec.image_id.clone(),
        vpc_id: spec.vpc_id.clone(),
        subnet_id: spec.subnet_id.clone(),
        security_group_id: spec.security_group_id.clone(),
        key_id: spec.key_id.clone(),
        resource_group_id: spec.resource_group_id.clone(),
        boot_volume_capacity_gb: spec
            .boot_volume_capacity_gb
            .unwrap_or(BOOT_VOLUME_CAPACITY_DEFAULT_GB),
        volume_tier_name: spec
            .volume_tier_name
            .clone()
            .unwrap_or_else(|| VOLUME_TIER_NAME_DEFAULT.to_string()),
        user_data: spec.user_data.clone(),
        metadata_service: spec.metadata_service.clone(),
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CloudError>()
        .is_some_and(CloudError::is_not_found)
}
