use nimbus_common::{tags, InstanceStatus, NodeSpec, TagSet};
use nimbus_orchestrator::{LifecycleOrchestrator, NodeError, Settings};
use nimbus_providers::mock::MockCloud;
use nimbus_providers::CloudApiClient;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::new("dev", "us-south-1");
    settings.cache_stopped_nodes = false;
    settings.tags_path = dir.path().join("tags.json");
    settings.bootstrap_config_path = dir.path().join("bootstrap.json");
    settings.node_name = Some("test-host".to_string());
    settings
}

fn node_spec() -> NodeSpec {
    NodeSpec {
        vpc_id: "vpc-1".into(),
        subnet_id: "subnet-1".into(),
        security_group_id: "sg-1".into(),
        image_id: "image-1".into(),
        key_id: "key-1".into(),
        resource_group_id: "rg-1".into(),
        profile_name: None,
        volume_tier_name: None,
        boot_volume_capacity_gb: None,
        head_ip: None,
        user_data: None,
        metadata_service: None,
    }
}

fn kind_tags(kind: &str) -> TagSet {
    let mut t = TagSet::new();
    t.insert(tags::NODE_KIND.to_string(), kind.to_string());
    t
}

async fn orchestrator(
    settings: Settings,
    cloud: &Arc<MockCloud>,
) -> LifecycleOrchestrator {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    LifecycleOrchestrator::new(settings, cloud.clone())
        .await
        .expect("orchestrator init")
}

#[tokio::test]
async fn created_nodes_follow_the_naming_convention() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 2)
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    for instance in created.values() {
        let suffix = instance
            .name
            .strip_prefix("dev-worker-default-")
            .unwrap_or_else(|| panic!("unexpected name {}", instance.name));
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(instance.name.len() <= 64);
    }
}

#[tokio::test]
async fn invalid_cluster_name_fails_before_any_cloud_call() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let mut settings = test_settings(&dir);
    settings.cluster_name = "Bad_Cluster".to_string();
    let orch = orchestrator(settings, &cloud).await;

    let result = orch.create_nodes(&node_spec(), kind_tags("worker"), 1).await;
    assert!(result.is_err());
    assert_eq!(cloud.created_count(), 0);
}

#[tokio::test]
async fn reuse_disabled_always_creates_fresh_instances() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_instance("dev-worker-default-aaaaaaaa", InstanceStatus::Stopped);
    cloud.seed_instance("dev-worker-default-bbbbbbbb", InstanceStatus::Stopped);
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 3)
        .await
        .unwrap();

    assert_eq!(created.len(), 3);
    assert_eq!(cloud.created_count(), 3);
}

#[tokio::test]
async fn reuse_enabled_restarts_stopped_instances_first() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let stopped_a = cloud.seed_instance("dev-worker-default-aaaaaaaa", InstanceStatus::Stopped);
    let stopped_b = cloud.seed_instance("dev-worker-default-bbbbbbbb", InstanceStatus::Stopped);

    let mut settings = test_settings(&dir);
    settings.cache_stopped_nodes = true;
    let orch = orchestrator(settings, &cloud).await;

    // The stopped instances must be known to the tag store to be candidates.
    for id in [&stopped_a, &stopped_b] {
        let mut cached = kind_tags("worker");
        cached.insert(tags::CLUSTER_NAME.to_string(), "dev".to_string());
        orch.set_node_tags(Some(id), Some(cached)).await.unwrap();
    }

    let acquired = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 2)
        .await
        .unwrap();

    assert_eq!(acquired.len(), 2);
    assert!(acquired.contains_key(&stopped_a));
    assert!(acquired.contains_key(&stopped_b));
    assert_eq!(cloud.created_count(), 0);

    // Both candidates are starting now, so the next request falls through to
    // an actual create.
    let more = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap();
    assert_eq!(more.len(), 1);
    assert_eq!(cloud.created_count(), 1);
}

#[tokio::test]
async fn hung_pending_instances_are_evicted_during_listing() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let mut settings = test_settings(&dir);
    // Zero timeout makes any instance that is not yet running overdue.
    settings.pending_timeout = Duration::ZERO;
    let orch = orchestrator(settings, &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap();
    assert_eq!(created.len(), 1);

    let listed = orch.non_terminated_nodes(&TagSet::new()).await.unwrap();
    assert!(listed.is_empty());
    assert!(cloud.live_instance_ids().is_empty());
}

#[tokio::test]
async fn pending_instances_that_reach_running_stay_listed() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap();
    let id = created.keys().next().unwrap().clone();

    cloud.set_status(&id, InstanceStatus::Running);
    let listed = orch.non_terminated_nodes(&TagSet::new()).await.unwrap();
    assert_eq!(listed, vec![id.clone()]);
    assert!(orch.is_running(&id).await);
    assert!(!orch.is_terminated(&id).await);
}

#[tokio::test]
async fn terminate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap();
    let id = created.keys().next().unwrap().clone();

    orch.terminate_node(&id).await.unwrap();
    orch.terminate_node(&id).await.unwrap();

    assert!(orch.is_terminated(&id).await);
    assert!(cloud.live_instance_ids().is_empty());
}

#[tokio::test]
async fn terminate_stops_instead_of_deleting_when_reuse_is_enabled() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let mut settings = test_settings(&dir);
    settings.cache_stopped_nodes = true;
    let orch = orchestrator(settings, &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap();
    let id = created.keys().next().unwrap().clone();

    orch.terminate_node(&id).await.unwrap();

    // Instance survives, stopped, and no longer counts as alive.
    assert_eq!(cloud.live_instance_ids(), vec![id.clone()]);
    assert!(orch.is_terminated(&id).await);
    assert!(orch.non_terminated_nodes(&TagSet::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn tombstones_mask_stale_cloud_listings() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    cloud.enable_stale_listings();
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap();
    let id = created.keys().next().unwrap().clone();
    assert_eq!(
        orch.non_terminated_nodes(&TagSet::new()).await.unwrap(),
        vec![id.clone()]
    );

    orch.terminate_node(&id).await.unwrap();

    // The raw listing still returns the deleted instance; the orchestrator
    // must never surface it again.
    for _ in 0..3 {
        assert!(orch.non_terminated_nodes(&TagSet::new()).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn tags_survive_restart_but_dead_instances_are_dropped() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let settings = test_settings(&dir);

    let (live, dead) = {
        let orch = orchestrator(settings.clone(), &cloud).await;
        let created = orch
            .create_nodes(&node_spec(), kind_tags("worker"), 2)
            .await
            .unwrap();
        let mut ids: Vec<String> = created.keys().cloned().collect();
        ids.sort();
        (ids[0].clone(), ids[1].clone())
    };

    // One instance dies behind the orchestrator's back.
    cloud.delete_instance(&dead).await.unwrap();

    let restarted = orchestrator(settings, &cloud).await;
    let live_tags = restarted.node_tags(&live).await;
    assert_eq!(live_tags.get(tags::CLUSTER_NAME).unwrap(), "dev");
    assert_eq!(live_tags.get(tags::NODE_KIND).unwrap(), "worker");
    assert!(restarted.node_tags(&dead).await.is_empty());
}

#[tokio::test]
async fn head_nodes_get_a_floating_ip_and_a_stable_external_address() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("head"), 1)
        .await
        .unwrap();
    let id = created.keys().next().unwrap().clone();
    assert_eq!(cloud.floating_ip_count(), 1);

    let listed = orch.non_terminated_nodes(&TagSet::new()).await.unwrap();
    assert_eq!(listed, vec![id.clone()]);

    let first = orch.external_ip(&id).await.unwrap();
    let second = orch.external_ip(&id).await.unwrap();
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn head_nodes_without_a_floating_ip_are_withheld_from_listings() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_instance("dev-head-default-aaaaaaaa", InstanceStatus::Running);
    let worker = cloud.seed_instance("dev-worker-default-bbbbbbbb", InstanceStatus::Running);
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let listed = orch.non_terminated_nodes(&TagSet::new()).await.unwrap();
    assert_eq!(listed, vec![worker]);
}

#[tokio::test]
async fn configured_head_ip_is_reused_and_never_released() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let reserved = cloud
        .create_floating_ip(&nimbus_providers::FloatingIpPrototype {
            name: "office-gateway".into(),
            zone_name: "us-south-1".into(),
            resource_group_id: "rg-1".into(),
        })
        .await
        .unwrap();
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let mut spec = node_spec();
    spec.head_ip = Some(reserved.address.clone());
    let created = orch
        .create_nodes(&spec, kind_tags("head"), 1)
        .await
        .unwrap();
    let id = created.keys().next().unwrap().clone();

    // No new address was allocated.
    assert_eq!(cloud.floating_ip_count(), 1);
    assert_eq!(
        orch.external_ip(&id).await.unwrap(),
        Some(reserved.address)
    );

    // A user-supplied address must survive the node it was bound to.
    orch.terminate_node(&id).await.unwrap();
    assert_eq!(cloud.floating_ip_count(), 1);
}

#[tokio::test]
async fn disposable_floating_ips_are_released_with_their_head_node() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("head"), 1)
        .await
        .unwrap();
    let id = created.keys().next().unwrap().clone();
    orch.non_terminated_nodes(&TagSet::new()).await.unwrap();
    assert_eq!(cloud.floating_ip_count(), 1);

    orch.terminate_node(&id).await.unwrap();
    assert_eq!(cloud.floating_ip_count(), 0);
}

#[tokio::test]
async fn quota_failure_does_not_abort_sibling_creations() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    cloud.set_quota(1);
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let result = orch.create_nodes(&node_spec(), kind_tags("worker"), 2).await;
    assert!(result.is_err());

    // The sibling that fit under the quota still exists and is listed.
    assert_eq!(cloud.created_count(), 1);
    let listed = orch.non_terminated_nodes(&TagSet::new()).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn create_conflict_adopts_the_existing_instance() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    cloud.fail_next_create_with_conflict();
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(cloud.created_count(), 1);
    assert_eq!(
        orch.non_terminated_nodes(&TagSet::new()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn tagging_failure_deletes_the_orphaned_instance() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let mut settings = test_settings(&dir);
    // A missing parent directory makes every tag-store write fail, so the
    // retries are exhausted and the just-created instance must be removed.
    settings.tags_path = dir.path().join("missing").join("tags.json");
    let orch = orchestrator(settings, &cloud).await;

    let err = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NodeError>(),
        Some(NodeError::TaggingFailed { .. })
    ));

    // The create itself went through, then the orphan was cleaned up.
    assert_eq!(cloud.created_count(), 1);
    assert!(cloud.live_instance_ids().is_empty());
}

#[tokio::test]
async fn unknown_ids_count_as_terminated() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    assert!(orch.is_terminated("inst-nope").await);
    assert!(!orch.is_running("inst-nope").await);
    assert!(orch.node_tags("inst-nope").await.is_empty());
    assert_eq!(orch.external_ip("inst-nope").await.unwrap(), None);
    assert_eq!(orch.internal_ip("inst-nope").await.unwrap(), None);
}

#[tokio::test]
async fn hybrid_policy_resolves_workers_to_their_private_address() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let mut settings = test_settings(&dir);
    settings.use_hybrid_ips = true;
    let orch = orchestrator(settings, &cloud).await;

    let head = orch
        .create_nodes(&node_spec(), kind_tags("head"), 1)
        .await
        .unwrap();
    let worker = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 1)
        .await
        .unwrap();
    let head_id = head.keys().next().unwrap();
    let worker_id = worker.keys().next().unwrap();
    orch.non_terminated_nodes(&TagSet::new()).await.unwrap();

    let worker_external = orch.external_ip(worker_id).await.unwrap().unwrap();
    let worker_internal = orch.internal_ip(worker_id).await.unwrap().unwrap();
    assert_eq!(worker_external, worker_internal);
    assert!(worker_external.starts_with("10.240.0."));

    let head_external = orch.external_ip(head_id).await.unwrap().unwrap();
    assert!(head_external.starts_with("198.51.100."));
}

#[tokio::test]
async fn tag_filters_narrow_listings() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    orch.create_nodes(&node_spec(), kind_tags("head"), 1)
        .await
        .unwrap();
    let workers = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 2)
        .await
        .unwrap();

    let mut listed = orch
        .non_terminated_nodes(&kind_tags("worker"))
        .await
        .unwrap();
    listed.sort();
    let mut expected: Vec<String> = workers.keys().cloned().collect();
    expected.sort();
    assert_eq!(listed, expected);

    // A richer filter goes through the tag store instead of the raw listing.
    let mut status_filter = TagSet::new();
    status_filter.insert(tags::NODE_KIND.to_string(), "worker".to_string());
    status_filter.insert(tags::CLUSTER_NAME.to_string(), "dev".to_string());
    let mut by_store = orch.non_terminated_nodes(&status_filter).await.unwrap();
    by_store.sort();
    assert_eq!(by_store, expected);
}

#[tokio::test]
async fn terminate_nodes_deletes_the_whole_batch() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(MockCloud::new());
    let orch = orchestrator(test_settings(&dir), &cloud).await;

    let created = orch
        .create_nodes(&node_spec(), kind_tags("worker"), 3)
        .await
        .unwrap();
    let ids: Vec<String> = created.keys().cloned().collect();

    orch.terminate_nodes(&ids).await.unwrap();
    assert!(cloud.live_instance_ids().is_empty());
    assert!(orch.non_terminated_nodes(&TagSet::new()).await.unwrap().is_empty());
}
