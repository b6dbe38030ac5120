use anyhow::{Context, Result};
use nimbus_common::{tags, NodeKind, TagSet};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const HASH_LEN: usize = 16;

/// Reads the cluster bootstrap configuration written alongside this process.
pub fn read_bootstrap_config(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading bootstrap config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing bootstrap config {}", path.display()))
}

/// Content hashes over the runtime configuration and the file-mount set. The
/// external autoscaler compares these against a node's tags to detect drift
/// and schedule replacement.
pub fn hash_runtime_conf(config: &serde_json::Value) -> (String, String) {
    let mut runtime = Sha256::new();
    runtime.update(config.to_string().as_bytes());
    let runtime_hash = truncated_hex(runtime);

    let mut mounts = Sha256::new();
    if let Some(file_mounts) = config.get("file_mounts").and_then(|m| m.as_object()) {
        // serde_json object iteration is insertion-ordered; sort for a
        // stable hash across processes.
        let mut entries: Vec<(&String, &serde_json::Value)> = file_mounts.iter().collect();
        entries.sort_by_key(|(target, _)| target.as_str());
        for (target, source) in entries {
            mounts.update(target.as_bytes());
            if let Some(source) = source.as_str() {
                hash_path_contents(&mut mounts, &PathBuf::from(source));
            }
        }
    }
    let mounts_hash = truncated_hex(mounts);

    (runtime_hash, mounts_hash)
}

fn hash_path_contents(hasher: &mut Sha256, path: &Path) {
    if path.is_file() {
        if let Ok(bytes) = fs::read(path) {
            hasher.update(&bytes);
        }
        return;
    }
    if path.is_dir() {
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        let mut children: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        children.sort();
        for child in children {
            hasher.update(child.to_string_lossy().as_bytes());
            hash_path_contents(hasher, &child);
        }
        return;
    }
    // Source missing locally; the path itself still contributes.
    hasher.update(path.to_string_lossy().as_bytes());
}

fn truncated_hex(hasher: Sha256) -> String {
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_LEN].to_string()
}

/// Tag set seeded for the head node on first boot of a cluster.
pub fn head_node_tags(cluster_name: &str, node_name: &str, config: &serde_json::Value) -> TagSet {
    let (runtime_hash, mounts_hash) = hash_runtime_conf(config);
    let user_node_type = config
        .get("head_node_type")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    debug!(%node_name, %runtime_hash, %mounts_hash, "seeding head node tags");

    let mut head_tags = TagSet::new();
    head_tags.insert(tags::CLUSTER_NAME.to_string(), cluster_name.to_string());
    head_tags.insert(
        tags::NODE_KIND.to_string(),
        NodeKind::Head.as_str().to_string(),
    );
    head_tags.insert(tags::NODE_NAME.to_string(), node_name.to_string());
    head_tags.insert(
        tags::NODE_STATUS.to_string(),
        tags::STATUS_UP_TO_DATE.to_string(),
    );
    head_tags.insert(
        tags::USER_NODE_TYPE.to_string(),
        user_node_type.to_string(),
    );
    head_tags.insert(tags::RUNTIME_CONFIG.to_string(), runtime_hash);
    head_tags.insert(tags::FILE_MOUNTS_CONTENTS.to_string(), mounts_hash);
    head_tags
}
