use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default age after which a node that never reached `running` is treated as
/// hung and removed from the cluster.
pub const PENDING_TIMEOUT_DEFAULT: Duration = Duration::from_secs(120);

const TAGS_FILE_NAME: &str = ".nimbus-vpc-tags";
const BOOTSTRAP_CONFIG_FILE_NAME: &str = "nimbus_bootstrap_config.json";

/// One explicit context object per process; every orchestrator operation
/// receives its configuration from here, never from module globals.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cluster_name: String,
    pub zone_name: String,
    /// Stop nodes instead of deleting them, keeping them in the tag store for
    /// future reuse.
    pub cache_stopped_nodes: bool,
    /// External IP resolution per node kind: floating IP for head, private IP
    /// for workers.
    pub use_hybrid_ips: bool,
    pub pending_timeout: Duration,
    /// Durable per-host tag file, one mapping of cluster name to node tags.
    pub tags_path: PathBuf,
    /// Cluster bootstrap config read when seeding head-node tags.
    pub bootstrap_config_path: PathBuf,
    /// Local node name used for head detection. Defaults to the host name.
    pub node_name: Option<String>,
}

impl Settings {
    pub fn new(cluster_name: impl Into<String>, zone_name: impl Into<String>) -> Self {
        // Without HOME the durable files still need a stable absolute
        // location, not whatever the process cwd happens to be.
        let home = env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir());
        Self {
            cluster_name: cluster_name.into(),
            zone_name: zone_name.into(),
            cache_stopped_nodes: true,
            use_hybrid_ips: false,
            pending_timeout: PENDING_TIMEOUT_DEFAULT,
            tags_path: home.join(TAGS_FILE_NAME),
            bootstrap_config_path: home.join(BOOTSTRAP_CONFIG_FILE_NAME),
            node_name: None,
        }
    }

    /// Applies `NIMBUS_*` environment overrides on top of the built-in
    /// defaults.
    pub fn from_env(cluster_name: impl Into<String>, zone_name: impl Into<String>) -> Self {
        let mut settings = Self::new(cluster_name, zone_name);
        if let Some(v) = env_bool("NIMBUS_CACHE_STOPPED_NODES") {
            settings.cache_stopped_nodes = v;
        }
        if let Some(v) = env_bool("NIMBUS_USE_HYBRID_IPS") {
            settings.use_hybrid_ips = v;
        }
        if let Ok(v) = env::var("NIMBUS_PENDING_TIMEOUT_SECS") {
            if let Ok(secs) = v.trim().parse::<u64>() {
                settings.pending_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = env::var("NIMBUS_TAGS_PATH") {
            if !v.is_empty() {
                settings.tags_path = PathBuf::from(v);
            }
        }
        if let Ok(v) = env::var("NIMBUS_BOOTSTRAP_CONFIG_PATH") {
            if !v.is_empty() {
                settings.bootstrap_config_path = PathBuf::from(v);
            }
        }
        settings
    }

    /// Name of the node this process runs on, used to detect whether we are
    /// the head during startup seeding.
    pub fn local_node_name(&self) -> Option<String> {
        if let Some(name) = &self.node_name {
            return Some(name.clone());
        }
        if let Ok(name) = env::var("HOSTNAME") {
            if !name.trim().is_empty() {
                return Some(name.trim().to_string());
            }
        }
        std::fs::read_to_string("/etc/hostname")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn env_bool(key: &str) -> Option<bool> {
    match env::var(key).ok()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_are_absolute_even_without_home() {
        let saved = env::var("HOME").ok();
        env::remove_var("HOME");
        let settings = Settings::new("dev", "us-south-1");
        if let Some(home) = saved {
            env::set_var("HOME", home);
        }

        assert!(settings.tags_path.is_absolute());
        assert!(settings.bootstrap_config_path.is_absolute());
    }
}
