use crate::errors::NodeError;
use nimbus_common::NodeKind;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

pub const NAME_SUFFIX_LEN: usize = 8;
pub const NAME_MAX_LEN: usize = 64;

/// VPC instance-name requirement: lowercase alphanumeric and hyphens, must
/// start with a letter and not end with a hyphen.
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("valid pattern"))
}

/// Validates the name prefix before any cloud call. The prefix must leave
/// room for the random suffix and its separator.
pub fn validate_prefix(prefix: &str) -> Result<(), NodeError> {
    let max = NAME_MAX_LEN - NAME_SUFFIX_LEN - 1;
    if prefix.len() > max {
        return Err(NodeError::InvalidName {
            name: prefix.to_string(),
            reason: format!("longer than {max} characters"),
        });
    }
    if !name_pattern().is_match(prefix) {
        return Err(NodeError::InvalidName {
            name: prefix.to_string(),
            reason: "does not match `^[a-z]([-a-z0-9]*[a-z0-9])?$`".to_string(),
        });
    }
    Ok(())
}

/// Generates a globally-unique instance name
/// `<cluster>-<kind>-<user-tag>-<8 hex chars>`.
pub fn generate(cluster_name: &str, kind: NodeKind, user_tag: &str) -> Result<String, NodeError> {
    let prefix = format!("{}-{}-{}", cluster_name, kind.as_str(), user_tag);
    validate_prefix(&prefix)?;
    let suffix = Uuid::new_v4().simple().to_string();
    Ok(format!("{}-{}", prefix, &suffix[..NAME_SUFFIX_LEN]))
}

/// Derives the node kind from a generated instance name. Names that do not
/// follow the `<cluster>-<kind>` convention belong to other tenants and are
/// ignored by listings.
pub fn kind_from_name(cluster_name: &str, name: &str) -> Option<NodeKind> {
    if name.starts_with(&format!("{}-{}", cluster_name, NodeKind::Head.as_str())) {
        Some(NodeKind::Head)
    } else if name.starts_with(&format!("{}-{}", cluster_name, NodeKind::Worker.as_str())) {
        Some(NodeKind::Worker)
    } else {
        None
    }
}
