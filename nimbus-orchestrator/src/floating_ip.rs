use nimbus_common::{FloatingIp, Instance, NodeSpec};
use nimbus_providers::{CloudApiClient, CloudError, FloatingIpPrototype};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name prefix marking floating IPs created by this system. Anything carrying
/// it is safe to release when its owning instance is destroyed; addresses
/// without it are user-supplied and left as found.
pub const RECYCLABLE_PREFIX: &str = "nimbus-recyclable";

pub fn is_disposable(fip: &FloatingIp) -> bool {
    fip.name.starts_with(RECYCLABLE_PREFIX)
}

/// Returns an address to bind to a new head node. A `head_ip` from the node
/// spec is reused only if it exists and is currently unbound; otherwise a
/// fresh disposable address is allocated.
pub async fn provision(
    cloud: &dyn CloudApiClient,
    spec: &NodeSpec,
    zone_name: &str,
) -> Result<FloatingIp, CloudError> {
    if let Some(head_ip) = &spec.head_ip {
        for fip in cloud.list_floating_ips().await? {
            if &fip.address == head_ip {
                if fip.is_bound() {
                    warn!(address = %head_ip, "configured head ip is already bound, allocating a new address");
                    break;
                }
                debug!(address = %head_ip, "reusing configured head ip");
                return Ok(fip);
            }
        }
    }

    let suffix = Uuid::new_v4().simple().to_string();
    let name = format!("{}-{}", RECYCLABLE_PREFIX, &suffix[..4]);
    info!(%name, "allocating floating ip");
    cloud
        .create_floating_ip(&FloatingIpPrototype {
            name,
            zone_name: zone_name.to_string(),
            resource_group_id: spec.resource_group_id.clone(),
        })
        .await
}

/// Binds the address to the instance's primary network interface. Idempotent:
/// the attach call is skipped when the interface already reports this exact
/// address bound.
pub async fn attach(
    cloud: &dyn CloudApiClient,
    instance: &Instance,
    fip: &FloatingIp,
) -> Result<(), CloudError> {
    let Some(nic) = instance.primary_nic() else {
        return Err(CloudError::Api {
            status: 0,
            body: format!("instance {} has no network interface", instance.id),
        });
    };

    let bound = cloud.list_nic_floating_ips(&instance.id, &nic.id).await?;
    if bound.iter().any(|existing| existing.address == fip.address) {
        debug!(instance = %instance.id, address = %fip.address, "floating ip already attached");
        return Ok(());
    }

    info!(instance = %instance.id, address = %fip.address, "attaching floating ip");
    cloud
        .attach_floating_ip(&instance.id, &nic.id, &fip.id)
        .await
}

/// Releases every disposable address in the list. Missing addresses are fine
/// (delete is idempotent); user-supplied ones are skipped.
pub async fn release_disposable(cloud: &dyn CloudApiClient, floating_ips: &[FloatingIp]) {
    for fip in floating_ips {
        if !is_disposable(fip) {
            continue;
        }
        match cloud.delete_floating_ip(&fip.id).await {
            Ok(()) => info!(address = %fip.address, "released floating ip"),
            Err(CloudError::NotFound) => {}
            Err(err) => warn!(address = %fip.address, %err, "failed to release floating ip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposable_detection() {
        let fip = FloatingIp {
            id: "fip-1".into(),
            address: "198.51.100.7".into(),
            name: format!("{RECYCLABLE_PREFIX}-ab12"),
            target: None,
        };
        assert!(is_disposable(&fip));

        let user_supplied = FloatingIp {
            name: "office-gateway".into(),
            ..fip
        };
        assert!(!is_disposable(&user_supplied));
    }
}
