use crate::{CloudApiClient, CloudError, FloatingIpPrototype, InstanceAction, InstancePrototype};
use async_trait::async_trait;
use nimbus_common::{FloatingIp, Instance};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "2022-06-30";

/// Instance API client for an IBM-style VPC endpoint. Auth is a bearer token
/// resolved upstream; this client only speaks the instance/floating-IP
/// surface the orchestrator consumes.
pub struct VpcClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct InstancePage {
    instances: Vec<Instance>,
    #[serde(default)]
    next: Option<PageRef>,
}

#[derive(Deserialize)]
struct PageRef {
    href: String,
}

#[derive(Deserialize)]
struct FloatingIpPage {
    floating_ips: Vec<FloatingIp>,
}

impl VpcClient {
    pub fn new(endpoint: String, token: String) -> anyhow::Result<Self> {
        // A stalled cloud call must not hang an autoscaler thread forever.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        let base_url = format!("{}/v1", endpoint.trim_end_matches('/'));
        Ok(Self {
            client,
            base_url,
            token: token.trim().to_string(),
        })
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(auth) =
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.token))
        {
            headers.insert(reqwest::header::AUTHORIZATION, auth);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}?version={}&generation=2",
            self.base_url,
            path.trim_start_matches('/'),
            API_VERSION
        )
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, CloudError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(map_api_error(status, body))
    }
}

fn map_api_error(status: StatusCode, body: String) -> CloudError {
    // A 5xx body that happens to mention not_found is still a server error.
    if status == StatusCode::NOT_FOUND
        || (status.is_client_error() && body.contains("not_found"))
    {
        return CloudError::NotFound;
    }
    if status == StatusCode::BAD_REQUEST && body.contains("already exists") {
        return CloudError::Conflict(body);
    }
    if body.contains("over quota") || status == StatusCode::TOO_MANY_REQUESTS {
        return CloudError::QuotaExceeded(body);
    }
    CloudError::Api {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl CloudApiClient for VpcClient {
    async fn list_instances(&self, name: Option<&str>) -> crate::Result<Vec<Instance>> {
        let mut url = self.url("instances");
        if let Some(name) = name {
            url.push_str(&format!("&name={name}"));
        }

        let mut all = Vec::new();
        loop {
            debug!(%url, "vpc: listing instances");
            let resp = self.client.get(&url).headers(self.headers()).send().await?;
            let page: InstancePage = Self::check(resp).await?.json().await?;
            all.extend(page.instances);
            match page.next {
                Some(next) => url = next.href,
                None => break,
            }
        }
        Ok(all)
    }

    async fn get_instance(&self, id: &str) -> crate::Result<Instance> {
        let url = self.url(&format!("instances/{id}"));
        let resp = self.client.get(&url).headers(self.headers()).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn create_instance(&self, prototype: &InstancePrototype) -> crate::Result<Instance> {
        let url = self.url("instances");
        let body = json!({
            "name": prototype.name,
            "zone": { "name": prototype.zone_name },
            "profile": { "name": prototype.profile_name },
            "image": { "id": prototype.image_id },
            "vpc": { "id": prototype.vpc_id },
            "keys": [{ "id": prototype.key_id }],
            "resource_group": { "id": prototype.resource_group_id },
            "primary_network_interface": {
                "name": "eth0",
                "subnet": { "id": prototype.subnet_id },
                "security_groups": [{ "id": prototype.security_group_id }],
            },
            "boot_volume_attachment": {
                "delete_volume_on_instance_delete": true,
                "volume": {
                    "name": format!("{}-boot", prototype.name),
                    "capacity": prototype.boot_volume_capacity_gb,
                    "profile": { "name": prototype.volume_tier_name },
                },
            },
        });
        let mut body = body;
        if let Some(user_data) = &prototype.user_data {
            body["user_data"] = json!(user_data);
        }
        if let Some(metadata_service) = &prototype.metadata_service {
            body["metadata_service"] = metadata_service.clone();
        }

        debug!(name = %prototype.name, "vpc: creating instance");
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn delete_instance(&self, id: &str) -> crate::Result<()> {
        let url = self.url(&format!("instances/{id}"));
        debug!(%id, "vpc: deleting instance");
        let resp = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn instance_action(&self, id: &str, action: InstanceAction) -> crate::Result<()> {
        let url = self.url(&format!("instances/{id}/actions"));
        debug!(%id, action = action.as_str(), "vpc: instance action");
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&json!({ "type": action.as_str() }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn list_floating_ips(&self) -> crate::Result<Vec<FloatingIp>> {
        let url = self.url("floating_ips");
        let resp = self.client.get(&url).headers(self.headers()).send().await?;
        let page: FloatingIpPage = Self::check(resp).await?.json().await?;
        Ok(page.floating_ips)
    }

    async fn create_floating_ip(
        &self,
        prototype: &FloatingIpPrototype,
    ) -> crate::Result<FloatingIp> {
        let url = self.url("floating_ips");
        let body = json!({
            "name": prototype.name,
            "zone": { "name": prototype.zone_name },
            "resource_group": { "id": prototype.resource_group_id },
        });
        debug!(name = %prototype.name, "vpc: creating floating ip");
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn delete_floating_ip(&self, id: &str) -> crate::Result<()> {
        let url = self.url(&format!("floating_ips/{id}"));
        debug!(%id, "vpc: deleting floating ip");
        let resp = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn attach_floating_ip(
        &self,
        instance_id: &str,
        nic_id: &str,
        ip_id: &str,
    ) -> crate::Result<()> {
        let url = self.url(&format!(
            "instances/{instance_id}/network_interfaces/{nic_id}/floating_ips/{ip_id}"
        ));
        debug!(%instance_id, %ip_id, "vpc: attaching floating ip");
        let resp = self.client.put(&url).headers(self.headers()).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn list_nic_floating_ips(
        &self,
        instance_id: &str,
        nic_id: &str,
    ) -> crate::Result<Vec<FloatingIp>> {
        let url = self.url(&format!(
            "instances/{instance_id}/network_interfaces/{nic_id}/floating_ips"
        ));
        let resp = self.client.get(&url).headers(self.headers()).send().await?;
        let page: FloatingIpPage = Self::check(resp).await?.json().await?;
        Ok(page.floating_ips)
    }
}
