use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::ironic::types::{ApiVersion, Node, PatchOperation, PowerStateRequest, ProvisionStateRequest};
use crate::ironic::ApiError;
use crate::observability::api_metrics;

const API_VERSION_HEADER: &str = "X-OpenStack-Ironic-API-Version";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Calls the provisioning workflow makes against Ironic.
///
/// Implementations must be shareable between concurrent workflow runs; the
/// workflow never mutates the client.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Fetch the current node record.
    async fn get_node(&self, node_id: &str) -> Result<Node, ApiError>;

    /// Ask Ironic to move the node toward `request.target`. Acceptance does
    /// not mean the transition finished.
    async fn change_provision_state(
        &self,
        node_id: &str,
        request: &ProvisionStateRequest,
    ) -> Result<(), ApiError>;

    async fn change_power_state(&self, node_id: &str, request: &PowerStateRequest) -> Result<(), ApiError>;

    /// Apply JSON-patch operations to the node record.
    async fn update_node(&self, node_id: &str, patch: &[PatchOperation]) -> Result<Node, ApiError>;
}

#[async_trait]
impl<T: NodeApi + ?Sized> NodeApi for Arc<T> {
    async fn get_node(&self, node_id: &str) -> Result<Node, ApiError> {
        (**self).get_node(node_id).await
    }

    async fn change_provision_state(
        &self,
        node_id: &str,
        request: &ProvisionStateRequest,
    ) -> Result<(), ApiError> {
        (**self).change_provision_state(node_id, request).await
    }

    async fn change_power_state(&self, node_id: &str, request: &PowerStateRequest) -> Result<(), ApiError> {
        (**self).change_power_state(node_id, request).await
    }

    async fn update_node(&self, node_id: &str, patch: &[PatchOperation]) -> Result<Node, ApiError> {
        (**self).update_node(node_id, patch).await
    }
}

/// Connection settings for [`IronicClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub requests_per_second: u32,
    pub burst_capacity: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            requests_per_second: 10,
            burst_capacity: 20,
        }
    }
}

/// Rate-limited HTTP client for the Ironic v1 API.
#[derive(Debug)]
pub struct IronicClient {
    http: Client,
    base_url: String,
    api_version: ApiVersion,
    auth_token: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl IronicClient {
    pub fn new(endpoint: &str, api_version: ApiVersion, options: ClientOptions) -> Result<Self, ApiError> {
        let per_second = NonZeroU32::new(options.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(options.burst_capacity).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        let http = Client::builder().timeout(options.request_timeout).build()?;

        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_version,
            auth_token: options.auth_token,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Microversion sent with every request.
    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}/v1/{}", self.base_url, path))
            .header(API_VERSION_HEADER, self.api_version.to_string());
        if let Some(token) = &self.auth_token {
            builder = builder.header(AUTH_TOKEN_HEADER, token);
        }
        builder
    }

    async fn send(&self, node_id: &str, builder: RequestBuilder) -> Result<Response, ApiError> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;
        api_metrics().record_request();

        let response = builder.send().await.inspect_err(|_| api_metrics().record_error())?;
        let status = response.status();
        debug!(node = %node_id, status = status.as_u16(), "Ironic responded");

        if status.is_success() {
            return Ok(response);
        }
        if status != reqwest::StatusCode::CONFLICT {
            api_metrics().record_error();
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, node_id, &body))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NodeApi for IronicClient {
    async fn get_node(&self, node_id: &str) -> Result<Node, ApiError> {
        let builder = self.request(Method::GET, &format!("nodes/{node_id}"));
        let response = self.send(node_id, builder).await?;
        Self::decode(response).await
    }

    async fn change_provision_state(
        &self,
        node_id: &str,
        request: &ProvisionStateRequest,
    ) -> Result<(), ApiError> {
        let builder = self
            .request(Method::PUT, &format!("nodes/{node_id}/states/provision"))
            .json(request);
        self.send(node_id, builder).await?;
        Ok(())
    }

    async fn change_power_state(&self, node_id: &str, request: &PowerStateRequest) -> Result<(), ApiError> {
        let builder = self
            .request(Method::PUT, &format!("nodes/{node_id}/states/power"))
            .json(request);
        self.send(node_id, builder).await?;
        Ok(())
    }

    async fn update_node(&self, node_id: &str, patch: &[PatchOperation]) -> Result<Node, ApiError> {
        let builder = self.request(Method::PATCH, &format!("nodes/{node_id}")).json(patch);
        let response = self.send(node_id, builder).await?;
        Self::decode(response).await
    }
}
