use anyhow::Result;
use async_trait::async_trait;
use kube::Client;
use tracing::*;

pub const ROUTE_KIND: &str = "Route";
pub const INGRESS_KIND: &str = "Ingress";

const ROUTE_GROUP_VERSION: &str = "route.openshift.io/v1";
const INGRESS_GROUP_VERSION: &str = "networking.k8s.io/v1";
const LEGACY_INGRESS_GROUP_VERSION: &str = "networking.k8s.io/v1beta1";

/// Answers which exposure mechanisms the current cluster supports.
#[async_trait]
pub trait CapabilityDiscovery: Send + Sync {
    async fn route_available(&self) -> Result<bool>;
    async fn any_ingress_available(&self) -> Result<bool>;
}

/// Per-invocation snapshot of the cluster's exposure capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub route_available: bool,
    pub ingress_available: bool,
}

impl Capabilities {
    /// Takes a fresh snapshot. A failed lookup makes that capability
    /// unavailable instead of aborting the caller.
    pub async fn discover(discovery: &dyn CapabilityDiscovery) -> Self {
        let route_available = match discovery.route_available().await {
            Ok(available) => available,
            Err(err) => {
                error!("Discovery failure for kind {}: {:#}", ROUTE_KIND, err);
                false
            }
        };

        let ingress_available = match discovery.any_ingress_available().await {
            Ok(available) => available,
            Err(err) => {
                error!("Discovery failure for kind {}: {:#}", INGRESS_KIND, err);
                false
            }
        };

        // if there were errors, these are false. Safe to use
        Capabilities {
            route_available,
            ingress_available,
        }
    }
}

/// Capability discovery backed by the cluster's discovery API.
pub struct ClusterDiscovery {
    client: Client,
}

impl ClusterDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn has_group_version_kind(
        &self,
        apiversion: &str,
        kind: &str,
    ) -> Result<bool, kube::Error> {
        match self.client.list_api_group_resources(apiversion).await {
            Ok(list) => Ok(list.resources.iter().any(|resource| resource.kind == kind)),
            // the group/version is not served at all, so neither is the kind
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl CapabilityDiscovery for ClusterDiscovery {
    /// Checks if the cluster serves `route.openshift.io/v1` Routes.
    async fn route_available(&self) -> Result<bool> {
        Ok(self
            .has_group_version_kind(ROUTE_GROUP_VERSION, ROUTE_KIND)
            .await?)
    }

    /// Checks if the cluster serves Ingresses from `networking.k8s.io/v1` or
    /// `networking.k8s.io/v1beta1`.
    async fn any_ingress_available(&self) -> Result<bool> {
        let legacy = self
            .has_group_version_kind(LEGACY_INGRESS_GROUP_VERSION, INGRESS_KIND)
            .await;
        let current = self
            .has_group_version_kind(INGRESS_GROUP_VERSION, INGRESS_KIND)
            .await;

        match (legacy, current) {
            // both ran into an error, can't tell if any is available,
            // let's just return the first error
            (Err(legacy_err), Err(_)) => Err(legacy_err.into()),
            // at least one answer is valid, which is enough
            (legacy, current) => Ok(legacy.unwrap_or(false) || current.unwrap_or(false)),
        }
    }
}
