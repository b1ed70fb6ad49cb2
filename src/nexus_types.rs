use k8s_openapi::api::core::v1 as corev1;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "apps.nexus.dev", version = "v1alpha1", kind = "Nexus")]
#[kube(shortname = "nexus", namespaced)]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase", default)]
pub struct NexusSpec {
    pub replicas: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    pub use_red_hat_image: bool,

    pub resources: corev1::ResourceRequirements,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<NexusProbe>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<NexusProbe>,

    pub automatic_update: NexusAutomaticUpdate,

    pub persistence: NexusPersistence,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    pub networking: NexusNetworking,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NexusProbe {
    pub initial_delay_seconds: i32,
    pub timeout_seconds: i32,
    pub period_seconds: i32,
    pub success_threshold: i32,
    pub failure_threshold: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NexusAutomaticUpdate {
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor_version: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NexusPersistence {
    pub persistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NexusNetworking {
    /// Whether the deployment should be reachable from outside the cluster.
    /// Left unset it is normalized together with `expose_as` during defaulting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose_as: Option<ExposeType>,

    pub node_port: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    pub tls: NexusNetworkingTls,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NexusNetworkingTls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    pub mandatory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ExposeType {
    Ingress,
    Route,
    NodePort,
}
