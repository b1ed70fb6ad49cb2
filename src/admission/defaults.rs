//! Policy constants shared by the defaulter and the validator.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::cluster::discovery::Capabilities;
use crate::nexus_types::{ExposeType, NexusProbe};

pub const NEXUS_COMMUNITY_IMAGE: &str = "docker.io/sonatype/nexus3";
pub const NEXUS_CERTIFIED_IMAGE: &str =
    "registry.connect.redhat.com/sonatype/nexus-repository-manager";

pub const DEFAULT_VOLUME_SIZE: &str = "10Gi";

pub const RECOGNIZED_PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

/// Floor applied to every probe tunable a user did set.
pub const PROBE_MINIMUM: i32 = 1;

const PROBE_DEFAULT_INITIAL_DELAY_SECONDS: i32 = 240;
const PROBE_DEFAULT_TIMEOUT_SECONDS: i32 = 15;
const PROBE_DEFAULT_PERIOD_SECONDS: i32 = 10;
const PROBE_DEFAULT_SUCCESS_THRESHOLD: i32 = 1;
const PROBE_DEFAULT_FAILURE_THRESHOLD: i32 = 3;

pub fn default_probe() -> NexusProbe {
    NexusProbe {
        initial_delay_seconds: PROBE_DEFAULT_INITIAL_DELAY_SECONDS,
        timeout_seconds: PROBE_DEFAULT_TIMEOUT_SECONDS,
        period_seconds: PROBE_DEFAULT_PERIOD_SECONDS,
        success_threshold: PROBE_DEFAULT_SUCCESS_THRESHOLD,
        failure_threshold: PROBE_DEFAULT_FAILURE_THRESHOLD,
    }
}

pub fn default_resources() -> corev1::ResourceRequirements {
    corev1::ResourceRequirements {
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("2".to_string())),
            ("memory".to_string(), Quantity("2Gi".to_string())),
        ])),
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("1".to_string())),
            ("memory".to_string(), Quantity("2Gi".to_string())),
        ])),
        ..corev1::ResourceRequirements::default()
    }
}

/// Mechanism-selection priority when the user asked to expose but did not
/// say how. Routes only exist on clusters without native Ingress semantics,
/// and NodePort works everywhere.
pub fn preferred_expose_type(capabilities: &Capabilities) -> ExposeType {
    if capabilities.route_available {
        ExposeType::Route
    } else if capabilities.ingress_available {
        ExposeType::Ingress
    } else {
        ExposeType::NodePort
    }
}
