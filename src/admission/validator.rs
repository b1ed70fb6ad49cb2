use thiserror::Error;
use tracing::*;

use crate::cluster::discovery::{Capabilities, CapabilityDiscovery};
use crate::nexus_types::{ExposeType, Nexus};

/// The reasons a Nexus can be rejected. Validation short-circuits, so a
/// rejection always carries exactly one of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ingress expose required, but unavailable")]
    IngressUnavailable,
    #[error("route expose required, but unavailable")]
    RouteUnavailable,
    #[error("nodeport expose required, but no port informed")]
    NodePortMissingPort,
    #[error("ingress expose required, but no host informed")]
    IngressMissingHost,
    #[error("tls secret name informed, but not using an ingress")]
    SecretNameRequiresIngress,
    #[error("tls set to mandatory, but not using a route")]
    MandatoryTlsRequiresRoute,
}

/// Returns an error if the given Nexus is invalid for the current cluster.
pub async fn validate(
    nexus: &Nexus,
    discovery: &dyn CapabilityDiscovery,
) -> Result<(), ValidationError> {
    let validator = Validator {
        capabilities: Capabilities::discover(discovery).await,
    };
    validator.validate(nexus)
}

struct Validator {
    capabilities: Capabilities,
}

impl Validator {
    fn validate(&self, nexus: &Nexus) -> Result<(), ValidationError> {
        self.validate_networking(nexus)
    }

    fn validate_networking(&self, nexus: &Nexus) -> Result<(), ValidationError> {
        let networking = &nexus.spec.networking;
        if networking.expose != Some(true) {
            debug!("'spec.networking.expose' unset or false, ignoring networking configuration");
            return Ok(());
        }

        let exposing_as = |expose_type| networking.expose_as == Some(expose_type);

        if exposing_as(ExposeType::Ingress) && !self.capabilities.ingress_available {
            warn!("Ingresses are not available on this cluster. Make sure to be running Kubernetes >= 1.14, or set 'spec.networking.exposeAs' to {:?} on Openshift. {:?} is also available", ExposeType::Route, ExposeType::NodePort);
            return Err(ValidationError::IngressUnavailable);
        }

        if exposing_as(ExposeType::Route) && !self.capabilities.route_available {
            warn!("Routes are not available on this cluster. If you're running Kubernetes 1.14 or higher try setting 'spec.networking.exposeAs' to {:?}. {:?} is also available", ExposeType::Ingress, ExposeType::NodePort);
            return Err(ValidationError::RouteUnavailable);
        }

        if exposing_as(ExposeType::NodePort) && networking.node_port == 0 {
            warn!("NodePort networking requires a port. Check the 'spec.networking.nodePort' parameter");
            return Err(ValidationError::NodePortMissingPort);
        }

        if exposing_as(ExposeType::Ingress)
            && networking.host.as_deref().map_or(true, str::is_empty)
        {
            warn!("Ingress networking requires a host. Check the 'spec.networking.host' parameter");
            return Err(ValidationError::IngressMissingHost);
        }

        if networking
            .tls
            .secret_name
            .as_deref()
            .is_some_and(|secret_name| !secret_name.is_empty())
            && !exposing_as(ExposeType::Ingress)
        {
            warn!("'spec.networking.tls.secretName' is only available when using an Ingress. Try setting 'spec.networking.exposeAs' to {:?}", ExposeType::Ingress);
            return Err(ValidationError::SecretNameRequiresIngress);
        }

        if networking.tls.mandatory && !exposing_as(ExposeType::Route) {
            warn!("'spec.networking.tls.mandatory' is only available when using a Route. Try setting 'spec.networking.exposeAs' to {:?}", ExposeType::Route);
            return Err(ValidationError::MandatoryTlsRequiresRoute);
        }

        Ok(())
    }
}
