use std::fmt;

use kube::ResourceExt;
use tracing::*;

use crate::cluster::discovery::{Capabilities, CapabilityDiscovery};
use crate::nexus_types::Nexus;
use crate::update::UpdateSource;

use super::defaults::{
    default_probe, default_resources, preferred_expose_type, DEFAULT_VOLUME_SIZE,
    NEXUS_CERTIFIED_IMAGE, NEXUS_COMMUNITY_IMAGE, PROBE_MINIMUM, RECOGNIZED_PULL_POLICIES,
};

/// Destructively sets defaults for the given Nexus.
///
/// Never fails: discovery and tag-resolution errors degrade to safe
/// fallbacks (capability treated as unavailable, automatic updates
/// disabled) instead of propagating.
pub async fn set_defaults(
    nexus: &mut Nexus,
    discovery: &dyn CapabilityDiscovery,
    updates: &dyn UpdateSource,
) {
    let defaulter = Defaulter {
        capabilities: Capabilities::discover(discovery).await,
        updates,
    };
    defaulter.apply(nexus).await;
}

struct Defaulter<'a> {
    capabilities: Capabilities,
    updates: &'a dyn UpdateSource,
}

fn log_change(field: &str, value: &dyn fmt::Debug) {
    debug!("Setting default for {}: {:?}", field, value);
}

impl Defaulter<'_> {
    async fn apply(&self, nexus: &mut Nexus) {
        self.set_resources_defaults(nexus);
        self.set_image_defaults(nexus);
        self.set_probe_defaults(nexus);
        // depends on the image set above
        self.set_update_defaults(nexus).await;
        self.set_networking_defaults(nexus);
        self.set_persistence_defaults(nexus);
        self.set_security_defaults(nexus);
    }

    fn set_resources_defaults(&self, nexus: &mut Nexus) {
        let resources = &mut nexus.spec.resources;
        if resources.requests.is_none() && resources.limits.is_none() {
            log_change("spec.resources", &default_resources());
            *resources = default_resources();
        }
    }

    fn set_image_defaults(&self, nexus: &mut Nexus) {
        let spec = &mut nexus.spec;
        if spec.use_red_hat_image {
            if spec.image.as_deref().is_some_and(|image| !image.is_empty()) {
                warn!("Nexus configured to use the Red Hat Certified Image, ignoring 'spec.image' field");
            }
            log_change("spec.image", &NEXUS_CERTIFIED_IMAGE);
            spec.image = Some(NEXUS_CERTIFIED_IMAGE.to_string());
        } else if spec.image.as_deref().map_or(true, str::is_empty) {
            log_change("spec.image", &NEXUS_COMMUNITY_IMAGE);
            spec.image = Some(NEXUS_COMMUNITY_IMAGE.to_string());
        }

        if let Some(pull_policy) = spec.image_pull_policy.as_deref() {
            if !pull_policy.is_empty() && !RECOGNIZED_PULL_POLICIES.contains(&pull_policy) {
                warn!(
                    "Invalid 'spec.imagePullPolicy', unsetting the value. The pull policy will be determined by the image tag. Valid values are: {}",
                    RECOGNIZED_PULL_POLICIES.join(", ")
                );
                log_change("spec.imagePullPolicy", &"");
                spec.image_pull_policy = None;
            }
        }
    }

    fn set_probe_defaults(&self, nexus: &mut Nexus) {
        match nexus.spec.liveness_probe.as_mut() {
            Some(probe) => {
                probe.failure_threshold = self.ensure_minimum(
                    probe.failure_threshold,
                    "spec.livenessProbe.failureThreshold",
                );
                probe.initial_delay_seconds = self.ensure_minimum(
                    probe.initial_delay_seconds,
                    "spec.livenessProbe.initialDelaySeconds",
                );
                probe.period_seconds =
                    self.ensure_minimum(probe.period_seconds, "spec.livenessProbe.periodSeconds");
                probe.timeout_seconds =
                    self.ensure_minimum(probe.timeout_seconds, "spec.livenessProbe.timeoutSeconds");
            }
            None => {
                log_change("spec.livenessProbe", &default_probe());
                nexus.spec.liveness_probe = Some(default_probe());
            }
        }

        // successThreshold for liveness probes must be 1
        if let Some(probe) = nexus.spec.liveness_probe.as_mut() {
            if probe.success_threshold != 1 {
                log_change("spec.livenessProbe.successThreshold", &1);
                probe.success_threshold = 1;
            }
        }

        match nexus.spec.readiness_probe.as_mut() {
            Some(probe) => {
                probe.failure_threshold = self.ensure_minimum(
                    probe.failure_threshold,
                    "spec.readinessProbe.failureThreshold",
                );
                probe.initial_delay_seconds = self.ensure_minimum(
                    probe.initial_delay_seconds,
                    "spec.readinessProbe.initialDelaySeconds",
                );
                probe.period_seconds =
                    self.ensure_minimum(probe.period_seconds, "spec.readinessProbe.periodSeconds");
                probe.timeout_seconds = self
                    .ensure_minimum(probe.timeout_seconds, "spec.readinessProbe.timeoutSeconds");
                probe.success_threshold = self.ensure_minimum(
                    probe.success_threshold,
                    "spec.readinessProbe.successThreshold",
                );
            }
            None => {
                log_change("spec.readinessProbe", &default_probe());
                nexus.spec.readiness_probe = Some(default_probe());
            }
        }
    }

    /// Must run after the image defaults have been set.
    async fn set_update_defaults(&self, nexus: &mut Nexus) {
        if nexus.spec.automatic_update.disabled {
            return;
        }

        let image = nexus.spec.image.clone().unwrap_or_default();
        let repository = image.split(':').next().unwrap_or_default().to_string();
        if repository != NEXUS_COMMUNITY_IMAGE {
            warn!(
                "Automatic updates are enabled, but 'spec.image' is not using the community image {}. Disabling automatic updates",
                NEXUS_COMMUNITY_IMAGE
            );
            log_change("spec.automaticUpdate.disabled", &true);
            nexus.spec.automatic_update.disabled = true;
            return;
        }

        let mut minor = match nexus.spec.automatic_update.minor_version {
            Some(minor) => minor,
            None => {
                debug!("Automatic updates are enabled, but no minor was informed. Fetching the most recent...");
                match self.updates.latest_minor().await {
                    Ok(minor) => {
                        log_change("spec.automaticUpdate.minorVersion", &minor);
                        nexus.spec.automatic_update.minor_version = Some(minor);
                        minor
                    }
                    Err(err) => return self.disable_update(nexus, err),
                }
            }
        };

        debug!("Fetching the latest micro from minor {}", minor);
        let tag = match self.updates.latest_micro(minor).await {
            Some(tag) => tag,
            None => {
                // the informed minor doesn't exist, let's try the latest minor
                warn!(
                    "Latest tag for minor version {} not found. Trying the latest minor instead",
                    minor
                );
                minor = match self.updates.latest_minor().await {
                    Ok(minor) => minor,
                    Err(err) => return self.disable_update(nexus, err),
                };
                info!("Setting 'spec.automaticUpdate.minorVersion' to {}", minor);
                log_change("spec.automaticUpdate.minorVersion", &minor);
                nexus.spec.automatic_update.minor_version = Some(minor);

                match self.updates.latest_micro(minor).await {
                    Some(tag) => tag,
                    // the resolver just reported this minor as the latest, so
                    // a miss means the tag source is inconsistent
                    None => {
                        return self.disable_update(
                            nexus,
                            anyhow::anyhow!("no micro tag found for latest minor {}", minor),
                        )
                    }
                }
            }
        };

        let new_image = format!("{}:{}", repository, tag);
        if nexus.spec.image.as_ref() != Some(&new_image) {
            log_change("spec.image", &new_image);
            nexus.spec.image = Some(new_image);
        }
    }

    fn set_networking_defaults(&self, nexus: &mut Nexus) {
        let networking = &mut nexus.spec.networking;
        if networking.expose.is_none() && networking.expose_as.is_none() {
            log_change("spec.networking.expose", &false);
            networking.expose = Some(false);
            return;
        }

        if networking.expose == Some(true) && networking.expose_as.is_none() {
            // expose is true, but exposeAs is blank
            // let's figure out the best way to expose
            let expose_as = preferred_expose_type(&self.capabilities);
            if !self.capabilities.route_available && !self.capabilities.ingress_available {
                // try NodePort, validation will catch it if impossible
                info!("Neither Routes nor Ingresses are available on this cluster");
            }
            log_change("spec.networking.exposeAs", &expose_as);
            networking.expose_as = Some(expose_as);
        } else if networking.expose.is_none() {
            // expose is unset but exposeAs is not blank
            // let's set expose to true
            log_change("spec.networking.expose", &true);
            networking.expose = Some(true);
        }
    }

    fn set_persistence_defaults(&self, nexus: &mut Nexus) {
        let persistence = &mut nexus.spec.persistence;
        if persistence.persistent
            && persistence.volume_size.as_deref().map_or(true, str::is_empty)
        {
            log_change("spec.persistence.volumeSize", &DEFAULT_VOLUME_SIZE);
            persistence.volume_size = Some(DEFAULT_VOLUME_SIZE.to_string());
        }
    }

    fn set_security_defaults(&self, nexus: &mut Nexus) {
        if nexus
            .spec
            .service_account_name
            .as_deref()
            .map_or(true, str::is_empty)
        {
            let name = nexus.name_any();
            log_change("spec.serviceAccountName", &name);
            nexus.spec.service_account_name = Some(name);
        }
    }

    fn ensure_minimum(&self, value: i32, field: &str) -> i32 {
        if value < PROBE_MINIMUM {
            warn!("{} below minimum", field);
            log_change(field, &PROBE_MINIMUM);
            return PROBE_MINIMUM;
        }
        value
    }

    fn disable_update(&self, nexus: &mut Nexus, err: anyhow::Error) {
        error!(
            "Unable to fetch the most recent minor: {:#}. Disabling automatic updates",
            err
        );
        log_change("spec.automaticUpdate.disabled", &true);
        nexus.spec.automatic_update.disabled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::discovery::fake::FakeDiscovery;
    use crate::nexus_types::*;
    use crate::update::fake::FakeUpdateSource;

    /// A Nexus every defaulting pass leaves untouched, mirrored by the
    /// expected outputs below. Automatic updates are disabled so the
    /// deployment tables don't depend on the tag source.
    fn all_defaults_community_nexus() -> Nexus {
        let mut nexus = Nexus::new(
            "default-community-nexus",
            NexusSpec {
                image: Some(NEXUS_COMMUNITY_IMAGE.to_string()),
                resources: default_resources(),
                liveness_probe: Some(default_probe()),
                readiness_probe: Some(default_probe()),
                automatic_update: NexusAutomaticUpdate {
                    disabled: true,
                    minor_version: None,
                },
                service_account_name: Some("default-community-nexus".to_string()),
                networking: NexusNetworking {
                    expose: Some(false),
                    ..NexusNetworking::default()
                },
                ..NexusSpec::default()
            },
        );
        nexus.metadata.namespace = Some("default".to_string());
        nexus
    }

    fn no_updates() -> FakeUpdateSource {
        FakeUpdateSource::with_minors(&[])
    }

    #[tokio::test]
    async fn set_defaults_deployment() {
        let minimum_probe = NexusProbe {
            initial_delay_seconds: 1,
            timeout_seconds: 1,
            period_seconds: 1,
            success_threshold: 1,
            failure_threshold: 1,
        };

        let tests: Vec<(&str, Nexus, Nexus)> = vec![
            (
                "'spec.resources' left blank",
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.resources = Default::default();
                    nexus
                },
                all_defaults_community_nexus(),
            ),
            (
                "'spec.resources' partially informed is left untouched",
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.resources.limits = None;
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.resources.limits = None;
                    nexus
                },
            ),
            (
                "'spec.useRedHatImage' set to true and 'spec.image' not left blank",
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.use_red_hat_image = true;
                    nexus.spec.image = Some("some-image".to_string());
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.use_red_hat_image = true;
                    nexus.spec.image = Some(NEXUS_CERTIFIED_IMAGE.to_string());
                    nexus
                },
            ),
            (
                "'spec.useRedHatImage' set to false and 'spec.image' left blank",
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.image = None;
                    nexus
                },
                all_defaults_community_nexus(),
            ),
            (
                "'spec.livenessProbe.successThreshold' not equal to 1",
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.liveness_probe.as_mut().unwrap().success_threshold = 2;
                    nexus
                },
                all_defaults_community_nexus(),
            ),
            (
                "'spec.livenessProbe.*' and 'spec.readinessProbe.*' don't meet minimum values",
                {
                    let mut nexus = all_defaults_community_nexus();
                    let below_minimum = NexusProbe {
                        initial_delay_seconds: -1,
                        timeout_seconds: -1,
                        period_seconds: -1,
                        success_threshold: -1,
                        failure_threshold: -1,
                    };
                    nexus.spec.liveness_probe = Some(below_minimum.clone());
                    nexus.spec.readiness_probe = Some(below_minimum);
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.liveness_probe = Some(minimum_probe.clone());
                    nexus.spec.readiness_probe = Some(minimum_probe.clone());
                    nexus
                },
            ),
            (
                "unset 'spec.livenessProbe' and 'spec.readinessProbe'",
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.liveness_probe = None;
                    nexus.spec.readiness_probe = None;
                    nexus
                },
                all_defaults_community_nexus(),
            ),
            (
                "invalid 'spec.imagePullPolicy'",
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.image_pull_policy = Some("invalid".to_string());
                    nexus
                },
                all_defaults_community_nexus(),
            ),
            (
                "recognized 'spec.imagePullPolicy' is kept",
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.image_pull_policy = Some("Never".to_string());
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.image_pull_policy = Some("Never".to_string());
                    nexus
                },
            ),
        ];

        for (name, mut input, want) in tests {
            set_defaults(&mut input, &FakeDiscovery::kubernetes(), &no_updates()).await;
            assert_eq!(want, input, "{}", name);
        }
    }

    #[tokio::test]
    async fn set_defaults_automatic_update() {
        let updates = FakeUpdateSource::with_minors(&[(69, "3.69.2"), (70, "3.70.1")]);

        // no minor informed: float on the latest minor's latest micro
        let mut nexus = Nexus::new("nexus-test", NexusSpec::default());
        nexus.spec.image = Some(NEXUS_COMMUNITY_IMAGE.to_string());
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &updates).await;
        assert!(!nexus.spec.automatic_update.disabled);
        assert_eq!(Some(70), nexus.spec.automatic_update.minor_version);
        assert_eq!(
            Some(format!("{}:3.70.1", NEXUS_COMMUNITY_IMAGE)),
            nexus.spec.image
        );

        // a pinned minor floats on its own latest micro
        let mut nexus = Nexus::new("nexus-test", NexusSpec::default());
        nexus.spec.image = Some(NEXUS_COMMUNITY_IMAGE.to_string());
        nexus.spec.automatic_update.minor_version = Some(69);
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &updates).await;
        assert_eq!(Some(69), nexus.spec.automatic_update.minor_version);
        assert_eq!(
            Some(format!("{}:3.69.2", NEXUS_COMMUNITY_IMAGE)),
            nexus.spec.image
        );

        // a retired minor falls back to the freshly resolved latest minor
        let mut nexus = Nexus::new("nexus-test", NexusSpec::default());
        nexus.spec.image = Some(NEXUS_COMMUNITY_IMAGE.to_string());
        nexus.spec.automatic_update.minor_version = Some(-1);
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &updates).await;
        assert!(!nexus.spec.automatic_update.disabled);
        assert_eq!(Some(70), nexus.spec.automatic_update.minor_version);
        assert_eq!(
            Some(format!("{}:3.70.1", NEXUS_COMMUNITY_IMAGE)),
            nexus.spec.image
        );

        // not the community image: updates disable themselves
        let mut nexus = Nexus::new("nexus-test", NexusSpec::default());
        nexus.spec.image = Some("some-image".to_string());
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &updates).await;
        assert!(nexus.spec.automatic_update.disabled);

        // unreachable tag source: updates disable themselves
        let mut nexus = Nexus::new("nexus-test", NexusSpec::default());
        nexus.spec.image = Some(NEXUS_COMMUNITY_IMAGE.to_string());
        set_defaults(
            &mut nexus,
            &FakeDiscovery::kubernetes(),
            &FakeUpdateSource::unreachable(),
        )
        .await;
        assert!(nexus.spec.automatic_update.disabled);
        assert_eq!(None, nexus.spec.automatic_update.minor_version);

        // already on the resolved tag: image is left untouched
        let mut nexus = Nexus::new("nexus-test", NexusSpec::default());
        nexus.spec.image = Some(format!("{}:3.70.1", NEXUS_COMMUNITY_IMAGE));
        nexus.spec.automatic_update.minor_version = Some(70);
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &updates).await;
        assert_eq!(
            Some(format!("{}:3.70.1", NEXUS_COMMUNITY_IMAGE)),
            nexus.spec.image
        );

        // explicitly disabled: the source is never consulted
        let mut nexus = Nexus::new("nexus-test", NexusSpec::default());
        nexus.spec.image = Some(NEXUS_COMMUNITY_IMAGE.to_string());
        nexus.spec.automatic_update.disabled = true;
        set_defaults(
            &mut nexus,
            &FakeDiscovery::kubernetes(),
            &FakeUpdateSource::unreachable(),
        )
        .await;
        assert_eq!(None, nexus.spec.automatic_update.minor_version);
        assert_eq!(Some(NEXUS_COMMUNITY_IMAGE.to_string()), nexus.spec.image);
    }

    #[tokio::test]
    async fn set_defaults_networking() {
        let tests: Vec<(&str, FakeDiscovery, Nexus, Nexus)> = vec![
            (
                "'spec.networking.exposeAs' left blank on OCP",
                FakeDiscovery::openshift(),
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus.spec.networking.expose_as = Some(ExposeType::Route);
                    nexus
                },
            ),
            (
                "'spec.networking.exposeAs' left blank on K8s",
                FakeDiscovery::with_ingress(),
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus.spec.networking.expose_as = Some(ExposeType::Ingress);
                    nexus
                },
            ),
            (
                "'spec.networking.exposeAs' left blank on K8s, but Ingress unavailable",
                FakeDiscovery::kubernetes(),
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus.spec.networking.expose_as = Some(ExposeType::NodePort);
                    nexus
                },
            ),
            (
                "discovery failures are absorbed and fall back to NodePort",
                FakeDiscovery::failing(),
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus.spec.networking.expose_as = Some(ExposeType::NodePort);
                    nexus
                },
            ),
            (
                "'spec.networking.expose' and 'spec.networking.exposeAs' both unset",
                FakeDiscovery::openshift(),
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = None;
                    nexus
                },
                all_defaults_community_nexus(),
            ),
            (
                "'spec.networking.expose' unset with 'spec.networking.exposeAs' informed",
                FakeDiscovery::kubernetes(),
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = None;
                    nexus.spec.networking.expose_as = Some(ExposeType::NodePort);
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(true);
                    nexus.spec.networking.expose_as = Some(ExposeType::NodePort);
                    nexus
                },
            ),
            (
                "'spec.networking.expose' set to false with 'spec.networking.exposeAs' blank",
                FakeDiscovery::openshift(),
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(false);
                    nexus
                },
                {
                    let mut nexus = all_defaults_community_nexus();
                    nexus.spec.networking.expose = Some(false);
                    nexus.spec.networking.expose_as = None;
                    nexus
                },
            ),
        ];

        for (name, discovery, mut input, want) in tests {
            set_defaults(&mut input, &discovery, &no_updates()).await;
            assert_eq!(want, input, "{}", name);
        }
    }

    #[tokio::test]
    async fn set_defaults_persistence() {
        let mut nexus = all_defaults_community_nexus();
        nexus.spec.persistence.persistent = true;
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &no_updates()).await;
        assert_eq!(
            Some(DEFAULT_VOLUME_SIZE.to_string()),
            nexus.spec.persistence.volume_size
        );

        // a user-informed size is kept
        let mut nexus = all_defaults_community_nexus();
        nexus.spec.persistence.persistent = true;
        nexus.spec.persistence.volume_size = Some("50Gi".to_string());
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &no_updates()).await;
        assert_eq!(Some("50Gi".to_string()), nexus.spec.persistence.volume_size);

        // not persistent: nothing to size
        let mut nexus = all_defaults_community_nexus();
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &no_updates()).await;
        assert_eq!(None, nexus.spec.persistence.volume_size);
    }

    #[tokio::test]
    async fn set_defaults_security() {
        let mut nexus = all_defaults_community_nexus();
        nexus.spec.service_account_name = None;
        set_defaults(&mut nexus, &FakeDiscovery::kubernetes(), &no_updates()).await;
        assert_eq!(all_defaults_community_nexus(), nexus);
    }

    #[tokio::test]
    async fn set_defaults_is_idempotent() {
        let updates = FakeUpdateSource::with_minors(&[(70, "3.70.1")]);

        let mut nexus = Nexus::new("nexus-test", NexusSpec::default());
        nexus.spec.persistence.persistent = true;
        nexus.spec.networking.expose = Some(true);

        set_defaults(&mut nexus, &FakeDiscovery::with_ingress(), &updates).await;
        let once = nexus.clone();
        set_defaults(&mut nexus, &FakeDiscovery::with_ingress(), &updates).await;
        assert_eq!(once, nexus);
    }
}
