//! Admission-time defaulting and validation for the Nexus custom resource.
//!
//! Defaulting fills in everything the user left unset, conditioned on what
//! the cluster supports and on the newest published image tags; validation
//! rejects spec combinations the cluster cannot honor. Both take a fresh
//! capability snapshot per invocation and hold no state across calls.

mod defaulter;
mod defaults;
mod validator;

pub use defaulter::set_defaults;
pub use defaults::{
    default_probe, default_resources, preferred_expose_type, DEFAULT_VOLUME_SIZE,
    NEXUS_CERTIFIED_IMAGE, NEXUS_COMMUNITY_IMAGE, PROBE_MINIMUM, RECOGNIZED_PULL_POLICIES,
};
pub use validator::{validate, ValidationError};
