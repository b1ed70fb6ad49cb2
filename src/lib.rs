pub mod admission;
pub mod cluster;
pub mod nexus_types;
pub mod update;
