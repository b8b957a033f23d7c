pub mod clusters;
pub mod metrics;
pub mod namespaces;
pub mod projects;
pub mod tenants;
