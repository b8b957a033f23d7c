//! State store, typed registries, watch-fed listers and the project lock
//! registry.

pub mod client;
pub mod error;
pub mod lister;
pub mod lock;
pub mod registry;
pub mod resources;
pub mod watch;

pub use client::StateStore;
pub use error::StoreError;
pub use lister::Lister;
pub use lock::{ProjectLockGuard, ProjectLockRegistry};
pub use registry::Registry;
pub use resources::{Listers, Registries};
