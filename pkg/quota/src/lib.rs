//! Resource quantities, quota limit sets and the hierarchical fit engine.
//!
//! Everything in this crate is pure computation: no I/O, no locking.
//! Callers load limit sets from the state store, run the fit checks here and
//! decide what to persist.

pub mod error;
pub mod fit;
pub mod key;
pub mod limits;
pub mod quantity;

pub use error::QuotaError;
pub use fit::{FitReport, OvercommitFactor, ProjectClaim};
pub use key::ResourceKey;
pub use limits::ResourceLimitSet;
pub use quantity::{Quantity, QuantityFormat};
