//! Arena storage for quantities.
pub mod registry;
pub mod types;

pub use registry::Registry;
pub use types::{Derivation, Quantity, QuantityId, QuantityState};
