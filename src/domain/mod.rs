//! Domain layer - port definitions shared by the bootstrap flow
//!
//! Adapters in [`crate::adapters`] implement these ports against the
//! Kubernetes API and the Windows guest.

pub mod ports;

pub use ports::*;
