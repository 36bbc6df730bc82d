//! # locus-provider
//!
//! Abstractions over an indoor positioning backend.
//!
//! The positioning engine itself (sensor fusion, floor detection, region
//! geofencing) is an external collaborator. This crate defines the records it
//! produces and the traits the broker drives it through, so the subscription
//! logic in `locus-broker` can run against any backend:
//!
//! - [`ProviderFactory`] builds [`ProviderClients`] from [`Credentials`]
//! - [`LocationClient`] starts and stops the positioning session and accepts
//!   explicit positions
//! - [`ResourceClient`] fetches floor plans, cancellable by dropping the future
//! - [`PermissionGate`] checks and prompts for platform capabilities
//!
//! With the `test-support` feature the crate also ships a scriptable
//! [`SimulatedProvider`](simulated::SimulatedProvider).

mod client;
mod error;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod simulated;

pub use client::*;
pub use error::*;
pub use types::*;
