//! # locus-broker
//!
//! Subscription broker between a scripting client and an indoor positioning
//! provider.
//!
//! Clients send named commands with positional JSON arguments (`addWatch`,
//! `getLocation`, `fetchFloorPlan`, ...) together with a [`Subscriber`] that
//! receives the answers. The broker keeps named position and region watches,
//! one-shot location requests with per-request timeouts, and at most one
//! cancellable floor plan fetch. It starts the provider session when the first
//! subscriber arrives and stops it as soon as the last one leaves.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use locus_broker::{Broker, BrokerConfig, Subscriber};
//! use serde_json::json;
//!
//! let handle = Broker::spawn(BrokerConfig::default(), Arc::new(factory), Arc::new(gate))?;
//!
//! let (subscriber, mut replies) = Subscriber::channel();
//! handle.execute("initialize", &json!(["key", "secret"]), subscriber)?;
//!
//! let (subscriber, mut locations) = Subscriber::channel();
//! handle.execute("addWatch", &json!(["lobby", 30_000]), subscriber)?;
//! while let Some(reply) = locations.recv().await {
//!     println!("{:?}", reply.payload());
//! }
//! ```

mod broker;
mod command;
mod config;
mod error;
mod fetch;
mod permission;
mod registry;
mod session;
mod subscriber;
mod timeout;
mod types;

pub use broker::{Broker, BrokerHandle, BrokerStats};
pub use command::Command;
pub use config::BrokerConfig;
pub use error::*;
pub use fetch::FetchCanceller;
pub use permission::PermissionSlots;
pub use registry::WatchRegistry;
pub use session::Session;
pub use subscriber::{Outcome, Reply, Subscriber};
pub use timeout::TimeoutSupervisor;
pub use types::*;
