//! The subscription broker.
//!
//! This module is split into focused submodules:
//!
//! - `core`: the [`Broker`] state and its message loop
//! - `router`: command dispatch onto the registry, timers, fetches and permissions
//! - `handle`: the cloneable [`BrokerHandle`] clients talk through
//!
//! # Architecture
//!
//! One tokio task owns every piece of mutable state: clients, registry,
//! timers, the active fetch, permission slots and the session flag. Commands,
//! provider events, timer firings, fetch completions and permission answers
//! all arrive as messages on a single unbounded channel, so they are handled
//! strictly in arrival order and no state is ever locked.
//!
//! Everything the broker hands out to run elsewhere (provider event sinks,
//! timer tasks, fetch tasks, permission callbacks) holds only a weak sender
//! into that channel. Once every [`BrokerHandle`] is dropped the loop ends.

mod core;
mod handle;
mod router;

pub use self::core::Broker;
pub use handle::{BrokerHandle, BrokerStats};

pub(crate) use self::core::Message;
