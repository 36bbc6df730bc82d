//! # locus-bridge
//!
//! A sync-first plugin facade for the locus subscription broker.
//!
//! Host runtimes call into a positioning plugin with a string action and a
//! JSON argument array, and expect results tagged with the callback they
//! belong to. [`PositioningBridge`] provides exactly that surface: the async
//! broker runs on a dedicated worker thread with its own runtime, and every
//! reply comes back as a [`PluginResult`] on a blocking iterator.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use locus_bridge::PositioningBridge;
//!
//! let bridge = PositioningBridge::new(factory, gate)?;
//! bridge.execute("initialize", r#"["api-key", "api-secret"]"#)?;
//! let once = bridge.execute("getLocation", "[5000]")?;
//!
//! if let Some(result) = bridge.iter().recv_for(once, Duration::from_secs(6)) {
//!     println!("{}", result.to_json()?);
//! }
//! ```
//!
//! ## Results
//!
//! Watches produce results with `keepCallback: true` until they are cleared
//! or fail. One-shot actions produce exactly one result. Errors carry the
//! `{"code", "message"}` object as their payload.

pub mod bridge;
pub mod error;
pub mod iter;
pub mod logging;
pub mod result;
mod worker;

pub use bridge::PositioningBridge;
pub use error::{BridgeError, Result};
pub use iter::{CallbackResults, PluginResultIterator};
pub use logging::{init_logging, init_tracing, LoggingMode};
pub use result::{PluginResult, ResultStatus};

pub use locus_broker::{BrokerConfig, BrokerStats, CallbackId, ErrorKind};

pub mod prelude {
    pub use crate::{
        BridgeError, BrokerConfig, CallbackId, ErrorKind, PluginResult, PluginResultIterator,
        PositioningBridge, ResultStatus,
    };
}
