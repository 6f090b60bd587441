//! One iopmesh agent as an explicit context object.
//!
//! [`Agent`] owns the local definition, the live IOP registry, the mapping
//! table, the directory of known peers and the category catalog. Every
//! mutation goes through `&mut Agent`; hosts that receive network traffic on
//! several threads funnel it through an [`AgentHandle`].
//!
//! Observers receive `&mut Agent` while they run, so reacting to an input by
//! writing an output never goes back through the handle.

mod agent;
mod config;
mod handle;

pub use agent::{Agent, DeliveryReport, PeerBatchReport, StatusObserver};
pub use config::{AgentBuilder, AgentConfig};
pub use handle::{AgentHandle, InboundOutcome};
