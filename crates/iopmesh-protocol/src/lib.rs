//! # iopmesh-protocol: shared agent interface contract
//!
//! This crate defines the data model every iopmesh crate agrees on: typed
//! IOP values, IOP tables, categories, definitions with their call
//! declarations, mapping rules, and the
//! event taxonomy exchanged with the transport layer.
//!
//! It carries no runtime dependencies (no tokio, no logging backend) so it
//! can be used as a pure contract crate by transports and tools.
//!
//! ## Module Overview
//!
//! - [`ids`]: Typed name/id wrappers (AgentName, MappingId, ObserverId)
//! - [`value`]: ValueType, IopValue, best-effort conversions, wire codec
//! - [`iop`]: Iop, IopKind, IopTable (one namespace per kind)
//! - [`definition`]: Category, Definition, compatibility checker
//! - [`call`]: Call declarations and their typed arguments
//! - [`mapping`]: MapState, MappingRule, MappingEntry, Mapping document
//! - [`event`]: InboundEvent / OutboundEvent exchanged with the transport
//! - [`ports`]: TransportPort boundary trait
//! - [`error`]: IopError, IopResult

pub mod call;
pub mod definition;
pub mod error;
pub mod event;
pub mod ids;
pub mod iop;
pub mod mapping;
pub mod ports;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use call::{Call, CallArgument};
pub use definition::{
    Category, CategoryScope, Definition, are_identical, check_category, check_category_iop,
};
pub use error::{IopError, IopResult};
pub use event::{InboundEvent, OutboundEvent};
pub use ids::{AgentName, MappingId, ObserverId};
pub use iop::{Iop, IopKind, IopTable};
pub use mapping::{AgentSelector, MapState, Mapping, MappingEntry, MappingRule, MappingTarget};
pub use ports::{NullTransport, TransportPort};
pub use value::{IopValue, ValueType};
