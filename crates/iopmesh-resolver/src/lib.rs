//! Mapping resolution for iopmesh agents.
//!
//! - [`PeerDirectory`]: known remote agents and their live definitions
//! - [`CategoryCatalog`]: category templates known locally
//! - [`MappingTable`]: mapping entries, their live state, and the resolver
//!   pass that turns state transitions into subscription side effects, one
//!   per publisher `(agent, output)`

mod directory;
mod table;

pub use directory::{CategoryCatalog, PeerDirectory};
pub use table::{LinkKey, LinkState, MappingTable, ResolveContext, SubscriptionChange};
