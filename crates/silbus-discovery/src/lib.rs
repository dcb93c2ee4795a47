//! Peer-to-peer service discovery.
//!
//! Each participant maintains an eventually consistent directory of every
//! service announced by itself and its peers. Incremental changes travel as
//! broadcast events; a joining participant receives one targeted reply with
//! the full service list of each peer. Publish/subscribe and RPC matching go
//! through a pre-indexed lookup store so that per-event work stays
//! proportional to the number of matching handlers.

mod service_discovery;
mod specific_store;

pub use service_discovery::{ServiceDiscovery, ServiceDiscoveryHandler};
pub use specific_store::SpecificDiscoveryStore;
