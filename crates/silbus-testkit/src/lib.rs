//! In-memory simulation harness.
//!
//! Connects participants through peer links that encode every frame to bytes
//! and decode it on the far side, so tests exercise the real wire format
//! without sockets. Delivery is synchronous and deterministic.

mod harness;
mod link;
mod time;

pub use harness::SimulationHarness;
pub use link::InMemoryLink;
pub use time::ManualTimeProvider;
