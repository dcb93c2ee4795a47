//! The simulation participant.
//!
//! A participant owns a message router, the internal services (discovery,
//! request/reply, lifecycle, system monitor) and every controller or data/RPC
//! endpoint created through it. Peers connect through [`PeerLink`]
//! implementations; the in-memory link of the testkit and a socket transport
//! plug in equally.

mod participant;
mod router;
mod timeout;

pub use participant::Participant;
pub use router::{PeerLink, Router};
pub use timeout::TimeoutScheduler;
