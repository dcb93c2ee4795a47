//! Core types of the silbus co-simulation middleware.
//!
//! This crate is the foundation of the workspace: every other crate builds on
//! the service identity model ([`ServiceDescriptor`]), the typed message model
//! ([`messages::Message`]), the wire format ([`wire`]) and the participant-side
//! send surface ([`bus::Bus`]). It contains no I/O and no behavior beyond what
//! is needed to describe services and route their messages.

pub mod bus;
pub mod descriptor;
pub mod errors;
pub mod handlers;
pub mod hash;
pub mod keys;
pub mod label;
pub mod messages;
pub mod time;
pub mod wire;

pub use descriptor::{
    EndpointAddress, EndpointId, NetworkType, ParticipantId, ServiceDescriptor, ServiceType,
    SupplementalData,
};
pub use errors::{Result, SilbusError};
pub use handlers::{HandlerId, SynchronizedHandlers};
pub use label::{LabelKind, MatchingLabel};
