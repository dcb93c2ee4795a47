//! RPC client/server layering.
//!
//! Clients and servers are matched through specific service discovery on
//! function name, media type and labels. For every matched client a server
//! instantiates an internal per-client endpoint that owns the call handles of
//! that client; calls and responses travel on a network named by the client's
//! UUID, so unrelated pairs never see each other's traffic.

mod client;
mod server;
mod server_internal;
mod types;

pub use client::RpcClient;
pub use server::{RpcServer, RpcServerInternalFactory};
pub use server_internal::RpcServerInternal;
pub use types::{
    match_media_type, RpcCallEvent, RpcCallHandle, RpcCallHandler, RpcCallResultEvent,
    RpcCallResultHandler, RpcCallStatus, RpcSpec,
};
