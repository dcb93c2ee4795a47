//! RPC user-facing data types.

use std::time::Duration;

use uuid::Uuid;

use silbus_core::label::MatchingLabel;

/// Description of an RPC endpoint: function name, media type and labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcSpec {
    function_name: String,
    media_type: String,
    labels: Vec<MatchingLabel>,
}

impl RpcSpec {
    /// Create a spec for `function_name` with the given media type.
    pub fn new(function_name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            media_type: media_type.into(),
            labels: Vec::new(),
        }
    }

    /// Attach a matching label.
    pub fn with_label(mut self, label: MatchingLabel) -> Self {
        self.labels.push(label);
        self
    }

    /// The function name.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// The media type.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The matching labels.
    pub fn labels(&self) -> &[MatchingLabel] {
        &self.labels
    }
}

/// Media-type matching: the requesting side may leave its media type empty as
/// a wildcard; a non-empty value requires string equality. An empty offered
/// media type is never a wildcard.
pub fn match_media_type(requested: &str, offered: &str) -> bool {
    requested.is_empty() || requested == offered
}

/// Outcome of an RPC call as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCallStatus {
    /// A server answered.
    Success,
    /// No server matched the client at call time.
    ServerNotReachable,
    /// A server received the call but could not handle it.
    InternalServerError,
    /// The call's timeout elapsed before all answers arrived.
    Timeout,
    /// A matched server's participant disconnected before answering.
    RecipientDisconnected,
    /// Unspecified failure.
    UndefinedError,
}

/// Result event delivered to the client's result handler, once per expected
/// answer.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCallResultEvent {
    /// Simulation time of the result.
    pub timestamp: Duration,
    /// Outcome.
    pub call_status: RpcCallStatus,
    /// Result payload; empty on failure.
    pub result_data: Vec<u8>,
    /// The token supplied at `call`.
    pub user_context: u64,
}

/// Handler for RPC results on the client side.
pub type RpcCallResultHandler = dyn Fn(&RpcCallResultEvent) + Send + Sync;

/// Handle correlating a received call with its later result submission.
///
/// Handles are only valid with the server they originated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcCallHandle {
    pub(crate) call_uuid: Uuid,
    pub(crate) client_uuid: String,
}

/// A call delivered to the server's call handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCallEvent {
    /// Simulation time of the call.
    pub timestamp: Duration,
    /// Handle to answer the call with.
    pub call_handle: RpcCallHandle,
    /// Argument payload.
    pub data: Vec<u8>,
}

/// Handler for incoming calls on the server side.
pub type RpcCallHandler = dyn Fn(RpcCallEvent) + Send + Sync;
