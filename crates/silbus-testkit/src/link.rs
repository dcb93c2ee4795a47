//! Wire-encoded in-process peer link.

use std::sync::Weak;

use tracing::error;

use silbus_core::messages::{MessageKind, WireFrame};
use silbus_participant::{PeerLink, Router};

/// Peer link that serialises every frame through the wire format and hands
/// the decoded result to the target participant's router.
pub struct InMemoryLink {
    peer_name: String,
    target: Weak<Router>,
}

impl InMemoryLink {
    /// Create a link to the participant owning `target`.
    pub fn new(peer_name: impl Into<String>, target: Weak<Router>) -> Self {
        Self {
            peer_name: peer_name.into(),
            target,
        }
    }
}

impl PeerLink for InMemoryLink {
    fn peer_name(&self) -> &str {
        &self.peer_name
    }

    fn send_frame(&self, frame: &WireFrame) {
        let Some(target) = self.target.upgrade() else {
            return;
        };
        // Round-trip through the encoded representation; a socket transport
        // would ship exactly these bytes.
        let bytes = frame.to_bytes();
        match WireFrame::from_bytes(&bytes) {
            Ok(decoded) => target.receive_frame(&decoded),
            Err(err) => error!(%err, "dropping malformed frame"),
        }
    }

    fn wants(&self, kind: MessageKind, network: &str) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.has_local_receiver(kind, network))
    }
}
