//! The participant-internal message bus surface.
//!
//! Services do not talk to the transport directly; they hand messages to the
//! participant's router through [`Bus`] and receive inbound messages through
//! [`MessageReceiver`]. The router fans broadcasts out to local receivers and
//! remote peers and delivers directed sends to exactly one peer.

use crate::descriptor::ServiceDescriptor;
use crate::messages::{Message, MessageKind};

/// A job posted to the router's I/O context.
pub type DeferredJob = Box<dyn FnOnce() + Send>;

/// The identity contract every service implements.
pub trait ServiceEndpoint: Send + Sync {
    /// The service's descriptor.
    fn service_descriptor(&self) -> ServiceDescriptor;

    /// Replace the service's descriptor. Called once by the participant when
    /// the service is created.
    fn set_service_descriptor(&self, descriptor: ServiceDescriptor);
}

/// Receiver of inbound messages.
///
/// The router dispatches on the concrete message kind; a service only sees
/// the kinds it registered for. Receivers must suppress their own broadcasts
/// via [`ServiceDescriptor::is_same_service`] where self-delivery is not
/// wanted; the router already applies that gate for fan-out delivery.
pub trait MessageReceiver: Send + Sync {
    /// Handle one inbound message.
    fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message);
}

/// A service as the router sees it: identity plus receive entry point.
pub trait BusService: ServiceEndpoint + MessageReceiver {}

impl<T: ServiceEndpoint + MessageReceiver> BusService for T {}

/// Outbound surface of the participant's router.
pub trait Bus: Send + Sync {
    /// Name of the owning participant.
    fn participant_name(&self) -> &str;

    /// Broadcast a message to all remote peers and matching local receivers.
    fn send_msg(&self, from: &ServiceDescriptor, msg: Message);

    /// Send a message to exactly the named participant. Unknown targets are
    /// dropped silently; disconnect detection surfaces the loss.
    fn send_msg_to(&self, from: &ServiceDescriptor, target_participant: &str, msg: Message);

    /// Post a closure to the router's I/O context.
    ///
    /// Used by callers that must observe a stable snapshot of volatile router
    /// state (e.g. the remote receiver list) without a participant joining in
    /// between.
    fn execute_deferred(&self, job: DeferredJob);

    /// Invoke `callback` once all queued outbound messages have been handed
    /// to the transport.
    fn on_all_messages_delivered(&self, callback: DeferredJob);

    /// Flush all peer send buffers.
    fn flush_send_buffers(&self);

    /// Names of the remote participants that currently receive messages of
    /// `kind` on the sender's network.
    fn remote_receivers_of(&self, from: &ServiceDescriptor, kind: MessageKind) -> Vec<String>;
}
