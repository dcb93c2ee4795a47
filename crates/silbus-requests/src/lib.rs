//! Request/reply plane.
//!
//! A UUID-keyed procedure-call fabric layered on top of the message bus.
//! Calls broadcast to all participants; each recipient answers with exactly
//! one call return, either over the wire or synthesised locally when the
//! recipient disconnects before replying. Procedures are pluggable; the
//! all-participants-replied barrier is the built-in one.

mod participant_replies;
mod service;

pub use participant_replies::ParticipantReplies;
pub use service::{CallReturnSink, RequestReplyProcedure, RequestReplyService};
