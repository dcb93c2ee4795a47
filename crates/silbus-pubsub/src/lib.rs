//! Topic-based publish/subscribe endpoints.
//!
//! Publishers announce `(topic, media type, labels)` through discovery and
//! broadcast their samples on the topic network. Subscribers match
//! publishers through the specific discovery store; the first match creates
//! an internal subscriber endpoint on the topic network, which delivers only
//! the samples of matched publishers.

mod publisher;
mod subscriber;
mod subscriber_internal;
mod types;

pub use publisher::DataPublisher;
pub use subscriber::{DataSubscriber, DataSubscriberInternalFactory};
pub use subscriber_internal::DataSubscriberInternal;
pub use types::{DataMessageHandler, PubSubSpec};
