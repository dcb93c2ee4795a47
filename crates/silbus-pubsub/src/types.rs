//! Publish/subscribe user-facing data types.

use silbus_core::label::MatchingLabel;
use silbus_core::messages::pubsub::DataMessageEvent;

/// Description of a data endpoint: topic, media type and labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubSubSpec {
    topic: String,
    media_type: String,
    labels: Vec<MatchingLabel>,
}

impl PubSubSpec {
    /// Create a spec for `topic` with the given media type.
    pub fn new(topic: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            media_type: media_type.into(),
            labels: Vec::new(),
        }
    }

    /// Attach a matching label.
    pub fn with_label(mut self, label: MatchingLabel) -> Self {
        self.labels.push(label);
        self
    }

    /// The topic.
    pub fn topic(&self) -> &str {
        &self.topic
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

/// Handler for received data samples.
pub type DataMessageHandler = dyn Fn(&DataMessageEvent) + Send + Sync;
