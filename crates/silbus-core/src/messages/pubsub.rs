//! Publish/subscribe payloads.

use std::time::Duration;

use crate::errors::Result;
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// One published data sample, broadcast on the topic network.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessageEvent {
    /// Simulation time at publication.
    pub timestamp: Duration,
    /// Serialised sample.
    pub data: Vec<u8>,
}

impl WireEncode for DataMessageEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_byte_vec(&self.data);
    }
}

impl WireDecode for DataMessageEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            data: reader.byte_vec()?,
        })
    }
}
