//! Framed binary wire format.
//!
//! Messages travel as length-delimited frames over a reliable byte stream.
//! Inside a frame, integers are little-endian, enumerations are unsigned
//! integers of their declared width, strings are `u32`-prefixed UTF-8,
//! sequences are a `u32` count followed by the element stream, and maps are a
//! `u32` count followed by key/value pairs.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use uuid::Uuid;

use crate::descriptor::ServiceDescriptor;
use crate::errors::{Result, SilbusError};

/// Growable buffer for encoding one message.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    bytes: BytesMut,
}

#[allow(missing_docs)]
impl MessageBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the buffer and return the encoded bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Number of encoded bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when nothing has been encoded yet.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.bytes.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.bytes.put_u16_le(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.bytes.put_u32_le(value);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.bytes.put_u64_le(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.bytes.put_i64_le(value);
    }

    pub fn put_u128(&mut self, value: u128) {
        self.bytes.put_u128_le(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    /// Encode a UUID as its 128-bit value.
    pub fn put_uuid(&mut self, value: Uuid) {
        self.put_u128(value.as_u128());
    }

    /// Encode a timestamp as nanoseconds.
    pub fn put_timestamp(&mut self, value: Duration) {
        self.put_u64(value.as_nanos() as u64);
    }

    /// Encode a `u32`-prefixed UTF-8 string.
    pub fn put_string(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.bytes.put_slice(value.as_bytes());
    }

    /// Encode a `u32`-prefixed byte sequence.
    pub fn put_byte_vec(&mut self, value: &[u8]) {
        self.put_u32(value.len() as u32);
        self.bytes.put_slice(value);
    }

    /// Encode a string map as count plus key/value pairs.
    pub fn put_string_map(&mut self, value: &BTreeMap<String, String>) {
        self.put_u32(value.len() as u32);
        for (key, item) in value {
            self.put_string(key);
            self.put_string(item);
        }
    }
}

/// Cursor for decoding one message.
///
/// All reads are bounds-checked; running off the end of the frame is a
/// protocol error.
pub struct MessageReader<'a> {
    bytes: &'a [u8],
}

#[allow(missing_docs)]
impl<'a> MessageReader<'a> {
    /// Wrap an encoded frame.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Unconsumed byte count.
    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn ensure(&self, len: usize) -> Result<()> {
        if self.bytes.len() < len {
            return Err(SilbusError::protocol(format!(
                "truncated frame: needed {len} bytes, {} remain",
                self.bytes.len()
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.bytes.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.bytes.get_u16_le())
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.bytes.get_u32_le())
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.bytes.get_u64_le())
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.bytes.get_i64_le())
    }

    pub fn u128(&mut self) -> Result<u128> {
        self.ensure(16)?;
        Ok(self.bytes.get_u128_le())
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn uuid(&mut self) -> Result<Uuid> {
        Ok(Uuid::from_u128(self.u128()?))
    }

    pub fn timestamp(&mut self) -> Result<Duration> {
        Ok(Duration::from_nanos(self.u64()?))
    }

    pub fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        self.ensure(len)?;
        let (head, tail) = self.bytes.split_at(len);
        let value = std::str::from_utf8(head)
            .map_err(|error| SilbusError::protocol(format!("invalid UTF-8 string: {error}")))?
            .to_string();
        self.bytes = tail;
        Ok(value)
    }

    pub fn byte_vec(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        self.ensure(len)?;
        let (head, tail) = self.bytes.split_at(len);
        let value = head.to_vec();
        self.bytes = tail;
        Ok(value)
    }

    pub fn string_map(&mut self) -> Result<BTreeMap<String, String>> {
        let count = self.u32()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.string()?;
            let value = self.string()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

/// Encode a value into a message buffer.
pub trait WireEncode {
    /// Append the wire representation of `self` to `buffer`.
    fn encode(&self, buffer: &mut MessageBuffer);
}

/// Decode a value from a message reader.
pub trait WireDecode: Sized {
    /// Parse the wire representation from `reader`.
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self>;
}

// Field order is fixed: participantName, serviceType, networkName,
// networkType, serviceName, serviceId, supplementalData, participantId.
impl WireEncode for ServiceDescriptor {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_string(self.participant_name());
        buffer.put_u8(self.service_type().to_wire());
        buffer.put_string(self.network_name());
        buffer.put_u8(self.network_type().to_wire());
        buffer.put_string(self.service_name());
        buffer.put_u64(self.service_id());
        buffer.put_string_map(self.supplemental_data());
        buffer.put_u64(self.participant_id());
    }
}

impl WireDecode for ServiceDescriptor {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        let mut descriptor = ServiceDescriptor::default();
        let participant_name = reader.string()?;
        descriptor.set_participant_name(participant_name);
        descriptor.set_service_type(crate::descriptor::ServiceType::from_wire(reader.u8()?)?);
        descriptor.set_network_name(reader.string()?);
        descriptor.set_network_type(crate::descriptor::NetworkType::from_wire(reader.u8()?)?);
        descriptor.set_service_name(reader.string()?);
        descriptor.set_service_id(reader.u64()?);
        descriptor.set_supplemental_data(reader.string_map()?);
        descriptor.set_participant_id_raw(reader.u64()?);
        Ok(descriptor)
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u32(self.len() as u32);
        for item in self {
            item.encode(buffer);
        }
    }
}

impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        let count = reader.u32()?;
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{NetworkType, ServiceType};
    use crate::keys;

    #[test]
    fn primitives_round_trip() {
        let mut buffer = MessageBuffer::new();
        buffer.put_u8(0xAB);
        buffer.put_u16(0x1234);
        buffer.put_u32(0xDEAD_BEEF);
        buffer.put_u64(42);
        buffer.put_string("hello");
        buffer.put_byte_vec(&[1, 2, 3]);
        let uuid = Uuid::new_v4();
        buffer.put_uuid(uuid);
        let bytes = buffer.into_vec();

        let mut reader = MessageReader::new(&bytes);
        assert_eq!(reader.u8().unwrap(), 0xAB);
        assert_eq!(reader.u16().unwrap(), 0x1234);
        assert_eq!(reader.u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.u64().unwrap(), 42);
        assert_eq!(reader.string().unwrap(), "hello");
        assert_eq!(reader.byte_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(reader.uuid().unwrap(), uuid);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn integers_are_little_endian() {
        let mut buffer = MessageBuffer::new();
        buffer.put_u32(1);
        assert_eq!(buffer.into_vec(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn truncated_frames_are_protocol_errors() {
        let mut reader = MessageReader::new(&[0x01]);
        assert!(matches!(reader.u32(), Err(SilbusError::Protocol { .. })));

        // A string length that runs past the end of the frame.
        let mut buffer = MessageBuffer::new();
        buffer.put_u32(100);
        let bytes = buffer.into_vec();
        let mut reader = MessageReader::new(&bytes);
        assert!(matches!(reader.string(), Err(SilbusError::Protocol { .. })));
    }

    #[test]
    fn service_descriptor_round_trips_bit_exact() {
        let mut descriptor = ServiceDescriptor::new("P1", "CAN1", "CanCtrl1", 7);
        descriptor.set_service_type(ServiceType::Controller);
        descriptor.set_network_type(NetworkType::Can);
        descriptor.set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_CAN);
        descriptor.set_supplemental_data_item("extra", "value");

        let mut buffer = MessageBuffer::new();
        descriptor.encode(&mut buffer);
        let first = buffer.into_vec();

        let decoded = ServiceDescriptor::decode(&mut MessageReader::new(&first)).unwrap();
        assert_eq!(decoded.participant_name(), descriptor.participant_name());
        assert_eq!(decoded.participant_id(), descriptor.participant_id());
        assert_eq!(decoded.supplemental_data(), descriptor.supplemental_data());
        assert_eq!(decoded, descriptor);

        let mut buffer = MessageBuffer::new();
        decoded.encode(&mut buffer);
        assert_eq!(buffer.into_vec(), first);
    }
}
