//! ZCL frames for the attribute reads, writes and commands the lights need
//!
//! ```text
//! [control] [manufacturer code LE, if control & 0x04] [sequence] [command] [payload..]
//! ```

use crate::types::AttributeValue;
use bytes::{BufMut, Bytes, BytesMut};

/// Frame control bits
pub mod control {
    pub const CLUSTER_SPECIFIC: u8 = 0x01;
    pub const MANUFACTURER_SPECIFIC: u8 = 0x04;
    pub const DISABLE_DEFAULT_RESPONSE: u8 = 0x10;
}

/// Profile-wide command ids
pub mod global {
    pub const READ_ATTRIBUTES: u8 = 0x00;
    pub const WRITE_ATTRIBUTES: u8 = 0x02;
}

/// An outgoing ZCL frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZclFrame {
    control: u8,
    manufacturer: Option<u16>,
    sequence: u8,
    command: u8,
    payload: Bytes,
}

impl ZclFrame {
    fn build(control: u8, manufacturer: Option<u16>, sequence: u8, command: u8, payload: Bytes) -> Self {
        let control = match manufacturer {
            Some(_) => control | control::MANUFACTURER_SPECIFIC,
            None => control,
        };
        Self {
            control,
            manufacturer,
            sequence,
            command,
            payload,
        }
    }

    /// Read Attributes: attribute ids as LE u16s
    #[must_use]
    pub fn read_attributes(sequence: u8, manufacturer: Option<u16>, attributes: &[u16]) -> Self {
        let mut payload = BytesMut::with_capacity(attributes.len() * 2);
        for id in attributes {
            payload.put_u16_le(*id);
        }
        Self::build(0, manufacturer, sequence, global::READ_ATTRIBUTES, payload.freeze())
    }

    /// Write Attributes: one `[id LE] [data type] [value]` record per attribute
    #[must_use]
    pub fn write_attributes(
        sequence: u8,
        manufacturer: Option<u16>,
        records: &[(u16, AttributeValue)],
        disable_default_response: bool,
    ) -> Self {
        let mut payload = BytesMut::new();
        for (id, value) in records {
            payload.put_u16_le(*id);
            payload.put_u8(value.data_type() as u8);
            value.write_to(&mut payload);
        }
        let flags = if disable_default_response {
            control::DISABLE_DEFAULT_RESPONSE
        } else {
            0
        };
        Self::build(flags, manufacturer, sequence, global::WRITE_ATTRIBUTES, payload.freeze())
    }

    /// Cluster-specific command such as on/off `on` (0x01)
    #[must_use]
    pub fn cluster_command(sequence: u8, manufacturer: Option<u16>, command: u8, payload: Bytes) -> Self {
        Self::build(control::CLUSTER_SPECIFIC, manufacturer, sequence, command, payload)
    }

    #[must_use]
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    #[must_use]
    pub fn is_manufacturer_specific(&self) -> bool {
        self.control & control::MANUFACTURER_SPECIFIC != 0
    }

    /// Frame bytes as sent over the air
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5 + self.payload.len());
        buf.put_u8(self.control);
        if let Some(code) = self.manufacturer {
            buf.put_u16_le(code);
        }
        buf.put_u8(self.sequence);
        buf.put_u8(self.command);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
