//! Common types used throughout the protocol

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Lumi (Aqara) manufacturer code carried in manufacturer-specific frames
pub const MANUFACTURER_CODE: u16 = 0x115F;

/// Protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid color format: {0}")]
    InvalidColorFormat(String),

    #[error("Color count must be between 1 and 8, got {0}")]
    InvalidColorCount(usize),

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// ZCL cluster IDs
pub mod clusters {
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;
    /// Lumi private cluster (`manuSpecificLumi`)
    pub const MANU_SPECIFIC_LUMI: u16 = 0xFCC0;
}

/// Attribute IDs on the Lumi private cluster
pub mod lumi_attrs {
    pub const DIMMING_RANGE_MINIMUM: u16 = 0x0515;
    pub const DIMMING_RANGE_MAXIMUM: u16 = 0x0516;
    pub const POWER_ON_BEHAVIOR: u16 = 0x0517;
    /// Effect type enum (T2 bulbs)
    pub const RGB_EFFECT: u16 = 0x051F;
    /// Effect speed percent (T2 bulbs)
    pub const RGB_EFFECT_SPEED: u16 = 0x0520;
    /// Shared color / effect-type / speed payload, keyed by the third byte
    pub const RGB_EFFECT_PAYLOAD: u16 = 0x0527;
    pub const TRANSITION_CURVE_CURVATURE: u16 = 0x0528;
    pub const TRANSITION_INITIAL_BRIGHTNESS: u16 = 0x052C;
}

/// Level Control cluster attributes
pub mod level_attrs {
    pub const ON_TRANSITION_TIME: u16 = 0x0012;
    pub const OFF_TRANSITION_TIME: u16 = 0x0013;
}

/// ZCL data types used by the lights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    Uint8 = 0x20,
    Uint16 = 0x21,
    Uint32 = 0x23,
    Enum8 = 0x30,
    OctetString = 0x41,
}

/// A typed attribute value as carried in read/write attribute records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Enum8(u8),
    OctetString(Bytes),
}

impl AttributeValue {
    /// ZCL data type tag for this value
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            AttributeValue::Uint8(_) => DataType::Uint8,
            AttributeValue::Uint16(_) => DataType::Uint16,
            AttributeValue::Uint32(_) => DataType::Uint32,
            AttributeValue::Enum8(_) => DataType::Enum8,
            AttributeValue::OctetString(_) => DataType::OctetString,
        }
    }

    /// Numeric view of the value, `None` for octet strings
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttributeValue::Uint8(v) | AttributeValue::Enum8(v) => Some(u32::from(*v)),
            AttributeValue::Uint16(v) => Some(u32::from(*v)),
            AttributeValue::Uint32(v) => Some(*v),
            AttributeValue::OctetString(_) => None,
        }
    }

    /// Append the value (without its type tag) in ZCL encoding
    ///
    /// Integers are little-endian; octet strings carry a one-byte length prefix.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_to(&self, out: &mut BytesMut) {
        match self {
            AttributeValue::Uint8(v) | AttributeValue::Enum8(v) => out.put_u8(*v),
            AttributeValue::Uint16(v) => out.put_u16_le(*v),
            AttributeValue::Uint32(v) => out.put_u32_le(*v),
            AttributeValue::OctetString(data) => {
                // ZCL octet strings hold at most 254 bytes
                let len = data.len().min(0xFE);
                out.put_u8(len as u8);
                out.put_slice(&data[..len]);
            }
        }
    }
}
