//! RGB effect payloads written to the Lumi private cluster
//!
//! Color, effect-type and speed updates share attribute `0x0527`. Every
//! payload starts with the same four-byte header:
//!
//! ```text
//! [0x01] [0x01] [kind] [body length]
//! ```
//!
//! where `kind` is `0x03` (colors), `0x04` (effect type) or `0x05` (speed).

use crate::color::Color;
use crate::types::{lumi_attrs, AttributeValue, DataType, ProtocolError};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Maximum palette size accepted by the firmware
pub const MAX_COLORS: usize = 8;

/// Header size shared by every effect payload
pub const HEADER_LEN: usize = 4;

/// Fixed reserved region of the effect-type payload (vendor private)
const EFFECT_TYPE_RESERVED: [u8; 11] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00,
];

/// Third header byte of a `0x0527` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Colors = 0x03,
    EffectType = 0x04,
    Speed = 0x05,
}

impl PacketKind {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x03 => Some(PacketKind::Colors),
            0x04 => Some(PacketKind::EffectType),
            0x05 => Some(PacketKind::Speed),
            _ => None,
        }
    }
}

/// An attribute payload ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Attribute on the Lumi private cluster
    pub attribute: u16,
    /// Typed value carried by the write record
    pub value: AttributeValue,
}

impl Packet {
    /// Raw octet-string packet on `0x0527`
    #[must_use]
    pub fn effect_payload(payload: Bytes) -> Self {
        Self {
            attribute: lumi_attrs::RGB_EFFECT_PAYLOAD,
            value: AttributeValue::OctetString(payload),
        }
    }

    /// Declared wire type
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    /// Payload bytes for octet-string packets
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.value {
            AttributeValue::OctetString(data) => Some(data),
            _ => None,
        }
    }

    /// Short human-readable form for logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self.payload() {
            Some(data) => match DecodedPacket::parse(data) {
                Ok(decoded) => format!("{:#06x} {decoded:?}", self.attribute),
                Err(_) => format!("{:#06x} {:02X?}", self.attribute, data),
            },
            None => format!("{:#06x} {:?}", self.attribute, self.value),
        }
    }
}

/// Conversion from a 1..=100 percentage to the single wire byte
///
/// Both scalings exist in the field. Each device family pins one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentScale {
    /// `round(p / 100 * 255)`
    Full255,
    /// `round(p / 100 * 254)`
    Reduced254,
}

impl PercentScale {
    #[must_use]
    pub fn max(&self) -> u8 {
        match self {
            PercentScale::Full255 => 255,
            PercentScale::Reduced254 => 254,
        }
    }

    /// Scale a percentage; values above 100 saturate
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_wire(&self, percent: u8) -> u8 {
        let percent = f64::from(percent.min(100));
        (percent / 100.0 * f64::from(self.max())).round() as u8
    }
}

/// Encode one color as `[x_hi, x_lo, y_hi, y_lo]`
#[must_use]
pub fn encode_color(color: &Color) -> [u8; 4] {
    let (x, y) = color.chromaticity().quantize();
    let [x_hi, x_lo] = x.to_be_bytes();
    let [y_hi, y_lo] = y.to_be_bytes();
    [x_hi, x_lo, y_hi, y_lo]
}

/// Inverse of [`encode_color`]
#[must_use]
pub fn decode_color(bytes: [u8; 4]) -> (u16, u16) {
    (
        u16::from_be_bytes([bytes[0], bytes[1]]),
        u16::from_be_bytes([bytes[2], bytes[3]]),
    )
}

/// Build the palette payload
///
/// ```text
/// [01 01 03 len] [brightness 00 count] [x_hi x_lo y_hi y_lo]*count
/// ```
/// with `len = 3 + 4 * count`.
#[allow(clippy::cast_possible_truncation)]
pub fn color_packet(colors: &[Color], brightness: u8) -> Result<Packet, ProtocolError> {
    if colors.is_empty() || colors.len() > MAX_COLORS {
        return Err(ProtocolError::InvalidColorCount(colors.len()));
    }

    // Bounded by MAX_COLORS above
    let count = colors.len() as u8;
    let body_len = 3 + 4 * count;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + body_len as usize);
    buf.put_slice(&[0x01, 0x01, PacketKind::Colors as u8, body_len]);
    buf.put_slice(&[brightness, 0x00, count]);
    for color in colors {
        buf.put_slice(&encode_color(color));
    }

    Ok(Packet::effect_payload(buf.freeze()))
}

/// Build the 16-byte effect-type payload
#[must_use]
pub fn effect_type_packet(effect_id: u8) -> Packet {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_slice(&[0x01, 0x01, PacketKind::EffectType as u8, 0x0C]);
    buf.put_slice(&EFFECT_TYPE_RESERVED);
    buf.put_u8(effect_id);
    Packet::effect_payload(buf.freeze())
}

/// Build the 5-byte speed payload
#[must_use]
pub fn speed_packet(speed: u8) -> Packet {
    Packet::effect_payload(Bytes::copy_from_slice(&[
        0x01,
        0x01,
        PacketKind::Speed as u8,
        0x01,
        speed,
    ]))
}

/// A parsed `0x0527` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPacket {
    Colors {
        brightness: u8,
        /// Quantized `(x, y)` per color
        points: Vec<(u16, u16)>,
    },
    EffectType {
        effect_id: u8,
    },
    Speed {
        speed: u8,
    },
}

impl DecodedPacket {
    /// Parse a payload previously produced by the builders above
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::FrameTooShort(data.len()));
        }
        if data[0] != 0x01 || data[1] != 0x01 {
            return Err(ProtocolError::InvalidFrame(format!(
                "unexpected header {:02X?}",
                &data[..2]
            )));
        }

        let kind = PacketKind::from_u8(data[2])
            .ok_or_else(|| ProtocolError::InvalidFrame(format!("unknown kind {:#04x}", data[2])))?;
        let body_len = data[3] as usize;
        let body = &data[HEADER_LEN..];
        if body.len() != body_len {
            return Err(ProtocolError::InvalidFrame(format!(
                "length mismatch: header says {}, actual {}",
                body_len,
                body.len()
            )));
        }

        match kind {
            PacketKind::Colors => {
                if body.len() < 3 {
                    return Err(ProtocolError::FrameTooShort(data.len()));
                }
                let brightness = body[0];
                let count = body[2] as usize;
                let colors = &body[3..];
                if colors.len() != count * 4 {
                    return Err(ProtocolError::InvalidFrame(format!(
                        "{} color bytes for {} colors",
                        colors.len(),
                        count
                    )));
                }
                let points = colors
                    .chunks_exact(4)
                    .map(|c| decode_color([c[0], c[1], c[2], c[3]]))
                    .collect();
                Ok(DecodedPacket::Colors { brightness, points })
            }
            PacketKind::EffectType => {
                if body.len() != 12 {
                    return Err(ProtocolError::InvalidFrame(format!(
                        "effect type body is {} bytes",
                        body.len()
                    )));
                }
                Ok(DecodedPacket::EffectType {
                    effect_id: body[11],
                })
            }
            PacketKind::Speed => {
                if body.len() != 1 {
                    return Err(ProtocolError::InvalidFrame(format!(
                        "speed body is {} bytes",
                        body.len()
                    )));
                }
                Ok(DecodedPacket::Speed { speed: body[0] })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_red() {
        assert_eq!(encode_color(&Color::RED), [0xA3, 0xD6, 0x54, 0x7B]);
    }

    #[test]
    fn test_encode_black() {
        assert_eq!(encode_color(&Color::new(0, 0, 0)), [0, 0, 0, 0]);
    }

    #[test]
    fn test_color_bytes_reproduce_quantized_point() {
        for color in [Color::RED, Color::GREEN, Color::BLUE, Color::new(12, 200, 99)] {
            let quantized = color.chromaticity().quantize();
            assert_eq!(decode_color(encode_color(&color)), quantized);
        }
    }

    #[test]
    fn test_three_color_packet_layout() {
        let packet = color_packet(&[Color::RED, Color::GREEN, Color::BLUE], 255).unwrap();
        let data = packet.payload().unwrap();

        assert_eq!(packet.attribute, 0x0527);
        assert_eq!(packet.data_type(), DataType::OctetString);
        assert_eq!(data.len(), 19);
        assert_eq!(&data[..7], &[0x01, 0x01, 0x03, 15, 255, 0x00, 3]);
        assert_eq!(&data[7..11], &encode_color(&Color::RED));
        assert_eq!(&data[15..19], &encode_color(&Color::BLUE));
    }

    #[test]
    fn test_color_packet_count_limits() {
        assert_eq!(
            color_packet(&[], 100),
            Err(ProtocolError::InvalidColorCount(0))
        );
        assert_eq!(
            color_packet(&[Color::RED; 9], 100),
            Err(ProtocolError::InvalidColorCount(9))
        );

        let eight = color_packet(&[Color::GREEN; 8], 100).unwrap();
        let data = eight.payload().unwrap();
        assert_eq!(data.len(), 4 + 3 + 32);
        assert_eq!(data[3], 35);
    }

    #[test]
    fn test_effect_type_layout() {
        let packet = effect_type_packet(3);
        assert_eq!(
            packet.payload().unwrap(),
            &[
                0x01, 0x01, 0x04, 0x0C, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
                0x00, 0x00, 0x03
            ]
        );
    }

    #[test]
    fn test_speed_layout() {
        let packet = speed_packet(0x80);
        assert_eq!(packet.payload().unwrap(), &[0x01, 0x01, 0x05, 0x01, 0x80]);
        assert_eq!(packet.attribute, lumi_attrs::RGB_EFFECT_PAYLOAD);
    }

    #[test]
    fn test_percent_scales() {
        assert_eq!(PercentScale::Full255.to_wire(50), 128);
        assert_eq!(PercentScale::Reduced254.to_wire(50), 127);
        assert_eq!(PercentScale::Full255.to_wire(100), 255);
        assert_eq!(PercentScale::Reduced254.to_wire(100), 254);
        assert_eq!(PercentScale::Full255.to_wire(1), 3);
        assert_eq!(PercentScale::Reduced254.to_wire(1), 3);
    }

    #[test]
    fn test_parse_packets() {
        let colors = color_packet(&[Color::RED, Color::BLUE], 127).unwrap();
        match DecodedPacket::parse(colors.payload().unwrap()).unwrap() {
            DecodedPacket::Colors { brightness, points } => {
                assert_eq!(brightness, 127);
                assert_eq!(points.len(), 2);
                assert_eq!(points[0], Color::RED.chromaticity().quantize());
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            DecodedPacket::parse(effect_type_packet(4).payload().unwrap()).unwrap(),
            DecodedPacket::EffectType { effect_id: 4 }
        );
        assert_eq!(
            DecodedPacket::parse(speed_packet(9).payload().unwrap()).unwrap(),
            DecodedPacket::Speed { speed: 9 }
        );
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        let result = DecodedPacket::parse(&[0x01, 0x01, 0x05, 0x02, 0x10]);
        assert!(matches!(result, Err(ProtocolError::InvalidFrame(_))));
        assert!(matches!(
            DecodedPacket::parse(&[0x01, 0x01]),
            Err(ProtocolError::FrameTooShort(2))
        ));
    }
}
