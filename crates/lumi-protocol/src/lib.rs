//! Lumi RGB effect wire protocol
//!
//! This crate implements the color conversion and attribute payloads used
//! to drive RGB effects on Aqara (Lumi) Zigbee lights.

pub mod color;
pub mod packet;
pub mod types;
pub mod zcl;

pub use color::{Chromaticity, Color, ColorInput, ColorList, ColorNotation};
pub use packet::{DecodedPacket, Packet, PacketKind, PercentScale};
pub use types::*;
pub use zcl::ZclFrame;
