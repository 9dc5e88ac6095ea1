//! Color parsing and RGB → CIE xy conversion
//!
//! The lights take their effect palette as CIE 1931 chromaticity
//! coordinates, so every RGB color is linearised with the sRGB transfer
//! curve and projected through the D65 XYZ matrix before encoding.

use crate::types::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A validated 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const RED: Self = Self::new(255, 0, 0);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const BLUE: Self = Self::new(0, 0, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` or `RRGGBB` (case-insensitive)
    pub fn from_hex(s: &str) -> Result<Self, ProtocolError> {
        let digits = s.strip_prefix('#').unwrap_or(s);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidColorFormat(format!(
                "expected #RRGGBB, got {s:?}"
            )));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ProtocolError::InvalidColorFormat(format!("bad hex digits in {s:?}")))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Upper-case `#RRGGBB`
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Chromaticity of this color
    #[must_use]
    pub fn chromaticity(&self) -> Chromaticity {
        rgb_to_chromaticity(f64::from(self.r), f64::from(self.g), f64::from(self.b))
    }
}

/// CIE 1931 chromaticity coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticity {
    pub x: f64,
    pub y: f64,
}

impl Chromaticity {
    /// Scale both coordinates to 16-bit fixed point (`round(v * 65535)`)
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn quantize(&self) -> (u16, u16) {
        let scale = |v: f64| (v * 65535.0).round().clamp(0.0, 65535.0) as u16;
        (scale(self.x), scale(self.y))
    }
}

/// Convert RGB channels in [0, 255] to chromaticity
///
/// Pure black has no chromaticity; it maps to `(0, 0)`.
#[must_use]
pub fn rgb_to_chromaticity(r: f64, g: f64, b: f64) -> Chromaticity {
    let linear = |c: f64| {
        let c = c / 255.0;
        if c > 0.04045 {
            ((c + 0.055) / 1.055).powf(2.4)
        } else {
            c / 12.92
        }
    };
    let (red, green, blue) = (linear(r), linear(g), linear(b));

    // sRGB D65
    let x = red * 0.412_456_4 + green * 0.357_576_1 + blue * 0.180_437_5;
    let y = red * 0.212_672_9 + green * 0.715_152_2 + blue * 0.072_175_0;
    let z = red * 0.019_333_9 + green * 0.119_192_0 + blue * 0.950_304_1;

    let sum = x + y + z;
    if sum == 0.0 {
        return Chromaticity { x: 0.0, y: 0.0 };
    }

    Chromaticity {
        x: x / sum,
        y: y / sum,
    }
}

/// The two accepted input shapes for a single color
#[derive(Debug, Clone, Copy)]
pub enum ColorInput<'a> {
    /// `{ "r": .., "g": .., "b": .. }`
    Structured(&'a Map<String, Value>),
    /// `#RRGGBB`
    Hex(&'a str),
}

impl<'a> ColorInput<'a> {
    /// Classify a JSON value as one of the input shapes
    pub fn from_value(value: &'a Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Object(map) => Ok(ColorInput::Structured(map)),
            Value::String(s) => Ok(ColorInput::Hex(s)),
            other => Err(ProtocolError::InvalidColorFormat(format!(
                "expected {{r, g, b}} or #RRGGBB, got {other}"
            ))),
        }
    }
}

/// Parse and range-check a single color
pub fn parse_color(input: ColorInput<'_>) -> Result<Color, ProtocolError> {
    match input {
        ColorInput::Hex(s) => Color::from_hex(s.trim()),
        ColorInput::Structured(map) => {
            let channel = |name: &str| -> Result<u8, ProtocolError> {
                let raw = map.get(name).filter(|v| !v.is_null()).ok_or_else(|| {
                    ProtocolError::InvalidColorFormat(format!(
                        "missing channel {name:?} in {}",
                        Value::Object(map.clone())
                    ))
                })?;
                channel_value(name, raw)
            };
            Ok(Color::new(channel("r")?, channel("g")?, channel("b")?))
        }
    }
}

/// Numeric coercion for one channel: numbers and numeric strings
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn channel_value(name: &str, raw: &Value) -> Result<u8, ProtocolError> {
    let number = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(v) if v.is_finite() && v.fract() == 0.0 && (0.0..=255.0).contains(&v) => Ok(v as u8),
        _ => Err(ProtocolError::InvalidColorFormat(format!(
            "channel {name:?} must be an integer between 0 and 255, got {raw}"
        ))),
    }
}

/// Which representation a color list travels in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorNotation {
    /// JSON array of `{r, g, b}` objects
    Rgb,
    /// Comma separated `#RRGGBB` list in a single string
    Hex,
}

/// An ordered color palette together with the notation it arrived in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorList {
    pub notation: ColorNotation,
    pub colors: Vec<Color>,
}

impl ColorList {
    #[must_use]
    pub fn new(notation: ColorNotation, colors: Vec<Color>) -> Self {
        Self { notation, colors }
    }

    /// Parse an `rgb_effect_colors` value
    ///
    /// An array holds structured `{r, g, b}` entries only; a string is a
    /// hex list. The count is not checked here.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Array(items) => {
                let colors = items
                    .iter()
                    .map(|item| match item {
                        Value::Object(map) => parse_color(ColorInput::Structured(map)),
                        other => Err(ProtocolError::InvalidColorFormat(format!(
                            "array entries must be {{r, g, b}} objects, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::new(ColorNotation::Rgb, colors))
            }
            Value::String(s) => Ok(Self::new(ColorNotation::Hex, parse_hex_list(s)?)),
            other => Err(ProtocolError::InvalidColorFormat(format!(
                "expected an array of colors or a hex list, got {other}"
            ))),
        }
    }

    /// Render back in the notation the list arrived in
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self.notation {
            ColorNotation::Rgb => Value::Array(
                self.colors
                    .iter()
                    .map(|c| serde_json::json!({ "r": c.r, "g": c.g, "b": c.b }))
                    .collect(),
            ),
            ColorNotation::Hex => Value::String(
                self.colors
                    .iter()
                    .map(Color::to_hex)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Parse `"#FF0000,#00FF00,..."`
pub fn parse_hex_list(s: &str) -> Result<Vec<Color>, ProtocolError> {
    s.split(',').map(|part| Color::from_hex(part.trim())).collect()
}
