//! Per-family differences between Lumi RGB lights
//!
//! All families share the color conversion and packet layouts; what varies
//! is captured here as plain configuration values.

use lumi_protocol::{ColorNotation, PercentScale};
use serde::Serialize;

/// How the effect type and speed reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectEncoding {
    /// Colors, effect type and speed all as `0x0527` payloads
    Packed,
    /// Colors on `0x0527`, effect type on `0x051F`, speed on `0x0520`
    DiscreteAttributes,
}

/// Static description of a device family
#[derive(Debug, Serialize)]
pub struct FamilyProfile {
    pub name: &'static str,
    pub description: &'static str,
    /// Zigbee model identifiers (Basic cluster)
    pub models: &'static [&'static str],
    /// Percent → byte scaling for brightness and packed speed
    pub scale: PercentScale,
    /// Representation of default colors and state patches
    pub notation: ColorNotation,
    /// Send an on/off "on" before starting an effect on a dark device
    pub power_on_before_effect: bool,
    pub effect_encoding: EffectEncoding,
    /// State key holding the power state of the RGB channel
    pub power_key: &'static str,
    /// Lumi setting keys this family exposes
    pub settings: &'static [&'static str],
}

impl FamilyProfile {
    #[must_use]
    pub fn supports_setting(&self, key: &str) -> bool {
        self.settings.contains(&key)
    }
}

/// T1M ceiling light (RGB ring)
pub static T1M: FamilyProfile = FamilyProfile {
    name: "T1M",
    description: "Ceiling light T1M (RGB ring)",
    models: &["lumi.light.acn031", "lumi.light.acn032"],
    scale: PercentScale::Full255,
    notation: ColorNotation::Rgb,
    power_on_before_effect: true,
    effect_encoding: EffectEncoding::Packed,
    power_key: "state_rgb",
    settings: &[
        "dimming_range_minimum",
        "dimming_range_maximum",
        "off_on_duration",
        "on_off_duration",
        "power_on_behavior",
    ],
};

/// T1 light strip
pub static T1_STRIP: FamilyProfile = FamilyProfile {
    name: "T1_STRIP",
    description: "Light strip T1",
    models: &["lumi.light.acn132"],
    scale: PercentScale::Reduced254,
    notation: ColorNotation::Hex,
    power_on_before_effect: true,
    effect_encoding: EffectEncoding::Packed,
    power_key: "state",
    settings: &[
        "dimming_range_minimum",
        "dimming_range_maximum",
        "off_on_duration",
        "on_off_duration",
        "power_on_behavior",
    ],
};

/// T2 bulbs (E27, E26, GU10)
pub static T2: FamilyProfile = FamilyProfile {
    name: "T2",
    description: "LED bulb T2 (E27/E26/GU10)",
    models: &[
        "lumi.light.agl001",
        "lumi.light.agl002",
        "lumi.light.agl003",
        "lumi.light.agl005",
        "lumi.light.agl006",
    ],
    scale: PercentScale::Full255,
    notation: ColorNotation::Rgb,
    power_on_before_effect: false,
    effect_encoding: EffectEncoding::DiscreteAttributes,
    power_key: "state",
    settings: &[
        "dimming_range_minimum",
        "dimming_range_maximum",
        "transition_curve_curvature",
        "transition_initial_brightness",
        "off_on_duration",
        "on_off_duration",
        "power_on_behavior",
    ],
};

/// Every known family
pub static FAMILIES: [&FamilyProfile; 3] = [&T1M, &T1_STRIP, &T2];

/// Find the family for a model identifier
#[must_use]
pub fn lookup(model: &str) -> Option<&'static FamilyProfile> {
    FAMILIES
        .iter()
        .copied()
        .find(|family| family.models.contains(&model))
}
