//! Effect data model

use crate::store::StatePatch;
use lumi_protocol::{Color, ColorList, ColorNotation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Exposed property names
pub mod keys {
    pub const COLORS: &str = "rgb_effect_colors";
    pub const BRIGHTNESS: &str = "rgb_effect_brightness";
    pub const EFFECT: &str = "rgb_effect";
    pub const SPEED: &str = "rgb_effect_speed";
    pub const DIMMING_RANGE_MINIMUM: &str = "dimming_range_minimum";
    pub const DIMMING_RANGE_MAXIMUM: &str = "dimming_range_maximum";
}

/// Device-side lighting animation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Off,
    Breathing,
    Candlelight,
    Fading,
    Flash,
}

impl Effect {
    pub const ALL: [Effect; 5] = [
        Effect::Off,
        Effect::Breathing,
        Effect::Candlelight,
        Effect::Fading,
        Effect::Flash,
    ];

    /// Wire identifier
    #[must_use]
    pub fn id(&self) -> u8 {
        match self {
            Effect::Off => 0,
            Effect::Breathing => 1,
            Effect::Candlelight => 2,
            Effect::Fading => 3,
            Effect::Flash => 4,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Off => "off",
            Effect::Breathing => "breathing",
            Effect::Candlelight => "candlelight",
            Effect::Fading => "fading",
            Effect::Flash => "flash",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.id() == id)
    }
}

/// Fallback values used when neither the command nor the cache has a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectDefaults {
    pub colors: ColorList,
    pub brightness: u8,
    pub effect: Effect,
    pub speed: u8,
}

impl EffectDefaults {
    /// Red, green, blue at full brightness, effect off, half speed
    #[must_use]
    pub fn for_notation(notation: ColorNotation) -> Self {
        Self {
            colors: ColorList::new(notation, vec![Color::RED, Color::GREEN, Color::BLUE]),
            brightness: 100,
            effect: Effect::Off,
            speed: 50,
        }
    }
}

/// A complete, validated set of effect parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectConfiguration {
    pub colors: ColorList,
    /// Percent, 1..=100
    pub brightness: u8,
    pub effect: Effect,
    /// Percent, 1..=100
    pub speed: u8,
}

impl EffectConfiguration {
    /// State patch carrying every field of the configuration
    #[must_use]
    pub fn to_patch(&self) -> StatePatch {
        let mut patch = StatePatch::new();
        patch.insert(keys::COLORS.into(), self.colors.to_value());
        patch.insert(keys::BRIGHTNESS.into(), Value::from(self.brightness));
        patch.insert(keys::EFFECT.into(), Value::from(self.effect.name()));
        patch.insert(keys::SPEED.into(), Value::from(self.speed));
        patch
    }
}

/// Which effect packets a command asks to (re)send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Touched {
    /// Colors or brightness present
    pub colors: bool,
    pub effect: bool,
    pub speed: bool,
}

impl Touched {
    #[must_use]
    pub fn from_command(command: &Map<String, Value>) -> Self {
        let present = |key: &str| command.get(key).is_some_and(|v| !v.is_null());
        Self {
            colors: present(keys::COLORS) || present(keys::BRIGHTNESS),
            effect: present(keys::EFFECT),
            speed: present(keys::SPEED),
        }
    }

    #[must_use]
    pub fn all() -> Self {
        Self {
            colors: true,
            effect: true,
            speed: true,
        }
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.colors || self.effect || self.speed
    }
}
