//! Lumi numeric/enum attributes exposed as plain settings
//!
//! These are one attribute per property with no sequencing, but they share
//! the manufacturer code and need the same value validation before writing.

use crate::endpoint::CommandOptions;
use crate::error::EffectError;
use crate::family::FamilyProfile;
use lumi_protocol::{clusters, level_attrs, lumi_attrs, AttributeValue, DataType};
use serde_json::Value;

/// Value mapping of a setting
#[derive(Debug)]
pub enum SettingKind {
    /// `raw = round(value * scale)`, value checked against `min..=max`
    Numeric {
        data_type: DataType,
        min: f64,
        max: f64,
        scale: f64,
    },
    /// Name ↔ raw byte lookup
    Enum { lookup: &'static [(&'static str, u8)] },
}

/// One exposed setting
#[derive(Debug)]
pub struct Setting {
    pub key: &'static str,
    pub cluster: u16,
    pub attribute: u16,
    pub kind: SettingKind,
}

/// Every setting this crate knows how to encode
pub static SETTINGS: [Setting; 7] = [
    Setting {
        key: "dimming_range_minimum",
        cluster: clusters::MANU_SPECIFIC_LUMI,
        attribute: lumi_attrs::DIMMING_RANGE_MINIMUM,
        kind: SettingKind::Numeric {
            data_type: DataType::Uint8,
            min: 1.0,
            max: 100.0,
            scale: 1.0,
        },
    },
    Setting {
        key: "dimming_range_maximum",
        cluster: clusters::MANU_SPECIFIC_LUMI,
        attribute: lumi_attrs::DIMMING_RANGE_MAXIMUM,
        kind: SettingKind::Numeric {
            data_type: DataType::Uint8,
            min: 1.0,
            max: 100.0,
            scale: 1.0,
        },
    },
    Setting {
        key: "transition_curve_curvature",
        cluster: clusters::MANU_SPECIFIC_LUMI,
        attribute: lumi_attrs::TRANSITION_CURVE_CURVATURE,
        kind: SettingKind::Numeric {
            data_type: DataType::Uint16,
            min: 0.2,
            max: 6.0,
            scale: 100.0,
        },
    },
    Setting {
        key: "transition_initial_brightness",
        cluster: clusters::MANU_SPECIFIC_LUMI,
        attribute: lumi_attrs::TRANSITION_INITIAL_BRIGHTNESS,
        kind: SettingKind::Numeric {
            data_type: DataType::Uint8,
            min: 0.0,
            max: 50.0,
            scale: 1.0,
        },
    },
    Setting {
        key: "power_on_behavior",
        cluster: clusters::MANU_SPECIFIC_LUMI,
        attribute: lumi_attrs::POWER_ON_BEHAVIOR,
        kind: SettingKind::Enum {
            lookup: &[("off", 0), ("on", 1), ("reverse", 2), ("restore", 3)],
        },
    },
    Setting {
        key: "off_on_duration",
        cluster: clusters::LEVEL_CONTROL,
        attribute: level_attrs::ON_TRANSITION_TIME,
        kind: SettingKind::Numeric {
            data_type: DataType::Uint16,
            min: 0.0,
            max: 10.0,
            scale: 10.0,
        },
    },
    Setting {
        key: "on_off_duration",
        cluster: clusters::LEVEL_CONTROL,
        attribute: level_attrs::OFF_TRANSITION_TIME,
        kind: SettingKind::Numeric {
            data_type: DataType::Uint16,
            min: 0.0,
            max: 10.0,
            scale: 10.0,
        },
    },
];

/// Look up a setting by property name
#[must_use]
pub fn find(key: &str) -> Option<&'static Setting> {
    SETTINGS.iter().find(|s| s.key == key)
}

/// Look up a setting by attribute address
#[must_use]
pub fn find_attribute(cluster: u16, attribute: u16) -> Option<&'static Setting> {
    SETTINGS
        .iter()
        .find(|s| s.cluster == cluster && s.attribute == attribute)
}

impl Setting {
    /// Manufacturer code only on the private cluster
    #[must_use]
    pub fn options(&self) -> CommandOptions {
        if self.cluster == clusters::MANU_SPECIFIC_LUMI {
            CommandOptions::lumi()
        } else {
            CommandOptions::default()
        }
    }

    fn invalid(&self, reason: String) -> EffectError {
        EffectError::InvalidSetting {
            key: self.key.to_string(),
            reason,
        }
    }

    /// Validate a property value and convert it to its attribute value
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode(&self, value: &Value) -> Result<AttributeValue, EffectError> {
        match &self.kind {
            SettingKind::Numeric {
                data_type,
                min,
                max,
                scale,
            } => {
                let number = value
                    .as_f64()
                    .ok_or_else(|| self.invalid(format!("expected a number, got {value}")))?;
                if !(*min..=*max).contains(&number) {
                    return Err(self.invalid(format!("{number} is outside {min}..={max}")));
                }
                let raw = (number * scale).round();
                match data_type {
                    DataType::Uint8 => Ok(AttributeValue::Uint8(raw as u8)),
                    DataType::Uint16 => Ok(AttributeValue::Uint16(raw as u16)),
                    other => Err(self.invalid(format!("unsupported data type {other:?}"))),
                }
            }
            SettingKind::Enum { lookup } => {
                let name = value
                    .as_str()
                    .ok_or_else(|| self.invalid(format!("expected a string, got {value}")))?;
                lookup
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, raw)| AttributeValue::Uint8(*raw))
                    .ok_or_else(|| self.invalid(format!("unknown option {name:?}")))
            }
        }
    }

    /// Convert a reported attribute value back to its property value
    #[must_use]
    pub fn decode(&self, value: &AttributeValue) -> Option<Value> {
        let raw = value.as_u32()?;
        match &self.kind {
            SettingKind::Numeric { scale, .. } => {
                let number = f64::from(raw) / scale;
                if number.fract() == 0.0 {
                    Some(Value::from(raw / (*scale as u32)))
                } else {
                    // Keep two decimals; 0.35 is stored as 35
                    Some(Value::from((number * 100.0).round() / 100.0))
                }
            }
            SettingKind::Enum { lookup } => lookup
                .iter()
                .find(|(_, r)| u32::from(*r) == raw)
                .map(|(name, _)| Value::from(*name)),
        }
    }
}

/// Attribute reads issued when a device of `family` is configured,
/// grouped by cluster
///
/// Only settings the family exposes are read; `power_on_behavior` is
/// write-only.
#[must_use]
pub fn configure_reads(family: &FamilyProfile) -> Vec<(u16, Vec<u16>)> {
    let groups: [(u16, &[u16]); 2] = [
        (
            clusters::MANU_SPECIFIC_LUMI,
            &[
                lumi_attrs::DIMMING_RANGE_MINIMUM,
                lumi_attrs::DIMMING_RANGE_MAXIMUM,
                lumi_attrs::TRANSITION_CURVE_CURVATURE,
                lumi_attrs::TRANSITION_INITIAL_BRIGHTNESS,
            ],
        ),
        (
            clusters::LEVEL_CONTROL,
            &[level_attrs::ON_TRANSITION_TIME, level_attrs::OFF_TRANSITION_TIME],
        ),
    ];

    groups
        .into_iter()
        .map(|(cluster, attributes)| {
            let supported = attributes
                .iter()
                .copied()
                .filter(|attribute| {
                    find_attribute(cluster, *attribute)
                        .is_some_and(|setting| family.supports_setting(setting.key))
                })
                .collect::<Vec<_>>();
            (cluster, supported)
        })
        .filter(|(_, attributes)| !attributes.is_empty())
        .collect()
}
