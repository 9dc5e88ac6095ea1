//! Merge an incoming command with cached state and defaults
//!
//! Every field resolves in the same order: the command, then the cached
//! device state, then the hard default. JSON `null` counts as absent.

use crate::error::EffectError;
use crate::model::{keys, Effect, EffectConfiguration, EffectDefaults};
use crate::store::DeviceState;
use lumi_protocol::packet::MAX_COLORS;
use lumi_protocol::ColorList;
use serde_json::{Map, Value};

/// First non-null value for `key`
fn pick<'a>(key: &str, command: &'a Map<String, Value>, cached: &'a DeviceState) -> Option<&'a Value> {
    command
        .get(key)
        .filter(|v| !v.is_null())
        .or_else(|| cached.get(key).filter(|v| !v.is_null()))
}

/// Integer percentage in 1..=100, numeric strings allowed
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if number.fract() == 0.0 && (1.0..=100.0).contains(&number) {
        Some(number as u8)
    } else {
        None
    }
}

/// Resolve and validate a complete effect configuration
pub fn resolve(
    command: &Map<String, Value>,
    cached: &DeviceState,
    defaults: &EffectDefaults,
) -> Result<EffectConfiguration, EffectError> {
    let colors = match pick(keys::COLORS, command, cached) {
        Some(value) => ColorList::from_value(value)?,
        None => defaults.colors.clone(),
    };
    if colors.is_empty() || colors.len() > MAX_COLORS {
        return Err(EffectError::InvalidColorCount(colors.len()));
    }

    let brightness = match pick(keys::BRIGHTNESS, command, cached) {
        Some(value) => percent(value).ok_or_else(|| EffectError::InvalidBrightness(value.to_string()))?,
        None => defaults.brightness,
    };

    let effect = match pick(keys::EFFECT, command, cached) {
        Some(Value::String(name)) => {
            Effect::from_name(name).ok_or_else(|| EffectError::UnknownEffect(name.clone()))?
        }
        Some(other) => return Err(EffectError::UnknownEffect(other.to_string())),
        None => defaults.effect,
    };

    let speed = match pick(keys::SPEED, command, cached) {
        Some(value) => percent(value).ok_or_else(|| EffectError::InvalidSpeed(value.to_string()))?,
        None => defaults.speed,
    };

    Ok(EffectConfiguration {
        colors,
        brightness,
        effect,
        speed,
    })
}

/// Reject a dimming range whose minimum exceeds its maximum
///
/// Only checked when the command sets at least one bound; the other bound
/// may come from the cache.
pub fn check_dimming_range(
    command: &Map<String, Value>,
    cached: &DeviceState,
) -> Result<(), EffectError> {
    let in_command = |key: &str| command.get(key).is_some_and(|v| !v.is_null());
    if !in_command(keys::DIMMING_RANGE_MINIMUM) && !in_command(keys::DIMMING_RANGE_MAXIMUM) {
        return Ok(());
    }

    let bound = |key: &str| pick(key, command, cached).and_then(Value::as_f64);
    if let (Some(min), Some(max)) = (
        bound(keys::DIMMING_RANGE_MINIMUM),
        bound(keys::DIMMING_RANGE_MAXIMUM),
    ) {
        if min > max {
            return Err(EffectError::InvalidRange { min, max });
        }
    }
    Ok(())
}
