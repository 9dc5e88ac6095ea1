//! Per-device command handling
//!
//! The controller validates a property-set message in full, then writes
//! settings and runs the effect sequence while holding that device's lock.
//! Commands for the same device queue behind each other in arrival order;
//! different devices never wait on each other.

use crate::device::LumiDevice;
use crate::endpoint::{CommandOptions, DeviceEndpoint, EndpointError};
use crate::error::EffectError;
use crate::family::FamilyProfile;
use crate::model::{EffectConfiguration, EffectDefaults, Touched};
use crate::pacing::PacingPolicy;
use crate::resolver;
use crate::sequencer::{self, SequencePlan};
use crate::settings::{self, Setting};
use crate::store::{DeviceState, StatePatch, StateStore};
use dashmap::DashMap;
use lumi_protocol::AttributeValue;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Everything needed to apply a message, computed before any write
#[derive(Debug)]
pub struct PreparedUpdate {
    /// Setting writes with the normalised property value for the patch
    pub settings: Vec<(&'static Setting, AttributeValue, Value)>,
    /// Resolved effect and its sequence, when the message touches the effect
    pub effect: Option<(EffectConfiguration, SequencePlan)>,
}

impl PreparedUpdate {
    /// Patch to merge once every write has succeeded
    #[must_use]
    pub fn patch(&self, family: &FamilyProfile) -> StatePatch {
        let mut patch = StatePatch::new();
        for (setting, _, value) in &self.settings {
            patch.insert(setting.key.to_string(), value.clone());
        }
        if let Some((config, plan)) = &self.effect {
            patch.extend(config.to_patch());
            if plan.powers_on {
                patch.insert(family.power_key.to_string(), Value::from("ON"));
            }
        }
        patch
    }
}

/// Validate a message against the cached state and plan the writes
///
/// Keys that are neither effect nor setting properties are left to the
/// bridge and ignored here.
pub fn prepare(
    family: &FamilyProfile,
    message: &Map<String, Value>,
    cached: &DeviceState,
) -> Result<PreparedUpdate, EffectError> {
    resolver::check_dimming_range(message, cached)?;

    let mut settings = Vec::new();
    for (key, value) in message {
        if value.is_null() {
            continue;
        }
        let Some(setting) = settings::find(key) else {
            continue;
        };
        if !family.supports_setting(key) {
            return Err(EffectError::InvalidSetting {
                key: key.clone(),
                reason: format!("not supported by {}", family.name),
            });
        }
        let encoded = setting.encode(value)?;
        let normalised = setting.decode(&encoded).unwrap_or_else(|| value.clone());
        settings.push((setting, encoded, normalised));
    }

    let touched = Touched::from_command(message);
    let effect = if touched.any() {
        let defaults = EffectDefaults::for_notation(family.notation);
        let config = resolver::resolve(message, cached, &defaults)?;
        let plan = sequencer::plan(&config, touched, is_powered_on(family, cached), family)?;
        Some((config, plan))
    } else {
        None
    };

    Ok(PreparedUpdate { settings, effect })
}

/// Cached power state of the family's RGB channel; unknown counts as off
fn is_powered_on(family: &FamilyProfile, cached: &DeviceState) -> bool {
    cached
        .get(family.power_key)
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case("on"))
}

/// Applies property-set messages to devices
pub struct EffectController {
    store: Arc<StateStore>,
    pacing: PacingPolicy,
    shutdown: CancellationToken,
    /// One lock per device id
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EffectController {
    /// Create a new controller
    #[must_use]
    pub fn new(store: Arc<StateStore>, pacing: PacingPolicy) -> Self {
        Self {
            store,
            pacing,
            shutdown: CancellationToken::new(),
            locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Cancel pending pacing delays; sequences in flight fail with `Cancelled`
    pub fn shutdown(&self) {
        tracing::info!("Effect controller shutting down");
        self.shutdown.cancel();
    }

    fn device_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(id.to_string()).or_default().clone()
    }

    /// Drop everything held for a removed device: its lock and cached state
    ///
    /// A command already holding the lock finishes normally.
    pub fn forget(&self, id: &str) -> Option<DeviceState> {
        self.locks.remove(id);
        let removed = self.store.remove(id);
        tracing::info!("Forgot device {}", id);
        removed
    }

    /// Validate and apply a property-set message
    ///
    /// Returns the patch merged into the state cache. On any failure the
    /// cache is left as it was.
    pub async fn handle_set<E: DeviceEndpoint>(
        &self,
        device: &LumiDevice<E>,
        message: &Map<String, Value>,
    ) -> Result<StatePatch, EffectError> {
        let lock = self.device_lock(&device.id);
        let _guard = lock.lock().await;

        let cached = self.store.snapshot(&device.id);
        let update = prepare(device.family, message, &cached).map_err(|e| {
            tracing::warn!("Rejected command for {}: {}", device.id, e);
            e
        })?;

        for (setting, value, _) in &update.settings {
            tracing::info!("Writing {} to {}", setting.key, device.id);
            let records = [(setting.attribute, value.clone())];
            let result = tokio::time::timeout(
                self.pacing.write_timeout,
                device.endpoint.write(setting.cluster, &records, &setting.options()),
            )
            .await
            .unwrap_or(Err(EndpointError::Timeout));
            if let Err(source) = result {
                tracing::warn!("Failed to write {} to {}: {}", setting.key, device.id, source);
                return Err(EffectError::DeviceWriteFailure {
                    step: format!("writing {}", setting.key),
                    source,
                });
            }
        }

        if let Some((config, plan)) = &update.effect {
            tracing::info!(
                "Applying {} effect to {} ({} colors, brightness {}%, speed {}%)",
                config.effect.name(),
                device.id,
                config.colors.len(),
                config.brightness,
                config.speed
            );
            if let Err(e) = sequencer::execute(&device.endpoint, plan, &self.pacing, &self.shutdown).await {
                tracing::warn!("Effect sequence for {} aborted: {}", device.id, e);
                return Err(e);
            }
        }

        let patch = update.patch(device.family);
        self.store.merge(&device.id, &patch);
        Ok(patch)
    }

    /// Read the configurable attributes and cache their values
    pub async fn configure<E: DeviceEndpoint>(
        &self,
        device: &LumiDevice<E>,
    ) -> Result<StatePatch, EffectError> {
        let lock = self.device_lock(&device.id);
        let _guard = lock.lock().await;

        tracing::info!("Configuring {} ({})", device.id, device.family.name);

        let mut patch = StatePatch::new();
        for (cluster, attributes) in settings::configure_reads(device.family) {
            let options = settings::find_attribute(cluster, attributes[0])
                .map_or_else(CommandOptions::default, Setting::options);
            let values = tokio::time::timeout(
                self.pacing.write_timeout,
                device.endpoint.read(cluster, &attributes, &options),
            )
            .await
            .unwrap_or(Err(EndpointError::Timeout))
            .map_err(|source| EffectError::DeviceWriteFailure {
                step: format!("reading cluster {cluster:#06x}"),
                source,
            })?;

            for (attribute, value) in values {
                let Some(setting) = settings::find_attribute(cluster, attribute)
                    .filter(|s| device.family.supports_setting(s.key))
                else {
                    tracing::debug!("Ignoring attribute {:#06x} from {}", attribute, device.id);
                    continue;
                };
                if let Some(decoded) = setting.decode(&value) {
                    patch.insert(setting.key.to_string(), decoded);
                }
            }
        }

        self.store.merge(&device.id, &patch);
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::mock::{Call, MockEndpoint};
    use lumi_protocol::{clusters, lumi_attrs, PacketKind};
    use serde_json::json;
    use std::time::Duration;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn controller() -> EffectController {
        EffectController::new(Arc::new(StateStore::new()), PacingPolicy::default())
    }

    fn strip(endpoint: MockEndpoint) -> LumiDevice<MockEndpoint> {
        LumiDevice::new("strip", "lumi.light.acn132", endpoint).unwrap()
    }

    fn t1m(endpoint: MockEndpoint) -> LumiDevice<MockEndpoint> {
        LumiDevice::new("ring", "lumi.light.acn031", endpoint).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_colors_on_dark_device() {
        let controller = controller();
        let device = strip(MockEndpoint::new());
        controller
            .store()
            .merge("strip", &obj(json!({"state": "OFF", "rgb_effect": "off"})));

        let patch = controller
            .handle_set(
                &device,
                &obj(json!({"rgb_effect_colors": "#FF0000,#00FF00", "rgb_effect_brightness": 50})),
            )
            .await
            .unwrap();

        let calls = device.endpoint.calls();
        assert_eq!(calls.len(), 1, "only the color packet is sent: {calls:?}");
        let written = device.endpoint.written();
        let AttributeValue::OctetString(payload) = &written[0].1 else {
            panic!("expected octet string");
        };
        assert_eq!(payload[2], PacketKind::Colors as u8);
        assert_eq!(payload[4], 127);
        assert_eq!(payload[6], 2);

        assert_eq!(patch["rgb_effect_colors"], json!("#FF0000,#00FF00"));
        assert_eq!(patch["rgb_effect_brightness"], json!(50));
        assert_eq!(patch["rgb_effect"], json!("off"));
        assert_eq!(patch["rgb_effect_speed"], json!(50));
        assert!(!patch.contains_key("state"));
        assert_eq!(controller.store().snapshot("strip")["state"], json!("OFF"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_effect_on_dark_device_powers_on_and_flips_state() {
        let controller = controller();
        let device = t1m(MockEndpoint::new());
        controller
            .store()
            .merge("ring", &obj(json!({"state_rgb": "OFF"})));

        let patch = controller
            .handle_set(
                &device,
                &obj(json!({
                    "rgb_effect_colors": [{"r": 255, "g": 0, "b": 0}],
                    "rgb_effect": "breathing",
                    "rgb_effect_speed": 80,
                })),
            )
            .await
            .unwrap();

        let calls = device.endpoint.calls();
        assert!(matches!(&calls[0], Call::Command { command, .. } if command == "on"));
        assert_eq!(calls.len(), 4);
        for call in &calls[1..] {
            match call {
                Call::Write { cluster, options, .. } => {
                    assert_eq!(*cluster, clusters::MANU_SPECIFIC_LUMI);
                    assert_eq!(*options, CommandOptions::lumi());
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(patch["state_rgb"], json!("ON"));
        assert_eq!(controller.store().snapshot("ring")["state_rgb"], json!("ON"));
        assert_eq!(controller.store().snapshot("ring")["rgb_effect"], json!("breathing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_error_sends_nothing() {
        let controller = controller();
        let device = t1m(MockEndpoint::new());
        let nine = Value::Array(vec![json!({"r": 1, "g": 1, "b": 1}); 9]);

        let err = controller
            .handle_set(&device, &obj(json!({"rgb_effect_colors": nine})))
            .await
            .unwrap_err();
        assert!(matches!(err, EffectError::InvalidColorCount(9)));
        assert!(err.is_validation());
        assert!(device.endpoint.calls().is_empty());
        assert!(controller.store().snapshot("ring").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_range_blocks_all_writes() {
        let controller = controller();
        let device = t1m(MockEndpoint::new());

        let err = controller
            .handle_set(
                &device,
                &obj(json!({
                    "dimming_range_minimum": 80,
                    "dimming_range_maximum": 50,
                    "rgb_effect": "flash",
                })),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EffectError::InvalidRange { .. }));
        assert!(device.endpoint.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_leaves_cache_untouched() {
        let controller = controller();
        let device = t1m(MockEndpoint::failing_write(1));
        controller
            .store()
            .merge("ring", &obj(json!({"state_rgb": "ON", "rgb_effect": "off"})));

        let err = controller
            .handle_set(
                &device,
                &obj(json!({"rgb_effect_brightness": 20, "rgb_effect": "flash"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EffectError::DeviceWriteFailure { .. }));

        let state = controller.store().snapshot("ring");
        assert_eq!(state["rgb_effect"], json!("off"));
        assert!(!state.contains_key("rgb_effect_brightness"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_written_with_right_options() {
        let controller = controller();
        let device = LumiDevice::new("bulb", "lumi.light.agl003", MockEndpoint::new()).unwrap();

        let patch = controller
            .handle_set(
                &device,
                &obj(json!({"transition_curve_curvature": 1.25, "off_on_duration": 2})),
            )
            .await
            .unwrap();

        let calls = device.endpoint.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&Call::Write {
            cluster: clusters::MANU_SPECIFIC_LUMI,
            records: vec![(lumi_attrs::TRANSITION_CURVE_CURVATURE, AttributeValue::Uint16(125))],
            options: CommandOptions::lumi(),
        }));
        assert!(calls.contains(&Call::Write {
            cluster: clusters::LEVEL_CONTROL,
            records: vec![(0x0012, AttributeValue::Uint16(20))],
            options: CommandOptions::default(),
        }));
        assert_eq!(patch["transition_curve_curvature"], json!(1.25));
        assert_eq!(patch["off_on_duration"], json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_setting_rejected() {
        let controller = controller();
        let device = t1m(MockEndpoint::new());
        let err = controller
            .handle_set(&device, &obj(json!({"transition_curve_curvature": 1.0})))
            .await
            .unwrap_err();
        assert!(matches!(err, EffectError::InvalidSetting { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_device_commands_queue() {
        let controller = Arc::new(controller());
        let device = Arc::new(t1m(MockEndpoint::new()));
        controller
            .store()
            .merge("ring", &obj(json!({"state_rgb": "ON"})));

        let first = {
            let (controller, device) = (controller.clone(), device.clone());
            tokio::spawn(async move {
                controller
                    .handle_set(&*device, &obj(json!({"rgb_effect": "flash", "rgb_effect_speed": 10})))
                    .await
            })
        };
        tokio::task::yield_now().await;
        let second = {
            let (controller, device) = (controller.clone(), device.clone());
            tokio::spawn(async move {
                controller
                    .handle_set(&*device, &obj(json!({"rgb_effect": "fading", "rgb_effect_speed": 90})))
                    .await
            })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // Packets of the two sequences never interleave
        let written = device.endpoint.written();
        let ids: Vec<u8> = written
            .iter()
            .map(|(_, v)| match v {
                AttributeValue::OctetString(p) => p[2],
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![0x04, 0x05, 0x04, 0x05]);
        assert_eq!(controller.store().snapshot("ring")["rgb_effect"], json!("fading"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pacing() {
        let controller = Arc::new(controller());
        let device = Arc::new(t1m(MockEndpoint::new()));

        let task = {
            let (controller, device) = (controller.clone(), device.clone());
            tokio::spawn(async move {
                controller
                    .handle_set(&*device, &obj(json!({"rgb_effect_brightness": 40})))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.shutdown();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(EffectError::Cancelled)));
        assert!(device.endpoint.calls().is_empty());
        assert!(controller.store().snapshot("ring").is_empty());
    }

    #[tokio::test]
    async fn test_configure_reads_settings() {
        let endpoint = MockEndpoint::new()
            .with_read_value(clusters::MANU_SPECIFIC_LUMI, lumi_attrs::DIMMING_RANGE_MINIMUM, AttributeValue::Uint8(5))
            .with_read_value(clusters::LEVEL_CONTROL, 0x0013, AttributeValue::Uint16(15));
        let device = LumiDevice::new("bulb", "lumi.light.agl001", endpoint).unwrap();
        let controller = controller();

        let patch = controller.configure(&device).await.unwrap();
        assert_eq!(patch["dimming_range_minimum"], json!(5));
        assert_eq!(patch["on_off_duration"], json!(1.5));

        let reads: Vec<_> = device
            .endpoint
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Read { .. }))
            .collect();
        assert_eq!(reads.len(), 2);
    }

    #[tokio::test]
    async fn test_configure_skips_settings_family_lacks() {
        let endpoint = MockEndpoint::new()
            .with_read_value(
                clusters::MANU_SPECIFIC_LUMI,
                lumi_attrs::TRANSITION_CURVE_CURVATURE,
                AttributeValue::Uint16(150),
            )
            .with_read_value(
                clusters::MANU_SPECIFIC_LUMI,
                lumi_attrs::DIMMING_RANGE_MAXIMUM,
                AttributeValue::Uint8(90),
            );
        let device = t1m(endpoint);
        let controller = controller();

        let patch = controller.configure(&device).await.unwrap();
        assert_eq!(patch["dimming_range_maximum"], json!(90));
        assert!(!patch.contains_key("transition_curve_curvature"));
        assert!(!controller
            .store()
            .snapshot("ring")
            .contains_key("transition_curve_curvature"));

        for call in device.endpoint.calls() {
            if let Call::Read { attributes, .. } = call {
                assert!(!attributes.contains(&lumi_attrs::TRANSITION_CURVE_CURVATURE));
                assert!(!attributes.contains(&lumi_attrs::TRANSITION_INITIAL_BRIGHTNESS));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_drops_lock_and_state() {
        let controller = controller();
        let device = t1m(MockEndpoint::new());
        controller
            .handle_set(&device, &obj(json!({"rgb_effect_speed": 20})))
            .await
            .unwrap();
        assert!(controller.locks.contains_key("ring"));

        let removed = controller.forget("ring").unwrap();
        assert_eq!(removed["rgb_effect_speed"], json!(20));
        assert!(!controller.locks.contains_key("ring"));
        assert!(controller.store().snapshot("ring").is_empty());
        assert!(controller.forget("ring").is_none());
    }

    #[test]
    fn test_prepare_without_effect_keys() {
        let update = prepare(&crate::family::T2, &obj(json!({"state": "ON"})), &Map::new()).unwrap();
        assert!(update.settings.is_empty());
        assert!(update.effect.is_none());
        assert!(update.patch(&crate::family::T2).is_empty());
    }
}
