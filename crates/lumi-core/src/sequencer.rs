//! Ordered transmission of effect packets
//!
//! A sequence moves through
//!
//! ```text
//! IDLE → RESOLVED → [POWERING_ON] → SENDING_COLORS → SENDING_EFFECT_TYPE → SENDING_SPEED → IDLE
//! ```
//!
//! Only the packets a command touches are sent, but they are always sent in
//! this order. Planning is pure; [`execute`] performs the steps against an
//! endpoint and stops at the first failure.

use crate::endpoint::{CommandOptions, DeviceEndpoint, EndpointError};
use crate::error::EffectError;
use crate::family::{EffectEncoding, FamilyProfile};
use crate::model::{Effect, EffectConfiguration, Touched};
use crate::pacing::{self, PacingPolicy};
use bytes::Bytes;
use lumi_protocol::packet::{color_packet, effect_type_packet, speed_packet};
use lumi_protocol::{clusters, lumi_attrs, AttributeValue, Packet};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Sequence phase, used for logging and error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PoweringOn,
    SendingColors,
    SendingEffectType,
    SendingSpeed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::PoweringOn => "powering on",
            Phase::SendingColors => "sending colors",
            Phase::SendingEffectType => "sending effect type",
            Phase::SendingSpeed => "sending speed",
        };
        f.write_str(name)
    }
}

/// Which pacing delay to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// After power-on
    Settle,
    /// Between packets
    Spacing,
}

/// One step of a planned sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    PowerOn,
    Pause(Pause),
    Write { phase: Phase, packet: Packet },
}

/// Steps for one command, in transmission order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequencePlan {
    pub steps: Vec<Step>,
    /// Whether the plan switches the device on
    pub powers_on: bool,
}

impl SequencePlan {
    /// Packets in the order they will be written
    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.steps.iter().filter_map(|step| match step {
            Step::Write { packet, .. } => Some(packet),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Build the step list for a resolved configuration
///
/// `powered_on` is the cached power state of the RGB channel.
pub fn plan(
    config: &EffectConfiguration,
    touched: Touched,
    powered_on: bool,
    family: &FamilyProfile,
) -> Result<SequencePlan, EffectError> {
    if !touched.any() {
        return Ok(SequencePlan::default());
    }

    let mut steps = Vec::new();
    let powers_on =
        family.power_on_before_effect && config.effect != Effect::Off && !powered_on;
    if powers_on {
        steps.push(Step::PowerOn);
        steps.push(Step::Pause(Pause::Settle));
    }

    if touched.colors {
        let brightness = family.scale.to_wire(config.brightness);
        steps.push(Step::Pause(Pause::Spacing));
        steps.push(Step::Write {
            phase: Phase::SendingColors,
            packet: color_packet(&config.colors.colors, brightness)?,
        });
    }

    if touched.effect {
        let packet = match family.effect_encoding {
            EffectEncoding::Packed => effect_type_packet(config.effect.id()),
            EffectEncoding::DiscreteAttributes => Packet {
                attribute: lumi_attrs::RGB_EFFECT,
                value: AttributeValue::Uint32(u32::from(config.effect.id())),
            },
        };
        steps.push(Step::Write {
            phase: Phase::SendingEffectType,
            packet,
        });
    }

    if touched.speed {
        let packet = match family.effect_encoding {
            EffectEncoding::Packed => speed_packet(family.scale.to_wire(config.speed)),
            EffectEncoding::DiscreteAttributes => Packet {
                attribute: lumi_attrs::RGB_EFFECT_SPEED,
                value: AttributeValue::Uint8(config.speed),
            },
        };
        steps.push(Step::Pause(Pause::Spacing));
        steps.push(Step::Write {
            phase: Phase::SendingSpeed,
            packet,
        });
    }

    Ok(SequencePlan { steps, powers_on })
}

/// Run an endpoint call under the write timeout
async fn bounded<F>(pacing: &PacingPolicy, phase: Phase, call: F) -> Result<(), EffectError>
where
    F: std::future::Future<Output = Result<(), EndpointError>>,
{
    let result = match tokio::time::timeout(pacing.write_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(EndpointError::Timeout),
    };
    result.map_err(|source| EffectError::DeviceWriteFailure {
        step: phase.to_string(),
        source,
    })
}

/// Perform a planned sequence
///
/// Aborts on the first failed call; nothing is retried.
pub async fn execute<E: DeviceEndpoint>(
    endpoint: &E,
    plan: &SequencePlan,
    pacing: &PacingPolicy,
    cancel: &CancellationToken,
) -> Result<(), EffectError> {
    for step in &plan.steps {
        match step {
            Step::PowerOn => {
                tracing::debug!("Switching on before effect");
                bounded(
                    pacing,
                    Phase::PoweringOn,
                    endpoint.command(clusters::ON_OFF, "on", Bytes::new(), &CommandOptions::default()),
                )
                .await?;
            }
            Step::Pause(Pause::Settle) => {
                pacing::pause(pacing.power_on_settle, cancel).await?;
            }
            Step::Pause(Pause::Spacing) => {
                pacing::pause(pacing.packet_spacing, cancel).await?;
            }
            Step::Write { phase, packet } => {
                tracing::debug!("{}: {}", phase, packet.describe());
                let records = [(packet.attribute, packet.value.clone())];
                bounded(
                    pacing,
                    *phase,
                    endpoint.write(clusters::MANU_SPECIFIC_LUMI, &records, &CommandOptions::lumi()),
                )
                .await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::mock::{Call, MockEndpoint};
    use crate::family::{T1M, T1_STRIP, T2};
    use lumi_protocol::{Color, ColorList, ColorNotation, PacketKind};
    use std::time::Duration;
    use tokio::time::Instant;

    fn config(effect: Effect) -> EffectConfiguration {
        EffectConfiguration {
            colors: ColorList::new(ColorNotation::Rgb, vec![Color::RED, Color::GREEN]),
            brightness: 50,
            effect,
            speed: 50,
        }
    }

    fn kinds(plan: &SequencePlan) -> Vec<u8> {
        plan.packets().map(|p| p.payload().unwrap()[2]).collect()
    }

    #[test]
    fn test_full_plan_order() {
        let plan = plan(&config(Effect::Breathing), Touched::all(), false, &T1M).unwrap();
        assert!(plan.powers_on);
        assert_eq!(plan.steps[0], Step::PowerOn);
        assert_eq!(plan.steps[1], Step::Pause(Pause::Settle));
        assert_eq!(
            kinds(&plan),
            vec![
                PacketKind::Colors as u8,
                PacketKind::EffectType as u8,
                PacketKind::Speed as u8
            ]
        );
        // Effect type follows colors without a pause
        assert!(matches!(
            &plan.steps[3..6],
            [
                Step::Write { phase: Phase::SendingColors, .. },
                Step::Write { phase: Phase::SendingEffectType, .. },
                Step::Pause(Pause::Spacing)
            ]
        ));
    }

    #[test]
    fn test_no_power_on_when_effect_off_or_already_on() {
        let off = plan(&config(Effect::Off), Touched::all(), false, &T1M).unwrap();
        assert!(!off.powers_on);
        assert!(!off.steps.contains(&Step::PowerOn));

        let lit = plan(&config(Effect::Flash), Touched::all(), true, &T1M).unwrap();
        assert!(!lit.powers_on);

        // T2 never pre-powers
        let bulb = plan(&config(Effect::Flash), Touched::all(), false, &T2).unwrap();
        assert!(!bulb.powers_on);
    }

    #[test]
    fn test_scenario_colors_only_with_254_scaling() {
        let touched = Touched {
            colors: true,
            ..Touched::default()
        };
        let plan = plan(&config(Effect::Off), touched, false, &T1_STRIP).unwrap();
        let packets: Vec<_> = plan.packets().collect();
        assert_eq!(packets.len(), 1);
        let payload = packets[0].payload().unwrap();
        assert_eq!(payload[2], PacketKind::Colors as u8);
        assert_eq!(payload[4], 127);
    }

    #[test]
    fn test_255_scaling_for_t1m() {
        let touched = Touched {
            colors: true,
            speed: true,
            ..Touched::default()
        };
        let plan = plan(&config(Effect::Off), touched, false, &T1M).unwrap();
        let packets: Vec<_> = plan.packets().collect();
        assert_eq!(packets[0].payload().unwrap()[4], 128);
        assert_eq!(packets[1].payload().unwrap(), &[0x01, 0x01, 0x05, 0x01, 128]);
    }

    #[test]
    fn test_discrete_attributes_for_t2() {
        let plan = plan(&config(Effect::Fading), Touched::all(), false, &T2).unwrap();
        let packets: Vec<_> = plan.packets().collect();
        assert_eq!(packets[0].attribute, lumi_attrs::RGB_EFFECT_PAYLOAD);
        assert_eq!(packets[1].attribute, lumi_attrs::RGB_EFFECT);
        assert_eq!(packets[1].value, AttributeValue::Uint32(3));
        assert_eq!(packets[2].attribute, lumi_attrs::RGB_EFFECT_SPEED);
        assert_eq!(packets[2].value, AttributeValue::Uint8(50));
    }

    #[test]
    fn test_untouched_plan_is_empty() {
        let plan = plan(&config(Effect::Flash), Touched::default(), false, &T1M).unwrap();
        assert!(plan.is_empty());
        assert!(!plan.powers_on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timing() {
        let endpoint = MockEndpoint::new();
        let plan = plan(&config(Effect::Breathing), Touched::all(), false, &T1M).unwrap();
        let start = Instant::now();

        execute(&endpoint, &plan, &PacingPolicy::default(), &CancellationToken::new())
            .await
            .unwrap();

        let calls = endpoint.timed_calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[0].1, Call::Command { cluster: clusters::ON_OFF, .. }));

        let at = |i: usize| calls[i].0 - start;
        let ms = Duration::from_millis;
        assert!(at(0) < ms(5));
        // settle + spacing before colors
        assert!(at(1) >= ms(300) && at(1) < ms(310));
        // effect type straight after colors
        assert_eq!(calls[2].0, calls[1].0);
        // spacing before speed
        assert!(at(3) >= ms(500) && at(3) < ms(510));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_sequence() {
        // Second write (effect type) fails
        let endpoint = MockEndpoint::failing_write(1);
        let plan = plan(&config(Effect::Breathing), Touched::all(), true, &T1M).unwrap();

        let err = execute(&endpoint, &plan, &PacingPolicy::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            EffectError::DeviceWriteFailure { step, source } => {
                assert_eq!(step, "sending effect type");
                assert_eq!(source, EndpointError::Timeout);
            }
            other => panic!("unexpected {other:?}"),
        }
        // Only the color packet made it out
        assert_eq!(endpoint.written().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_endpoint_times_out() {
        let endpoint = MockEndpoint::with_latency(Duration::from_secs(30));
        let plan = plan(&config(Effect::Off), Touched::all(), true, &T1M).unwrap();

        let err = execute(&endpoint, &plan, &PacingPolicy::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EffectError::DeviceWriteFailure {
                source: EndpointError::Timeout,
                ..
            }
        ));
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_spacing() {
        let endpoint = MockEndpoint::new();
        let plan = plan(&config(Effect::Off), Touched::all(), true, &T1M).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = execute(&endpoint, &plan, &PacingPolicy::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EffectError::Cancelled));
        assert!(endpoint.calls().is_empty());
    }
}
