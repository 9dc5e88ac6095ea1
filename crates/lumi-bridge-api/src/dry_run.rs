//! Endpoint that logs ZCL frames instead of transmitting them

use bytes::{Bytes, BytesMut};
use lumi_core::{CommandOptions, DeviceEndpoint, EndpointError};
use lumi_protocol::{clusters, AttributeValue, Packet, ZclFrame};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// Frames kept per device for inspection
const HISTORY_LEN: usize = 32;

/// A frame the endpoint would have sent
#[derive(Debug, Clone, Serialize)]
pub struct SentFrame {
    pub cluster: u16,
    /// Serialized ZCL frame, space-separated hex
    pub frame: String,
    pub summary: String,
}

/// Dry-run endpoint for one device
pub struct DryRunEndpoint {
    device: String,
    seq: AtomicU8,
    history: Mutex<VecDeque<SentFrame>>,
}

impl DryRunEndpoint {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            seq: AtomicU8::new(0),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }

    /// Most recent frames, oldest first
    pub fn history(&self) -> Vec<SentFrame> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn next_seq(&self) -> u8 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn emit(&self, cluster: u16, frame: &ZclFrame, summary: String) {
        let sent = SentFrame {
            cluster,
            frame: hex(&frame.encode()),
            summary,
        };
        tracing::info!(
            "[dry-run] {} cluster {:#06x} seq {}: {} ({})",
            self.device,
            cluster,
            frame.sequence(),
            sent.frame,
            sent.summary
        );
        if let Ok(mut history) = self.history.lock() {
            if history.len() == HISTORY_LEN {
                history.pop_front();
            }
            history.push_back(sent);
        }
    }
}

impl DeviceEndpoint for DryRunEndpoint {
    async fn read(
        &self,
        cluster: u16,
        attributes: &[u16],
        options: &CommandOptions,
    ) -> Result<Vec<(u16, AttributeValue)>, EndpointError> {
        let frame = ZclFrame::read_attributes(self.next_seq(), options.manufacturer_code, attributes);
        let ids: Vec<String> = attributes.iter().map(|a| format!("{a:#06x}")).collect();
        self.emit(cluster, &frame, format!("read {}", ids.join(",")));
        // Nothing answers a dry run
        Ok(Vec::new())
    }

    async fn write(
        &self,
        cluster: u16,
        records: &[(u16, AttributeValue)],
        options: &CommandOptions,
    ) -> Result<(), EndpointError> {
        let frame = ZclFrame::write_attributes(
            self.next_seq(),
            options.manufacturer_code,
            records,
            options.disable_default_response,
        );
        let summary: Vec<String> = records
            .iter()
            .map(|(attribute, value)| {
                Packet {
                    attribute: *attribute,
                    value: value.clone(),
                }
                .describe()
            })
            .collect();
        self.emit(cluster, &frame, format!("write {}", summary.join("; ")));
        Ok(())
    }

    async fn command(
        &self,
        cluster: u16,
        command: &str,
        payload: Bytes,
        options: &CommandOptions,
    ) -> Result<(), EndpointError> {
        let command_id = match (cluster, command) {
            (clusters::ON_OFF, "off") => 0x00,
            (clusters::ON_OFF, "on") => 0x01,
            (clusters::ON_OFF, "toggle") => 0x02,
            _ => {
                return Err(EndpointError::Transport(format!(
                    "unknown command {command:?} on cluster {cluster:#06x}"
                )))
            }
        };
        let frame =
            ZclFrame::cluster_command(self.next_seq(), options.manufacturer_code, command_id, payload);
        self.emit(cluster, &frame, format!("command {command}"));
        Ok(())
    }
}

/// Space-separated upper-case hex
pub fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Value bytes of a write record as they appear on the wire
pub fn value_hex(value: &AttributeValue) -> String {
    let mut buf = BytesMut::new();
    value.write_to(&mut buf);
    hex(&buf)
}
