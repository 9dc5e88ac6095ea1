//! Device endpoint abstraction
//!
//! The bridge owns the actual radio transport. The effect core only needs
//! three primitives from it, each of which may fail or time out.

use bytes::Bytes;
use lumi_protocol::{AttributeValue, MANUFACTURER_CODE};
use std::future::Future;
use thiserror::Error;

/// Endpoint call failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Request timeout")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Device returned status {0:#04x}")]
    Status(u8),
}

/// Options attached to every endpoint call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandOptions {
    /// Set for manufacturer-specific frames
    pub manufacturer_code: Option<u16>,
    pub disable_default_response: bool,
}

impl CommandOptions {
    /// Options for the Lumi private cluster
    #[must_use]
    pub fn lumi() -> Self {
        Self {
            manufacturer_code: Some(MANUFACTURER_CODE),
            disable_default_response: false,
        }
    }
}

/// A single addressable endpoint on a device
pub trait DeviceEndpoint: Send + Sync {
    /// Read attributes, returning the values that were reported
    fn read(
        &self,
        cluster: u16,
        attributes: &[u16],
        options: &CommandOptions,
    ) -> impl Future<Output = Result<Vec<(u16, AttributeValue)>, EndpointError>> + Send;

    /// Write attribute records
    fn write(
        &self,
        cluster: u16,
        records: &[(u16, AttributeValue)],
        options: &CommandOptions,
    ) -> impl Future<Output = Result<(), EndpointError>> + Send;

    /// Send a cluster-specific command by name (e.g. `"on"`)
    fn command(
        &self,
        cluster: u16,
        command: &str,
        payload: Bytes,
        options: &CommandOptions,
    ) -> impl Future<Output = Result<(), EndpointError>> + Send;
}
