//! Lumi RGB effect core
//!
//! This crate turns property-set messages for Aqara (Lumi) RGB lights into
//! validated effect configurations and paced attribute writes, on top of
//! the wire formats in `lumi-protocol`.

pub mod controller;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod family;
pub mod model;
pub mod pacing;
pub mod persistence;
pub mod resolver;
pub mod sequencer;
pub mod settings;
pub mod store;

pub use controller::EffectController;
pub use device::LumiDevice;
pub use endpoint::{CommandOptions, DeviceEndpoint, EndpointError};
pub use error::EffectError;
pub use family::{EffectEncoding, FamilyProfile};
pub use model::{Effect, EffectConfiguration};
pub use pacing::PacingPolicy;
pub use store::StateStore;
