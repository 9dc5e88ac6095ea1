//! Lumi device representation

use crate::error::EffectError;
use crate::family::{self, FamilyProfile};

/// A registered light together with the endpoint used to reach it
#[derive(Debug)]
pub struct LumiDevice<E> {
    /// Bridge-level identity (IEEE address or friendly name)
    pub id: String,
    /// Model identifier (from Basic cluster)
    pub model: String,
    pub family: &'static FamilyProfile,
    pub endpoint: E,
}

impl<E> LumiDevice<E> {
    /// Create a device, resolving its family from the model identifier
    pub fn new(id: impl Into<String>, model: &str, endpoint: E) -> Result<Self, EffectError> {
        let family =
            family::lookup(model).ok_or_else(|| EffectError::UnknownModel(model.to_string()))?;
        Ok(Self {
            id: id.into(),
            model: model.to_string(),
            family,
            endpoint,
        })
    }
}
