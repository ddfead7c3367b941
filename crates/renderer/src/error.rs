use thiserror::Error;

use crate::types::{Stage, SLOT_COUNT};

/// Recoverable failures reported by [`crate::Effect`].
///
/// None of these leave the effect in an unrenderable state: the previously
/// active program and textures stay bound.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("{stage} ERROR: {log}")]
    Compile { stage: Stage, log: String },
    #[error("LINK ERROR: {0}")]
    Link(String),
    #[error("texture slot {0} is out of range (expected 0..{max})", max = SLOT_COUNT)]
    InvalidSlot(usize),
    #[error("failed to upload texture from {origin}: {reason}")]
    Texture { origin: String, reason: String },
}

impl EffectError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EffectError::Compile { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
