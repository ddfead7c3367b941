//! Schema of the optional `presets.toml` that replaces the built-in list.
//!
//! ```toml
//! start = "water"
//!
//! [[preset]]
//! name = "water"
//! textures = [{ slot = 0, path = "tex0.jpg" }]
//!
//! [[preset]]
//! name = "julia"
//! shader = "fractals/julia.fs"
//! ```
//!
//! `PresetManifest::validate` returns every issue at once so a broken manifest
//! can be fixed in one pass.
use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::MAX_TEXTURE_SLOTS;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PresetManifest {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default, rename = "preset")]
    pub presets: Vec<PresetEntry>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PresetEntry {
    pub name: String,
    /// Fragment source relative to the presets directory; `<name>.fs` when omitted.
    #[serde(default)]
    pub shader: Option<PathBuf>,
    #[serde(default)]
    pub textures: Vec<TextureBinding>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub slot: u8,
    /// File relative to the presets directory, absolute path, or `http(s)://` URL.
    pub path: String,
}

impl PresetManifest {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.presets.is_empty() {
            issues.push("manifest must declare at least one preset".to_string());
        }

        let mut names = HashSet::new();
        for preset in &self.presets {
            if preset.name.trim().is_empty() {
                issues.push("preset names must not be empty".to_string());
            }
            if !names.insert(preset.name.as_str()) {
                issues.push(format!("preset '{}' is declared more than once", preset.name));
            }

            let mut slots = HashSet::new();
            for texture in &preset.textures {
                if usize::from(texture.slot) >= MAX_TEXTURE_SLOTS {
                    issues.push(format!(
                        "preset '{}' uses slot {} which exceeds the {} available slots",
                        preset.name, texture.slot, MAX_TEXTURE_SLOTS
                    ));
                }
                if !slots.insert(texture.slot) {
                    issues.push(format!(
                        "preset '{}' binds slot {} more than once",
                        preset.name, texture.slot
                    ));
                }
                if texture.path.trim().is_empty() {
                    issues.push(format!(
                        "preset '{}' has an empty texture path for slot {}",
                        preset.name, texture.slot
                    ));
                }
            }
        }

        if let Some(start) = &self.start {
            if !self.presets.iter().any(|preset| &preset.name == start) {
                issues.push(format!("start preset '{start}' not found"));
            }
        }
        issues
    }
}
