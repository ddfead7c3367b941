//! Preset list, per-preset texture mapping and circular cycling.
//!
//! Presets live in a directory as `<name>.fs` fragment sources next to the
//! images they sample. The list is fixed at startup: either the built-in
//! ordering or an optional `presets.toml` manifest in the same directory.

mod catalog;
mod cycle;
mod manifest;

pub use catalog::{
    CatalogError, Preset, PresetCatalog, TextureAssignment, BUILTIN_PRESETS, DEFAULT_START,
    MANIFEST_FILE, MAX_TEXTURE_SLOTS,
};
pub use cycle::PresetCycle;
pub use manifest::{PresetEntry, PresetManifest, TextureBinding};
