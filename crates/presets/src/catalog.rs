//! Resolves the ordered preset list and each preset's texture slots against a
//! presets directory.
//!
//! Types:
//!
//! - `CatalogError` classifies manifest parsing, validation, and I/O failures.
//! - `Preset` is one entry: its name, fragment source path, and slot mapping.
//! - `PresetCatalog` owns the directory and the ordered presets.
//!
//! Functions:
//!
//! - `PresetCatalog::load` reads `presets.toml` when present and falls back to
//!   the built-in list otherwise.
//! - `PresetCatalog::texture_sources` expands a preset's sparse mapping into
//!   one source per slot, empty strings for unmapped slots.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::manifest::PresetManifest;

/// Texture slots a preset may bind.
pub const MAX_TEXTURE_SLOTS: usize = 4;

/// Manifest file name looked up inside the presets directory.
pub const MANIFEST_FILE: &str = "presets.toml";

/// Preset shown first when nothing else is requested.
pub const DEFAULT_START: &str = "deform";

/// Built-in cycling order.
pub const BUILTIN_PRESETS: &[&str] = &[
    "deform",
    "704",
    "water",
    "mandelbulb",
    "landscape",
    "clod",
    "droid",
    "slisesix",
    "square_tunnel",
    "earth",
    "sult",
    "kinderpainter",
    "red",
    "quaternion",
    "lunaquatic",
    "metatunnel",
    "leizex",
    "mandel",
    "julia",
    "shapes",
    "apple",
];

/// Built-in slot mapping as `(preset, slot, image)`.
const BUILTIN_TEXTURES: &[(&str, usize, &str)] = &[
    ("kinderpainter", 0, "tex0.jpg"),
    ("square_tunnel", 0, "tex0.jpg"),
    ("water", 0, "tex0.jpg"),
    ("earth", 0, "earth_day.jpg"),
    ("deform", 0, "tex3.jpg"),
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse {file}: {0}", file = MANIFEST_FILE)]
    ManifestParse(#[from] toml::de::Error),

    #[error("{file} validation failed: {}", .0.join("; "), file = MANIFEST_FILE)]
    ManifestValidation(Vec<String>),

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Image bound to one slot while a preset is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureAssignment {
    pub slot: usize,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    /// Fragment source, relative to the catalog root unless absolute.
    pub shader: PathBuf,
    pub textures: Vec<TextureAssignment>,
}

impl Preset {
    fn builtin(name: &str) -> Self {
        let textures = BUILTIN_TEXTURES
            .iter()
            .filter(|(preset, _, _)| *preset == name)
            .map(|(_, slot, source)| TextureAssignment {
                slot: *slot,
                source: (*source).to_string(),
            })
            .collect();
        Self {
            name: name.to_string(),
            shader: default_shader_path(name),
            textures,
        }
    }
}

fn default_shader_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{name}.fs"))
}

#[derive(Debug, Clone)]
pub struct PresetCatalog {
    root: PathBuf,
    presets: Vec<Preset>,
    start: usize,
}

impl PresetCatalog {
    /// Built-in presets resolved against `root`.
    pub fn builtin(root: impl Into<PathBuf>) -> Self {
        let presets: Vec<Preset> = BUILTIN_PRESETS
            .iter()
            .map(|name| Preset::builtin(name))
            .collect();
        let start = presets
            .iter()
            .position(|preset| preset.name == DEFAULT_START)
            .unwrap_or(0);
        Self {
            root: root.into(),
            presets,
            start,
        }
    }

    /// Reads `presets.toml` from `root` if it exists, else the built-in list.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            tracing::debug!(root = %root.display(), "no preset manifest; using built-in list");
            return Ok(Self::builtin(root));
        }

        let raw = fs::read_to_string(&manifest_path)?;
        let manifest: PresetManifest = toml::from_str(&raw)?;
        let issues = manifest.validate();
        if !issues.is_empty() {
            return Err(CatalogError::ManifestValidation(issues));
        }
        tracing::debug!(
            path = %manifest_path.display(),
            presets = manifest.presets.len(),
            "loaded preset manifest"
        );
        Ok(Self::from_manifest(root, manifest))
    }

    fn from_manifest(root: PathBuf, manifest: PresetManifest) -> Self {
        let presets: Vec<Preset> = manifest
            .presets
            .into_iter()
            .map(|entry| Preset {
                shader: entry
                    .shader
                    .unwrap_or_else(|| default_shader_path(&entry.name)),
                textures: entry
                    .textures
                    .into_iter()
                    .map(|binding| TextureAssignment {
                        slot: usize::from(binding.slot),
                        source: binding.path,
                    })
                    .collect(),
                name: entry.name,
            })
            .collect();
        let start = manifest
            .start
            .and_then(|start| presets.iter().position(|preset| preset.name == start))
            .unwrap_or(0);
        Self {
            root,
            presets,
            start,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Preset> {
        self.presets.get(index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|preset| preset.name.as_str())
    }

    pub fn position(&self, name: &str) -> Result<usize, CatalogError> {
        self.presets
            .iter()
            .position(|preset| preset.name == name)
            .ok_or_else(|| CatalogError::UnknownPreset(name.to_string()))
    }

    /// Index the demo starts on: the manifest's `start`, `deform` for the
    /// built-in list, else the first preset.
    pub fn start_index(&self) -> usize {
        self.start
    }

    pub fn shader_path(&self, preset: &Preset) -> PathBuf {
        self.root.join(&preset.shader)
    }

    /// Reads the whole fragment source of `preset`.
    pub fn load_shader_source(&self, preset: &Preset) -> Result<String> {
        let path = self.shader_path(preset);
        fs::read_to_string(&path)
            .with_context(|| format!("failed to read preset shader {}", path.display()))
    }

    /// One source per slot for `preset`, resolved against the catalog root.
    /// Unmapped slots are empty strings, meaning "clear this slot".
    pub fn texture_sources(&self, preset: &Preset) -> [String; MAX_TEXTURE_SLOTS] {
        let mut sources: [String; MAX_TEXTURE_SLOTS] = Default::default();
        for assignment in &preset.textures {
            if let Some(source) = sources.get_mut(assignment.slot) {
                *source = self.resolve_source(&assignment.source);
            }
        }
        sources
    }

    fn resolve_source(&self, source: &str) -> String {
        if source.starts_with("http://") || source.starts_with("https://") {
            return source.to_string();
        }
        let path = Path::new(source);
        if path.is_absolute() {
            source.to_string()
        } else {
            self.root.join(path).to_string_lossy().into_owned()
        }
    }
}
