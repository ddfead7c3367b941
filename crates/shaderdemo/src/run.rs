use std::io::{self, Write};

use anyhow::{Context, Result};
use presets::PresetCatalog;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::window::{self, WindowConfig};

const DEFAULT_FILTER: &str = "warn,shaderdemo=info,renderer=info,presets=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error,winit=error";

pub fn initialise_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let catalog = PresetCatalog::load(&cli.presets_dir).with_context(|| {
        format!(
            "failed to load presets from {}",
            cli.presets_dir.display()
        )
    })?;
    let start = match cli.preset.as_deref() {
        Some(name) => catalog.position(name)?,
        None => catalog.start_index(),
    };

    if cli.list {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        write_listing(&mut out, &catalog, start)?;
        return Ok(());
    }

    tracing::info!(
        presets = catalog.len(),
        root = %catalog.root().display(),
        start = catalog.get(start).map(|preset| preset.name.as_str()).unwrap_or_default(),
        "starting shader demo"
    );
    window::run(
        WindowConfig {
            size: cli.size,
            texture_loading: cli.texture_loading,
        },
        catalog,
        start,
    )
}

/// One line per preset in cycling order. `*` marks the start preset and
/// presets whose fragment source is missing are flagged.
fn write_listing(out: &mut impl Write, catalog: &PresetCatalog, start: usize) -> io::Result<()> {
    for (index, preset) in catalog.presets().iter().enumerate() {
        let marker = if index == start { '*' } else { ' ' };
        write!(out, "{marker} {}", preset.name)?;
        for assignment in &preset.textures {
            write!(out, " tex{}={}", assignment.slot, assignment.source)?;
        }
        if !catalog.shader_path(preset).is_file() {
            write!(out, " (missing {})", preset.shader.display())?;
        }
        writeln!(out)?;
    }
    Ok(())
}
