use std::path::PathBuf;

use clap::Parser;
use renderer::LoadStrategy;

#[derive(Parser, Debug)]
#[command(
    name = "shaderdemo",
    author,
    version,
    about = "Cycles full-screen fragment shader presets (space for next preset)"
)]
pub struct Cli {
    /// Directory containing `<preset>.fs` sources, their textures, and an optional `presets.toml`.
    #[arg(
        long,
        env = "SHADERDEMO_PRESETS",
        value_name = "DIR",
        default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/presets")
    )]
    pub presets_dir: PathBuf,

    /// Preset to start on instead of the list's default.
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "800x600")]
    pub size: (u32, u32),

    /// Texture decoding: `threaded` (default) or `immediate` on the render thread.
    #[arg(
        long,
        value_name = "MODE",
        value_parser = parse_texture_loading,
        default_value = "threaded"
    )]
    pub texture_loading: LoadStrategy,

    /// Print the preset list with its texture mapping and exit.
    #[arg(long)]
    pub list: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width in window size".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height in window size".to_string())?;
    if width == 0 || height == 0 {
        return Err("window size must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_texture_loading(value: &str) -> Result<LoadStrategy, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "threaded" => Ok(LoadStrategy::Threaded),
        "immediate" => Ok(LoadStrategy::Immediate),
        other => Err(format!(
            "unknown texture loading mode '{other}'; expected threaded or immediate"
        )),
    }
}
