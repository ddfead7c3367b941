use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Where a slot's image data comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextureSource {
    File(PathBuf),
    Url(String),
}

impl TextureSource {
    /// Interprets `http://` and `https://` prefixes as URLs, anything else as a path.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            TextureSource::Url(trimmed.to_string())
        } else {
            TextureSource::File(PathBuf::from(trimmed))
        }
    }
}

impl fmt::Display for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureSource::File(path) => write!(f, "{}", path.display()),
            TextureSource::Url(url) => f.write_str(url),
        }
    }
}

/// One level of a CPU-side mip chain, tightly packed RGBA8.
#[derive(Clone, Debug)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decoded RGBA8 image with its full mip chain, level 0 first.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub levels: Vec<MipLevel>,
}

impl DecodedImage {
    pub fn from_rgba(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            bail!("image has zero extent ({width}x{height})");
        }

        let mut levels = Vec::with_capacity(mip_level_count(width, height) as usize);
        let mut current = image;
        loop {
            let (w, h) = current.dimensions();
            let next = if w > 1 || h > 1 {
                Some(imageops::resize(
                    &current,
                    (w / 2).max(1),
                    (h / 2).max(1),
                    FilterType::Triangle,
                ))
            } else {
                None
            };
            levels.push(MipLevel {
                width: w,
                height: h,
                pixels: current.into_raw(),
            });
            match next {
                Some(image) => current = image,
                None => break,
            }
        }

        Ok(Self { levels })
    }

    pub fn width(&self) -> u32 {
        self.levels[0].width
    }

    pub fn height(&self) -> u32 {
        self.levels[0].height
    }

    pub fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

/// Number of levels in a full mip chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Fetches and decodes an image, then builds its mip chain.
pub fn load_image(source: &TextureSource) -> Result<DecodedImage> {
    let image = match source {
        TextureSource::File(path) => decode_file(path)?,
        TextureSource::Url(url) => decode_bytes(&fetch(url)?)
            .with_context(|| format!("failed to decode image from {url}"))?,
    };
    DecodedImage::from_rgba(image)
}

fn decode_file(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to open texture {}", path.display()))?;
    Ok(image.to_rgba8())
}

fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

fn fetch(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::blocking::Client::builder()
        .user_agent(concat!("shaderdemo/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?
        .get(url)
        .send()
        .with_context(|| format!("failed to request {url}"))?
        .error_for_status()
        .with_context(|| format!("request to {url} failed"))?;
    let mut bytes = Vec::new();
    response
        .take(MAX_DOWNLOAD_BYTES)
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read body of {url}"))?;
    Ok(bytes)
}

const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// How texture requests are serviced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Decode on the calling thread; the result is queued for the next frame.
    Immediate,
    /// Decode on a dedicated worker thread per request.
    #[default]
    Threaded,
}

/// Completed request, tagged with the generation it was issued under.
pub struct LoadOutcome {
    pub slot: usize,
    pub generation: u64,
    pub source: TextureSource,
    pub result: Result<DecodedImage>,
}

/// Issues texture decodes and hands finished images back through a channel.
///
/// Results are only ever observed by whoever drains the receiver; for an
/// `Effect` that is the frame boundary in `draw`.
pub struct TextureLoader {
    strategy: LoadStrategy,
    sender: Sender<LoadOutcome>,
    receiver: Receiver<LoadOutcome>,
}

impl TextureLoader {
    pub fn new(strategy: LoadStrategy) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            strategy,
            sender,
            receiver,
        }
    }

    pub fn request(&self, slot: usize, generation: u64, source: TextureSource) {
        match self.strategy {
            LoadStrategy::Immediate => {
                let result = load_image(&source);
                let _ = self.sender.send(LoadOutcome {
                    slot,
                    generation,
                    source,
                    result,
                });
            }
            LoadStrategy::Threaded => {
                let sender = self.sender.clone();
                let spawned = thread::Builder::new()
                    .name(format!("texture-load-{slot}"))
                    .spawn({
                        let source = source.clone();
                        move || {
                            let result = load_image(&source);
                            let _ = sender.send(LoadOutcome {
                                slot,
                                generation,
                                source,
                                result,
                            });
                        }
                    });
                if let Err(err) = spawned {
                    let _ = self.sender.send(LoadOutcome {
                        slot,
                        generation,
                        source,
                        result: Err(anyhow::Error::new(err)
                            .context("failed to spawn texture loader thread")),
                    });
                }
            }
        }
    }

    /// Collects every outcome that is already available without blocking.
    pub fn drain(&self) -> Vec<LoadOutcome> {
        self.receiver.try_iter().collect()
    }

    /// Blocks for the next outcome, up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LoadOutcome> {
        self.receiver.recv_timeout(timeout).ok()
    }
}
