use std::fmt;

/// Number of independently owned texture slots an `Effect` manages.
pub const SLOT_COUNT: usize = 4;

/// Sampler units bound at draw time (`tex0`, `tex1`), reading slots 0 and 1.
///
/// `tex2` and `tex3` may still be declared; they sample the black placeholder.
pub const SAMPLER_COUNT: usize = 2;

/// Vertex count of the full-screen quad (two triangles, no index buffer).
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Clip-space positions of the full-screen quad, fixed for the lifetime of an `Effect`.
pub const QUAD_VERTICES: [[f32; 2]; QUAD_VERTEX_COUNT as usize] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

/// Window-space point in pixels with a top-left origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    /// Mouse origin value meaning "no press in progress".
    pub const SENTINEL: Point2 = Point2 { x: -1.0, y: -1.0 };
    pub const ZERO: Point2 = Point2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl Default for Point2 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Pixel rectangle the quad is rasterised into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Uniform values resolved for one draw. `None` marks a uniform the active
/// program does not declare; backends leave it untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UniformValues {
    pub time: Option<f32>,
    pub resolution: Option<[f32; 2]>,
    pub mouse: Option<[f32; 4]>,
}

/// Texture bound to one sampler unit for a draw.
#[derive(Debug)]
pub enum SamplerBinding<'a, T> {
    /// The program has no sampler uniform for this unit.
    Unused,
    /// The program samples this unit but its slot holds no texture.
    Empty,
    Bound(&'a T),
}

impl<T> SamplerBinding<'_, T> {
    pub fn is_bound(&self) -> bool {
        matches!(self, SamplerBinding::Bound(_))
    }
}

impl<T> Clone for SamplerBinding<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SamplerBinding<'_, T> {}

/// Shader pipeline stage, displayed the way compile errors are prefixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub(crate) fn naga_stage(self) -> wgpu::naga::ShaderStage {
        match self {
            Stage::Vertex => wgpu::naga::ShaderStage::Vertex,
            Stage::Fragment => wgpu::naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("VS"),
            Stage::Fragment => f.write_str("FS"),
        }
    }
}
