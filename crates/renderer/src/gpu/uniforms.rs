use bytemuck::{Pod, Zeroable};

use crate::types::UniformValues;

/// CPU mirror of the `EffectParams` block injected ahead of every fragment
/// shader. Field order and padding follow std140.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct EffectUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub _padding0: f32,
    pub mouse: [f32; 4],
}

unsafe impl Zeroable for EffectUniforms {}
unsafe impl Pod for EffectUniforms {}

impl EffectUniforms {
    /// Overwrites the fields the active program declares. Undeclared fields
    /// keep whatever the previous program left behind.
    pub fn apply(&mut self, values: &UniformValues) {
        if let Some(time) = values.time {
            self.time = time;
        }
        if let Some(resolution) = values.resolution {
            self.resolution = resolution;
        }
        if let Some(mouse) = values.mouse {
            self.mouse = mouse;
        }
    }
}
