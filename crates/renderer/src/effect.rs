use std::mem;
use std::time::{Duration, Instant};

use crate::backend::{DrawCall, RenderBackend};
use crate::compile::{compile_stage, UniformSet, DEFAULT_FRAGMENT_SHADER, VERTEX_SHADER_GLSL};
use crate::error::EffectError;
use crate::textures::{LoadOutcome, LoadStrategy, TextureLoader, TextureSource};
use crate::types::{
    Point2, SamplerBinding, Stage, UniformValues, Viewport, QUAD_VERTEX_COUNT, QUAD_VERTICES,
    SLOT_COUNT,
};

struct ActiveProgram<P> {
    handle: P,
    uniforms: UniformSet,
}

/// One texture slot. `generation` identifies the latest request; older
/// completions are discarded when they arrive.
struct TextureSlot<T> {
    texture: Option<T>,
    generation: u64,
    pending: Option<TextureSource>,
}

impl<T> Default for TextureSlot<T> {
    fn default() -> Self {
        Self {
            texture: None,
            generation: 0,
            pending: None,
        }
    }
}

/// Shader and texture manager for a full-screen fragment effect.
///
/// Exactly one program is alive at any time. Failed shader replacements keep
/// the previous program; texture replacements swap in at the frame boundary so
/// the old texture stays visible until the new one has been uploaded.
pub struct Effect<B: RenderBackend> {
    backend: B,
    quad: B::VertexBuffer,
    program: ActiveProgram<B::Program>,
    resolution: (u32, u32),
    slots: [TextureSlot<B::Texture>; SLOT_COUNT],
    loader: TextureLoader,
    generation: u64,
}

impl<B: RenderBackend> Effect<B> {
    /// Builds the quad and the default black program.
    pub fn new(
        backend: B,
        width: u32,
        height: u32,
        strategy: LoadStrategy,
    ) -> Result<Self, EffectError> {
        Self::with_fragment(backend, width, height, strategy, DEFAULT_FRAGMENT_SHADER)
    }

    pub fn with_fragment(
        mut backend: B,
        width: u32,
        height: u32,
        strategy: LoadStrategy,
        fragment_source: &str,
    ) -> Result<Self, EffectError> {
        let quad = backend.create_vertex_buffer(&QUAD_VERTICES);
        let program = build_program(&mut backend, fragment_source)?;
        tracing::debug!(width, height, ?strategy, "effect initialised");

        Ok(Self {
            backend,
            quad,
            program,
            resolution: (width, height),
            slots: std::array::from_fn(|_| TextureSlot::default()),
            loader: TextureLoader::new(strategy),
            generation: 0,
        })
    }

    /// Compiles `fragment_source` against the passthrough vertex stage and
    /// makes it the active program.
    ///
    /// On error the previous program stays active and renderable.
    pub fn replace_shader(&mut self, fragment_source: &str) -> Result<(), EffectError> {
        let next = build_program(&mut self.backend, fragment_source)?;
        let previous = mem::replace(&mut self.program, next);
        self.backend.release_program(previous.handle);
        tracing::debug!(uniforms = ?self.program.uniforms, "shader replaced");
        Ok(())
    }

    /// Starts loading `source` into `slot`, or clears the slot when `source`
    /// is empty.
    ///
    /// Loading is asynchronous: the slot keeps its current texture until the
    /// new one is applied by a later [`Effect::draw`]. A newer request for the
    /// same slot supersedes any load still in flight.
    pub fn replace_texture(&mut self, slot: usize, source: &str) -> Result<(), EffectError> {
        if slot >= SLOT_COUNT {
            return Err(EffectError::InvalidSlot(slot));
        }

        self.generation += 1;
        let generation = self.generation;
        let entry = &mut self.slots[slot];
        entry.generation = generation;

        if source.trim().is_empty() {
            if let Some(superseded) = entry.pending.take() {
                tracing::debug!(slot, source = %superseded, "texture load cancelled");
            }
            if let Some(texture) = entry.texture.take() {
                self.backend.release_texture(texture);
                tracing::debug!(slot, "texture slot cleared");
            }
            return Ok(());
        }

        let source = TextureSource::parse(source);
        tracing::debug!(slot, %source, generation, "requesting texture");
        entry.pending = Some(source.clone());
        self.loader.request(slot, generation, source);
        Ok(())
    }

    /// Applies every texture load that has completed. Returns the number of
    /// slots that received a new texture.
    pub fn poll_textures(&mut self) -> usize {
        let mut applied = 0;
        for outcome in self.loader.drain() {
            if self.apply_outcome(outcome) {
                applied += 1;
            }
        }
        applied
    }

    /// Blocks until no slot has a load in flight or `timeout` elapses.
    /// Returns `true` when every request has settled.
    pub fn wait_for_textures(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll_textures();
            if self.slots.iter().all(|slot| slot.pending.is_none()) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if let Some(outcome) = self.loader.recv_timeout(remaining) {
                self.apply_outcome(outcome);
            }
        }
    }

    fn apply_outcome(&mut self, outcome: LoadOutcome) -> bool {
        let LoadOutcome {
            slot,
            generation,
            source,
            result,
        } = outcome;
        let Some(entry) = self.slots.get_mut(slot) else {
            return false;
        };
        if entry.generation != generation {
            tracing::debug!(slot, %source, generation, "discarding superseded texture load");
            return false;
        }
        entry.pending = None;

        let image = match result {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(
                    slot,
                    %source,
                    error = %format!("{err:#}"),
                    "failed to load texture; keeping previous binding"
                );
                return false;
            }
        };

        let label = format!("effect slot {slot} texture");
        match self.backend.create_texture(&image, &label) {
            Ok(texture) => {
                if let Some(previous) = entry.texture.replace(texture) {
                    self.backend.release_texture(previous);
                }
                tracing::info!(
                    slot,
                    %source,
                    width = image.width(),
                    height = image.height(),
                    mip_levels = image.mip_level_count(),
                    "texture ready"
                );
                true
            }
            Err(reason) => {
                let error = EffectError::Texture {
                    origin: source.to_string(),
                    reason,
                };
                tracing::warn!(slot, %error, "keeping previous binding");
                false
            }
        }
    }

    /// Renders one frame of the quad with the active program.
    ///
    /// `time` is in seconds; `mouse_origin` and `mouse_position` are window
    /// pixels with a top-left origin and are flipped to a bottom-left origin
    /// for the `mouse` uniform. Uniforms the program does not declare are
    /// skipped.
    pub fn draw(
        &mut self,
        time: f32,
        mouse_origin: Point2,
        mouse_position: Point2,
    ) -> Result<(), B::FrameError> {
        self.poll_textures();

        let (width, height) = self.resolution;
        let declared = self.program.uniforms;
        let flip = height as f32 - 1.0;
        let uniforms = UniformValues {
            time: declared.time.then_some(time),
            resolution: declared
                .resolution
                .then_some([width as f32, height as f32]),
            mouse: declared.mouse.then_some([
                mouse_position.x,
                flip - mouse_position.y,
                mouse_origin.x,
                flip - mouse_origin.y,
            ]),
        };

        let slots = &self.slots;
        let samplers = std::array::from_fn(|unit| {
            if !declared.uses_sampler(unit) {
                SamplerBinding::Unused
            } else {
                match slots[unit].texture.as_ref() {
                    Some(texture) => SamplerBinding::Bound(texture),
                    None => SamplerBinding::Empty,
                }
            }
        });

        self.backend.draw(DrawCall {
            viewport: Viewport::full(width, height),
            program: &self.program.handle,
            vertex_buffer: &self.quad,
            uniforms,
            samplers,
            vertex_count: QUAD_VERTEX_COUNT,
        })
    }

    /// Records the new drawable size. Takes effect on the next draw.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.resolution = (width, height);
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Uniforms declared by the active program.
    pub fn uniforms(&self) -> UniformSet {
        self.program.uniforms
    }

    pub fn has_texture(&self, slot: usize) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|entry| entry.texture.is_some())
    }

    pub fn is_loading(&self, slot: usize) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|entry| entry.pending.is_some())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

fn build_program<B: RenderBackend>(
    backend: &mut B,
    fragment_source: &str,
) -> Result<ActiveProgram<B::Program>, EffectError> {
    let vertex = compile_stage(Stage::Vertex, VERTEX_SHADER_GLSL)?;
    let fragment = compile_stage(Stage::Fragment, fragment_source)?;
    let handle = backend
        .link_program(&vertex, &fragment)
        .map_err(EffectError::Link)?;
    Ok(ActiveProgram {
        handle,
        uniforms: fragment.uniforms,
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::recording::{RecordedSampler, RecordingBackend};

    const TIME_SHADER: &str = "uniform float time;\nvoid main(void) { gl_FragColor = vec4(time); }\n";
    const MOUSE_SHADER: &str = r"
        uniform vec2 resolution;
        uniform vec4 mouse;
        void main(void) { gl_FragColor = vec4(mouse.xy / resolution, 0.0, 1.0); }
    ";
    const TEX0_SHADER: &str = r"
        uniform sampler2D tex0;
        void main(void) { gl_FragColor = texture2D(tex0, gl_FragCoord.xy / 64.0); }
    ";

    fn effect(strategy: LoadStrategy) -> Effect<RecordingBackend> {
        Effect::new(RecordingBackend::new(), 800, 600, strategy).expect("effect")
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> String {
        let path: PathBuf = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .save(&path)
            .expect("write png");
        path.to_string_lossy().into_owned()
    }

    fn last_program(effect: &Effect<RecordingBackend>) -> u64 {
        effect.backend().last_draw().expect("draw recorded").program
    }

    #[test]
    fn default_program_draws_full_viewport_without_textures() {
        let mut effect = effect(LoadStrategy::Immediate);
        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();

        let draws = effect.backend().draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].vertex_count, 6);
        assert_eq!(draws[0].viewport, Viewport::full(800, 600));
        assert_eq!(draws[0].uniforms, UniformValues::default());
        assert_eq!(
            draws[0].samplers,
            [RecordedSampler::Unused, RecordedSampler::Unused]
        );
    }

    #[test]
    fn declared_time_uniform_receives_seconds() {
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_shader(TIME_SHADER).unwrap();
        effect.draw(1.5, Point2::SENTINEL, Point2::ZERO).unwrap();

        let uniforms = effect.backend().last_draw().unwrap().uniforms;
        assert_eq!(uniforms.time, Some(1.5));
        assert_eq!(uniforms.resolution, None);
        assert_eq!(uniforms.mouse, None);
    }

    #[test]
    fn mouse_uniform_uses_bottom_left_origin() {
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_shader(MOUSE_SHADER).unwrap();
        effect
            .draw(0.0, Point2::new(10.0, 20.0), Point2::new(30.0, 40.0))
            .unwrap();

        let uniforms = effect.backend().last_draw().unwrap().uniforms;
        assert_eq!(uniforms.resolution, Some([800.0, 600.0]));
        assert_eq!(uniforms.mouse, Some([30.0, 559.0, 10.0, 579.0]));
    }

    #[test]
    fn repeated_shader_switches_keep_one_program_alive() {
        let mut effect = effect(LoadStrategy::Immediate);
        for source in [TIME_SHADER, MOUSE_SHADER, TEX0_SHADER, TIME_SHADER] {
            effect.replace_shader(source).unwrap();
            effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
            assert_eq!(effect.backend().live_programs(), 1);
        }
        assert!(effect.uniforms().time);
    }

    #[test]
    fn compile_failure_keeps_previous_program() {
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_shader(TIME_SHADER).unwrap();
        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        let before = last_program(&effect);

        let err = effect
            .replace_shader("oid main(void) { gl_FragColor = vec4(1.0); }")
            .expect_err("broken shader");
        assert_eq!(err.stage(), Some(Stage::Fragment));
        assert!(err.to_string().starts_with("FS ERROR: "));

        effect.draw(2.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        assert_eq!(last_program(&effect), before);
        assert_eq!(effect.backend().live_programs(), 1);
        assert_eq!(effect.backend().last_draw().unwrap().uniforms.time, Some(2.0));
    }

    #[test]
    fn unknown_uniform_is_a_fragment_error() {
        let mut effect = effect(LoadStrategy::Immediate);
        let err = effect
            .replace_shader("uniform float speed;\nvoid main(void) {}\n")
            .expect_err("unsupported uniform");
        assert!(err.to_string().contains("speed"));
    }

    #[test]
    fn link_failure_keeps_previous_program() {
        let mut effect = effect(LoadStrategy::Immediate);
        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        let before = last_program(&effect);

        effect.backend_mut().fail_next_link("incompatible interface");
        let err = effect.replace_shader(TIME_SHADER).expect_err("link failure");
        assert_eq!(err.to_string(), "LINK ERROR: incompatible interface");

        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        assert_eq!(last_program(&effect), before);
        assert_eq!(effect.backend().live_programs(), 1);
    }

    #[test]
    fn texture_is_bound_after_next_frame_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "tex0.png", 16, 8);
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_shader(TEX0_SHADER).unwrap();

        effect.replace_texture(0, &path).unwrap();
        assert!(effect.is_loading(0));
        assert!(!effect.has_texture(0));

        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        assert!(effect.has_texture(0));
        assert!(!effect.is_loading(0));
        let draw = effect.backend().last_draw().unwrap();
        assert!(matches!(draw.samplers[0], RecordedSampler::Texture(_)));
        assert_eq!(draw.samplers[1], RecordedSampler::Unused);
    }

    #[test]
    fn declared_sampler_without_texture_is_empty() {
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_shader(TEX0_SHADER).unwrap();
        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        assert_eq!(
            effect.backend().last_draw().unwrap().samplers[0],
            RecordedSampler::Empty
        );
    }

    #[test]
    fn upper_slot_samplers_compile_and_draw_unbound() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "tex2.png", 4, 4);
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_texture(2, &path).unwrap();
        effect
            .replace_shader(
                "uniform sampler2D tex0;\nuniform sampler2D tex2;\n\
                 void main(void) { gl_FragColor = texture2D(tex0, vec2(0.5)) + texture2D(tex2, vec2(0.5)); }\n",
            )
            .unwrap();
        assert!(effect.uniforms().uses_sampler(2));

        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        let draw = effect.backend().last_draw().unwrap();
        assert_eq!(draw.vertex_count, 6);
        assert_eq!(
            draw.samplers,
            [RecordedSampler::Empty, RecordedSampler::Unused]
        );
    }

    #[test]
    fn empty_source_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "tex0.png", 4, 4);
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_texture(0, &path).unwrap();
        effect.poll_textures();
        assert_eq!(effect.backend().live_textures(), 1);

        effect.replace_texture(0, "").unwrap();
        assert!(!effect.has_texture(0));
        assert_eq!(effect.backend().live_textures(), 0);
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut effect = effect(LoadStrategy::Immediate);
        assert!(matches!(
            effect.replace_texture(4, "tex.png"),
            Err(EffectError::InvalidSlot(4))
        ));
        assert!(!effect.has_texture(4));
    }

    #[test]
    fn failed_load_keeps_previous_texture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "tex0.png", 4, 4);
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_shader(TEX0_SHADER).unwrap();
        effect.replace_texture(0, &path).unwrap();
        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        let before = effect.backend().last_draw().unwrap().samplers[0];

        let missing = dir.path().join("missing.png");
        effect
            .replace_texture(0, &missing.to_string_lossy())
            .unwrap();
        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();

        assert!(!effect.is_loading(0));
        assert_eq!(effect.backend().last_draw().unwrap().samplers[0], before);
        assert_eq!(effect.backend().live_textures(), 1);
    }

    #[test]
    fn upload_failure_keeps_previous_texture() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_png(dir.path(), "a.png", 4, 4);
        let second = write_png(dir.path(), "b.png", 8, 8);
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_texture(1, &first).unwrap();
        assert_eq!(effect.poll_textures(), 1);

        effect.backend_mut().set_fail_texture_uploads(true);
        effect.replace_texture(1, &second).unwrap();
        assert_eq!(effect.poll_textures(), 0);
        assert!(effect.has_texture(1));
        assert_eq!(effect.backend().live_textures(), 1);
    }

    #[test]
    fn latest_request_wins_for_a_slot() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_png(dir.path(), "a.png", 4, 4);
        let second = write_png(dir.path(), "b.png", 8, 2);
        let mut effect = effect(LoadStrategy::Immediate);

        effect.replace_texture(1, &first).unwrap();
        effect.replace_texture(1, &second).unwrap();
        assert_eq!(effect.poll_textures(), 1);
        assert_eq!(effect.backend().live_textures(), 1);

        let slot = effect.slots[1].texture.as_ref().expect("texture bound");
        assert_eq!((slot.width, slot.height), (8, 2));
        assert_eq!(slot.mip_levels, 4);
    }

    #[test]
    fn clearing_a_slot_cancels_pending_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 4, 4);
        let mut effect = effect(LoadStrategy::Immediate);

        effect.replace_texture(2, &path).unwrap();
        effect.replace_texture(2, "").unwrap();
        assert!(!effect.is_loading(2));
        assert_eq!(effect.poll_textures(), 0);
        assert!(!effect.has_texture(2));
        assert_eq!(effect.backend().live_textures(), 0);
    }

    #[test]
    fn threaded_loads_settle_within_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 4, 4);
        let mut effect = effect(LoadStrategy::Threaded);

        effect.replace_texture(3, &path).unwrap();
        assert!(effect.wait_for_textures(Duration::from_secs(10)));
        assert!(effect.has_texture(3));
    }

    #[test]
    fn resize_applies_on_next_draw() {
        let mut effect = effect(LoadStrategy::Immediate);
        effect.replace_shader(MOUSE_SHADER).unwrap();
        effect.resize(1024, 768);
        assert!(effect.backend().draws().is_empty());

        effect.draw(0.0, Point2::SENTINEL, Point2::ZERO).unwrap();
        let draw = effect.backend().last_draw().unwrap();
        assert_eq!(draw.viewport, Viewport::full(1024, 768));
        assert_eq!(draw.uniforms.resolution, Some([1024.0, 768.0]));
        assert_eq!(effect.resolution(), (1024, 768));
    }
}
