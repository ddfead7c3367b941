use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use presets::{PresetCatalog, PresetCycle};
use renderer::{Effect, RenderBackend};

use crate::input::InputState;

/// Application context: the effect, the preset list and the input it reads.
///
/// Built once at startup and owned by the event loop.
pub struct App<B: RenderBackend> {
    effect: Effect<B>,
    catalog: PresetCatalog,
    cycle: PresetCycle,
    input: InputState,
    started: Instant,
}

impl<B: RenderBackend> App<B> {
    /// Wraps `effect` and loads the preset at `start`. A preset that fails to
    /// load is logged and the default program stays active.
    pub fn new(effect: Effect<B>, catalog: PresetCatalog, start: usize) -> Self {
        let cycle = PresetCycle::new(catalog.len(), start);
        let mut app = Self {
            effect,
            catalog,
            cycle,
            input: InputState::default(),
            started: Instant::now(),
        };
        app.load_current_logged();
        app
    }

    pub fn current_preset(&self) -> &str {
        self.catalog
            .get(self.cycle.current())
            .map(|preset| preset.name.as_str())
            .unwrap_or_default()
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn effect(&self) -> &Effect<B> {
        &self.effect
    }

    pub fn effect_mut(&mut self) -> &mut Effect<B> {
        &mut self.effect
    }

    /// Advances to the next preset, wrapping at the end of the list.
    ///
    /// The index advances even if the next preset fails to load, so another
    /// key press moves past a broken preset.
    pub fn cycle_preset(&mut self) -> &str {
        self.cycle.advance();
        self.load_current_logged();
        self.current_preset()
    }

    fn load_current_logged(&mut self) {
        match self.load_current() {
            Ok(()) => tracing::info!(preset = self.current_preset(), "preset loaded"),
            Err(err) => tracing::error!(
                preset = self.current_preset(),
                error = %format!("{err:#}"),
                "failed to load preset; keeping previous shader"
            ),
        }
    }

    /// Reads and compiles the current preset, then requests its textures.
    ///
    /// Textures are only touched once the shader compiled, so a broken preset
    /// leaves the previous program with the textures it was sampling.
    pub fn load_current(&mut self) -> Result<()> {
        let preset = self
            .catalog
            .get(self.cycle.current())
            .ok_or_else(|| anyhow!("preset list is empty"))?;
        let source = self.catalog.load_shader_source(preset)?;
        self.effect
            .replace_shader(&source)
            .with_context(|| format!("failed to compile preset '{}'", preset.name))?;

        for (slot, texture) in self.catalog.texture_sources(preset).iter().enumerate() {
            self.effect
                .replace_texture(slot, texture)
                .with_context(|| format!("failed to bind slot {slot} of '{}'", preset.name))?;
        }
        Ok(())
    }

    /// Draws a frame at the wall-clock time since startup.
    pub fn render(&mut self) -> Result<(), B::FrameError> {
        let time = self.started.elapsed().as_secs_f32();
        self.render_at(time)
    }

    pub fn render_at(&mut self, time: f32) -> Result<(), B::FrameError> {
        self.effect
            .draw(time, self.input.origin(), self.input.position())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.effect.resize(width, height);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use image::{Rgba, RgbaImage};
    use presets::MANIFEST_FILE;
    use renderer::recording::{RecordedSampler, RecordingBackend};
    use renderer::{LoadStrategy, Point2};

    use super::*;

    const TEXTURED: &str = r"
        uniform vec2 resolution;
        uniform sampler2D tex0;
        void main(void) { gl_FragColor = texture2D(tex0, gl_FragCoord.xy / resolution); }
    ";
    const PLAIN: &str = "uniform float time;\nvoid main(void) { gl_FragColor = vec4(time); }\n";

    fn write_presets(dir: &Path) {
        fs::write(
            dir.join(MANIFEST_FILE),
            r#"
            [[preset]]
            name = "textured"
            textures = [{ slot = 0, path = "tex.png" }]

            [[preset]]
            name = "plain"

            [[preset]]
            name = "broken"
            "#,
        )
        .unwrap();
        fs::write(dir.join("textured.fs"), TEXTURED).unwrap();
        fs::write(dir.join("plain.fs"), PLAIN).unwrap();
        fs::write(dir.join("broken.fs"), "oid main(void) {}\n").unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))
            .save(dir.join("tex.png"))
            .unwrap();
    }

    fn app(dir: &Path) -> App<RecordingBackend> {
        let catalog = PresetCatalog::load(dir).unwrap();
        let effect =
            Effect::new(RecordingBackend::new(), 800, 600, LoadStrategy::Immediate).unwrap();
        App::new(effect, catalog, 0)
    }

    #[test]
    fn startup_loads_first_preset_and_its_texture() {
        let dir = tempfile::tempdir().unwrap();
        write_presets(dir.path());
        let mut app = app(dir.path());
        assert_eq!(app.current_preset(), "textured");

        app.render_at(0.0).unwrap();
        let draw = app.effect().backend().last_draw().unwrap().clone();
        assert!(matches!(draw.samplers[0], RecordedSampler::Texture(_)));
        assert_eq!(draw.uniforms.resolution, Some([800.0, 600.0]));
    }

    #[test]
    fn cycling_clears_unmapped_slots() {
        let dir = tempfile::tempdir().unwrap();
        write_presets(dir.path());
        let mut app = app(dir.path());
        app.render_at(0.0).unwrap();
        assert!(app.effect().has_texture(0));

        assert_eq!(app.cycle_preset(), "plain");
        assert!(!app.effect().has_texture(0));
        assert_eq!(app.effect().backend().live_textures(), 0);
        assert_eq!(app.effect().backend().live_programs(), 1);

        app.render_at(1.5).unwrap();
        let draw = app.effect().backend().last_draw().unwrap();
        assert_eq!(draw.uniforms.time, Some(1.5));
    }

    #[test]
    fn broken_preset_keeps_previous_shader_and_still_advances() {
        let dir = tempfile::tempdir().unwrap();
        write_presets(dir.path());
        let mut app = app(dir.path());
        app.cycle_preset();
        app.render_at(0.0).unwrap();
        let plain_program = app.effect().backend().last_draw().unwrap().program;

        assert_eq!(app.cycle_preset(), "broken");
        app.render_at(0.0).unwrap();
        assert_eq!(
            app.effect().backend().last_draw().unwrap().program,
            plain_program
        );

        assert_eq!(app.cycle_preset(), "textured");
        assert!(app.effect_mut().wait_for_textures(Duration::from_secs(5)));
        assert!(app.effect().has_texture(0));
    }

    #[test]
    fn missing_shader_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_presets(dir.path());
        fs::remove_file(dir.path().join("plain.fs")).unwrap();
        let mut app = app(dir.path());
        app.cycle_preset();
        let err = app.load_current().unwrap_err();
        assert!(format!("{err:#}").contains("plain.fs"));
    }

    #[test]
    fn mouse_state_reaches_the_effect() {
        let dir = tempfile::tempdir().unwrap();
        write_presets(dir.path());
        let mut app = app(dir.path());
        app.input_mut().pointer_move(Point2::new(100.0, 50.0));
        app.input_mut().pointer_down();
        app.resize(400, 300);
        app.render_at(0.0).unwrap();
        assert_eq!(app.effect().resolution(), (400, 300));
        let draw = app.effect().backend().last_draw().unwrap();
        assert_eq!(draw.viewport.width, 400);
    }
}
