use std::fmt::Write as _;

use wgpu::naga;

use crate::error::EffectError;
use crate::types::{Stage, SAMPLER_COUNT, SLOT_COUNT};

/// Passthrough vertex stage shared by every program. Only the `pos` attribute
/// is consumed.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 pos;

void main() {
    gl_Position = vec4(pos.x, pos.y, 0.0, 1.0);
}
";

/// Fragment stage an `Effect` starts with before any preset is loaded.
pub const DEFAULT_FRAGMENT_SHADER: &str = r"void main(void)
{
    gl_FragColor = vec4(0.0, 0.0, 0.0, 1.0);
}
";

/// Uniforms of the naming contract a fragment source declared.
///
/// Computed once when a stage is compiled and cached alongside the linked
/// program, so draws never look names up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UniformSet {
    pub time: bool,
    pub resolution: bool,
    pub mouse: bool,
    /// `tex0`..`tex3`. Only the first [`SAMPLER_COUNT`] are bound to slots.
    pub samplers: [bool; SLOT_COUNT],
}

impl UniformSet {
    pub fn uses_sampler(&self, unit: usize) -> bool {
        self.samplers.get(unit).copied().unwrap_or(false)
    }

    fn uses_unbound_sampler(&self) -> bool {
        (SAMPLER_COUNT..SLOT_COUNT).any(|unit| self.uses_sampler(unit))
    }
}

/// Group 1 binding of the placeholder texture that `tex2`/`tex3` sample; its
/// sampler follows at the next binding.
pub(crate) const UNBOUND_TEXTURE_BINDING: u32 = (SAMPLER_COUNT * 2) as u32;

/// A validated stage ready to hand to a backend for linking.
#[derive(Clone, Debug)]
pub struct CompiledStage {
    pub stage: Stage,
    /// Vulkan-flavoured GLSL 450 accepted by the `wgpu` GLSL front end.
    pub source: String,
    pub uniforms: UniformSet,
}

/// Translates and validates one stage.
///
/// Fragment sources are wrapped first (see [`wrap_fragment`]); the vertex
/// stage is taken as-is. Diagnostics are reported as `0:<line>: <message>`
/// with `line` counted in the caller's source, not the wrapped text.
pub fn compile_stage(stage: Stage, source: &str) -> Result<CompiledStage, EffectError> {
    let (compiled, uniforms, lines) = match stage {
        Stage::Vertex => (source.to_owned(), UniformSet::default(), LineMap::new(1, source)),
        Stage::Fragment => {
            let wrapped =
                wrap_fragment(source).map_err(|log| EffectError::Compile { stage, log })?;
            let lines = LineMap::new(wrapped.first_line, source);
            (wrapped.source, wrapped.uniforms, lines)
        }
    };

    validate(stage, &compiled, lines).map_err(|log| EffectError::Compile { stage, log })?;

    Ok(CompiledStage {
        stage,
        source: compiled,
        uniforms,
    })
}

fn validate(stage: Stage, source: &str, lines: LineMap) -> Result<(), String> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage.naga_stage());
    let module = frontend.parse(&options, source).map_err(|errors| {
        errors
            .errors
            .iter()
            .map(|error| lines.describe(source, error.meta, &error.kind.to_string()))
            .collect::<Vec<_>>()
            .join("\n")
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator.validate(&module).map_err(|error| {
        let message = error_chain(error.as_inner());
        match error.spans().next() {
            Some((span, _)) => lines.describe(source, *span, &message),
            None => message,
        }
    })?;
    Ok(())
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(message, ": {cause}");
        source = cause.source();
    }
    message
}

/// Where the caller's source sits inside the text handed to naga.
#[derive(Clone, Copy, Debug)]
struct LineMap {
    /// Line of the compiled text holding the caller's line 1.
    first_line: u32,
    line_count: u32,
}

impl LineMap {
    fn new(first_line: u32, source: &str) -> Self {
        Self {
            first_line,
            line_count: source.lines().count() as u32,
        }
    }

    fn source_line(&self, compiled_line: u32) -> Option<u32> {
        let line = compiled_line.checked_sub(self.first_line)? + 1;
        (line <= self.line_count).then_some(line)
    }

    /// Prefixes `message` with the caller's line; spans in generated code get no prefix.
    fn describe(&self, compiled: &str, span: naga::Span, message: &str) -> String {
        if span.is_defined() {
            if let Some(line) = self.source_line(span.location(compiled).line_number) {
                return format!("0:{line}: {message}");
            }
        }
        message.to_string()
    }
}

pub(crate) struct WrappedFragment {
    pub source: String,
    pub uniforms: UniformSet,
    /// Line of `source` holding the caller's first line.
    pub first_line: u32,
}

/// Produces a self-contained GLSL 450 fragment shader from WebGL-style code.
///
/// 1. Drop `#version` directives, `precision` statements and declarations of
///    contract uniforms, recording which uniforms were declared. Every source
///    line maps to exactly one body line.
/// 2. Prepend a header with the uniform block, sampler bindings for declared
///    samplers, and macros mapping the WebGL names.
/// 3. Append a footer that exposes a bottom-left `gl_FragCoord` and calls the
///    preset's renamed `main`.
pub(crate) fn wrap_fragment(source: &str) -> Result<WrappedFragment, String> {
    let mut uniforms = UniformSet::default();
    let mut body = String::with_capacity(source.len());

    for (index, line) in source.lines().enumerate() {
        wrap_line(line, &mut uniforms, &mut body)
            .map_err(|message| format!("0:{}: {message}", index + 1))?;
        body.push('\n');
    }

    let mut wrapped = String::with_capacity(HEADER.len() + body.len() + FOOTER.len() + 512);
    wrapped.push_str(HEADER);
    for unit in 0..SAMPLER_COUNT {
        if uniforms.uses_sampler(unit) {
            let _ = writeln!(
                wrapped,
                "layout(set = 1, binding = {texture}) uniform texture2D effect_tex{unit}_texture;\n\
                 layout(set = 1, binding = {sampler}) uniform sampler effect_tex{unit}_sampler;",
                texture = unit * 2,
                sampler = unit * 2 + 1,
            );
        }
    }
    if uniforms.uses_unbound_sampler() {
        let _ = writeln!(
            wrapped,
            "layout(set = 1, binding = {texture}) uniform texture2D effect_unbound_texture;\n\
             layout(set = 1, binding = {sampler}) uniform sampler effect_unbound_sampler;",
            texture = UNBOUND_TEXTURE_BINDING,
            sampler = UNBOUND_TEXTURE_BINDING + 1,
        );
    }
    wrapped.push_str(ALIASES);
    if uniforms.time {
        wrapped.push_str("#define time effect_params._time\n");
    }
    if uniforms.resolution {
        wrapped.push_str("#define resolution effect_params._resolution\n");
    }
    if uniforms.mouse {
        wrapped.push_str("#define mouse effect_params._mouse\n");
    }
    for unit in 0..SLOT_COUNT {
        if !uniforms.uses_sampler(unit) {
            continue;
        }
        if unit < SAMPLER_COUNT {
            let _ = writeln!(
                wrapped,
                "#define tex{unit} sampler2D(effect_tex{unit}_texture, effect_tex{unit}_sampler)"
            );
        } else {
            let _ = writeln!(
                wrapped,
                "#define tex{unit} sampler2D(effect_unbound_texture, effect_unbound_sampler)"
            );
        }
    }
    let first_line = wrapped.matches('\n').count() as u32 + 1;
    wrapped.push_str(&body);
    wrapped.push_str(FOOTER);

    Ok(WrappedFragment {
        source: wrapped,
        uniforms,
        first_line,
    })
}

/// Copies one source line into `body`, statement by statement, leaving out
/// `precision` statements and contract uniform declarations.
fn wrap_line(line: &str, uniforms: &mut UniformSet, body: &mut String) -> Result<(), String> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        if !trimmed.starts_with("#version") {
            body.push_str(line);
        }
        return Ok(());
    }

    let (code, comment) = line.split_at(line.find("//").unwrap_or(line.len()));
    for statement in code.split_inclusive(';') {
        let trimmed = statement.trim_start();
        let terminated = trimmed.strip_suffix(';');
        if trimmed.starts_with("precision ") && terminated.is_some() {
            continue;
        }
        if let Some(declaration) = trimmed.strip_prefix("uniform ") {
            let declaration = declaration
                .strip_suffix(';')
                .ok_or_else(|| "uniform declarations must fit on one line".to_string())?;
            reflect_uniform(declaration, uniforms)?;
            continue;
        }
        body.push_str(&statement.replace("(void)", "()"));
    }
    body.push_str(comment);
    Ok(())
}

/// Records the names declared by one `uniform` statement (without its `;`).
fn reflect_uniform(declaration: &str, uniforms: &mut UniformSet) -> Result<(), String> {
    let mut tokens = declaration.split_whitespace();
    let mut ty = tokens.next().unwrap_or_default();
    if matches!(ty, "lowp" | "mediump" | "highp") {
        ty = tokens.next().unwrap_or_default();
    }
    let names: Vec<String> = tokens
        .collect::<Vec<_>>()
        .join(" ")
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if ty.is_empty() || names.is_empty() {
        return Err("malformed uniform declaration".to_string());
    }

    for name in names {
        let (expected, flag) = match name.as_str() {
            "time" => ("float", &mut uniforms.time),
            "resolution" => ("vec2", &mut uniforms.resolution),
            "mouse" => ("vec4", &mut uniforms.mouse),
            other => match sampler_unit(other) {
                Some(unit) => ("sampler2D", &mut uniforms.samplers[unit]),
                None => {
                    return Err(format!(
                        "uniform '{other}' is not provided (available: time, resolution, mouse, tex0..tex3)"
                    ))
                }
            },
        };
        if ty != expected {
            return Err(format!(
                "uniform '{name}' must be declared as {expected}, found {ty}"
            ));
        }
        *flag = true;
    }

    Ok(())
}

fn sampler_unit(name: &str) -> Option<usize> {
    let unit = name.strip_prefix("tex")?;
    if unit.len() != 1 {
        return None;
    }
    unit.parse::<usize>().ok().filter(|unit| *unit < SLOT_COUNT)
}

/// Declarations that must precede the `texture2D` alias, since `texture2D`
/// is also the GLSL 450 texture type.
const HEADER: &str = r"#version 450
layout(location = 0) out vec4 effect_frag_color;

layout(std140, set = 0, binding = 0) uniform EffectParams {
    vec2 _resolution;
    float _time;
    float _padding0;
    vec4 _mouse;
} effect_params;

";

const ALIASES: &str = r"
vec4 effect_frag_coord;
#define gl_FragColor effect_frag_color
#define gl_FragCoord effect_frag_coord
#define texture2D texture
#define main effect_preset_main
";

/// Remaps `gl_FragCoord` to a bottom-left origin before running the preset.
const FOOTER: &str = r"
#undef main
#undef gl_FragCoord
void main() {
    effect_frag_coord = vec4(gl_FragCoord.x, effect_params._resolution.y - gl_FragCoord.y, gl_FragCoord.z, gl_FragCoord.w);
    effect_preset_main();
}
";

#[cfg(test)]
mod tests {
    use super::*;

    const PLASMA: &str = r"
        #ifdef GL_ES
        precision highp float;
        #endif
        uniform float time;
        uniform vec2 resolution;

        void main(void)
        {
            vec2 p = gl_FragCoord.xy / resolution.xy;
            gl_FragColor = vec4(p, 0.5 + 0.5 * sin(time), 1.0);
        }
    ";

    #[test]
    fn wrap_strips_contract_uniforms() {
        let wrapped = wrap_fragment(PLASMA).expect("wrap");
        assert!(!wrapped.source.contains("uniform float time"));
        assert!(!wrapped.source.contains("uniform vec2 resolution"));
        assert!(!wrapped.source.contains("precision highp"));
        assert!(wrapped.source.contains("#define time effect_params._time"));
        assert!(!wrapped.source.contains("#define mouse"));
        assert_eq!(
            wrapped.uniforms,
            UniformSet {
                time: true,
                resolution: true,
                mouse: false,
                samplers: [false; SLOT_COUNT],
            }
        );
    }

    #[test]
    fn wrap_keeps_source_line_numbers() {
        let source = "uniform float time;\nvoid main(void) {}\n";
        let wrapped = wrap_fragment(source).expect("wrap");
        let mut lines = wrapped.source.lines().skip(wrapped.first_line as usize - 1);
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some("void main() {}"));
    }

    #[test]
    fn wrap_keeps_statements_sharing_a_line_with_precision() {
        let source = "precision highp float; uniform float time;\nvoid main(void) { gl_FragColor = vec4(time); }\n";
        let wrapped = wrap_fragment(source).expect("wrap");
        assert!(wrapped.uniforms.time);
        assert!(!wrapped.source.contains("precision"));
        compile_stage(Stage::Fragment, source).expect("compile");
    }

    #[test]
    fn wrap_reflects_uniforms_declared_mid_line() {
        let source = "const float k = 2.0; uniform vec2 resolution; // size\n\
                      void main(void) { gl_FragColor = vec4(gl_FragCoord.xy / resolution * k, 0.0, 1.0); }\n";
        let wrapped = wrap_fragment(source).expect("wrap");
        assert!(wrapped.uniforms.resolution);
        let first = wrapped
            .source
            .lines()
            .nth(wrapped.first_line as usize - 1)
            .expect("first body line");
        assert_eq!(first, "const float k = 2.0; // size");
        compile_stage(Stage::Fragment, source).expect("compile");
    }

    #[test]
    fn unbound_samplers_compile_against_placeholder() {
        let source = r"uniform sampler2D tex0;
uniform sampler2D tex2;
uniform sampler2D tex3;
void main(void)
{
    gl_FragColor = texture2D(tex0, vec2(0.5)) + texture2D(tex2, vec2(0.5)) + texture2D(tex3, vec2(0.5));
}
";
        let stage = compile_stage(Stage::Fragment, source).expect("compile");
        assert_eq!(stage.uniforms.samplers, [true, false, true, true]);
        assert!(stage
            .source
            .contains("#define tex2 sampler2D(effect_unbound_texture, effect_unbound_sampler)"));
        assert_eq!(
            stage.source.matches("uniform texture2D effect_unbound_texture").count(),
            1
        );
    }

    #[test]
    fn diagnostics_use_caller_line_numbers() {
        let source = "uniform float time;\n\
                      void main(void)\n\
                      {\n\
                      gl_FragColor = vec4(undefined_value);\n\
                      }\n";
        let err = compile_stage(Stage::Fragment, source).expect_err("unknown identifier");
        let log = err.to_string();
        assert!(log.starts_with("FS ERROR: 0:4: "), "{log}");
        assert!(log.contains("undefined_value"), "{log}");
    }

    #[test]
    fn wrap_binds_only_declared_samplers() {
        let source = "uniform sampler2D tex1;\nvoid main(void) { gl_FragColor = texture2D(tex1, vec2(0.0)); }\n";
        let wrapped = wrap_fragment(source).expect("wrap");
        assert_eq!(wrapped.uniforms.samplers, [false, true, false, false]);
        assert!(wrapped.source.contains("binding = 2) uniform texture2D effect_tex1_texture"));
        assert!(wrapped.source.contains("binding = 3) uniform sampler effect_tex1_sampler"));
        assert!(!wrapped.source.contains("effect_tex0_texture"));
    }

    #[test]
    fn wrap_accepts_grouped_declarations_with_precision() {
        let source = "uniform lowp sampler2D tex0, tex1;\nvoid main(void) {}\n";
        let wrapped = wrap_fragment(source).expect("wrap");
        assert_eq!(wrapped.uniforms.samplers, [true, true, false, false]);
    }

    #[test]
    fn wrap_rejects_unknown_uniform() {
        let err = wrap_fragment("void f() {}\nuniform float speed;\n")
            .err()
            .expect("unknown uniform");
        assert!(err.starts_with("0:2:"), "{err}");
        assert!(err.contains("speed"), "{err}");
    }

    #[test]
    fn wrap_rejects_mismatched_uniform_type() {
        let err = wrap_fragment("uniform vec3 resolution;\n")
            .err()
            .expect("type mismatch");
        assert!(err.contains("must be declared as vec2"), "{err}");
    }

    #[test]
    fn default_fragment_compiles() {
        let stage = compile_stage(Stage::Fragment, DEFAULT_FRAGMENT_SHADER).expect("compile");
        assert_eq!(stage.stage, Stage::Fragment);
        assert_eq!(stage.uniforms, UniformSet::default());
    }

    #[test]
    fn vertex_shader_compiles() {
        let stage = compile_stage(Stage::Vertex, VERTEX_SHADER_GLSL).expect("compile");
        assert_eq!(stage.source, VERTEX_SHADER_GLSL);
    }

    #[test]
    fn textured_preset_compiles() {
        let source = r"
            uniform vec2 resolution;
            uniform vec4 mouse;
            uniform sampler2D tex0;
            void main(void)
            {
                vec2 uv = (gl_FragCoord.xy + mouse.xy) / resolution.xy;
                gl_FragColor = texture2D(tex0, uv);
            }
        ";
        let stage = compile_stage(Stage::Fragment, source).expect("compile");
        assert!(stage.uniforms.mouse);
        assert!(stage.uniforms.uses_sampler(0));
        assert!(!stage.uniforms.uses_sampler(1));
    }

    #[test]
    fn plasma_compiles() {
        compile_stage(Stage::Fragment, PLASMA).expect("compile");
    }

    #[test]
    fn syntax_errors_are_reported_for_fragment_stage() {
        let err = compile_stage(Stage::Fragment, "oid main(void) { gl_FragColor = vec4(1.0); }")
            .expect_err("broken source");
        match err {
            EffectError::Compile { stage, ref log } => {
                assert_eq!(stage, Stage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("FS ERROR: "));
    }
}
