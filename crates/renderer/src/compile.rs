use std::fmt::Write as _;

use crate::backend::{GpuBackend, ProgramId, ProgramError, ProgramSource, TargetKind};
use crate::error::LoadError;
use crate::types::{ChannelTextureKind, CHANNEL_COUNT};

/// Assembles the complete program pair for one pass.
///
/// The fragment stage is laid out as [`HEADER`], the per-channel sampler
/// declarations for `kinds`, the shared common source, the user source and
/// finally [`FOOTER`], which calls `mainImage` with the window-space
/// fragment coordinate.
pub fn build_program_source(
    common: Option<&str>,
    user: &str,
    kinds: [ChannelTextureKind; CHANNEL_COUNT],
    target: TargetKind,
) -> ProgramSource {
    ProgramSource {
        vertex: VERTEX_SHADER_GLSL.to_string(),
        fragment: assemble_fragment(common, user, &kinds),
        channel_kinds: kinds,
        feedback_channels: [false; CHANNEL_COUNT],
        target,
    }
}

/// Compiles an assembled program, attaching the pass name and full source to
/// any failure.
pub(crate) fn compile_pass<B: GpuBackend>(
    backend: &mut B,
    pass: &str,
    source: &ProgramSource,
) -> Result<ProgramId, LoadError> {
    backend
        .compile_program(pass, source)
        .map_err(|err| match err {
            ProgramError::Compile { stage, log } => LoadError::Compile {
                pass: pass.to_string(),
                stage,
                log,
                assembled: source.fragment.clone(),
            },
            ProgramError::Link { log } => LoadError::Link {
                pass: pass.to_string(),
                log,
                assembled: source.fragment.clone(),
            },
        })
}

fn assemble_fragment(
    common: Option<&str>,
    user: &str,
    kinds: &[ChannelTextureKind; CHANNEL_COUNT],
) -> String {
    let mut fragment = String::from(HEADER);
    for (index, kind) in kinds.iter().enumerate() {
        let texture_binding = index * 2;
        let sampler_binding = texture_binding + 1;
        let _ = writeln!(
            fragment,
            "layout(set = 1, binding = {texture_binding}) uniform {texture} walltoy_channel{index}_texture;\n\
             layout(set = 1, binding = {sampler_binding}) uniform sampler walltoy_channel{index}_sampler;\n\
             #define iChannel{index} {sampler}(walltoy_channel{index}_texture, walltoy_channel{index}_sampler)",
            texture = kind.glsl_texture(),
            sampler = kind.glsl_sampler(),
        );
    }
    fragment.push_str(FRAG_COORD_ALIAS);

    if let Some(common) = common.filter(|common| !common.trim().is_empty()) {
        fragment.push_str("#line 1\n");
        fragment.push_str(&sanitize_user_source(common));
    }
    fragment.push_str("#line 1\n");
    fragment.push_str(&sanitize_user_source(user));
    fragment.push_str(FOOTER);
    fragment
}

/// Drops `#version` directives and redeclarations of the standard uniforms,
/// both of which the header already provides.
fn sanitize_user_source(source: &str) -> String {
    let mut sanitized = String::with_capacity(source.len() + 1);
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version") {
            continue;
        }
        if trimmed.starts_with("uniform ") && declares_standard_uniform(trimmed) {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }
    sanitized
}

fn declares_standard_uniform(line: &str) -> bool {
    line.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| STANDARD_UNIFORM_NAMES.contains(&token))
}

const STANDARD_UNIFORM_NAMES: [&str; 14] = [
    "iResolution",
    "iTime",
    "iTimeDelta",
    "iFrameRate",
    "iFrame",
    "iMouse",
    "iDate",
    "iSampleRate",
    "iChannelTime",
    "iChannelResolution",
    "iChannel0",
    "iChannel1",
    "iChannel2",
    "iChannel3",
];

/// GLSL prologue shared by every pass.
///
/// The block layout must match `ShaderParams` in `gpu::uniforms`.
/// `WALLTOY_SURFACE_PASS` is defined by the backend for passes that draw to
/// the visible surface.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 walltoy_outColor;

layout(std140, set = 0, binding = 0) uniform ShaderParams {
    vec3 _iResolution;
    float _iTime;
    float _iTimeDelta;
    float _iFrameRate;
    int _iFrame;
    float _padding0;
    vec4 _iMouse;
    vec4 _iDate;
    float _iSampleRate;
    float _padding1;
    vec2 _padding2;
    float _iChannelTime[4];
    vec3 _iChannelResolution[4];
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrameRate ubo._iFrameRate
#define iFrame ubo._iFrame
#define iMouse ubo._iMouse
#define iDate ubo._iDate
#define iSampleRate ubo._iSampleRate
#define iChannelTime ubo._iChannelTime
#define iChannelResolution ubo._iChannelResolution

";

const FRAG_COORD_ALIAS: &str = r"
vec4 walltoy_FragCoord;
#define gl_FragCoord walltoy_FragCoord

";

/// GLSL epilogue. Feedback passes keep the hardware coordinate, which lines
/// up with texture rows; surface passes flip to ShaderToy's bottom-left origin.
/// The image pass samples row 0 at its bottom edge, so buffer row 0 is shown
/// at the bottom too and buffer `fragCoord` shares `iMouse`'s origin.
const FOOTER: &str = r"
void main() {
    #undef gl_FragCoord
    vec2 fragCoord = gl_FragCoord.xy;
    #define gl_FragCoord walltoy_FragCoord
#ifdef WALLTOY_SURFACE_PASS
    fragCoord.y = iResolution.y - fragCoord.y;
#endif
    walltoy_FragCoord = vec4(fragCoord, 0.0, 1.0);

    vec4 color = vec4(0.0);
    mainImage(color, fragCoord);
#ifdef WALLTOY_SURFACE_PASS
    walltoy_outColor = vec4(color.rgb, 1.0);
#else
    walltoy_outColor = color;
#endif
}
";

/// Minimal full-screen triangle vertex shader.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";
