use chrono::{DateTime, Datelike, Local, Timelike};

use crate::backend::{GpuBackend, UniformValue};
use crate::types::CHANNEL_COUNT;

/// Nominal audio sample rate reported through `iSampleRate`.
pub const SAMPLE_RATE: f32 = 44_100.0;

/// The standard uniforms a pass may reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum StandardUniform {
    Resolution = 1 << 0,
    Time = 1 << 1,
    TimeDelta = 1 << 2,
    FrameRate = 1 << 3,
    Frame = 1 << 4,
    Mouse = 1 << 5,
    Date = 1 << 6,
    SampleRate = 1 << 7,
    ChannelTime = 1 << 8,
    ChannelResolution = 1 << 9,
}

impl StandardUniform {
    pub const ALL: [StandardUniform; 10] = [
        StandardUniform::Resolution,
        StandardUniform::Time,
        StandardUniform::TimeDelta,
        StandardUniform::FrameRate,
        StandardUniform::Frame,
        StandardUniform::Mouse,
        StandardUniform::Date,
        StandardUniform::SampleRate,
        StandardUniform::ChannelTime,
        StandardUniform::ChannelResolution,
    ];

    pub fn glsl_name(self) -> &'static str {
        match self {
            StandardUniform::Resolution => "iResolution",
            StandardUniform::Time => "iTime",
            StandardUniform::TimeDelta => "iTimeDelta",
            StandardUniform::FrameRate => "iFrameRate",
            StandardUniform::Frame => "iFrame",
            StandardUniform::Mouse => "iMouse",
            StandardUniform::Date => "iDate",
            StandardUniform::SampleRate => "iSampleRate",
            StandardUniform::ChannelTime => "iChannelTime",
            StandardUniform::ChannelResolution => "iChannelResolution",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|uniform| uniform.glsl_name() == name)
    }
}

/// The set of standard uniforms a program's user code refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UniformUsage(u16);

impl UniformUsage {
    /// Collects every standard uniform named as an identifier in `sources`.
    pub fn scan<'a>(sources: impl IntoIterator<Item = &'a str>) -> Self {
        sources
            .into_iter()
            .flat_map(|source| source.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')))
            .filter_map(StandardUniform::from_name)
            .collect()
    }

    /// Uniforms a pass needs: whatever its sources name, plus `iResolution`,
    /// which the generated `main` reads to place `fragCoord`.
    pub fn for_pass(common: Option<&str>, code: &str) -> Self {
        let mut usage = Self::scan(common.into_iter().chain([code]));
        usage.insert(StandardUniform::Resolution);
        usage
    }

    pub fn contains(self, uniform: StandardUniform) -> bool {
        self.0 & uniform as u16 != 0
    }

    pub fn insert(&mut self, uniform: StandardUniform) {
        self.0 |= uniform as u16;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<StandardUniform> for UniformUsage {
    fn from_iter<I: IntoIterator<Item = StandardUniform>>(iter: I) -> Self {
        let mut usage = UniformUsage::default();
        for uniform in iter {
            usage.insert(uniform);
        }
        usage
    }
}

/// Timing for one sweep over all passes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming {
    pub time: f32,
    pub delta: f32,
    pub frame_rate: f32,
    pub frame: u32,
}

/// Values shared by every pass in one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub resolution: (u32, u32),
    pub timing: FrameTiming,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
}

/// `iDate`: year, zero-based month, day of month, seconds into the day.
pub fn date_uniform(now: &DateTime<Local>) -> [f32; 4] {
    let seconds = now.num_seconds_from_midnight() as f32
        + now.nanosecond().min(999_999_999) as f32 / 1_000_000_000.0;
    [
        now.year() as f32,
        now.month0() as f32,
        now.day() as f32,
        seconds,
    ]
}

/// Uploads the standard uniforms `usage` names to the bound program.
pub(crate) fn bind_standard_uniforms<B: GpuBackend>(
    backend: &mut B,
    usage: UniformUsage,
    inputs: &FrameInputs,
    channel_resolution: [[f32; 3]; CHANNEL_COUNT],
) {
    let (width, height) = inputs.resolution;
    let timing = &inputs.timing;
    let values = [
        (
            StandardUniform::Resolution,
            UniformValue::Resolution([width as f32, height as f32, 1.0]),
        ),
        (StandardUniform::Time, UniformValue::Time(timing.time)),
        (StandardUniform::TimeDelta, UniformValue::TimeDelta(timing.delta)),
        (StandardUniform::FrameRate, UniformValue::FrameRate(timing.frame_rate)),
        (
            StandardUniform::Frame,
            UniformValue::Frame(i32::try_from(timing.frame).unwrap_or(i32::MAX)),
        ),
        (StandardUniform::Mouse, UniformValue::Mouse(inputs.mouse)),
        (StandardUniform::Date, UniformValue::Date(inputs.date)),
        (StandardUniform::SampleRate, UniformValue::SampleRate(SAMPLE_RATE)),
        (
            StandardUniform::ChannelTime,
            UniformValue::ChannelTime([0.0; CHANNEL_COUNT]),
        ),
        (
            StandardUniform::ChannelResolution,
            UniformValue::ChannelResolution(channel_resolution),
        ),
    ];
    for (uniform, value) in values {
        if usage.contains(uniform) {
            backend.set_uniform(value);
        }
    }
}

/// ShaderToy mouse state: `xy` follows the cursor while a button is held,
/// `zw` is the click origin and turns negative once the button is released.
///
/// Positions are in pixels with a bottom-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MouseState {
    position: [f32; 2],
    origin: [f32; 2],
    pressed: bool,
    released: bool,
}

impl MouseState {
    pub fn press(&mut self, position: [f32; 2]) {
        self.position = position;
        self.origin = position;
        self.pressed = true;
        self.released = false;
    }

    pub fn move_to(&mut self, position: [f32; 2]) {
        if self.pressed {
            self.position = position;
        }
    }

    pub fn release(&mut self) {
        if self.pressed {
            self.pressed = false;
            self.released = true;
        }
    }

    pub fn as_uniform(&self) -> [f32; 4] {
        let [x, y] = self.position;
        let [ox, oy] = self.origin;
        if self.released {
            [x, y, -ox.abs(), -oy.abs()]
        } else {
            [x, y, ox, oy]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::backend::{ProgramSource, TargetKind};
    use crate::compile::VERTEX_SHADER_GLSL;
    use crate::types::ChannelTextureKind;
    use chrono::TimeZone;

    #[test]
    fn scan_matches_whole_identifiers() {
        let usage = UniformUsage::scan([
            "float helper() { return iTimeDelta; }",
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(p / iResolution.xy, 0, 1); }",
        ]);
        assert!(usage.contains(StandardUniform::TimeDelta));
        assert!(usage.contains(StandardUniform::Resolution));
        assert!(!usage.contains(StandardUniform::Time));
        assert!(!usage.contains(StandardUniform::Frame));
        assert!(UniformUsage::scan(["int myiFrame = 0;"]).is_empty());
    }

    #[test]
    fn pass_usage_always_includes_resolution() {
        let usage = UniformUsage::for_pass(
            None,
            "void mainImage(out vec4 c, in vec2 p) { c = texelFetch(iChannel0, ivec2(p), 0); }",
        );
        assert!(usage.contains(StandardUniform::Resolution));
        assert!(!usage.contains(StandardUniform::Time));
        assert!(!usage.contains(StandardUniform::Mouse));
    }

    #[test]
    fn date_uses_zero_based_month() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 1, 2, 3).unwrap();
        assert_eq!(date_uniform(&now), [2024.0, 2.0, 9.0, 3723.0]);
    }

    #[test]
    fn mouse_release_negates_origin() {
        let mut mouse = MouseState::default();
        assert_eq!(mouse.as_uniform(), [0.0; 4]);
        mouse.move_to([5.0, 5.0]);
        assert_eq!(mouse.as_uniform(), [0.0; 4]);
        mouse.press([10.0, 20.0]);
        mouse.move_to([30.0, 40.0]);
        assert_eq!(mouse.as_uniform(), [30.0, 40.0, 10.0, 20.0]);
        mouse.release();
        mouse.move_to([50.0, 60.0]);
        assert_eq!(mouse.as_uniform(), [30.0, 40.0, -10.0, -20.0]);
    }

    #[test]
    fn only_declared_uniforms_are_uploaded() {
        let mut backend = MockBackend::new(4, 4);
        let program = backend
            .compile_program(
                "Image",
                &ProgramSource {
                    vertex: VERTEX_SHADER_GLSL.to_string(),
                    fragment: String::new(),
                    channel_kinds: [ChannelTextureKind::Texture2d; CHANNEL_COUNT],
                    feedback_channels: [false; CHANNEL_COUNT],
                    target: TargetKind::Surface,
                },
            )
            .unwrap();
        backend.bind_program(program);
        let inputs = FrameInputs {
            resolution: (4, 4),
            timing: FrameTiming {
                time: 1.5,
                delta: 0.5,
                frame_rate: 2.0,
                frame: 3,
            },
            mouse: [1.0, 2.0, 3.0, 4.0],
            date: [2024.0, 0.0, 1.0, 0.0],
        };
        let usage: UniformUsage = [StandardUniform::Time, StandardUniform::Frame]
            .into_iter()
            .collect();
        bind_standard_uniforms(&mut backend, usage, &inputs, [[0.0; 3]; CHANNEL_COUNT]);

        let uniforms = backend.uniforms(program).unwrap();
        assert_eq!(uniforms.time, Some(1.5));
        assert_eq!(uniforms.frame, Some(3));
        assert_eq!(uniforms.resolution, None);
        assert_eq!(uniforms.mouse, None);
    }
}
