use bytemuck::{Pod, Zeroable};

use crate::backend::UniformValue;
use crate::types::CHANNEL_COUNT;

/// CPU mirror of the `ShaderParams` std140 block declared by the fragment
/// header. Scalar arrays use a 16-byte stride, so every channel entry is a
/// padded vec4.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct ShaderParams {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame_rate: f32,
    pub frame: i32,
    pub _padding0: f32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub sample_rate: f32,
    pub _padding1: [f32; 3],
    pub channel_time: [[f32; 4]; CHANNEL_COUNT],
    pub channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

pub(crate) const SHADER_PARAMS_SIZE: u64 = std::mem::size_of::<ShaderParams>() as u64;

const _: () = assert!(std::mem::size_of::<ShaderParams>() == 208);

impl ShaderParams {
    pub fn apply(&mut self, value: UniformValue) {
        match value {
            UniformValue::Resolution(resolution) => self.resolution = resolution,
            UniformValue::Time(time) => self.time = time,
            UniformValue::TimeDelta(delta) => self.time_delta = delta,
            UniformValue::FrameRate(rate) => self.frame_rate = rate,
            UniformValue::Frame(frame) => self.frame = frame,
            UniformValue::Mouse(mouse) => self.mouse = mouse,
            UniformValue::Date(date) => self.date = date,
            UniformValue::SampleRate(rate) => self.sample_rate = rate,
            UniformValue::ChannelTime(times) => {
                for (slot, time) in self.channel_time.iter_mut().zip(times) {
                    slot[0] = time;
                }
            }
            UniformValue::ChannelResolution(resolutions) => {
                for (slot, [x, y, z]) in self.channel_resolution.iter_mut().zip(resolutions) {
                    *slot = [x, y, z, 0.0];
                }
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;

    #[test]
    fn layout_matches_the_glsl_block() {
        assert_eq!(offset_of!(ShaderParams, time), 12);
        assert_eq!(offset_of!(ShaderParams, frame), 24);
        assert_eq!(offset_of!(ShaderParams, mouse), 32);
        assert_eq!(offset_of!(ShaderParams, date), 48);
        assert_eq!(offset_of!(ShaderParams, sample_rate), 64);
        assert_eq!(offset_of!(ShaderParams, channel_time), 80);
        assert_eq!(offset_of!(ShaderParams, channel_resolution), 144);
        assert_eq!(SHADER_PARAMS_SIZE, 208);
    }

    #[test]
    fn channel_arrays_are_padded() {
        let mut params = ShaderParams::zeroed();
        params.apply(UniformValue::ChannelResolution([
            [1.0, 2.0, 1.0],
            [3.0, 4.0, 1.0],
            [0.0; 3],
            [0.0; 3],
        ]));
        params.apply(UniformValue::ChannelTime([0.5, 0.0, 0.0, 0.0]));
        assert_eq!(params.channel_resolution[1], [3.0, 4.0, 1.0, 0.0]);
        assert_eq!(params.channel_time[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(params.as_bytes().len(), 208);
    }
}
