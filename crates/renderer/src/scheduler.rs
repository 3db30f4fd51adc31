use std::time::Instant;

use shadertoy::MAX_SLOTS;
use tracing::debug;

use crate::backend::{BackendError, DrawTarget, GpuBackend, TextureId};
use crate::graph::{BoundChannel, Pipeline};
use crate::types::CHANNEL_COUNT;
use crate::uniforms::{bind_standard_uniforms, FrameInputs, FrameTiming};

/// Delta substituted when two frames land on the same instant.
const DEFAULT_FRAME_DELTA: f32 = 1.0 / 60.0;

/// Double-buffered feedback target. `front` holds the last completed frame
/// and is the only side other passes may sample; `back` is drawn into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FeedbackSlot {
    pub width: u32,
    pub height: u32,
    pub front: TextureId,
    pub back: TextureId,
}

impl FeedbackSlot {
    fn allocate<B: GpuBackend>(backend: &mut B, index: usize, (width, height): (u32, u32)) -> Self {
        let front = backend.create_render_target(&format!("feedback slot {index} (a)"), width, height);
        let back = backend.create_render_target(&format!("feedback slot {index} (b)"), width, height);
        Self {
            width,
            height,
            front,
            back,
        }
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    /// Reallocates both sides when the size actually changes.
    fn resize<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<bool, BackendError> {
        if (self.width, self.height) == (width, height) {
            return Ok(false);
        }
        backend.resize_render_target(self.front, width, height)?;
        backend.resize_render_target(self.back, width, height)?;
        self.width = width;
        self.height = height;
        Ok(true)
    }

    fn release<B: GpuBackend>(&self, backend: &mut B) {
        backend.delete_texture(self.front);
        backend.delete_texture(self.back);
    }
}

#[derive(Debug, Default)]
pub(crate) struct SlotTable {
    slots: [Option<FeedbackSlot>; MAX_SLOTS],
}

impl SlotTable {
    pub fn allocate<B: GpuBackend>(&mut self, backend: &mut B, index: usize, size: (u32, u32)) {
        if let Some(entry) = self.slots.get_mut(index) {
            if entry.is_none() {
                *entry = Some(FeedbackSlot::allocate(backend, index, size));
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&FeedbackSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut FeedbackSlot> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedbackSlot> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns how many slots were reallocated.
    pub fn resize_all<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<usize, BackendError> {
        let mut resized = 0;
        for slot in self.slots.iter_mut().flatten() {
            if slot.resize(backend, width, height)? {
                resized += 1;
            }
        }
        if resized > 0 {
            debug!(width, height, slots = resized, "resized feedback buffers");
        }
        Ok(resized)
    }

    pub fn release<B: GpuBackend>(&mut self, backend: &mut B) {
        for slot in self.slots.iter_mut() {
            if let Some(slot) = slot.take() {
                slot.release(backend);
            }
        }
    }
}

/// Wall-clock time since construction plus the per-load frame counter.
#[derive(Debug, Clone)]
pub(crate) struct FrameClock {
    origin: Instant,
    last: Option<Instant>,
    frame: u32,
}

impl FrameClock {
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            last: None,
            frame: 0,
        }
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn reset_frames(&mut self) {
        self.frame = 0;
    }

    /// Timing for the sweep starting at `now`; the counter is not advanced.
    pub fn tick(&mut self, now: Instant) -> FrameTiming {
        let time = now.saturating_duration_since(self.origin).as_secs_f32();
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last = Some(now);
        let frame_rate = 1.0 / if delta > 0.0 { delta } else { DEFAULT_FRAME_DELTA };
        FrameTiming {
            time,
            delta,
            frame_rate,
            frame: self.frame,
        }
    }

    pub fn advance(&mut self) {
        self.frame = self.frame.saturating_add(1);
    }
}

/// Runs every compiled pass once: buffers in declaration order, then the
/// image pass. Each buffer pass draws into its slot's back side and swaps
/// immediately, so later passes this frame already see the new front.
pub(crate) fn execute_frame<B: GpuBackend>(
    backend: &mut B,
    pipeline: &mut Pipeline,
    inputs: &FrameInputs,
) -> Result<(), BackendError> {
    let Pipeline {
        passes,
        slots,
        cache,
        ..
    } = pipeline;

    backend.begin_frame()?;
    for pass in passes.iter() {
        let (target, resolution) = match pass.output {
            Some(index) => match slots.get(index) {
                Some(slot) => (DrawTarget::Texture(slot.back), (slot.width, slot.height)),
                None => continue,
            },
            None => (DrawTarget::Surface, inputs.resolution),
        };
        backend.bind_target(target);
        backend.bind_program(pass.program);

        let mut textures: [Option<TextureId>; CHANNEL_COUNT] = [None; CHANNEL_COUNT];
        let mut channel_resolution = [[0.0f32; 3]; CHANNEL_COUNT];
        for (channel, binding) in pass.channels.iter().enumerate() {
            match binding {
                BoundChannel::Static(key) => {
                    if let Some(entry) = cache.get(key) {
                        textures[channel] = Some(entry.texture);
                        channel_resolution[channel] = entry.resolution();
                    }
                }
                BoundChannel::Feedback(index) => {
                    if let Some(slot) = slots.get(*index) {
                        textures[channel] = Some(slot.front);
                        channel_resolution[channel] = [slot.width as f32, slot.height as f32, 1.0];
                    }
                }
                BoundChannel::Unbound => {}
            }
        }

        let pass_inputs = FrameInputs {
            resolution,
            ..*inputs
        };
        bind_standard_uniforms(backend, pass.uniforms, &pass_inputs, channel_resolution);
        for (channel, texture) in textures.into_iter().enumerate() {
            backend.bind_channel(channel, texture);
        }
        backend.draw_fullscreen()?;

        if let Some(slot) = pass.output.and_then(|index| slots.get_mut(index)) {
            slot.swap();
        }
    }
    backend.end_frame()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::mock::MockBackend;

    #[test]
    fn clock_reports_elapsed_time_and_rate() {
        let origin = Instant::now();
        let mut clock = FrameClock::new(origin);

        let first = clock.tick(origin + Duration::from_millis(500));
        assert_eq!(first.frame, 0);
        assert_eq!(first.delta, 0.0);
        assert!((first.frame_rate - 60.0).abs() < 1e-3);
        assert!((first.time - 0.5).abs() < 1e-6);

        clock.advance();
        let second = clock.tick(origin + Duration::from_millis(750));
        assert_eq!(second.frame, 1);
        assert!((second.delta - 0.25).abs() < 1e-6);
        assert!((second.frame_rate - 4.0).abs() < 1e-4);

        clock.reset_frames();
        assert_eq!(clock.frame(), 0);
    }

    #[test]
    fn resize_only_reallocates_on_change() {
        let mut backend = MockBackend::new(8, 8);
        let mut slots = SlotTable::default();
        slots.allocate(&mut backend, 1, (8, 8));
        slots.allocate(&mut backend, 1, (8, 8));
        assert_eq!(slots.len(), 1);

        assert_eq!(slots.resize_all(&mut backend, 8, 8).unwrap(), 0);
        assert_eq!(backend.render_target_resizes, 0);

        assert_eq!(slots.resize_all(&mut backend, 16, 4).unwrap(), 1);
        assert_eq!(slots.resize_all(&mut backend, 16, 4).unwrap(), 0);
        let slot = slots.get(1).unwrap();
        assert_eq!((slot.width, slot.height), (16, 4));
        assert_eq!(backend.render_target_resizes, 2);

        slots.release(&mut backend);
        assert_eq!(slots.len(), 0);
        assert_eq!(backend.deleted_textures.len(), 2);
    }

    #[test]
    fn swap_exchanges_sides() {
        let mut backend = MockBackend::new(2, 2);
        let mut slot = FeedbackSlot::allocate(&mut backend, 0, (2, 2));
        let (front, back) = (slot.front, slot.back);
        slot.swap();
        assert_eq!((slot.front, slot.back), (back, front));
    }
}
