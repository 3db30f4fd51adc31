use shadertoy::{
    AssetSource, ChannelInput, OutputSlotMap, PassRole, RenderPass, ShaderDescription,
};
use tracing::{debug, warn};

use crate::backend::{GpuBackend, ProgramId, TargetKind};
use crate::compile::{build_program_source, compile_pass};
use crate::error::LoadError;
use crate::loader::{load_static_inputs, CacheKey, TextureCache};
use crate::scheduler::SlotTable;
use crate::types::{channel_kinds, CHANNEL_COUNT};
use crate::uniforms::UniformUsage;

/// What a channel resolves to when the pass is drawn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BoundChannel {
    Unbound,
    Static(CacheKey),
    /// Front side of a feedback slot.
    Feedback(usize),
}

#[derive(Debug)]
pub(crate) struct CompiledPass {
    pub name: String,
    pub program: ProgramId,
    pub uniforms: UniformUsage,
    pub channels: [BoundChannel; CHANNEL_COUNT],
    /// Feedback slot written by a buffer pass; `None` targets the surface.
    pub output: Option<usize>,
}

/// Everything one successful `load` produced. Owned by the renderer until
/// the next successful load replaces it.
#[derive(Debug)]
pub(crate) struct Pipeline {
    /// Buffer passes in declaration order, then the image pass.
    pub passes: Vec<CompiledPass>,
    pub slots: SlotTable,
    pub cache: TextureCache,
    pub slot_map: OutputSlotMap,
}

impl Pipeline {
    /// Builds a complete pipeline or releases everything it allocated.
    pub fn build<B: GpuBackend>(
        backend: &mut B,
        assets: &dyn AssetSource,
        description: &ShaderDescription,
    ) -> Result<Self, LoadError> {
        let image = description
            .image_pass()
            .ok_or(LoadError::MissingImagePass)?;
        let issues = description.validate();
        if !issues.is_empty() {
            return Err(LoadError::InvalidDescription { issues });
        }
        let mut pipeline = Pipeline {
            passes: Vec::new(),
            slots: SlotTable::default(),
            cache: TextureCache::default(),
            slot_map: OutputSlotMap::build(description),
        };
        match pipeline.populate(backend, assets, description, image) {
            Ok(()) => Ok(pipeline),
            Err(err) => {
                pipeline.release(backend);
                Err(err)
            }
        }
    }

    fn populate<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        assets: &dyn AssetSource,
        description: &ShaderDescription,
        image: &RenderPass,
    ) -> Result<(), LoadError> {
        let surface = backend.surface_size();
        for index in self.slot_map.distinct_slots() {
            self.slots.allocate(backend, index, surface);
            debug!(slot = index, width = surface.0, height = surface.1, "allocated feedback slot");
        }

        let mut executed: Vec<(&RenderPass, Option<usize>)> = Vec::new();
        for pass in description.buffer_passes() {
            match self.slot_map.output_slot(pass) {
                Some(slot) => executed.push((pass, Some(slot))),
                None => warn!(pass = %pass.name, "buffer pass has no feedback slot; skipping"),
            }
        }
        executed.push((image, None));
        for pass in description.passes.iter().filter(|p| p.role == PassRole::Sound) {
            debug!(pass = %pass.name, "sound passes are not executed");
        }

        load_static_inputs(
            backend,
            assets,
            &mut self.cache,
            executed
                .iter()
                .flat_map(|(pass, _)| pass.inputs.iter().map(|binding| &binding.input)),
        )?;

        let common = description.common.as_deref();
        for (pass, output) in executed {
            let target = match output {
                Some(_) => TargetKind::Feedback,
                None => TargetKind::Surface,
            };
            let channels = self.resolve_channels(pass);
            let feedback = std::array::from_fn(|channel| {
                matches!(channels[channel], BoundChannel::Feedback(_))
            });
            let source = build_program_source(common, &pass.code, channel_kinds(pass), target)
                .with_feedback_channels(feedback);
            let program = compile_pass(backend, &pass.name, &source)?;
            self.passes.push(CompiledPass {
                name: pass.name.clone(),
                program,
                uniforms: UniformUsage::for_pass(common, &pass.code),
                channels,
                output,
            });
            debug!(pass = %pass.name, ?output, "compiled pass");
        }
        Ok(())
    }

    fn resolve_channels(&self, pass: &RenderPass) -> [BoundChannel; CHANNEL_COUNT] {
        std::array::from_fn(|channel| match pass.input(channel) {
            None | Some(ChannelInput::Keyboard) | Some(ChannelInput::Volume { .. }) => {
                BoundChannel::Unbound
            }
            Some(ChannelInput::Buffer { id }) => match self.slot_map.slot(id) {
                Some(slot) => BoundChannel::Feedback(slot),
                None => {
                    warn!(pass = %pass.name, channel, buffer = %id, "channel references an unknown buffer");
                    BoundChannel::Unbound
                }
            },
            Some(input) => match CacheKey::for_input(input) {
                Some((key, _)) => BoundChannel::Static(key),
                None => BoundChannel::Unbound,
            },
        })
    }

    pub fn release<B: GpuBackend>(&mut self, backend: &mut B) {
        for pass in self.passes.drain(..) {
            backend.delete_program(pass.program);
        }
        self.slots.release(backend);
        self.cache.release(backend);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use shadertoy::{ChannelBinding, OutputId, SamplerState, ShaderInfo};

    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::loader::tests::MemoryAssets;

    pub(crate) fn pass(name: &str, role: PassRole, code: &str) -> RenderPass {
        RenderPass {
            name: name.to_string(),
            role,
            code: code.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub(crate) fn buffer(name: &str, code: &str, output: &str) -> RenderPass {
        RenderPass {
            outputs: vec![OutputId::new(output)],
            ..pass(name, PassRole::Buffer, code)
        }
    }

    pub(crate) fn with_input(mut pass: RenderPass, channel: usize, input: ChannelInput) -> RenderPass {
        pass.inputs.push(ChannelBinding { channel, input });
        pass
    }

    pub(crate) fn buffer_input(id: &str) -> ChannelInput {
        ChannelInput::Buffer { id: OutputId::new(id) }
    }

    pub(crate) fn description(passes: Vec<RenderPass>) -> ShaderDescription {
        ShaderDescription {
            info: ShaderInfo {
                id: "test".into(),
                name: "test".into(),
                ..ShaderInfo::default()
            },
            common: None,
            passes,
        }
    }

    #[test]
    fn orders_buffers_before_image_and_binds_channels() {
        let shader = description(vec![
            with_input(pass("Image", PassRole::Image, "// image"), 0, buffer_input("257")),
            with_input(buffer("Buffer B", "// b", "258"), 1, buffer_input("257")),
            with_input(
                buffer("Buffer A", "// a", "257"),
                2,
                ChannelInput::Texture {
                    src: "/media/a/noise.png".into(),
                    sampler: SamplerState::default(),
                },
            ),
        ]);
        let assets = MemoryAssets::default();
        let mut backend = MockBackend::new(8, 4);

        let pipeline = Pipeline::build(&mut backend, &assets, &shader).unwrap();

        let names: Vec<&str> = pipeline.passes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Buffer B", "Buffer A", "Image"]);
        assert_eq!(backend.program_label(pipeline.passes[2].program), Some("Image"));
        assert_eq!(pipeline.passes[0].output, Some(1));
        assert_eq!(pipeline.passes[1].output, Some(0));
        assert_eq!(pipeline.passes[2].output, None);
        assert_eq!(pipeline.passes[0].channels[1], BoundChannel::Feedback(0));
        assert_eq!(pipeline.passes[2].channels[0], BoundChannel::Feedback(0));
        assert!(matches!(pipeline.passes[1].channels[2], BoundChannel::Static(_)));
        assert_eq!(pipeline.passes[1].channels[0], BoundChannel::Unbound);
        assert_eq!(
            backend.feedback_channels(pipeline.passes[0].program),
            Some([false, true, false, false])
        );
        assert_eq!(
            backend.feedback_channels(pipeline.passes[1].program),
            Some([false; CHANNEL_COUNT])
        );

        assert_eq!(pipeline.slots.len(), 2);
        let slot = pipeline.slots.get(0).unwrap();
        assert_eq!((slot.width, slot.height), (8, 4));
        assert_eq!(pipeline.cache.len(), 1);
    }

    #[test]
    fn single_pass_allocates_no_feedback() {
        let shader = description(vec![pass("Image", PassRole::Image, "// image iTime")]);
        let mut backend = MockBackend::new(4, 4);

        let pipeline = Pipeline::build(&mut backend, &MemoryAssets::default(), &shader).unwrap();

        assert_eq!(pipeline.passes.len(), 1);
        assert_eq!(pipeline.slots.len(), 0);
        assert!(backend.live_textures().is_empty());
        assert!(pipeline.passes[0]
            .uniforms
            .contains(crate::uniforms::StandardUniform::Time));
    }

    #[test]
    fn missing_image_pass_allocates_nothing() {
        let shader = description(vec![buffer("Buffer A", "// a", "257")]);
        let mut backend = MockBackend::new(4, 4);

        let err = Pipeline::build(&mut backend, &MemoryAssets::default(), &shader).unwrap_err();

        assert!(matches!(err, LoadError::MissingImagePass));
        assert!(backend.live_textures().is_empty());
        assert!(backend.live_programs().is_empty());
        assert!(backend.deleted_textures.is_empty());
    }

    #[test]
    fn second_image_pass_is_rejected() {
        let shader = description(vec![
            buffer("Buffer A", "// a", "257"),
            pass("Image", PassRole::Image, "// first"),
            pass("Image 2", PassRole::Image, "// second"),
        ]);
        let mut backend = MockBackend::new(4, 4);

        let err = Pipeline::build(&mut backend, &MemoryAssets::default(), &shader).unwrap_err();

        match err {
            LoadError::InvalidDescription { issues } => {
                assert!(issues.iter().any(|issue| issue.contains("2 image passes")), "{issues:?}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(backend.live_textures().is_empty());
        assert!(backend.live_programs().is_empty());
    }

    #[test]
    fn compile_failure_releases_partial_resources() {
        let shader = description(vec![
            buffer("Buffer A", "// a", "257"),
            with_input(
                pass("Image", PassRole::Image, "// broken"),
                0,
                ChannelInput::Texture {
                    src: "/media/a/missing.png".into(),
                    sampler: SamplerState::default(),
                },
            ),
        ]);
        let mut backend = MockBackend::new(4, 4).failing_on("// broken");

        let err = Pipeline::build(&mut backend, &MemoryAssets::default(), &shader).unwrap_err();

        match &err {
            LoadError::Compile { pass, .. } => assert_eq!(pass, "Image"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.assembled_source().unwrap().contains("// broken"));
        assert!(backend.live_textures().is_empty());
        assert!(backend.live_programs().is_empty());
        assert_eq!(backend.deleted_programs.len(), 1);
        assert_eq!(backend.deleted_textures.len(), 3);
    }

    #[test]
    fn overflowing_buffer_is_skipped() {
        let shader = description(vec![
            buffer("Buffer A", "// a", "1"),
            buffer("Buffer B", "// b", "2"),
            buffer("Buffer C", "// c", "3"),
            buffer("Buffer D", "// d", "4"),
            buffer("Extra", "// e", "5"),
            pass("Image", PassRole::Image, "// image"),
        ]);
        let mut backend = MockBackend::new(2, 2);

        let pipeline = Pipeline::build(&mut backend, &MemoryAssets::default(), &shader).unwrap();

        assert_eq!(pipeline.passes.len(), 5);
        assert!(pipeline.passes.iter().all(|p| p.name != "Extra"));
        assert_eq!(pipeline.slots.len(), 4);
    }
}
