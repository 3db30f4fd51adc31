//! CPU stand-in for a GPU used by the renderer tests.
//!
//! Programs are matched to Rust closures by a marker substring of their
//! fragment source; a draw runs the closure once per target pixel with the
//! bound program's uniforms and a snapshot of the bound channels.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::{
    BackendError, DrawTarget, GpuBackend, ProgramError, ProgramId, ProgramSource, ShaderStage,
    TextureDescriptor, TextureId, UniformValue,
};
use crate::types::CHANNEL_COUNT;

pub(crate) type FragmentFn = Arc<dyn Fn(&Fragment<'_>) -> [f32; 4] + Send + Sync>;

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MockUniforms {
    pub resolution: Option<[f32; 3]>,
    pub time: Option<f32>,
    pub time_delta: Option<f32>,
    pub frame_rate: Option<f32>,
    pub frame: Option<i32>,
    pub mouse: Option<[f32; 4]>,
    pub date: Option<[f32; 4]>,
    pub sample_rate: Option<f32>,
    pub channel_time: Option<[f32; CHANNEL_COUNT]>,
    pub channel_resolution: Option<[[f32; 3]; CHANNEL_COUNT]>,
}

impl MockUniforms {
    fn apply(&mut self, value: UniformValue) {
        match value {
            UniformValue::Resolution(v) => self.resolution = Some(v),
            UniformValue::Time(v) => self.time = Some(v),
            UniformValue::TimeDelta(v) => self.time_delta = Some(v),
            UniformValue::FrameRate(v) => self.frame_rate = Some(v),
            UniformValue::Frame(v) => self.frame = Some(v),
            UniformValue::Mouse(v) => self.mouse = Some(v),
            UniformValue::Date(v) => self.date = Some(v),
            UniformValue::SampleRate(v) => self.sample_rate = Some(v),
            UniformValue::ChannelTime(v) => self.channel_time = Some(v),
            UniformValue::ChannelResolution(v) => self.channel_resolution = Some(v),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct MockTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub render_target: bool,
    pub pixels: Vec<[f32; 4]>,
}

impl MockTexture {
    fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.pixels
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or_default()
    }
}

/// Inputs visible to a CPU fragment closure.
pub(crate) struct Fragment<'a> {
    pub coord: [f32; 2],
    pub uniforms: &'a MockUniforms,
    channels: &'a [Option<MockTexture>; CHANNEL_COUNT],
}

impl Fragment<'_> {
    /// Nearest-neighbour sample of layer 0; unbound channels read as zero.
    pub fn sample(&self, channel: usize, uv: [f32; 2]) -> [f32; 4] {
        let Some(Some(texture)) = self.channels.get(channel) else {
            return [0.0; 4];
        };
        let x = (uv[0].clamp(0.0, 1.0) * texture.width as f32) as u32;
        let y = (uv[1].clamp(0.0, 1.0) * texture.height as f32) as u32;
        texture.texel(x, y)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Command {
    BeginFrame,
    BindTarget(DrawTarget),
    BindProgram(ProgramId),
    SetUniform(UniformValue),
    BindChannel(usize, Option<TextureId>),
    Draw(DrawTarget, ProgramId),
    EndFrame,
}

struct MockProgram {
    label: String,
    shader: Option<FragmentFn>,
    uniforms: MockUniforms,
    feedback_channels: [bool; CHANNEL_COUNT],
}

pub(crate) struct MockBackend {
    size: (u32, u32),
    surface: Vec<[f32; 4]>,
    shaders: Vec<(String, FragmentFn)>,
    failures: Vec<String>,
    programs: HashMap<ProgramId, MockProgram>,
    textures: HashMap<TextureId, MockTexture>,
    next_id: u32,
    in_frame: bool,
    target: DrawTarget,
    program: Option<ProgramId>,
    channels: [Option<TextureId>; CHANNEL_COUNT],
    pub commands: Vec<Command>,
    pub deleted_programs: Vec<ProgramId>,
    pub deleted_textures: Vec<TextureId>,
    pub render_target_resizes: usize,
    max_texture_dimension: u32,
}

impl MockBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            surface: vec![[0.0; 4]; (width * height) as usize],
            shaders: Vec::new(),
            failures: Vec::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_id: 1,
            in_frame: false,
            target: DrawTarget::Surface,
            program: None,
            channels: [None; CHANNEL_COUNT],
            commands: Vec::new(),
            deleted_programs: Vec::new(),
            deleted_textures: Vec::new(),
            render_target_resizes: 0,
            max_texture_dimension: 8192,
        }
    }

    /// Programs whose fragment source contains `marker` shade with `shader`.
    pub fn with_shader(
        mut self,
        marker: &str,
        shader: impl Fn(&Fragment<'_>) -> [f32; 4] + Send + Sync + 'static,
    ) -> Self {
        self.shaders.push((marker.to_string(), Arc::new(shader)));
        self
    }

    /// Largest texture extent `create_texture` accepts.
    pub fn with_max_texture_dimension(mut self, limit: u32) -> Self {
        self.max_texture_dimension = limit;
        self
    }

    /// Programs whose fragment source contains `marker` fail to compile.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failures.push(marker.to_string());
        self
    }

    pub fn surface_pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.surface[(y * self.size.0 + x) as usize]
    }

    pub fn surface_pixels(&self) -> &[[f32; 4]] {
        &self.surface
    }

    pub fn texture(&self, id: TextureId) -> Option<&MockTexture> {
        self.textures.get(&id)
    }

    pub fn live_textures(&self) -> BTreeSet<TextureId> {
        self.textures.keys().copied().collect()
    }

    pub fn live_programs(&self) -> BTreeSet<ProgramId> {
        self.programs.keys().copied().collect()
    }

    pub fn program_label(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(&id).map(|program| program.label.as_str())
    }

    pub fn feedback_channels(&self, id: ProgramId) -> Option<[bool; CHANNEL_COUNT]> {
        self.programs.get(&id).map(|program| program.feedback_channels)
    }

    pub fn uniforms(&self, id: ProgramId) -> Option<&MockUniforms> {
        self.programs.get(&id).map(|program| &program.uniforms)
    }

    pub fn draws(&self) -> Vec<(DrawTarget, ProgramId)> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Draw(target, program) => Some((*target, *program)),
                _ => None,
            })
            .collect()
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GpuBackend for MockBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if self.size != (width, height) {
            self.size = (width, height);
            self.surface = vec![[0.0; 4]; (width * height) as usize];
        }
    }

    fn compile_program(
        &mut self,
        label: &str,
        source: &ProgramSource,
    ) -> Result<ProgramId, ProgramError> {
        if let Some(marker) = self
            .failures
            .iter()
            .find(|marker| source.fragment.contains(marker.as_str()))
        {
            return Err(ProgramError::Compile {
                stage: ShaderStage::Fragment,
                log: format!("ERROR: 0:1: '{marker}' : syntax error"),
            });
        }
        let shader = self
            .shaders
            .iter()
            .find(|(marker, _)| source.fragment.contains(marker.as_str()))
            .map(|(_, shader)| Arc::clone(shader));
        let id = ProgramId(self.allocate_id());
        self.programs.insert(
            id,
            MockProgram {
                label: label.to_string(),
                shader,
                uniforms: MockUniforms::default(),
                feedback_channels: source.feedback_channels,
            },
        );
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            self.deleted_programs.push(program);
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor<'_>,
        layers: &[&[u8]],
    ) -> Result<TextureId, BackendError> {
        desc.validate(layers, self.max_texture_dimension)?;
        let pixels = layers
            .iter()
            .flat_map(|layer| layer.chunks_exact(4))
            .map(|px| {
                [
                    px[0] as f32 / 255.0,
                    px[1] as f32 / 255.0,
                    px[2] as f32 / 255.0,
                    px[3] as f32 / 255.0,
                ]
            })
            .collect();
        let id = TextureId(self.allocate_id());
        self.textures.insert(
            id,
            MockTexture {
                label: desc.label.to_string(),
                width: desc.width,
                height: desc.height,
                layers: layers.len() as u32,
                render_target: false,
                pixels,
            },
        );
        Ok(id)
    }

    fn create_render_target(&mut self, label: &str, width: u32, height: u32) -> TextureId {
        let id = TextureId(self.allocate_id());
        self.textures.insert(
            id,
            MockTexture {
                label: label.to_string(),
                width,
                height,
                layers: 1,
                render_target: true,
                pixels: vec![[0.0; 4]; (width * height) as usize],
            },
        );
        id
    }

    fn resize_render_target(
        &mut self,
        target: TextureId,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError> {
        let texture = self
            .textures
            .get_mut(&target)
            .filter(|texture| texture.render_target)
            .ok_or(BackendError::UnknownTexture(target))?;
        texture.width = width;
        texture.height = height;
        texture.pixels = vec![[0.0; 4]; (width * height) as usize];
        self.render_target_resizes += 1;
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            self.deleted_textures.push(texture);
        }
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        self.in_frame = true;
        self.commands.push(Command::BeginFrame);
        Ok(())
    }

    fn bind_target(&mut self, target: DrawTarget) {
        self.target = target;
        self.commands.push(Command::BindTarget(target));
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        self.commands.push(Command::BindProgram(program));
    }

    fn set_uniform(&mut self, value: UniformValue) {
        if let Some(program) = self.program.and_then(|id| self.programs.get_mut(&id)) {
            program.uniforms.apply(value);
        }
        self.commands.push(Command::SetUniform(value));
    }

    fn bind_channel(&mut self, channel: usize, texture: Option<TextureId>) {
        if let Some(slot) = self.channels.get_mut(channel) {
            *slot = texture;
        }
        self.commands.push(Command::BindChannel(channel, texture));
    }

    fn draw_fullscreen(&mut self) -> Result<(), BackendError> {
        if !self.in_frame {
            return Err(BackendError::NoFrame("draw_fullscreen"));
        }
        let program_id = self.program.ok_or(BackendError::NoFrame("draw_fullscreen"))?;
        let program = self
            .programs
            .get(&program_id)
            .ok_or(BackendError::UnknownProgram(program_id))?;
        self.commands.push(Command::Draw(self.target, program_id));

        let channels: [Option<MockTexture>; CHANNEL_COUNT] = std::array::from_fn(|index| {
            self.channels[index].and_then(|id| self.textures.get(&id).cloned())
        });
        let (width, height) = match self.target {
            DrawTarget::Surface => self.size,
            DrawTarget::Texture(id) => {
                let texture = self
                    .textures
                    .get(&id)
                    .ok_or(BackendError::UnknownTexture(id))?;
                (texture.width, texture.height)
            }
        };

        let mut output = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let fragment = Fragment {
                    coord: [x as f32 + 0.5, y as f32 + 0.5],
                    uniforms: &program.uniforms,
                    channels: &channels,
                };
                let color = program
                    .shader
                    .as_ref()
                    .map(|shader| shader(&fragment))
                    .unwrap_or([0.0, 0.0, 0.0, 1.0]);
                output.push(color);
            }
        }

        match self.target {
            DrawTarget::Surface => self.surface = output,
            DrawTarget::Texture(id) => {
                if let Some(texture) = self.textures.get_mut(&id) {
                    texture.pixels = output;
                }
            }
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        if !self.in_frame {
            return Err(BackendError::NoFrame("end_frame"));
        }
        self.in_frame = false;
        self.commands.push(Command::EndFrame);
        Ok(())
    }
}
