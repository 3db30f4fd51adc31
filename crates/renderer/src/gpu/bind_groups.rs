use std::collections::HashMap;

use crate::backend::{ProgramId, TextureId};
use crate::types::CHANNEL_COUNT;

type ChannelSet = [Option<TextureId>; CHANNEL_COUNT];

/// Channel bind groups keyed by program and the textures bound to it.
/// Ping-pong passes alternate between two entries per program.
pub(crate) struct BindGroupCache<T> {
    entries: HashMap<(ProgramId, ChannelSet), T>,
}

impl<T> Default for BindGroupCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> BindGroupCache<T> {
    pub fn get_or_insert_with(
        &mut self,
        program: ProgramId,
        channels: ChannelSet,
        build: impl FnOnce() -> T,
    ) -> &T {
        self.entries.entry((program, channels)).or_insert_with(build)
    }

    /// Drops every entry referencing `texture`, whose view is gone or replaced.
    pub fn invalidate_texture(&mut self, texture: TextureId) {
        self.entries
            .retain(|(_, channels), _| !channels.contains(&Some(texture)));
    }

    pub fn remove_program(&mut self, program: ProgramId) {
        self.entries.retain(|(owner, _), _| *owner != program);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
