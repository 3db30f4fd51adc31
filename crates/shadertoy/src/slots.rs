use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::description::{OutputId, RenderPass, ShaderDescription};

/// Number of feedback buffers a shader may declare.
pub const MAX_SLOTS: usize = 4;

const CONVENTIONAL_NAMES: [&str; MAX_SLOTS] = ["buffer a", "buffer b", "buffer c", "buffer d"];

/// Maps canonical output identifiers to stable feedback slots `0..MAX_SLOTS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSlotMap {
    slots: BTreeMap<OutputId, usize>,
}

impl OutputSlotMap {
    /// Scans buffer passes in declaration order. A conventionally named pass
    /// ("Buffer A".."Buffer D") takes its named slot; anything else takes the
    /// next automatic slot, which always continues after the last assignment.
    pub fn build(description: &ShaderDescription) -> Self {
        let mut slots = BTreeMap::new();
        let mut next_auto = 0usize;
        for pass in description.buffer_passes() {
            let slot = conventional_slot(&pass.name).unwrap_or(next_auto);
            if slot >= MAX_SLOTS {
                warn!(pass = %pass.name, slot, "buffer pass exceeds the available feedback slots");
                continue;
            }
            next_auto = slot + 1;
            for output in &pass.outputs {
                slots.insert(output.clone(), slot);
            }
        }
        Self { slots }
    }

    pub fn slot(&self, id: &OutputId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Slot written by `pass`, taken from its first mapped output.
    pub fn output_slot(&self, pass: &RenderPass) -> Option<usize> {
        pass.outputs.iter().find_map(|output| self.slot(output))
    }

    /// Distinct slot indices in ascending order.
    pub fn distinct_slots(&self) -> BTreeSet<usize> {
        self.slots.values().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutputId, usize)> {
        self.slots.iter().map(|(id, slot)| (id, *slot))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub fn conventional_slot(name: &str) -> Option<usize> {
    let name = name.trim().to_ascii_lowercase();
    CONVENTIONAL_NAMES
        .iter()
        .position(|candidate| *candidate == name)
}
