use std::collections::HashMap;

/// A patchable exit slot: one instruction word that is `NOP` while the
/// exit is unlinked and `B <checked entry>` once its target is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSite {
    /// Guest start address of the block containing the slot.
    pub owner: u32,
    /// Code buffer offset of the slot.
    pub slot: usize,
}

/// Mapping from guest target address to every exit slot waiting on it.
#[derive(Debug, Default)]
pub struct PatchTable {
    sites: HashMap<u32, Vec<PatchSite>>,
}

impl PatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an exit slot in block `owner` that leads to `target`.
    pub fn add(&mut self, target: u32, owner: u32, slot: usize) {
        self.sites.entry(target).or_default().push(PatchSite { owner, slot });
    }

    /// All slots leading to `target`.
    pub fn sites_for(&self, target: u32) -> &[PatchSite] {
        self.sites.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Forget every slot that lives in block `owner`.
    pub fn remove_owner(&mut self, owner: u32) {
        self.sites.retain(|_, sites| {
            sites.retain(|s| s.owner != owner);
            !sites.is_empty()
        });
    }

    /// Number of recorded slots across all targets.
    pub fn len(&self) -> usize {
        self.sites.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn clear(&mut self) {
        self.sites.clear();
    }
}
