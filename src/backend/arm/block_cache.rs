use std::collections::HashMap;

/// One exit of a compiled block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockExit {
    /// Guest address the exit leads to.
    pub target: u32,
    /// Code buffer offset of the patchable slot.
    pub slot: usize,
    /// Whether the slot currently branches straight to the target block.
    pub linked: bool,
}

/// A compiled native code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBlock {
    /// Guest address of the first instruction.
    pub start: u32,
    /// Offset of the entry that checks the cycle budget first.
    pub checked_entry: usize,
    /// Offset of the entry used by the dispatcher.
    pub normal_entry: usize,
    /// Size of the emitted native code in bytes.
    pub size: usize,
    /// Lowest and highest guest instruction address compiled into the block.
    pub guest_first: u32,
    pub guest_last: u32,
    pub exits: Vec<BlockExit>,
}

impl CompiledBlock {
    /// Whether any compiled guest instruction lies in `[start, start + len)`.
    pub fn overlaps(&self, start: u32, len: u32) -> bool {
        let end = start as u64 + len as u64;
        (self.guest_first as u64) < end && self.guest_last as u64 + 4 > start as u64
    }
}

/// Cache of compiled blocks, keyed by guest start address.
///
/// Single-threaded: no internal locking (one JIT per guest CPU).
#[derive(Debug, Default)]
pub struct BlockCache {
    blocks: HashMap<u32, CompiledBlock>,
    /// Checked entry offset to guest start.
    entries: HashMap<usize, u32>,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, start: u32) -> Option<&CompiledBlock> {
        self.blocks.get(&start)
    }

    pub fn get_mut(&mut self, start: u32) -> Option<&mut CompiledBlock> {
        self.blocks.get_mut(&start)
    }

    pub fn insert(&mut self, block: CompiledBlock) {
        if let Some(old) = self.blocks.get(&block.start) {
            self.entries.remove(&old.checked_entry);
        }
        self.entries.insert(block.checked_entry, block.start);
        self.blocks.insert(block.start, block);
    }

    /// Guest start of the block whose checked entry is at `offset`.
    pub fn start_at_checked_entry(&self, offset: usize) -> Option<u32> {
        self.entries.get(&offset).copied()
    }

    /// Remove and return every block overlapping `[start, start + len)`.
    pub fn take_overlapping(&mut self, start: u32, len: u32) -> Vec<CompiledBlock> {
        let keys: Vec<u32> = self
            .blocks
            .values()
            .filter(|b| b.overlaps(start, len))
            .map(|b| b.start)
            .collect();
        let removed: Vec<CompiledBlock> = keys.into_iter().filter_map(|k| self.blocks.remove(&k)).collect();
        for block in &removed {
            self.entries.remove(&block.checked_entry);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledBlock> {
        self.blocks.values()
    }
}
