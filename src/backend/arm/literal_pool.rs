use std::collections::HashMap;

/// Loads further than this many bytes from their pool force a mid-block
/// flush. `LDR Rt, [PC, #imm12]` reaches 4095 bytes past `load + 8`.
pub const LITERAL_FLUSH_DISTANCE: usize = 3072;

/// Largest displacement an `LDR Rt, [PC, #imm12]` can encode.
pub const MAX_LITERAL_DISTANCE: usize = 4095;

/// A 32-bit constant waiting to be written after the code that loads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralEntry {
    /// The constant itself.
    pub value: u32,
    /// Code buffer offsets of every PC-relative load referencing this value.
    pub loads: Vec<usize>,
    /// Code buffer offset of the written constant, 0 until flushed.
    pub location: usize,
}

/// Per-block pool of deduplicated 32-bit literals.
///
/// Entries are appended at a flush point (normally the block end) and the
/// PC-relative loads referencing them are patched at that time.
#[derive(Debug, Default)]
pub struct LiteralPool {
    /// Map from constant value to its index in `entries`.
    by_value: HashMap<u32, usize>,
    entries: Vec<LiteralEntry>,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a load of `value` emitted at `load_offset`.
    ///
    /// Equal values share one entry. Returns the entry index.
    pub fn add_load(&mut self, value: u32, load_offset: usize) -> usize {
        if let Some(&index) = self.by_value.get(&value) {
            self.entries[index].loads.push(load_offset);
            return index;
        }
        let index = self.entries.len();
        self.entries.push(LiteralEntry { value, loads: vec![load_offset], location: 0 });
        self.by_value.insert(value, index);
        index
    }

    /// Offset of the oldest load still waiting for its literal.
    pub fn first_load(&self) -> Option<usize> {
        self.entries.iter().filter_map(|e| e.loads.iter().min().copied()).min()
    }

    /// Entry by index.
    pub fn entry(&self, index: usize) -> &LiteralEntry {
        &self.entries[index]
    }

    /// Number of distinct literals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every pending entry, leaving the pool empty.
    pub fn take(&mut self) -> Vec<LiteralEntry> {
        self.by_value.clear();
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.by_value.clear();
        self.entries.clear();
    }
}
