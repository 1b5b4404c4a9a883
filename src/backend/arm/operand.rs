//! ARM modified-immediate encoding and constant decomposition.

/// An A32 modified immediate: an 8-bit value rotated right by an even amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand2 {
    imm8: u8,
    /// Rotation field; the value is rotated right by `2 * rotate`.
    rotate: u8,
}

impl Operand2 {
    /// Try every even rotation from 0 to 30 and return the first that fits.
    pub fn encode(value: u32) -> Option<Self> {
        (0..16u32).find_map(|rot| {
            let v = value.rotate_left(rot * 2);
            (v <= 0xFF).then_some(Self { imm8: v as u8, rotate: rot as u8 })
        })
    }

    /// An unrotated byte, always encodable.
    pub const fn byte(value: u8) -> Self {
        Self { imm8: value, rotate: 0 }
    }

    /// The 32-bit value this operand expands to.
    pub fn value(self) -> u32 {
        (self.imm8 as u32).rotate_right(self.rotate as u32 * 2)
    }

    /// The 12-bit operand field (`rotate:imm8`).
    pub fn bits(self) -> u32 {
        ((self.rotate as u32) << 8) | self.imm8 as u32
    }

    pub fn from_bits(bits: u32) -> Self {
        Self { imm8: (bits & 0xFF) as u8, rotate: ((bits >> 8) & 0xF) as u8 }
    }
}

/// Which retry a caller may fall back to when a value is not directly encodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Bitwise complement (AND/BIC, MOV/MVN).
    Inverse,
    /// Two's-complement negation (ADD/SUB, CMP/CMN).
    Negation,
}

/// The transform that was applied to make a value encodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    None,
    Inverted,
    Negated,
}

/// Encode `value` directly, or its inverse/negation when allowed.
pub fn encode_with_transform(value: u32, kind: TransformKind) -> Option<(Operand2, Transform)> {
    if let Some(imm) = Operand2::encode(value) {
        return Some((imm, Transform::None));
    }
    match kind {
        TransformKind::Inverse => Operand2::encode(!value).map(|imm| (imm, Transform::Inverted)),
        TransformKind::Negation => {
            Operand2::encode(value.wrapping_neg()).map(|imm| (imm, Transform::Negated))
        }
    }
}

/// Up to four rotated-byte chunks whose OR is the decomposed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteWindows {
    chunks: [Operand2; 4],
    len: usize,
}

impl ByteWindows {
    /// Split `value` into 8-bit windows aligned to even bit positions,
    /// scanning from the least significant end.
    pub fn of(value: u32) -> Self {
        let mut windows = Self { chunks: [Operand2 { imm8: 0, rotate: 0 }; 4], len: 0 };
        let mut rest = value;
        while rest != 0 {
            let pos = rest.trailing_zeros() & !1;
            let chunk = rest & (0xFFu32 << pos);
            rest &= !chunk;
            // 8-bit window at an even position always encodes
            if let Some(imm) = Operand2::encode(chunk) {
                windows.chunks[windows.len] = imm;
                windows.len += 1;
            }
        }
        windows
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Operand2> + '_ {
        self.chunks[..self.len].iter().copied()
    }

    pub fn first(&self) -> Option<Operand2> {
        self.chunks[..self.len].first().copied()
    }
}
