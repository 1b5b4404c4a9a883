use bitflags::bitflags;

bitflags! {
    /// Reasons the dispatcher loop stopped before the tick budget ran out.
    ///
    /// Multiple reasons can be active simultaneously (OR'd together).
    /// An empty set means the slice ended because the downcount expired.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HaltReason: u32 {
        /// A guest BREAK instruction was executed.
        const BREAKPOINT    = 1 << 0;
        /// A syscall handler asked the JIT to stop.
        const SYSCALL       = 1 << 1;
        /// External halt requested through a [`crate::HaltHandle`].
        const EXTERNAL_HALT = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_reason_bitflags() {
        let reason = HaltReason::BREAKPOINT | HaltReason::EXTERNAL_HALT;
        assert!(reason.contains(HaltReason::BREAKPOINT));
        assert!(reason.contains(HaltReason::EXTERNAL_HALT));
        assert!(!reason.contains(HaltReason::SYSCALL));
    }

    #[test]
    fn test_halt_reason_from_bits() {
        let reason = HaltReason::from_bits_truncate(0b1110);
        assert!(reason.contains(HaltReason::SYSCALL));
        assert!(reason.contains(HaltReason::EXTERNAL_HALT));
        assert_eq!(reason.bits(), 0b110);
        assert!(HaltReason::from_bits_truncate(0).is_empty());
    }
}
