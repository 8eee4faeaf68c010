use bitflags::bitflags;

bitflags! {
    /// Per-offset attributes the upstream compiler records alongside the instruction stream
    pub struct InstructionAttrs: u8 {
        /// A block starts at this offset
        const SPLIT = 0x01;
    }
}

impl Default for InstructionAttrs {
    fn default() -> InstructionAttrs {
        InstructionAttrs::empty()
    }
}
