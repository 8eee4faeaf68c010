use super::InstructionAttrs;

/// Read-only view of a compiled program, as handed over by the compiler that produced it
///
/// Only the instruction stream, its attributes, and the original buffer affect the generated
/// code. Every other accessor is only used to annotate the output so a human can follow it.
pub trait BytecodeContainer {
    /// Instruction stream, starting with an unconditional jump to the first block
    fn code(&self) -> &[i32];

    /// Attributes recorded for an offset into the instruction stream
    fn attrs(&self, offset: usize) -> InstructionAttrs;

    /// Name of the function whose code starts at this offset
    fn function_at(&self, offset: usize) -> Option<&str>;

    /// Name of the function with this index in the function table
    fn function_name(&self, index: usize) -> Option<&str>;

    /// String literal with this index
    fn string(&self, index: usize) -> Option<&str>;

    /// Identifier (variable name) with this index
    fn identifier(&self, index: usize) -> Option<&str>;

    /// Name of the built-in function with this index
    fn builtin_name(&self, index: usize) -> Option<&str>;

    /// The whole container, exactly as it was handed over
    fn raw_buffer(&self) -> &[u8];

    /// Does a block start at this offset?
    fn is_block_start(&self, offset: usize) -> bool {
        self.attrs(offset).contains(InstructionAttrs::SPLIT)
    }
}
