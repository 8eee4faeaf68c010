//! Compiled programs, as produced by the bytecode compiler
//!
//! A program is a flat stream of 32-bit words. Each instruction is an [`Opcode`] followed by its
//! operands, whose layout is described by [`OperandLayout`]. Alongside the stream, the compiler
//! records [`InstructionAttrs`] for every offset and a handful of tables (functions, strings,
//! identifiers, built-ins) that are only needed to make sense of the program.

pub mod binary_format;
mod attributes;
mod container;
mod errors;
mod file;
mod opcodes;

pub use attributes::*;
pub use container::*;
pub use errors::*;
pub use file::*;
pub use opcodes::*;
