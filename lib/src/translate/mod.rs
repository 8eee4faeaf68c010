//! Translation of a bytecode program into a block-threaded C++ unit
//!
//! The instruction stream is walked twice. [`scan_blocks`] finds every block and checks the
//! stream decodes, then [`BlockGenerator`] writes one C++ function per block. Each block function
//! takes the runtime state and returns the next block to run (or null once the program exits), so
//! the runtime drives the program as a trampoline. [`ProgramTranslator`] puts the two passes
//! together with the preamble, the embedded bytecode and `main`.

mod blocks;
mod errors;
mod generator;
mod operands;
mod program;
mod settings;

pub use blocks::*;
pub use errors::*;
pub use generator::*;
pub use operands::*;
pub use program::*;
pub use settings::*;
