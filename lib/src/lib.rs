//! Translate stack-machine bytecode into a block-threaded C++ program
//!
//! The input is a compiled program (see [`bytecode`]) whose instruction stream has been marked up
//! with the offsets where basic blocks start. The output (see [`translate`]) is one C++ function
//! per block, each calling into the runtime's opcode handlers and returning the next block to run.

pub mod bytecode;
pub mod translate;
pub mod util;
