mod cpp_writer;
mod string_literal;

pub use cpp_writer::*;
pub use string_literal::*;
