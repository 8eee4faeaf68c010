use crate::bytecode;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Bytecode(bytecode::Error),
    Format(fmt::Error),
    IoError(io::Error),

    /// A setting that must be a C++ identifier (or `::` separated path of them) isn't one
    InvalidIdentifier(String),

    /// Translation stopped early and the output is not usable
    CorruptBytecode(Corruption),
}

impl From<bytecode::Error> for Error {
    fn from(err: bytecode::Error) -> Error {
        Error::Bytecode(err)
    }
}

impl From<fmt::Error> for Error {
    fn from(err: fmt::Error) -> Error {
        Error::Format(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<Corruption> for Error {
    fn from(err: Corruption) -> Error {
        Error::CorruptBytecode(err)
    }
}

/// Reason the instruction stream could not be decoded
///
/// Offsets are positions in the instruction stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Corruption {
    /// The program does not start with an unconditional jump to its first block
    MissingEntryJump,

    /// A word that should be an opcode is outside `[0, MAX_OPCODE)`
    BadOpcode { offset: usize, value: i32 },

    /// An instruction's operands run past the end of the stream
    Truncated { offset: usize },

    /// An operand that counts or locates other operands is negative
    BadOperand { offset: usize, value: i32 },
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corruption::MissingEntryJump => write!(f, "missing entry jump"),
            Corruption::BadOpcode { value, .. } => write!(f, "{}", value),
            Corruption::Truncated { offset } => {
                write!(f, "truncated instruction at {}", offset)
            }
            Corruption::BadOperand { offset, value } => {
                write!(f, "bad operand {} at {}", value, offset)
            }
        }
    }
}
