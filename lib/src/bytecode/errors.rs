use std::io;
use std::string::FromUtf8Error;

/// Failures reading a bytecode file
#[derive(Debug)]
pub enum Error {
    /// The file does not start with [`super::MAGIC`]
    BadMagic([u8; 4]),
    UnsupportedVersion(u32),
    UnexpectedEof,
    InvalidUtf8(FromUtf8Error),
    IoError(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::IoError(err)
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error::InvalidUtf8(err)
    }
}
