use super::Error;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result};

/// Utility trait for serializing data inside bytecode files
///
/// Bytecode files are a sequence of little-endian 32-bit words:
///
///   - sequences are prefixed with their `u32` length
///   - byte strings are zero-padded to the next word boundary
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Counterpart of [`Serialize`]
pub trait Deserialize: Sized {
    /// Read the construct back from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error>;
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(*self)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<LittleEndian>(*self)
    }
}

impl Deserialize for i32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

/// Number of zero bytes needed after `len` bytes to reach a word boundary
pub fn word_padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Write bytes with their length up front and padding at the back
pub fn write_padded_bytes<W: WriteBytesExt>(bytes: &[u8], writer: &mut W) -> Result<()> {
    (bytes.len() as u32).serialize(writer)?;
    writer.write_all(bytes)?;
    for _ in 0..word_padding(bytes.len()) {
        writer.write_u8(0)?;
    }
    Ok(())
}

/// Read bytes written by [`write_padded_bytes`]
pub fn read_padded_bytes<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Vec<u8>, Error> {
    let len = u32::deserialize(reader)? as usize;
    // The length is untrusted: only buffer what is actually there
    let mut bytes = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() < len {
        return Err(Error::UnexpectedEof);
    }
    for _ in 0..word_padding(len) {
        reader.read_u8()?;
    }
    Ok(bytes)
}

impl Serialize for String {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        write_padded_bytes(self.as_bytes(), writer)
    }
}

impl Deserialize for String {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        Ok(String::from_utf8(read_padded_bytes(reader)?)?)
    }
}

/// Size in `u32` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u32).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let len = u32::deserialize(reader)?;
        let mut elems = vec![];
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Decode a buffer as little-endian words, zero-padding a trailing partial word
pub fn buffer_words(buffer: &[u8]) -> Vec<i32> {
    buffer
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            LittleEndian::read_i32(&word)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding() {
        assert_eq!(word_padding(0), 0);
        assert_eq!(word_padding(1), 3);
        assert_eq!(word_padding(3), 1);
        assert_eq!(word_padding(4), 0);
    }

    #[test]
    fn strings_stay_word_aligned() {
        let mut bytes = vec![];
        String::from("hello").serialize(&mut bytes).unwrap();
        assert_eq!(bytes, b"\x05\x00\x00\x00hello\x00\x00\x00");

        let read_back = String::deserialize(&mut &bytes[..]).unwrap();
        assert_eq!(read_back, "hello");
    }

    #[test]
    fn words_from_bytes() {
        assert_eq!(buffer_words(&[1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]), vec![1, -1]);
        assert_eq!(buffer_words(&[2, 1]), vec![0x0102]);
        assert!(buffer_words(&[]).is_empty());
    }

    #[test]
    fn truncated_input() {
        let bytes = [3u8, 0, 0, 0, 1, 0, 0, 0];
        assert!(matches!(
            Vec::<i32>::deserialize(&mut &bytes[..]),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn oversized_byte_string() {
        let bytes = [0xffu8, 0xff, 0xff, 0xff, b'h', b'i', 0, 0];
        assert!(matches!(
            read_padded_bytes(&mut &bytes[..]),
            Err(Error::UnexpectedEof)
        ));
        assert!(matches!(
            String::deserialize(&mut &bytes[..]),
            Err(Error::UnexpectedEof)
        ));
    }
}
