use super::binary_format::{read_padded_bytes, write_padded_bytes, Deserialize, Serialize};
use super::{BytecodeContainer, Error, InstructionAttrs};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;

/// First four bytes of every bytecode file
pub const MAGIC: [u8; 4] = *b"LBCF";

/// Only supported file format version
pub const VERSION: u32 = 1;

/// Entry in the function table
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FunctionInfo {
    /// Human readable name
    pub name: String,

    /// Offset of the function's `FUNSTART` in the instruction stream
    pub bytecode_start: i32,
}

impl Serialize for FunctionInfo {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.bytecode_start.serialize(writer)?;
        self.name.serialize(writer)
    }
}

impl Deserialize for FunctionInfo {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let bytecode_start = i32::deserialize(reader)?;
        let name = String::deserialize(reader)?;
        Ok(FunctionInfo {
            name,
            bytecode_start,
        })
    }
}

/// Everything stored in a bytecode file
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Sections {
    pub code: Vec<i32>,

    /// Attributes, indexed by instruction offset (missing trailing entries are empty)
    pub attrs: Vec<InstructionAttrs>,

    pub functions: Vec<FunctionInfo>,
    pub strings: Vec<String>,
    pub identifiers: Vec<String>,

    /// Names of the built-in functions that `BCALL*` instructions index into
    pub builtins: Vec<String>,
}

impl Sections {
    /// Mark block starts at each of these offsets
    pub fn split_at(mut self, offsets: &[usize]) -> Sections {
        for &offset in offsets {
            if self.attrs.len() <= offset {
                self.attrs.resize(offset + 1, InstructionAttrs::empty());
            }
            self.attrs[offset] |= InstructionAttrs::SPLIT;
        }
        self
    }

    /// Write out the file
    ///
    /// Layout (every field is little-endian, every section is word aligned):
    ///
    /// ```text,ignore,no_run
    /// magic    "LBCF"
    /// version  u32
    /// code     u32 length, i32 words
    /// attrs    u32 length, attribute bytes, padding
    /// functions, strings, identifiers, builtins
    /// ```
    pub fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&MAGIC)?;
        VERSION.serialize(writer)?;
        self.code.serialize(writer)?;
        let attr_bytes: Vec<u8> = self.attrs.iter().map(|attr| attr.bits()).collect();
        write_padded_bytes(&attr_bytes, writer)?;
        self.functions.serialize(writer)?;
        self.strings.serialize(writer)?;
        self.identifiers.serialize(writer)?;
        self.builtins.serialize(writer)
    }

    /// Read back a file written by [`Sections::serialize`]
    pub fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Sections, Error> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = u32::deserialize(reader)?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let code = Vec::<i32>::deserialize(reader)?;
        let attrs = read_padded_bytes(reader)?
            .into_iter()
            .map(InstructionAttrs::from_bits_truncate)
            .collect();
        let functions = Vec::<FunctionInfo>::deserialize(reader)?;
        let strings = Vec::<String>::deserialize(reader)?;
        let identifiers = Vec::<String>::deserialize(reader)?;
        let builtins = Vec::<String>::deserialize(reader)?;

        Ok(Sections {
            code,
            attrs,
            functions,
            strings,
            identifiers,
            builtins,
        })
    }
}

/// Bytecode file kept alongside the exact bytes it was read from
pub struct BytecodeFile {
    sections: Sections,
    raw: Vec<u8>,

    /// Function table index keyed by `bytecode_start`
    function_lookup: HashMap<usize, usize>,
}

impl BytecodeFile {
    /// Parse a bytecode file, keeping the original bytes
    pub fn parse(bytes: &[u8]) -> Result<BytecodeFile, Error> {
        let mut reader = bytes;
        let sections = Sections::deserialize(&mut reader)?;
        if !reader.is_empty() {
            log::warn!("Ignoring {} trailing bytes in bytecode file", reader.len());
        }
        Ok(BytecodeFile::with_raw(sections, bytes.to_vec()))
    }

    /// Build a file in memory (the raw buffer is the serialized form of `sections`)
    pub fn from_sections(sections: Sections) -> BytecodeFile {
        let mut raw = vec![];
        sections
            .serialize(&mut raw)
            .expect("writing into a `Vec` cannot fail");
        BytecodeFile::with_raw(sections, raw)
    }

    fn with_raw(sections: Sections, raw: Vec<u8>) -> BytecodeFile {
        let function_lookup = sections
            .functions
            .iter()
            .enumerate()
            .filter_map(|(idx, func)| {
                usize::try_from(func.bytecode_start)
                    .ok()
                    .map(|start| (start, idx))
            })
            .collect();
        BytecodeFile {
            sections,
            raw,
            function_lookup,
        }
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }
}

impl BytecodeContainer for BytecodeFile {
    fn code(&self) -> &[i32] {
        &self.sections.code
    }

    fn attrs(&self, offset: usize) -> InstructionAttrs {
        self.sections
            .attrs
            .get(offset)
            .copied()
            .unwrap_or_else(InstructionAttrs::empty)
    }

    fn function_at(&self, offset: usize) -> Option<&str> {
        let idx = *self.function_lookup.get(&offset)?;
        self.function_name(idx)
    }

    fn function_name(&self, index: usize) -> Option<&str> {
        self.sections.functions.get(index).map(|f| f.name.as_str())
    }

    fn string(&self, index: usize) -> Option<&str> {
        self.sections.strings.get(index).map(String::as_str)
    }

    fn identifier(&self, index: usize) -> Option<&str> {
        self.sections.identifiers.get(index).map(String::as_str)
    }

    fn builtin_name(&self, index: usize) -> Option<&str> {
        self.sections.builtins.get(index).map(String::as_str)
    }

    fn raw_buffer(&self) -> &[u8] {
        &self.raw
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Sections {
        Sections {
            code: vec![0, 1, -2, 3],
            functions: vec![FunctionInfo {
                name: String::from("main"),
                bytecode_start: 2,
            }],
            strings: vec![String::from("hi")],
            identifiers: vec![String::from("x"), String::from("counter")],
            builtins: vec![String::from("print"), String::from("resume")],
            ..Sections::default()
        }
        .split_at(&[2, 3])
    }

    #[test]
    fn parse_keeps_original_bytes() {
        let file = BytecodeFile::from_sections(sample());
        let parsed = BytecodeFile::parse(file.raw_buffer()).unwrap();
        assert_eq!(parsed.sections(), &sample());
        assert_eq!(parsed.raw_buffer(), file.raw_buffer());
        assert_eq!(parsed.raw_buffer().len() % 4, 0);
    }

    #[test]
    fn accessors() {
        let file = BytecodeFile::from_sections(sample());
        assert_eq!(file.code(), &[0, 1, -2, 3]);
        assert!(!file.is_block_start(0));
        assert!(file.is_block_start(2));
        assert!(file.is_block_start(3));
        assert!(!file.is_block_start(100));
        assert_eq!(file.function_at(2), Some("main"));
        assert_eq!(file.function_at(3), None);
        assert_eq!(file.function_name(0), Some("main"));
        assert_eq!(file.string(0), Some("hi"));
        assert_eq!(file.identifier(1), Some("counter"));
        assert_eq!(file.builtin_name(1), Some("resume"));
        assert_eq!(file.builtin_name(2), None);
    }

    #[test]
    fn bad_header() {
        assert!(matches!(
            BytecodeFile::parse(b"NOPE\x01\x00\x00\x00"),
            Err(Error::BadMagic(magic)) if &magic == b"NOPE"
        ));
        assert!(matches!(
            BytecodeFile::parse(b"LBCF\x02\x00\x00\x00"),
            Err(Error::UnsupportedVersion(2))
        ));
        assert!(matches!(
            BytecodeFile::parse(b"LBCF\x01\x00\x00\x00\x05\x00\x00\x00"),
            Err(Error::UnexpectedEof)
        ));
    }
}
