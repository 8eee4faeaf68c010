use super::{resolve_operands, Corruption};
use crate::bytecode::{BytecodeContainer, Opcode};
use std::collections::btree_map::{BTreeMap, Keys};
use std::convert::TryFrom;
use std::fmt;

/// Offset of the first instruction after the entry jump
pub const FIRST_INSTRUCTION: usize = 2;

/// A block, identified by the offset of its first instruction
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BlockId(pub usize);

impl BlockId {
    /// Block referred to by an operand (eg. a jump target)
    pub fn from_operand(value: i32) -> Option<BlockId> {
        usize::try_from(value).ok().map(BlockId)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("b{}", self.0))
    }
}

/// What the scan learned about a block
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BlockDescriptor {
    /// First instruction of the block
    pub first_opcode: Opcode,

    /// Number of instructions in the block
    pub instructions: usize,
}

/// All blocks of a program, keyed by their offset
#[derive(Debug, Default)]
pub struct BlockArena {
    blocks: BTreeMap<BlockId, BlockDescriptor>,
}

impl BlockArena {
    pub fn new() -> BlockArena {
        BlockArena {
            blocks: BTreeMap::new(),
        }
    }

    /// Does a block start here?
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains_key(&block)
    }

    pub fn get(&self, block: BlockId) -> Option<&BlockDescriptor> {
        self.blocks.get(&block)
    }

    /// Blocks in ascending offset order
    pub fn ids(&self) -> Keys<'_, BlockId, BlockDescriptor> {
        self.blocks.keys()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn insert(&mut self, block: BlockId, first_opcode: Opcode) {
        self.blocks.insert(
            block,
            BlockDescriptor {
                first_opcode,
                instructions: 0,
            },
        );
    }
}

/// Outcome of scanning the instruction stream for blocks
#[derive(Debug)]
pub struct BlockScan {
    /// Block the entry jump targets (absent if the stream has no entry jump)
    pub start: Option<BlockId>,

    /// Every block found before the scan stopped
    pub blocks: BlockArena,

    /// Set if the scan stopped early on corrupt input
    pub corruption: Option<Corruption>,
}

/// Scan the whole instruction stream, recording every block boundary
///
/// Each instruction is decoded exactly once, looking only at its operand layout. The scan stops at
/// the first corrupt instruction, keeping the blocks found before it.
pub fn scan_blocks<C: BytecodeContainer + ?Sized>(container: &C) -> BlockScan {
    let code = container.code();
    let mut blocks = BlockArena::new();

    let start = match code {
        [jump, target, ..] if *jump == Opcode::Jump as i32 => BlockId::from_operand(*target),
        _ => None,
    };
    let start = match start {
        Some(start) => start,
        None => {
            log::error!("Bytecode does not start with a jump to the first block");
            return BlockScan {
                start: None,
                blocks,
                corruption: Some(Corruption::MissingEntryJump),
            };
        }
    };

    let mut current = None;
    let mut cursor = FIRST_INSTRUCTION;
    while cursor < code.len() {
        let offset = cursor;
        let opcode = match Opcode::try_from(code[offset]) {
            Ok(opcode) => opcode,
            Err(bad) => {
                log::error!("Corrupt opcode {} at offset {}", bad.0, offset);
                return BlockScan {
                    start: Some(start),
                    blocks,
                    corruption: Some(Corruption::BadOpcode {
                        offset,
                        value: bad.0,
                    }),
                };
            }
        };

        if container.is_block_start(offset) {
            log::trace!("Block starts at {} with {}", offset, opcode);
            blocks.insert(BlockId(offset), opcode);
            current = Some(BlockId(offset));
        }
        if let Some(block) = current {
            if let Some(descriptor) = blocks.blocks.get_mut(&block) {
                descriptor.instructions += 1;
            }
        }

        match resolve_operands(code, opcode, offset + 1) {
            Ok(span) => cursor = span.next,
            Err(corruption) => {
                log::error!("Corrupt {} instruction at offset {}", opcode, offset);
                return BlockScan {
                    start: Some(start),
                    blocks,
                    corruption: Some(corruption),
                };
            }
        }
    }

    if !blocks.contains(start) {
        log::warn!("Entry jump targets {:?}, which does not start a block", start);
    }
    log::debug!("Found {} blocks", blocks.len());

    BlockScan {
        start: Some(start),
        blocks,
        corruption: None,
    }
}
