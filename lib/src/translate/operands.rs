use super::Corruption;
use crate::bytecode::{Opcode, OperandLayout};
use std::convert::TryFrom;

/// Where the operands of one instruction sit in the instruction stream
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OperandSpan {
    /// Offset of the first operand (right after the opcode)
    pub start: usize,

    /// Offset of the next instruction
    pub next: usize,

    /// Number of operand words the instruction reports
    pub arity: usize,
}

impl OperandSpan {
    /// The operand words
    ///
    /// For every layout but [`OperandLayout::CallMulti`], this is exactly `start..next`. A
    /// multi-dispatch call reports one more word than it occupies, so its window extends into
    /// the following instruction (clamped to the end of the stream).
    pub fn words<'c>(&self, code: &'c [i32]) -> &'c [i32] {
        let end = (self.start + self.arity).min(code.len());
        &code[self.start.min(end)..end]
    }
}

/// Determine the operands of the instruction whose opcode was read just before `cursor`
///
/// This is a pure function of its inputs: both passes over the stream call it with the same
/// arguments and get the same span back.
pub fn resolve_operands(
    code: &[i32],
    opcode: Opcode,
    cursor: usize,
) -> Result<OperandSpan, Corruption> {
    let mut reader = WordReader { code, cursor };

    let arity = match opcode.layout() {
        OperandLayout::Fixed(arity) => {
            reader.skip(arity as usize)?;
            arity as usize
        }

        OperandLayout::Coroutine => {
            reader.skip(2)?;
            let captures = reader.read_count()?;
            reader.skip(captures)?;
            captures + 3
        }

        OperandLayout::CallMulti => {
            reader.skip(1)?;
            let table_offset = reader.cursor;
            let table = reader.read_count()?;
            let nargs = match table.checked_add(2).and_then(|idx| code.get(idx)) {
                Some(&nargs) => usize::try_from(nargs).map_err(|_| Corruption::BadOperand {
                    offset: table + 2,
                    value: nargs,
                })?,
                None => {
                    return Err(Corruption::Truncated {
                        offset: table_offset,
                    })
                }
            };
            reader.skip(1)?;
            reader.skip(nargs)?;
            nargs + 4
        }

        OperandLayout::FunStart => {
            let params = reader.read_count()?;
            reader.skip(params)?;
            let locals = reader.read_count()?;
            reader.skip(locals)?;
            reader.skip(1)?;
            params + locals + 3
        }

        OperandLayout::FunMulti => {
            let cases = reader.read_count()?;
            let nargs = reader.read_count()?;
            let table_size = nargs
                .checked_add(1)
                .and_then(|case_size| case_size.checked_mul(cases))
                .ok_or(Corruption::Truncated { offset: cursor })?;
            reader.skip(table_size)?;
            table_size + 2
        }
    };

    Ok(OperandSpan {
        start: cursor,
        next: reader.cursor,
        arity,
    })
}

/// Bounds checked cursor over the instruction stream
struct WordReader<'c> {
    code: &'c [i32],
    cursor: usize,
}

impl<'c> WordReader<'c> {
    fn skip(&mut self, words: usize) -> Result<(), Corruption> {
        match self.cursor.checked_add(words) {
            Some(next) if next <= self.code.len() => {
                self.cursor = next;
                Ok(())
            }
            _ => Err(Corruption::Truncated {
                offset: self.cursor,
            }),
        }
    }

    /// Read a word that counts (or locates) other words
    fn read_count(&mut self) -> Result<usize, Corruption> {
        let offset = self.cursor;
        let value = *self
            .code
            .get(offset)
            .ok_or(Corruption::Truncated { offset })?;
        self.cursor += 1;
        usize::try_from(value).map_err(|_| Corruption::BadOperand { offset, value })
    }
}
