use super::{scan_blocks, BlockArena, BlockGenerator, BlockId, Corruption, Error, Settings};
use crate::bytecode::binary_format::buffer_words;
use crate::bytecode::BytecodeContainer;
use crate::util::CppWriter;
use std::fmt::Write;

/// Result of translating one program
#[derive(Debug)]
pub struct Translation {
    /// Generated C++ unit
    pub source: String,

    /// Number of blocks declared
    pub blocks: usize,

    /// Set when translation stopped on corrupt input
    ///
    /// The source then ends with a diagnostic comment and is not a usable program.
    pub corruption: Option<Corruption>,
}

impl Translation {
    pub fn is_usable(&self) -> bool {
        self.corruption.is_none()
    }
}

/// Main entry point for translating a bytecode program into a C++ unit
pub struct ProgramTranslator<'a, C: BytecodeContainer + ?Sized> {
    settings: &'a Settings,
    container: &'a C,
}

impl<'a, C: BytecodeContainer + ?Sized> ProgramTranslator<'a, C> {
    pub fn new(settings: &'a Settings, container: &'a C) -> ProgramTranslator<'a, C> {
        ProgramTranslator {
            settings,
            container,
        }
    }

    /// Translate the whole program
    ///
    /// Corrupt input is not an `Err`: the output is cut short right after the declarations found
    /// so far and [`Translation::corruption`] says why.
    pub fn translate(&self) -> Result<Translation, Error> {
        self.settings.validate()?;
        let mut out = CppWriter::new(String::new());

        self.write_preamble(&mut out)?;

        let scan = scan_blocks(self.container);
        self.write_declarations(&mut out, &scan.blocks)?;

        let start = match (scan.start, scan.corruption) {
            (Some(start), None) => start,
            (_, corruption) => {
                let corruption = corruption.unwrap_or(Corruption::MissingEntryJump);
                return cut_short(out, scan.blocks.len(), corruption);
            }
        };

        // Block operands are only checked while generating, so keep the bodies aside until then
        let mut bodies = CppWriter::new(String::new());
        let generated =
            BlockGenerator::new(self.settings, self.container, &scan.blocks, &mut bodies)
                .generate();
        match generated {
            Ok(count) => {
                debug_assert_eq!(count, scan.blocks.len(), "every declared block gets a body");
            }
            Err(Error::CorruptBytecode(corruption)) => {
                log::error!("Corrupt operand while writing block bodies: {:?}", corruption);
                return cut_short(out, scan.blocks.len(), corruption);
            }
            Err(err) => return Err(err),
        }
        writeln!(out)?;
        out.write_str(&bodies.into_inner())?;

        self.write_bytecode_table(&mut out)?;
        self.write_entry_point(&mut out, start)?;

        log::debug!(
            "Translated {} blocks starting at {:?}",
            scan.blocks.len(),
            start
        );
        Ok(Translation {
            source: out.into_inner(),
            blocks: scan.blocks.len(),
            corruption: None,
        })
    }

    fn write_preamble<W: Write>(&self, out: &mut CppWriter<W>) -> Result<(), Error> {
        for include in &self.settings.includes {
            writeln!(out, "#include \"{}\"", include)?;
        }
        writeln!(out)?;

        if let Some(guard) = &self.settings.compiled_mode_macro {
            writeln!(out, "#ifndef {}", guard)?;
            writeln!(out, "    #error {} must be set for the entire code base.", guard)?;
            writeln!(out, "#endif")?;
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_declarations<W: Write>(
        &self,
        out: &mut CppWriter<W>,
        blocks: &BlockArena,
    ) -> Result<(), Error> {
        let context_type = self.settings.qualified_context_type();
        for block in blocks.ids() {
            writeln!(
                out,
                "static void *{}({} &{});",
                self.settings.block_name(*block),
                context_type,
                self.settings.context_param,
            )?;
        }
        Ok(())
    }

    /// Embed the original buffer, word for word
    fn write_bytecode_table<W: Write>(&self, out: &mut CppWriter<W>) -> Result<(), Error> {
        let words = buffer_words(self.container.raw_buffer());
        log::debug!("Embedding {} words of bytecode", words.len());

        writeln!(out)?;
        write!(out, "static const int {}[] =", self.settings.bytecode_table_name)?;
        out.newline()?;
        out.open_curly_block()?;
        for line in words.chunks(self.settings.words_per_line.max(1)) {
            for (idx, word) in line.iter().enumerate() {
                if idx > 0 {
                    write!(out, " ")?;
                }
                write!(out, "{},", word)?;
            }
            out.newline()?;
        }
        out.close_curly_declaration()?;
        Ok(())
    }

    fn write_entry_point<W: Write>(
        &self,
        out: &mut CppWriter<W>,
        start: BlockId,
    ) -> Result<(), Error> {
        writeln!(out)?;
        write!(out, "int main(int argc, char *argv[])")?;
        out.open_curly_block()?;
        writeln!(
            out,
            "return {}(argc, argv, {}, {});",
            self.settings.bootstrap_function,
            self.settings.block_name(start),
            self.settings.bytecode_table_name,
        )?;
        out.close_curly_block()?;
        Ok(())
    }
}

/// End the output right after the declarations, with a diagnostic comment
fn cut_short(
    mut out: CppWriter<String>,
    blocks: usize,
    corruption: Corruption,
) -> Result<Translation, Error> {
    writeln!(out, "// Corrupt bytecode starts here: {}", corruption)?;
    Ok(Translation {
        source: out.into_inner(),
        blocks,
        corruption: Some(corruption),
    })
}

/// Translate a program with the given settings
pub fn translate<C: BytecodeContainer + ?Sized>(
    settings: &Settings,
    container: &C,
) -> Result<Translation, Error> {
    ProgramTranslator::new(settings, container).translate()
}
