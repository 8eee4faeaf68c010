//! Utilities for writing C++-style (curly blocks + indented) source code.

use std::fmt::{Result, Write};

/// Simplified utility to facilitate writing pretty-printed C++ code with block indentation around
/// curly braces.
pub struct CppWriter<W: Write> {
    /// How many blocks have been opened but not closed? This determines how indented new lines
    /// should be.
    open_blocks: usize,

    /// Is there a line already in progress?
    line_in_progress: bool,

    /// Inner writer
    inner: W,
}

/// Indentation aware writer
///
/// Automatically adds indentation after newlines in the text written. This does _not_ have special
/// handling for detecting curly braces (those will get written out literally).
impl<W: Write> Write for CppWriter<W> {
    fn write_str(&mut self, s: &str) -> Result {
        for line in s.split_inclusive('\n') {
            if line != "\n" {
                self.ensure_line_indented()?;
            }
            self.inner.write_str(line)?;
            self.line_in_progress = !line.ends_with('\n');
        }
        Ok(())
    }
}

impl<W: Write> CppWriter<W> {
    pub fn new(inner: W) -> CppWriter<W> {
        CppWriter {
            open_blocks: 0,
            line_in_progress: false,
            inner,
        }
    }

    /// If we are on a fresh line, make sure the indent is present
    fn ensure_line_indented(&mut self) -> Result {
        if !self.line_in_progress {
            for _ in 0..self.open_blocks {
                self.inner.write_str("    ")?;
            }
            self.line_in_progress = true;
        }
        Ok(())
    }

    /// Start a new line
    pub fn newline(&mut self) -> Result {
        self.inner.write_str("\n")?;
        self.line_in_progress = false;
        Ok(())
    }

    /// Open a new curly brace block
    ///
    /// If we were mid line, this tacks on a ` {` to the current line then opens a new line.
    pub fn open_curly_block(&mut self) -> Result {
        if self.line_in_progress {
            write!(self, " ")?;
        }
        writeln!(self, "{{")?;
        self.open_blocks += 1;
        Ok(())
    }

    /// Close a curly brace block
    ///
    /// This will put the `}` on a fresh line (and put another new line after that).
    pub fn close_curly_block(&mut self) -> Result {
        assert!(self.open_blocks > 0, "no blocks to close");
        if self.line_in_progress {
            self.newline()?;
        }
        self.open_blocks -= 1;
        writeln!(self, "}}")?;
        Ok(())
    }

    /// Close a curly brace block that ends a declaration (eg. an array initializer)
    ///
    /// Same as [`Self::close_curly_block`], but the `}` is followed by a `;`.
    pub fn close_curly_declaration(&mut self) -> Result {
        assert!(self.open_blocks > 0, "no blocks to close");
        if self.line_in_progress {
            self.newline()?;
        }
        self.open_blocks -= 1;
        writeln!(self, "}};")?;
        Ok(())
    }

    /// Finish writing and hand back the inner writer
    pub fn into_inner(self) -> W {
        assert_eq!(self.open_blocks, 0, "un-closed blocks remain");
        self.inner
    }
}
