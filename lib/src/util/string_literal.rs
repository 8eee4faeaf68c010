use std::fmt::{Display, Formatter, Result, Write};

/// Wrapper struct whose [`Display`] implementation renders as a C++ string literal
///
/// The literal never contains `*/`, so it can also be dropped into a block comment.
pub struct CppStringLiteral<'a>(pub &'a str);

impl Display for CppStringLiteral<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_char('"')?;
        let mut previous = None;
        let mut utf8 = [0; 4];
        for c in self.0.chars() {
            match c {
                '\t' => f.write_str("\\t")?,
                '\r' => f.write_str("\\r")?,
                '\n' => f.write_str("\\n")?,
                '\\' | '\'' | '"' => {
                    f.write_char('\\')?;
                    f.write_char(c)?;
                }
                '/' if previous == Some('*') => f.write_str("\\057")?,
                '\x20'..='\x7e' => f.write_char(c)?,
                _ => {
                    // Octal escapes stop after three digits, unlike `\x` escapes
                    for byte in c.encode_utf8(&mut utf8).bytes() {
                        f.write_fmt(format_args!("\\{:03o}", byte))?;
                    }
                }
            }
            previous = Some(c);
        }
        f.write_char('"')
    }
}
