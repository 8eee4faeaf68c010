use super::{
    resolve_operands, BlockArena, BlockId, Corruption, Error, OperandSpan, Settings,
    FIRST_INSTRUCTION,
};
use crate::bytecode::{
    Annotation, BytecodeContainer, Category, Continuation, Disposition, LvalOp, Opcode,
};
use crate::util::{CppStringLiteral, CppWriter};
use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt::Write;

/// Context for writing out the body of every block
///
/// Blocks are written in the order they appear in the instruction stream. A block is opened at
/// every offset the scan recorded in the [`BlockArena`] and closed just before the next one (or at
/// the end of the stream), so every block body is a straight-line sequence of handler calls that
/// ends by returning the next block to run.
pub struct BlockGenerator<'a, 'w, C: BytecodeContainer + ?Sized, W: Write> {
    settings: &'a Settings,
    container: &'a C,
    blocks: &'a BlockArena,
    out: &'w mut CppWriter<W>,

    /// Block whose body is currently open
    current: Option<BlockId>,

    /// Has the current block already returned unconditionally?
    terminated: bool,
}

impl<'a, 'w, C, W> BlockGenerator<'a, 'w, C, W>
where
    C: BytecodeContainer + ?Sized,
    W: Write,
{
    pub fn new(
        settings: &'a Settings,
        container: &'a C,
        blocks: &'a BlockArena,
        out: &'w mut CppWriter<W>,
    ) -> BlockGenerator<'a, 'w, C, W> {
        BlockGenerator {
            settings,
            container,
            blocks,
            out,
            current: None,
            terminated: false,
        }
    }

    /// Write every block body, returning how many were written
    ///
    /// This expects a stream that [`super::scan_blocks`] went over without finding corruption.
    pub fn generate(&mut self) -> Result<usize, Error> {
        let container = self.container;
        let code = container.code();
        let mut bodies = 0;

        let mut cursor = FIRST_INSTRUCTION;
        while cursor < code.len() {
            let offset = cursor;
            let opcode = Opcode::try_from(code[offset]).map_err(|bad| Corruption::BadOpcode {
                offset,
                value: bad.0,
            })?;

            if opcode == Opcode::FunStart {
                self.write_function_label(offset)?;
            }
            if self.blocks.contains(BlockId(offset)) {
                self.open_block(BlockId(offset))?;
                bodies += 1;
            }

            let span = resolve_operands(code, opcode, offset + 1)?;
            match self.current {
                Some(block) => self.write_instruction(block, offset, opcode, &span)?,
                None => log::warn!("Skipping unreachable {} at offset {}", opcode, offset),
            }

            cursor = span.next;
            let at_end = cursor >= code.len();
            if self.current.is_some() && (at_end || self.blocks.contains(BlockId(cursor))) {
                self.close_block(opcode, BlockId(cursor), at_end)?;
            }
        }

        log::debug!("Wrote {} block bodies", bodies);
        Ok(bodies)
    }

    /// Name the function starting here, if it has one
    fn write_function_label(&mut self, offset: usize) -> Result<(), Error> {
        writeln!(self.out)?;
        if let Some(name) = self.container.function_at(offset) {
            writeln!(self.out, "// {}", comment_safe(name))?;
        }
        Ok(())
    }

    fn open_block(&mut self, block: BlockId) -> Result<(), Error> {
        if let Some(descriptor) = self.blocks.get(block) {
            log::trace!(
                "Opening {:?}: {} instructions starting with {}",
                block,
                descriptor.instructions,
                descriptor.first_opcode
            );
        }
        write!(
            self.out,
            "static void *{}({} &{})",
            self.settings.block_name(block),
            self.settings.qualified_context_type(),
            self.settings.context_param,
        )?;
        self.out.open_curly_block()?;
        self.current = Some(block);
        self.terminated = false;
        Ok(())
    }

    /// Close the current block, falling through into `next` unless it already returned
    fn close_block(&mut self, last: Opcode, next: BlockId, at_end: bool) -> Result<(), Error> {
        if !self.terminated {
            if last == Opcode::Exit {
                writeln!(self.out, "return nullptr;")?;
            } else if at_end {
                log::debug!("Last block falls off the end of the program");
                writeln!(self.out, "return nullptr;")?;
            } else {
                let transfer = self.transfer(next);
                writeln!(self.out, "return {};", transfer)?;
            }
        }
        self.out.close_curly_block()?;
        self.current = None;
        Ok(())
    }

    fn write_instruction(
        &mut self,
        block: BlockId,
        offset: usize,
        opcode: Opcode,
        span: &OperandSpan,
    ) -> Result<(), Error> {
        let container = self.container;
        let args = span.words(container.code());
        log::trace!("{:?}: {} {:?}", block, opcode, args);

        match opcode.category() {
            Category::Jump => {
                let transfer = self.transfer(self.operand_block(span, args, 0)?);
                writeln!(self.out, "return {};", transfer)?;
                self.terminated = true;
            }
            Category::ConditionalJump => {
                let transfer = self.transfer(self.operand_block(span, args, 0)?);
                writeln!(
                    self.out,
                    "if ({}.{}{}()) return {};",
                    self.settings.context_param,
                    self.settings.handler_prefix,
                    opcode.name(),
                    transfer,
                )?;
            }
            category => {
                let line = self.handler_call(block, offset, opcode, category, span, args)?;
                writeln!(self.out, "{}", line)?;
            }
        }
        Ok(())
    }

    /// Render the call to the handler of a non-jump instruction, as one line
    fn handler_call(
        &mut self,
        block: BlockId,
        offset: usize,
        opcode: Opcode,
        category: Category,
        span: &OperandSpan,
        args: &[i32],
    ) -> Result<String, Error> {
        let mut line = String::from("{ ");

        if !args.is_empty() {
            write!(line, "static const int args[] = {{{}}}; ", join(args))?;
        }

        if category == Category::FunMulti {
            let entries = self.dispatch_table(span, args)?;
            write!(
                line,
                "static {} mmtable[] = {{{}}}; {} = mmtable; ",
                self.settings.qualified_block_type(),
                entries.join(", "),
                self.slot(&self.settings.next_mm_table_slot),
            )?;
        } else if category == Category::Builtin && self.is_resume(args) {
            write!(
                line,
                "{} = {}; ",
                self.slot(&self.settings.next_call_target_slot),
                self.block_ref(BlockId(span.next)),
            )?;
        }

        write!(
            line,
            "{}.{}{}({}",
            self.settings.context_param,
            self.settings.handler_prefix,
            opcode.name(),
            if args.is_empty() { "nullptr" } else { "args" },
        )?;
        let continuation = match category.continuation() {
            Continuation::None => None,
            Continuation::NextBlock => Some(BlockId(span.next)),
            Continuation::CurrentBlock => Some(block),
            Continuation::FirstOperand => Some(self.operand_block(span, args, 0)?),
        };
        if let Some(continuation) = continuation {
            write!(line, ", {}", self.block_ref(continuation))?;
        }
        line.push_str(");");

        if let Some(annotation) = self.annotation(opcode, args) {
            write!(line, " /* {} */", annotation)?;
        }

        match category.disposition() {
            Disposition::FallThrough => (),
            Disposition::StaticTarget(idx) => {
                let target = self.operand_block(span, args, idx)?;
                write!(line, " return {};", self.transfer(target))?;
                self.terminated = true;
            }
            Disposition::RuntimeTarget => {
                let slot = self.slot(&self.settings.next_call_target_slot);
                write!(line, " return (void *){};", slot)?;
                self.terminated = true;
            }
            Disposition::GuardedRuntimeTarget => {
                let slot = self.slot(&self.settings.next_call_target_slot);
                write!(line, " if ({}) return (void *){};", slot, slot)?;
            }
        }

        log::trace!("{} at offset {} written", opcode, offset);
        line.push_str(" }");
        Ok(line)
    }

    /// Block addresses of a `FUNMULTI` table, one per case
    ///
    /// Each case is `nargs` type tags followed by the offset of the case's body.
    fn dispatch_table(&self, span: &OperandSpan, args: &[i32]) -> Result<Vec<String>, Error> {
        let count = |idx: usize| -> Result<usize, Corruption> {
            let value = *args.get(idx).ok_or(Corruption::Truncated {
                offset: span.start + idx,
            })?;
            usize::try_from(value).map_err(|_| Corruption::BadOperand {
                offset: span.start + idx,
                value,
            })
        };
        let cases = count(0)?;
        let nargs = count(1)?;

        (0..cases)
            .map(|case| -> Result<String, Error> {
                let target = self.operand_block(span, args, 2 + (nargs + 1) * case + nargs)?;
                Ok(self.block_ref(target))
            })
            .collect()
    }

    /// Is this built-in call resuming a coroutine?
    fn is_resume(&self, args: &[i32]) -> bool {
        args.first()
            .and_then(|idx| usize::try_from(*idx).ok())
            .and_then(|idx| self.container.builtin_name(idx))
            .map_or(false, |name| name == self.settings.resume_builtin)
    }

    /// Human readable note about the instruction
    fn annotation(&self, opcode: Opcode, args: &[i32]) -> Option<String> {
        let index = |idx: usize| args.get(idx).and_then(|arg| usize::try_from(*arg).ok());
        let container = self.container;

        match opcode.annotation() {
            Annotation::None => None,
            Annotation::Builtin => container
                .builtin_name(index(0)?)
                .map(|name| comment_safe(name).into_owned()),
            Annotation::Variable => container
                .identifier(index(0)?)
                .map(|name| comment_safe(name).into_owned()),
            Annotation::LvalVariable => {
                let op = LvalOp::from_operand(*args.first()?)?;
                let var = container.identifier(index(1)?)?;
                Some(format!("{} {}", op.name(), comment_safe(var)))
            }
            Annotation::StringLiteral => container
                .string(index(0)?)
                .map(|text| CppStringLiteral(text).to_string()),
            Annotation::Function => container
                .function_name(index(0)?)
                .map(|name| comment_safe(name).into_owned()),
        }
    }

    /// Block at an operand
    fn operand_block(
        &self,
        span: &OperandSpan,
        args: &[i32],
        idx: usize,
    ) -> Result<BlockId, Corruption> {
        let offset = span.start + idx;
        let value = *args.get(idx).ok_or(Corruption::Truncated { offset })?;
        BlockId::from_operand(value).ok_or(Corruption::BadOperand { offset, value })
    }

    /// Name of a block, as used in the generated code
    fn block_ref(&self, block: BlockId) -> String {
        if !self.blocks.contains(block) {
            log::warn!("Reference to {:?}, which does not start a block", block);
        }
        self.settings.block_name(block)
    }

    /// Expression that transfers control to a block
    fn transfer(&self, block: BlockId) -> String {
        format!("(void *){}", self.block_ref(block))
    }

    /// Expression for a slot on the runtime state
    fn slot(&self, name: &str) -> String {
        format!("{}.{}", self.settings.context_param, name)
    }
}

/// Comma separated words
fn join(words: &[i32]) -> String {
    words
        .iter()
        .map(|word| word.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Make sure text can't end the block comment it is placed in
fn comment_safe(text: &str) -> Cow<'_, str> {
    if text.contains("*/") {
        Cow::Owned(text.replace("*/", "* /"))
    } else {
        Cow::Borrowed(text)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::{BytecodeFile, FunctionInfo, Sections};
    use crate::translate::scan_blocks;

    fn op(opcode: Opcode) -> i32 {
        opcode as i32
    }

    fn bodies(sections: Sections) -> String {
        let file = BytecodeFile::from_sections(sections);
        let scan = scan_blocks(&file);
        assert_eq!(scan.corruption, None);
        let settings = Settings::new();
        let mut out = CppWriter::new(String::new());
        BlockGenerator::new(&settings, &file, &scan.blocks, &mut out)
            .generate()
            .unwrap();
        out.into_inner()
    }

    fn code(code: Vec<i32>, splits: &[usize]) -> Sections {
        Sections {
            code,
            ..Sections::default()
        }
        .split_at(splits)
    }

    #[test]
    fn jump_then_exit() {
        let out = bodies(code(
            vec![op(Opcode::Jump), 2, op(Opcode::Jump), 4, op(Opcode::Exit)],
            &[2, 4],
        ));
        assert_eq!(
            out,
            "static void *block2(lobster::VM &vm) {
    return (void *)block4;
}
static void *block4(lobster::VM &vm) {
    { vm.F_EXIT(nullptr); }
    return nullptr;
}
"
        );
    }

    #[test]
    fn conditional_jump_falls_through() {
        let out = bodies(code(
            vec![
                op(Opcode::Jump),
                2,
                op(Opcode::PushInt),
                7,
                op(Opcode::JumpFail),
                8,
                op(Opcode::Pop),
                op(Opcode::Pop),
                op(Opcode::Exit),
            ],
            &[2, 6, 8],
        ));
        assert_eq!(
            out,
            "static void *block2(lobster::VM &vm) {
    { static const int args[] = {7}; vm.F_PUSHINT(args); }
    if (vm.F_JUMPFAIL()) return (void *)block8;
    return (void *)block6;
}
static void *block6(lobster::VM &vm) {
    { vm.F_POP(nullptr); }
    { vm.F_POP(nullptr); }
    return (void *)block8;
}
static void *block8(lobster::VM &vm) {
    { vm.F_EXIT(nullptr); }
    return nullptr;
}
"
        );
    }

    #[test]
    fn calls_return_to_next_block() {
        let sections = Sections {
            functions: vec![
                FunctionInfo {
                    name: String::from("__top_level_expression"),
                    bytecode_start: 2,
                },
                FunctionInfo {
                    name: String::from("f"),
                    bytecode_start: 11,
                },
            ],
            ..code(
                vec![
                    op(Opcode::Jump),
                    2,
                    op(Opcode::Call), // 2
                    1,
                    11,
                    0,
                    op(Opcode::Exit), // 6
                    op(Opcode::Pop),  // 7
                    op(Opcode::CallV), // 8
                    op(Opcode::Exit), // 9
                    op(Opcode::Exit), // 10
                    op(Opcode::FunStart), // 11
                    0,
                    0,
                    0,
                    op(Opcode::FunEnd), // 15
                ],
                &[2, 6, 7, 9, 10, 11],
            )
        };
        let out = bodies(sections);
        assert!(out.contains(
            "{ static const int args[] = {1, 11, 0}; vm.F_CALL(args, block6); /* f */ return (void *)block11; }\n}\n"
        ));
        assert!(out.contains(
            "{ vm.F_CALLV(nullptr, block9); return (void *)vm.next_call_target; }\n}\n"
        ));
        assert!(out.contains("\n// f\nstatic void *block11(lobster::VM &vm) {\n"));
        assert!(out.contains(
            "{ static const int args[] = {0, 0, 0}; vm.F_FUNSTART(args); }\n    { vm.F_FUNEND(nullptr); return (void *)vm.next_call_target; }\n}\n"
        ));
    }

    #[test]
    fn loops_reenter_their_own_block() {
        let out = bodies(code(
            vec![
                op(Opcode::Jump),
                2,
                op(Opcode::PushInt),
                3,
                op(Opcode::IFor), // 4
                op(Opcode::Pop),
                op(Opcode::Exit),
            ],
            &[2, 4],
        ));
        assert!(out.contains(
            "static void *block4(lobster::VM &vm) {
    { vm.F_IFOR(nullptr, block4); if (vm.next_call_target) return (void *)vm.next_call_target; }
    { vm.F_POP(nullptr); }
    { vm.F_EXIT(nullptr); }
    return nullptr;
}
"
        ));
    }

    #[test]
    fn closures_and_coroutines_pass_their_body() {
        let out = bodies(code(
            vec![
                op(Opcode::Jump),
                2,
                op(Opcode::PushFun), // 2
                9,
                op(Opcode::Coro), // 4
                9,
                0,
                0,
                op(Opcode::Exit), // 8
                op(Opcode::FunEnd), // 9
            ],
            &[2, 9],
        ));
        assert!(out.contains("{ static const int args[] = {9}; vm.F_PUSHFUN(args, block9); }"));
        assert!(out.contains("{ static const int args[] = {9, 0, 0}; vm.F_CORO(args, block9); }"));
    }

    #[test]
    fn dispatch_table() {
        let out = bodies(code(
            vec![
                op(Opcode::Jump),
                2,
                op(Opcode::FunMulti), // 2
                2,
                1,
                5,
                9,
                6,
                10,
                op(Opcode::Exit), // 9
                op(Opcode::Exit), // 10
            ],
            &[2, 9, 10],
        ));
        assert!(out.contains(
            "{ static const int args[] = {2, 1, 5, 9, 6, 10}; static lobster::block_t mmtable[] = {block9, block10}; vm.next_mm_table = mmtable; vm.F_FUNMULTI(args); return (void *)vm.next_call_target; }"
        ));
    }

    #[test]
    fn resume_records_return_block() {
        let sections = Sections {
            builtins: vec![String::from("print"), String::from("resume")],
            ..code(
                vec![
                    op(Opcode::Jump),
                    2,
                    op(Opcode::BCall1), // 2
                    0,
                    op(Opcode::BCall2), // 4
                    1,
                    op(Opcode::Exit), // 6
                ],
                &[2, 6],
            )
        };
        let out = bodies(sections);
        assert!(out.contains("{ static const int args[] = {0}; vm.F_BCALL1(args); /* print */ }"));
        assert!(out.contains(
            "{ static const int args[] = {1}; vm.next_call_target = block6; vm.F_BCALL2(args); /* resume */ }"
        ));
    }

    #[test]
    fn annotations() {
        let sections = Sections {
            strings: vec![String::from("say \"hi\" */")],
            identifiers: vec![String::from("x"), String::from("total")],
            ..code(
                vec![
                    op(Opcode::Jump),
                    2,
                    op(Opcode::PushStr),
                    0,
                    op(Opcode::PushVar),
                    1,
                    op(Opcode::LvalVar),
                    3,
                    0,
                    op(Opcode::PushVarRef),
                    7,
                    op(Opcode::Exit),
                ],
                &[2],
            )
        };
        let out = bodies(sections);
        assert!(out.contains("vm.F_PUSHSTR(args); /* \"say \\\"hi\\\" *\\057\" */ }"));
        assert!(out.contains("vm.F_PUSHVAR(args); /* total */ }"));
        assert!(out.contains("vm.F_LVALVAR(args); /* PLUS x */ }"));
        assert!(out.contains("vm.F_PUSHVARREF(args); }"));
    }

    #[test]
    fn instructions_before_first_block_are_skipped() {
        let out = bodies(code(
            vec![op(Opcode::Jump), 3, op(Opcode::Pop), op(Opcode::Exit)],
            &[3],
        ));
        assert_eq!(
            out,
            "static void *block3(lobster::VM &vm) {
    { vm.F_EXIT(nullptr); }
    return nullptr;
}
"
        );
    }

    #[test]
    fn multi_dispatch_call() {
        let sections = Sections {
            functions: vec![FunctionInfo {
                name: String::from("g"),
                bytecode_start: 8,
            }],
            ..code(
                vec![
                    op(Opcode::Jump),
                    2,
                    op(Opcode::CallMulti), // 2
                    0,
                    8,
                    0,
                    3,
                    op(Opcode::Exit),     // 7
                    op(Opcode::FunMulti), // 8
                    1,
                    1,
                    3,
                    13,
                    op(Opcode::Exit), // 13
                ],
                &[2, 7, 8, 13],
            )
        };
        let out = bodies(sections);
        let expected = format!(
            "static void *block2(lobster::VM &vm) {{
    {{ static const int args[] = {{0, 8, 0, 3, {}}}; vm.F_CALLMULTI(args, block7); /* g */ return (void *)block8; }}
}}
static void *block7(lobster::VM &vm) {{
    {{ vm.F_EXIT(nullptr); }}
    return nullptr;
}}
static void *block8(lobster::VM &vm) {{
    {{ static const int args[] = {{1, 1, 3, 13}}; static lobster::block_t mmtable[] = {{block13}}; vm.next_mm_table = mmtable; vm.F_FUNMULTI(args); return (void *)vm.next_call_target; }}
}}
",
            op(Opcode::Exit)
        );
        assert!(out.starts_with(&expected), "{}", out);
    }

    #[test]
    fn conditional_indirect_call() {
        let out = bodies(code(
            vec![
                op(Opcode::Jump),
                2,
                op(Opcode::PushInt),
                1,
                op(Opcode::CallVCond), // 4
                op(Opcode::Pop),       // 5
                op(Opcode::Exit),
            ],
            &[2, 5],
        ));
        assert_eq!(
            out,
            "static void *block2(lobster::VM &vm) {
    { static const int args[] = {1}; vm.F_PUSHINT(args); }
    { vm.F_CALLVCOND(nullptr, block5); if (vm.next_call_target) return (void *)vm.next_call_target; }
    return (void *)block5;
}
static void *block5(lobster::VM &vm) {
    { vm.F_POP(nullptr); }
    { vm.F_EXIT(nullptr); }
    return nullptr;
}
"
        );
    }

    #[test]
    fn yield_resumes_at_next_block() {
        let out = bodies(code(
            vec![op(Opcode::Jump), 2, op(Opcode::Yield), op(Opcode::Exit)],
            &[2, 3],
        ));
        assert_eq!(
            out,
            "static void *block2(lobster::VM &vm) {
    { vm.F_YIELD(nullptr, block3); return (void *)vm.next_call_target; }
}
static void *block3(lobster::VM &vm) {
    { vm.F_EXIT(nullptr); }
    return nullptr;
}
"
        );
    }

    #[test]
    fn coroutine_end() {
        let out = bodies(code(
            vec![op(Opcode::Jump), 2, op(Opcode::CoEnd), op(Opcode::Exit)],
            &[2, 3],
        ));
        assert!(out.starts_with(
            "static void *block2(lobster::VM &vm) {
    { vm.F_COEND(nullptr); return (void *)vm.next_call_target; }
}
"
        ));
    }

    #[test]
    fn every_conditional_jump() {
        let conditional = Opcode::ALL
            .iter()
            .filter(|opcode| opcode.category() == Category::ConditionalJump);
        let mut seen = 0;
        for opcode in conditional {
            let out = bodies(code(
                vec![
                    op(Opcode::Jump),
                    2,
                    *opcode as i32,
                    5,
                    op(Opcode::Pop), // 4
                    op(Opcode::Exit), // 5
                ],
                &[2, 4, 5],
            ));
            let expected = format!(
                "static void *block2(lobster::VM &vm) {{
    if (vm.F_{}()) return (void *)block5;
    return (void *)block4;
}}
",
                opcode.name()
            );
            assert!(out.starts_with(&expected), "{}", out);
            seen += 1;
        }
        assert_eq!(seen, 5);
    }

    #[test]
    fn falling_off_the_end() {
        let out = bodies(code(vec![op(Opcode::Jump), 2, op(Opcode::Pop)], &[2]));
        assert!(out.ends_with("{ vm.F_POP(nullptr); }\n    return nullptr;\n}\n"));
    }
}
