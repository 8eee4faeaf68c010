//! The instruction set of the stack machine.
//!
//! Every opcode gets exactly one entry in the `opcodes!` table below, which fixes three things at
//! once: its numeric encoding (the position in the table), the name of its runtime handler, and
//! how its operand words are laid out after it in the instruction stream. The control-flow
//! behaviour of each opcode is captured separately by [`Opcode::category`].

use std::convert::TryFrom;
use std::fmt;

/// How the operand words trailing an opcode are laid out
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OperandLayout {
    /// A fixed number of operand words
    Fixed(u8),

    /// `[body, return info, n, captures * n]`
    Coroutine,

    /// `[function, dispatch table offset, return info, argument tags * nargs]`
    ///
    /// `nargs` is not stored at the call site. It is read from the `FUNMULTI` instruction that
    /// the dispatch table offset points at (see `translate::resolve_operands`).
    CallMulti,

    /// `[n, parameters * n, m, locals * m, frame info]`
    FunStart,

    /// `[n, nargs, cases * n]` where each case is `nargs` type tags followed by a block offset
    FunMulti,
}

macro_rules! opcodes {
    ($($variant:ident = $name:literal, $layout:expr;)*) => {
        /// Opcodes, numbered by their position in this enum
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[repr(i32)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            /// Every opcode, indexed by its encoding
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            /// Name of the opcode, which is also the suffix of its runtime handler
            pub const fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)*
                }
            }

            /// Layout of the operands following the opcode
            pub const fn layout(self) -> OperandLayout {
                match self {
                    $(Opcode::$variant => $layout,)*
                }
            }
        }
    };
}

use OperandLayout::*;

opcodes! {
    PushInt = "PUSHINT", Fixed(1);
    PushInt64 = "PUSHINT64", Fixed(2);
    PushFlt = "PUSHFLT", Fixed(1);
    PushFlt64 = "PUSHFLT64", Fixed(2);
    PushStr = "PUSHSTR", Fixed(1);
    PushNil = "PUSHNIL", Fixed(0);
    PushVar = "PUSHVAR", Fixed(1);
    PushVarRef = "PUSHVARREF", Fixed(1);
    PushFld = "PUSHFLD", Fixed(1);
    PushFldMRef = "PUSHFLDMREF", Fixed(1);
    PushLoc = "PUSHLOC", Fixed(1);
    VPushIdxI = "VPUSHIDXI", Fixed(0);
    VPushIdxV = "VPUSHIDXV", Fixed(0);
    NPushIdxI = "NPUSHIDXI", Fixed(0);
    SPushIdxI = "SPUSHIDXI", Fixed(0);
    LvalVar = "LVALVAR", Fixed(2);
    LvalFld = "LVALFLD", Fixed(2);
    LvalIdxI = "LVALIDXI", Fixed(1);
    LvalIdxV = "LVALIDXV", Fixed(1);
    LvalLoc = "LVALLOC", Fixed(2);
    Pop = "POP", Fixed(0);
    PopRef = "POPREF", Fixed(0);
    Dup = "DUP", Fixed(0);
    IAdd = "IADD", Fixed(0);
    ISub = "ISUB", Fixed(0);
    IMul = "IMUL", Fixed(0);
    IDiv = "IDIV", Fixed(0);
    IMod = "IMOD", Fixed(0);
    ILt = "ILT", Fixed(0);
    IGt = "IGT", Fixed(0);
    ILe = "ILE", Fixed(0);
    IGe = "IGE", Fixed(0);
    IEq = "IEQ", Fixed(0);
    INe = "INE", Fixed(0);
    FAdd = "FADD", Fixed(0);
    FSub = "FSUB", Fixed(0);
    FMul = "FMUL", Fixed(0);
    FDiv = "FDIV", Fixed(0);
    FMod = "FMOD", Fixed(0);
    FLt = "FLT", Fixed(0);
    FGt = "FGT", Fixed(0);
    FLe = "FLE", Fixed(0);
    FGe = "FGE", Fixed(0);
    FEq = "FEQ", Fixed(0);
    FNe = "FNE", Fixed(0);
    SAdd = "SADD", Fixed(0);
    SEq = "SEQ", Fixed(0);
    SNe = "SNE", Fixed(0);
    AEq = "AEQ", Fixed(0);
    ANe = "ANE", Fixed(0);
    IUMinus = "IUMINUS", Fixed(0);
    FUMinus = "FUMINUS", Fixed(0);
    LogNot = "LOGNOT", Fixed(0);
    BitNot = "BINOT", Fixed(0);
    BitAnd = "BITAND", Fixed(0);
    BitOr = "BITOR", Fixed(0);
    Xor = "XOR", Fixed(0);
    Asl = "ASL", Fixed(0);
    Asr = "ASR", Fixed(0);
    I2F = "I2F", Fixed(0);
    A2S = "A2S", Fixed(1);
    E2B = "E2B", Fixed(0);
    IsType = "ISTYPE", Fixed(1);
    NewVec = "NEWVEC", Fixed(2);
    NewObject = "NEWOBJECT", Fixed(1);
    BCall0 = "BCALL0", Fixed(1);
    BCall1 = "BCALL1", Fixed(1);
    BCall2 = "BCALL2", Fixed(1);
    BCall3 = "BCALL3", Fixed(1);
    BCall4 = "BCALL4", Fixed(1);
    BCall5 = "BCALL5", Fixed(1);
    BCall6 = "BCALL6", Fixed(1);
    Call = "CALL", Fixed(3);
    CallMulti = "CALLMULTI", CallMulti;
    CallV = "CALLV", Fixed(0);
    CallVCond = "CALLVCOND", Fixed(0);
    FunStart = "FUNSTART", FunStart;
    FunEnd = "FUNEND", Fixed(0);
    FunMulti = "FUNMULTI", FunMulti;
    Return = "RETURN", Fixed(2);
    PushFun = "PUSHFUN", Fixed(1);
    Coro = "CORO", Coroutine;
    CoCl = "COCL", Fixed(0);
    CoEnd = "COEND", Fixed(0);
    Yield = "YIELD", Fixed(0);
    IFor = "IFOR", Fixed(0);
    SFor = "SFOR", Fixed(0);
    VFor = "VFOR", Fixed(0);
    SForRef = "SFORREF", Fixed(0);
    VForRef = "VFORREF", Fixed(0);
    Jump = "JUMP", Fixed(1);
    JumpFail = "JUMPFAIL", Fixed(1);
    JumpFailR = "JUMPFAILR", Fixed(1);
    JumpFailN = "JUMPFAILN", Fixed(1);
    JumpNoFail = "JUMPNOFAIL", Fixed(1);
    JumpNoFailR = "JUMPNOFAILR", Fixed(1);
    LogRead = "LOGREAD", Fixed(1);
    LogWrite = "LOGWRITE", Fixed(2);
    Exit = "EXIT", Fixed(0);
}

/// One past the largest valid opcode encoding
pub const MAX_OPCODE: i32 = Opcode::ALL.len() as i32;

/// Coarse classification of what an opcode does to control flow
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Category {
    /// Runs its handler and carries on with the next instruction
    Plain,

    /// Unconditional jump to the block at its operand
    Jump,

    /// Jumps to the block at its operand if its predicate handler returns true
    ConditionalJump,

    /// Call to a statically known function
    Call,

    /// Call through a multi-dispatch table
    CallMulti,

    /// Call to a function value
    CallIndirect,

    /// Call to a function value, if there is one
    CallIndirectCond,

    /// Suspend the current coroutine
    Yield,

    /// One iteration of a loop over an indexed collection
    Loop,

    /// Push a closure whose body starts at the block at its first operand
    PushFun,

    /// Create a coroutine whose body starts at the block at its first operand
    Coroutine,

    /// Function prologue
    FunStart,

    /// Multi-dispatch table, selecting one of several function bodies
    FunMulti,

    /// Function epilogue
    FunEnd,

    /// End of a coroutine body
    CoEnd,

    /// Return from a function
    Return,

    /// Call to a built-in function (the operand is the built-in index)
    Builtin,

    /// End the program
    Exit,
}

/// Which block (if any) is handed to the runtime handler as a continuation
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Continuation {
    None,

    /// Block starting right after this instruction (return address of a call)
    NextBlock,

    /// Block containing this instruction (re-entry point of a loop)
    CurrentBlock,

    /// Block at the first operand (entry point of a closure or coroutine body)
    FirstOperand,
}

/// What happens to control flow once the handler has run
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Disposition {
    /// Execution continues with the next instruction
    FallThrough,

    /// Control always moves to the block at the given operand index
    StaticTarget(usize),

    /// Control always moves to the target the runtime computed
    RuntimeTarget,

    /// Control moves to the target the runtime computed, if there is one
    GuardedRuntimeTarget,
}

/// Human readable information attached to an instruction in the generated code
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Annotation {
    None,

    /// Name of the built-in at operand 0
    Builtin,

    /// Name of the variable at operand 0
    Variable,

    /// Name of the lvalue operator at operand 0 and variable at operand 1
    LvalVariable,

    /// Literal text of the string at operand 0
    StringLiteral,

    /// Name of the function at operand 0
    Function,
}

impl Opcode {
    /// Control-flow category
    pub const fn category(self) -> Category {
        match self {
            Opcode::Jump => Category::Jump,
            Opcode::JumpFail
            | Opcode::JumpFailR
            | Opcode::JumpFailN
            | Opcode::JumpNoFail
            | Opcode::JumpNoFailR => Category::ConditionalJump,
            Opcode::Call => Category::Call,
            Opcode::CallMulti => Category::CallMulti,
            Opcode::CallV => Category::CallIndirect,
            Opcode::CallVCond => Category::CallIndirectCond,
            Opcode::Yield => Category::Yield,
            Opcode::IFor | Opcode::SFor | Opcode::VFor | Opcode::SForRef | Opcode::VForRef => {
                Category::Loop
            }
            Opcode::PushFun => Category::PushFun,
            Opcode::Coro => Category::Coroutine,
            Opcode::FunStart => Category::FunStart,
            Opcode::FunMulti => Category::FunMulti,
            Opcode::FunEnd => Category::FunEnd,
            Opcode::CoEnd => Category::CoEnd,
            Opcode::Return => Category::Return,
            Opcode::BCall0
            | Opcode::BCall1
            | Opcode::BCall2
            | Opcode::BCall3
            | Opcode::BCall4
            | Opcode::BCall5
            | Opcode::BCall6 => Category::Builtin,
            Opcode::Exit => Category::Exit,
            _ => Category::Plain,
        }
    }

    /// What gets extra annotation in the generated code
    pub const fn annotation(self) -> Annotation {
        match self {
            Opcode::PushVar | Opcode::PushVarRef => Annotation::Variable,
            Opcode::LvalVar => Annotation::LvalVariable,
            Opcode::PushStr => Annotation::StringLiteral,
            Opcode::Call | Opcode::CallMulti => Annotation::Function,
            _ if matches!(self.category(), Category::Builtin) => Annotation::Builtin,
            _ => Annotation::None,
        }
    }
}

impl Category {
    /// Continuation passed along to the handler
    pub const fn continuation(self) -> Continuation {
        match self {
            Category::Call
            | Category::CallMulti
            | Category::CallIndirect
            | Category::CallIndirectCond
            | Category::Yield => Continuation::NextBlock,
            Category::Loop => Continuation::CurrentBlock,
            Category::PushFun | Category::Coroutine => Continuation::FirstOperand,
            _ => Continuation::None,
        }
    }

    /// Control flow after the handler returns
    ///
    /// The jump categories are handled before any handler call, so they are reported here as
    /// falling through.
    pub const fn disposition(self) -> Disposition {
        match self {
            Category::Call | Category::CallMulti => Disposition::StaticTarget(1),
            Category::CallIndirect
            | Category::FunEnd
            | Category::FunMulti
            | Category::Yield
            | Category::CoEnd
            | Category::Return => Disposition::RuntimeTarget,
            Category::CallIndirectCond | Category::Loop => Disposition::GuardedRuntimeTarget,
            _ => Disposition::FallThrough,
        }
    }
}

/// Encoded value that does not correspond to any opcode
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BadOpcode(pub i32);

impl TryFrom<i32> for Opcode {
    type Error = BadOpcode;

    fn try_from(value: i32) -> Result<Opcode, BadOpcode> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Opcode::ALL.get(idx))
            .copied()
            .ok_or(BadOpcode(value))
    }
}

impl From<Opcode> for i32 {
    fn from(opcode: Opcode) -> i32 {
        opcode as i32
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compound assignment operators that `LVALVAR` can apply to a variable
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LvalOp {
    Write,
    WriteR,
    WriteD,
    Plus,
    PlusR,
    PlusD,
    Minus,
    MinusR,
    MinusD,
    Mult,
    MultR,
    MultD,
    Div,
    DivR,
    DivD,
    Mod,
    ModR,
    ModD,
    PP,
    PPR,
    MM,
    MMR,
    PPP,
    PPPR,
    MMP,
    MMPR,
}

impl LvalOp {
    pub const ALL: &'static [LvalOp] = &[
        LvalOp::Write,
        LvalOp::WriteR,
        LvalOp::WriteD,
        LvalOp::Plus,
        LvalOp::PlusR,
        LvalOp::PlusD,
        LvalOp::Minus,
        LvalOp::MinusR,
        LvalOp::MinusD,
        LvalOp::Mult,
        LvalOp::MultR,
        LvalOp::MultD,
        LvalOp::Div,
        LvalOp::DivR,
        LvalOp::DivD,
        LvalOp::Mod,
        LvalOp::ModR,
        LvalOp::ModD,
        LvalOp::PP,
        LvalOp::PPR,
        LvalOp::MM,
        LvalOp::MMR,
        LvalOp::PPP,
        LvalOp::PPPR,
        LvalOp::MMP,
        LvalOp::MMPR,
    ];

    /// Look up an operator by its encoding
    pub fn from_operand(value: i32) -> Option<LvalOp> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| LvalOp::ALL.get(idx))
            .copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            LvalOp::Write => "WRITE",
            LvalOp::WriteR => "WRITER",
            LvalOp::WriteD => "WRITED",
            LvalOp::Plus => "PLUS",
            LvalOp::PlusR => "PLUSR",
            LvalOp::PlusD => "PLUSD",
            LvalOp::Minus => "MINUS",
            LvalOp::MinusR => "MINUSR",
            LvalOp::MinusD => "MINUSD",
            LvalOp::Mult => "MULT",
            LvalOp::MultR => "MULTR",
            LvalOp::MultD => "MULTD",
            LvalOp::Div => "DIV",
            LvalOp::DivR => "DIVR",
            LvalOp::DivD => "DIVD",
            LvalOp::Mod => "MOD",
            LvalOp::ModR => "MODR",
            LvalOp::ModD => "MODD",
            LvalOp::PP => "PP",
            LvalOp::PPR => "PPR",
            LvalOp::MM => "MM",
            LvalOp::MMR => "MMR",
            LvalOp::PPP => "PPP",
            LvalOp::PPPR => "PPPR",
            LvalOp::MMP => "MMP",
            LvalOp::MMPR => "MMPR",
        }
    }
}
