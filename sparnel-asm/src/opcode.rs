use core::fmt;

/// Instruction representation for the interpreter.
///
/// Every instruction occupies one [`Word`](crate::Word) plus a
/// per-opcode number of immediate words (see [`Instr::imm_words`]).
/// Operands `A`, `B` and `C` are 8-bit fields; register-typed operands
/// therefore address at most 256 registers per frame.
///
/// [`Instr::imm_words`]: crate::Instr::imm_words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum Opcode {
    /// Call the function in register `B` with `C` arguments, storing the
    /// result in register `A`.
    ///
    /// Followed by ⌈C/4⌉ words packing the argument register indices, four
    /// per word, lowest byte first.
    CALL = 0x00,
    /// Return the value in register `A` to the caller.
    RET = 0x01,
    /// Unconditional jump. Followed by one signed word offset, measured
    /// from the instruction after the offset word.
    JMP = 0x02,
    /// Jump if register `A` is falsy. Followed by one signed word offset.
    JZE = 0x03,
    /// Jump if register `A` is truthy. Followed by one signed word offset.
    JNZ = 0x04,
    /// `A = B == C`
    EQ = 0x05,
    /// `A = B != C`
    NE = 0x06,
    /// `A = B < C`
    LT = 0x07,
    /// `A = B <= C`
    LE = 0x08,
    /// `A = B > C`
    GT = 0x09,
    /// `A = B >= C`
    GE = 0x0a,
    /// `A = B + C`
    ADD = 0x0b,
    /// `A = B - C`
    SUB = 0x0c,
    /// `A = B * C`
    MUL = 0x0d,
    /// `A = B / C`
    DIV = 0x0e,
    /// `A = B % C`
    MOD = 0x0f,
    /// `A = -B`
    NEG = 0x10,
    /// Increment register `A` in place.
    INC = 0x11,
    /// Decrement register `A` in place.
    DEC = 0x12,
    /// `A = B & C` (integers only)
    AND = 0x13,
    /// `A = B | C` (integers only)
    OR = 0x14,
    /// `A = B ^ C` (integers only)
    XOR = 0x15,
    /// `A = B << C` (integers only)
    SHL = 0x16,
    /// `A = B >> C` (integers only)
    SHR = 0x17,
    /// `A = ~B` (integers only)
    BITNOT = 0x18,
    /// `A = !B`
    LOGNOT = 0x19,
    /// `A = sizeof B`: element count of an aggregate, byte length of a
    /// string.
    SIZEOF = 0x1a,
    /// `A = typeof B`: the type name of `B` as a string.
    TYPEOF = 0x1b,
    /// `A = B .. C`: string concatenation.
    CONCAT = 0x1c,
    /// Load a constant into register `A`. Operand `B` is a [`ConstKind`];
    /// `Int` and `Float` are followed by two little-endian payload words.
    LDCONST = 0x1d,
    /// Load symbol-table entry into register `A`. The entry index occupies
    /// the 16-bit field formed by operands `B` and `C`.
    ///
    /// A string-constant entry loads the interned string. A stub entry is
    /// resolved through the context's global table on first execution and
    /// rewritten in place; subsequent loads hit the resolved slot.
    LDSYM = 0x1e,
    /// `A = B`
    MOV = 0x1f,
    /// Load the script argument count into register `A`.
    LDARGC = 0x20,
    /// Allocate an empty aggregate into register `A`.
    NEWARR = 0x21,
    /// `A = B[C]`; nil when the key is absent.
    ARRGET = 0x22,
    /// `A[B] = C`; grows or inserts.
    ARRSET = 0x23,
    /// Load the script argument whose index is in register `B` into
    /// register `A`.
    NTHARG = 0x24,
    /// Function definition. Followed by a four-word [`FunctionHeader`] and
    /// the inline body; executing it stores a fresh function object in
    /// register `A` and skips the body.
    ///
    /// [`FunctionHeader`]: crate::FunctionHeader
    FUNCTION = 0x25,
    /// Set the global named by the trailing name to the value in register
    /// `A`. Operand `B` holds the name's byte length; the NUL-terminated
    /// name follows, padded to a word boundary.
    GLBVAL = 0x26,
    /// Turn the function in register `A` into a closure capturing `B`
    /// upvalues. Followed by `B` descriptor words; each carries a
    /// [`CaptureKind`] in its opcode slot and the source index in operand
    /// `A`.
    CLOSURE = 0x27,
    /// Copy the `B`-th upvalue of the executing closure into register `A`.
    LDUPVAL = 0x28,
}

impl Opcode {
    /// `true` for opcodes whose single immediate word is a signed,
    /// PC-relative jump offset.
    pub const fn is_jump(self) -> bool {
        matches!(self, Self::JMP | Self::JZE | Self::JNZ)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(b: u8) -> Result<Self, u8> {
        use Opcode::*;
        Ok(match b {
            0x00 => CALL,
            0x01 => RET,
            0x02 => JMP,
            0x03 => JZE,
            0x04 => JNZ,
            0x05 => EQ,
            0x06 => NE,
            0x07 => LT,
            0x08 => LE,
            0x09 => GT,
            0x0a => GE,
            0x0b => ADD,
            0x0c => SUB,
            0x0d => MUL,
            0x0e => DIV,
            0x0f => MOD,
            0x10 => NEG,
            0x11 => INC,
            0x12 => DEC,
            0x13 => AND,
            0x14 => OR,
            0x15 => XOR,
            0x16 => SHL,
            0x17 => SHR,
            0x18 => BITNOT,
            0x19 => LOGNOT,
            0x1a => SIZEOF,
            0x1b => TYPEOF,
            0x1c => CONCAT,
            0x1d => LDCONST,
            0x1e => LDSYM,
            0x1f => MOV,
            0x20 => LDARGC,
            0x21 => NEWARR,
            0x22 => ARRGET,
            0x23 => ARRSET,
            0x24 => NTHARG,
            0x25 => FUNCTION,
            0x26 => GLBVAL,
            0x27 => CLOSURE,
            0x28 => LDUPVAL,
            _ => return Err(b),
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Constant selector carried in operand `B` of `LDCONST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum ConstKind {
    /// The nil value; no payload.
    Nil = 0x00,
    /// Boolean true; no payload.
    True = 0x01,
    /// Boolean false; no payload.
    False = 0x02,
    /// Signed 64-bit integer; two little-endian payload words.
    Int = 0x03,
    /// IEEE double; two little-endian payload words.
    Float = 0x04,
}

impl TryFrom<u8> for ConstKind {
    type Error = u8;

    fn try_from(b: u8) -> Result<Self, u8> {
        Ok(match b {
            0x00 => Self::Nil,
            0x01 => Self::True,
            0x02 => Self::False,
            0x03 => Self::Int,
            0x04 => Self::Float,
            _ => return Err(b),
        })
    }
}

/// Upvalue capture descriptor kind, stored in the opcode slot of each
/// descriptor word following a `CLOSURE` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum CaptureKind {
    /// Capture a register of the immediately enclosing frame, by value, at
    /// closure-creation time.
    Local = 0x00,
    /// Capture an upvalue slot of the enclosing closure.
    Outer = 0x01,
}

impl TryFrom<u8> for CaptureKind {
    type Error = u8;

    fn try_from(b: u8) -> Result<Self, u8> {
        Ok(match b {
            0x00 => Self::Local,
            0x01 => Self::Outer,
            _ => return Err(b),
        })
    }
}

/// Leading word kind of a local symbol table entry.
///
/// Entries use the long-form word layout: the kind in the opcode slot and
/// the name's byte length in the 24-bit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum SymEntryKind {
    /// Interned string literal.
    StrConst = 0x01,
    /// Unresolved global name, rewritten in place on first resolution.
    SymStub = 0x02,
    /// Named function definition; one extra word holds the offset of the
    /// function's header in the executable section.
    FuncDef = 0x03,
}

impl TryFrom<u8> for SymEntryKind {
    type Error = u8;

    fn try_from(b: u8) -> Result<Self, u8> {
        Ok(match b {
            0x01 => Self::StrConst,
            0x02 => Self::SymStub,
            0x03 => Self::FuncDef,
            _ => return Err(b),
        })
    }
}
