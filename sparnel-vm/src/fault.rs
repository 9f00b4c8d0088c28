use sparnel_types::{Type, ValueError};

/// Fault reasons the VM can raise while executing instructions.
///
/// A fault aborts the current top-level call; the frame stack at the
/// moment of the fault is captured into a
/// [`Backtrace`](crate::Backtrace) before unwinding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Fault {
    /// Integer `/` with a zero divisor.
    #[error("integer division by zero")]
    IntegerDivisionByZero,
    /// Integer `%` with a zero divisor.
    #[error("integer modulo by zero")]
    IntegerModuloByZero,
    /// An operand type the instruction cannot accept.
    #[error("wrong operand type for `{op}`: {found}")]
    WrongOperandType {
        /// Operator or instruction name.
        op: &'static str,
        /// The offending operand's type.
        found: Type,
    },
    /// Ordered comparison between values that share no ordering.
    #[error("values of type {lhs} and {rhs} are not comparable")]
    NotComparable {
        /// Left operand type.
        lhs: Type,
        /// Right operand type.
        rhs: Type,
    },
    /// A key type the hashmap cannot hash.
    #[error("value of type {0} is not hashable")]
    UnhashableKey(Type),
    /// `CALL` on a value that is not a function.
    #[error("value of type {0} is not callable")]
    NotCallable(Type),
    /// Subscript on a value that is neither an array nor a hashmap.
    #[error("value of type {0} is not indexable")]
    NotIndexable(Type),
    /// `LDSYM` stub resolution found no such global.
    #[error("global symbol not found: `{0}`")]
    GlobalNotFound(String),
    /// `NTHARG` past the end of the script argument vector.
    #[error("script argument {index} out of bounds (argc = {len})")]
    ArgumentOutOfBounds {
        /// Requested index.
        index: i64,
        /// Available argument count.
        len: usize,
    },
    /// The frame stack outgrew [`VmParams::max_call_depth`].
    ///
    /// [`VmParams::max_call_depth`]: crate::VmParams::max_call_depth
    #[error("call depth limit exceeded")]
    CallDepthExceeded,
    /// The register file outgrew
    /// [`VmParams::max_register_file`](crate::VmParams::max_register_file).
    #[error("register file limit exceeded")]
    RegisterFileOverflow,
    /// A native function reported an error.
    #[error("native function `{name}`: {message}")]
    Native {
        /// Registered name of the native.
        name: String,
        /// The native's message.
        message: String,
    },
    /// The instruction stream is structurally invalid. Only reachable
    /// through hand-crafted or corrupted bytecode.
    #[error("malformed bytecode: {0}")]
    InvalidBytecode(&'static str),
}

impl From<ValueError> for Fault {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::NotComparable { lhs, rhs } => Self::NotComparable { lhs, rhs },
            ValueError::Unhashable(ty) => Self::UnhashableKey(ty),
        }
    }
}
