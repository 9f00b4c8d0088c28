use core::fmt;

use sparnel_asm::DecodeError;
use sparnel_compiler::CompileError;

use crate::{Backtrace as CallStack, Fault};

/// Coarse error classification exposed to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Anything that fits no finer bucket (e.g. malformed binaries).
    Generic,
    /// Lexer or parser rejection.
    Syntax,
    /// Compiler rejection.
    Semantic,
    /// VM fault during execution.
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generic => "generic",
            Self::Syntax => "syntax",
            Self::Semantic => "semantic",
            Self::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

/// A VM fault together with the call stack captured when it was raised.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("runtime error: {fault}")]
pub struct RuntimeError {
    /// What went wrong.
    pub fault: Fault,
    /// Frame names at the moment of the fault, innermost first.
    pub trace: CallStack,
}

/// Any failure a [`Context`](crate::Context) operation can surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Front-end rejection of source text.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// Malformed compiled bytecode.
    #[error("bytecode error: {0}")]
    Decode(#[from] DecodeError),
    /// Execution fault.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compile(CompileError::Syntax { .. }) => ErrorKind::Syntax,
            Self::Compile(CompileError::Semantic { .. }) => ErrorKind::Semantic,
            Self::Decode(_) => ErrorKind::Generic,
            Self::Runtime(_) => ErrorKind::Runtime,
        }
    }

    /// The captured call stack, for runtime errors.
    pub fn backtrace(&self) -> Option<&CallStack> {
        match self {
            Self::Runtime(e) => Some(&e.trace),
            _ => None,
        }
    }
}
