use core::fmt;

/// Source position, 1-indexed for user display.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Line number.
    pub line: u32,
    /// Column number.
    pub col: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

/// Front-end failure: a malformed token stream or source structure
/// (`Syntax`), or a well-formed program the compiler cannot lower
/// (`Semantic`). Both carry the offending location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Lexer or parser rejection.
    #[error("syntax error near {location}: {message}")]
    Syntax {
        /// Where the error was detected.
        location: Location,
        /// What went wrong.
        message: String,
    },
    /// Compiler rejection of a parsed program.
    #[error("semantic error near {location}: {message}")]
    Semantic {
        /// Where the error was detected.
        location: Location,
        /// What went wrong.
        message: String,
    },
}

impl CompileError {
    pub(crate) fn syntax(line: u32, col: u32, message: impl Into<String>) -> Self {
        Self::Syntax {
            location: Location { line, col },
            message: message.into(),
        }
    }

    pub(crate) fn semantic(line: u32, col: u32, message: impl Into<String>) -> Self {
        Self::Semantic {
            location: Location { line, col },
            message: message.into(),
        }
    }

    /// The offending location.
    pub fn location(&self) -> Location {
        match self {
            Self::Syntax { location, .. } | Self::Semantic { location, .. } => *location,
        }
    }
}
