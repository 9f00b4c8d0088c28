//! Call-stack snapshots attached to runtime errors.

use core::fmt;

/// Runtime description derived from a VM fault: the function names on the
/// frame stack when the fault was raised, innermost first.
///
/// Anonymous functions report `<lambda>`; the outermost compilation unit
/// reports `<main>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace {
    frames: Vec<String>,
}

impl Backtrace {
    /// Build from frame names, innermost first.
    pub fn new(frames: Vec<String>) -> Self {
        Self { frames }
    }

    /// Frame names, innermost first.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// `true` when no frames were captured.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, name) in self.frames.iter().enumerate() {
            if depth > 0 {
                writeln!(f)?;
            }
            write!(f, "  #{depth} {name}")?;
        }
        Ok(())
    }
}
