use core::fmt;
use std::rc::Rc;

use crate::{Module, Value};

/// Error channel for native functions. The VM converts it into a runtime
/// fault attributed to the native's registered name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NativeError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl NativeError {
    /// Build from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A compiled script function.
#[derive(Debug, Clone)]
pub struct ScriptFn {
    /// Owning program unit.
    pub module: Rc<Module>,
    /// Body start in the module's executable section, just past the
    /// function header.
    pub offset: usize,
    /// Body length in words.
    pub len: usize,
    /// Declared formal argument count.
    pub arity: u8,
    /// Registers the body needs; register indices are 8-bit, so at most
    /// 256.
    pub reg_count: u16,
    /// Symbol-table index of the function's `FUNCDEF` entry, for name
    /// lookup. `None` for the top level and unnamed literals.
    pub sym_index: Option<u16>,
    /// Captured upvalues, present when this is a closure.
    pub upvalues: Option<Box<[Value]>>,
    /// `true` for the outermost compilation unit, which owns the module.
    pub top_level: bool,
}

impl ScriptFn {
    /// Display name: the `FUNCDEF` name, else `<main>` for the top level,
    /// else `<lambda>`.
    pub fn name(&self) -> Rc<str> {
        if let Some(idx) = self.sym_index {
            if let Some(name) = self.module.func_name(idx as usize) {
                return name;
            }
        }
        if self.top_level {
            Rc::from("<main>")
        } else {
            Rc::from("<lambda>")
        }
    }
}

/// Host callable registered under a name.
#[derive(Clone)]
pub struct NativeFn {
    /// Symbolic name scripts use to call it.
    pub name: Rc<str>,
    call: Rc<dyn Fn(&[Value]) -> Result<Value, NativeError>>,
}

impl NativeFn {
    /// Wrap a host callable.
    pub fn new(
        name: impl Into<Rc<str>>,
        call: impl Fn(&[Value]) -> Result<Value, NativeError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            call: Rc::new(call),
        }
    }

    /// Invoke with the argument slice.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, NativeError> {
        (self.call)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("name", &self.name).finish()
    }
}

/// A callable value: bytecode or host.
#[derive(Debug, Clone)]
pub enum Function {
    /// Bytecode function, possibly a closure.
    Script(ScriptFn),
    /// Host callable.
    Native(NativeFn),
}

impl Function {
    /// Display name used by stack traces.
    pub fn name(&self) -> Rc<str> {
        match self {
            Self::Script(f) => f.name(),
            Self::Native(f) => Rc::clone(&f.name),
        }
    }

    /// The script variant, if any.
    pub const fn as_script(&self) -> Option<&ScriptFn> {
        match self {
            Self::Script(f) => Some(f),
            Self::Native(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparnel_asm::Program;

    #[test]
    fn fallback_names() {
        let module = Rc::new(Module::from_program(Program::new(0, 1, vec![], vec![])));
        let mut f = ScriptFn {
            module,
            offset: 0,
            len: 0,
            arity: 0,
            reg_count: 1,
            sym_index: None,
            upvalues: None,
            top_level: true,
        };
        assert_eq!(&*f.name(), "<main>");
        f.top_level = false;
        assert_eq!(&*f.name(), "<lambda>");
    }

    #[test]
    fn native_invocation() {
        let f = NativeFn::new("double", |args| match args {
            [Value::Int(i)] => Ok(Value::Int(i * 2)),
            _ => Err(NativeError::new("expected one integer")),
        });
        assert_eq!(f.invoke(&[Value::Int(21)]), Ok(Value::Int(42)));
        assert!(f.invoke(&[]).is_err());
    }
}
