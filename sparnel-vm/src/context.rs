use std::rc::Rc;

use sparnel_asm::Program;
use sparnel_types::{Function, Module, NativeError, NativeFn, ScriptFn, Value};

use crate::{Backtrace, Error, GlobalTable, Vm, VmParams};

/// Execution context: owns a VM, the global symbol table, the loaded
/// top-level functions and the last error.
///
/// All entry points follow the same discipline: failures are stored on
/// the context (readable through [`Context::last_error`]) and returned.
/// A context is owned by one thread for its lifetime.
#[derive(Debug, Default)]
pub struct Context {
    vm: Vm,
    globals: GlobalTable,
    programs: Vec<Rc<Function>>,
    last_error: Option<Error>,
}

impl Context {
    /// Context with default limits and an empty global table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with explicit interpreter limits.
    pub fn with_params(params: VmParams) -> Self {
        Self {
            vm: Vm::with_params(params),
            ..Self::default()
        }
    }

    /// Compile a source unit into a callable top-level function.
    #[tracing::instrument(skip_all)]
    pub fn load_source(&mut self, source: &str) -> Result<Rc<Function>, Error> {
        let program = sparnel_compiler::compile_source(source)
            .map_err(|e| self.set_error(Error::from(e)))?;
        Ok(self.load_program(program))
    }

    /// Load a compiled `.spo` word stream.
    #[tracing::instrument(skip_all)]
    pub fn load_binary(&mut self, bytes: &[u8]) -> Result<Rc<Function>, Error> {
        let program = Program::from_bytes(bytes).map_err(|e| self.set_error(Error::from(e)))?;
        Ok(self.load_program(program))
    }

    /// Compile a bare expression into a callable function returning its
    /// value.
    #[tracing::instrument(skip_all)]
    pub fn compile_expression(&mut self, source: &str) -> Result<Rc<Function>, Error> {
        let program = sparnel_compiler::compile_expression(source)
            .map_err(|e| self.set_error(Error::from(e)))?;
        Ok(self.load_program(program))
    }

    /// Wrap a decoded program into its top-level function and retain it.
    pub fn load_program(&mut self, program: Program) -> Rc<Function> {
        let header = program.header;
        let module = Rc::new(Module::from_program(program));
        let func = Rc::new(Function::Script(ScriptFn {
            module,
            offset: 0,
            len: header.body_len as usize,
            arity: header.arg_count as u8,
            reg_count: header.reg_count as u16,
            sym_index: None,
            upvalues: None,
            top_level: true,
        }));
        self.programs.push(Rc::clone(&func));
        func
    }

    /// Call a function with argument values.
    #[tracing::instrument(skip_all)]
    pub fn call(&mut self, func: &Rc<Function>, args: &[Value]) -> Result<Value, Error> {
        self.vm
            .call(&mut self.globals, func, args)
            .map_err(|e| self.set_error(Error::from(e)))
    }

    /// Compile and run a source unit in one step.
    pub fn eval_source(&mut self, source: &str) -> Result<Value, Error> {
        let func = self.load_source(source)?;
        self.call(&func, &[])
    }

    /// Compile and run a bare expression in one step.
    pub fn eval_expression(&mut self, source: &str) -> Result<Value, Error> {
        let func = self.compile_expression(source)?;
        self.call(&func, &[])
    }

    /// Register a host callable as a global under `name`.
    pub fn register_native(
        &mut self,
        name: &str,
        call: impl Fn(&[Value]) -> Result<Value, NativeError> + 'static,
    ) {
        let native = NativeFn::new(name, call);
        self.globals
            .set(name, Value::Function(Rc::new(Function::Native(native))));
    }

    /// Script arguments served to `#N` and `argc`.
    pub fn set_script_args(&mut self, args: Vec<Value>) {
        self.vm.set_script_args(args);
    }

    /// Read a global by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }

    /// Define or overwrite a global from the host.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.set(name, value);
    }

    /// The functions loaded into this context, in load order.
    pub fn programs(&self) -> &[Rc<Function>] {
        &self.programs
    }

    /// The last failure of any entry point, until the next one.
    pub const fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// The call stack of the last runtime error, if the last error was
    /// one.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.last_error.as_ref().and_then(Error::backtrace)
    }

    fn set_error(&mut self, error: Error) -> Error {
        self.last_error = Some(error.clone());
        error
    }
}
