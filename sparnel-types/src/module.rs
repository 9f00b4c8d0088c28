use core::cell::RefCell;
use std::rc::Rc;

use sparnel_asm::{FunctionHeader, Program, SymbolEntry, Word};

use crate::{Str, Value};

/// Runtime state of one local symbol table slot.
///
/// Stub slots are rewritten to `Value` slots in place on first resolution
/// and never revert.
#[derive(Debug, Clone)]
pub enum SymbolSlot {
    /// Interned string constant.
    Str(Rc<Str>),
    /// Unresolved global name.
    Stub(Rc<str>),
    /// A resolved global.
    Value(Value),
    /// Named function definition.
    Func {
        /// Display name for stack traces and disassembly.
        name: Rc<str>,
        /// Offset of the function's header in the executable section.
        offset: usize,
    },
}

/// A loaded program unit: the executable word stream plus the runtime
/// symbol slots derived from its local symbol table.
#[derive(Debug)]
pub struct Module {
    header: FunctionHeader,
    code: Vec<Word>,
    slots: RefCell<Vec<SymbolSlot>>,
}

impl Module {
    /// Build runtime state from a decoded program.
    pub fn from_program(program: Program) -> Self {
        let slots = program
            .symbols
            .iter()
            .map(|entry| match entry {
                SymbolEntry::StrConst(s) => SymbolSlot::Str(Rc::new(Str::new(s.clone()))),
                SymbolEntry::SymStub(name) => SymbolSlot::Stub(Rc::from(name.as_str())),
                SymbolEntry::FuncDef { name, offset } => SymbolSlot::Func {
                    name: Rc::from(name.as_str()),
                    offset: *offset as usize,
                },
            })
            .collect();
        Self {
            header: program.header,
            code: program.code,
            slots: RefCell::new(slots),
        }
    }

    /// Top-level function header.
    pub const fn header(&self) -> FunctionHeader {
        self.header
    }

    /// Executable section.
    pub fn code(&self) -> &[Word] {
        &self.code
    }

    /// Snapshot of one symbol slot.
    pub fn slot(&self, index: usize) -> Option<SymbolSlot> {
        self.slots.borrow().get(index).cloned()
    }

    /// Rewrite a stub slot with its resolved value. Resolved slots never
    /// revert to stubs.
    pub fn resolve(&self, index: usize, value: Value) {
        let mut slots = self.slots.borrow_mut();
        debug_assert!(matches!(slots[index], SymbolSlot::Stub(_)));
        slots[index] = SymbolSlot::Value(value);
    }

    /// Name of the function definition at `index`, if that slot is one.
    pub fn func_name(&self, index: usize) -> Option<Rc<str>> {
        match self.slots.borrow().get(index)? {
            SymbolSlot::Func { name, .. } => Some(Rc::clone(name)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparnel_asm::SymbolEntry;

    fn module() -> Module {
        let program = Program::new(
            0,
            1,
            vec![0, 0, 0, 0],
            vec![
                SymbolEntry::StrConst("lit".into()),
                SymbolEntry::SymStub("print".into()),
                SymbolEntry::FuncDef {
                    name: "f".into(),
                    offset: 0,
                },
            ],
        );
        Module::from_program(program)
    }

    #[test]
    fn slots_mirror_the_symbol_table() {
        let m = module();
        assert!(matches!(m.slot(0), Some(SymbolSlot::Str(_))));
        assert!(matches!(m.slot(1), Some(SymbolSlot::Stub(_))));
        assert_eq!(m.func_name(2).as_deref(), Some("f"));
        assert!(m.slot(3).is_none());
    }

    #[test]
    fn resolution_rewrites_in_place() {
        let m = module();
        m.resolve(1, Value::Int(42));
        assert!(matches!(m.slot(1), Some(SymbolSlot::Value(Value::Int(42)))));
    }
}
