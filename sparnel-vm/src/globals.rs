use std::collections::HashMap;
use std::rc::Rc;

use sparnel_types::Value;

/// The context's global symbol table: name → value.
///
/// Globals come from `const` declarations, free-name assignments and
/// native registration. `LDSYM` stubs resolve against this table exactly
/// once per program; later redefinitions only affect programs that have
/// not resolved the name yet.
#[derive(Debug, Clone, Default)]
pub struct GlobalTable {
    entries: HashMap<Rc<str>, Value>,
}

impl GlobalTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a global.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.get(name).cloned()
    }

    /// Define or overwrite a global.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.entries.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.entries.insert(Rc::from(name), value);
            }
        }
    }

    /// Number of defined globals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate defined names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| &**k)
    }
}
