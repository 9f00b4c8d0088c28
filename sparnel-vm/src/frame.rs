use std::rc::Rc;

use sparnel_types::Function;

/// One record of the call-frame stack.
///
/// A frame owns a window of the VM's contiguous register file, starting at
/// `base` and `reg_count` registers wide. `pc` holds the resume position
/// in the function's module while a callee runs.
#[derive(Debug, Clone)]
pub struct Frame {
    func: Rc<Function>,
    base: usize,
    reg_count: usize,
    pc: usize,
    ret_dst: u8,
}

impl Frame {
    /// Create a frame for `func` whose window starts at `base`.
    pub fn new(func: Rc<Function>, base: usize, reg_count: usize, pc: usize, ret_dst: u8) -> Self {
        Self {
            func,
            base,
            reg_count,
            pc,
            ret_dst,
        }
    }

    /// The executing function.
    pub fn func(&self) -> &Rc<Function> {
        &self.func
    }

    /// First register of this frame's window.
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Width of this frame's register window.
    pub const fn reg_count(&self) -> usize {
        self.reg_count
    }

    /// Saved program counter.
    pub const fn pc(&self) -> usize {
        self.pc
    }

    /// Update the saved program counter before a call out.
    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Caller register receiving the callee's return value.
    pub const fn ret_dst(&self) -> u8 {
        self.ret_dst
    }
}
