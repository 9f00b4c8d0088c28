use std::rc::Rc;

use sparnel_asm::{
    name_words, packed_arg_words, unpack_args, CaptureKind, ConstKind, Instr, Opcode, Word,
};
use sparnel_types::{Function, ScriptFn, Value};

use crate::consts::{DEFAULT_CALL_DEPTH, DEFAULT_REGISTER_FILE_CAPACITY};
use crate::{Backtrace, Fault, Frame, GlobalTable, RuntimeError};

/// Interpreter limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmParams {
    /// Maximum number of simultaneously live call frames.
    pub max_call_depth: usize,
    /// Maximum size of the register file, in registers.
    pub max_register_file: usize,
}

impl Default for VmParams {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_CALL_DEPTH,
            max_register_file: DEFAULT_REGISTER_FILE_CAPACITY,
        }
    }
}

/// The register machine.
///
/// Registers live in one contiguous file; each frame owns a window of it.
/// The file grows as frames are pushed and shrinks as they are popped.
#[derive(Debug, Default)]
pub struct Vm {
    registers: Vec<Value>,
    frames: Vec<Frame>,
    script_args: Vec<Value>,
    params: VmParams,
}

impl Vm {
    /// VM with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// VM with explicit limits.
    pub fn with_params(params: VmParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// The configured limits.
    pub const fn params(&self) -> &VmParams {
        &self.params
    }

    /// Replace the script argument vector served by `LDARGC`/`NTHARG`.
    pub fn set_script_args(&mut self, args: Vec<Value>) {
        self.script_args = args;
    }

    /// The current script argument vector.
    pub fn script_args(&self) -> &[Value] {
        &self.script_args
    }

    /// Call a function with arguments and run it to completion.
    ///
    /// On a fault the frame stack is captured into a backtrace and the VM
    /// unwinds to its pre-call state, so the host may keep using it.
    pub fn call(
        &mut self,
        globals: &mut GlobalTable,
        func: &Rc<Function>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match func.as_ref() {
            Function::Native(native) => native.invoke(args).map_err(|e| RuntimeError {
                fault: Fault::Native {
                    name: native.name.to_string(),
                    message: e.message,
                },
                trace: Backtrace::default(),
            }),
            Function::Script(script) => {
                let entry_depth = self.frames.len();
                if let Err(fault) = self.push_frame(func, script, args, 0) {
                    return Err(RuntimeError {
                        fault,
                        trace: self.capture_backtrace(entry_depth),
                    });
                }
                match self.run(globals, entry_depth) {
                    Ok(value) => Ok(value),
                    Err(fault) => {
                        let trace = self.capture_backtrace(entry_depth);
                        self.unwind(entry_depth);
                        Err(RuntimeError { fault, trace })
                    }
                }
            }
        }
    }

    /// Push a frame for `script`, growing the register file and copying
    /// arguments into the callee's low registers. Extra arguments are
    /// dropped; missing ones stay nil.
    fn push_frame(
        &mut self,
        func: &Rc<Function>,
        script: &ScriptFn,
        args: &[Value],
        ret_dst: u8,
    ) -> Result<(), Fault> {
        if self.frames.len() >= self.params.max_call_depth {
            return Err(Fault::CallDepthExceeded);
        }
        let reg_count = script.reg_count as usize;
        let base = self.registers.len();
        if base + reg_count > self.params.max_register_file {
            return Err(Fault::RegisterFileOverflow);
        }
        self.registers.resize(base + reg_count, Value::Nil);
        let copied = (script.arity as usize).min(reg_count).min(args.len());
        for (i, arg) in args.iter().take(copied).enumerate() {
            self.registers[base + i] = arg.clone();
        }
        self.frames.push(Frame::new(
            Rc::clone(func),
            base,
            reg_count,
            script.offset,
            ret_dst,
        ));
        Ok(())
    }

    fn capture_backtrace(&self, entry_depth: usize) -> Backtrace {
        Backtrace::new(
            self.frames[entry_depth..]
                .iter()
                .rev()
                .map(|f| f.func().name().to_string())
                .collect(),
        )
    }

    /// Drop every frame above the entry point and shrink the register
    /// file back.
    fn unwind(&mut self, entry_depth: usize) {
        if self.frames.len() > entry_depth {
            let base = self.frames[entry_depth].base();
            self.frames.truncate(entry_depth);
            self.registers.truncate(base);
        }
    }

    /// The dispatch loop. Runs until the frame pushed at `entry_depth`
    /// returns.
    fn run(&mut self, globals: &mut GlobalTable, entry_depth: usize) -> Result<Value, Fault> {
        let frame = self.frames.last().expect("entry frame");
        let mut cur = Rc::clone(frame.func());
        let mut module = Rc::clone(&cur.as_script().expect("script frame").module);
        let mut pc = frame.pc();
        let mut base = frame.base();
        let mut reg_count = frame.reg_count();

        macro_rules! load_frame {
            () => {{
                let frame = self.frames.last().expect("frame");
                cur = Rc::clone(frame.func());
                module = Rc::clone(&cur.as_script().expect("script frame").module);
                pc = frame.pc();
                base = frame.base();
                reg_count = frame.reg_count();
            }};
        }

        macro_rules! fetch {
            () => {{
                let word = module
                    .code()
                    .get(pc)
                    .copied()
                    .ok_or(Fault::InvalidBytecode("program counter out of range"))?;
                pc += 1;
                word
            }};
        }

        macro_rules! reg {
            ($r:expr) => {{
                let i = $r as usize;
                if i >= reg_count {
                    return Err(Fault::InvalidBytecode("register index out of range"));
                }
                self.registers[base + i].clone()
            }};
        }

        macro_rules! set_reg {
            ($r:expr, $v:expr) => {{
                let i = $r as usize;
                if i >= reg_count {
                    return Err(Fault::InvalidBytecode("register index out of range"));
                }
                self.registers[base + i] = $v;
            }};
        }

        loop {
            let at = pc;
            let instr = Instr::new(fetch!());
            let op = instr
                .opcode()
                .ok_or(Fault::InvalidBytecode("unknown opcode"))?;
            tracing::trace!(pc = at, op = ?op, "execute");
            let (a, b, c) = (instr.a(), instr.b(), instr.c());

            match op {
                Opcode::MOV => {
                    let v = reg!(b);
                    set_reg!(a, v);
                }
                Opcode::LDCONST => {
                    let kind = ConstKind::try_from(b)
                        .map_err(|_| Fault::InvalidBytecode("unknown constant kind"))?;
                    let value = match kind {
                        ConstKind::Nil => Value::Nil,
                        ConstKind::True => Value::Bool(true),
                        ConstKind::False => Value::Bool(false),
                        ConstKind::Int => {
                            let lo = fetch!() as u64;
                            let hi = fetch!() as u64;
                            Value::Int((lo | (hi << 32)) as i64)
                        }
                        ConstKind::Float => {
                            let lo = fetch!() as u64;
                            let hi = fetch!() as u64;
                            Value::Float(f64::from_bits(lo | (hi << 32)))
                        }
                    };
                    set_reg!(a, value);
                }
                Opcode::LDSYM => {
                    let index = instr.index16() as usize;
                    let value = self.load_symbol(&module, index, globals)?;
                    set_reg!(a, value);
                }
                Opcode::JMP | Opcode::JZE | Opcode::JNZ => {
                    let off = fetch!() as i32;
                    let taken = match op {
                        Opcode::JMP => true,
                        Opcode::JZE => !reg!(a).is_truthy(),
                        _ => reg!(a).is_truthy(),
                    };
                    if taken {
                        // Offsets count from the instruction after the
                        // offset word.
                        let target = pc as i64 + off as i64;
                        if target < 0 || target as usize > module.code().len() {
                            return Err(Fault::InvalidBytecode("jump target out of range"));
                        }
                        pc = target as usize;
                    }
                }
                Opcode::EQ => {
                    let (l, r) = (reg!(b), reg!(c));
                    set_reg!(a, Value::Bool(l == r));
                }
                Opcode::NE => {
                    let (l, r) = (reg!(b), reg!(c));
                    set_reg!(a, Value::Bool(l != r));
                }
                Opcode::LT | Opcode::LE | Opcode::GT | Opcode::GE => {
                    let (l, r) = (reg!(b), reg!(c));
                    let ord = l.try_compare(&r).map_err(Fault::from)?;
                    let holds = match op {
                        Opcode::LT => ord.is_lt(),
                        Opcode::LE => ord.is_le(),
                        Opcode::GT => ord.is_gt(),
                        _ => ord.is_ge(),
                    };
                    set_reg!(a, Value::Bool(holds));
                }
                Opcode::ADD
                | Opcode::SUB
                | Opcode::MUL
                | Opcode::DIV
                | Opcode::MOD
                | Opcode::AND
                | Opcode::OR
                | Opcode::XOR
                | Opcode::SHL
                | Opcode::SHR
                | Opcode::CONCAT => {
                    let (l, r) = (reg!(b), reg!(c));
                    set_reg!(a, binary_op(op, l, r)?);
                }
                Opcode::NEG => {
                    let v = match reg!(b) {
                        Value::Int(i) => Value::Int(i.wrapping_neg()),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            return Err(Fault::WrongOperandType {
                                op: "-",
                                found: other.type_of(),
                            })
                        }
                    };
                    set_reg!(a, v);
                }
                Opcode::INC | Opcode::DEC => {
                    let delta = if op == Opcode::INC { 1 } else { -1 };
                    let v = match reg!(a) {
                        Value::Int(i) => Value::Int(i.wrapping_add(delta)),
                        Value::Float(f) => Value::Float(f + delta as f64),
                        other => {
                            return Err(Fault::WrongOperandType {
                                op: if delta > 0 { "++" } else { "--" },
                                found: other.type_of(),
                            })
                        }
                    };
                    set_reg!(a, v);
                }
                Opcode::BITNOT => {
                    let v = match reg!(b) {
                        Value::Int(i) => Value::Int(!i),
                        other => {
                            return Err(Fault::WrongOperandType {
                                op: "~",
                                found: other.type_of(),
                            })
                        }
                    };
                    set_reg!(a, v);
                }
                Opcode::LOGNOT => {
                    let v = reg!(b);
                    set_reg!(a, Value::Bool(!v.is_truthy()));
                }
                Opcode::SIZEOF => {
                    let v = match reg!(b) {
                        Value::Str(s) => Value::Int(s.len() as i64),
                        Value::Array(arr) => Value::Int(arr.borrow().len() as i64),
                        Value::Map(map) => Value::Int(map.borrow().len() as i64),
                        other => {
                            return Err(Fault::WrongOperandType {
                                op: "sizeof",
                                found: other.type_of(),
                            })
                        }
                    };
                    set_reg!(a, v);
                }
                Opcode::TYPEOF => {
                    let v = reg!(b);
                    set_reg!(a, Value::string(v.type_name()));
                }
                Opcode::LDARGC => {
                    set_reg!(a, Value::Int(self.script_args.len() as i64));
                }
                Opcode::NTHARG => {
                    let index = match reg!(b) {
                        Value::Int(i) => i,
                        other => {
                            return Err(Fault::WrongOperandType {
                                op: "#",
                                found: other.type_of(),
                            })
                        }
                    };
                    let value = usize::try_from(index)
                        .ok()
                        .and_then(|i| self.script_args.get(i).cloned())
                        .ok_or(Fault::ArgumentOutOfBounds {
                            index,
                            len: self.script_args.len(),
                        })?;
                    set_reg!(a, value);
                }
                Opcode::NEWARR => {
                    set_reg!(a, Value::new_array());
                }
                Opcode::ARRGET => {
                    let (obj, key) = (reg!(b), reg!(c));
                    let value = match obj {
                        Value::Array(arr) => arr.borrow().get(&key).map_err(Fault::from)?,
                        Value::Map(map) => map
                            .borrow()
                            .get(&key)
                            .map_err(Fault::from)?
                            .unwrap_or(Value::Nil),
                        other => return Err(Fault::NotIndexable(other.type_of())),
                    };
                    set_reg!(a, value);
                }
                Opcode::ARRSET => {
                    let (obj, key, value) = (reg!(a), reg!(b), reg!(c));
                    match obj {
                        Value::Array(arr) => {
                            arr.borrow_mut().set(key, value).map_err(Fault::from)?
                        }
                        Value::Map(map) => {
                            let mut map = map.borrow_mut();
                            if matches!(value, Value::Nil) {
                                map.remove(&key).map_err(Fault::from)?;
                            } else {
                                map.insert(key, value).map_err(Fault::from)?;
                            }
                        }
                        other => return Err(Fault::NotIndexable(other.type_of())),
                    }
                }
                Opcode::GLBVAL => {
                    let len = b as usize;
                    let nwords = name_words(len);
                    let end = pc + nwords;
                    let name = module
                        .code()
                        .get(pc..end)
                        .and_then(|words| sparnel_asm::decode_name(words, len))
                        .ok_or(Fault::InvalidBytecode("malformed global name"))?;
                    pc = end;
                    globals.set(&name, reg!(a));
                }
                Opcode::FUNCTION => {
                    let body_len = fetch!() as usize;
                    let arity = fetch!();
                    let regs = fetch!();
                    let sym_index = fetch!();
                    let body_start = pc;
                    if body_start + body_len > module.code().len() {
                        return Err(Fault::InvalidBytecode("function body out of range"));
                    }
                    if arity > u8::MAX as Word || regs > 256 {
                        return Err(Fault::InvalidBytecode("oversized function header"));
                    }
                    let func = Function::Script(ScriptFn {
                        module: Rc::clone(&module),
                        offset: body_start,
                        len: body_len,
                        arity: arity as u8,
                        reg_count: regs as u16,
                        sym_index: Some(sym_index as u16),
                        upvalues: None,
                        top_level: false,
                    });
                    set_reg!(a, Value::Function(Rc::new(func)));
                    pc = body_start + body_len;
                }
                Opcode::CLOSURE => {
                    let count = b as usize;
                    let value = reg!(a);
                    let script = match &value {
                        Value::Function(f) => match f.as_ref() {
                            Function::Script(s) => s.clone(),
                            Function::Native(_) => {
                                return Err(Fault::InvalidBytecode(
                                    "closure over a native function",
                                ))
                            }
                        },
                        other => {
                            return Err(Fault::WrongOperandType {
                                op: "closure",
                                found: other.type_of(),
                            })
                        }
                    };
                    let mut upvalues = Vec::with_capacity(count);
                    for _ in 0..count {
                        let desc = Instr::new(fetch!());
                        let captured = match CaptureKind::try_from(desc.op()) {
                            Ok(CaptureKind::Local) => reg!(desc.a()),
                            Ok(CaptureKind::Outer) => cur
                                .as_script()
                                .and_then(|s| s.upvalues.as_ref())
                                .and_then(|ups| ups.get(desc.a() as usize).cloned())
                                .ok_or(Fault::InvalidBytecode(
                                    "outer capture without an enclosing closure",
                                ))?,
                            Err(_) => {
                                return Err(Fault::InvalidBytecode("unknown capture kind"))
                            }
                        };
                        upvalues.push(captured);
                    }
                    let closure = Function::Script(ScriptFn {
                        upvalues: Some(upvalues.into_boxed_slice()),
                        ..script
                    });
                    set_reg!(a, Value::Function(Rc::new(closure)));
                }
                Opcode::LDUPVAL => {
                    let value = cur
                        .as_script()
                        .and_then(|s| s.upvalues.as_ref())
                        .and_then(|ups| ups.get(b as usize).cloned())
                        .ok_or(Fault::InvalidBytecode("no such upvalue"))?;
                    set_reg!(a, value);
                }
                Opcode::CALL => {
                    let argc = c as usize;
                    let nwords = packed_arg_words(argc);
                    let packed = module
                        .code()
                        .get(pc..pc + nwords)
                        .ok_or(Fault::InvalidBytecode("truncated call arguments"))?
                        .to_vec();
                    pc += nwords;
                    let arg_regs = unpack_args(&packed, argc);
                    let mut args = Vec::with_capacity(argc);
                    for r in arg_regs {
                        args.push(reg!(r));
                    }
                    let callee = reg!(b);
                    let callee = match callee {
                        Value::Function(f) => f,
                        other => return Err(Fault::NotCallable(other.type_of())),
                    };
                    match callee.as_ref() {
                        Function::Native(native) => {
                            let result =
                                native.invoke(&args).map_err(|e| Fault::Native {
                                    name: native.name.to_string(),
                                    message: e.message,
                                })?;
                            set_reg!(a, result);
                        }
                        Function::Script(script) => {
                            self.frames
                                .last_mut()
                                .expect("caller frame")
                                .set_pc(pc);
                            self.push_frame(&callee, script, &args, a)?;
                            load_frame!();
                        }
                    }
                }
                Opcode::RET => {
                    let value = reg!(a);
                    let finished = self.frames.pop().expect("returning frame");
                    self.registers.truncate(finished.base());
                    if self.frames.len() == entry_depth {
                        return Ok(value);
                    }
                    let caller = self.frames.last().expect("caller frame");
                    let dst = finished.ret_dst() as usize;
                    if dst >= caller.reg_count() {
                        return Err(Fault::InvalidBytecode("return destination out of range"));
                    }
                    self.registers[caller.base() + dst] = value;
                    load_frame!();
                }
            }
        }
    }

    /// `LDSYM`: load a string constant or resolve a global stub, rewriting
    /// the slot in place so later loads are O(1).
    fn load_symbol(
        &self,
        module: &Rc<sparnel_types::Module>,
        index: usize,
        globals: &mut GlobalTable,
    ) -> Result<Value, Fault> {
        use sparnel_types::SymbolSlot;
        match module.slot(index) {
            Some(SymbolSlot::Str(s)) => Ok(Value::Str(s)),
            Some(SymbolSlot::Value(v)) => Ok(v),
            Some(SymbolSlot::Stub(name)) => match globals.get(&name) {
                Some(value) => {
                    module.resolve(index, value.clone());
                    Ok(value)
                }
                None => Err(Fault::GlobalNotFound(name.to_string())),
            },
            Some(SymbolSlot::Func { .. }) | None => {
                Err(Fault::InvalidBytecode("bad symbol reference"))
            }
        }
    }
}

/// Strict binary operators over two values.
///
/// Numeric promotion: two ints stay int; any float makes the result
/// float. Bitwise and shift operators demand ints; `CONCAT` demands
/// strings.
fn binary_op(op: Opcode, lhs: Value, rhs: Value) -> Result<Value, Fault> {
    use Value::{Float, Int};

    let sym = op_symbol(op);
    let type_error = |l: &Value, r: &Value| {
        let found = if l.is_number() { r.type_of() } else { l.type_of() };
        Fault::WrongOperandType { op: sym, found }
    };

    match op {
        Opcode::ADD | Opcode::SUB | Opcode::MUL => {
            let v = match (&lhs, &rhs) {
                (Int(l), Int(r)) => Int(match op {
                    Opcode::ADD => l.wrapping_add(*r),
                    Opcode::SUB => l.wrapping_sub(*r),
                    _ => l.wrapping_mul(*r),
                }),
                (l, r) if l.is_number() && r.is_number() => {
                    let (l, r) = (as_f64(l), as_f64(r));
                    Float(match op {
                        Opcode::ADD => l + r,
                        Opcode::SUB => l - r,
                        _ => l * r,
                    })
                }
                (l, r) => return Err(type_error(l, r)),
            };
            Ok(v)
        }
        Opcode::DIV => match (&lhs, &rhs) {
            (Int(_), Int(0)) => Err(Fault::IntegerDivisionByZero),
            (Int(l), Int(r)) => Ok(Int(l.wrapping_div(*r))),
            // Float division by zero follows IEEE: infinity or NaN.
            (l, r) if l.is_number() && r.is_number() => Ok(Float(as_f64(l) / as_f64(r))),
            (l, r) => Err(type_error(l, r)),
        },
        Opcode::MOD => match (&lhs, &rhs) {
            (Int(_), Int(0)) => Err(Fault::IntegerModuloByZero),
            (Int(l), Int(r)) => Ok(Int(l.wrapping_rem(*r))),
            (l, r) if l.is_number() && r.is_number() => Ok(Float(as_f64(l) % as_f64(r))),
            (l, r) => Err(type_error(l, r)),
        },
        Opcode::AND | Opcode::OR | Opcode::XOR | Opcode::SHL | Opcode::SHR => {
            match (&lhs, &rhs) {
                (Int(l), Int(r)) => Ok(Int(match op {
                    Opcode::AND => l & r,
                    Opcode::OR => l | r,
                    Opcode::XOR => l ^ r,
                    // Shift counts are masked to the word width.
                    Opcode::SHL => l.wrapping_shl(*r as u32 & 63),
                    _ => l.wrapping_shr(*r as u32 & 63),
                })),
                (l, r) => Err(type_error(l, r)),
            }
        }
        Opcode::CONCAT => match (&lhs, &rhs) {
            (Value::Str(l), Value::Str(r)) => {
                let mut joint = String::with_capacity(l.len() + r.len());
                joint.push_str(l.as_str());
                joint.push_str(r.as_str());
                Ok(Value::string(joint))
            }
            (Value::Str(_), r) => Err(Fault::WrongOperandType {
                op: "..",
                found: r.type_of(),
            }),
            (l, _) => Err(Fault::WrongOperandType {
                op: "..",
                found: l.type_of(),
            }),
        },
        _ => Err(Fault::InvalidBytecode("not a binary opcode")),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn op_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::ADD => "+",
        Opcode::SUB => "-",
        Opcode::MUL => "*",
        Opcode::DIV => "/",
        Opcode::MOD => "%",
        Opcode::AND => "&",
        Opcode::OR => "|",
        Opcode::XOR => "^",
        Opcode::SHL => "<<",
        Opcode::SHR => ">>",
        Opcode::CONCAT => "..",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_rules() {
        let v = binary_op(Opcode::ADD, Value::Int(1), Value::Int(2)).unwrap();
        assert_eq!(v, Value::Int(3));
        let v = binary_op(Opcode::ADD, Value::Int(1), Value::Float(2.0)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 3.0));
        let v = binary_op(Opcode::MUL, Value::Float(0.5), Value::Int(4)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 2.0));
    }

    #[test]
    fn integer_division_faults_on_zero() {
        assert_eq!(
            binary_op(Opcode::DIV, Value::Int(1), Value::Int(0)),
            Err(Fault::IntegerDivisionByZero)
        );
        assert_eq!(
            binary_op(Opcode::MOD, Value::Int(1), Value::Int(0)),
            Err(Fault::IntegerModuloByZero)
        );
    }

    #[test]
    fn float_division_by_zero_is_ieee() {
        let v = binary_op(Opcode::DIV, Value::Float(1.0), Value::Int(0)).unwrap();
        assert!(matches!(v, Value::Float(f) if f.is_infinite()));
    }

    #[test]
    fn bitwise_demands_integers() {
        let err = binary_op(Opcode::AND, Value::Int(1), Value::Float(1.0)).unwrap_err();
        assert!(matches!(err, Fault::WrongOperandType { op: "&", .. }));
    }

    #[test]
    fn concat_demands_strings() {
        let v = binary_op(Opcode::CONCAT, Value::from("foo"), Value::from("bar")).unwrap();
        assert_eq!(v, Value::from("foobar"));
        let err = binary_op(Opcode::CONCAT, Value::from("foo"), Value::Int(1)).unwrap_err();
        assert!(matches!(err, Fault::WrongOperandType { op: "..", .. }));
    }
}
