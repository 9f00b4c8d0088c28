use std::collections::{HashMap, HashSet};

use sparnel_asm::{
    encode_name, pack_args, CaptureKind, ConstKind, FunctionHeader, Instr, Opcode, Program,
    SymbolEntry, Word,
};

use crate::ast::*;
use crate::CompileError;

/// Operand fields are 8 bits; a frame can never address more registers.
const MAX_REGISTERS: usize = 256;

/// AST → bytecode program.
///
/// Each function body draws registers from a local pool with stack
/// discipline: every sub-expression result gets a fresh register, freed on
/// the way back up, and the function header records the high-water mark.
/// Nested function bodies are emitted inline into the single executable
/// stream, preceded by their `FUNCTION` headers.
pub struct Compiler {
    code: Vec<Word>,
    symtab: Symtab,
    funcs: Vec<FuncScope>,
    consts: HashSet<String>,
}

#[derive(Default)]
struct Symtab {
    entries: Vec<SymbolEntry>,
    strings: HashMap<String, u16>,
    stubs: HashMap<String, u16>,
}

impl Symtab {
    fn next_index(&self, span: Span) -> Result<u16, CompileError> {
        u16::try_from(self.entries.len())
            .map_err(|_| CompileError::semantic(span.line, span.col, "local symbol table is full"))
    }

    fn intern_string(&mut self, s: &str, span: Span) -> Result<u16, CompileError> {
        if let Some(&idx) = self.strings.get(s) {
            return Ok(idx);
        }
        let idx = self.next_index(span)?;
        self.entries.push(SymbolEntry::StrConst(s.to_owned()));
        self.strings.insert(s.to_owned(), idx);
        Ok(idx)
    }

    fn intern_stub(&mut self, name: &str, span: Span) -> Result<u16, CompileError> {
        if let Some(&idx) = self.stubs.get(name) {
            return Ok(idx);
        }
        let idx = self.next_index(span)?;
        self.entries.push(SymbolEntry::SymStub(name.to_owned()));
        self.stubs.insert(name.to_owned(), idx);
        Ok(idx)
    }

    fn add_funcdef(&mut self, name: &str, offset: Word, span: Span) -> Result<u16, CompileError> {
        let idx = self.next_index(span)?;
        self.entries.push(SymbolEntry::FuncDef {
            name: name.to_owned(),
            offset,
        });
        Ok(idx)
    }
}

struct Scope {
    base_reg: usize,
    names: Vec<(String, u8)>,
}

struct LoopCtx {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

struct FuncScope {
    scopes: Vec<Scope>,
    next_reg: usize,
    max_reg: usize,
    loops: Vec<LoopCtx>,
    captures: Vec<(CaptureKind, u8)>,
    capture_names: HashMap<String, u8>,
    /// Free names assigned anywhere in this body: globals throughout.
    assigned_free: HashSet<String>,
    top_level: bool,
}

impl FuncScope {
    fn new(top_level: bool, assigned_free: HashSet<String>) -> Self {
        Self {
            scopes: Vec::new(),
            next_reg: 0,
            max_reg: 0,
            loops: Vec::new(),
            captures: Vec::new(),
            capture_names: HashMap::new(),
            assigned_free,
            top_level,
        }
    }

    fn resolve_local(&self, name: &str) -> Option<u8> {
        // Innermost scope wins: shadowing is permitted.
        self.scopes.iter().rev().find_map(|scope| {
            scope
                .names
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|&(_, reg)| reg)
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Fresh compiler with an empty symbol table.
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            symtab: Symtab::default(),
            funcs: Vec::new(),
            consts: HashSet::new(),
        }
    }

    /// Compile a program's statements into a top-level unit.
    pub fn compile(mut self, stmts: &[Stmt]) -> Result<Program, CompileError> {
        self.funcs
            .push(FuncScope::new(true, collect_assigned(stmts, &[])));
        self.push_scope();
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        // Implicit `return nil;` closes every unit.
        let span = stmts.last().map(|s| s.span).unwrap_or_default();
        let r = self.alloc_reg(span)?;
        self.emit(Instr::abc(Opcode::LDCONST, r, ConstKind::Nil as u8, 0));
        self.emit(Instr::abc(Opcode::RET, r, 0, 0));
        self.free_reg(r);
        self.pop_scope();

        let func = self.funcs.pop().expect("top-level scope");
        Ok(Program::new(
            0,
            func.max_reg as Word,
            self.code,
            self.symtab.entries,
        ))
    }

    // ---- emission helpers ----

    fn emit(&mut self, instr: Instr) {
        self.code.push(instr.into());
    }

    fn emit_word(&mut self, word: Word) {
        self.code.push(word);
    }

    /// Emit a jump and return the position of its patchable offset word.
    fn emit_jump(&mut self, op: Opcode, cond: u8) -> usize {
        self.emit(Instr::abc(op, cond, 0, 0));
        self.code.push(0);
        self.code.len() - 1
    }

    /// Point a previously emitted jump at the current position.
    fn patch_jump(&mut self, offset_pos: usize) {
        // Offsets are measured from the instruction after the offset word.
        let off = self.code.len() as i64 - (offset_pos as i64 + 1);
        self.code[offset_pos] = off as i32 as Word;
    }

    /// Emit a jump to a known (usually earlier) position.
    fn emit_jump_to(&mut self, op: Opcode, cond: u8, target: usize) {
        self.emit(Instr::abc(op, cond, 0, 0));
        let off = target as i64 - (self.code.len() as i64 + 1);
        self.code.push(off as i32 as Word);
    }

    fn emit_load_int(&mut self, dst: u8, value: i64) {
        self.emit(Instr::abc(Opcode::LDCONST, dst, ConstKind::Int as u8, 0));
        let bits = value as u64;
        self.emit_word(bits as Word);
        self.emit_word((bits >> 32) as Word);
    }

    fn emit_load_float(&mut self, dst: u8, value: f64) {
        self.emit(Instr::abc(Opcode::LDCONST, dst, ConstKind::Float as u8, 0));
        let bits = value.to_bits();
        self.emit_word(bits as Word);
        self.emit_word((bits >> 32) as Word);
    }

    fn emit_glbval(&mut self, name: &str, src: u8, span: Span) -> Result<(), CompileError> {
        let len = u8::try_from(name.len()).map_err(|_| {
            CompileError::semantic(span.line, span.col, format!("global name `{name}` too long"))
        })?;
        self.emit(Instr::abc(Opcode::GLBVAL, src, len, 0));
        for word in encode_name(name) {
            self.emit_word(word);
        }
        Ok(())
    }

    // ---- register pool ----

    fn func(&mut self) -> &mut FuncScope {
        self.funcs.last_mut().expect("function scope")
    }

    fn alloc_reg(&mut self, span: Span) -> Result<u8, CompileError> {
        let func = self.func();
        if func.next_reg >= MAX_REGISTERS {
            return Err(CompileError::semantic(
                span.line,
                span.col,
                "function needs too many registers",
            ));
        }
        let reg = func.next_reg as u8;
        func.next_reg += 1;
        func.max_reg = func.max_reg.max(func.next_reg);
        Ok(reg)
    }

    fn free_reg(&mut self, reg: u8) {
        let func = self.func();
        debug_assert_eq!(func.next_reg, reg as usize + 1, "register pool is a stack");
        func.next_reg = reg as usize;
    }

    fn push_scope(&mut self) {
        let base_reg = self.func().next_reg;
        self.func().scopes.push(Scope {
            base_reg,
            names: Vec::new(),
        });
    }

    fn pop_scope(&mut self) {
        let scope = self.func().scopes.pop().expect("scope");
        self.func().next_reg = scope.base_reg;
    }

    fn bind_local(&mut self, name: &str, reg: u8) {
        self.func()
            .scopes
            .last_mut()
            .expect("scope")
            .names
            .push((name.to_owned(), reg));
    }

    // ---- statements ----

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Var { name, init } => {
                let reg = match init {
                    Some(expr) => self.named_init(expr, name)?,
                    None => {
                        let reg = self.alloc_reg(span)?;
                        self.emit(Instr::abc(Opcode::LDCONST, reg, ConstKind::Nil as u8, 0));
                        reg
                    }
                };
                // Bound after the initializer: `var x = x;` reads the
                // outer `x`.
                self.bind_local(name, reg);
            }
            StmtKind::Const { name, init } => {
                if self.funcs.len() > 1 {
                    return Err(CompileError::semantic(
                        span.line,
                        span.col,
                        "`const` is only allowed at the top level",
                    ));
                }
                if !self.consts.insert(name.clone()) {
                    return Err(CompileError::semantic(
                        span.line,
                        span.col,
                        format!("duplicate constant `{name}`"),
                    ));
                }
                let reg = self.named_init(init, name)?;
                self.emit_glbval(name, reg, span)?;
                self.free_reg(reg);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.expr(cond)?;
                let skip_then = self.emit_jump(Opcode::JZE, c);
                self.free_reg(c);
                self.stmt(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let skip_else = self.emit_jump(Opcode::JMP, 0);
                        self.patch_jump(skip_then);
                        self.stmt(else_branch)?;
                        self.patch_jump(skip_else);
                    }
                    None => self.patch_jump(skip_then),
                }
            }
            StmtKind::While { cond, body } => {
                let top = self.code.len();
                let c = self.expr(cond)?;
                let exit = self.emit_jump(Opcode::JZE, c);
                self.free_reg(c);
                self.func().loops.push(LoopCtx {
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                self.stmt(body)?;
                self.emit_jump_to(Opcode::JMP, 0, top);
                self.patch_jump(exit);
                self.finish_loop(top);
            }
            StmtKind::DoWhile { body, cond } => {
                let top = self.code.len();
                self.func().loops.push(LoopCtx {
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                self.stmt(body)?;
                let cond_at = self.code.len();
                let c = self.expr(cond)?;
                self.emit_jump_to(Opcode::JNZ, c, top);
                self.free_reg(c);
                self.finish_loop(cond_at);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.push_scope();
                if let Some(init) = init {
                    self.stmt(init)?;
                }
                let top = self.code.len();
                let exit = match cond {
                    Some(cond) => {
                        let c = self.expr(cond)?;
                        let exit = self.emit_jump(Opcode::JZE, c);
                        self.free_reg(c);
                        Some(exit)
                    }
                    None => None,
                };
                self.func().loops.push(LoopCtx {
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                self.stmt(body)?;
                let step_at = self.code.len();
                if let Some(step) = step {
                    let s = self.expr(step)?;
                    self.free_reg(s);
                }
                self.emit_jump_to(Opcode::JMP, 0, top);
                if let Some(exit) = exit {
                    self.patch_jump(exit);
                }
                self.finish_loop(step_at);
                self.pop_scope();
            }
            StmtKind::Break => {
                if self.func().loops.is_empty() {
                    return Err(CompileError::semantic(
                        span.line,
                        span.col,
                        "`break` outside of a loop",
                    ));
                }
                let jump = self.emit_jump(Opcode::JMP, 0);
                self.func().loops.last_mut().expect("loop").breaks.push(jump);
            }
            StmtKind::Continue => {
                if self.func().loops.is_empty() {
                    return Err(CompileError::semantic(
                        span.line,
                        span.col,
                        "`continue` outside of a loop",
                    ));
                }
                let jump = self.emit_jump(Opcode::JMP, 0);
                self.func()
                    .loops
                    .last_mut()
                    .expect("loop")
                    .continues
                    .push(jump);
            }
            StmtKind::Return(value) => {
                let reg = match value {
                    Some(expr) => self.expr(expr)?,
                    None => {
                        let reg = self.alloc_reg(span)?;
                        self.emit(Instr::abc(Opcode::LDCONST, reg, ConstKind::Nil as u8, 0));
                        reg
                    }
                };
                self.emit(Instr::abc(Opcode::RET, reg, 0, 0));
                self.free_reg(reg);
            }
            StmtKind::Block(stmts) => {
                self.push_scope();
                for stmt in stmts {
                    self.stmt(stmt)?;
                }
                self.pop_scope();
            }
            StmtKind::Expr(expr) => {
                let reg = self.expr(expr)?;
                self.free_reg(reg);
            }
            StmtKind::Empty => {}
        }
        Ok(())
    }

    /// Compile a declaration initializer, naming function literals after
    /// the declared variable.
    fn named_init(&mut self, init: &Expr, name: &str) -> Result<u8, CompileError> {
        match &init.kind {
            ExprKind::Lambda(lit) => self.lambda(lit, Some(name)),
            _ => self.expr(init),
        }
    }

    /// Patch a finished loop's `break`s to the current position and its
    /// `continue`s to `continue_target`.
    fn finish_loop(&mut self, continue_target: usize) {
        let ctx = self.func().loops.pop().expect("loop context");
        for jump in ctx.breaks {
            self.patch_jump(jump);
        }
        for jump in ctx.continues {
            let off = continue_target as i64 - (jump as i64 + 1);
            self.code[jump] = off as i32 as Word;
        }
    }

    // ---- expressions ----

    /// Compile an expression into a freshly allocated register, returned
    /// to the caller, who owns (and must free) it.
    fn expr(&mut self, expr: &Expr) -> Result<u8, CompileError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Nil => self.load_simple(ConstKind::Nil, span),
            ExprKind::True => self.load_simple(ConstKind::True, span),
            ExprKind::False => self.load_simple(ConstKind::False, span),
            ExprKind::Int(i) => {
                let r = self.alloc_reg(span)?;
                self.emit_load_int(r, *i);
                Ok(r)
            }
            ExprKind::Float(f) => {
                let r = self.alloc_reg(span)?;
                self.emit_load_float(r, *f);
                Ok(r)
            }
            ExprKind::Str(s) => {
                let idx = self.symtab.intern_string(s, span)?;
                let r = self.alloc_reg(span)?;
                self.emit(Instr::sym(Opcode::LDSYM, r, idx));
                Ok(r)
            }
            ExprKind::Ident(name) => self.load_ident(name, span),
            ExprKind::ScriptArg(n) => {
                let r = self.alloc_reg(span)?;
                self.emit_load_int(r, *n as i64);
                self.emit(Instr::abc(Opcode::NTHARG, r, r, 0));
                Ok(r)
            }
            ExprKind::ArgCount => {
                let r = self.alloc_reg(span)?;
                self.emit(Instr::abc(Opcode::LDARGC, r, 0, 0));
                Ok(r)
            }
            ExprKind::Aggregate(items) => self.aggregate(items, span),
            ExprKind::Unary { op, expr } => {
                let r = self.expr(expr)?;
                let opcode = match op {
                    UnOp::Neg => Opcode::NEG,
                    UnOp::BitNot => Opcode::BITNOT,
                    UnOp::Not => Opcode::LOGNOT,
                };
                self.emit(Instr::abc(opcode, r, r, 0));
                Ok(r)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs)?;
                let r = self.expr(rhs)?;
                self.emit(Instr::abc(bin_opcode(*op), l, l, r));
                self.free_reg(r);
                Ok(l)
            }
            ExprKind::Logical { op, lhs, rhs } => self.logical(*op, lhs, rhs),
            ExprKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                let r = self.expr(cond)?;
                let to_else = self.emit_jump(Opcode::JZE, r);
                let t = self.expr(then_branch)?;
                self.emit(Instr::abc(Opcode::MOV, r, t, 0));
                self.free_reg(t);
                let to_end = self.emit_jump(Opcode::JMP, 0);
                self.patch_jump(to_else);
                let e = self.expr(else_branch)?;
                self.emit(Instr::abc(Opcode::MOV, r, e, 0));
                self.free_reg(e);
                self.patch_jump(to_end);
                Ok(r)
            }
            ExprKind::Assign { target, op, value } => self.assign(target, *op, value),
            ExprKind::Call { callee, args } => {
                if args.len() > u8::MAX as usize {
                    return Err(CompileError::semantic(
                        span.line,
                        span.col,
                        "too many call arguments",
                    ));
                }
                let f = self.expr(callee)?;
                let mut arg_regs = Vec::with_capacity(args.len());
                for arg in args {
                    arg_regs.push(self.expr(arg)?);
                }
                self.emit(Instr::abc(Opcode::CALL, f, f, args.len() as u8));
                for word in pack_args(&arg_regs) {
                    self.emit_word(word);
                }
                for reg in arg_regs.into_iter().rev() {
                    self.free_reg(reg);
                }
                Ok(f)
            }
            ExprKind::Index { obj, index } => {
                let o = self.expr(obj)?;
                let k = self.expr(index)?;
                self.emit(Instr::abc(Opcode::ARRGET, o, o, k));
                self.free_reg(k);
                Ok(o)
            }
            ExprKind::Member { obj, name } => {
                let o = self.expr(obj)?;
                let idx = self.symtab.intern_string(name, span)?;
                let k = self.alloc_reg(span)?;
                self.emit(Instr::sym(Opcode::LDSYM, k, idx));
                self.emit(Instr::abc(Opcode::ARRGET, o, o, k));
                self.free_reg(k);
                Ok(o)
            }
            ExprKind::Lambda(lit) => self.lambda(lit, None),
            ExprKind::Sizeof(e) => {
                let r = self.expr(e)?;
                self.emit(Instr::abc(Opcode::SIZEOF, r, r, 0));
                Ok(r)
            }
            ExprKind::Typeof(e) => {
                let r = self.expr(e)?;
                self.emit(Instr::abc(Opcode::TYPEOF, r, r, 0));
                Ok(r)
            }
        }
    }

    fn load_simple(&mut self, kind: ConstKind, span: Span) -> Result<u8, CompileError> {
        let r = self.alloc_reg(span)?;
        self.emit(Instr::abc(Opcode::LDCONST, r, kind as u8, 0));
        Ok(r)
    }

    /// Identifier read: local register, else global when the name is
    /// assigned in this body, else upvalue capture, else global stub.
    fn load_ident(&mut self, name: &str, span: Span) -> Result<u8, CompileError> {
        if let Some(local) = self.func().resolve_local(name) {
            let r = self.alloc_reg(span)?;
            self.emit(Instr::abc(Opcode::MOV, r, local, 0));
            return Ok(r);
        }
        let fi = self.funcs.len() - 1;
        if !self.funcs[fi].top_level && !self.funcs[fi].assigned_free.contains(name) {
            if let Some(upval) = self.resolve_upvalue(fi, name, span)? {
                let r = self.alloc_reg(span)?;
                self.emit(Instr::abc(Opcode::LDUPVAL, r, upval, 0));
                return Ok(r);
            }
        }
        let idx = self.symtab.intern_stub(name, span)?;
        let r = self.alloc_reg(span)?;
        self.emit(Instr::sym(Opcode::LDSYM, r, idx));
        Ok(r)
    }

    /// Resolve `name` as an upvalue of function `fi`, materializing the
    /// capture chain through enclosing functions.
    fn resolve_upvalue(
        &mut self,
        fi: usize,
        name: &str,
        span: Span,
    ) -> Result<Option<u8>, CompileError> {
        if fi == 0 {
            return Ok(None);
        }
        if let Some(&upval) = self.funcs[fi].capture_names.get(name) {
            return Ok(Some(upval));
        }
        if let Some(reg) = self.funcs[fi - 1].resolve_local(name) {
            return Ok(Some(self.add_capture(fi, name, CaptureKind::Local, reg, span)?));
        }
        if let Some(outer) = self.resolve_upvalue(fi - 1, name, span)? {
            return Ok(Some(self.add_capture(fi, name, CaptureKind::Outer, outer, span)?));
        }
        Ok(None)
    }

    fn add_capture(
        &mut self,
        fi: usize,
        name: &str,
        kind: CaptureKind,
        index: u8,
        span: Span,
    ) -> Result<u8, CompileError> {
        let func = &mut self.funcs[fi];
        let upval = u8::try_from(func.captures.len()).map_err(|_| {
            CompileError::semantic(span.line, span.col, "function captures too many upvalues")
        })?;
        func.captures.push((kind, index));
        func.capture_names.insert(name.to_owned(), upval);
        Ok(upval)
    }

    fn logical(&mut self, op: LogOp, lhs: &Expr, rhs: &Expr) -> Result<u8, CompileError> {
        let r = self.expr(lhs)?;
        let (short, long) = match op {
            LogOp::And => (Opcode::JZE, ConstKind::False),
            LogOp::Or => (Opcode::JNZ, ConstKind::True),
        };
        let short1 = self.emit_jump(short, r);
        let v = self.expr(rhs)?;
        self.emit(Instr::abc(Opcode::MOV, r, v, 0));
        self.free_reg(v);
        let short2 = self.emit_jump(short, r);
        // Both operands fell through: the result is the other constant.
        let other = match op {
            LogOp::And => ConstKind::True,
            LogOp::Or => ConstKind::False,
        };
        self.emit(Instr::abc(Opcode::LDCONST, r, other as u8, 0));
        let done = self.emit_jump(Opcode::JMP, 0);
        self.patch_jump(short1);
        self.patch_jump(short2);
        self.emit(Instr::abc(Opcode::LDCONST, r, long as u8, 0));
        self.patch_jump(done);
        Ok(r)
    }

    fn aggregate(&mut self, items: &[AggrItem], span: Span) -> Result<u8, CompileError> {
        let arr = self.alloc_reg(span)?;
        self.emit(Instr::abc(Opcode::NEWARR, arr, 0, 0));
        let mut next_index = 0i64;
        for item in items {
            match item {
                AggrItem::Positional(value) => {
                    let k = self.alloc_reg(value.span)?;
                    self.emit_load_int(k, next_index);
                    next_index += 1;
                    let v = self.expr(value)?;
                    self.emit(Instr::abc(Opcode::ARRSET, arr, k, v));
                    self.free_reg(v);
                    self.free_reg(k);
                }
                AggrItem::Keyed(key, value) => {
                    let k = self.expr(key)?;
                    let v = self.expr(value)?;
                    self.emit(Instr::abc(Opcode::ARRSET, arr, k, v));
                    self.free_reg(v);
                    self.free_reg(k);
                }
            }
        }
        Ok(arr)
    }

    fn assign(
        &mut self,
        target: &Expr,
        op: Option<BinOp>,
        value: &Expr,
    ) -> Result<u8, CompileError> {
        let span = target.span;
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(local) = self.func().resolve_local(name) {
                    // `x += 1` and `x -= 1` touch the register in place.
                    if let Some(step) = inc_dec(op, value) {
                        self.emit(Instr::abc(step, local, 0, 0));
                        let r = self.alloc_reg(span)?;
                        self.emit(Instr::abc(Opcode::MOV, r, local, 0));
                        return Ok(r);
                    }
                    let v = self.expr(value)?;
                    if let Some(op) = op {
                        self.emit(Instr::abc(bin_opcode(op), v, local, v));
                    }
                    self.emit(Instr::abc(Opcode::MOV, local, v, 0));
                    return Ok(v);
                }
                // Free names assigned in this body are globals by policy;
                // the store goes through the context's global table.
                match op {
                    None => {
                        let v = self.expr(value)?;
                        self.emit_glbval(name, v, span)?;
                        Ok(v)
                    }
                    Some(op) => {
                        let idx = self.symtab.intern_stub(name, span)?;
                        let g = self.alloc_reg(span)?;
                        self.emit(Instr::sym(Opcode::LDSYM, g, idx));
                        let v = self.expr(value)?;
                        self.emit(Instr::abc(bin_opcode(op), g, g, v));
                        self.free_reg(v);
                        self.emit_glbval(name, g, span)?;
                        Ok(g)
                    }
                }
            }
            ExprKind::Index { obj, index } => {
                let o = self.expr(obj)?;
                let k = self.expr(index)?;
                self.keyed_store(o, k, op, value)
            }
            ExprKind::Member { obj, name } => {
                let o = self.expr(obj)?;
                let idx = self.symtab.intern_string(name, span)?;
                let k = self.alloc_reg(span)?;
                self.emit(Instr::sym(Opcode::LDSYM, k, idx));
                self.keyed_store(o, k, op, value)
            }
            _ => Err(CompileError::semantic(
                span.line,
                span.col,
                "invalid assignment target",
            )),
        }
    }

    /// Store into `obj[key]`, leaving the stored value in the (reused)
    /// object register.
    fn keyed_store(
        &mut self,
        obj: u8,
        key: u8,
        op: Option<BinOp>,
        value: &Expr,
    ) -> Result<u8, CompileError> {
        match op {
            None => {
                let v = self.expr(value)?;
                self.emit(Instr::abc(Opcode::ARRSET, obj, key, v));
                self.emit(Instr::abc(Opcode::MOV, obj, v, 0));
                self.free_reg(v);
                self.free_reg(key);
                Ok(obj)
            }
            Some(op) => {
                let cur = self.alloc_reg(value.span)?;
                self.emit(Instr::abc(Opcode::ARRGET, cur, obj, key));
                let v = self.expr(value)?;
                self.emit(Instr::abc(bin_opcode(op), cur, cur, v));
                self.free_reg(v);
                self.emit(Instr::abc(Opcode::ARRSET, obj, key, cur));
                self.emit(Instr::abc(Opcode::MOV, obj, cur, 0));
                self.free_reg(cur);
                self.free_reg(key);
                Ok(obj)
            }
        }
    }

    fn lambda(&mut self, lit: &FnLit, name: Option<&str>) -> Result<u8, CompileError> {
        let span = lit.span;
        if lit.params.len() > u8::MAX as usize {
            return Err(CompileError::semantic(
                span.line,
                span.col,
                "too many parameters",
            ));
        }

        let dst = self.alloc_reg(span)?;
        self.emit(Instr::abc(Opcode::FUNCTION, dst, 0, 0));
        let header_at = self.code.len();
        for _ in 0..FunctionHeader::LEN {
            self.emit_word(0);
        }
        let sym_index =
            self.symtab
                .add_funcdef(name.unwrap_or("<lambda>"), header_at as Word, span)?;

        self.funcs.push(FuncScope::new(
            false,
            collect_assigned(&lit.body, &lit.params),
        ));
        self.push_scope();
        for param in &lit.params {
            let reg = self.alloc_reg(span)?;
            self.bind_local(param, reg);
        }
        for stmt in &lit.body {
            self.stmt(stmt)?;
        }
        let r = self.alloc_reg(span)?;
        self.emit(Instr::abc(Opcode::LDCONST, r, ConstKind::Nil as u8, 0));
        self.emit(Instr::abc(Opcode::RET, r, 0, 0));
        self.free_reg(r);
        self.pop_scope();
        let func = self.funcs.pop().expect("lambda scope");

        let body_len = self.code.len() - (header_at + FunctionHeader::LEN);
        self.code[header_at] = body_len as Word;
        self.code[header_at + 1] = lit.params.len() as Word;
        self.code[header_at + 2] = func.max_reg as Word;
        self.code[header_at + 3] = sym_index as Word;

        if !func.captures.is_empty() {
            self.emit(Instr::abc(
                Opcode::CLOSURE,
                dst,
                func.captures.len() as u8,
                0,
            ));
            for (kind, index) in func.captures {
                self.emit(Instr::long(kind as u8, index as u32));
            }
        }
        Ok(dst)
    }
}

fn bin_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::ADD,
        BinOp::Sub => Opcode::SUB,
        BinOp::Mul => Opcode::MUL,
        BinOp::Div => Opcode::DIV,
        BinOp::Mod => Opcode::MOD,
        BinOp::BitAnd => Opcode::AND,
        BinOp::BitOr => Opcode::OR,
        BinOp::BitXor => Opcode::XOR,
        BinOp::Shl => Opcode::SHL,
        BinOp::Shr => Opcode::SHR,
        BinOp::Eq => Opcode::EQ,
        BinOp::Ne => Opcode::NE,
        BinOp::Lt => Opcode::LT,
        BinOp::Le => Opcode::LE,
        BinOp::Gt => Opcode::GT,
        BinOp::Ge => Opcode::GE,
        BinOp::Concat => Opcode::CONCAT,
    }
}

/// `x += 1` / `x -= 1` lower to the in-place register ops.
fn inc_dec(op: Option<BinOp>, value: &Expr) -> Option<Opcode> {
    match (op, &value.kind) {
        (Some(BinOp::Add), ExprKind::Int(1)) => Some(Opcode::INC),
        (Some(BinOp::Sub), ExprKind::Int(1)) => Some(Opcode::DEC),
        _ => None,
    }
}

/// Names assigned (as bare identifiers) anywhere in a function body that
/// are not declared locals or parameters of that body. Nested function
/// literals are separate bodies and are not descended into.
fn collect_assigned(body: &[Stmt], params: &[String]) -> HashSet<String> {
    let mut assigned = HashSet::new();
    let mut declared: HashSet<String> = params.iter().cloned().collect();
    for stmt in body {
        walk_stmt(stmt, &mut assigned, &mut declared);
    }
    &assigned - &declared
}

fn walk_stmt(stmt: &Stmt, assigned: &mut HashSet<String>, declared: &mut HashSet<String>) {
    match &stmt.kind {
        StmtKind::Var { name, init } => {
            if let Some(init) = init {
                walk_expr(init, assigned, declared);
            }
            declared.insert(name.clone());
        }
        StmtKind::Const { init, .. } => walk_expr(init, assigned, declared),
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            walk_expr(cond, assigned, declared);
            walk_stmt(then_branch, assigned, declared);
            if let Some(else_branch) = else_branch {
                walk_stmt(else_branch, assigned, declared);
            }
        }
        StmtKind::While { cond, body } => {
            walk_expr(cond, assigned, declared);
            walk_stmt(body, assigned, declared);
        }
        StmtKind::DoWhile { body, cond } => {
            walk_stmt(body, assigned, declared);
            walk_expr(cond, assigned, declared);
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                walk_stmt(init, assigned, declared);
            }
            if let Some(cond) = cond {
                walk_expr(cond, assigned, declared);
            }
            if let Some(step) = step {
                walk_expr(step, assigned, declared);
            }
            walk_stmt(body, assigned, declared);
        }
        StmtKind::Return(Some(expr)) => walk_expr(expr, assigned, declared),
        StmtKind::Block(stmts) => {
            for stmt in stmts {
                walk_stmt(stmt, assigned, declared);
            }
        }
        StmtKind::Expr(expr) => walk_expr(expr, assigned, declared),
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
    }
}

fn walk_expr(expr: &Expr, assigned: &mut HashSet<String>, declared: &mut HashSet<String>) {
    match &expr.kind {
        ExprKind::Assign { target, value, .. } => {
            if let ExprKind::Ident(name) = &target.kind {
                assigned.insert(name.clone());
            } else {
                walk_expr(target, assigned, declared);
            }
            walk_expr(value, assigned, declared);
        }
        ExprKind::Unary { expr, .. }
        | ExprKind::Sizeof(expr)
        | ExprKind::Typeof(expr) => walk_expr(expr, assigned, declared),
        ExprKind::Binary { lhs, rhs, .. } | ExprKind::Logical { lhs, rhs, .. } => {
            walk_expr(lhs, assigned, declared);
            walk_expr(rhs, assigned, declared);
        }
        ExprKind::Ternary {
            cond,
            then_branch,
            else_branch,
        } => {
            walk_expr(cond, assigned, declared);
            walk_expr(then_branch, assigned, declared);
            walk_expr(else_branch, assigned, declared);
        }
        ExprKind::Call { callee, args } => {
            walk_expr(callee, assigned, declared);
            for arg in args {
                walk_expr(arg, assigned, declared);
            }
        }
        ExprKind::Index { obj, index } => {
            walk_expr(obj, assigned, declared);
            walk_expr(index, assigned, declared);
        }
        ExprKind::Member { obj, .. } => walk_expr(obj, assigned, declared),
        ExprKind::Aggregate(items) => {
            for item in items {
                match item {
                    AggrItem::Positional(e) => walk_expr(e, assigned, declared),
                    AggrItem::Keyed(k, v) => {
                        walk_expr(k, assigned, declared);
                        walk_expr(v, assigned, declared);
                    }
                }
            }
        }
        // A nested literal is its own body with its own policy.
        ExprKind::Lambda(_) => {}
        ExprKind::Nil
        | ExprKind::True
        | ExprKind::False
        | ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_)
        | ExprKind::Ident(_)
        | ExprKind::ScriptArg(_)
        | ExprKind::ArgCount => {}
    }
}
