//! Typed syntax tree. Every construct gets its own variant with named
//! child slots; nodes carry the source span of their introducing token.

use core::fmt::Write as _;

/// Source position of a node's introducing token.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// 1-indexed line.
    pub line: u32,
    /// 1-indexed column.
    pub col: u32,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UnOp {
    Neg,
    BitNot,
    Not,
}

/// Binary operators with register-machine counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
}

/// Short-circuiting logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LogOp {
    And,
    Or,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Variant and children.
    pub kind: ExprKind,
    /// Source position.
    pub span: Span,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// Integer literal.
    Int(i64),
    /// Floating literal.
    Float(f64),
    /// String literal.
    Str(String),
    /// Identifier use.
    Ident(String),
    /// `#N`: the Nth command-line argument of the script.
    ScriptArg(u32),
    /// `argc`: the script argument count.
    ArgCount,
    /// Brace aggregate literal.
    Aggregate(Vec<AggrItem>),
    /// Prefix operator application.
    Unary {
        /// Operator.
        op: UnOp,
        /// Operand.
        expr: Box<Expr>,
    },
    /// Strict binary operator application.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Short-circuiting `&&` / `||`.
    Logical {
        /// Operator.
        op: LogOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand, evaluated conditionally.
        rhs: Box<Expr>,
    },
    /// `cond ? then : else`
    Ternary {
        /// Condition.
        cond: Box<Expr>,
        /// Value when truthy.
        then_branch: Box<Expr>,
        /// Value when falsy.
        else_branch: Box<Expr>,
    },
    /// Plain or compound assignment.
    Assign {
        /// Assignable target: identifier, subscript or member.
        target: Box<Expr>,
        /// `Some(op)` for compound forms such as `+=`.
        op: Option<BinOp>,
        /// Right-hand side.
        value: Box<Expr>,
    },
    /// Function call.
    Call {
        /// Callee expression.
        callee: Box<Expr>,
        /// Arguments in order.
        args: Vec<Expr>,
    },
    /// Subscript read.
    Index {
        /// Aggregate expression.
        obj: Box<Expr>,
        /// Key expression.
        index: Box<Expr>,
    },
    /// `obj.name`, sugar for a string-keyed subscript.
    Member {
        /// Aggregate expression.
        obj: Box<Expr>,
        /// Member name.
        name: String,
    },
    /// `fn (params) { body }`
    Lambda(FnLit),
    /// `sizeof expr`
    Sizeof(Box<Expr>),
    /// `typeof expr`
    Typeof(Box<Expr>),
}

/// One item of a brace aggregate literal.
#[derive(Debug, Clone, PartialEq)]
pub enum AggrItem {
    /// Positional element, keyed by its index.
    Positional(Expr),
    /// `key: value` element.
    Keyed(Expr, Expr),
}

/// A function literal.
#[derive(Debug, Clone, PartialEq)]
pub struct FnLit {
    /// Parameter names in order.
    pub params: Vec<String>,
    /// Body statements.
    pub body: Vec<Stmt>,
    /// Position of the `fn` keyword.
    pub span: Span,
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Variant and children.
    pub kind: StmtKind,
    /// Source position.
    pub span: Span,
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `var name = init;`
    Var {
        /// Declared name.
        name: String,
        /// Optional initializer; nil otherwise.
        init: Option<Expr>,
    },
    /// `const name = init;` — a global, top level only.
    Const {
        /// Declared name.
        name: String,
        /// Initializer.
        init: Expr,
    },
    /// `if (cond) then else`
    If {
        /// Condition.
        cond: Expr,
        /// Taken branch.
        then_branch: Box<Stmt>,
        /// Optional alternative.
        else_branch: Option<Box<Stmt>>,
    },
    /// `while (cond) body`
    While {
        /// Condition.
        cond: Expr,
        /// Loop body.
        body: Box<Stmt>,
    },
    /// `do body while (cond);`
    DoWhile {
        /// Loop body, executed at least once.
        body: Box<Stmt>,
        /// Condition.
        cond: Expr,
    },
    /// `for (init; cond; step) body`
    For {
        /// Optional initializer statement.
        init: Option<Box<Stmt>>,
        /// Optional condition; infinite when absent.
        cond: Option<Expr>,
        /// Optional step expression.
        step: Option<Expr>,
        /// Loop body.
        body: Box<Stmt>,
    },
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `return expr?;`
    Return(Option<Expr>),
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// Expression statement.
    Expr(Expr),
    /// `;`
    Empty,
}

/// Render a program's AST as an indented tree, for `--dump-ast`.
pub fn dump(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for stmt in stmts {
        dump_stmt(stmt, 0, &mut out);
    }
    out
}

fn pad(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn dump_stmt(stmt: &Stmt, depth: usize, out: &mut String) {
    pad(depth, out);
    match &stmt.kind {
        StmtKind::Var { name, init } => {
            let _ = writeln!(out, "var {name}");
            if let Some(init) = init {
                dump_expr(init, depth + 1, out);
            }
        }
        StmtKind::Const { name, init } => {
            let _ = writeln!(out, "const {name}");
            dump_expr(init, depth + 1, out);
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let _ = writeln!(out, "if");
            dump_expr(cond, depth + 1, out);
            dump_stmt(then_branch, depth + 1, out);
            if let Some(else_branch) = else_branch {
                pad(depth, out);
                let _ = writeln!(out, "else");
                dump_stmt(else_branch, depth + 1, out);
            }
        }
        StmtKind::While { cond, body } => {
            let _ = writeln!(out, "while");
            dump_expr(cond, depth + 1, out);
            dump_stmt(body, depth + 1, out);
        }
        StmtKind::DoWhile { body, cond } => {
            let _ = writeln!(out, "do-while");
            dump_stmt(body, depth + 1, out);
            dump_expr(cond, depth + 1, out);
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            let _ = writeln!(out, "for");
            if let Some(init) = init {
                dump_stmt(init, depth + 1, out);
            }
            if let Some(cond) = cond {
                dump_expr(cond, depth + 1, out);
            }
            if let Some(step) = step {
                dump_expr(step, depth + 1, out);
            }
            dump_stmt(body, depth + 1, out);
        }
        StmtKind::Break => {
            let _ = writeln!(out, "break");
        }
        StmtKind::Continue => {
            let _ = writeln!(out, "continue");
        }
        StmtKind::Return(expr) => {
            let _ = writeln!(out, "return");
            if let Some(expr) = expr {
                dump_expr(expr, depth + 1, out);
            }
        }
        StmtKind::Block(stmts) => {
            let _ = writeln!(out, "block");
            for stmt in stmts {
                dump_stmt(stmt, depth + 1, out);
            }
        }
        StmtKind::Expr(expr) => {
            let _ = writeln!(out, "expr");
            dump_expr(expr, depth + 1, out);
        }
        StmtKind::Empty => {
            let _ = writeln!(out, "empty");
        }
    }
}

fn dump_expr(expr: &Expr, depth: usize, out: &mut String) {
    pad(depth, out);
    match &expr.kind {
        ExprKind::Nil => {
            let _ = writeln!(out, "nil");
        }
        ExprKind::True => {
            let _ = writeln!(out, "true");
        }
        ExprKind::False => {
            let _ = writeln!(out, "false");
        }
        ExprKind::Int(i) => {
            let _ = writeln!(out, "int {i}");
        }
        ExprKind::Float(f) => {
            let _ = writeln!(out, "float {f}");
        }
        ExprKind::Str(s) => {
            let _ = writeln!(out, "string {s:?}");
        }
        ExprKind::Ident(name) => {
            let _ = writeln!(out, "ident {name}");
        }
        ExprKind::ScriptArg(n) => {
            let _ = writeln!(out, "script-arg #{n}");
        }
        ExprKind::ArgCount => {
            let _ = writeln!(out, "argc");
        }
        ExprKind::Aggregate(items) => {
            let _ = writeln!(out, "aggregate");
            for item in items {
                match item {
                    AggrItem::Positional(e) => dump_expr(e, depth + 1, out),
                    AggrItem::Keyed(k, v) => {
                        pad(depth + 1, out);
                        let _ = writeln!(out, "keyed");
                        dump_expr(k, depth + 2, out);
                        dump_expr(v, depth + 2, out);
                    }
                }
            }
        }
        ExprKind::Unary { op, expr } => {
            let _ = writeln!(out, "unary {op:?}");
            dump_expr(expr, depth + 1, out);
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let _ = writeln!(out, "binary {op:?}");
            dump_expr(lhs, depth + 1, out);
            dump_expr(rhs, depth + 1, out);
        }
        ExprKind::Logical { op, lhs, rhs } => {
            let _ = writeln!(out, "logical {op:?}");
            dump_expr(lhs, depth + 1, out);
            dump_expr(rhs, depth + 1, out);
        }
        ExprKind::Ternary {
            cond,
            then_branch,
            else_branch,
        } => {
            let _ = writeln!(out, "ternary");
            dump_expr(cond, depth + 1, out);
            dump_expr(then_branch, depth + 1, out);
            dump_expr(else_branch, depth + 1, out);
        }
        ExprKind::Assign { target, op, value } => {
            match op {
                Some(op) => {
                    let _ = writeln!(out, "assign {op:?}");
                }
                None => {
                    let _ = writeln!(out, "assign");
                }
            }
            dump_expr(target, depth + 1, out);
            dump_expr(value, depth + 1, out);
        }
        ExprKind::Call { callee, args } => {
            let _ = writeln!(out, "call");
            dump_expr(callee, depth + 1, out);
            for arg in args {
                dump_expr(arg, depth + 1, out);
            }
        }
        ExprKind::Index { obj, index } => {
            let _ = writeln!(out, "index");
            dump_expr(obj, depth + 1, out);
            dump_expr(index, depth + 1, out);
        }
        ExprKind::Member { obj, name } => {
            let _ = writeln!(out, "member .{name}");
            dump_expr(obj, depth + 1, out);
        }
        ExprKind::Lambda(lit) => {
            let _ = writeln!(out, "fn ({})", lit.params.join(", "));
            for stmt in &lit.body {
                dump_stmt(stmt, depth + 1, out);
            }
        }
        ExprKind::Sizeof(e) => {
            let _ = writeln!(out, "sizeof");
            dump_expr(e, depth + 1, out);
        }
        ExprKind::Typeof(e) => {
            let _ = writeln!(out, "typeof");
            dump_expr(e, depth + 1, out);
        }
    }
}
