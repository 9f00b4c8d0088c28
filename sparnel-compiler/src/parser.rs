use crate::ast::*;
use crate::{CompileError, Token, TokenKind};

/// Token stream → AST.
///
/// Hand-written recursive descent; binary operators are parsed with one
/// method per precedence level, C's ladder augmented with `..` between
/// shift and additive.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Wrap a token stream ending in `Eof`.
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof));
        Self { tokens, pos: 0 }
    }

    /// Parse a whole program: a sequence of statements.
    pub fn parse_program(mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    /// Parse a single expression spanning the whole input.
    pub fn parse_expression(mut self) -> Result<Expr, CompileError> {
        let expr = self.expression()?;
        if self.peek().kind != TokenKind::Eof {
            return Err(self.err_here("expected end of expression"));
        }
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn span(&self) -> Span {
        let t = self.peek();
        Span {
            line: t.line,
            col: t.col,
        }
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, CompileError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.err_here(format!(
                "expected {} {context}, found {}",
                kind.describe(),
                self.peek().kind.describe()
            )))
        }
    }

    fn err_here(&self, message: impl Into<String>) -> CompileError {
        let t = self.peek();
        CompileError::syntax(t.line, t.col, message)
    }

    fn ident(&mut self, context: &str) -> Result<String, CompileError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.err_here(format!(
                "expected identifier {context}, found {}",
                other.describe()
            ))),
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        let kind = match self.peek().kind {
            TokenKind::Var => return self.var_decl(),
            TokenKind::Const => return self.const_decl(),
            TokenKind::If => return self.if_stmt(),
            TokenKind::While => return self.while_stmt(),
            TokenKind::Do => return self.do_while_stmt(),
            TokenKind::For => return self.for_stmt(),
            TokenKind::LBrace => return self.block(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "after `break`")?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "after `continue`")?;
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.peek().kind == TokenKind::Semicolon {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(TokenKind::Semicolon, "after `return`")?;
                StmtKind::Return(value)
            }
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            _ => {
                let expr = self.expression()?;
                self.expect(TokenKind::Semicolon, "after expression")?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, span })
    }

    fn var_decl(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        self.advance();
        let name = self.ident("after `var`")?;
        let init = if self.eat(TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "after declaration")?;
        Ok(Stmt {
            kind: StmtKind::Var { name, init },
            span,
        })
    }

    fn const_decl(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        self.advance();
        let name = self.ident("after `const`")?;
        self.expect(TokenKind::Assign, "after constant name")?;
        let init = self.expression()?;
        self.expect(TokenKind::Semicolon, "after declaration")?;
        Ok(Stmt {
            kind: StmtKind::Const { name, init },
            span,
        })
    }

    fn if_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        self.advance();
        self.expect(TokenKind::LParen, "after `if`")?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen, "after condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            span,
        })
    }

    fn while_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        self.advance();
        self.expect(TokenKind::LParen, "after `while`")?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen, "after condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt {
            kind: StmtKind::While { cond, body },
            span,
        })
    }

    fn do_while_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        self.advance();
        let body = Box::new(self.statement()?);
        self.expect(TokenKind::While, "after `do` body")?;
        self.expect(TokenKind::LParen, "after `while`")?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen, "after condition")?;
        self.expect(TokenKind::Semicolon, "after `do`-`while`")?;
        Ok(Stmt {
            kind: StmtKind::DoWhile { body, cond },
            span,
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        self.advance();
        self.expect(TokenKind::LParen, "after `for`")?;

        let init = match self.peek().kind {
            TokenKind::Semicolon => {
                self.advance();
                None
            }
            TokenKind::Var => Some(Box::new(self.var_decl()?)),
            _ => {
                let expr_span = self.span();
                let expr = self.expression()?;
                self.expect(TokenKind::Semicolon, "after `for` initializer")?;
                Some(Box::new(Stmt {
                    kind: StmtKind::Expr(expr),
                    span: expr_span,
                }))
            }
        };

        let cond = if self.peek().kind == TokenKind::Semicolon {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon, "after `for` condition")?;

        let step = if self.peek().kind == TokenKind::RParen {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RParen, "after `for` header")?;

        let body = Box::new(self.statement()?);
        Ok(Stmt {
            kind: StmtKind::For {
                init,
                cond,
                step,
                body,
            },
            span,
        })
    }

    fn block(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        self.expect(TokenKind::LBrace, "to open block")?;
        let mut stmts = Vec::new();
        while !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.statement()?);
        }
        self.expect(TokenKind::RBrace, "to close block")?;
        Ok(Stmt {
            kind: StmtKind::Block(stmts),
            span,
        })
    }

    // ---- expressions, lowest precedence first ----

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, CompileError> {
        let target = self.ternary()?;
        let op = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::PercentAssign => Some(BinOp::Mod),
            TokenKind::AmpAssign => Some(BinOp::BitAnd),
            TokenKind::PipeAssign => Some(BinOp::BitOr),
            TokenKind::CaretAssign => Some(BinOp::BitXor),
            TokenKind::ShlAssign => Some(BinOp::Shl),
            TokenKind::ShrAssign => Some(BinOp::Shr),
            _ => return Ok(target),
        };
        let span = target.span;
        if !matches!(
            target.kind,
            ExprKind::Ident(_) | ExprKind::Index { .. } | ExprKind::Member { .. }
        ) {
            return Err(CompileError::syntax(
                span.line,
                span.col,
                "invalid assignment target",
            ));
        }
        self.advance();
        // Right-associative: `a = b = c` assigns `c` to both.
        let value = self.assignment()?;
        Ok(Expr {
            kind: ExprKind::Assign {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
            span,
        })
    }

    fn ternary(&mut self) -> Result<Expr, CompileError> {
        let cond = self.logical_or()?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let span = cond.span;
        let then_branch = self.expression()?;
        self.expect(TokenKind::Colon, "in conditional expression")?;
        let else_branch = self.ternary()?;
        Ok(Expr {
            kind: ExprKind::Ternary {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        })
    }

    fn logical_or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.logical_and()?;
        while matches!(self.peek().kind, TokenKind::PipePipe | TokenKind::Or) {
            self.advance();
            let rhs = self.logical_and()?;
            let span = lhs.span;
            lhs = Expr {
                kind: ExprKind::Logical {
                    op: LogOp::Or,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.bit_or()?;
        while matches!(self.peek().kind, TokenKind::AmpAmp | TokenKind::And) {
            self.advance();
            let rhs = self.bit_or()?;
            let span = lhs.span;
            lhs = Expr {
                kind: ExprKind::Logical {
                    op: LogOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn bit_or(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(&[(TokenKind::Pipe, BinOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(&[(TokenKind::Caret, BinOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(&[(TokenKind::Amp, BinOp::BitAnd)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::BangEq, BinOp::Ne)],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Ge, BinOp::Ge),
            ],
            Self::shift,
        )
    }

    fn shift(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[(TokenKind::Shl, BinOp::Shl), (TokenKind::Shr, BinOp::Shr)],
            Self::concat,
        )
    }

    /// `..` sits between shift and additive and associates to the right.
    fn concat(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.additive()?;
        if !self.eat(TokenKind::DotDot) {
            return Ok(lhs);
        }
        let rhs = self.concat()?;
        let span = lhs.span;
        Ok(Expr {
            kind: ExprKind::Binary {
                op: BinOp::Concat,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        })
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Mod),
            ],
            Self::unary,
        )
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (kind, op) in ops {
                if self.peek().kind == *kind {
                    self.advance();
                    let rhs = next(self)?;
                    let span = lhs.span;
                    lhs = Expr {
                        kind: ExprKind::Binary {
                            op: *op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        span,
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Bang | TokenKind::Not => Some(UnOp::Not),
            TokenKind::Sizeof => {
                self.advance();
                let expr = self.unary()?;
                return Ok(Expr {
                    kind: ExprKind::Sizeof(Box::new(expr)),
                    span,
                });
            }
            TokenKind::Typeof => {
                self.advance();
                let expr = self.unary()?;
                return Ok(Expr {
                    kind: ExprKind::Typeof(Box::new(expr)),
                    span,
                });
            }
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                span,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        loop {
            let span = expr.span;
            match self.peek().kind {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek().kind != TokenKind::RParen {
                        loop {
                            args.push(self.expression()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "after arguments")?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "after subscript")?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            obj: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.ident("after `.`")?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            obj: Box::new(expr),
                            name,
                        },
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        let kind = match self.peek().kind.clone() {
            TokenKind::Nil => {
                self.advance();
                ExprKind::Nil
            }
            TokenKind::True => {
                self.advance();
                ExprKind::True
            }
            TokenKind::False => {
                self.advance();
                ExprKind::False
            }
            TokenKind::Int(i) => {
                self.advance();
                ExprKind::Int(i)
            }
            TokenKind::Float(f) => {
                self.advance();
                ExprKind::Float(f)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::ScriptArg(n) => {
                self.advance();
                ExprKind::ScriptArg(n)
            }
            TokenKind::Argc => {
                self.advance();
                ExprKind::ArgCount
            }
            TokenKind::Ident(name) => {
                self.advance();
                ExprKind::Ident(name)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "after parenthesized expression")?;
                return Ok(expr);
            }
            TokenKind::LBrace => return self.aggregate(),
            TokenKind::Fn => return self.lambda(),
            other => {
                return Err(self.err_here(format!("unexpected {}", other.describe())));
            }
        };
        Ok(Expr { kind, span })
    }

    fn aggregate(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        self.expect(TokenKind::LBrace, "to open aggregate literal")?;
        let mut items = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let elem = self.expression()?;
            if self.eat(TokenKind::Colon) {
                // A bare identifier key reads as a string, like a member
                // name.
                let key = match elem.kind {
                    ExprKind::Ident(name) => Expr {
                        kind: ExprKind::Str(name),
                        span: elem.span,
                    },
                    _ => elem,
                };
                let value = self.expression()?;
                items.push(AggrItem::Keyed(key, value));
            } else {
                items.push(AggrItem::Positional(elem));
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "to close aggregate literal")?;
        Ok(Expr {
            kind: ExprKind::Aggregate(items),
            span,
        })
    }

    fn lambda(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        self.expect(TokenKind::Fn, "to open function literal")?;
        self.expect(TokenKind::LParen, "after `fn`")?;
        let mut params = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                params.push(self.ident("in parameter list")?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "after parameters")?;
        self.expect(TokenKind::LBrace, "to open function body")?;
        let mut body = Vec::new();
        while !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Eof) {
            body.push(self.statement()?);
        }
        self.expect(TokenKind::RBrace, "to close function body")?;
        Ok(Expr {
            kind: ExprKind::Lambda(FnLit { params, body, span }),
            span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lexer;
    use rstest::rstest;

    fn parse(src: &str) -> Vec<Stmt> {
        Parser::new(Lexer::new(src).tokenize().unwrap())
            .parse_program()
            .unwrap()
    }

    fn parse_expr(src: &str) -> Expr {
        Parser::new(Lexer::new(src).tokenize().unwrap())
            .parse_expression()
            .unwrap()
    }

    #[test]
    fn precedence_mul_over_add() {
        let e = parse_expr("1 + 2 * 3");
        match e.kind {
            ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn concat_is_right_associative_and_below_additive() {
        let e = parse_expr("\"a\" .. \"b\" .. 1 + 2");
        match e.kind {
            ExprKind::Binary { op: BinOp::Concat, rhs, .. } => match rhs.kind {
                ExprKind::Binary { op: BinOp::Concat, rhs, .. } => {
                    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Add, .. }));
                }
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn assignment_chains_right() {
        let e = parse_expr("a = b = 1");
        match e.kind {
            ExprKind::Assign { value, .. } => {
                assert!(matches!(value.kind, ExprKind::Assign { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn compound_assignment_carries_its_operator() {
        let e = parse_expr("x += 2");
        assert!(matches!(
            e.kind,
            ExprKind::Assign {
                op: Some(BinOp::Add),
                ..
            }
        ));
    }

    #[test]
    fn postfix_chain() {
        let e = parse_expr("obj.items[0](1, 2)");
        match e.kind {
            ExprKind::Call { callee, args } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(callee.kind, ExprKind::Index { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ternary_nests_rightward() {
        let e = parse_expr("a ? 1 : b ? 2 : 3");
        match e.kind {
            ExprKind::Ternary { else_branch, .. } => {
                assert!(matches!(else_branch.kind, ExprKind::Ternary { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn aggregate_items() {
        let e = parse_expr("{ 1, 2, name: 3, \"k\": 4 }");
        match e.kind {
            ExprKind::Aggregate(items) => {
                assert_eq!(items.len(), 4);
                assert!(matches!(&items[2], AggrItem::Keyed(k, _)
                    if matches!(&k.kind, ExprKind::Str(s) if s == "name")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn statements_round_trip_through_dump() {
        let stmts = parse(
            "var x = 1; const K = 2; if (x) { x = 2; } else ; \
             while (x < 3) x = x + 1; do x = x - 1; while (x); \
             for (var i = 0; i < 3; i = i + 1) { continue; } return x;",
        );
        let text = dump(&stmts);
        for needle in ["var x", "const K", "if", "while", "do-while", "for", "return"] {
            assert!(text.contains(needle), "missing {needle} in:\n{text}");
        }
    }

    #[test]
    fn lambda_literal() {
        let e = parse_expr("fn (a, b) { return a; }");
        match e.kind {
            ExprKind::Lambda(lit) => {
                assert_eq!(lit.params, vec!["a", "b"]);
                assert_eq!(lit.body.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[rstest]
    #[case("1 + ;", "unexpected")]
    #[case("var = 3;", "expected identifier")]
    #[case("1 = 2;", "invalid assignment target")]
    #[case("if (1 {}", "expected `)`")]
    #[case("fn (a { }", "expected `)`")]
    fn syntax_errors(#[case] src: &str, #[case] needle: &str) {
        let err = Parser::new(Lexer::new(src).tokenize().unwrap())
            .parse_program()
            .unwrap_err();
        assert!(err.to_string().contains(needle), "got: {err}");
    }

    #[test]
    fn script_args_parse() {
        let e = parse_expr("#1 + argc");
        assert!(matches!(
            e.kind,
            ExprKind::Binary { op: BinOp::Add, .. }
        ));
    }
}
