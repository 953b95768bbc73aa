//! Recursive-descent parser for graph scripts.
//!
//! Precedence, lowest first:
//!
//! ```text
//! conditional   a ? b : c          (right-associative)
//! equality      == !=
//! additive      + -
//! multiplicative * /
//! unary         - !
//! postfix       call f(x), member a.b, index a[i]
//! primary       literals, identifiers, ( ), [ ], { }, arrow functions
//! ```
//!
//! Statements may be separated by `;` or simply follow one another; newlines
//! carry no meaning.  An expression nested deeper than [`MAX_NESTING`] is a
//! syntax error rather than a stack overflow.

use std::sync::Arc;

use super::ast::{BinaryOp, Expr, ExprKind, FnBody, FunctionDef, Program, Stmt, UnaryOp};
use super::error::{ScriptError, Span};
use super::lexer::{tokenize, Token, TokenKind};

/// Maximum expression nesting depth accepted by the parser.
pub const MAX_NESTING: usize = 200;

/// Parses a whole program.
///
/// # Errors
///
/// Returns a `SyntaxError` located at the offending token.
pub fn parse_program(source: &str, file: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source, file)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        file,
    };
    let body = parser.statements(|kind| *kind == TokenKind::Eof)?;
    Ok(Program { body })
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    file: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name == word)
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, ScriptError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(context))
        }
    }

    fn unexpected(&self, context: &str) -> ScriptError {
        let token = self.peek();
        ScriptError::syntax(
            format!("unexpected {} {context}", token.kind.describe()),
            self.file,
            token.span,
        )
    }

    fn identifier(&mut self, context: &str) -> Result<String, ScriptError> {
        match &self.peek().kind {
            TokenKind::Ident(name) if !is_reserved(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(context)),
        }
    }

    fn statements(&mut self, end: impl Fn(&TokenKind) -> bool) -> Result<Vec<Stmt>, ScriptError> {
        let mut body = Vec::new();
        loop {
            while self.eat(&TokenKind::Semicolon) {}
            if end(&self.peek().kind) {
                return Ok(body);
            }
            if self.check(&TokenKind::Eof) {
                return Err(self.unexpected("(missing '}')"));
            }
            body.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let span = self.peek().span;
        if self.is_keyword("let") || self.is_keyword("const") {
            self.advance();
            let name = self.identifier("after 'let'")?;
            self.expect(TokenKind::Assign, "(expected '=')")?;
            let value = self.expression()?;
            return Ok(Stmt::Let { name, value, span });
        }
        if self.is_keyword("return") {
            self.advance();
            let value = match self.peek().kind {
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => None,
                _ => Some(self.expression()?),
            };
            return Ok(Stmt::Return { value, span });
        }
        if self.is_keyword("throw") {
            self.advance();
            let value = self.expression()?;
            return Ok(Stmt::Throw { value, span });
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            let span = self.peek().span;
            return Err(ScriptError::syntax("expression nested too deeply", self.file, span));
        }
        let result = self.conditional();
        self.depth -= 1;
        result
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.equality()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.expect(TokenKind::Colon, "in conditional (expected ':')")?;
        let otherwise = self.expression()?;
        let span = cond.span;
        Ok(Expr {
            kind: ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        })
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => return Ok(lhs),
            };
            let span = self.advance().span;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs, span);
        }
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let span = self.advance().span;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs, span);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            let span = self.advance().span;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs, span);
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.postfix(),
        };
        let span = self.advance().span;
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ScriptError::syntax("expression nested too deeply", self.file, span));
        }
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand?),
            },
            span,
        })
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    let span = self.advance().span;
                    let name = match &self.peek().kind {
                        TokenKind::Ident(name) => name.clone(),
                        _ => return Err(self.unexpected("after '.'")),
                    };
                    self.advance();
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    };
                }
                TokenKind::LParen => {
                    let span = self.advance().span;
                    let args = self.comma_list(TokenKind::RParen, "in argument list")?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    };
                }
                TokenKind::LBracket => {
                    let span = self.advance().span;
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "(expected ']')")?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn comma_list(&mut self, close: TokenKind, context: &str) -> Result<Vec<Expr>, ScriptError> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close, context)?;
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let token = self.peek().clone();
        let span = token.span;
        let kind = match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::Ident(name) => {
                if *self.peek_at(1) == TokenKind::Arrow && !is_reserved(&name) {
                    self.advance();
                    self.advance();
                    return self.arrow_body(vec![name], span);
                }
                self.advance();
                if is_reserved(&name) {
                    return Err(ScriptError::syntax(
                        format!("unexpected keyword '{name}'"),
                        self.file,
                        span,
                    ));
                }
                match name.as_str() {
                    "true" => ExprKind::Bool(true),
                    "false" => ExprKind::Bool(false),
                    "null" | "undefined" => ExprKind::Null,
                    _ => ExprKind::Ident(name.clone()),
                }
            }
            TokenKind::LParen => {
                if self.arrow_ahead() {
                    return self.arrow();
                }
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "(expected ')')")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance();
                ExprKind::List(self.comma_list(TokenKind::RBracket, "in list (expected ']')")?)
            }
            TokenKind::LBrace => {
                self.advance();
                ExprKind::Object(self.object_entries()?)
            }
            _ => return Err(self.unexpected("(expected an expression)")),
        };
        Ok(Expr { kind, span })
    }

    fn object_entries(&mut self) -> Result<Vec<(String, Expr)>, ScriptError> {
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key_span = self.peek().span;
            let key = match self.advance().kind {
                TokenKind::Ident(name) => name,
                TokenKind::Str(s) => s,
                TokenKind::Number(n) => format_number(n),
                other => {
                    return Err(ScriptError::syntax(
                        format!("unexpected {} in object key", other.describe()),
                        self.file,
                        key_span,
                    ))
                }
            };
            let value = if self.eat(&TokenKind::Colon) {
                self.expression()?
            } else {
                // Shorthand `{ name }`.
                Expr {
                    kind: ExprKind::Ident(key.clone()),
                    span: key_span,
                }
            };
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "in object (expected '}')")?;
        Ok(entries)
    }

    /// At `(`: is this the parameter list of an arrow function?
    fn arrow_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut idx = self.pos;
        while idx < self.tokens.len() {
            match self.tokens[idx].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self
                            .tokens
                            .get(idx + 1)
                            .is_some_and(|t| t.kind == TokenKind::Arrow);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            idx += 1;
        }
        false
    }

    fn arrow(&mut self) -> Result<Expr, ScriptError> {
        let span = self.expect(TokenKind::LParen, "")?.span;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.identifier("in parameter list")?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "in parameter list (expected ')')")?;
        self.expect(TokenKind::Arrow, "(expected '=>')")?;
        self.arrow_body(params, span)
    }

    fn arrow_body(&mut self, params: Vec<String>, span: Span) -> Result<Expr, ScriptError> {
        let body = if self.eat(&TokenKind::LBrace) {
            let stmts = self.statements(|kind| *kind == TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace, "(expected '}')")?;
            FnBody::Block(stmts)
        } else {
            FnBody::Expr(self.expression()?)
        };
        Ok(Expr {
            kind: ExprKind::Arrow(Arc::new(FunctionDef { params, body, span })),
            span,
        })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(name, "let" | "const" | "return" | "throw")
}

/// Formats a number the way scripts print it: integers without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else {
        n.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_program(source, "<test>").unwrap()
    }

    #[test]
    fn test_let_and_return_without_semicolons() {
        let program = parse("let a = 1\nreturn a");
        assert_eq!(program.body.len(), 2);
        assert!(matches!(program.body[0], Stmt::Let { ref name, .. } if name == "a"));
        assert!(matches!(program.body[1], Stmt::Return { value: Some(_), .. }));
    }

    #[test]
    fn test_precedence_multiplication_binds_tighter() {
        // Arrange / Act
        let program = parse("1 + 2 * 3");

        // Assert: the root is the addition.
        let Stmt::Expr(expr) = &program.body[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Binary { op, rhs, .. } = &expr.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_arrow_functions_with_expression_and_block_bodies() {
        let program = parse("let f = (a, b) => a + b\nlet g = x => { return x }\nlet h = () => 1");
        for stmt in &program.body {
            let Stmt::Let { value, .. } = stmt else {
                panic!("expected let");
            };
            assert!(matches!(value.kind, ExprKind::Arrow(_)));
        }
    }

    #[test]
    fn test_parenthesised_expression_is_not_an_arrow() {
        let program = parse("(1 + 2) * 3");
        let Stmt::Expr(expr) = &program.body[0] else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_method_chain_and_object_literal() {
        let program = parse("c.top('noise', { period: 2, 'amp': 1, seed }).connect(x).out()");
        let Stmt::Expr(expr) = &program.body[0] else {
            panic!("expected expression statement");
        };
        assert_eq!(expr.label(), "c.top(...).connect(...).out(...)");
    }

    #[test]
    fn test_conditional_is_right_associative() {
        let program = parse("a ? 1 : b ? 2 : 3");
        let Stmt::Expr(expr) = &program.body[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Conditional { otherwise, .. } = &expr.kind else {
            panic!("expected conditional");
        };
        assert!(matches!(otherwise.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn test_missing_closing_paren_is_a_syntax_error() {
        let err = parse_program("let a = (1 + 2", "doc.lg").unwrap_err();
        assert!(err.message.starts_with("SyntaxError:"), "{}", err.message);
        assert!(err.stack[0].starts_with("at <program> (doc.lg:1:"));
    }

    #[test]
    fn test_deep_nesting_is_rejected_without_overflow() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse_program(&source, "<test>").unwrap_err();
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn test_keyword_cannot_be_used_as_a_value() {
        let err = parse_program("let x = return", "<test>").unwrap_err();
        assert!(err.message.contains("SyntaxError"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }
}
