//! Recursive-descent parser for SIL.
//!
//! One-token lookahead everywhere except assignment statements, which
//! speculatively parse an expression and roll the cursor back when no `=`
//! follows. On an error the parser skips ahead to the next `;` or `}` so
//! the diagnostic can show a sane context window, then propagates.

use crate::ast::{BinOp, Expr, Kernel, Literal, Param, Program, Stmt, Type, UnaryOp};
use crate::error::{CompileError, Span};
use crate::lexer::Token;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// A valid identifier: leading letter or underscore, then alphanumerics or
/// underscores.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_text(&self) -> Option<String> {
        self.peek().map(|t| t.text.clone())
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t == text)
    }

    fn current_span(&self) -> Option<Span> {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span())
    }

    /// A short window of tokens around the cursor, for diagnostics.
    fn context_window(&self) -> String {
        let start = self.pos.saturating_sub(5);
        let end = (self.pos + 5).min(self.tokens.len());
        let window: Vec<&str> = self.tokens[start..end]
            .iter()
            .map(|t| t.text.as_str())
            .collect();
        format!("[{}]", window.join(" "))
    }

    fn expect(&mut self, expected: &str) -> Result<(), CompileError> {
        let span = self.current_span();
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            found => {
                let found = match found {
                    Some(tok) => format!("'{}'", tok.text),
                    None => "end of input".to_string(),
                };
                Err(CompileError::parse(
                    format!(
                        "expected '{}' but found {}; context: {}",
                        expected,
                        found,
                        self.context_window()
                    ),
                    span,
                ))
            }
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, CompileError> {
        let span = self.current_span();
        match self.advance() {
            Some(tok) if is_identifier(&tok.text) => Ok(tok.text),
            Some(tok) => Err(CompileError::parse(
                format!("invalid {}: '{}'", what, tok.text),
                span,
            )),
            None => Err(CompileError::parse(
                format!("expected {} but found end of input", what),
                span,
            )),
        }
    }

    fn parse_type(&mut self) -> Result<Type, CompileError> {
        let span = self.current_span();
        let Some(tok) = self.advance() else {
            return Err(CompileError::parse("expected a type name", span));
        };
        if let Some(ty) = Type::parse(&tok.text) {
            return Ok(ty);
        }
        let message = if tok.text.starts_with("ptr_ptr_") {
            format!("pointer-to-pointer type '{}' is not supported", tok.text)
        } else {
            format!("unknown type '{}'", tok.text)
        };
        Err(CompileError::parse(message, span))
    }

    /// Skip to just past the next `;` or `}` so a later parse can resync.
    fn recover(&mut self) {
        while let Some(tok) = self.peek() {
            let stop = tok == ";" || tok == "}";
            self.pos += 1;
            if stop {
                return;
            }
        }
    }

    pub fn parse(&mut self) -> Result<Program, CompileError> {
        let mut items = Vec::new();
        while self.peek().is_some() {
            match self.parse_statement() {
                Ok(stmt) => items.push(stmt),
                Err(err) => {
                    self.recover();
                    return Err(err);
                }
            }
        }
        Ok(Program { items })
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        match self.peek_text().as_deref() {
            Some("var") => self.parse_var_decl(),
            Some("const") => self.parse_const_decl(),
            Some("kernel") => self.parse_kernel(),
            Some("return") => self.parse_return(),
            Some("if") => self.parse_if(),
            Some("loop") => self.parse_loop(),
            Some("break") => {
                self.advance();
                self.expect(";")?;
                Ok(Stmt::Break { span })
            }
            Some("@cpu") => self.parse_cpu_block(),
            Some(_) => self.parse_assign(),
            None => Err(CompileError::parse("unexpected end of input", Some(span))),
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        self.expect("var")?;
        let name = self.expect_identifier("variable name")?;
        self.expect(":")?;
        let ty = self.parse_type()?;
        self.expect("=")?;
        let value = self.parse_expression()?;
        self.expect(";")?;
        let ty = promote_declared_type(ty, &value);
        Ok(Stmt::VarDecl {
            name,
            ty,
            value,
            span,
        })
    }

    fn parse_const_decl(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        self.expect("const")?;
        let name = self.expect_identifier("constant name")?;
        self.expect(":")?;
        let ty = self.parse_type()?;
        self.expect("=")?;
        let value = self.parse_expression()?;
        self.expect(";")?;
        let ty = promote_declared_type(ty, &value);
        Ok(Stmt::ConstDecl {
            name,
            ty,
            value,
            span,
        })
    }

    fn parse_kernel(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        self.expect("kernel")?;
        let name = self.expect_identifier("kernel name")?;
        self.expect("(")?;
        let params = self.parse_params()?;
        self.expect(")")?;
        self.expect("{")?;

        let mut body = Vec::new();
        while !self.check("}") {
            if self.peek().is_none() {
                return Err(CompileError::parse(
                    format!("unexpected end of input in body of kernel '{}'", name),
                    Some(span),
                ));
            }
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(err) => {
                    self.recover();
                    return Err(err);
                }
            }
        }
        self.expect("}")?;
        Ok(Stmt::Kernel(Kernel {
            name,
            params,
            body,
            span,
        }))
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, CompileError> {
        let mut params = Vec::new();
        while !self.check(")") {
            if self.peek().is_none() {
                return Err(CompileError::parse(
                    "unterminated parameter list",
                    self.current_span(),
                ));
            }
            let name = self.expect_identifier("parameter name")?;
            self.expect(":")?;
            let ty = self.parse_type()?;
            params.push(Param { name, ty });

            if self.check(",") {
                self.advance();
            } else if !self.check(")") {
                return Err(CompileError::parse(
                    format!(
                        "expected ',' or ')' after parameter; context: {}",
                        self.context_window()
                    ),
                    self.current_span(),
                ));
            }
        }
        Ok(params)
    }

    fn parse_return(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        self.expect("return")?;
        let value = if self.check(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(";")?;
        Ok(Stmt::Return { value, span })
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        self.expect("if")?;
        self.expect("(")?;
        let condition = self.parse_expression()?;
        self.expect(")")?;
        let then_body = self.parse_block("'if'")?;

        let else_body = if self.check("else") {
            self.advance();
            Some(self.parse_block("'else'")?)
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_body,
            else_body,
            span,
        })
    }

    fn parse_loop(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        self.expect("loop")?;
        let body = self.parse_block("'loop'")?;
        Ok(Stmt::Loop { body, span })
    }

    fn parse_block(&mut self, what: &str) -> Result<Vec<Stmt>, CompileError> {
        self.expect("{")?;
        let mut body = Vec::new();
        while !self.check("}") {
            if self.peek().is_none() {
                return Err(CompileError::parse(
                    format!("unexpected end of input in {} block", what),
                    self.current_span(),
                ));
            }
            body.push(self.parse_statement()?);
        }
        self.expect("}")?;
        Ok(body)
    }

    fn parse_cpu_block(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        self.expect("@cpu")?;
        // The scanner leaves the entire tail as one raw token.
        let Some(raw) = self.advance() else {
            return Err(CompileError::parse(
                "missing host code after '@cpu'",
                Some(span),
            ));
        };
        Ok(Stmt::CpuBlock {
            code: raw.text,
            span,
        })
    }

    /// Assignment, reached for any statement starting with an identifier or
    /// `*`. Speculatively parses an expression; if no `=` follows the cursor
    /// rolls back and the statement is rejected.
    fn parse_assign(&mut self) -> Result<Stmt, CompileError> {
        let span = self.current_span().unwrap_or_default();
        let mark = self.pos;
        let target = self.parse_expression()?;
        if !self.check("=") {
            self.pos = mark;
            return Err(CompileError::parse(
                format!("expected an assignment; context: {}", self.context_window()),
                Some(span),
            ));
        }
        match target {
            Expr::Ident(_) | Expr::Deref(_) => {}
            _ => {
                return Err(CompileError::parse(
                    "assignment target must be an identifier or a dereference",
                    Some(span),
                ));
            }
        }
        self.advance();
        let value = self.parse_expression()?;
        self.expect(";")?;
        Ok(Stmt::Assign {
            target,
            value,
            span,
        })
    }

    // --- Expressions, lowest precedence first ---

    pub fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_logical_and()?;
        while self.check("||") {
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_equality()?;
        while self.check("&&") {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_text().as_deref() {
                Some("==") => BinOp::Eq,
                Some("!=") => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_text().as_deref() {
                Some("<") => BinOp::Lt,
                Some(">") => BinOp::Gt,
                Some("<=") => BinOp::Le,
                Some(">=") => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_text().as_deref() {
                Some("+") => BinOp::Add,
                Some("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_text().as_deref() {
                Some("*") => BinOp::Mul,
                Some("/") => BinOp::Div,
                Some("//") => BinOp::FloorDiv,
                Some("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek_text().as_deref() {
            Some("!") => {
                self.advance();
                Ok(Expr::unary(UnaryOp::Not, self.parse_unary()?))
            }
            Some("-") => {
                self.advance();
                Ok(Expr::unary(UnaryOp::Neg, self.parse_unary()?))
            }
            Some("~") => {
                self.advance();
                Ok(Expr::unary(UnaryOp::BitNot, self.parse_unary()?))
            }
            Some("*") => {
                self.advance();
                Ok(Expr::Deref(Box::new(self.parse_unary()?)))
            }
            Some("&") => {
                self.advance();
                Ok(Expr::AddrOf(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        if self.check("(") {
            self.advance();
            let expr = self.parse_expression()?;
            self.expect(")")?;
            return Ok(expr);
        }
        if self.check("bitwise") {
            return self.parse_bitwise_block();
        }
        if self.check("cast") {
            return self.parse_cast_block();
        }

        let span = self.current_span();
        let Some(tok) = self.advance() else {
            return Err(CompileError::parse(
                "unexpected end of input in expression",
                span,
            ));
        };
        if let Some(lit) = literal_from_token(&tok.text).map_err(|m| CompileError::parse(m, span))? {
            return Ok(Expr::Literal(lit));
        }
        if is_identifier(&tok.text) {
            return Ok(Expr::Ident(tok.text));
        }
        Err(CompileError::parse(
            format!(
                "unexpected token '{}' in expression; context: {}",
                tok.text,
                self.context_window()
            ),
            span,
        ))
    }

    // --- The restricted `bitwise { ... }` grammar ---

    fn parse_bitwise_block(&mut self) -> Result<Expr, CompileError> {
        self.expect("bitwise")?;
        self.expect("{")?;
        let inner = self.parse_bitwise_or()?;
        self.expect("}")?;
        Ok(Expr::Bitwise(Box::new(inner)))
    }

    fn parse_bitwise_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_bitwise_xor()?;
        while self.check("|") {
            self.advance();
            let right = self.parse_bitwise_xor()?;
            left = Expr::binary(BinOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn parse_bitwise_xor(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_bitwise_and()?;
        while self.check("^") {
            self.advance();
            let right = self.parse_bitwise_and()?;
            left = Expr::binary(BinOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn parse_bitwise_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_bitwise_shift()?;
        while self.check("&") {
            self.advance();
            let right = self.parse_bitwise_shift()?;
            left = Expr::binary(BinOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn parse_bitwise_shift(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_bitwise_unary()?;
        loop {
            let op = match self.peek_text().as_deref() {
                Some("<<") => BinOp::Shl,
                Some(">>") => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let right = self.parse_bitwise_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_bitwise_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek_text().as_deref() {
            Some("~") => {
                self.advance();
                Ok(Expr::unary(UnaryOp::BitNot, self.parse_bitwise_unary()?))
            }
            Some("-") => {
                self.advance();
                Ok(Expr::unary(UnaryOp::Neg, self.parse_bitwise_unary()?))
            }
            _ => self.parse_bitwise_primary(),
        }
    }

    fn parse_bitwise_primary(&mut self) -> Result<Expr, CompileError> {
        if self.check("(") {
            self.advance();
            let expr = self.parse_bitwise_or()?;
            self.expect(")")?;
            return Ok(expr);
        }
        let span = self.current_span();
        let Some(tok) = self.advance() else {
            return Err(CompileError::parse(
                "unexpected end of input in bitwise block",
                span,
            ));
        };
        if let Some(lit) = literal_from_token(&tok.text).map_err(|m| CompileError::parse(m, span))? {
            return Ok(Expr::Literal(lit));
        }
        if is_identifier(&tok.text) {
            return Ok(Expr::Ident(tok.text));
        }
        Err(CompileError::parse(
            format!("token '{}' is not allowed in a bitwise block", tok.text),
            span,
        ))
    }

    fn parse_cast_block(&mut self) -> Result<Expr, CompileError> {
        self.expect("cast")?;
        self.expect("{")?;
        let value = self.parse_expression()?;
        self.expect("as")?;
        let target = self.parse_type()?;
        self.expect("}")?;
        Ok(Expr::Cast {
            value: Box::new(value),
            target,
        })
    }
}

/// A literal initializer pins the declared scalar type: float literals make
/// the declaration `float`, integer literals make it `uint`.
fn promote_declared_type(ty: Type, value: &Expr) -> Type {
    let (Type::Scalar(_), Expr::Literal(lit)) = (ty, value) else {
        return ty;
    };
    Type::Scalar(lit.scalar_type())
}

/// Decode a numeric token: decimal, `0x` hex, or a float with a dot.
/// Returns `Ok(None)` for tokens that do not start with a digit.
fn literal_from_token(text: &str) -> Result<Option<Literal>, String> {
    let Some(first) = text.chars().next() else {
        return Ok(None);
    };
    if !first.is_ascii_digit() {
        return Ok(None);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16)
            .map(|v| Some(Literal::Int(v)))
            .map_err(|_| format!("hex literal '{}' out of range", text));
    }
    if text.contains('.') {
        return text
            .parse::<f32>()
            .map(|v| Some(Literal::Float(v)))
            .map_err(|_| format!("invalid float literal '{}'", text));
    }
    text.parse::<u32>()
        .map(|v| Some(Literal::Int(v)))
        .map_err(|_| format!("integer literal '{}' out of range", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ScalarType;
    use crate::lexer::tokenize;

    fn parse(source: &str) -> Result<Program, CompileError> {
        Parser::new(tokenize(source).unwrap()).parse()
    }

    #[test]
    fn test_parse_kernel_with_params() {
        let program = parse("kernel add(a: int, b: int, out: int) { return; }").unwrap();
        let kernel = program.find_kernel("add").unwrap();
        assert_eq!(kernel.params.len(), 3);
        // int normalizes to uint at parse time
        assert_eq!(kernel.params[0].ty, Type::Scalar(ScalarType::UInt));
        assert_eq!(kernel.body.len(), 1);
    }

    #[test]
    fn test_parse_pointer_param() {
        let program = parse("kernel k(out: ptr_float) { return; }").unwrap();
        let kernel = program.find_kernel("k").unwrap();
        assert_eq!(kernel.params[0].ty, Type::Pointer(ScalarType::Float));
    }

    #[test]
    fn test_literal_promotes_declared_type() {
        let program = parse("var x: uint = 2.5; var y: float = 3;").unwrap();
        match &program.items[0] {
            Stmt::VarDecl { ty, .. } => assert_eq!(*ty, Type::Scalar(ScalarType::Float)),
            other => panic!("expected VarDecl, got {:?}", other),
        }
        match &program.items[1] {
            Stmt::VarDecl { ty, .. } => assert_eq!(*ty, Type::Scalar(ScalarType::UInt)),
            other => panic!("expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_else() {
        let program = parse(
            "kernel k(x: int, out: int) { if (x == 0) { out = 1; } else { out = 2; } return; }",
        )
        .unwrap();
        let kernel = program.find_kernel("k").unwrap();
        match &kernel.body[0] {
            Stmt::If {
                condition,
                then_body,
                else_body,
                ..
            } => {
                assert!(matches!(
                    condition,
                    Expr::Binary { op: BinOp::Eq, .. }
                ));
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.as_ref().unwrap().len(), 1);
            }
            other => panic!("expected If, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_loop_break() {
        let program =
            parse("kernel k(out: int) { loop { if (1 == 1) { break; } } return; }").unwrap();
        let kernel = program.find_kernel("k").unwrap();
        assert!(matches!(kernel.body[0], Stmt::Loop { .. }));
    }

    #[test]
    fn test_parse_deref_assignment() {
        let program = parse("kernel k(p: ptr_uint) { *p = 3; return; }").unwrap();
        let kernel = program.find_kernel("k").unwrap();
        match &kernel.body[0] {
            Stmt::Assign { target, .. } => assert!(matches!(target, Expr::Deref(_))),
            other => panic!("expected Assign, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_address_of() {
        let program = parse("kernel k(x: uint, p: ptr_uint) { p = &x; return; }").unwrap();
        let kernel = program.find_kernel("k").unwrap();
        match &kernel.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::AddrOf(_))),
            other => panic!("expected Assign, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bitwise_block() {
        let program = parse("var x: uint = bitwise { 1 << 2 | 3 & 4 ^ ~5 };").unwrap();
        match &program.items[0] {
            Stmt::VarDecl { value, .. } => {
                let Expr::Bitwise(inner) = value else {
                    panic!("expected Bitwise, got {:?}", value);
                };
                // `|` binds loosest inside the block
                assert!(matches!(
                    inner.as_ref(),
                    Expr::Binary { op: BinOp::BitOr, .. }
                ));
            }
            other => panic!("expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_bitwise_block_rejects_arithmetic() {
        let err = parse("var x: uint = bitwise { 1 + 2 };").unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }

    #[test]
    fn test_parse_cast() {
        let program = parse("kernel k(x: uint, out: float) { out = cast { x as float }; return; }")
            .unwrap();
        let kernel = program.find_kernel("k").unwrap();
        match &kernel.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Cast { target, .. } => {
                    assert_eq!(*target, Type::Scalar(ScalarType::Float));
                }
                other => panic!("expected Cast, got {:?}", other),
            },
            other => panic!("expected Assign, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let program = parse("var x: uint = 1 + 2 * 3;").unwrap();
        match &program.items[0] {
            Stmt::VarDecl { value, .. } => match value {
                Expr::Binary { op: BinOp::Add, right, .. } => {
                    assert!(matches!(
                        right.as_ref(),
                        Expr::Binary { op: BinOp::Mul, .. }
                    ));
                }
                other => panic!("expected Add at the root, got {:?}", other),
            },
            other => panic!("expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_comparison_yields_binary_node() {
        let program = parse("var x: uint = 1 < 2 && 3 < 4;").unwrap();
        match &program.items[0] {
            Stmt::VarDecl { value, .. } => {
                assert!(matches!(value, Expr::Binary { op: BinOp::And, .. }));
            }
            other => panic!("expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_pointer_to_pointer() {
        let err = parse("kernel k(p: ptr_ptr_uint) { return; }").unwrap_err();
        assert!(err.to_string().contains("pointer-to-pointer"));
    }

    #[test]
    fn test_statement_without_assignment_rejected() {
        let err = parse("kernel k(x: int) { x + 1; return; }").unwrap_err();
        assert!(err.to_string().contains("expected an assignment"));
    }

    #[test]
    fn test_unterminated_kernel_body() {
        let err = parse("kernel k(x: int) { x = 1;").unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }

    #[test]
    fn test_parse_cpu_block() {
        let program = parse("kernel k(x: int) { return; }\n@cpu\nhost code here").unwrap();
        assert_eq!(program.cpu_block(), Some("host code here"));
    }

    #[test]
    fn test_parse_const_decl() {
        let program = parse("kernel k(out: int) { const limit: uint = 10; out = limit; return; }")
            .unwrap();
        let kernel = program.find_kernel("k").unwrap();
        assert!(matches!(kernel.body[0], Stmt::ConstDecl { .. }));
    }

    #[test]
    fn test_error_reports_context() {
        let err = parse("var x: uint 5;").unwrap_err();
        assert!(err.to_string().contains("context:"));
    }
}
