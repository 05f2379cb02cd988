//! Semantic checks performed between parsing and code generation.
//!
//! A single pass over the program with a scalar-type environment per scope.
//! Locals and parameters are per kernel; user constants live in one
//! module-wide table, mirroring the generator. Declarations are hoisted the
//! same way the generator hoists them, so use-before-declaration inside a
//! kernel body is legal.

use crate::ast::{BinOp, Expr, Kernel, Program, ScalarType, Stmt, Type, UnaryOp};
use crate::error::{CompileError, Span};
use std::collections::HashMap;

pub fn check_program(program: &Program) -> Result<(), CompileError> {
    TypeChecker::new().check(program)
}

pub struct TypeChecker {
    /// Module-wide `const` names and their scalar types.
    consts: HashMap<String, ScalarType>,
}

impl TypeChecker {
    pub fn new() -> Self {
        TypeChecker {
            consts: HashMap::new(),
        }
    }

    pub fn check(&mut self, program: &Program) -> Result<(), CompileError> {
        let mut scope: HashMap<String, Type> = HashMap::new();

        // Top-level declarations are visible to the whole module.
        for item in &program.items {
            match item {
                Stmt::VarDecl { .. } | Stmt::ConstDecl { .. } => {
                    self.check_declaration(item, &mut scope)?;
                }
                _ => {}
            }
        }
        for item in &program.items {
            match item {
                Stmt::Kernel(kernel) => self.check_kernel(kernel)?,
                Stmt::CpuBlock { .. } | Stmt::VarDecl { .. } | Stmt::ConstDecl { .. } => {}
                other => self.check_statement(other, &scope, 0, false)?,
            }
        }
        Ok(())
    }

    fn check_kernel(&mut self, kernel: &Kernel) -> Result<(), CompileError> {
        let mut scope: HashMap<String, Type> = HashMap::new();
        for param in &kernel.params {
            let base = match param.ty {
                Type::Scalar(s) => s,
                Type::Pointer(b) => b,
            };
            if base == ScalarType::Void {
                return Err(CompileError::semantic(
                    format!("parameter '{}' cannot be void", param.name),
                    Some(kernel.span),
                ));
            }
            if scope.insert(param.name.clone(), param.ty).is_some() {
                return Err(CompileError::semantic(
                    format!(
                        "duplicate parameter '{}' in kernel '{}'",
                        param.name, kernel.name
                    ),
                    Some(kernel.span),
                ));
            }
        }

        // Declarations are hoisted to the top of the body by the generator.
        for stmt in &kernel.body {
            if matches!(stmt, Stmt::VarDecl { .. } | Stmt::ConstDecl { .. }) {
                self.check_declaration(stmt, &mut scope)?;
            }
        }
        for stmt in &kernel.body {
            if matches!(stmt, Stmt::VarDecl { .. } | Stmt::ConstDecl { .. }) {
                continue;
            }
            self.check_statement(stmt, &scope, 0, true)?;
        }
        Ok(())
    }

    /// Check a `var` or `const` declaration and register its name.
    fn check_declaration(
        &mut self,
        stmt: &Stmt,
        scope: &mut HashMap<String, Type>,
    ) -> Result<(), CompileError> {
        match stmt {
            Stmt::VarDecl {
                name,
                ty,
                value,
                span,
            } => {
                let Type::Scalar(declared) = ty else {
                    return Err(CompileError::semantic(
                        format!("local variable '{}' cannot have a pointer type", name),
                        Some(*span),
                    ));
                };
                if *declared == ScalarType::Void {
                    return Err(CompileError::semantic(
                        format!("variable '{}' cannot be void", name),
                        Some(*span),
                    ));
                }
                // Registered before the initializer is inferred; a
                // self-referencing initializer sees the declared type.
                scope.insert(name.clone(), *ty);
                let value_ty = self.infer(value, scope, *span)?;
                self.check_store(*declared, value_ty, *span)?;
                Ok(())
            }
            Stmt::ConstDecl {
                name,
                ty,
                value,
                span,
            } => {
                let Type::Scalar(declared) = ty else {
                    return Err(CompileError::semantic(
                        format!("constant '{}' cannot have a pointer type", name),
                        Some(*span),
                    ));
                };
                let value_ty = self.infer(value, scope, *span)?;
                self.check_store(*declared, value_ty, *span)?;
                self.consts.insert(name.clone(), *declared);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_statement(
        &mut self,
        stmt: &Stmt,
        scope: &HashMap<String, Type>,
        loop_depth: usize,
        in_kernel: bool,
    ) -> Result<(), CompileError> {
        match stmt {
            Stmt::VarDecl { span, .. } | Stmt::ConstDecl { span, .. } => {
                Err(CompileError::semantic(
                    "declarations are only allowed at the top of a kernel body",
                    Some(*span),
                ))
            }
            Stmt::Kernel(kernel) => Err(CompileError::semantic(
                format!("nested kernel '{}' is not supported", kernel.name),
                Some(kernel.span),
            )),
            Stmt::CpuBlock { span, .. } => Err(CompileError::semantic(
                "'@cpu' blocks are only allowed at top level",
                Some(*span),
            )),
            Stmt::Return { value, span } => {
                if value.is_some() {
                    let message = if in_kernel {
                        "kernels cannot return a value"
                    } else {
                        "'return' with a value is not allowed"
                    };
                    return Err(CompileError::semantic(message, Some(*span)));
                }
                Ok(())
            }
            Stmt::Break { span } => {
                if loop_depth == 0 {
                    return Err(CompileError::semantic(
                        "'break' outside of a loop",
                        Some(*span),
                    ));
                }
                Ok(())
            }
            Stmt::Assign {
                target,
                value,
                span,
            } => {
                let dest = self.assign_destination(target, scope, *span)?;
                let value_ty = self.infer(value, scope, *span)?;
                self.check_store(dest, value_ty, *span)
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
                span,
            } => {
                let cond_ty = self.infer(condition, scope, *span)?;
                if cond_ty != Type::Scalar(ScalarType::Bool) {
                    return Err(CompileError::semantic(
                        format!("'if' condition must be boolean, found {}", cond_ty),
                        Some(*span),
                    ));
                }
                for s in then_body {
                    self.check_statement(s, scope, loop_depth, in_kernel)?;
                }
                if let Some(else_body) = else_body {
                    for s in else_body {
                        self.check_statement(s, scope, loop_depth, in_kernel)?;
                    }
                }
                Ok(())
            }
            Stmt::Loop { body, .. } => {
                for s in body {
                    self.check_statement(s, scope, loop_depth + 1, in_kernel)?;
                }
                Ok(())
            }
        }
    }

    /// The scalar slot an assignment writes to.
    fn assign_destination(
        &mut self,
        target: &Expr,
        scope: &HashMap<String, Type>,
        span: Span,
    ) -> Result<ScalarType, CompileError> {
        match target {
            Expr::Ident(name) => {
                if let Some(ty) = scope.get(name) {
                    return Ok(match ty {
                        Type::Scalar(s) => *s,
                        Type::Pointer(b) => *b,
                    });
                }
                if self.consts.contains_key(name) {
                    return Err(CompileError::semantic(
                        format!("cannot assign to constant '{}'", name),
                        Some(span),
                    ));
                }
                Err(CompileError::semantic(
                    format!("unknown identifier '{}'", name),
                    Some(span),
                ))
            }
            Expr::Deref(inner) => match self.infer(inner, scope, span)? {
                Type::Pointer(base) => Ok(base),
                other => Err(CompileError::semantic(
                    format!("cannot store through a value of type {}", other),
                    Some(span),
                )),
            },
            _ => Err(CompileError::internal(
                "assignment target must be an identifier or dereference",
            )),
        }
    }

    /// Booleans may be stored into uint slots (flattened to 0/1); everything
    /// else must match exactly.
    fn check_store(
        &self,
        dest: ScalarType,
        value: Type,
        span: Span,
    ) -> Result<(), CompileError> {
        let Type::Scalar(value) = value else {
            return Err(CompileError::semantic(
                "cannot store a pointer value",
                Some(span),
            ));
        };
        if value == dest || (value == ScalarType::Bool && dest == ScalarType::UInt) {
            return Ok(());
        }
        Err(CompileError::semantic(
            format!("type mismatch in assignment: cannot store {} into {}", value, dest),
            Some(span),
        ))
    }

    fn infer(
        &mut self,
        expr: &Expr,
        scope: &HashMap<String, Type>,
        span: Span,
    ) -> Result<Type, CompileError> {
        match expr {
            Expr::Literal(lit) => Ok(Type::Scalar(lit.scalar_type())),
            Expr::Ident(name) => {
                if let Some(ty) = scope.get(name) {
                    return Ok(*ty);
                }
                if let Some(ty) = self.consts.get(name) {
                    return Ok(Type::Scalar(*ty));
                }
                Err(CompileError::semantic(
                    format!("unknown identifier '{}'", name),
                    Some(span),
                ))
            }
            Expr::Unary { op, operand } => {
                let operand_ty = self.infer(operand, scope, span)?;
                let Type::Scalar(scalar) = operand_ty else {
                    return Err(CompileError::semantic(
                        format!("unary '{}' cannot be applied to a pointer", op.symbol()),
                        Some(span),
                    ));
                };
                match op {
                    UnaryOp::Not => match scalar {
                        ScalarType::Bool | ScalarType::UInt => Ok(Type::Scalar(ScalarType::Bool)),
                        _ => Err(CompileError::semantic(
                            format!("operator '!' requires a boolean or integer operand, found {}", scalar),
                            Some(span),
                        )),
                    },
                    UnaryOp::Neg => match scalar {
                        ScalarType::UInt | ScalarType::Float => Ok(Type::Scalar(scalar)),
                        _ => Err(CompileError::semantic(
                            format!("operator '-' requires a numeric operand, found {}", scalar),
                            Some(span),
                        )),
                    },
                    UnaryOp::BitNot => match scalar {
                        ScalarType::UInt => Ok(Type::Scalar(ScalarType::UInt)),
                        _ => Err(CompileError::semantic(
                            format!("operator '~' requires an integer operand, found {}", scalar),
                            Some(span),
                        )),
                    },
                }
            }
            Expr::Binary { op, left, right } => {
                let left_ty = self.infer(left, scope, span)?;
                let right_ty = self.infer(right, scope, span)?;
                let (Type::Scalar(l), Type::Scalar(r)) = (left_ty, right_ty) else {
                    return Err(CompileError::semantic(
                        format!("operator '{}' cannot be applied to pointers", op.symbol()),
                        Some(span),
                    ));
                };
                self.binary_result(*op, l, r, span).map(Type::Scalar)
            }
            Expr::Bitwise(inner) => self.infer(inner, scope, span),
            Expr::Cast { value, target } => {
                let value_ty = self.infer(value, scope, span)?;
                let (Type::Scalar(from), Type::Scalar(to)) = (value_ty, *target) else {
                    return Err(CompileError::semantic(
                        "cast involving pointer types is not supported",
                        Some(span),
                    ));
                };
                let ok = from == to
                    || matches!(
                        (from, to),
                        (ScalarType::UInt, ScalarType::Float)
                            | (ScalarType::Float, ScalarType::UInt)
                    );
                if !ok {
                    return Err(CompileError::semantic(
                        format!("unsupported cast from {} to {}", from, to),
                        Some(span),
                    ));
                }
                Ok(Type::Scalar(to))
            }
            Expr::Deref(inner) => match self.infer(inner, scope, span)? {
                Type::Pointer(base) => Ok(Type::Scalar(base)),
                other => Err(CompileError::semantic(
                    format!("cannot dereference a value of type {}", other),
                    Some(span),
                )),
            },
            Expr::AddrOf(inner) => {
                let Expr::Ident(name) = inner.as_ref() else {
                    return Err(CompileError::semantic(
                        "address-of requires an identifier",
                        Some(span),
                    ));
                };
                if let Some(ty) = scope.get(name) {
                    return match ty {
                        Type::Pointer(_) => Err(CompileError::semantic(
                            format!("cannot take the address of pointer '{}'", name),
                            Some(span),
                        )),
                        Type::Scalar(s) => Ok(Type::Pointer(*s)),
                    };
                }
                if self.consts.contains_key(name) {
                    return Err(CompileError::semantic(
                        format!("cannot take the address of constant '{}'", name),
                        Some(span),
                    ));
                }
                Err(CompileError::semantic(
                    format!("unknown identifier '{}'", name),
                    Some(span),
                ))
            }
        }
    }

    fn binary_result(
        &self,
        op: BinOp,
        left: ScalarType,
        right: ScalarType,
        span: Span,
    ) -> Result<ScalarType, CompileError> {
        use ScalarType::*;

        if op.is_logical() {
            // uint operands coerce to bool before the logical op
            for side in [left, right] {
                if !matches!(side, Bool | UInt) {
                    return Err(CompileError::semantic(
                        format!(
                            "operator '{}' requires boolean or integer operands, found {}",
                            op.symbol(),
                            side
                        ),
                        Some(span),
                    ));
                }
            }
            return Ok(Bool);
        }

        if left != right {
            return Err(CompileError::semantic(
                format!("type mismatch in binary operation: {} vs {}", left, right),
                Some(span),
            ));
        }

        if op.is_comparison() {
            return match left {
                UInt | Float => Ok(Bool),
                _ => Err(CompileError::semantic(
                    format!(
                        "comparison '{}' requires integer or float operands, found {}",
                        op.symbol(),
                        left
                    ),
                    Some(span),
                )),
            };
        }

        let supported = match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => matches!(left, UInt | Float),
            BinOp::FloorDiv
            | BinOp::Mod
            | BinOp::BitAnd
            | BinOp::BitOr
            | BinOp::BitXor
            | BinOp::Shl
            | BinOp::Shr => left == UInt,
            _ => false,
        };
        if supported {
            Ok(left)
        } else {
            Err(CompileError::semantic(
                format!(
                    "unsupported operator '{}' for {} operands",
                    op.symbol(),
                    left
                ),
                Some(span),
            ))
        }
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}
