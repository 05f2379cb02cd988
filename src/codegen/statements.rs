//! Statement lowering and basic-block stitching.

use super::{CodeGen, is_terminated, leading_label};
use crate::ast::{Expr, ScalarType, Stmt, Type};
use crate::error::{CompileError, Span};

impl CodeGen {
    pub(super) fn codegen_statement(&mut self, stmt: &Stmt) -> Result<Vec<String>, CompileError> {
        match stmt {
            Stmt::Return { value, span } => {
                if value.is_some() {
                    return Err(CompileError::semantic(
                        "kernels cannot return a value",
                        Some(*span),
                    ));
                }
                Ok(vec!["OpReturn".to_string()])
            }
            Stmt::Assign { target, value, .. } => self.codegen_assign(target, value),
            Stmt::If {
                condition,
                then_body,
                else_body,
                ..
            } => self.codegen_if(condition, then_body, else_body.as_deref()),
            Stmt::Loop { body, .. } => self.codegen_loop(body),
            Stmt::Break { span } => self.codegen_break(*span),
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
        }
    }

    /// Lower a store. A boolean stored into a uint slot is flattened to
    /// 0/1 with `OpSelect` first.
    pub(super) fn codegen_assign(
        &mut self,
        target: &Expr,
        value: &Expr,
    ) -> Result<Vec<String>, CompileError> {
        let (mut code, target_ptr, target_base) = self.resolve_assign_target(target)?;
        let (value_code, mut value_id, value_ty) = self.codegen_expression(value)?;
        code.extend(value_code);

        if value_ty == Type::Scalar(ScalarType::Bool) && target_base == ScalarType::UInt {
            let one = self.constant_uint(1)?;
            let zero = self.constant_uint(0)?;
            let uint_id = self.scalar_type_id(ScalarType::UInt)?;
            let conv = self.fresh_id();
            code.push(format!(
                "{} = OpSelect {} {} {} {}",
                conv, uint_id, value_id, one, zero
            ));
            value_id = conv;
        }

        code.push(format!("OpStore {} {}", target_ptr, value_id));
        Ok(code)
    }

    /// Resolve an assignment target to a pointer id and its pointee type.
    fn resolve_assign_target(
        &mut self,
        target: &Expr,
    ) -> Result<(Vec<String>, String, ScalarType), CompileError> {
        match target {
            Expr::Ident(name) => {
                let slot = self
                    .var_ids
                    .get(name)
                    .or_else(|| self.param_ids.get(name))
                    .cloned();
                let Some((ptr, ty)) = slot else {
                    return Err(CompileError::semantic(
                        format!("variable or parameter not found: {}", name),
                        None,
                    ));
                };
                let base = match ty {
                    Type::Scalar(s) => s,
                    Type::Pointer(b) => b,
                };
                Ok((Vec::new(), ptr, base))
            }
            Expr::Deref(inner) => {
                let (code, ptr, ty) = self.codegen_expression(inner)?;
                let Type::Pointer(base) = ty else {
                    return Err(CompileError::semantic(
                        format!("cannot store through a value of type {}", ty),
                        None,
                    ));
                };
                Ok((code, ptr, base))
            }
            _ => Err(CompileError::internal(
                "assignment target must be an identifier or dereference",
            )),
        }
    }

    /// `break` branches straight to the innermost loop's merge label.
    pub(super) fn codegen_break(&mut self, span: Span) -> Result<Vec<String>, CompileError> {
        match self.break_targets.last() {
            Some(merge) => Ok(vec![format!("OpBranch {}", merge)]),
            None => Err(CompileError::semantic(
                "'break' outside of a loop",
                Some(span),
            )),
        }
    }

    /// Lower a statement sequence into `out`, keeping every basic block
    /// well formed: an unterminated block branches into a new labeled
    /// block, and code following a terminator opens a fresh block. At the
    /// kernel top level (`split_blocks`) an unterminated block is also
    /// closed before plain code with a synthetic OpBranch/OpLabel pair.
    pub(super) fn lower_body(
        &mut self,
        out: &mut Vec<String>,
        stmts: &[Stmt],
        split_blocks: bool,
    ) -> Result<(), CompileError> {
        for stmt in stmts {
            let code = self.codegen_statement(stmt)?;
            if code.is_empty() {
                return Err(CompileError::internal(
                    "statement lowering produced no instructions",
                ));
            }
            self.stitch(out, &code, split_blocks);
            out.extend(code);
        }
        Ok(())
    }

    pub(super) fn stitch(&mut self, out: &mut Vec<String>, next: &[String], split_blocks: bool) {
        let terminated = is_terminated(out);
        match (terminated, leading_label(next)) {
            (false, Some(label)) => out.push(format!("OpBranch {}", label)),
            (false, None) if split_blocks => {
                let label = self.fresh_id();
                out.push(format!("OpBranch {}", label));
                out.push(format!("{} = OpLabel", label));
            }
            (true, None) => {
                // Unreachable code still needs its own block.
                let label = self.fresh_id();
                out.push(format!("{} = OpLabel", label));
            }
            _ => {}
        }
    }
}
