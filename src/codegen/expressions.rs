//! Expression lowering.
//!
//! Every lowering returns `(instructions, result id, result type)`. The
//! instructions are appended by the caller; constants and types land in
//! the module tables as a side effect.

use super::CodeGen;
use crate::ast::{BinOp, Expr, ScalarType, Type, UnaryOp};
use crate::error::CompileError;

pub(super) type Lowered = (Vec<String>, String, Type);

impl CodeGen {
    pub(super) fn codegen_expression(&mut self, expr: &Expr) -> Result<Lowered, CompileError> {
        match expr {
            Expr::Literal(lit) => {
                let id = self.constant(lit)?;
                Ok((Vec::new(), id, Type::Scalar(lit.scalar_type())))
            }
            Expr::Ident(name) => self.codegen_ident(name),
            Expr::Unary { op, operand } => self.codegen_unary(*op, operand),
            Expr::Binary { op, left, right } => self.codegen_binary(*op, left, right),
            Expr::Bitwise(inner) => self.codegen_expression(inner),
            Expr::Cast { value, target } => self.codegen_cast(value, *target),
            Expr::Deref(inner) => self.codegen_deref(inner),
            Expr::AddrOf(inner) => self.codegen_addr_of(inner),
        }
    }

    fn codegen_ident(&mut self, name: &str) -> Result<Lowered, CompileError> {
        let slot = self
            .var_ids
            .get(name)
            .or_else(|| self.param_ids.get(name))
            .cloned();
        let Some((ptr, ty)) = slot else {
            // Not a local or parameter: a resolved user constant is just
            // its value id.
            if let Some(konst) = self.named_consts.get(name)
                && let Some(id) = &konst.id
            {
                return Ok((Vec::new(), id.clone(), Type::Scalar(konst.ty)));
            }
            return Err(CompileError::semantic(
                format!("unknown identifier '{}'", name),
                None,
            ));
        };
        match ty {
            // Pointer-typed names are used as-is, no load.
            Type::Pointer(_) => Ok((Vec::new(), ptr, ty)),
            Type::Scalar(scalar) => {
                let type_id = self.scalar_type_id(scalar)?;
                let id = self.fresh_id();
                Ok((vec![format!("{} = OpLoad {} {}", id, type_id, ptr)], id, ty))
            }
        }
    }

    fn codegen_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Lowered, CompileError> {
        let (mut code, mut id, ty) = self.codegen_expression(operand)?;
        let Type::Scalar(mut scalar) = ty else {
            return Err(CompileError::semantic(
                format!("unary '{}' cannot be applied to a pointer", op.symbol()),
                None,
            ));
        };
        match op {
            UnaryOp::Not => {
                if scalar == ScalarType::Bool {
                    // Flatten the boolean to 0/1 first.
                    let one = self.constant_uint(1)?;
                    let zero = self.constant_uint(0)?;
                    let uint_id = self.scalar_type_id(ScalarType::UInt)?;
                    let conv = self.fresh_id();
                    code.push(format!(
                        "{} = OpSelect {} {} {} {}",
                        conv, uint_id, id, one, zero
                    ));
                    id = conv;
                    scalar = ScalarType::UInt;
                }
                if scalar != ScalarType::UInt {
                    return Err(CompileError::semantic(
                        format!(
                            "operator '!' requires a boolean or integer operand, found {}",
                            scalar
                        ),
                        None,
                    ));
                }
                // !x == (1 - x) != 0
                let one = self.constant_uint(1)?;
                let zero = self.constant_uint(0)?;
                let uint_id = self.scalar_type_id(ScalarType::UInt)?;
                let bool_id = self.scalar_type_id(ScalarType::Bool)?;
                let sub = self.fresh_id();
                code.push(format!("{} = OpISub {} {} {}", sub, uint_id, one, id));
                let result = self.fresh_id();
                code.push(format!(
                    "{} = OpINotEqual {} {} {}",
                    result, bool_id, sub, zero
                ));
                Ok((code, result, Type::Scalar(ScalarType::Bool)))
            }
            UnaryOp::Neg => {
                if !matches!(scalar, ScalarType::UInt | ScalarType::Float) {
                    return Err(CompileError::semantic(
                        format!("operator '-' requires a numeric operand, found {}", scalar),
                        None,
                    ));
                }
                let type_id = self.scalar_type_id(scalar)?;
                let result = self.fresh_id();
                code.push(format!("{} = OpSNegate {} {}", result, type_id, id));
                Ok((code, result, Type::Scalar(scalar)))
            }
            UnaryOp::BitNot => {
                if scalar != ScalarType::UInt {
                    return Err(CompileError::semantic(
                        format!("operator '~' requires an integer operand, found {}", scalar),
                        None,
                    ));
                }
                let type_id = self.scalar_type_id(scalar)?;
                let result = self.fresh_id();
                code.push(format!("{} = OpNot {} {}", result, type_id, id));
                Ok((code, result, Type::Scalar(scalar)))
            }
        }
    }

    fn codegen_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Lowered, CompileError> {
        let (mut code, mut left_id, left_ty) = self.codegen_expression(left)?;
        let (right_code, mut right_id, right_ty) = self.codegen_expression(right)?;
        code.extend(right_code);

        let (Type::Scalar(mut left_scalar), Type::Scalar(mut right_scalar)) = (left_ty, right_ty)
        else {
            return Err(CompileError::semantic(
                format!("operator '{}' cannot be applied to pointers", op.symbol()),
                None,
            ));
        };

        if op.is_logical() {
            // uint operands collapse to booleans by comparing against zero.
            for (id, scalar) in [
                (&mut left_id, &mut left_scalar),
                (&mut right_id, &mut right_scalar),
            ] {
                if *scalar == ScalarType::UInt {
                    let zero = self.constant_uint(0)?;
                    let bool_id = self.scalar_type_id(ScalarType::Bool)?;
                    let conv = self.fresh_id();
                    code.push(format!("{} = OpINotEqual {} {} {}", conv, bool_id, *id, zero));
                    *id = conv;
                    *scalar = ScalarType::Bool;
                }
            }
        }

        if left_scalar != right_scalar {
            return Err(CompileError::semantic(
                format!(
                    "type mismatch in binary operation: {} vs {}",
                    left_scalar, right_scalar
                ),
                None,
            ));
        }

        let Some(instruction) = instruction_for(op, left_scalar) else {
            return Err(CompileError::semantic(
                format!(
                    "unsupported operator '{}' for {} operands",
                    op.symbol(),
                    left_scalar
                ),
                None,
            ));
        };

        let result_scalar = if op.is_comparison() || op.is_logical() {
            ScalarType::Bool
        } else {
            left_scalar
        };
        let result_type_id = self.scalar_type_id(result_scalar)?;
        let result = self.fresh_id();
        code.push(format!(
            "{} = {} {} {} {}",
            result, instruction, result_type_id, left_id, right_id
        ));
        Ok((code, result, Type::Scalar(result_scalar)))
    }

    fn codegen_cast(&mut self, value: &Expr, target: Type) -> Result<Lowered, CompileError> {
        let (mut code, id, ty) = self.codegen_expression(value)?;
        let (Type::Scalar(from), Type::Scalar(to)) = (ty, target) else {
            return Err(CompileError::semantic(
                "cast involving pointer types is not supported",
                None,
            ));
        };
        if from == to {
            return Ok((code, id, Type::Scalar(to)));
        }
        let instruction = match (from, to) {
            (ScalarType::UInt, ScalarType::Float) => "OpConvertUToF",
            (ScalarType::Float, ScalarType::UInt) => "OpConvertFToU",
            _ => {
                return Err(CompileError::semantic(
                    format!("unsupported cast from {} to {}", from, to),
                    None,
                ));
            }
        };
        let type_id = self.scalar_type_id(to)?;
        let result = self.fresh_id();
        code.push(format!("{} = {} {} {}", result, instruction, type_id, id));
        Ok((code, result, Type::Scalar(to)))
    }

    fn codegen_deref(&mut self, inner: &Expr) -> Result<Lowered, CompileError> {
        let (mut code, ptr, ty) = self.codegen_expression(inner)?;
        let Type::Pointer(base) = ty else {
            return Err(CompileError::semantic(
                format!("cannot dereference a value of type {}", ty),
                None,
            ));
        };
        let type_id = self.scalar_type_id(base)?;
        let result = self.fresh_id();
        code.push(format!("{} = OpLoad {} {}", result, type_id, ptr));
        Ok((code, result, Type::Scalar(base)))
    }

    /// `&x` returns the variable's existing pointer id; there is no
    /// instruction to emit. Taking the address of a pointer is rejected.
    fn codegen_addr_of(&mut self, inner: &Expr) -> Result<Lowered, CompileError> {
        let Expr::Ident(name) = inner else {
            return Err(CompileError::semantic(
                "address-of requires an identifier",
                None,
            ));
        };
        let slot = self
            .var_ids
            .get(name)
            .or_else(|| self.param_ids.get(name))
            .cloned();
        let Some((ptr, ty)) = slot else {
            return Err(CompileError::semantic(
                format!("unknown identifier '{}'", name),
                None,
            ));
        };
        match ty {
            Type::Pointer(_) => Err(CompileError::semantic(
                format!("cannot take the address of pointer '{}'", name),
                None,
            )),
            Type::Scalar(scalar) => Ok((Vec::new(), ptr, Type::Pointer(scalar))),
        }
    }
}

/// Instruction selection for binary operators, per operand scalar type.
fn instruction_for(op: BinOp, operands: ScalarType) -> Option<&'static str> {
    match operands {
        ScalarType::UInt => match op {
            BinOp::Add => Some("OpIAdd"),
            BinOp::Sub => Some("OpISub"),
            BinOp::Mul => Some("OpIMul"),
            BinOp::Div => Some("OpSDiv"),
            BinOp::FloorDiv => Some("OpUDiv"),
            BinOp::Mod => Some("OpUMod"),
            BinOp::Eq => Some("OpIEqual"),
            BinOp::Ne => Some("OpINotEqual"),
            BinOp::Lt => Some("OpULessThan"),
            BinOp::Gt => Some("OpUGreaterThan"),
            BinOp::Le => Some("OpULessThanEqual"),
            BinOp::Ge => Some("OpUGreaterThanEqual"),
            BinOp::BitAnd => Some("OpBitwiseAnd"),
            BinOp::BitOr => Some("OpBitwiseOr"),
            BinOp::BitXor => Some("OpBitwiseXor"),
            BinOp::Shl => Some("OpShiftLeftLogical"),
            BinOp::Shr => Some("OpShiftRightLogical"),
            BinOp::And | BinOp::Or => None,
        },
        ScalarType::Float => match op {
            BinOp::Add => Some("OpFAdd"),
            BinOp::Sub => Some("OpFSub"),
            BinOp::Mul => Some("OpFMul"),
            BinOp::Div => Some("OpFDiv"),
            BinOp::Eq => Some("OpFOrdEqual"),
            BinOp::Ne => Some("OpFOrdNotEqual"),
            BinOp::Lt => Some("OpFOrdLessThan"),
            BinOp::Gt => Some("OpFOrdGreaterThan"),
            BinOp::Le => Some("OpFOrdLessThanEqual"),
            BinOp::Ge => Some("OpFOrdGreaterThanEqual"),
            _ => None,
        },
        ScalarType::Bool => match op {
            BinOp::And => Some("OpLogicalAnd"),
            BinOp::Or => Some("OpLogicalOr"),
            _ => None,
        },
        ScalarType::Void => None,
    }
}
