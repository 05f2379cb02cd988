//! SPIR-V assembly generation.
//!
//! Lowers the typed AST to SPIR-V assembly text for the OpenCL execution
//! model. Sections are emitted in a fixed order: header comments,
//! capability, memory model, entry points, type declarations, function
//! types, constants, then one function body per kernel in source order.
//!
//! Result ids are `%N` symbols handed out by a counter and never reused.
//! Every basic block starts with an `OpLabel` and ends with exactly one
//! branch or return; [`CodeGen::lower_body`] enforces that while stitching
//! statement sequences together.
//!
//! # Module structure
//!
//! - `state.rs`: the `CodeGen` context (id allocator, type/constant/symbol
//!   tables, break-target stack)
//! - `types.rs`: built-in type emission and constant interning
//! - `expressions.rs`: expression lowering to `(instructions, id, type)`
//! - `statements.rs`: statement lowering, store coercion, block stitching
//! - `control_flow.rs`: structured `if` and `loop` regions

mod control_flow;
mod expressions;
mod state;
mod statements;
mod types;

pub use state::CodeGen;

use crate::ast::{Expr, ScalarType, Stmt, Type};
use crate::error::CompileError;
use state::{NamedConst, StorageClass, TypeKey};

/// A block is terminated once its last instruction branches or returns.
pub(crate) fn is_terminated(code: &[String]) -> bool {
    code.last()
        .is_some_and(|line| line.starts_with("OpBranch") || line.starts_with("OpReturn"))
}

/// The label id when `code` starts a new labeled block.
pub(crate) fn leading_label(code: &[String]) -> Option<&str> {
    let (id, op) = code.first()?.split_once('=')?;
    if op.trim() == "OpLabel" {
        Some(id.trim())
    } else {
        None
    }
}

impl CodeGen {
    /// Generate a complete SPIR-V module for the kernels in `items`.
    /// Non-kernel statements at top level contribute constants but no code.
    pub fn generate(&mut self, items: &[Stmt]) -> Result<String, CompileError> {
        self.declare_builtin_types();
        self.collect_entry_points(items)?;

        // Resolve literal-valued constants up front: top-level ones, then
        // every kernel body's. Non-literal initializers resolve when their
        // kernel is lowered.
        self.register_literal_constants(items)?;
        for item in items {
            if let Stmt::Kernel(kernel) = item {
                self.register_literal_constants(&kernel.body)?;
            }
        }

        let mut functions = Vec::new();
        for item in items {
            if let Stmt::Kernel(kernel) = item {
                functions.extend(self.codegen_kernel(kernel)?);
            }
        }

        let mut module: Vec<String> = vec!["; SPIR-V".to_string(), "; Version: 1.0".to_string()];
        module.push("OpCapability Kernel".to_string());
        module.push("OpMemoryModel Logical OpenCL".to_string());
        module.extend(self.entry_points.iter().cloned());
        module.extend(self.type_decls.iter().cloned());
        module.extend(self.func_type_decls.iter().cloned());
        module.extend(self.constant_decls.iter().cloned());
        module.extend(functions);
        Ok(module.join("\n"))
    }

    /// Allocate a function id and function type per kernel and emit its
    /// entry point line.
    fn collect_entry_points(&mut self, items: &[Stmt]) -> Result<(), CompileError> {
        for item in items {
            let Stmt::Kernel(kernel) = item else { continue };
            if self.kernel_func_ids.contains_key(&kernel.name) {
                return Err(CompileError::semantic(
                    format!("duplicate kernel name '{}'", kernel.name),
                    Some(kernel.span),
                ));
            }
            let fid = self.fresh_id();
            self.kernel_func_ids.insert(kernel.name.clone(), fid.clone());

            let mut signature = Vec::with_capacity(kernel.params.len());
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
                signature.push(TypeKey::Pointer(StorageClass::CrossWorkgroup, base));
            }
            let fn_type = self.function_type_id(&signature)?;
            self.func_type_ids.insert(kernel.name.clone(), fn_type);
            self.entry_points
                .push(format!("OpEntryPoint Kernel {} \"{}\"", fid, kernel.name));
        }
        Ok(())
    }

    /// Pre-resolve `const` declarations with literal initializers into
    /// constant ids; anything else stays deferred with just its type.
    fn register_literal_constants(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for stmt in stmts {
            let Stmt::ConstDecl {
                name,
                ty,
                value,
                span,
            } = stmt
            else {
                continue;
            };
            match value {
                Expr::Literal(lit) => {
                    let id = self.constant(lit)?;
                    self.named_consts.insert(
                        name.clone(),
                        NamedConst {
                            id: Some(id),
                            ty: lit.scalar_type(),
                        },
                    );
                }
                _ => {
                    let Type::Scalar(scalar) = ty else {
                        return Err(CompileError::semantic(
                            format!("constant '{}' cannot have a pointer type", name),
                            Some(*span),
                        ));
                    };
                    self.named_consts.insert(
                        name.clone(),
                        NamedConst {
                            id: None,
                            ty: *scalar,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Lower one kernel. Five phases after the prologue: constants were
    /// pre-resolved, locals get their OpVariables, initializer stores run,
    /// deferred constants resolve, then the remaining statements lower in
    /// source order.
    fn codegen_kernel(&mut self, kernel: &crate::ast::Kernel) -> Result<Vec<String>, CompileError> {
        let fid = self
            .kernel_func_ids
            .get(&kernel.name)
            .cloned()
            .ok_or_else(|| CompileError::internal("kernel id missing"))?;
        let fn_type = self
            .func_type_ids
            .get(&kernel.name)
            .cloned()
            .ok_or_else(|| CompileError::internal("kernel function type missing"))?;
        let void_id = self.scalar_type_id(ScalarType::Void)?;

        let mut result = vec![format!("{} = OpFunction {} None {}", fid, void_id, fn_type)];

        self.param_ids.clear();
        self.var_ids.clear();

        for param in &kernel.params {
            let ptr_type = self.param_pointer_id(&param.ty)?;
            let pid = self.fresh_id();
            result.push(format!("{} = OpFunctionParameter {}", pid, ptr_type));
            self.param_ids.insert(param.name.clone(), (pid, param.ty));
        }

        let entry = self.fresh_id();
        result.push(format!("{} = OpLabel", entry));

        let mut var_decls: Vec<(&str, Type, &Expr)> = Vec::new();
        let mut deferred_consts = Vec::new();
        let mut other = Vec::new();
        for stmt in &kernel.body {
            match stmt {
                Stmt::VarDecl {
                    name,
                    ty,
                    value,
                    span,
                } => {
                    if ty.is_pointer() {
                        return Err(CompileError::semantic(
                            format!("local variable '{}' cannot have a pointer type", name),
                            Some(*span),
                        ));
                    }
                    var_decls.push((name.as_str(), *ty, value));
                }
                Stmt::ConstDecl { name, value, .. } => {
                    if !matches!(value, Expr::Literal(_)) {
                        deferred_consts.push((name, value));
                    }
                }
                _ => other.push(stmt),
            }
        }

        // OpVariables first; they must sit at the top of the entry block.
        for (name, ty, _) in &var_decls {
            let base = ty.scalar().unwrap_or(ScalarType::Void);
            let ptr_type = self.pointer_type_id(StorageClass::Function, base)?;
            let var_id = self.fresh_id();
            result.push(format!("{} = OpVariable {} Function", var_id, ptr_type));
            self.var_ids.insert((*name).to_string(), (var_id, *ty));
        }

        for (name, _, value) in &var_decls {
            let code = self.codegen_assign(&Expr::Ident((*name).to_string()), value)?;
            result.extend(code);
        }

        for (name, value) in deferred_consts {
            let (code, id, ty) = self.codegen_expression(value)?;
            result.extend(code);
            let Type::Scalar(scalar) = ty else {
                return Err(CompileError::semantic(
                    format!("constant '{}' cannot hold a pointer", name),
                    None,
                ));
            };
            self.named_consts.insert(
                name.clone(),
                NamedConst {
                    id: Some(id),
                    ty: scalar,
                },
            );
        }

        for stmt in other {
            let code = self.codegen_statement(stmt)?;
            if code.is_empty() {
                return Err(CompileError::internal(
                    "statement lowering produced no instructions",
                ));
            }
            self.stitch(&mut result, &code, true);
            result.extend(code);
        }

        if !matches!(kernel.body.last(), Some(Stmt::Return { .. })) {
            result.push("OpReturn".to_string());
        }
        result.push("OpFunctionEnd".to_string());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn generate(source: &str) -> String {
        let program = Parser::new(tokenize(source).unwrap()).parse().unwrap();
        crate::typecheck::check_program(&program).unwrap();
        CodeGen::new().generate(&program.items).unwrap()
    }

    fn generate_err(source: &str) -> CompileError {
        let program = Parser::new(tokenize(source).unwrap()).parse().unwrap();
        CodeGen::new().generate(&program.items).unwrap_err()
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    /// The id on the left of the first line matching `fragment`.
    fn id_of(out: &str, fragment: &str) -> String {
        out.lines()
            .find(|l| l.contains(fragment))
            .and_then(|l| l.split_once('='))
            .map(|(id, _)| id.trim().to_string())
            .unwrap_or_else(|| panic!("no line matching '{}'", fragment))
    }

    /// Every `%N` on the left of an `=` must be defined exactly once.
    fn assert_unique_ids(out: &str) {
        let mut seen = std::collections::HashSet::new();
        for line in out.lines() {
            let Some((lhs, _)) = line.split_once('=') else {
                continue;
            };
            let lhs = lhs.trim();
            if !lhs.starts_with('%') {
                continue;
            }
            assert!(seen.insert(lhs.to_string()), "id {} defined twice", lhs);
        }
    }

    /// Every labeled block must end in exactly one terminator before the
    /// next label or OpFunctionEnd.
    fn assert_blocks_terminated(out: &str) {
        let mut in_block = false;
        let mut terminated = false;
        for line in out.lines() {
            let line = line.trim();
            if line.ends_with("= OpLabel") {
                assert!(
                    !in_block || terminated,
                    "unterminated block before {}",
                    line
                );
                in_block = true;
                terminated = false;
                continue;
            }
            if line == "OpFunctionEnd" {
                assert!(!in_block || terminated, "unterminated block at function end");
                in_block = false;
                continue;
            }
            if in_block {
                assert!(!terminated, "instruction after terminator: {}", line);
                if line.starts_with("OpBranch") || line.starts_with("OpReturn") {
                    terminated = true;
                }
            }
        }
    }

    const SCALAR_ADD: &str =
        "kernel add(a: int, b: int, out: int) { var s: int = 0; s = a + b; out = s; return; }";

    #[test]
    fn test_module_skeleton() {
        let out = generate(SCALAR_ADD);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "; SPIR-V");
        assert_eq!(lines[1], "; Version: 1.0");
        assert_eq!(lines[2], "OpCapability Kernel");
        assert_eq!(lines[3], "OpMemoryModel Logical OpenCL");
        assert!(lines[4].starts_with("OpEntryPoint Kernel"));
        assert!(out.ends_with("OpFunctionEnd"));
    }

    #[test]
    fn test_scalar_add_kernel() {
        let out = generate(SCALAR_ADD);

        // four scalar type lines
        assert!(out.contains("OpTypeVoid"));
        assert!(out.contains("OpTypeBool"));
        assert!(out.contains("OpTypeInt 32 0"));
        assert!(out.contains("OpTypeFloat 32"));

        // three CrossWorkgroup uint parameters
        let uint_id = id_of(&out, "OpTypeInt 32 0");
        let ptr_cross_uint = id_of(&out, &format!("OpTypePointer CrossWorkgroup {}", uint_id));
        assert_eq!(
            count(&out, &format!("OpFunctionParameter {}", ptr_cross_uint)),
            3
        );

        // one local in Function storage
        let ptr_func_uint = id_of(&out, &format!("OpTypePointer Function {}", uint_id));
        assert_eq!(
            count(&out, &format!("OpVariable {} Function", ptr_func_uint)),
            1
        );

        // the add itself, on the uint type
        assert_eq!(count(&out, &format!("OpIAdd {}", uint_id)), 1);

        // loads of a, b, and s; stores into s (init + sum) and out
        assert_eq!(count(&out, "OpLoad"), 3);
        assert_eq!(count(&out, "OpStore"), 3);

        assert!(out.contains("OpReturn"));
        assert_unique_ids(&out);
        assert_blocks_terminated(&out);
    }

    #[test]
    fn test_entry_point_names_kernel() {
        let out = generate(SCALAR_ADD);
        assert!(out.contains("OpEntryPoint Kernel %11 \"add\""));
    }

    #[test]
    fn test_if_else_structure() {
        let out = generate(
            "kernel k(x: int, out: int) { if (x == 0) { out = 1; } else { out = 2; } return; }",
        );
        let bool_id = id_of(&out, "OpTypeBool");
        assert_eq!(count(&out, &format!("OpIEqual {}", bool_id)), 1);

        let merge_line = out
            .lines()
            .find(|l| l.starts_with("OpSelectionMerge"))
            .expect("selection merge emitted");
        let merge_label = merge_line.split_whitespace().nth(1).unwrap();

        // OpSelectionMerge immediately precedes the conditional branch
        let lines: Vec<&str> = out.lines().collect();
        let merge_index = lines.iter().position(|l| *l == merge_line).unwrap();
        assert!(lines[merge_index + 1].starts_with("OpBranchConditional"));

        // the merge label is defined exactly once, and both bodies branch to it
        assert_eq!(count(&out, &format!("{} = OpLabel", merge_label)), 1);
        let branches_to_merge = lines
            .iter()
            .filter(|l| **l == format!("OpBranch {}", merge_label))
            .count();
        assert_eq!(branches_to_merge, 2);

        assert_unique_ids(&out);
        assert_blocks_terminated(&out);
    }

    #[test]
    fn test_loop_with_break() {
        let out = generate(
            "kernel k(out: int) { var i: int = 0; loop { if (i == 10) { break; } i = i + 1; } out = i; return; }",
        );
        let loop_merge_line = out
            .lines()
            .find(|l| l.starts_with("OpLoopMerge"))
            .expect("loop merge emitted");
        let mut parts = loop_merge_line.split_whitespace();
        parts.next();
        let merge = parts.next().unwrap();
        let continue_label = parts.next().unwrap();

        // break branches straight to the loop merge
        assert!(count(&out, &format!("OpBranch {}", merge)) >= 1);

        // the continue block branches back to the condition label
        let lines: Vec<&str> = out.lines().collect();
        let cont_index = lines
            .iter()
            .position(|l| *l == format!("{} = OpLabel", continue_label))
            .expect("continue block present");
        assert!(lines[cont_index + 1].starts_with("OpBranch"));

        assert_unique_ids(&out);
        assert_blocks_terminated(&out);
    }

    #[test]
    fn test_nested_loops_break_innermost() {
        let out = generate(
            "kernel k(out: int) { loop { loop { break; } break; } out = 1; return; }",
        );
        assert_eq!(count(&out, "OpLoopMerge"), 2);
        assert_unique_ids(&out);
        assert_blocks_terminated(&out);
    }

    #[test]
    fn test_bool_store_coercion() {
        let out = generate("kernel k(out: uint) { out = 1 == 1; return; }");
        let bool_id = id_of(&out, "OpTypeBool");
        let uint_id = id_of(&out, "OpTypeInt 32 0");

        let lines: Vec<&str> = out.lines().collect();
        let eq_index = lines
            .iter()
            .position(|l| l.contains(&format!("OpIEqual {}", bool_id)))
            .expect("comparison emitted");
        // OpSelect flattens the boolean, immediately before the store
        assert!(lines[eq_index + 1].contains(&format!("OpSelect {}", uint_id)));
        assert!(lines[eq_index + 2].starts_with("OpStore"));
    }

    #[test]
    fn test_logical_coercion_of_uint_operands() {
        let out = generate("kernel k(x: uint, out: uint) { out = (x == 1) && x; return; }");
        assert!(out.contains("OpLogicalAnd"));
        // the bare uint operand is compared against zero first
        assert!(count(&out, "OpINotEqual") >= 1);
    }

    #[test]
    fn test_deref_and_addr_of() {
        let out = generate("kernel k(x: uint, out: uint) { out = *&x; return; }");
        // &x is the parameter pointer itself; *&x loads from it
        assert_eq!(count(&out, "OpLoad"), 1);
        assert_unique_ids(&out);
    }

    #[test]
    fn test_pointer_param_store_through_deref() {
        let out = generate("kernel k(p: ptr_uint) { *p = 3; return; }");
        assert_eq!(count(&out, "OpStore"), 1);
        assert_blocks_terminated(&out);
    }

    #[test]
    fn test_cast_uint_to_float() {
        let out = generate("kernel k(x: uint, out: float) { out = cast { x as float }; return; }");
        assert!(out.contains("OpConvertUToF"));
    }

    #[test]
    fn test_cast_float_to_uint() {
        let out =
            generate("kernel k(x: float, out: uint) { out = cast { x as uint }; return; }");
        assert!(out.contains("OpConvertFToU"));
    }

    #[test]
    fn test_bitwise_block_lowering() {
        let out = generate("kernel k(x: uint, out: uint) { out = bitwise { x << 2 | 1 }; return; }");
        assert!(out.contains("OpShiftLeftLogical"));
        assert!(out.contains("OpBitwiseOr"));
    }

    #[test]
    fn test_unary_not_shape() {
        let out = generate("kernel k(x: uint, out: uint) { out = !x; return; }");
        // 1 - x, then != 0
        assert!(out.contains("OpISub"));
        assert!(out.contains("OpINotEqual"));
    }

    #[test]
    fn test_negate_uses_operand_type() {
        let out = generate("kernel k(x: uint, out: uint) { out = -x; return; }");
        let uint_id = id_of(&out, "OpTypeInt 32 0");
        assert!(out.contains(&format!("OpSNegate {}", uint_id)));
    }

    #[test]
    fn test_literal_constants_shared() {
        let out = generate("kernel k(out: uint) { var a: uint = 7; out = a + 7; return; }");
        let uint_id = id_of(&out, "OpTypeInt 32 0");
        assert_eq!(count(&out, &format!("OpConstant {} 7", uint_id)), 1);
    }

    #[test]
    fn test_const_decl_resolves_to_constant() {
        let out =
            generate("kernel k(out: uint) { const limit: uint = 10; out = limit; return; }");
        let uint_id = id_of(&out, "OpTypeInt 32 0");
        assert!(out.contains(&format!("OpConstant {} 10", uint_id)));
        // no load for a constant use
        assert_eq!(count(&out, "OpLoad"), 0);
    }

    #[test]
    fn test_non_literal_const_resolves_from_variables() {
        let out = generate(
            "kernel k(x: uint, out: uint) { const base: uint = x; out = base + 1; return; }",
        );
        // the initializer loads x once; later uses reuse the id
        assert_eq!(count(&out, "OpLoad"), 1);
        assert_unique_ids(&out);
    }

    #[test]
    fn test_two_kernels_in_source_order() {
        let out = generate(
            "kernel first(out: int) { return; } kernel second(out: int) { return; }",
        );
        assert_eq!(count(&out, "OpEntryPoint Kernel"), 2);
        assert_eq!(count(&out, "OpFunctionEnd"), 2);
        let first = out.find("\"first\"").unwrap();
        let second = out.find("\"second\"").unwrap();
        assert!(first < second);
        // identical signatures share one function type
        assert_eq!(count(&out, "OpTypeFunction"), 1);
        assert_unique_ids(&out);
    }

    #[test]
    fn test_missing_trailing_return_is_synthesized() {
        let out = generate("kernel k(out: int) { out = 1; }");
        assert!(out.contains("OpReturn"));
        assert_blocks_terminated(&out);
    }

    #[test]
    fn test_opt_type_int_emitted_once() {
        let out = generate(
            "kernel k(a: int, b: uint, out: int) { var s: int = 0; s = a + b; out = s; return; }",
        );
        assert_eq!(count(&out, "OpTypeInt"), 1);
    }

    #[test]
    fn test_pointer_types_declared_before_use() {
        let out = generate(SCALAR_ADD);
        let lines: Vec<&str> = out.lines().collect();
        for (index, line) in lines.iter().enumerate() {
            if line.contains("OpFunctionParameter") {
                let type_id = line.split_whitespace().nth(3).expect("parameter type id");
                let declared = lines[..index]
                    .iter()
                    .any(|l| l.starts_with(&format!("{} = OpTypePointer", type_id)));
                assert!(declared, "parameter type {} not declared first", type_id);
            }
        }
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let err = generate_err(
            "kernel k(x: uint, y: float, out: uint) { var s: uint = 0; s = x + y; out = s; }",
        );
        assert!(err.to_string().contains("type mismatch in binary operation"));
    }

    #[test]
    fn test_break_outside_loop_is_fatal() {
        let err = generate_err("kernel k(out: int) { break; }");
        assert!(err.to_string().contains("'break' outside of a loop"));
    }

    #[test]
    fn test_return_value_is_fatal() {
        let err = generate_err("kernel k(x: int) { return x; }");
        assert!(err.to_string().contains("cannot return a value"));
    }

    #[test]
    fn test_unknown_identifier_is_fatal() {
        let err = generate_err("kernel k(out: int) { out = ghost; }");
        assert!(err.to_string().contains("unknown identifier 'ghost'"));
    }

    #[test]
    fn test_float_floor_div_is_fatal() {
        let err = generate_err("kernel k(x: float, out: float) { out = x // x; }");
        assert!(err.to_string().contains("unsupported operator '//'"));
    }

    #[test]
    fn test_duplicate_kernel_name_is_fatal() {
        let err = generate_err("kernel k(out: int) { return; } kernel k(out: int) { return; }");
        assert!(err.to_string().contains("duplicate kernel name"));
    }

    #[test]
    fn test_unique_ids_across_complex_program() {
        let out = generate(
            "kernel a(x: int, out: int) { var s: int = 0; loop { if (s == 3) { break; } s = s + 1; } out = s; return; } \
             kernel b(y: float, out: float) { out = y * 2.0; return; }",
        );
        assert_unique_ids(&out);
        assert_blocks_terminated(&out);
    }
}
