//! Structured control flow lowering: `if` and `loop`.

use super::{CodeGen, is_terminated};
use crate::ast::{Expr, ScalarType, Stmt, Type};
use crate::error::CompileError;

impl CodeGen {
    /// `if` lowers to a selection: OpSelectionMerge then a conditional
    /// branch into the labeled bodies, each falling through to the merge
    /// label unless already terminated (a `break` or `return` inside).
    pub(super) fn codegen_if(
        &mut self,
        condition: &Expr,
        then_body: &[Stmt],
        else_body: Option<&[Stmt]>,
    ) -> Result<Vec<String>, CompileError> {
        let then_label = self.fresh_id();
        let else_label = if else_body.is_some() {
            Some(self.fresh_id())
        } else {
            None
        };
        let merge_label = self.fresh_id();

        let (mut result, cond_id, cond_ty) = self.codegen_expression(condition)?;
        if cond_ty != Type::Scalar(ScalarType::Bool) {
            return Err(CompileError::semantic(
                format!("'if' condition must be boolean, found {}", cond_ty),
                None,
            ));
        }

        result.push(format!("OpSelectionMerge {} None", merge_label));
        match &else_label {
            Some(else_label) => result.push(format!(
                "OpBranchConditional {} {} {}",
                cond_id, then_label, else_label
            )),
            None => result.push(format!(
                "OpBranchConditional {} {} {}",
                cond_id, then_label, merge_label
            )),
        }

        result.push(format!("{} = OpLabel", then_label));
        self.lower_body(&mut result, then_body, false)?;
        if !is_terminated(&result) {
            result.push(format!("OpBranch {}", merge_label));
        }

        if let (Some(else_label), Some(else_body)) = (else_label, else_body) {
            result.push(format!("{} = OpLabel", else_label));
            self.lower_body(&mut result, else_body, false)?;
            if !is_terminated(&result) {
                result.push(format!("OpBranch {}", merge_label));
            }
        }

        result.push(format!("{} = OpLabel", merge_label));
        Ok(result)
    }

    /// `loop` lowers to the structured SPIR-V shape: the header declares
    /// the merge and continue labels with OpLoopMerge and branches to a
    /// trampoline condition block (there is no exit test; only `break`
    /// leaves), the body branches to the continue block, and the continue
    /// block branches back to the condition.
    pub(super) fn codegen_loop(&mut self, body: &[Stmt]) -> Result<Vec<String>, CompileError> {
        let header = self.fresh_id();
        let cond = self.fresh_id();
        let body_label = self.fresh_id();
        let continue_label = self.fresh_id();
        let merge = self.fresh_id();

        self.break_targets.push(merge.clone());

        let mut result = Vec::new();
        result.push(format!("{} = OpLabel", header));
        result.push(format!("OpLoopMerge {} {} None", merge, continue_label));
        result.push(format!("OpBranch {}", cond));

        result.push(format!("{} = OpLabel", cond));
        result.push(format!("OpBranch {}", body_label));

        result.push(format!("{} = OpLabel", body_label));
        let lowered = self.lower_body(&mut result, body, false);
        self.break_targets.pop();
        lowered?;
        if !is_terminated(&result) {
            result.push(format!("OpBranch {}", continue_label));
        }

        result.push(format!("{} = OpLabel", continue_label));
        result.push(format!("OpBranch {}", cond));

        result.push(format!("{} = OpLabel", merge));
        Ok(result)
    }
}
