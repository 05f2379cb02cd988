//! Built-in type declarations and constant interning.

use super::CodeGen;
use super::state::{ConstKey, StorageClass, TypeKey};
use crate::ast::{Literal, ScalarType, Type};
use crate::error::CompileError;

/// Bases that get pointer types. `int` is already folded into `uint`;
/// `void` has no pointer form.
const POINTER_BASES: [ScalarType; 3] = [ScalarType::UInt, ScalarType::Float, ScalarType::Bool];

impl CodeGen {
    /// Emit the scalar and pointer types every module starts with, in a
    /// fixed order: void, bool, uint, float, then CrossWorkgroup pointers,
    /// then Function pointers.
    pub(super) fn declare_builtin_types(&mut self) {
        let scalars = [
            (ScalarType::Void, "OpTypeVoid"),
            (ScalarType::Bool, "OpTypeBool"),
            (ScalarType::UInt, "OpTypeInt 32 0"),
            (ScalarType::Float, "OpTypeFloat 32"),
        ];
        for (scalar, decl) in scalars {
            let id = self.fresh_id();
            self.type_decls.push(format!("{} = {}", id, decl));
            self.type_ids.insert(TypeKey::Scalar(scalar), id);
        }
        for storage in [StorageClass::CrossWorkgroup, StorageClass::Function] {
            for base in POINTER_BASES {
                let base_id = self.type_ids[&TypeKey::Scalar(base)].clone();
                let id = self.fresh_id();
                self.type_decls.push(format!(
                    "{} = OpTypePointer {} {}",
                    id,
                    storage.name(),
                    base_id
                ));
                self.type_ids.insert(TypeKey::Pointer(storage, base), id);
            }
        }
    }

    pub(super) fn type_id(&self, key: TypeKey) -> Result<String, CompileError> {
        self.type_ids
            .get(&key)
            .cloned()
            .ok_or_else(|| CompileError::internal(format!("no declared type for {:?}", key)))
    }

    pub(super) fn scalar_type_id(&self, scalar: ScalarType) -> Result<String, CompileError> {
        self.type_id(TypeKey::Scalar(scalar))
    }

    pub(super) fn pointer_type_id(
        &self,
        storage: StorageClass,
        base: ScalarType,
    ) -> Result<String, CompileError> {
        self.type_id(TypeKey::Pointer(storage, base))
    }

    /// The pointer type a kernel parameter arrives as. Scalar-typed
    /// parameters are CrossWorkgroup pointers to that scalar; `ptr_<base>`
    /// parameters are the same CrossWorkgroup pointer.
    pub(super) fn param_pointer_id(&self, ty: &Type) -> Result<String, CompileError> {
        let base = match ty {
            Type::Scalar(s) => *s,
            Type::Pointer(b) => *b,
        };
        self.pointer_type_id(StorageClass::CrossWorkgroup, base)
    }

    /// Function types are deduplicated by parameter signature; kernels with
    /// the same signature share one `OpTypeFunction`.
    pub(super) fn function_type_id(
        &mut self,
        signature: &[TypeKey],
    ) -> Result<String, CompileError> {
        if let Some(id) = self.func_type_cache.get(signature) {
            return Ok(id.clone());
        }
        let void_id = self.scalar_type_id(ScalarType::Void)?;
        let mut params = String::new();
        for key in signature {
            params.push(' ');
            params.push_str(&self.type_id(*key)?);
        }
        let id = self.fresh_id();
        self.func_type_decls
            .push(format!("{} = OpTypeFunction {}{}", id, void_id, params));
        self.func_type_cache.insert(signature.to_vec(), id.clone());
        Ok(id)
    }

    /// Intern a literal constant, returning its id.
    pub(super) fn constant(&mut self, lit: &Literal) -> Result<String, CompileError> {
        let (key, scalar, text) = match *lit {
            Literal::Int(v) => (ConstKey::UInt(v), ScalarType::UInt, v.to_string()),
            Literal::Float(v) => (ConstKey::Float(v.to_bits()), ScalarType::Float, format_float(v)),
        };
        if let Some(id) = self.constant_ids.get(&key) {
            return Ok(id.clone());
        }
        let type_id = self.scalar_type_id(scalar)?;
        let id = self.fresh_id();
        self.constant_decls
            .push(format!("{} = OpConstant {} {}", id, type_id, text));
        self.constant_ids.insert(key, id.clone());
        Ok(id)
    }

    pub(super) fn constant_uint(&mut self, value: u32) -> Result<String, CompileError> {
        self.constant(&Literal::Int(value))
    }
}

/// Float constants always carry a decimal point so the assembler reads
/// them as floats.
fn format_float(value: f32) -> String {
    if value.is_finite() && value == value.trunc() {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
