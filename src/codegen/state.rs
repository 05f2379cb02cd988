//! Code generator state and identifier allocation.

use crate::ast::{ScalarType, Type};
use std::collections::HashMap;

/// SPIR-V storage classes this back end emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Globally visible buffers; every kernel parameter lives here.
    CrossWorkgroup,
    /// Per-invocation locals.
    Function,
}

impl StorageClass {
    pub fn name(&self) -> &'static str {
        match self {
            StorageClass::CrossWorkgroup => "CrossWorkgroup",
            StorageClass::Function => "Function",
        }
    }
}

/// Key into the module type table. `int` and `uint` are one key, so the
/// module declares `OpTypeInt` exactly once and a pointer type per
/// (storage class, base) pair exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Scalar(ScalarType),
    Pointer(StorageClass, ScalarType),
}

/// Key into the module constant table: base type plus bit pattern, so
/// `1` and `1.0` are distinct while `2.5` written two ways is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstKey {
    UInt(u32),
    Float(u32),
}

/// A user `const`. The id stays unresolved until the initializer has been
/// lowered; literal initializers resolve before any kernel body is emitted.
#[derive(Debug, Clone)]
pub struct NamedConst {
    pub id: Option<String>,
    pub ty: ScalarType,
}

/// All state for one compilation. Created fresh per run, threaded through
/// every lowering function, and discarded with the finished module text.
pub struct CodeGen {
    next_id: u32,

    // Module-scoped tables; these persist for the whole compilation.
    pub(super) type_ids: HashMap<TypeKey, String>,
    pub(super) type_decls: Vec<String>,
    pub(super) entry_points: Vec<String>,
    pub(super) func_type_decls: Vec<String>,
    pub(super) func_type_cache: HashMap<Vec<TypeKey>, String>,
    pub(super) func_type_ids: HashMap<String, String>,
    pub(super) kernel_func_ids: HashMap<String, String>,
    pub(super) constant_ids: HashMap<ConstKey, String>,
    pub(super) constant_decls: Vec<String>,
    pub(super) named_consts: HashMap<String, NamedConst>,

    // Per-kernel symbol tables, cleared at the start of each kernel.
    pub(super) var_ids: HashMap<String, (String, Type)>,
    pub(super) param_ids: HashMap<String, (String, Type)>,

    /// Merge labels of enclosing loops; `break` branches to the innermost.
    pub(super) break_targets: Vec<String>,
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            next_id: 1,
            type_ids: HashMap::new(),
            type_decls: Vec::new(),
            entry_points: Vec::new(),
            func_type_decls: Vec::new(),
            func_type_cache: HashMap::new(),
            func_type_ids: HashMap::new(),
            kernel_func_ids: HashMap::new(),
            constant_ids: HashMap::new(),
            constant_decls: Vec::new(),
            named_consts: HashMap::new(),
            var_ids: HashMap::new(),
            param_ids: HashMap::new(),
            break_targets: Vec::new(),
        }
    }

    /// Hand out the next `%N` result id. Ids are never reused.
    pub(super) fn fresh_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("%{}", id)
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}
