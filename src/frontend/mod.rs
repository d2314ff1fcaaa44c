//! Front-end compilation adapter.
//!
//! The front end is the only contact point with the downstream compiler.
//! It takes a KIR kernel plus a `DeviceIntrinsics` capability object,
//! checks that the kernel is well formed against that device surface, and
//! produces a block-structured `KernelIr`.

mod build;
pub mod ir;

use thiserror::Error;

use crate::kir::{Fence, IndexQuery, Kernel};
use crate::reduction::ElemType;

pub use ir::{Inst, IrBlock, IrLocation, KernelIr, Label, Operand, Rvalue};

// ─── Device intrinsics ────────────────────────────────────────────

/// The device builtin surface a kernel may use.
///
/// Names are unqualified; the provided `*_path` methods qualify them with
/// the namespace.
pub trait DeviceIntrinsics: Send + Sync {
    /// Namespace holding kernel builtins.
    fn namespace(&self) -> &str;

    /// Namespace holding numeric element types.
    fn numeric_namespace(&self) -> &str;

    fn query(&self, query: IndexQuery) -> &str;

    fn barrier(&self) -> &str;

    fn fence(&self, fence: Fence) -> &str;

    fn local_array(&self) -> &str;

    /// Number of index-space dimensions the device provides.
    fn max_dims(&self) -> u32 {
        3
    }

    fn supports(&self, _ty: ElemType) -> bool {
        true
    }

    fn query_path(&self, query: IndexQuery) -> String {
        format!("{}.{}", self.namespace(), self.query(query))
    }

    fn barrier_path(&self) -> String {
        format!("{}.{}", self.namespace(), self.barrier())
    }

    fn fence_path(&self, fence: Fence) -> String {
        format!("{}.{}", self.namespace(), self.fence(fence))
    }

    fn local_array_path(&self) -> String {
        format!("{}.{}", self.namespace(), self.local_array())
    }

    fn type_path(&self, ty: ElemType) -> String {
        format!("{}.{}", self.numeric_namespace(), ty.name())
    }
}

/// SYCL-style kernel builtins (`dpex.get_global_id`, `dpex.barrier`, ...)
/// with `dpnp` numeric types.
#[derive(Clone, Copy, Debug, Default)]
pub struct DpexIntrinsics;

impl DeviceIntrinsics for DpexIntrinsics {
    fn namespace(&self) -> &str {
        "dpex"
    }

    fn numeric_namespace(&self) -> &str {
        "dpnp"
    }

    fn query(&self, query: IndexQuery) -> &str {
        match query {
            IndexQuery::GlobalId => "get_global_id",
            IndexQuery::LocalId => "get_local_id",
            IndexQuery::LocalSize => "get_local_size",
            IndexQuery::GroupId => "get_group_id",
        }
    }

    fn barrier(&self) -> &str {
        "barrier"
    }

    fn fence(&self, fence: Fence) -> &str {
        match fence {
            Fence::Local => "LOCAL_MEM_FENCE",
            Fence::Global => "GLOBAL_MEM_FENCE",
        }
    }

    fn local_array(&self) -> &str {
        "local.array"
    }
}

/// Intrinsics for a device target name.
pub fn create_intrinsics(target: &str) -> Option<Box<dyn DeviceIntrinsics>> {
    match target {
        "dpex" | "sycl" => Some(Box::new(DpexIntrinsics)),
        _ => None,
    }
}

// ─── Front end ────────────────────────────────────────────────────

/// Reasons the front end rejects a kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrontendError {
    #[error("name '{name}' is not defined")]
    UndefinedName { name: String },

    #[error("duplicate parameter '{name}'")]
    DuplicateParam { name: String },

    #[error("index dimension {dim} exceeds the device limit of {max}")]
    UnsupportedDimension { dim: u32, max: u32 },

    #[error("local array '{name}' has zero length")]
    EmptyLocalArray { name: String },

    #[error("element type {ty} is not supported by the device")]
    UnsupportedType { ty: ElemType },

    #[error("barrier inside divergent control flow")]
    DivergentBarrier,

    #[error("loop over '{var}' has a zero step")]
    ZeroStep { var: String },
}

/// Compiles a KIR kernel into `KernelIr`.
pub trait FrontEnd: Send + Sync {
    fn name(&self) -> &str;

    fn compile(
        &self,
        kernel: &Kernel,
        intrinsics: &dyn DeviceIntrinsics,
    ) -> Result<KernelIr, FrontendError>;
}

/// Validating front end that lowers structured control flow to labelled
/// blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralFrontEnd;

impl StructuralFrontEnd {
    pub fn new() -> Self {
        Self
    }
}

impl FrontEnd for StructuralFrontEnd {
    fn name(&self) -> &str {
        "structural"
    }

    fn compile(
        &self,
        kernel: &Kernel,
        intrinsics: &dyn DeviceIntrinsics,
    ) -> Result<KernelIr, FrontendError> {
        let ir = build::IrBuilder::new(intrinsics).build(kernel)?;
        tracing::debug!(
            kernel = %kernel.name,
            blocks = ir.blocks.len(),
            insts = ir.inst_count(),
            "compiled kernel IR"
        );
        Ok(ir)
    }
}
