//! KernelLowering: renders KIR kernels as kernel source text.
//!
//! Each target implements `KernelLowering` to emit the text a downstream
//! compiler expects. Device builtin names come from the `DeviceIntrinsics`
//! passed in, so one lowering serves every device exposing the same
//! language surface.

mod source;
#[cfg(test)]
mod tests;

use crate::frontend::DeviceIntrinsics;
use crate::kir::Kernel;

pub use source::SourceLowering;

/// Lowers a KIR kernel into kernel source text.
pub trait KernelLowering: Send + Sync {
    /// The target name (e.g. "dpex").
    fn target_name(&self) -> &str;

    /// Render `kernel` as a complete kernel function definition.
    fn lower(&self, kernel: &Kernel, intrinsics: &dyn DeviceIntrinsics) -> String;
}

/// Create a kernel-lowering backend for the given target name.
pub fn create_kernel_lowering(target: &str, indent: usize) -> Option<Box<dyn KernelLowering>> {
    match target {
        "dpex" | "sycl" => Some(Box::new(SourceLowering::new(target, indent))),
        _ => None,
    }
}
