//! Tree-reduction kernel synthesis.
//!
//! Given a description of a parallel loop with reduction variables, this
//! crate builds two kernels: a main kernel doing a log-depth reduction
//! inside each work-group, and a remainder kernel that folds the
//! per-work-group partials plus the elements past the last full
//! work-group. Each kernel is produced as a statement tree (`kir`), as
//! rendered kernel text, and as front-end IR.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod frontend;
pub mod kir;
pub mod naming;
pub mod reduction;
pub mod span;
pub mod synth;

use std::path::Path;

pub use config::{DescriptionFile, SynthOptions};
pub use diagnostic::{render_diagnostics, Diagnostic};
pub use error::{Result, SynthError};
pub use frontend::{DeviceIntrinsics, DpexIntrinsics, FrontEnd, KernelIr, StructuralFrontEnd};
pub use kir::{InsertionPoint, Kernel};
pub use reduction::{ElemType, LoopRange, ReduceOp, ReductionVar};
pub use synth::{
    Backend, KernelSet, ReductionTemplate, RemainderDesc, RemainderReduceKernel,
    TemplateArtifact, TreeReduceDesc, TreeReduceKernel,
};

/// Load a description file and synthesize every kernel it describes.
pub fn synthesize_file(path: &Path) -> Result<KernelSet> {
    let file = DescriptionFile::load(path)?;
    tracing::debug!(path = %path.display(), "loaded description");
    file.synthesize()
}

/// Like `synthesize_file`, but rendering diagnostics against the file on
/// failure. Returns `None` after reporting.
pub fn synthesize_file_reporting(path: &Path) -> Option<KernelSet> {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path.display(), e);
            return None;
        }
    };
    let filename = path.to_string_lossy().to_string();
    match DescriptionFile::parse(&source).and_then(|f| f.synthesize()) {
        Ok(set) => Some(set),
        Err(err) => {
            render_diagnostics(&[Diagnostic::from_error(&err)], &filename, &source);
            None
        }
    }
}
