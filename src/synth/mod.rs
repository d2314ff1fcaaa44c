//! Reduction kernel synthesizers.
//!
//! Two independent synthesizers share one contract: build a KIR kernel
//! tree, render it to text, compile it with the front end, and keep all
//! three in an immutable `TemplateArtifact`.
//!
//! - `TreeReduceKernel`: per-work-group tree reduction, one partial result
//!   per work-group.
//! - `RemainderReduceKernel`: sequential fold of the partial results plus
//!   the elements past the last full work-group.

mod remainder;
mod tree;

use std::io::{self, Write};

use crate::config::SynthOptions;
use crate::error::{Result, SynthError};
use crate::frontend::{
    create_intrinsics, DeviceIntrinsics, FrontEnd, KernelIr, StructuralFrontEnd,
};
use crate::kir::lower::{create_kernel_lowering, KernelLowering};
use crate::kir::{InsertionPoint, Kernel};
use crate::naming::{is_generated, is_identifier, LegalNames, LOCAL_SUMS_PREFIX};
use crate::reduction::{ElemType, Literal, ReduceOp, ReductionVar};

pub use remainder::{
    build_kernel as build_remainder_kernel, RemainderDesc, RemainderReduceKernel,
};
pub use tree::{build_kernel as build_tree_kernel, TreeReduceDesc, TreeReduceKernel};

/// Index-space dimensions available to the main kernel.
pub const MAX_PARALLEL_DIMS: usize = 3;

// ─── Backend ──────────────────────────────────────────────────────

/// Everything needed to turn a kernel tree into an artifact.
pub struct Backend {
    pub lowering: Box<dyn KernelLowering>,
    pub frontend: Box<dyn FrontEnd>,
    pub intrinsics: Box<dyn DeviceIntrinsics>,
}

impl Backend {
    pub fn new(
        lowering: Box<dyn KernelLowering>,
        frontend: Box<dyn FrontEnd>,
        intrinsics: Box<dyn DeviceIntrinsics>,
    ) -> Self {
        Self {
            lowering,
            frontend,
            intrinsics,
        }
    }

    /// Backend for `options.target` with the structural front end.
    pub fn from_options(options: &SynthOptions) -> Result<Self> {
        let unknown = || SynthError::UnknownTarget(options.target.clone());
        let lowering =
            create_kernel_lowering(&options.target, options.indent).ok_or_else(unknown)?;
        let intrinsics = create_intrinsics(&options.target).ok_or_else(unknown)?;
        Ok(Self::new(lowering, Box::new(StructuralFrontEnd::new()), intrinsics))
    }
}

// ─── Artifact ─────────────────────────────────────────────────────

/// Kernel tree, kernel text and compiled IR, built once.
#[derive(Clone, Debug)]
pub struct TemplateArtifact {
    kernel: Kernel,
    text: String,
    ir: KernelIr,
}

impl TemplateArtifact {
    /// Render and compile `kernel`. A front-end failure keeps the text.
    pub fn compile(kernel: Kernel, backend: &Backend) -> Result<Self> {
        let intrinsics = backend.intrinsics.as_ref();
        let text = backend.lowering.lower(&kernel, intrinsics);
        let ir = match backend.frontend.compile(&kernel, intrinsics) {
            Ok(ir) => ir,
            Err(source) => {
                tracing::debug!(
                    kernel = %kernel.name,
                    error = %source,
                    "front end rejected kernel"
                );
                return Err(SynthError::Frontend { source, text });
            }
        };
        Ok(Self { kernel, text, ir })
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ir(&self) -> &KernelIr {
        &self.ir
    }

    /// BLAKE3 hash of the kernel text, hex encoded.
    pub fn fingerprint(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }
}

/// Read-only view shared by both synthesizers.
pub trait ReductionTemplate {
    fn artifact(&self) -> &TemplateArtifact;

    fn kernel(&self) -> &Kernel {
        self.artifact().kernel()
    }

    fn kernel_string(&self) -> &str {
        self.artifact().text()
    }

    fn kernel_ir(&self) -> &KernelIr {
        self.artifact().ir()
    }

    /// Where user update logic is spliced into the kernel tree.
    fn insertion_point(&self) -> Option<&InsertionPoint> {
        self.kernel().insertion_point()
    }

    fn fingerprint(&self) -> String {
        self.artifact().fingerprint()
    }

    fn dump_kernel_string(&self, w: &mut dyn Write) -> io::Result<()> {
        w.write_all(self.kernel_string().as_bytes())?;
        w.flush()
    }

    fn dump_kernel_ir(&self, w: &mut dyn Write) -> io::Result<()> {
        self.kernel_ir().dump(w)
    }
}

/// Kernels synthesized from one description file.
#[derive(Debug)]
pub struct KernelSet {
    pub main: Option<TreeReduceKernel>,
    pub remainder: Option<RemainderReduceKernel>,
}

impl KernelSet {
    pub fn templates(&self) -> Vec<&dyn ReductionTemplate> {
        let mut out: Vec<&dyn ReductionTemplate> = Vec::new();
        if let Some(main) = &self.main {
            out.push(main);
        }
        if let Some(rem) = &self.remainder {
            out.push(rem);
        }
        out
    }
}

// ─── Shared helpers ───────────────────────────────────────────────

/// A reduction variable with its operator resolved and its name legalized.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedVar {
    pub raw: String,
    pub legal: String,
    pub op: ReduceOp,
    pub init: Literal,
    pub ty: ElemType,
}

impl ResolvedVar {
    /// Name of the variable's work-group local buffer.
    pub fn local_sums(&self) -> String {
        format!("{}{}", LOCAL_SUMS_PREFIX, self.legal)
    }
}

/// Resolve operators and legal names. Fails on the first unsupported
/// operator, before any statement exists.
pub(crate) fn resolve_vars(vars: &[ReductionVar], sentinel: &str) -> Result<Vec<ResolvedVar>> {
    if vars.is_empty() {
        return Err(SynthError::invalid("no reduction variables"));
    }
    let names = LegalNames::new(vars.iter().map(|v| v.name.as_str()), sentinel);
    if names.len() != vars.len() {
        return Err(SynthError::invalid("duplicate reduction variable name"));
    }

    vars.iter()
        .map(|v| {
            let op = ReduceOp::resolve(&v.name, &v.op)?;
            let init = v.init.unwrap_or_else(|| op.identity(v.ty)).coerce(v.ty);
            let legal = names
                .get(&v.name)
                .map(str::to_string)
                .ok_or_else(|| SynthError::invalid(format!("no legal name for '{}'", v.name)))?;
            Ok(ResolvedVar {
                raw: v.name.clone(),
                legal,
                op,
                init,
                ty: v.ty,
            })
        })
        .collect()
}

pub(crate) fn check_identifier(name: &str, role: &'static str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(SynthError::InvalidIdentifier {
            name: name.to_string(),
            role,
        })
    }
}

pub(crate) fn check_identifiers(names: &[String], role: &'static str) -> Result<()> {
    names.iter().try_for_each(|n| check_identifier(n, role))
}

/// Reject caller-supplied names the kernel body assigns itself.
pub(crate) fn check_not_generated<S: AsRef<str>>(names: &[S], role: &'static str) -> Result<()> {
    match names.iter().map(|n| n.as_ref()).find(|n| is_generated(n)) {
        Some(name) => Err(SynthError::ReservedName {
            name: name.to_string(),
            role,
        }),
        None => Ok(()),
    }
}

/// Reject reduction variables whose legal name equals a kernel, parameter
/// or index name. The kernel would assign over it.
pub(crate) fn check_var_clashes(
    vars: &[ResolvedVar],
    kernel_name: &str,
    groups: &[(&str, &[String])],
) -> Result<()> {
    for v in vars {
        let clash = if v.legal == kernel_name {
            Some("the kernel name")
        } else {
            groups
                .iter()
                .find(|(_, names)| names.contains(&v.legal))
                .map(|(role, _)| *role)
        };
        if let Some(role) = clash {
            return Err(SynthError::invalid(format!(
                "reduction variable '{}' is emitted as '{}', which clashes with {}",
                v.raw, v.legal, role
            )));
        }
    }
    Ok(())
}
