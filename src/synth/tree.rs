//! Main tree-reduction kernel.
//!
//! Each work-item folds its contribution into the reduction variables,
//! copies them to work-group local buffers, and the work-group halves the
//! number of active contributors each round until slot 0 holds the group's
//! partial result:
//!
//! ```text
//! stride0 = local_size0 // 2
//! while stride0 > 0:
//!     barrier(local)
//!     if local_id0 < stride0:
//!         buf[local_id0] op= buf[local_id0 + stride0]
//!     stride0 >>= 1
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::SynthOptions;
use crate::error::{Result, SynthError};
use crate::kir::{BinOp, Expr, Fence, IndexQuery, Kernel, Place, Stmt};
use crate::naming::resolve_bound;
use crate::reduction::{Bound, LoopRange, ReductionVar};

use super::{
    check_identifier, check_identifiers, check_not_generated, check_var_clashes, resolve_vars,
    Backend, ReductionTemplate, ResolvedVar, TemplateArtifact, MAX_PARALLEL_DIMS,
};

/// Input of the main tree-reduction synthesizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeReduceDesc {
    #[serde(rename = "name")]
    pub kernel_name: String,
    /// Kernel parameters, in launcher binding order.
    pub params: Vec<String>,
    /// Raw argument names, correlated by position with `params`. The
    /// parameter whose argument names a reduction variable receives that
    /// variable's partial results.
    pub args: Vec<String>,
    /// One index variable per loop dimension.
    pub index_vars: Vec<String>,
    pub loop_ranges: Vec<LoopRange>,
    /// Loop-bound symbol → kernel parameter name.
    #[serde(default)]
    pub param_subst: BTreeMap<String, String>,
    /// Leading loop dimensions mapped onto the device index space.
    pub parallel_dims: usize,
    #[serde(default)]
    pub reductions: Vec<ReductionVar>,
    pub work_group_size: u32,
}

/// The synthesized main kernel.
#[derive(Clone, Debug)]
pub struct TreeReduceKernel {
    artifact: TemplateArtifact,
    /// Raw reduction variable name → parameter receiving its partials.
    outputs: Vec<(String, String)>,
    work_group_size: u32,
}

impl TreeReduceKernel {
    pub fn new(desc: &TreeReduceDesc, options: &SynthOptions) -> Result<Self> {
        let backend = Backend::from_options(options)?;
        Self::with_backend(desc, options, &backend)
    }

    pub fn with_backend(
        desc: &TreeReduceDesc,
        options: &SynthOptions,
        backend: &Backend,
    ) -> Result<Self> {
        let (kernel, outputs) = build(desc, &options.sentinel)?;
        let artifact = TemplateArtifact::compile(kernel, backend)?;
        Ok(Self {
            artifact,
            outputs,
            work_group_size: desc.work_group_size,
        })
    }

    /// Parameter receiving the per-work-group partials of `var`.
    pub fn output_for(&self, var: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(raw, _)| raw == var)
            .map(|(_, param)| param.as_str())
    }

    pub fn work_group_size(&self) -> u32 {
        self.work_group_size
    }
}

impl ReductionTemplate for TreeReduceKernel {
    fn artifact(&self) -> &TemplateArtifact {
        &self.artifact
    }
}

/// Build the main kernel tree without compiling it.
pub fn build_kernel(desc: &TreeReduceDesc, sentinel: &str) -> Result<Kernel> {
    build(desc, sentinel).map(|(kernel, _)| kernel)
}

fn validate(desc: &TreeReduceDesc, sentinel: &str) -> Result<()> {
    if desc.parallel_dims > MAX_PARALLEL_DIMS {
        return Err(SynthError::UnsupportedDimensions {
            requested: desc.parallel_dims,
            max: MAX_PARALLEL_DIMS,
        });
    }
    if desc.parallel_dims == 0 {
        return Err(SynthError::invalid("at least one parallel dimension is required"));
    }
    let size = desc.work_group_size;
    if !size.is_power_of_two() {
        return Err(SynthError::InvalidWorkGroupSize { size });
    }

    check_identifier(&desc.kernel_name, "kernel")?;
    check_identifier(sentinel, "sentinel")?;
    check_identifiers(&desc.params, "parameter")?;
    check_identifiers(&desc.index_vars, "index variable")?;
    check_not_generated(&[sentinel], "sentinel")?;
    check_not_generated(&desc.params, "parameter")?;
    check_not_generated(&desc.index_vars, "index variable")?;

    if desc.index_vars.len() != desc.loop_ranges.len() {
        return Err(SynthError::invalid(format!(
            "{} index variables for {} loop ranges",
            desc.index_vars.len(),
            desc.loop_ranges.len()
        )));
    }
    if let Some(var) = desc
        .index_vars
        .iter()
        .zip(&desc.loop_ranges)
        .find(|(_, range)| range.step == Bound::Literal(0))
        .map(|(var, _)| var)
    {
        return Err(SynthError::invalid(format!("loop over '{}' has a zero step", var)));
    }
    if desc.loop_ranges.len() < desc.parallel_dims {
        return Err(SynthError::invalid(format!(
            "{} parallel dimensions but only {} loop ranges",
            desc.parallel_dims,
            desc.loop_ranges.len()
        )));
    }
    if desc.params.len() != desc.args.len() {
        return Err(SynthError::invalid(format!(
            "{} parameters but {} arguments",
            desc.params.len(),
            desc.args.len()
        )));
    }
    Ok(())
}

fn build(desc: &TreeReduceDesc, sentinel: &str) -> Result<(Kernel, Vec<(String, String)>)> {
    validate(desc, sentinel)?;
    let vars = resolve_vars(&desc.reductions, sentinel)?;
    check_var_clashes(
        &vars,
        &desc.kernel_name,
        &[
            ("a parameter", desc.params.as_slice()),
            ("an index variable", desc.index_vars.as_slice()),
        ],
    )?;

    let outputs = vars
        .iter()
        .map(|v| {
            desc.args
                .iter()
                .position(|arg| *arg == v.raw)
                .map(|i| (v.raw.clone(), desc.params[i].clone()))
                .ok_or_else(|| SynthError::MissingOutput { var: v.raw.clone() })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut body = Vec::new();
    emit_index_queries(desc, &mut body);

    for v in &vars {
        body.push(Stmt::LocalArray {
            name: v.local_sums(),
            len: desc.work_group_size,
            ty: v.ty,
        });
    }
    for v in &vars {
        body.push(Stmt::assign(v.legal.clone(), Expr::Lit(v.init)));
    }

    body.extend(sequential_nest(desc, sentinel));

    for v in &vars {
        body.push(Stmt::store(
            v.local_sums(),
            Expr::var("local_id0"),
            Expr::var(v.legal.clone()),
        ));
    }

    emit_tree_rounds(&vars, &mut body);

    let writes = vars
        .iter()
        .zip(&outputs)
        .map(|(v, (_, param))| {
            Stmt::store(
                param.clone(),
                Expr::var("group_id0"),
                Expr::index(v.local_sums(), Expr::int(0)),
            )
        })
        .collect();
    body.push(Stmt::If {
        cond: Expr::binary(BinOp::Eq, Expr::var("local_id0"), Expr::int(0)),
        then_body: writes,
    });
    body.push(Stmt::Return);

    let kernel = Kernel::new(desc.kernel_name.clone(), desc.params.clone(), body);
    tracing::debug!(
        kernel = %kernel.name,
        vars = vars.len(),
        stmts = kernel.stmt_count(),
        "built tree-reduction kernel"
    );
    Ok((kernel, outputs))
}

/// Global id, local id, local size and group id for each parallel dimension.
fn emit_index_queries(desc: &TreeReduceDesc, body: &mut Vec<Stmt>) {
    for dim in 0..desc.parallel_dims {
        let d = dim as u32;
        body.push(Stmt::assign(
            desc.index_vars[dim].clone(),
            Expr::query(IndexQuery::GlobalId, d),
        ));
        body.push(Stmt::assign(
            format!("local_id{}", dim),
            Expr::query(IndexQuery::LocalId, d),
        ));
        body.push(Stmt::assign(
            format!("local_size{}", dim),
            Expr::query(IndexQuery::LocalSize, d),
        ));
        body.push(Stmt::assign(
            format!("group_id{}", dim),
            Expr::query(IndexQuery::GroupId, d),
        ));
    }
}

/// Sequential loops over the non-parallel dimensions, with the sentinel in
/// the innermost body.
fn sequential_nest(desc: &TreeReduceDesc, sentinel: &str) -> Vec<Stmt> {
    let mut inner = vec![Stmt::Sentinel(sentinel.to_string())];
    for dim in (desc.parallel_dims..desc.loop_ranges.len()).rev() {
        let range = &desc.loop_ranges[dim];
        let stop = resolve_bound(&range.stop, &desc.param_subst);
        inner = vec![Stmt::For {
            var: desc.index_vars[dim].clone(),
            start: resolve_bound(&range.start, &desc.param_subst),
            stop: Expr::binary(BinOp::Add, stop, Expr::int(1)),
            step: resolve_bound(&range.step, &desc.param_subst),
            body: inner,
        }];
    }
    inner
}

fn emit_tree_rounds(vars: &[ResolvedVar], body: &mut Vec<Stmt>) {
    body.push(Stmt::assign(
        "stride0",
        Expr::binary(BinOp::FloorDiv, Expr::var("local_size0"), Expr::int(2)),
    ));

    let combines = vars
        .iter()
        .map(|v| {
            let buf = v.local_sums();
            Stmt::update(
                Place::index(buf.clone(), Expr::var("local_id0")),
                v.op.binop(),
                Expr::index(
                    buf,
                    Expr::binary(BinOp::Add, Expr::var("local_id0"), Expr::var("stride0")),
                ),
            )
        })
        .collect();

    body.push(Stmt::While {
        cond: Expr::binary(BinOp::Gt, Expr::var("stride0"), Expr::int(0)),
        body: vec![
            Stmt::Barrier(Fence::Local),
            Stmt::If {
                cond: Expr::binary(BinOp::Lt, Expr::var("local_id0"), Expr::var("stride0")),
                then_body: combines,
            },
            Stmt::update(Place::var("stride0"), BinOp::Shr, Expr::int(1)),
        ],
    });
}
