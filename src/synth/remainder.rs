//! Remainder kernel: folds the per-work-group partials into the final
//! result, then handles the `n mod w` elements the main kernel never saw.
//!
//! The kernel runs sequentially. Loop counts come from the first
//! variable's size parameters since all variables of one reduction share
//! the iteration space.

use serde::{Deserialize, Serialize};

use crate::config::SynthOptions;
use crate::error::{Result, SynthError};
use crate::kir::{BinOp, Expr, Kernel, Place, Stmt};
use crate::reduction::ReductionVar;

use super::{
    check_identifier, check_identifiers, check_not_generated, check_var_clashes, resolve_vars,
    Backend, ReductionTemplate, ResolvedVar, TemplateArtifact,
};

/// Input of the remainder synthesizer. The five name lists carry one entry
/// per reduction variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemainderDesc {
    #[serde(rename = "name")]
    pub kernel_name: String,
    pub params: Vec<String>,
    pub index_vars: Vec<String>,
    #[serde(default)]
    pub reductions: Vec<ReductionVar>,
    /// Offset of the first leftover element.
    pub global_size: Vec<String>,
    /// Number of leftover elements.
    pub global_size_mod: Vec<String>,
    /// Number of per-work-group partials.
    pub partial_sum_size: Vec<String>,
    pub partial_sum: Vec<String>,
    pub final_sum: Vec<String>,
}

/// Per-variable names, zipped from the description lists.
struct VarSlots<'a> {
    var: &'a ResolvedVar,
    partial_sum: &'a str,
    final_sum: &'a str,
}

/// The synthesized remainder kernel.
#[derive(Clone, Debug)]
pub struct RemainderReduceKernel {
    artifact: TemplateArtifact,
}

impl RemainderReduceKernel {
    pub fn new(desc: &RemainderDesc, options: &SynthOptions) -> Result<Self> {
        let backend = Backend::from_options(options)?;
        Self::with_backend(desc, options, &backend)
    }

    pub fn with_backend(
        desc: &RemainderDesc,
        options: &SynthOptions,
        backend: &Backend,
    ) -> Result<Self> {
        let kernel = build_kernel(desc, &options.sentinel)?;
        let artifact = TemplateArtifact::compile(kernel, backend)?;
        Ok(Self { artifact })
    }
}

impl ReductionTemplate for RemainderReduceKernel {
    fn artifact(&self) -> &TemplateArtifact {
        &self.artifact
    }
}

fn validate(desc: &RemainderDesc, sentinel: &str, nvars: usize) -> Result<()> {
    check_identifier(&desc.kernel_name, "kernel")?;
    check_identifier(sentinel, "sentinel")?;
    check_identifiers(&desc.params, "parameter")?;
    check_identifiers(&desc.index_vars, "index variable")?;
    check_not_generated(&[sentinel], "sentinel")?;
    check_not_generated(&desc.params, "parameter")?;
    check_not_generated(&desc.index_vars, "index variable")?;
    if desc.index_vars.is_empty() {
        return Err(SynthError::invalid("remainder kernel needs an index variable"));
    }

    let lists: [(&str, &[String]); 5] = [
        ("global_size", desc.global_size.as_slice()),
        ("global_size_mod", desc.global_size_mod.as_slice()),
        ("partial_sum_size", desc.partial_sum_size.as_slice()),
        ("partial_sum", desc.partial_sum.as_slice()),
        ("final_sum", desc.final_sum.as_slice()),
    ];
    for (field, names) in lists {
        if names.len() != nvars {
            return Err(SynthError::invalid(format!(
                "{} has {} entries for {} reduction variables",
                field,
                names.len(),
                nvars
            )));
        }
        check_identifiers(names, "size or buffer parameter")?;
        check_not_generated(names, "size or buffer parameter")?;
    }
    Ok(())
}

/// Build the remainder kernel tree without compiling it.
pub fn build_kernel(desc: &RemainderDesc, sentinel: &str) -> Result<Kernel> {
    let vars = resolve_vars(&desc.reductions, sentinel)?;
    validate(desc, sentinel, vars.len())?;
    check_var_clashes(
        &vars,
        &desc.kernel_name,
        &[
            ("a parameter", desc.params.as_slice()),
            ("an index variable", desc.index_vars.as_slice()),
            ("a global_size entry", desc.global_size.as_slice()),
            ("a global_size_mod entry", desc.global_size_mod.as_slice()),
            ("a partial_sum_size entry", desc.partial_sum_size.as_slice()),
            ("a partial_sum entry", desc.partial_sum.as_slice()),
            ("a final_sum entry", desc.final_sum.as_slice()),
        ],
    )?;

    let mut params = desc.params.clone();
    for i in 0..vars.len() {
        params.push(desc.global_size[i].clone());
        params.push(desc.global_size_mod[i].clone());
        params.push(desc.partial_sum_size[i].clone());
        params.push(desc.final_sum[i].clone());
    }

    let slots: Vec<VarSlots<'_>> = vars
        .iter()
        .enumerate()
        .map(|(i, var)| VarSlots {
            var,
            partial_sum: &desc.partial_sum[i],
            final_sum: &desc.final_sum[i],
        })
        .collect();

    let fold_partials = slots
        .iter()
        .map(|s| {
            Stmt::update(
                Place::index(s.final_sum, Expr::int(0)),
                s.var.op.binop(),
                Expr::index(s.partial_sum, Expr::var("j")),
            )
        })
        .collect();

    let mut leftover = Vec::new();
    for v in &vars {
        leftover.push(Stmt::assign(v.legal.clone(), Expr::Lit(v.init)));
    }
    leftover.push(Stmt::assign(
        desc.index_vars[0].clone(),
        Expr::binary(BinOp::Add, Expr::var(desc.global_size[0].clone()), Expr::var("j")),
    ));
    for v in &vars {
        leftover.push(Stmt::LocalArray {
            name: v.local_sums(),
            len: 1,
            ty: v.ty,
        });
    }
    leftover.push(Stmt::Sentinel(sentinel.to_string()));
    for v in &vars {
        leftover.push(Stmt::store(
            v.local_sums(),
            Expr::int(0),
            Expr::var(v.legal.clone()),
        ));
    }
    for s in &slots {
        leftover.push(Stmt::update(
            Place::index(s.final_sum, Expr::int(0)),
            s.var.op.binop(),
            Expr::index(s.var.local_sums(), Expr::int(0)),
        ));
    }

    let body = vec![
        Stmt::range("j", Expr::var(desc.partial_sum_size[0].clone()), fold_partials),
        Stmt::range("j", Expr::var(desc.global_size_mod[0].clone()), leftover),
    ];

    let kernel = Kernel::new(desc.kernel_name.clone(), params, body);
    tracing::debug!(
        kernel = %kernel.name,
        vars = vars.len(),
        stmts = kernel.stmt_count(),
        "built remainder kernel"
    );
    Ok(kernel)
}
