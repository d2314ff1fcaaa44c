//! Synthesis options and reduction-description files.
//!
//! A description file is YAML:
//!
//! ```yaml
//! options:
//!   target: dpex
//! reductions:
//!   - { name: sum, op: "+", ty: float64 }
//! main:
//!   name: main_kernel
//!   params: [a, n, partials]
//!   args: [a, n, sum]
//!   index_vars: [i]
//!   loop_ranges: [{ start: 0, stop: n }]
//!   param_subst: { n: n }
//!   parallel_dims: 1
//!   work_group_size: 64
//! remainder:
//!   name: remainder_kernel
//!   ...
//! ```
//!
//! Top-level `reductions` are shared by both kernels; a section may list
//! its own instead.

#[cfg(test)]
mod tests;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reduction::ReductionVar;
use crate::synth::{
    Backend, KernelSet, RemainderDesc, RemainderReduceKernel, TreeReduceDesc, TreeReduceKernel,
};

pub const DEFAULT_SENTINEL: &str = "__sentinel__";
pub const DEFAULT_INDENT: usize = 4;
pub const DEFAULT_TARGET: &str = "dpex";

/// Options shared by both synthesizers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthOptions {
    /// Name assigned by the sentinel statement.
    pub sentinel: String,
    /// Spaces per indentation level in kernel text.
    pub indent: usize,
    /// Kernel dialect and device intrinsics.
    pub target: String,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            indent: DEFAULT_INDENT,
            target: DEFAULT_TARGET.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptionFile {
    #[serde(default)]
    pub options: SynthOptions,
    #[serde(default)]
    pub reductions: Vec<ReductionVar>,
    #[serde(default)]
    pub main: Option<TreeReduceDesc>,
    #[serde(default)]
    pub remainder: Option<RemainderDesc>,
}

impl DescriptionFile {
    pub fn parse(src: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)?;
        Self::parse(&src)
    }

    /// The main description with the shared reductions filled in.
    pub fn tree_desc(&self) -> Option<TreeReduceDesc> {
        self.main.as_ref().map(|m| {
            let mut desc = m.clone();
            if desc.reductions.is_empty() {
                desc.reductions = self.reductions.clone();
            }
            desc
        })
    }

    pub fn remainder_desc(&self) -> Option<RemainderDesc> {
        self.remainder.as_ref().map(|r| {
            let mut desc = r.clone();
            if desc.reductions.is_empty() {
                desc.reductions = self.reductions.clone();
            }
            desc
        })
    }

    /// Synthesize every kernel the file describes.
    pub fn synthesize(&self) -> Result<KernelSet> {
        let backend = Backend::from_options(&self.options)?;
        let main = self
            .tree_desc()
            .map(|d| TreeReduceKernel::with_backend(&d, &self.options, &backend))
            .transpose()?;
        let remainder = self
            .remainder_desc()
            .map(|d| RemainderReduceKernel::with_backend(&d, &self.options, &backend))
            .transpose()?;
        Ok(KernelSet { main, remainder })
    }
}
