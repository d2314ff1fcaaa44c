//! Block-structured kernel IR produced by the front end.
//!
//! Each block ends in exactly one terminator (`Jump`, `Branch`, `Return`).
//! Block labels equal their index in `KernelIr::blocks`; block 0 is the
//! entry. Temporaries are named `$N`.

use std::fmt;
use std::io::{self, Write};

use crate::kir::{BinOp, Fence, IndexQuery};
use crate::reduction::{ElemType, Literal};

pub type Label = u32;

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Var(String),
    Const(Literal),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Rvalue {
    Use(Operand),
    Binary {
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    Load {
        array: String,
        index: Operand,
    },
    /// Index-space query resolved against the device intrinsics.
    Query {
        callee: String,
        query: IndexQuery,
        dim: u32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inst {
    Assign {
        target: String,
        value: Rvalue,
    },
    Store {
        array: String,
        index: Operand,
        value: Operand,
    },
    AllocLocal {
        target: String,
        len: u32,
        ty: ElemType,
        callee: String,
        dtype: String,
    },
    Barrier {
        callee: String,
        fence: Fence,
        fence_name: String,
    },
    Jump(Label),
    Branch {
        cond: Operand,
        then_label: Label,
        else_label: Label,
    },
    Return,
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Jump(_) | Inst::Branch { .. } | Inst::Return)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IrBlock {
    pub label: Label,
    pub insts: Vec<Inst>,
}

/// Position of one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrLocation {
    pub block: Label,
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelIr {
    pub name: String,
    pub args: Vec<String>,
    pub blocks: Vec<IrBlock>,
    /// Location of the sentinel assignment, if the kernel has one.
    pub sentinel: Option<IrLocation>,
}

impl KernelIr {
    pub fn block(&self, label: Label) -> Option<&IrBlock> {
        self.blocks.get(label as usize)
    }

    pub fn inst(&self, loc: IrLocation) -> Option<&Inst> {
        self.block(loc.block)?.insts.get(loc.index)
    }

    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Write a readable listing of the IR.
    pub fn dump(&self, w: &mut dyn Write) -> io::Result<()> {
        write!(w, "{}", self)?;
        w.flush()
    }
}

// ─── Display ──────────────────────────────────────────────────────

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(name) => f.write_str(name),
            Operand::Const(lit) => write!(f, "{}", lit),
        }
    }
}

impl fmt::Display for Rvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rvalue::Use(op) => write!(f, "{}", op),
            Rvalue::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Rvalue::Load { array, index } => write!(f, "{}[{}]", array, index),
            Rvalue::Query { callee, dim, .. } => write!(f, "{}({})", callee, dim),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Assign { target, value } => write!(f, "{} = {}", target, value),
            Inst::Store {
                array,
                index,
                value,
            } => write!(f, "{}[{}] = {}", array, index, value),
            Inst::AllocLocal {
                target,
                len,
                callee,
                dtype,
                ..
            } => write!(f, "{} = {}({}, {})", target, callee, len, dtype),
            Inst::Barrier {
                callee, fence_name, ..
            } => write!(f, "{}({})", callee, fence_name),
            Inst::Jump(label) => write!(f, "jump {}", label),
            Inst::Branch {
                cond,
                then_label,
                else_label,
            } => write!(f, "branch {}, {}, {}", cond, then_label, else_label),
            Inst::Return => write!(f, "return"),
        }
    }
}

impl fmt::Display for KernelIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kernel {}({}):", self.name, self.args.join(", "))?;
        for block in &self.blocks {
            writeln!(f, "label {}:", block.label)?;
            for inst in &block.insts {
                writeln!(f, "    {}", inst)?;
            }
        }
        Ok(())
    }
}
