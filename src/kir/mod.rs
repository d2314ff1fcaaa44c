//! KIR: kernel IR for data-parallel reduction kernels.
//!
//! A kernel is a statement tree with explicit node kinds. Synthesizers build
//! the tree directly; there is no textual intermediate step. Text is one
//! possible output (see `lower`), the front end consumes the tree itself.
//!
//! Pipeline:
//! ```text
//! description → synth → Kernel (KIR) ─→ KernelLowering → String     (kernel text)
//!                                     └→ FrontEnd      → KernelIr   (block IR)
//! ```
//!
//! Every kernel built by a synthesizer contains exactly one
//! `Stmt::Sentinel`. Its position is exposed as an `InsertionPoint` so user
//! update logic can be spliced in without searching the text.

pub mod lower;

use std::fmt;

use crate::reduction::{ElemType, Literal};

// ─── Operators and device queries ─────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Shr,
    Lt,
    Gt,
    Eq,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::FloorDiv => "//",
            BinOp::Shr => ">>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Eq => "==",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Lt | BinOp::Gt | BinOp::Eq => 1,
            BinOp::Shr => 2,
            BinOp::Add | BinOp::Sub => 3,
            BinOp::Mul | BinOp::FloorDiv => 4,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 1
    }
}

/// Work-item index-space queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexQuery {
    GlobalId,
    LocalId,
    LocalSize,
    GroupId,
}

impl IndexQuery {
    pub fn name(self) -> &'static str {
        match self {
            IndexQuery::GlobalId => "global_id",
            IndexQuery::LocalId => "local_id",
            IndexQuery::LocalSize => "local_size",
            IndexQuery::GroupId => "group_id",
        }
    }
}

/// Memory fence applied by a barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fence {
    Local,
    Global,
}

// ─── Expressions ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lit(Literal),
    Var(String),
    Index { array: String, index: Box<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Query { query: IndexQuery, dim: u32 },
}

impl Expr {
    pub fn int(v: i64) -> Expr {
        Expr::Lit(Literal::Int(v))
    }

    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn index(array: impl Into<String>, index: Expr) -> Expr {
        Expr::Index {
            array: array.into(),
            index: Box::new(index),
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn query(query: IndexQuery, dim: u32) -> Expr {
        Expr::Query { query, dim }
    }
}

/// Assignment target.
#[derive(Clone, Debug, PartialEq)]
pub enum Place {
    Var(String),
    Index { array: String, index: Expr },
}

impl Place {
    pub fn var(name: impl Into<String>) -> Place {
        Place::Var(name.into())
    }

    pub fn index(array: impl Into<String>, index: Expr) -> Place {
        Place::Index {
            array: array.into(),
            index,
        }
    }

    /// The place read back as an expression (for augmented assignment).
    pub fn to_expr(&self) -> Expr {
        match self {
            Place::Var(name) => Expr::Var(name.clone()),
            Place::Index { array, index } => Expr::index(array.clone(), index.clone()),
        }
    }
}

// ─── Statements ───────────────────────────────────────────────────

/// A kernel statement. Structural statements (`For`, `While`, `If`) carry
/// nested bodies.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign {
        place: Place,
        value: Expr,
    },
    /// Augmented assignment `place op= value`. Reduction combine and fold
    /// steps are expressed with this node.
    Update {
        place: Place,
        op: BinOp,
        value: Expr,
    },
    /// Work-group local scratch array.
    LocalArray {
        name: String,
        len: u32,
        ty: ElemType,
    },
    /// Counted loop over `start..stop` (exclusive) by `step`.
    For {
        var: String,
        start: Expr,
        stop: Expr,
        step: Expr,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
    },
    /// Work-group barrier.
    Barrier(Fence),
    /// Dummy assignment marking where user update logic goes.
    Sentinel(String),
    Return,
}

impl Stmt {
    pub fn assign(name: impl Into<String>, value: Expr) -> Stmt {
        Stmt::Assign {
            place: Place::var(name),
            value,
        }
    }

    pub fn store(array: impl Into<String>, index: Expr, value: Expr) -> Stmt {
        Stmt::Assign {
            place: Place::index(array, index),
            value,
        }
    }

    pub fn update(place: Place, op: BinOp, value: Expr) -> Stmt {
        Stmt::Update { place, op, value }
    }

    pub fn range(var: impl Into<String>, stop: Expr, body: Vec<Stmt>) -> Stmt {
        Stmt::For {
            var: var.into(),
            start: Expr::int(0),
            stop,
            step: Expr::int(1),
            body,
        }
    }

    /// Nested body of a structural statement.
    pub fn body(&self) -> Option<&[Stmt]> {
        match self {
            Stmt::For { body, .. } | Stmt::While { body, .. } => Some(body),
            Stmt::If { then_body, .. } => Some(then_body),
            _ => None,
        }
    }

    fn body_mut(&mut self) -> Option<&mut Vec<Stmt>> {
        match self {
            Stmt::For { body, .. } | Stmt::While { body, .. } => Some(body),
            Stmt::If { then_body, .. } => Some(then_body),
            _ => None,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { place, .. } => write!(f, "assign {}", place_name(place)),
            Stmt::Update { place, op, .. } => {
                write!(f, "update {} {}=", place_name(place), op.symbol())
            }
            Stmt::LocalArray { name, len, ty } => {
                write!(f, "local_array {}[{}]: {}", name, len, ty)
            }
            Stmt::For { var, body, .. } => write!(f, "for {}(body={})", var, body.len()),
            Stmt::While { body, .. } => write!(f, "while(body={})", body.len()),
            Stmt::If { then_body, .. } => write!(f, "if(then={})", then_body.len()),
            Stmt::Barrier(Fence::Local) => write!(f, "barrier local"),
            Stmt::Barrier(Fence::Global) => write!(f, "barrier global"),
            Stmt::Sentinel(name) => write!(f, "sentinel {}", name),
            Stmt::Return => write!(f, "return"),
        }
    }
}

fn place_name(place: &Place) -> String {
    match place {
        Place::Var(name) => name.clone(),
        Place::Index { array, .. } => format!("{}[..]", array),
    }
}

// ─── Kernel ───────────────────────────────────────────────────────

/// Location of the sentinel statement: one index per nesting level, the
/// last index selects the sentinel inside its enclosing body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertionPoint {
    path: Vec<usize>,
}

impl InsertionPoint {
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Number of structural statements enclosing the sentinel.
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

/// A kernel function: name, ordered parameters and body.
///
/// The body is fixed at construction so the cached insertion point stays
/// valid; `splice` is the only way to add statements.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    pub name: String,
    pub params: Vec<String>,
    body: Vec<Stmt>,
    insertion: Option<InsertionPoint>,
}

impl Kernel {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: Vec<Stmt>) -> Self {
        let insertion = find_sentinel(&body, &mut Vec::new()).map(|path| InsertionPoint { path });
        Self {
            name: name.into(),
            params,
            body,
            insertion,
        }
    }

    pub fn body(&self) -> &[Stmt] {
        &self.body
    }

    pub fn insertion_point(&self) -> Option<&InsertionPoint> {
        self.insertion.as_ref()
    }

    /// Statement at `path` (same addressing as `InsertionPoint`).
    pub fn stmt_at(&self, path: &[usize]) -> Option<&Stmt> {
        let (last, parents) = path.split_last()?;
        let mut body: &[Stmt] = &self.body;
        for &i in parents {
            body = body.get(i)?.body()?;
        }
        body.get(*last)
    }

    /// Name assigned by the sentinel statement.
    pub fn sentinel_name(&self) -> Option<&str> {
        let point = self.insertion.as_ref()?;
        match self.stmt_at(point.path())? {
            Stmt::Sentinel(name) => Some(name),
            _ => None,
        }
    }

    /// A copy of this kernel with `stmts` inserted directly after the
    /// sentinel. The sentinel stays in place, so the result can be spliced
    /// again. Returns `None` when the kernel has no sentinel.
    pub fn splice(&self, stmts: Vec<Stmt>) -> Option<Kernel> {
        let path = self.insertion.as_ref()?.path.clone();
        let mut kernel = self.clone();
        let (last, parents) = path.split_last()?;
        let mut body = &mut kernel.body;
        for &i in parents {
            body = body.get_mut(i)?.body_mut()?;
        }
        let at = last + 1;
        body.splice(at..at, stmts);
        Some(kernel)
    }

    /// Total number of statements, nested ones included.
    pub fn stmt_count(&self) -> usize {
        count_stmts(&self.body)
    }
}

fn count_stmts(body: &[Stmt]) -> usize {
    body.iter()
        .map(|s| 1 + s.body().map(count_stmts).unwrap_or(0))
        .sum()
}

fn find_sentinel(body: &[Stmt], prefix: &mut Vec<usize>) -> Option<Vec<usize>> {
    for (i, stmt) in body.iter().enumerate() {
        prefix.push(i);
        if matches!(stmt, Stmt::Sentinel(_)) {
            return Some(prefix.clone());
        }
        if let Some(inner) = stmt.body() {
            if let Some(found) = find_sentinel(inner, prefix) {
                return Some(found);
            }
        }
        prefix.pop();
    }
    None
}
