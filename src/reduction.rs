//! Reduction data model: operators, element types, variables, loop ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};
use crate::kir::BinOp;

// ─── Operators ────────────────────────────────────────────────────

/// A supported reduction operator.
///
/// Each operator knows its identity element and the binary operator used
/// when combining two partial values. This enum is the only place that
/// lists supported operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Add,
    Multiply,
}

impl ReduceOp {
    pub const ALL: [ReduceOp; 2] = [ReduceOp::Add, ReduceOp::Multiply];

    pub fn name(self) -> &'static str {
        match self {
            ReduceOp::Add => "add",
            ReduceOp::Multiply => "multiply",
        }
    }

    /// Operator spellings accepted from callers and description files.
    pub fn spellings(self) -> &'static [&'static str] {
        match self {
            ReduceOp::Add => &["add", "+", "+=", "iadd"],
            ReduceOp::Multiply => &["multiply", "mul", "*", "*=", "imul"],
        }
    }

    /// Binary operator used in combine and fold statements.
    pub fn binop(self) -> BinOp {
        match self {
            ReduceOp::Add => BinOp::Add,
            ReduceOp::Multiply => BinOp::Mul,
        }
    }

    /// Identity element, typed for `ty`.
    pub fn identity(self, ty: ElemType) -> Literal {
        let v = match self {
            ReduceOp::Add => 0,
            ReduceOp::Multiply => 1,
        };
        Literal::Int(v).coerce(ty)
    }

    pub fn parse(spelling: &str) -> Option<ReduceOp> {
        let s = spelling.trim();
        Self::ALL
            .into_iter()
            .find(|op| op.spellings().iter().any(|sp| sp.eq_ignore_ascii_case(s)))
    }

    /// Resolve the raw operator of reduction variable `var`.
    pub fn resolve(var: &str, spelling: &str) -> Result<ReduceOp> {
        Self::parse(spelling).ok_or_else(|| SynthError::UnsupportedOperator {
            var: var.to_string(),
            op: spelling.to_string(),
        })
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Element types ────────────────────────────────────────────────

/// Element type of a reduction variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl ElemType {
    /// Name inside the numeric-type namespace.
    pub fn name(self) -> &'static str {
        match self {
            ElemType::Int32 => "int32",
            ElemType::Int64 => "int64",
            ElemType::Uint32 => "uint32",
            ElemType::Uint64 => "uint64",
            ElemType::Float32 => "float32",
            ElemType::Float64 => "float64",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElemType::Float32 | ElemType::Float64)
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Literals ─────────────────────────────────────────────────────

/// A numeric constant in kernel code.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Float(f64),
}

impl Literal {
    /// Convert integer literals to floats for floating-point types.
    pub fn coerce(self, ty: ElemType) -> Literal {
        match self {
            Literal::Int(v) if ty.is_float() => Literal::Float(v as f64),
            other => other,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            // Debug keeps the trailing `.0` on integral floats.
            Literal::Float(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

// ─── Reduction variables ──────────────────────────────────────────

/// A value accumulated across loop iterations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReductionVar {
    /// Raw name as produced by the caller's front end.
    pub name: String,
    /// Raw operator spelling; resolved to a `ReduceOp` during synthesis.
    pub op: String,
    /// Initial value. Defaults to the operator identity.
    #[serde(default)]
    pub init: Option<Literal>,
    pub ty: ElemType,
}

impl ReductionVar {
    pub fn new(name: impl Into<String>, op: impl Into<String>, ty: ElemType) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            init: None,
            ty,
        }
    }

    pub fn with_init(mut self, init: impl Into<Literal>) -> Self {
        self.init = Some(init.into());
        self
    }
}

// ─── Loop ranges ──────────────────────────────────────────────────

/// A loop bound: a literal or a symbol bound through the parameter
/// substitution table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Literal(i64),
    Symbol(String),
}

impl From<i64> for Bound {
    fn from(v: i64) -> Self {
        Bound::Literal(v)
    }
}

impl From<&str> for Bound {
    fn from(s: &str) -> Self {
        Bound::Symbol(s.to_string())
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Literal(v) => write!(f, "{}", v),
            Bound::Symbol(s) => f.write_str(s),
        }
    }
}

fn unit_step() -> Bound {
    Bound::Literal(1)
}

/// Iteration range of one loop dimension. `stop` is inclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRange {
    pub start: Bound,
    pub stop: Bound,
    #[serde(default = "unit_step")]
    pub step: Bound,
}

impl LoopRange {
    pub fn new(start: impl Into<Bound>, stop: impl Into<Bound>) -> Self {
        Self {
            start: start.into(),
            stop: stop.into(),
            step: unit_step(),
        }
    }

    pub fn with_step(mut self, step: impl Into<Bound>) -> Self {
        self.step = step.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spellings() {
        assert_eq!(ReduceOp::parse("add"), Some(ReduceOp::Add));
        assert_eq!(ReduceOp::parse("+="), Some(ReduceOp::Add));
        assert_eq!(ReduceOp::parse(" IADD "), Some(ReduceOp::Add));
        assert_eq!(ReduceOp::parse("*"), Some(ReduceOp::Multiply));
        assert_eq!(ReduceOp::parse("imul"), Some(ReduceOp::Multiply));
        assert_eq!(ReduceOp::parse("max"), None);
        assert_eq!(ReduceOp::parse("-="), None);
    }

    #[test]
    fn test_resolve_unsupported() {
        let err = ReduceOp::resolve("acc", "max").unwrap_err();
        assert!(matches!(
            err,
            SynthError::UnsupportedOperator { ref var, ref op } if var == "acc" && op == "max"
        ));
    }

    #[test]
    fn test_identity_is_typed() {
        assert_eq!(ReduceOp::Add.identity(ElemType::Int64), Literal::Int(0));
        assert_eq!(
            ReduceOp::Multiply.identity(ElemType::Float32),
            Literal::Float(1.0)
        );
        assert_eq!(ReduceOp::Multiply.identity(ElemType::Uint32).to_string(), "1");
        assert_eq!(ReduceOp::Add.identity(ElemType::Float64).to_string(), "0.0");
    }

    #[test]
    fn test_binop() {
        assert_eq!(ReduceOp::Add.binop(), BinOp::Add);
        assert_eq!(ReduceOp::Multiply.binop(), BinOp::Mul);
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Int(-3).to_string(), "-3");
        assert_eq!(Literal::Float(2.5).to_string(), "2.5");
        assert_eq!(Literal::Float(4.0).to_string(), "4.0");
        assert_eq!(Literal::Int(2).coerce(ElemType::Int32), Literal::Int(2));
    }

    #[test]
    fn test_loop_range_defaults() {
        let r = LoopRange::new(0, "n");
        assert_eq!(r.step, Bound::Literal(1));
        assert_eq!(r.stop, Bound::Symbol("n".into()));
        assert_eq!(r.with_step(2).step.to_string(), "2");
    }
}
