//! Indentation-scoped kernel source, as consumed by Python-syntax kernel
//! front ends (`def`, `for ... in range(...)`, augmented assignment).

use super::KernelLowering;
use crate::frontend::DeviceIntrinsics;
use crate::kir::{Expr, Kernel, Place, Stmt};
use crate::reduction::Literal;

pub struct SourceLowering {
    target: String,
    indent: usize,
}

impl SourceLowering {
    pub fn new(target: &str, indent: usize) -> Self {
        Self {
            target: target.to_string(),
            indent: indent.max(1),
        }
    }

    fn line(&self, out: &mut String, depth: usize, text: &str) {
        for _ in 0..depth * self.indent {
            out.push(' ');
        }
        out.push_str(text);
        out.push('\n');
    }

    fn lower_body(
        &self,
        body: &[Stmt],
        depth: usize,
        intr: &dyn DeviceIntrinsics,
        out: &mut String,
    ) {
        if body.is_empty() {
            self.line(out, depth, "pass");
            return;
        }
        for stmt in body {
            self.lower_stmt(stmt, depth, intr, out);
        }
    }

    fn lower_stmt(&self, stmt: &Stmt, depth: usize, intr: &dyn DeviceIntrinsics, out: &mut String) {
        match stmt {
            Stmt::Assign { place, value } => {
                let text = format!("{} = {}", place_text(place, intr), expr_text(value, intr));
                self.line(out, depth, &text);
            }
            Stmt::Update { place, op, value } => {
                let text = format!(
                    "{} {}= {}",
                    place_text(place, intr),
                    op.symbol(),
                    expr_text(value, intr)
                );
                self.line(out, depth, &text);
            }
            Stmt::LocalArray { name, len, ty } => {
                let text = format!(
                    "{} = {}({}, {})",
                    name,
                    intr.local_array_path(),
                    len,
                    intr.type_path(*ty)
                );
                self.line(out, depth, &text);
            }
            Stmt::For {
                var,
                start,
                stop,
                step,
                body,
            } => {
                let args = match (start, step) {
                    (Expr::Lit(Literal::Int(0)), Expr::Lit(Literal::Int(1))) => {
                        expr_text(stop, intr)
                    }
                    (_, Expr::Lit(Literal::Int(1))) => {
                        format!("{}, {}", expr_text(start, intr), expr_text(stop, intr))
                    }
                    _ => format!(
                        "{}, {}, {}",
                        expr_text(start, intr),
                        expr_text(stop, intr),
                        expr_text(step, intr)
                    ),
                };
                self.line(out, depth, &format!("for {} in range({}):", var, args));
                self.lower_body(body, depth + 1, intr, out);
            }
            Stmt::While { cond, body } => {
                self.line(out, depth, &format!("while {}:", expr_text(cond, intr)));
                self.lower_body(body, depth + 1, intr, out);
            }
            Stmt::If { cond, then_body } => {
                self.line(out, depth, &format!("if {}:", expr_text(cond, intr)));
                self.lower_body(then_body, depth + 1, intr, out);
            }
            Stmt::Barrier(fence) => {
                let text = format!("{}({})", intr.barrier_path(), intr.fence_path(*fence));
                self.line(out, depth, &text);
            }
            Stmt::Sentinel(name) => self.line(out, depth, &format!("{} = 0", name)),
            Stmt::Return => self.line(out, depth, "return None"),
        }
    }
}

impl KernelLowering for SourceLowering {
    fn target_name(&self) -> &str {
        &self.target
    }

    fn lower(&self, kernel: &Kernel, intrinsics: &dyn DeviceIntrinsics) -> String {
        let mut out = String::new();
        out.push_str(&format!("def {}({}):\n", kernel.name, kernel.params.join(", ")));
        self.lower_body(kernel.body(), 1, intrinsics, &mut out);
        out
    }
}

fn place_text(place: &Place, intr: &dyn DeviceIntrinsics) -> String {
    match place {
        Place::Var(name) => name.clone(),
        Place::Index { array, index } => format!("{}[{}]", array, expr_text(index, intr)),
    }
}

pub(super) fn expr_text(expr: &Expr, intr: &dyn DeviceIntrinsics) -> String {
    match expr {
        Expr::Lit(lit) => lit.to_string(),
        Expr::Var(name) => name.clone(),
        Expr::Index { array, index } => format!("{}[{}]", array, expr_text(index, intr)),
        Expr::Query { query, dim } => format!("{}({})", intr.query_path(*query), dim),
        Expr::Binary { op, lhs, rhs } => {
            let prec = op.precedence();
            let lhs_text = operand_text(lhs, intr, |p| p < prec);
            // Right operands of equal precedence need grouping: a - (b - c).
            let rhs_text = operand_text(rhs, intr, |p| p <= prec);
            format!("{} {} {}", lhs_text, op.symbol(), rhs_text)
        }
    }
}

fn operand_text(
    expr: &Expr,
    intr: &dyn DeviceIntrinsics,
    needs_parens: impl Fn(u8) -> bool,
) -> String {
    let text = expr_text(expr, intr);
    match expr {
        Expr::Binary { op, .. } if needs_parens(op.precedence()) => format!("({})", text),
        _ => text,
    }
}
