//! KIR → block IR lowering with well-formedness checks.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::kir::{BinOp, Expr, Kernel, Place, Stmt};
use crate::reduction::Literal;

use super::ir::{Inst, IrBlock, IrLocation, KernelIr, Label, Operand, Rvalue};
use super::{DeviceIntrinsics, FrontendError};

type Result<T> = std::result::Result<T, FrontendError>;

pub(super) struct IrBuilder<'a> {
    intrinsics: &'a dyn DeviceIntrinsics,
    blocks: Vec<IrBlock>,
    current: Label,
    temp_counter: u32,
    /// Names assigned so far, in textual order.
    defined: HashSet<String>,
    /// Depth of enclosing conditionals. Barriers require zero.
    divergence: u32,
    sentinel: Option<IrLocation>,
}

impl<'a> IrBuilder<'a> {
    pub(super) fn new(intrinsics: &'a dyn DeviceIntrinsics) -> Self {
        Self {
            intrinsics,
            blocks: vec![IrBlock {
                label: 0,
                insts: Vec::new(),
            }],
            current: 0,
            temp_counter: 0,
            defined: HashSet::new(),
            divergence: 0,
            sentinel: None,
        }
    }

    pub(super) fn build(mut self, kernel: &Kernel) -> Result<KernelIr> {
        for param in &kernel.params {
            if !self.defined.insert(param.clone()) {
                return Err(FrontendError::DuplicateParam {
                    name: param.clone(),
                });
            }
        }

        self.lower_body(kernel.body())?;
        if !self.is_terminated() {
            self.emit(Inst::Return);
        }

        Ok(KernelIr {
            name: kernel.name.clone(),
            args: kernel.params.clone(),
            blocks: self.blocks,
            sentinel: self.sentinel,
        })
    }

    // ── Block bookkeeping ─────────────────────────────────────────

    fn new_block(&mut self) -> Label {
        let label = self.blocks.len() as Label;
        self.blocks.push(IrBlock {
            label,
            insts: Vec::new(),
        });
        label
    }

    fn switch_to(&mut self, label: Label) {
        self.current = label;
    }

    fn emit(&mut self, inst: Inst) {
        self.blocks[self.current as usize].insts.push(inst);
    }

    fn is_terminated(&self) -> bool {
        self.blocks[self.current as usize]
            .insts
            .last()
            .is_some_and(Inst::is_terminator)
    }

    fn fresh_temp(&mut self) -> String {
        let name = format!("${}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn define(&mut self, name: &str) {
        self.defined.insert(name.to_string());
    }

    fn read_name(&self, name: &str) -> Result<()> {
        if self.defined.contains(name) {
            Ok(())
        } else {
            Err(FrontendError::UndefinedName {
                name: name.to_string(),
            })
        }
    }

    // ── Statements ────────────────────────────────────────────────

    fn lower_body(&mut self, body: &[Stmt]) -> Result<()> {
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        // Code after a `return` goes into a fresh, unreachable block.
        if self.is_terminated() {
            let next = self.new_block();
            self.switch_to(next);
        }

        match stmt {
            Stmt::Assign {
                place: Place::Var(name),
                value,
            } => {
                let value = self.lower_rvalue(value)?;
                self.emit(Inst::Assign {
                    target: name.clone(),
                    value,
                });
                self.define(name);
            }

            Stmt::Assign {
                place: Place::Index { array, index },
                value,
            } => {
                self.read_name(array)?;
                let index = self.lower_operand(index)?;
                let value = self.lower_operand(value)?;
                self.emit(Inst::Store {
                    array: array.clone(),
                    index,
                    value,
                });
            }

            Stmt::Update {
                place: Place::Var(name),
                op,
                value,
            } => {
                self.read_name(name)?;
                let rhs = self.lower_operand(value)?;
                self.emit(Inst::Assign {
                    target: name.clone(),
                    value: Rvalue::Binary {
                        op: *op,
                        lhs: Operand::Var(name.clone()),
                        rhs,
                    },
                });
            }

            Stmt::Update {
                place: Place::Index { array, index },
                op,
                value,
            } => {
                self.read_name(array)?;
                let index = self.lower_operand(index)?;
                let current = self.fresh_temp();
                self.emit(Inst::Assign {
                    target: current.clone(),
                    value: Rvalue::Load {
                        array: array.clone(),
                        index: index.clone(),
                    },
                });
                let rhs = self.lower_operand(value)?;
                let combined = self.fresh_temp();
                self.emit(Inst::Assign {
                    target: combined.clone(),
                    value: Rvalue::Binary {
                        op: *op,
                        lhs: Operand::Var(current),
                        rhs,
                    },
                });
                self.emit(Inst::Store {
                    array: array.clone(),
                    index,
                    value: Operand::Var(combined),
                });
            }

            Stmt::LocalArray { name, len, ty } => {
                if *len == 0 {
                    return Err(FrontendError::EmptyLocalArray { name: name.clone() });
                }
                if !self.intrinsics.supports(*ty) {
                    return Err(FrontendError::UnsupportedType { ty: *ty });
                }
                self.emit(Inst::AllocLocal {
                    target: name.clone(),
                    len: *len,
                    ty: *ty,
                    callee: self.intrinsics.local_array_path(),
                    dtype: self.intrinsics.type_path(*ty),
                });
                self.define(name);
            }

            Stmt::For {
                var,
                start,
                stop,
                step,
                body,
            } => {
                // Bounds are evaluated once, before the first iteration. The
                // loop runs on a hidden counter copied into `var` at the top
                // of each iteration, so writes to `var` in the body do not
                // change the trip count.
                let start = self.lower_operand(start)?;
                let stop = self.lower_operand(stop)?;
                let stop = self.snapshot(stop);
                let step = self.lower_operand(step)?;
                let step = self.snapshot(step);
                let counter = self.fresh_temp();
                self.emit(Inst::Assign {
                    target: counter.clone(),
                    value: Rvalue::Use(start),
                });

                let header = self.new_block();
                let body_label = self.new_block();
                let exit = self.new_block();
                self.emit(Inst::Jump(header));

                self.switch_to(header);
                let cond = self.loop_condition(var, &counter, stop, &step)?;
                self.emit(Inst::Branch {
                    cond,
                    then_label: body_label,
                    else_label: exit,
                });

                self.switch_to(body_label);
                self.emit(Inst::Assign {
                    target: var.clone(),
                    value: Rvalue::Use(Operand::Var(counter.clone())),
                });
                self.define(var);
                self.lower_body(body)?;
                if !self.is_terminated() {
                    self.emit(Inst::Assign {
                        target: counter.clone(),
                        value: Rvalue::Binary {
                            op: BinOp::Add,
                            lhs: Operand::Var(counter),
                            rhs: step,
                        },
                    });
                    self.emit(Inst::Jump(header));
                }

                self.switch_to(exit);
            }

            Stmt::While { cond, body } => {
                let header = self.new_block();
                let body_label = self.new_block();
                let exit = self.new_block();
                self.emit(Inst::Jump(header));

                self.switch_to(header);
                let cond = self.lower_operand(cond)?;
                self.emit(Inst::Branch {
                    cond,
                    then_label: body_label,
                    else_label: exit,
                });

                self.switch_to(body_label);
                self.lower_body(body)?;
                if !self.is_terminated() {
                    self.emit(Inst::Jump(header));
                }

                self.switch_to(exit);
            }

            Stmt::If { cond, then_body } => {
                let cond = self.lower_operand(cond)?;
                let then_label = self.new_block();
                let merge = self.new_block();
                self.emit(Inst::Branch {
                    cond,
                    then_label,
                    else_label: merge,
                });

                self.switch_to(then_label);
                self.divergence += 1;
                let lowered = self.lower_body(then_body);
                self.divergence -= 1;
                lowered?;
                if !self.is_terminated() {
                    self.emit(Inst::Jump(merge));
                }

                self.switch_to(merge);
            }

            Stmt::Barrier(fence) => {
                if self.divergence > 0 {
                    return Err(FrontendError::DivergentBarrier);
                }
                self.emit(Inst::Barrier {
                    callee: self.intrinsics.barrier_path(),
                    fence: *fence,
                    fence_name: self.intrinsics.fence_path(*fence),
                });
            }

            Stmt::Sentinel(name) => {
                self.emit(Inst::Assign {
                    target: name.clone(),
                    value: Rvalue::Use(Operand::Const(Literal::Int(0))),
                });
                let block = &self.blocks[self.current as usize];
                self.sentinel = Some(IrLocation {
                    block: self.current,
                    index: block.insts.len() - 1,
                });
                self.define(name);
            }

            Stmt::Return => self.emit(Inst::Return),
        }
        Ok(())
    }

    // ── Expressions ───────────────────────────────────────────────

    fn lower_rvalue(&mut self, expr: &Expr) -> Result<Rvalue> {
        match expr {
            Expr::Lit(lit) => Ok(Rvalue::Use(Operand::Const(*lit))),
            Expr::Var(name) => {
                self.read_name(name)?;
                Ok(Rvalue::Use(Operand::Var(name.clone())))
            }
            Expr::Index { array, index } => {
                self.read_name(array)?;
                let index = self.lower_operand(index)?;
                Ok(Rvalue::Load {
                    array: array.clone(),
                    index,
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.lower_operand(lhs)?;
                let rhs = self.lower_operand(rhs)?;
                Ok(Rvalue::Binary { op: *op, lhs, rhs })
            }
            Expr::Query { query, dim } => {
                let max = self.intrinsics.max_dims();
                if *dim >= max {
                    return Err(FrontendError::UnsupportedDimension { dim: *dim, max });
                }
                Ok(Rvalue::Query {
                    callee: self.intrinsics.query_path(*query),
                    query: *query,
                    dim: *dim,
                })
            }
        }
    }

    fn lower_operand(&mut self, expr: &Expr) -> Result<Operand> {
        match self.lower_rvalue(expr)? {
            Rvalue::Use(op) => Ok(op),
            value => {
                let target = self.fresh_temp();
                self.emit(Inst::Assign {
                    target: target.clone(),
                    value,
                });
                Ok(Operand::Var(target))
            }
        }
    }

    /// Whether `counter` has not yet reached `stop`. A constant step picks
    /// `<` or `>` by its sign; a variable step tests
    /// `(stop - counter) * step > 0`, which holds for either sign.
    fn loop_condition(
        &mut self,
        var: &str,
        counter: &str,
        stop: Operand,
        step: &Operand,
    ) -> Result<Operand> {
        let counter = Operand::Var(counter.to_string());
        let value = match step {
            Operand::Const(lit) => {
                let sign = match *lit {
                    Literal::Int(v) => v.cmp(&0),
                    Literal::Float(v) => v.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
                };
                let op = match sign {
                    Ordering::Greater => BinOp::Lt,
                    Ordering::Less => BinOp::Gt,
                    Ordering::Equal => {
                        return Err(FrontendError::ZeroStep {
                            var: var.to_string(),
                        })
                    }
                };
                Rvalue::Binary {
                    op,
                    lhs: counter,
                    rhs: stop,
                }
            }
            Operand::Var(_) => {
                let remaining = self.fresh_temp();
                self.emit(Inst::Assign {
                    target: remaining.clone(),
                    value: Rvalue::Binary {
                        op: BinOp::Sub,
                        lhs: stop,
                        rhs: counter,
                    },
                });
                let scaled = self.fresh_temp();
                self.emit(Inst::Assign {
                    target: scaled.clone(),
                    value: Rvalue::Binary {
                        op: BinOp::Mul,
                        lhs: Operand::Var(remaining),
                        rhs: step.clone(),
                    },
                });
                Rvalue::Binary {
                    op: BinOp::Gt,
                    lhs: Operand::Var(scaled),
                    rhs: Operand::Const(Literal::Int(0)),
                }
            }
        };
        let cond = self.fresh_temp();
        self.emit(Inst::Assign {
            target: cond.clone(),
            value,
        });
        Ok(Operand::Var(cond))
    }

    /// Copy a named operand into a temporary so later writes to the name
    /// do not change it.
    fn snapshot(&mut self, op: Operand) -> Operand {
        match op {
            Operand::Var(name) if !name.starts_with('$') => {
                let target = self.fresh_temp();
                self.emit(Inst::Assign {
                    target: target.clone(),
                    value: Rvalue::Use(Operand::Var(name)),
                });
                Operand::Var(target)
            }
            other => other,
        }
    }
}
