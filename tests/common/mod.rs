//! Lock-step work-group simulator over `KernelIr`.
//!
//! Every work-item of a group runs until it reaches a barrier or returns;
//! the group resumes once all items are parked. Local arrays are shared by
//! the group, parameters by the whole launch. All values are `f64`.

#![allow(dead_code)]

use std::collections::HashMap;

use tree_reduce::frontend::{Inst, IrLocation, KernelIr, Operand, Rvalue};
use tree_reduce::kir::{BinOp, IndexQuery};
use tree_reduce::reduction::Literal;

/// Launch arguments and global buffers.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    pub scalars: HashMap<String, f64>,
    pub arrays: HashMap<String, Vec<f64>>,
}

impl Memory {
    pub fn scalar(mut self, name: &str, v: f64) -> Self {
        self.scalars.insert(name.to_string(), v);
        self
    }

    pub fn array(mut self, name: &str, v: Vec<f64>) -> Self {
        self.arrays.insert(name.to_string(), v);
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Launch {
    pub groups: usize,
    pub local_size: usize,
}

impl Launch {
    pub fn sequential() -> Self {
        Self {
            groups: 1,
            local_size: 1,
        }
    }
}

#[derive(Default)]
pub struct Stats {
    /// Times any work-item executed the sentinel instruction.
    pub sentinel_hits: usize,
    pub barriers: usize,
}

#[derive(PartialEq)]
enum Status {
    Barrier,
    Done,
}

struct Item {
    global: usize,
    local: usize,
    group: usize,
    vars: HashMap<String, f64>,
    block: usize,
    pc: usize,
    done: bool,
}

pub fn run(ir: &KernelIr, launch: Launch, mem: &mut Memory) -> Stats {
    for arg in &ir.args {
        assert!(
            mem.scalars.contains_key(arg) || mem.arrays.contains_key(arg),
            "missing kernel argument '{}'",
            arg
        );
    }

    let mut stats = Stats::default();
    for group in 0..launch.groups {
        let mut local_arrays: HashMap<String, Vec<f64>> = HashMap::new();
        let mut items: Vec<Item> = (0..launch.local_size)
            .map(|local| Item {
                global: group * launch.local_size + local,
                local,
                group,
                vars: mem.scalars.clone(),
                block: 0,
                pc: 0,
                done: false,
            })
            .collect();

        loop {
            let mut parked = 0;
            for item in items.iter_mut().filter(|i| !i.done) {
                let status = step(ir, launch, item, mem, &mut local_arrays, &mut stats);
                if status == Status::Done {
                    item.done = true;
                } else {
                    parked += 1;
                }
            }
            if parked == 0 {
                break;
            }
            assert_eq!(
                parked,
                items.len(),
                "work-items diverged at a barrier in group {}",
                group
            );
            stats.barriers += 1;
        }
    }
    stats
}

/// Run one work-item until it reaches a barrier or returns.
fn step(
    ir: &KernelIr,
    launch: Launch,
    item: &mut Item,
    mem: &mut Memory,
    local_arrays: &mut HashMap<String, Vec<f64>>,
    stats: &mut Stats,
) -> Status {
    loop {
        let loc = IrLocation {
            block: item.block as u32,
            index: item.pc,
        };
        if ir.sentinel == Some(loc) {
            stats.sentinel_hits += 1;
        }
        let inst = ir.inst(loc).expect("fell off the end of a block");
        item.pc += 1;

        match inst {
            Inst::Assign { target, value } => {
                let v = eval(value, launch, item, mem, local_arrays);
                item.vars.insert(target.clone(), v);
            }
            Inst::Store {
                array,
                index,
                value,
            } => {
                let i = operand(index, item) as usize;
                let v = operand(value, item);
                let buf = local_arrays
                    .get_mut(array)
                    .or_else(|| mem.arrays.get_mut(array))
                    .unwrap_or_else(|| panic!("no array '{}'", array));
                buf[i] = v;
            }
            Inst::AllocLocal { target, len, .. } => {
                local_arrays
                    .entry(target.clone())
                    .or_insert_with(|| vec![0.0; *len as usize]);
            }
            Inst::Barrier { .. } => return Status::Barrier,
            Inst::Jump(label) => {
                item.block = *label as usize;
                item.pc = 0;
            }
            Inst::Branch {
                cond,
                then_label,
                else_label,
            } => {
                let target = if operand(cond, item) != 0.0 {
                    then_label
                } else {
                    else_label
                };
                item.block = *target as usize;
                item.pc = 0;
            }
            Inst::Return => return Status::Done,
        }
    }
}

fn eval(
    value: &Rvalue,
    launch: Launch,
    item: &Item,
    mem: &Memory,
    local_arrays: &HashMap<String, Vec<f64>>,
) -> f64 {
    match value {
        Rvalue::Use(op) => operand(op, item),
        Rvalue::Binary { op, lhs, rhs } => binary(*op, operand(lhs, item), operand(rhs, item)),
        Rvalue::Load { array, index } => {
            let i = operand(index, item) as usize;
            let buf = local_arrays
                .get(array)
                .or_else(|| mem.arrays.get(array))
                .unwrap_or_else(|| panic!("no array '{}'", array));
            buf[i]
        }
        Rvalue::Query { query, dim, .. } => {
            if *dim > 0 {
                return match query {
                    IndexQuery::LocalSize => 1.0,
                    _ => 0.0,
                };
            }
            let v = match query {
                IndexQuery::GlobalId => item.global,
                IndexQuery::LocalId => item.local,
                IndexQuery::LocalSize => launch.local_size,
                IndexQuery::GroupId => item.group,
            };
            v as f64
        }
    }
}

fn operand(op: &Operand, item: &Item) -> f64 {
    match op {
        Operand::Var(name) => *item
            .vars
            .get(name)
            .unwrap_or_else(|| panic!("read of unset '{}'", name)),
        Operand::Const(Literal::Int(v)) => *v as f64,
        Operand::Const(Literal::Float(v)) => *v,
    }
}

fn binary(op: BinOp, a: f64, b: f64) -> f64 {
    let flag = |c: bool| if c { 1.0 } else { 0.0 };
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Shr => (a / 2f64.powi(b as i32)).floor(),
        BinOp::Lt => flag(a < b),
        BinOp::Gt => flag(a > b),
        BinOp::Eq => flag(a == b),
    }
}
