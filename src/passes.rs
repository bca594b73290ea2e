use std::collections::{HashMap, HashSet};

use super::ir::{Function, Inst, Reg, Terminator};

/// Best-effort local peephole pass, run once per finalized function:
/// block-local constant folding followed by a sweep of pure instructions
/// whose result is never read. Registers are single-assignment, so a value
/// known constant stays constant.
pub fn optimize(func: &mut Function) {
    fold_constants(func);
    drop_dead_insts(func);
}

fn fold_constants(func: &mut Function) {
    for block in &mut func.blocks {
        let mut known: HashMap<Reg, f64> = HashMap::new();
        for inst in &mut block.insts {
            match *inst {
                Inst::Const { dst, value } => {
                    known.insert(dst, value);
                }
                Inst::BinOp { dst, op, lhs, rhs } => {
                    if let (Some(l), Some(r)) = (known.get(&lhs), known.get(&rhs)) {
                        let value = op.eval(*l, *r);
                        *inst = Inst::Const { dst, value };
                        known.insert(dst, value);
                    }
                }
                _ => {}
            }
        }
    }
}

fn drop_dead_insts(func: &mut Function) {
    let mut used: HashSet<Reg> = HashSet::new();
    for block in &func.blocks {
        for inst in &block.insts {
            match inst {
                Inst::Store { src, .. } => {
                    used.insert(*src);
                }
                Inst::BinOp { lhs, rhs, .. } => {
                    used.insert(*lhs);
                    used.insert(*rhs);
                }
                Inst::Call { args, .. } => {
                    used.extend(args.iter().copied());
                }
                Inst::Phi { incomings, .. } => {
                    used.extend(incomings.iter().map(|(_, r)| *r));
                }
                Inst::Const { .. } | Inst::Load { .. } => {}
            }
        }
        match &block.term {
            Some(Terminator::Ret(r)) => {
                used.insert(*r);
            }
            Some(Terminator::CondBr { cond, .. }) => {
                used.insert(*cond);
            }
            _ => {}
        }
    }

    for block in &mut func.blocks {
        block.insts.retain(|inst| {
            inst.has_side_effect() || inst.dst().map_or(true, |dst| used.contains(&dst))
        });
    }
}

#[cfg(test)]
mod test {
    use super::super::ir::{BinOp, Block, BlockId};
    use super::*;

    fn func_with(insts: Vec<Inst>, term: Terminator, reg_count: u32) -> Function {
        Function {
            name: "t".to_owned(),
            params: Vec::new(),
            slots: Vec::new(),
            blocks: vec![Block {
                label: "entry".to_owned(),
                insts,
                term: Some(term),
            }],
            reg_count,
        }
    }

    #[test]
    fn test_folds_constant_binops() {
        // 2 * 3 + 1 over constants folds down to a single returned const.
        let mut f = func_with(
            vec![
                Inst::Const {
                    dst: Reg(0),
                    value: 2.0,
                },
                Inst::Const {
                    dst: Reg(1),
                    value: 3.0,
                },
                Inst::BinOp {
                    dst: Reg(2),
                    op: BinOp::Mul,
                    lhs: Reg(0),
                    rhs: Reg(1),
                },
                Inst::Const {
                    dst: Reg(3),
                    value: 1.0,
                },
                Inst::BinOp {
                    dst: Reg(4),
                    op: BinOp::Add,
                    lhs: Reg(2),
                    rhs: Reg(3),
                },
            ],
            Terminator::Ret(Reg(4)),
            5,
        );
        optimize(&mut f);
        assert_eq!(
            f.blocks[0].insts,
            vec![Inst::Const {
                dst: Reg(4),
                value: 7.0,
            }]
        );
    }

    #[test]
    fn test_keeps_side_effects_and_phi_inputs() {
        let mut f = func_with(
            vec![
                Inst::Const {
                    dst: Reg(0),
                    value: 65.0,
                },
                Inst::Call {
                    dst: Reg(1),
                    callee: "putchard".to_owned(),
                    args: vec![Reg(0)],
                },
                Inst::Phi {
                    dst: Reg(2),
                    incomings: [(BlockId(0), Reg(1)), (BlockId(0), Reg(1))],
                },
            ],
            Terminator::Ret(Reg(2)),
            3,
        );
        optimize(&mut f);
        assert_eq!(f.blocks[0].insts.len(), 3);
    }
}
