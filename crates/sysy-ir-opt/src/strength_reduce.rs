//! Strength reduction (§4.16), grounded in
//! `transform/strength_reduce.cc`. Two independent rewrites, both
//! disabled with a `// TODO set changed` in the source they're grounded
//! on — here both are wired up and enabled, matching the "strength
//! reduce" pass §1 lists as in scope.
//!
//! - [`combine_continuous_add`] collapses a chain of `x = y + c` (`c` a
//!   constant) additions into one add of the chain's original base value
//!   and the constants' sum.
//! - [`algebraic_combine`] recognizes a tree of adds whose leaves are all
//!   `mul`/`sdiv`/`srem` sharing one common operand and refactors it into
//!   a single multiply of the summed other operands, e.g. `a*c + b*c +
//!   d*c` becomes `(a + b + d) * c`.
//!
//! Both leave their replaced instructions with zero uses rather than
//! erasing them directly; dead-code elimination is scheduled as this
//! pass's post-pass (§4.17's sibling treatment) and sweeps them.

use rustc_hash::FxHashSet;

use sysy_ir_analysis::{AnalysisUsage, Pass, PassManager};
use sysy_ir_core::instruction::{IBinOp, Opcode};
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{FuncId, InstId, Module, ValueId};

use crate::dead_code::DeadCode;
use crate::transform::{PassResult, Transform};

pub struct StrengthReduce;

impl Transform for StrengthReduce {
    fn name() -> &'static str {
        "strength_reduce"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            changed |= combine_continuous_add(module, f);
            changed |= algebraic_combine(module, f);
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for StrengthReduce {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_post::<DeadCode>();
    }
}

fn parse_add_const(module: &Module, inst: InstId) -> Option<(ValueId, i64)> {
    let data = module.inst(inst);
    if data.opcode != Opcode::IBin(IBinOp::Add) {
        return None;
    }
    let (a, b) = (data.operands[0], data.operands[1]);
    if let Some(c) = module.value(a).kind.as_const_int() {
        Some((b, c))
    } else if let Some(c) = module.value(b).kind.as_const_int() {
        Some((a, c))
    } else {
        None
    }
}

fn combine_continuous_add(module: &mut Module, f: FuncId) -> bool {
    let mut changed = false;
    for bb in module.func(f).blocks().to_vec() {
        for inst in module.block(bb).insts().to_vec() {
            let Some((mut src, mut const_sum)) = parse_add_const(module, inst) else { continue };
            // Chase the chain as far as it goes; `extended` only flips once
            // a *second* level is actually found, so a lone `x + c` isn't
            // rewritten into itself and reported as a change forever.
            let mut extended = false;
            loop {
                let ValueKind::Inst(src_inst) = module.value(src).kind else { break };
                let Some((next_src, next_const)) = parse_add_const(module, src_inst) else { break };
                src = next_src;
                const_sum += next_const;
                extended = true;
            }
            if !extended {
                continue;
            }
            let folded = module.const_int(32, const_sum);
            module.set_operand(inst, 0, src);
            module.set_operand(inst, 1, folded);
            changed = true;
        }
    }
    changed
}

/// Walks downward from `inst` through a tree of `add`s, recording every
/// `add` visited in `add_group` and every `mul`/`sdiv`/`srem` leaf reached
/// in `leaves`. Fails (without partial mutation — callers discard
/// `add_group`/`leaves` on a `false` return) as soon as an `add` operand
/// isn't itself an instruction continuing the tree.
fn extend(module: &Module, inst: InstId, add_group: &mut Vec<InstId>, leaves: &mut Vec<InstId>) -> bool {
    let Opcode::IBin(op) = module.inst(inst).opcode else { return false };
    match op {
        IBinOp::Add => {
            add_group.push(inst);
            let operands = module.inst(inst).operands.clone();
            for opnd in operands {
                let ValueKind::Inst(sub) = module.value(opnd).kind else { return false };
                if !extend(module, sub, add_group, leaves) {
                    return false;
                }
            }
            true
        }
        IBinOp::Mul | IBinOp::SDiv | IBinOp::SRem => {
            leaves.push(inst);
            true
        }
        _ => false,
    }
}

/// Checks that every leaf shares the same binary op and a common operand,
/// returning `(op, common_operand, other_operands)` on success. `mul`
/// leaves may share the common operand on either side (commutative);
/// `sdiv`/`srem` must share it on the right.
fn check_leaves(module: &Module, leaves: &[InstId]) -> Option<(IBinOp, ValueId, Vec<ValueId>)> {
    if leaves.len() < 2 {
        return None;
    }
    let Opcode::IBin(op0) = module.inst(leaves[0]).opcode else { return None };
    let Opcode::IBin(op1) = module.inst(leaves[1]).opcode else { return None };
    if op0 != op1 {
        return None;
    }
    let commutative = op0 == IBinOp::Mul;

    let (l0a, l0b) = {
        let ops = &module.inst(leaves[0]).operands;
        (ops[0], ops[1])
    };
    let (l1a, l1b) = {
        let ops = &module.inst(leaves[1]).operands;
        (ops[0], ops[1])
    };

    let (common_op, mut sources) = if commutative {
        if l0a == l1a {
            (l0a, vec![l0b, l1b])
        } else if l0a == l1b {
            (l0a, vec![l0b, l1a])
        } else if l0b == l1a {
            (l0b, vec![l0a, l1b])
        } else if l0b == l1b {
            (l0b, vec![l0a, l1a])
        } else {
            return None;
        }
    } else {
        if l0b != l1b {
            return None;
        }
        (l0b, vec![l0a, l1a])
    };

    for &leaf in &leaves[2..] {
        let Opcode::IBin(op) = module.inst(leaf).opcode else { return None };
        if op != op0 {
            return None;
        }
        let (a, b) = {
            let ops = &module.inst(leaf).operands;
            (ops[0], ops[1])
        };
        if b == common_op {
            sources.push(a);
        } else if commutative && a == common_op {
            sources.push(b);
        } else {
            return None;
        }
    }
    Some((op0, common_op, sources))
}

fn algebraic_combine(module: &mut Module, f: FuncId) -> bool {
    let mut marked: FxHashSet<InstId> = FxHashSet::default();
    let mut changed = false;
    for bb in module.func(f).blocks().to_vec() {
        for inst in module.block(bb).insts().to_vec().into_iter().rev() {
            if marked.contains(&inst) {
                continue;
            }
            let mut add_group = Vec::new();
            let mut leaves = Vec::new();
            if !extend(module, inst, &mut add_group, &mut leaves) || add_group.is_empty() {
                continue;
            }
            let Some((binop, common_op, sources)) = check_leaves(module, &leaves) else { continue };

            let ty = module.value_type(module.inst(inst).result.expect("add tree root has a result"));
            let mut acc = sources[0];
            for &src in &sources[1..] {
                let add = module.insert_inst_before(inst, Opcode::IBin(IBinOp::Add), smallvec::smallvec![acc, src], Some(ty));
                acc = module.inst(add).result.unwrap();
            }
            let factored = module.insert_inst_before(inst, Opcode::IBin(binop), smallvec::smallvec![acc, common_op], Some(ty));
            let factored_val = module.inst(factored).result.unwrap();
            let old_result = module.inst(inst).result.unwrap();
            module.replace_all_uses_with(old_result, factored_val);

            marked.extend(add_group.iter().copied());
            marked.extend(leaves.iter().copied());
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn folds_chain_of_constant_adds() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("f", i32_ty, vec![i32_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let x = m.func(f).args[0];
        let one = m.const_int(32, 1);
        let step1 = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![x, one], Some(i32_ty));
        let step1_val = m.inst(step1).result.unwrap();
        let two = m.const_int(32, 2);
        let step2 = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![step1_val, two], Some(i32_ty));
        let step2_val = m.inst(step2).result.unwrap();
        m.append_inst(entry, Opcode::Ret, smallvec![step2_val], None);

        let mut mgr = PassManager::new();
        let changed = StrengthReduce::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        let ops = &m.inst(step2).operands;
        assert_eq!(ops[0], x, "chain should collapse back to the original base value");
        assert_eq!(m.value(ops[1]).kind.as_const_int(), Some(3), "constants along the chain should sum");
    }

    #[test]
    fn factors_shared_multiplicand_out_of_add_tree() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("f", i32_ty, vec![i32_ty, i32_ty, i32_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let a = m.func(f).args[0];
        let b = m.func(f).args[1];
        let c = m.func(f).args[2];
        let am = m.append_inst(entry, Opcode::IBin(IBinOp::Mul), smallvec![a, c], Some(i32_ty));
        let am_val = m.inst(am).result.unwrap();
        let bm = m.append_inst(entry, Opcode::IBin(IBinOp::Mul), smallvec![b, c], Some(i32_ty));
        let bm_val = m.inst(bm).result.unwrap();
        let sum = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![am_val, bm_val], Some(i32_ty));
        let sum_val = m.inst(sum).result.unwrap();
        m.append_inst(entry, Opcode::Ret, smallvec![sum_val], None);

        let mut mgr = PassManager::new();
        let changed = StrengthReduce::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        let ret = m.block(entry).terminator().unwrap();
        let ret_val = m.inst(ret).operands[0];
        let ValueKind::Inst(final_mul) = m.value(ret_val).kind else { panic!("expected an instruction result") };
        assert_eq!(m.inst(final_mul).opcode, Opcode::IBin(IBinOp::Mul));
        assert_eq!(m.inst(final_mul).operands[1], c, "factored multiply should carry the common operand");
    }
}
