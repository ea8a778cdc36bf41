//! Sparse conditional constant folding (§4.15), grounded in
//! `transform/const_propagate.cc`. Narrower than the algebraic simplifier
//! (§4.8): a candidate's operands must *all* already be constant (directly
//! or via a prior fold in this same pass), not merely match a structural
//! pattern.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use sysy_ir_analysis::{AnalysisUsage, Pass, PassManager};
use sysy_ir_core::instruction::{IBinOp, Opcode};
use sysy_ir_core::types::Type;
use sysy_ir_core::{FuncId, InstId, Module, ValueId};

use crate::dead_code::DeadCode;
use crate::transform::{PassResult, Transform};

pub struct ConstPropagate;

impl Transform for ConstPropagate {
    fn name() -> &'static str {
        "const_propagate"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            changed |= run_on_function(module, f);
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for ConstPropagate {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_post::<DeadCode>();
    }
}

fn run_on_function(module: &mut Module, f: FuncId) -> bool {
    let mut val2const: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    let mut done: FxHashSet<InstId> = FxHashSet::default();
    let mut work_list: VecDeque<InstId> = VecDeque::new();

    for &bb in module.func(f).blocks().to_vec().iter() {
        for &inst_id in module.block(bb).insts().to_vec().iter() {
            if is_ready(module, inst_id, &val2const) {
                let c = fold(module, inst_id, &val2const);
                let result = module.inst(inst_id).result.unwrap();
                val2const.insert(result, c);
                work_list.push_back(inst_id);
            }
        }
    }

    let mut changed = false;
    while let Some(inst_id) = work_list.pop_front() {
        if done.contains(&inst_id) || !is_ready(module, inst_id, &val2const) {
            continue;
        }
        let result = module.inst(inst_id).result.unwrap();
        let c = match val2const.get(&result) {
            Some(&c) => c,
            None => {
                let c = fold(module, inst_id, &val2const);
                val2const.insert(result, c);
                c
            }
        };
        let users: Vec<InstId> = module.uses_of(result).iter().map(|u| u.user).collect();
        work_list.extend(users);
        module.replace_all_uses_with(result, c);
        done.insert(inst_id);
        changed = true;
    }
    changed
}

fn resolved_const(module: &Module, val2const: &FxHashMap<ValueId, ValueId>, v: ValueId) -> Option<ValueId> {
    if module.value(v).kind.is_constant() {
        Some(v)
    } else {
        val2const.get(&v).copied()
    }
}

fn is_ready(module: &Module, inst_id: InstId, val2const: &FxHashMap<ValueId, ValueId>) -> bool {
    let inst = module.inst(inst_id);
    match inst.opcode {
        Opcode::Phi => {
            let mut pairs = inst.phi_pairs();
            let Some((first, _)) = pairs.next() else { return false };
            let Some(unique) = resolved_const(module, val2const, first) else { return false };
            for (value, _) in pairs {
                if resolved_const(module, val2const, value) != Some(unique) {
                    return false;
                }
            }
            true
        }
        Opcode::IBin(op) => {
            let lhs = resolved_const(module, val2const, inst.operands[0]);
            let rhs = resolved_const(module, val2const, inst.operands[1]);
            let (Some(_), Some(rhs)) = (lhs, rhs) else { return false };
            if matches!(op, IBinOp::SDiv | IBinOp::SRem) {
                module.value(rhs).kind.as_const_int() != Some(0)
            } else {
                true
            }
        }
        Opcode::FBin(_) | Opcode::ICmp(_) | Opcode::FCmp(_) => {
            resolved_const(module, val2const, inst.operands[0]).is_some() && resolved_const(module, val2const, inst.operands[1]).is_some()
        }
        Opcode::SIToFP | Opcode::FPToSI | Opcode::Zext | Opcode::Sext => resolved_const(module, val2const, inst.operands[0]).is_some(),
        _ => false,
    }
}

fn get_cint(module: &mut Module, is_i64: bool, v: i64) -> ValueId {
    if is_i64 {
        module.const_i64(v)
    } else {
        module.const_int(32, v)
    }
}

fn fold(module: &mut Module, inst_id: InstId, val2const: &FxHashMap<ValueId, ValueId>) -> ValueId {
    let inst = module.inst(inst_id).clone();
    let result_ty = module.value_type(inst.result.unwrap());
    let is_i64 = module.types.get(result_ty) == Type::I64;

    match inst.opcode {
        Opcode::Phi => {
            let (first, _) = inst.phi_pairs().next().unwrap();
            resolved_const(module, val2const, first).unwrap()
        }
        Opcode::IBin(op) => {
            let lhs = resolved_const(module, val2const, inst.operands[0]).unwrap();
            let rhs = resolved_const(module, val2const, inst.operands[1]).unwrap();
            let l = module.value(lhs).kind.as_const_int().unwrap();
            let r = module.value(rhs).kind.as_const_int().unwrap();
            if op == IBinOp::Xor {
                module.const_bool((l ^ r) != 0)
            } else {
                let v = op.eval(l, r).unwrap();
                get_cint(module, is_i64, v)
            }
        }
        Opcode::FBin(op) => {
            let lhs = resolved_const(module, val2const, inst.operands[0]).unwrap();
            let rhs = resolved_const(module, val2const, inst.operands[1]).unwrap();
            let l = module.value(lhs).kind.as_const_float().unwrap();
            let r = module.value(rhs).kind.as_const_float().unwrap();
            module.const_float(op.eval(l, r))
        }
        Opcode::ICmp(op) => {
            let lhs = resolved_const(module, val2const, inst.operands[0]).unwrap();
            let rhs = resolved_const(module, val2const, inst.operands[1]).unwrap();
            let l = module.value(lhs).kind.as_const_int().unwrap();
            let r = module.value(rhs).kind.as_const_int().unwrap();
            module.const_bool(op.eval(l, r))
        }
        Opcode::FCmp(op) => {
            let lhs = resolved_const(module, val2const, inst.operands[0]).unwrap();
            let rhs = resolved_const(module, val2const, inst.operands[1]).unwrap();
            let l = module.value(lhs).kind.as_const_float().unwrap();
            let r = module.value(rhs).kind.as_const_float().unwrap();
            module.const_bool(op.eval(l, r))
        }
        Opcode::FPToSI => {
            let v = resolved_const(module, val2const, inst.operands[0]).unwrap();
            let f = module.value(v).kind.as_const_float().unwrap();
            module.const_int(32, f as i32 as i64)
        }
        Opcode::SIToFP => {
            let v = resolved_const(module, val2const, inst.operands[0]).unwrap();
            let i = module.value(v).kind.as_const_int().unwrap();
            module.const_float(i as f32)
        }
        Opcode::Zext => {
            let v = resolved_const(module, val2const, inst.operands[0]).unwrap();
            let i = module.value(v).kind.as_const_int().unwrap();
            module.const_int(32, i)
        }
        Opcode::Sext => {
            let v = resolved_const(module, val2const, inst.operands[0]).unwrap();
            let i = module.value(v).kind.as_const_int().unwrap();
            module.const_i64(i)
        }
        _ => unreachable!("non-candidate instruction reached fold()"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn fresh_manager() -> PassManager {
        PassManager::new()
    }

    #[test]
    fn folds_add_chain() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("f", i32_ty, vec![], false).unwrap();
        let entry = m.create_block(f, "entry");
        let one = m.const_int(32, 1);
        let two = m.const_int(32, 2);
        let add1 = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![one, two], Some(i32_ty));
        let add1_val = m.inst(add1).result.unwrap();
        let three = m.const_int(32, 3);
        let add2 = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![add1_val, three], Some(i32_ty));
        let add2_val = m.inst(add2).result.unwrap();
        m.append_inst(entry, Opcode::Ret, smallvec![add2_val], None);

        let mut mgr = fresh_manager();
        let changed = ConstPropagate::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        let ret = *m.block(entry).insts().last().unwrap();
        let folded = m.inst(ret).operands[0];
        assert_eq!(m.value(folded).kind.as_const_int(), Some(6));
    }

    #[test]
    fn leaves_non_constant_inputs_alone() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("f", i32_ty, vec![i32_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let arg = m.func(f).args[0];
        let one = m.const_int(32, 1);
        let add = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![arg, one], Some(i32_ty));
        let add_val = m.inst(add).result.unwrap();
        m.append_inst(entry, Opcode::Ret, smallvec![add_val], None);

        let mut mgr = fresh_manager();
        let changed = ConstPropagate::run(&mut m, &mut mgr).unwrap();
        assert!(!changed);
    }
}
