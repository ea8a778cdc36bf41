//! φ-combining (§4.13), grounded in `transform/phi_combine.cc`. A narrower
//! cousin of [`crate::control_flow::ControlFlow`]'s block merging: where
//! that pass folds a predecessor wholesale, this one only folds a
//! predecessor that is *itself* nothing but φ-instructions feeding the
//! successor's own φs, one per (block, predecessor) pair, to a fixed
//! point.
//!
//! Mem2reg can leave exactly this shape behind — a block whose sole job is
//! routing values into another block's φs — once the values it routes
//! turn out to already be φs of the very predecessor being folded.

use rustc_hash::FxHashMap;

use sysy_ir_analysis::{Pass, PassManager};
use sysy_ir_core::{BlockId, FuncId, InstId, Module, ValueId};

use crate::transform::{PassResult, Transform};

pub struct PhiCombine;

impl Transform for PhiCombine {
    fn name() -> &'static str {
        "phi_combine"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            changed |= handle_func(module, f);
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for PhiCombine {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }
}

fn handle_func(module: &mut Module, f: FuncId) -> bool {
    let mut changed = false;
    loop {
        let mut combined = false;
        'search: for &bb in &module.func(f).blocks().to_vec() {
            for pre_bb in module.block(bb).predecessors().to_vec() {
                if try_combine(module, f, bb, pre_bb) {
                    combined = true;
                    changed = true;
                    break 'search;
                }
            }
        }
        if !combined {
            break;
        }
    }
    changed
}

/// Folds `pre_bb` into `bb` when `pre_bb` consists of nothing but
/// φ-instructions used only by `bb`'s own φs, plus a terminator. Splices
/// each such value's incoming pairs directly into `bb`'s φs (duplicated
/// per `pre_bb`'s own predecessor when the incoming value passes through
/// `pre_bb` without itself being one of its φs), then redirects `pre_bb`'s
/// predecessors straight at `bb` and deletes it.
fn try_combine(module: &mut Module, f: FuncId, bb: BlockId, pre_bb: BlockId) -> bool {
    let phis: Vec<InstId> = module.block(bb).insts().iter().copied().take_while(|&i| module.inst(i).is_phi()).collect();
    let pre_phis: Vec<InstId> = module.block(pre_bb).insts().iter().copied().take_while(|&i| module.inst(i).is_phi()).collect();

    for &pre_phi in &pre_phis {
        let result = module.inst(pre_phi).result.expect("phi always has a result");
        if module.uses_of(result).iter().any(|u| !phis.contains(&u.user)) {
            return false;
        }
    }

    if phis.is_empty() || pre_phis.is_empty() {
        return false;
    }
    if pre_phis.len() + 1 != module.block(pre_bb).insts().len() {
        // pre_bb has content beyond its φs and terminator.
        return false;
    }

    let pre_phi_by_result: FxHashMap<ValueId, InstId> = pre_phis.iter().map(|&p| (module.inst(p).result.unwrap(), p)).collect();
    let pre_bb_val = module.block(pre_bb).value_id;
    let pre_pre_bbs: Vec<BlockId> = module.block(pre_bb).predecessors().to_vec();

    for &phi in &phis {
        let pairs: Vec<(ValueId, ValueId)> = module.inst(phi).phi_pairs().collect();
        let mut new_pairs: Vec<(ValueId, ValueId)> = Vec::new();
        for (value, block_val) in pairs {
            if let Some(&src_phi) = pre_phi_by_result.get(&value) {
                new_pairs.extend(module.inst(src_phi).phi_pairs());
            } else if block_val != pre_bb_val {
                new_pairs.push((value, block_val));
            } else {
                for &pre_pre in &pre_pre_bbs {
                    new_pairs.push((value, module.block(pre_pre).value_id));
                }
            }
        }

        let ty = module.value_type(module.inst(phi).result.unwrap());
        let new_phi = module.insert_inst_before(phi, sysy_ir_core::instruction::Opcode::Phi, smallvec::smallvec![], Some(ty));
        for (value, block_val) in new_pairs {
            module.push_phi_operand(new_phi, value, block_val);
        }
        let old_result = module.inst(phi).result.unwrap();
        let new_result = module.inst(new_phi).result.unwrap();
        module.replace_all_uses_with(old_result, new_result);
        module.erase_inst(phi);
    }

    let bb_val = module.block(bb).value_id;
    for &pre_pre in &pre_pre_bbs {
        let term = module.block(pre_pre).terminator().expect("every block ends in a terminator");
        let ops = module.inst(term).operands.clone();
        for (idx, &op) in ops.iter().enumerate() {
            if op == pre_bb_val {
                module.set_operand(term, idx, bb_val);
            }
        }
    }

    module.remove_block(f, pre_bb);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use sysy_ir_core::instruction::Opcode;

    #[test]
    fn folds_pure_routing_predecessor_into_successor_phis() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let bool_ty = m.types.i1();
        let f = m.declare_function("f", i32_ty, vec![i32_ty, i32_ty, bool_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let a_bb = m.create_block(f, "a");
        let b_bb = m.create_block(f, "b");
        let routing = m.create_block(f, "routing");
        let join = m.create_block(f, "join");

        let x = m.func(f).args[0];
        let y = m.func(f).args[1];
        let cond = m.func(f).args[2];
        m.append_inst(entry, Opcode::Br, smallvec![cond, m.block(a_bb).value_id, m.block(b_bb).value_id], None);
        m.append_inst(a_bb, Opcode::Br, smallvec![m.block(routing).value_id], None);
        m.append_inst(b_bb, Opcode::Br, smallvec![m.block(routing).value_id], None);

        // `routing` is purely a phi that re-routes x/y into `join`'s own phi.
        let routing_phi = m.prepend_inst(routing, Opcode::Phi, smallvec![], Some(i32_ty));
        m.push_phi_operand(routing_phi, x, m.block(a_bb).value_id);
        m.push_phi_operand(routing_phi, y, m.block(b_bb).value_id);
        let routing_val = m.inst(routing_phi).result.unwrap();
        m.append_inst(routing, Opcode::Br, smallvec![m.block(join).value_id], None);

        let join_phi = m.prepend_inst(join, Opcode::Phi, smallvec![], Some(i32_ty));
        m.push_phi_operand(join_phi, routing_val, m.block(routing).value_id);
        let join_val = m.inst(join_phi).result.unwrap();
        m.append_inst(join, Opcode::Ret, smallvec![join_val], None);

        let mut mgr = PassManager::new();
        let changed = PhiCombine::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        assert!(!m.func(f).blocks().contains(&routing), "routing should be folded away");
        let join_phi_after = m.block(join).insts()[0];
        assert!(m.inst(join_phi_after).is_phi());
        let pairs: Vec<(ValueId, ValueId)> = m.inst(join_phi_after).phi_pairs().collect();
        assert_eq!(pairs.len(), 2, "join's phi should directly carry a and b's incoming edges now");
        assert!(pairs.iter().any(|&(v, b)| v == x && b == m.block(a_bb).value_id));
        assert!(pairs.iter().any(|&(v, b)| v == y && b == m.block(b_bb).value_id));
    }
}
