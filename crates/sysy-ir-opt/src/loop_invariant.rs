//! Loop-invariant code motion (§4.10), grounded in
//! `transform/loop_invariant.cc`. Each loop gets a guaranteed preheader
//! (see [`crate::loop_utils::ensure_preheader`]) before hoisting starts.

use sysy_ir_analysis::{AnalysisUsage, LoopFind, LoopFindResult, LoopInfo, Pass, PassManager};
use sysy_ir_core::instruction::Opcode;
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{FuncId, InstId, Module, ValueId};

use crate::loop_utils::ensure_preheader;
use crate::transform::{PassResult, Transform};

pub struct LoopInvariant;

impl Transform for LoopInvariant {
    fn name() -> &'static str {
        "loop_invariant"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let loop_find: LoopFindResult = mgr.get::<LoopFind>(module).clone();
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            let Some(func_loops) = loop_find.per_func.get(&f) else { continue };
            for header in func_loops.topo_order() {
                let loop_info = func_loops.loops[&header].clone();
                changed |= handle_loop(module, f, &loop_info);
            }
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for LoopInvariant {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_require::<LoopFind>();
    }
}

fn is_side_effect_inst(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::Load | Opcode::Store | Opcode::Call | Opcode::Ret | Opcode::Br | Opcode::Phi)
}

fn is_invariant_operand(module: &Module, operand: ValueId, loop_info: &LoopInfo) -> bool {
    match module.value(operand).kind {
        ValueKind::Inst(op_inst) => !loop_info.bbs.contains(&module.inst(op_inst).parent),
        _ => true,
    }
}

fn collect_invariant_insts(module: &Module, loop_info: &LoopInfo) -> Vec<InstId> {
    let mut ret = Vec::new();
    for &bb in &loop_info.bbs {
        for &inst_id in module.block(bb).insts() {
            let inst = module.inst(inst_id);
            if is_side_effect_inst(inst.opcode) {
                continue;
            }
            if inst.operands.iter().all(|&op| is_invariant_operand(module, op, loop_info)) {
                ret.push(inst_id);
            }
        }
    }
    ret
}

fn handle_loop(module: &mut Module, f: FuncId, loop_info: &LoopInfo) -> bool {
    let preheader = ensure_preheader(module, f, loop_info);
    let mut changed = false;
    loop {
        let insts = collect_invariant_insts(module, loop_info);
        if insts.is_empty() {
            break;
        }
        let terminator = *module.block(preheader).insts().last().expect("preheader always ends in a branch to the header");
        for inst in insts {
            module.move_inst_before(inst, terminator);
        }
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use sysy_ir_core::instruction::{IBinOp, ICmpOp};

    #[test]
    fn hoists_invariant_computation_out_of_loop_body() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("f", i32_ty, vec![i32_ty, i32_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let header = m.create_block(f, "header");
        let body = m.create_block(f, "body");
        let exit = m.create_block(f, "exit");

        let n = m.func(f).args[0];
        let k = m.func(f).args[1];
        let zero = m.const_int(32, 0);
        m.append_inst(entry, Opcode::Br, smallvec![m.block(header).value_id], None);

        let i_phi = m.prepend_inst(header, Opcode::Phi, smallvec![], Some(i32_ty));
        m.push_phi_operand(i_phi, zero, m.block(entry).value_id);
        let i_val = m.inst(i_phi).result.unwrap();
        let cmp = m.append_inst(header, Opcode::ICmp(ICmpOp::Lt), smallvec![i_val, n], Some(m.types.i1()));
        let cmp_val = m.inst(cmp).result.unwrap();
        m.append_inst(header, Opcode::Br, smallvec![cmp_val, m.block(body).value_id, m.block(exit).value_id], None);

        // invariant: k*2 does not depend on the induction variable.
        let two = m.const_int(32, 2);
        let invariant_mul = m.append_inst(body, Opcode::IBin(IBinOp::Mul), smallvec![k, two], Some(i32_ty));
        let invariant_val = m.inst(invariant_mul).result.unwrap();
        let one = m.const_int(32, 1);
        let next_i = m.append_inst(body, Opcode::IBin(IBinOp::Add), smallvec![i_val, one], Some(i32_ty));
        let next_i_val = m.inst(next_i).result.unwrap();
        m.append_inst(body, Opcode::Br, smallvec![m.block(header).value_id], None);
        m.push_phi_operand(i_phi, next_i_val, m.block(body).value_id);

        m.append_inst(exit, Opcode::Ret, smallvec![invariant_val], None);

        let mut mgr = PassManager::new();
        let changed = LoopInvariant::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        assert!(!m.block(body).insts().contains(&invariant_mul), "invariant mul should have left the loop body");
    }
}
