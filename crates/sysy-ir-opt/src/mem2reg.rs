//! Promotes scalar stack slots to SSA values (§4.6), grounded in
//! `transform/mem2reg.cc`: iterated-dominance-frontier phi placement
//! followed by a dominator-tree preorder renaming pass with one value
//! stack per promoted address.
//!
//! The original's micro-optimization that restricts phi placement to
//! addresses with at least one *load* (its confusingly-named `globals`
//! set) is dropped here — it is a pruning heuristic, not a correctness
//! requirement: an address that is only ever stored to and never loaded
//! gets phis nobody will read, which later dead-code elimination removes
//! anyway.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use sysy_ir_analysis::{AnalysisUsage, Dominator, DominatorResult, Pass, PassManager};
use sysy_ir_core::instruction::Opcode;
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{BlockId, FuncId, InstId, Module, ValueId};

use crate::transform::{PassResult, Transform};

pub struct Mem2Reg;

impl Transform for Mem2Reg {
    fn name() -> &'static str {
        "mem2reg"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let dom: DominatorResult = mgr.get::<Dominator>(module).clone();
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).blocks().is_empty() {
                continue;
            }
            let mut phi_lval: FxHashMap<InstId, ValueId> = FxHashMap::default();
            let inserted_any = generate_phi(module, f, &dom, &mut phi_lval);
            changed |= inserted_any;
            let entry = module.func(f).entry_block().unwrap();
            let mut var_new_name: FxHashMap<ValueId, Vec<ValueId>> = FxHashMap::default();
            let erased_any = rename(module, entry, &dom, &phi_lval, &mut var_new_name);
            changed |= erased_any;
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for Mem2Reg {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_require::<Dominator>();
    }
}

/// A store/load target is promotable when it is neither a global variable
/// nor the result of a `getelementptr` — i.e. it addresses a whole scalar
/// slot directly (an `alloca` result or a scalar argument), not an array
/// element or a module-level global (those are `global_localize`'s job).
fn is_promotable_address(module: &Module, addr: ValueId) -> bool {
    match &module.value(addr).kind {
        ValueKind::Global(_) => false,
        ValueKind::Inst(inst_id) => !matches!(module.inst(*inst_id).opcode, Opcode::GetElementPtr),
        _ => true,
    }
}

fn generate_phi(module: &mut Module, f: FuncId, dom: &DominatorResult, phi_lval: &mut FxHashMap<InstId, ValueId>) -> bool {
    let mut blocks: FxHashMap<ValueId, FxHashSet<BlockId>> = FxHashMap::default();
    for &bb in module.func(f).blocks().to_vec().iter() {
        for &inst_id in module.block(bb).insts().to_vec().iter() {
            let inst = module.inst(inst_id);
            if !matches!(inst.opcode, Opcode::Store) {
                continue;
            }
            let val = inst.operands[0];
            let addr = inst.operands[1];
            if is_promotable_address(module, addr) && module.types.is_base_type(module.value_type(val)) {
                blocks.entry(addr).or_default().insert(bb);
            }
        }
    }

    let mut phi_table: FxHashSet<(ValueId, BlockId)> = FxHashSet::default();
    let mut inserted_any = false;
    for (var, sites) in blocks {
        let mut work_list: Vec<BlockId> = sites.into_iter().collect();
        let mut i = 0;
        while i < work_list.len() {
            let bb = work_list[i];
            i += 1;
            let frontier: Vec<BlockId> = dom.dom_frontier.get(&bb).map(|s| s.iter().copied().collect()).unwrap_or_default();
            for df_bb in frontier {
                if phi_table.insert((var, df_bb)) {
                    let ptr_ty = module.value_type(var);
                    let elem_ty = module.types.pointee(ptr_ty);
                    let phi = module.prepend_inst(df_bb, Opcode::Phi, SmallVec::new(), Some(elem_ty));
                    phi_lval.insert(phi, var);
                    work_list.push(df_bb);
                    inserted_any = true;
                }
            }
        }
    }
    inserted_any
}

fn rename(
    module: &mut Module,
    bb: BlockId,
    dom: &DominatorResult,
    phi_lval: &FxHashMap<InstId, ValueId>,
    var_new_name: &mut FxHashMap<ValueId, Vec<ValueId>>,
) -> bool {
    let mut changed = false;
    let mut pushed: Vec<ValueId> = Vec::new();

    for &inst_id in module.block(bb).insts().to_vec().iter() {
        if !module.inst(inst_id).is_phi() {
            break;
        }
        if let Some(&var) = phi_lval.get(&inst_id) {
            let result = module.inst(inst_id).result.unwrap();
            var_new_name.entry(var).or_default().push(result);
            pushed.push(var);
        }
    }

    for &inst_id in module.block(bb).insts().to_vec().iter() {
        let (opcode, operands, result) = {
            let inst = module.inst(inst_id);
            (inst.opcode, inst.operands.clone(), inst.result)
        };
        match opcode {
            Opcode::Load => {
                let addr = operands[0];
                if is_promotable_address(module, addr) {
                    let result = result.unwrap();
                    let replacement = match var_new_name.get(&addr).and_then(|s| s.last().copied()) {
                        Some(v) => v,
                        None => {
                            let ty = module.value_type(result);
                            module.const_undef(ty)
                        }
                    };
                    module.replace_all_uses_with(result, replacement);
                    module.erase_inst(inst_id);
                    changed = true;
                }
            }
            Opcode::Store => {
                let val = operands[0];
                let addr = operands[1];
                if is_promotable_address(module, addr) && module.types.is_base_type(module.value_type(val)) {
                    var_new_name.entry(addr).or_default().push(val);
                    pushed.push(addr);
                    module.erase_inst(inst_id);
                    changed = true;
                }
            }
            _ => {}
        }
    }

    let bb_val = module.block(bb).value_id;
    for &succ in module.block(bb).successors().to_vec().iter() {
        for &inst_id in module.block(succ).insts().to_vec().iter() {
            if !module.inst(inst_id).is_phi() {
                break;
            }
            let Some(&var) = phi_lval.get(&inst_id) else { continue };
            let incoming = match var_new_name.get(&var).and_then(|s| s.last().copied()) {
                Some(v) => v,
                None => {
                    let result = module.inst(inst_id).result.unwrap();
                    let ty = module.value_type(result);
                    module.const_undef(ty)
                }
            };
            module.push_phi_operand(inst_id, incoming, bb_val);
        }
    }

    let children: Vec<BlockId> = dom
        .dom_tree_children
        .get(&bb)
        .map(|c| c.iter().copied().collect())
        .unwrap_or_default();
    for child in children {
        changed |= rename(module, child, dom, phi_lval, var_new_name);
    }

    for var in pushed {
        var_new_name.get_mut(&var).unwrap().pop();
    }

    changed
}
