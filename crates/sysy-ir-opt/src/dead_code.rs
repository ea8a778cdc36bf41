//! Dead-code elimination (§4.7), grounded in `transform/dead_code.cc` —
//! the fuller of the two versions the original carries (`DeadCode.cc` is
//! an older file with neither the store-dead refinement nor the global
//! sweep; it has no counterpart here, see `DESIGN.md`).
//!
//! Mark-sweep per function: every `ret`/`br`, every `store` not proven
//! dead by [`collect_store_not_critical`], and every call to a function
//! not known pure, is a critical root. Marking walks backward from the
//! roots through operand edges; anything never reached is dead. A final
//! module-level sweep removes functions and globals with no remaining
//! uses, except `main`.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use sysy_ir_analysis::{AnalysisUsage, FuncInfo, FuncInfoResult, Pass, PassManager};
use sysy_ir_core::instruction::Opcode;
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{FuncId, GlobalId, InstId, Module};

use crate::transform::{PassResult, Transform};

pub struct DeadCode;

impl Transform for DeadCode {
    fn name() -> &'static str {
        "dead_code"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let func_info: FuncInfoResult = mgr.get::<FuncInfo>(module).clone();
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            changed |= mark_sweep(module, f, &func_info);
        }
        changed |= sweep_globally(module);
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for DeadCode {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_require::<FuncInfo>();
    }
}

fn mark_sweep(module: &mut Module, f: FuncId, func_info: &FuncInfoResult) -> bool {
    let store_not_critical = collect_store_not_critical(module, f);

    let mut marked: FxHashSet<InstId> = FxHashSet::default();
    let mut work_list: VecDeque<InstId> = VecDeque::new();
    for &bb in module.func(f).blocks() {
        for &inst_id in module.block(bb).insts() {
            if is_critical(module, inst_id, func_info, &store_not_critical) {
                marked.insert(inst_id);
                work_list.push_back(inst_id);
            }
        }
    }

    while let Some(inst_id) = work_list.pop_front() {
        let operands = module.inst(inst_id).operands.clone();
        for operand in operands {
            if let ValueKind::Inst(op_inst) = module.value(operand).kind {
                if marked.insert(op_inst) {
                    work_list.push_back(op_inst);
                }
            }
        }
    }

    let mut dead: Vec<InstId> = Vec::new();
    for &bb in module.func(f).blocks() {
        for &inst_id in module.block(bb).insts() {
            if !marked.contains(&inst_id) {
                dead.push(inst_id);
            }
        }
    }
    let changed = !dead.is_empty();
    module.erase_dead_insts(&dead);
    changed
}

fn is_critical(module: &Module, inst_id: InstId, func_info: &FuncInfoResult, store_not_critical: &FxHashSet<InstId>) -> bool {
    let inst = module.inst(inst_id);
    match inst.opcode {
        Opcode::Ret | Opcode::Br => true,
        Opcode::Store => !store_not_critical.contains(&inst_id),
        Opcode::Call => match module.value(inst.operands[0]).kind {
            ValueKind::Function(callee) => !func_info.is_pure(callee),
            _ => true,
        },
        _ => false,
    }
}

/// A store into a non-scalar (array) alloca is provably dead when the
/// alloca never escapes except through stores and through GEPs that are
/// themselves only ever stored through — no load, no `ptrtoint`, no use
/// that could observe the write.
fn collect_store_not_critical(module: &Module, f: FuncId) -> FxHashSet<InstId> {
    let mut store_not_critical = FxHashSet::default();
    for &bb in module.func(f).blocks() {
        for &inst_id in module.block(bb).insts() {
            let inst = module.inst(inst_id);
            let Opcode::Alloca(_) = inst.opcode else { continue };
            let Some(alloca_result) = inst.result else { continue };
            let elem_ty = module.types.pointee(module.value_type(alloca_result));
            if module.types.is_base_type(elem_ty) {
                continue;
            }

            let mut alloca_is_critical = false;
            let mut related_store: FxHashSet<InstId> = FxHashSet::default();
            for u in module.uses_of(alloca_result) {
                let user = u.user;
                match module.inst(user).opcode {
                    Opcode::Store => {
                        related_store.insert(user);
                    }
                    Opcode::PtrToInt => {
                        alloca_is_critical = true;
                    }
                    Opcode::GetElementPtr => {
                        let gep_result = module.inst(user).result.unwrap();
                        for gu in module.uses_of(gep_result) {
                            match module.inst(gu.user).opcode {
                                Opcode::Store => {
                                    related_store.insert(gu.user);
                                }
                                _ => {
                                    alloca_is_critical = true;
                                    break;
                                }
                            }
                        }
                    }
                    _ => {}
                }
                if alloca_is_critical {
                    break;
                }
            }

            if !alloca_is_critical {
                store_not_critical.extend(related_store);
            }
        }
    }
    store_not_critical
}

fn sweep_globally(module: &mut Module) -> bool {
    let main = module.main();
    let unused_funcs: Vec<FuncId> = module
        .functions()
        .filter(|&f| !module.func(f).is_external)
        .filter(|&f| Some(f) != main)
        .filter(|&f| module.uses_of(module.func(f).value_id).is_empty())
        .collect();
    let unused_globals: Vec<GlobalId> = module
        .globals()
        .filter(|&g| module.uses_of(module.global(g).value_id).is_empty())
        .collect();

    let changed = !unused_funcs.is_empty() || !unused_globals.is_empty();
    for f in unused_funcs {
        module.remove_function(f);
    }
    for g in unused_globals {
        module.remove_global(g);
    }
    changed
}
