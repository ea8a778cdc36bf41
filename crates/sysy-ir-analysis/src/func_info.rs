//! Pure-function detection (§4.5), grounded in `analysis/func_info.cc`.
//! A function is provisionally "maybe pure" if it contains no load from
//! a non-local address, no store to a non-local address, and no call —
//! then impurity propagates backward through the call graph until a
//! fixed point: a function that calls an impure function is impure too.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use sysy_ir_core::instruction::Opcode;
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{FuncId, Module, ValueId};

use crate::pass::{Analysis, PassManager};

#[derive(Default, Clone)]
pub struct FuncInfoResult {
    pub pure_functions: FxHashSet<FuncId>,
    pub callers: FxHashMap<FuncId, FxHashSet<FuncId>>,
}

impl FuncInfoResult {
    pub fn is_pure(&self, f: FuncId) -> bool {
        self.pure_functions.contains(&f)
    }
}

pub struct FuncInfo;

impl Analysis for FuncInfo {
    type Result = FuncInfoResult;

    fn run(module: &Module, _mgr: &mut PassManager) -> Self::Result {
        let mut result = FuncInfoResult::default();
        let mut callee_pure_queue: VecDeque<FuncId> = VecDeque::new();

        for f in module.functions() {
            result.callers.entry(f).or_default();
        }
        for f in module.functions() {
            for &bb in module.func(f).blocks() {
                for &inst_id in module.block(bb).insts() {
                    let inst = module.inst(inst_id);
                    if matches!(inst.opcode, Opcode::Call) {
                        if let ValueKind::Function(callee) = module.value(inst.operands[0]).kind {
                            result.callers.entry(callee).or_default().insert(f);
                        }
                    }
                }
            }
        }

        for f in module.functions() {
            if maybe_pure(module, f, &mut callee_pure_queue) {
                result.pure_functions.insert(f);
            }
        }

        while let Some(callee) = callee_pure_queue.pop_front() {
            if result.is_pure(callee) {
                continue;
            }
            let callers = result.callers.get(&callee).cloned().unwrap_or_default();
            for caller in callers {
                if result.is_pure(caller) {
                    result.pure_functions.remove(&caller);
                    callee_pure_queue.push_back(caller);
                }
            }
        }

        result
    }
}

impl crate::pass::Pass for FuncInfo {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> crate::pass::PassResult<bool> {
        mgr.get::<FuncInfo>(module);
        Ok(false)
    }

    fn analysis_usage(au: &mut crate::pass::AnalysisUsage) {
        au.set_kill_type(crate::pass::KillType::None);
    }

    fn always_invalid() -> bool {
        false
    }

    fn is_analysis() -> bool {
        true
    }
}

fn maybe_pure(module: &Module, f: FuncId, callee_pure_queue: &mut VecDeque<FuncId>) -> bool {
    let data = module.func(f);
    if data.is_external || data.is_main() {
        return false;
    }
    for &bb in data.blocks() {
        for &inst_id in module.block(bb).insts() {
            if is_side_effect_inst(module, inst_id, callee_pure_queue) {
                return false;
            }
        }
    }
    true
}

/// This only looks at an instruction's immediate operands, so it can be
/// conservative before mem2reg/DCE have run — an address that later turns
/// out unreachable is still counted as a potential side effect here.
fn is_side_effect_inst(module: &Module, inst_id: sysy_ir_core::InstId, callee_pure_queue: &mut VecDeque<FuncId>) -> bool {
    let inst = module.inst(inst_id);
    let addr = match inst.opcode {
        Opcode::Load => Some(get_origin_addr(module, inst.operands[0])),
        Opcode::Store => Some(get_origin_addr(module, inst.operands[1])),
        Opcode::Call => {
            if let ValueKind::Function(callee) = module.value(inst.operands[0]).kind {
                if !callee_pure_queue.contains(&callee) {
                    callee_pure_queue.push_back(callee);
                }
            }
            return false;
        }
        _ => return false,
    };
    match addr.map(|a| module.value(a).kind.clone()) {
        Some(ValueKind::Inst(defining_inst)) => !matches!(module.inst(defining_inst).opcode, Opcode::Alloca(_)),
        _ => true,
    }
}

/// Walks a chain of `getelementptr`s back to the address it ultimately
/// indexes into: an alloca, an argument, or a global.
fn get_origin_addr(module: &Module, addr: ValueId) -> ValueId {
    match module.value(addr).kind {
        ValueKind::Inst(inst_id) if matches!(module.inst(inst_id).opcode, Opcode::GetElementPtr) => {
            get_origin_addr(module, module.inst(inst_id).operands[0])
        }
        _ => addr,
    }
}
