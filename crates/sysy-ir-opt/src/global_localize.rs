//! Global-variable localization (§4.14), grounded in
//! `transform/global_localize.cc`. Two independent rewrites depending on
//! how a global is used:
//! - A scalar global touched only from `main` is sunk into an `alloca` at
//!   `main`'s entry (a later [`crate::mem2reg::Mem2Reg`] run then promotes
//!   it to SSA values).
//! - An array global that is never stored to anywhere has every constant-
//!   index load through it replaced by the corresponding initializer
//!   element (a later [`crate::const_propagate::ConstPropagate`] run then
//!   folds any arithmetic that becomes foldable as a result).

use sysy_ir_analysis::{AnalysisUsage, Pass, PassManager};
use sysy_ir_core::instruction::Opcode;
use sysy_ir_core::types::Type;
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{FuncId, GlobalId, InstId, Module, TypeInternId, ValueId};

use crate::const_propagate::ConstPropagate;
use crate::dead_code::DeadCode;
use crate::mem2reg::Mem2Reg;
use crate::transform::{PassResult, Transform};

pub struct GlobalLocalize;

enum Action {
    Skip,
    Sink,
    PropConst,
}

impl Transform for GlobalLocalize {
    fn name() -> &'static str {
        "global_localize"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let main = module.main();
        let globals: Vec<GlobalId> = module.globals().collect();
        let mut changed = false;
        for g in globals {
            match classify(module, g, main) {
                Action::Skip => continue,
                Action::Sink => {
                    sink(module, g);
                    changed = true;
                }
                Action::PropConst => {
                    prop_const(module, g);
                    changed = true;
                }
            }
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for GlobalLocalize {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_post::<Mem2Reg>();
        au.add_post::<ConstPropagate>();
        au.add_post::<DeadCode>();
    }
}

fn classify(module: &Module, g: GlobalId, main: Option<FuncId>) -> Action {
    let global = module.global(g);
    let value_id = global.value_id;
    if module.uses_of(value_id).is_empty() {
        return Action::Skip;
    }
    if module.types.is_base_type(global.elem_ty) {
        let Some(main) = main else { return Action::Skip };
        for u in module.uses_of(value_id) {
            let func = module.block(module.inst(u.user).parent).func;
            if func != main {
                return Action::Skip;
            }
        }
        Action::Sink
    } else if matches!(module.types.get(global.elem_ty), Type::Array(..)) {
        for u in module.uses_of(value_id) {
            let gep_result = module.inst(u.user).result.unwrap();
            for gu in module.uses_of(gep_result) {
                if !matches!(module.inst(gu.user).opcode, Opcode::Load) {
                    return Action::Skip;
                }
            }
        }
        Action::PropConst
    } else {
        unreachable!("global variable of a non-base, non-array type")
    }
}

fn sink(module: &mut Module, g: GlobalId) {
    let global = module.global(g).clone();
    let value_id = global.value_id;
    let first_user = module.uses_of(value_id)[0].user;
    let func = module.block(module.inst(first_user).parent).func;
    let entry = module.func(func).entry_block().unwrap();
    let ptr_ty = module.value_type(value_id);

    let entry_first = module.block(entry).insts().first().copied();
    let alloca = match entry_first {
        Some(before) => module.insert_inst_before(before, Opcode::Alloca(global.elem_ty), smallvec::smallvec![], Some(ptr_ty)),
        None => module.append_inst(entry, Opcode::Alloca(global.elem_ty), smallvec::smallvec![], Some(ptr_ty)),
    };
    let alloca_val = module.inst(alloca).result.unwrap();

    let insert_before = module
        .block(entry)
        .insts()
        .iter()
        .find(|&&i| !matches!(module.inst(i).opcode, Opcode::Alloca(_)))
        .copied();
    match insert_before {
        Some(before) => {
            module.insert_inst_before(before, Opcode::Store, smallvec::smallvec![global.init, alloca_val], None);
        }
        None => {
            module.append_inst(entry, Opcode::Store, smallvec::smallvec![global.init, alloca_val], None);
        }
    }
    module.replace_all_uses_with(value_id, alloca_val);
}

fn innermost_elem_type(module: &Module, ty: TypeInternId) -> TypeInternId {
    match module.types.get(ty) {
        Type::Array(elem, _) => innermost_elem_type(module, elem),
        _ => ty,
    }
}

fn prop_const(module: &mut Module, g: GlobalId) {
    let global = module.global(g).clone();
    let value_id = global.value_id;
    let geps: Vec<InstId> = module.uses_of(value_id).iter().map(|u| u.user).collect();

    for gep in geps {
        let operands = module.inst(gep).operands.clone();
        let mut idxs: Vec<i64> = Vec::new();
        for &idx in &operands[1..] {
            match module.value(idx).kind.as_const_int() {
                Some(v) => idxs.push(v),
                None => break,
            }
        }
        if idxs.len() + 1 != operands.len() {
            continue;
        }

        let mut init: ValueId = global.init;
        let mut zero_init = false;
        for &i in &idxs[1..] {
            if zero_init {
                break;
            }
            match module.value(init).kind.clone() {
                ValueKind::ConstZero => zero_init = true,
                ValueKind::ConstArray(elems) => init = elems[i as usize],
                _ => unreachable!("array initializer must be ConstZero or ConstArray"),
            }
        }
        let const_v = if zero_init {
            let base_ty = innermost_elem_type(module, global.elem_ty);
            module.const_zero(base_ty)
        } else {
            init
        };

        let gep_result = module.inst(gep).result.unwrap();
        let loads: Vec<InstId> = module.uses_of(gep_result).iter().map(|u| u.user).collect();
        for load in loads {
            let load_result = module.inst(load).result.unwrap();
            module.replace_all_uses_with(load_result, const_v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn sinks_scalar_global_used_only_in_main() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let init = m.const_int(32, 7);
        let g = m.create_global("counter", i32_ty, false, init).unwrap();
        let g_val = m.global(g).value_id;

        let main = m.declare_function("main", i32_ty, vec![], false).unwrap();
        let entry = m.create_block(main, "entry");
        let load = m.append_inst(entry, Opcode::Load, smallvec![g_val], Some(i32_ty));
        let load_val = m.inst(load).result.unwrap();
        m.append_inst(entry, Opcode::Ret, smallvec![load_val], None);

        let mut mgr = PassManager::new();
        let changed = GlobalLocalize::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        assert!(m.uses_of(g_val).is_empty());
        let addr = m.inst(load).operands[0];
        assert!(matches!(m.value(addr).kind, ValueKind::Inst(_)), "load should now read from the sunk alloca");
    }

    #[test]
    fn propagates_const_array_loads() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let arr_ty = m.types.array(i32_ty, 3);
        let e0 = m.const_int(32, 10);
        let e1 = m.const_int(32, 20);
        let e2 = m.const_int(32, 30);
        let init = m.const_array(arr_ty, vec![e0, e1, e2]);
        let g = m.create_global("table", arr_ty, true, init).unwrap();
        let g_val = m.global(g).value_id;

        let f = m.declare_function("f", i32_ty, vec![], false).unwrap();
        let entry = m.create_block(f, "entry");
        let zero = m.const_int(32, 0);
        let one = m.const_int(32, 1);
        let gep = m.append_inst(entry, Opcode::GetElementPtr, smallvec![g_val, zero, one], Some(m.types.pointer(i32_ty)));
        let gep_val = m.inst(gep).result.unwrap();
        let load = m.append_inst(entry, Opcode::Load, smallvec![gep_val], Some(i32_ty));
        let load_val = m.inst(load).result.unwrap();
        m.append_inst(entry, Opcode::Ret, smallvec![load_val], None);

        let mut mgr = PassManager::new();
        let changed = GlobalLocalize::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        let ret = *m.block(entry).insts().last().unwrap();
        let folded = m.inst(ret).operands[0];
        assert_eq!(m.value(folded).kind.as_const_int(), Some(20));
    }
}
