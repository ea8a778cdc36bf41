//! Global value numbering (§4.9), grounded in `transform/gvn.cc`.
//!
//! The original tracks congruence classes as an explicit meet-over-paths
//! data-flow problem (`PIN`/`POUT` partitions joined at block entries,
//! Simpson/Kildall-style). This rewrite gets the same answer — a
//! redundant computation is only eliminated in favor of a leader whose
//! definition dominates it — by walking the dominator tree instead: a
//! scoped table maps each structural expression to its leader value, an
//! entry stays visible for the whole subtree dominated by the block that
//! created it, and is popped on the way back up. Dominance is exactly the
//! condition the original's replacement step checks after convergence, so
//! this sidesteps hand-rolling the partition lattice (`CongruenceClass`,
//! `TOP`, `intersect`/`join`) for a one-pass equivalent; see `DESIGN.md`.
//!
//! φ-nodes participate directly: an incoming value is resolved to its
//! current leader before the `(predecessor, value)` pairs are hashed, so
//! two φs merge as soon as they combine the same leaders from the same
//! predecessors — no separate φ-folding pass is needed.

use rustc_hash::FxHashMap;

use sysy_ir_analysis::{
    AnalysisUsage, DepthOrder, Dominator, DominatorResult, FuncInfo, FuncInfoResult, KillType, Pass, PassManager,
};
use sysy_ir_core::instruction::{FBinOp, IBinOp, ICmpOp, FCmpOp, InstructionData, Opcode};
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{BlockId, FuncId, Module, ValueId};

use crate::transform::{PassResult, Transform};

pub struct GVN;

impl Transform for GVN {
    fn name() -> &'static str {
        "gvn"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let dom: DominatorResult = mgr.get::<Dominator>(module).clone();
        let func_info: FuncInfoResult = mgr.get::<FuncInfo>(module).clone();
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            if let Some(entry) = module.func(f).entry_block() {
                let mut table: FxHashMap<Expr, ValueId> = FxHashMap::default();
                let mut leader: FxHashMap<ValueId, ValueId> = FxHashMap::default();
                visit_block(module, entry, &dom, &func_info, &mut table, &mut leader, &mut changed);
            }
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for GVN {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.set_kill_type(KillType::Normal);
        au.add_require::<FuncInfo>();
        au.add_require::<DepthOrder>();
        au.add_post::<crate::dead_code::DeadCode>();
    }

    fn always_invalid() -> bool {
        false
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum UnitOp {
    Zext,
    Sext,
    Trunc,
    SIToFP,
    FPToSI,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum Expr {
    Unit(UnitOp, ValueId),
    IBin(IBinOp, ValueId, ValueId),
    FBin(FBinOp, ValueId, ValueId),
    ICmp(ICmpOp, ValueId, ValueId),
    FCmp(FCmpOp, ValueId, ValueId),
    Gep(Vec<ValueId>),
    PureCall(FuncId, Vec<ValueId>),
    Phi(Vec<(BlockId, ValueId)>),
}

fn resolve(leader: &FxHashMap<ValueId, ValueId>, v: ValueId) -> ValueId {
    leader.get(&v).copied().unwrap_or(v)
}

fn build_expr(module: &Module, inst: &InstructionData, leader: &FxHashMap<ValueId, ValueId>, func_info: &FuncInfoResult) -> Option<Expr> {
    match inst.opcode {
        Opcode::IBin(op) => {
            let mut l = resolve(leader, inst.operands[0]);
            let mut r = resolve(leader, inst.operands[1]);
            if op.is_commutative() && r < l {
                std::mem::swap(&mut l, &mut r);
            }
            Some(Expr::IBin(op, l, r))
        }
        Opcode::FBin(op) => {
            let mut l = resolve(leader, inst.operands[0]);
            let mut r = resolve(leader, inst.operands[1]);
            if op.is_commutative() && r < l {
                std::mem::swap(&mut l, &mut r);
            }
            Some(Expr::FBin(op, l, r))
        }
        Opcode::ICmp(op) => Some(Expr::ICmp(op, resolve(leader, inst.operands[0]), resolve(leader, inst.operands[1]))),
        Opcode::FCmp(op) => Some(Expr::FCmp(op, resolve(leader, inst.operands[0]), resolve(leader, inst.operands[1]))),
        Opcode::Zext => Some(Expr::Unit(UnitOp::Zext, resolve(leader, inst.operands[0]))),
        Opcode::Sext => Some(Expr::Unit(UnitOp::Sext, resolve(leader, inst.operands[0]))),
        Opcode::Trunc => Some(Expr::Unit(UnitOp::Trunc, resolve(leader, inst.operands[0]))),
        Opcode::SIToFP => Some(Expr::Unit(UnitOp::SIToFP, resolve(leader, inst.operands[0]))),
        Opcode::FPToSI => Some(Expr::Unit(UnitOp::FPToSI, resolve(leader, inst.operands[0]))),
        Opcode::GetElementPtr => Some(Expr::Gep(inst.operands.iter().map(|&v| resolve(leader, v)).collect())),
        Opcode::Call => {
            let ValueKind::Function(callee) = module.value(inst.operands[0]).kind else {
                return None;
            };
            if !func_info.is_pure(callee) {
                return None;
            }
            let args = inst.operands[1..].iter().map(|&v| resolve(leader, v)).collect();
            Some(Expr::PureCall(callee, args))
        }
        Opcode::Phi => {
            let mut pairs: Vec<(BlockId, ValueId)> = inst
                .phi_pairs()
                .map(|(value, block_val)| {
                    let ValueKind::Block(bb) = module.value(block_val).kind else {
                        unreachable!("phi's second operand is always a block value")
                    };
                    (bb, resolve(leader, value))
                })
                .collect();
            pairs.sort_by_key(|&(bb, _)| bb);
            Some(Expr::Phi(pairs))
        }
        // Alloca/Load/Store/PtrToInt/IntToPtr/Ret/Br: either have no
        // stable structural identity (memory ops alias-analysis can't
        // rule out) or no result to number at all.
        _ => None,
    }
}

fn visit_block(
    module: &mut Module,
    bb: BlockId,
    dom: &DominatorResult,
    func_info: &FuncInfoResult,
    table: &mut FxHashMap<Expr, ValueId>,
    leader: &mut FxHashMap<ValueId, ValueId>,
    changed: &mut bool,
) {
    let mut inserted: Vec<Expr> = Vec::new();
    let insts = module.block(bb).insts().to_vec();
    for inst_id in insts {
        let inst = module.inst(inst_id).clone();
        let Some(result) = inst.result else { continue };
        let Some(expr) = build_expr(module, &inst, leader, func_info) else { continue };
        match table.get(&expr) {
            Some(&existing) => {
                leader.insert(result, existing);
                module.replace_all_uses_with(result, existing);
                *changed = true;
            }
            None => {
                table.insert(expr.clone(), result);
                leader.insert(result, result);
                inserted.push(expr);
            }
        }
    }

    if let Some(children) = dom.dom_tree_children.get(&bb).cloned() {
        for child in children {
            visit_block(module, child, dom, func_info, table, leader, changed);
        }
    }

    for expr in inserted {
        table.remove(&expr);
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
    fn merges_redundant_add_in_same_block() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("f", i32_ty, vec![i32_ty, i32_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let a = m.func(f).args[0];
        let b = m.func(f).args[1];
        let add1 = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![a, b], Some(i32_ty));
        let add1_val = m.inst(add1).result.unwrap();
        let add2 = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![b, a], Some(i32_ty));
        let add2_val = m.inst(add2).result.unwrap();
        let sum = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![add1_val, add2_val], Some(i32_ty));
        let sum_val = m.inst(sum).result.unwrap();
        m.append_inst(entry, Opcode::Ret, smallvec![sum_val], None);

        let mut mgr = fresh_manager();
        let changed = GVN::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        let operands = &m.inst(sum).operands;
        assert_eq!(operands[0], operands[1], "commutative adds of the same operands should share a leader");
    }

    #[test]
    fn merges_across_dominated_blocks_but_not_siblings() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let bool_ty = m.types.i1();
        let f = m.declare_function("f", i32_ty, vec![i32_ty, i32_ty, bool_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let then_bb = m.create_block(f, "then");
        let else_bb = m.create_block(f, "else");
        let a = m.func(f).args[0];
        let b = m.func(f).args[1];
        let cond = m.func(f).args[2];
        m.append_inst(entry, Opcode::Br, smallvec![cond, m.block(then_bb).value_id, m.block(else_bb).value_id], None);

        let then_add = m.append_inst(then_bb, Opcode::IBin(IBinOp::Add), smallvec![a, b], Some(i32_ty));
        let then_val = m.inst(then_add).result.unwrap();
        m.append_inst(then_bb, Opcode::Ret, smallvec![then_val], None);

        let else_add = m.append_inst(else_bb, Opcode::IBin(IBinOp::Add), smallvec![a, b], Some(i32_ty));
        let else_val = m.inst(else_add).result.unwrap();
        m.append_inst(else_bb, Opcode::Ret, smallvec![else_val], None);

        let mut mgr = fresh_manager();
        let changed = GVN::run(&mut m, &mut mgr).unwrap();
        assert!(!changed, "sibling blocks under a branch do not dominate one another");
    }
}
