//! Peephole algebraic rewriting (§4.8), grounded in
//! `transform/algebraic_simplify.cc`. Each rule recognizes a small
//! expression tree rooted at an `iadd`/`isub`/`imul`/`idiv` and replaces it
//! with an equivalent, cheaper one; rewrites never delete the instructions
//! they replace (a later [`crate::dead_code::DeadCode`] pass does that),
//! they only redirect uses.
//!
//! The original expresses these rules with a small matcher-combinator DSL
//! (`ir_matcher.hh`); here they're just direct operand inspection, which
//! reads as plainly and needs no extra machinery.

use rustc_hash::FxHashSet;
use smallvec::smallvec;

use sysy_ir_analysis::{AnalysisUsage, Pass, PassManager};
use sysy_ir_core::instruction::{IBinOp, Opcode};
use sysy_ir_core::types::Type;
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{FuncId, InstId, Module, ValueId};

use crate::const_propagate::ConstPropagate;
use crate::dead_code::DeadCode;
use crate::transform::{PassResult, Transform};

pub struct AlgebraicSimplify;

impl Transform for AlgebraicSimplify {
    fn name() -> &'static str {
        "algebraic_simplify"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            let mut ignores: FxHashSet<InstId> = FxHashSet::default();
            for &bb in module.func(f).blocks().to_vec().iter() {
                loop {
                    let mut bb_changed = false;
                    let insts: Vec<InstId> = module.block(bb).insts().to_vec();
                    for inst_id in insts {
                        if ignores.contains(&inst_id) {
                            continue;
                        }
                        if apply_rules(module, inst_id) {
                            ignores.insert(inst_id);
                            bb_changed = true;
                            changed = true;
                        }
                    }
                    if !bb_changed {
                        break;
                    }
                }
            }
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for AlgebraicSimplify {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_require::<ConstPropagate>();
        au.add_post::<DeadCode>();
    }
}

fn ibin(module: &Module, v: ValueId, op: IBinOp) -> Option<(ValueId, ValueId)> {
    if let ValueKind::Inst(i) = module.value(v).kind {
        if let Opcode::IBin(o) = module.inst(i).opcode {
            if o == op {
                let operands = &module.inst(i).operands;
                return Some((operands[0], operands[1]));
            }
        }
    }
    None
}

fn one_use(module: &Module, v: ValueId) -> bool {
    module.uses_of(v).len() == 1
}

fn const_like(module: &Module, v: ValueId) -> Option<i64> {
    module.value(v).kind.as_const_int()
}

/// Splits `lhs op rhs` into (the non-constant side, the constant value),
/// trying `rhs` first and, when `op` commutes, `lhs` as a fallback.
fn split_const(module: &Module, lhs: ValueId, rhs: ValueId, commutative: bool) -> Option<(ValueId, i64)> {
    if let Some(c) = const_like(module, rhs) {
        return Some((lhs, c));
    }
    if commutative {
        if let Some(c) = const_like(module, lhs) {
            return Some((rhs, c));
        }
    }
    None
}

fn split_const_op(module: &Module, v: ValueId, op: IBinOp) -> Option<(ValueId, i64)> {
    let (lhs, rhs) = ibin(module, v, op)?;
    split_const(module, lhs, rhs, op.is_commutative())
}

fn get_cint(module: &mut Module, is_i64: bool, v: i64) -> ValueId {
    if is_i64 {
        module.const_i64(v)
    } else {
        module.const_int(32, v)
    }
}

fn insert_bin(module: &mut Module, before: InstId, op: IBinOp, lhs: ValueId, rhs: ValueId, ty: sysy_ir_core::TypeInternId) -> ValueId {
    let inst = module.insert_inst_before(before, Opcode::IBin(op), smallvec![lhs, rhs], Some(ty));
    module.inst(inst).result.unwrap()
}

fn apply_rules(module: &mut Module, inst_id: InstId) -> bool {
    let inst = module.inst(inst_id);
    let Opcode::IBin(op) = inst.opcode else { return false };
    let lhs = inst.operands[0];
    let rhs = inst.operands[1];
    let result = inst.result.unwrap();
    let result_ty = module.value_type(result);
    let is_i64 = module.types.get(result_ty) == Type::I64;

    // --- meaningless computation ---
    match op {
        IBinOp::Add => {
            if let Some((v1, 0)) = split_const(module, lhs, rhs, true) {
                module.replace_all_uses_with(result, v1);
                return true;
            }
        }
        IBinOp::Sub => {
            if lhs == rhs {
                let zero = get_cint(module, is_i64, 0);
                module.replace_all_uses_with(result, zero);
                return true;
            }
            if const_like(module, rhs) == Some(0) {
                module.replace_all_uses_with(result, lhs);
                return true;
            }
        }
        IBinOp::Mul => {
            if let Some((_, 0)) = split_const(module, lhs, rhs, true) {
                let zero = get_cint(module, is_i64, 0);
                module.replace_all_uses_with(result, zero);
                return true;
            }
            if let Some((v1, 1)) = split_const(module, lhs, rhs, true) {
                module.replace_all_uses_with(result, v1);
                return true;
            }
        }
        IBinOp::SDiv => {
            if const_like(module, lhs) == Some(0) {
                let zero = get_cint(module, is_i64, 0);
                module.replace_all_uses_with(result, zero);
                return true;
            }
            if const_like(module, rhs) == Some(1) {
                module.replace_all_uses_with(result, lhs);
                return true;
            }
        }
        _ => {}
    }

    // --- continuous operation on constants ---
    if matches!(op, IBinOp::Add | IBinOp::Sub | IBinOp::Mul) {
        if let Some((inner, c2)) = split_const(module, lhs, rhs, op.is_commutative()) {
            if let Some((v1, c1)) = split_const_op(module, inner, op) {
                let combined = if op == IBinOp::Mul { c1 * c2 } else { c1 + c2 };
                let c = get_cint(module, is_i64, combined);
                let new_val = insert_bin(module, inst_id, op, v1, c, result_ty);
                module.replace_all_uses_with(result, new_val);
                return true;
            }
        }
    }
    if op == IBinOp::SDiv {
        if let Some((inner, c2)) = split_const(module, lhs, rhs, false) {
            if let Some((v1, c1)) = split_const_op(module, inner, IBinOp::SDiv) {
                if c1 != 0 && c2 != 0 {
                    let combined = c1.checked_mul(c2);
                    let overflows = !is_i64 && combined.is_some_and(|v| v != (v as i32) as i64);
                    let new_val = if overflows || combined.is_none() {
                        get_cint(module, is_i64, 0)
                    } else {
                        let c = get_cint(module, is_i64, combined.unwrap());
                        insert_bin(module, inst_id, IBinOp::SDiv, v1, c, result_ty)
                    };
                    module.replace_all_uses_with(result, new_val);
                    return true;
                }
            }
        }
    }

    // --- counterpart operation: (a op1 b) op2 b -> a, when op2 undoes op1 ---
    let counterpart = match op {
        IBinOp::Sub => Some(IBinOp::Add),
        IBinOp::Add => Some(IBinOp::Sub),
        IBinOp::SDiv => Some(IBinOp::Mul),
        IBinOp::Mul => Some(IBinOp::SDiv),
        _ => None,
    };
    if let Some(inner_op) = counterpart {
        if let Some((a, b)) = ibin(module, lhs, inner_op) {
            let v3 = rhs;
            let v1 = if b == v3 {
                Some(a)
            } else if inner_op.is_commutative() && a == v3 {
                Some(b)
            } else {
                None
            };
            if let Some(v1) = v1 {
                module.replace_all_uses_with(result, v1);
                return true;
            }
        }
    }

    // (v1 + c1) - c2 -> v1 + (c1 - c2)
    if op == IBinOp::Sub {
        if let Some(c2) = const_like(module, rhs) {
            if let Some((v1, c1)) = split_const_op(module, lhs, IBinOp::Add) {
                let c = get_cint(module, is_i64, c1 - c2);
                let new_val = insert_bin(module, inst_id, IBinOp::Add, v1, c, result_ty);
                module.replace_all_uses_with(result, new_val);
                return true;
            }
        }
    }
    // (v1 - c1) + c2 -> v1 + (c2 - c1)
    if op == IBinOp::Add {
        if let Some((inner, c2)) = split_const(module, lhs, rhs, true) {
            if let Some((v1, c1)) = ibin(module, inner, IBinOp::Sub).and_then(|(a, b)| const_like(module, b).map(|c1| (a, c1))) {
                let c = get_cint(module, is_i64, c2 - c1);
                let new_val = insert_bin(module, inst_id, IBinOp::Add, v1, c, result_ty);
                module.replace_all_uses_with(result, new_val);
                return true;
            }
        }
    }
    // (v1 * c1) / c2 -> v1 * (c1 / c2), when c2 divides c1 evenly
    if op == IBinOp::SDiv {
        if let Some(c2) = const_like(module, rhs) {
            if c2 != 0 {
                if let Some((v1, c1)) = split_const_op(module, lhs, IBinOp::Mul) {
                    if c1 % c2 == 0 {
                        let c = get_cint(module, is_i64, c1 / c2);
                        let new_val = insert_bin(module, inst_id, IBinOp::Mul, v1, c, result_ty);
                        module.replace_all_uses_with(result, new_val);
                        return true;
                    }
                }
            }
        }
    }
    // (v1 / c1) * c2 -> v1 * (c2 / c1), when c1 divides c2 evenly
    if op == IBinOp::Mul {
        if let Some((inner, c2)) = split_const(module, lhs, rhs, true) {
            if let Some((v1, c1)) = ibin(module, inner, IBinOp::SDiv).and_then(|(a, b)| const_like(module, b).map(|c1| (a, c1))) {
                if c1 != 0 && c2 % c1 == 0 {
                    let c = get_cint(module, is_i64, c2 / c1);
                    let new_val = insert_bin(module, inst_id, IBinOp::Mul, v1, c, result_ty);
                    module.replace_all_uses_with(result, new_val);
                    return true;
                }
            }
        }
    }

    // --- combining repeated terms under addition ---
    if op == IBinOp::Add {
        for &(inner, v3) in &[(lhs, rhs), (rhs, lhs)] {
            if let Some((v1, v2)) = ibin(module, inner, IBinOp::Add) {
                if !one_use(module, inner) {
                    continue;
                }
                let dup_unique = if v1 == v2 && v2 == v3 {
                    let three = get_cint(module, is_i64, 3);
                    let mul = insert_bin(module, inst_id, IBinOp::Mul, v1, three, result_ty);
                    module.replace_all_uses_with(result, mul);
                    return true;
                } else if v1 == v2 {
                    Some((v1, v3))
                } else if v1 == v3 {
                    Some((v1, v2))
                } else if v2 == v3 {
                    Some((v2, v1))
                } else {
                    None
                };
                if let Some((dup, unique)) = dup_unique {
                    let two = get_cint(module, is_i64, 2);
                    let mul = insert_bin(module, inst_id, IBinOp::Mul, dup, two, result_ty);
                    let add = insert_bin(module, inst_id, IBinOp::Add, unique, mul, result_ty);
                    module.replace_all_uses_with(result, add);
                    return true;
                }
            }
        }

        // v1 * v2 + v3, where v3 matches one multiplicand: v1*(v2+1)
        for &(inner, v3) in &[(lhs, rhs), (rhs, lhs)] {
            if !one_use(module, inner) {
                continue;
            }
            if let Some((m1, m2)) = ibin(module, inner, IBinOp::Mul) {
                let other = if m1 == v3 {
                    Some(m2)
                } else if m2 == v3 {
                    Some(m1)
                } else {
                    None
                };
                if let Some(other) = other {
                    let one = get_cint(module, is_i64, 1);
                    let times = insert_bin(module, inst_id, IBinOp::Add, other, one, result_ty);
                    let mul = insert_bin(module, inst_id, IBinOp::Mul, v3, times, result_ty);
                    module.replace_all_uses_with(result, mul);
                    return true;
                }
            }
        }

        // (v1 + v2 * v3) + v4, where v4 matches one multiplicand of the inner mul
        for &(inner, v4) in &[(lhs, rhs), (rhs, lhs)] {
            if let Some((a, b)) = ibin(module, inner, IBinOp::Add) {
                for &(mul_val, v1) in &[(b, a), (a, b)] {
                    if !one_use(module, mul_val) {
                        continue;
                    }
                    if let Some((m1, m2)) = ibin(module, mul_val, IBinOp::Mul) {
                        let factor = if m1 == v4 {
                            Some((m1, m2))
                        } else if m2 == v4 {
                            Some((m2, m1))
                        } else {
                            None
                        };
                        if let Some((v2, v3)) = factor {
                            let one = get_cint(module, is_i64, 1);
                            let times = insert_bin(module, inst_id, IBinOp::Add, v3, one, result_ty);
                            let mul = insert_bin(module, inst_id, IBinOp::Mul, v2, times, result_ty);
                            let add = insert_bin(module, inst_id, IBinOp::Add, v1, mul, result_ty);
                            module.replace_all_uses_with(result, add);
                            return true;
                        }
                    }
                }
            }
        }

        // (v1 * v2) + (v3 * v4), sharing a factor -> (other1 + other2) * shared
        if one_use(module, lhs) && one_use(module, rhs) {
            if let (Some((v1, v2)), Some((v3, v4))) = (ibin(module, lhs, IBinOp::Mul), ibin(module, rhs, IBinOp::Mul)) {
                let combo = if v1 == v3 {
                    Some((v2, v4, v1))
                } else if v1 == v4 {
                    Some((v2, v3, v1))
                } else if v2 == v3 {
                    Some((v1, v4, v2))
                } else if v2 == v4 {
                    Some((v1, v3, v2))
                } else {
                    None
                };
                if let Some((a, b, shared)) = combo {
                    let add = insert_bin(module, inst_id, IBinOp::Add, a, b, result_ty);
                    let mul = insert_bin(module, inst_id, IBinOp::Mul, add, shared, result_ty);
                    module.replace_all_uses_with(result, mul);
                    return true;
                }
            }
        }

        // (v1 / v2) + (v3 / v2) -> (v1 + v3) / v2
        if one_use(module, lhs) && one_use(module, rhs) {
            if let (Some((v1, v2)), Some((v3, v4))) = (ibin(module, lhs, IBinOp::SDiv), ibin(module, rhs, IBinOp::SDiv)) {
                if v2 == v4 {
                    let add = insert_bin(module, inst_id, IBinOp::Add, v1, v3, result_ty);
                    let div = insert_bin(module, inst_id, IBinOp::SDiv, add, v2, result_ty);
                    module.replace_all_uses_with(result, div);
                    return true;
                }
            }
        }
    }

    false
}
