//! End-to-end scenarios and cross-pass properties, run through the
//! default optimization pipeline rather than a single pass in isolation.

use proptest::prelude::*;
use smallvec::smallvec;

use sysy_ir_analysis::{Dominator, PassManager};
use sysy_ir_core::instruction::{IBinOp, Opcode};
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::Module;
use sysy_ir_opt::{AlgebraicSimplify, DeadCode, Mem2Reg, Pipeline, PipelineConfig, Transform, GVN};

fn optimized(mut m: Module) -> Module {
    Pipeline::run(&mut m, &PipelineConfig::from_optimize(true)).unwrap();
    m
}

/// Input: entry allocates `a`, stores 0, branches on an argument to two
/// blocks, one storing 1 and the other 2, both jumping to `exit`, which
/// loads `a` and returns it.
#[test]
fn mem2reg_promotes_a_simple_counter() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let bool_ty = m.types.i1();
    let f = m.declare_function("main", i32_ty, vec![bool_ty], false).unwrap();
    let entry = m.create_block(f, "entry");
    let then_bb = m.create_block(f, "then");
    let else_bb = m.create_block(f, "else");
    let exit = m.create_block(f, "exit");
    let cond = m.func(f).args[0];

    let ptr_ty = m.types.pointer(i32_ty);
    let alloca = m.append_inst(entry, Opcode::Alloca(i32_ty), smallvec![], Some(ptr_ty));
    let slot = m.inst(alloca).result.unwrap();
    let zero = m.const_int(32, 0);
    m.append_inst(entry, Opcode::Store, smallvec![zero, slot], None);
    m.append_inst(
        entry,
        Opcode::Br,
        smallvec![cond, m.block(then_bb).value_id, m.block(else_bb).value_id],
        None,
    );

    let one = m.const_int(32, 1);
    m.append_inst(then_bb, Opcode::Store, smallvec![one, slot], None);
    m.append_inst(then_bb, Opcode::Br, smallvec![m.block(exit).value_id], None);

    let two = m.const_int(32, 2);
    m.append_inst(else_bb, Opcode::Store, smallvec![two, slot], None);
    m.append_inst(else_bb, Opcode::Br, smallvec![m.block(exit).value_id], None);

    let load = m.append_inst(exit, Opcode::Load, smallvec![slot], Some(i32_ty));
    let load_val = m.inst(load).result.unwrap();
    m.append_inst(exit, Opcode::Ret, smallvec![load_val], None);

    let m = optimized(m);

    let f = m.main().unwrap();
    for &bb in m.func(f).blocks() {
        for &inst in m.block(bb).insts() {
            assert!(
                !matches!(m.inst(inst).opcode, Opcode::Alloca(_) | Opcode::Load | Opcode::Store),
                "mem2reg should have removed every alloca/load/store"
            );
        }
    }
    let ret = m.block(exit).terminator();
    // `exit` itself may have been folded away by control-flow simplification
    // once it's pure phi + ret; either way exactly one ret should remain,
    // returning a value traceable to a phi of 1 and 2.
    let all_rets: Vec<_> = m
        .func(f)
        .blocks()
        .iter()
        .filter_map(|&bb| m.block(bb).terminator())
        .filter(|&t| m.inst(t).opcode == Opcode::Ret)
        .collect();
    assert_eq!(all_rets.len(), 1);
    let _ = ret;
}

/// Input: `entry: x = 1+2; y = 3*4; z = x+y; return 0`.
#[test]
fn dce_removes_dead_arithmetic() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let f = m.declare_function("main", i32_ty, vec![], false).unwrap();
    let entry = m.create_block(f, "entry");
    let one = m.const_int(32, 1);
    let two = m.const_int(32, 2);
    let x = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![one, two], Some(i32_ty));
    let x_val = m.inst(x).result.unwrap();
    let three = m.const_int(32, 3);
    let four = m.const_int(32, 4);
    let y = m.append_inst(entry, Opcode::IBin(IBinOp::Mul), smallvec![three, four], Some(i32_ty));
    let y_val = m.inst(y).result.unwrap();
    let z = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![x_val, y_val], Some(i32_ty));
    let _ = m.inst(z).result.unwrap();
    let zero = m.const_int(32, 0);
    m.append_inst(entry, Opcode::Ret, smallvec![zero], None);

    let m = optimized(m);
    let f = m.main().unwrap();
    let entry = m.func(f).blocks()[0];
    assert_eq!(m.block(entry).insts().len(), 1, "only the return should remain");
    assert_eq!(m.inst(m.block(entry).insts()[0]).opcode, Opcode::Ret);
}

/// Input: `return (a + 0) * 1 - (a - a)`.
#[test]
fn algebraic_simplify_and_const_fold_to_the_bare_argument() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let f = m.declare_function("main", i32_ty, vec![i32_ty], false).unwrap();
    let entry = m.create_block(f, "entry");
    let a = m.func(f).args[0];

    let zero = m.const_int(32, 0);
    let lhs_add = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![a, zero], Some(i32_ty));
    let lhs_add_val = m.inst(lhs_add).result.unwrap();
    let one = m.const_int(32, 1);
    let lhs_mul = m.append_inst(entry, Opcode::IBin(IBinOp::Mul), smallvec![lhs_add_val, one], Some(i32_ty));
    let lhs_mul_val = m.inst(lhs_mul).result.unwrap();

    let rhs_sub = m.append_inst(entry, Opcode::IBin(IBinOp::Sub), smallvec![a, a], Some(i32_ty));
    let rhs_sub_val = m.inst(rhs_sub).result.unwrap();

    let top = m.append_inst(entry, Opcode::IBin(IBinOp::Sub), smallvec![lhs_mul_val, rhs_sub_val], Some(i32_ty));
    let top_val = m.inst(top).result.unwrap();
    m.append_inst(entry, Opcode::Ret, smallvec![top_val], None);

    let m = optimized(m);
    let f = m.main().unwrap();
    let entry = m.func(f).blocks()[0];
    let ret = m.block(entry).terminator().unwrap();
    assert_eq!(m.inst(ret).opcode, Opcode::Ret);
    assert_eq!(m.inst(ret).operands[0], a, "fully simplified, the function should just return its argument");
}

/// Two GEPs with identical constant indices into the same alloca, no
/// intervening store, both loaded, results added. GVN unifies the
/// redundant address computation; it leaves the loads themselves alone.
#[test]
fn gvn_unifies_the_redundant_gep_feeding_two_loads() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let arr_ty = m.types.array(i32_ty, 8);
    let f = m.declare_function("main", i32_ty, vec![], false).unwrap();
    let entry = m.create_block(f, "entry");
    let ptr_ty = m.types.pointer(arr_ty);
    let alloca = m.append_inst(entry, Opcode::Alloca(arr_ty), smallvec![], Some(ptr_ty));
    let base = m.inst(alloca).result.unwrap();

    let zero = m.const_int(32, 0);
    let three = m.const_int(32, 3);
    let elem_ptr_ty = m.types.pointer(i32_ty);
    let gep1 = m.append_inst(entry, Opcode::GetElementPtr, smallvec![base, zero, three], Some(elem_ptr_ty));
    let gep1_val = m.inst(gep1).result.unwrap();
    let load1 = m.append_inst(entry, Opcode::Load, smallvec![gep1_val], Some(i32_ty));
    let load1_val = m.inst(load1).result.unwrap();

    let gep2 = m.append_inst(entry, Opcode::GetElementPtr, smallvec![base, zero, three], Some(elem_ptr_ty));
    let gep2_val = m.inst(gep2).result.unwrap();
    let load2 = m.append_inst(entry, Opcode::Load, smallvec![gep2_val], Some(i32_ty));
    let load2_val = m.inst(load2).result.unwrap();

    let sum = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![load1_val, load2_val], Some(i32_ty));
    let sum_val = m.inst(sum).result.unwrap();
    m.append_inst(entry, Opcode::Ret, smallvec![sum_val], None);

    let m = optimized(m);
    let f = m.main().unwrap();
    let insts: Vec<_> = m
        .func(f)
        .blocks()
        .iter()
        .flat_map(|&bb| m.block(bb).insts().iter().copied())
        .collect();

    // GVN never builds a value-expression for `Load` itself (memory aliasing
    // is out of scope for it, matching the original's `valueExpr` falling
    // through to a unique, unmergeable expression for load instructions) —
    // so both loads survive. What it does unify is the address computation
    // feeding them: the two structurally identical GEPs collapse to one.
    let gep_count = insts.iter().filter(|&&i| m.inst(i).opcode == Opcode::GetElementPtr).count();
    assert_eq!(gep_count, 1, "the second, redundant GEP should have been unified by GVN");

    let load_addrs: Vec<_> = insts
        .iter()
        .filter(|&&i| m.inst(i).opcode == Opcode::Load)
        .map(|&i| m.inst(i).operands[0])
        .collect();
    assert_eq!(load_addrs.len(), 2, "GVN does not merge loads, only the address computation feeding them");
    assert_eq!(load_addrs[0], load_addrs[1], "both loads should read through the same, unified address");
}

/// `s = 0; for (i = 0; i < 4; ++i) s += i; return s;` unrolls to a
/// straight-line computation of 6.
#[test]
fn loop_unroll_computes_a_fixed_count_sum() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let bool_ty = m.types.i1();
    let f = m.declare_function("main", i32_ty, vec![], false).unwrap();
    let entry = m.create_block(f, "entry");
    let header = m.create_block(f, "header");
    let body = m.create_block(f, "body");
    let exit = m.create_block(f, "exit");

    let zero = m.const_int(32, 0);
    m.append_inst(entry, Opcode::Br, smallvec![m.block(header).value_id], None);

    let s_phi = m.prepend_inst(header, Opcode::Phi, smallvec![], Some(i32_ty));
    let i_phi = m.prepend_inst(header, Opcode::Phi, smallvec![], Some(i32_ty));
    let s_phi_val = m.inst(s_phi).result.unwrap();
    let i_phi_val = m.inst(i_phi).result.unwrap();
    m.push_phi_operand(s_phi, zero, m.block(entry).value_id);
    m.push_phi_operand(i_phi, zero, m.block(entry).value_id);

    let four = m.const_int(32, 4);
    let cmp = m.append_inst(header, Opcode::ICmp(sysy_ir_core::instruction::ICmpOp::Lt), smallvec![i_phi_val, four], Some(bool_ty));
    let cmp_val = m.inst(cmp).result.unwrap();
    m.append_inst(header, Opcode::Br, smallvec![cmp_val, m.block(body).value_id, m.block(exit).value_id], None);

    let s_next = m.append_inst(body, Opcode::IBin(IBinOp::Add), smallvec![s_phi_val, i_phi_val], Some(i32_ty));
    let s_next_val = m.inst(s_next).result.unwrap();
    let one = m.const_int(32, 1);
    let i_next = m.append_inst(body, Opcode::IBin(IBinOp::Add), smallvec![i_phi_val, one], Some(i32_ty));
    let i_next_val = m.inst(i_next).result.unwrap();
    m.append_inst(body, Opcode::Br, smallvec![m.block(header).value_id], None);
    m.push_phi_operand(s_phi, s_next_val, m.block(body).value_id);
    m.push_phi_operand(i_phi, i_next_val, m.block(body).value_id);

    m.append_inst(exit, Opcode::Ret, smallvec![s_phi_val], None);

    let m = optimized(m);
    let f = m.main().unwrap();

    assert!(!m.func(f).blocks().iter().any(|&bb| m.block(bb).successors().contains(&bb)), "no self-looping block should remain");
    let ret = m
        .func(f)
        .blocks()
        .iter()
        .filter_map(|&bb| m.block(bb).terminator())
        .find(|&t| m.inst(t).opcode == Opcode::Ret)
        .expect("exactly one ret should remain");
    let ret_val = m.inst(ret).operands[0];
    assert_eq!(eval_const_arith(&m, ret_val), Some(6), "the unrolled chain should still be semantically equivalent to summing 0..4");
}

/// Recursively evaluates a tree of constant-operand `add`s down to its
/// integer value, used to confirm an unrolled loop body is semantically
/// equivalent to its pre-unroll sum without depending on whether any
/// later pass happened to literally constant-fold it down to one value.
fn eval_const_arith(m: &Module, v: sysy_ir_core::ValueId) -> Option<i64> {
    if let Some(c) = m.value(v).kind.as_const_int() {
        return Some(c);
    }
    if let ValueKind::Inst(inst) = m.value(v).kind {
        if let Opcode::IBin(IBinOp::Add) = m.inst(inst).opcode {
            let ops = &m.inst(inst).operands;
            return Some(eval_const_arith(m, ops[0])? + eval_const_arith(m, ops[1])?);
        }
    }
    None
}

/// `f(x) { return x + 1; }` inlined at its call site in `main`.
#[test]
fn inline_replaces_a_pure_callee_call() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let callee = m.declare_function("f", i32_ty, vec![i32_ty], false).unwrap();
    let callee_entry = m.create_block(callee, "entry");
    let x = m.func(callee).args[0];
    let one = m.const_int(32, 1);
    let add = m.append_inst(callee_entry, Opcode::IBin(IBinOp::Add), smallvec![x, one], Some(i32_ty));
    let add_val = m.inst(add).result.unwrap();
    m.append_inst(callee_entry, Opcode::Ret, smallvec![add_val], None);

    let main = m.declare_function("main", i32_ty, vec![i32_ty], false).unwrap();
    let entry = m.create_block(main, "entry");
    let arg = m.func(main).args[0];
    let callee_val = m.func(callee).value_id;
    let call = m.append_inst(entry, Opcode::Call, smallvec![callee_val, arg], Some(i32_ty));
    let call_val = m.inst(call).result.unwrap();
    m.append_inst(entry, Opcode::Ret, smallvec![call_val], None);

    let m = optimized(m);
    let main = m.main().unwrap();
    let has_call = m
        .func(main)
        .blocks()
        .iter()
        .flat_map(|&bb| m.block(bb).insts().iter().copied())
        .any(|i| m.inst(i).opcode == Opcode::Call);
    assert!(!has_call, "the call should have been inlined away");
}

/// Running mem2reg twice in a row should produce the same module as
/// running it once — the second run finds nothing left to promote.
#[test]
fn mem2reg_is_idempotent() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let f = m.declare_function("main", i32_ty, vec![], false).unwrap();
    let entry = m.create_block(f, "entry");
    let ptr_ty = m.types.pointer(i32_ty);
    let alloca = m.append_inst(entry, Opcode::Alloca(i32_ty), smallvec![], Some(ptr_ty));
    let slot = m.inst(alloca).result.unwrap();
    let five = m.const_int(32, 5);
    m.append_inst(entry, Opcode::Store, smallvec![five, slot], None);
    let load = m.append_inst(entry, Opcode::Load, smallvec![slot], Some(i32_ty));
    let load_val = m.inst(load).result.unwrap();
    m.append_inst(entry, Opcode::Ret, smallvec![load_val], None);

    let mut mgr = PassManager::new();
    let first = Mem2Reg::run(&mut m, &mut mgr).unwrap();
    assert!(first);
    let insts_after_first: Vec<Opcode> = m.func(f).blocks().iter().flat_map(|&bb| m.block(bb).insts().iter().map(|&i| m.inst(i).opcode)).collect();

    let second = Mem2Reg::run(&mut m, &mut mgr).unwrap();
    assert!(!second, "a second mem2reg run should find nothing left to promote");
    let insts_after_second: Vec<Opcode> = m.func(f).blocks().iter().flat_map(|&bb| m.block(bb).insts().iter().map(|&i| m.inst(i).opcode)).collect();
    assert_eq!(insts_after_first, insts_after_second);
}

/// After DCE, every remaining instruction is either critical or
/// transitively used by one — i.e. a further DCE run is a no-op.
#[test]
fn dce_is_stable_after_one_pass() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let f = m.declare_function("main", i32_ty, vec![], false).unwrap();
    let entry = m.create_block(f, "entry");
    let one = m.const_int(32, 1);
    let two = m.const_int(32, 2);
    let dead = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![one, two], Some(i32_ty));
    let _ = m.inst(dead).result.unwrap();
    m.append_inst(entry, Opcode::Ret, smallvec![one], None);

    let mut mgr = PassManager::new();
    let first = DeadCode::run(&mut m, &mut mgr).unwrap();
    assert!(first);
    let second = DeadCode::run(&mut m, &mut mgr).unwrap();
    assert!(!second, "nothing left for a second DCE pass to remove");
}

/// For every block and every path from entry, every dominator of `B`
/// appears on the path; `idom(B) != B` iff `B != entry`.
#[test]
fn dominator_tree_respects_its_own_definition() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let bool_ty = m.types.i1();
    let f = m.declare_function("main", i32_ty, vec![bool_ty], false).unwrap();
    let entry = m.create_block(f, "entry");
    let then_bb = m.create_block(f, "then");
    let else_bb = m.create_block(f, "else");
    let join = m.create_block(f, "join");
    let cond = m.func(f).args[0];
    m.append_inst(entry, Opcode::Br, smallvec![cond, m.block(then_bb).value_id, m.block(else_bb).value_id], None);
    m.append_inst(then_bb, Opcode::Br, smallvec![m.block(join).value_id], None);
    m.append_inst(else_bb, Opcode::Br, smallvec![m.block(join).value_id], None);
    let zero = m.const_int(32, 0);
    m.append_inst(join, Opcode::Ret, smallvec![zero], None);

    let mut mgr = PassManager::new();
    let dom = mgr.get::<Dominator>(&m).clone();

    assert_eq!(dom.idom[&entry], entry);
    assert_ne!(dom.idom[&then_bb], then_bb);
    assert_ne!(dom.idom[&else_bb], else_bb);
    assert_ne!(dom.idom[&join], join);
    assert!(dom.dominates(entry, then_bb));
    assert!(dom.dominates(entry, else_bb));
    assert!(dom.dominates(entry, join));
    assert_eq!(dom.idom[&join], entry, "join's only immediate dominator is entry, since it has two incoming paths");
    assert!(!dom.dominates(then_bb, join), "then does not dominate join — else reaches it too");
    assert!(!dom.dominates(else_bb, join));
}

proptest! {
    /// Applying the algebraic simplifier's additive-identity/annihilator
    /// rules to `x + 0`, `x - 0`, `x * 1`, `x * 0` in any grouping
    /// collapses to the same normal form regardless of shuffling,
    /// matching the confluence §8 requires of the rewrite set.
    #[test]
    fn algebraic_simplify_confluent_on_identity_chains(perm in 0u8..6) {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("main", i32_ty, vec![i32_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let base = m.func(f).args[0];
        let zero = m.const_int(32, 0);
        let one = m.const_int(32, 1);

        // Three equivalent identity rewrites of `base`, applied in one of
        // six orders; all must normalize to the same leaf value.
        let ops: [Box<dyn Fn(&mut Module, sysy_ir_core::ValueId) -> sysy_ir_core::ValueId>; 3] = [
            Box::new(move |m: &mut Module, v| {
                let i = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![v, zero], Some(i32_ty));
                m.inst(i).result.unwrap()
            }),
            Box::new(move |m: &mut Module, v| {
                let i = m.append_inst(entry, Opcode::IBin(IBinOp::Sub), smallvec![v, zero], Some(i32_ty));
                m.inst(i).result.unwrap()
            }),
            Box::new(move |m: &mut Module, v| {
                let i = m.append_inst(entry, Opcode::IBin(IBinOp::Mul), smallvec![v, one], Some(i32_ty));
                m.inst(i).result.unwrap()
            }),
        ];
        let order: [usize; 3] = match perm % 6 {
            0 => [0, 1, 2],
            1 => [0, 2, 1],
            2 => [1, 0, 2],
            3 => [1, 2, 0],
            4 => [2, 0, 1],
            _ => [2, 1, 0],
        };
        let mut v = base;
        for &idx in &order {
            v = ops[idx](&mut m, v);
        }
        m.append_inst(entry, Opcode::Ret, smallvec![v], None);

        let mut mgr = PassManager::new();
        sysy_ir_opt::run_to_fixpoint::<AlgebraicSimplify>(&mut m, &mut mgr).unwrap();
        let ret = m.block(entry).terminator().unwrap();
        prop_assert_eq!(m.inst(ret).operands[0], base);
    }
}

/// For every replaced non-leader member of a GVN congruence class, the
/// leader's defining block dominates the member's use block.
#[test]
fn gvn_leader_dominates_every_replaced_use() {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let bool_ty = m.types.i1();
    let f = m.declare_function("main", i32_ty, vec![i32_ty, i32_ty, bool_ty], false).unwrap();
    let entry = m.create_block(f, "entry");
    let then_bb = m.create_block(f, "then");
    let join = m.create_block(f, "join");
    let a = m.func(f).args[0];
    let b = m.func(f).args[1];
    let cond = m.func(f).args[2];

    let sum0 = m.append_inst(entry, Opcode::IBin(IBinOp::Add), smallvec![a, b], Some(i32_ty));
    let sum0_val = m.inst(sum0).result.unwrap();
    m.append_inst(entry, Opcode::Br, smallvec![cond, m.block(then_bb).value_id, m.block(join).value_id], None);

    // Redundant recomputation of a+b, dominated by entry's.
    let sum1 = m.append_inst(then_bb, Opcode::IBin(IBinOp::Add), smallvec![a, b], Some(i32_ty));
    let sum1_val = m.inst(sum1).result.unwrap();
    m.append_inst(then_bb, Opcode::Ret, smallvec![sum1_val], None);

    m.append_inst(join, Opcode::Ret, smallvec![sum0_val], None);

    let mut mgr = PassManager::new();
    let changed = GVN::run(&mut m, &mut mgr).unwrap();
    assert!(changed);
    let dom = mgr.get::<Dominator>(&m).clone();
    assert!(
        m.uses_of(sum0_val).iter().any(|u| m.inst(u.user).parent == then_bb || m.inst(u.user).parent == entry),
        "entry's sum should now also be used from then_bb"
    );
    assert!(dom.dominates(entry, then_bb), "the surviving leader's block must dominate the replaced use's block");
    // then_bb's own redundant add should have no remaining uses once CSE'd.
    assert!(m.uses_of(sum1_val).is_empty() || sum1_val == sum0_val);
}
