//! Universal invariants (§8) over the arena/use-list structures
//! themselves, independent of any particular instruction opcode: every
//! operand edge `set_operand` records is mirrored by exactly one entry in
//! the target value's use-list, and constant interning is a pure function
//! of its key.

use proptest::prelude::*;
use smallvec::smallvec;

use sysy_ir_core::instruction::Opcode;
use sysy_ir_core::Module;

fn uses_contain(m: &Module, value: sysy_ir_core::ValueId, inst: sysy_ir_core::InstId, operand_index: usize) -> bool {
    m.uses_of(value)
        .iter()
        .any(|u| u.user == inst && u.operand_index as usize == operand_index)
}

/// Builds a function with `n` independent `i32` constants and one
/// instruction whose single operand starts at constant `0`.
fn module_with_n_constants(n: usize) -> (Module, sysy_ir_core::InstId, Vec<sysy_ir_core::ValueId>) {
    let mut m = Module::new();
    let i32_ty = m.types.i32();
    let f = m.declare_function("main", i32_ty, vec![], false).unwrap();
    let entry = m.create_block(f, "entry");
    let consts: Vec<_> = (0..n as i64).map(|v| m.const_int(32, v)).collect();
    let inst = m.append_inst(entry, Opcode::Zext, smallvec![consts[0]], Some(i32_ty));
    (m, inst, consts)
}

proptest! {
    /// After any sequence of `set_operand` calls retargeting operand 0 of
    /// the same instruction among `n` distinct constants, exactly one
    /// constant's use-list names that instruction as a user of operand 0,
    /// and it is always the most recently assigned one.
    #[test]
    fn set_operand_keeps_exactly_one_use_list_entry(n in 2usize..6, retargets in proptest::collection::vec(0usize..6, 0..20)) {
        let (mut m, inst, consts) = module_with_n_constants(n);
        let mut current = 0usize;
        prop_assert!(uses_contain(&m, consts[current], inst, 0));

        for r in retargets {
            let next = r % n;
            m.set_operand(inst, 0, consts[next]);
            current = next;

            for (i, &c) in consts.iter().enumerate() {
                let present = uses_contain(&m, c, inst, 0);
                prop_assert_eq!(present, i == current, "constant {} use-list state out of sync after retarget", i);
            }
        }
    }

    /// `const_int` is a pure function of `(bits, value)`: repeated calls
    /// with the same key return the same id, and distinct keys never
    /// collide onto one id.
    #[test]
    fn const_int_interning_is_a_pure_function_of_its_key(a in -1000i64..1000, b in -1000i64..1000) {
        let mut m = Module::new();
        let first = m.const_int(32, a);
        let repeat = m.const_int(32, a);
        prop_assert_eq!(first, repeat, "interning the same (bits, value) key twice must yield the same id");

        let other = m.const_int(32, b);
        if a != b {
            prop_assert_ne!(first, other, "distinct values must never intern to the same id");
        } else {
            prop_assert_eq!(first, other);
        }
    }

    /// `replace_all_uses_with` drains every use of `old` onto `new` and
    /// leaves `old`'s use-list empty, for any number of instructions
    /// sharing `old` as an operand.
    #[test]
    fn replace_all_uses_with_fully_migrates_the_use_list(n_users in 1usize..8) {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("main", i32_ty, vec![], false).unwrap();
        let entry = m.create_block(f, "entry");
        let old = m.const_int(32, 0);
        let new = m.const_int(32, 1);
        let users: Vec<_> = (0..n_users)
            .map(|_| m.append_inst(entry, Opcode::Zext, smallvec![old], Some(i32_ty)))
            .collect();

        m.replace_all_uses_with(old, new);

        prop_assert!(m.uses_of(old).is_empty());
        for &u in &users {
            prop_assert!(uses_contain(&m, new, u, 0));
            prop_assert_eq!(m.inst(u).operands[0], new);
        }
    }
}
