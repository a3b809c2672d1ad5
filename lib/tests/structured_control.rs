mod common;

use classpatch::dsl::{Error, InsnBuilder, JumpCondition, LocalKind, LocalSlot, SwitchBuilder};
use classpatch::jvm::code::InsnList;
use classpatch::jvm::tree::{ClassNode, MethodNode};
use classpatch::jvm::verifier::{verify_class, ObjectHierarchy};
use classpatch::jvm::MethodAccessFlags;
use common::run;

type Switch = SwitchBuilder<'static, 'static>;

/// Case body adding `amount` to the accumulator
fn add(acc: LocalSlot, amount: i32) -> impl FnOnce(&mut InsnBuilder) -> Result<(), Error> {
    move |b| {
        b.load(acc).int(amount).iadd().store(acc);
        Ok(())
    }
}

/// `static int f(int key)`: accumulate into a local over a switch on `key`, then return it
fn switch_method(
    table: bool,
    cases: impl FnOnce(LocalSlot, Switch) -> Switch,
) -> InsnList {
    let mut b = InsnBuilder::new(1);
    let acc = b.int(0).istore_new();
    b.load_index(LocalKind::Int, 0);
    let switch = cases(acc, SwitchBuilder::new());
    if table {
        b.table_switch(switch).unwrap();
    } else {
        b.lookup_switch(switch).unwrap();
    }
    b.load(acc).ireturn();
    b.build().unwrap()
}

#[test]
fn table_switch_holes_take_the_default() {
    let insns = switch_method(true, |acc, switch| {
        switch
            .case(0, add(acc, 1000))
            .case(2, add(acc, 2))
            .case(5, add(acc, 5))
            .default(add(acc, 100))
    });

    assert_eq!(run(&insns, &[0]), 1000);
    assert_eq!(run(&insns, &[1]), 100);
    assert_eq!(run(&insns, &[2]), 2);
    assert_eq!(run(&insns, &[3]), 100);
    assert_eq!(run(&insns, &[4]), 100);
    assert_eq!(run(&insns, &[5]), 5);
    assert_eq!(run(&insns, &[6]), 100);
    assert_eq!(run(&insns, &[-1]), 100);
}

#[test]
fn fallthrough_runs_into_the_next_case() {
    let insns = switch_method(true, |acc, switch| {
        switch
            .case_fallthrough(1, add(acc, 1))
            .case(2, add(acc, 2))
            .case(3, add(acc, 4))
    });

    assert_eq!(run(&insns, &[1]), 3);
    assert_eq!(run(&insns, &[2]), 2);
    assert_eq!(run(&insns, &[3]), 4);
    assert_eq!(run(&insns, &[4]), 0);
}

#[test]
fn lookup_switch_on_sparse_keys() {
    let insns = switch_method(false, |acc, switch| {
        switch
            .case(1 << 20, add(acc, 3))
            .case(-1000, add(acc, 1))
            .case(7, add(acc, 2))
            .default(add(acc, -1))
    });

    assert_eq!(run(&insns, &[-1000]), 1);
    assert_eq!(run(&insns, &[7]), 2);
    assert_eq!(run(&insns, &[1 << 20]), 3);
    assert_eq!(run(&insns, &[8]), -1);
}

#[test]
fn exactly_one_branch_of_if_else_runs() {
    let mut b = InsnBuilder::new(1);
    let acc = b.int(0).istore_new();
    b.load_index(LocalKind::Int, 0);
    b.if_else(&[JumpCondition::IfNe], add(acc, 1), add(acc, 2))
        .unwrap();
    b.load(acc).ireturn();
    let insns = b.build().unwrap();

    // A taken jump runs the `if` body
    assert_eq!(run(&insns, &[1]), 1);
    assert_eq!(run(&insns, &[-4]), 1);
    assert_eq!(run(&insns, &[0]), 2);
}

#[test]
fn if_clause_is_skipped_when_a_condition_holds() {
    let mut b = InsnBuilder::new(2);
    let acc = b.int(0).istore_new();
    b.load_index(LocalKind::Int, 0)
        .load_index(LocalKind::Int, 1);
    b.if_clause(&[JumpCondition::IfIcmpGt], add(acc, 1))
        .unwrap();
    b.load(acc).ireturn();
    let insns = b.build().unwrap();

    assert_eq!(run(&insns, &[3, 2]), 0);
    assert_eq!(run(&insns, &[2, 2]), 1);
    assert_eq!(run(&insns, &[1, 2]), 1);
}

#[test]
fn built_code_passes_verification() {
    let mut b = InsnBuilder::new(1);
    let acc = b.int(0).istore_new();
    b.load_index(LocalKind::Int, 0);
    b.table_switch(
        SwitchBuilder::new()
            .case(0, add(acc, 1))
            .case(3, add(acc, 2))
            .default(add(acc, 3)),
    )
    .unwrap();
    b.load(acc);
    b.if_else(&[JumpCondition::IfGt], add(acc, 10), add(acc, 20))
        .unwrap();
    b.load(acc).ireturn();

    let mut method = MethodNode::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "pick",
        "(I)I",
    );
    method.code_mut().insns = b.build().unwrap();

    let mut guarded = MethodNode::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "locked",
        "(Ljava/lang/Object;)V",
    );
    let mut b = InsnBuilder::for_method(&guarded, &classpatch::dsl::IdentityRemapper).unwrap();
    b.load_index(LocalKind::Reference, 0);
    b.synchronized_guarded(|b| {
        b.nop();
        Ok(())
    })
    .unwrap();
    b.return_();
    guarded.code_mut().insns = b.build().unwrap();

    let mut class = ClassNode::new("a/Picker", Some("java/lang/Object"));
    class.methods.push(method);
    class.methods.push(guarded);
    let bytes = class.to_bytes(&ObjectHierarchy).unwrap();

    let findings = verify_class(&bytes, &ObjectHierarchy).unwrap();
    assert!(findings.is_empty(), "{:?}", findings);
}
