#![allow(dead_code)]

use classpatch::jvm::code::opcodes::*;
use classpatch::jvm::code::{Insn, InsnList, Label, LoadableConstant};
use classpatch::jvm::tree::{ClassNode, MethodNode};
use classpatch::jvm::verifier::ObjectHierarchy;
use classpatch::jvm::MethodAccessFlags;

/// Run an instruction list which only uses `int`s, returning what it `ireturn`s
///
/// Locals start out as `args` (followed by zeros).
pub fn run(insns: &InsnList, args: &[i32]) -> i32 {
    let positions = insns.label_positions();
    let target = |label: &Label| -> usize {
        positions[label.index()].unwrap_or_else(|| panic!("label {} was never placed", label))
    };

    let mut locals = vec![0i32; 32];
    locals[..args.len()].copy_from_slice(args);
    let mut stack: Vec<i32> = vec![];
    let mut pc = 0;

    for _ in 0..100_000 {
        let insn = &insns[pc];
        pc += 1;
        match insn {
            Insn::Label(_) | Insn::Line(_) | Insn::Op(NOP) => (),
            Insn::Op(op @ ICONST_M1..=ICONST_5) => stack.push(*op as i32 - ICONST_0 as i32),
            Insn::Int(BIPUSH | SIPUSH, value) => stack.push(*value),
            Insn::Ldc(LoadableConstant::Int(value)) => stack.push(*value),
            Insn::Var(ILOAD, idx) => stack.push(locals[*idx as usize]),
            Insn::Var(ISTORE, idx) => locals[*idx as usize] = stack.pop().unwrap(),
            Insn::Iinc { index, increment } => locals[*index as usize] += *increment as i32,
            Insn::Op(DUP) => stack.push(*stack.last().unwrap()),
            Insn::Op(POP) => {
                stack.pop().unwrap();
            }
            Insn::Op(op @ (IADD | ISUB | IMUL)) => {
                let right = stack.pop().unwrap();
                let left = stack.pop().unwrap();
                stack.push(match *op {
                    IADD => left.wrapping_add(right),
                    ISUB => left.wrapping_sub(right),
                    _ => left.wrapping_mul(right),
                });
            }
            Insn::Op(IRETURN) => return stack.pop().unwrap(),
            Insn::Jump(GOTO, label) => pc = target(label),
            Insn::Jump(op @ IFEQ..=IFLE, label) => {
                let value = stack.pop().unwrap();
                if compare(*op - IFEQ, value, 0) {
                    pc = target(label);
                }
            }
            Insn::Jump(op @ IF_ICMPEQ..=IF_ICMPLE, label) => {
                let right = stack.pop().unwrap();
                let left = stack.pop().unwrap();
                if compare(*op - IF_ICMPEQ, left, right) {
                    pc = target(label);
                }
            }
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                let key = stack.pop().unwrap();
                pc = if key < *low || key > *high {
                    target(default)
                } else {
                    target(&targets[(key - low) as usize])
                };
            }
            Insn::LookupSwitch { default, pairs } => {
                let key = stack.pop().unwrap();
                pc = match pairs.iter().find(|(k, _)| *k == key) {
                    Some((_, label)) => target(label),
                    None => target(default),
                };
            }
            other => panic!("interpreter does not support {}", other),
        }
    }
    panic!("instruction budget exhausted")
}

/// `eq`, `ne`, `lt`, `ge`, `gt`, `le` (in opcode order)
fn compare(condition: u8, left: i32, right: i32) -> bool {
    match condition {
        0 => left == right,
        1 => left != right,
        2 => left < right,
        3 => left >= right,
        4 => left > right,
        _ => left <= right,
    }
}

/// `a/Widget` with one method, `static int size(int)`, returning its argument plus one
pub fn widget_class() -> Vec<u8> {
    let mut class = ClassNode::new("a/Widget", Some("java/lang/Object"));
    let mut method = MethodNode::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "size",
        "(I)I",
    );
    let code = method.code_mut();
    code.insns.push(Insn::Var(ILOAD, 0));
    code.insns.push(Insn::Op(ICONST_1));
    code.insns.push(Insn::Op(IADD));
    code.insns.push(Insn::Op(IRETURN));
    class.methods.push(method);
    class.to_bytes(&ObjectHierarchy).unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
