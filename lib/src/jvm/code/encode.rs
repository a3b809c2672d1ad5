//! Encoding of an instruction sequence into method bytecode
//!
//! Jumps are first laid out optimistically using their short 16-bit forms. Any jump whose target
//! turns out to be out of range is widened, and the layout redone, until nothing changes. Since a
//! widened jump is never narrowed again, this terminates.
//!
//! Widening `goto` (and `jsr`) is just a matter of switching to `goto_w` (or `jsr_w`). For
//! conditional jumps, there is no wide form, so the condition is inverted to jump over a `goto_w`:
//!
//! ```text,ignore,no_run
//!                           ifnot* L1
//!     if* L2            =>  goto_w L2
//! L1: ...               L1: ...
//! ```
//!
//! Switch padding depends on the offset of the switch, so it is recomputed on every layout pass.

use super::opcodes::*;
use super::{Insn, Label};
use crate::jvm::class_file::{BootstrapMethods, ConstantsPool, LineNumber};
use crate::jvm::{ConstantsWriter, Error, MethodDescriptor};
use std::collections::HashSet;
use std::ops::Range;

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: Range<isize> = Range {
    start: i16::MIN as isize,
    end: i16::MAX as isize + 1,
};

/// Method bytecode along with where everything ended up
#[derive(Debug)]
pub struct EncodedCode {
    pub bytes: Vec<u8>,

    /// Bytecode offset of every node in the input (pseudo-instructions get the offset of whatever
    /// comes after them)
    pub insn_offsets: Vec<usize>,

    /// Bytecode offset of every placed label
    pub label_offsets: Vec<Option<usize>>,

    pub line_numbers: Vec<LineNumber>,

    /// Index of the node after every conditional jump that was widened
    ///
    /// The `goto_w` makes what follows both a jump target and the successor of an unconditional
    /// jump, so it needs a stack map frame even though no label points at it.
    pub widened_fallthroughs: Vec<usize>,
}

impl EncodedCode {
    /// Offset of a label which is known to be placed
    pub fn label_offset(&self, label: Label) -> Result<usize, Error> {
        self.label_offsets
            .get(label.0)
            .copied()
            .flatten()
            .ok_or_else(|| Error::UnplacedLabels(vec![label]))
    }
}

/// Instruction with all of its constant pool operands already resolved
enum Lowered {
    Fixed(Vec<u8>),
    Jump(u8, Label),
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
    Label(Label),
    Line(u16),
}

impl Lowered {
    fn width(&self, offset: usize, widened: bool) -> usize {
        match self {
            Lowered::Fixed(bytes) => bytes.len(),
            Lowered::Jump(op, _) if widened => {
                if matches!(*op, GOTO | JSR) {
                    5
                } else {
                    8
                }
            }
            Lowered::Jump(_, _) => 3,
            Lowered::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len()
            }
            Lowered::LookupSwitch { pairs, .. } => 1 + switch_padding(offset) + 8 + 8 * pairs.len(),
            Lowered::Label(_) | Lowered::Line(_) => 0,
        }
    }
}

/// Zero bytes between a switch opcode at `offset` and its 4-byte aligned operands
fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// Encode instructions, interning constants into `constants` (and bootstrap methods for any
/// `invokedynamic` into `bootstrap_methods`)
pub fn encode(
    insns: &[Insn],
    label_count: usize,
    constants: &mut ConstantsPool,
    bootstrap_methods: &mut BootstrapMethods,
) -> Result<EncodedCode, Error> {
    encode_with_jump_range(
        insns,
        label_count,
        constants,
        bootstrap_methods,
        SIGNED_16BIT_JUMP_RANGE,
    )
}

/// Same as [`encode`], but with a configurable range for short jumps (only useful for testing
/// jump widening without generating huge methods)
pub fn encode_with_jump_range(
    insns: &[Insn],
    label_count: usize,
    constants: &mut ConstantsPool,
    bootstrap_methods: &mut BootstrapMethods,
    small_jump_range: Range<isize>,
) -> Result<EncodedCode, Error> {
    let lowered = insns
        .iter()
        .map(|insn| lower(insn, constants, bootstrap_methods))
        .collect::<Result<Vec<Lowered>, Error>>()?;

    // Check labels up front, so layout can assume every referenced label has an offset
    let mut placed = vec![false; label_count];
    for insn in &lowered {
        if let Lowered::Label(label) = insn {
            match placed.get_mut(label.0) {
                Some(flag) => *flag = true,
                None => return Err(Error::UnknownLabel(*label)),
            }
        }
    }
    let mut unplaced: Vec<Label> = insns
        .iter()
        .flat_map(|insn| insn.jump_targets())
        .filter(|label| !placed.get(label.0).copied().unwrap_or(false))
        .collect();
    if !unplaced.is_empty() {
        unplaced.sort();
        unplaced.dedup();
        return Err(Error::UnplacedLabels(unplaced));
    }

    let mut widened: HashSet<usize> = HashSet::new();
    let (insn_offsets, label_offsets, code_len) = loop {
        let (insn_offsets, label_offsets, code_len) = layout(&lowered, label_count, &widened);
        let mut changed = false;
        for (idx, insn) in lowered.iter().enumerate() {
            if let Lowered::Jump(_, label) = insn {
                if widened.contains(&idx) {
                    continue;
                }
                let target = label_offsets[label.0].unwrap_or(0) as isize;
                if !small_jump_range.contains(&(target - insn_offsets[idx] as isize)) {
                    widened.insert(idx);
                    changed = true;
                }
            }
        }
        if !changed {
            break (insn_offsets, label_offsets, code_len);
        }
    };

    if code_len > u16::MAX as usize {
        return Err(Error::MethodCodeOverflow(code_len));
    }

    let mut bytes = Vec::with_capacity(code_len);
    let mut line_numbers = vec![];
    let mut widened_fallthroughs = vec![];
    let target_of = |label: &Label| label_offsets[label.0].unwrap_or(0) as i64;
    for (idx, insn) in lowered.iter().enumerate() {
        let offset = insn_offsets[idx];
        debug_assert_eq!(offset, bytes.len());
        let relative = |label: &Label| (target_of(label) - offset as i64) as i32;
        match insn {
            Lowered::Fixed(fixed) => bytes.extend_from_slice(fixed),
            Lowered::Jump(op, label) if widened.contains(&idx) => match *op {
                GOTO | JSR => {
                    bytes.push(if *op == GOTO { GOTO_W } else { JSR_W });
                    bytes.extend_from_slice(&relative(label).to_be_bytes());
                }
                op => {
                    let inverted = invert_conditional_jump(op).ok_or(Error::UnknownOpcode {
                        offset,
                        opcode: op,
                    })?;
                    bytes.extend_from_slice(&[inverted, 0, 8, GOTO_W]);
                    let from_goto_w = (target_of(label) - (offset + 3) as i64) as i32;
                    bytes.extend_from_slice(&from_goto_w.to_be_bytes());
                    widened_fallthroughs.push(idx + 1);
                }
            },
            Lowered::Jump(op, label) => {
                bytes.push(*op);
                bytes.extend_from_slice(&(relative(label) as i16).to_be_bytes());
            }
            Lowered::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                bytes.push(TABLESWITCH);
                bytes.resize(bytes.len() + switch_padding(offset), 0);
                bytes.extend_from_slice(&relative(default).to_be_bytes());
                bytes.extend_from_slice(&low.to_be_bytes());
                bytes.extend_from_slice(&high.to_be_bytes());
                for target in targets {
                    bytes.extend_from_slice(&relative(target).to_be_bytes());
                }
            }
            Lowered::LookupSwitch { default, pairs } => {
                bytes.push(LOOKUPSWITCH);
                bytes.resize(bytes.len() + switch_padding(offset), 0);
                bytes.extend_from_slice(&relative(default).to_be_bytes());
                bytes.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                for (key, target) in pairs {
                    bytes.extend_from_slice(&key.to_be_bytes());
                    bytes.extend_from_slice(&relative(target).to_be_bytes());
                }
            }
            Lowered::Label(_) => (),
            Lowered::Line(line) => line_numbers.push(LineNumber {
                start_pc: offset as u16,
                line_number: *line,
            }),
        }
    }

    Ok(EncodedCode {
        bytes,
        insn_offsets,
        label_offsets,
        line_numbers,
        widened_fallthroughs,
    })
}

/// Compute the offset of every instruction and label, along with the total code length
fn layout(
    lowered: &[Lowered],
    label_count: usize,
    widened: &HashSet<usize>,
) -> (Vec<usize>, Vec<Option<usize>>, usize) {
    let mut insn_offsets = Vec::with_capacity(lowered.len());
    let mut label_offsets = vec![None; label_count];
    let mut offset = 0;
    for (idx, insn) in lowered.iter().enumerate() {
        insn_offsets.push(offset);
        if let Lowered::Label(label) = insn {
            label_offsets[label.0] = Some(offset);
        }
        offset += insn.width(offset, widened.contains(&idx));
    }
    (insn_offsets, label_offsets, offset)
}

fn u16_operand(op: u8, index: impl Into<crate::jvm::class_file::ConstantIndex>) -> Vec<u8> {
    let [hi, lo] = index.into().0.to_be_bytes();
    vec![op, hi, lo]
}

fn lower(
    insn: &Insn,
    constants: &mut ConstantsPool,
    bootstrap_methods: &mut BootstrapMethods,
) -> Result<Lowered, Error> {
    let out_of_range = |op: u8, value: i64| {
        Error::Malformed(format!("operand {} out of range for {}", value, mnemonic(op)))
    };

    Ok(Lowered::Fixed(match insn {
        Insn::Op(op) => vec![*op],
        Insn::Int(op, value) => match *op {
            BIPUSH => {
                let byte = i8::try_from(*value).map_err(|_| out_of_range(*op, *value as i64))?;
                vec![BIPUSH, byte as u8]
            }
            SIPUSH => {
                let short = i16::try_from(*value).map_err(|_| out_of_range(*op, *value as i64))?;
                let [hi, lo] = short.to_be_bytes();
                vec![SIPUSH, hi, lo]
            }
            op => {
                let byte = u8::try_from(*value).map_err(|_| out_of_range(op, *value as i64))?;
                vec![op, byte]
            }
        },
        Insn::Type(op, class) => u16_operand(*op, constants.get_class(class)?),
        Insn::Var(op, index) => {
            let op = *op;
            if *index <= 3 && op != RET {
                let short = if op >= ISTORE {
                    ISTORE_0 + (op - ISTORE) * 4
                } else {
                    ILOAD_0 + (op - ILOAD) * 4
                };
                vec![short + *index as u8]
            } else if *index <= u8::MAX as u16 {
                vec![op, *index as u8]
            } else {
                let [hi, lo] = index.to_be_bytes();
                vec![WIDE, op, hi, lo]
            }
        }
        Insn::Iinc { index, increment } => {
            if *index <= u8::MAX as u16 && i8::try_from(*increment).is_ok() {
                vec![IINC, *index as u8, *increment as i8 as u8]
            } else {
                let [ihi, ilo] = index.to_be_bytes();
                let [chi, clo] = increment.to_be_bytes();
                vec![WIDE, IINC, ihi, ilo, chi, clo]
            }
        }
        Insn::Field(op, member) => {
            let idx = constants.get_field_ref(&member.owner, &member.name, &member.descriptor)?;
            u16_operand(*op, idx)
        }
        Insn::Method {
            opcode,
            member,
            is_interface,
        } => {
            let idx = constants.get_method_ref(
                &member.owner,
                &member.name,
                &member.descriptor,
                *is_interface,
            )?;
            let mut bytes = u16_operand(*opcode, idx);
            if *opcode == INVOKEINTERFACE {
                let descriptor = MethodDescriptor::parse(&member.descriptor)?;
                bytes.push(descriptor.parameter_length(true) as u8);
                bytes.push(0);
            }
            bytes
        }
        Insn::Ldc(constant) => {
            let idx = constant.constant_index(constants)?;
            if constant.is_wide(constants)? {
                u16_operand(LDC2_W, idx)
            } else if idx.0 <= u8::MAX as u16 {
                vec![LDC, idx.0 as u8]
            } else {
                u16_operand(LDC_W, idx)
            }
        }
        Insn::Jump(op, label) => return Ok(Lowered::Jump(*op, *label)),
        Insn::TableSwitch {
            low,
            high,
            default,
            targets,
        } => {
            if *high < *low || (*high as i64 - *low as i64 + 1) as usize != targets.len() {
                return Err(Error::Malformed(format!(
                    "tableswitch {}..={} has {} targets",
                    low,
                    high,
                    targets.len()
                )));
            }
            return Ok(Lowered::TableSwitch {
                low: *low,
                high: *high,
                default: *default,
                targets: targets.clone(),
            });
        }
        Insn::LookupSwitch { default, pairs } => {
            let mut pairs = pairs.clone();
            pairs.sort_by_key(|(key, _)| *key);
            return Ok(Lowered::LookupSwitch {
                default: *default,
                pairs,
            });
        }
        Insn::MultiANewArray(class, dimensions) => {
            let mut bytes = u16_operand(MULTIANEWARRAY, constants.get_class(class)?);
            bytes.push(*dimensions);
            bytes
        }
        Insn::InvokeDynamic(site) => {
            let idx = site.constant_index(constants, bootstrap_methods)?;
            let mut bytes = u16_operand(INVOKEDYNAMIC, idx);
            bytes.extend_from_slice(&[0, 0]);
            bytes
        }
        Insn::Label(label) => return Ok(Lowered::Label(*label)),
        Insn::Line(line) => return Ok(Lowered::Line(*line)),
    }))
}
