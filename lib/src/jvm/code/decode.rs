//! Decoding of method bytecode into an [`InsnList`]
//!
//! Decoding happens in two passes: the first pass reads instructions with jumps still pointing at
//! absolute bytecode offsets, and the second pass swaps those offsets for labels (placing each
//! label just before the instruction at its offset).

use super::opcodes::*;
use super::{Handle, Insn, InsnList, InvokeDynamicSite, Label, LoadableConstant, MemberRef};
use super::TryCatchBlock;
use crate::jvm::class_file::{
    BootstrapMethods, ClassConstantIndex, Constant, ConstantIndex, ConstantsPool,
    ExceptionHandler, LineNumber,
};
use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::{BTreeMap, BTreeSet};

/// Everything needed to decode a `Code` attribute
pub struct CodeSource<'a> {
    pub code: &'a [u8],
    pub exception_table: &'a [ExceptionHandler],
    pub line_numbers: &'a [LineNumber],
    pub constants: &'a ConstantsPool,
    pub bootstrap_methods: &'a BootstrapMethods,
}

/// Instruction with jumps not yet resolved to labels
enum Pending {
    Ready(Insn),
    Jump(u8, usize),
    TableSwitch {
        low: i32,
        high: i32,
        default: usize,
        targets: Vec<usize>,
    },
    LookupSwitch {
        default: usize,
        pairs: Vec<(i32, usize)>,
    },
}

/// Decode bytecode into instructions
pub fn decode(source: &CodeSource) -> Result<InsnList, Error> {
    decode_with_offsets(source).map(|(insns, _)| insns)
}

/// Decode bytecode into instructions, along with the bytecode offset of every node
///
/// Labels and line numbers get the offset of the instruction they precede. A label at the very
/// end of the code gets the code length.
pub fn decode_with_offsets(source: &CodeSource) -> Result<(InsnList, Vec<usize>), Error> {
    let code = source.code;
    let mut pending: Vec<(usize, Pending)> = vec![];
    let mut targets: BTreeSet<usize> = BTreeSet::new();

    let mut reader: &[u8] = code;
    while !reader.is_empty() {
        let offset = code.len() - reader.len();
        let insn = decode_one(offset, &mut reader, source)?;
        match &insn {
            Pending::Ready(_) => (),
            Pending::Jump(_, target) => {
                targets.insert(*target);
            }
            Pending::TableSwitch {
                default,
                targets: switch_targets,
                ..
            } => {
                targets.insert(*default);
                targets.extend(switch_targets.iter().copied());
            }
            Pending::LookupSwitch { default, pairs } => {
                targets.insert(*default);
                targets.extend(pairs.iter().map(|(_, target)| *target));
            }
        }
        pending.push((offset, insn));
    }

    let starts: BTreeSet<usize> = pending.iter().map(|(offset, _)| *offset).collect();
    for handler in source.exception_table {
        targets.insert(handler.start_pc as usize);
        targets.insert(handler.end_pc as usize);
        targets.insert(handler.handler_pc as usize);
    }

    // Every target must be the start of an instruction (or, for the end of exception ranges,
    // the end of the code)
    let mut labels: BTreeMap<usize, Label> = BTreeMap::new();
    for (idx, target) in targets.into_iter().enumerate() {
        if !starts.contains(&target) && target != code.len() {
            return Err(Error::BadJumpTarget {
                offset: 0,
                target: target as i64,
            });
        }
        labels.insert(target, Label(idx));
    }
    let label_count = labels.len();

    let mut lines: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
    for line in source.line_numbers {
        lines
            .entry(line.start_pc as usize)
            .or_default()
            .push(line.line_number);
    }

    let resolve = |target: usize| -> Label { labels[&target] };
    let mut insns = vec![];
    let mut offsets = vec![];
    for (offset, insn) in pending {
        if let Some(label) = labels.get(&offset) {
            insns.push(Insn::Label(*label));
            offsets.push(offset);
        }
        for line in lines.get(&offset).into_iter().flatten() {
            insns.push(Insn::Line(*line));
            offsets.push(offset);
        }
        offsets.push(offset);
        insns.push(match insn {
            Pending::Ready(insn) => insn,
            Pending::Jump(op, target) => Insn::Jump(op, resolve(target)),
            Pending::TableSwitch {
                low,
                high,
                default,
                targets,
            } => Insn::TableSwitch {
                low,
                high,
                default: resolve(default),
                targets: targets.into_iter().map(resolve).collect(),
            },
            Pending::LookupSwitch { default, pairs } => Insn::LookupSwitch {
                default: resolve(default),
                pairs: pairs
                    .into_iter()
                    .map(|(key, target)| (key, resolve(target)))
                    .collect(),
            },
        });
    }
    if let Some(label) = labels.get(&code.len()) {
        insns.push(Insn::Label(*label));
        offsets.push(code.len());
    }

    let mut try_catch_blocks = vec![];
    for handler in source.exception_table {
        let catch_type = if handler.catch_type.0 == 0 {
            None
        } else {
            let class = ClassConstantIndex(handler.catch_type);
            Some(source.constants.class_name(class)?.to_owned())
        };
        try_catch_blocks.push(TryCatchBlock {
            start: resolve(handler.start_pc as usize),
            end: resolve(handler.end_pc as usize),
            handler: resolve(handler.handler_pc as usize),
            catch_type,
        });
    }

    Ok((
        InsnList::from_parts(insns, label_count, try_catch_blocks),
        offsets,
    ))
}

/// Absolute target of a relative jump, checked to be inside the code
fn jump_target(offset: usize, relative: i32, code_len: usize) -> Result<usize, Error> {
    let target = offset as i64 + relative as i64;
    if target < 0 || target >= code_len as i64 {
        return Err(Error::BadJumpTarget { offset, target });
    }
    Ok(target as usize)
}

fn decode_one(offset: usize, reader: &mut &[u8], source: &CodeSource) -> Result<Pending, Error> {
    let code_len = source.code.len();
    let constants = source.constants;
    let opcode = reader.read_u8()?;

    let insn = match opcode {
        _ if is_zero_operand(opcode) => Insn::Op(opcode),
        BIPUSH => Insn::Int(opcode, reader.read_i8()? as i32),
        SIPUSH => Insn::Int(opcode, reader.read_i16::<BigEndian>()? as i32),
        NEWARRAY => Insn::Int(opcode, reader.read_u8()? as i32),
        LDC => {
            let index = ConstantIndex(reader.read_u8()? as u16);
            Insn::Ldc(loadable_constant(constants, index)?)
        }
        LDC_W | LDC2_W => {
            let index = ConstantIndex(reader.read_u16::<BigEndian>()?);
            Insn::Ldc(loadable_constant(constants, index)?)
        }
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var(opcode, reader.read_u8()? as u16),
        ILOAD_0..=ALOAD_3 => {
            let n = opcode - ILOAD_0;
            Insn::Var(ILOAD + n / 4, (n % 4) as u16)
        }
        ISTORE_0..=ASTORE_3 => {
            let n = opcode - ISTORE_0;
            Insn::Var(ISTORE + n / 4, (n % 4) as u16)
        }
        IINC => Insn::Iinc {
            index: reader.read_u8()? as u16,
            increment: reader.read_i8()? as i16,
        },
        WIDE => match reader.read_u8()? {
            IINC => Insn::Iinc {
                index: reader.read_u16::<BigEndian>()?,
                increment: reader.read_i16::<BigEndian>()?,
            },
            op @ (ILOAD..=ALOAD | ISTORE..=ASTORE | RET) => {
                Insn::Var(op, reader.read_u16::<BigEndian>()?)
            }
            op => {
                return Err(Error::UnknownOpcode {
                    offset: offset + 1,
                    opcode: op,
                })
            }
        },
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let relative = reader.read_i16::<BigEndian>()? as i32;
            return Ok(Pending::Jump(opcode, jump_target(offset, relative, code_len)?));
        }
        GOTO_W | JSR_W => {
            let relative = reader.read_i32::<BigEndian>()?;
            let op = if opcode == GOTO_W { GOTO } else { JSR };
            return Ok(Pending::Jump(op, jump_target(offset, relative, code_len)?));
        }
        TABLESWITCH | LOOKUPSWITCH => {
            let padding = (4 - (offset + 1) % 4) % 4;
            for _ in 0..padding {
                reader.read_u8()?;
            }
            let default = jump_target(offset, reader.read_i32::<BigEndian>()?, code_len)?;
            if opcode == TABLESWITCH {
                let low = reader.read_i32::<BigEndian>()?;
                let high = reader.read_i32::<BigEndian>()?;
                if low > high {
                    return Err(Error::Malformed(format!(
                        "tableswitch at {} has low {} above high {}",
                        offset, low, high
                    )));
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                let mut targets = Vec::with_capacity(count.min(code_len));
                for _ in 0..count {
                    let relative = reader.read_i32::<BigEndian>()?;
                    targets.push(jump_target(offset, relative, code_len)?);
                }
                return Ok(Pending::TableSwitch {
                    low,
                    high,
                    default,
                    targets,
                });
            } else {
                let count = reader.read_i32::<BigEndian>()?;
                if count < 0 {
                    return Err(Error::Malformed(format!(
                        "lookupswitch at {} has negative pair count",
                        offset
                    )));
                }
                let mut pairs = Vec::with_capacity((count as usize).min(code_len));
                for _ in 0..count {
                    let key = reader.read_i32::<BigEndian>()?;
                    let relative = reader.read_i32::<BigEndian>()?;
                    pairs.push((key, jump_target(offset, relative, code_len)?));
                }
                return Ok(Pending::LookupSwitch { default, pairs });
            }
        }
        GETSTATIC..=PUTFIELD => {
            let index = ConstantIndex(reader.read_u16::<BigEndian>()?);
            let (owner, name, descriptor, _) = constants.member_ref(index)?;
            Insn::Field(opcode, MemberRef::new(owner, name, descriptor))
        }
        INVOKEVIRTUAL..=INVOKEINTERFACE => {
            let index = ConstantIndex(reader.read_u16::<BigEndian>()?);
            if opcode == INVOKEINTERFACE {
                let _count = reader.read_u8()?;
                let _zero = reader.read_u8()?;
            }
            let (owner, name, descriptor, is_interface) = constants.member_ref(index)?;
            Insn::Method {
                opcode,
                member: MemberRef::new(owner, name, descriptor),
                is_interface,
            }
        }
        INVOKEDYNAMIC => {
            let index = ConstantIndex(reader.read_u16::<BigEndian>()?);
            let _zeros = reader.read_u16::<BigEndian>()?;
            Insn::InvokeDynamic(invoke_dynamic_site(source, index)?)
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            let index = ClassConstantIndex(ConstantIndex(reader.read_u16::<BigEndian>()?));
            Insn::Type(opcode, constants.class_name(index)?.to_owned())
        }
        MULTIANEWARRAY => {
            let index = ClassConstantIndex(ConstantIndex(reader.read_u16::<BigEndian>()?));
            let dimensions = reader.read_u8()?;
            Insn::MultiANewArray(constants.class_name(index)?.to_owned(), dimensions)
        }
        _ => return Err(Error::UnknownOpcode { offset, opcode }),
    };
    Ok(Pending::Ready(insn))
}

/// Resolve a method handle constant
pub fn method_handle(constants: &ConstantsPool, index: ConstantIndex) -> Result<Handle, Error> {
    match constants.get(index)? {
        Constant::MethodHandle {
            handle_kind,
            member,
        } => {
            let (owner, name, descriptor, is_interface) = constants.member_ref(*member)?;
            Ok(Handle {
                kind: *handle_kind,
                member: MemberRef::new(owner, name, descriptor),
                is_interface,
            })
        }
        _ => Err(Error::BadConstant {
            index,
            expected: "MethodHandle",
        }),
    }
}

/// Resolve a constant which can be loaded with `ldc` (or passed to a bootstrap method)
pub fn loadable_constant(
    constants: &ConstantsPool,
    index: ConstantIndex,
) -> Result<LoadableConstant, Error> {
    Ok(match constants.get(index)? {
        Constant::Integer(i) => LoadableConstant::Int(*i),
        Constant::Float(f) => LoadableConstant::Float(*f),
        Constant::Long(l) => LoadableConstant::Long(*l),
        Constant::Double(d) => LoadableConstant::Double(*d),
        Constant::String(utf8) => LoadableConstant::String(constants.utf8(*utf8)?.to_owned()),
        Constant::Class(utf8) => LoadableConstant::Class(constants.utf8(*utf8)?.to_owned()),
        Constant::MethodType { descriptor } => {
            LoadableConstant::MethodType(constants.utf8(*descriptor)?.to_owned())
        }
        Constant::MethodHandle { .. } => LoadableConstant::Handle(method_handle(constants, index)?),
        Constant::Dynamic { .. } => LoadableConstant::Pooled(index),
        _ => {
            return Err(Error::BadConstant {
                index,
                expected: "loadable constant",
            })
        }
    })
}

fn invoke_dynamic_site(source: &CodeSource, index: ConstantIndex) -> Result<InvokeDynamicSite, Error> {
    let constants = source.constants;
    let (bootstrap_method, name_and_type) = match constants.get(index)? {
        Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        } => (*bootstrap_method, *name_and_type),
        _ => {
            return Err(Error::BadConstant {
                index,
                expected: "InvokeDynamic",
            })
        }
    };
    let (name, descriptor) = constants.name_and_type(name_and_type)?;
    let bootstrap = source
        .bootstrap_methods
        .0
        .get(bootstrap_method as usize)
        .ok_or_else(|| {
            Error::Malformed(format!("missing bootstrap method {}", bootstrap_method))
        })?;
    let arguments = bootstrap
        .bootstrap_arguments
        .iter()
        .map(|arg| loadable_constant(constants, *arg))
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(InvokeDynamicSite {
        name: name.to_owned(),
        descriptor: descriptor.to_owned(),
        bootstrap: method_handle(constants, bootstrap.bootstrap_method)?,
        arguments,
    })
}
