use super::opcodes::{self, mnemonic};
use super::Label;
use crate::jvm::class_file::{ConstantIndex, HandleKind};
use std::fmt;

/// Instruction (or pseudo-instruction) in an [`super::InsnList`]
///
/// The representation is slightly more uniform than the raw bytecode to make it convenient to
/// construct and rewrite:
///
///   - local variable instructions always use their long opcode (`iload`, not `iload_2`), and
///     `wide` doesn't show up at all; the encoder picks the shortest form
///   - `ldc`, `ldc_w` and `ldc2_w` are all just `Ldc`
///   - `goto_w` and `jsr_w` are decoded as `goto` and `jsr`; the encoder widens jumps only when
///     the target is out of range
///   - constants and members are symbolic, not constant pool indices
///
#[derive(Clone, Debug, PartialEq)]
pub enum Insn {
    /// Instruction without operands (`iadd`, `dup`, `areturn`, ...)
    Op(u8),

    /// `bipush`, `sipush`, or `newarray` (where the operand is the element type code)
    Int(u8, i32),

    /// `new`, `anewarray`, `checkcast`, or `instanceof`
    ///
    /// The class is an internal name (`java/lang/String`) or, for array classes, a descriptor
    /// (`[I`).
    Type(u8, String),

    /// Load or store of a local variable, or `ret`
    Var(u8, u16),

    Iinc { index: u16, increment: i16 },

    /// `getstatic`, `putstatic`, `getfield`, or `putfield`
    Field(u8, MemberRef),

    /// `invokevirtual`, `invokespecial`, `invokestatic`, or `invokeinterface`
    Method {
        opcode: u8,
        member: MemberRef,
        is_interface: bool,
    },

    Ldc(LoadableConstant),

    /// Conditional jump, `goto`, or `jsr`
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

    MultiANewArray(String, u8),

    InvokeDynamic(InvokeDynamicSite),

    /// Position of a label
    Label(Label),

    /// Source line number of the instructions that follow
    Line(u16),
}

impl Insn {
    /// Does this node turn into actual bytecode?
    pub fn is_real(&self) -> bool {
        !matches!(self, Insn::Label(_) | Insn::Line(_))
    }

    /// Opcode of the instruction (for `Ldc`, `ldc` is reported regardless of final encoding)
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Insn::Op(op)
            | Insn::Int(op, _)
            | Insn::Type(op, _)
            | Insn::Var(op, _)
            | Insn::Field(op, _)
            | Insn::Jump(op, _)
            | Insn::Method { opcode: op, .. } => Some(*op),
            Insn::Iinc { .. } => Some(opcodes::IINC),
            Insn::Ldc(_) => Some(opcodes::LDC),
            Insn::TableSwitch { .. } => Some(opcodes::TABLESWITCH),
            Insn::LookupSwitch { .. } => Some(opcodes::LOOKUPSWITCH),
            Insn::MultiANewArray(_, _) => Some(opcodes::MULTIANEWARRAY),
            Insn::InvokeDynamic(_) => Some(opcodes::INVOKEDYNAMIC),
            Insn::Label(_) | Insn::Line(_) => None,
        }
    }

    /// Labels this instruction may transfer control to
    pub fn jump_targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump(_, label) => vec![*label],
            Insn::TableSwitch {
                default, targets, ..
            } => {
                let mut labels = vec![*default];
                labels.extend(targets.iter().copied());
                labels
            }
            Insn::LookupSwitch { default, pairs } => {
                let mut labels = vec![*default];
                labels.extend(pairs.iter().map(|(_, label)| *label));
                labels
            }
            _ => vec![],
        }
    }

    /// Can control continue on to the next instruction?
    pub fn falls_through(&self) -> bool {
        match self {
            Insn::Op(op) => !opcodes::ends_block(*op),
            Insn::Var(op, _) => *op != opcodes::RET,
            Insn::Jump(op, _) => !matches!(*op, opcodes::GOTO | opcodes::GOTO_W),
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => false,
            _ => true,
        }
    }

    /// Same instruction, but with all labels shifted by `shift`
    pub(crate) fn shift_labels(&mut self, shift: usize) {
        match self {
            Insn::Jump(_, label) | Insn::Label(label) => *label = label.shifted(shift),
            Insn::TableSwitch {
                default, targets, ..
            } => {
                *default = default.shifted(shift);
                for target in targets {
                    *target = target.shifted(shift);
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                *default = default.shifted(shift);
                for (_, target) in pairs {
                    *target = target.shifted(shift);
                }
            }
            _ => (),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Op(op) => f.write_str(mnemonic(*op)),
            Insn::Int(op, value) => write!(f, "{} {}", mnemonic(*op), value),
            Insn::Type(op, class) => write!(f, "{} {}", mnemonic(*op), class),
            Insn::Var(op, index) => write!(f, "{} {}", mnemonic(*op), index),
            Insn::Iinc { index, increment } => write!(f, "iinc {} {}", index, increment),
            Insn::Field(op, member) => write!(f, "{} {}", mnemonic(*op), member),
            Insn::Method { opcode, member, .. } => write!(f, "{} {}", mnemonic(*opcode), member),
            Insn::Ldc(constant) => write!(f, "ldc {}", constant),
            Insn::Jump(op, label) => write!(f, "{} {}", mnemonic(*op), label),
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                write!(f, "tableswitch {}..={} ", low, high)?;
                for target in targets {
                    write!(f, "{} ", target)?;
                }
                write!(f, "default {}", default)
            }
            Insn::LookupSwitch { default, pairs } => {
                f.write_str("lookupswitch ")?;
                for (key, target) in pairs {
                    write!(f, "{}: {} ", key, target)?;
                }
                write!(f, "default {}", default)
            }
            Insn::MultiANewArray(class, dims) => write!(f, "multianewarray {} {}", class, dims),
            Insn::InvokeDynamic(site) => write!(
                f,
                "invokedynamic {}{} {}",
                site.name, site.descriptor, site.bootstrap
            ),
            Insn::Label(label) => write!(f, "{}:", label),
            Insn::Line(line) => write!(f, "line {}", line),
        }
    }
}

/// Symbolic reference to a field or method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Internal name of the class declaring the member
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> MemberRef {
        MemberRef {
            owner: owner.to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

/// Symbolic method handle
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: HandleKind,
    pub member: MemberRef,

    /// Whether the owner of `member` is an interface
    pub is_interface: bool,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.member)
    }
}

/// Anything `ldc` can load, and anything that can be a bootstrap method argument
#[derive(Clone, Debug, PartialEq)]
pub enum LoadableConstant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Class literal (internal name or array descriptor)
    Class(String),
    MethodType(String),
    Handle(Handle),

    /// Entry taken verbatim from the class' own constant pool (dynamically-computed constants)
    Pooled(ConstantIndex),
}

impl fmt::Display for LoadableConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadableConstant::Int(i) => write!(f, "{}", i),
            LoadableConstant::Float(x) => write!(f, "{}f", x),
            LoadableConstant::Long(l) => write!(f, "{}L", l),
            LoadableConstant::Double(d) => write!(f, "{}d", d),
            LoadableConstant::String(s) => write!(f, "{:?}", s),
            LoadableConstant::Class(c) => write!(f, "{}.class", c),
            LoadableConstant::MethodType(m) => write!(f, "{}", m),
            LoadableConstant::Handle(h) => write!(f, "{}", h),
            LoadableConstant::Pooled(idx) => write!(f, "#{}", idx.0),
        }
    }
}

/// Call site of an `invokedynamic`
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeDynamicSite {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: Handle,
    pub arguments: Vec<LoadableConstant>,
}

/// Exception handler, delimited by labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// Start of the protected range (inclusive)
    pub start: Label,

    /// End of the protected range (exclusive)
    pub end: Label,

    pub handler: Label,

    /// Class of exceptions caught (`None` catches everything, as in `finally`)
    pub catch_type: Option<String>,
}

impl TryCatchBlock {
    pub(crate) fn shift_labels(&mut self, shift: usize) {
        self.start = self.start.shifted(shift);
        self.end = self.end.shifted(shift);
        self.handler = self.handler.shifted(shift);
    }
}
