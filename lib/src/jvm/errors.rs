use super::class_file::{Constant, ConstantIndex};
use super::code::Label;
use super::verifier::VerificationType;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Input does not follow the class file format
    Malformed(String),

    ConstantPoolOverflow {
        constant: Constant,
        offset: u16,
    },

    /// Constant pool index is out of bounds or points at the wrong kind of constant
    BadConstant {
        index: ConstantIndex,
        expected: &'static str,
    },

    BadDescriptor(String),

    UnknownOpcode {
        offset: usize,
        opcode: u8,
    },

    /// Jump, switch, or exception table offset which doesn't land on an instruction
    BadJumpTarget {
        offset: usize,
        target: i64,
    },

    MethodCodeOverflow(usize),
    MethodCodeMaxStackOverflow(usize),
    MethodCodeMaxLocalsOverflow(usize),

    /// Labels which are jumped to (or bound to exception ranges) but never placed
    UnplacedLabels(Vec<Label>),

    /// A label can only be placed once
    LabelPlacedTwice(Label),

    /// Label is not part of the instruction list it is used in
    UnknownLabel(Label),

    /// Frame analysis failed at the instruction with this index
    VerifierError {
        index: usize,
        kind: VerifierErrorKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    InvalidLocal(u16),
    InvalidType {
        found: VerificationType,
        expected: &'static str,
    },
    IncompatibleTypes(VerificationType, VerificationType),

    /// Two control flow edges reach an instruction with different stack heights
    StackHeightMismatch(usize, usize),

    /// Execution can run past the last instruction
    FallsOffEnd,

    BadDescriptor(String),

    /// `jsr`/`ret` subroutines (only legal before class version 51)
    Subroutine,

    UnsupportedOpcode(u8),

    /// Declared `max_stack` is smaller than what the code needs
    MaxStackExceeded { declared: u16, needed: usize },

    /// Declared `max_locals` is smaller than what the code needs
    MaxLocalsExceeded { declared: u16, needed: usize },

    /// Jump target, exception handler, or instruction after an unconditional jump which has no
    /// stack map frame (the offset is the bytecode offset)
    MissingFrame(usize),

    /// Stack map frame at a bytecode offset which doesn't start an instruction
    MisplacedFrame(usize),

    /// Stack map frame whose stack height differs from the code reaching it
    FrameStackHeight {
        offset: usize,
        found: usize,
        recorded: usize,
    },

    /// Stack map frame which doesn't accept a type the code puts in that slot
    FrameMismatch {
        offset: usize,
        found: VerificationType,
        recorded: VerificationType,
    },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Malformed(msg) => write!(f, "malformed class file: {}", msg),
            Error::ConstantPoolOverflow { constant, offset } => {
                write!(f, "constant pool overflow at #{} adding {:?}", offset, constant)
            }
            Error::BadConstant { index, expected } => {
                write!(f, "constant #{} is not a valid {}", index.0, expected)
            }
            Error::BadDescriptor(desc) => write!(f, "bad descriptor '{}'", desc),
            Error::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode 0x{:02x} at offset {}", opcode, offset)
            }
            Error::BadJumpTarget { offset, target } => {
                write!(f, "bad jump target {} from offset {}", target, offset)
            }
            Error::MethodCodeOverflow(len) => write!(f, "method code is too long ({} bytes)", len),
            Error::MethodCodeMaxStackOverflow(max) => write!(f, "max stack {} is too large", max),
            Error::MethodCodeMaxLocalsOverflow(max) => {
                write!(f, "max locals {} is too large", max)
            }
            Error::UnplacedLabels(labels) => write!(f, "labels never placed: {:?}", labels),
            Error::LabelPlacedTwice(label) => write!(f, "label {:?} placed twice", label),
            Error::UnknownLabel(label) => write!(f, "label {:?} is not from this list", label),
            Error::VerifierError { index, kind } => {
                write!(f, "at instruction {}: {}", index, kind)
            }
        }
    }
}

impl fmt::Display for VerifierErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierErrorKind::EmptyStack => write!(f, "pop from an empty stack"),
            VerifierErrorKind::InvalidWidth(width) => {
                write!(f, "operand has unexpected width {}", width)
            }
            VerifierErrorKind::InvalidLocal(idx) => write!(f, "invalid local variable {}", idx),
            VerifierErrorKind::InvalidType { found, expected } => {
                write!(f, "expected {} but found {}", expected, found)
            }
            VerifierErrorKind::IncompatibleTypes(t1, t2) => {
                write!(f, "incompatible types {} and {}", t1, t2)
            }
            VerifierErrorKind::StackHeightMismatch(h1, h2) => {
                write!(f, "stack heights {} and {} do not match", h1, h2)
            }
            VerifierErrorKind::FallsOffEnd => write!(f, "execution falls off the end of the code"),
            VerifierErrorKind::BadDescriptor(desc) => write!(f, "bad descriptor '{}'", desc),
            VerifierErrorKind::Subroutine => write!(f, "jsr/ret subroutines are not supported"),
            VerifierErrorKind::UnsupportedOpcode(op) => {
                write!(f, "unsupported opcode 0x{:02x}", op)
            }
            VerifierErrorKind::MaxStackExceeded { declared, needed } => {
                write!(f, "max stack is {} but {} is needed", declared, needed)
            }
            VerifierErrorKind::MaxLocalsExceeded { declared, needed } => {
                write!(f, "max locals is {} but {} is needed", declared, needed)
            }
            VerifierErrorKind::MissingFrame(offset) => {
                write!(f, "no stack map frame at offset {}", offset)
            }
            VerifierErrorKind::MisplacedFrame(offset) => {
                write!(f, "stack map frame at offset {} is not at an instruction", offset)
            }
            VerifierErrorKind::FrameStackHeight {
                offset,
                found,
                recorded,
            } => write!(
                f,
                "stack map frame at offset {} has {} stack entries but the code has {}",
                offset, recorded, found
            ),
            VerifierErrorKind::FrameMismatch {
                offset,
                found,
                recorded,
            } => write!(
                f,
                "stack map frame at offset {} expects {} but found {}",
                offset, recorded, found
            ),
        }
    }
}

impl std::error::Error for Error {}
