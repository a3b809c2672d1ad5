//! Bytecode representation
//!
//! Method bodies are represented as an [`InsnList`]: a flat sequence of [`Insn`] nodes in which
//! jump targets are [`Label`]s rather than offsets. Labels are placed into the sequence with a
//! pseudo-instruction, which means code can be inserted anywhere without having to fix up any
//! offsets. Offsets only come back into existence in [`encode`], once the code is final.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5

pub mod decode;
pub mod encode;
mod insn;
mod label;
mod list;
pub mod opcodes;

pub use insn::*;
pub use label::*;
pub use list::*;
