//! Read, edit, and write JVM classes
//!
//! ### Round-tripping a class
//!
//! A class is parsed into a [`tree::ClassNode`], where every method body is decoded into an
//! [`code::InsnList`]. After editing, writing the class back out recomputes everything that
//! depends on the final layout of the bytecode: jump offsets (widening jumps that no longer fit),
//! `max_stack`, `max_locals`, and the stack map frames required by the verifier.
//!
//! ```
//! use classpatch::jvm::code::{opcodes, Insn};
//! use classpatch::jvm::tree::{ClassNode, MethodNode};
//! use classpatch::jvm::verifier::ObjectHierarchy;
//! use classpatch::jvm::*;
//!
//! # fn make_class() -> Result<(), Error> {
//! let mut class = ClassNode::new("me/alec/Counter", Some("java/lang/Object"));
//!
//! let mut method = MethodNode::new(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "next", "(I)I");
//! let code = method.code_mut();
//! code.insns.push(Insn::Var(opcodes::ILOAD, 0));
//! code.insns.push(Insn::Op(opcodes::ICONST_1));
//! code.insns.push(Insn::Op(opcodes::IADD));
//! code.insns.push(Insn::Op(opcodes::IRETURN));
//! class.methods.push(method);
//!
//! let bytes: Vec<u8> = class.to_bytes(&ObjectHierarchy)?;
//! let parsed = ClassNode::parse(&bytes)?;
//! assert_eq!(parsed.name, "me/alec/Counter");
//! # Ok(())
//! # }
//! # make_class().unwrap();
//! ```

mod access_flags;
mod binary_format;
pub mod class_file;
pub mod code;
mod constants_writer;
mod descriptors;
mod errors;
pub mod tree;
pub mod verifier;

pub use access_flags::*;
pub use constants_writer::*;
pub use descriptors::*;
pub use errors::*;
