//! Low level class file format
//!
//! Everything here maps one-to-one onto the structures in [chapter 4 of the JVM
//! specification][0]. Method bodies are left as raw bytes; see [`crate::jvm::code`] for decoding
//! them and [`crate::jvm::tree`] for the editable form of a whole class.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html

mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod version;

pub use crate::jvm::binary_format::{Deserialize, Serialize};
pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use version::*;
