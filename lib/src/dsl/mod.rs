//! Fluent construction of instruction sequences
//!
//! An [`InsnBuilder`] appends instructions to an [`crate::jvm::code::InsnList`], one builder call
//! per instruction. On top of the primitive instructions it offers:
//!
//!   - a local variable allocator ([`InsnBuilder::allocate`]) which knows that `long` and `double`
//!     take two slots
//!   - structured control flow, where bodies are closures building into the same sequence
//!     ([`InsnBuilder::if_clause`], [`InsnBuilder::if_else`], [`InsnBuilder::table_switch`],
//!     [`InsnBuilder::lookup_switch`], [`InsnBuilder::synchronized`])
//!   - array literals and object construction
//!   - symbolic member references, whose names are run through a [`Remapper`] so code can be
//!     written against readable names even if the target has been renamed
//!
//! ### Counting loop
//!
//! ```
//! use classpatch::dsl::{InsnBuilder, JumpCondition, LocalKind};
//!
//! # fn build() -> Result<(), classpatch::dsl::Error> {
//! let mut b = InsnBuilder::new(1);
//! let total = b.int(0).store_new(LocalKind::Int);
//! let top = b.make_label();
//! let done = b.make_label();
//!
//! b.place_label(top)?
//!     .load_index(LocalKind::Int, 0)
//!     .jump(JumpCondition::IfLe, done)
//!     .load(total)
//!     .load_index(LocalKind::Int, 0)
//!     .iadd()
//!     .store(total)
//!     .iinc(0, -1)
//!     .goto(top);
//! b.place_label(done)?.load(total).ireturn();
//!
//! let insns = b.build()?;
//! assert_eq!(insns.len(), 14);
//! # Ok(())
//! # }
//! # build().unwrap();
//! ```

mod array;
mod builder;
mod control;
mod errors;
mod locals;
mod members;
mod remap;
mod switch;

pub use array::*;
pub use builder::*;
pub use control::*;
pub use errors::*;
pub use locals::*;
pub use members::*;
pub use remap::*;
pub use switch::*;
