//! Build JVM bytecode sequences and splice them into classes as they load
//!
//! The crate is organized bottom-up:
//!
//!   - [`jvm`] reads and writes class files, decodes method bodies into an editable
//!     [`jvm::code::InsnList`], and recomputes stack map frames when a class is written back out
//!   - [`dsl`] is a fluent [`dsl::InsnBuilder`] for assembling instruction sequences, including
//!     structured helpers for `if`/`else`, switches, `synchronized` regions, and arrays
//!   - [`transform`] is the load-time [`transform::Pipeline`] which decides, for each class, whether
//!     to pass it through, replace it outright, or run registered writers over it
//!
//! ### Injecting a call at the start of a method
//!
//! ```
//! use classpatch::dsl::InsnBuilder;
//! use classpatch::transform::{InjectAt, MethodInjector};
//!
//! let injector = MethodInjector::new("com/example/Widget", "render", "()V", InjectAt::Head, |b| {
//!     b.get_static("java/lang/System", "out", "Ljava/io/PrintStream;")
//!         .string("rendering")
//!         .invoke_virtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V");
//!     Ok(())
//! });
//! # let _ = injector;
//! # let _ = InsnBuilder::new(0);
//! ```

pub mod dsl;
pub mod jvm;
pub mod transform;
mod util;
