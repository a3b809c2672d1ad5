//! Load-time class transformation
//!
//! A [`Pipeline`] sits between whatever loads classes and the class bytes: for each class it
//! either leaves the bytes alone, swaps in replacement bytes, or parses the class into a
//! [`crate::jvm::tree::ClassNode`], runs the registered [`ClassWriter`]s over it, and writes it
//! back out. Which classes get which treatment is recorded in a [`Registry`], filled in exactly
//! once by a [`Setup`].
//!
//! ### Patching a method
//!
//! ```
//! use classpatch::transform::*;
//!
//! let pipeline = Pipeline::new(
//!     Settings::new(),
//!     setup_fn(|registry| {
//!         registry.add_writer(MethodInjector::new(
//!             "com/example/Widget",
//!             "render",
//!             "()V",
//!             InjectAt::Head,
//!             |b| {
//!                 b.invoke_static("com/example/Hooks", "beforeRender", "()V");
//!                 Ok(())
//!             },
//!         ));
//!         Ok(())
//!     }),
//! );
//!
//! // Core classes are never touched
//! let output = pipeline.transform(None, Some("java.lang.String"), &[0xCA, 0xFE]).unwrap();
//! assert_eq!(output, Output::PassThrough);
//! assert!(!pipeline.is_configured());
//! ```

mod errors;
mod export;
mod pipeline;
mod registry;
mod resources;
mod settings;
mod writer;

pub use errors::*;
pub use export::*;
pub use pipeline::*;
pub use registry::*;
pub use resources::*;
pub use settings::*;
pub use writer::*;
