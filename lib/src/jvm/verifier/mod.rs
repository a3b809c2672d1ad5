//! Bytecode verification utilities
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! Knowing the stack map frame at a point in the code makes it possible to verify that the next
//! instruction makes sense (eg. `dadd` only makes sense if the top two elements on the stack are
//! of type `double`). The "types" used in verification (represented using [`VerificationType`])
//! are slightly augmented to take into account initialization and null.
//!
//! When an instruction can be reached from multiple locations (eg. it is the target of jumps), the
//! frames from the different source locations need to be unified. This ends up being a fix-point
//! algorithm which converges towards the right answer (if there is one). Unifying two different
//! classes needs to know about super classes, which is what [`ClassHierarchy`] is for.
//!
//! The same analysis serves two purposes:
//!
//!   - when writing a class, [`Mode::Lenient`] computes `max_stack`, `max_locals` and the
//!     [`crate::jvm::class_file::StackMapTable`] without second-guessing the code
//!   - [`verify_class`] runs [`Mode::Strict`] over every method of an existing class, checks the
//!     stack map table stored with it, and reports what the JVM would probably reject
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod analyzer;
mod hierarchy;
mod stack_map;
mod types;

pub use analyzer::{analyze, Analysis, Frame, MethodContext, Mode};
pub use hierarchy::*;
pub use stack_map::*;
pub use types::*;

use analyzer::element_class;
use crate::jvm::class_file::{
    AttributeLike, BootstrapMethods, ClassFile, Code, Deserialize, StackMapTable,
};
use crate::jvm::code::decode::{decode_with_offsets, CodeSource};
use crate::jvm::code::{InsnList, Label};
use crate::jvm::{Error, VerifierErrorKind};
use crate::util::Width;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Problem found in one method of a class
#[derive(Debug)]
pub struct Finding {
    /// Method name followed by its descriptor
    pub method: String,
    pub error: Error,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.method, self.error)
    }
}

/// Check every method of a class
///
/// Besides analysing the code, this checks the stack map table actually stored in the class:
/// every point the JVM needs a frame at must have one, and each stored frame must accept what the
/// code brings to it.
///
/// Only a class that can't be parsed at all is an error. Everything wrong inside method bodies is
/// returned as findings (an empty list meaning nothing was found).
pub fn verify_class(bytes: &[u8], hierarchy: &dyn ClassHierarchy) -> Result<Vec<Finding>, Error> {
    let class = ClassFile::parse(bytes)?;
    let constants = &class.constants;
    let class_name = constants.class_name(class.this_class)?;

    let mut bootstrap_methods = BootstrapMethods::default();
    for attribute in &class.attributes {
        if constants.utf8(attribute.name_index)? == BootstrapMethods::NAME {
            bootstrap_methods = BootstrapMethods::deserialize(&mut attribute.info.as_slice())?;
        }
    }

    let mut findings = vec![];
    for method in &class.methods {
        let mut code = None;
        for attribute in &method.attributes {
            if constants.utf8(attribute.name_index)? == Code::NAME {
                code = Some(Code::deserialize(&mut attribute.info.as_slice())?);
            }
        }
        let code = match code {
            Some(code) => code,
            None => continue,
        };

        let context = MethodContext {
            class_name,
            name: constants.utf8(method.name_index)?,
            descriptor: constants.utf8(method.descriptor_index)?,
            is_static: method.access_flags.is_static(),
        };
        let method_name = format!("{}{}", context.name, context.descriptor);

        let (insns, offsets) = decode_with_offsets(&CodeSource {
            code: &code.code_array.0,
            exception_table: &code.exception_table,
            line_numbers: &[],
            constants,
            bootstrap_methods: &bootstrap_methods,
        })?;

        let analysis = match analyze(&context, &insns, constants, hierarchy, Mode::Strict) {
            Ok(analysis) => analysis,
            Err(error) => {
                findings.push(Finding {
                    method: method_name,
                    error,
                });
                continue;
            }
        };

        if analysis.max_stack > code.max_stack as usize {
            findings.push(Finding {
                method: method_name.clone(),
                error: Error::VerifierError {
                    index: 0,
                    kind: VerifierErrorKind::MaxStackExceeded {
                        declared: code.max_stack,
                        needed: analysis.max_stack,
                    },
                },
            });
        }
        if analysis.max_locals > code.max_locals as usize {
            findings.push(Finding {
                method: method_name.clone(),
                error: Error::VerifierError {
                    index: 0,
                    kind: VerifierErrorKind::MaxLocalsExceeded {
                        declared: code.max_locals,
                        needed: analysis.max_locals,
                    },
                },
            });
        }

        if !class.version.has_stack_map_tables() {
            continue;
        }
        let mut table = StackMapTable(vec![]);
        for attribute in &code.attributes {
            if constants.utf8(attribute.name_index)? == StackMapTable::NAME {
                table = StackMapTable::deserialize(&mut attribute.info.as_slice())?;
            }
        }
        let recorded = Frame::entry(&context)
            .map_err(|kind| Error::VerifierError { index: 0, kind })
            .and_then(|entry| entry.compact_named(|_| None))
            .and_then(|entry| read_stack_map_table(&table, entry, constants));
        let errors = match recorded {
            Ok(recorded) => check_stack_map(
                &insns,
                &offsets,
                code.code_array.0.len(),
                &analysis,
                &recorded,
                hierarchy,
            ),
            Err(error) => vec![error],
        };
        findings.extend(errors.into_iter().map(|error| Finding {
            method: method_name.clone(),
            error,
        }));
    }

    Ok(findings)
}

/// Compare a stored stack map table against the frames the analysis found
///
/// `offsets` gives the bytecode offset of every entry in `insns`.
fn check_stack_map(
    insns: &InsnList,
    offsets: &[usize],
    code_len: usize,
    analysis: &Analysis,
    recorded: &[(usize, CompactFrame<VerificationType>)],
    hierarchy: &dyn ClassHierarchy,
) -> Vec<Error> {
    let mut nodes: BTreeMap<usize, usize> = BTreeMap::new();
    for (index, offset) in offsets.iter().enumerate() {
        nodes.entry(*offset).or_insert(index);
    }
    let at = |offset: usize, kind: VerifierErrorKind| Error::VerifierError {
        index: nodes.get(&offset).copied().unwrap_or(0),
        kind,
    };

    let positions = insns.label_positions();
    let label_offset = |label: Label| {
        positions
            .get(label.index())
            .copied()
            .flatten()
            .and_then(|index| offsets.get(index).copied())
    };
    let mut required = BTreeSet::new();
    for (index, insn) in insns.iter().enumerate() {
        required.extend(insn.jump_targets().into_iter().filter_map(label_offset));
        if insn.is_real() && !insn.falls_through() {
            if let Some(next) = offsets.get(index + 1).filter(|next| **next < code_len) {
                required.insert(*next);
            }
        }
    }
    for block in &insns.try_catch_blocks {
        required.extend(label_offset(block.handler));
    }

    let mut errors = vec![];
    let stored: BTreeSet<usize> = recorded.iter().map(|(offset, _)| *offset).collect();
    for offset in required.difference(&stored) {
        errors.push(at(*offset, VerifierErrorKind::MissingFrame(*offset)));
    }

    for (offset, frame) in recorded {
        let node = match nodes.get(offset) {
            Some(node) if *offset < code_len => *node,
            _ => {
                errors.push(at(0, VerifierErrorKind::MisplacedFrame(*offset)));
                continue;
            }
        };

        // Nothing reaches unreachable code, so anything goes there
        let analysed = match analysis.frame_at(insns, node) {
            Some(analysed) => analysed,
            None => continue,
        };
        let result = analysed
            .compact_named(|index| offsets.get(index).copied())
            .and_then(|analysed| {
                check_frame(*offset, &analysed, frame, hierarchy)
                    .map_err(|kind| Error::VerifierError { index: node, kind })
            });
        if let Err(error) = result {
            errors.push(error);
        }
    }
    errors
}

/// Check that a stored frame accepts the analysed one
fn check_frame(
    offset: usize,
    analysed: &CompactFrame<VerificationType>,
    recorded: &CompactFrame<VerificationType>,
    hierarchy: &dyn ClassHierarchy,
) -> Result<(), VerifierErrorKind> {
    if analysed.stack.len() != recorded.stack.len() {
        return Err(VerifierErrorKind::FrameStackHeight {
            offset,
            found: analysed.stack.len(),
            recorded: recorded.stack.len(),
        });
    }

    // Locals are compared slot by slot, so a wide value lines up with two narrow ones
    let analysed_locals = slots(&analysed.locals);
    let recorded_locals = slots(&recorded.locals);
    let slot_count = analysed_locals.len().max(recorded_locals.len());
    let slot_type = |locals: &[VerificationType], slot: usize| {
        locals.get(slot).cloned().unwrap_or(VerificationType::Top)
    };
    let local_pairs = (0..slot_count).map(|slot| {
        (
            slot_type(&analysed_locals, slot),
            slot_type(&recorded_locals, slot),
        )
    });
    let stack_pairs = analysed
        .stack
        .iter()
        .cloned()
        .zip(recorded.stack.iter().cloned());

    for (found, expected) in local_pairs.chain(stack_pairs) {
        if !is_assignable(&found, &expected, hierarchy) {
            return Err(VerifierErrorKind::FrameMismatch {
                offset,
                found,
                recorded: expected,
            });
        }
    }
    Ok(())
}

/// Expand compact locals back out to one entry per slot
fn slots(locals: &[VerificationType]) -> Vec<VerificationType> {
    let mut slots = vec![];
    for local in locals {
        slots.push(local.clone());
        if local.width() == 2 {
            slots.push(VerificationType::Top);
        }
    }
    slots
}

fn is_assignable(
    found: &VerificationType,
    recorded: &VerificationType,
    hierarchy: &dyn ClassHierarchy,
) -> bool {
    match (found, recorded) {
        (_, VerificationType::Top) => true,
        (found, recorded) if found == recorded => true,
        (VerificationType::Null, VerificationType::Object(_)) => true,
        (VerificationType::Object(class), VerificationType::Object(super_class)) => {
            may_be_subclass(class, super_class, hierarchy)
        }
        _ => false,
    }
}

/// Whether `class` could be a subclass of `super_class`
///
/// Interfaces and classes the hierarchy doesn't know about meet at `java/lang/Object`, as does
/// anything merged without a precise hierarchy, so only a more specific common super class proves
/// two classes apart.
fn may_be_subclass(class: &str, super_class: &str, hierarchy: &dyn ClassHierarchy) -> bool {
    const OBJECT: &str = "java/lang/Object";
    if class == OBJECT || super_class == OBJECT {
        return true;
    }
    match (class.strip_prefix('['), super_class.strip_prefix('[')) {
        (Some(element), Some(super_element)) => {
            match (element_class(element), element_class(super_element)) {
                (Some(element), Some(super_element)) => {
                    may_be_subclass(element, super_element, hierarchy)
                }
                _ => element == super_element,
            }
        }
        (Some(_), None) => matches!(super_class, "java/lang/Cloneable" | "java/io/Serializable"),
        (None, Some(_)) => false,
        (None, None) => {
            let common = hierarchy.common_super_class(class, super_class);
            common == super_class || common == OBJECT
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    ) -> CompactFrame<VerificationType> {
        CompactFrame { locals, stack }
    }

    #[test]
    fn stored_frames_must_accept_the_code() {
        let analysed = frame(
            vec![VerificationType::Long, VerificationType::Integer],
            vec![VerificationType::Null],
        );

        let looser = frame(
            vec![VerificationType::Top, VerificationType::Top],
            vec![VerificationType::object("java/lang/String")],
        );
        assert_eq!(check_frame(4, &analysed, &looser, &ObjectHierarchy), Ok(()));

        let wrong = frame(
            vec![VerificationType::Long, VerificationType::Float],
            vec![VerificationType::Null],
        );
        assert_eq!(
            check_frame(4, &analysed, &wrong, &ObjectHierarchy),
            Err(VerifierErrorKind::FrameMismatch {
                offset: 4,
                found: VerificationType::Integer,
                recorded: VerificationType::Float,
            })
        );

        let taller = frame(vec![], vec![VerificationType::Null, VerificationType::Null]);
        assert!(matches!(
            check_frame(4, &analysed, &taller, &ObjectHierarchy),
            Err(VerifierErrorKind::FrameStackHeight { found: 1, recorded: 2, .. })
        ));
    }

    #[test]
    fn subclasses_are_only_ruled_out_when_known() {
        let mut hierarchy = MapHierarchy::new();
        hierarchy
            .insert("a/Cat", "a/Animal")
            .insert("a/Dog", "a/Animal");

        assert!(may_be_subclass("a/Cat", "a/Animal", &hierarchy));
        assert!(may_be_subclass("a/Cat", "a/Animal", &ObjectHierarchy));
        assert!(!may_be_subclass("a/Cat", "a/Dog", &hierarchy));
        assert!(may_be_subclass("[La/Cat;", "[La/Animal;", &hierarchy));
        assert!(!may_be_subclass("[I", "[J", &hierarchy));
        assert!(may_be_subclass("[I", "java/lang/Cloneable", &hierarchy));
        assert!(!may_be_subclass("a/Cat", "[La/Cat;", &hierarchy));
    }
}
