//! Editable form of a whole class
//!
//! Parsing keeps the original constant pool around: new constants are only ever appended, so
//! indices inside attributes we don't understand (annotations, signatures, inner classes, ...)
//! remain valid when the class is written back out.

mod member;

pub use member::*;

use crate::jvm::class_file::{
    Attribute, AttributeLike, BootstrapMethods, BytecodeArray, ClassConstantIndex, ClassFile, Code,
    ConstantIndex, ConstantsPool, Deserialize, ExceptionHandler, Field, LineNumberTable, Method,
    StackMapTable, Version,
};
use crate::jvm::code::decode::{decode, CodeSource};
use crate::jvm::code::encode::encode;
use crate::jvm::code::InsnList;
use crate::jvm::verifier::{analyze, stack_map_table, ClassHierarchy, Frame, MethodContext, Mode};
use crate::jvm::{ClassAccessFlags, Error};
use std::collections::BTreeMap;

/// Code attributes which describe the bytecode layout, so they can't survive re-encoding
const LAYOUT_DEPENDENT_CODE_ATTRIBUTES: [&str; 6] = [
    "LineNumberTable",
    "StackMapTable",
    "LocalVariableTable",
    "LocalVariableTypeTable",
    "RuntimeVisibleTypeAnnotations",
    "RuntimeInvisibleTypeAnnotations",
];

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub version: Version,
    pub access_flags: ClassAccessFlags,

    /// Internal name (eg. `java/lang/String`)
    pub name: String,

    /// Only `java/lang/Object` has no super class
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,

    /// Class attributes other than `BootstrapMethods`, kept in raw form
    pub attributes: Vec<Attribute>,

    /// Constant pool of the parsed class (or empty, for a new class)
    constants: ConstantsPool,
    bootstrap_methods: BootstrapMethods,
}

impl ClassNode {
    pub fn new(name: &str, super_name: Option<&str>) -> ClassNode {
        ClassNode {
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name: name.to_owned(),
            super_name: super_name.map(str::to_owned),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            constants: ConstantsPool::new(),
            bootstrap_methods: BootstrapMethods::default(),
        }
    }

    /// Constant pool the class was parsed from
    pub fn constants(&self) -> &ConstantsPool {
        &self.constants
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    pub fn method_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut MethodNode> {
        self.methods
            .iter_mut()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Parse a class, decoding all method bodies
    pub fn parse(bytes: &[u8]) -> Result<ClassNode, Error> {
        let class_file = ClassFile::parse(bytes)?;
        let constants = class_file.constants;

        let name = constants.class_name(class_file.this_class)?.to_owned();
        let super_name = if class_file.super_class.0 .0 == 0 {
            None
        } else {
            Some(constants.class_name(class_file.super_class)?.to_owned())
        };
        let interfaces = class_file
            .interfaces
            .iter()
            .map(|interface| constants.class_name(*interface).map(str::to_owned))
            .collect::<Result<Vec<_>, _>>()?;

        let mut bootstrap_methods = BootstrapMethods::default();
        let mut attributes = vec![];
        for attribute in class_file.attributes {
            if constants.utf8(attribute.name_index)? == BootstrapMethods::NAME {
                bootstrap_methods = BootstrapMethods::deserialize(&mut attribute.info.as_slice())?;
            } else {
                attributes.push(attribute);
            }
        }

        let fields = class_file
            .fields
            .into_iter()
            .map(|field| {
                Ok(FieldNode {
                    access_flags: field.access_flags,
                    name: constants.utf8(field.name_index)?.to_owned(),
                    descriptor: constants.utf8(field.descriptor_index)?.to_owned(),
                    attributes: field.attributes,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut methods = vec![];
        for method in class_file.methods {
            let name = constants.utf8(method.name_index)?.to_owned();
            let descriptor = constants.utf8(method.descriptor_index)?.to_owned();
            let mut code = None;
            let mut attributes = vec![];
            for attribute in method.attributes {
                if constants.utf8(attribute.name_index)? == Code::NAME {
                    let parsed = Code::deserialize(&mut attribute.info.as_slice())?;
                    code = Some(parse_code(parsed, &constants, &bootstrap_methods)?);
                } else {
                    attributes.push(attribute);
                }
            }
            methods.push(MethodNode {
                access_flags: method.access_flags,
                name,
                descriptor,
                code,
                attributes,
            });
        }

        Ok(ClassNode {
            version: class_file.version,
            access_flags: class_file.access_flags,
            name,
            super_name,
            interfaces,
            fields,
            methods,
            attributes,
            constants,
            bootstrap_methods,
        })
    }

    /// Encode the class, recomputing code layout, maximums, and stack map frames
    pub fn to_bytes(&self, hierarchy: &dyn ClassHierarchy) -> Result<Vec<u8>, Error> {
        self.to_class_file(hierarchy)?.to_bytes()
    }

    pub fn to_class_file(&self, hierarchy: &dyn ClassHierarchy) -> Result<ClassFile, Error> {
        let mut constants = self.constants.clone();
        let mut bootstrap_methods = self.bootstrap_methods.clone();

        let this_class = constants.get_class(&self.name)?;
        let super_class = match &self.super_name {
            Some(super_name) => constants.get_class(super_name)?,
            None => ClassConstantIndex(ConstantIndex(0)),
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|interface| constants.get_class(interface))
            .collect::<Result<Vec<_>, _>>()?;

        let mut fields = vec![];
        for field in &self.fields {
            fields.push(Field {
                access_flags: field.access_flags,
                name_index: constants.get_utf8(field.name.as_str())?,
                descriptor_index: constants.get_utf8(field.descriptor.as_str())?,
                attributes: field.attributes.clone(),
            });
        }

        let mut methods = vec![];
        for method in &self.methods {
            let name_index = constants.get_utf8(method.name.as_str())?;
            let descriptor_index = constants.get_utf8(method.descriptor.as_str())?;
            let mut attributes = vec![];
            if let Some(code) = &method.code {
                let context = MethodContext {
                    class_name: &self.name,
                    name: &method.name,
                    descriptor: &method.descriptor,
                    is_static: method.access_flags.is_static(),
                };
                let code = self.encode_code(
                    &context,
                    code,
                    &mut constants,
                    &mut bootstrap_methods,
                    hierarchy,
                )?;
                attributes.push(constants.get_attribute(code)?);
            }
            attributes.extend(method.attributes.iter().cloned());
            methods.push(Method {
                access_flags: method.access_flags,
                name_index,
                descriptor_index,
                attributes,
            });
        }

        let mut attributes = self.attributes.clone();
        if !bootstrap_methods.0.is_empty() {
            attributes.push(constants.get_attribute(bootstrap_methods)?);
        }

        Ok(ClassFile {
            version: self.version,
            constants,
            access_flags: self.access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn encode_code(
        &self,
        context: &MethodContext,
        code: &CodeNode,
        constants: &mut ConstantsPool,
        bootstrap_methods: &mut BootstrapMethods,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<Code, Error> {
        // Unreachable code would need frames nobody can compute, so it is dropped
        let mut analysis = analyze(context, &code.insns, constants, hierarchy, Mode::Lenient)?;
        let mut pruned;
        let insns = if code
            .insns
            .iter()
            .zip(&analysis.frames)
            .any(|(insn, frame)| insn.is_real() && frame.is_none())
        {
            pruned = code.insns.clone();
            let frames = &analysis.frames;
            pruned.retain_indexed(|idx, insn| !insn.is_real() || frames[idx].is_some());
            analysis = analyze(context, &pruned, constants, hierarchy, Mode::Lenient)?;
            &pruned
        } else {
            &code.insns
        };

        let encoded = encode(insns.insns(), insns.label_count(), constants, bootstrap_methods)?;

        let mut exception_table = vec![];
        let mut frame_labels = vec![];
        for block in &insns.try_catch_blocks {
            let start_pc = encoded.label_offset(block.start)?;
            let end_pc = encoded.label_offset(block.end)?;
            if start_pc >= end_pc {
                continue;
            }
            let catch_type = match &block.catch_type {
                Some(class) => constants.get_class(class)?.into(),
                None => ConstantIndex(0),
            };
            exception_table.push(ExceptionHandler {
                start_pc: start_pc as u16,
                end_pc: end_pc as u16,
                handler_pc: encoded.label_offset(block.handler)? as u16,
                catch_type,
            });
            frame_labels.push(block.handler);
        }

        let max_stack = u16::try_from(analysis.max_stack)
            .map_err(|_| Error::MethodCodeMaxStackOverflow(analysis.max_stack))?;
        let max_locals = u16::try_from(analysis.max_locals)
            .map_err(|_| Error::MethodCodeMaxLocalsOverflow(analysis.max_locals))?;

        let mut attributes = vec![];
        if !encoded.line_numbers.is_empty() {
            let table = LineNumberTable(encoded.line_numbers.clone());
            attributes.push(constants.get_attribute(table)?);
        }

        if self.version.has_stack_map_tables() {
            for insn in insns {
                frame_labels.extend(insn.jump_targets());
            }
            let positions = insns.label_positions();
            let mut frame_points = encoded.widened_fallthroughs.clone();
            for label in frame_labels {
                let position = positions
                    .get(label.index())
                    .copied()
                    .flatten()
                    .ok_or_else(|| Error::UnplacedLabels(vec![label]))?;
                frame_points.push(position);
            }
            let new_offset = |idx: usize| encoded.insn_offsets.get(idx).copied();

            let mut frames = BTreeMap::new();
            for position in frame_points {
                let offset = new_offset(position).ok_or_else(|| {
                    Error::Malformed(format!("frame position {} is past the code", position))
                })?;
                if frames.contains_key(&offset) {
                    continue;
                }
                let frame = analysis.frame_at(insns, position).ok_or_else(|| {
                    Error::Malformed(format!("no instruction follows position {}", position))
                })?;
                frames.insert(offset, frame.compact(constants, new_offset)?);
            }

            if !frames.is_empty() {
                let entry = Frame::entry(context)
                    .map_err(|kind| Error::VerifierError { index: 0, kind })?
                    .compact(constants, new_offset)?;
                let frames: Vec<_> = frames.into_iter().collect();
                let table: StackMapTable = stack_map_table(&entry, &frames);
                attributes.push(constants.get_attribute(table)?);
            }
        }

        attributes.extend(code.attributes.iter().cloned());

        Ok(Code {
            max_stack,
            max_locals,
            code_array: BytecodeArray(encoded.bytes),
            exception_table,
            attributes,
        })
    }
}

fn parse_code(
    code: Code,
    constants: &ConstantsPool,
    bootstrap_methods: &BootstrapMethods,
) -> Result<CodeNode, Error> {
    let mut line_numbers = vec![];
    let mut attributes = vec![];
    for attribute in code.attributes {
        let name = constants.utf8(attribute.name_index)?;
        if name == LineNumberTable::NAME {
            let table = LineNumberTable::deserialize(&mut attribute.info.as_slice())?;
            line_numbers.extend(table.0);
        } else if !LAYOUT_DEPENDENT_CODE_ATTRIBUTES.contains(&name) {
            attributes.push(attribute);
        }
    }
    line_numbers.sort_by_key(|line| line.start_pc);

    let insns: InsnList = decode(&CodeSource {
        code: &code.code_array.0,
        exception_table: &code.exception_table,
        line_numbers: &line_numbers,
        constants,
        bootstrap_methods,
    })?;

    Ok(CodeNode {
        insns,
        max_stack: code.max_stack,
        max_locals: code.max_locals,
        attributes,
    })
}
