use crate::jvm::class_file::Attribute;
use crate::jvm::code::InsnList;
use crate::jvm::{FieldAccessFlags, MethodAccessFlags};

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub access_flags: FieldAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<Attribute>,
}

impl FieldNode {
    pub fn new(access_flags: FieldAccessFlags, name: &str, descriptor: &str) -> FieldNode {
        FieldNode {
            access_flags,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            attributes: vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodNode {
    pub access_flags: MethodAccessFlags,
    pub name: String,
    pub descriptor: String,

    /// Absent for `abstract` and `native` methods
    pub code: Option<CodeNode>,

    /// Method attributes other than `Code`
    pub attributes: Vec<Attribute>,
}

impl MethodNode {
    pub fn new(access_flags: MethodAccessFlags, name: &str, descriptor: &str) -> MethodNode {
        MethodNode {
            access_flags,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            code: None,
            attributes: vec![],
        }
    }

    /// Method body, created empty if there wasn't one
    pub fn code_mut(&mut self) -> &mut CodeNode {
        self.code.get_or_insert_with(CodeNode::default)
    }
}

/// Method body
///
/// `max_stack` and `max_locals` are what was declared in the parsed class. They are informative
/// only: both get recomputed when the class is written.
#[derive(Debug, Clone, Default)]
pub struct CodeNode {
    pub insns: InsnList,
    pub max_stack: u16,
    pub max_locals: u16,

    /// Code attributes which don't depend on the bytecode layout
    pub attributes: Vec<Attribute>,
}
