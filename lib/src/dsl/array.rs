use super::{Error, InsnBuilder};
use crate::jvm::code::opcodes::*;
use crate::jvm::code::Insn;
use crate::jvm::{self, BaseType, FieldType};

type Element<'a, 'r> = Box<dyn FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error> + 'a>;

/// Elements of an array literal, each given by code pushing its value
pub struct ArrayBuilder<'a, 'r> {
    elements: Vec<Element<'a, 'r>>,
}

#[allow(clippy::new_without_default)]
impl<'a, 'r> ArrayBuilder<'a, 'r> {
    pub fn new() -> ArrayBuilder<'a, 'r> {
        ArrayBuilder { elements: vec![] }
    }

    pub fn element(
        mut self,
        value: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error> + 'a,
    ) -> Self {
        self.elements.push(Box::new(value));
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Instruction storing into an array with the given element type
fn array_store(element_type: &FieldType) -> u8 {
    match element_type {
        FieldType::Base(BaseType::Boolean | BaseType::Byte) => BASTORE,
        FieldType::Base(BaseType::Char) => CASTORE,
        FieldType::Base(BaseType::Short) => SASTORE,
        FieldType::Base(BaseType::Int) => IASTORE,
        FieldType::Base(BaseType::Long) => LASTORE,
        FieldType::Base(BaseType::Float) => FASTORE,
        FieldType::Base(BaseType::Double) => DASTORE,
        FieldType::Object(_) | FieldType::Array(_) => AASTORE,
    }
}

impl<'r> InsnBuilder<'r> {
    /// Allocate an array of elements with type `element_descriptor` and fill it in
    ///
    /// Each element is stored with `dup`, the index, the element's own code, and the array store
    /// matching the element type. The filled array is left on the stack.
    pub fn array(
        &mut self,
        element_descriptor: &str,
        elements: ArrayBuilder<'_, 'r>,
    ) -> Result<&mut Self, Error> {
        let element_type = FieldType::parse(element_descriptor)?;
        let length = i32::try_from(elements.len())
            .map_err(|_| jvm::Error::BadDescriptor(element_descriptor.to_owned()))?;

        self.int(length);
        match &element_type {
            FieldType::Base(base) => self.newarray(*base),
            reference => self.anewarray(&reference.class_name().unwrap_or_default()),
        };

        let store = array_store(&element_type);
        for (index, element) in elements.elements.into_iter().enumerate() {
            self.dup().int(index as i32);
            element(self)?;
            self.push(Insn::Op(store));
        }
        Ok(self)
    }

    /// `new`, `dup`, the constructor arguments, then `invokespecial <init>`
    pub fn create_instance(
        &mut self,
        class: &str,
        constructor_descriptor: &str,
        arguments: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.new_object(class).dup();
        arguments(self)?;
        Ok(self.invoke_special(class, "<init>", constructor_descriptor))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::MemberRef;

    #[test]
    fn object_arrays() {
        let mut builder = InsnBuilder::new(0);
        let elements = ArrayBuilder::new()
            .element(|b| {
                b.string("a");
                Ok(())
            })
            .element(|b| {
                b.aconst_null();
                Ok(())
            });
        builder.array("Ljava/lang/String;", elements).unwrap();
        let insns = builder.build().unwrap();

        assert_eq!(insns[0], Insn::Op(ICONST_2));
        assert_eq!(insns[1], Insn::Type(ANEWARRAY, String::from("java/lang/String")));
        assert_eq!(insns[2], Insn::Op(DUP));
        assert_eq!(insns[3], Insn::Op(ICONST_0));
        assert_eq!(insns[5], Insn::Op(AASTORE));
        assert_eq!(insns[7], Insn::Op(ICONST_1));
        assert_eq!(insns[9], Insn::Op(AASTORE));
        assert_eq!(insns.len(), 10);
    }

    #[test]
    fn primitive_arrays_use_matching_stores() {
        let cases = [
            ("Z", T_BOOLEAN, BASTORE),
            ("C", T_CHAR, CASTORE),
            ("S", T_SHORT, SASTORE),
            ("I", T_INT, IASTORE),
            ("J", T_LONG, LASTORE),
            ("F", T_FLOAT, FASTORE),
            ("D", T_DOUBLE, DASTORE),
        ];
        for (descriptor, type_code, store) in cases {
            let mut builder = InsnBuilder::new(0);
            let elements = ArrayBuilder::new().element(|b| {
                b.int(0);
                Ok(())
            });
            builder.array(descriptor, elements).unwrap();
            let insns = builder.build().unwrap();
            assert_eq!(insns[1], Insn::Int(NEWARRAY, type_code as i32));
            assert_eq!(insns[5], Insn::Op(store), "{}", descriptor);
        }
    }

    #[test]
    fn nested_arrays_allocate_by_descriptor() {
        let mut builder = InsnBuilder::new(0);
        builder.array("[I", ArrayBuilder::new()).unwrap();
        let insns = builder.build().unwrap();
        assert_eq!(insns[1], Insn::Type(ANEWARRAY, String::from("[I")));
    }

    #[test]
    fn bad_element_descriptors() {
        let mut builder = InsnBuilder::new(0);
        assert!(builder.array("Q", ArrayBuilder::new()).is_err());
    }

    #[test]
    fn instances_are_constructed() {
        let mut builder = InsnBuilder::new(0);
        builder
            .create_instance("a/Point", "(II)V", |b| {
                b.int(1).int(2);
                Ok(())
            })
            .unwrap();
        let insns = builder.build().unwrap();
        assert_eq!(
            insns.insns(),
            &[
                Insn::Type(NEW, String::from("a/Point")),
                Insn::Op(DUP),
                Insn::Op(ICONST_1),
                Insn::Op(ICONST_2),
                Insn::Method {
                    opcode: INVOKESPECIAL,
                    member: MemberRef::new("a/Point", "<init>", "(II)V"),
                    is_interface: false,
                },
            ]
        );
    }
}
