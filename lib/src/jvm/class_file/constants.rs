use crate::jvm::binary_format::{invalid_data, read_bytes, Deserialize, Serialize};
use crate::jvm::class_file::{Attribute, AttributeLike};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::result::Result;

/// Class file constants pool
///
/// The pool is append only. A pool read from an existing class keeps all of its entries at their
/// original indices (so attributes we never decode stay valid), and new constants are only ever
/// added after them. Insertion through the `get_*` methods de-duplicates against everything
/// already in the pool, including entries that came from the original class.
#[derive(Debug, Clone)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    utf8s: HashMap<String, Utf8ConstantIndex>,
    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, ConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<[u8; 4], ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<[u8; 8], ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    field_refs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), ConstantIndex>,
    method_refs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), ConstantIndex>,
    method_handles: HashMap<(HandleKind, ConstantIndex), ConstantIndex>,
    method_types: HashMap<Utf8ConstantIndex, ConstantIndex>,
    invoke_dynamics: HashMap<(u16, NameAndTypeConstantIndex), ConstantIndex>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            field_refs: HashMap::new(),
            method_refs: HashMap::new(),
            method_handles: HashMap::new(),
            method_types: HashMap::new(),
            invoke_dynamics: HashMap::new(),
        }
    }

    /// Number of slots the pool takes up, which is also the `constant_pool_count` in the class
    /// file (index 0 is never used)
    pub fn count(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> {
        self.constants
            .iter()
            .map(|(offset, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset: u16 = self.constants.offset_len().0 as u16;

        if offset.checked_add(constant.width() as u16).is_none() {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }

        self.remember(ConstantIndex(offset), &constant);
        self.constants.push(constant);
        Ok(ConstantIndex(offset))
    }

    /// Record a constant in the de-duplication maps (first occurrence wins)
    fn remember(&mut self, index: ConstantIndex, constant: &Constant) {
        match constant {
            Constant::Utf8(string) => {
                self.utf8s
                    .entry(string.clone())
                    .or_insert(Utf8ConstantIndex(index));
            }
            Constant::Class(name) => {
                self.classes
                    .entry(*name)
                    .or_insert(ClassConstantIndex(index));
            }
            Constant::String(utf8) => {
                self.strings.entry(*utf8).or_insert(index);
            }
            Constant::Integer(integer) => {
                self.integers.entry(*integer).or_insert(index);
            }
            Constant::Float(float) => {
                self.floats.entry(float.to_be_bytes()).or_insert(index);
            }
            Constant::Long(long) => {
                self.longs.entry(*long).or_insert(index);
            }
            Constant::Double(double) => {
                self.doubles.entry(double.to_be_bytes()).or_insert(index);
            }
            Constant::NameAndType { name, descriptor } => {
                self.name_and_types
                    .entry((*name, *descriptor))
                    .or_insert(NameAndTypeConstantIndex(index));
            }
            Constant::FieldRef(class, name_and_type) => {
                self.field_refs
                    .entry((*class, *name_and_type))
                    .or_insert(index);
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                self.method_refs
                    .entry((*class, *name_and_type, *is_interface))
                    .or_insert(index);
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                self.method_handles
                    .entry((*handle_kind, *member))
                    .or_insert(index);
            }
            Constant::MethodType { descriptor } => {
                self.method_types.entry(*descriptor).or_insert(index);
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                self.invoke_dynamics
                    .entry((*bootstrap_method, *name_and_type))
                    .or_insert(index);
            }
            Constant::Dynamic { .. } | Constant::Module(_) | Constant::Package(_) => (),
        }
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, Error> {
        let cow = utf8.into();
        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let constant = Constant::Utf8(cow.into_owned());
            Ok(Utf8ConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Get or insert a class constant (`name` is an internal name or an array descriptor)
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        if let Some(idx) = self.classes.get(&name) {
            Ok(*idx)
        } else {
            Ok(ClassConstantIndex(self.push_constant(Constant::Class(name))?))
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, string: &str) -> Result<ConstantIndex, Error> {
        let utf8 = self.get_utf8(string)?;
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            self.push_constant(Constant::String(utf8))
        }
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        match self.integers.get(&integer) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Integer(integer)),
        }
    }

    /// Floats are keyed by their bits so that `NaN` payloads and `-0.0` are kept distinct
    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        match self.floats.get(&float.to_be_bytes()) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Float(float)),
        }
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        match self.longs.get(&long) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Long(long)),
        }
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        match self.doubles.get(&double.to_be_bytes()) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Double(double)),
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.name_and_types.get(&(name, descriptor)) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            Ok(NameAndTypeConstantIndex(self.push_constant(constant)?))
        }
    }

    pub fn get_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        match self.field_refs.get(&(class, name_and_type)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::FieldRef(class, name_and_type)),
        }
    }

    pub fn get_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<ConstantIndex, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        match self.method_refs.get(&(class, name_and_type, is_interface)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            }),
        }
    }

    pub fn get_method_handle(
        &mut self,
        handle_kind: HandleKind,
        member: ConstantIndex,
    ) -> Result<ConstantIndex, Error> {
        match self.method_handles.get(&(handle_kind, member)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::MethodHandle {
                handle_kind,
                member,
            }),
        }
    }

    pub fn get_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, Error> {
        let descriptor = self.get_utf8(descriptor)?;
        match self.method_types.get(&descriptor) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::MethodType { descriptor }),
        }
    }

    /// Get or insert an invoke dynamic constant from the constant pool
    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        match self.invoke_dynamics.get(&(bootstrap_method, name_and_type)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            }),
        }
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];
        attribute.serialize(&mut info)?;
        Ok(Attribute { name_index, info })
    }

    /// Look up a constant by index
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.constants
            .get_offset(Offset(index.0 as usize))
            .ok_or(Error::BadConstant {
                index,
                expected: "constant",
            })
    }

    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Error::BadConstant {
                index: index.0,
                expected: "Utf8",
            }),
        }
    }

    /// Internal name (or array descriptor) of a class constant
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(Error::BadConstant {
                index: index.0,
                expected: "Class",
            }),
        }
    }

    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::BadConstant {
                index: index.0,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a `Fieldref`, `Methodref`, or `InterfaceMethodref` into its owner, name,
    /// descriptor, and whether the owner is an interface
    pub fn member_ref(&self, index: ConstantIndex) -> Result<(&str, &str, &str, bool), Error> {
        let (class, name_and_type, is_interface) = match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => (*class, *name_and_type, false),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => (*class, *name_and_type, *is_interface),
            _ => {
                return Err(Error::BadConstant {
                    index,
                    expected: "member reference",
                })
            }
        };
        let owner = self.class_name(class)?;
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok((owner, name, descriptor, is_interface))
    }
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.count().serialize(writer)?;
        for constant in self.constants.values() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantsPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let count = u16::deserialize(reader)?;
        let mut pool = ConstantsPool::new();
        while pool.count() < count {
            let constant = Constant::deserialize(reader)?;
            pool.push_constant(constant)
                .map_err(|_| invalid_data("constant pool overflows its declared count"))?;
        }
        if pool.count() != count {
            return Err(invalid_data("wide constant overruns the constant pool count"));
        }
        Ok(pool)
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// `FieldRef` for field handles, `MethodRef` for the rest
        member: ConstantIndex,
    },

    MethodType {
        descriptor: Utf8ConstantIndex,
    },

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = read_bytes(reader, len as usize)?;
                Constant::Utf8(decode_modified_utf8(&bytes)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            other => return Err(invalid_data(format!("unknown constant tag {}", other))),
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        for unit in c.encode_utf16(&mut units).iter() {
            let unit = *unit;
            if unit != 0 && unit < 0x80 {
                buffer.push(unit as u8);
            } else if unit < 0x800 {
                buffer.push((unit >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Unpaired surrogates can't be represented in a Rust string, so they are rejected.
pub fn decode_modified_utf8(bytes: &[u8]) -> std::io::Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let continuation = |b: Option<&u8>| -> std::io::Result<u16> {
        match b {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
            _ => Err(invalid_data("truncated modified UTF-8 sequence")),
        }
    };
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0b1110_0000 == 0b1100_0000 {
            let b1 = continuation(bytes.get(i + 1))?;
            units.push(((b0 & 0x1F) as u16) << 6 | b1);
            i += 2;
        } else if b0 & 0b1111_0000 == 0b1110_0000 {
            let b1 = continuation(bytes.get(i + 1))?;
            let b2 = continuation(bytes.get(i + 2))?;
            units.push(((b0 & 0x0F) as u16) << 12 | b1 << 6 | b2);
            i += 3;
        } else {
            return Err(invalid_data(format!("invalid modified UTF-8 byte {:#x}", b0)));
        }
    }
    String::from_utf16(&units).map_err(|_| invalid_data("unpaired surrogate in UTF-8 constant"))
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(decode_modified_utf8(b"java/lang/Object").unwrap(), "java/lang/Object");
    }

    #[test]
    fn two_and_three_byte_encodings() {
        assert_eq!(
            encode_modified_utf8("ĄǍ"),
            vec![196, 132, 199, 141]
        );
        assert_eq!(
            encode_modified_utf8("ऄअ"),
            vec![224, 164, 132, 224, 164, 133]
        );
        for text in ["ĄǍǞǠǺȀȂȦȺӐӒ", "ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ"] {
            assert_eq!(decode_modified_utf8(&encode_modified_utf8(text)).unwrap(), text);
        }
    }

    #[test]
    fn supplementary_characters() {
        assert_eq!(
            encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}"),
            vec![
                237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237,
                191, 191
            ]
        );
        assert_eq!(
            decode_modified_utf8(&encode_modified_utf8("\u{1F600}")).unwrap(),
            "\u{1F600}"
        );
    }

    #[test]
    fn rejects_truncated_sequences() {
        assert!(decode_modified_utf8(&[0xE0, 0x80]).is_err());
        assert!(decode_modified_utf8(&[0xC0]).is_err());
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

impl From<Utf8ConstantIndex> for ConstantIndex {
    fn from(index: Utf8ConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl From<ClassConstantIndex> for ConstantIndex {
    fn from(index: ClassConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl From<NameAndTypeConstantIndex> for ConstantIndex {
    fn from(index: NameAndTypeConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

macro_rules! typed_index_binary_format {
    ($index:ident) => {
        impl Serialize for $index {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Deserialize for $index {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                Ok($index(ConstantIndex::deserialize(reader)?))
            }
        }
    };
}

typed_index_binary_format!(Utf8ConstantIndex);
typed_index_binary_format!(NameAndTypeConstantIndex);
typed_index_binary_format!(ClassConstantIndex);

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    pub fn tag(&self) -> u8 {
        match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Option<HandleKind> {
        let kind = match tag {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        };
        Some(kind)
    }

    /// Does the handle refer to a field (as opposed to a method)?
    pub fn is_field(&self) -> bool {
        matches!(
            self,
            HandleKind::GetField | HandleKind::GetStatic | HandleKind::PutField | HandleKind::PutStatic
        )
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        HandleKind::from_tag(tag)
            .ok_or_else(|| invalid_data(format!("unknown method handle kind {}", tag)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deduplicates_inserted_constants() {
        let mut pool = ConstantsPool::new();
        let a = pool.get_method_ref("java/lang/Object", "<init>", "()V", false).unwrap();
        let b = pool.get_method_ref("java/lang/Object", "<init>", "()V", false).unwrap();
        assert_eq!(a, b);

        let c = pool.get_method_ref("java/lang/Object", "<init>", "()V", true).unwrap();
        assert_ne!(a, c);

        assert_eq!(
            pool.member_ref(a).unwrap(),
            ("java/lang/Object", "<init>", "()V", false)
        );
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        assert_eq!(pool.get_long(1).unwrap(), ConstantIndex(1));
        assert_eq!(pool.get_double(2.5).unwrap(), ConstantIndex(3));
        assert_eq!(pool.get_integer(3).unwrap(), ConstantIndex(5));
        assert_eq!(pool.count(), 6);
        assert!(pool.get(ConstantIndex(2)).is_err());
    }

    #[test]
    fn parsed_pool_keeps_indices_and_deduplicates() {
        let mut original = ConstantsPool::new();
        original.get_string("hello").unwrap();
        original.get_long(-1).unwrap();
        original.get_class("a/B").unwrap();

        let mut bytes = vec![];
        original.serialize(&mut bytes).unwrap();
        let mut parsed = ConstantsPool::deserialize(&mut &bytes[..]).unwrap();

        assert_eq!(parsed.count(), original.count());
        let class_index = parsed.get_class("a/B").unwrap();
        assert_eq!(parsed.count(), original.count());
        assert_eq!(parsed.class_name(class_index).unwrap(), "a/B");
        assert_eq!(parsed.get_long(-1).unwrap(), ConstantIndex(3));
    }

    #[test]
    fn float_keys_are_bitwise() {
        let mut pool = ConstantsPool::new();
        let zero = pool.get_float(0.0).unwrap();
        let negative_zero = pool.get_float(-0.0).unwrap();
        assert_ne!(zero, negative_zero);
    }
}
