use crate::jvm::binary_format::{invalid_data, Deserialize, Serialize};
use crate::jvm::class_file::{Attribute, ClassConstantIndex, ConstantsPool, Field, Method, Version};
use crate::jvm::{ClassAccessFlags, Error};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` has no super class, in which case this is index 0
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file from its bytes, rejecting trailing garbage
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        let class_file = ClassFile::deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::Malformed(format!(
                "{} unexpected bytes after the class file",
                reader.len()
            )));
        }
        Ok(class_file)
    }

    /// Encode the class file into bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Internal name of the class
    pub fn name(&self) -> Result<&str, Error> {
        self.constants.class_name(self.this_class)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(invalid_data(format!("bad magic {:02x?}", magic)));
        }
        Ok(ClassFile {
            version: Version::deserialize(reader)?,
            constants: ConstantsPool::deserialize(reader)?,
            access_flags: ClassAccessFlags::deserialize(reader)?,
            this_class: ClassConstantIndex::deserialize(reader)?,
            super_class: ClassConstantIndex::deserialize(reader)?,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}
