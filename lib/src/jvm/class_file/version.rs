use crate::jvm::binary_format::{Deserialize, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file format version
///
/// Note that the minor version comes first in the binary format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const JAVA5: Version = Version { major: 49, minor: 0 };
    pub const JAVA6: Version = Version { major: 50, minor: 0 };
    pub const JAVA7: Version = Version { major: 51, minor: 0 };
    pub const JAVA8: Version = Version { major: 52, minor: 0 };
    pub const JAVA11: Version = Version { major: 55, minor: 0 };
    pub const JAVA17: Version = Version { major: 61, minor: 0 };

    /// Class files from Java 6 onwards carry stack map tables (and from Java 7 onwards, the JVM
    /// insists on them)
    pub fn has_stack_map_tables(&self) -> bool {
        self.major >= Version::JAVA6.major
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor.serialize(writer)?;
        self.major.serialize(writer)
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let minor = u16::deserialize(reader)?;
        let major = u16::deserialize(reader)?;
        Ok(Version { major, minor })
    }
}
