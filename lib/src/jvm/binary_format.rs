use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Counterpart of [`Serialize`] for reading class files back in
///
/// Errors are plain `std::io::Error`s: either the input ran out early, or it contained something
/// that doesn't fit the format (reported as `ErrorKind::InvalidData`).
pub trait Deserialize: Sized {
    /// Deserialize construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self>;
}

macro_rules! big_endian_primitive {
    ($typ:ty, $write:ident, $read:ident) => {
        impl Serialize for $typ {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }

        impl Deserialize for $typ {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                reader.$read::<BigEndian>()
            }
        }
    };
}

big_endian_primitive!(u16, write_u16, read_u16);
big_endian_primitive!(u32, write_u32, read_u32);
big_endian_primitive!(u64, write_u64, read_u64);
big_endian_primitive!(i16, write_i16, read_i16);
big_endian_primitive!(i32, write_i32, read_i32);
big_endian_primitive!(i64, write_i64, read_i64);
big_endian_primitive!(f32, write_f32, read_f32);
big_endian_primitive!(f64, write_f64, read_f64);

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u8()
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Deserialize for i8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i8()
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let len = u16::deserialize(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` raw bytes
pub fn read_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Shorthand for an `InvalidData` error
pub fn invalid_data(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn big_endian_layout() {
        let mut out = vec![];
        0x1234u16.serialize(&mut out).unwrap();
        (-2i32).serialize(&mut out).unwrap();
        assert_eq!(out, vec![0x12, 0x34, 0xFF, 0xFF, 0xFF, 0xFE]);

        let mut input = &out[..];
        assert_eq!(u16::deserialize(&mut input).unwrap(), 0x1234);
        assert_eq!(i32::deserialize(&mut input).unwrap(), -2);
        assert!(input.is_empty());
    }

    #[test]
    fn vectors_are_length_prefixed() {
        let mut out = vec![];
        vec![7u16, 8u16].serialize(&mut out).unwrap();
        assert_eq!(out, vec![0, 2, 0, 7, 0, 8]);

        let parsed: Vec<u16> = Vec::deserialize(&mut &out[..]).unwrap();
        assert_eq!(parsed, vec![7, 8]);
    }

    #[test]
    fn truncated_input() {
        let input = [0u8, 3, 0, 1];
        assert!(Vec::<u16>::deserialize(&mut &input[..]).is_err());
    }
}
