//! Field and method descriptors, as described in [section 4.3][0]
//!
//! Descriptors are parsed from and rendered back into their string form. Parse failures are
//! reported as [`Error::BadDescriptor`] carrying the whole offending descriptor.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.3

use super::Error;
use crate::util::Width;
use std::fmt;

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    fn from_char(c: u8) -> Option<BaseType> {
        Some(match c {
            b'B' => BaseType::Byte,
            b'C' => BaseType::Char,
            b'D' => BaseType::Double,
            b'F' => BaseType::Float,
            b'I' => BaseType::Int,
            b'J' => BaseType::Long,
            b'S' => BaseType::Short,
            b'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    fn as_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

/// Type of a field, parameter, return value, or array element
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),

    /// Class given by internal name (eg. `java/lang/String`)
    Object(String),

    /// Array of the boxed element type
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor such as `[Ljava/lang/String;`
    pub fn parse(descriptor: &str) -> Result<FieldType, Error> {
        let mut cursor = Cursor::new(descriptor);
        let field_type = cursor.field_type()?;
        cursor.finish()?;
        Ok(field_type)
    }

    pub fn object(class_name: &str) -> FieldType {
        FieldType::Object(class_name.to_owned())
    }

    pub fn array(element_type: FieldType) -> FieldType {
        FieldType::Array(Box::new(element_type))
    }

    /// Name as it appears in a `Class` constant: the internal name for plain objects and the
    /// full descriptor for arrays
    ///
    /// Primitive types have no such name.
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Base(_) => None,
            FieldType::Object(name) => Some(name.clone()),
            array => Some(array.to_string()),
        }
    }
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            _ => 1,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base_type) => write!(f, "{}", base_type.as_char()),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(element_type) => write!(f, "[{}", element_type),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a complete method descriptor such as `(IJ)V`
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor, Error> {
        let mut cursor = Cursor::new(descriptor);
        cursor.expect(b'(')?;
        let mut parameters = vec![];
        while cursor.peek() != Some(b')') {
            parameters.push(cursor.field_type()?);
        }
        cursor.expect(b')')?;
        let return_type = if cursor.peek() == Some(b'V') {
            cursor.position += 1;
            None
        } else {
            Some(cursor.field_type()?)
        };
        cursor.finish()?;
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Local variable slots taken by the parameters (and `this`, if there is one)
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_width = usize::from(has_this_param);
        this_width + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Number of operand stack slots taken by the return value
    pub fn return_width(&self) -> usize {
        self.return_type.as_ref().map_or(0, Width::width)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{}", parameter)?;
        }
        match &self.return_type {
            None => f.write_str(")V"),
            Some(return_type) => write!(f, "){}", return_type),
        }
    }
}

/// Position in a descriptor being parsed
///
/// Descriptors are ASCII apart from class names, and class names are only ever split at `;`, so
/// working on bytes is safe.
struct Cursor<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Cursor<'a> {
        Cursor {
            source,
            position: 0,
        }
    }

    fn error(&self) -> Error {
        Error::BadDescriptor(self.source.to_owned())
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.position).copied()
    }

    fn next(&mut self) -> Result<u8, Error> {
        let c = self.peek().ok_or_else(|| self.error())?;
        self.position += 1;
        Ok(c)
    }

    fn expect(&mut self, expected: u8) -> Result<(), Error> {
        if self.next()? == expected {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn finish(&self) -> Result<(), Error> {
        if self.position == self.source.len() {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn field_type(&mut self) -> Result<FieldType, Error> {
        let mut dimensions = 0;
        while self.peek() == Some(b'[') {
            self.position += 1;
            dimensions += 1;
        }
        if dimensions > 255 {
            return Err(self.error());
        }

        let mut field_type = match self.next()? {
            b'L' => {
                let rest = &self.source[self.position..];
                let end = rest.find(';').ok_or_else(|| self.error())?;
                let name = &rest[..end];
                if name.is_empty() || name.contains(['.', '[']) {
                    return Err(self.error());
                }
                self.position += end + 1;
                FieldType::object(name)
            }
            c => FieldType::Base(BaseType::from_char(c).ok_or_else(|| self.error())?),
        };
        for _ in 0..dimensions {
            field_type = FieldType::array(field_type);
        }
        Ok(field_type)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const INT: FieldType = FieldType::Base(BaseType::Int);
    const DOUBLE: FieldType = FieldType::Base(BaseType::Double);

    #[test]
    fn field_types() {
        for (rendered, parsed) in [
            ("I", INT),
            ("Z", FieldType::Base(BaseType::Boolean)),
            ("Ljava/lang/Object;", FieldType::object("java/lang/Object")),
            (
                "[[[D",
                FieldType::array(FieldType::array(FieldType::array(DOUBLE))),
            ),
            (
                "[Ljava/lang/String;",
                FieldType::array(FieldType::object("java/lang/String")),
            ),
        ] {
            assert_eq!(FieldType::parse(rendered).unwrap(), parsed);
            assert_eq!(parsed.to_string(), rendered);
        }
    }

    #[test]
    fn method_descriptors() {
        let desc = MethodDescriptor::parse("(IDLjava/lang/Integer;)Ljava/lang/Object;").unwrap();
        assert_eq!(
            desc,
            MethodDescriptor {
                parameters: vec![INT, DOUBLE, FieldType::object("java/lang/Integer")],
                return_type: Some(FieldType::object("java/lang/Object")),
            }
        );
        assert_eq!(
            desc.to_string(),
            "(IDLjava/lang/Integer;)Ljava/lang/Object;"
        );

        let void = MethodDescriptor::parse("()V").unwrap();
        assert!(void.parameters.is_empty());
        assert_eq!(void.return_type, None);
    }

    #[test]
    fn malformed_descriptors() {
        for bad in ["", "Ljava/lang/Object", "L;", "II", "La.b;", "[", "V", "Q"] {
            assert!(
                matches!(FieldType::parse(bad), Err(Error::BadDescriptor(d)) if d == bad),
                "{}",
                bad
            );
        }
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("()VV").is_err());
    }

    #[test]
    fn widths() {
        let desc = MethodDescriptor::parse("(JIDLjava/lang/String;)J").unwrap();
        assert_eq!(desc.parameter_length(true), 7);
        assert_eq!(desc.parameter_length(false), 6);
        assert_eq!(desc.return_width(), 2);
    }

    #[test]
    fn class_names() {
        assert_eq!(FieldType::parse("[[I").unwrap().class_name().unwrap(), "[[I");
        assert_eq!(
            FieldType::parse("Ljava/util/List;").unwrap().class_name().unwrap(),
            "java/util/List"
        );
        assert_eq!(INT.class_name(), None);
    }
}
