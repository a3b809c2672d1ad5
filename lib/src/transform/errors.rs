use crate::dsl;
use crate::jvm;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Replacement bytes for a class could not be read
    ResourceLoad {
        class_name: String,
        path: String,
        source: std::io::Error,
    },

    /// Registering writers and replacements failed part way through
    Setup(String),

    /// A writer could not apply its change
    Writer { class_name: String, message: String },

    /// Parsing or writing the class failed
    Class(jvm::Error),

    /// Code being injected was built incorrectly
    Builder(dsl::Error),
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Class(err)
    }
}

impl From<dsl::Error> for Error {
    fn from(err: dsl::Error) -> Error {
        Error::Builder(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ResourceLoad {
                class_name,
                path,
                source,
            } => write!(
                f,
                "could not load replacement '{}' for {}: {}",
                path, class_name, source
            ),
            Error::Setup(msg) => write!(f, "setup failed: {}", msg),
            Error::Writer {
                class_name,
                message,
            } => write!(f, "writer for {} failed: {}", class_name, message),
            Error::Class(err) => write!(f, "{}", err),
            Error::Builder(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ResourceLoad { source, .. } => Some(source),
            Error::Class(err) => Some(err),
            Error::Builder(err) => Some(err),
            _ => None,
        }
    }
}
