use crate::jvm;
use crate::jvm::code::Label;
use std::fmt;

/// Mistakes in how a sequence is being built
///
/// These indicate a bug in the code doing the building, so they are reported as soon as they are
/// detected.
#[derive(Debug)]
pub enum Error {
    /// Switch without any cases
    EmptySwitch,

    /// Two cases of the same switch share a key
    DuplicateSwitchKey(i32),

    /// Keys of a table switch span more entries than a jump table can hold
    SwitchTooWide { low: i32, high: i32 },

    /// Labels jumped to (or bounding an exception range) which were never placed
    UnplacedLabels(Vec<Label>),

    LabelPlacedTwice(Label),

    /// Method to build into does not exist on the class
    NoSuchMethod {
        owner: String,
        name: String,
        descriptor: String,
    },

    Jvm(jvm::Error),
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        match err {
            jvm::Error::UnplacedLabels(labels) => Error::UnplacedLabels(labels),
            jvm::Error::LabelPlacedTwice(label) => Error::LabelPlacedTwice(label),
            other => Error::Jvm(other),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptySwitch => f.write_str("switch has no cases"),
            Error::DuplicateSwitchKey(key) => write!(f, "duplicate switch key {}", key),
            Error::SwitchTooWide { low, high } => write!(
                f,
                "table switch from {} to {} is too wide, use a lookup switch",
                low, high
            ),
            Error::UnplacedLabels(labels) => write!(f, "labels never placed: {:?}", labels),
            Error::LabelPlacedTwice(label) => write!(f, "label {} placed twice", label),
            Error::NoSuchMethod {
                owner,
                name,
                descriptor,
            } => write!(f, "no method {}.{}{}", owner, name, descriptor),
            Error::Jvm(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}
