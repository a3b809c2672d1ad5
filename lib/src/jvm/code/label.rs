use std::fmt;

/// Opaque jump target
///
/// Labels are indices into the label arena of the [`super::InsnList`] that created them. A label
/// can be handed out (and jumped to) long before it is placed, but it must be placed exactly once
/// before the list is encoded.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(pub(crate) usize);

impl Label {
    /// Position of the label in its arena
    pub fn index(&self) -> usize {
        self.0
    }

    /// Same label, after its list has been spliced behind `shift` other labels
    pub(crate) fn shifted(&self, shift: usize) -> Label {
        Label(self.0 + shift)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, formatter)
    }
}
