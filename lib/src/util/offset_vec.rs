use std::fmt::{Debug, Error, Formatter};
use std::iter::FromIterator;
use std::result::Result;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// A vector of elements of different logical "widths", where offsets into the vector are the sum
/// of the widths of the preceding elements rather than their count.
///
/// Class files need this in two places:
///
///   - the constant pool, where `long` and `double` entries use up two indices
///   - the operand stack, where `long` and `double` values count twice towards `max_stack`
///
#[derive(Clone)]
pub struct OffsetVec<T> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,

    /// Offset for the first element (usually 0, but 1 for the constant pool)
    initial_offset: Offset,
}

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
            initial_offset,
        }
    }

    /// Number of entries (not the sum of their widths)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset of the next element to be added
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Sum of the widths of all entries
    pub fn total_width(&self) -> usize {
        self.offset_len.0 - self.initial_offset.0
    }

    /// Add an entry to the back, returning the offset at which it was added
    pub fn push(&mut self, elem: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += elem.width();
        self.entries.push((offset, elem));
        offset
    }

    /// Remove an entry from the back
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop().map(|(offset, elem)| {
            self.offset_len = offset;
            elem
        })
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.last().map(|(_, elem)| elem)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.offset_len = self.initial_offset;
    }

    /// Get an entry by its offset
    ///
    /// Offsets which fall in the middle of a wide entry (or past the end) produce `None`.
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Offset, &T)> {
        self.entries.iter().map(|(off, elem)| (*off, elem))
    }

    /// Iterate over the entries, ignoring offsets
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter().map(|(_, elem)| elem)
    }

    pub fn values_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, elem)| elem)
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<A: Eq> Eq for OffsetVec<A> {}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        for elem in elems {
            offset_vec.push(elem);
        }
        offset_vec
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Entry {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Entry {
        fn width(&self) -> usize {
            match self {
                Entry::Narrow(_) => 1,
                Entry::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn pool_style_offsets() {
        let mut pool: OffsetVec<Entry> = OffsetVec::new_starting_at(Offset(1));
        assert_eq!(pool.push(Entry::Narrow(1)), Offset(1));
        assert_eq!(pool.push(Entry::Wide(2)), Offset(2));
        assert_eq!(pool.push(Entry::Narrow(3)), Offset(4));
        assert_eq!(pool.offset_len(), Offset(5));
        assert_eq!(pool.total_width(), 4);

        assert_eq!(pool.get_offset(Offset(2)), Some(&Entry::Wide(2)));
        assert_eq!(pool.get_offset(Offset(3)), None);
        assert_eq!(pool.get_offset(Offset(4)), Some(&Entry::Narrow(3)));
        assert_eq!(pool.get_offset(Offset(5)), None);
    }

    #[test]
    fn pop_restores_offset() {
        let mut stack: OffsetVec<Entry> = vec![Entry::Wide(1), Entry::Narrow(2)]
            .into_iter()
            .collect();
        assert_eq!(stack.offset_len(), Offset(3));
        assert_eq!(stack.pop(), Some(Entry::Narrow(2)));
        assert_eq!(stack.offset_len(), Offset(2));
        assert_eq!(stack.pop(), Some(Entry::Wide(1)));
        assert_eq!(stack.offset_len(), Offset(0));
        assert_eq!(stack.pop(), None);
    }
}
