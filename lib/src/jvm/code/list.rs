use super::{Insn, Label, TryCatchBlock};
use crate::jvm::Error;
use std::collections::HashSet;
use std::ops::Index;

/// Ordered sequence of instructions, along with the labels and exception handlers they use
///
/// The list owns an arena of labels: labels are handed out by [`InsnList::fresh_label`] and then
/// placed (at most once) with [`InsnList::place_label`]. Jumps can refer to labels before they
/// are placed, which is what makes forward jumps possible.
#[derive(Clone, Debug, Default)]
pub struct InsnList {
    insns: Vec<Insn>,

    /// One entry per label in the arena, tracking whether it has been placed yet
    placed: Vec<bool>,

    /// Exception handlers, innermost first
    pub try_catch_blocks: Vec<TryCatchBlock>,
}

impl InsnList {
    pub fn new() -> InsnList {
        InsnList::default()
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Insn> {
        self.insns.iter()
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    /// Number of labels in the arena
    pub fn label_count(&self) -> usize {
        self.placed.len()
    }

    /// Make a new label (which has not yet been placed)
    pub fn fresh_label(&mut self) -> Label {
        let label = Label(self.placed.len());
        self.placed.push(false);
        label
    }

    /// Place a label at the current end of the list
    pub fn place_label(&mut self, label: Label) -> Result<(), Error> {
        match self.placed.get_mut(label.0) {
            None => Err(Error::UnknownLabel(label)),
            Some(true) => Err(Error::LabelPlacedTwice(label)),
            Some(placed) => {
                *placed = true;
                self.insns.push(Insn::Label(label));
                Ok(())
            }
        }
    }

    /// Add an instruction to the end of the list
    ///
    /// Use [`InsnList::place_label`] rather than pushing `Insn::Label` directly.
    pub fn push(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    /// Move all of `other` onto the end of this list
    pub fn append(&mut self, other: InsnList) {
        let at = self.insns.len();
        self.splice(at, other);
    }

    /// Insert all of `other` before the instruction at `index`
    ///
    /// The labels of `other` are renumbered so they don't collide with labels in this list. The
    /// exception handlers of `other` are put ahead of the existing ones, since the inserted code
    /// is nested inside whatever ranges already cover `index`.
    pub fn splice(&mut self, index: usize, other: InsnList) {
        let shift = self.placed.len();
        let InsnList {
            insns,
            placed,
            try_catch_blocks,
        } = other;

        self.placed.extend(placed);
        let shifted = insns.into_iter().map(|mut insn| {
            insn.shift_labels(shift);
            insn
        });
        self.insns.splice(index..index, shifted);

        let mut blocks: Vec<TryCatchBlock> = try_catch_blocks
            .into_iter()
            .map(|mut block| {
                block.shift_labels(shift);
                block
            })
            .collect();
        blocks.append(&mut self.try_catch_blocks);
        self.try_catch_blocks = blocks;
    }

    /// Labels which are referenced by a jump or an exception handler, but never placed
    pub fn unplaced_labels(&self) -> Vec<Label> {
        let mut referenced: Vec<Label> = self
            .insns
            .iter()
            .flat_map(|insn| insn.jump_targets())
            .chain(
                self.try_catch_blocks
                    .iter()
                    .flat_map(|block| [block.start, block.end, block.handler]),
            )
            .filter(|label| !self.placed.get(label.0).copied().unwrap_or(false))
            .collect::<HashSet<Label>>()
            .into_iter()
            .collect();
        referenced.sort();
        referenced
    }

    /// Check that the list is complete, meaning every label used has been placed
    pub fn finish(self) -> Result<InsnList, Error> {
        let unplaced = self.unplaced_labels();
        if unplaced.is_empty() {
            Ok(self)
        } else {
            Err(Error::UnplacedLabels(unplaced))
        }
    }

    /// The `n`-th label placed in the list (counting in instruction order, from 0)
    pub fn nth_label(&self, n: usize) -> Option<Label> {
        self.insns
            .iter()
            .filter_map(|insn| match insn {
                Insn::Label(label) => Some(*label),
                _ => None,
            })
            .nth(n)
    }

    /// Index in the list of each placed label
    pub fn label_positions(&self) -> Vec<Option<usize>> {
        let mut positions = vec![None; self.placed.len()];
        for (idx, insn) in self.insns.iter().enumerate() {
            if let Insn::Label(label) = insn {
                if let Some(position) = positions.get_mut(label.0) {
                    *position = Some(idx);
                }
            }
        }
        positions
    }

    /// Keep only the instructions for which `keep` returns `true` (given their index)
    pub(crate) fn retain_indexed(&mut self, mut keep: impl FnMut(usize, &Insn) -> bool) {
        let mut idx = 0;
        self.insns.retain(|insn| {
            let kept = keep(idx, insn);
            idx += 1;
            kept
        });
    }

    /// Make a list from raw parts, marking every label which appears in `insns` as placed
    pub(crate) fn from_parts(
        insns: Vec<Insn>,
        label_count: usize,
        try_catch_blocks: Vec<TryCatchBlock>,
    ) -> InsnList {
        let mut placed = vec![false; label_count];
        for insn in &insns {
            if let Insn::Label(label) = insn {
                if let Some(flag) = placed.get_mut(label.0) {
                    *flag = true;
                }
            }
        }
        InsnList {
            insns,
            placed,
            try_catch_blocks,
        }
    }
}

impl Index<usize> for InsnList {
    type Output = Insn;

    fn index(&self, idx: usize) -> &Insn {
        &self.insns[idx]
    }
}

impl<'a> IntoIterator for &'a InsnList {
    type Item = &'a Insn;
    type IntoIter = std::slice::Iter<'a, Insn>;

    fn into_iter(self) -> Self::IntoIter {
        self.insns.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;

    #[test]
    fn labels_are_placed_once() {
        let mut list = InsnList::new();
        let label = list.fresh_label();
        list.place_label(label).unwrap();
        assert!(matches!(
            list.place_label(label),
            Err(Error::LabelPlacedTwice(l)) if l == label
        ));
    }

    #[test]
    fn unplaced_jump_target_is_rejected() {
        let mut list = InsnList::new();
        let placed = list.fresh_label();
        let dangling = list.fresh_label();
        let unused = list.fresh_label();
        list.place_label(placed).unwrap();
        list.push(Insn::Jump(GOTO, placed));
        list.push(Insn::Jump(IFEQ, dangling));

        assert_eq!(list.unplaced_labels(), vec![dangling]);
        assert!(matches!(list.finish(), Err(Error::UnplacedLabels(ls)) if ls == vec![dangling]));
        let _ = unused;
    }

    #[test]
    fn splice_renumbers_labels() {
        let mut outer = InsnList::new();
        let end = outer.fresh_label();
        outer.push(Insn::Op(ICONST_0));
        outer.push(Insn::Jump(IFEQ, end));
        outer.place_label(end).unwrap();
        outer.push(Insn::Op(RETURN));

        let mut inner = InsnList::new();
        let skip = inner.fresh_label();
        inner.push(Insn::Jump(GOTO, skip));
        inner.place_label(skip).unwrap();

        outer.splice(0, inner);
        assert_eq!(outer.label_count(), 2);
        assert_eq!(outer[0], Insn::Jump(GOTO, Label(1)));
        assert_eq!(outer[1], Insn::Label(Label(1)));
        assert_eq!(outer[3], Insn::Jump(IFEQ, Label(0)));
        assert!(outer.unplaced_labels().is_empty());
        assert_eq!(outer.nth_label(0), Some(Label(1)));
        assert_eq!(outer.nth_label(1), Some(Label(0)));
        assert_eq!(outer.nth_label(2), None);
    }

    #[test]
    fn spliced_handlers_come_first() {
        let mut outer = InsnList::new();
        let (a, b, c) = (outer.fresh_label(), outer.fresh_label(), outer.fresh_label());
        outer.try_catch_blocks.push(TryCatchBlock {
            start: a,
            end: b,
            handler: c,
            catch_type: None,
        });

        let mut inner = InsnList::new();
        let (d, e, f) = (inner.fresh_label(), inner.fresh_label(), inner.fresh_label());
        inner.try_catch_blocks.push(TryCatchBlock {
            start: d,
            end: e,
            handler: f,
            catch_type: Some(String::from("java/lang/Exception")),
        });

        outer.append(inner);
        assert_eq!(outer.try_catch_blocks.len(), 2);
        assert_eq!(outer.try_catch_blocks[0].start, Label(3));
        assert_eq!(outer.try_catch_blocks[1].start, Label(0));
    }
}
