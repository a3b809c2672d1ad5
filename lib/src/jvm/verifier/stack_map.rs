use super::{Frame, VerificationType};
use crate::jvm::class_file::{ClassConstantIndex, ConstantsPool, StackMapFrame, StackMapTable};
use crate::jvm::Error;
use crate::util::Width;

type SerializableType = VerificationType<ClassConstantIndex, u16>;

/// Frame in the shape stack map tables store it
///
/// Unlike [`Frame`], a wide local takes up a single entry here and trailing `Top` locals are
/// dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactFrame<T = SerializableType> {
    pub locals: Vec<T>,
    pub stack: Vec<T>,
}

impl Frame {
    /// Resolve the frame into its serializable form
    ///
    /// `new_offset` maps the instruction index of a `new` to its bytecode offset.
    pub fn compact(
        &self,
        constants: &mut ConstantsPool,
        new_offset: impl Fn(usize) -> Option<usize>,
    ) -> Result<CompactFrame, Error> {
        self.compact_with(|typ| {
            Ok(match typ {
                VerificationType::Object(class) => {
                    VerificationType::Object(constants.get_class(class)?)
                }
                VerificationType::Uninitialized(index) => {
                    let offset = uninitialized_offset(*index, &new_offset)?;
                    VerificationType::Uninitialized(offset as u16)
                }
                VerificationType::Top => VerificationType::Top,
                VerificationType::Integer => VerificationType::Integer,
                VerificationType::Float => VerificationType::Float,
                VerificationType::Long => VerificationType::Long,
                VerificationType::Double => VerificationType::Double,
                VerificationType::Null => VerificationType::Null,
                VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            })
        })
    }

    /// Same shape as [`Frame::compact`], but with classes left as names
    pub fn compact_named(
        &self,
        new_offset: impl Fn(usize) -> Option<usize>,
    ) -> Result<CompactFrame<VerificationType>, Error> {
        self.compact_with(|typ| {
            Ok(match typ {
                VerificationType::Uninitialized(index) => {
                    VerificationType::Uninitialized(uninitialized_offset(*index, &new_offset)?)
                }
                other => other.clone(),
            })
        })
    }

    fn compact_with<T>(
        &self,
        mut resolve: impl FnMut(&VerificationType) -> Result<T, Error>,
    ) -> Result<CompactFrame<T>, Error> {
        let mut entries = vec![];
        let mut slot = 0;
        while slot < self.locals.len() {
            let typ = &self.locals[slot];
            entries.push(typ);
            slot += typ.width();
        }
        while entries.last() == Some(&&VerificationType::Top) {
            entries.pop();
        }

        let locals = entries
            .into_iter()
            .map(&mut resolve)
            .collect::<Result<_, _>>()?;
        let stack = self
            .stack
            .values()
            .map(&mut resolve)
            .collect::<Result<_, _>>()?;
        Ok(CompactFrame { locals, stack })
    }
}

fn uninitialized_offset(
    index: usize,
    new_offset: impl Fn(usize) -> Option<usize>,
) -> Result<usize, Error> {
    new_offset(index)
        .ok_or_else(|| Error::Malformed(format!("uninitialized value from missing new #{}", index)))
}

impl CompactFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        match self.stack.len() {
            0 => {
                let this_locals_len = self.locals.len();
                let prev_locals_len = previous_frame.locals.len();

                if this_locals_len <= prev_locals_len {
                    let len_difference = prev_locals_len - this_locals_len;
                    let this_is_prefix_of_prev = self
                        .locals
                        .iter()
                        .zip(previous_frame.locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if len_difference < 4 && this_is_prefix_of_prev {
                        if len_difference == 0 {
                            return StackMapFrame::SameLocalsNoStack { offset_delta };
                        } else {
                            return StackMapFrame::ChopLocalsNoStack {
                                offset_delta,
                                chopped_k: len_difference as u8,
                            };
                        }
                    }
                } else if this_locals_len - prev_locals_len < 4 {
                    let prev_is_prefix_of_this = previous_frame
                        .locals
                        .iter()
                        .zip(self.locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if prev_is_prefix_of_this {
                        return StackMapFrame::AppendLocalsNoStack {
                            offset_delta,
                            locals: self.locals[prev_locals_len..].to_vec(),
                        };
                    }
                }
            }
            1 if self.locals == previous_frame.locals => {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: self.stack[0],
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.clone(),
            locals: self.locals.clone(),
        }
    }
}

/// Build the stack map table from the implicit entry frame and the frames at jump targets
///
/// `frames` must be sorted by bytecode offset, with at most one frame per offset.
pub fn stack_map_table(entry: &CompactFrame, frames: &[(usize, CompactFrame)]) -> StackMapTable {
    let mut previous_frame = entry;
    let mut previous_offset: Option<usize> = None;
    let mut table = vec![];
    for (offset, frame) in frames {
        let offset_delta = match previous_offset {
            None => *offset,
            Some(previous) => offset - previous - 1,
        };
        table.push(frame.stack_map_frame(offset_delta as u16, previous_frame));
        previous_frame = frame;
        previous_offset = Some(*offset);
    }
    StackMapTable(table)
}

/// Inverse of [`stack_map_table`]: absolute offset and frame for every entry of a table, with
/// classes resolved to names
pub fn read_stack_map_table(
    table: &StackMapTable,
    entry: CompactFrame<VerificationType>,
    constants: &ConstantsPool,
) -> Result<Vec<(usize, CompactFrame<VerificationType>)>, Error> {
    let resolve = |typ: &SerializableType| -> Result<VerificationType, Error> {
        Ok(match typ {
            VerificationType::Object(class) => {
                VerificationType::Object(constants.class_name(*class)?.to_owned())
            }
            other => other.map(|_| String::new(), |offset| *offset as usize),
        })
    };
    let resolve_all = |types: &[SerializableType]| -> Result<Vec<VerificationType>, Error> {
        types.iter().map(|typ| resolve(typ)).collect()
    };

    let mut frames = vec![];
    let mut previous = entry;
    let mut previous_offset: Option<usize> = None;
    for stack_map_frame in &table.0 {
        let (offset_delta, frame) = match stack_map_frame {
            StackMapFrame::SameLocalsNoStack { offset_delta } => (
                offset_delta,
                CompactFrame {
                    locals: previous.locals.clone(),
                    stack: vec![],
                },
            ),
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => (
                offset_delta,
                CompactFrame {
                    locals: previous.locals.clone(),
                    stack: vec![resolve(stack)?],
                },
            ),
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                let kept = previous
                    .locals
                    .len()
                    .checked_sub(*chopped_k as usize)
                    .ok_or_else(|| Error::Malformed(String::from("chop frame removes too many")))?;
                (
                    offset_delta,
                    CompactFrame {
                        locals: previous.locals[..kept].to_vec(),
                        stack: vec![],
                    },
                )
            }
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let mut all_locals = previous.locals.clone();
                all_locals.extend(resolve_all(locals)?);
                (
                    offset_delta,
                    CompactFrame {
                        locals: all_locals,
                        stack: vec![],
                    },
                )
            }
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => (
                offset_delta,
                CompactFrame {
                    locals: resolve_all(locals)?,
                    stack: resolve_all(stack)?,
                },
            ),
        };

        let offset = match previous_offset {
            None => *offset_delta as usize,
            Some(previous) => previous + *offset_delta as usize + 1,
        };
        frames.push((offset, frame.clone()));
        previous = frame;
        previous_offset = Some(offset);
    }
    Ok(frames)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::OffsetVec;

    fn compact(frame: &Frame) -> CompactFrame {
        frame.compact(&mut ConstantsPool::new(), |_| None).unwrap()
    }

    #[test]
    fn wide_locals_take_one_entry() {
        let frame = Frame {
            locals: vec![
                VerificationType::Long,
                VerificationType::Top,
                VerificationType::Integer,
                VerificationType::Top,
                VerificationType::Top,
            ],
            stack: OffsetVec::new(),
        };
        assert_eq!(
            compact(&frame).locals,
            vec![VerificationType::Long, VerificationType::Integer]
        );
    }

    #[test]
    fn uninitialized_values_use_offsets() {
        let mut stack = OffsetVec::new();
        stack.push(VerificationType::Uninitialized(3));
        let frame = Frame {
            locals: vec![],
            stack,
        };
        let compacted = frame
            .compact(&mut ConstantsPool::new(), |idx| if idx == 3 { Some(17) } else { None })
            .unwrap();
        assert_eq!(compacted.stack, vec![VerificationType::Uninitialized(17)]);
        assert!(frame.compact(&mut ConstantsPool::new(), |_| None).is_err());
    }

    #[test]
    fn frame_kinds() {
        let entry = CompactFrame {
            locals: vec![VerificationType::Integer],
            stack: vec![],
        };
        let same = entry.clone();
        let appended = CompactFrame {
            locals: vec![
                VerificationType::Integer,
                VerificationType::Float,
                VerificationType::Long,
            ],
            stack: vec![],
        };
        let chopped = CompactFrame {
            locals: vec![],
            stack: vec![],
        };
        let one_stack = CompactFrame {
            locals: vec![],
            stack: vec![VerificationType::Null],
        };
        let full = CompactFrame {
            locals: vec![VerificationType::Float],
            stack: vec![VerificationType::Null, VerificationType::Null],
        };

        let table = stack_map_table(
            &entry,
            &[
                (4, same),
                (10, appended),
                (12, chopped),
                (20, one_stack),
                (21, full.clone()),
            ],
        );
        assert_eq!(
            table.0,
            vec![
                StackMapFrame::SameLocalsNoStack { offset_delta: 4 },
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta: 5,
                    locals: vec![VerificationType::Float, VerificationType::Long],
                },
                StackMapFrame::ChopLocalsNoStack {
                    offset_delta: 1,
                    chopped_k: 3,
                },
                StackMapFrame::SameLocalsOneStack {
                    offset_delta: 7,
                    stack: VerificationType::Null,
                },
                full.full_stack_map_frame(0),
            ]
        );
    }

    #[test]
    fn tables_read_back() {
        let mut constants = ConstantsPool::new();
        let class = constants.get_class("me/alec/Thing").unwrap();
        let entry = CompactFrame {
            locals: vec![VerificationType::Integer],
            stack: vec![],
        };
        let frames = vec![
            (
                3,
                CompactFrame {
                    locals: vec![VerificationType::Integer, VerificationType::Long],
                    stack: vec![],
                },
            ),
            (
                9,
                CompactFrame {
                    locals: vec![VerificationType::Integer, VerificationType::Long],
                    stack: vec![VerificationType::Object(class)],
                },
            ),
            (
                15,
                CompactFrame {
                    locals: vec![],
                    stack: vec![VerificationType::Uninitialized(2)],
                },
            ),
        ];
        let table = stack_map_table(&entry, &frames);

        let named_entry = CompactFrame {
            locals: vec![VerificationType::Integer],
            stack: vec![],
        };
        let read = read_stack_map_table(&table, named_entry, &constants).unwrap();
        let offsets: Vec<usize> = read.iter().map(|(offset, _)| *offset).collect();
        assert_eq!(offsets, vec![3, 9, 15]);
        assert_eq!(
            read[1].1.locals,
            vec![VerificationType::Integer, VerificationType::Long]
        );
        assert_eq!(
            read[1].1.stack,
            vec![VerificationType::object("me/alec/Thing")]
        );
        let uninitialized: VerificationType = VerificationType::Uninitialized(2);
        assert_eq!(read[2].1.stack, vec![uninitialized]);
        assert!(read[2].1.locals.is_empty());
    }
}
