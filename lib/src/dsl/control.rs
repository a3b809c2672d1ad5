use super::{Error, InsnBuilder, LocalKind};
use crate::jvm::code::opcodes::*;

/// Condition of a conditional jump
///
/// The single-operand forms compare an `int` against zero (or a reference against `null`), the
/// `Icmp` and `Acmp` forms compare the two topmost operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpCondition {
    IfEq,
    IfNe,
    IfLt,
    IfGe,
    IfGt,
    IfLe,
    IfIcmpEq,
    IfIcmpNe,
    IfIcmpLt,
    IfIcmpGe,
    IfIcmpGt,
    IfIcmpLe,
    IfAcmpEq,
    IfAcmpNe,
    IfNull,
    IfNonNull,
}

impl JumpCondition {
    pub fn opcode(self) -> u8 {
        match self {
            JumpCondition::IfEq => IFEQ,
            JumpCondition::IfNe => IFNE,
            JumpCondition::IfLt => IFLT,
            JumpCondition::IfGe => IFGE,
            JumpCondition::IfGt => IFGT,
            JumpCondition::IfLe => IFLE,
            JumpCondition::IfIcmpEq => IF_ICMPEQ,
            JumpCondition::IfIcmpNe => IF_ICMPNE,
            JumpCondition::IfIcmpLt => IF_ICMPLT,
            JumpCondition::IfIcmpGe => IF_ICMPGE,
            JumpCondition::IfIcmpGt => IF_ICMPGT,
            JumpCondition::IfIcmpLe => IF_ICMPLE,
            JumpCondition::IfAcmpEq => IF_ACMPEQ,
            JumpCondition::IfAcmpNe => IF_ACMPNE,
            JumpCondition::IfNull => IFNULL,
            JumpCondition::IfNonNull => IFNONNULL,
        }
    }

    /// Condition which holds exactly when this one doesn't
    pub fn negate(self) -> JumpCondition {
        match self {
            JumpCondition::IfEq => JumpCondition::IfNe,
            JumpCondition::IfNe => JumpCondition::IfEq,
            JumpCondition::IfLt => JumpCondition::IfGe,
            JumpCondition::IfGe => JumpCondition::IfLt,
            JumpCondition::IfGt => JumpCondition::IfLe,
            JumpCondition::IfLe => JumpCondition::IfGt,
            JumpCondition::IfIcmpEq => JumpCondition::IfIcmpNe,
            JumpCondition::IfIcmpNe => JumpCondition::IfIcmpEq,
            JumpCondition::IfIcmpLt => JumpCondition::IfIcmpGe,
            JumpCondition::IfIcmpGe => JumpCondition::IfIcmpLt,
            JumpCondition::IfIcmpGt => JumpCondition::IfIcmpLe,
            JumpCondition::IfIcmpLe => JumpCondition::IfIcmpGt,
            JumpCondition::IfAcmpEq => JumpCondition::IfAcmpNe,
            JumpCondition::IfAcmpNe => JumpCondition::IfAcmpEq,
            JumpCondition::IfNull => JumpCondition::IfNonNull,
            JumpCondition::IfNonNull => JumpCondition::IfNull,
        }
    }
}

impl<'r> InsnBuilder<'r> {
    /// Run `body` unless one of the `skip_if` jumps is taken
    ///
    /// Each condition consumes its operands where it sits in the sequence, so with several
    /// conditions the operands of the later ones have to already be on the stack below the
    /// earlier ones (or the conditions should be on values which are re-pushed).
    pub fn if_clause(
        &mut self,
        skip_if: &[JumpCondition],
        body: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let end = self.make_label();
        for condition in skip_if {
            self.jump(*condition, end);
        }
        body(self)?;
        self.place_label(end)
    }

    /// Two-way branch: `if_body` runs when one of the `conditions` jumps is taken, otherwise
    /// `else_body` runs
    ///
    /// The layout is the jumps, then `else_body` and a `goto` past the end, then `if_body`.
    pub fn if_else(
        &mut self,
        conditions: &[JumpCondition],
        if_body: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
        else_body: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let taken = self.make_label();
        let end = self.make_label();
        for condition in conditions {
            self.jump(*condition, taken);
        }
        else_body(self)?;
        self.goto(end);
        self.place_label(taken)?;
        if_body(self)?;
        self.place_label(end)
    }

    /// Run `body` holding the monitor of the object on top of the stack
    ///
    /// The object is kept in a fresh local so the monitor can be released after `body`. An
    /// exception escaping `body` leaves the monitor held: use [`Self::synchronized_guarded`]
    /// where that matters.
    pub fn synchronized(
        &mut self,
        body: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.dup();
        let lock = self.store_new(LocalKind::Reference);
        self.monitorenter();
        body(self)?;
        Ok(self.load(lock).monitorexit())
    }

    /// Same as [`Self::synchronized`], but the monitor is also released (and the exception
    /// rethrown) when `body` throws
    ///
    /// `body` must leave the operand stack as it found it.
    pub fn synchronized_guarded(
        &mut self,
        body: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let start = self.make_label();
        let end = self.make_label();
        let handler = self.make_label();
        let done = self.make_label();

        self.dup();
        let lock = self.store_new(LocalKind::Reference);
        self.monitorenter();
        self.place_label(start)?;
        body(self)?;
        self.load(lock).monitorexit();
        self.place_label(end)?;
        self.goto(done);

        self.place_label(handler)?;
        let thrown = self.store_new(LocalKind::Reference);
        self.load(lock).monitorexit().load(thrown).athrow();
        self.place_label(done)?;

        Ok(self.try_catch(start, end, handler, None))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Insn, Label};

    fn position(insns: &[Insn], label: Label) -> usize {
        insns
            .iter()
            .position(|insn| *insn == Insn::Label(label))
            .unwrap()
    }

    #[test]
    fn negation_is_an_involution() {
        let all = [
            JumpCondition::IfEq,
            JumpCondition::IfLt,
            JumpCondition::IfGt,
            JumpCondition::IfIcmpEq,
            JumpCondition::IfIcmpLt,
            JumpCondition::IfIcmpGt,
            JumpCondition::IfAcmpEq,
            JumpCondition::IfNull,
        ];
        for condition in all {
            assert_ne!(condition.negate(), condition);
            assert_eq!(condition.negate().negate(), condition);
        }
    }

    #[test]
    fn if_clause_layout() {
        let mut builder = InsnBuilder::new(1);
        builder.load_index(LocalKind::Int, 0);
        builder
            .if_clause(&[JumpCondition::IfEq], |b| {
                b.int(1).pop();
                Ok(())
            })
            .unwrap();
        let insns = builder.build().unwrap();

        let end = match insns[1] {
            Insn::Jump(IFEQ, label) => label,
            ref other => panic!("unexpected {}", other),
        };
        assert_eq!(position(insns.insns(), end), 4);
        assert_eq!(insns.len(), 5);
    }

    #[test]
    fn if_else_layout() {
        let mut builder = InsnBuilder::new(1);
        builder.load_index(LocalKind::Int, 0);
        builder
            .if_else(
                &[JumpCondition::IfNe],
                |b| {
                    b.int(10);
                    Ok(())
                },
                |b| {
                    b.int(20);
                    Ok(())
                },
            )
            .unwrap();
        builder.ireturn();
        let insns = builder.build().unwrap();
        let insns = insns.insns();

        let taken = match insns[1] {
            Insn::Jump(IFNE, label) => label,
            ref other => panic!("unexpected {}", other),
        };
        assert_eq!(insns[2], Insn::Int(BIPUSH, 20));
        let end = match insns[3] {
            Insn::Jump(GOTO, label) => label,
            ref other => panic!("unexpected {}", other),
        };
        assert_eq!(position(insns, taken), 4);
        assert_eq!(insns[5], Insn::Int(BIPUSH, 10));
        assert_eq!(position(insns, end), 6);
    }

    #[test]
    fn synchronized_releases_the_same_object() {
        let mut builder = InsnBuilder::new(3);
        builder.this();
        builder
            .synchronized(|b| {
                b.nop();
                Ok(())
            })
            .unwrap();
        let insns = builder.build().unwrap();

        assert_eq!(
            insns.insns(),
            &[
                Insn::Var(ALOAD, 0),
                Insn::Op(DUP),
                Insn::Var(ASTORE, 3),
                Insn::Op(MONITORENTER),
                Insn::Op(NOP),
                Insn::Var(ALOAD, 3),
                Insn::Op(MONITOREXIT),
            ]
        );
    }

    #[test]
    fn guarded_synchronized_has_a_handler() {
        let mut builder = InsnBuilder::new(1);
        builder.this();
        builder
            .synchronized_guarded(|b| {
                b.nop();
                Ok(())
            })
            .unwrap();
        builder.return_();
        let insns = builder.build().unwrap();

        assert_eq!(insns.try_catch_blocks.len(), 1);
        let block = &insns.try_catch_blocks[0];
        assert_eq!(block.catch_type, None);
        let handler = position(insns.insns(), block.handler);
        assert_eq!(insns[handler + 1], Insn::Var(ASTORE, 2));
        assert_eq!(insns[handler + 2], Insn::Var(ALOAD, 1));
        assert_eq!(insns[handler + 3], Insn::Op(MONITOREXIT));
        assert_eq!(insns[handler + 5], Insn::Op(ATHROW));
    }
}
