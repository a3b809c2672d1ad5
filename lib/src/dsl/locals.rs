use super::InsnBuilder;
use crate::jvm::code::{opcodes::*, Insn};
use crate::jvm::{BaseType, FieldType};

/// Type category of a local variable, which decides the load/store instruction family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Reference,
    Int,
    Float,
    Long,
    Double,
}

impl LocalKind {
    /// Local variable slots taken up
    pub fn width(self) -> u16 {
        match self {
            LocalKind::Long | LocalKind::Double => 2,
            _ => 1,
        }
    }

    pub fn load_opcode(self) -> u8 {
        match self {
            LocalKind::Reference => ALOAD,
            LocalKind::Int => ILOAD,
            LocalKind::Float => FLOAD,
            LocalKind::Long => LLOAD,
            LocalKind::Double => DLOAD,
        }
    }

    pub fn store_opcode(self) -> u8 {
        match self {
            LocalKind::Reference => ASTORE,
            LocalKind::Int => ISTORE,
            LocalKind::Float => FSTORE,
            LocalKind::Long => LSTORE,
            LocalKind::Double => DSTORE,
        }
    }

    pub fn return_opcode(self) -> u8 {
        match self {
            LocalKind::Reference => ARETURN,
            LocalKind::Int => IRETURN,
            LocalKind::Float => FRETURN,
            LocalKind::Long => LRETURN,
            LocalKind::Double => DRETURN,
        }
    }
}

impl From<&FieldType> for LocalKind {
    fn from(field_type: &FieldType) -> LocalKind {
        match field_type {
            FieldType::Base(BaseType::Float) => LocalKind::Float,
            FieldType::Base(BaseType::Long) => LocalKind::Long,
            FieldType::Base(BaseType::Double) => LocalKind::Double,
            FieldType::Base(_) => LocalKind::Int,
            FieldType::Object(_) | FieldType::Array(_) => LocalKind::Reference,
        }
    }
}

/// Local variable handed out by [`InsnBuilder::allocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalSlot {
    pub index: u16,
    pub kind: LocalKind,
}

impl<'r> InsnBuilder<'r> {
    /// Fresh scratch local, past every local allocated so far
    pub fn allocate(&mut self, kind: LocalKind) -> LocalSlot {
        LocalSlot {
            index: self.reserve_local(kind),
            kind,
        }
    }

    pub fn load(&mut self, slot: LocalSlot) -> &mut Self {
        self.push(Insn::Var(slot.kind.load_opcode(), slot.index))
    }

    pub fn store(&mut self, slot: LocalSlot) -> &mut Self {
        self.push(Insn::Var(slot.kind.store_opcode(), slot.index))
    }

    /// Load a local which wasn't allocated by this builder (eg. a parameter)
    pub fn load_index(&mut self, kind: LocalKind, index: u16) -> &mut Self {
        self.push(Insn::Var(kind.load_opcode(), index))
    }

    pub fn store_index(&mut self, kind: LocalKind, index: u16) -> &mut Self {
        self.push(Insn::Var(kind.store_opcode(), index))
    }

    /// Load `this` (in an instance method)
    pub fn this(&mut self) -> &mut Self {
        self.load_index(LocalKind::Reference, 0)
    }

    /// Pop the top of the stack into a fresh local
    pub fn store_new(&mut self, kind: LocalKind) -> LocalSlot {
        let slot = self.allocate(kind);
        self.store(slot);
        slot
    }

    pub fn astore_new(&mut self) -> LocalSlot {
        self.store_new(LocalKind::Reference)
    }

    pub fn istore_new(&mut self) -> LocalSlot {
        self.store_new(LocalKind::Int)
    }

    pub fn fstore_new(&mut self) -> LocalSlot {
        self.store_new(LocalKind::Float)
    }

    pub fn lstore_new(&mut self) -> LocalSlot {
        self.store_new(LocalKind::Long)
    }

    pub fn dstore_new(&mut self) -> LocalSlot {
        self.store_new(LocalKind::Double)
    }

    /// Return the value on top of the stack (or nothing, for `None`)
    pub fn return_value(&mut self, kind: Option<LocalKind>) -> &mut Self {
        match kind {
            Some(kind) => self.push(Insn::Op(kind.return_opcode())),
            None => self.return_(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slots_account_for_width() {
        let mut builder = InsnBuilder::new(2);
        let first = builder.lstore_new();
        let second = builder.istore_new();
        let third = builder.dstore_new();
        let fourth = builder.astore_new();

        assert_eq!(first.index, 2);
        assert_eq!(second.index, 4);
        assert_eq!(third.index, 5);
        assert_eq!(fourth.index, 7);
        assert_eq!(builder.next_local(), 8);
    }

    #[test]
    fn loads_match_stores() {
        let mut builder = InsnBuilder::new(0);
        let slot = builder.allocate(LocalKind::Float);
        builder.fconst().store(slot).load(slot);
        let insns = builder.build().unwrap();
        assert_eq!(
            insns.insns(),
            &[
                Insn::Op(FCONST_0),
                Insn::Var(FSTORE, 0),
                Insn::Var(FLOAD, 0)
            ]
        );
    }

    impl<'r> InsnBuilder<'r> {
        fn fconst(&mut self) -> &mut Self {
            self.float(0.0)
        }
    }
}
