use super::{Error, IdentityRemapper, JumpCondition, LocalKind, Remapper};
use crate::jvm::code::{opcodes::*, Insn, InsnList, Label, LoadableConstant, TryCatchBlock};
use crate::jvm::tree::MethodNode;
use crate::jvm::{self, BaseType, MethodDescriptor};

static IDENTITY: IdentityRemapper = IdentityRemapper;

/// Fluent builder of instruction sequences
///
/// Every primitive operation appends exactly one instruction and hands back the builder, so
/// calls chain left-to-right in the order the instructions execute. Nothing is checked while
/// building (beyond label bookkeeping): the stack discipline of the result is only examined when
/// the enclosing class is written out, or verified.
///
/// Structured operations (`if_clause`, `table_switch`, `synchronized`, ...) take closures which
/// build their bodies into this same builder, and return a `Result` since they can detect
/// configuration mistakes.
pub struct InsnBuilder<'r> {
    insns: InsnList,
    remapper: &'r dyn Remapper,

    /// Next free local variable slot
    next_local: u16,
}

impl InsnBuilder<'static> {
    /// Builder which does not rename members, with scratch locals starting at `first_local`
    pub fn new(first_local: u16) -> InsnBuilder<'static> {
        InsnBuilder::with_remapper(first_local, &IDENTITY)
    }
}

impl<'r> InsnBuilder<'r> {
    pub fn with_remapper(first_local: u16, remapper: &'r dyn Remapper) -> InsnBuilder<'r> {
        InsnBuilder {
            insns: InsnList::new(),
            remapper,
            next_local: first_local,
        }
    }

    /// Builder for code going into an existing method
    ///
    /// Scratch locals start past the method's parameters, its declared `max_locals`, and any
    /// local its current code already touches (which may be past `max_locals` if other code has
    /// already been spliced in).
    pub fn for_method(
        method: &MethodNode,
        remapper: &'r dyn Remapper,
    ) -> Result<InsnBuilder<'r>, Error> {
        let descriptor = MethodDescriptor::parse(&method.descriptor)?;
        let mut first_local = descriptor.parameter_length(!method.access_flags.is_static());

        if let Some(code) = &method.code {
            first_local = first_local.max(code.max_locals as usize);
            for insn in &code.insns {
                let used = match insn {
                    Insn::Var(op, index) => {
                        let wide = matches!(*op, LLOAD | DLOAD | LSTORE | DSTORE);
                        *index as usize + if wide { 2 } else { 1 }
                    }
                    Insn::Iinc { index, .. } => *index as usize + 1,
                    _ => 0,
                };
                first_local = first_local.max(used);
            }
        }

        let first_local = u16::try_from(first_local)
            .map_err(|_| jvm::Error::MethodCodeMaxLocalsOverflow(first_local))?;
        Ok(InsnBuilder::with_remapper(first_local, remapper))
    }

    pub(super) fn remapper(&self) -> &'r dyn Remapper {
        self.remapper
    }

    /// Append any instruction
    pub fn push(&mut self, insn: Insn) -> &mut Self {
        self.insns.push(insn);
        self
    }

    /// Append an already built sequence
    ///
    /// The labels of `insns` are renumbered so they stay distinct from labels made here.
    pub fn insert_insns(&mut self, insns: InsnList) -> &mut Self {
        self.insns.append(insns);
        self
    }

    /// Instructions built so far
    pub fn insns(&self) -> &InsnList {
        &self.insns
    }

    /// Index the next allocated local will get
    pub fn next_local(&self) -> u16 {
        self.next_local
    }

    /// Finish building, checking that every label used was placed
    pub fn build(self) -> Result<InsnList, Error> {
        Ok(self.insns.finish()?)
    }

    /// Reserve a local of the given kind (taking two slots for `long` and `double`)
    pub(super) fn reserve_local(&mut self, kind: LocalKind) -> u16 {
        let index = self.next_local;
        self.next_local += kind.width();
        index
    }

    /// Push an integer constant, using the most compact instruction available
    pub fn int(&mut self, integer: i32) -> &mut Self {
        let insn = match integer {
            -1..=5 => Insn::Op((ICONST_0 as i32 + integer) as u8),
            -127..=127 => Insn::Int(BIPUSH, integer),
            -32768..=32767 => Insn::Int(SIPUSH, integer),
            _ => Insn::Ldc(LoadableConstant::Int(integer)),
        };
        self.push(insn)
    }

    pub fn long(&mut self, long: i64) -> &mut Self {
        let insn = match long {
            0 => Insn::Op(LCONST_0),
            1 => Insn::Op(LCONST_1),
            _ => Insn::Ldc(LoadableConstant::Long(long)),
        };
        self.push(insn)
    }

    /// Push a float constant (`-0.0` is not `fconst_0`, so comparison is on the bits)
    pub fn float(&mut self, float: f32) -> &mut Self {
        let insn = match float.to_bits() {
            bits if bits == 0.0f32.to_bits() => Insn::Op(FCONST_0),
            bits if bits == 1.0f32.to_bits() => Insn::Op(FCONST_1),
            bits if bits == 2.0f32.to_bits() => Insn::Op(FCONST_2),
            _ => Insn::Ldc(LoadableConstant::Float(float)),
        };
        self.push(insn)
    }

    pub fn double(&mut self, double: f64) -> &mut Self {
        let insn = match double.to_bits() {
            bits if bits == 0.0f64.to_bits() => Insn::Op(DCONST_0),
            bits if bits == 1.0f64.to_bits() => Insn::Op(DCONST_1),
            _ => Insn::Ldc(LoadableConstant::Double(double)),
        };
        self.push(insn)
    }

    pub fn string(&mut self, string: &str) -> &mut Self {
        self.push(Insn::Ldc(LoadableConstant::String(string.to_owned())))
    }

    /// Push a `java/lang/Class` (given by internal name, or descriptor for arrays)
    pub fn class_literal(&mut self, class: &str) -> &mut Self {
        self.push(Insn::Ldc(LoadableConstant::Class(class.to_owned())))
    }

    pub fn ldc(&mut self, constant: LoadableConstant) -> &mut Self {
        self.push(Insn::Ldc(constant))
    }

    /// New label, to be placed later with [`Self::place_label`]
    pub fn make_label(&mut self) -> Label {
        self.insns.fresh_label()
    }

    pub fn place_label(&mut self, label: Label) -> Result<&mut Self, Error> {
        self.insns.place_label(label)?;
        Ok(self)
    }

    pub fn jump(&mut self, condition: JumpCondition, label: Label) -> &mut Self {
        self.push(Insn::Jump(condition.opcode(), label))
    }

    pub fn goto(&mut self, label: Label) -> &mut Self {
        self.push(Insn::Jump(GOTO, label))
    }

    /// Mark the source line of the following instructions
    pub fn line(&mut self, line: u16) -> &mut Self {
        self.push(Insn::Line(line))
    }

    /// Register an exception handler over the range `[start, end)`
    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.insns.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_owned),
        });
        self
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.push(Insn::Type(NEW, class.to_owned()))
    }

    pub fn newarray(&mut self, element_type: BaseType) -> &mut Self {
        let code = match element_type {
            BaseType::Boolean => T_BOOLEAN,
            BaseType::Char => T_CHAR,
            BaseType::Float => T_FLOAT,
            BaseType::Double => T_DOUBLE,
            BaseType::Byte => T_BYTE,
            BaseType::Short => T_SHORT,
            BaseType::Int => T_INT,
            BaseType::Long => T_LONG,
        };
        self.push(Insn::Int(NEWARRAY, code as i32))
    }

    pub fn anewarray(&mut self, class: &str) -> &mut Self {
        self.push(Insn::Type(ANEWARRAY, class.to_owned()))
    }

    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        self.push(Insn::Type(CHECKCAST, class.to_owned()))
    }

    pub fn instanceof(&mut self, class: &str) -> &mut Self {
        self.push(Insn::Type(INSTANCEOF, class.to_owned()))
    }

    pub fn multianewarray(&mut self, descriptor: &str, dimensions: u8) -> &mut Self {
        self.push(Insn::MultiANewArray(descriptor.to_owned(), dimensions))
    }

    pub fn iinc(&mut self, index: u16, increment: i16) -> &mut Self {
        self.push(Insn::Iinc { index, increment })
    }
}

/// Generate one builder method per instruction without operands
macro_rules! simple_instructions {
    ($($name:ident => $opcode:ident,)*) => {
        impl<'r> InsnBuilder<'r> {
            $(
                pub fn $name(&mut self) -> &mut Self {
                    self.push(Insn::Op($opcode))
                }
            )*
        }
    };
}

simple_instructions! {
    nop => NOP,
    aconst_null => ACONST_NULL,
    iaload => IALOAD,
    laload => LALOAD,
    faload => FALOAD,
    daload => DALOAD,
    aaload => AALOAD,
    baload => BALOAD,
    caload => CALOAD,
    saload => SALOAD,
    iastore => IASTORE,
    lastore => LASTORE,
    fastore => FASTORE,
    dastore => DASTORE,
    aastore => AASTORE,
    bastore => BASTORE,
    castore => CASTORE,
    sastore => SASTORE,
    pop => POP,
    pop2 => POP2,
    dup => DUP,
    dup_x1 => DUP_X1,
    dup_x2 => DUP_X2,
    dup2 => DUP2,
    dup2_x1 => DUP2_X1,
    dup2_x2 => DUP2_X2,
    swap => SWAP,
    iadd => IADD,
    ladd => LADD,
    fadd => FADD,
    dadd => DADD,
    isub => ISUB,
    lsub => LSUB,
    fsub => FSUB,
    dsub => DSUB,
    imul => IMUL,
    lmul => LMUL,
    fmul => FMUL,
    dmul => DMUL,
    idiv => IDIV,
    ldiv => LDIV,
    fdiv => FDIV,
    ddiv => DDIV,
    irem => IREM,
    lrem => LREM,
    frem => FREM,
    drem => DREM,
    ineg => INEG,
    lneg => LNEG,
    fneg => FNEG,
    dneg => DNEG,
    ishl => ISHL,
    lshl => LSHL,
    ishr => ISHR,
    lshr => LSHR,
    iushr => IUSHR,
    lushr => LUSHR,
    iand => IAND,
    land => LAND,
    ior => IOR,
    lor => LOR,
    ixor => IXOR,
    lxor => LXOR,
    i2l => I2L,
    i2f => I2F,
    i2d => I2D,
    l2i => L2I,
    l2f => L2F,
    l2d => L2D,
    f2i => F2I,
    f2l => F2L,
    f2d => F2D,
    d2i => D2I,
    d2l => D2L,
    d2f => D2F,
    i2b => I2B,
    i2c => I2C,
    i2s => I2S,
    lcmp => LCMP,
    fcmpl => FCMPL,
    fcmpg => FCMPG,
    dcmpl => DCMPL,
    dcmpg => DCMPG,
    ireturn => IRETURN,
    lreturn => LRETURN,
    freturn => FRETURN,
    dreturn => DRETURN,
    areturn => ARETURN,
    return_ => RETURN,
    arraylength => ARRAYLENGTH,
    athrow => ATHROW,
    monitorenter => MONITORENTER,
    monitorexit => MONITOREXIT,
}
