use super::{ClassHierarchy, VerificationType};
use crate::jvm::class_file::{Constant, ConstantsPool};
use crate::jvm::code::{opcodes::*, Insn, InsnList, Label, LoadableConstant};
use crate::jvm::{BaseType, Error, FieldType, MethodDescriptor, VerifierErrorKind};
use crate::util::{OffsetVec, Width};

type VType = VerificationType;

/// How much the analysis trusts the code
///
/// Both modes track the shape of the stack and locals (so both can compute frames and maximums),
/// but only `Strict` checks that operands have the types instructions expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Used when serializing: code is assumed to be well-typed
    Lenient,

    /// Used by verification: every operand type is checked
    Strict,
}

/// Method whose code is being analyzed
#[derive(Debug, Clone, Copy)]
pub struct MethodContext<'a> {
    /// Internal name of the enclosing class
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_static: bool,
}

/// Snapshot of the stack and local variables before an instruction
///
/// Locals are indexed by slot, so the second half of a `long` or `double` shows up as an extra
/// `Top`. The stack is an [`OffsetVec`], so its total width is the operand stack depth.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub locals: Vec<VType>,
    pub stack: OffsetVec<VType>,
}

impl Frame {
    /// Frame on entry to a method
    pub fn entry(method: &MethodContext) -> Result<Frame, VerifierErrorKind> {
        let descriptor = MethodDescriptor::parse(method.descriptor)
            .map_err(|_| VerifierErrorKind::BadDescriptor(method.descriptor.to_owned()))?;

        let mut locals = vec![];
        if !method.is_static {
            if method.name == "<init>" && method.class_name != "java/lang/Object" {
                locals.push(VType::UninitializedThis);
            } else {
                locals.push(VType::object(method.class_name));
            }
        }
        for parameter in &descriptor.parameters {
            let typ = VType::from(parameter);
            let is_wide = typ.width() == 2;
            locals.push(typ);
            if is_wide {
                locals.push(VType::Top);
            }
        }

        Ok(Frame {
            locals,
            stack: OffsetVec::new(),
        })
    }
}

/// Result of a successful analysis
#[derive(Debug)]
pub struct Analysis {
    /// Frame before each entry of the instruction list (`None` when unreachable)
    pub frames: Vec<Option<Frame>>,

    /// Deepest the operand stack gets (in slots)
    pub max_stack: usize,

    /// Number of local variable slots used, including parameters
    pub max_locals: usize,
}

impl Analysis {
    /// Frame in effect at a label: the frame of the first real instruction at or after it
    pub fn frame_at(&self, insns: &InsnList, index: usize) -> Option<&Frame> {
        (index..insns.len())
            .find(|idx| insns[*idx].is_real())
            .and_then(|idx| self.frames[idx].as_ref())
    }
}

struct Handler {
    start: usize,
    end: usize,
    handler: usize,
    catch_type: VType,
}

/// Compute the frame before every instruction by iterating to a fixpoint
///
/// Errors point at the index of the offending entry in the instruction list.
pub fn analyze(
    method: &MethodContext,
    insns: &InsnList,
    constants: &ConstantsPool,
    hierarchy: &dyn ClassHierarchy,
    mode: Mode,
) -> Result<Analysis, Error> {
    let at = |index: usize| move |kind: VerifierErrorKind| Error::VerifierError { index, kind };

    let descriptor = MethodDescriptor::parse(method.descriptor)?;
    let analyzer = Analyzer {
        method,
        insns,
        constants,
        hierarchy,
        mode,
        return_type: descriptor.return_type,
    };

    let positions = insns.label_positions();
    let position = |label: Label| -> Result<usize, Error> {
        positions
            .get(label.index())
            .copied()
            .flatten()
            .ok_or_else(|| Error::UnplacedLabels(vec![label]))
    };

    let mut handlers = vec![];
    for block in &insns.try_catch_blocks {
        let catch_type = block.catch_type.as_deref().unwrap_or("java/lang/Throwable");
        handlers.push(Handler {
            start: position(block.start)?,
            end: position(block.end)?,
            handler: position(block.handler)?,
            catch_type: VType::object(catch_type),
        });
    }

    let len = insns.len();
    let entry = Frame::entry(method).map_err(at(0))?;
    let mut max_stack = 0;
    let mut max_locals = entry.locals.len();
    if len == 0 {
        return Err(Error::VerifierError {
            index: 0,
            kind: VerifierErrorKind::FallsOffEnd,
        });
    }

    let mut frames: Vec<Option<Frame>> = vec![None; len];
    let mut queued = vec![false; len];
    frames[0] = Some(entry);
    queued[0] = true;
    let mut worklist = vec![0];

    while let Some(index) = worklist.pop() {
        queued[index] = false;
        let frame = match &frames[index] {
            Some(frame) => frame.clone(),
            None => continue,
        };
        max_stack = max_stack.max(frame.stack.total_width());
        max_locals = max_locals.max(frame.locals.len());

        let insn = &insns[index];
        let mut successors: Vec<(usize, Frame)> = vec![];
        if insn.is_real() {
            let mut after = frame.clone();
            analyzer.execute(index, insn, &mut after).map_err(at(index))?;
            max_stack = max_stack.max(after.stack.total_width());
            max_locals = max_locals.max(after.locals.len());

            // Exceptions may be thrown before or after the instruction updates locals
            for handler in &handlers {
                if handler.start <= index && index < handler.end {
                    for locals in [&frame.locals, &after.locals] {
                        let mut stack = OffsetVec::new();
                        stack.push(handler.catch_type.clone());
                        successors.push((
                            handler.handler,
                            Frame {
                                locals: locals.clone(),
                                stack,
                            },
                        ));
                    }
                }
            }

            for label in insn.jump_targets() {
                successors.push((position(label)?, after.clone()));
            }
            if insn.falls_through() {
                successors.push((index + 1, after));
            }
        } else {
            successors.push((index + 1, frame));
        }

        for (target, incoming) in successors {
            if target >= len {
                return Err(Error::VerifierError {
                    index,
                    kind: VerifierErrorKind::FallsOffEnd,
                });
            }
            let changed = if let Some(existing) = frames[target].as_mut() {
                analyzer.merge_into(existing, &incoming).map_err(at(target))?
            } else {
                frames[target] = Some(incoming);
                true
            };
            if changed && !queued[target] {
                queued[target] = true;
                worklist.push(target);
            }
        }
    }

    Ok(Analysis {
        frames,
        max_stack,
        max_locals,
    })
}

/// Coarse category of operand, enough to pick widths and check types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Int,
    Float,
    Long,
    Double,
    Reference,
}

impl Kind {
    fn of(field_type: &FieldType) -> Kind {
        match field_type {
            FieldType::Base(BaseType::Float) => Kind::Float,
            FieldType::Base(BaseType::Long) => Kind::Long,
            FieldType::Base(BaseType::Double) => Kind::Double,
            FieldType::Base(_) => Kind::Int,
            FieldType::Object(_) | FieldType::Array(_) => Kind::Reference,
        }
    }

    fn width(self) -> usize {
        match self {
            Kind::Long | Kind::Double => 2,
            _ => 1,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Long => "long",
            Kind::Double => "double",
            Kind::Reference => "reference",
        }
    }

    fn accepts(self, typ: &VType) -> bool {
        match self {
            Kind::Int => *typ == VType::Integer,
            Kind::Float => *typ == VType::Float,
            Kind::Long => *typ == VType::Long,
            Kind::Double => *typ == VType::Double,
            Kind::Reference => typ.is_reference(),
        }
    }

    /// Canonical type for a value of this kind (references are tracked precisely elsewhere)
    fn value(self) -> VType {
        match self {
            Kind::Int => VType::Integer,
            Kind::Float => VType::Float,
            Kind::Long => VType::Long,
            Kind::Double => VType::Double,
            Kind::Reference => VType::object("java/lang/Object"),
        }
    }

    /// Kind for the `xload`/`xstore`/`xreturn` families, ordered `i l f d a`
    fn from_family(offset: u8) -> Kind {
        match offset {
            0 => Kind::Int,
            1 => Kind::Long,
            2 => Kind::Float,
            3 => Kind::Double,
            _ => Kind::Reference,
        }
    }
}

struct Analyzer<'a> {
    method: &'a MethodContext<'a>,
    insns: &'a InsnList,
    constants: &'a ConstantsPool,
    hierarchy: &'a dyn ClassHierarchy,
    mode: Mode,
    return_type: Option<FieldType>,
}

impl<'a> Analyzer<'a> {
    fn strict(&self) -> bool {
        self.mode == Mode::Strict
    }

    fn pop(&self, stack: &mut OffsetVec<VType>, kind: Kind) -> Result<VType, VerifierErrorKind> {
        let typ = pop_offset_vec_expecting_width(stack, kind.width())?;
        if self.strict() && !kind.accepts(&typ) {
            return Err(VerifierErrorKind::InvalidType {
                found: typ,
                expected: kind.describe(),
            });
        }
        Ok(typ)
    }

    /// Pop an array reference whose descriptor is one of `descriptors`
    fn pop_array(
        &self,
        stack: &mut OffsetVec<VType>,
        descriptors: &[&str],
        expected: &'static str,
    ) -> Result<VType, VerifierErrorKind> {
        let typ = self.pop(stack, Kind::Reference)?;
        if self.strict() {
            let valid = match &typ {
                VType::Null => true,
                VType::Object(desc) => descriptors.contains(&desc.as_str()),
                _ => false,
            };
            if !valid {
                return Err(VerifierErrorKind::InvalidType {
                    found: typ,
                    expected,
                });
            }
        }
        Ok(typ)
    }

    fn load(&self, frame: &Frame, index: u16, kind: Kind) -> Result<VType, VerifierErrorKind> {
        let slot = index as usize;
        let typ = frame
            .locals
            .get(slot)
            .ok_or(VerifierErrorKind::InvalidLocal(index))?;
        if kind.width() == 2 && frame.locals.len() <= slot + 1 {
            return Err(VerifierErrorKind::InvalidLocal(index));
        }
        if self.strict() && !kind.accepts(typ) {
            return Err(VerifierErrorKind::InvalidType {
                found: typ.clone(),
                expected: kind.describe(),
            });
        }
        Ok(match kind {
            Kind::Reference if typ.is_reference() => typ.clone(),
            other => other.value(),
        })
    }

    fn execute(&self, index: usize, insn: &Insn, frame: &mut Frame) -> Result<(), VerifierErrorKind> {
        match insn {
            Insn::Label(_) | Insn::Line(_) => (),

            Insn::Op(op) => self.execute_op(*op, frame)?,

            Insn::Int(BIPUSH | SIPUSH, _) => {
                frame.stack.push(VType::Integer);
            }
            Insn::Int(NEWARRAY, code) => {
                self.pop(&mut frame.stack, Kind::Int)?;
                let element = match *code as u8 {
                    T_BOOLEAN => "Z",
                    T_CHAR => "C",
                    T_FLOAT => "F",
                    T_DOUBLE => "D",
                    T_BYTE => "B",
                    T_SHORT => "S",
                    T_INT => "I",
                    T_LONG => "J",
                    _ => return Err(VerifierErrorKind::UnsupportedOpcode(NEWARRAY)),
                };
                frame.stack.push(VType::Object(format!("[{}", element)));
            }
            Insn::Int(op, _) => return Err(VerifierErrorKind::UnsupportedOpcode(*op)),

            Insn::Type(NEW, _) => {
                frame.stack.push(VType::Uninitialized(index));
            }
            Insn::Type(ANEWARRAY, class) => {
                self.pop(&mut frame.stack, Kind::Int)?;
                frame.stack.push(VType::Object(array_of(class)));
            }
            Insn::Type(CHECKCAST, class) => {
                self.pop(&mut frame.stack, Kind::Reference)?;
                frame.stack.push(VType::Object(class.clone()));
            }
            Insn::Type(INSTANCEOF, _) => {
                self.pop(&mut frame.stack, Kind::Reference)?;
                frame.stack.push(VType::Integer);
            }
            Insn::Type(op, _) => return Err(VerifierErrorKind::UnsupportedOpcode(*op)),

            Insn::Var(RET, _) => return Err(VerifierErrorKind::Subroutine),
            Insn::Var(op @ ILOAD..=ALOAD, local) => {
                let typ = self.load(frame, *local, Kind::from_family(op - ILOAD))?;
                frame.stack.push(typ);
            }
            Insn::Var(op @ ISTORE..=ASTORE, local) => {
                let typ = self.pop(&mut frame.stack, Kind::from_family(op - ISTORE))?;
                store_local(&mut frame.locals, *local, typ);
            }
            Insn::Var(op, _) => return Err(VerifierErrorKind::UnsupportedOpcode(*op)),

            Insn::Iinc { index: local, .. } => {
                self.load(frame, *local, Kind::Int)?;
            }

            Insn::Field(op, member) => {
                let field_type = FieldType::parse(&member.descriptor)
                    .map_err(|_| VerifierErrorKind::BadDescriptor(member.descriptor.clone()))?;
                let kind = Kind::of(&field_type);
                match *op {
                    GETSTATIC => {
                        frame.stack.push(VType::from(&field_type));
                    }
                    PUTSTATIC => {
                        self.pop(&mut frame.stack, kind)?;
                    }
                    GETFIELD => {
                        self.pop(&mut frame.stack, Kind::Reference)?;
                        frame.stack.push(VType::from(&field_type));
                    }
                    PUTFIELD => {
                        self.pop(&mut frame.stack, kind)?;
                        self.pop(&mut frame.stack, Kind::Reference)?;
                    }
                    other => return Err(VerifierErrorKind::UnsupportedOpcode(other)),
                }
            }

            Insn::Method { opcode, member, .. } => {
                let descriptor = parse_method_descriptor(&member.descriptor)?;
                for parameter in descriptor.parameters.iter().rev() {
                    self.pop(&mut frame.stack, Kind::of(parameter))?;
                }
                if *opcode != INVOKESTATIC {
                    let receiver = self.pop(&mut frame.stack, Kind::Reference)?;
                    if *opcode == INVOKESPECIAL && member.name == "<init>" {
                        self.initialize(frame, receiver)?;
                    }
                }
                if let Some(return_type) = &descriptor.return_type {
                    frame.stack.push(VType::from(return_type));
                }
            }

            Insn::InvokeDynamic(site) => {
                let descriptor = parse_method_descriptor(&site.descriptor)?;
                for parameter in descriptor.parameters.iter().rev() {
                    self.pop(&mut frame.stack, Kind::of(parameter))?;
                }
                if let Some(return_type) = &descriptor.return_type {
                    frame.stack.push(VType::from(return_type));
                }
            }

            Insn::Ldc(constant) => {
                let typ = self.constant_type(constant)?;
                frame.stack.push(typ);
            }

            Insn::Jump(op, _) => match *op {
                IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE => {
                    self.pop(&mut frame.stack, Kind::Int)?;
                }
                IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE => {
                    self.pop(&mut frame.stack, Kind::Int)?;
                    self.pop(&mut frame.stack, Kind::Int)?;
                }
                IF_ACMPEQ | IF_ACMPNE => {
                    self.pop(&mut frame.stack, Kind::Reference)?;
                    self.pop(&mut frame.stack, Kind::Reference)?;
                }
                IFNULL | IFNONNULL => {
                    self.pop(&mut frame.stack, Kind::Reference)?;
                }
                GOTO | GOTO_W => (),
                JSR | JSR_W => return Err(VerifierErrorKind::Subroutine),
                other => return Err(VerifierErrorKind::UnsupportedOpcode(other)),
            },

            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => {
                self.pop(&mut frame.stack, Kind::Int)?;
            }

            Insn::MultiANewArray(descriptor, dimensions) => {
                for _ in 0..*dimensions {
                    self.pop(&mut frame.stack, Kind::Int)?;
                }
                frame.stack.push(VType::Object(descriptor.clone()));
            }
        }
        Ok(())
    }

    fn execute_op(&self, op: u8, frame: &mut Frame) -> Result<(), VerifierErrorKind> {
        let stack = &mut frame.stack;
        match op {
            NOP => (),
            ACONST_NULL => {
                stack.push(VType::Null);
            }
            ICONST_M1..=ICONST_5 => {
                stack.push(VType::Integer);
            }
            LCONST_0 | LCONST_1 => {
                stack.push(VType::Long);
            }
            FCONST_0 | FCONST_1 | FCONST_2 => {
                stack.push(VType::Float);
            }
            DCONST_0 | DCONST_1 => {
                stack.push(VType::Double);
            }

            // Short forms of local variable access
            ILOAD_0..=ALOAD_3 => {
                let family = (op - ILOAD_0) / 4;
                let local = ((op - ILOAD_0) % 4) as u16;
                let typ = self.load(frame, local, Kind::from_family(family))?;
                frame.stack.push(typ);
            }
            ISTORE_0..=ASTORE_3 => {
                let family = (op - ISTORE_0) / 4;
                let local = ((op - ISTORE_0) % 4) as u16;
                let typ = self.pop(stack, Kind::from_family(family))?;
                store_local(&mut frame.locals, local, typ);
            }

            IALOAD | BALOAD | CALOAD | SALOAD => {
                self.pop(stack, Kind::Int)?;
                let (descriptors, expected): (&[&str], _) = match op {
                    IALOAD => (&["[I"], "int array"),
                    BALOAD => (&["[B", "[Z"], "byte or boolean array"),
                    CALOAD => (&["[C"], "char array"),
                    _ => (&["[S"], "short array"),
                };
                self.pop_array(stack, descriptors, expected)?;
                stack.push(VType::Integer);
            }
            LALOAD => {
                self.pop(stack, Kind::Int)?;
                self.pop_array(stack, &["[J"], "long array")?;
                stack.push(VType::Long);
            }
            FALOAD => {
                self.pop(stack, Kind::Int)?;
                self.pop_array(stack, &["[F"], "float array")?;
                stack.push(VType::Float);
            }
            DALOAD => {
                self.pop(stack, Kind::Int)?;
                self.pop_array(stack, &["[D"], "double array")?;
                stack.push(VType::Double);
            }
            AALOAD => {
                self.pop(stack, Kind::Int)?;
                let array_type = self.pop(stack, Kind::Reference)?;
                let component = self.component_type(array_type)?;
                stack.push(component);
            }

            IASTORE | BASTORE | CASTORE | SASTORE => {
                self.pop(stack, Kind::Int)?;
                self.pop(stack, Kind::Int)?;
                let (descriptors, expected): (&[&str], _) = match op {
                    IASTORE => (&["[I"], "int array"),
                    BASTORE => (&["[B", "[Z"], "byte or boolean array"),
                    CASTORE => (&["[C"], "char array"),
                    _ => (&["[S"], "short array"),
                };
                self.pop_array(stack, descriptors, expected)?;
            }
            LASTORE => {
                self.pop(stack, Kind::Long)?;
                self.pop(stack, Kind::Int)?;
                self.pop_array(stack, &["[J"], "long array")?;
            }
            FASTORE => {
                self.pop(stack, Kind::Float)?;
                self.pop(stack, Kind::Int)?;
                self.pop_array(stack, &["[F"], "float array")?;
            }
            DASTORE => {
                self.pop(stack, Kind::Double)?;
                self.pop(stack, Kind::Int)?;
                self.pop_array(stack, &["[D"], "double array")?;
            }
            AASTORE => {
                self.pop(stack, Kind::Reference)?;
                self.pop(stack, Kind::Int)?;
                let array_type = self.pop(stack, Kind::Reference)?;
                self.component_type(array_type)?;
            }

            POP => {
                pop_offset_vec_expecting_width(stack, 1)?;
            }
            POP2 => {
                if pop_offset_vec(stack)?.width() == 1 {
                    pop_offset_vec_expecting_width(stack, 1)?;
                }
            }
            DUP => {
                let value = pop_offset_vec_expecting_width(stack, 1)?;
                stack.push(value.clone());
                stack.push(value);
            }
            DUP_X1 => {
                let value1 = pop_offset_vec_expecting_width(stack, 1)?;
                let value2 = pop_offset_vec_expecting_width(stack, 1)?;
                stack.push(value1.clone());
                stack.push(value2);
                stack.push(value1);
            }
            DUP_X2 => {
                let value1 = pop_offset_vec_expecting_width(stack, 1)?;
                let value2 = pop_offset_vec(stack)?;
                if value2.width() == 2 {
                    stack.push(value1.clone());
                    stack.push(value2);
                    stack.push(value1);
                } else {
                    let value3 = pop_offset_vec_expecting_width(stack, 1)?;
                    stack.push(value1.clone());
                    stack.push(value3);
                    stack.push(value2);
                    stack.push(value1);
                }
            }
            DUP2 => {
                let value1 = pop_offset_vec(stack)?;
                if value1.width() == 2 {
                    stack.push(value1.clone());
                    stack.push(value1);
                } else {
                    let value2 = pop_offset_vec_expecting_width(stack, 1)?;
                    stack.push(value2.clone());
                    stack.push(value1.clone());
                    stack.push(value2);
                    stack.push(value1);
                }
            }
            DUP2_X1 => {
                let value1 = pop_offset_vec(stack)?;
                if value1.width() == 2 {
                    let value2 = pop_offset_vec_expecting_width(stack, 1)?;
                    stack.push(value1.clone());
                    stack.push(value2);
                    stack.push(value1);
                } else {
                    let value2 = pop_offset_vec_expecting_width(stack, 1)?;
                    let value3 = pop_offset_vec_expecting_width(stack, 1)?;
                    stack.push(value2.clone());
                    stack.push(value1.clone());
                    stack.push(value3);
                    stack.push(value2);
                    stack.push(value1);
                }
            }
            DUP2_X2 => {
                let value1 = pop_offset_vec(stack)?;
                if value1.width() == 2 {
                    let value2 = pop_offset_vec(stack)?;
                    if value2.width() == 2 {
                        stack.push(value1.clone());
                        stack.push(value2);
                        stack.push(value1);
                    } else {
                        let value3 = pop_offset_vec_expecting_width(stack, 1)?;
                        stack.push(value1.clone());
                        stack.push(value3);
                        stack.push(value2);
                        stack.push(value1);
                    }
                } else {
                    let value2 = pop_offset_vec_expecting_width(stack, 1)?;
                    let value3 = pop_offset_vec(stack)?;
                    if value3.width() == 2 {
                        stack.push(value2.clone());
                        stack.push(value1.clone());
                        stack.push(value3);
                        stack.push(value2);
                        stack.push(value1);
                    } else {
                        let value4 = pop_offset_vec_expecting_width(stack, 1)?;
                        stack.push(value2.clone());
                        stack.push(value1.clone());
                        stack.push(value4);
                        stack.push(value3);
                        stack.push(value2);
                        stack.push(value1);
                    }
                }
            }
            SWAP => {
                let value1 = pop_offset_vec_expecting_width(stack, 1)?;
                let value2 = pop_offset_vec_expecting_width(stack, 1)?;
                stack.push(value1);
                stack.push(value2);
            }

            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
                self.pop(stack, Kind::Int)?;
                self.pop(stack, Kind::Int)?;
                stack.push(VType::Integer);
            }
            LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
                self.pop(stack, Kind::Long)?;
                self.pop(stack, Kind::Long)?;
                stack.push(VType::Long);
            }
            LSHL | LSHR | LUSHR => {
                self.pop(stack, Kind::Int)?;
                self.pop(stack, Kind::Long)?;
                stack.push(VType::Long);
            }
            FADD | FSUB | FMUL | FDIV | FREM => {
                self.pop(stack, Kind::Float)?;
                self.pop(stack, Kind::Float)?;
                stack.push(VType::Float);
            }
            DADD | DSUB | DMUL | DDIV | DREM => {
                self.pop(stack, Kind::Double)?;
                self.pop(stack, Kind::Double)?;
                stack.push(VType::Double);
            }
            INEG => self.convert(stack, Kind::Int, Kind::Int)?,
            LNEG => self.convert(stack, Kind::Long, Kind::Long)?,
            FNEG => self.convert(stack, Kind::Float, Kind::Float)?,
            DNEG => self.convert(stack, Kind::Double, Kind::Double)?,

            I2L => self.convert(stack, Kind::Int, Kind::Long)?,
            I2F => self.convert(stack, Kind::Int, Kind::Float)?,
            I2D => self.convert(stack, Kind::Int, Kind::Double)?,
            L2I => self.convert(stack, Kind::Long, Kind::Int)?,
            L2F => self.convert(stack, Kind::Long, Kind::Float)?,
            L2D => self.convert(stack, Kind::Long, Kind::Double)?,
            F2I => self.convert(stack, Kind::Float, Kind::Int)?,
            F2L => self.convert(stack, Kind::Float, Kind::Long)?,
            F2D => self.convert(stack, Kind::Float, Kind::Double)?,
            D2I => self.convert(stack, Kind::Double, Kind::Int)?,
            D2L => self.convert(stack, Kind::Double, Kind::Long)?,
            D2F => self.convert(stack, Kind::Double, Kind::Float)?,
            I2B | I2C | I2S => self.convert(stack, Kind::Int, Kind::Int)?,

            LCMP => {
                self.pop(stack, Kind::Long)?;
                self.pop(stack, Kind::Long)?;
                stack.push(VType::Integer);
            }
            FCMPL | FCMPG => {
                self.pop(stack, Kind::Float)?;
                self.pop(stack, Kind::Float)?;
                stack.push(VType::Integer);
            }
            DCMPL | DCMPG => {
                self.pop(stack, Kind::Double)?;
                self.pop(stack, Kind::Double)?;
                stack.push(VType::Integer);
            }

            IRETURN | LRETURN | FRETURN | DRETURN | ARETURN => {
                let kind = Kind::from_family(op - IRETURN);
                let found = self.pop(stack, kind)?;
                if self.strict() && self.return_type.as_ref().map(Kind::of) != Some(kind) {
                    return Err(VerifierErrorKind::InvalidType {
                        found,
                        expected: "value matching the method return type",
                    });
                }
            }
            RETURN => {
                if self.strict() && self.return_type.is_some() {
                    return Err(VerifierErrorKind::InvalidType {
                        found: VType::Top,
                        expected: "a return value",
                    });
                }
            }

            ARRAYLENGTH => {
                self.pop(stack, Kind::Reference)?;
                stack.push(VType::Integer);
            }
            ATHROW | MONITORENTER | MONITOREXIT => {
                self.pop(stack, Kind::Reference)?;
            }

            other => return Err(VerifierErrorKind::UnsupportedOpcode(other)),
        }
        Ok(())
    }

    fn convert(
        &self,
        stack: &mut OffsetVec<VType>,
        from: Kind,
        to: Kind,
    ) -> Result<(), VerifierErrorKind> {
        self.pop(stack, from)?;
        stack.push(to.value());
        Ok(())
    }

    /// Element type of a reference array (for `aaload`/`aastore`)
    fn component_type(&self, array_type: VType) -> Result<VType, VerifierErrorKind> {
        let invalid = |found: VType| VerifierErrorKind::InvalidType {
            found,
            expected: "array of references",
        };
        match &array_type {
            VType::Null => Ok(VType::Null),
            VType::Object(desc) if desc.starts_with("[[") => Ok(VType::object(&desc[1..])),
            VType::Object(desc) if desc.starts_with("[L") && desc.ends_with(';') => {
                Ok(VType::object(&desc[2..desc.len() - 1]))
            }
            _ if self.strict() => Err(invalid(array_type)),
            _ => Ok(VType::object("java/lang/Object")),
        }
    }

    /// Type pushed by an `ldc` of this constant
    fn constant_type(&self, constant: &LoadableConstant) -> Result<VType, VerifierErrorKind> {
        Ok(match constant {
            LoadableConstant::Int(_) => VType::Integer,
            LoadableConstant::Float(_) => VType::Float,
            LoadableConstant::Long(_) => VType::Long,
            LoadableConstant::Double(_) => VType::Double,
            LoadableConstant::String(_) => VType::object("java/lang/String"),
            LoadableConstant::Class(_) => VType::object("java/lang/Class"),
            LoadableConstant::MethodType(_) => VType::object("java/lang/invoke/MethodType"),
            LoadableConstant::Handle(_) => VType::object("java/lang/invoke/MethodHandle"),
            LoadableConstant::Pooled(index) => {
                let bad = || VerifierErrorKind::BadDescriptor(format!("constant #{}", index.0));
                match self.constants.get(*index).map_err(|_| bad())? {
                    Constant::Integer(_) => VType::Integer,
                    Constant::Float(_) => VType::Float,
                    Constant::Long(_) => VType::Long,
                    Constant::Double(_) => VType::Double,
                    Constant::String(_) => VType::object("java/lang/String"),
                    Constant::Class(_) => VType::object("java/lang/Class"),
                    Constant::MethodType { .. } => VType::object("java/lang/invoke/MethodType"),
                    Constant::MethodHandle { .. } => VType::object("java/lang/invoke/MethodHandle"),
                    Constant::Dynamic { name_and_type, .. } => {
                        let (_, descriptor) =
                            self.constants.name_and_type(*name_and_type).map_err(|_| bad())?;
                        let field_type = FieldType::parse(descriptor)
                            .map_err(|_| VerifierErrorKind::BadDescriptor(descriptor.to_owned()))?;
                        VType::from(&field_type)
                    }
                    _ => return Err(bad()),
                }
            }
        })
    }

    /// Mark an object as initialized after its `<init>` call, everywhere it appears
    fn initialize(&self, frame: &mut Frame, receiver: VType) -> Result<(), VerifierErrorKind> {
        let initialized = match &receiver {
            VType::UninitializedThis => VType::object(self.method.class_name),
            VType::Uninitialized(new_index) => match self.insns.insns().get(*new_index) {
                Some(Insn::Type(NEW, class)) => VType::Object(class.clone()),
                _ => {
                    return Err(VerifierErrorKind::InvalidType {
                        found: receiver,
                        expected: "result of new",
                    })
                }
            },
            _ if self.strict() => {
                return Err(VerifierErrorKind::InvalidType {
                    found: receiver,
                    expected: "uninitialized object",
                })
            }
            _ => return Ok(()),
        };

        for local in frame.locals.iter_mut() {
            if *local == receiver {
                *local = initialized.clone();
            }
        }
        for value in frame.stack.values_mut() {
            if *value == receiver {
                *value = initialized.clone();
            }
        }
        Ok(())
    }

    /// Merge `incoming` into `existing`, returning whether `existing` changed
    fn merge_into(&self, existing: &mut Frame, incoming: &Frame) -> Result<bool, VerifierErrorKind> {
        if existing.stack.len() != incoming.stack.len() {
            return Err(VerifierErrorKind::StackHeightMismatch(
                existing.stack.total_width(),
                incoming.stack.total_width(),
            ));
        }

        let mut stack = OffsetVec::new();
        for (current, other) in existing.stack.values().zip(incoming.stack.values()) {
            let merged = self.merge_types(current, other);
            let incompatible = merged == VType::Top && current != other;
            if incompatible && (self.strict() || current.width() != other.width()) {
                return Err(VerifierErrorKind::IncompatibleTypes(
                    current.clone(),
                    other.clone(),
                ));
            }
            stack.push(merged);
        }

        let shared = existing.locals.len().min(incoming.locals.len());
        let mut locals: Vec<VType> = existing.locals[..shared]
            .iter()
            .zip(&incoming.locals[..shared])
            .map(|(current, other)| self.merge_types(current, other))
            .collect();

        // A wide local is only usable if its second half survived too
        for slot in 0..locals.len() {
            if locals[slot].width() == 2 && locals.get(slot + 1) != Some(&VType::Top) {
                locals[slot] = VType::Top;
            }
        }
        trim_locals(&mut locals);
        let mut existing_locals = existing.locals.clone();
        trim_locals(&mut existing_locals);

        let changed = stack != existing.stack || locals != existing_locals;
        if changed {
            existing.stack = stack;
            existing.locals = locals;
        }
        Ok(changed)
    }

    fn merge_types(&self, current: &VType, other: &VType) -> VType {
        if current == other {
            return current.clone();
        }
        match (current, other) {
            (VType::Null, VType::Object(_)) => other.clone(),
            (VType::Object(_), VType::Null) => current.clone(),
            (VType::Object(cls1), VType::Object(cls2)) => VType::Object(self.merge_classes(cls1, cls2)),
            _ => VType::Top,
        }
    }

    fn merge_classes(&self, cls1: &str, cls2: &str) -> String {
        match (cls1.strip_prefix('['), cls2.strip_prefix('[')) {
            (Some(elem1), Some(elem2)) => match (element_class(elem1), element_class(elem2)) {
                (Some(elem1), Some(elem2)) => array_of(&self.merge_classes(elem1, elem2)),
                _ => String::from("java/lang/Object"),
            },
            (None, None) => self.hierarchy.common_super_class(cls1, cls2),
            _ => String::from("java/lang/Object"),
        }
    }
}

/// Class of an array element, given the descriptor following the `[` (`None` for primitives)
pub(super) fn element_class(descriptor: &str) -> Option<&str> {
    if descriptor.starts_with('[') {
        Some(descriptor)
    } else {
        descriptor
            .strip_prefix('L')
            .and_then(|desc| desc.strip_suffix(';'))
    }
}

/// Array class whose elements are the given class
fn array_of(class: &str) -> String {
    if class.starts_with('[') {
        format!("[{}", class)
    } else {
        format!("[L{};", class)
    }
}

fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor, VerifierErrorKind> {
    MethodDescriptor::parse(descriptor)
        .map_err(|_| VerifierErrorKind::BadDescriptor(descriptor.to_owned()))
}

/// Write a local, clobbering any wide value the write overlaps
fn store_local(locals: &mut Vec<VType>, index: u16, typ: VType) {
    let slot = index as usize;
    let width = typ.width();
    while locals.len() < slot + width {
        locals.push(VType::Top);
    }
    if slot > 0 && locals[slot - 1].width() == 2 {
        locals[slot - 1] = VType::Top;
    }
    locals[slot] = typ;
    if width == 2 {
        locals[slot + 1] = VType::Top;
    }
}

/// Drop trailing unusable locals, except for the second half of a wide local
fn trim_locals(locals: &mut Vec<VType>) {
    while locals.last() == Some(&VType::Top) {
        let len = locals.len();
        if len >= 2 && locals[len - 2].width() == 2 {
            break;
        }
        locals.pop();
    }
}

fn pop_offset_vec(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    stack.pop().ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_offset_vec_expecting_width(
    stack: &mut OffsetVec<VType>,
    expected_width: usize,
) -> Result<VType, VerifierErrorKind> {
    let typ = pop_offset_vec(stack)?;
    let found_width = typ.width();
    if found_width == expected_width {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{MemberRef, TryCatchBlock};
    use crate::jvm::verifier::{MapHierarchy, ObjectHierarchy};

    fn context<'a>(name: &'a str, descriptor: &'a str, is_static: bool) -> MethodContext<'a> {
        MethodContext {
            class_name: "me/alec/Test",
            name,
            descriptor,
            is_static,
        }
    }

    fn run(method: &MethodContext, insns: &InsnList, mode: Mode) -> Result<Analysis, Error> {
        analyze(method, insns, &ConstantsPool::new(), &ObjectHierarchy, mode)
    }

    #[test]
    fn entry_frames() {
        let frame = Frame::entry(&context("f", "(JLjava/lang/String;[I)V", false)).unwrap();
        assert_eq!(
            frame.locals,
            vec![
                VType::object("me/alec/Test"),
                VType::Long,
                VType::Top,
                VType::object("java/lang/String"),
                VType::object("[I"),
            ]
        );

        let frame = Frame::entry(&context("<init>", "()V", false)).unwrap();
        assert_eq!(frame.locals, vec![VType::UninitializedThis]);
    }

    #[test]
    fn straight_line_maximums() {
        let method = context("add", "(JJ)J", true);
        let mut insns = InsnList::new();
        insns.push(Insn::Var(LLOAD, 0));
        insns.push(Insn::Var(LLOAD, 2));
        insns.push(Insn::Op(LADD));
        insns.push(Insn::Op(LRETURN));

        let analysis = run(&method, &insns, Mode::Strict).unwrap();
        assert_eq!(analysis.max_stack, 4);
        assert_eq!(analysis.max_locals, 4);
        assert!(analysis.frames.iter().all(Option::is_some));
    }

    #[test]
    fn strict_mode_checks_types() {
        let method = context("bad", "(F)I", true);
        let mut insns = InsnList::new();
        insns.push(Insn::Var(FLOAD, 0));
        insns.push(Insn::Op(ICONST_1));
        insns.push(Insn::Op(IADD));
        insns.push(Insn::Op(IRETURN));

        assert!(run(&method, &insns, Mode::Lenient).is_ok());
        match run(&method, &insns, Mode::Strict) {
            Err(Error::VerifierError {
                index: 2,
                kind: VerifierErrorKind::InvalidType { found, .. },
            }) => assert_eq!(found, VType::Float),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn falling_off_the_end() {
        let method = context("f", "()V", true);
        let mut insns = InsnList::new();
        insns.push(Insn::Op(NOP));

        match run(&method, &insns, Mode::Lenient) {
            Err(Error::VerifierError {
                kind: VerifierErrorKind::FallsOffEnd,
                ..
            }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn merging_branches() {
        let mut hierarchy = MapHierarchy::new();
        hierarchy
            .insert("me/alec/Cat", "me/alec/Animal")
            .insert("me/alec/Dog", "me/alec/Animal");

        let method = context("pick", "(ZLme/alec/Cat;Lme/alec/Dog;)Ljava/lang/Object;", true);
        let mut insns = InsnList::new();
        let else_label = insns.fresh_label();
        let end_label = insns.fresh_label();
        insns.push(Insn::Var(ILOAD, 0));
        insns.push(Insn::Jump(IFEQ, else_label));
        insns.push(Insn::Var(ALOAD, 1));
        insns.push(Insn::Jump(GOTO, end_label));
        insns.push(Insn::Label(else_label));
        insns.push(Insn::Var(ALOAD, 2));
        insns.push(Insn::Label(end_label));
        insns.push(Insn::Op(ARETURN));

        let analysis = analyze(
            &method,
            &insns,
            &ConstantsPool::new(),
            &hierarchy,
            Mode::Strict,
        )
        .unwrap();
        let frame = analysis.frame_at(&insns, 6).unwrap();
        assert_eq!(
            frame.stack.values().collect::<Vec<_>>(),
            vec![&VType::object("me/alec/Animal")]
        );
    }

    #[test]
    fn mismatched_stack_heights() {
        let method = context("f", "(I)V", true);
        let mut insns = InsnList::new();
        let join = insns.fresh_label();
        insns.push(Insn::Op(ICONST_0));
        insns.push(Insn::Var(ILOAD, 0));
        insns.push(Insn::Jump(IFEQ, join));
        insns.push(Insn::Op(POP));
        insns.push(Insn::Label(join));
        insns.push(Insn::Op(RETURN));

        match run(&method, &insns, Mode::Lenient) {
            Err(Error::VerifierError {
                kind: VerifierErrorKind::StackHeightMismatch(_, _),
                ..
            }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn constructor_initializes_objects() {
        let method = context("make", "()Ljava/lang/Object;", true);
        let mut insns = InsnList::new();
        insns.push(Insn::Type(NEW, String::from("java/lang/StringBuilder")));
        insns.push(Insn::Op(DUP));
        insns.push(Insn::Method {
            opcode: INVOKESPECIAL,
            member: MemberRef::new("java/lang/StringBuilder", "<init>", "()V"),
            is_interface: false,
        });
        insns.push(Insn::Op(ARETURN));

        let analysis = run(&method, &insns, Mode::Strict).unwrap();
        let before_call = analysis.frames[2].as_ref().unwrap();
        assert_eq!(
            before_call.stack.values().collect::<Vec<_>>(),
            vec![&VType::Uninitialized(0), &VType::Uninitialized(0)]
        );
        let after_call = analysis.frames[3].as_ref().unwrap();
        assert_eq!(
            after_call.stack.values().collect::<Vec<_>>(),
            vec![&VType::object("java/lang/StringBuilder")]
        );
    }

    #[test]
    fn exception_handlers() {
        let method = context("safe", "()V", true);
        let mut insns = InsnList::new();
        let start = insns.fresh_label();
        let end = insns.fresh_label();
        let handler = insns.fresh_label();
        insns.push(Insn::Label(start));
        insns.push(Insn::Op(ICONST_0));
        insns.push(Insn::Var(ISTORE, 0));
        insns.push(Insn::Label(end));
        insns.push(Insn::Op(RETURN));
        insns.push(Insn::Label(handler));
        insns.push(Insn::Op(ATHROW));
        insns.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: Some(String::from("java/lang/RuntimeException")),
        });

        let analysis = run(&method, &insns, Mode::Strict).unwrap();
        let frame = analysis.frame_at(&insns, 5).unwrap();
        assert_eq!(
            frame.stack.values().collect::<Vec<_>>(),
            vec![&VType::object("java/lang/RuntimeException")]
        );
        // `istore` may or may not have happened by the time the handler runs
        assert!(frame.locals.is_empty());
    }

    #[test]
    fn wide_stores_clobber_neighbours() {
        let mut locals = vec![VType::Long, VType::Top, VType::Integer];
        store_local(&mut locals, 1, VType::Float);
        assert_eq!(locals, vec![VType::Top, VType::Float, VType::Integer]);

        store_local(&mut locals, 4, VType::Double);
        assert_eq!(
            locals,
            vec![
                VType::Top,
                VType::Float,
                VType::Integer,
                VType::Top,
                VType::Double,
                VType::Top
            ]
        );
    }

    #[test]
    fn wide_local_in_last_slot_survives_joins() {
        let method = context("sum", "(Ljava/lang/String;)J", true);
        let mut insns = InsnList::new();
        let join = insns.fresh_label();
        insns.push(Insn::Op(ACONST_NULL));
        insns.push(Insn::Var(ASTORE, 1));
        insns.push(Insn::Op(LCONST_0));
        insns.push(Insn::Var(LSTORE, 2));
        insns.push(Insn::Var(ALOAD, 0));
        insns.push(Insn::Jump(IFNULL, join));
        insns.push(Insn::Op(ICONST_0));
        insns.push(Insn::Var(ISTORE, 1));
        insns.push(Insn::Label(join));
        insns.push(Insn::Var(LLOAD, 2));
        insns.push(Insn::Op(LRETURN));

        for mode in [Mode::Lenient, Mode::Strict] {
            let analysis = run(&method, &insns, mode).unwrap();
            assert_eq!(
                analysis.frame_at(&insns, 8).unwrap().locals,
                vec![
                    VType::object("java/lang/String"),
                    VType::Top,
                    VType::Long,
                    VType::Top
                ]
            );
            assert_eq!(analysis.max_locals, 4);
        }
    }

    #[test]
    fn trimming_keeps_wide_halves() {
        let mut locals = vec![VType::Integer, VType::Top, VType::Top];
        trim_locals(&mut locals);
        assert_eq!(locals, vec![VType::Integer]);

        let mut locals = vec![VType::Double, VType::Top, VType::Top];
        trim_locals(&mut locals);
        assert_eq!(locals, vec![VType::Double, VType::Top]);
    }

    #[test]
    fn merged_array_classes() {
        let analyzer = Analyzer {
            method: &context("f", "()V", true),
            insns: &InsnList::new(),
            constants: &ConstantsPool::new(),
            hierarchy: &ObjectHierarchy,
            mode: Mode::Lenient,
            return_type: None,
        };
        assert_eq!(
            analyzer.merge_classes("[Ljava/lang/String;", "[Ljava/lang/Integer;"),
            "[Ljava/lang/Object;"
        );
        assert_eq!(analyzer.merge_classes("[[I", "[[J"), "[Ljava/lang/Object;");
        assert_eq!(analyzer.merge_classes("[I", "[J"), "java/lang/Object");
        assert_eq!(
            analyzer.merge_types(&VType::Null, &VType::object("[I")),
            VType::object("[I")
        );
        assert_eq!(analyzer.merge_types(&VType::Integer, &VType::Float), VType::Top);
    }

    #[test]
    fn subroutines_are_rejected() {
        let method = context("f", "()V", true);
        let mut insns = InsnList::new();
        let sub = insns.fresh_label();
        insns.push(Insn::Jump(JSR, sub));
        insns.push(Insn::Op(RETURN));
        insns.push(Insn::Label(sub));
        insns.push(Insn::Var(ASTORE, 0));
        insns.push(Insn::Var(RET, 0));

        match run(&method, &insns, Mode::Lenient) {
            Err(Error::VerifierError {
                index: 0,
                kind: VerifierErrorKind::Subroutine,
            }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
