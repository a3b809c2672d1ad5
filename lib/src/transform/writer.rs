use super::Error;
use crate::dsl::{self, IdentityRemapper, InsnBuilder, Remapper};
use crate::jvm::code::{opcodes, Insn};
use crate::jvm::tree::ClassNode;
use std::sync::Arc;

/// Mutation of one class, applied to its parsed tree while the class loads
///
/// Several writers can target the same class: they run in registration order, each one seeing
/// the changes of the ones before it.
pub trait ClassWriter: Send + Sync {
    /// Internal name of the class this writer applies to
    fn class_name(&self) -> &str;

    fn apply(&self, class: &mut ClassNode) -> Result<(), Error>;
}

/// Writer defined by a closure, see [`writer_fn`]
pub struct FnWriter<F> {
    class_name: String,
    apply: F,
}

/// Make a writer out of a closure
pub fn writer_fn<F>(class_name: &str, apply: F) -> FnWriter<F>
where
    F: Fn(&mut ClassNode) -> Result<(), Error> + Send + Sync,
{
    FnWriter {
        class_name: class_name.replace('.', "/"),
        apply,
    }
}

impl<F> ClassWriter for FnWriter<F>
where
    F: Fn(&mut ClassNode) -> Result<(), Error> + Send + Sync,
{
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn apply(&self, class: &mut ClassNode) -> Result<(), Error> {
        (self.apply)(class)
    }
}

/// Where in a method [`MethodInjector`] puts its code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectAt {
    /// Before the first instruction
    Head,

    /// Before every return instruction
    BeforeReturn,

    /// Before the last return instruction
    Tail,
}

/// Writer which splices a built instruction sequence into one method
///
/// The code is rebuilt for every class it is applied to, with scratch locals allocated past those
/// the method already uses. It should leave the operand stack as it found it.
pub struct MethodInjector<F> {
    owner: String,
    name: String,
    descriptor: String,
    at: InjectAt,
    remapper: Option<Arc<dyn Remapper>>,
    build: F,
}

impl<F> MethodInjector<F>
where
    F: Fn(&mut InsnBuilder) -> Result<(), dsl::Error> + Send + Sync,
{
    pub fn new(
        owner: &str,
        name: &str,
        descriptor: &str,
        at: InjectAt,
        build: F,
    ) -> MethodInjector<F> {
        MethodInjector {
            owner: owner.replace('.', "/"),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            at,
            remapper: None,
            build,
        }
    }

    /// Remap member names in the injected code
    pub fn with_remapper(mut self, remapper: Arc<dyn Remapper>) -> Self {
        self.remapper = Some(remapper);
        self
    }

    fn no_such_method(&self) -> dsl::Error {
        dsl::Error::NoSuchMethod {
            owner: self.owner.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }
}

impl<F> ClassWriter for MethodInjector<F>
where
    F: Fn(&mut InsnBuilder) -> Result<(), dsl::Error> + Send + Sync,
{
    fn class_name(&self) -> &str {
        &self.owner
    }

    fn apply(&self, class: &mut ClassNode) -> Result<(), Error> {
        let remapper: &dyn Remapper = match &self.remapper {
            Some(remapper) => remapper.as_ref(),
            None => &IdentityRemapper,
        };
        let method = class
            .method_mut(&self.name, &self.descriptor)
            .ok_or_else(|| self.no_such_method())?;

        let mut builder = InsnBuilder::for_method(method, remapper)?;
        (self.build)(&mut builder)?;
        let injected = builder.build()?;

        let code = match &mut method.code {
            Some(code) => code,
            None => {
                return Err(Error::Writer {
                    class_name: self.owner.clone(),
                    message: format!("{}{} has no code", self.name, self.descriptor),
                })
            }
        };

        let returns: Vec<usize> = code
            .insns
            .iter()
            .enumerate()
            .filter(|(_, insn)| is_return(insn))
            .map(|(idx, _)| idx)
            .collect();
        let positions: Vec<usize> = match self.at {
            InjectAt::Head => vec![0],
            InjectAt::BeforeReturn => returns,
            InjectAt::Tail => returns.last().copied().into_iter().collect(),
        };
        if positions.is_empty() {
            return Err(Error::Writer {
                class_name: self.owner.clone(),
                message: format!("{}{} never returns", self.name, self.descriptor),
            });
        }

        // Back to front, so earlier positions stay valid
        for position in positions.into_iter().rev() {
            code.insns.splice(position, injected.clone());
        }
        Ok(())
    }
}

fn is_return(insn: &Insn) -> bool {
    matches!(insn, Insn::Op(opcodes::IRETURN..=opcodes::RETURN))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;
    use crate::jvm::code::MemberRef;
    use crate::jvm::tree::MethodNode;
    use crate::jvm::MethodAccessFlags;

    fn widget() -> ClassNode {
        let mut class = ClassNode::new("a/Widget", Some("java/lang/Object"));
        let mut method = MethodNode::new(MethodAccessFlags::PUBLIC, "size", "(Z)I");
        let code = method.code_mut();
        let other = code.insns.fresh_label();
        code.insns.push(Insn::Var(ILOAD, 1));
        code.insns.push(Insn::Jump(IFEQ, other));
        code.insns.push(Insn::Op(ICONST_1));
        code.insns.push(Insn::Op(IRETURN));
        code.insns.place_label(other).unwrap();
        code.insns.push(Insn::Op(ICONST_2));
        code.insns.push(Insn::Op(IRETURN));
        class.methods.push(method);
        class
    }

    fn count_calls(class: &ClassNode) -> usize {
        let code = class.method("size", "(Z)I").unwrap().code.as_ref().unwrap();
        code.insns
            .iter()
            .filter(|insn| matches!(insn, Insn::Method { opcode: INVOKESTATIC, .. }))
            .count()
    }

    fn tick(b: &mut InsnBuilder) -> Result<(), dsl::Error> {
        b.invoke_static("a/Hooks", "tick", "()V");
        Ok(())
    }

    #[test]
    fn injection_points() {
        let cases = [
            (InjectAt::Head, 1, 0),
            (InjectAt::BeforeReturn, 2, 3),
            (InjectAt::Tail, 1, 6),
        ];
        for (at, calls, first) in cases {
            let mut class = widget();
            MethodInjector::new("a/Widget", "size", "(Z)I", at, tick)
                .apply(&mut class)
                .unwrap();
            assert_eq!(count_calls(&class), calls, "{:?}", at);

            let code = class.method("size", "(Z)I").unwrap().code.as_ref().unwrap();
            let position = code
                .insns
                .iter()
                .position(|insn| matches!(insn, Insn::Method { .. }));
            assert_eq!(position, Some(first), "{:?}", at);
        }
    }

    #[test]
    fn missing_methods_are_reported() {
        let mut class = widget();
        let result = MethodInjector::new("a/Widget", "size", "()I", InjectAt::Head, tick)
            .apply(&mut class);
        assert!(matches!(
            result,
            Err(Error::Builder(dsl::Error::NoSuchMethod { .. }))
        ));
    }

    #[test]
    fn injected_code_is_remapped() {
        let mut remapper = dsl::MappingRemapper::new();
        remapper.rename_method("a/Hooks", "tick", "()V", "t");

        let mut class = widget();
        MethodInjector::new("a.Widget", "size", "(Z)I", InjectAt::Head, tick)
            .with_remapper(Arc::new(remapper))
            .apply(&mut class)
            .unwrap();

        let code = class.method("size", "(Z)I").unwrap().code.as_ref().unwrap();
        assert_eq!(
            code.insns[0],
            Insn::Method {
                opcode: INVOKESTATIC,
                member: MemberRef::new("a/Hooks", "t", "()V"),
                is_interface: false,
            }
        );
    }
}
