use super::class_file::{
    BootstrapMethod, BootstrapMethods, ClassConstantIndex, Constant, ConstantIndex, ConstantsPool,
};
use super::code::{Handle, InvokeDynamicSite, LoadableConstant};
use super::Error;
use std::result::Result;

/// Symbolic things which can be interned into a constant pool
pub trait ConstantsWriter<Index = ConstantIndex> {
    /// Get or insert a constant into the constant pool and return the associated index
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<Index, Error>;
}

impl ConstantsWriter for Handle {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<ConstantIndex, Error> {
        let member = &self.member;
        let member_idx = if self.kind.is_field() {
            constants.get_field_ref(&member.owner, &member.name, &member.descriptor)?
        } else {
            constants.get_method_ref(
                &member.owner,
                &member.name,
                &member.descriptor,
                self.is_interface,
            )?
        };
        constants.get_method_handle(self.kind, member_idx)
    }
}

impl ConstantsWriter for LoadableConstant {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<ConstantIndex, Error> {
        match self {
            LoadableConstant::Int(integer) => constants.get_integer(*integer),
            LoadableConstant::Float(float) => constants.get_float(*float),
            LoadableConstant::Long(long) => constants.get_long(*long),
            LoadableConstant::Double(double) => constants.get_double(*double),
            LoadableConstant::String(string) => constants.get_string(string),
            LoadableConstant::Class(class) => Ok(constants.get_class(class)?.into()),
            LoadableConstant::MethodType(descriptor) => constants.get_method_type(descriptor),
            LoadableConstant::Handle(handle) => handle.constant_index(constants),
            LoadableConstant::Pooled(index) => {
                constants.get(*index)?;
                Ok(*index)
            }
        }
    }
}

impl LoadableConstant {
    /// Does loading this constant push a `long` or `double` (requiring `ldc2_w`)?
    pub fn is_wide(&self, constants: &ConstantsPool) -> Result<bool, Error> {
        Ok(match self {
            LoadableConstant::Long(_) | LoadableConstant::Double(_) => true,
            LoadableConstant::Pooled(index) => match constants.get(*index)? {
                Constant::Long(_) | Constant::Double(_) => true,
                Constant::Dynamic { name_and_type, .. } => {
                    let (_, descriptor) = constants.name_and_type(*name_and_type)?;
                    descriptor == "J" || descriptor == "D"
                }
                _ => false,
            },
            _ => false,
        })
    }
}

impl InvokeDynamicSite {
    /// Intern the call site, re-using an identical bootstrap method entry if there is one
    pub fn constant_index(
        &self,
        constants: &mut ConstantsPool,
        bootstrap_methods: &mut BootstrapMethods,
    ) -> Result<ConstantIndex, Error> {
        let bootstrap_method = self.bootstrap.constant_index(constants)?;
        let bootstrap_arguments = self
            .arguments
            .iter()
            .map(|arg| arg.constant_index(constants))
            .collect::<Result<Vec<_>, Error>>()?;
        let entry = BootstrapMethod {
            bootstrap_method,
            bootstrap_arguments,
        };

        let position = match bootstrap_methods.0.iter().position(|bsm| *bsm == entry) {
            Some(position) => position,
            None => {
                bootstrap_methods.0.push(entry);
                bootstrap_methods.0.len() - 1
            }
        };
        let position = u16::try_from(position)
            .map_err(|_| Error::Malformed(String::from("too many bootstrap methods")))?;
        constants.get_invoke_dynamic(position, &self.name, &self.descriptor)
    }
}
