use super::{Error, InsnBuilder, LocalSlot};
use crate::jvm::class_file::HandleKind;
use crate::jvm::code::{opcodes::*, Handle, Insn, InvokeDynamicSite, LoadableConstant, MemberRef};

/// Field or method, as named in source (before remapping)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl Descriptor {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Descriptor {
        Descriptor {
            owner: owner.to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldAction {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

impl FieldAction {
    pub fn opcode(self) -> u8 {
        match self {
            FieldAction::GetStatic => GETSTATIC,
            FieldAction::PutStatic => PUTSTATIC,
            FieldAction::GetField => GETFIELD,
            FieldAction::PutField => PUTFIELD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeKind {
    pub fn opcode(self) -> u8 {
        match self {
            InvokeKind::Virtual => INVOKEVIRTUAL,
            InvokeKind::Special => INVOKESPECIAL,
            InvokeKind::Static => INVOKESTATIC,
            InvokeKind::Interface => INVOKEINTERFACE,
        }
    }
}

/// Name of the static field holding the instance of a singleton class
pub const SINGLETON_FIELD: &str = "INSTANCE";

impl<'r> InsnBuilder<'r> {
    fn field_ref(&self, owner: &str, name: &str, descriptor: &str) -> MemberRef {
        let name = self.remapper().map_field_name(owner, name, descriptor);
        MemberRef::new(owner, &name, descriptor)
    }

    fn method_ref(&self, owner: &str, name: &str, descriptor: &str) -> MemberRef {
        let name = self.remapper().map_method_name(owner, name, descriptor);
        MemberRef::new(owner, &name, descriptor)
    }

    /// Access a field (its name going through the remapper)
    pub fn field(&mut self, action: FieldAction, field: &Descriptor) -> &mut Self {
        let member = self.field_ref(&field.owner, &field.name, &field.descriptor);
        self.push(Insn::Field(action.opcode(), member))
    }

    pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(FieldAction::GetStatic, &Descriptor::new(owner, name, descriptor))
    }

    pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(FieldAction::PutStatic, &Descriptor::new(owner, name, descriptor))
    }

    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(FieldAction::GetField, &Descriptor::new(owner, name, descriptor))
    }

    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(FieldAction::PutField, &Descriptor::new(owner, name, descriptor))
    }

    /// Invoke a method (its name going through the remapper)
    pub fn invoke(&mut self, kind: InvokeKind, method: &Descriptor) -> &mut Self {
        let member = self.method_ref(&method.owner, &method.name, &method.descriptor);
        self.push(Insn::Method {
            opcode: kind.opcode(),
            member,
            is_interface: kind == InvokeKind::Interface,
        })
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(InvokeKind::Static, &Descriptor::new(owner, name, descriptor))
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(InvokeKind::Virtual, &Descriptor::new(owner, name, descriptor))
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(InvokeKind::Special, &Descriptor::new(owner, name, descriptor))
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(InvokeKind::Interface, &Descriptor::new(owner, name, descriptor))
    }

    /// Method handle constant, with the member name remapped according to its kind
    pub fn handle(&self, kind: HandleKind, member: &Descriptor, is_interface: bool) -> Handle {
        let member = match kind {
            HandleKind::GetField
            | HandleKind::GetStatic
            | HandleKind::PutField
            | HandleKind::PutStatic => {
                self.field_ref(&member.owner, &member.name, &member.descriptor)
            }
            _ => self.method_ref(&member.owner, &member.name, &member.descriptor),
        };
        Handle {
            kind,
            member,
            is_interface,
        }
    }

    /// `invokedynamic`, where the call site name is remapped as a method of the bootstrap owner
    pub fn invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: Handle,
        arguments: Vec<LoadableConstant>,
    ) -> &mut Self {
        let name = self
            .remapper()
            .map_method_name(&bootstrap.member.owner, name, descriptor);
        self.push(Insn::InvokeDynamic(InvokeDynamicSite {
            name,
            descriptor: descriptor.to_owned(),
            bootstrap,
            arguments,
        }))
    }

    /// Read a field of the object held in a local
    pub fn get_local_field(&mut self, object: LocalSlot, field: &Descriptor) -> &mut Self {
        self.load(object).field(FieldAction::GetField, field)
    }

    /// Write a field of the object held in a local, with the value pushed by `value`
    pub fn set_local_field(
        &mut self,
        object: LocalSlot,
        field: &Descriptor,
        value: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.load(object);
        value(self)?;
        Ok(self.field(FieldAction::PutField, field))
    }

    /// Read-modify-write a field of the object held in a local
    ///
    /// `update` starts with the current value on the stack and must leave the new value.
    pub fn update_local_field(
        &mut self,
        object: LocalSlot,
        field: &Descriptor,
        update: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.load(object).dup().field(FieldAction::GetField, field);
        update(self)?;
        Ok(self.field(FieldAction::PutField, field))
    }

    /// Push the instance of a singleton class (held in its static `INSTANCE` field)
    pub fn get_singleton_instance(&mut self, owner: &str) -> &mut Self {
        let descriptor = format!("L{};", owner);
        self.get_static(owner, SINGLETON_FIELD, &descriptor)
    }

    /// Call an instance method of a singleton, with arguments pushed by `arguments`
    pub fn invoke_singleton(
        &mut self,
        method: &Descriptor,
        arguments: impl FnOnce(&mut InsnBuilder<'r>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.get_singleton_instance(&method.owner);
        arguments(self)?;
        Ok(self.invoke(InvokeKind::Virtual, method))
    }
}
