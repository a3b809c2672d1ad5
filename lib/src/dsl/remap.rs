use std::collections::HashMap;

/// Maps the names code is written against to the names actually present at runtime
///
/// Every field access, method invocation, method handle and `invokedynamic` call site emitted by
/// [`super::InsnBuilder`] asks the remapper for the name to use, so a builder written against
/// readable names keeps working against an obfuscated or renamed target.
pub trait Remapper: Send + Sync {
    /// Physical name of the field `owner.name` (with type `descriptor`)
    fn map_field_name(&self, owner: &str, name: &str, descriptor: &str) -> String;

    /// Physical name of the method `owner.name` (with signature `descriptor`)
    fn map_method_name(&self, owner: &str, name: &str, descriptor: &str) -> String;
}

/// Doesn't rename anything
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRemapper;

impl Remapper for IdentityRemapper {
    fn map_field_name(&self, _owner: &str, name: &str, _descriptor: &str) -> String {
        name.to_owned()
    }

    fn map_method_name(&self, _owner: &str, name: &str, _descriptor: &str) -> String {
        name.to_owned()
    }
}

/// Renames from a fixed table, keyed on owner, name and descriptor
///
/// Members missing from the table keep their name.
#[derive(Debug, Clone, Default)]
pub struct MappingRemapper {
    fields: HashMap<(String, String, String), String>,
    methods: HashMap<(String, String, String), String>,
}

impl MappingRemapper {
    pub fn new() -> MappingRemapper {
        MappingRemapper::default()
    }

    pub fn rename_field(&mut self, owner: &str, name: &str, descriptor: &str, to: &str) -> &mut Self {
        let key = (owner.to_owned(), name.to_owned(), descriptor.to_owned());
        self.fields.insert(key, to.to_owned());
        self
    }

    pub fn rename_method(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        to: &str,
    ) -> &mut Self {
        let key = (owner.to_owned(), name.to_owned(), descriptor.to_owned());
        self.methods.insert(key, to.to_owned());
        self
    }

    fn lookup(
        table: &HashMap<(String, String, String), String>,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> String {
        let key = (owner.to_owned(), name.to_owned(), descriptor.to_owned());
        table.get(&key).cloned().unwrap_or_else(|| name.to_owned())
    }
}

impl Remapper for MappingRemapper {
    fn map_field_name(&self, owner: &str, name: &str, descriptor: &str) -> String {
        MappingRemapper::lookup(&self.fields, owner, name, descriptor)
    }

    fn map_method_name(&self, owner: &str, name: &str, descriptor: &str) -> String {
        MappingRemapper::lookup(&self.methods, owner, name, descriptor)
    }
}
