use super::{ClassWriter, Error};
use std::collections::HashMap;

/// Which classes get rewritten (and by what), and which get replaced outright
///
/// Class names are internal names (`a/b/C`); dotted names are accepted and converted.
#[derive(Default)]
pub struct Registry {
    writers: HashMap<String, Vec<Box<dyn ClassWriter>>>,
    replacements: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Add a writer for the class it names, after any writers already added for that class
    pub fn add_writer(&mut self, writer: impl ClassWriter + 'static) -> &mut Self {
        self.add_boxed_writer(Box::new(writer))
    }

    pub fn add_boxed_writer(&mut self, writer: Box<dyn ClassWriter>) -> &mut Self {
        let class_name = writer.class_name().replace('.', "/");
        self.writers.entry(class_name).or_default().push(writer);
        self
    }

    /// Replace the class entirely with the bytes of a resource
    pub fn replace(&mut self, class_name: &str, resource_path: &str) -> &mut Self {
        self.replacements
            .insert(class_name.replace('.', "/"), resource_path.to_owned());
        self
    }

    /// Writers for a class, in the order they were added
    pub fn writers(&self, class_name: &str) -> &[Box<dyn ClassWriter>] {
        self.writers
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn replacement(&self, class_name: &str) -> Option<&str> {
        self.replacements.get(class_name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty() && self.replacements.is_empty()
    }
}

/// Populates the [`Registry`] of a [`super::Pipeline`]
///
/// This runs once, on the first class the pipeline is asked about. If it fails, whatever it
/// registered before failing stays registered.
pub trait Setup: Send + Sync {
    fn register(&self, registry: &mut Registry) -> Result<(), Error>;
}

/// Setup defined by a closure, see [`setup_fn`]
pub struct FnSetup<F>(F);

pub fn setup_fn<F>(register: F) -> FnSetup<F>
where
    F: Fn(&mut Registry) -> Result<(), Error> + Send + Sync,
{
    FnSetup(register)
}

impl<F> Setup for FnSetup<F>
where
    F: Fn(&mut Registry) -> Result<(), Error> + Send + Sync,
{
    fn register(&self, registry: &mut Registry) -> Result<(), Error> {
        (self.0)(registry)
    }
}
