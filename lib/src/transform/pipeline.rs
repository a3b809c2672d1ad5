use super::{
    ClassWriter, DirectoryResources, Error, Exporter, Registry, ResourceLoader, Settings, Setup,
};
use crate::jvm::tree::ClassNode;
use crate::jvm::verifier::{verify_class, ClassHierarchy, ObjectHierarchy};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// What happened to a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// No class name or no bytes, so nothing was even considered
    NoTransform,

    /// The original bytes should be used unchanged
    PassThrough,

    /// Bytes of the replacement resource, which take the place of the class
    Replaced(Vec<u8>),

    /// The class after running its writers
    Rewritten(Vec<u8>),
}

impl Output {
    /// New bytes for the class, if it changed
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Output::Replaced(bytes) | Output::Rewritten(bytes) => Some(bytes),
            Output::NoTransform | Output::PassThrough => None,
        }
    }
}

/// Load-time class transformer
///
/// A host calls [`Pipeline::transform`] once for every class it loads, possibly from many threads
/// at once. The first call which isn't immediately passed through runs the [`Setup`], which fills
/// in the registry. After that, each class is:
///
///   - passed through, if it is in a protected namespace
///   - replaced by the bytes of a resource, if a replacement is registered
///   - parsed, handed to each of its writers in order, and written back out (recomputing frames
///     and maximums), if any writers are registered
///   - passed through otherwise
///
/// Any failure while rewriting a class is logged and the class is passed through unchanged: a
/// load hook which errors can bring down the host, while a class which didn't get patched usually
/// only fails later (if at all). The one exception is a replacement which can't be loaded.
pub struct Pipeline {
    settings: Settings,
    setup: Box<dyn Setup>,
    registry: OnceCell<Registry>,
    resources: Box<dyn ResourceLoader>,
    hierarchy: Box<dyn ClassHierarchy>,
    exporter: Option<Exporter>,
}

impl Pipeline {
    /// Pipeline which loads replacements relative to the current directory and merges classes at
    /// `java/lang/Object`
    pub fn new(settings: Settings, setup: impl Setup + 'static) -> Pipeline {
        let exporter = settings.export_dir.as_ref().map(Exporter::new);
        Pipeline {
            settings,
            setup: Box::new(setup),
            registry: OnceCell::new(),
            resources: Box::new(DirectoryResources::new(".")),
            hierarchy: Box::new(ObjectHierarchy),
            exporter,
        }
    }

    pub fn with_resources(mut self, resources: impl ResourceLoader + 'static) -> Pipeline {
        self.resources = Box::new(resources);
        self
    }

    /// Class hierarchy used to merge object types when computing frames
    pub fn with_hierarchy(mut self, hierarchy: impl ClassHierarchy + 'static) -> Pipeline {
        self.hierarchy = Box::new(hierarchy);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Has setup already run?
    pub fn is_configured(&self) -> bool {
        self.registry.get().is_some()
    }

    /// Registry, running setup if that hasn't happened yet
    ///
    /// Concurrent first calls block until the one running setup is done. Setup which fails or
    /// panics part way through leaves whatever it registered before that.
    pub fn registry(&self) -> &Registry {
        self.registry.get_or_init(|| {
            log::info!("Running transformer setup");
            let mut registry = Registry::new();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.setup.register(&mut registry)
            }));
            match outcome {
                Ok(Ok(())) => (),
                Ok(Err(err)) => {
                    log::error!("Transformer setup failed, continuing without the rest: {}", err)
                }
                Err(payload) => log::error!(
                    "Transformer setup panicked, continuing without the rest: {}",
                    panic_message(&*payload)
                ),
            }
            registry
        })
    }

    /// Decide what to do with a class as it loads
    ///
    /// `loader` (the defining class loader) is only used in log messages. `class_name` can be in
    /// internal (`a/b/C`) or dotted (`a.b.C`) form.
    pub fn transform(
        &self,
        loader: Option<&str>,
        class_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<Output, Error> {
        let class_name = match class_name {
            Some(name) if !bytes.is_empty() => name.replace('.', "/"),
            _ => return Ok(Output::NoTransform),
        };
        if self.settings.is_protected(&class_name) {
            return Ok(Output::PassThrough);
        }
        let loader = loader.unwrap_or("<bootstrap>");
        let registry = self.registry();

        if let Some(path) = registry.replacement(&class_name) {
            log::info!("Replacing {} (loaded by {}) with {}", class_name, loader, path);
            let replacement = self
                .resources
                .load(path)
                .map_err(|source| Error::ResourceLoad {
                    class_name: class_name.clone(),
                    path: path.to_owned(),
                    source,
                })?;
            return Ok(Output::Replaced(replacement));
        }

        let writers = registry.writers(&class_name);
        if writers.is_empty() {
            return Ok(Output::PassThrough);
        }

        let rewritten = match self.rewrite(&class_name, writers, bytes) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                log::error!(
                    "Failed to transform {} (loaded by {}), leaving it unchanged: {}",
                    class_name,
                    loader,
                    err
                );
                return Ok(Output::PassThrough);
            }
        };

        if self.settings.verify {
            self.verify(&class_name, &rewritten);
        }
        if let Some(exporter) = &self.exporter {
            match exporter.export(&class_name, &rewritten) {
                Ok(path) => log::debug!("Exported {} to {}", class_name, path.display()),
                Err(err) => log::warn!("Failed to export {}: {}", class_name, err),
            }
        }
        Ok(Output::Rewritten(rewritten))
    }

    fn rewrite(
        &self,
        class_name: &str,
        writers: &[Box<dyn ClassWriter>],
        bytes: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut class = ClassNode::parse(bytes)?;
        for writer in writers {
            log::info!("Applying writer to {}", class_name);
            writer.apply(&mut class)?;
        }
        Ok(class.to_bytes(self.hierarchy.as_ref())?)
    }

    /// Log whatever the verifier finds (the class is used regardless)
    fn verify(&self, class_name: &str, bytes: &[u8]) {
        match verify_class(bytes, self.hierarchy.as_ref()) {
            Ok(findings) if findings.is_empty() => {
                log::debug!("{} verified without findings", class_name)
            }
            Ok(findings) => {
                log::warn!("{} has {} verification findings", class_name, findings.len());
                for finding in findings {
                    log::debug!("{}: {}", class_name, finding);
                }
            }
            Err(err) => log::warn!("Could not verify {}: {}", class_name, err),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic>"
    }
}
