use std::path::PathBuf;

/// Directory the command line tool exports transformed classes to, unless told otherwise
pub const DEFAULT_EXPORT_DIR: &str = "classpatch/classes";

pub struct Settings {
    /// Classes with these internal name prefixes are never touched (eg. `java/`)
    ///
    /// Rewriting the core library of the running JVM from inside a load hook tends to take the
    /// whole process down, so these always pass through.
    pub protected_prefixes: Vec<String>,

    /// Package prefix of the transformer itself, which also always passes through
    pub own_namespace: String,

    /// Check rewritten classes with the verifier, logging what it finds
    pub verify: bool,

    /// Also write every rewritten class under this directory (cleared on first use)
    pub export_dir: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            protected_prefixes: ["java/", "jdk/", "sun/", "kotlin/"]
                .iter()
                .map(|prefix| String::from(*prefix))
                .collect(),
            own_namespace: String::from("classpatch/"),
            verify: false,
            export_dir: None,
        }
    }

    /// Is the class (given by internal name) off-limits?
    pub fn is_protected(&self, class_name: &str) -> bool {
        class_name.starts_with(&self.own_namespace)
            || self
                .protected_prefixes
                .iter()
                .any(|prefix| class_name.starts_with(prefix.as_str()))
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn protected_namespaces() {
        let settings = Settings::new();
        assert!(settings.is_protected("java/lang/String"));
        assert!(settings.is_protected("kotlin/Unit"));
        assert!(settings.is_protected("classpatch/Agent"));
        assert!(!settings.is_protected("javax/swing/JFrame"));
        assert!(!settings.is_protected("com/example/Widget"));
    }
}
