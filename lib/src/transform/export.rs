use once_cell::sync::OnceCell;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Writes transformed classes to disk, for inspection with other tools
///
/// The directory is emptied the first time anything is exported, so it only ever holds classes
/// from the current run.
#[derive(Debug)]
pub struct Exporter {
    directory: PathBuf,
    cleared: OnceCell<()>,
}

impl Exporter {
    pub fn new(directory: impl AsRef<Path>) -> Exporter {
        Exporter {
            directory: directory.as_ref().to_path_buf(),
            cleared: OnceCell::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Where a class (given by internal name) gets exported
    ///
    /// Every `/` separated segment must be a plain file name, so nothing lands outside the export
    /// directory.
    pub fn class_path(&self, class_name: &str) -> io::Result<PathBuf> {
        for segment in class_name.split('/') {
            let mut components = Path::new(segment).components();
            if !matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            ) {
                return Err(bad_class_name(class_name));
            }
        }
        Ok(self.directory.join(format!("{}.class", class_name)))
    }

    /// Write the bytes of a class, returning the file written
    pub fn export(&self, class_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.class_path(class_name)?;
        self.cleared.get_or_try_init(|| self.clear())?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }

    fn clear(&self) -> io::Result<()> {
        if self.directory.exists() {
            log::debug!("Clearing export directory {}", self.directory.display());
            fs::remove_dir_all(&self.directory)?;
        }
        fs::create_dir_all(&self.directory)
    }
}

fn bad_class_name(class_name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("'{}' is not a class name that can be exported", class_name),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn directory_is_cleared_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("classes");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("Stale.class"), [0]).unwrap();

        let exporter = Exporter::new(&root);
        let first = exporter.export("a/b/First", &[1]).unwrap();
        assert_eq!(first, root.join("a/b/First.class"));
        assert_eq!(exporter.class_path("a/b/First").unwrap(), first);
        assert!(!root.join("Stale.class").exists());

        exporter.export("a/Second", &[2]).unwrap();
        assert_eq!(fs::read(&first).unwrap(), vec![1]);
        assert_eq!(fs::read(root.join("a/Second.class")).unwrap(), vec![2]);
    }

    #[test]
    fn names_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("classes");
        let exporter = Exporter::new(&root);

        for bad in [
            "",
            "/etc/Evil",
            "../Evil",
            "a/../../Evil",
            "a//Evil",
            "a/./Evil",
            "a/",
            "..",
        ] {
            let err = exporter.class_path(bad).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{:?}", bad);
            assert!(exporter.export(bad, &[0]).is_err(), "{:?}", bad);
        }
        assert!(!dir.path().join("Evil.class").exists());

        // Dots inside a segment are just part of the name
        assert_eq!(
            exporter.class_path("a/..Odd$1").unwrap(),
            root.join("a").join("..Odd$1.class")
        );
    }
}
