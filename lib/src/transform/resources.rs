use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Source of replacement class bytes
pub trait ResourceLoader: Send + Sync {
    /// Read the resource at a `/`-separated path
    fn load(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Resources are files under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl AsRef<Path>) -> DirectoryResources {
        DirectoryResources {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ResourceLoader for DirectoryResources {
    fn load(&self, path: &str) -> io::Result<Vec<u8>> {
        let path = self.root.join(path.trim_start_matches('/'));
        log::debug!("Loading resource {}", path.display());
        std::fs::read(path)
    }
}

/// Resources held in memory, keyed by path
impl ResourceLoader for HashMap<String, Vec<u8>> {
    fn load(&self, path: &str) -> io::Result<Vec<u8>> {
        self.get(path.trim_start_matches('/')).cloned().ok_or_else(|| {
            let msg = format!("No resource '{}'", path);
            io::Error::new(io::ErrorKind::NotFound, msg)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn directory_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("patches")).unwrap();
        std::fs::write(dir.path().join("patches/A.class"), [1, 2, 3]).unwrap();

        let resources = DirectoryResources::new(dir.path());
        assert_eq!(resources.load("/patches/A.class").unwrap(), vec![1, 2, 3]);
        assert_eq!(
            resources.load("patches/B.class").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn memory_resources() {
        let mut resources = HashMap::new();
        resources.insert(String::from("A.class"), vec![0xCA, 0xFE]);
        assert_eq!(resources.load("A.class").unwrap(), vec![0xCA, 0xFE]);
        assert!(resources.load("B.class").is_err());
    }
}
