//! Project directory layout.
//!
//! Generated files are written to `output/`, files to load and validate are
//! read from `input/`, both under the project home.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    home: PathBuf,
}

impl ProjectPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Use the configured home, or the current directory.
    pub fn from_config(home: Option<PathBuf>) -> io::Result<Self> {
        match home {
            Some(home) => Ok(Self::new(home)),
            None => Ok(Self::new(std::env::current_dir()?)),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn input_dir(&self) -> PathBuf {
        self.home.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.home.join("output")
    }

    /// Resolve a file name under `input/`. Absolute paths are kept as given.
    pub fn input_file(&self, name: impl AsRef<Path>) -> PathBuf {
        self.input_dir().join(name)
    }

    /// Resolve a file name under `output/`. Absolute paths are kept as given.
    pub fn output_file(&self, name: impl AsRef<Path>) -> PathBuf {
        self.output_dir().join(name)
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.input_dir())?;
        std::fs::create_dir_all(self.output_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = ProjectPaths::new("/srv/etl");
        assert_eq!(paths.input_dir(), PathBuf::from("/srv/etl/input"));
        assert_eq!(
            paths.output_file("trips.csv"),
            PathBuf::from("/srv/etl/output/trips.csv")
        );
    }

    #[test]
    fn test_absolute_file_kept() {
        let paths = ProjectPaths::new("/srv/etl");
        assert_eq!(
            paths.input_file("/data/trips.csv"),
            PathBuf::from("/data/trips.csv")
        );
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path());
        paths.ensure_dirs().unwrap();
        assert!(paths.input_dir().is_dir());
        assert!(paths.output_dir().is_dir());
    }

    #[test]
    fn test_from_config_defaults_to_current_dir() {
        let paths = ProjectPaths::from_config(None).unwrap();
        assert_eq!(paths.home(), std::env::current_dir().unwrap());
    }
}
