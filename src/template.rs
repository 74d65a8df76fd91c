use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Creates a source file for a freshly ingested problem.
pub trait Template: Send + Sync {
    fn render(&self, destination: &Path) -> io::Result<()>;
}

/// Copies a fixed template file over the destination.
#[derive(Debug, Clone)]
pub struct FileTemplate {
    pub path: PathBuf,
}

impl FileTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Template for FileTemplate {
    fn render(&self, destination: &Path) -> io::Result<()> {
        fs::copy(&self.path, destination)?;
        Ok(())
    }
}

/// Used when no template is configured: an empty source file.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankTemplate;

impl Template for BlankTemplate {
    fn render(&self, destination: &Path) -> io::Result<()> {
        fs::write(destination, b"")
    }
}

impl<T: Template + ?Sized> Template for Box<T> {
    fn render(&self, destination: &Path) -> io::Result<()> {
        (**self).render(destination)
    }
}

/// `FileTemplate` when a path is configured, `BlankTemplate` otherwise.
pub fn from_config(path: Option<&Path>) -> Box<dyn Template> {
    match path {
        Some(path) => Box::new(FileTemplate::new(path)),
        None => Box::new(BlankTemplate),
    }
}
