use std::{
    error::Error as StdError,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{problem::Problem, template::Template};

pub const TEST_CASES_DIR: &str = "test-cases";
const STAGING_PREFIX: &str = ".cpn-staging-";

#[derive(Debug)]
pub enum MaterializeError {
    InvalidName { raw: String },
    Template { path: PathBuf, source: io::Error },
    Directory { path: PathBuf, source: io::Error },
    Write { path: PathBuf, source: io::Error },
}

impl fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName { raw } => write!(f, "no usable file name in problem name {raw:?}"),
            Self::Template { path, .. } => write!(f, "could not create {}", path.display()),
            Self::Directory { path, .. } => {
                write!(f, "could not create directory {}", path.display())
            }
            Self::Write { path, .. } => write!(f, "could not write {}", path.display()),
        }
    }
}

impl StdError for MaterializeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidName { .. } => None,
            Self::Template { source, .. }
            | Self::Directory { source, .. }
            | Self::Write { source, .. } => Some(source),
        }
    }
}

/// What an ingestion left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub problem_name: String,
    pub source: PathBuf,
    pub tests: usize,
}

/// Writes a problem's source stub and test-case files below `root`.
#[derive(Debug)]
pub struct Materializer<T> {
    root: PathBuf,
    extension: String,
    template: T,
}

impl<T: Template> Materializer<T> {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, template: T) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            template,
        }
    }

    pub fn source_path(&self, problem_name: &str) -> PathBuf {
        self.root.join(format!("{problem_name}.{}", self.extension))
    }

    pub fn test_cases_dir(&self) -> PathBuf {
        self.root.join(TEST_CASES_DIR)
    }

    /// Writes everything for `problem`.
    ///
    /// Test cases are staged in a scratch directory and only renamed into
    /// `test-cases/` once all of them are written. A failure leaves the
    /// existing test cases untouched, except for a failed rename, which
    /// removes whatever this call had already moved.
    pub fn materialize(&self, problem: &Problem) -> Result<Materialized, MaterializeError> {
        let problem_name = problem
            .file_stem()
            .ok_or_else(|| MaterializeError::InvalidName {
                raw: problem.name.clone(),
            })?;

        let source = self.source_path(&problem_name);
        info!("Generating {}", source.display());
        self.template
            .render(&source)
            .map_err(|source_err| MaterializeError::Template {
                path: source.clone(),
                source: source_err,
            })?;

        let dir = self.test_cases_dir();
        ensure_dir(&dir)?;

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&dir)
            .map_err(|source| MaterializeError::Write {
                path: dir.clone(),
                source,
            })?;

        let mut staged = Vec::with_capacity(problem.tests.len() * 2);
        for (idx, test) in problem.tests.iter().enumerate() {
            for (extension, content) in [("in", &test.input), ("out", &test.output)] {
                let file_name = format!("{problem_name}-{idx}.{extension}");
                let staged_path = staging.path().join(&file_name);
                let target = dir.join(file_name);

                fs::write(&staged_path, content).map_err(|source| MaterializeError::Write {
                    path: target.clone(),
                    source,
                })?;
                debug!("Staged {}", target.display());
                staged.push((staged_path, target));
            }
        }

        commit(&staged)?;

        let tests = problem.tests.len();
        info!("Created {tests} tests for problem {problem_name}");

        Ok(Materialized {
            problem_name,
            source,
            tests,
        })
    }
}

fn ensure_dir(path: &Path) -> Result<(), MaterializeError> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }

    match builder.create(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => Err(MaterializeError::Directory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn commit(staged: &[(PathBuf, PathBuf)]) -> Result<(), MaterializeError> {
    for (done, (from, to)) in staged.iter().enumerate() {
        if let Err(source) = fs::rename(from, to) {
            for (_, moved) in &staged[..done] {
                if let Err(err) = fs::remove_file(moved) {
                    warn!("Could not remove {}: {err}", moved.display());
                }
            }
            return Err(MaterializeError::Write {
                path: to.clone(),
                source,
            });
        }
    }
    Ok(())
}
