//! Per-run working directories and file staging.
//!
//! Every pipeline run allocates its own directory, `<root>/<run id>`, so
//! concurrent or repeated runs never share staged files. The source is copied
//! in under its base name and the synthesized test is written next to it as
//! `test_<base name>`. The directory is disposable: the orchestrator removes
//! it when the run ends unless asked to keep it.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use uuid::Uuid;

use crate::error::FilesystemError;
use crate::synth::{SourceUnit, SynthesizedTest};

/// Default parent directory for per-run working directories.
pub const DEFAULT_STAGING_ROOT: &str = "/tmp/auto-tester-cli";

/// Prefix of the staged test file name.
pub const TEST_FILE_PREFIX: &str = "test_";

/// A file copied into the run's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    original_path: Utf8PathBuf,
    staged_path: Utf8PathBuf,
}

impl StagedFile {
    /// Return the path the content came from.
    #[must_use]
    pub fn original_path(&self) -> &Utf8Path {
        &self.original_path
    }

    /// Return the absolute path of the staged copy.
    #[must_use]
    pub fn staged_path(&self) -> &Utf8Path {
        &self.staged_path
    }

    /// Return the base name of the staged copy.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.staged_path.file_name().unwrap_or_default()
    }
}

/// A uniquely named, disposable working directory for one run.
#[derive(Debug)]
pub struct Workspace {
    run_id: Uuid,
    path: Utf8PathBuf,
    dir: Dir,
}

impl Workspace {
    /// Allocate a fresh working directory under `root`, creating `root` if
    /// needed. Relative roots are resolved against the current directory.
    ///
    /// # Errors
    ///
    /// Returns a `FilesystemError` when either directory cannot be created.
    pub fn allocate(root: &Utf8Path) -> Result<Self, FilesystemError> {
        Self::allocate_with_id(root, Uuid::new_v4())
    }

    /// Allocate a working directory with a caller-chosen run identifier.
    ///
    /// # Errors
    ///
    /// Returns a `FilesystemError` when either directory cannot be created,
    /// including when a directory for `run_id` already exists.
    pub fn allocate_with_id(root: &Utf8Path, run_id: Uuid) -> Result<Self, FilesystemError> {
        let absolute_root = absolutize(root)?;
        let io_error = |path: &Utf8Path, error: &io::Error| {
            FilesystemError::from_io(path.as_std_path(), error)
        };

        Dir::create_ambient_dir_all(&absolute_root, ambient_authority())
            .map_err(|error| io_error(&absolute_root, &error))?;
        let root_dir = Dir::open_ambient_dir(&absolute_root, ambient_authority())
            .map_err(|error| io_error(&absolute_root, &error))?;

        let name = run_id.to_string();
        let path = absolute_root.join(&name);
        root_dir
            .create_dir(&name)
            .map_err(|error| io_error(&path, &error))?;
        let dir = root_dir
            .open_dir(&name)
            .map_err(|error| io_error(&path, &error))?;

        tracing::debug!(workdir = %path, "allocated working directory");
        Ok(Self { run_id, path, dir })
    }

    /// Return the run identifier naming this directory.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Return the absolute path of the working directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Copy the source bytes verbatim into the working directory under the
    /// source's base name.
    ///
    /// # Errors
    ///
    /// Returns a `FilesystemError` when the source has no file name or the copy
    /// cannot be written.
    pub fn stage_source(&self, source: &SourceUnit) -> Result<StagedFile, FilesystemError> {
        let file_name = base_name(source.path())?;
        self.write_file(source.path(), file_name, source.raw_content())
    }

    /// Write the synthesized test into the working directory as
    /// `test_<source base name>`.
    ///
    /// # Errors
    ///
    /// Returns a `FilesystemError` when the source has no file name or the file
    /// cannot be written.
    pub fn stage_test(
        &self,
        source: &SourceUnit,
        test: &SynthesizedTest,
    ) -> Result<StagedFile, FilesystemError> {
        let file_name = format!("{TEST_FILE_PREFIX}{}", base_name(source.path())?);
        self.write_file(
            test.source_path(),
            &file_name,
            test.generated_content().as_bytes(),
        )
    }

    /// Delete the working directory and everything staged in it.
    ///
    /// # Errors
    ///
    /// Returns a `FilesystemError` when the directory cannot be removed.
    pub fn remove(self) -> Result<(), FilesystemError> {
        let Self { path, dir, .. } = self;
        dir.remove_open_dir_all()
            .map_err(|error| FilesystemError::from_io(path.as_std_path(), &error))?;
        tracing::debug!(workdir = %path, "removed working directory");
        Ok(())
    }

    fn write_file(
        &self,
        original_path: &Utf8Path,
        file_name: &str,
        contents: &[u8],
    ) -> Result<StagedFile, FilesystemError> {
        let staged_path = self.path.join(file_name);
        self.dir
            .write(file_name, contents)
            .map_err(|error| FilesystemError::from_io(staged_path.as_std_path(), &error))?;

        tracing::debug!(from = %original_path, to = %staged_path, "staged file");
        Ok(StagedFile {
            original_path: original_path.to_path_buf(),
            staged_path,
        })
    }
}

fn base_name(path: &Utf8Path) -> Result<&str, FilesystemError> {
    path.file_name().ok_or_else(|| FilesystemError::IoError {
        path: path.as_std_path().to_path_buf(),
        message: String::from("path has no file name"),
    })
}

fn absolutize(root: &Utf8Path) -> Result<Utf8PathBuf, FilesystemError> {
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }

    let current = std::env::current_dir()
        .map_err(|error| FilesystemError::from_io(root.as_std_path(), &error))?;
    let current_utf8 =
        Utf8PathBuf::from_path_buf(current).map_err(|path| FilesystemError::IoError {
            path,
            message: String::from("current directory is not valid UTF-8"),
        })?;
    Ok(current_utf8.join(root))
}
