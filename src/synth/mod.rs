//! Test synthesis from source text.
//!
//! The synthesizer scans a source file for function-like declarations and
//! emits a companion test file containing one block per declaration. Both
//! halves are pluggable:
//!
//! - a [`Dialect`] selects the [`DeclarationExtractor`] and the syntax of the
//!   emitted test;
//! - a [`HypothesisStrategy`] decides what each block asserts.
//!
//! The default pairing, Python with the addition hypothesis, assumes every
//! function adds its first two arguments: it binds `param1 = 2` and
//! `param2 = 3` and asserts the call returns `5`. Nothing checks that
//! hypothesis against the function body.

mod extract;
mod render;

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use extract::{Declaration, DeclarationExtractor, JavaScriptExtractor, PythonExtractor};

use crate::error::FilesystemError;

/// Source syntax understood by the synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `def name(params):` declarations, pytest-style test functions.
    #[default]
    Python,
    /// `function name(params)` declarations, `node:assert` test blocks.
    JavaScript,
}

impl Dialect {
    /// Infer the dialect from a language identifier.
    #[must_use]
    pub fn for_language(language_id: &str) -> Option<Self> {
        match language_id.to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Self::Python),
            "javascript" | "js" | "node" | "nodejs" => Some(Self::JavaScript),
            _ => None,
        }
    }

    /// Pick the dialect for a run: an explicit choice wins, then the language
    /// identifier, then Python.
    #[must_use]
    pub fn select(explicit: Option<Self>, language_id: &str) -> Self {
        explicit
            .or_else(|| Self::for_language(language_id))
            .unwrap_or_else(|| {
                tracing::warn!(
                    language = language_id,
                    "no declaration extractor for language; falling back to python syntax"
                );
                Self::Python
            })
    }

    /// Return the declaration extractor for this dialect.
    #[must_use]
    pub fn extractor(self) -> &'static dyn DeclarationExtractor {
        match self {
            Self::Python => &PythonExtractor,
            Self::JavaScript => &JavaScriptExtractor,
        }
    }
}

/// What each synthesized test block claims about the function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HypothesisStrategy {
    /// Bind `param1 = 2`, `param2 = 3` and assert the call returns 5.
    #[default]
    Addition,
    /// Bind every parameter and call the function without asserting.
    Arity,
    /// Emit an empty test per declaration.
    Stub,
}

/// A source file read from disk. Never mutated after reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    path: Utf8PathBuf,
    raw_content: Vec<u8>,
}

impl SourceUnit {
    /// Wrap already-loaded content.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, raw_content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            raw_content: raw_content.into(),
        }
    }

    /// Read the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a `FilesystemError` when the file cannot be opened or read.
    pub fn read(path: &Utf8Path) -> Result<Self, FilesystemError> {
        let file_name = path.file_name().ok_or_else(|| FilesystemError::IoError {
            path: path.as_std_path().to_path_buf(),
            message: String::from("source path has no file name"),
        })?;
        let parent = match path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };

        let raw_content = Dir::open_ambient_dir(parent, ambient_authority())
            .and_then(|dir| dir.read(file_name))
            .map_err(|error: io::Error| FilesystemError::from_io(path.as_std_path(), &error))?;

        Ok(Self::new(path, raw_content))
    }

    /// Return the path the source was read from.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Return the base file name of the source.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Return the raw bytes of the source.
    #[must_use]
    pub fn raw_content(&self) -> &[u8] {
        &self.raw_content
    }

    /// Return the source as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw_content).into_owned()
    }
}

/// Test content derived from one source unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedTest {
    source_path: Utf8PathBuf,
    generated_content: String,
    block_count: usize,
}

impl SynthesizedTest {
    /// Return the path of the source this test was derived from.
    #[must_use]
    pub fn source_path(&self) -> &Utf8Path {
        &self.source_path
    }

    /// Return the generated test text. Empty when no declarations were found.
    #[must_use]
    pub fn generated_content(&self) -> &str {
        &self.generated_content
    }

    /// Return the number of test blocks emitted.
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.block_count
    }

    /// Return whether no test blocks were emitted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.block_count == 0
    }
}

/// Generates companion tests for a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Synthesizer {
    dialect: Dialect,
    strategy: HypothesisStrategy,
}

impl Synthesizer {
    /// Create a synthesizer for one dialect and strategy.
    #[must_use]
    pub const fn new(dialect: Dialect, strategy: HypothesisStrategy) -> Self {
        Self { dialect, strategy }
    }

    /// Return the configured dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Return the configured strategy.
    #[must_use]
    pub const fn strategy(&self) -> HypothesisStrategy {
        self.strategy
    }

    /// Derive the test file for `source`.
    #[must_use]
    pub fn synthesize(&self, source: &SourceUnit) -> SynthesizedTest {
        let declarations = self.dialect.extractor().extract(&source.text());
        let generated_content = render::render_tests(self.dialect, self.strategy, &declarations);

        tracing::debug!(
            source = %source.path(),
            dialect = ?self.dialect,
            strategy = ?self.strategy,
            declarations = declarations.len(),
            "synthesized tests"
        );

        SynthesizedTest {
            source_path: source.path().to_path_buf(),
            generated_content,
            block_count: declarations.len(),
        }
    }
}

/// Synthesize with the Python dialect and the addition hypothesis.
#[must_use]
pub fn synthesize_default(source: &SourceUnit) -> SynthesizedTest {
    Synthesizer::default().synthesize(source)
}
