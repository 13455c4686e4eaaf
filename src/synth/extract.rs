//! Declaration extraction from raw source text.
//!
//! Extraction is purely textual: each dialect recognises one declaration
//! shape with a fixed pattern and never looks at function bodies.

use std::sync::LazyLock;

use regex::Regex;

/// A function-like declaration found in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    name: String,
    arity: usize,
}

impl Declaration {
    /// Build a declaration from its name and raw parameter list.
    ///
    /// The parameter count is the number of comma-separated segments, so an
    /// empty list still counts as one nominal parameter.
    #[must_use]
    pub fn from_parameter_list(name: impl Into<String>, parameters: &str) -> Self {
        Self {
            name: name.into(),
            arity: parameters.split(',').count(),
        }
    }

    /// Return the declared function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the number of synthesized parameters.
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }
}

/// Finds function-like declarations in the text of one source language.
pub trait DeclarationExtractor {
    /// Return every declaration in `source`, in source order.
    fn extract(&self, source: &str) -> Vec<Declaration>;
}

#[expect(
    clippy::expect_used,
    reason = "declaration patterns are compile-time constants covered by unit tests"
)]
static PYTHON_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"def (\w+)\((.*?)\):").expect("python pattern is valid"));

#[expect(
    clippy::expect_used,
    reason = "declaration patterns are compile-time constants covered by unit tests"
)]
static JAVASCRIPT_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"function\s+(\w+)\s*\(([^)]*)\)").expect("javascript pattern is valid")
});

/// Recognises `def <name>(<params>):` declarations.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonExtractor;

impl DeclarationExtractor for PythonExtractor {
    fn extract(&self, source: &str) -> Vec<Declaration> {
        extract_with(&PYTHON_DEF, source)
    }
}

/// Recognises `function <name>(<params>)` declarations.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaScriptExtractor;

impl DeclarationExtractor for JavaScriptExtractor {
    fn extract(&self, source: &str) -> Vec<Declaration> {
        extract_with(&JAVASCRIPT_FUNCTION, source)
    }
}

fn extract_with(pattern: &Regex, source: &str) -> Vec<Declaration> {
    pattern
        .captures_iter(source)
        .filter_map(|captures| {
            let name = captures.get(1)?.as_str();
            let parameters = captures.get(2).map_or("", |found| found.as_str());
            Some(Declaration::from_parameter_list(name, parameters))
        })
        .collect()
}
