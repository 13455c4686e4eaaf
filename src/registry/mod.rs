//! Language registry: maps a language identifier to its execution profile.
//!
//! The mapping lives in a JSON file (by default `configs/languages.json`,
//! relative to the working directory) shaped as:
//!
//! ```json
//! {
//!   "python": { "docker_image": "python:3.11", "command": "pytest %s" },
//!   "javascript": { "docker_image": "node:20", "command": "node %s", "dialect": "javascript" }
//! }
//! ```
//!
//! Keys other than `docker_image`, `command`, and `dialect` are ignored. The
//! file is read afresh for every invocation; nothing is cached.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;

use crate::error::RegistryError;
use crate::synth::Dialect;

/// Placeholder substituted with the staged test file name.
pub const FILE_PLACEHOLDER: &str = "%s";

/// Default location of the language mapping file.
pub const DEFAULT_LANGUAGES_FILE: &str = "configs/languages.json";

/// Image and command template bound to a language identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionProfile {
    language_id: String,
    image: String,
    command_template: String,
    dialect: Option<Dialect>,
}

impl ExecutionProfile {
    /// Build a profile, validating the image and command template.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the image is blank or the
    /// template does not contain exactly one [`FILE_PLACEHOLDER`].
    pub fn new(
        language_id: impl Into<String>,
        image: impl Into<String>,
        command_template: impl Into<String>,
    ) -> Result<Self, String> {
        let image_value = image.into();
        let template = command_template.into();

        if image_value.trim().is_empty() {
            return Err(String::from("docker_image must not be empty"));
        }

        let placeholders = template.matches(FILE_PLACEHOLDER).count();
        if placeholders != 1 {
            return Err(format!(
                "command must contain exactly one '{FILE_PLACEHOLDER}' placeholder, found {placeholders}"
            ));
        }

        Ok(Self {
            language_id: language_id.into(),
            image: String::from(image_value.trim()),
            command_template: template,
            dialect: None,
        })
    }

    /// Attach an explicit source dialect for test synthesis.
    #[must_use]
    pub const fn with_dialect(mut self, dialect: Option<Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Return the language identifier this profile was registered under.
    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    /// Return the container image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Return the raw command template.
    #[must_use]
    pub fn command_template(&self) -> &str {
        &self.command_template
    }

    /// Return the dialect declared in the mapping file, if any.
    #[must_use]
    pub const fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// Substitute `file_name` into the command template.
    #[must_use]
    pub fn fill_command(&self, file_name: &str) -> String {
        self.command_template.replacen(FILE_PLACEHOLDER, file_name, 1)
    }
}

/// One mapping entry. Keys other than these are ignored.
#[derive(Debug, Deserialize)]
struct ProfileEntry {
    docker_image: String,
    command: String,
    #[serde(default)]
    dialect: Option<Dialect>,
}

/// Language identifier to execution profile mapping for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageRegistry {
    path: Utf8PathBuf,
    profiles: BTreeMap<String, ExecutionProfile>,
    rejected: BTreeMap<String, String>,
}

impl LanguageRegistry {
    /// Read and decode the mapping file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Unreadable` when the file cannot be read and
    /// `RegistryError::Malformed` when it is not a JSON object.
    pub fn load(path: &Utf8Path) -> Result<Self, RegistryError> {
        let content = read_mapping_file(path)?;
        Self::from_json_str(path, &content)
    }

    /// Decode a mapping from JSON text. `path` is only used in diagnostics.
    ///
    /// An entry that fails validation does not spoil the rest of the mapping;
    /// it is kept aside and reported as `Malformed` only when resolved.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Malformed` when the text is not a JSON object.
    pub fn from_json_str(path: &Utf8Path, content: &str) -> Result<Self, RegistryError> {
        let entries: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(content).map_err(|error| RegistryError::Malformed {
                path: path.as_std_path().to_path_buf(),
                message: error.to_string(),
            })?;

        let mut profiles = BTreeMap::new();
        let mut rejected = BTreeMap::new();
        for (language_id, value) in entries {
            match decode_profile(&language_id, value) {
                Ok(profile) => {
                    profiles.insert(language_id, profile);
                }
                Err(reason) => {
                    tracing::warn!(
                        language = %language_id,
                        reason = %reason,
                        "skipping invalid language entry"
                    );
                    rejected.insert(language_id, reason);
                }
            }
        }

        tracing::debug!(path = %path, languages = profiles.len(), "loaded language registry");
        Ok(Self {
            path: path.to_path_buf(),
            profiles,
            rejected,
        })
    }

    /// Resolve `language` to its execution profile.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Malformed` when the entry for `language` is
    /// invalid and `RegistryError::UnsupportedLanguage` when the identifier is
    /// absent from the mapping.
    pub fn resolve(&self, language: &str) -> Result<&ExecutionProfile, RegistryError> {
        if let Some(profile) = self.profiles.get(language) {
            return Ok(profile);
        }
        if let Some(reason) = self.rejected.get(language) {
            return Err(RegistryError::Malformed {
                path: self.path.as_std_path().to_path_buf(),
                message: format!("language '{language}': {reason}"),
            });
        }
        Err(RegistryError::UnsupportedLanguage {
            language: String::from(language),
            available: self.languages().map(String::from).collect(),
        })
    }

    /// Return usable language identifiers in sorted order.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Return the mapping file this registry was loaded from.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

fn decode_profile(language_id: &str, value: serde_json::Value) -> Result<ExecutionProfile, String> {
    let entry: ProfileEntry = serde_json::from_value(value).map_err(|error| error.to_string())?;
    Ok(ExecutionProfile::new(language_id, entry.docker_image, entry.command)?
        .with_dialect(entry.dialect))
}

fn read_mapping_file(path: &Utf8Path) -> Result<String, RegistryError> {
    let unreadable = |message: String| RegistryError::Unreadable {
        path: path.as_std_path().to_path_buf(),
        message,
    };

    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| unreadable(String::from("path has no file name")))?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|error| unreadable(format!("failed to open directory {parent}: {error}")))?;
    dir.read_to_string(file_name)
        .map_err(|error| unreadable(error.to_string()))
}
