//! Loading scenarios from YAML.
//!
//! A scenario is either a standalone validation document or a rendered
//! manifest carrying its validation section after a `# validation` comment:
//!
//! ```yaml
//! apiVersion: v1
//! kind: Pod
//! metadata: {name: demo, namespace: default}
//! ...
//! ### Validation
//! timeout_seconds: 30
//! check_pods:
//!   - {name: demo, namespace: default, status: Succeeded}
//! ```

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::errors::ScenarioError;
use crate::model::ValidationSpec;

fn validation_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"(?i)#+ *validation").expect("static regex is valid"))
}

/// True when `text` holds nothing but blank lines and comments.
fn is_blank_document(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#') || line == "---")
}

impl ValidationSpec {
    /// Parse and validate a validation document.
    ///
    /// An empty document (or one that is only comments or `null`) yields the
    /// default spec.
    pub fn from_yaml_str(text: &str) -> Result<Self, ScenarioError> {
        if is_blank_document(text) {
            return Ok(Self::default());
        }
        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(text)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        let spec: Self = serde_yaml_ng::from_value(value)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Read a validation document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }
}

/// A manifest together with the validation that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Everything before the validation header; may be empty.
    pub manifest: String,
    pub validation: ValidationSpec,
}

impl Scenario {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (manifest, validation) = split_manifest_and_validation(&text)?;
        Ok(Self {
            manifest,
            validation,
        })
    }

    /// Whether there is anything to apply before validating.
    pub fn has_manifest(&self) -> bool {
        !is_blank_document(&self.manifest)
    }
}

/// Split a rendered template at its first validation header.
///
/// Lines before the header form the manifest; the header and everything after
/// it are parsed as the [`ValidationSpec`]. Without a header the whole text is
/// the manifest and the default spec applies.
pub fn split_manifest_and_validation(text: &str) -> Result<(String, ValidationSpec), ScenarioError> {
    let lines: Vec<&str> = text.split('\n').collect();
    match lines.iter().position(|line| validation_header().is_match(line)) {
        Some(index) => {
            debug!(line = index + 1, "Found validation header");
            let manifest = lines[..index].join("\n");
            let spec = ValidationSpec::from_yaml_str(&lines[index..].join("\n"))?;
            Ok((manifest, spec))
        }
        None => Ok((text.to_string(), ValidationSpec::default())),
    }
}
