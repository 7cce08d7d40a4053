//! Pattern model for streaming Relax NG validation.
//!
//! This crate holds everything that is immutable at validation time: the
//! simplified pattern tree ([`pattern`]), name classes ([`name`]), the
//! namespace resolver ([`resolver`]), datatype libraries ([`datatype`]), the
//! event vocabulary ([`event`]) and the schema JSON format ([`json`]).  The
//! companion `rngwalk-validator` crate drives walkers over these patterns.
//!
//! The crate does not parse or simplify Relax NG syntax; it consumes the
//! output of an external simplification pipeline, either through
//! [`pattern::PatternBuilder`] or as serialized schema JSON.

pub mod datatype;
pub mod event;
pub mod json;
pub mod name;
pub mod ncname;
pub mod pattern;
pub mod resolver;

pub use json::{read_tree_from_json, write_tree_to_json};
pub use pattern::{Grammar, PatternBuilder};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while constructing or preparing a grammar.  These are the
/// only failures the crate reports through `Result`; event validation never
/// errors at this level.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to load {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("schema is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema format version {0}")]
    UnsupportedVersion(u64),
    #[error("malformed schema: {0}")]
    Malformed(String),
    #[error("unresolved references: {}", .0.join(", "))]
    UnresolvedReferences(Vec<String>),
    #[error("duplicate definition of {0:?}")]
    DuplicateDefinition(String),
    #[error(transparent)]
    Datatype(#[from] datatype::DatatypeError),
}

/// Source of schema documents, abstracted so callers can validate from
/// memory, archives or the filesystem.
pub trait Files {
    fn load(&self, name: &Path) -> Result<String, SchemaError>;
}

/// [`Files`] implementation reading from the local filesystem.
pub struct FsFiles;

impl Files for FsFiles {
    fn load(&self, name: &Path) -> Result<String, SchemaError> {
        std::fs::read_to_string(name).map_err(|e| SchemaError::Io(name.to_path_buf(), e))
    }
}

/// One input file recorded in a conversion manifest, for freshness checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file_path: String,
    pub hash: String,
}

#[derive(Default)]
pub struct ConvertOptions<'a> {
    /// When set, the conversion records a manifest entry per input file,
    /// hashed with this function.  The hash algorithm is the caller's
    /// choice; the manifest supports freshness checks, not authentication.
    pub manifest_hash: Option<&'a dyn Fn(&[u8]) -> String>,
}

#[derive(Debug)]
pub struct ConvertResult {
    pub pattern: Grammar,
    pub warnings: Vec<String>,
    /// The simplified schema document as parsed, before pattern
    /// construction.
    pub simplified: serde_json::Value,
    pub manifest: Option<Vec<ManifestEntry>>,
}

/// Load a simplified schema document and build a validation-ready grammar.
pub fn convert_to_pattern(
    files: &dyn Files,
    path: &Path,
    options: ConvertOptions<'_>,
) -> Result<ConvertResult, SchemaError> {
    let text = files.load(path)?;
    let simplified: serde_json::Value = serde_json::from_str(&text)?;
    let pattern = json::read_tree_from_json(&text)?;
    let warnings = pattern.warnings().to_vec();
    for warning in &warnings {
        log::warn!("{}: {warning}", path.display());
    }
    let manifest = options.manifest_hash.map(|hash| {
        vec![ManifestEntry {
            file_path: path.display().to_string(),
            hash: hash(text.as_bytes()),
        }]
    });
    Ok(ConvertResult {
        pattern,
        warnings,
        simplified,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct OneFile(&'static str);
    impl Files for OneFile {
        fn load(&self, name: &Path) -> Result<String, SchemaError> {
            if name == Path::new("schema.json") {
                Ok(self.0.to_string())
            } else {
                Err(SchemaError::Io(
                    name.to_path_buf(),
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ))
            }
        }
    }

    const SCHEMA: &str =
        r#"{"v": 3, "o": 0, "d": [15, [13, [18, "", "doc"], [1]], [0]]}"#;

    #[test]
    fn convert_with_manifest() {
        let hash = |bytes: &[u8]| format!("len:{}", bytes.len());
        let result = convert_to_pattern(
            &OneFile(SCHEMA),
            Path::new("schema.json"),
            ConvertOptions {
                manifest_hash: Some(&hash),
            },
        )
        .unwrap();
        assert_eq!(result.pattern.elements_named("", "doc").len(), 1);
        let manifest = result.manifest.unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].file_path, "schema.json");
        assert_eq!(manifest[0].hash, format!("len:{}", SCHEMA.len()));
    }

    #[test]
    fn convert_without_manifest() {
        let result = convert_to_pattern(
            &OneFile(SCHEMA),
            Path::new("schema.json"),
            ConvertOptions::default(),
        )
        .unwrap();
        assert!(result.manifest.is_none());
        assert!(result.warnings.is_empty());
        assert!(result.simplified.is_object());
    }

    #[test]
    fn missing_file() {
        let res = convert_to_pattern(
            &OneFile(SCHEMA),
            Path::new("other.json"),
            ConvertOptions::default(),
        );
        assert_matches!(res, Err(SchemaError::Io(_, _)));
    }
}
