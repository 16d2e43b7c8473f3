//! Driver directory - maps driver numbers to driver codes.
//!
//! Loaded once at startup from a JSON object keyed by driver number:
//! `{"1": {"code": "VER", "name": "Max Verstappen"}, ...}`.
//! Extra fields per entry are ignored.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default mapping file, relative to the working directory
pub const DEFAULT_MAPPING_PATH: &str = "driver_mapping.json";

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Failed to read driver mapping {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid driver mapping: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Driver {number} has an empty code")]
    EmptyCode { number: String },
}

#[derive(Debug, Deserialize)]
struct DriverEntry {
    code: String,
}

/// Immutable driver number -> driver code table
#[derive(Debug, Clone, Default)]
pub struct DriverDirectory {
    codes: HashMap<String, String>,
}

impl DriverDirectory {
    /// Load the mapping file. Any unreadable file or malformed entry fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DirectoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let directory = Self::from_json(&content)?;
        info!("Loaded {} drivers from {:?}", directory.len(), path);
        Ok(directory)
    }

    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let entries: HashMap<String, DriverEntry> = serde_json::from_str(json)?;

        let mut codes = HashMap::with_capacity(entries.len());
        for (number, entry) in entries {
            let code = entry.code.trim();
            if code.is_empty() {
                return Err(DirectoryError::EmptyCode { number });
            }
            codes.insert(number.trim().to_string(), code.to_string());
        }

        Ok(Self { codes })
    }

    /// Build a directory from `(number, code)` pairs
    pub fn from_pairs<I, N, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
    {
        Self {
            codes: pairs
                .into_iter()
                .map(|(n, c)| (n.into(), c.into()))
                .collect(),
        }
    }

    /// Driver code for a number, if known
    pub fn lookup(&self, number: &str) -> Option<&str> {
        self.codes.get(number).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_json() {
        let dir = DriverDirectory::from_json(
            r#"{"1": {"code": "VER", "name": "Max Verstappen"}, "16": {"code": "LEC"}}"#,
        )
        .unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.lookup("1"), Some("VER"));
        assert_eq!(dir.lookup("16"), Some("LEC"));
        assert_eq!(dir.lookup("99"), None);
    }

    #[test]
    fn test_entry_without_code_rejected() {
        let err = DriverDirectory::from_json(r#"{"1": {"name": "Max"}}"#).unwrap_err();
        assert!(matches!(err, DirectoryError::Parse(_)));
    }

    #[test]
    fn test_empty_code_rejected() {
        let err = DriverDirectory::from_json(r#"{"1": {"code": "  "}}"#).unwrap_err();
        assert!(matches!(err, DirectoryError::EmptyCode { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"44": {{"code": "HAM"}}}}"#).unwrap();

        let dir = DriverDirectory::load(file.path()).unwrap();
        assert_eq!(dir.lookup("44"), Some("HAM"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = DriverDirectory::load(tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, DirectoryError::Read { .. }));
    }
}
