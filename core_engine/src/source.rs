use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::SourceError;
use crate::suggestion::Suggestion;

/// One element of a refresh document.
///
/// Fields carry whatever the document held; a record only becomes a
/// [`Suggestion`] when both are present with the right types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRecord {
    pub cost: Option<i64>,
    pub suggestion: Option<String>,
}

impl SourceRecord {
    pub fn new(suggestion: impl Into<String>, cost: i64) -> Self {
        Self {
            cost: Some(cost),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        Self {
            cost: value.get("cost").and_then(Value::as_i64),
            suggestion: value
                .get("suggestion")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    pub fn into_suggestion(self) -> Option<Suggestion> {
        Some(Suggestion::new(self.suggestion?, self.cost?))
    }
}

/// Anything that can produce a fresh batch of records for the store.
pub trait SuggestionSource: Send + Sync {
    fn load(&self) -> Result<Vec<SourceRecord>, SourceError>;

    fn describe(&self) -> String;
}

pub const DEFAULT_SOURCE_PATH: &str = "data/suggestions.json";

/// A JSON document on disk holding an array of `{cost, suggestion}` records.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileSource {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_PATH)
    }
}

impl SuggestionSource for JsonFileSource {
    fn load(&self) -> Result<Vec<SourceRecord>, SourceError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_records(&raw).map_err(|error| match error {
            ParseFailure::Json(source) => SourceError::Parse {
                path: self.path.clone(),
                source,
            },
            ParseFailure::NotAnArray => SourceError::NotAnArray {
                path: self.path.clone(),
            },
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

enum ParseFailure {
    Json(serde_json::Error),
    NotAnArray,
}

fn parse_records(raw: &str) -> Result<Vec<SourceRecord>, ParseFailure> {
    let document: Value = serde_json::from_str(raw).map_err(ParseFailure::Json)?;
    match document {
        Value::Array(items) => Ok(items.iter().map(SourceRecord::from_value).collect()),
        _ => Err(ParseFailure::NotAnArray),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_records_and_keeps_incomplete_ones_as_partial() {
        let file = write_source(
            r#"[
                {"cost": 3, "suggestion": "cat food"},
                {"cost": 7},
                {"suggestion": "orphan"},
                {"cost": "high", "suggestion": "typed wrong"},
                42
            ]"#,
        );
        let records = JsonFileSource::new(file.path()).load().unwrap();
        assert_eq!(records.len(), 5);

        let usable: Vec<Suggestion> = records
            .into_iter()
            .filter_map(SourceRecord::into_suggestion)
            .collect();
        assert_eq!(usable, vec![Suggestion::new("cat food", 3)]);
    }

    #[test]
    fn empty_array_is_an_empty_batch() {
        let file = write_source("[]");
        let records = JsonFileSource::new(file.path()).load().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn object_document_is_rejected() {
        let file = write_source(r#"{"cost": 1, "suggestion": "x"}"#);
        let error = JsonFileSource::new(file.path()).load().unwrap_err();
        assert!(matches!(error, SourceError::NotAnArray { .. }));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let file = write_source("[{\"cost\": 1,");
        let error = JsonFileSource::new(file.path()).load().unwrap_err();
        assert!(matches!(error, SourceError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileSource::new(dir.path().join("absent.json"));
        let error = source.load().unwrap_err();
        assert!(matches!(error, SourceError::Io { .. }));
        assert!(error.to_string().contains("absent.json"));
    }
}
