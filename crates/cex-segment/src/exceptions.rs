//! Token exception table.
//!
//! A JSON side file maps a surface word to the tokens it is made of, in the
//! tokenizer special-case format:
//!
//! ```json
//! { "Fig.": [{"ORTH": "Fig."}], "et al.": [{"ORTH": "et"}, {"ORTH": " al."}] }
//! ```
//!
//! Plain strings are accepted in place of `{"ORTH": ...}` objects. The
//! segmenter never ends a sentence after a word listed here, and the marker
//! style detector ignores sentences ending in one.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::SegmentError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawToken {
    Orth {
        #[serde(rename = "ORTH")]
        orth: String,
    },
    Plain(String),
}

impl RawToken {
    fn into_text(self) -> String {
        match self {
            RawToken::Orth { orth } => orth,
            RawToken::Plain(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl ExceptionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from disk. Fails on unreadable files, invalid JSON or
    /// malformed entries.
    pub fn from_path(path: &Path) -> Result<Self, SegmentError> {
        let content = std::fs::read_to_string(path).map_err(|source| SegmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), words = table.len(), "loaded exception table");
        Ok(table)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SegmentError> {
        let raw: BTreeMap<String, Vec<RawToken>> = serde_json::from_str(json)?;
        let mut entries = BTreeMap::new();
        for (word, tokens) in raw {
            let tokens: Vec<String> = tokens.into_iter().map(RawToken::into_text).collect();
            validate_entry(&word, &tokens)?;
            entries.insert(word, tokens);
        }
        Ok(Self { entries })
    }

    /// Add a single-token word.
    pub fn insert(&mut self, word: impl Into<String>) {
        let word = word.into();
        self.entries.insert(word.clone(), vec![word]);
    }

    pub fn contains(&self, word: &str) -> bool {
        self.entries.contains_key(word)
    }

    pub fn tokens(&self, word: &str) -> Option<&[String]> {
        self.entries.get(word).map(Vec::as_slice)
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry(word: &str, tokens: &[String]) -> Result<(), SegmentError> {
    if word.trim().is_empty() {
        return Err(SegmentError::MalformedEntry {
            word: word.to_string(),
            reason: "empty word".to_string(),
        });
    }
    if tokens.is_empty() {
        return Err(SegmentError::MalformedEntry {
            word: word.to_string(),
            reason: "no tokens".to_string(),
        });
    }
    let spelled: String = tokens.concat().chars().filter(|c| !c.is_whitespace()).collect();
    let expected: String = word.chars().filter(|c| !c.is_whitespace()).collect();
    if spelled != expected {
        return Err(SegmentError::MalformedEntry {
            word: word.to_string(),
            reason: format!("tokens spell {spelled:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_orth_and_plain_tokens() {
        let table = ExceptionTable::from_json_str(
            r#"{"Fig.": [{"ORTH": "Fig."}], "et al.": [{"ORTH": "et"}, " al."], "e.g.": ["e.g."]}"#,
        )
        .unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.contains("Fig."));
        assert!(table.contains("et al."));
        assert!(!table.contains("fig."), "lookup is case sensitive");
        assert_eq!(table.tokens("et al.").unwrap(), &["et".to_string(), " al.".to_string()]);
    }

    #[test]
    fn test_extra_token_attributes_are_ignored() {
        let table =
            ExceptionTable::from_json_str(r#"{"approx.": [{"ORTH": "approx.", "NORM": "approximately"}]}"#)
                .unwrap();
        assert!(table.contains("approx."));
    }

    #[test]
    fn test_invalid_json_fails() {
        let err = ExceptionTable::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SegmentError::Json(_)));
    }

    #[test]
    fn test_empty_token_list_fails() {
        let err = ExceptionTable::from_json_str(r#"{"Fig.": []}"#).unwrap_err();
        assert!(matches!(err, SegmentError::MalformedEntry { .. }), "got {err:?}");
    }

    #[test]
    fn test_misspelled_tokens_fail() {
        let err = ExceptionTable::from_json_str(r#"{"Fig.": [{"ORTH": "Fog."}]}"#).unwrap_err();
        assert!(matches!(err, SegmentError::MalformedEntry { ref word, .. } if word == "Fig."));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Eq.": [{{"ORTH": "Eq."}}]}}"#).unwrap();
        let table = ExceptionTable::from_path(file.path()).unwrap();
        assert!(table.contains("Eq."));
    }

    #[test]
    fn test_missing_file_fails() {
        let err = ExceptionTable::from_path(Path::new("/nonexistent/special_cases.json")).unwrap_err();
        assert!(matches!(err, SegmentError::Io { .. }));
    }
}
