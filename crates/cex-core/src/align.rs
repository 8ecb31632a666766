//! Align extracted section labels to a list of canonical headings.
//!
//! Keyword mappings are applied first: any section containing a mapping
//! keyword claims that keyword's canonical headings. The canonical headings
//! still unclaimed are then matched by fuzzy similarity, best pair first,
//! each heading assigned at most once.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use rapidfuzz::fuzz;

use crate::ExtractionError;
use crate::context::CitationMap;

/// Default minimum similarity for the fuzzy pass.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// `section label -> canonical headings`.
pub type Alignment = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub struct HeadingAligner {
    canonical: Vec<String>,
    /// `keyword -> canonical headings`, keywords compared lowercase.
    mappings: BTreeMap<String, Vec<String>>,
    threshold: f64,
}

impl HeadingAligner {
    pub fn new(canonical: Vec<String>) -> Self {
        Self {
            canonical,
            mappings: BTreeMap::new(),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_mappings(mut self, mappings: BTreeMap<String, Vec<String>>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Load canonical headings from a JSON array or a newline-separated list.
    pub fn load_canonical(path: &Path) -> Result<Vec<String>, ExtractionError> {
        let content = read(path)?;
        if content.trim_start().starts_with('[') {
            return serde_json::from_str(&content).map_err(|source| ExtractionError::Json {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Load keyword mappings from a JSON object of string arrays.
    pub fn load_mappings(path: &Path) -> Result<BTreeMap<String, Vec<String>>, ExtractionError> {
        let content = read(path)?;
        serde_json::from_str(&content).map_err(|source| ExtractionError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn align<'a>(&self, sections: impl IntoIterator<Item = &'a str>) -> Alignment {
        let sections: BTreeSet<&str> = sections.into_iter().collect();
        let canonical: HashSet<&str> = self.canonical.iter().map(String::as_str).collect();
        let mut aligned = Alignment::new();
        let mut used: HashSet<&str> = HashSet::new();

        // Keyword pass.
        for &section in &sections {
            let lower = section.to_lowercase();
            for (keyword, targets) in &self.mappings {
                if !lower.contains(&keyword.to_lowercase()) {
                    continue;
                }
                for target in targets {
                    if canonical.contains(target.as_str()) && used.insert(target.as_str()) {
                        aligned.entry(section.to_string()).or_default().push(target.clone());
                    }
                }
            }
        }

        // Similarity pass over what is left.
        let mut scored: Vec<(f64, &str, &str)> = Vec::new();
        for &section in &sections {
            let lower = section.to_lowercase();
            for target in self.canonical.iter().filter(|c| !used.contains(c.as_str())) {
                let score = fuzz::ratio(lower.chars(), target.to_lowercase().chars());
                if score > self.threshold {
                    scored.push((score, section, target.as_str()));
                }
            }
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)).then_with(|| a.2.cmp(b.2)));
        for (score, section, target) in scored {
            if used.insert(target) {
                tracing::trace!(section, target, score, "aligned by similarity");
                aligned.entry(section.to_string()).or_default().push(target.to_string());
            }
        }

        tracing::debug!(sections = sections.len(), aligned = aligned.len(), "aligned headings");
        aligned
    }

    /// Align every SECTION in `contexts` and record the result on each entry.
    pub fn annotate(&self, contexts: &mut CitationMap) -> Alignment {
        let alignment = self.align(contexts.values().map(|c| c.section.as_str()));
        for (_, ctx) in contexts.iter_mut() {
            ctx.aligned_section = alignment.get(&ctx.section).cloned();
        }
        alignment
    }
}

fn read(path: &Path) -> Result<String, ExtractionError> {
    std::fs::read_to_string(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CitationContext;
    use crate::markers::CitationKey;
    use std::io::Write;

    fn canonical() -> Vec<String> {
        ["Introduction", "Related Work", "Methods", "Results", "Discussion", "Conclusion"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_keyword_mapping_claims_first() {
        let mut mappings = BTreeMap::new();
        mappings.insert(
            "material".to_string(),
            vec!["Methods".to_string(), "Unknown".to_string()],
        );
        let aligner = HeadingAligner::new(canonical()).with_mappings(mappings);
        let out = aligner.align(["Materials and Procedures", "Methods"]);
        assert_eq!(out["Materials and Procedures"], vec!["Methods"]);
        assert!(
            !out.contains_key("Methods"),
            "Methods is already claimed by the keyword pass"
        );
    }

    #[test]
    fn test_similarity_assigns_each_heading_once() {
        let aligner = HeadingAligner::new(canonical());
        let out = aligner.align(["Introduction", "Introductions", "Conclusions", "Appendix"]);
        assert_eq!(out["Introduction"], vec!["Introduction"]);
        assert!(!out.contains_key("Introductions"));
        assert_eq!(out["Conclusions"], vec!["Conclusion"]);
        assert!(!out.contains_key("Appendix"));
    }

    #[test]
    fn test_annotate_sets_aligned_section() {
        let mut contexts = CitationMap::new();
        contexts.insert(
            CitationKey::parse("cit1").unwrap(),
            CitationContext::new("Results", "X [1].".into(), "[1]".into()),
        );
        contexts.insert(
            CitationKey::parse("cit2").unwrap(),
            CitationContext::new("Figure Caption", "Y [2].".into(), "[2]".into()),
        );
        let alignment = HeadingAligner::new(canonical()).annotate(&mut contexts);
        assert_eq!(alignment.len(), 1);
        let values: Vec<_> = contexts.values().map(|c| c.aligned_section.clone()).collect();
        assert_eq!(values, vec![Some(vec!["Results".to_string()]), None]);
    }

    #[test]
    fn test_load_canonical_formats() {
        let mut json = tempfile::NamedTempFile::new().unwrap();
        write!(json, r#"["Introduction", "Methods"]"#).unwrap();
        assert_eq!(
            HeadingAligner::load_canonical(json.path()).unwrap(),
            vec!["Introduction", "Methods"]
        );

        let mut text = tempfile::NamedTempFile::new().unwrap();
        write!(text, "Introduction\n\n  Methods  \n").unwrap();
        assert_eq!(
            HeadingAligner::load_canonical(text.path()).unwrap(),
            vec!["Introduction", "Methods"]
        );
    }

    #[test]
    fn test_load_mappings_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"intro": "Introduction"}}"#).unwrap();
        let err = HeadingAligner::load_mappings(file.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::Json { .. }));
    }
}
