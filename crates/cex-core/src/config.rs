use regex::Regex;
use serde::{Deserialize, Serialize};

/// How the anchor key of an entry appears in its CITATION text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStyle {
    /// Every key in the sentence, anchor included, is written back as its
    /// marker's literal text.
    #[default]
    Resolved,
    /// Other keys are written back as marker text; the anchor stays as its
    /// `cit<N>` token so downstream consumers can locate it.
    Key,
}

/// What to do when segmenting one section or figure fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionErrorPolicy {
    /// Log the failure, drop that section's entries and continue.
    #[default]
    Skip,
    /// Fail the whole document.
    Abort,
}

pub const DEFAULT_UNTITLED_PREFIX: &str = "Section Untitled";
pub const DEFAULT_FIGURE_SECTION: &str = "Figure Caption";

/// Configuration for the extraction engine.
///
/// `formula_re: None` means the built-in formula pattern. Use
/// [`ExtractionConfigBuilder`] to construct with string patterns.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Substrings protected from sentence segmentation.
    pub(crate) formula_re: Option<Regex>,
    /// Label prefix for sections without a heading (default: `Section Untitled`).
    pub(crate) untitled_prefix: String,
    /// SECTION value of figure entries (default: `Figure Caption`).
    pub(crate) figure_section: String,
    /// Fraction of numeric markers above which superscript style is considered (default: 0.5).
    pub(crate) numeric_threshold: f64,
    /// Fraction of period-preceded markers above which superscript style is confirmed (default: 0.2).
    pub(crate) superscript_threshold: f64,
    pub(crate) anchor_style: AnchorStyle,
    pub(crate) section_error_policy: SectionErrorPolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            formula_re: None,
            untitled_prefix: DEFAULT_UNTITLED_PREFIX.to_string(),
            figure_section: DEFAULT_FIGURE_SECTION.to_string(),
            numeric_threshold: 0.5,
            superscript_threshold: 0.2,
            anchor_style: AnchorStyle::default(),
            section_error_policy: SectionErrorPolicy::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn anchor_style(&self) -> AnchorStyle {
        self.anchor_style
    }

    pub fn section_error_policy(&self) -> SectionErrorPolicy {
        self.section_error_policy
    }

    pub fn figure_section(&self) -> &str {
        &self.figure_section
    }

    pub fn untitled_prefix(&self) -> &str {
        &self.untitled_prefix
    }
}

/// Builder for [`ExtractionConfig`].
///
/// Fails fast with `regex::Error` in [`build()`](Self::build) if the formula
/// pattern is invalid.
#[derive(Debug, Clone, Default)]
pub struct ExtractionConfigBuilder {
    formula_re: Option<String>,
    untitled_prefix: Option<String>,
    figure_section: Option<String>,
    numeric_threshold: Option<f64>,
    superscript_threshold: Option<f64>,
    anchor_style: Option<AnchorStyle>,
    section_error_policy: Option<SectionErrorPolicy>,
}

impl ExtractionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn formula_regex(mut self, pattern: &str) -> Self {
        self.formula_re = Some(pattern.to_string());
        self
    }

    pub fn untitled_prefix(mut self, prefix: &str) -> Self {
        self.untitled_prefix = Some(prefix.to_string());
        self
    }

    pub fn figure_section(mut self, label: &str) -> Self {
        self.figure_section = Some(label.to_string());
        self
    }

    // ── Marker style thresholds ──

    pub fn numeric_threshold(mut self, fraction: f64) -> Self {
        self.numeric_threshold = Some(fraction);
        self
    }

    pub fn superscript_threshold(mut self, fraction: f64) -> Self {
        self.superscript_threshold = Some(fraction);
        self
    }

    // ── Policies ──

    pub fn anchor_style(mut self, style: AnchorStyle) -> Self {
        self.anchor_style = Some(style);
        self
    }

    pub fn section_error_policy(mut self, policy: SectionErrorPolicy) -> Self {
        self.section_error_policy = Some(policy);
        self
    }

    /// Compile the formula pattern and produce an [`ExtractionConfig`].
    pub fn build(self) -> Result<ExtractionConfig, regex::Error> {
        let defaults = ExtractionConfig::default();
        Ok(ExtractionConfig {
            formula_re: self.formula_re.map(|p| Regex::new(&p)).transpose()?,
            untitled_prefix: self.untitled_prefix.unwrap_or(defaults.untitled_prefix),
            figure_section: self.figure_section.unwrap_or(defaults.figure_section),
            numeric_threshold: self.numeric_threshold.unwrap_or(defaults.numeric_threshold),
            superscript_threshold: self
                .superscript_threshold
                .unwrap_or(defaults.superscript_threshold),
            anchor_style: self.anchor_style.unwrap_or_default(),
            section_error_policy: self.section_error_policy.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractionConfig::default();
        assert_eq!(config.untitled_prefix, "Section Untitled");
        assert_eq!(config.figure_section, "Figure Caption");
        assert!((config.numeric_threshold - 0.5).abs() < f64::EPSILON);
        assert!((config.superscript_threshold - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.anchor_style, AnchorStyle::Resolved);
        assert_eq!(config.section_error_policy, SectionErrorPolicy::Skip);
        assert!(config.formula_re.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ExtractionConfigBuilder::new()
            .untitled_prefix("Untitled")
            .superscript_threshold(0.3)
            .anchor_style(AnchorStyle::Key)
            .section_error_policy(SectionErrorPolicy::Abort)
            .formula_regex(r"\b[a-z]\s*<\s*\d+")
            .build()
            .unwrap();
        assert_eq!(config.untitled_prefix, "Untitled");
        assert!((config.superscript_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.anchor_style, AnchorStyle::Key);
        assert_eq!(config.section_error_policy, SectionErrorPolicy::Abort);
        assert!(config.formula_re.is_some());
    }

    #[test]
    fn test_builder_invalid_regex() {
        let result = ExtractionConfigBuilder::new().formula_regex(r"[invalid").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_names_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            anchor: AnchorStyle,
            policy: SectionErrorPolicy,
        }
        let parsed: Wrapper = toml::from_str("anchor = \"key\"\npolicy = \"abort\"\n").unwrap();
        assert_eq!(parsed.anchor, AnchorStyle::Key);
        assert_eq!(parsed.policy, SectionErrorPolicy::Abort);
    }
}
