use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use cex_segment::{ExceptionTable, RuleSegmenter, SentenceSegmenter};
use cex_tei::Document;
use serde::Serialize;

use crate::ExtractionError;
use crate::config::{ExtractionConfig, SectionErrorPolicy};
use crate::context::{CitationMap, TargetMap};
use crate::div::{self, DivExtractor};
use crate::figure::{self, FigureExtractor};
use crate::formula::FORMULA_RE;
use crate::heading::{HeadingScheme, label_sections};
use crate::markers::MarkerIndex;
use crate::sentences::{EmitCounts, Emitter};
use crate::style::{MarkerStyle, detect_style};

/// Counters describing one extraction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionStats {
    /// Sections visited.
    pub sections: usize,
    /// Sections dropped because segmentation failed.
    pub sections_skipped: usize,
    /// Unique figures visited.
    pub figures: usize,
    pub figures_skipped: usize,
    /// Keyed bibliography markers.
    pub markers: usize,
    /// Entries in the final map.
    pub entries: usize,
    /// Writes that replaced an existing entry.
    pub overwritten: usize,
    pub superscript: bool,
    pub scheme: HeadingScheme,
}

/// Result of extracting citation contexts from one document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub contexts: CitationMap,
    /// Bibliography target of every key in `contexts` that has one.
    pub targets: TargetMap,
    pub stats: ExtractionStats,
}

/// Citation-context extraction over a TEI document.
///
/// Holds the configuration, the exception table and the segmenter. One
/// engine may be shared across threads; each [`extract`](Self::extract) call
/// is independent.
pub struct ExtractionEngine {
    config: ExtractionConfig,
    exceptions: ExceptionTable,
    segmenter: Arc<dyn SentenceSegmenter>,
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionEngine {
    /// Default configuration, empty exception table, rule-based segmenter.
    pub fn new() -> Self {
        Self::with_config(
            ExtractionConfig::default(),
            ExceptionTable::new(),
            Arc::new(RuleSegmenter::new()),
        )
    }

    pub fn with_config(
        config: ExtractionConfig,
        exceptions: ExceptionTable,
        segmenter: Arc<dyn SentenceSegmenter>,
    ) -> Self {
        Self {
            config,
            exceptions,
            segmenter,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn exceptions(&self) -> &ExceptionTable {
        &self.exceptions
    }

    /// Parse a TEI file and extract from it.
    pub fn extract_path(&self, path: &Path) -> Result<Extraction, ExtractionError> {
        let doc = Document::from_path(path)?;
        self.extract(&doc)
    }

    /// Run the full pipeline: marker index, heading scheme and marker style
    /// once each, then sections in document order, then figures.
    pub fn extract(&self, doc: &Document) -> Result<Extraction, ExtractionError> {
        let formula_re = self.config.formula_re.as_ref().unwrap_or(&*FORMULA_RE);
        let segmenter = self.segmenter.as_ref();

        let index = MarkerIndex::build(doc);
        let scheme = HeadingScheme::detect(doc);
        let style = detect_style(doc, &index, formula_re, segmenter, &self.exceptions, &self.config)?;

        let mut stats = ExtractionStats {
            markers: index.len(),
            superscript: style == MarkerStyle::Superscript,
            scheme,
            ..Default::default()
        };
        let mut contexts = CitationMap::new();
        let mut counts = EmitCounts::default();
        let emitter = Emitter {
            doc,
            index: &index,
            anchor_style: self.config.anchor_style,
        };

        // ── Sections ──
        let divs = DivExtractor::new(
            doc,
            &index,
            segmenter,
            &self.exceptions,
            formula_re,
            stats.superscript,
        );
        for section in label_sections(doc, scheme, &self.config.untitled_prefix) {
            stats.sections += 1;
            match divs.sentences(section.div) {
                Ok(sentences) => {
                    let written = div::emit_section(&emitter, &sentences, &section.label, &mut contexts);
                    tracing::debug!(
                        section = %section.label,
                        sentences = sentences.len(),
                        entries = written.written,
                        "extracted section"
                    );
                    counts += written;
                }
                Err(e) => match self.config.section_error_policy {
                    SectionErrorPolicy::Skip => {
                        tracing::warn!(section = %section.label, error = %e, "skipping section");
                        stats.sections_skipped += 1;
                    }
                    SectionErrorPolicy::Abort => {
                        return Err(ExtractionError::Section {
                            section: section.label,
                            source: e,
                        });
                    }
                },
            }
        }

        // ── Figures ──
        let figures = FigureExtractor {
            doc,
            index: &index,
            segmenter,
            exceptions: &self.exceptions,
            formula_re,
        };
        let mut seen_pairs = HashSet::new();
        for fig in figures.unique_figures() {
            stats.figures += 1;
            match figures.sentences(fig) {
                Ok(sentences) => {
                    counts += figure::emit_figure(
                        &emitter,
                        &sentences,
                        &self.config.figure_section,
                        &mut contexts,
                        &mut seen_pairs,
                    );
                    tracing::debug!(figure = %fig, sentences = sentences.len(), "extracted figure");
                }
                Err(e) => match self.config.section_error_policy {
                    SectionErrorPolicy::Skip => {
                        tracing::warn!(figure = %fig, error = %e, "skipping figure");
                        stats.figures_skipped += 1;
                    }
                    SectionErrorPolicy::Abort => {
                        return Err(ExtractionError::Section {
                            section: self.config.figure_section.clone(),
                            source: e,
                        });
                    }
                },
            }
        }

        let mut targets = TargetMap::new();
        for key in contexts.keys() {
            if let Some(target) = index.marker(key).and_then(|m| doc.marker_target(m)) {
                targets.insert(key, target.to_string());
            }
        }

        stats.entries = contexts.len();
        stats.overwritten = counts.overwritten;
        tracing::info!(
            markers = stats.markers,
            entries = stats.entries,
            overwritten = stats.overwritten,
            sections = stats.sections,
            figures = stats.figures,
            superscript = stats.superscript,
            scheme = %stats.scheme,
            "extraction complete"
        );

        Ok(Extraction {
            contexts,
            targets,
            stats,
        })
    }
}
