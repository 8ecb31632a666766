use std::path::PathBuf;

use thiserror::Error;

pub mod align;
pub mod config;
pub mod config_file;
pub mod context;
mod div;
pub mod engine;
mod figure;
pub mod formula;
pub mod heading;
pub mod markers;
mod sentences;
pub mod style;

pub use align::{Alignment, HeadingAligner};
pub use config::{AnchorStyle, ExtractionConfig, ExtractionConfigBuilder, SectionErrorPolicy};
pub use context::{CitationContext, CitationMap, KeyedMap, TargetMap};
pub use engine::{Extraction, ExtractionEngine, ExtractionStats};
pub use heading::{HeadingScheme, SectionLabel, label_sections};
pub use markers::{CitationKey, MarkerIndex, MarkerOrigin};
pub use sentences::correct_superscripts;
pub use style::MarkerStyle;

// Re-export the collaborators so callers need only this crate.
pub use cex_segment::{ExceptionTable, ListOverride, RuleSegmenter, SegmentError, SentenceSegmenter};
pub use cex_tei::{Document, TeiError};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error(transparent)]
    Tei(#[from] TeiError),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error("segmentation failed in section {section:?}: {source}")]
    Section {
        section: String,
        #[source]
        source: SegmentError,
    },
    #[error("invalid pattern: {0}")]
    Config(#[from] regex::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Extract citation contexts from a parsed document with the default
/// configuration and the rule-based segmenter.
///
/// Pipeline:
/// 1. Key every bibliography marker (paragraphs, then footnotes, then figures)
/// 2. Pick the heading numbering scheme and the marker style
/// 3. Segment each section, correct superscript boundaries, merge footnotes
/// 4. Segment unique figure captions
/// 5. Write one entry per key; later writes replace earlier ones
pub fn extract_citations(
    doc: &Document,
    exceptions: ExceptionTable,
) -> Result<Extraction, ExtractionError> {
    ExtractionEngine::with_config(
        ExtractionConfig::default(),
        exceptions,
        std::sync::Arc::new(RuleSegmenter::new()),
    )
    .extract(doc)
}
