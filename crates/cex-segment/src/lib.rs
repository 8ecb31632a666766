use std::path::PathBuf;

use thiserror::Error;

pub mod exceptions;
pub mod list;
pub mod rule;

pub use exceptions::ExceptionTable;
pub use list::ListOverride;
pub use rule::RuleSegmenter;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("failed to read exception table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("exception table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("exception table entry {word:?} is malformed: {reason}")]
    MalformedEntry { word: String, reason: String },
    #[error("segmentation failed: {0}")]
    Failed(String),
}

/// Splits text into sentences.
///
/// Implementors return sentences in order, each trimmed and non-empty. The
/// exception table lists words whose trailing period never ends a sentence.
/// Out-of-process implementations should bound their calls with a timeout and
/// report it as [`SegmentError::Failed`].
pub trait SentenceSegmenter: Send + Sync {
    fn segment(&self, text: &str, exceptions: &ExceptionTable) -> Result<Vec<String>, SegmentError>;
}

impl<S: SentenceSegmenter + ?Sized> SentenceSegmenter for std::sync::Arc<S> {
    fn segment(&self, text: &str, exceptions: &ExceptionTable) -> Result<Vec<String>, SegmentError> {
        (**self).segment(text, exceptions)
    }
}

impl<S: SentenceSegmenter + ?Sized> SentenceSegmenter for Box<S> {
    fn segment(&self, text: &str, exceptions: &ExceptionTable) -> Result<Vec<String>, SegmentError> {
        (**self).segment(text, exceptions)
    }
}
