use cex_segment::{ExceptionTable, SegmentError, SentenceSegmenter};
use cex_tei::Document;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{ExtractionConfig, SectionErrorPolicy};
use crate::markers::MarkerIndex;
use crate::sentences::segment_text;

static LEADING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\w\s]+").unwrap());

/// Document-wide in-text citation convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarkerStyle {
    /// Author-year or bracketed markers inside the sentence.
    #[default]
    Inline,
    /// Numeric markers set after the sentence-final period.
    Superscript,
}

/// Decide the marker style from the paragraph markers of the document.
///
/// Numeric markers must be a majority of the non-empty ones; then enough of
/// them must directly follow a sentence-final period that is not part of an
/// exception word. Formulas are hidden from the segmenter as they are during
/// extraction. A marker whose text cannot be segmented is left uncounted
/// under [`SectionErrorPolicy::Skip`] and fails the pass under `Abort`.
pub fn detect_style(
    doc: &Document,
    index: &MarkerIndex,
    formula_re: &Regex,
    segmenter: &dyn SentenceSegmenter,
    exceptions: &ExceptionTable,
    config: &ExtractionConfig,
) -> Result<MarkerStyle, SegmentError> {
    let texts: Vec<_> = index
        .paragraph_markers()
        .map(|m| (m, doc.marker_text(m)))
        .filter(|(_, text)| !text.is_empty())
        .collect();
    let total = texts.len();
    if total == 0 {
        return Ok(MarkerStyle::Inline);
    }

    let numeric: Vec<_> = texts
        .iter()
        .filter(|(_, text)| is_numeric(text))
        .map(|(m, _)| *m)
        .collect();
    if numeric.len() as f64 <= total as f64 * config.numeric_threshold {
        tracing::debug!(total, numeric = numeric.len(), "markers are not numeric");
        return Ok(MarkerStyle::Inline);
    }

    let mut after_period = 0usize;
    for &marker in &numeric {
        let preceding = doc.preceding_sibling_text(marker).join(" ");
        let preceding = LEADING_PUNCT.replace(preceding.trim(), "");
        if preceding.is_empty() {
            continue;
        }
        let sentences = match segment_text(&preceding, formula_re, segmenter, exceptions) {
            Ok(sentences) => sentences,
            Err(e) if config.section_error_policy == SectionErrorPolicy::Skip => {
                tracing::warn!(%marker, error = %e, "style check failed for marker");
                continue;
            }
            Err(e) => return Err(e),
        };
        let Some(last) = sentences.last().map(|s| s.trim()) else {
            continue;
        };
        let last_word = last.rsplit(' ').next().unwrap_or(last);
        if last.ends_with('.') && !exceptions.contains(last_word) {
            after_period += 1;
        }
    }

    let style = if after_period as f64 > total as f64 * config.superscript_threshold {
        MarkerStyle::Superscript
    } else {
        MarkerStyle::Inline
    };
    tracing::debug!(total, numeric = numeric.len(), after_period, ?style, "detected marker style");
    Ok(style)
}

/// Marker text whose ASCII letters and digits are all digits.
fn is_numeric(text: &str) -> bool {
    let mut alnum = text.chars().filter(char::is_ascii_alphanumeric).peekable();
    alnum.peek().is_some() && alnum.all(|c| c.is_ascii_digit())
}
