use std::collections::HashSet;

use cex_segment::{ExceptionTable, SegmentError, SentenceSegmenter};
use cex_tei::{Document, MarkerKind, NodeId, NodeKind};
use regex::Regex;

use crate::context::CitationMap;
use crate::markers::{MarkerIndex, MarkerOrigin};
use crate::sentences::{self, EmitCounts, Emitter, Scope};

/// Per-section pipeline: gather, protect, segment, correct, merge notes.
pub(crate) struct DivExtractor<'a> {
    pub doc: &'a Document,
    pub index: &'a MarkerIndex,
    pub segmenter: &'a dyn SentenceSegmenter,
    pub exceptions: &'a ExceptionTable,
    pub formula_re: &'a Regex,
    pub superscript: bool,
    /// Notes that contain at least one keyed footnote marker.
    notes_with_markers: HashSet<NodeId>,
}

impl<'a> DivExtractor<'a> {
    pub fn new(
        doc: &'a Document,
        index: &'a MarkerIndex,
        segmenter: &'a dyn SentenceSegmenter,
        exceptions: &'a ExceptionTable,
        formula_re: &'a Regex,
        superscript: bool,
    ) -> Self {
        let notes_with_markers = index
            .iter()
            .filter(|(_, _, origin)| *origin == MarkerOrigin::Footnote)
            .flat_map(|(_, marker, _)| {
                doc.ancestors(marker)
                    .filter(move |&a| matches!(doc.kind(a), NodeKind::Note))
            })
            .collect();
        Self {
            doc,
            index,
            segmenter,
            exceptions,
            formula_re,
            superscript,
            notes_with_markers,
        }
    }

    /// Sentences of `div`: its own paragraphs, then merged footnotes.
    pub fn sentences(&self, div: NodeId) -> Result<Vec<String>, SegmentError> {
        let paragraphs = self.doc.paragraphs_of(div);
        let text = sentences::gather(self.doc, &paragraphs, self.index, Scope::Paragraph);
        let mut out = sentences::segment_text(&text, self.formula_re, self.segmenter, self.exceptions)?;
        if self.superscript {
            out = sentences::correct_superscripts(out);
        }

        for note in self.referenced_notes(&paragraphs) {
            let text = sentences::gather(self.doc, &[note], self.index, Scope::Block);
            let note_sentences =
                sentences::segment_text(&text, self.formula_re, self.segmenter, self.exceptions)?;
            tracing::trace!(%div, %note, sentences = note_sentences.len(), "merged footnote");
            out.extend(note_sentences);
        }
        Ok(out)
    }

    /// Notes with citations pointed at by footnote markers in `paragraphs`,
    /// each listed once, in pointer order.
    fn referenced_notes(&self, paragraphs: &[NodeId]) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        paragraphs
            .iter()
            .flat_map(|&p| self.doc.descendants(p))
            .filter(|&m| matches!(self.doc.kind(m), NodeKind::Marker(MarkerKind::Footnote)))
            .filter_map(|m| self.doc.marker_target(m))
            .filter_map(|target| self.doc.by_xml_id(target))
            .filter(|note| self.notes_with_markers.contains(note))
            .filter(|note| seen.insert(*note))
            .collect()
    }
}

/// Emit every distinct sentence of a section under `section`.
pub(crate) fn emit_section(
    emitter: &Emitter<'_>,
    sentences: &[String],
    section: &str,
    contexts: &mut CitationMap,
) -> EmitCounts {
    let mut seen = HashSet::new();
    let mut counts = EmitCounts::default();
    for sentence in sentences.iter().filter(|s| seen.insert(s.as_str())) {
        counts += emitter.emit(sentence, section, contexts);
    }
    counts
}
