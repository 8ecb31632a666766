use std::collections::HashSet;

use cex_segment::{ExceptionTable, SegmentError, SentenceSegmenter};
use cex_tei::{Document, NodeId, NodeKind};
use regex::Regex;

use crate::context::CitationMap;
use crate::markers::{MarkerIndex, MarkerOrigin};
use crate::sentences::{self, EmitCounts, Emitter, Scope};

/// Caption and figure-note pass.
pub(crate) struct FigureExtractor<'a> {
    pub doc: &'a Document,
    pub index: &'a MarkerIndex,
    pub segmenter: &'a dyn SentenceSegmenter,
    pub exceptions: &'a ExceptionTable,
    pub formula_re: &'a Regex,
}

impl FigureExtractor<'_> {
    /// Figures holding keyed markers, one per geometry signature, in the
    /// order their first marker was keyed.
    pub fn unique_figures(&self) -> Vec<NodeId> {
        let mut signatures = HashSet::new();
        self.index
            .iter()
            .filter(|(_, _, origin)| *origin == MarkerOrigin::Figure)
            .filter_map(|(_, marker, _)| {
                self.doc
                    .nearest_ancestor(marker, |k| matches!(k, NodeKind::Figure))
            })
            .filter(|&figure| signatures.insert(self.signature(figure)))
            .collect()
    }

    /// The `coords` attribute, or the node itself when absent.
    fn signature(&self, figure: NodeId) -> String {
        match self.doc.attr(figure, "coords") {
            Some(coords) if !coords.trim().is_empty() => coords.trim().to_string(),
            _ => figure.to_string(),
        }
    }

    /// Outermost `figDesc` and `note` elements of `figure`. Nested notes are
    /// reached through these.
    fn caption_holders(&self, figure: NodeId) -> Vec<NodeId> {
        let is_holder = |k: &NodeKind| matches!(k, NodeKind::FigDesc | NodeKind::Note);
        self.doc
            .descendants(figure)
            .filter(|&d| is_holder(self.doc.kind(d)))
            .filter(|&d| {
                !self
                    .doc
                    .ancestors(d)
                    .take_while(|&a| a != figure)
                    .any(|a| is_holder(self.doc.kind(a)))
            })
            .collect()
    }

    pub fn sentences(&self, figure: NodeId) -> Result<Vec<String>, SegmentError> {
        let holders = self.caption_holders(figure);
        let text = sentences::gather(self.doc, &holders, self.index, Scope::Block);
        sentences::segment_text(&text, self.formula_re, self.segmenter, self.exceptions)
    }
}

/// Emit figure sentences, skipping `(CITATION, REFERENCE)` pairs already
/// written by an earlier figure sentence.
pub(crate) fn emit_figure(
    emitter: &Emitter<'_>,
    sentences: &[String],
    section: &str,
    contexts: &mut CitationMap,
    seen_pairs: &mut HashSet<(String, String)>,
) -> EmitCounts {
    let mut counts = EmitCounts::default();
    for sentence in sentences {
        for (key, entry) in emitter.entries(sentence, section) {
            if seen_pairs.insert((entry.citation.clone(), entry.reference.clone())) {
                emitter.write(contexts, key, entry, &mut counts);
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FORMULA_RE;
    use cex_segment::RuleSegmenter;

    const DOC: &str = r##"<TEI xmlns="http://www.tei-c.org/ns/1.0"><text><body>
        <figure xml:id="fig_0" coords="3,10,20,30,40">
          <head>Figure 1</head>
          <figDesc>Results from <ref type="bibr">[1]</ref> and <ref type="bibr">[2]</ref>.</figDesc>
          <note>Adapted from <ref type="bibr">[3]</ref>. <note>Nested <ref type="bibr">[4]</ref>.</note></note>
        </figure>
        <figure xml:id="fig_0b" coords="3,10,20,30,40">
          <figDesc>Results from <ref type="bibr">[1]</ref> and <ref type="bibr">[2]</ref>.</figDesc>
        </figure>
        <figure xml:id="fig_1"><figDesc>No geometry <ref type="bibr">[5]</ref>.</figDesc></figure>
      </body></text></TEI>"##;

    #[test]
    fn test_unique_figures_by_signature() {
        let doc = Document::parse(DOC).unwrap();
        let index = MarkerIndex::build(&doc);
        let segmenter = RuleSegmenter::new();
        let exceptions = ExceptionTable::new();
        let ex = FigureExtractor {
            doc: &doc,
            index: &index,
            segmenter: &segmenter,
            exceptions: &exceptions,
            formula_re: &FORMULA_RE,
        };
        let figures = ex.unique_figures();
        assert_eq!(figures.len(), 2, "duplicate geometry is processed once");
        assert_eq!(doc.attr(figures[0], "xml:id"), Some("fig_0"));
        assert_eq!(doc.attr(figures[1], "xml:id"), Some("fig_1"));

        let sentences = ex.sentences(figures[0]).unwrap();
        assert_eq!(
            sentences,
            vec!["Results from cit1 and cit2.", "Adapted from cit3.", "Nested cit4."]
        );
    }
}
