use std::collections::HashSet;

use cex_segment::{ExceptionTable, SegmentError, SentenceSegmenter};
use cex_tei::{Child, Document, MarkerKind, NodeId, NodeKind};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::AnchorStyle;
use crate::context::{CitationContext, CitationMap};
use crate::formula;
use crate::markers::{CitationKey, MarkerIndex};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,;.])").unwrap());
static PAREN_PADDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*(.*?)\s*\)").unwrap());
static LEADING_KEYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:cit\d+\b\s*)+").unwrap());
static KEY_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bcit\d+\b").unwrap());

/// Which elements are flattened into the text stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Paragraph content: descend only into inline wrappers.
    Paragraph,
    /// Note or caption content: also descend into nested paragraphs, notes
    /// and captions.
    Block,
}

/// Flatten `roots` into one cleaned string with keyed markers replaced by
/// their `cit<N>` token.
pub(crate) fn gather(doc: &Document, roots: &[NodeId], index: &MarkerIndex, scope: Scope) -> String {
    let mut runs = Vec::new();
    for &root in roots {
        flatten(doc, root, index, scope, &mut runs);
    }
    clean(&runs.join(" "))
}

fn flatten(doc: &Document, id: NodeId, index: &MarkerIndex, scope: Scope, runs: &mut Vec<String>) {
    for child in doc.children(id) {
        let el = match child {
            Child::Text(t) => {
                runs.push(t.clone());
                continue;
            }
            Child::Element(el) => *el,
        };
        match doc.kind(el) {
            NodeKind::Marker(MarkerKind::Bibliography) => match index.key_of(el) {
                Some(key) => runs.push(key.to_string()),
                None => runs.push(doc.text_content(el)),
            },
            NodeKind::Marker(_) => runs.push(doc.text_content(el)),
            NodeKind::Sentence | NodeKind::Highlight => flatten(doc, el, index, scope, runs),
            NodeKind::Paragraph | NodeKind::Note | NodeKind::FigDesc if scope == Scope::Block => {
                flatten(doc, el, index, scope, runs)
            }
            _ => {}
        }
    }
}

/// Collapse whitespace, drop spaces before `, ; .` and inside parentheses.
pub(crate) fn clean(text: &str) -> String {
    let text = WHITESPACE.replace_all(text, " ");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    let text = PAREN_PADDING.replace_all(&text, "($1)");
    text.trim().to_string()
}

/// Protect formulas, segment, and restore each sentence.
pub(crate) fn segment_text(
    text: &str,
    formula_re: &Regex,
    segmenter: &dyn SentenceSegmenter,
    exceptions: &ExceptionTable,
) -> Result<Vec<String>, SegmentError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let protected = formula::protect(text, formula_re);
    let sentences = segmenter.segment(protected.text(), exceptions)?;
    Ok(sentences.iter().map(|s| protected.restore(s)).collect())
}

/// Move a run of leading citation keys onto the previous sentence when that
/// sentence ends with a period. Applying this twice equals applying it once.
pub fn correct_superscripts(sentences: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    for i in 1..out.len() {
        if !out[i - 1].ends_with('.') {
            continue;
        }
        let Some(run) = LEADING_KEYS.find(&out[i]) else {
            continue;
        };
        let keys = run.as_str().trim().to_string();
        let rest = out[i][run.end()..].trim().to_string();
        out[i - 1] = format!("{} {}", out[i - 1], keys);
        out[i] = rest;
    }

    out.retain(|s| !s.is_empty());
    out
}

/// Emits entries for sentences of one section or figure.
pub(crate) struct Emitter<'a> {
    pub doc: &'a Document,
    pub index: &'a MarkerIndex,
    pub anchor_style: AnchorStyle,
}

/// Counts from one [`Emitter::emit`] call.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct EmitCounts {
    pub written: usize,
    pub overwritten: usize,
}

impl Emitter<'_> {
    /// Keys in `sentence` that name a known marker, in order of appearance.
    pub fn keys_in(&self, sentence: &str) -> Vec<CitationKey> {
        let mut seen = HashSet::new();
        KEY_TOKEN
            .find_iter(sentence)
            .filter_map(|m| CitationKey::parse(m.as_str()))
            .filter(|k| self.index.marker(*k).is_some())
            .filter(|k| seen.insert(*k))
            .collect()
    }

    pub fn reference(&self, key: CitationKey) -> String {
        self.index
            .marker(key)
            .map(|m| self.doc.marker_text(m))
            .unwrap_or_default()
    }

    /// The CITATION text of `sentence` as seen from `anchor`.
    pub fn citation_text(&self, sentence: &str, anchor: CitationKey) -> String {
        let resolved = KEY_TOKEN.replace_all(sentence, |caps: &regex::Captures| {
            let token = &caps[0];
            match CitationKey::parse(token) {
                Some(k) if self.anchor_style == AnchorStyle::Key && k == anchor => token.to_string(),
                Some(k) if self.index.marker(k).is_some() => self.reference(k),
                _ => token.to_string(),
            }
        });
        let text = WHITESPACE.replace_all(&resolved, " ");
        SPACE_BEFORE_PUNCT.replace_all(&text, "$1").trim().to_string()
    }

    /// One entry per key of `sentence`, in order of appearance.
    pub fn entries(&self, sentence: &str, section: &str) -> Vec<(CitationKey, CitationContext)> {
        self.keys_in(sentence)
            .into_iter()
            .map(|key| {
                let entry =
                    CitationContext::new(section, self.citation_text(sentence, key), self.reference(key));
                (key, entry)
            })
            .collect()
    }

    /// Store one entry. Last write wins.
    pub fn write(
        &self,
        contexts: &mut CitationMap,
        key: CitationKey,
        entry: CitationContext,
        counts: &mut EmitCounts,
    ) {
        if let Some(previous) = contexts.insert(key, entry) {
            tracing::debug!(%key, previous = %previous.section, "overwrote citation context");
            counts.overwritten += 1;
        }
        counts.written += 1;
    }

    /// Write one entry per key of `sentence`.
    pub fn emit(&self, sentence: &str, section: &str, contexts: &mut CitationMap) -> EmitCounts {
        let mut counts = EmitCounts::default();
        for (key, entry) in self.entries(sentence, section) {
            self.write(contexts, key, entry, &mut counts);
        }
        counts
    }
}

impl std::ops::AddAssign for EmitCounts {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.overwritten += other.overwritten;
    }
}
