use std::collections::HashMap;
use std::fmt;

use cex_tei::{Document, MarkerKind, NodeId, NodeKind};
use serde::{Serialize, Serializer};

/// Stable identifier `cit<N>` of one bibliography marker. Numbering starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CitationKey(usize);

impl CitationKey {
    pub fn number(self) -> usize {
        self.0
    }

    /// Parse a `cit<N>` token. Returns `None` for anything else, including `cit0`.
    pub fn parse(token: &str) -> Option<Self> {
        let digits = token.strip_prefix("cit")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match digits.parse::<usize>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(Self(n)),
        }
    }
}

impl fmt::Display for CitationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cit{}", self.0)
    }
}

impl Serialize for CitationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a marker was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOrigin {
    /// Inline in a section paragraph.
    Paragraph,
    /// Inside a footnote.
    Footnote,
    /// Inside a figure caption or figure note.
    Figure,
}

/// Bijection between bibliography markers and citation keys.
///
/// Keys are handed out in three passes: section paragraphs in document order,
/// then footnotes, then figures. A marker is keyed at most once and two
/// markers with the same text still get distinct keys.
#[derive(Debug, Clone, Default)]
pub struct MarkerIndex {
    /// `markers[n - 1]` is the marker keyed `cit<n>`.
    markers: Vec<(NodeId, MarkerOrigin)>,
    keys: HashMap<NodeId, CitationKey>,
}

impl MarkerIndex {
    pub fn build(doc: &Document) -> Self {
        let mut index = Self::default();
        let bibr: Vec<NodeId> = doc.markers(MarkerKind::Bibliography).collect();

        for &m in &bibr {
            if paragraph_of(doc, m)
                .and_then(|p| doc.owning_container(p))
                .is_some_and(|c| matches!(doc.kind(c), NodeKind::Div))
            {
                index.assign(m, MarkerOrigin::Paragraph);
            }
        }
        for &m in &bibr {
            let in_note = doc.nearest_ancestor(m, |k| matches!(k, NodeKind::Note)).is_some();
            let in_figure = doc.nearest_ancestor(m, |k| matches!(k, NodeKind::Figure)).is_some();
            if in_note && !in_figure {
                index.assign(m, MarkerOrigin::Footnote);
            }
        }
        for &m in &bibr {
            if doc.nearest_ancestor(m, |k| matches!(k, NodeKind::Figure)).is_some() {
                index.assign(m, MarkerOrigin::Figure);
            }
        }

        tracing::debug!(markers = index.len(), total = bibr.len(), "built marker index");
        index
    }

    fn assign(&mut self, marker: NodeId, origin: MarkerOrigin) {
        if self.keys.contains_key(&marker) {
            return;
        }
        self.markers.push((marker, origin));
        self.keys.insert(marker, CitationKey(self.markers.len()));
    }

    pub fn key_of(&self, marker: NodeId) -> Option<CitationKey> {
        self.keys.get(&marker).copied()
    }

    pub fn marker(&self, key: CitationKey) -> Option<NodeId> {
        self.entry(key).map(|(m, _)| m)
    }

    pub fn origin(&self, key: CitationKey) -> Option<MarkerOrigin> {
        self.entry(key).map(|(_, o)| o)
    }

    fn entry(&self, key: CitationKey) -> Option<(NodeId, MarkerOrigin)> {
        key.0.checked_sub(1).and_then(|i| self.markers.get(i)).copied()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// All keyed markers in key order.
    pub fn iter(&self) -> impl Iterator<Item = (CitationKey, NodeId, MarkerOrigin)> + '_ {
        self.markers
            .iter()
            .enumerate()
            .map(|(i, &(m, o))| (CitationKey(i + 1), m, o))
    }

    /// Markers found inline in section paragraphs.
    pub fn paragraph_markers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.markers
            .iter()
            .filter(|(_, o)| *o == MarkerOrigin::Paragraph)
            .map(|&(m, _)| m)
    }
}

/// The paragraph a marker sits in, looking through `<s>` and `<hi>` wrappers only.
pub(crate) fn paragraph_of(doc: &Document, marker: NodeId) -> Option<NodeId> {
    doc.ancestors(marker)
        .find(|&a| !matches!(doc.kind(a), NodeKind::Sentence | NodeKind::Highlight))
        .filter(|&a| matches!(doc.kind(a), NodeKind::Paragraph))
}
