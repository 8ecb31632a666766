use std::collections::HashMap;
use std::path::Path;

use crate::TeiError;
use crate::node::{Child, Element, MarkerKind, NodeId, NodeKind};
use crate::parser::parse_elements;

/// A parsed TEI document. Read-only once built.
#[derive(Debug, Clone)]
pub struct Document {
    elements: Vec<Element>,
    ids: HashMap<String, NodeId>,
}

impl Document {
    /// Parse a document from a string.
    pub fn parse(xml: &str) -> Result<Self, TeiError> {
        let elements = parse_elements(xml)?;
        let mut ids = HashMap::new();
        for (i, el) in elements.iter().enumerate() {
            if let Some(id) = el.attr("xml:id") {
                ids.entry(id.to_string()).or_insert(NodeId(i));
            }
        }
        Ok(Self { elements, ids })
    }

    /// Read and parse a document from disk.
    pub fn from_path(path: &Path) -> Result<Self, TeiError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, id: NodeId) -> &Element {
        &self.elements[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.elements[id.0].kind
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.elements[id.0].attr(name)
    }

    pub fn children(&self, id: NodeId) -> &[Child] {
        &self.elements[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.elements[id.0].parent
    }

    /// Element children only, in order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().filter_map(|c| match c {
            Child::Element(e) => Some(*e),
            Child::Text(_) => None,
        })
    }

    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.elements.len()).map(NodeId)
    }

    /// Strict descendants of `id` in document order.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        (id.0 + 1..self.elements[id.0].end).map(NodeId)
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// Nearest strict ancestor matching `pred`.
    pub fn nearest_ancestor(
        &self,
        id: NodeId,
        pred: impl Fn(&NodeKind) -> bool,
    ) -> Option<NodeId> {
        self.ancestors(id).find(|&a| pred(self.kind(a)))
    }

    /// Whether `ancestor` strictly contains `id`.
    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        id.0 > ancestor.0 && id.0 < self.elements[ancestor.0].end
    }

    /// Concatenated text of the element and all its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for child in self.children(id) {
            match child {
                Child::Text(t) => out.push_str(t),
                Child::Element(e) => self.collect_text(*e, out),
            }
        }
    }

    /// Text runs that are siblings of `id` and precede it under the same parent.
    pub fn preceding_sibling_text(&self, id: NodeId) -> Vec<&str> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let mut texts = Vec::new();
        for child in self.children(parent) {
            match child {
                Child::Element(e) if *e == id => break,
                Child::Text(t) => texts.push(t.as_str()),
                Child::Element(_) => {}
            }
        }
        texts
    }

    /// Look up an element by its `xml:id`.
    pub fn by_xml_id(&self, xml_id: &str) -> Option<NodeId> {
        self.ids.get(xml_id).copied()
    }

    // ── Structural queries ──

    /// Every `<div>` in document order.
    pub fn divs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.elements()
            .filter(move |&id| matches!(self.kind(id), NodeKind::Div))
    }

    /// The `<head>` that is a direct child of `div`.
    pub fn head_of(&self, div: NodeId) -> Option<NodeId> {
        self.child_elements(div)
            .find(|&c| matches!(self.kind(c), NodeKind::Head))
    }

    /// Nearest section, note or figure enclosing `id`.
    pub fn owning_container(&self, id: NodeId) -> Option<NodeId> {
        self.nearest_ancestor(id, NodeKind::is_container)
    }

    /// Paragraphs owned by `container`: those whose nearest enclosing
    /// section, note or figure is `container` itself.
    pub fn paragraphs_of(&self, container: NodeId) -> Vec<NodeId> {
        self.descendants(container)
            .filter(|&id| matches!(self.kind(id), NodeKind::Paragraph))
            .filter(|&id| self.owning_container(id) == Some(container))
            .collect()
    }

    /// Every `<ref>` of the given kind in document order.
    pub fn markers(&self, kind: MarkerKind) -> impl Iterator<Item = NodeId> + '_ {
        self.elements()
            .filter(move |&id| matches!(self.kind(id), NodeKind::Marker(k) if *k == kind))
    }

    /// `target` attribute of a marker with the leading `#` removed.
    pub fn marker_target(&self, marker: NodeId) -> Option<&str> {
        self.attr(marker, "target")
            .map(|t| t.trim().trim_start_matches('#'))
            .filter(|t| !t.is_empty())
    }

    /// Trimmed literal text of a marker.
    pub fn marker_text(&self, marker: NodeId) -> String {
        self.text_content(marker).trim().to_string()
    }
}

/// Iterator over ancestors, nearest first.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0" xmlns:xlink="http://www.w3.org/1999/xlink">
  <text>
    <body>
      <div>
        <head n="1.">Introduction</head>
        <p>Prior work <ref type="bibr" target="#b0">[1]</ref> showed X &amp; Y.<ref type="foot" target="#foot_0">1</ref></p>
      </div>
      <figure xml:id="fig_0" coords="1,2,3,4,5">
        <figDesc>Caption <ref type="bibr" target="#b1">[2]</ref>.</figDesc>
      </figure>
      <note place="foot" xml:id="foot_0">See <ref type="bibr">[3]</ref>.</note>
    </body>
  </text>
</TEI>"##;

    #[test]
    fn test_parse_classifies_kinds() {
        let doc = Document::parse(SAMPLE).unwrap();
        let divs: Vec<_> = doc.divs().collect();
        assert_eq!(divs.len(), 1);

        let head = doc.head_of(divs[0]).unwrap();
        assert_eq!(doc.text_content(head), "Introduction");
        assert_eq!(doc.attr(head, "n"), Some("1."));

        let bibr: Vec<_> = doc.markers(MarkerKind::Bibliography).collect();
        assert_eq!(bibr.len(), 3);
        let foot: Vec<_> = doc.markers(MarkerKind::Footnote).collect();
        assert_eq!(foot.len(), 1);
        assert_eq!(doc.marker_target(foot[0]), Some("foot_0"));
    }

    #[test]
    fn test_text_is_unescaped_and_untrimmed() {
        let doc = Document::parse(SAMPLE).unwrap();
        let div = doc.divs().next().unwrap();
        let p = doc.paragraphs_of(div)[0];
        assert_eq!(doc.text_content(p), "Prior work [1] showed X & Y.1");
        let marker = doc.markers(MarkerKind::Bibliography).next().unwrap();
        assert_eq!(doc.preceding_sibling_text(marker), vec!["Prior work "]);
    }

    #[test]
    fn test_xml_id_lookup_and_containment() {
        let doc = Document::parse(SAMPLE).unwrap();
        let note = doc.by_xml_id("foot_0").unwrap();
        assert_eq!(doc.kind(note), &NodeKind::Note);

        let fig = doc.by_xml_id("fig_0").unwrap();
        assert_eq!(doc.attr(fig, "coords"), Some("1,2,3,4,5"));
        let caption_marker = doc.markers(MarkerKind::Bibliography).nth(1).unwrap();
        assert!(doc.contains(fig, caption_marker));
        assert_eq!(
            doc.nearest_ancestor(caption_marker, |k| matches!(k, NodeKind::Figure)),
            Some(fig)
        );
        assert_eq!(doc.marker_target(doc.markers(MarkerKind::Bibliography).nth(2).unwrap()), None);
    }

    #[test]
    fn test_paragraphs_of_excludes_nested_containers() {
        let xml = r#"<TEI xmlns="http://www.tei-c.org/ns/1.0"><body>
            <div><p>outer</p>
              <div><head>Inner</head><p>inner</p></div>
              <note><p>in note</p></note>
            </div></body></TEI>"#;
        let doc = Document::parse(xml).unwrap();
        let divs: Vec<_> = doc.divs().collect();
        let outer: Vec<_> = doc
            .paragraphs_of(divs[0])
            .into_iter()
            .map(|p| doc.text_content(p))
            .collect();
        assert_eq!(outer, vec!["outer"]);
        let inner: Vec<_> = doc
            .paragraphs_of(divs[1])
            .into_iter()
            .map(|p| doc.text_content(p))
            .collect();
        assert_eq!(inner, vec!["inner"]);
    }

    #[test]
    fn test_attribute_entities_are_decoded() {
        let xml = r##"<TEI xmlns="http://www.tei-c.org/ns/1.0"><body><div><p>See
            <ref type="bibr" target="#b&#49;&amp;x">[2]</ref> and <ref type="bibr" target="&quot;q&quot;">[3]</ref>.</p></div></body></TEI>"##;
        let doc = Document::parse(xml).unwrap();
        let markers: Vec<_> = doc.markers(MarkerKind::Bibliography).collect();
        assert_eq!(doc.marker_target(markers[0]), Some("b1&x"));
        assert_eq!(doc.attr(markers[1], "target"), Some("\"q\""));
    }

    #[test]
    fn test_foreign_namespace_is_other() {
        let xml = r#"<root><div><p>text</p></div></root>"#;
        let doc = Document::parse(xml).unwrap();
        assert_eq!(doc.divs().count(), 0);
        assert_eq!(doc.kind(doc.root()), &NodeKind::Other("root".to_string()));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let result = Document::parse(r#"<TEI xmlns="http://www.tei-c.org/ns/1.0"><div></p></TEI>"#);
        assert!(result.is_err());
        assert!(matches!(Document::parse(""), Err(TeiError::NoRoot)));
    }
}
