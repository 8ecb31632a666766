use std::fmt;

/// Index of an element in a [`crate::Document`] arena.
///
/// Elements are stored in pre-order, so comparing two ids compares their
/// position in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The `type` of a `<ref>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// `type="bibr"`: points into the bibliography.
    Bibliography,
    /// `type="foot"`: points at a footnote `<note>`.
    Footnote,
    /// Figure, table, formula or untyped pointers.
    Other,
}

impl MarkerKind {
    fn from_type_attr(value: Option<&str>) -> Self {
        match value {
            Some("bibr") => Self::Bibliography,
            Some("foot") => Self::Footnote,
            _ => Self::Other,
        }
    }
}

/// Closed classification of TEI elements relevant to extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Div,
    Head,
    Paragraph,
    Marker(MarkerKind),
    Note,
    Figure,
    FigDesc,
    /// `<s>` sentence wrapper emitted when the extractor segments sentences.
    Sentence,
    /// `<hi>` inline rendition.
    Highlight,
    Formula,
    /// Any other element, keyed by local name. Elements outside the TEI
    /// namespace always land here.
    Other(String),
}

impl NodeKind {
    pub(crate) fn classify(in_tei_ns: bool, local_name: &str, type_attr: Option<&str>) -> Self {
        if !in_tei_ns {
            return Self::Other(local_name.to_string());
        }
        match local_name {
            "div" => Self::Div,
            "head" => Self::Head,
            "p" => Self::Paragraph,
            "ref" => Self::Marker(MarkerKind::from_type_attr(type_attr)),
            "note" => Self::Note,
            "figure" => Self::Figure,
            "figDesc" => Self::FigDesc,
            "s" => Self::Sentence,
            "hi" => Self::Highlight,
            "formula" => Self::Formula,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_bibliography_marker(&self) -> bool {
        matches!(self, Self::Marker(MarkerKind::Bibliography))
    }

    /// Elements that own paragraphs: sections, notes and figures.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Div | Self::Note | Self::Figure)
    }
}

/// A child slot of an element: a nested element or a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Element(NodeId),
    Text(String),
}

/// One element of the arena.
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: NodeKind,
    /// Local name as written in the source.
    pub name: String,
    /// Attributes keyed by their qualified name (`n`, `xml:id`, `coords`).
    pub attributes: Vec<(String, String)>,
    pub parent: Option<NodeId>,
    pub children: Vec<Child>,
    /// One past the arena index of this element's last descendant.
    pub(crate) end: usize,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}
