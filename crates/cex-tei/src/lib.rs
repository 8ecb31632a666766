//! TEI document tree for citation-context extraction.
//!
//! Parses the TEI XML emitted by structural PDF extractors (GROBID and
//! friends) into an arena of elements. Every element in the TEI namespace is
//! classified once, at parse time, into a closed [`NodeKind`]; the extraction
//! engine matches on kinds instead of probing tag names and attributes.
//!
//! ```xml
//! <TEI xmlns="http://www.tei-c.org/ns/1.0">
//!   <text><body>
//!     <div>
//!       <head n="1">Introduction</head>
//!       <p>Prior work <ref type="bibr" target="#b0">[1]</ref> showed X.</p>
//!     </div>
//!   </body></text>
//! </TEI>
//! ```

mod document;
mod node;
mod parser;

use thiserror::Error;

pub use document::{Ancestors, Document};
pub use node::{Child, Element, MarkerKind, NodeId, NodeKind};

/// Namespace every recognised element must live in.
pub const TEI_NS: &str = "http://www.tei-c.org/ns/1.0";

#[derive(Error, Debug)]
pub enum TeiError {
    #[error("XML error at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("document has no root element")]
    NoRoot,
    #[error("unbalanced closing tag </{0}>")]
    Unbalanced(String),
    #[error("element <{0}> is never closed")]
    Unclosed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
