use quick_xml::NsReader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};

use crate::node::{Child, Element, NodeId, NodeKind};
use crate::{TEI_NS, TeiError};

/// Parse TEI XML into a pre-order element arena. Returns the arena; the root
/// element is always at index 0.
pub(crate) fn parse_elements(xml: &str) -> Result<Vec<Element>, TeiError> {
    let mut reader = NsReader::from_str(xml);
    // Mixed content: whitespace between inline elements is meaningful.
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut elements: Vec<Element> = Vec::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut root_closed = false;

    loop {
        let position = reader.buffer_position() as u64;
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|source| TeiError::Xml { position, source })?;

        match event {
            Event::Start(ref e) => {
                if root_closed {
                    // Trailing siblings of the root are not part of the document.
                    continue;
                }
                let in_tei_ns = matches!(ns, ResolveResult::Bound(Namespace(n)) if n == TEI_NS.as_bytes());
                let element = start_element(e, in_tei_ns, stack.last().copied(), reader.decoder())
                    .map_err(|source| TeiError::Xml { position, source })?;
                let id = NodeId(elements.len());
                if let Some(&parent) = stack.last() {
                    elements[parent.0].children.push(Child::Element(id));
                }
                elements.push(element);
                stack.push(id);
            }
            Event::End(ref e) => {
                if root_closed {
                    continue;
                }
                let id = stack.pop().ok_or_else(|| {
                    TeiError::Unbalanced(String::from_utf8_lossy(e.local_name().as_ref()).to_string())
                })?;
                elements[id.0].end = elements.len();
                if stack.is_empty() {
                    root_closed = true;
                }
            }
            Event::Text(ref e) => {
                if let Some(&parent) = stack.last() {
                    let text = e
                        .unescape()
                        .map_err(|source| TeiError::Xml { position, source })?;
                    push_text(&mut elements[parent.0], &text);
                }
            }
            Event::CData(e) => {
                if let Some(&parent) = stack.last() {
                    let raw = e.into_inner();
                    push_text(&mut elements[parent.0], &String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(TeiError::Unclosed(elements[open.0].name.clone()));
    }
    if elements.is_empty() {
        return Err(TeiError::NoRoot);
    }

    tracing::trace!(elements = elements.len(), "parsed TEI tree");
    Ok(elements)
}

fn start_element(
    e: &BytesStart<'_>,
    in_tei_ns: bool,
    parent: Option<NodeId>,
    decoder: Decoder,
) -> Result<Element, quick_xml::Error> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr.decode_and_unescape_value(decoder)?.to_string();
        attributes.push((key, value));
    }

    let type_attr = attributes
        .iter()
        .find(|(k, _)| k == "type")
        .map(|(_, v)| v.as_str());
    let kind = NodeKind::classify(in_tei_ns, &name, type_attr);

    Ok(Element {
        kind,
        name,
        attributes,
        parent,
        children: Vec::new(),
        end: 0,
    })
}

/// Append text, merging with a directly preceding text run.
fn push_text(element: &mut Element, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Child::Text(last)) = element.children.last_mut() {
        last.push_str(text);
    } else {
        element.children.push(Child::Text(text.to_string()));
    }
}
