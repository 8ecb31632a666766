//! Section labels.
//!
//! Two passes: [`HeadingScheme::detect`] looks at every section heading once
//! and picks one numbering convention for the whole document;
//! [`label_sections`] then folds over the sections in document order,
//! threading the last top-level heading as the accumulator.

use std::fmt;

use cex_tei::{Document, NodeId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Roman numeral, a period, then whitespace. The numeral may match empty, so
/// callers check the capture.
static ROMAN_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(M{0,3}(?:CM|CD|D?C{0,3})(?:XC|XL|L?X{0,3})(?:IX|IV|V?I{0,3}))\.\s+").unwrap()
});

/// Leading section number written into the heading text (`2.`, `2.1 `).
static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)*(?:\.\s*|\s+)").unwrap());

/// Sub-numbering embedded in a heading (`Methods 2.1 Setup`).
static EMBEDDED_SUBNUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)+\b").unwrap());

static LEADING_NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\p{L}\p{N}]+").unwrap());

/// Document-wide heading numbering convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingScheme {
    /// Numbering lives in the `n` attribute; only top-level headings set the
    /// carried section label.
    Attribute,
    /// Heading text starts with a roman numeral and a period.
    Roman,
    #[default]
    Plain,
}

impl fmt::Display for HeadingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeadingScheme::Attribute => "attribute",
            HeadingScheme::Roman => "roman",
            HeadingScheme::Plain => "plain",
        };
        f.write_str(name)
    }
}

impl HeadingScheme {
    pub fn detect(doc: &Document) -> Self {
        let mut total = 0usize;
        let mut numbered = 0usize;
        let mut roman = 0usize;
        for head in doc.divs().filter_map(|d| doc.head_of(d)) {
            total += 1;
            if doc.attr(head, "n").is_some() {
                numbered += 1;
            }
            if roman_prefix_len(doc.text_content(head).trim()).is_some() {
                roman += 1;
            }
        }

        let scheme = if numbered > 0 && 2 * numbered >= total {
            HeadingScheme::Attribute
        } else if roman > 0 && 2 * roman >= total {
            HeadingScheme::Roman
        } else {
            HeadingScheme::Plain
        };
        tracing::debug!(total, numbered, roman, %scheme, "detected heading scheme");
        scheme
    }
}

/// Byte length of a roman numeral prefix including its period and whitespace.
fn roman_prefix_len(text: &str) -> Option<usize> {
    let caps = ROMAN_PREFIX.captures(text)?;
    if caps.get(1).is_some_and(|m| m.as_str().is_empty()) {
        return None;
    }
    caps.get(0).map(|m| m.end())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionLabel {
    pub div: NodeId,
    pub label: String,
    /// Synthetic label for a section with no heading.
    pub untitled: bool,
}

#[derive(Debug, Default)]
struct Carry {
    current: Option<String>,
    untitled: usize,
}

/// One label per `<div>` in document order.
///
/// A section without a heading but with paragraphs of its own gets
/// `<untitled_prefix> <i>`, which is never carried. A section without a
/// heading or paragraphs takes the carried label.
pub fn label_sections(
    doc: &Document,
    scheme: HeadingScheme,
    untitled_prefix: &str,
) -> Vec<SectionLabel> {
    let mut carry = Carry::default();
    doc.divs()
        .map(|div| {
            let (label, untitled) = match doc.head_of(div) {
                Some(head) => (label_heading(doc, head, scheme, &mut carry), false),
                None if !doc.paragraphs_of(div).is_empty() => {
                    carry.untitled += 1;
                    (format!("{} {}", untitled_prefix, carry.untitled), true)
                }
                None => (carry.current.clone().unwrap_or_default(), false),
            };
            SectionLabel { div, label, untitled }
        })
        .collect()
}

fn label_heading(doc: &Document, head: NodeId, scheme: HeadingScheme, carry: &mut Carry) -> String {
    let text = collapse_whitespace(&doc.text_content(head));
    match scheme {
        HeadingScheme::Attribute => {
            let top_level = doc
                .attr(head, "n")
                .is_some_and(|n| n.split('.').filter(|s| !s.trim().is_empty()).count() == 1);
            let stripped = LEADING_NUMBER.replace(&text, "");
            if top_level {
                let label = cleanup(cut_before_subnumber(&stripped));
                carry.current = Some(label.clone());
                label
            } else {
                carry.current.clone().unwrap_or_else(|| cleanup(&stripped))
            }
        }
        HeadingScheme::Roman => {
            let rest = roman_prefix_len(&text).map_or(text.as_str(), |end| &text[end..]);
            let label = cleanup(rest);
            carry.current = Some(label.clone());
            label
        }
        HeadingScheme::Plain => {
            let label = cleanup(&text);
            carry.current = Some(label.clone());
            label
        }
    }
}

fn cut_before_subnumber(text: &str) -> &str {
    match EMBEDDED_SUBNUMBER.find(text) {
        Some(m) if !text[..m.start()].trim().is_empty() => &text[..m.start()],
        _ => text,
    }
}

fn cleanup(text: &str) -> String {
    LEADING_NON_ALNUM.replace(text.trim(), "").trim().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Document {
        Document::parse(&format!(
            r#"<TEI xmlns="http://www.tei-c.org/ns/1.0"><text><body>{body}</body></text></TEI>"#
        ))
        .unwrap()
    }

    fn labels(doc: &Document) -> Vec<String> {
        let scheme = HeadingScheme::detect(doc);
        label_sections(doc, scheme, "Section Untitled")
            .into_iter()
            .map(|l| l.label)
            .collect()
    }

    #[test]
    fn test_attribute_scheme_subsections_keep_parent() {
        let d = doc(r#"
            <div><head n="1.">Introduction</head><p>a</p></div>
            <div><head n="2.">2. Methods</head><p>b</p></div>
            <div><head n="2.1.">2.1 Setup</head><p>c</p></div>
            <div><head n="3.">Results</head><p>d</p></div>"#);
        assert_eq!(HeadingScheme::detect(&d), HeadingScheme::Attribute);
        assert_eq!(labels(&d), vec!["Introduction", "Methods", "Methods", "Results"]);
    }

    #[test]
    fn test_attribute_scheme_cuts_embedded_subnumber() {
        let d = doc(r#"<div><head n="4">Experiments 4.1 Datasets</head></div>"#);
        assert_eq!(labels(&d), vec!["Experiments"]);
    }

    #[test]
    fn test_attribute_scheme_unnumbered_head_uses_carry() {
        let d = doc(r#"
            <div><head n="1">Background</head></div>
            <div><head>Acknowledgements</head></div>
            <div><head n="2">Model</head></div>"#);
        assert_eq!(labels(&d), vec!["Background", "Background", "Model"]);
    }

    #[test]
    fn test_roman_scheme() {
        let d = doc(r#"
            <div><head>I. INTRODUCTION</head></div>
            <div><head>II.  Related   Work</head></div>
            <div><head>Appendix</head></div>"#);
        assert_eq!(HeadingScheme::detect(&d), HeadingScheme::Roman);
        assert_eq!(labels(&d), vec!["INTRODUCTION", "Related Work", "Appendix"]);
    }

    #[test]
    fn test_plain_scheme_when_minority_numbered() {
        let d = doc(r#"
            <div><head n="1">One</head></div>
            <div><head>Two</head></div>
            <div><head>- Three</head></div>"#);
        assert_eq!(HeadingScheme::detect(&d), HeadingScheme::Plain);
        assert_eq!(labels(&d), vec!["One", "Two", "Three"]);
    }

    #[test]
    fn test_untitled_sections_are_not_carried() {
        let d = doc(r#"
            <div><head n="1">Intro</head><p>x</p></div>
            <div><p>orphan</p></div>
            <div><head n="1.1">Detail</head><p>y</p></div>
            <div><p>orphan two</p></div>
            <div></div>"#);
        let l = label_sections(&d, HeadingScheme::Attribute, "Section Untitled");
        let names: Vec<_> = l.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            names,
            vec!["Intro", "Section Untitled 1", "Intro", "Section Untitled 2", "Intro"]
        );
        assert!(l[1].untitled && !l[2].untitled);
    }

    #[test]
    fn test_empty_heading_is_carried() {
        let d = doc(r#"
            <div><head n="1">Intro</head></div>
            <div><head n="2"/></div>
            <div><head n="2.1">Sub</head></div>"#);
        assert_eq!(labels(&d), vec!["Intro", "", ""]);
    }

    #[test]
    fn test_labels_are_deterministic() {
        let d = doc(r#"
            <div><head>IV. Results</head><p>a</p></div>
            <div><p>b</p></div>
            <div><head>V. Discussion</head></div>"#);
        assert_eq!(labels(&d), labels(&d));
    }

    #[test]
    fn test_roman_requires_numeral() {
        assert_eq!(roman_prefix_len(". Intro"), None);
        assert_eq!(roman_prefix_len("XIV. Intro"), Some(5));
        assert_eq!(roman_prefix_len("Intro"), None);
    }
}
