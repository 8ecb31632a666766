//! Formula protection around sentence segmentation.
//!
//! Inline assignments such as `w = -1.5e3` contain periods and signs that a
//! segmenter may treat as boundaries. [`protect`] swaps each match for an
//! opaque placeholder (`FORMULA0`, `FORMULA1`, ...) and returns a table that
//! lives only as long as the caller keeps it; [`Protected::restore`] puts the
//! original substrings back.

use once_cell::sync::Lazy;
use regex::Regex;

/// Single letter, `=`, optional sign, digits, optional decimals and exponent.
pub static FORMULA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z]\s*=\s*[-+\u{2212}]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?").unwrap()
});

const PLACEHOLDER_PREFIX: &str = "FORMULA";

/// Text with formulas replaced by placeholders, plus the table to undo it.
#[derive(Debug, Clone)]
pub struct Protected {
    text: String,
    prefix: String,
    originals: Vec<String>,
}

/// Replace every match of `pattern` in `text` with a unique placeholder.
///
/// The placeholder prefix is lengthened until it does not occur in `text`,
/// so restoring never touches original content.
pub fn protect(text: &str, pattern: &Regex) -> Protected {
    let mut prefix = PLACEHOLDER_PREFIX.to_string();
    while text.contains(&prefix) {
        prefix.push('X');
    }

    let mut originals = Vec::new();
    let replaced = pattern.replace_all(text, |caps: &regex::Captures| {
        let token = format!("{}{}", prefix, originals.len());
        originals.push(caps[0].to_string());
        token
    });

    Protected {
        text: replaced.into_owned(),
        prefix,
        originals,
    }
}

impl Protected {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of protected substrings.
    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// Substitute placeholders in `fragment` (the protected text or any piece
    /// of it) with their original substrings.
    pub fn restore(&self, fragment: &str) -> String {
        if self.originals.is_empty() {
            return fragment.to_string();
        }

        let mut out = String::with_capacity(fragment.len());
        let mut rest = fragment;
        while let Some(at) = rest.find(&self.prefix) {
            out.push_str(&rest[..at]);
            let after = &rest[at + self.prefix.len()..];
            let digits = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();

            // Longest digit run naming a known placeholder.
            let resolved = (1..=digits).rev().find_map(|n| {
                after[..n]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.originals.get(i))
                    .map(|original| (n, original))
            });
            match resolved {
                Some((n, original)) => {
                    out.push_str(original);
                    rest = &after[n..];
                }
                None => {
                    out.push_str(&self.prefix);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_protect_replaces_formulas() {
        let p = protect("the decay rate w = -1 was measured and x=2.5e-3 too.", &FORMULA_RE);
        assert_eq!(p.text(), "the decay rate FORMULA0 was measured and FORMULA1 too.");
        assert_eq!(p.len(), 2);
        assert_eq!(p.restore("the decay rate FORMULA0 was"), "the decay rate w = -1 was");
        assert_eq!(p.restore("and FORMULA1 too."), "and x=2.5e-3 too.");
    }

    #[test]
    fn test_no_formula_is_identity() {
        let p = protect("No assignments here. Really.", &FORMULA_RE);
        assert!(p.is_empty());
        assert_eq!(p.text(), "No assignments here. Really.");
    }

    #[test]
    fn test_word_suffix_is_not_a_formula() {
        let p = protect("max = 3 and ax = 4", &FORMULA_RE);
        assert!(p.is_empty(), "only single-letter names are formulas");
    }

    #[test]
    fn test_prefix_avoids_existing_text() {
        let text = "FORMULA0 is literal; n = 4 is not.";
        let p = protect(text, &FORMULA_RE);
        assert!(p.text().starts_with("FORMULA0 is literal; FORMULAX0"));
        assert_eq!(p.restore(p.text()), text);
    }

    #[test]
    fn test_many_placeholders() {
        let text: String = (0..12).map(|i| format!("a = {i}. ")).collect();
        let p = protect(&text, &FORMULA_RE);
        assert_eq!(p.len(), 12);
        assert!(p.text().contains("FORMULA11"));
        assert_eq!(p.restore(p.text()), text);
    }

    proptest! {
        #[test]
        fn prop_restore_inverts_protect(
            parts in prop::collection::vec(
                prop_oneof![
                    "[a-z ,.]{0,12}",
                    "[A-Za-z] ?= ?[-+]?[0-9]{1,4}(\\.[0-9]{1,3})?([eE][-+]?[0-9]{1,2})?",
                    Just("FORMULA".to_string()),
                    Just("FORMULA3".to_string()),
                ],
                0..8
            )
        ) {
            let text = parts.join(" ");
            let p = protect(&text, &FORMULA_RE);
            prop_assert_eq!(p.restore(p.text()), text);
        }
    }
}
