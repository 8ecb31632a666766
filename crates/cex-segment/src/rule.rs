use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{ExceptionTable, ListOverride, SegmentError, SentenceSegmenter};

/// Abbreviations that never end a sentence, compared lowercase.
pub const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "e.g.", "i.e.", "al.", "etc.", "fig.", "figs.", "eq.", "eqs.", "ref.", "refs.", "vs.", "cf.",
    "approx.", "no.", "vol.", "pp.", "p.", "dr.", "mr.", "mrs.", "ms.", "prof.", "sec.", "sect.",
    "ch.", "tab.", "resp.", "ca.", "st.", "jr.", "inc.", "ltd.", "co.", "u.s.",
];

/// Characters that may follow a terminator and still belong to its sentence.
const CLOSERS: &[char] = &['"', '\'', '\u{201d}', '\u{2019}', ')', ']'];

static DOTTED_ACRONYM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\w\.){2,}$").unwrap());

/// Punctuation-driven segmenter.
///
/// Breaks after `.`, `?` or `!` (plus any closing quotes or brackets) when
/// followed by whitespace or the end of the text. A period does not break
/// after an exception-table word, a known abbreviation, a single capital
/// initial or a dotted acronym. The case of the following word is ignored,
/// so a citation key after a period opens a new sentence.
#[derive(Debug, Clone)]
pub struct RuleSegmenter {
    abbreviations: HashSet<String>,
}

impl Default for RuleSegmenter {
    fn default() -> Self {
        Self::with_abbreviations(&ListOverride::Default)
    }
}

impl RuleSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_abbreviations(abbreviations: &ListOverride<String>) -> Self {
        let defaults: Vec<String> = DEFAULT_ABBREVIATIONS.iter().map(|s| s.to_string()).collect();
        let abbreviations = abbreviations
            .resolve(&defaults)
            .into_iter()
            .map(|a| a.to_lowercase())
            .collect();
        Self { abbreviations }
    }

    /// Split without going through the trait; never fails.
    pub fn split(&self, text: &str, exceptions: &ExceptionTable) -> Vec<String> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            let (pos, c) = chars[i];
            if !matches!(c, '.' | '?' | '!') {
                i += 1;
                continue;
            }

            let mut j = i + 1;
            while j < chars.len() && CLOSERS.contains(&chars[j].1) {
                j += 1;
            }
            let end = match chars.get(j) {
                None => text.len(),
                Some(&(next_pos, next)) if next.is_whitespace() => next_pos,
                Some(_) => {
                    i = j;
                    continue;
                }
            };

            let candidate = &text[start..pos + c.len_utf8()];
            if c != '.' || !self.is_non_terminal(candidate, exceptions) {
                push_sentence(&mut sentences, &text[start..end]);
                start = end;
            }
            i = j;
        }
        push_sentence(&mut sentences, &text[start..]);
        sentences
    }

    /// Whether the period closing `candidate` belongs to its last word.
    fn is_non_terminal(&self, candidate: &str, exceptions: &ExceptionTable) -> bool {
        let mut words = candidate.split_whitespace().rev();
        let Some(last) = words.next() else {
            return false;
        };
        if exceptions.contains(last) {
            return true;
        }
        if let Some(prev) = words.next()
            && exceptions.contains(&format!("{prev} {last}"))
        {
            return true;
        }

        let bare = last.trim_start_matches(|c: char| !c.is_alphanumeric());
        if self.abbreviations.contains(&bare.to_lowercase()) {
            return true;
        }
        let mut letters = bare.chars();
        if let (Some(initial), Some('.'), None) = (letters.next(), letters.next(), letters.next())
            && initial.is_uppercase()
        {
            return true;
        }
        DOTTED_ACRONYM.is_match(bare)
    }
}

impl SentenceSegmenter for RuleSegmenter {
    fn segment(&self, text: &str, exceptions: &ExceptionTable) -> Result<Vec<String>, SegmentError> {
        let sentences = self.split(text, exceptions);
        tracing::trace!(sentences = sentences.len(), "segmented text");
        Ok(sentences)
    }
}

fn push_sentence(sentences: &mut Vec<String>, span: &str) {
    let trimmed = span.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}
