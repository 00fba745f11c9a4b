//! Sentence-preserving excerpts of long article bodies.
//!
//! [`truncate`] keeps the opening and closing sentences of a body so that each
//! side holds roughly half of the character limit. Sentence boundaries come
//! from a [`SentenceSplitter`]; [`RuleSplitter`] is the English rule-based
//! default. Lengths are counted in `char`s, never bytes.

/// Splits text into sentences, returned as trimmed slices of the input.
pub trait SentenceSplitter {
    fn split<'t>(&self, text: &'t str) -> Vec<&'t str>;
}

/// Words that end with a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "mt", "vs", "no", "gov", "sen", "rep",
    "gen", "col", "lt", "sgt", "capt", "supt", "u.s", "e.g", "i.e", "jan", "feb", "aug", "sept",
    "oct", "nov", "dec",
];

/// Rule-based English sentence splitter.
///
/// A sentence ends at `.`, `!` or `?` (plus any closing quotes or brackets)
/// followed by whitespace. A period does not end a sentence after a known
/// abbreviation, after a single-letter initial, or when the next word starts
/// lowercase. Decimal numbers never split because no whitespace follows the
/// point.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSplitter;

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}')
}

fn ends_with_abbreviation(segment: &str) -> bool {
    let word = segment
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if word.chars().count() == 1 && word.chars().all(char::is_alphabetic) {
        return true;
    }
    ABBREVIATIONS.contains(&word.as_str())
}

impl SentenceSplitter for RuleSplitter {
    fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut chars = text.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }
            let mut end = i + c.len_utf8();
            while let Some(&(j, next)) = chars.peek() {
                if is_closing(next) || matches!(next, '.' | '!' | '?') {
                    end = j + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }

            let rest = &text[end..];
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            if c == '.' {
                if ends_with_abbreviation(&text[start..i]) {
                    continue;
                }
                let next_word = rest.trim_start();
                if next_word.starts_with(char::is_lowercase) {
                    continue;
                }
            }

            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }

        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
        sentences
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Whether a body is too short to be worth scoring.
pub fn too_short(text: &str, min_length: usize) -> bool {
    char_len(text) < min_length
}

/// Reduce `text` to about `max_length` characters, keeping whole sentences from
/// the front and the back.
///
/// The front window takes sentences until it holds at least half the limit;
/// the back window then takes sentences from the end, never crossing into the
/// front window, until it also holds half. When the two windows meet, or the
/// text already fits, the input is returned unchanged.
pub fn truncate(text: &str, max_length: usize, splitter: &impl SentenceSplitter) -> String {
    if char_len(text) <= max_length {
        return text.to_string();
    }
    let sentences = splitter.split(text);

    // Window lengths count one joining space per sentence.
    let mut front_len = 0;
    let mut front_end = 0;
    for sentence in &sentences {
        front_len += char_len(sentence) + 1;
        front_end += 1;
        if front_len * 2 >= max_length {
            break;
        }
    }

    let mut back_len = 0;
    let mut back_start = sentences.len();
    while back_start > front_end {
        back_start -= 1;
        back_len += char_len(sentences[back_start]) + 1;
        if back_len * 2 >= max_length {
            break;
        }
    }

    if back_start == front_end {
        return text.to_string();
    }

    let front = sentences[..front_end].join(" ");
    let back = sentences[back_start..].join(" ");
    format!("{front} {back}")
}

/// Length limits applied when abridging a scraped corpus.
#[derive(Debug, Clone, Copy)]
pub struct TextLimits {
    pub min_length: usize,
    pub max_length: usize,
}

impl TextLimits {
    /// `None` for bodies below the minimum, otherwise the truncated body.
    pub fn abridge(&self, body: &str, splitter: &impl SentenceSplitter) -> Option<String> {
        if too_short(body, self.min_length) {
            None
        } else {
            Some(truncate(body, self.max_length, splitter))
        }
    }
}
