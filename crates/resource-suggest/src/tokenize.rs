/// Splits assessment text into normalized match tokens.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::assessment::extract_texts;
use crate::model::AssessmentDocument;

pub const MIN_TOKEN_CHARS: usize = 2;
pub const MAX_TOKEN_CHARS: usize = 20;

// Whitespace (incl. ideographic space), ASCII and full-width punctuation, brackets.
static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s、。,.，．；;:：/()（）「」『』【】\[\]［］{}｛｝]+").expect("valid regex")
});

/// Lowercased, deduplicated tokens of `text` whose length is within
/// `MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS`. Length is counted in UTF-16 code
/// units, so a character outside the BMP (most emoji) counts as two.
pub fn extract_tokens(text: &str) -> HashSet<String> {
    SEPARATORS
        .split(text)
        .map(str::to_lowercase)
        .filter(|t| (MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&t.encode_utf16().count()))
        .collect()
}

/// Token set for a whole assessment document.
pub fn tokenize_assessment(doc: Option<&AssessmentDocument>) -> HashSet<String> {
    extract_tokens(&extract_texts(doc).join(" "))
}
