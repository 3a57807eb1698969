//! Diacritic-insensitive matching for Arabic script.
//!
//! Arabic text in the wild is inconsistently vocalised: the same word may
//! appear bare (`حدثنا`), fully vocalised (`حَدَّثَنَا`), or with a different
//! hamza seat on the alef (`أخبرنا` vs `اخبرنا`). Rule authors should not have
//! to spell out every variant.
//!
//! ## Equivalences
//!
//! ```text
//! Diacritics (skipped):  U+064B..=U+0652   ً ٌ ٍ َ ُ ِ ّ ْ
//! Alef forms:            ا أ إ آ
//! Ta marbuta / ha:       ة ه
//! Alef maqsura / ya:     ى ي
//! ```
//!
//! [`make_diacritic_insensitive`] turns a literal into a regex fragment where
//! every letter becomes `[class][marks]*`. For hot loops over very large
//! buffers, [`match_literal_prefix`] does the same comparison without a regex
//! at all, walking content and literal in lock-step.

use unicode_normalization::UnicodeNormalization;

/// Regex class of the eight combining marks treated as optional.
pub const DIACRITIC_CLASS: &str = r"[\x{064B}-\x{0652}]";

const EQUIVALENCE_GROUPS: [&[char]; 3] = [
    &['ا', 'أ', 'إ', 'آ'],
    &['ة', 'ه'],
    &['ى', 'ي'],
];

/// Characters that make a token fragment more than a list of literals.
const REGEX_META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '[', ']', '{', '}', '^', '$',
];

/// Whether `ch` is one of the eight skippable combining marks.
#[must_use]
pub fn is_diacritic(ch: char) -> bool {
    ('\u{064B}'..='\u{0652}').contains(&ch)
}

fn group_of(ch: char) -> Option<&'static [char]> {
    EQUIVALENCE_GROUPS
        .iter()
        .copied()
        .find(|group| group.contains(&ch))
}

/// The canonical representative of `ch`'s equivalence group.
///
/// Characters outside every group are their own key.
#[must_use]
pub fn equivalence_key(ch: char) -> char {
    group_of(ch).map_or(ch, |group| group[0])
}

/// Append the fuzzy fragment for one (non-diacritic, non-space) character.
pub(crate) fn push_fuzzy_char(out: &mut String, ch: char) {
    match group_of(ch) {
        Some(group) => {
            out.push('[');
            out.extend(group.iter());
            out.push(']');
        }
        None => {
            let mut buf = [0u8; 4];
            out.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
        }
    }
    out.push_str(DIACRITIC_CLASS);
    out.push('*');
}

/// Build a regex fragment matching `text` regardless of vocalisation and
/// letterform variants.
///
/// The input is NFC-normalised and trimmed, its own diacritics are dropped,
/// and whitespace runs become `\s+`. Everything else is regex-escaped.
///
/// ```rust
/// use regex::Regex;
/// use tabwib::make_diacritic_insensitive;
///
/// let re = Regex::new(&format!("^{}$", make_diacritic_insensitive("أخبرنا"))).unwrap();
/// assert!(re.is_match("اَخْبَرَنَا"));
/// assert!(!re.is_match("حدثنا"));
/// ```
#[must_use]
pub fn make_diacritic_insensitive(text: &str) -> String {
    let normalized: String = text.nfc().collect();
    let mut out = String::with_capacity(normalized.len() * 12);
    let mut in_space = false;

    for ch in normalized.trim().chars().filter(|c| !is_diacritic(*c)) {
        if ch.is_whitespace() {
            if !in_space {
                out.push_str(r"\s+");
            }
            in_space = true;
            continue;
        }
        in_space = false;
        push_fuzzy_char(&mut out, ch);
    }

    out
}

/// Fuzz the literal letters of a pattern that may also contain regex syntax.
///
/// Backslash escapes (including `\p{..}` classes) are copied untouched, as is
/// every non-letter. Letters followed by a quantifier are grouped so the
/// quantifier still applies to the whole letter.
pub(crate) fn fuzz_pattern_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 8);
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            out.push(ch);
            if let Some(escaped) = chars.next() {
                out.push(escaped);
                if matches!(escaped, 'p' | 'P') && chars.peek() == Some(&'{') {
                    for c in chars.by_ref() {
                        out.push(c);
                        if c == '}' {
                            break;
                        }
                    }
                }
            }
            continue;
        }
        if is_diacritic(ch) {
            continue;
        }
        if ch.is_alphabetic() {
            let quantified = matches!(chars.peek(), Some('*' | '+' | '?' | '{'));
            if quantified {
                out.push_str("(?:");
            }
            push_fuzzy_char(&mut out, ch);
            if quantified {
                out.push(')');
            }
            continue;
        }
        out.push(ch);
    }

    out
}

/// Split `fragment` into its alternatives when it is nothing but literals
/// joined by `|`.
///
/// Returns `None` as soon as any regex metacharacter appears, or when an
/// alternative is empty.
#[must_use]
pub fn literal_alternatives(fragment: &str) -> Option<Vec<&str>> {
    if fragment.is_empty() || fragment.contains(REGEX_META) {
        return None;
    }
    let alternatives: Vec<&str> = fragment.split('|').collect();
    if alternatives.iter().any(|alt| alt.is_empty()) {
        return None;
    }
    Some(alternatives)
}

/// Match `literal` against `content` starting exactly at byte `offset`.
///
/// Letters are compared by [`equivalence_key`] and any marks following a
/// matched letter in the content are consumed with it. A mark anywhere else
/// (before the first letter, after whitespace) is a mismatch, as it is for
/// the pattern [`make_diacritic_insensitive`] builds. A whitespace run in
/// the literal matches one or more whitespace characters. Returns the byte offset just past the match, or `None` on the first
/// mismatch.
///
/// ```rust
/// use tabwib::match_literal_prefix;
///
/// let content = "x\nحَدَّثَنَا مالك";
/// let end = match_literal_prefix(content, 2, "حدثنا").unwrap();
/// assert_eq!(&content[2..end], "حَدَّثَنَا");
/// assert_eq!(match_literal_prefix(content, 2, "أخبرنا"), None);
/// ```
#[must_use]
pub fn match_literal_prefix(content: &str, offset: usize, literal: &str) -> Option<usize> {
    let rest = content.get(offset..)?;
    let mut iter = rest.char_indices().peekable();
    let mut end = 0;
    let mut matched_any = false;
    let mut lits = literal.chars().filter(|c| !is_diacritic(*c)).peekable();

    while let Some(lit) = lits.next() {
        if lit.is_whitespace() {
            while lits.next_if(|c| c.is_whitespace()).is_some() {}
            let mut seen = false;
            while let Some((i, c)) = iter.next_if(|&(_, c)| c.is_whitespace()) {
                end = i + c.len_utf8();
                seen = true;
            }
            if !seen {
                return None;
            }
            continue;
        }

        let (i, c) = iter.next()?;
        if equivalence_key(c) != equivalence_key(lit) {
            return None;
        }
        end = i + c.len_utf8();
        matched_any = true;
        // Marks belong to the letter before them.
        while let Some((i, c)) = iter.next_if(|&(_, c)| is_diacritic(c)) {
            end = i + c.len_utf8();
        }
    }

    matched_any.then_some(offset + end)
}
