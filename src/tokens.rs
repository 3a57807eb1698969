//! Token templates: named placeholders that expand to regex fragments.
//!
//! Rule authors rarely want to write raw regular expressions for Arabic
//! structural markers. Instead they write templates:
//!
//! ```text
//! "{{raqms:num}} {{dash}} "     a numbered entry, capturing the number
//! "{{bab}} "                    a chapter heading
//! "{{naql}}"                    any narrator-chain opener
//! ```
//!
//! ## Placeholder forms
//!
//! | Form | Expands to |
//! |------|------------|
//! | `{{name}}` | the token's fragment (grouped when it has alternatives) |
//! | `{{name:cap}}` | the fragment inside a named group `cap` |
//! | `{{:cap}}` | a named group matching one or more characters |
//!
//! Unknown names are kept as literal text. Composite tokens (templates over
//! other tokens, like `numbered`) expand exactly one level deep.
//!
//! ## Repeated capture names
//!
//! Regex group names must be unique, so a name used twice is renamed in
//! first-seen order: `num`, `num_2`, `num_3`. The renamed list comes back
//! with the pattern.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::fuzzy::{fuzz_pattern_text, literal_alternatives, make_diacritic_insensitive};
use crate::{Error, Result};

const DEFAULT_TOKENS: &[(&str, &str)] = &[
    ("bab", "باب"),
    ("basmalah", "بسم الله|﷽"),
    ("bullet", "[•*°]"),
    ("dash", "[-–—ـ]"),
    ("fasl", "مسألة|فصل"),
    ("harf", "[أ-ي]"),
    ("harfs", r"[أ-ي](?:\s+[أ-ي])*"),
    ("kitab", "كتاب"),
    (
        "naql",
        "وحدثنا|وأخبرنا|وحدثني|حدثنيه|حدثنا|حدثني|أخبرنا|أخبرني|أنبأنا|سمعت",
    ),
    ("num", "[0-9]"),
    ("nums", "[0-9]+"),
    ("raqm", r"[\x{0660}-\x{0669}]"),
    ("raqms", r"[\x{0660}-\x{0669}]+"),
    (
        "rumuz",
        "خت|خد|بخ|مد|قد|كد|تم|سي|عس|فق|صد|مق|خ|م|د|ت|س|ق|ع",
    ),
    ("tarqim", "[.!?؟؛]"),
];

const DEFAULT_COMPOSITES: &[(&str, &str)] = &[("numbered", "{{raqms}} {{dash}} ")];

const DEFAULT_FUZZY: &[&str] = &["bab", "basmalah", "fasl", "kitab", "naql"];

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{([A-Za-z0-9_]*)(?::([A-Za-z_][A-Za-z0-9_]*))?\}\}")
            .expect("placeholder regex is valid")
    })
}

/// The token dictionary: token name → regex fragment.
///
/// The default table covers common Arabic book structure (chapter words,
/// narrator phrases, Arabic-Indic numerals, dashes, punctuation). Extend it
/// with [`TokenTable::with_tokens`]; the defaults themselves never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTable {
    tokens: BTreeMap<String, String>,
    composites: BTreeMap<String, String>,
    fuzzy_defaults: BTreeSet<String>,
}

impl TokenTable {
    /// The built-in dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tokens: DEFAULT_TOKENS
                .iter()
                .map(|&(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            composites: DEFAULT_COMPOSITES
                .iter()
                .map(|&(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fuzzy_defaults: DEFAULT_FUZZY.iter().map(|&k| k.to_string()).collect(),
        }
    }

    /// A copy of this table overlaid with custom tokens.
    ///
    /// A value that itself contains `{{...}}` placeholders becomes a
    /// composite token; anything else is a plain fragment. Overlay entries
    /// replace same-named defaults.
    ///
    /// ```rust
    /// use tabwib::{expand_tokens, TokenTable};
    ///
    /// let table = TokenTable::new().with_tokens([("juz", "جزء")]);
    /// assert_eq!(expand_tokens("{{juz}} ", &table).pattern, "جزء ");
    /// ```
    #[must_use]
    pub fn with_tokens<I, K, V>(mut self, overlay: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in overlay {
            let (name, value) = (name.into(), value.into());
            if placeholder_regex().is_match(&value) {
                self.tokens.remove(&name);
                self.composites.insert(name, value);
            } else {
                self.composites.remove(&name);
                self.tokens.insert(name, value);
            }
        }
        self
    }

    /// The fragment for a plain token.
    #[must_use]
    pub fn fragment(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }

    /// The template for a composite token.
    #[must_use]
    pub fn composite(&self, name: &str) -> Option<&str> {
        self.composites.get(name).map(String::as_str)
    }

    /// Whether rules using this token default to fuzzy matching.
    #[must_use]
    pub fn is_fuzzy_default(&self, name: &str) -> bool {
        self.fuzzy_defaults.contains(name)
    }

    /// Whether `template` references any fuzzy-default token.
    #[must_use]
    pub fn uses_fuzzy_default(&self, template: &str) -> bool {
        placeholder_regex()
            .captures_iter(template)
            .any(|caps| caps.get(1).is_some_and(|m| self.is_fuzzy_default(m.as_str())))
    }

    /// If `template` is exactly one placeholder with no capture, its name.
    pub(crate) fn sole_token<'t>(&self, template: &'t str) -> Option<&'t str> {
        let caps = placeholder_regex().captures(template)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != template.len() || caps.get(2).is_some() {
            return None;
        }
        caps.get(1).map(|m| m.as_str()).filter(|name| !name.is_empty())
    }
}

impl Default for TokenTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The result of expanding a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// The regex source.
    pub pattern: String,
    /// Capture group names in order of appearance, after deduplication.
    pub capture_names: Vec<String>,
}

/// Expand the placeholders of `template` without fuzzy matching.
///
/// ```rust
/// use tabwib::{expand_tokens, TokenTable};
///
/// let out = expand_tokens("{{raqms:n}}/{{raqms:n}}", &TokenTable::new());
/// assert_eq!(out.capture_names, vec!["n", "n_2"]);
/// ```
#[must_use]
pub fn expand_tokens(template: &str, table: &TokenTable) -> Expansion {
    Expander::new(table, false, "").expand(template)
}

/// Template expansion state for one pattern.
pub(crate) struct Expander<'t> {
    table: &'t TokenTable,
    fuzzy: bool,
    prefix: &'t str,
    seen: HashMap<String, usize>,
    names: Vec<String>,
}

impl<'t> Expander<'t> {
    /// `prefix` is prepended to every group name in the emitted regex (but not
    /// to the returned capture names).
    pub(crate) fn new(table: &'t TokenTable, fuzzy: bool, prefix: &'t str) -> Self {
        Self {
            table,
            fuzzy,
            prefix,
            seen: HashMap::new(),
            names: Vec::new(),
        }
    }

    /// Expand one template. Capture names accumulate across calls, so the
    /// alternatives of one rule share a single namespace.
    pub(crate) fn expand_one(&mut self, template: &str) -> String {
        self.expand_at(template, 0)
    }

    pub(crate) fn finish(self) -> Vec<String> {
        self.names
    }

    fn expand(mut self, template: &str) -> Expansion {
        let pattern = self.expand_one(template);
        Expansion {
            pattern,
            capture_names: self.names,
        }
    }

    fn expand_at(&mut self, template: &str, depth: usize) -> String {
        let mut out = String::with_capacity(template.len() * 2);
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            self.push_literal(&mut out, &template[last..whole.start()]);
            last = whole.end();

            let name = caps.get(1).map_or("", |m| m.as_str());
            let capture = caps.get(2).map(|m| m.as_str());

            if name.is_empty() {
                match capture {
                    Some(cap) => {
                        let group = self.register(cap);
                        let _ = write!(out, "(?P<{}{group}>.+)", self.prefix);
                    }
                    None => out.push_str(&regex::escape(whole.as_str())),
                }
                continue;
            }

            if let Some(inner) = self.table.composite(name).filter(|_| depth == 0) {
                let expanded = self.expand_at(inner, depth + 1);
                self.push_group(&mut out, &expanded, capture, true);
            } else if let Some(fragment) = self.table.fragment(name) {
                let fragment = if self.fuzzy {
                    fuzz_fragment(fragment)
                } else {
                    fragment.to_string()
                };
                let grouped = fragment.contains('|');
                self.push_group(&mut out, &fragment, capture, grouped);
            } else {
                out.push_str(&regex::escape(whole.as_str()));
            }
        }

        self.push_literal(&mut out, &template[last..]);
        out
    }

    fn push_literal(&self, out: &mut String, text: &str) {
        if self.fuzzy {
            out.push_str(&fuzz_pattern_text(text));
        } else {
            out.push_str(text);
        }
    }

    fn push_group(&mut self, out: &mut String, body: &str, capture: Option<&str>, grouped: bool) {
        match capture {
            Some(cap) => {
                let group = self.register(cap);
                let _ = write!(out, "(?P<{}{group}>{body})", self.prefix);
            }
            None if grouped => {
                let _ = write!(out, "(?:{body})");
            }
            None => out.push_str(body),
        }
    }

    fn register(&mut self, name: &str) -> String {
        let count = self.seen.entry(name.to_string()).or_insert(0);
        loop {
            *count += 1;
            let candidate = if *count == 1 {
                name.to_string()
            } else {
                format!("{name}_{count}")
            };
            if !self.names.contains(&candidate) {
                self.names.push(candidate.clone());
                return candidate;
            }
        }
    }
}

/// Fuzzy form of a token fragment: literal alternations are expanded letter
/// by letter, anything containing regex syntax is left alone.
fn fuzz_fragment(fragment: &str) -> String {
    match literal_alternatives(fragment) {
        Some(alternatives) => alternatives
            .iter()
            .map(|alt| make_diacritic_insensitive(alt))
            .collect::<Vec<_>>()
            .join("|"),
        None => fragment.to_string(),
    }
}

/// A run of sample text: either plain text or a recognised token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPiece<'a> {
    /// Text no requested token matched.
    Literal(&'a str),
    /// Text matched by a token.
    Token {
        /// The token name.
        name: String,
        /// The matched text.
        text: &'a str,
    },
}

/// Split sample `text` into token matches and the literal text between them.
///
/// Only the tokens listed in `names` are looked for; unknown names are
/// ignored. With `fuzzy`, literal-alternation tokens match regardless of
/// diacritics and letterform variants.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] if a (custom) token fragment does not
/// compile.
pub fn tokenize<'a>(
    text: &'a str,
    table: &TokenTable,
    names: &[&str],
    fuzzy: bool,
) -> Result<Vec<TextPiece<'a>>> {
    let known: Vec<(&str, String)> = names
        .iter()
        .filter_map(|&name| {
            let fragment = table.fragment(name)?;
            let fragment = if fuzzy {
                fuzz_fragment(fragment)
            } else {
                fragment.to_string()
            };
            Some((name, fragment))
        })
        .collect();

    if known.is_empty() || text.is_empty() {
        return Ok(if text.is_empty() {
            vec![]
        } else {
            vec![TextPiece::Literal(text)]
        });
    }

    let source = known
        .iter()
        .enumerate()
        .map(|(i, (_, fragment))| format!("(?P<t{i}>{fragment})"))
        .collect::<Vec<_>>()
        .join("|");
    let re = Regex::new(&source).map_err(|source_err| Error::InvalidPattern {
        pattern: source.clone(),
        source: source_err,
    })?;

    let mut pieces = Vec::new();
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.is_empty() {
            continue;
        }
        let Some(index) = (0..known.len()).find(|i| caps.name(&format!("t{i}")).is_some()) else {
            continue;
        };
        if whole.start() > last {
            pieces.push(TextPiece::Literal(&text[last..whole.start()]));
        }
        pieces.push(TextPiece::Token {
            name: known[index].0.to_string(),
            text: whole.as_str(),
        });
        last = whole.end();
    }
    if last < text.len() {
        pieces.push(TextPiece::Literal(&text[last..]));
    }

    Ok(pieces)
}

/// Render tokenized pieces back into a template string.
///
/// Regex metacharacters in literal runs are escaped, except brackets and
/// parentheses, which templates escape on their own.
///
/// ```rust
/// use tabwib::{templatize, tokenize, TokenTable};
///
/// let table = TokenTable::new();
/// let pieces = tokenize("باب ٣ - الطهارة", &table, &["bab", "raqms", "dash"], false).unwrap();
/// assert_eq!(templatize(&pieces), "{{bab}} {{raqms}} {{dash}} الطهارة");
/// ```
#[must_use]
pub fn templatize(pieces: &[TextPiece<'_>]) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            TextPiece::Literal(text) => {
                for ch in text.chars() {
                    if matches!(ch, '.' | '*' | '+' | '?' | '^' | '$' | '|' | '{' | '}' | '\\') {
                        out.push('\\');
                    }
                    out.push(ch);
                }
            }
            TextPiece::Token { name, .. } => {
                let _ = write!(out, "{{{{{name}}}}}");
            }
        }
    }
    out
}
