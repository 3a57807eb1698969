//! Rule → regex compilation.
//!
//! Every rule becomes a single multi-line regex. The list shapes wrap their
//! alternatives:
//!
//! ```text
//! lineStartsWith  ["a", "b"]   (?m)^(?:a|b)
//! lineStartsAfter ["a", "b"]   (?m)^(?:a|b)(?P<__body>.*)
//! lineEndsWith    ["a", "b"]   (?m)(?:a|b)$
//! template        "x"          (?m)x
//! regex           "x"          (?m)x          (no escaping, no tokens)
//! ```
//!
//! In templates and list patterns, `(`, `)`, `[` and `]` outside `{{...}}`
//! are escaped, so authors can write literal brackets as-is. The trailing
//! `__body` group of `lineStartsAfter` marks where the marker ends. Inside
//! the segmenter's combined alternation the group is left out: the match
//! end already marks it, and `.*` would hide later matches on the line.
//!
//! ## Fuzzy resolution
//!
//! A rule's `fuzzy` flag wins when set. Otherwise the rule is fuzzy exactly
//! when one of its patterns uses a fuzzy-default token (`bab`, `naql`, ...).

use regex::Regex;

use crate::fuzzy::literal_alternatives;
use crate::tokens::{Expander, TokenTable};
use crate::{Error, Result, Rule, RulePattern};

/// Name of the group holding the text after a `lineStartsAfter` marker.
pub(crate) const BODY_GROUP: &str = "__body";

/// A rule compiled to a regex plus capture metadata.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// The compiled pattern.
    pub regex: Regex,
    /// Whether the regex has any capturing group.
    pub uses_capture: bool,
    /// Names of the capture groups surfaced as metadata.
    pub capture_names: Vec<String>,
    /// Whether the marker is excluded from segment content.
    pub uses_line_starts_after: bool,
    /// Whether fuzzy matching was applied.
    pub fuzzy: bool,
}

/// Uncompiled regex source for one rule.
#[derive(Debug, Clone)]
pub(crate) struct RuleSource {
    pub source: String,
    pub capture_names: Vec<String>,
    pub uses_line_starts_after: bool,
    pub fuzzy: bool,
}

/// Compiles rules and templates against a token table.
///
/// ```rust
/// use tabwib::{PatternCompiler, Rule};
///
/// let compiler = PatternCompiler::default();
/// let compiled = compiler
///     .compile_rule(&Rule::line_starts_after(["{{raqms:num}} {{dash}} "]))
///     .unwrap();
/// let caps = compiled.regex.captures("٣٤ - نص").unwrap();
/// assert_eq!(&caps["num"], "٣٤");
/// assert_eq!(compiled.capture_names, vec!["num"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PatternCompiler {
    tokens: TokenTable,
}

impl PatternCompiler {
    /// A compiler using `tokens`.
    #[must_use]
    pub fn new(tokens: TokenTable) -> Self {
        Self { tokens }
    }

    /// The token table in use.
    #[must_use]
    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    /// Whether `rule` is matched fuzzily.
    #[must_use]
    pub fn resolve_fuzzy(&self, rule: &Rule) -> bool {
        rule.fuzzy.unwrap_or_else(|| match &rule.pattern {
            RulePattern::Regex(_) => false,
            pattern => pattern
                .patterns()
                .iter()
                .any(|p| self.tokens.uses_fuzzy_default(p)),
        })
    }

    /// Compile one rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] when the resulting regex does not
    /// compile, and [`Error::EmptyPatternList`] for a list-shaped rule without
    /// patterns.
    pub fn compile_rule(&self, rule: &Rule) -> Result<CompiledRule> {
        if rule.pattern.is_list() && rule.pattern.patterns().is_empty() {
            return Err(Error::EmptyPatternList {
                field: rule.pattern.kind().as_str(),
            });
        }
        let source = self.rule_source(rule, "");
        let regex = if source.uses_line_starts_after {
            build_regex(&format!("{}(?P<{BODY_GROUP}>.*)", source.source))?
        } else {
            build_regex(&source.source)?
        };
        let capture_names = match rule.pattern {
            RulePattern::Regex(_) => regex.capture_names().flatten().map(str::to_string).collect(),
            _ => source.capture_names,
        };
        Ok(CompiledRule {
            uses_capture: regex.captures_len() > 1,
            regex,
            capture_names,
            uses_line_starts_after: source.uses_line_starts_after,
            fuzzy: source.fuzzy,
        })
    }

    /// Regex source for `rule`, with `prefix` prepended to its group names.
    ///
    /// A `lineStartsAfter` source covers the marker only.
    pub(crate) fn rule_source(&self, rule: &Rule, prefix: &str) -> RuleSource {
        let fuzzy = self.resolve_fuzzy(rule);
        let mut expander = Expander::new(&self.tokens, fuzzy, prefix);
        let mut alternatives = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| expander.expand_one(&escape_template_brackets(p)))
                .collect::<Vec<_>>()
                .join("|")
        };

        let (source, uses_line_starts_after) = match &rule.pattern {
            RulePattern::Regex(raw) => (raw.clone(), false),
            RulePattern::Template(template) => (alternatives(std::slice::from_ref(template)), false),
            RulePattern::LineStartsWith(ps) => (format!("^(?:{})", alternatives(ps)), false),
            RulePattern::LineStartsAfter(ps) => (format!("^(?:{})", alternatives(ps)), true),
            RulePattern::LineEndsWith(ps) => (format!("(?:{})$", alternatives(ps)), false),
        };

        RuleSource {
            source,
            capture_names: expander.finish(),
            uses_line_starts_after,
            fuzzy,
        }
    }

    /// Compile a template (breakpoints, `skipWhen`, guards).
    ///
    /// `fuzzy: None` decides from the tokens used, as for rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] when the expansion does not compile.
    pub fn compile_template(&self, template: &str, fuzzy: Option<bool>) -> Result<Regex> {
        build_regex(&self.expand_template(template, fuzzy))
    }

    /// Compile a raw regex with the same flags rules get.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] when `pattern` does not compile.
    pub fn compile_regex(&self, pattern: &str) -> Result<Regex> {
        build_regex(pattern)
    }

    /// Compile a page-start guard: the template must match one whole character.
    pub(crate) fn compile_guard(&self, template: &str) -> Result<Regex> {
        let body = self.expand_template(template, None);
        Regex::new(&format!("^(?:{body})$")).map_err(|source| Error::InvalidPattern {
            pattern: template.to_string(),
            source,
        })
    }

    fn expand_template(&self, template: &str, fuzzy: Option<bool>) -> String {
        let fuzzy = fuzzy.unwrap_or_else(|| self.tokens.uses_fuzzy_default(template));
        Expander::new(&self.tokens, fuzzy, "").expand_one(&escape_template_brackets(template))
    }

    /// The literal alternatives of a rule that can skip the regex engine:
    /// a fuzzy line-start rule whose only pattern is one literal token.
    pub(crate) fn fast_fuzzy_literals(&self, rule: &Rule) -> Option<Vec<String>> {
        let patterns = match &rule.pattern {
            RulePattern::LineStartsWith(ps) | RulePattern::LineStartsAfter(ps) => ps,
            _ => return None,
        };
        let [only] = patterns.as_slice() else {
            return None;
        };
        if !self.resolve_fuzzy(rule) {
            return None;
        }
        let name = self.tokens.sole_token(only)?;
        let fragment = self.tokens.fragment(name)?;
        let mut literals: Vec<String> = literal_alternatives(fragment)?
            .into_iter()
            .map(str::to_string)
            .collect();
        // Match the regex's leftmost-first choice: declared order is kept.
        literals.dedup();
        Some(literals)
    }
}

fn build_regex(source: &str) -> Result<Regex> {
    Regex::new(&format!("(?m){source}")).map_err(|source_err| Error::InvalidPattern {
        pattern: source.to_string(),
        source: source_err,
    })
}

/// Escape `()[]` outside `{{...}}` spans. Existing backslash escapes are
/// kept as written.
pub(crate) fn escape_template_brackets(template: &str) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;

    while let Some(ch) = rest.chars().next() {
        if rest.starts_with("{{") {
            if let Some(close) = rest.find("}}") {
                out.push_str(&rest[..close + 2]);
                rest = &rest[close + 2..];
                continue;
            }
        }
        if ch == '\\' {
            let escaped_len = rest[1..].chars().next().map_or(0, char::len_utf8);
            out.push_str(&rest[..1 + escaped_len]);
            rest = &rest[1 + escaped_len..];
            continue;
        }
        if matches!(ch, '(' | ')' | '[' | ']') {
            out.push('\\');
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    out
}
