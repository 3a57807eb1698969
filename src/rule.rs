//! Declarative split rules and breakpoints.
//!
//! A [`Rule`] says where a new segment starts: at a heading, a numbered
//! entry, a narrator phrase. A [`Breakpoint`] says where an oversized segment
//! may be cut when it has to be rebalanced.
//!
//! Both deserialize from the JSON shape rule authors write:
//!
//! ```json
//! { "lineStartsAfter": ["{{raqms:num}} {{dash}} "], "meta": { "type": "hadith" } }
//! { "lineStartsWith": ["{{bab}} "], "min": 10, "exclude": [12, [40, 44]] }
//! "{{tarqim}}\\s*"
//! { "pattern": "\\n", "skipWhen": "^{{basmalah}}" }
//! ```
//!
//! In Rust the pattern shape is an enum, so "exactly one pattern field" only
//! needs checking at the deserialization boundary.

use serde::{Deserialize, Serialize};

use crate::{Error, Meta, PageId};

/// Where a split lands relative to its match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPosition {
    /// The new segment starts at the match.
    #[default]
    At,
    /// The new segment starts right after the match.
    After,
}

/// Which matches of a rule are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occurrence {
    /// Only the earliest match in the document.
    First,
    /// Only the latest match in the document.
    Last,
    /// Every match.
    #[default]
    All,
}

/// A single page id or an inclusive id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRange {
    /// One page.
    Single(PageId),
    /// `[from, to]`, inclusive.
    Span(PageId, PageId),
}

impl PageRange {
    /// Whether `id` falls in this range.
    #[must_use]
    pub fn contains(&self, id: PageId) -> bool {
        match *self {
            Self::Single(page) => page == id,
            Self::Span(from, to) => (from..=to).contains(&id),
        }
    }
}

/// Page-id restrictions shared by rules and breakpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConstraints {
    /// Lowest page id (inclusive) where matches count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<PageId>,
    /// Highest page id (inclusive) where matches count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<PageId>,
    /// Pages where matches never count.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<PageRange>,
}

impl PageConstraints {
    /// Whether a match on page `id` is allowed.
    #[must_use]
    pub fn allows(&self, id: PageId) -> bool {
        self.min.map_or(true, |min| id >= min)
            && self.max.map_or(true, |max| id <= max)
            && !self.exclude.iter().any(|range| range.contains(id))
    }
}

/// The five rule pattern shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RulePattern {
    /// A raw regular expression, used as written.
    Regex(String),
    /// A token template, used as written after expansion.
    Template(String),
    /// Lines starting with any of these templates.
    LineStartsWith(Vec<String>),
    /// Lines starting with any of these templates; the marker itself is
    /// left out of the segment content.
    LineStartsAfter(Vec<String>),
    /// Lines ending with any of these templates.
    LineEndsWith(Vec<String>),
}

/// The name of a pattern shape, as used in rule documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternKind {
    /// `regex`
    Regex,
    /// `template`
    Template,
    /// `lineStartsWith`
    LineStartsWith,
    /// `lineStartsAfter`
    LineStartsAfter,
    /// `lineEndsWith`
    LineEndsWith,
}

impl PatternKind {
    /// The field name in rule documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Template => "template",
            Self::LineStartsWith => "lineStartsWith",
            Self::LineStartsAfter => "lineStartsAfter",
            Self::LineEndsWith => "lineEndsWith",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RulePattern {
    /// The shape of this pattern.
    #[must_use]
    pub const fn kind(&self) -> PatternKind {
        match self {
            Self::Regex(_) => PatternKind::Regex,
            Self::Template(_) => PatternKind::Template,
            Self::LineStartsWith(_) => PatternKind::LineStartsWith,
            Self::LineStartsAfter(_) => PatternKind::LineStartsAfter,
            Self::LineEndsWith(_) => PatternKind::LineEndsWith,
        }
    }

    /// The pattern strings, one for the single-pattern shapes.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        match self {
            Self::Regex(p) | Self::Template(p) => std::slice::from_ref(p),
            Self::LineStartsWith(ps) | Self::LineStartsAfter(ps) | Self::LineEndsWith(ps) => ps,
        }
    }

    /// Whether this is one of the list shapes the optimizer can merge.
    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(
            self,
            Self::LineStartsWith(_) | Self::LineStartsAfter(_) | Self::LineEndsWith(_)
        )
    }

    /// A pattern of the same shape holding `patterns`.
    pub(crate) fn with_patterns(&self, patterns: Vec<String>) -> Self {
        match self {
            Self::LineStartsWith(_) => Self::LineStartsWith(patterns),
            Self::LineStartsAfter(_) => Self::LineStartsAfter(patterns),
            Self::LineEndsWith(_) => Self::LineEndsWith(patterns),
            Self::Regex(_) | Self::Template(_) => self.clone(),
        }
    }
}

/// A split rule: a pattern plus modifiers.
///
/// ```rust
/// use tabwib::{Occurrence, Rule};
///
/// let rule = Rule::line_starts_with(["{{kitab}} "])
///     .with_occurrence(Occurrence::All)
///     .with_min(5)
///     .with_meta("type", "book");
/// assert_eq!(rule.pattern.patterns().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct Rule {
    /// The pattern shape and its strings.
    pub pattern: RulePattern,
    /// Where the split lands.
    pub split: SplitPosition,
    /// Which matches are kept.
    pub occurrence: Occurrence,
    /// Force fuzzy matching on or off; `None` decides from the tokens used.
    pub fuzzy: Option<bool>,
    /// Page restrictions.
    pub pages: PageConstraints,
    /// Static metadata attached to segments this rule starts.
    pub meta: Option<Meta>,
    /// A template the previous page's last non-whitespace character must
    /// match for a split landing exactly on a page start.
    pub page_start_guard: Option<String>,
}

impl Rule {
    /// A rule with default modifiers.
    #[must_use]
    pub fn new(pattern: RulePattern) -> Self {
        Self {
            pattern,
            split: SplitPosition::default(),
            occurrence: Occurrence::default(),
            fuzzy: None,
            pages: PageConstraints::default(),
            meta: None,
            page_start_guard: None,
        }
    }

    /// A raw-regex rule.
    #[must_use]
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new(RulePattern::Regex(pattern.into()))
    }

    /// A template rule.
    #[must_use]
    pub fn template(pattern: impl Into<String>) -> Self {
        Self::new(RulePattern::Template(pattern.into()))
    }

    /// A `lineStartsWith` rule.
    #[must_use]
    pub fn line_starts_with<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RulePattern::LineStartsWith(
            patterns.into_iter().map(Into::into).collect(),
        ))
    }

    /// A `lineStartsAfter` rule.
    #[must_use]
    pub fn line_starts_after<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RulePattern::LineStartsAfter(
            patterns.into_iter().map(Into::into).collect(),
        ))
    }

    /// A `lineEndsWith` rule.
    #[must_use]
    pub fn line_ends_with<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RulePattern::LineEndsWith(
            patterns.into_iter().map(Into::into).collect(),
        ))
    }

    /// Set the split position.
    #[must_use]
    pub fn with_split(mut self, split: SplitPosition) -> Self {
        self.split = split;
        self
    }

    /// Set the occurrence filter.
    #[must_use]
    pub fn with_occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Force fuzzy matching on or off.
    #[must_use]
    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = Some(fuzzy);
        self
    }

    /// Ignore matches before page `id`.
    #[must_use]
    pub fn with_min(mut self, id: PageId) -> Self {
        self.pages.min = Some(id);
        self
    }

    /// Ignore matches after page `id`.
    #[must_use]
    pub fn with_max(mut self, id: PageId) -> Self {
        self.pages.max = Some(id);
        self
    }

    /// Ignore matches on these pages.
    #[must_use]
    pub fn with_exclude(mut self, range: PageRange) -> Self {
        self.pages.exclude.push(range);
        self
    }

    /// Add a static metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta
            .get_or_insert_with(Meta::new)
            .insert(key.into(), value.into());
        self
    }

    /// Guard page-start splits on the previous page's last character.
    #[must_use]
    pub fn with_page_start_guard(mut self, guard: impl Into<String>) -> Self {
        self.page_start_guard = Some(guard.into());
        self
    }
}

/// Wire shape of a rule: every pattern field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_starts_with: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_starts_after: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_ends_with: Option<Vec<String>>,
    #[serde(default)]
    pub split: SplitPosition,
    #[serde(default)]
    pub occurrence: Occurrence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy: Option<bool>,
    #[serde(flatten)]
    pub pages: PageConstraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_start_guard: Option<String>,
}

impl RawRule {
    /// The rule's modifiers with every pattern field cleared.
    pub(crate) fn modifiers_only(mut self) -> Self {
        self.regex = None;
        self.template = None;
        self.line_starts_with = None;
        self.line_starts_after = None;
        self.line_ends_with = None;
        self
    }
}

fn non_empty(field: &'static str, patterns: Vec<String>) -> Result<Vec<String>, Error> {
    if patterns.is_empty() {
        Err(Error::EmptyPatternList { field })
    } else {
        Ok(patterns)
    }
}

impl TryFrom<RawRule> for Rule {
    type Error = Error;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let found = usize::from(raw.regex.is_some())
            + usize::from(raw.template.is_some())
            + usize::from(raw.line_starts_with.is_some())
            + usize::from(raw.line_starts_after.is_some())
            + usize::from(raw.line_ends_with.is_some());
        if found != 1 {
            return Err(Error::PatternFieldCount { found });
        }

        let pattern = if let Some(p) = raw.regex {
            RulePattern::Regex(p)
        } else if let Some(p) = raw.template {
            RulePattern::Template(p)
        } else if let Some(ps) = raw.line_starts_with {
            RulePattern::LineStartsWith(non_empty("lineStartsWith", ps)?)
        } else if let Some(ps) = raw.line_starts_after {
            RulePattern::LineStartsAfter(non_empty("lineStartsAfter", ps)?)
        } else if let Some(ps) = raw.line_ends_with {
            RulePattern::LineEndsWith(non_empty("lineEndsWith", ps)?)
        } else {
            return Err(Error::PatternFieldCount { found: 0 });
        };

        Ok(Self {
            pattern,
            split: raw.split,
            occurrence: raw.occurrence,
            fuzzy: raw.fuzzy,
            pages: raw.pages,
            meta: raw.meta,
            page_start_guard: raw.page_start_guard,
        })
    }
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        let mut raw = Self {
            split: rule.split,
            occurrence: rule.occurrence,
            fuzzy: rule.fuzzy,
            pages: rule.pages,
            meta: rule.meta,
            page_start_guard: rule.page_start_guard,
            ..Self::default()
        };
        match rule.pattern {
            RulePattern::Regex(p) => raw.regex = Some(p),
            RulePattern::Template(p) => raw.template = Some(p),
            RulePattern::LineStartsWith(ps) => raw.line_starts_with = Some(ps),
            RulePattern::LineStartsAfter(ps) => raw.line_starts_after = Some(ps),
            RulePattern::LineEndsWith(ps) => raw.line_ends_with = Some(ps),
        }
        raw
    }
}

/// A breakpoint pattern: a template or a raw regex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BreakpointPattern {
    /// A token template. The empty template means "page boundary".
    Template(String),
    /// A raw regular expression.
    Regex(String),
}

/// A place an oversized segment may be cut.
///
/// ```rust
/// use tabwib::Breakpoint;
///
/// let fallback = Breakpoint::page_boundary();
/// assert!(fallback.is_page_boundary());
///
/// let sentence: Breakpoint = "{{tarqim}}\\s*".into();
/// assert!(!sentence.is_page_boundary());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBreakpoint", into = "RawBreakpoint")]
pub struct Breakpoint {
    /// What to look for.
    pub pattern: BreakpointPattern,
    /// Where the cut lands; defaults to after the match.
    pub split: SplitPosition,
    /// Page restrictions on the cut position.
    pub pages: PageConstraints,
    /// Skip this breakpoint when this template matches the text under
    /// consideration.
    pub skip_when: Option<String>,
}

impl Breakpoint {
    /// A template breakpoint cutting after each match.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            pattern: BreakpointPattern::Template(template.into()),
            split: SplitPosition::After,
            pages: PageConstraints::default(),
            skip_when: None,
        }
    }

    /// A raw-regex breakpoint cutting after each match.
    #[must_use]
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: BreakpointPattern::Regex(pattern.into()),
            ..Self::new("")
        }
    }

    /// The page-boundary fallback (`""`).
    #[must_use]
    pub fn page_boundary() -> Self {
        Self::new("")
    }

    /// Whether this is the page-boundary fallback.
    #[must_use]
    pub fn is_page_boundary(&self) -> bool {
        matches!(&self.pattern, BreakpointPattern::Template(t) if t.is_empty())
    }

    /// Set the split position.
    #[must_use]
    pub fn with_split(mut self, split: SplitPosition) -> Self {
        self.split = split;
        self
    }

    /// Set page restrictions.
    #[must_use]
    pub fn with_pages(mut self, pages: PageConstraints) -> Self {
        self.pages = pages;
        self
    }

    /// Skip this breakpoint when `template` matches.
    #[must_use]
    pub fn with_skip_when(mut self, template: impl Into<String>) -> Self {
        self.skip_when = Some(template.into());
        self
    }
}

impl From<&str> for Breakpoint {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawBreakpoint {
    Template(String),
    Object(RawBreakpointObject),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBreakpointObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regex: Option<String>,
    #[serde(default = "default_breakpoint_split")]
    split: SplitPosition,
    #[serde(flatten)]
    pages: PageConstraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skip_when: Option<String>,
}

fn default_breakpoint_split() -> SplitPosition {
    SplitPosition::After
}

impl TryFrom<RawBreakpoint> for Breakpoint {
    type Error = Error;

    fn try_from(raw: RawBreakpoint) -> Result<Self, Self::Error> {
        let object = match raw {
            RawBreakpoint::Template(template) => return Ok(Self::new(template)),
            RawBreakpoint::Object(object) => object,
        };
        let pattern = match (object.pattern, object.regex) {
            (Some(template), None) => BreakpointPattern::Template(template),
            (None, Some(regex)) => BreakpointPattern::Regex(regex),
            (None, None) => return Err(Error::BreakpointFieldCount { found: 0 }),
            (Some(_), Some(_)) => return Err(Error::BreakpointFieldCount { found: 2 }),
        };
        Ok(Self {
            pattern,
            split: object.split,
            pages: object.pages,
            skip_when: object.skip_when,
        })
    }
}

impl From<Breakpoint> for RawBreakpoint {
    fn from(bp: Breakpoint) -> Self {
        let (pattern, regex) = match bp.pattern {
            BreakpointPattern::Template(t) => (Some(t), None),
            BreakpointPattern::Regex(r) => (None, Some(r)),
        };
        Self::Object(RawBreakpointObject {
            pattern,
            regex,
            split: bp.split,
            pages: bp.pages,
            skip_when: bp.skip_when,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_from_json() {
        let rule: Rule = serde_json::from_str(
            r#"{"lineStartsAfter": ["{{raqms:num}} {{dash}} "], "split": "at",
                "min": 3, "exclude": [5, [8, 9]], "meta": {"type": "hadith"}}"#,
        )
        .unwrap();
        assert_eq!(rule.pattern.kind(), PatternKind::LineStartsAfter);
        assert_eq!(rule.pages.min, Some(3));
        assert!(!rule.pages.allows(2));
        assert!(rule.pages.allows(3));
        assert!(!rule.pages.allows(5));
        assert!(!rule.pages.allows(9));
        assert!(rule.pages.allows(10));
        assert_eq!(rule.meta.unwrap()["type"], "hadith");
    }

    #[test]
    fn test_rule_requires_exactly_one_pattern() {
        let none = serde_json::from_str::<Rule>(r#"{"split": "after"}"#);
        assert!(none.unwrap_err().to_string().contains("found 0"));

        let two = serde_json::from_str::<Rule>(r#"{"regex": "a", "template": "b"}"#);
        assert!(two.unwrap_err().to_string().contains("found 2"));

        let empty = serde_json::from_str::<Rule>(r#"{"lineEndsWith": []}"#);
        assert!(empty.unwrap_err().to_string().contains("lineEndsWith"));
    }

    #[test]
    fn test_rule_round_trip_keeps_shape() {
        let rule = Rule::line_ends_with(["{{tarqim}}"])
            .with_split(SplitPosition::After)
            .with_page_start_guard("{{tarqim}}");
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["lineEndsWith"][0], "{{tarqim}}");
        assert_eq!(json["pageStartGuard"], "{{tarqim}}");
        assert!(json.get("min").is_none());
        let back: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_breakpoint_forms() {
        let bps: Vec<Breakpoint> = serde_json::from_str(
            r#"["", "{{tarqim}}", {"regex": "\\n\\n", "split": "at", "max": 20},
                {"pattern": "{{bullet}}", "skipWhen": "^x"}]"#,
        )
        .unwrap();
        assert!(bps[0].is_page_boundary());
        assert_eq!(bps[1].split, SplitPosition::After);
        assert_eq!(bps[2].pattern, BreakpointPattern::Regex("\\n\\n".into()));
        assert_eq!(bps[2].split, SplitPosition::At);
        assert_eq!(bps[2].pages.max, Some(20));
        assert_eq!(bps[3].skip_when.as_deref(), Some("^x"));
    }

    #[test]
    fn test_breakpoint_needs_one_pattern() {
        let err = serde_json::from_str::<Breakpoint>(r#"{"split": "at"}"#);
        assert!(err.is_err());
        let err = serde_json::from_str::<Breakpoint>(r#"{"pattern": "a", "regex": "b"}"#);
        assert!(err.is_err());
    }
}
