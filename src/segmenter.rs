//! Rule matching over the page buffer, and the segmenter front end.
//!
//! ## Pipeline
//!
//! ```text
//! pages ──► PageBuffer ──► rule matches ──► split points ──► raw segments
//!                                                                │
//!            Vec<Segment> ◄── render (joiner, from/to) ◄── breakpoint engine
//! ```
//!
//! ## Matching strategies
//!
//! | Rule shape                                   | Strategy                     |
//! |----------------------------------------------|------------------------------|
//! | fuzzy line-start rule on one literal token   | literal scan at line starts  |
//! | raw `regex` with capture groups              | its own regex pass           |
//! | everything else                              | one combined alternation     |
//!
//! The combined alternation wraps each rule in a named group `r{i}` and
//! prefixes the rule's own groups with `r{i}_`, so one pass over the buffer
//! tells which rule matched and what it captured.
//!
//! Matches are filtered by page constraints and page-start guards, reduced
//! by `occurrence`, and turned into split points. Two split points at the
//! same offset collapse into the one from the earlier rule.

use regex::{Captures, Regex};
use serde_json::{json, Value};

use crate::breakpoints::{BreakpointEngine, CompiledBreakpoint};
use crate::compile::PatternCompiler;
use crate::fuzzy::match_literal_prefix;
use crate::options::{DebugOptions, PageJoiner, Provenance, SegmentationOptions};
use crate::pages::PageBuffer;
use crate::rule::{Occurrence, SplitPosition};
use crate::tokens::TokenTable;
use crate::{Meta, Page, Result, Rule, RulePattern, Segment};

/// A cut produced by a rule match.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SplitPoint {
    /// Byte offset of the cut.
    pub index: usize,
    /// The rule that produced it.
    pub rule_index: usize,
    /// Bytes after `index` excluded from content (a stripped marker).
    pub content_start_offset: usize,
    pub meta: Option<Meta>,
}

/// A trimmed byte range of the buffer on its way to becoming a segment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawSegment {
    pub start: usize,
    pub end: usize,
    pub meta: Option<Meta>,
    /// The segment lost a `lineStartsAfter` marker at its start.
    pub stripped_marker: bool,
}

#[derive(Debug)]
struct RuleMatch {
    start: usize,
    end: usize,
    body_start: Option<usize>,
    captures: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum Strategy {
    Combined,
    Standalone { regex: Regex, captures: Vec<String> },
    Literal(Vec<String>),
}

#[derive(Debug, Clone)]
struct PreparedRule {
    rule: Rule,
    strategy: Strategy,
    guard: Option<Regex>,
}

#[derive(Debug, Clone)]
struct CombinedMember {
    rule_index: usize,
    group: usize,
    captures: Vec<(String, usize)>,
    /// The match ends where the rule's content begins.
    strips_marker: bool,
}

#[derive(Debug, Clone)]
struct CombinedMatcher {
    regex: Regex,
    members: Vec<CombinedMember>,
}

/// Compiled rules, ready to be run over any buffer.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuleSet {
    rules: Vec<PreparedRule>,
    combined: Option<CombinedMatcher>,
}

impl RuleSet {
    pub(crate) fn compile(rules: &[Rule], compiler: &PatternCompiler) -> Result<Self> {
        let mut prepared = Vec::with_capacity(rules.len());
        let mut parts = Vec::new();
        let mut pending = Vec::new();

        for (index, rule) in rules.iter().enumerate() {
            // Compiling each rule alone pins errors to the offending pattern.
            let compiled = compiler.compile_rule(rule)?;
            let guard = rule
                .page_start_guard
                .as_deref()
                .map(|g| compiler.compile_guard(g))
                .transpose()?;

            let strategy = if let Some(literals) = compiler.fast_fuzzy_literals(rule) {
                Strategy::Literal(literals)
            } else if matches!(rule.pattern, RulePattern::Regex(_)) && compiled.uses_capture {
                Strategy::Standalone {
                    regex: compiled.regex,
                    captures: compiled.capture_names,
                }
            } else {
                let prefix = format!("r{index}_");
                let source = compiler.rule_source(rule, &prefix);
                parts.push(format!("(?P<r{index}>{})", source.source));
                pending.push((index, source.capture_names, source.uses_line_starts_after));
                Strategy::Combined
            };

            prepared.push(PreparedRule {
                rule: rule.clone(),
                strategy,
                guard,
            });
        }

        let combined = if parts.is_empty() {
            None
        } else {
            let regex = compiler.compile_regex(&parts.join("|"))?;
            let members = pending
                .into_iter()
                .filter_map(|(rule_index, names, strips)| {
                    combined_member(&regex, rule_index, names, strips)
                })
                .collect();
            Some(CombinedMatcher { regex, members })
        };

        tracing::debug!(
            rules = prepared.len(),
            combined = combined.as_ref().map_or(0, |c| c.members.len()),
            "compiled rule set"
        );

        Ok(Self {
            rules: prepared,
            combined,
        })
    }

    /// Split points over `buffer`, sorted by offset, one per offset.
    pub(crate) fn split_points(
        &self,
        buffer: &PageBuffer,
        debug: Option<&DebugOptions>,
    ) -> Vec<SplitPoint> {
        let text = buffer.text();
        let mut per_rule: Vec<Vec<RuleMatch>> = self.rules.iter().map(|_| Vec::new()).collect();

        if let Some(combined) = &self.combined {
            for caps in combined.regex.captures_iter(text) {
                let hit = combined
                    .members
                    .iter()
                    .find_map(|m| caps.get(m.group).map(|whole| (m, whole)));
                if let Some((member, whole)) = hit {
                    per_rule[member.rule_index].push(RuleMatch {
                        start: whole.start(),
                        end: whole.end(),
                        body_start: member.strips_marker.then_some(whole.end()),
                        captures: member
                            .captures
                            .iter()
                            .filter_map(|(name, g)| {
                                caps.get(*g).map(|c| (name.clone(), c.as_str().to_string()))
                            })
                            .collect(),
                    });
                }
            }
        }

        for (index, prepared) in self.rules.iter().enumerate() {
            match &prepared.strategy {
                Strategy::Combined => {}
                Strategy::Standalone { regex, captures } => {
                    per_rule[index] = regex
                        .captures_iter(text)
                        .filter_map(|caps| standalone_match(&caps, captures))
                        .collect();
                }
                Strategy::Literal(literals) => {
                    let strips = matches!(prepared.rule.pattern, RulePattern::LineStartsAfter(_));
                    per_rule[index] = literal_matches(text, literals, strips);
                }
            }
        }

        let mut points = Vec::new();
        for (rule_index, (prepared, matches)) in self.rules.iter().zip(per_rule).enumerate() {
            let mut kept = matches.into_iter().filter(|m| prepared.accepts(buffer, m));
            let selected: Vec<RuleMatch> = match prepared.rule.occurrence {
                Occurrence::All => kept.collect(),
                Occurrence::First => kept.next().into_iter().collect(),
                Occurrence::Last => kept.last().into_iter().collect(),
            };
            points.extend(
                selected
                    .into_iter()
                    .map(|m| prepared.split_point(rule_index, m, debug)),
            );
        }

        points.sort_by_key(|p| (p.index, p.rule_index));
        points.dedup_by_key(|p| p.index);
        tracing::trace!(points = points.len(), "collected split points");
        points
    }
}

fn combined_member(
    regex: &Regex,
    rule_index: usize,
    names: Vec<String>,
    strips_marker: bool,
) -> Option<CombinedMember> {
    let group_index = |name: &str| regex.capture_names().position(|n| n == Some(name));
    let prefix = format!("r{rule_index}_");
    Some(CombinedMember {
        rule_index,
        group: group_index(&format!("r{rule_index}"))?,
        captures: names
            .into_iter()
            .filter_map(|name| group_index(&format!("{prefix}{name}")).map(|g| (name, g)))
            .collect(),
        strips_marker,
    })
}

fn standalone_match(caps: &Captures<'_>, names: &[String]) -> Option<RuleMatch> {
    let whole = caps.get(0)?;
    Some(RuleMatch {
        start: whole.start(),
        end: whole.end(),
        body_start: None,
        captures: names
            .iter()
            .filter_map(|name| caps.name(name).map(|c| (name.clone(), c.as_str().to_string())))
            .collect(),
    })
}

/// Try each literal, in order, at every line start.
fn literal_matches(text: &str, literals: &[String], strips_marker: bool) -> Vec<RuleMatch> {
    let line_starts = std::iter::once(0).chain(text.match_indices('\n').map(|(i, _)| i + 1));
    line_starts
        .filter_map(|start| {
            literals
                .iter()
                .find_map(|lit| match_literal_prefix(text, start, lit))
                .map(|end| RuleMatch {
                    start,
                    end,
                    body_start: strips_marker.then_some(end),
                    captures: Vec::new(),
                })
        })
        .collect()
}

impl PreparedRule {
    fn accepts(&self, buffer: &PageBuffer, m: &RuleMatch) -> bool {
        let map = buffer.map();
        if !self.rule.pages.allows(map.id_at(m.start)) {
            return false;
        }
        let Some(guard) = &self.guard else {
            return true;
        };
        match map.page_starting_at(m.start) {
            Some(page) if page > 0 => buffer
                .page_text(page - 1)
                .trim_end()
                .chars()
                .next_back()
                .map_or(true, |last| {
                    let mut utf8 = [0u8; 4];
                    guard.is_match(last.encode_utf8(&mut utf8))
                }),
            _ => true,
        }
    }

    fn split_point(&self, rule_index: usize, m: RuleMatch, debug: Option<&DebugOptions>) -> SplitPoint {
        let (index, content_start_offset) = match self.rule.split {
            SplitPosition::At => (m.start, m.body_start.map_or(0, |b| b - m.start)),
            SplitPosition::After => (m.end, 0),
        };

        let mut meta = self.rule.meta.clone().unwrap_or_default();
        for (name, value) in m.captures {
            meta.insert(name, Value::String(value));
        }
        if let Some(debug) = debug.filter(|d| d.includes(Provenance::Rule)) {
            insert_provenance(
                &mut meta,
                &debug.meta_key,
                "rule",
                json!({ "index": rule_index, "patternType": self.rule.pattern.kind().as_str() }),
            );
        }

        SplitPoint {
            index,
            rule_index,
            content_start_offset,
            meta: (!meta.is_empty()).then_some(meta),
        }
    }
}

/// Record `value` under `meta[key][field]`.
pub(crate) fn insert_provenance(meta: &mut Meta, key: &str, field: &str, value: Value) {
    let entry = meta
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Meta::new()));
    if !entry.is_object() {
        *entry = Value::Object(Meta::new());
    }
    if let Value::Object(obj) = entry {
        obj.insert(field.to_string(), value);
    }
}

/// Shrink `[start, end)` to exclude surrounding whitespace; `None` if nothing is left.
pub(crate) fn trim_range(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let head = slice.trim_start();
    if head.is_empty() {
        return None;
    }
    let start = start + (slice.len() - head.len());
    Some((start, start + head.trim_end().len()))
}

/// Cut the buffer at `points`. Text before the first point becomes a
/// segment without metadata.
pub(crate) fn cut_segments(text: &str, points: Vec<SplitPoint>) -> Vec<RawSegment> {
    let mut segments = Vec::with_capacity(points.len() + 1);
    let first = points.first().map_or(text.len(), |p| p.index);
    if let Some((start, end)) = trim_range(text, 0, first) {
        segments.push(RawSegment {
            start,
            end,
            meta: None,
            stripped_marker: false,
        });
    }

    let ends: Vec<usize> = points
        .iter()
        .skip(1)
        .map(|p| p.index)
        .chain(std::iter::once(text.len()))
        .collect();
    for (point, end) in points.into_iter().zip(ends) {
        let start = (point.index + point.content_start_offset).min(end);
        if let Some((start, end)) = trim_range(text, start, end) {
            segments.push(RawSegment {
                start,
                end,
                meta: point.meta,
                stripped_marker: point.content_start_offset > 0,
            });
        }
    }
    segments
}

/// Turn a buffer range into a [`Segment`], joining pages with `joiner`.
fn render(buffer: &PageBuffer, raw: RawSegment, joiner: PageJoiner) -> Segment {
    let text = buffer.text();
    let map = buffer.map();
    let from = map.index_at(raw.start);
    let to = map.index_at(raw.end.saturating_sub(1));

    let mut content = String::with_capacity(raw.end - raw.start);
    let mut last = raw.start;
    for index in from..to {
        let separator = map.boundary(index).end;
        if separator >= last && separator < raw.end {
            content.push_str(&text[last..separator]);
            content.push(joiner.as_char());
            last = separator + 1;
        }
    }
    content.push_str(&text[last..raw.end]);

    let ids = map.ids();
    Segment::new(content, ids[from], ids[to]).with_meta(raw.meta)
}

/// A compiled segmentation configuration.
///
/// Compiling once and reusing the segmenter across documents avoids
/// recompiling rules. A `Segmenter` is `Send + Sync`.
///
/// ```rust
/// use tabwib::{Page, Rule, SegmentationOptions, Segmenter};
///
/// let options = SegmentationOptions::default()
///     .with_rules(vec![Rule::line_starts_with(["{{bab}} "]).with_meta("type", "chapter")]);
/// let segmenter = Segmenter::new(options).unwrap();
///
/// let segments = segmenter.segment(&[
///     Page::new(1, "مقدمة\nباب الطهارة\nنص"),
///     Page::new(2, "باب الصلاة"),
/// ]);
/// assert_eq!(segments.len(), 3);
/// assert_eq!(segments[0].content, "مقدمة");
/// assert_eq!(segments[1].content, "باب الطهارة\nنص");
/// assert_eq!(segments[2].from, 2);
/// ```
#[derive(Debug, Clone)]
pub struct Segmenter {
    options: SegmentationOptions,
    rules: RuleSet,
    breakpoints: Vec<CompiledBreakpoint>,
}

impl Segmenter {
    /// Compile `options`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPattern`] if any rule, guard,
    /// breakpoint or `skipWhen` template does not compile.
    pub fn new(options: SegmentationOptions) -> Result<Self> {
        let tokens = TokenTable::new().with_tokens(options.tokens.clone());
        let compiler = PatternCompiler::new(tokens);
        let rules = RuleSet::compile(&options.rules, &compiler)?;
        let breakpoints = options
            .breakpoints
            .iter()
            .map(|bp| CompiledBreakpoint::compile(bp, &compiler))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            options,
            rules,
            breakpoints,
        })
    }

    /// The options this segmenter was built from.
    #[must_use]
    pub fn options(&self) -> &SegmentationOptions {
        &self.options
    }

    /// Segment `pages`, in document order.
    #[must_use]
    pub fn segment(&self, pages: &[Page]) -> Vec<Segment> {
        let buffer = PageBuffer::build(pages, &self.options.preprocess);
        if buffer.map().is_empty() {
            return Vec::new();
        }

        let debug = self.options.debug.as_ref();
        let points = self.rules.split_points(&buffer, debug);
        let raw = cut_segments(buffer.text(), points);
        let pieces = BreakpointEngine::new(&buffer, &self.breakpoints, &self.options).apply(raw);

        tracing::debug!(
            pages = pages.len(),
            segments = pieces.len(),
            "segmented document"
        );

        pieces
            .into_iter()
            .map(|raw| render(&buffer, raw, self.options.page_joiner))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PageRange, Rule};

    fn points(rules: &[Rule], pages: &[Page]) -> Vec<SplitPoint> {
        let set = RuleSet::compile(rules, &PatternCompiler::default()).unwrap();
        set.split_points(&PageBuffer::build(pages, &[]), None)
    }

    fn run(rules: Vec<Rule>, pages: &[Page]) -> Vec<Segment> {
        Segmenter::new(SegmentationOptions::default().with_rules(rules))
            .unwrap()
            .segment(pages)
    }

    #[test]
    fn test_trim_range() {
        assert_eq!(trim_range("  ab \n", 0, 6), Some((2, 4)));
        assert_eq!(trim_range(" \n ", 0, 3), None);
        assert_eq!(trim_range("xaby", 1, 3), Some((1, 3)));
    }

    #[test]
    fn test_no_rules_single_segment() {
        let segs = run(vec![], &[Page::new(1, "a"), Page::new(2, "b")]);
        assert_eq!(segs, vec![Segment::new("a b", 1, 2)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(run(vec![], &[]).is_empty());
        assert!(run(vec![], &[Page::new(1, "  ")]).is_empty());
    }

    #[test]
    fn test_split_at_and_after() {
        let pages = [Page::new(1, "a\n# b\nc")];
        let at = run(vec![Rule::line_starts_with(["# "])], &pages);
        assert_eq!(at.iter().map(|s| s.content.as_str()).collect::<Vec<_>>(), ["a", "# b\nc"]);

        let after = run(
            vec![Rule::line_ends_with(["b"]).with_split(SplitPosition::After)],
            &pages,
        );
        assert_eq!(after.iter().map(|s| s.content.as_str()).collect::<Vec<_>>(), ["a\n# b", "c"]);
    }

    #[test]
    fn test_line_starts_after_strips_marker() {
        let segs = run(
            vec![Rule::line_starts_after(["{{raqms:num}} {{dash}} "])],
            &[Page::new(1, "٣٤ - نص\n٣٥ - آخر")],
        );
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].content, "نص");
        assert_eq!(segs[0].meta.as_ref().unwrap()["num"], "٣٤");
        assert_eq!(segs[1].meta.as_ref().unwrap()["num"], "٣٥");
    }

    #[test]
    fn test_stripped_marker_keeps_later_matches_on_line() {
        let pages = [Page::new(1, "٣ - نص.\nتتمة")];
        let ends = Rule::line_ends_with(["{{tarqim}}"]).with_split(SplitPosition::After);
        let alone = run(vec![ends.clone()], &pages);
        assert_eq!(alone.iter().map(|s| s.content.as_str()).collect::<Vec<_>>(), ["٣ - نص.", "تتمة"]);

        let both = run(
            vec![Rule::line_starts_after(["{{raqms:num}} {{dash}} "]), ends],
            &pages,
        );
        assert_eq!(both.iter().map(|s| s.content.as_str()).collect::<Vec<_>>(), ["نص.", "تتمة"]);
        assert_eq!(both[0].meta.as_ref().unwrap()["num"], "٣");
    }

    #[test]
    fn test_empty_pattern_list_rejected() {
        let options = SegmentationOptions::default()
            .with_rules(vec![Rule::line_starts_with(Vec::<String>::new())]);
        assert!(matches!(
            Segmenter::new(options),
            Err(crate::Error::EmptyPatternList { .. })
        ));
    }

    #[test]
    fn test_occurrence() {
        let pages = [Page::new(1, "x\n# a\n# b\n# c")];
        let first = points(&[Rule::line_starts_with(["# "]).with_occurrence(Occurrence::First)], &pages);
        assert_eq!(first.iter().map(|p| p.index).collect::<Vec<_>>(), [2]);
        let last = points(&[Rule::line_starts_with(["# "]).with_occurrence(Occurrence::Last)], &pages);
        assert_eq!(last.iter().map(|p| p.index).collect::<Vec<_>>(), [10]);
        let all = points(&[Rule::line_starts_with(["# "])], &pages);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_page_constraints() {
        let pages = [Page::new(1, "# a"), Page::new(2, "# b"), Page::new(3, "# c")];
        let rule = Rule::line_starts_with(["# "]).with_min(2).with_exclude(PageRange::Single(3));
        let found = points(&[rule], &pages);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 4);
    }

    #[test]
    fn test_same_offset_keeps_earlier_rule() {
        let found = points(
            &[
                Rule::line_starts_with(["#"]).with_meta("by", "first"),
                Rule::regex("^#").with_meta("by", "second"),
            ],
            &[Page::new(1, "#x")],
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_index, 0);
    }

    #[test]
    fn test_standalone_regex_captures() {
        let segs = run(
            vec![Rule::regex(r"^(?P<n>\d+)\. ")],
            &[Page::new(1, "1. a\n2. b")],
        );
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].meta.as_ref().unwrap()["n"], "2");
    }

    #[test]
    fn test_captures_override_static_meta() {
        let segs = run(
            vec![Rule::line_starts_with(["{{raqms:num}} "]).with_meta("num", "static")],
            &[Page::new(1, "٥ نص")],
        );
        assert_eq!(segs[0].meta.as_ref().unwrap()["num"], "٥");
    }

    #[test]
    fn test_fast_fuzzy_literal_rule() {
        let segs = run(
            vec![Rule::line_starts_with(["{{naql}}"])],
            &[Page::new(1, "مقدمة\nحَدَّثَنَا مالك\nأَخْبَرَنَا سفيان")],
        );
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1].content, "حَدَّثَنَا مالك");
    }

    #[test]
    fn test_page_start_guard() {
        let rule = Rule::line_starts_with(["{{bab}}"]).with_page_start_guard("{{tarqim}}");
        let continued = points(
            &[rule.clone()],
            &[Page::new(1, "قال في"), Page::new(2, "باب كذا")],
        );
        assert!(continued.is_empty());

        let ended = points(&[rule], &[Page::new(1, "انتهى."), Page::new(2, "باب كذا")]);
        assert_eq!(ended.len(), 1);
    }

    #[test]
    fn test_debug_rule_provenance() {
        let options = SegmentationOptions::default()
            .with_rules(vec![Rule::line_starts_with(["# "])])
            .with_debug(DebugOptions::default());
        let segs = Segmenter::new(options).unwrap().segment(&[Page::new(1, "# a")]);
        let debug = &segs[0].meta.as_ref().unwrap()["_debug"];
        assert_eq!(debug["rule"]["index"], 0);
        assert_eq!(debug["rule"]["patternType"], "lineStartsWith");
    }

    #[test]
    fn test_newline_joiner() {
        let options = SegmentationOptions::default().with_page_joiner(PageJoiner::Newline);
        let segs = Segmenter::new(options)
            .unwrap()
            .segment(&[Page::new(1, "a"), Page::new(2, "b")]);
        assert_eq!(segs[0].content, "a\nb");
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let options = SegmentationOptions::default().with_rules(vec![Rule::regex("(")]);
        assert!(Segmenter::new(options).is_err());
    }
}
