//! Independent checks of segmentation output.
//!
//! The validator does not reuse the segmenter's buffer. It rebuilds the
//! joined text from the pages, with the same preprocessing and the
//! segments' page joiner, then looks for every segment's content in it:
//!
//! | Finding                                        | Issue                      | Severity |
//! |------------------------------------------------|----------------------------|----------|
//! | `from` is not an input page id                 | `page_not_found`           | error    |
//! | page span exceeds `maxPages`                   | `max_pages_violation`      | error    |
//! | content not found                              | `content_not_found`        | error    |
//! | found once, not on `from`                      | `page_attribution_mismatch`| error    |
//! | found several times, once on `from`            | `ambiguous_attribution`    | warn     |
//! | found several times, never on `from`           | `page_attribution_mismatch`| error    |
//!
//! The page span is measured as the segmenter measures it: the id
//! difference over increasing ids, the page count otherwise.
//!
//! Content is first searched in the pages around the declared ones, so
//! checking a long document stays linear. Only content missing from its
//! neighbourhood is searched for in the whole document. Repeats farther
//! away than that do not make an attribution ambiguous.
//!
//! Findings are data. Nothing here fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pages::{PageBoundary, PageMap};
use crate::preprocess::normalize_page;
use crate::{Page, PageId, Segment, SegmentationOptions};

/// Pages searched on each side of a segment's declared pages before
/// falling back to the whole document.
const NEIGHBOURHOOD_PAGES: usize = 8;

/// What a [`ValidationIssue`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// `from` is not one of the input page ids.
    PageNotFound,
    /// The segment spans more pages than allowed.
    MaxPagesViolation,
    /// The content does not occur in the joined pages.
    ContentNotFound,
    /// The content occurs, but not on the declared page.
    PageAttributionMismatch,
    /// The content occurs on the declared page and elsewhere.
    AmbiguousAttribution,
}

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The segment is wrong.
    Error,
    /// The segment may be wrong.
    Warn,
}

/// One finding about one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// What kind of problem this is.
    #[serde(rename = "type")]
    pub kind: IssueType,
    /// How serious it is.
    pub severity: Severity,
    /// Position of the segment in the checked list.
    pub segment_index: usize,
    /// Human-readable description.
    pub message: String,
    /// Pages the content was found on, when searched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub found_on: Vec<PageId>,
}

impl ValidationIssue {
    fn error(kind: IssueType, segment_index: usize, message: String) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            segment_index,
            message,
            found_on: Vec::new(),
        }
    }

    fn with_found_on(mut self, pages: Vec<PageId>) -> Self {
        self.found_on = pages;
        self
    }
}

/// The outcome of [`validate_segments`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// No issues at all.
    pub ok: bool,
    /// Number of error-severity issues.
    pub errors: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Every finding, in segment order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let errors = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count();
        Self {
            ok: issues.is_empty(),
            errors,
            warnings: issues.len() - errors,
            issues,
        }
    }

    /// Issues of one kind.
    pub fn of_kind(&self, kind: IssueType) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }
}

/// The joined text as the validator sees it.
struct JoinedPages {
    text: String,
    map: PageMap,
    /// First sequence position of each id.
    positions: HashMap<PageId, usize>,
}

impl JoinedPages {
    fn build(pages: &[Page], options: &SegmentationOptions) -> Self {
        let joiner = options.page_joiner.as_char();
        let mut text = String::new();
        let mut map = PageMap::default();
        let mut positions = HashMap::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                text.push(joiner);
            }
            let start = text.len();
            text.push_str(&normalize_page(&page.content, &options.preprocess));
            map.push(PageBoundary {
                start,
                end: text.len(),
                id: page.id,
            });
            positions.entry(page.id).or_insert(i);
        }
        Self {
            text,
            map,
            positions,
        }
    }

    /// Span of a segment, measured the way the segmenter measures it.
    fn span(&self, from: PageId, to: PageId) -> PageId {
        match (self.positions.get(&from), self.positions.get(&to)) {
            (Some(&first), Some(&last)) if last >= first => self.map.span(first, last),
            (Some(&first), Some(&last)) => (first - last) as PageId,
            _ => to.abs_diff(from),
        }
    }

    /// Pages `content` starts on, searching `[start, end)` of the text.
    ///
    /// Overlapping occurrences count.
    fn found_on(&self, content: &str, start: usize, end: usize) -> Vec<PageId> {
        let haystack = &self.text[start..end];
        let mut pages = Vec::new();
        let mut at = 0;
        while let Some(offset) = haystack[at..].find(content) {
            let hit = at + offset;
            pages.push(self.map.id_at(start + hit));
            let step = haystack[hit..].chars().next().map_or(1, char::len_utf8);
            at = hit + step;
        }
        pages
    }

    /// Byte range of the pages around `from..=to`.
    fn neighbourhood(&self, from: PageId, to: PageId) -> Option<(usize, usize)> {
        let first = *self.positions.get(&from)?;
        let last = self.positions.get(&to).copied().unwrap_or(first).max(first);
        let lo = first.saturating_sub(NEIGHBOURHOOD_PAGES);
        let hi = (last + NEIGHBOURHOOD_PAGES).min(self.map.len() - 1);
        Some((self.map.boundary(lo).start, self.map.boundary(hi).end))
    }
}

/// Check `segments` against the pages and options that produced them.
///
/// ```rust
/// use tabwib::{segment_pages, validate_segments, Page, SegmentationOptions};
///
/// let pages = [Page::new(1, "أول"), Page::new(2, "ثان")];
/// let options = SegmentationOptions::default();
/// let segments = segment_pages(&pages, &options).unwrap();
/// assert!(validate_segments(&pages, &options, &segments).ok);
/// ```
#[must_use]
pub fn validate_segments(
    pages: &[Page],
    options: &SegmentationOptions,
    segments: &[Segment],
) -> ValidationReport {
    let joined = JoinedPages::build(pages, options);
    let mut issues = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        if !joined.positions.contains_key(&segment.from) {
            issues.push(ValidationIssue::error(
                IssueType::PageNotFound,
                index,
                format!("page {} is not in the input", segment.from),
            ));
        }

        if let (Some(to), Some(max)) = (segment.to, options.max_pages) {
            let span = joined.span(segment.from, to);
            if span > max {
                let message = if max == 0 {
                    format!(
                        "segment spans pages {}..={to} but maxPages is 0 (no multi-page segments)",
                        segment.from
                    )
                } else {
                    format!(
                        "segment spans {span} pages ({}..={to}), more than maxPages {max}",
                        segment.from
                    )
                };
                issues.push(ValidationIssue::error(
                    IssueType::MaxPagesViolation,
                    index,
                    message,
                ));
            }
        }

        if let Some(issue) = check_attribution(&joined, index, segment) {
            issues.push(issue);
        }
    }

    let report = ValidationReport::from_issues(issues);
    tracing::debug!(
        segments = segments.len(),
        errors = report.errors,
        warnings = report.warnings,
        "validated segments"
    );
    report
}

fn check_attribution(joined: &JoinedPages, index: usize, segment: &Segment) -> Option<ValidationIssue> {
    let content = segment.content.as_str();
    let found_on: Vec<PageId> = if content.is_empty() {
        Vec::new()
    } else {
        let nearby = joined
            .neighbourhood(segment.from, segment.last_page())
            .map(|(start, end)| joined.found_on(content, start, end))
            .unwrap_or_default();
        if nearby.contains(&segment.from) {
            nearby
        } else {
            joined.found_on(content, 0, joined.text.len())
        }
    };

    let on_declared = found_on.contains(&segment.from);
    match found_on.len() {
        0 => Some(ValidationIssue::error(
            IssueType::ContentNotFound,
            index,
            "content does not occur in the pages".to_string(),
        )),
        1 if on_declared => None,
        1 => Some(
            ValidationIssue::error(
                IssueType::PageAttributionMismatch,
                index,
                format!("content starts on page {}, not {}", found_on[0], segment.from),
            )
            .with_found_on(found_on),
        ),
        n if on_declared => Some(ValidationIssue {
            kind: IssueType::AmbiguousAttribution,
            severity: Severity::Warn,
            segment_index: index,
            message: format!("content occurs {n} times, once on page {}", segment.from),
            found_on,
        }),
        n => Some(
            ValidationIssue::error(
                IssueType::PageAttributionMismatch,
                index,
                format!("content occurs {n} times, never on page {}", segment.from),
            )
            .with_found_on(found_on),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<Page> {
        vec![Page::new(1, "alpha beta"), Page::new(2, "gamma"), Page::new(3, "beta")]
    }

    fn kinds(report: &ValidationReport) -> Vec<IssueType> {
        report.issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_clean_report() {
        let segments = [Segment::new("alpha beta gamma", 1, 2)];
        let report = validate_segments(&pages()[..2], &SegmentationOptions::default(), &segments);
        assert!(report.ok);
        assert_eq!(report.errors + report.warnings, 0);
    }

    #[test]
    fn test_repeated_content_is_ambiguous() {
        let segments = [Segment::new("alpha beta gamma", 1, 2), Segment::new("beta", 3, 3)];
        let report = validate_segments(&pages(), &SegmentationOptions::default(), &segments);
        // "beta" also occurs on page 1
        assert_eq!(kinds(&report), [IssueType::AmbiguousAttribution]);
        assert_eq!(report.warnings, 1);
        assert_eq!(report.errors, 0);
        assert!(!report.ok);
    }

    #[test]
    fn test_page_not_found() {
        let report = validate_segments(
            &pages(),
            &SegmentationOptions::default(),
            &[Segment::new("gamma", 9, 9)],
        );
        assert!(report.of_kind(IssueType::PageNotFound).count() == 1);
        assert!(report.of_kind(IssueType::PageAttributionMismatch).count() == 1);
    }

    #[test]
    fn test_content_not_found() {
        let report = validate_segments(
            &pages(),
            &SegmentationOptions::default(),
            &[Segment::new("delta", 1, 1)],
        );
        assert_eq!(kinds(&report), [IssueType::ContentNotFound]);
    }

    #[test]
    fn test_mismatch_when_never_on_declared_page() {
        let report = validate_segments(
            &pages(),
            &SegmentationOptions::default(),
            &[Segment::new("beta", 2, 2)],
        );
        let issue = &report.issues[0];
        assert_eq!(issue.kind, IssueType::PageAttributionMismatch);
        assert_eq!(issue.found_on, vec![1, 3]);
    }

    #[test]
    fn test_max_pages_violation() {
        let options = SegmentationOptions::default().with_max_pages(0);
        let report = validate_segments(&pages(), &options, &[Segment::new("alpha beta gamma", 1, 2)]);
        assert_eq!(kinds(&report), [IssueType::MaxPagesViolation]);
        assert!(report.issues[0].message.contains("maxPages is 0"));

        let options = SegmentationOptions::default().with_max_pages(1);
        let report = validate_segments(&pages(), &options, &[Segment::new("alpha beta gamma", 1, 2)]);
        assert!(report.ok);
    }

    #[test]
    fn test_span_of_unsorted_ids() {
        let pages = vec![Page::new(3, "c"), Page::new(2, "b"), Page::new(1, "a")];
        let options = SegmentationOptions::default().with_max_pages(0);
        let report = validate_segments(&pages, &options, &[Segment::new("c b a", 3, 1)]);
        assert_eq!(kinds(&report), [IssueType::MaxPagesViolation]);

        let options = SegmentationOptions::default().with_max_pages(2);
        let report = validate_segments(&pages, &options, &[Segment::new("c b a", 3, 1)]);
        assert!(report.ok, "{:#?}", report.issues);
    }

    #[test]
    fn test_overlapping_occurrences_count() {
        let pages = vec![Page::new(1, "ab ab ab")];
        let report = validate_segments(
            &pages,
            &SegmentationOptions::default(),
            &[Segment::new("ab ab", 1, 1)],
        );
        let issue = &report.issues[0];
        assert_eq!(issue.kind, IssueType::AmbiguousAttribution);
        assert_eq!(issue.found_on, vec![1, 1]);
    }

    #[test]
    fn test_distant_repeat_is_not_ambiguous() {
        let mut pages: Vec<Page> = (1..=30).map(|i| Page::new(i, format!("filler {i}"))).collect();
        pages[0].content = "repeated line".to_string();
        pages[29].content = "repeated line".to_string();
        let report = validate_segments(
            &pages,
            &SegmentationOptions::default(),
            &[Segment::new("repeated line", 1, 1)],
        );
        assert!(report.ok, "{:#?}", report.issues);
    }

    #[test]
    fn test_far_misattribution_still_found() {
        let mut pages: Vec<Page> = (1..=30).map(|i| Page::new(i, format!("filler {i}"))).collect();
        pages[29].content = "far away".to_string();
        let report = validate_segments(
            &pages,
            &SegmentationOptions::default(),
            &[Segment::new("far away", 1, 1)],
        );
        let issue = &report.issues[0];
        assert_eq!(issue.kind, IssueType::PageAttributionMismatch);
        assert_eq!(issue.found_on, vec![30]);
    }

    #[test]
    fn test_issue_serialization() {
        let report = validate_segments(
            &pages(),
            &SegmentationOptions::default(),
            &[Segment::new("delta", 1, 1)],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["issues"][0]["type"], "content_not_found");
        assert_eq!(json["issues"][0]["severity"], "error");
        assert_eq!(json["ok"], false);
    }
}
