//! # tabwib
//!
//! Page-aware rule segmentation for large multi-page text corpora.
//!
//! ## The Problem
//!
//! Digitised books arrive as pages. Readers, indexes and search want
//! logical units: chapters, sections, numbered entries, hadith. Those units
//! ignore page breaks. A chapter starts mid-page and runs across ten more.
//!
//! Splitting a book into units is simple to describe ("cut before every line
//! starting with باب") and awkward to do well:
//!
//! - Arabic text is vocalised inconsistently, so `باب` must match `بَابُ`
//! - Every unit must remember which page it started on, and where it ended
//! - Some units are huge and must be cut again, at sensible places
//! - Cuts must never fall between a letter and its diacritics
//!
//! ## Pipeline
//!
//! ```text
//! pages ─► normalise ─► join ("\n") ─► rule matches ─► raw segments
//!                                                          │
//!      segments ◄─ page attribution ◄─ breakpoint windowing ┘
//! ```
//!
//! ### Rules
//!
//! A rule is one pattern shape plus modifiers:
//!
//! | Shape             | Cuts at                                           |
//! |-------------------|---------------------------------------------------|
//! | `lineStartsWith`  | lines starting with one of the patterns           |
//! | `lineStartsAfter` | same, but the marker is dropped from the content  |
//! | `lineEndsWith`    | lines ending with one of the patterns             |
//! | `template`        | any match of a token template                     |
//! | `regex`           | any match of a raw regular expression             |
//!
//! Patterns use `{{token}}` placeholders (`{{bab}}`, `{{raqms}}`, `{{dash}}`,
//! ...) and `{{token:name}}` to capture the matched text into segment
//! metadata. Tokens naming structural words match diacritic-insensitively.
//!
//! ### Breakpoints
//!
//! With `maxPages` or `maxContentLength` set, oversized segments are cut
//! again. Breakpoints are tried in order inside a window of allowed pages;
//! `""` means "at a page boundary".
//!
//! ```text
//! 3 pages, maxPages = 1, breakpoints [""]
//!
//! [ page 1 | page 2 | page 3 ]  ─►  [ page 1 ] [ page 2 | page 3 ]
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tabwib::{segment_pages, validate_segments, Breakpoint, Page, Rule, SegmentationOptions};
//!
//! let pages = vec![
//!     Page::new(1, "مقدمة الكتاب\nباب الطهارة\nنص الباب"),
//!     Page::new(2, "تتمة\nباب الصلاة\nنص"),
//! ];
//!
//! let options = SegmentationOptions::default()
//!     .with_rules(vec![Rule::line_starts_with(["{{bab}} "]).with_meta("type", "chapter")])
//!     .with_breakpoints(vec![Breakpoint::page_boundary()])
//!     .with_max_pages(1);
//!
//! let segments = segment_pages(&pages, &options)?;
//! assert_eq!(segments.len(), 3);
//! assert_eq!(segments[1].content, "باب الطهارة\nنص الباب تتمة");
//! assert_eq!((segments[1].from, segments[1].to), (1, Some(2)));
//!
//! assert!(validate_segments(&pages, &options, &segments).ok);
//! # Ok::<(), tabwib::Error>(())
//! ```
//!
//! ## Performance Considerations
//!
//! | Stage                 | Cost                                      |
//! |-----------------------|-------------------------------------------|
//! | rule matching         | one regex pass for most rule sets         |
//! | page attribution      | O(log pages) per offset                   |
//! | windowing (accurate)  | O(pages in window) per cut                |
//! | windowing (fast path) | O(1) per cut, pages ≥ threshold           |
//!
//! Compile a [`Segmenter`] once and reuse it across documents.

mod breakpoints;
mod compile;
mod error;
mod fuzzy;
mod optimize;
mod options;
mod pages;
mod preprocess;
mod rule;
mod segment;
mod segmenter;
mod tokens;
mod validate;

pub use compile::{CompiledRule, PatternCompiler};
pub use error::{Error, Result};
pub use fuzzy::{
    equivalence_key, is_diacritic, literal_alternatives, make_diacritic_insensitive,
    match_literal_prefix, DIACRITIC_CLASS,
};
pub use optimize::{optimize_rules, OptimizedRules};
pub use options::{
    DebugOptions, PageJoiner, Prefer, Provenance, SegmentationOptions,
    DEFAULT_LARGE_DOCUMENT_THRESHOLD,
};
pub use pages::{PageBoundary, PageBuffer, PageMap};
pub use preprocess::{normalize_page, Preprocess};
pub use rule::{
    Breakpoint, BreakpointPattern, Occurrence, PageConstraints, PageRange, PatternKind, Rule,
    RulePattern, SplitPosition,
};
pub use segment::{Meta, Page, PageId, Segment};
pub use segmenter::Segmenter;
pub use tokens::{expand_tokens, templatize, tokenize, Expansion, TextPiece, TokenTable};
pub use validate::{validate_segments, IssueType, Severity, ValidationIssue, ValidationReport};

/// Segment `pages` with `options`.
///
/// Shorthand for [`Segmenter::new`] followed by [`Segmenter::segment`].
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] if a rule or breakpoint does not
/// compile.
pub fn segment_pages(pages: &[Page], options: &SegmentationOptions) -> Result<Vec<Segment>> {
    Ok(Segmenter::new(options.clone())?.segment(pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_segmenter_is_send_sync() {
        assert_send_sync::<Segmenter>();
    }

    #[test]
    fn test_segment_pages_reports_bad_pattern() {
        let options = SegmentationOptions::default().with_breakpoints(vec![Breakpoint::regex("[")]);
        let err = segment_pages(&[Page::new(1, "x")], &options).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }
}
