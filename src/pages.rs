//! The concatenated page buffer and its offset → page index.
//!
//! All pages are joined with a `\n` separator into one buffer so rules can
//! be run once over the whole document:
//!
//! ```text
//! page 10: "abc"      [0..3)   separator at 3
//! page 11: ""         [4..4)   separator at 4
//! page 14: "de"       [5..7)
//!
//! buffer:  "abc\n\nde"
//! ```
//!
//! The separator after a page belongs to that page. Looking up the page of
//! an offset is a binary search over page start offsets.
//!
//! ## Page spans
//!
//! The span of a run of pages is the id difference `last - first` when the
//! ids in the run strictly increase, and the number of page steps otherwise.
//! Either way it is never smaller than the step count, so a span limit
//! bounds how many pages a segment covers even for unsorted ids.

use crate::preprocess::{normalize_page, Preprocess};
use crate::{Page, PageId};

/// One page's extent in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBoundary {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset just past the last character (the separator position).
    pub end: usize,
    /// The caller's page id.
    pub id: PageId,
}

/// Page boundaries plus the indexes needed for fast lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMap {
    boundaries: Vec<PageBoundary>,
    starts: Vec<usize>,
    ids: Vec<PageId>,
    /// Per page, where the strictly increasing id run ending at it begins.
    run_starts: Vec<usize>,
}

impl PageMap {
    pub(crate) fn push(&mut self, boundary: PageBoundary) {
        let index = self.ids.len();
        let run_start = match self.ids.last() {
            Some(&prev) if prev < boundary.id => self.run_starts[index - 1],
            _ => index,
        };
        self.run_starts.push(run_start);
        self.starts.push(boundary.start);
        self.ids.push(boundary.id);
        self.boundaries.push(boundary);
    }

    /// Number of pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    /// Whether there are no pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Page ids in document order.
    #[must_use]
    pub fn ids(&self) -> &[PageId] {
        &self.ids
    }

    /// The boundary of the page at sequence position `index`.
    #[must_use]
    pub fn boundary(&self, index: usize) -> &PageBoundary {
        &self.boundaries[index]
    }

    /// All boundaries in document order.
    #[must_use]
    pub fn boundaries(&self) -> &[PageBoundary] {
        &self.boundaries
    }

    /// Sequence position of the page containing byte `offset`.
    ///
    /// Offsets past the end map to the last page.
    #[must_use]
    pub fn index_at(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset).saturating_sub(1)
    }

    /// Id of the page containing byte `offset`.
    #[must_use]
    pub fn id_at(&self, offset: usize) -> PageId {
        self.ids[self.index_at(offset)]
    }

    /// Whether ids strictly increase over pages `first..=last`.
    #[must_use]
    pub fn is_increasing(&self, first: usize, last: usize) -> bool {
        self.run_starts[last] <= first
    }

    /// Span of pages `first..=last`: the id difference over increasing ids,
    /// the step count otherwise.
    #[must_use]
    pub fn span(&self, first: usize, last: usize) -> PageId {
        if last <= first {
            return 0;
        }
        if self.is_increasing(first, last) {
            self.ids[last] - self.ids[first]
        } else {
            (last - first) as PageId
        }
    }

    /// The page index starting exactly at `offset`, if any.
    #[must_use]
    pub fn page_starting_at(&self, offset: usize) -> Option<usize> {
        self.starts.binary_search(&offset).ok()
    }
}

/// The normalized, concatenated document.
#[derive(Debug, Clone, Default)]
pub struct PageBuffer {
    text: String,
    map: PageMap,
}

impl PageBuffer {
    /// Normalize every page and join them with `\n`.
    #[must_use]
    pub fn build(pages: &[Page], preprocess: &[Preprocess]) -> Self {
        let contents: Vec<String> = pages
            .iter()
            .map(|page| normalize_page(&page.content, preprocess))
            .collect();
        let total = contents.iter().map(|c| c.len() + 1).sum();

        let mut text = String::with_capacity(total);
        let mut map = PageMap::default();
        for (page, content) in pages.iter().zip(&contents) {
            if !map.is_empty() {
                text.push('\n');
            }
            let start = text.len();
            text.push_str(content);
            map.push(PageBoundary {
                start,
                end: text.len(),
                id: page.id,
            });
        }

        Self { text, map }
    }

    /// The joined text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The page map.
    #[must_use]
    pub fn map(&self) -> &PageMap {
        &self.map
    }

    /// The normalized content of the page at sequence position `index`.
    #[must_use]
    pub fn page_text(&self, index: usize) -> &str {
        let b = self.map.boundary(index);
        &self.text[b.start..b.end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PageBuffer {
        PageBuffer::build(
            &[Page::new(10, "abc"), Page::new(11, ""), Page::new(14, "de")],
            &[],
        )
    }

    #[test]
    fn test_layout() {
        let buf = sample();
        assert_eq!(buf.text(), "abc\n\nde");
        assert_eq!(buf.map().ids(), &[10, 11, 14]);
        assert_eq!(
            buf.map().boundary(2),
            &PageBoundary {
                start: 5,
                end: 7,
                id: 14
            }
        );
        assert_eq!(buf.page_text(0), "abc");
        assert_eq!(buf.page_text(1), "");
    }

    #[test]
    fn test_offset_lookup() {
        let map = sample().map().clone();
        assert_eq!(map.id_at(0), 10);
        assert_eq!(map.id_at(3), 10); // separator belongs to the page before it
        assert_eq!(map.id_at(4), 11);
        assert_eq!(map.id_at(5), 14);
        assert_eq!(map.id_at(100), 14);
    }

    #[test]
    fn test_page_start_lookup() {
        let map = sample().map().clone();
        assert_eq!(map.page_starting_at(0), Some(0));
        assert_eq!(map.page_starting_at(4), Some(1));
        assert_eq!(map.page_starting_at(5), Some(2));
        assert_eq!(map.page_starting_at(2), None);
    }

    #[test]
    fn test_span_uses_ids_when_increasing() {
        let map = sample().map().clone();
        assert_eq!(map.span(0, 2), 4);
        assert_eq!(map.span(1, 2), 3);
        assert_eq!(map.span(2, 2), 0);
    }

    #[test]
    fn test_span_falls_back_to_steps() {
        let pages = [Page::new(3, "c"), Page::new(2, "b"), Page::new(1, "a"), Page::new(9, "z")];
        let map = PageBuffer::build(&pages, &[]).map().clone();
        assert!(!map.is_increasing(0, 1));
        assert!(map.is_increasing(2, 3));
        assert_eq!(map.span(0, 2), 2);
        assert_eq!(map.span(0, 3), 3);
        assert_eq!(map.span(2, 3), 8);
    }

    #[test]
    fn test_span_with_repeated_ids() {
        let pages = [Page::new(4, "a"), Page::new(4, "b")];
        let map = PageBuffer::build(&pages, &[]).map().clone();
        assert_eq!(map.span(0, 1), 1);
    }

    #[test]
    fn test_line_endings_normalized() {
        let buf = PageBuffer::build(&[Page::new(1, "a\r\nb")], &[]);
        assert_eq!(buf.text(), "a\nb");
    }

    #[test]
    fn test_empty() {
        let buf = PageBuffer::build(&[], &[]);
        assert!(buf.map().is_empty());
        assert_eq!(buf.text(), "");
    }
}
