//! Breakpoint windowing: cutting oversized segments.
//!
//! A segment is oversized when its page span ([`crate::PageMap::span`])
//! exceeds `maxPages` or its trimmed length exceeds `maxContentLength`.
//! Oversized segments are walked with a cursor; each step looks at a window
//! and picks one cut inside it.
//!
//! ```text
//! cursor                                   window end
//!   │◄──────────── pages from..=window ─────────►│
//!   │  page 7            │ page 8                │ page 9 ...
//!   │  ....؟ ....   ....؟│ ....  ....            │
//!                      ▲ ▲
//!       breakpoint "{{tarqim}}" (prefer longer: last match)
//!                        page boundary ""
//! ```
//!
//! ## Choosing the cut
//!
//! 1. Breakpoints in declared order, skipping those whose `skipWhen` matches
//!    the rest of the segment. The first one with an acceptable match
//!    inside the window wins. `""` matches the page starts inside the window
//!    (or the next page start when the window holds only the current page).
//! 2. Nothing matched and the window was cut by the character limit: after
//!    the last whitespace in the window, else at the window end.
//! 3. Otherwise the start of the last page in the window.
//!
//! The cut is then moved off any position that would separate a base
//! letter from its marks, joiners or variation selectors.
//!
//! ## Fast path
//!
//! The accurate window end scans page ids forward from the cursor's page. On
//! documents with at least `large_document_threshold` pages, when no
//! character limit or debug provenance is requested, the window end is taken
//! arithmetically as `from + maxPages` (clamped to the segment). That guess
//! is kept only if the ids it spans increase by exactly one per page, which
//! is one lookup and one subtraction; anything else falls back to the scan.

use regex::Regex;
use serde_json::{json, Value};
use unicode_segmentation::GraphemeCursor;

use crate::compile::PatternCompiler;
use crate::fuzzy::is_diacritic;
use crate::options::{DebugOptions, Prefer, Provenance, SegmentationOptions};
use crate::pages::PageBuffer;
use crate::rule::{BreakpointPattern, PageConstraints, SplitPosition};
use crate::segmenter::{insert_provenance, trim_range, RawSegment};
use crate::{Breakpoint, Meta, PageId, Result};

/// A breakpoint with its patterns compiled.
#[derive(Debug, Clone)]
pub(crate) struct CompiledBreakpoint {
    /// `None` for the page-boundary breakpoint.
    matcher: Option<Regex>,
    split: SplitPosition,
    pages: PageConstraints,
    skip_when: Option<Regex>,
    label: String,
}

impl CompiledBreakpoint {
    pub(crate) fn compile(breakpoint: &Breakpoint, compiler: &PatternCompiler) -> Result<Self> {
        let (matcher, label) = match &breakpoint.pattern {
            BreakpointPattern::Template(t) if t.is_empty() => (None, String::new()),
            BreakpointPattern::Template(t) => (Some(compiler.compile_template(t, None)?), t.clone()),
            BreakpointPattern::Regex(r) => (Some(compiler.compile_regex(r)?), r.clone()),
        };
        let skip_when = breakpoint
            .skip_when
            .as_deref()
            .map(|t| compiler.compile_template(t, None))
            .transpose()?;

        Ok(Self {
            matcher,
            split: breakpoint.split,
            pages: breakpoint.pages.clone(),
            skip_when,
            label,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakSource {
    Breakpoint(usize),
    PageBoundary,
    ContentLength,
}

/// The region one cut is chosen from.
#[derive(Debug, Clone, Copy)]
struct Window {
    cursor: usize,
    end: usize,
    from_idx: usize,
    end_idx: usize,
    last_idx: usize,
    segment_end: usize,
    length_limited: bool,
}

/// Applies page and length limits to raw segments.
pub(crate) struct BreakpointEngine<'a> {
    buffer: &'a PageBuffer,
    breakpoints: &'a [CompiledBreakpoint],
    max_pages: Option<PageId>,
    max_len: Option<usize>,
    prefer: Prefer,
    debug: Option<&'a DebugOptions>,
    fast_path: bool,
}

impl<'a> BreakpointEngine<'a> {
    pub(crate) fn new(
        buffer: &'a PageBuffer,
        breakpoints: &'a [CompiledBreakpoint],
        options: &'a SegmentationOptions,
    ) -> Self {
        let max_len = options.max_content_length.filter(|&n| n > 0);
        Self {
            buffer,
            breakpoints,
            max_pages: options.max_pages,
            max_len,
            prefer: options.prefer,
            debug: options.debug.as_ref(),
            fast_path: buffer.map().len() >= options.large_document_threshold
                && max_len.is_none()
                && options.debug.is_none(),
        }
    }

    /// Split every segment that exceeds a limit; others pass through.
    pub(crate) fn apply(&self, segments: Vec<RawSegment>) -> Vec<RawSegment> {
        if self.max_pages.is_none() && self.max_len.is_none() {
            return segments;
        }
        let mut out = Vec::with_capacity(segments.len());
        for segment in segments {
            if self.fits(segment.start, segment.end) {
                out.push(segment);
            } else {
                self.split(segment, &mut out);
            }
        }
        out
    }

    fn fits(&self, start: usize, end: usize) -> bool {
        let map = self.buffer.map();
        if let Some(max) = self.max_pages {
            let span = map.span(map.index_at(start), map.index_at(end.saturating_sub(1)));
            if span > max {
                return false;
            }
        }
        if let Some(max) = self.max_len {
            if self.buffer.text()[start..end].trim().chars().nth(max).is_some() {
                return false;
            }
        }
        true
    }

    fn split(&self, segment: RawSegment, out: &mut Vec<RawSegment>) {
        let text = self.buffer.text();
        let last_idx = self.buffer.map().index_at(segment.end.saturating_sub(1));
        let fast = self.fast_path && !segment.stripped_marker;
        tracing::debug!(
            start = segment.start,
            end = segment.end,
            fast,
            "splitting oversized segment"
        );

        let mut meta = segment.meta;
        let mut provenance = None;
        let mut cursor = segment.start;
        while cursor < segment.end {
            if self.fits(cursor, segment.end) {
                self.emit(out, cursor, segment.end, &mut meta, provenance.take());
                break;
            }
            let window = self.window(cursor, segment.end, last_idx, fast);
            let (target, source) = self.choose(&window);
            let cut = safe_break(text, cursor, target, segment.end);
            tracing::trace!(cursor, cut, ?source, "cut");
            self.emit(out, cursor, cut, &mut meta, provenance.take());
            provenance = self.provenance(source);
            cursor = cut;
        }
    }

    fn emit(
        &self,
        out: &mut Vec<RawSegment>,
        start: usize,
        end: usize,
        meta: &mut Option<Meta>,
        provenance: Option<Meta>,
    ) {
        if let Some((start, end)) = trim_range(self.buffer.text(), start, end) {
            out.push(RawSegment {
                start,
                end,
                meta: meta.take().or(provenance),
                stripped_marker: false,
            });
        }
    }

    fn window(&self, cursor: usize, segment_end: usize, last_idx: usize, fast: bool) -> Window {
        let map = self.buffer.map();
        let from_idx = map.index_at(cursor);
        let end_idx = match self.max_pages {
            None => last_idx,
            Some(max) if fast => {
                let guess = (from_idx + max as usize).min(last_idx);
                let ids = map.ids();
                if map.is_increasing(from_idx, guess)
                    && ids[guess] - ids[from_idx] == (guess - from_idx) as PageId
                {
                    guess
                } else {
                    self.scan_window_end(from_idx, last_idx, max)
                }
            }
            Some(max) => self.scan_window_end(from_idx, last_idx, max),
        };

        let page_limit = segment_end.min(map.boundary(end_idx).end).max(cursor);
        let (end, length_limited) = match self.max_len {
            Some(max) => match self.buffer.text()[cursor..page_limit].char_indices().nth(max) {
                Some((offset, _)) => (cursor + offset, true),
                None => (page_limit, false),
            },
            None => (page_limit, false),
        };

        Window {
            cursor,
            end,
            from_idx,
            end_idx,
            last_idx,
            segment_end,
            length_limited,
        }
    }

    /// The last page whose span from `from_idx` stays within `max`.
    fn scan_window_end(&self, from_idx: usize, last_idx: usize, max: PageId) -> usize {
        let map = self.buffer.map();
        let mut j = from_idx;
        while j < last_idx && map.span(from_idx, j + 1) <= max {
            j += 1;
        }
        j
    }

    fn choose(&self, w: &Window) -> (usize, BreakSource) {
        let text = self.buffer.text();
        let remaining = &text[w.cursor..w.segment_end];

        for (index, bp) in self.breakpoints.iter().enumerate() {
            if bp.skip_when.as_ref().is_some_and(|re| re.is_match(remaining)) {
                continue;
            }
            let found = match &bp.matcher {
                None => self.page_candidate(bp, w),
                Some(re) => self.pattern_candidate(re, bp, w),
            };
            if let Some(position) = found {
                return (position, BreakSource::Breakpoint(index));
            }
        }

        if w.length_limited {
            return (whitespace_cut(text, w.cursor, w.end), BreakSource::ContentLength);
        }

        let map = self.buffer.map();
        let next = (w.from_idx + 1).min(w.last_idx);
        let page = match self.prefer {
            Prefer::Longer if w.end_idx > w.from_idx => w.end_idx,
            _ => next,
        };
        (map.boundary(page).start, BreakSource::PageBoundary)
    }

    /// Page starts inside the window, or the next page start.
    fn page_candidate(&self, bp: &CompiledBreakpoint, w: &Window) -> Option<usize> {
        let map = self.buffer.map();
        let mut candidates = (w.from_idx + 1..=w.end_idx)
            .map(|j| map.boundary(j))
            .filter(|b| b.start < w.end && bp.pages.allows(b.id))
            .map(|b| b.start);
        let chosen = match self.prefer {
            Prefer::Longer => candidates.last(),
            Prefer::Shorter => candidates.next(),
        };
        if chosen.is_some() || w.length_limited || w.from_idx >= w.last_idx {
            return chosen;
        }
        let next = map.boundary(w.from_idx + 1);
        bp.pages.allows(next.id).then_some(next.start)
    }

    fn pattern_candidate(&self, re: &Regex, bp: &CompiledBreakpoint, w: &Window) -> Option<usize> {
        let map = self.buffer.map();
        let mut chosen = None;
        for m in re.find_iter(&self.buffer.text()[w.cursor..w.end]) {
            let position = w.cursor
                + match bp.split {
                    SplitPosition::At => m.start(),
                    SplitPosition::After => m.end(),
                };
            if position <= w.cursor || position >= w.segment_end {
                continue;
            }
            if !bp.pages.allows(map.id_at(position)) {
                continue;
            }
            chosen = Some(position);
            if self.prefer == Prefer::Shorter {
                break;
            }
        }
        chosen
    }

    fn provenance(&self, source: BreakSource) -> Option<Meta> {
        let debug = self.debug?;
        let (kind, field, value): (Provenance, &str, Value) = match source {
            BreakSource::Breakpoint(index) => (
                Provenance::Breakpoint,
                "breakpoint",
                json!({ "index": index, "pattern": self.breakpoints[index].label }),
            ),
            BreakSource::PageBoundary => (
                Provenance::Breakpoint,
                "breakpoint",
                json!({ "pattern": "", "fallback": true }),
            ),
            BreakSource::ContentLength => (
                Provenance::ContentLengthSplit,
                "contentLengthSplit",
                json!({ "maxContentLength": self.max_len }),
            ),
        };
        if !debug.includes(kind) {
            return None;
        }
        let mut meta = Meta::new();
        insert_provenance(&mut meta, &debug.meta_key, field, value);
        Some(meta)
    }
}

/// After the last whitespace in `[cursor, end)`, or `end`.
fn whitespace_cut(text: &str, cursor: usize, end: usize) -> usize {
    text[cursor..end]
        .char_indices()
        .rev()
        .find(|&(i, c)| i > 0 && c.is_whitespace())
        .map_or(end, |(i, c)| cursor + i + c.len_utf8())
}

/// Characters that must stay attached to the character before them.
fn is_attached(ch: char) -> bool {
    is_diacritic(ch)
        || matches!(
            ch,
            '\u{0300}'..='\u{036F}'
                | '\u{0610}'..='\u{061A}'
                | '\u{0653}'..='\u{065F}'
                | '\u{0670}'
                | '\u{06D6}'..='\u{06DC}'
                | '\u{06DF}'..='\u{06E4}'
                | '\u{06E7}'..='\u{06E8}'
                | '\u{06EA}'..='\u{06ED}'
                | '\u{200C}'..='\u{200D}'
                | '\u{FE00}'..='\u{FE0F}'
        )
}

fn is_safe_boundary(text: &str, pos: usize) -> bool {
    if pos == 0 || pos >= text.len() {
        return true;
    }
    if !text.is_char_boundary(pos) {
        return false;
    }
    if text[pos..].chars().next().is_some_and(is_attached)
        || text[..pos].chars().next_back() == Some('\u{200D}')
    {
        return false;
    }
    GraphemeCursor::new(pos, text.len(), true)
        .is_boundary(text, 0)
        .unwrap_or(true)
}

/// Move `pos` back to a safe boundary after `cursor`; if there is none,
/// forward to one at or before `limit`.
pub(crate) fn safe_break(text: &str, cursor: usize, pos: usize, limit: usize) -> usize {
    let mut back = pos.min(limit);
    while back > cursor && !is_safe_boundary(text, back) {
        back -= 1;
    }
    if back > cursor {
        return back;
    }
    let mut forward = (cursor + 1).max(pos);
    while forward < limit && !is_safe_boundary(text, forward) {
        forward += 1;
    }
    forward.min(limit)
}
