//! Input pages and output segments.

use serde::{Deserialize, Serialize};

/// Page identifier, as supplied by the caller.
///
/// Ids need not be contiguous or sorted; input order is document order.
pub type PageId = u32;

/// Segment metadata: static rule metadata, named captures, debug provenance.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// One page of the source corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// The caller's page id.
    pub id: PageId,
    /// The page text.
    pub content: String,
}

impl Page {
    /// Create a page.
    #[must_use]
    pub fn new(id: PageId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

/// A logical unit of the corpus.
///
/// `from` is the page the content starts on. `to` is only present when the
/// segment runs onto a later page:
///
/// ```rust
/// use tabwib::Segment;
///
/// let single = Segment::new("text", 4, 4);
/// assert_eq!(single.to, None);
///
/// let spanning = Segment::new("text", 4, 6);
/// assert_eq!(spanning.to, Some(6));
/// assert_eq!(spanning.last_page(), 6);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// The segment text.
    pub content: String,
    /// First page id.
    pub from: PageId,
    /// Last page id, when different from `from`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PageId>,
    /// Rule metadata and named captures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Segment {
    /// Create a segment; `to` is dropped when it equals `from`.
    #[must_use]
    pub fn new(content: impl Into<String>, from: PageId, to: PageId) -> Self {
        Self {
            content: content.into(),
            from,
            to: (to != from).then_some(to),
            meta: None,
        }
    }

    /// Attach metadata; an empty map is stored as `None`.
    #[must_use]
    pub fn with_meta(mut self, meta: Option<Meta>) -> Self {
        self.meta = meta.filter(|m| !m.is_empty());
        self
    }

    /// The last page id this segment touches.
    #[must_use]
    pub fn last_page(&self) -> PageId {
        self.to.unwrap_or(self.from)
    }

    /// The length of the content in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Whether the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to {
            Some(to) => write!(
                f,
                "Segment {{ pages: {}..={}, chars: {} }}",
                self.from,
                to,
                self.char_len()
            ),
            None => write!(
                f,
                "Segment {{ page: {}, chars: {} }}",
                self.from,
                self.char_len()
            ),
        }
    }
}
