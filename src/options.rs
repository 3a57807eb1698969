//! Segmentation options.
//!
//! Options are plain data and deserialize from the JSON documents rule
//! authors already keep next to their corpora:
//!
//! ```json
//! {
//!   "rules": [{ "lineStartsWith": ["{{bab}} "], "meta": { "type": "chapter" } }],
//!   "breakpoints": ["{{tarqim}}\\s*", ""],
//!   "maxPages": 2,
//!   "prefer": "longer",
//!   "pageJoiner": "space",
//!   "debug": true,
//!   "preprocess": ["removeZeroWidth"]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Breakpoint, PageId, Preprocess, Result, Rule};

/// Page count from which the arithmetic windowing fast path is considered.
pub const DEFAULT_LARGE_DOCUMENT_THRESHOLD: usize = 1000;

/// Which in-window breakpoint match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prefer {
    /// The last match: pieces as large as the window allows.
    #[default]
    Longer,
    /// The first match.
    Shorter,
}

/// What replaces the separator between two pages inside one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageJoiner {
    /// A single space.
    #[default]
    Space,
    /// A line break.
    Newline,
}

impl PageJoiner {
    /// The joining character.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Space => ' ',
            Self::Newline => '\n',
        }
    }
}

/// A kind of provenance recorded in debug metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    /// Which rule started a segment.
    Rule,
    /// Which breakpoint started a piece.
    Breakpoint,
    /// That a piece was cut by the character limit.
    ContentLengthSplit,
}

/// Debug provenance settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugOptions {
    /// The metadata key provenance is stored under.
    pub meta_key: String,
    /// Which provenance kinds to record.
    pub include: Vec<Provenance>,
}

impl DebugOptions {
    /// Whether `kind` is recorded.
    #[must_use]
    pub fn includes(&self, kind: Provenance) -> bool {
        self.include.contains(&kind)
    }
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            meta_key: "_debug".to_string(),
            include: vec![
                Provenance::Rule,
                Provenance::Breakpoint,
                Provenance::ContentLengthSplit,
            ],
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DebugSetting {
    Flag(bool),
    Options(DebugOptions),
}

fn deserialize_debug<'de, D>(deserializer: D) -> std::result::Result<Option<DebugOptions>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<DebugSetting>::deserialize(deserializer)? {
        None | Some(DebugSetting::Flag(false)) => None,
        Some(DebugSetting::Flag(true)) => Some(DebugOptions::default()),
        Some(DebugSetting::Options(options)) => Some(options),
    })
}

/// Everything a segmentation run needs besides the pages.
///
/// ```rust
/// use tabwib::{Breakpoint, Rule, SegmentationOptions};
///
/// let options = SegmentationOptions::default()
///     .with_rules(vec![Rule::line_starts_with(["{{bab}} "])])
///     .with_breakpoints(vec![Breakpoint::page_boundary()])
///     .with_max_pages(1);
/// assert_eq!(options.max_pages, Some(1));
///
/// let parsed = SegmentationOptions::from_json(
///     r#"{"rules": [{"lineStartsWith": ["{{bab}} "]}], "breakpoints": [""], "maxPages": 1}"#,
/// )
/// .unwrap();
/// assert_eq!(parsed, options);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentationOptions {
    /// Split rules, in priority order.
    pub rules: Vec<Rule>,
    /// Breakpoints for oversized segments, tried in order.
    pub breakpoints: Vec<Breakpoint>,
    /// Largest allowed page-id span (`to - from`) of a segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<PageId>,
    /// Largest allowed segment length in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_content_length: Option<usize>,
    /// Which breakpoint match wins inside a window.
    pub prefer: Prefer,
    /// Replacement for page separators inside a segment.
    pub page_joiner: PageJoiner,
    /// Record provenance metadata.
    #[serde(
        deserialize_with = "deserialize_debug",
        skip_serializing_if = "Option::is_none"
    )]
    pub debug: Option<DebugOptions>,
    /// Transforms applied to every page first.
    pub preprocess: Vec<Preprocess>,
    /// Custom tokens overlaid on the default table.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,
    /// Page count from which windowing may use the arithmetic fast path.
    pub large_document_threshold: usize,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            breakpoints: Vec::new(),
            max_pages: None,
            max_content_length: None,
            prefer: Prefer::default(),
            page_joiner: PageJoiner::default(),
            debug: None,
            preprocess: Vec::new(),
            tokens: BTreeMap::new(),
            large_document_threshold: DEFAULT_LARGE_DOCUMENT_THRESHOLD,
        }
    }
}

impl SegmentationOptions {
    /// Parse an options document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidOptions`] for malformed JSON, rules with
    /// the wrong number of pattern fields, unknown transforms, and so on.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the rules.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Set the breakpoints.
    #[must_use]
    pub fn with_breakpoints(mut self, breakpoints: Vec<Breakpoint>) -> Self {
        self.breakpoints = breakpoints;
        self
    }

    /// Limit the page span of segments.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: PageId) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Limit segment length in characters.
    #[must_use]
    pub fn with_max_content_length(mut self, max: usize) -> Self {
        self.max_content_length = Some(max);
        self
    }

    /// Choose which breakpoint match wins.
    #[must_use]
    pub fn with_prefer(mut self, prefer: Prefer) -> Self {
        self.prefer = prefer;
        self
    }

    /// Choose the page joiner.
    #[must_use]
    pub fn with_page_joiner(mut self, joiner: PageJoiner) -> Self {
        self.page_joiner = joiner;
        self
    }

    /// Record provenance metadata.
    #[must_use]
    pub fn with_debug(mut self, debug: DebugOptions) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Set the preprocessing transforms.
    #[must_use]
    pub fn with_preprocess(mut self, preprocess: Vec<Preprocess>) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// Add a custom token.
    #[must_use]
    pub fn with_token(mut self, name: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.tokens.insert(name.into(), fragment.into());
        self
    }

    /// Set the page count from which the windowing fast path is considered.
    #[must_use]
    pub fn with_large_document_threshold(mut self, pages: usize) -> Self {
        self.large_document_threshold = pages;
        self
    }
}
