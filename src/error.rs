//! Error types for tabwib.
//!
//! Only configuration problems are errors. Odd input data (empty pages,
//! gapped ids, rules that never match) always produces a best-effort result,
//! and validator findings are returned as a report.

/// Errors that can occur while preparing a segmentation run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A rule declared zero or several pattern fields.
    #[error("rule must declare exactly one pattern field, found {found}")]
    PatternFieldCount {
        /// How many pattern fields were present.
        found: usize,
    },

    /// A list-shaped rule had no patterns in it.
    #[error("`{field}` must contain at least one pattern")]
    EmptyPatternList {
        /// The offending field name.
        field: &'static str,
    },

    /// A breakpoint object declared neither or both of `pattern` and `regex`.
    #[error("breakpoint must declare exactly one of `pattern` or `regex`, found {found}")]
    BreakpointFieldCount {
        /// How many pattern fields were present.
        found: usize,
    },

    /// A pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// The pattern text handed to the regex compiler.
        pattern: String,
        /// The underlying compiler error.
        #[source]
        source: regex::Error,
    },

    /// A preprocessing transform name is not known.
    #[error("unknown preprocess transform: {0}")]
    UnknownPreprocess(String),

    /// An options document could not be deserialized.
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}

/// Result type for tabwib operations.
pub type Result<T> = std::result::Result<T, Error>;
