//! Page-content preprocessing applied before segmentation.
//!
//! Transforms are named in option documents (`"preprocess": ["removeZeroWidth"]`)
//! and applied page by page, in order. The validator applies the same list
//! so that it searches the text the segmenter actually saw.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Error;

/// A text transform applied to every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Preprocess {
    /// Drop zero-width spaces, marks and BOMs (U+200B..=U+200F, U+2060, U+FEFF).
    RemoveZeroWidth,
    /// Replace runs of three or more dots with `…`.
    CondenseEllipsis,
    /// Attach a detached conjunction `و` to the following word.
    FixTrailingWaw,
}

impl Preprocess {
    /// The transform's name in option documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoveZeroWidth => "removeZeroWidth",
            Self::CondenseEllipsis => "condenseEllipsis",
            Self::FixTrailingWaw => "fixTrailingWaw",
        }
    }

    /// Apply this transform.
    #[must_use]
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self {
            Self::RemoveZeroWidth => {
                if text.chars().any(is_zero_width) {
                    Cow::Owned(text.chars().filter(|c| !is_zero_width(*c)).collect())
                } else {
                    Cow::Borrowed(text)
                }
            }
            Self::CondenseEllipsis => ellipsis_regex().replace_all(text, "…"),
            Self::FixTrailingWaw => waw_regex().replace_all(text, "${1}و${2}"),
        }
    }
}

fn is_zero_width(ch: char) -> bool {
    matches!(ch, '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}')
}

fn ellipsis_regex() -> &'static Regex {
    static ELLIPSIS: OnceLock<Regex> = OnceLock::new();
    ELLIPSIS.get_or_init(|| Regex::new(r"\.{3,}").expect("ellipsis regex is valid"))
}

fn waw_regex() -> &'static Regex {
    static WAW: OnceLock<Regex> = OnceLock::new();
    WAW.get_or_init(|| {
        Regex::new(r"(^|[ \t])و[ \t]+(\p{Arabic})").expect("waw regex is valid")
    })
}

impl FromStr for Preprocess {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "removeZeroWidth" => Ok(Self::RemoveZeroWidth),
            "condenseEllipsis" => Ok(Self::CondenseEllipsis),
            "fixTrailingWaw" => Ok(Self::FixTrailingWaw),
            other => Err(Error::UnknownPreprocess(other.to_string())),
        }
    }
}

impl TryFrom<String> for Preprocess {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Preprocess> for &'static str {
    fn from(p: Preprocess) -> Self {
        p.as_str()
    }
}

impl std::fmt::Display for Preprocess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalise line endings to `\n` and run `transforms` in order.
#[must_use]
pub fn normalize_page(content: &str, transforms: &[Preprocess]) -> String {
    let mut text = if content.contains('\r') {
        content.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        content.to_string()
    };
    for transform in transforms {
        if let Cow::Owned(changed) = transform.apply(&text) {
            text = changed;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("removeZeroWidth".parse::<Preprocess>().unwrap(), Preprocess::RemoveZeroWidth);
        let err = "shout".parse::<Preprocess>().unwrap_err();
        assert!(matches!(err, Error::UnknownPreprocess(name) if name == "shout"));
    }

    #[test]
    fn test_serde_uses_names() {
        let list: Vec<Preprocess> =
            serde_json::from_str(r#"["condenseEllipsis", "fixTrailingWaw"]"#).unwrap();
        assert_eq!(list, vec![Preprocess::CondenseEllipsis, Preprocess::FixTrailingWaw]);
        assert_eq!(serde_json::to_string(&list[0]).unwrap(), r#""condenseEllipsis""#);
        assert!(serde_json::from_str::<Vec<Preprocess>>(r#"["nope"]"#).is_err());
    }

    #[test]
    fn test_remove_zero_width() {
        let out = Preprocess::RemoveZeroWidth.apply("a\u{200B}b\u{FEFF}c");
        assert_eq!(out, "abc");
        assert!(matches!(Preprocess::RemoveZeroWidth.apply("abc"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_condense_ellipsis() {
        assert_eq!(Preprocess::CondenseEllipsis.apply("قال.... ثم"), "قال… ثم");
        assert_eq!(Preprocess::CondenseEllipsis.apply("a.b..c"), "a.b..c");
    }

    #[test]
    fn test_fix_trailing_waw() {
        assert_eq!(Preprocess::FixTrailingWaw.apply("قال و حدثنا"), "قال وحدثنا");
        assert_eq!(Preprocess::FixTrailingWaw.apply("و قال"), "وقال");
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_page("a\r\nb\rc", &[]), "a\nb\nc");
    }
}
