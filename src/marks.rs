//! Pure helpers over mark codes and composite labels.

use crate::error::LabelError;
use crate::model::{Level, MarkType};
use once_cell::sync::Lazy;
use regex::Regex;

/// Classify a mark code by prefix, `dM` taking precedence over `M`.
///
/// Matching is case-sensitive: `dm1` is not a dependent method mark.
///
/// ```
/// use paperbank::marks::classify_mark_code;
/// use paperbank::model::MarkType;
///
/// assert_eq!(classify_mark_code("dM2"), Some(MarkType::DependentMethod));
/// assert_eq!(classify_mark_code("X9"), None);
/// ```
pub fn classify_mark_code(code: &str) -> Option<MarkType> {
    if code.starts_with("dM") {
        Some(MarkType::DependentMethod)
    } else if code.starts_with('M') {
        Some(MarkType::Method)
    } else if code.starts_with('A') {
        Some(MarkType::Accuracy)
    } else if code.starts_with('B') {
        Some(MarkType::Independent)
    } else {
        None
    }
}

/// A composite label split into its own label and its parent's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLabel {
    pub label: String,
    pub parent_label: Option<String>,
}

static RE_LABEL_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([A-Za-z0-9]+\)").unwrap());

/// Split `(a)(i)` style labels.
///
/// For `subsub` marks with exactly two tokens the first is the parent and the
/// second the label. Any other level, or a single token, yields the first
/// token as label and no parent. Zero tokens or more than two are rejected;
/// callers skip the record instead of guessing.
pub fn split_label(full_label: &str, level: Level) -> Result<ParsedLabel, LabelError> {
    let tokens: Vec<&str> = RE_LABEL_TOKEN
        .find_iter(full_label)
        .map(|m| m.as_str())
        .collect();

    match tokens.as_slice() {
        [] => Err(LabelError::NoTokens(full_label.to_string())),
        [parent, label] if level == Level::Subsub => Ok(ParsedLabel {
            label: label.to_string(),
            parent_label: Some(parent.to_string()),
        }),
        [first] | [first, _] => Ok(ParsedLabel {
            label: first.to_string(),
            parent_label: None,
        }),
        more => Err(LabelError::TooManyTokens {
            label: full_label.to_string(),
            count: more.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_prefix_precedence() {
        assert_eq!(classify_mark_code("dM2"), Some(MarkType::DependentMethod));
        assert_eq!(classify_mark_code("M1"), Some(MarkType::Method));
        assert_eq!(classify_mark_code("A1*"), Some(MarkType::Accuracy));
        assert_eq!(classify_mark_code("B1ft"), Some(MarkType::Independent));
        assert_eq!(classify_mark_code("X9"), None);
        assert_eq!(classify_mark_code(""), None);
    }

    #[test]
    fn subsub_with_two_tokens_has_parent() {
        let parsed = split_label("(a)(i)", Level::Subsub).unwrap();
        assert_eq!(parsed.label, "(i)");
        assert_eq!(parsed.parent_label.as_deref(), Some("(a)"));
    }

    #[test]
    fn sub_label_has_no_parent() {
        let parsed = split_label("(b)", Level::Sub).unwrap();
        assert_eq!(parsed.label, "(b)");
        assert_eq!(parsed.parent_label, None);
    }

    #[test]
    fn two_tokens_outside_subsub_take_first() {
        let parsed = split_label("(a)(ii)", Level::Sub).unwrap();
        assert_eq!(parsed.label, "(a)");
        assert_eq!(parsed.parent_label, None);
    }

    #[test]
    fn single_token_subsub_has_no_parent() {
        let parsed = split_label("(ii)", Level::Subsub).unwrap();
        assert_eq!(parsed.label, "(ii)");
        assert_eq!(parsed.parent_label, None);
    }

    #[test]
    fn malformed_labels_are_rejected() {
        assert_eq!(
            split_label("", Level::Main),
            Err(LabelError::NoTokens(String::new()))
        );
        assert!(matches!(
            split_label("(a)(i)(x)", Level::Subsub),
            Err(LabelError::TooManyTokens { count: 3, .. })
        ));
    }
}
