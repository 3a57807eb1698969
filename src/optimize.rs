//! Rule list optimization.
//!
//! Rule sets grow by accretion: one `lineStartsWith` rule per heading word,
//! all with the same modifiers. Merging them into one rule means one
//! alternation instead of many regex scans.
//!
//! ## Ordering matters
//!
//! Regex alternation is first-match-wins. With `["باب", "باب ما جاء"]` the
//! short alternative shadows the long one. After merging, patterns are
//! sorted longest first (ties lexically), and rules are sorted by their
//! longest pattern, most specific first.
//!
//! ```text
//! {lineStartsWith: [a], meta: x}          {lineStartsWith: [bb, a], meta: x}
//! {lineStartsWith: [bb], meta: x}   ──►   {regex: ...}
//! {regex: ...}
//! ```
//!
//! Optimizing an optimized list changes nothing.

use std::collections::HashMap;

use crate::rule::RawRule;
use crate::Rule;

/// The result of [`optimize_rules`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedRules {
    /// The merged, reordered rules.
    pub rules: Vec<Rule>,
    /// How many rules were folded into another.
    pub merged_count: usize,
}

/// Merge list-shaped rules with identical modifiers and sort by specificity.
///
/// ```rust
/// use tabwib::{optimize_rules, Rule};
///
/// let out = optimize_rules(vec![
///     Rule::line_starts_with(["a"]).with_meta("t", "x"),
///     Rule::line_starts_with(["b"]).with_meta("t", "x"),
/// ]);
/// assert_eq!(out.merged_count, 1);
/// assert_eq!(out.rules.len(), 1);
/// assert_eq!(out.rules[0].pattern.patterns(), ["a", "b"]);
/// ```
#[must_use]
pub fn optimize_rules(rules: Vec<Rule>) -> OptimizedRules {
    let mut merged: Vec<Rule> = Vec::with_capacity(rules.len());
    let mut groups: HashMap<String, usize> = HashMap::new();
    let mut merged_count = 0;

    for rule in rules {
        if !rule.pattern.is_list() {
            merged.push(rule);
            continue;
        }
        let key = merge_key(&rule);
        if let Some(&slot) = groups.get(&key) {
            let target = &mut merged[slot];
            let mut patterns = target.pattern.patterns().to_vec();
            patterns.extend(rule.pattern.patterns().iter().cloned());
            target.pattern = target.pattern.with_patterns(patterns);
            merged_count += 1;
        } else {
            groups.insert(key, merged.len());
            merged.push(rule);
        }
    }

    for rule in &mut merged {
        if rule.pattern.is_list() {
            let patterns = sort_patterns(rule.pattern.patterns().to_vec());
            rule.pattern = rule.pattern.with_patterns(patterns);
        }
    }

    merged.sort_by_key(|rule| std::cmp::Reverse(specificity(rule)));

    tracing::debug!(
        rules = merged.len(),
        merged_count,
        "optimized rule list"
    );

    OptimizedRules {
        rules: merged,
        merged_count,
    }
}

/// Shape plus JSON of every other field.
fn merge_key(rule: &Rule) -> String {
    let modifiers = RawRule::from(rule.clone()).modifiers_only();
    let json = serde_json::to_string(&modifiers).unwrap_or_default();
    format!("{}:{json}", rule.pattern.kind())
}

/// Deduplicate, then longest first with lexical tie-break.
fn sort_patterns(mut patterns: Vec<String>) -> Vec<String> {
    patterns.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    patterns.dedup();
    patterns
}

/// The longest pattern in characters.
fn specificity(rule: &Rule) -> usize {
    rule.pattern
        .patterns()
        .iter()
        .map(|p| p.chars().count())
        .max()
        .unwrap_or(0)
}
