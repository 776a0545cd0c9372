//! Tag selector algebra shared between dependency declarations and the resolver.
//!
//! A dependency's `tags` list mixes three kinds of selector, distinguished by
//! an optional prefix: `+tag` (preferred), `-tag` (excluded), bare `tag`
//! (required). Parsing lives here so both the side that declares
//! dependencies and the side that matches them agree on the convention.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSelector<'a> {
    Required(&'a str),
    Preferred(&'a str),
    Excluded(&'a str),
}

/// Parse a single raw tag string into its selector kind.
pub fn parse_selector(raw: &str) -> TagSelector<'_> {
    if let Some(tag) = raw.strip_prefix('+') {
        TagSelector::Preferred(tag)
    } else if let Some(tag) = raw.strip_prefix('-') {
        TagSelector::Excluded(tag)
    } else {
        TagSelector::Required(raw)
    }
}

/// A dependency's tag selectors split into the three sets the resolver needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSelectors {
    pub required: Vec<String>,
    pub preferred: Vec<String>,
    pub excluded: Vec<String>,
}

impl TagSelectors {
    pub fn parse(raw_tags: &[String]) -> Self {
        let mut selectors = Self::default();
        for raw in raw_tags {
            match parse_selector(raw) {
                TagSelector::Required(t) => selectors.required.push(t.to_string()),
                TagSelector::Preferred(t) => selectors.preferred.push(t.to_string()),
                TagSelector::Excluded(t) => selectors.excluded.push(t.to_string()),
            }
        }
        selectors
    }

    /// Does `candidate_tags` satisfy the required/excluded constraints?
    pub fn is_satisfied_by(&self, candidate_tags: &[String]) -> bool {
        self.required.iter().all(|t| candidate_tags.contains(t))
            && self.excluded.iter().all(|t| !candidate_tags.contains(t))
    }

    /// Count of preferred tags present in `candidate_tags` — the resolver's score.
    pub fn preference_score(&self, candidate_tags: &[String]) -> usize {
        self.preferred
            .iter()
            .filter(|t| candidate_tags.contains(t))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixes() {
        assert_eq!(parse_selector("disk"), TagSelector::Required("disk"));
        assert_eq!(parse_selector("+disk"), TagSelector::Preferred("disk"));
        assert_eq!(parse_selector("-disk"), TagSelector::Excluded("disk"));
    }

    #[test]
    fn required_and_excluded() {
        let sel = TagSelectors::parse(&["system".into(), "-deprecated".into()]);
        assert!(sel.is_satisfied_by(&["system".into(), "disk".into()]));
        assert!(!sel.is_satisfied_by(&["system".into(), "deprecated".into()]));
        assert!(!sel.is_satisfied_by(&["disk".into()]));
    }

    #[test]
    fn preference_score_counts_matches() {
        let sel = TagSelectors::parse(&["+disk".into(), "+fast".into()]);
        assert_eq!(sel.preference_score(&["disk".into()]), 1);
        assert_eq!(sel.preference_score(&["disk".into(), "fast".into()]), 2);
        assert_eq!(sel.preference_score(&["memory".into()]), 0);
    }
}
