//! Decides whether a scraped title plausibly refers to the same
//! product as a catalog reference.
//!
//! Vendors frequently land searches on a near-miss article (successor
//! model, accessory, multi-unit bundle). Accepting one of those
//! silently corrupts the store, so every ambiguous landing goes
//! through the weighted score below before extraction proceeds.

use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

/// Accept threshold on the 0-1 score scale. Vendors can override it;
/// historical call sites were tuned independently, so the knob stays
/// per-vendor instead of being unified.
pub const DEFAULT_MATCH_CUTOFF: f64 = 0.70;

/// Multi-unit listing keywords. A title carrying one of these can
/// never be attributed to a single reference, whatever its tokens
/// have in common with it.
const BUNDLE_KEYWORDS: &[&str] = &["PACK", "KIT", "SET", "COMBO", "BUNDLE", "LOT"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum token length kept by `tokenize`.
    pub min_token_len: usize,
    /// Weight of the code-token similarity component.
    pub code_weight: f64,
    /// Weight of the full-title similarity component.
    pub title_weight: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_token_len: 2,
            code_weight: 0.7,
            title_weight: 0.3,
        }
    }
}

pub struct ReferenceMatcher {
    pub config: MatcherConfig,
    token_re: Regex,
}

impl ReferenceMatcher {
    pub fn new(config: MatcherConfig) -> crate::Result<Self> {
        Ok(Self {
            config,
            // Applied to normalized (uppercased) text.
            token_re: Regex::new(r"[A-Z0-9]+")?,
        })
    }

    /// Uppercase, trim, collapse internal whitespace.
    pub fn normalize(text: &str) -> String {
        text.to_uppercase().split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Alphanumeric tokens of at least the configured length.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = Self::normalize(text);
        self.token_re
            .find_iter(&normalized)
            .map(|m| m.as_str().to_string())
            .filter(|t| t.len() >= self.config.min_token_len)
            .collect()
    }

    /// True when the title names a multi-unit listing.
    pub fn is_bundle(&self, title: &str) -> bool {
        self.tokenize(title)
            .iter()
            .any(|t| BUNDLE_KEYWORDS.contains(&t.as_str()))
    }

    /// Tokens that look like part codes: mixed letters-and-digits, or
    /// any alphanumeric run of length >= 5.
    pub fn extract_code_tokens(&self, text: &str) -> Vec<String> {
        self.tokenize(text)
            .into_iter()
            .filter(|t| {
                let has_alpha = t.chars().any(|c| c.is_ascii_alphabetic());
                let has_digit = t.chars().any(|c| c.is_ascii_digit());
                (has_alpha && has_digit) || t.len() >= 5
            })
            .collect()
    }

    fn token_sort(&self, text: &str) -> String {
        let mut tokens = self.tokenize(text);
        tokens.sort();
        tokens.join(" ")
    }

    /// Weighted similarity between a catalog reference and a candidate
    /// title, 0-1. Bundles and empty titles score 0.
    pub fn score(&self, reference: &str, title: &str) -> f64 {
        if Self::normalize(title).is_empty() || self.is_bundle(title) {
            return 0.0;
        }

        let mut ref_codes = self.extract_code_tokens(reference);
        let mut title_codes = self.extract_code_tokens(title);
        ref_codes.sort();
        title_codes.sort();

        let title_sim = jaro_winkler(&self.token_sort(reference), &self.token_sort(title));

        if ref_codes.is_empty() && title_codes.is_empty() {
            // Nothing code-like on either side: the title comparison
            // is all the signal there is.
            return title_sim;
        }

        // One side has code tokens and the other does not: that
        // asymmetry is itself a mismatch signal, the code component
        // is forced to zero.
        let code_sim = if ref_codes.is_empty() || title_codes.is_empty() {
            0.0
        } else {
            jaro_winkler(&ref_codes.join(" "), &title_codes.join(" "))
        };

        self.config.code_weight * code_sim + self.config.title_weight * title_sim
    }

    /// Highest-scoring candidate at or above `cutoff`, if any. An
    /// empty pool is a plain no-match.
    pub fn best_match<'a, I>(
        &self,
        reference: &str,
        candidates: I,
        cutoff: f64,
    ) -> Option<(&'a str, f64)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .map(|candidate| (candidate, self.score(reference, candidate)))
            .filter(|(_, score)| *score >= cutoff)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn matcher() -> ReferenceMatcher {
        ReferenceMatcher::new(MatcherConfig::default()).unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            ReferenceMatcher::normalize("  makita\t dga506z \n 18v "),
            "MAKITA DGA506Z 18V"
        );
    }

    #[test]
    fn test_tokenize_min_length() {
        let m = matcher();
        assert_eq!(m.tokenize("a DGA506Z x 18V"), vec!["DGA506Z", "18V"]);
    }

    #[rstest]
    #[case("Pack 3x DGA506Z")]
    #[case("Makita combo driver")]
    #[case("Starter KIT 18V")]
    #[case("Lot de 2 batteries")]
    #[case("Bundle: drill + charger")]
    #[case("Coffret set complet")]
    fn test_is_bundle(#[case] title: &str) {
        assert!(matcher().is_bundle(title));
    }

    #[test]
    fn test_is_bundle_needs_whole_token() {
        // "offset"/"settings" must not trip the SET keyword.
        let m = matcher();
        assert!(!m.is_bundle("Offset wrench with settings dial"));
    }

    #[test]
    fn test_extract_code_tokens() {
        let m = matcher();
        // Mixed alnum and long runs qualify, short plain words do not.
        assert_eq!(
            m.extract_code_tokens("Makita DGA506Z 18V saw"),
            vec!["MAKITA", "DGA506Z", "18V"]
        );
    }

    #[test]
    fn test_score_bundle_forced_to_zero() {
        let m = matcher();
        // Token overlap is perfect, the bundle keyword still wins.
        assert_eq!(m.score("DGA506Z", "Pack 3x DGA506Z"), 0.0);
    }

    #[test]
    fn test_score_bundle_set_rejected() {
        let m = matcher();
        let score = m.score("DGA506Z", "Makita Combo Driver + Impact Wrench Set");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_score_exact_code_exceeds_cutoff() {
        let m = matcher();
        let score = m.score("DGA506Z", "Makita DGA506Z 18V Brushless Driver");
        assert!(
            score > DEFAULT_MATCH_CUTOFF,
            "expected > {DEFAULT_MATCH_CUTOFF}, got {score}"
        );
    }

    #[test]
    fn test_score_identical_is_one() {
        let m = matcher();
        assert!((m.score("DGA506Z", "DGA506Z") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_empty_title_is_zero() {
        let m = matcher();
        assert_eq!(m.score("DGA506Z", ""), 0.0);
        assert_eq!(m.score("DGA506Z", "   "), 0.0);
    }

    #[test]
    fn test_score_asymmetric_code_absence() {
        let m = matcher();
        // Reference is code-like, title has nothing code-like: the
        // code component collapses to zero and the weighted sum can
        // never reach the cutoff.
        let score = m.score("DGA506Z", "blue tool");
        assert!(score < DEFAULT_MATCH_CUTOFF);
        assert!(score <= m.config.title_weight + 1e-9);
    }

    #[test]
    fn test_score_no_code_tokens_falls_back_to_title() {
        let m = matcher();
        // Neither side has a code-like token; pure title similarity.
        assert!((m.score("axe", "axe") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_best_match_selects_highest() {
        let m = matcher();
        let candidates = vec![
            "Pack 3x DGA506Z",
            "Makita DGA506Z 18V Brushless Driver",
            "Makita TD110D impact driver",
        ];
        let (best, score) = m
            .best_match("DGA506Z", candidates.iter().copied(), DEFAULT_MATCH_CUTOFF)
            .unwrap();
        assert_eq!(best, "Makita DGA506Z 18V Brushless Driver");
        assert!(score >= DEFAULT_MATCH_CUTOFF);
    }

    #[test]
    fn test_best_match_empty_pool() {
        let m = matcher();
        assert!(m
            .best_match("DGA506Z", std::iter::empty(), DEFAULT_MATCH_CUTOFF)
            .is_none());
    }

    #[test]
    fn test_best_match_all_below_cutoff() {
        let m = matcher();
        let candidates = vec!["garden hose", "blue paint"];
        assert!(m
            .best_match("DGA506Z", candidates.iter().copied(), DEFAULT_MATCH_CUTOFF)
            .is_none());
    }
}
