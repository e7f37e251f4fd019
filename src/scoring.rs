use indexmap::IndexMap;

/// Score a text against the weighted keyword profile.
///
/// Iterates the weight map in its insertion order; each keyword that occurs
/// as a case-insensitive substring contributes its weight exactly once. For a
/// fixed text and map the output is bit-identical across runs.
pub fn calc_score(text: &str, keywords: &IndexMap<String, f64>) -> (f64, Vec<String>) {
    let haystack = text.to_lowercase();
    let mut sum = 0.0;
    let mut hits = Vec::new();

    for (word, weight) in keywords {
        if haystack.contains(&word.to_lowercase()) {
            sum += weight;
            hits.push(word.clone());
        }
    }
    (sum, hits)
}

/// Filter policy: an article is accepted iff its score meets the threshold.
/// Config validation guarantees the threshold is positive, so a zero-score
/// article can never pass.
pub fn accepts(score: f64, threshold: f64) -> bool {
    score >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn sums_matched_weights_case_insensitively() {
        let w = weights(&[("quantum", 2.0), ("graph", 1.5)]);
        let (score, hits) = calc_score("A Graph-based Quantum Algorithm", &w);
        assert_eq!(score, 3.5);
        assert_eq!(hits, vec!["quantum", "graph"]);
    }

    #[test]
    fn zero_score_iff_no_keyword_occurs() {
        let w = weights(&[("laser", 1.0), ("cavity", 0.5)]);
        let (score, hits) = calc_score("an unrelated abstract", &w);
        assert_eq!(score, 0.0);
        assert!(hits.is_empty());

        let (score, hits) = calc_score("a fiber LASER source", &w);
        assert!(score > 0.0);
        assert!(!hits.is_empty());
    }

    #[test]
    fn hits_follow_map_order_not_match_position() {
        let w = weights(&[("beta", 1.0), ("alpha", 1.0)]);
        let (_, hits) = calc_score("alpha comes before beta here", &w);
        assert_eq!(hits, vec!["beta", "alpha"]);
    }

    #[test]
    fn no_double_counting_for_repeated_keywords() {
        let w = weights(&[("photon", 1.0)]);
        let (score, hits) = calc_score("photon photon photon", &w);
        assert_eq!(score, 1.0);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn score_invariant_holds() {
        let w = weights(&[("spin", 0.7), ("qubit", 1.3), ("noise", 0.2)]);
        let (score, hits) = calc_score("qubit spin readout under noise", &w);
        let recomputed: f64 = hits.iter().map(|k| w[k]).sum();
        assert_eq!(score, recomputed);
    }

    #[test]
    fn threshold_filter_is_plain_greater_equal() {
        assert!(accepts(2.0, 2.0));
        assert!(accepts(3.5, 2.0));
        assert!(!accepts(1.9, 2.0));
    }
}
