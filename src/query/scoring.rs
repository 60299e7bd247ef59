//! Confidence scorer
//!
//! Blends vector similarity with lexical term overlap into the single
//! `combined_score` that gates the fallback decision. Pure and
//! deterministic: no collaborator calls, no clock, no randomness.

use crate::config::ScoringConfig;
use crate::query::lexicon;
use crate::types::{Candidate, ScoredCandidate};

pub struct Scorer {
    weights: ScoringConfig,
}

impl Scorer {
    pub fn new(weights: ScoringConfig) -> Self {
        Self { weights }
    }

    /// `w_dense * similarity + w_overlap * overlap`, the one place the
    /// weighting lives
    pub fn combine(&self, similarity: f32, overlap: f32) -> f32 {
        self.weights.dense_weight * similarity + self.weights.overlap_weight * overlap
    }

    pub fn score(&self, candidate: Candidate, query: &str) -> ScoredCandidate {
        let overlap = overlap_score(query, candidate.text());
        let combined = self.combine(candidate.similarity, overlap);
        ScoredCandidate {
            candidate,
            overlap_score: overlap,
            combined_score: combined,
        }
    }

    /// Score all candidates and sort by combined score, best first.
    pub fn rank(&self, candidates: Vec<Candidate>, query: &str) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|c| self.score(c, query))
            .collect();

        scored.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        scored
    }
}

/// Fraction of the query's content terms present in the candidate text,
/// counting a term as present when it or a known long form of it occurs.
/// Range [0, 1]; 0 when the query has no content terms.
pub fn overlap_score(query: &str, candidate_text: &str) -> f32 {
    let query_terms = lexicon::content_terms(query);
    if query_terms.is_empty() {
        return 0.0;
    }

    let candidate_terms = lexicon::expanded_term_set(candidate_text);
    let matched = query_terms
        .iter()
        .filter(|term| lexicon::term_matches(term, &candidate_terms))
        .count();

    matched as f32 / query_terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn candidate(text: &str, similarity: f32) -> Candidate {
        let mut payload = Map::new();
        payload.insert("question_rag_name".into(), Value::from(text));
        Candidate {
            id: "c".to_string(),
            similarity,
            payload,
        }
    }

    fn scorer(dense: f32, overlap: f32) -> Scorer {
        Scorer::new(ScoringConfig {
            dense_weight: dense,
            overlap_weight: overlap,
        })
    }

    #[test]
    fn test_combine_is_the_documented_formula() {
        // similarity 0.92, overlap 0.8, weights (0.7, 0.3) -> 0.884
        let s = scorer(0.7, 0.3);
        let combined = s.combine(0.92, 0.8);
        assert!((combined - 0.884).abs() < 1e-6);
    }

    #[test]
    fn test_combine_low_scores_fall_below_threshold() {
        // similarity 0.6, overlap 0.5, weights (0.7, 0.3) -> 0.57
        let s = scorer(0.7, 0.3);
        let combined = s.combine(0.6, 0.5);
        assert!((combined - 0.57).abs() < 1e-6);
        assert!(combined < 0.85);
    }

    #[test]
    fn test_score_is_pure() {
        let s = scorer(0.65, 0.35);
        let a = s.score(candidate("syarat membuat ktp", 0.9), "syarat ktp");
        let b = s.score(candidate("syarat membuat ktp", 0.9), "syarat ktp");
        assert_eq!(a.overlap_score, b.overlap_score);
        assert_eq!(a.combined_score, b.combined_score);
    }

    #[test]
    fn test_combined_monotone_in_both_inputs() {
        let s = scorer(0.65, 0.35);
        assert!(s.combine(0.8, 0.5) > s.combine(0.7, 0.5));
        assert!(s.combine(0.8, 0.6) > s.combine(0.8, 0.5));
    }

    #[test]
    fn test_overlap_full_and_partial() {
        assert_eq!(overlap_score("syarat ktp", "syarat membuat ktp baru"), 1.0);
        let half = overlap_score("syarat beasiswa", "syarat membuat ktp");
        assert!((half - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_overlap_counts_synonym_expansion() {
        // "ktp" present in the candidate only as its long form
        assert_eq!(overlap_score("syarat ktp", "syarat kartu tanda penduduk"), 1.0);
    }

    #[test]
    fn test_overlap_empty_query_terms_is_zero() {
        // Stopwords only
        assert_eq!(overlap_score("apa itu ini", "anything"), 0.0);
    }

    #[test]
    fn test_rank_sorts_by_combined_descending() {
        let s = scorer(1.0, 0.0);
        let ranked = s.rank(
            vec![
                candidate("a", 0.6),
                candidate("b", 0.9),
                candidate("c", 0.7),
            ],
            "pertanyaan uji coba",
        );
        assert_eq!(ranked[0].candidate.similarity, 0.9);
        assert_eq!(ranked[1].candidate.similarity, 0.7);
        assert_eq!(ranked[2].candidate.similarity, 0.6);
    }
}
