//! Vector and entity utilities shared by the reranker and the stores.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::document::Entity;

/// Compute cosine similarity between two vectors.
///
/// Returns `None` when either vector has zero magnitude or the similarity
/// cannot be represented, in which case it is undefined. Each vector is
/// divided by its largest absolute component first, so finite inputs of any
/// scale neither overflow nor underflow. The result is clamped to `[-1, 1]`.
/// Callers must pass vectors of equal length.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    let scale_a = max_abs(a)?;
    let scale_b = max_abs(b)?;

    let dot: f64 = a.iter().zip(b).map(|(x, y)| (x / scale_a) * (y / scale_b)).sum();
    let norm_a: f64 = a.iter().map(|x| (x / scale_a).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|y| (y / scale_b).powi(2)).sum::<f64>().sqrt();

    let similarity = dot / (norm_a * norm_b);
    if !similarity.is_finite() {
        return None;
    }
    // `+ 0.0` folds -0.0 into 0.0 so equal scores compare equal.
    Some(similarity.clamp(-1.0, 1.0) + 0.0)
}

/// Largest absolute component, or `None` for a zero or non-finite vector.
fn max_abs(v: &[f64]) -> Option<f64> {
    let max = v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    (max > 0.0 && max.is_finite()).then_some(max)
}

/// How entity surface texts are compared when looking for overlap.
///
/// Only the surface text takes part; labels and offsets are ignored.
/// Matching is always whole-string, never substring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityMatch {
    /// Byte-for-byte equal surface text.
    #[default]
    Exact,
    /// Surface texts equal after Unicode lowercasing.
    CaseInsensitive,
}

impl EntityMatch {
    fn key(self, text: &str) -> String {
        match self {
            Self::Exact => text.to_string(),
            Self::CaseInsensitive => text.to_lowercase(),
        }
    }

    /// The set of comparable surface texts for a list of entities.
    pub fn surface_set(self, entities: &[Entity]) -> HashSet<String> {
        entities.iter().map(|e| self.key(&e.text)).collect()
    }

    /// Whether the entities share at least one surface text with `query`.
    pub fn overlaps(self, entities: &[Entity], query: &HashSet<String>) -> bool {
        entities.iter().any(|e| query.contains(&self.key(&e.text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![0.3, -0.2, 0.9];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector_is_undefined() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), None);
    }

    #[test]
    fn test_cosine_similarity_ignores_magnitude() {
        let sim = cosine_similarity(&[2.0, 0.0], &[10.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity_large_components() {
        let sim = cosine_similarity(&[1e200, 1e200], &[1e200, 0.0]).unwrap();
        assert!((sim - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);

        let sim = cosine_similarity(&[0.9, 0.1], &[1e200, 0.0]).unwrap();
        assert!((sim - 0.9 / 0.82_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity_tiny_components() {
        let sim = cosine_similarity(&[1e-170, 0.0], &[1.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-12);

        let sim = cosine_similarity(&[1e-170, 1e-170], &[0.0, 5e-324]).unwrap();
        assert!((sim - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity_non_finite_is_undefined() {
        assert_eq!(cosine_similarity(&[f64::INFINITY, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[f64::NAN, 1.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_is_positive_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, -1.0]).unwrap();
        assert_eq!(sim.to_bits(), 0.0_f64.to_bits());
    }

    #[test]
    fn exact_match_compares_surface_text_only() {
        let query =
            EntityMatch::Exact.surface_set(&[Entity::new("Computer Science", "MISC", 0, 15)]);
        let chunk = vec![
            Entity::new("University of the Philippines", "ORG", 0, 28),
            Entity::new("Computer Science", "ORG", 30, 46),
        ];
        assert!(EntityMatch::Exact.overlaps(&chunk, &query));
    }

    #[test]
    fn exact_match_is_case_sensitive_and_whole_string() {
        let query =
            EntityMatch::Exact.surface_set(&[Entity::new("Computer Science", "MISC", 0, 15)]);
        let lowered = [Entity::new("computer science", "MISC", 0, 0)];
        assert!(!EntityMatch::Exact.overlaps(&lowered, &query));
        assert!(!EntityMatch::Exact.overlaps(&[Entity::new("Computer", "MISC", 0, 0)], &query));
    }

    #[test]
    fn case_insensitive_match() {
        let policy = EntityMatch::CaseInsensitive;
        let query = policy.surface_set(&[Entity::new("Computer Science", "MISC", 0, 15)]);
        assert!(policy.overlaps(&[Entity::new("COMPUTER SCIENCE", "MISC", 0, 0)], &query));
        assert!(!policy.overlaps(&[Entity::new("Computer", "MISC", 0, 0)], &query));
    }

    #[test]
    fn empty_entity_lists_never_overlap() {
        let query = EntityMatch::Exact.surface_set(&[Entity::new("Manila", "GPE", 0, 6)]);
        assert!(!EntityMatch::Exact.overlaps(&[], &query));
        let empty = EntityMatch::Exact.surface_set(&[]);
        assert!(!EntityMatch::Exact.overlaps(&[Entity::new("Manila", "GPE", 0, 6)], &empty));
    }
}
