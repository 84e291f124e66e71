//! services/api/src/adapters/similarity.rs
//!
//! A local `SimilarityService` that scores two texts by the cosine of their
//! word-count vectors. Used when no embeddings collaborator is configured.

use async_trait::async_trait;
use quiz_supply_core::dedup::normalize;
use quiz_supply_core::ports::{PortResult, SimilarityService};
use std::collections::HashMap;

#[derive(Clone, Default)]
pub struct TokenOverlapSimilarity;

impl TokenOverlapSimilarity {
    pub fn new() -> Self {
        Self
    }

    fn counts(text: &str) -> HashMap<String, f64> {
        let mut counts = HashMap::new();
        for token in normalize(text)
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            *counts.entry(token.to_string()).or_insert(0.0) += 1.0;
        }
        counts
    }

    /// Cosine similarity in `[0, 1]`; empty texts score 0.
    pub fn score(a: &str, b: &str) -> f64 {
        let va = Self::counts(a);
        let vb = Self::counts(b);
        if va.is_empty() || vb.is_empty() {
            return 0.0;
        }
        let dot: f64 = va
            .iter()
            .filter_map(|(token, x)| vb.get(token).map(|y| x * y))
            .sum();
        let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
        (dot / (norm(&va) * norm(&vb))).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl SimilarityService for TokenOverlapSimilarity {
    async fn similarity(&self, a: &str, b: &str) -> PortResult<f64> {
        Ok(Self::score(a, b))
    }
}
