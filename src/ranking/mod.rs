// Query fusion: content similarity merged with filename matches


use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::config::ConfigError;
use crate::index::{DocumentRecord, StoreError, VectorStore};
use crate::index::vector_store::cosine_similarity;

/// Tuning parameters for result fusion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingConfig {
    /// Added to the content score of candidates whose filename contains the query
    pub filename_boost: f32,
    /// Score given to filename matches that content search did not surface
    pub filename_fallback_score: f32,
    /// Factor applied to the threshold for the candidate fetch
    pub threshold_relaxation: f32,
    /// Candidates fetched per requested result
    pub candidate_multiplier: usize,
    pub max_score: f32,
    /// Embed `"{q} filename: {q}"` alongside the query
    pub augment_filename_query: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            filename_boost: 0.3,
            filename_fallback_score: 0.6,
            threshold_relaxation: 0.5,
            candidate_multiplier: 2,
            max_score: 1.0,
            augment_filename_query: true,
        }
    }
}

impl RankingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("filename_boost", self.filename_boost, 0.0, 1.0)?;
        check_range(
            "filename_fallback_score",
            self.filename_fallback_score,
            0.0,
            1.0,
        )?;
        check_range("threshold_relaxation", self.threshold_relaxation, 0.0, 1.0)?;
        check_range("max_score", self.max_score, 0.0, 1.0)?;

        if !(1..=20).contains(&self.candidate_multiplier) {
            return Err(ConfigError::InvalidCandidateMultiplier(
                self.candidate_multiplier,
            ));
        }

        Ok(())
    }
}

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidRankingParameter {
            name,
            value,
            min,
            max,
        })
    }
}

/// Augmented query text embedded for filename-oriented scoring
#[inline]
pub fn filename_query(query: &str) -> String {
    format!("{} filename: {}", query, query)
}

/// Inputs of one ranking pass
#[derive(Debug, Clone, Copy)]
pub struct RankingRequest<'a> {
    pub query: &'a str,
    pub embedding: &'a [f32],
    /// Embedding of [`filename_query`], when computed
    pub filename_embedding: Option<&'a [f32]>,
    pub top_k: usize,
    pub threshold: Option<f32>,
}

/// A ranked search result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedDocument {
    #[serde(flatten)]
    pub record: DocumentRecord,
    /// Final fused score used for ordering
    pub similarity_score: f32,
    /// Raw cosine similarity; absent for filename-only matches
    pub content_score: Option<f32>,
    pub filename_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename_query_score: Option<f32>,
}

/// Rank store contents for a query.
///
/// Content candidates are fetched with a relaxed threshold, boosted when
/// their filename contains the query, and joined by any other filename
/// matches at the fallback score. The requested threshold is applied again
/// to the fused scores before truncating to `top_k`.
#[inline]
pub fn rank(
    store: &VectorStore,
    request: &RankingRequest<'_>,
    config: &RankingConfig,
) -> Result<Vec<RankedDocument>, StoreError> {
    if request.top_k == 0 {
        return Ok(Vec::new());
    }

    let candidate_k = request
        .top_k
        .saturating_mul(config.candidate_multiplier.max(1));
    let relaxed = request
        .threshold
        .map(|threshold| threshold * config.threshold_relaxation);
    let hits = store.search(request.embedding, candidate_k, relaxed)?;

    let needle = request.query.trim().to_lowercase();
    let matches_filename =
        |record: &DocumentRecord| !needle.is_empty() && record.filename.to_lowercase().contains(&needle);

    let filename_score = |position: usize| {
        request.filename_embedding.and_then(|query| {
            store
                .embedding(position)
                .map(|row| cosine_similarity(query, row))
        })
    };

    let mut seen = HashSet::new();
    let mut ranked = Vec::with_capacity(hits.len());
    for hit in hits {
        // Hits arrive best first, so the first occurrence of an id wins
        if !seen.insert(hit.record.doc_id.clone()) {
            continue;
        }

        let filename_match = matches_filename(&hit.record);
        let similarity_score = if filename_match {
            (hit.score + config.filename_boost).min(config.max_score)
        } else {
            hit.score
        };

        ranked.push(RankedDocument {
            filename_query_score: filename_score(hit.position),
            record: hit.record,
            similarity_score,
            content_score: Some(hit.score),
            filename_match,
        });
    }

    let candidates = ranked.len();
    for (position, record) in store.records().iter().enumerate() {
        if matches_filename(record) && seen.insert(record.doc_id.clone()) {
            ranked.push(RankedDocument {
                record: record.clone(),
                similarity_score: config.filename_fallback_score,
                content_score: None,
                filename_match: true,
                filename_query_score: filename_score(position),
            });
        }
    }

    debug!(
        "Ranking {:?}: {} content candidates, {} filename fallbacks",
        request.query,
        candidates,
        ranked.len() - candidates
    );

    ranked.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    if let Some(threshold) = request.threshold {
        ranked.retain(|doc| doc.similarity_score >= threshold);
    }
    ranked.truncate(request.top_k);

    Ok(ranked)
}
