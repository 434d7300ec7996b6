//! Cosine similarity and ranking of document chunks

use crate::domain::entities::{DocumentChunk, ScoredChunk};

/// Cosine similarity `dot(a, b) / (|a| * |b|)`.
///
/// Vectors of unequal length are compared over their common prefix, with a
/// warning: it usually means chunks were embedded by a different model.
/// Returns 0.0 when either norm is zero so that sorting stays total.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            "Embedding dimension mismatch ({} vs {}), comparing the first {}",
            a.len(),
            b.len(),
            a.len().min(b.len())
        );
    }

    let mut dot = 0.0_f64;
    let mut a_norm = 0.0_f64;
    let mut b_norm = 0.0_f64;

    for (&av, &bv) in a.iter().zip(b.iter()) {
        let (av, bv) = (f64::from(av), f64::from(bv));
        dot += av * bv;
        a_norm += av * av;
        b_norm += bv * bv;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }

    let similarity = dot / (a_norm.sqrt() * b_norm.sqrt());
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0) as f32
}

/// Score every chunk against the query and sort by descending similarity.
///
/// The sort is stable: equally similar chunks keep their input order.
pub fn rank_by_similarity(query: &[f32], chunks: Vec<DocumentChunk>) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| ScoredChunk {
            similarity: cosine_similarity(query, &chunk.embedding),
            chunk,
        })
        .collect();

    sort_by_similarity(&mut scored);
    scored
}

/// Sort scored chunks by descending similarity (stable)
pub fn sort_by_similarity(scored: &mut [ScoredChunk]) {
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
}
