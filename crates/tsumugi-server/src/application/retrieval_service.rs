//! Vector Retriever
//!
//! Cosine-similarity search over a bounded pool of recent chunks.
//! A thread scope is searched first and backfilled from the user's
//! other documents when it holds fewer than `top_k` chunks.

use std::collections::HashSet;
use std::sync::Arc;

use tsumugi::domain::{rank_by_similarity, sort_by_similarity};
use tsumugi::{ChunkScope, DocumentRepository, EmbeddingService, ScoredChunk};

use super::errors::RetrievalError;

pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 10;
pub const DEFAULT_TOP_K: usize = 5;

/// Candidate pool floor
const MIN_CANDIDATES: usize = 100;
const CANDIDATES_PER_RESULT: usize = 20;

/// Clamp a requested result count into `1..=10`
pub fn clamp_top_k(top_k: i64) -> usize {
    top_k.clamp(MIN_TOP_K as i64, MAX_TOP_K as i64) as usize
}

fn candidate_pool(top_k: usize) -> usize {
    (top_k * CANDIDATES_PER_RESULT).max(MIN_CANDIDATES)
}

pub struct VectorRetriever<R: DocumentRepository, E: EmbeddingService> {
    repo: Arc<R>,
    embedding: Arc<E>,
}

impl<R: DocumentRepository, E: EmbeddingService> VectorRetriever<R, E> {
    pub fn new(repo: Arc<R>, embedding: Arc<E>) -> Self {
        Self { repo, embedding }
    }

    /// Top `top_k` chunks by descending similarity to `query`
    pub async fn search(
        &self,
        user_id: &str,
        thread_id: Option<&str>,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let top_k = top_k.clamp(MIN_TOP_K, MAX_TOP_K);
        let pool = candidate_pool(top_k);

        let query_vector = self
            .embedding
            .embed(query)
            .await
            .map_err(RetrievalError::Embedding)?;

        let user_scope = ChunkScope::User {
            user_id: user_id.to_string(),
        };

        let mut scored = match thread_id {
            Some(thread_id) => {
                let thread_scope = ChunkScope::Thread {
                    user_id: user_id.to_string(),
                    thread_id: thread_id.to_string(),
                };
                let candidates = self.candidates(&thread_scope, pool).await?;
                let thread_count = candidates.len();
                let mut scored = rank_by_similarity(&query_vector, candidates);

                if thread_count < top_k {
                    let seen: HashSet<_> = scored.iter().map(|s| s.chunk.id).collect();
                    let backfill: Vec<_> = self
                        .candidates(&user_scope, pool)
                        .await?
                        .into_iter()
                        .filter(|c| !seen.contains(&c.id))
                        .collect();

                    tracing::debug!(
                        "Thread {} has {} chunks, backfilling from {} user chunks",
                        thread_id,
                        thread_count,
                        backfill.len()
                    );
                    scored.extend(rank_by_similarity(&query_vector, backfill));
                }
                scored
            }
            None => rank_by_similarity(&query_vector, self.candidates(&user_scope, pool).await?),
        };

        sort_by_similarity(&mut scored);
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn candidates(
        &self,
        scope: &ChunkScope,
        limit: usize,
    ) -> Result<Vec<tsumugi::DocumentChunk>, RetrievalError> {
        self.repo
            .find_candidates(scope, limit)
            .await
            .map_err(RetrievalError::Repository)
    }
}
