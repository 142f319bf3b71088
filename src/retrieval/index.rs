use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};
use crate::storage::{Persisted, Store};

use super::Embedder;
use super::splitter::TextSplitter;

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexedChunk {
    pub document_id: String,
    pub position: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ScoredChunk {
    pub document_id: String,
    pub text: String,
    pub score: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexState {
    pub chunks: Vec<IndexedChunk>,
}

impl Persisted for IndexState {
    const KEY: &'static str = "vector-store";

    fn seed() -> Self {
        Self::default()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Split `text` and embed every chunk. Blocking: runs the embedder inline.
pub fn prepare_chunks(
    embedder: &dyn Embedder,
    splitter: &TextSplitter,
    document_id: &str,
    text: &str,
) -> ServiceResult<Vec<IndexedChunk>> {
    let pieces = splitter.split(text);
    if pieces.is_empty() {
        return Err(ServiceError::validation("No valid document chunks created"));
    }
    let embeddings = embedder.embed_documents(&pieces)?;
    if embeddings.len() != pieces.len() {
        return Err(ServiceError::upstream(format!(
            "Embedder returned {} vectors for {} chunks",
            embeddings.len(),
            pieces.len()
        )));
    }
    tracing::debug!(document_id, chunks = pieces.len(), "embedded document");
    Ok(pieces
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(position, (text, embedding))| IndexedChunk {
            document_id: document_id.to_string(),
            position,
            text,
            embedding,
        })
        .collect())
}

impl Store<IndexState> {
    pub fn chunk_count(&self) -> usize {
        self.state().chunks.len()
    }

    /// Replace any chunks previously indexed for the same document.
    pub fn insert_chunks(&mut self, document_id: &str, chunks: Vec<IndexedChunk>) {
        self.remove_document_chunks(document_id);
        self.state_mut().chunks.extend(chunks);
    }

    pub fn remove_document_chunks(&mut self, document_id: &str) -> usize {
        let chunks = &mut self.state_mut().chunks;
        let before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        before - chunks.len()
    }

    /// Drop chunks whose document no longer exists.
    pub fn retain_documents(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let chunks = &mut self.state_mut().chunks;
        let before = chunks.len();
        chunks.retain(|c| keep(&c.document_id));
        before - chunks.len()
    }

    pub fn clear_chunks(&mut self) {
        self.state_mut().chunks.clear();
    }

    /// The `k` chunks closest to `query` by cosine similarity, best first.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .state()
            .chunks
            .iter()
            .map(|c| ScoredChunk {
                document_id: c.document_id.clone(),
                text: c.text.clone(),
                score: cosine_similarity(query, &c.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }
}
