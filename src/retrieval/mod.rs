//! Document chunking and nearest-neighbour lookup for the chat assistant.

pub mod index;
pub mod splitter;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ServiceError, ServiceResult};
use crate::integrations::run_blocking;
use crate::storage::{StorageError, Store};

pub use index::{DEFAULT_TOP_K, IndexState, IndexedChunk, ScoredChunk};
pub use splitter::TextSplitter;

/// Turns text into embedding vectors. Implementations may block.
pub trait Embedder: Send + Sync {
    fn embed_documents(&self, texts: &[String]) -> ServiceResult<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> ServiceResult<Vec<f32>> {
        self.embed_documents(&[text.to_string()])?
            .pop()
            .ok_or_else(|| ServiceError::upstream("Embedder returned no vector"))
    }
}

/// Persisted chunk index plus the embedder used to fill and query it.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<Mutex<Store<IndexState>>>,
    embedder: Option<Arc<dyn Embedder>>,
    splitter: TextSplitter,
}

impl Retriever {
    pub fn new(index: Store<IndexState>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            index: Arc::new(Mutex::new(index)),
            embedder,
            splitter: TextSplitter::default(),
        }
    }

    fn embedder(&self) -> ServiceResult<Arc<dyn Embedder>> {
        self.embedder
            .clone()
            .ok_or_else(|| ServiceError::Config("OpenAI API key is not configured".to_string()))
    }

    pub async fn chunk_count(&self) -> usize {
        self.index.lock().await.chunk_count()
    }

    /// Chunk, embed and store one document. Returns the number of chunks.
    pub async fn ingest(&self, document_id: &str, text: &str) -> ServiceResult<usize> {
        let embedder = self.embedder()?;
        let splitter = self.splitter.clone();
        let (id, body) = (document_id.to_string(), text.to_string());
        let chunks = run_blocking(move || {
            index::prepare_chunks(embedder.as_ref(), &splitter, &id, &body)
        })
        .await?;

        let count = chunks.len();
        let mut index = self.index.lock().await;
        index
            .update_async(|i| {
                i.insert_chunks(document_id, chunks);
                Ok::<_, StorageError>(())
            })
            .await?;
        tracing::info!(document_id, chunks = count, total = index.chunk_count(), "indexed document");
        Ok(count)
    }

    pub async fn remove(&self, document_id: &str) -> ServiceResult<usize> {
        let mut index = self.index.lock().await;
        let removed = index
            .update_async(|i| Ok::<_, StorageError>(i.remove_document_chunks(document_id)))
            .await?;
        Ok(removed)
    }

    /// Drop every chunk. Returns how many there were.
    pub async fn clear(&self) -> ServiceResult<usize> {
        let mut index = self.index.lock().await;
        let removed = index
            .update_async(|i| {
                let count = i.chunk_count();
                i.clear_chunks();
                Ok::<_, StorageError>(count)
            })
            .await?;
        Ok(removed)
    }

    /// Forget chunks whose document is not in `live_ids`.
    pub async fn prune(&self, live_ids: &[String]) -> ServiceResult<usize> {
        let mut index = self.index.lock().await;
        let removed = index.retain_documents(|id| live_ids.iter().any(|live| live == id));
        if removed > 0 {
            index.save_async().await?;
            tracing::info!(removed, "pruned orphaned chunks");
        }
        Ok(removed)
    }

    /// Text of the `k` chunks nearest to `query`. An empty query or an empty
    /// index yields nothing without calling the embedder.
    pub async fn search(&self, query: &str, k: usize) -> ServiceResult<Vec<ScoredChunk>> {
        if query.trim().is_empty() || self.chunk_count().await == 0 {
            return Ok(Vec::new());
        }
        let embedder = self.embedder()?;
        let text = query.to_string();
        let vector = run_blocking(move || embedder.embed_query(&text)).await?;
        let hits = self.index.lock().await.nearest(&vector, k);
        for (i, hit) in hits.iter().enumerate() {
            let preview: String = hit.text.chars().take(100).collect();
            tracing::debug!(rank = i + 1, score = hit.score, %preview, "retrieved chunk");
        }
        Ok(hits)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FailingEmbedder, KeywordEmbedder};
    use super::*;
    use crate::storage::temp_data_dir;

    fn retriever(embedder: Option<Arc<dyn Embedder>>) -> Retriever {
        Retriever::new(Store::open(&temp_data_dir()).unwrap(), embedder)
    }

    #[tokio::test]
    async fn ingest_then_search() {
        let r = retriever(Some(Arc::new(KeywordEmbedder::new(&["vpn", "projector"]))));
        r.ingest("d1", "Connect to the VPN before opening the portal.").await.unwrap();
        r.ingest("d2", "The projector remote is in the drawer.").await.unwrap();

        let hits = r.search("vpn not working", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, "d1");

        assert_eq!(r.remove("d1").await.unwrap(), 1);
        let hits = r.search("vpn", DEFAULT_TOP_K).await.unwrap();
        assert!(hits.iter().all(|h| h.document_id != "d1"));
    }

    #[tokio::test]
    async fn empty_query_or_index_skips_embedder() {
        let r = retriever(Some(Arc::new(FailingEmbedder)));
        assert!(r.search("anything", 3).await.unwrap().is_empty());
        let r = retriever(Some(Arc::new(KeywordEmbedder::new(&["a"]))));
        r.ingest("d", "a b c").await.unwrap();
        assert!(r.search("   ", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_surface_as_errors() {
        let r = retriever(Some(Arc::new(FailingEmbedder)));
        assert!(matches!(r.ingest("d", "text").await, Err(ServiceError::Upstream(_))));
        assert_eq!(r.chunk_count().await, 0);

        let r = retriever(None);
        assert!(matches!(r.ingest("d", "text").await, Err(ServiceError::Config(_))));
    }

    #[tokio::test]
    async fn prune_drops_orphans() {
        let r = retriever(Some(Arc::new(KeywordEmbedder::new(&["a"]))));
        r.ingest("keep", "a").await.unwrap();
        r.ingest("gone", "a").await.unwrap();
        assert_eq!(r.prune(&["keep".to_string()]).await.unwrap(), 1);
        assert_eq!(r.chunk_count().await, 1);
    }

    #[tokio::test]
    async fn clear_empties_the_index() {
        let r = retriever(Some(Arc::new(KeywordEmbedder::new(&["a"]))));
        r.ingest("one", "a").await.unwrap();
        r.ingest("two", "a").await.unwrap();
        assert_eq!(r.clear().await.unwrap(), 2);
        assert_eq!(r.chunk_count().await, 0);
        assert!(r.search("a", 4).await.unwrap().is_empty());
    }
}
