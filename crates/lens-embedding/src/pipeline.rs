//! Documentation embedding pipeline.
//!
//! Reads a connection's documentation chunks from the ledger, embeds each
//! through the configured model, upserts one point per entity and records
//! the point id back in the ledger.
//!
//! Entities are processed by a bounded worker pool. Provider errors are
//! retried with exponential backoff and then reported per entity; a
//! dimension mismatch or an unrecoverable vector store error stops the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use lens_core::config::PipelineSettings;
use lens_core::{DocChunk, LensError, LensResult, with_deadline};
use lens_ledger::MetadataLedger;

use crate::collection::CollectionAdmin;
use crate::ollama::Embedder;
use crate::store::{DocPoint, VectorError};

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFailure {
    pub entity: String,
    pub error: String,
}

/// Outcome of one embedding run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbedReport {
    pub connection_id: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<EmbedFailure>,
    pub elapsed_ms: u128,
}

impl EmbedReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmbeddingStatus {
    pub total: usize,
    pub embedded: usize,
}

impl EmbeddingStatus {
    pub fn is_fully_embedded(&self) -> bool {
        self.total > 0 && self.embedded == self.total
    }
}

/// Why a point was not written.
enum UpsertFailure {
    /// The collection is gone even after re-provisioning; stops the run.
    Fatal(LensError),
    /// Only this entity is affected.
    Entity(LensError),
}

enum Outcome {
    Embedded(String),
    Failed(EmbedFailure),
}

pub struct EmbeddingPipeline {
    ledger: Arc<dyn MetadataLedger>,
    embedder: Arc<dyn Embedder>,
    collection: CollectionAdmin,
    dimension: usize,
    settings: PipelineSettings,
    embed_timeout: Duration,
    vector_timeout: Duration,
    provisioned: Mutex<bool>,
}

impl EmbeddingPipeline {
    pub fn new(
        ledger: Arc<dyn MetadataLedger>,
        embedder: Arc<dyn Embedder>,
        collection: CollectionAdmin,
        dimension: usize,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ledger,
            embedder,
            collection,
            dimension,
            settings,
            embed_timeout: Duration::from_secs(30),
            vector_timeout: Duration::from_secs(15),
            provisioned: Mutex::new(false),
        }
    }

    pub fn with_timeouts(mut self, embed: Duration, vector: Duration) -> Self {
        self.embed_timeout = embed;
        self.vector_timeout = vector;
        self
    }

    /// Provision the collection once per pipeline.
    async fn ensure_collection(&self) -> LensResult<()> {
        let mut done = self.provisioned.lock().await;
        if !*done {
            self.collection.ensure().await?;
            *done = true;
        }
        Ok(())
    }

    /// Embed every documentation chunk of `connection_id`.
    pub async fn run(&self, connection_id: &str) -> LensResult<EmbedReport> {
        let started = Instant::now();
        let chunks = self.ledger.doc_chunks(connection_id).await?;
        info!(connection_id, chunks = chunks.len(), model = self.embedder.model(), "Starting embedding run");

        let mut report = EmbedReport {
            connection_id: connection_id.to_string(),
            ..EmbedReport::default()
        };
        if chunks.is_empty() {
            warn!(connection_id, "No documentation chunks to embed");
            return Ok(report);
        }

        self.ensure_collection().await?;

        let mut outcomes = futures::stream::iter(chunks)
            .map(|chunk| self.embed_chunk(chunk))
            .buffer_unordered(self.settings.concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome? {
                Outcome::Embedded(entity) => report.succeeded.push(entity),
                Outcome::Failed(failure) => report.failed.push(failure),
            }
        }

        report.succeeded.sort();
        report.failed.sort_by(|a, b| a.entity.cmp(&b.entity));
        report.elapsed_ms = started.elapsed().as_millis();

        info!(
            connection_id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            elapsed_ms = report.elapsed_ms as u64,
            "Embedding run complete"
        );
        Ok(report)
    }

    async fn embed_chunk(&self, chunk: DocChunk) -> LensResult<Outcome> {
        let entity = chunk.entity_name.clone();
        let text = chunk.embedding_text();

        let vector = match self.embed_with_retry(&entity, &text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(connection_id = %chunk.connection_id, entity = %entity, error = %e, "Embedding failed");
                return Ok(Outcome::Failed(EmbedFailure {
                    entity,
                    error: e.to_string(),
                }));
            }
        };

        if vector.len() != self.dimension {
            return Err(LensError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let point = DocPoint::documentation(&chunk.connection_id, &entity, &text, vector);
        let point_id = point.id.clone();
        match self.upsert_healing(point).await {
            Ok(()) => {}
            Err(UpsertFailure::Fatal(e)) => return Err(e),
            Err(UpsertFailure::Entity(e)) => {
                warn!(connection_id = %chunk.connection_id, entity = %entity, error = %e, "Vector upsert failed");
                return Ok(Outcome::Failed(EmbedFailure {
                    entity,
                    error: e.to_string(),
                }));
            }
        }

        if let Err(e) = self.ledger.record_embedding(&chunk.connection_id, &entity, &point_id).await {
            warn!(entity = %entity, error = %e, "Stored vector but could not record embedding id");
            return Ok(Outcome::Failed(EmbedFailure {
                entity,
                error: e.to_string(),
            }));
        }

        debug!(entity = %entity, point_id = %point_id, "Embedded documentation");
        Ok(Outcome::Embedded(entity))
    }

    async fn embed_with_retry(&self, entity: &str, text: &str) -> LensResult<Vec<f32>> {
        let attempts = self.settings.retry_attempts.max(1);
        let mut delay = self.settings.retry_base_delay();

        let mut attempt = 1;
        loop {
            let result = with_deadline("embed", self.embed_timeout, async {
                self.embedder
                    .embed(text)
                    .await
                    .map_err(|e| LensError::EmbeddingProvider {
                        entity: entity.to_string(),
                        message: format!("{e:#}"),
                    })
            })
            .await;

            match result {
                Ok(vector) => return Ok(vector),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    debug!(entity, attempt, error = %e, "Retrying embedding");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Upsert, re-provisioning and retrying once if the collection vanished.
    async fn upsert_healing(&self, point: DocPoint) -> Result<(), UpsertFailure> {
        let name = self.collection.name().to_string();
        let store = self.collection.store();

        let first = with_deadline("vector upsert", self.vector_timeout, async {
            match store.upsert(&name, vec![point.clone()]).await {
                Err(VectorError::NotFound(_)) => Ok(false),
                Err(e) => Err(LensError::from(e)),
                Ok(()) => Ok(true),
            }
        })
        .await
        .map_err(UpsertFailure::Entity)?;
        if first {
            return Ok(());
        }

        warn!(collection = %name, entity = %point.payload.entity_name, "Collection not found during upsert, re-provisioning");
        self.collection.ensure().await.map_err(UpsertFailure::Fatal)?;

        let retry = with_deadline("vector upsert", self.vector_timeout, async {
            match store.upsert(&name, vec![point]).await {
                Err(VectorError::NotFound(c)) => Ok(Some(c)),
                Err(e) => Err(LensError::from(e)),
                Ok(()) => Ok(None),
            }
        })
        .await
        .map_err(UpsertFailure::Entity)?;

        match retry {
            None => Ok(()),
            Some(c) => Err(UpsertFailure::Fatal(LensError::VectorStore(anyhow::anyhow!(
                "collection '{c}' missing again after re-provisioning"
            )))),
        }
    }

    /// How many of a connection's chunks carry an embedding id.
    pub async fn status(&self, connection_id: &str) -> LensResult<EmbeddingStatus> {
        embedding_status(self.ledger.as_ref(), connection_id).await
    }
}

pub async fn embedding_status(ledger: &dyn MetadataLedger, connection_id: &str) -> LensResult<EmbeddingStatus> {
    let chunks = ledger.doc_chunks(connection_id).await?;
    Ok(EmbeddingStatus {
        total: chunks.len(),
        embedded: chunks.iter().filter(|c| c.embedding_id.is_some()).count(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use lens_ledger::MemoryLedger;

    use super::*;
    use crate::memory::MemoryVectorStore;
    use crate::store::{VectorStore, point_id};

    const DIM: usize = 4;

    /// Deterministic embedder; entities listed in `failures` fail that many times.
    struct FakeEmbedder {
        dim: usize,
        failures: std::sync::Mutex<HashMap<String, usize>>,
        calls: AtomicUsize,
    }

    impl FakeEmbedder {
        fn new(dim: usize) -> Self {
            Self {
                dim,
                failures: std::sync::Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(self, entity: &str, times: usize) -> Self {
            self.failures.lock().unwrap().insert(format!("Table: {entity}"), times);
            self
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let header = text.lines().next().unwrap_or_default().to_string();
            if let Some(left) = self.failures.lock().unwrap().get_mut(&header) {
                if *left > 0 {
                    *left -= 1;
                    anyhow::bail!("model overloaded");
                }
            }
            let seed = text.len() as f32;
            Ok((0..self.dim).map(|i| seed + i as f32).collect())
        }

        fn model(&self) -> &str {
            "fake"
        }
    }

    async fn ledger_with_docs(conn: &str, entities: &[&str]) -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        for e in entities {
            ledger.upsert_doc_chunk(&DocChunk::new(conn, e, &format!("# {e}"))).await.unwrap();
        }
        ledger
    }

    fn pipeline(
        ledger: Arc<MemoryLedger>,
        embedder: FakeEmbedder,
        store: Arc<MemoryVectorStore>,
    ) -> EmbeddingPipeline {
        let admin = CollectionAdmin::new(store, "docs", DIM, Duration::from_secs(5));
        let settings = PipelineSettings {
            concurrency: 2,
            retry_attempts: 3,
            retry_base_delay_ms: 10,
        };
        EmbeddingPipeline::new(ledger, Arc::new(embedder), admin, DIM, settings)
    }

    #[tokio::test]
    async fn test_run_embeds_and_records_ids() {
        let ledger = ledger_with_docs("c1", &["orders", "customers"]).await;
        let store = Arc::new(MemoryVectorStore::new());
        let p = pipeline(ledger.clone(), FakeEmbedder::new(DIM), store.clone());

        let report = p.run("c1").await.unwrap();
        assert_eq!(report.succeeded, vec!["customers", "orders"]);
        assert!(report.is_complete());

        let status = p.status("c1").await.unwrap();
        assert!(status.is_fully_embedded());
        let chunks = ledger.doc_chunks("c1").await.unwrap();
        let orders = chunks.iter().find(|c| c.entity_name == "orders").unwrap();
        assert_eq!(orders.embedding_id.as_deref(), Some(point_id("c1", "orders").as_str()));

        let points = store.points("docs");
        let payload = &points.iter().find(|p| p.payload.entity_name == "orders").unwrap().payload;
        assert_eq!(payload.kind, "documentation");
        assert!(payload.content.starts_with("Table: orders\n\n"));
    }

    #[tokio::test]
    async fn test_reembedding_keeps_one_point_per_entity() {
        let ledger = ledger_with_docs("c1", &["orders"]).await;
        let store = Arc::new(MemoryVectorStore::new());
        let p = pipeline(ledger, FakeEmbedder::new(DIM), store.clone());

        p.run("c1").await.unwrap();
        p.run("c1").await.unwrap();
        assert_eq!(store.count("docs", Some("c1")).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_provider_errors_are_retried() {
        let ledger = ledger_with_docs("c1", &["orders"]).await;
        let store = Arc::new(MemoryVectorStore::new());
        let p = pipeline(ledger, FakeEmbedder::new(DIM).failing("orders", 2), store);

        let report = p.run("c1").await.unwrap();
        assert_eq!(report.succeeded, vec!["orders"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_is_reported_without_aborting() {
        let ledger = ledger_with_docs("c1", &["orders", "customers"]).await;
        let store = Arc::new(MemoryVectorStore::new());
        let p = pipeline(ledger, FakeEmbedder::new(DIM).failing("orders", 10), store);

        let report = p.run("c1").await.unwrap();
        assert_eq!(report.succeeded, vec!["customers"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].entity, "orders");
        assert!(report.failed[0].error.contains("model overloaded"));

        let status = p.status("c1").await.unwrap();
        assert_eq!(status, EmbeddingStatus { total: 2, embedded: 1 });
        assert!(!status.is_fully_embedded());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_aborts_run() {
        let ledger = ledger_with_docs("c1", &["orders"]).await;
        let store = Arc::new(MemoryVectorStore::new());
        let p = pipeline(ledger, FakeEmbedder::new(DIM + 1), store.clone());

        let err = p.run("c1").await.unwrap_err();
        assert!(matches!(err, LensError::DimensionMismatch { expected: 4, actual: 5 }));
        assert!(store.points("docs").is_empty());
    }

    #[tokio::test]
    async fn test_collection_deleted_externally_is_recreated() {
        let ledger = ledger_with_docs("c1", &["orders"]).await;
        let store = Arc::new(MemoryVectorStore::new());
        let p = pipeline(ledger, FakeEmbedder::new(DIM), store.clone());
        p.run("c1").await.unwrap();

        // the pipeline has already provisioned; drop the collection behind its back
        store.delete_collection("docs").await.unwrap();
        let report = p.run("c1").await.unwrap();

        assert_eq!(report.succeeded, vec!["orders"]);
        assert!(store.has_payload_index("docs", "connection_id").await.unwrap());
        assert_eq!(store.count("docs", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_not_found_is_fatal() {
        let ledger = ledger_with_docs("c1", &["orders"]).await;
        let store = Arc::new(MemoryVectorStore::new());
        let p = pipeline(ledger, FakeEmbedder::new(DIM), store.clone());

        store.vanish_on_next_upserts(2);
        let err = p.run("c1").await.unwrap_err();
        assert!(matches!(err, LensError::VectorStore(_)));
        assert_eq!(store.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_upsert_backend_error_fails_only_that_entity() {
        let ledger = ledger_with_docs("c1", &["orders", "customers", "products"]).await;
        let store = Arc::new(MemoryVectorStore::new());
        store.fail_upserts_for("orders");
        let p = pipeline(ledger, FakeEmbedder::new(DIM), store.clone());

        let report = p.run("c1").await.unwrap();
        assert_eq!(report.succeeded, vec!["customers", "products"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].entity, "orders");
        assert_eq!(store.points("docs").len(), 2);
    }

    #[tokio::test]
    async fn test_no_chunks_is_an_empty_report() {
        let p = pipeline(Arc::new(MemoryLedger::new()), FakeEmbedder::new(DIM), Arc::new(MemoryVectorStore::new()));
        let report = p.run("c1").await.unwrap();
        assert!(report.succeeded.is_empty() && report.failed.is_empty());
    }
}
