//! Hybrid retrieval: vector search for documentation, graph expansion for
//! foreign keys, then a grounded answer from the chat model.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use lens_core::config::{RetrievalSettings, TimeoutSettings};
use lens_core::{LensError, LensResult, with_deadline};
use lens_embedding::store::CONNECTION_FIELD;
use lens_embedding::{Embedder, SearchHit, VectorStore};
use lens_graph::analytics;
use lens_graph::{GraphStore, ImpactReport};

use crate::chat::{ChatModel, ChatTurn};
use crate::context::{SYSTEM_PROMPT, build_context, is_insufficient};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Answer {
    Grounded(String),
    /// The model found the retrieved context insufficient.
    InsufficientContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct HitSummary {
    pub entity: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub answer: Answer,
    pub hits: Vec<HitSummary>,
    /// Rendered `A.col references B.col` lines given to the model.
    pub relations: Vec<String>,
    pub impact: ImpactReport,
}

pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    chat: Arc<dyn ChatModel>,
    collection: String,
    dimension: usize,
    settings: RetrievalSettings,
    timeouts: TimeoutSettings,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        chat: Arc<dyn ChatModel>,
        collection: &str,
        dimension: usize,
    ) -> Self {
        Self {
            embedder,
            vectors,
            graph,
            chat,
            collection: collection.to_string(),
            dimension,
            settings: RetrievalSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RetrievalSettings, timeouts: TimeoutSettings) -> Self {
        self.settings = settings;
        self.timeouts = timeouts;
        self
    }

    /// Answer `query` about `connection_id` from its documentation and graph.
    pub async fn ask(&self, query: &str, connection_id: &str, history: &[ChatTurn]) -> LensResult<RetrievalResult> {
        info!(connection_id, "Answering schema question");

        let vector = self.embed_query(query).await?;
        self.check_collection(vector.len()).await?;

        let hits = self.search(vector, connection_id).await?;
        if hits.is_empty() {
            return Err(LensError::NoRelevantContext(connection_id.to_string()));
        }

        let entities = distinct_entities(&hits);
        debug!(connection_id, entities = ?entities, "Vector search matched entities");

        let relations = self.expand_relations(connection_id, &entities).await?;
        let impact = self.impact(connection_id, &entities).await?;

        let context = build_context(&hits, &relations, self.settings.max_context_chars);
        let history = recent_turns(history, self.settings.history_turns);

        let text = with_deadline("llm generate", self.timeouts.llm(), async {
            self.chat
                .generate(SYSTEM_PROMPT, &context, history, query)
                .await
                .map_err(|e| LensError::LlmGeneration(format!("{e:#}")))
        })
        .await?;

        let answer = if is_insufficient(&text) {
            info!(connection_id, "Model reported insufficient context");
            Answer::InsufficientContext
        } else {
            Answer::Grounded(text)
        };

        Ok(RetrievalResult {
            answer,
            hits: hits
                .iter()
                .map(|h| HitSummary {
                    entity: h.entity_name.clone(),
                    score: h.score,
                })
                .collect(),
            relations,
            impact,
        })
    }

    async fn embed_query(&self, query: &str) -> LensResult<Vec<f32>> {
        let vector = with_deadline("embed", self.timeouts.embed(), async {
            self.embedder.embed(query).await.map_err(|e| LensError::EmbeddingProvider {
                entity: "query".to_string(),
                message: format!("{e:#}"),
            })
        })
        .await?;

        if vector.len() != self.dimension {
            return Err(LensError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// The collection must have been built with the same model and carry
    /// the connection index. Missing pieces are never provisioned here.
    async fn check_collection(&self, actual: usize) -> LensResult<()> {
        let (stored, indexed) = with_deadline("vector info", self.timeouts.vector(), async {
            let stored = self.vectors.dimension(&self.collection).await?;
            let indexed = self.vectors.has_payload_index(&self.collection, CONNECTION_FIELD).await?;
            Ok((stored, indexed))
        })
        .await?;

        if let Some(expected) = stored.filter(|d| *d != actual) {
            return Err(LensError::DimensionMismatch { expected, actual });
        }
        if !indexed {
            warn!(collection = %self.collection, "Collection has no connection index");
            return Err(LensError::CollectionMissing(self.collection.clone()));
        }
        Ok(())
    }

    async fn search(&self, vector: Vec<f32>, connection_id: &str) -> LensResult<Vec<SearchHit>> {
        let hits = with_deadline("vector search", self.timeouts.vector(), async {
            Ok(self
                .vectors
                .search(&self.collection, vector, connection_id, self.settings.top_k)
                .await?)
        })
        .await?;

        if let Some(foreign) = hits.iter().find(|h| h.connection_id != connection_id) {
            warn!(connection_id, found = %foreign.connection_id, "Vector search returned a foreign point");
            return Err(LensError::ConnectionIsolationViolation {
                expected: connection_id.to_string(),
                found: foreign.connection_id.clone(),
            });
        }
        Ok(hits)
    }

    async fn expand_relations(&self, connection_id: &str, entities: &[String]) -> LensResult<Vec<String>> {
        let relations = self.graph.field_relations(connection_id, entities).await?;

        let mut seen = HashSet::new();
        let rendered: Vec<String> = relations
            .iter()
            .map(ToString::to_string)
            .filter(|r| seen.insert(r.clone()))
            .collect();

        debug!(connection_id, relations = rendered.len(), "Expanded graph relations");
        Ok(rendered)
    }

    async fn impact(&self, connection_id: &str, entities: &[String]) -> LensResult<ImpactReport> {
        let graph = self.graph.entity_graph(connection_id).await?;
        Ok(analytics::impact(&graph, entities))
    }
}

/// Entity names of `hits` in rank order, without repeats.
fn distinct_entities(hits: &[SearchHit]) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|h| seen.insert(h.entity_name.as_str()))
        .map(|h| h.entity_name.clone())
        .collect()
}

fn recent_turns(history: &[ChatTurn], n: usize) -> &[ChatTurn] {
    &history[history.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use lens_core::{Entity, Field, LedgerSnapshot, Relationship};
    use lens_embedding::{CollectionAdmin, DocPoint, MemoryVectorStore};
    use lens_graph::{MemoryGraphStore, SyncPlan};

    use super::*;

    const VOCAB: [&str; 4] = ["order", "customer", "product", "user"];

    /// Bag-of-words over a tiny vocabulary.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(VOCAB.iter().map(|w| lower.matches(w).count() as f32 + 0.01).collect())
        }

        fn model(&self) -> &str {
            "keywords"
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        reply: String,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl RecordingChat {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                ..Self::default()
            }
        }

        fn contexts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        async fn generate(&self, _system: &str, context: &str, history: &[ChatTurn], _query: &str) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push((context.to_string(), history.len()));
            Ok(self.reply.clone())
        }
    }

    fn snapshot(conn: &str, fks: &[(&str, &str)]) -> LedgerSnapshot {
        let tables = [("customers", vec!["id", "name"]), ("orders", vec!["id", "customer_id", "product_id"]), ("products", vec!["id"])];
        let mut s = LedgerSnapshot::new(conn);
        for (table, cols) in tables {
            s.entities.push(Entity {
                id: format!("{conn}:{table}"),
                connection_id: conn.into(),
                name: table.into(),
            });
            for col in cols {
                s.fields.push(Field {
                    id: format!("{conn}:{table}.{col}"),
                    entity_id: format!("{conn}:{table}"),
                    name: col.into(),
                    data_type: "uuid".into(),
                    is_nullable: col != "id",
                    is_primary_key: col == "id",
                });
            }
        }
        for (from, to) in fks {
            s.relationships.push(Relationship {
                id: format!("{conn}:{from}->{to}"),
                source_field_id: format!("{conn}:{from}"),
                target_field_id: format!("{conn}:{to}"),
            });
        }
        s
    }

    async fn index(store: &MemoryVectorStore, conn: &str, entity: &str, doc: &str) {
        let text = format!("Table: {entity}\n\n{doc}");
        let vector = KeywordEmbedder.embed(&text).await.unwrap();
        store
            .upsert("docs", vec![DocPoint::documentation(conn, entity, &text, vector)])
            .await
            .unwrap();
    }

    struct Fixture {
        vectors: Arc<MemoryVectorStore>,
        graph: Arc<MemoryGraphStore>,
    }

    async fn fixture() -> Fixture {
        let vectors = Arc::new(MemoryVectorStore::new());
        CollectionAdmin::new(vectors.clone(), "docs", VOCAB.len(), std::time::Duration::from_secs(5))
            .ensure()
            .await
            .unwrap();
        let graph = Arc::new(MemoryGraphStore::new());

        // connection a: orders -> customers
        graph
            .apply_plan(&SyncPlan::build(&snapshot("a", &[("orders.customer_id", "customers.id")])).unwrap())
            .await
            .unwrap();
        index(&vectors, "a", "orders", "One row per purchase.").await;
        index(&vectors, "a", "customers", "People who buy things.").await;

        // connection b: same tables, but orders -> products only
        graph
            .apply_plan(&SyncPlan::build(&snapshot("b", &[("orders.product_id", "products.id")])).unwrap())
            .await
            .unwrap();
        index(&vectors, "b", "orders", "B side orders.").await;
        index(&vectors, "b", "products", "Catalog items.").await;

        Fixture { vectors, graph }
    }

    fn retriever(f: &Fixture, chat: Arc<RecordingChat>) -> HybridRetriever {
        HybridRetriever::new(
            Arc::new(KeywordEmbedder),
            f.vectors.clone(),
            f.graph.clone(),
            chat,
            "docs",
            VOCAB.len(),
        )
    }

    #[tokio::test]
    async fn test_graph_expansion_adds_relation_missing_from_docs() {
        let f = fixture().await;
        let chat = Arc::new(RecordingChat::replying("Each order points at one customer."));
        let result = retriever(&f, chat.clone())
            .ask("which customer placed the orders?", "a", &[])
            .await
            .unwrap();

        assert_eq!(result.answer, Answer::Grounded("Each order points at one customer.".into()));
        assert_eq!(result.relations, vec!["orders.customer_id references customers.id"]);
        let context = &chat.contexts()[0];
        assert!(context.contains("orders.customer_id references customers.id"));
        assert!(context.contains("One row per purchase."));
    }

    #[tokio::test]
    async fn test_no_cross_tenant_hits_or_edges() {
        let f = fixture().await;
        let chat = Arc::new(RecordingChat::replying("ok"));
        let result = retriever(&f, chat.clone()).ask("orders and products", "a", &[]).await.unwrap();

        let context = &chat.contexts()[0];
        assert!(!context.contains("B side orders."));
        assert!(!context.contains("product_id references"));
        assert!(result.hits.iter().all(|h| h.entity != "products"));
    }

    #[tokio::test]
    async fn test_rendered_relations_exist_in_graph() {
        let f = fixture().await;
        let chat = Arc::new(RecordingChat::replying("ok"));
        let settings = RetrievalSettings {
            top_k: 1,
            ..RetrievalSettings::default()
        };
        let result = retriever(&f, chat)
            .with_settings(settings, TimeoutSettings::default())
            .ask("orders", "b", &[])
            .await
            .unwrap();

        let stored: Vec<String> = f
            .graph
            .field_relations("b", &["orders".into(), "products".into(), "customers".into()])
            .await
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        for rel in &result.relations {
            assert!(stored.contains(rel), "invented relation {rel}");
        }
        assert_eq!(result.relations, vec!["orders.product_id references products.id"]);
        assert_eq!(result.impact.affected.len(), 1);
        assert_eq!(result.impact.affected[0].name, "products");
    }

    #[tokio::test]
    async fn test_unknown_connection_has_no_context_and_skips_llm() {
        let f = fixture().await;
        let chat = Arc::new(RecordingChat::replying("should not be called"));
        let err = retriever(&f, chat.clone()).ask("orders", "zzz", &[]).await.unwrap_err();

        assert!(matches!(err, LensError::NoRelevantContext(ref c) if c == "zzz"));
        assert!(chat.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_missing_collection_is_reported_not_created() {
        let f = fixture().await;
        f.vectors.delete_collection("docs").await.unwrap();
        let chat = Arc::new(RecordingChat::replying("x"));

        let err = retriever(&f, chat).ask("orders", "a", &[]).await.unwrap_err();
        assert!(matches!(err, LensError::CollectionMissing(_)));
        assert!(!f.vectors.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_connection_index_is_reported() {
        let f = fixture().await;
        f.vectors.delete_collection("docs").await.unwrap();
        f.vectors.create_collection("docs", 4).await.unwrap();
        let chat = Arc::new(RecordingChat::replying("x"));

        let err = retriever(&f, chat.clone()).ask("orders", "a", &[]).await.unwrap_err();
        assert!(matches!(err, LensError::CollectionMissing(_)));
        assert!(!f.vectors.has_payload_index("docs", CONNECTION_FIELD).await.unwrap());
        assert!(chat.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_collection_dimension_mismatch() {
        let f = fixture().await;
        f.vectors.delete_collection("docs").await.unwrap();
        f.vectors.create_collection("docs", 16).await.unwrap();
        let chat = Arc::new(RecordingChat::replying("x"));

        let err = retriever(&f, chat).ask("orders", "a", &[]).await.unwrap_err();
        assert!(matches!(err, LensError::DimensionMismatch { expected: 16, actual: 4 }));
    }

    #[tokio::test]
    async fn test_sentinel_becomes_insufficient_context() {
        let f = fixture().await;
        let chat = Arc::new(RecordingChat::replying("INSUFFICIENT_CONTEXT"));
        let result = retriever(&f, chat).ask("orders", "a", &[]).await.unwrap();
        assert_eq!(result.answer, Answer::InsufficientContext);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let f = fixture().await;
        let chat = Arc::new(RecordingChat::replying("ok"));
        let history: Vec<ChatTurn> = (0..12).map(|i| ChatTurn::user(format!("turn {i}"))).collect();

        retriever(&f, chat.clone()).ask("orders", "a", &history).await.unwrap();
        assert_eq!(chat.calls.lock().unwrap()[0].1, 5);
    }

    #[test]
    fn test_recent_turns_keeps_tail() {
        let history: Vec<ChatTurn> = (0..3).map(|i| ChatTurn::user(format!("{i}"))).collect();
        assert_eq!(recent_turns(&history, 2)[0].content, "1");
        assert_eq!(recent_turns(&history, 10).len(), 3);
    }
}
