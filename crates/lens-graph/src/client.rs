//! Neo4j connection client.

use anyhow::{Context, Result};
use neo4rs::{ConfigBuilder, Graph, Query, Row};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use lens_core::config::GraphSettings;

/// Pooled client for Neo4j. Cloning shares the pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Create a new GraphClient from settings.
    ///
    /// Note: neo4rs uses a lazy deadpool; `Graph::connect` only creates the pool
    /// object and does NOT establish a real bolt connection yet. We run a cheap
    /// `RETURN 1` ping immediately so that callers can wrap this in a timeout and
    /// get a fast failure when Neo4j is unreachable instead of hanging silently.
    pub async fn connect(settings: &GraphSettings) -> Result<Self> {
        let config = ConfigBuilder::default()
            .uri(settings.uri.as_str())
            .user(settings.user.as_str())
            .password(settings.password.as_str())
            .db(settings.database.as_str())
            .max_connections(settings.max_connections)
            .fetch_size(200)
            .build()
            .context("Failed to build Neo4j config")?;

        let graph = Graph::connect(config)
            .await
            .context("Failed to create Neo4j connection pool")?;

        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .context("Neo4j is not responding to queries")?;

        Ok(Self { graph })
    }

    /// Execute a Cypher query that returns no results.
    pub async fn execute(&self, query: Query) -> Result<()> {
        self.graph.run(query).await.context("Neo4j query execution failed")?;
        Ok(())
    }

    /// Execute a Cypher query and collect every row.
    pub async fn query(&self, query: Query) -> Result<Vec<Row>> {
        let mut result = self.graph.execute(query).await.context("Neo4j query failed")?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.context("Failed to read Neo4j row")? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a Cypher query and return a single scalar value.
    pub async fn query_scalar<T: DeserializeOwned>(&self, query: Query, field: &str) -> Result<Option<T>> {
        let rows = self.query(query).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(column(&row, field)?)),
            None => Ok(None),
        }
    }

    /// Run `queries` in one explicit transaction.
    ///
    /// Either every statement commits or the transaction is rolled back and
    /// the first error is returned.
    pub async fn run_in_transaction(&self, queries: Vec<Query>) -> Result<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .context("Failed to open Neo4j transaction")?;

        let total = queries.len();
        for (i, query) in queries.into_iter().enumerate() {
            if let Err(err) = txn.run(query).await {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "Neo4j rollback failed; server will discard the transaction");
                }
                return Err(anyhow::Error::new(err))
                    .with_context(|| format!("Statement {} of {} failed, transaction rolled back", i + 1, total));
            }
        }

        txn.commit().await.context("Failed to commit Neo4j transaction")?;
        debug!(statements = total, "Neo4j transaction committed");
        Ok(())
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}

/// Decode one column of a row into a typed value.
pub(crate) fn column<T: DeserializeOwned>(row: &Row, field: &str) -> Result<T> {
    row.get::<T>(field)
        .map_err(|e| anyhow::anyhow!("Failed to decode column '{}': {:?}", field, e))
}
