//! [`GraphStore`] backed by Neo4j.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use lens_core::config::GraphSettings;
use lens_core::{LensError, LensResult, with_deadline};

use crate::GraphClient;
use crate::plan::SyncPlan;
use crate::queries::{relations, structure};
use crate::store::{ColumnInfo, EntityGraph, FieldRelation, GraphCounts, GraphStore};
use crate::sync::statements::{Statement, plan_statements};

#[derive(Clone)]
pub struct Neo4jGraphStore {
    client: GraphClient,
    timeout: Duration,
}

impl Neo4jGraphStore {
    pub fn new(client: GraphClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Connect and ping Neo4j, giving up after `timeout`.
    pub async fn connect(settings: &GraphSettings, timeout: Duration) -> LensResult<Self> {
        let client = with_deadline("graph connect", timeout, async {
            GraphClient::connect(settings).await.map_err(LensError::graph)
        })
        .await?;
        Ok(Self::new(client, timeout))
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn apply_plan(&self, plan: &SyncPlan) -> LensResult<()> {
        let queries: Vec<_> = plan_statements(plan).into_iter().map(Statement::into_query).collect();
        debug!(connection_id = %plan.connection_id, statements = queries.len(), "Applying sync plan");

        with_deadline("graph sync", self.timeout, async {
            self.client.run_in_transaction(queries).await.map_err(LensError::graph)
        })
        .await
    }

    async fn field_relations(&self, connection_id: &str, entities: &[String]) -> LensResult<Vec<FieldRelation>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        with_deadline("graph read", self.timeout, async {
            relations::field_relations(&self.client, connection_id, entities)
                .await
                .map_err(LensError::graph)
        })
        .await
    }

    async fn entity_graph(&self, connection_id: &str) -> LensResult<EntityGraph> {
        with_deadline("graph read", self.timeout, async {
            structure::entity_graph(&self.client, connection_id)
                .await
                .map_err(LensError::graph)
        })
        .await
    }

    async fn entity_schema(&self, connection_id: &str, entity: &str) -> LensResult<Vec<ColumnInfo>> {
        with_deadline("graph read", self.timeout, async {
            relations::entity_schema(&self.client, connection_id, entity)
                .await
                .map_err(LensError::graph)
        })
        .await
    }

    async fn counts(&self, connection_id: &str) -> LensResult<GraphCounts> {
        with_deadline("graph read", self.timeout, async {
            structure::counts(&self.client, connection_id)
                .await
                .map_err(LensError::graph)
        })
        .await
    }
}
