//! Registration, discovery and reindex pipelines over the two stores.
//!
//! The service owns the metadata store, the vector index and the embedder;
//! controllers stay thin and call into it.

pub mod discovery;
pub mod register;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::embedder::Embedder;
use crate::error::ApiError;
use crate::vector::{PointPayload, VectorIndex};

pub struct Registry {
    db: Arc<Database>,
    vector: Arc<VectorIndex>,
    embedder: Arc<Embedder>,
    config: Config,
}

impl Registry {
    pub fn new(
        db: Arc<Database>,
        vector: Arc<VectorIndex>,
        embedder: Arc<Embedder>,
        config: Config,
    ) -> Self {
        Self {
            db,
            vector,
            embedder,
            config,
        }
    }

    /// Text fed into the embedder for one capability
    pub(crate) fn embedding_input(
        capability_id: &str,
        description: &str,
        output_schema: Option<&Value>,
        tags: &[String],
    ) -> String {
        let schema = output_schema.map(|v| v.to_string()).unwrap_or_default();
        format!("{} {} {} {}", capability_id, description, schema, tags.join(" "))
            .trim()
            .to_string()
    }

    /// Re-embed every stored capability and rebuild its vector points.
    ///
    /// Not transactional: a mid-way failure leaves the index partially
    /// rebuilt and is corrected by running again. Points are rebuilt per
    /// agent (delete, then fresh upserts) so repeated runs converge.
    pub async fn reindex(&self) -> Result<usize, ApiError> {
        self.vector
            .ensure_collection()
            .await
            .map_err(|e| ApiError::internal("Vector index error", e))?;

        let rows = self.db.list_all_capabilities().await?;
        let mut by_agent: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for row in rows {
            by_agent.entry(row.agent_did.clone()).or_default().push(row);
        }

        let mut reindexed = 0usize;
        for (did, capabilities) in by_agent {
            self.vector
                .delete_by_agent(&did)
                .await
                .map_err(|e| ApiError::internal("Vector index error", e))?;

            for cap in capabilities {
                let tags = tags_from_value(&cap.tags);
                let input = Self::embedding_input(
                    &cap.capability_id,
                    &cap.description,
                    cap.output_schema.as_ref(),
                    &tags,
                );
                let vector = self.embedder.embed(&input).await;
                let payload = PointPayload {
                    agent_did: cap.agent_did.clone(),
                    capability_id: cap.capability_id.clone(),
                    description: cap.description.clone(),
                    tags: cap.tags.clone(),
                };
                self.vector
                    .upsert_point(&Uuid::new_v4().to_string(), &vector, &payload)
                    .await
                    .map_err(|e| ApiError::internal("Vector index error", e))?;
                reindexed += 1;
            }
        }

        log::info!("[REINDEX] Rebuilt {} vector points", reindexed);
        Ok(reindexed)
    }
}

/// Tags are persisted as a JSON array of strings
pub(crate) fn tags_from_value(tags: &Value) -> Vec<String> {
    tags.as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
