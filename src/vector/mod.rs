//! Qdrant vector index adapter.
//!
//! Talks to Qdrant over its REST API (POST/PUT JSON, parse JSON back).
//! Collection: `capabilities`, 384-dim vectors, cosine distance. Engine
//! errors bubble up with the response body preserved as the detail message.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedder::DIM;

/// Collection holding one point per registered capability
pub const COLLECTION: &str = "capabilities";

/// Payload stored alongside every capability vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointPayload {
    pub agent_did: String,
    pub capability_id: String,
    pub description: String,
    #[serde(default)]
    pub tags: Value,
}

/// A scored hit from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub payload: PointPayload,
}

pub struct VectorIndex {
    client: reqwest::Client,
    base_url: String,
}

impl VectorIndex {
    pub fn new(qdrant_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: qdrant_url.trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, COLLECTION, suffix)
    }

    /// Create the collection if absent. The parameters are fixed, so an
    /// existing collection is left as-is and reported as success.
    pub async fn ensure_collection(&self) -> Result<(), String> {
        let response = self
            .client
            .get(self.collection_url(""))
            .send()
            .await
            .map_err(|e| format!("Vector index request failed: {}", e))?;
        if response.status().is_success() {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": { "size": DIM, "distance": "Cosine" }
        });
        let response = self
            .client
            .put(self.collection_url(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Vector index request failed: {}", e))?;

        // A concurrent creator may have won the race
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        Self::check(response, "create collection").await.map(|_| ())
    }

    /// Insert or replace a single point
    pub async fn upsert_point(
        &self,
        point_id: &str,
        vector: &[f32],
        payload: &PointPayload,
    ) -> Result<(), String> {
        let body = serde_json::json!({
            "points": [{
                "id": point_id,
                "vector": vector,
                "payload": payload,
            }]
        });
        let response = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Vector index request failed: {}", e))?;
        Self::check(response, "upsert point").await.map(|_| ())
    }

    /// Nearest-neighbor search; returns at most `limit` scored hits
    pub async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>, String> {
        let body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        let response = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Vector index request failed: {}", e))?;
        let json = Self::check(response, "search").await?;

        let mut hits = Vec::new();
        if let Some(results) = json.get("result").and_then(|r| r.as_array()) {
            for item in results {
                let score = item.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
                let Some(payload_value) = item.get("payload") else {
                    continue;
                };
                match serde_json::from_value::<PointPayload>(payload_value.clone()) {
                    Ok(payload) => hits.push(SearchHit { score, payload }),
                    Err(e) => log::warn!("Skipping vector hit with malformed payload: {}", e),
                }
            }
        }
        Ok(hits)
    }

    /// Delete every point whose payload belongs to the given agent
    pub async fn delete_by_agent(&self, did: &str) -> Result<(), String> {
        let body = serde_json::json!({
            "filter": {
                "must": [{ "key": "agentDid", "match": { "value": did } }]
            }
        });
        let response = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Vector index request failed: {}", e))?;
        Self::check(response, "delete by agent").await.map(|_| ())
    }

    /// Liveness probe used by /health
    pub async fn ping(&self) -> Result<(), String> {
        let response = self
            .client
            .get(format!("{}/collections", self.base_url))
            .send()
            .await
            .map_err(|e| format!("Vector index unreachable: {}", e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("Vector index returned status {}", response.status()))
        }
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<Value, String> {
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(format!(
                "Vector index {} failed with status {}: {}",
                what, status, error_body
            ));
        }
        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse vector index response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_with_camel_case_keys() {
        let payload = PointPayload {
            agent_did: "did:agent:a".to_string(),
            capability_id: "summarize".to_string(),
            description: "summarize text".to_string(),
            tags: serde_json::json!(["nlp"]),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["agentDid"], "did:agent:a");
        assert_eq!(value["capabilityId"], "summarize");

        let back: PointPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.agent_did, payload.agent_did);
        assert_eq!(back.tags, payload.tags);
    }

    #[test]
    fn base_url_trailing_slash_is_tolerated() {
        let index = VectorIndex::new("http://localhost:6333/".to_string());
        assert_eq!(
            index.collection_url("/points/search"),
            "http://localhost:6333/collections/capabilities/points/search"
        );
    }
}
