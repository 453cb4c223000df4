//! Request and response types for the HTTP surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::card::Card;

/// Body of POST /v1/agent/register
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub did: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default, rename = "walletAddress")]
    pub wallet_address: Option<String>,
    pub capabilities: Vec<CapabilityInput>,
    #[serde(default)]
    pub card: Option<Card>,
    #[serde(default)]
    pub card_signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityInput {
    /// New clients send `capabilityId`; the snake_case alias is kept for
    /// older registrants. Missing ids are assigned fresh UUIDs.
    #[serde(default, rename = "capabilityId", alias = "capability_id")]
    pub capability_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Accepted for card cross-checking; not persisted
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
}

/// Body of POST /v1/agent/discovery
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default, rename = "minReputation")]
    pub min_reputation: Option<f64>,
}

/// One ranked discovery result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub score: f64,
    pub vector_score: f64,
    pub reputation_score: f64,
    pub availability_score: Option<f64>,
    pub agent_did: String,
    pub capability_id: String,
    pub description: String,
    pub tags: Value,
    pub reputation: f64,
    pub agent: Option<AgentSummary>,
}

/// Joined agent metadata attached to a discovery result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub did: String,
    pub name: Option<String>,
    pub endpoint: String,
    pub reputation: f64,
    pub availability_score: f64,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Body of POST /v1/agent/reputation
#[derive(Debug, Clone, Deserialize)]
pub struct ReputationRequest {
    pub did: String,
    pub reputation: f64,
}

/// Body of POST /v1/agent/availability
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityRequest {
    pub did: String,
    pub availability: f64,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_id_accepts_both_spellings() {
        let camel: CapabilityInput =
            serde_json::from_str(r#"{"capabilityId":"echo","description":"d"}"#).unwrap();
        assert_eq!(camel.capability_id.as_deref(), Some("echo"));

        let snake: CapabilityInput =
            serde_json::from_str(r#"{"capability_id":"echo","description":"d"}"#).unwrap();
        assert_eq!(snake.capability_id.as_deref(), Some("echo"));

        let none: CapabilityInput = serde_json::from_str(r#"{"description":"d"}"#).unwrap();
        assert!(none.capability_id.is_none());
    }

    #[test]
    fn discovery_request_defaults_are_absent() {
        let req: DiscoveryRequest = serde_json::from_str(r#"{"query":"ocr"}"#).unwrap();
        assert!(req.limit.is_none());
        assert!(req.min_reputation.is_none());
    }

    #[test]
    fn availability_request_parses_rfc3339() {
        let req: AvailabilityRequest = serde_json::from_str(
            r#"{"did":"did:x:a","availability":0.9,"last_seen":"2026-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(req.last_seen.unwrap().timestamp(), 1_767_323_045);
    }
}
