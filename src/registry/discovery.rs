//! Discovery pipeline: hybrid retrieval, metadata join, gating and ranking.
//!
//! The vector and lexical arms are merged onto one score axis; lexical hits
//! carry a fixed stand-in score so both arms rank together. A vector-index
//! outage degrades the response to lexical-only instead of failing it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::db::tables::agents::AgentRow;
use crate::error::ApiError;
use crate::models::{AgentSummary, DiscoveryRequest, DiscoveryResult};

use super::Registry;

const MAX_LIMIT: i64 = 50;
const DEFAULT_LIMIT: i64 = 5;

/// One candidate capability before ranking.
#[derive(Debug, Clone)]
pub(crate) struct Hit {
    pub agent_did: String,
    pub capability_id: String,
    pub description: String,
    pub tags: Value,
    pub score: f64,
}

/// Ranking knobs resolved once per request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RankingParams {
    pub weight_sim: f64,
    pub weight_rep: f64,
    pub weight_avail: f64,
    pub stale_after_ms: i64,
    pub min_reputation: f64,
}

impl Registry {
    pub async fn discover(
        &self,
        request: DiscoveryRequest,
    ) -> Result<Vec<DiscoveryResult>, ApiError> {
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::Validation(vec![format!(
                "limit: must be between 1 and {}",
                MAX_LIMIT
            )]));
        }
        let min_reputation = request.min_reputation.unwrap_or(self.config.min_rep_discover);
        if !(0.0..=1.0).contains(&min_reputation) {
            return Err(ApiError::Validation(vec![
                "minReputation: must be between 0 and 1".to_string(),
            ]));
        }

        // ANN arm; an outage here degrades the response, never fails it
        let query_vector = self.embedder.embed(&request.query).await;
        let vector_hits: Vec<Hit> = match self.vector.search(&query_vector, limit as usize).await {
            Ok(hits) => hits
                .into_iter()
                .map(|hit| Hit {
                    agent_did: hit.payload.agent_did,
                    capability_id: hit.payload.capability_id,
                    description: hit.payload.description,
                    tags: hit.payload.tags,
                    score: hit.score as f64,
                })
                .collect(),
            Err(e) => {
                log::warn!("Vector search failed, serving lexical results only: {}", e);
                Vec::new()
            }
        };

        // Lexical arm always runs
        let lexical_hits: Vec<Hit> = self
            .db
            .search_capabilities_by_keyword(&request.query)
            .await?
            .into_iter()
            .map(|row| Hit {
                agent_did: row.agent_did,
                capability_id: row.capability_id,
                description: row.description,
                tags: row.tags,
                score: self.config.lexical_score,
            })
            .collect();

        let merged = merge_hits(vector_hits, lexical_hits);

        let mut seen_dids = HashSet::new();
        let dids: Vec<String> = merged
            .iter()
            .filter(|hit| seen_dids.insert(hit.agent_did.clone()))
            .map(|hit| hit.agent_did.clone())
            .collect();
        let agents: HashMap<String, AgentRow> = self
            .db
            .find_agents_by_dids(&dids)
            .await?
            .into_iter()
            .map(|row| (row.did.clone(), row))
            .collect();

        let params = RankingParams {
            weight_sim: self.config.weight_sim,
            weight_rep: self.config.weight_rep,
            weight_avail: self.config.weight_avail,
            stale_after_ms: 2 * self.config.heartbeat_ttl_ms,
            min_reputation,
        };
        let mut results = rank(merged, &agents, Utc::now(), params);
        results.truncate(limit as usize);
        Ok(results)
    }
}

/// Merge the two hit lists, vector first, deduplicating on
/// (agentDid, capabilityId) and keeping the first occurrence.
pub(crate) fn merge_hits(vector_hits: Vec<Hit>, lexical_hits: Vec<Hit>) -> Vec<Hit> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for hit in vector_hits.into_iter().chain(lexical_hits) {
        let key = (hit.agent_did.clone(), hit.capability_id.clone());
        if seen.insert(key) {
            merged.push(hit);
        }
    }
    merged
}

/// Join, gate and score the merged hits; stable sort keeps first-seen
/// order on score ties.
pub(crate) fn rank(
    hits: Vec<Hit>,
    agents: &HashMap<String, AgentRow>,
    now: DateTime<Utc>,
    params: RankingParams,
) -> Vec<DiscoveryResult> {
    let mut results = Vec::new();

    for hit in hits {
        let agent = agents.get(&hit.agent_did);
        let reputation = agent.map(|a| a.reputation).unwrap_or(0.0);
        let reputation_score = reputation.clamp(0.0, 1.0);

        // Availability is null until the first heartbeat; a heartbeat older
        // than twice the TTL forces it to zero
        let availability = agent.and_then(|a| {
            let last_seen = a.last_seen?;
            let age_ms = now.signed_duration_since(last_seen).num_milliseconds();
            Some(if age_ms > params.stale_after_ms {
                0.0
            } else {
                a.availability_score
            })
        });

        // Gates: a known-dead agent drops out; one that never heartbeated
        // stays discoverable with a zero availability term
        if matches!(availability, Some(avail) if avail <= 0.0) {
            continue;
        }
        if reputation < params.min_reputation {
            continue;
        }

        let score = params.weight_sim * hit.score
            + params.weight_rep * reputation_score
            + params.weight_avail * availability.unwrap_or(0.0);

        results.push(DiscoveryResult {
            score,
            vector_score: hit.score,
            reputation_score,
            availability_score: availability,
            agent_did: hit.agent_did,
            capability_id: hit.capability_id,
            description: hit.description,
            tags: hit.tags,
            reputation,
            agent: agent.map(|a| AgentSummary {
                did: a.did.clone(),
                name: a.name.clone(),
                endpoint: a.endpoint.clone(),
                reputation: a.reputation,
                availability_score: a.availability_score,
                last_seen: a.last_seen,
            }),
        });
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hit(did: &str, cap: &str, score: f64) -> Hit {
        Hit {
            agent_did: did.to_string(),
            capability_id: cap.to_string(),
            description: format!("{} capability", cap),
            tags: serde_json::json!([]),
            score,
        }
    }

    fn agent(did: &str, reputation: f64, availability: f64, last_seen: Option<DateTime<Utc>>) -> AgentRow {
        AgentRow {
            did: did.to_string(),
            name: None,
            endpoint: format!("http://{}", did),
            reputation,
            availability_score: availability,
            last_seen,
        }
    }

    fn default_params() -> RankingParams {
        RankingParams {
            weight_sim: 0.7,
            weight_rep: 0.25,
            weight_avail: 0.2,
            stale_after_ms: 120_000,
            min_reputation: 0.0,
        }
    }

    #[test]
    fn merge_keeps_first_occurrence_of_duplicates() {
        let vector = vec![hit("a", "cap1", 0.9)];
        let lexical = vec![hit("a", "cap1", 0.45), hit("b", "cap2", 0.45)];
        let merged = merge_hits(vector, lexical);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].agent_did, "a");
        assert_eq!(merged[0].score, 0.9);
        assert_eq!(merged[1].agent_did, "b");
    }

    #[test]
    fn stale_agents_are_dropped() {
        let now = Utc::now();
        let mut agents = HashMap::new();
        // Last heartbeat three TTLs ago with a perfect availability score
        agents.insert(
            "a".to_string(),
            agent("a", 0.9, 1.0, Some(now - Duration::milliseconds(180_000))),
        );

        let results = rank(vec![hit("a", "cap1", 0.9)], &agents, now, default_params());
        assert!(results.is_empty());
    }

    #[test]
    fn zero_availability_with_fresh_heartbeat_is_dropped() {
        let now = Utc::now();
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), agent("a", 0.9, 0.0, Some(now)));

        let results = rank(vec![hit("a", "cap1", 0.9)], &agents, now, default_params());
        assert!(results.is_empty());
    }

    #[test]
    fn never_seen_agents_stay_discoverable_with_null_availability() {
        let now = Utc::now();
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), agent("a", 0.5, 0.0, None));

        let results = rank(vec![hit("a", "cap1", 0.8)], &agents, now, default_params());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].availability_score, None);
        // 0.7 * 0.8 + 0.25 * 0.5 + 0.2 * 0
        assert!((results[0].score - 0.685).abs() < 1e-9);
    }

    #[test]
    fn min_reputation_filters_low_reputation_agents() {
        let now = Utc::now();
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), agent("a", 0.2, 0.8, Some(now)));
        agents.insert("b".to_string(), agent("b", 0.6, 0.8, Some(now)));

        let mut params = default_params();
        params.min_reputation = 0.5;

        let results = rank(
            vec![hit("a", "cap1", 0.9), hit("b", "cap2", 0.3)],
            &agents,
            now,
            params,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_did, "b");
    }

    #[test]
    fn results_are_sorted_by_descending_score() {
        let now = Utc::now();
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), agent("a", 0.1, 1.0, Some(now)));
        agents.insert("b".to_string(), agent("b", 0.9, 1.0, Some(now)));

        let results = rank(
            vec![hit("a", "cap1", 0.5), hit("b", "cap2", 0.5), hit("a", "cap3", 0.95)],
            &agents,
            now,
            default_params(),
        );

        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].capability_id, "cap3");
    }

    #[test]
    fn unknown_agents_rank_with_zero_reputation_and_null_agent() {
        let now = Utc::now();
        let results = rank(vec![hit("ghost", "cap1", 0.6)], &HashMap::new(), now, default_params());

        assert_eq!(results.len(), 1);
        assert!(results[0].agent.is_none());
        assert_eq!(results[0].reputation, 0.0);
        assert!((results[0].score - 0.42).abs() < 1e-9);
    }

    #[test]
    fn reputation_is_clamped_for_scoring_but_reported_raw() {
        let now = Utc::now();
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), agent("a", 1.5, 1.0, Some(now)));

        let results = rank(vec![hit("a", "cap1", 0.0)], &agents, now, default_params());
        assert_eq!(results[0].reputation, 1.5);
        assert_eq!(results[0].reputation_score, 1.0);
        // 0.25 * 1.0 + 0.2 * 1.0
        assert!((results[0].score - 0.45).abs() < 1e-9);
    }
}
