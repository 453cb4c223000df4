//! Database operations for the agents table

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

use crate::db::Database;

/// Agent metadata joined into discovery results.
#[derive(Debug, Clone, FromRow)]
pub struct AgentRow {
    pub did: String,
    pub name: Option<String>,
    pub endpoint: String,
    pub reputation: f64,
    pub availability_score: f64,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Fields written by the registration pipeline.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub did: String,
    pub name: Option<String>,
    pub endpoint: String,
    pub public_key: Option<String>,
    pub wallet_address: Option<String>,
    pub card_version: Option<i64>,
    pub card_lineage: Option<String>,
    pub card_signature: Option<String>,
    pub card_raw: Option<Value>,
}

impl Database {
    /// Insert-or-update keyed on did. A known wallet address is preserved
    /// when the new payload carries none; every other payload column is
    /// overwritten. Reputation, availability and last_seen are untouched.
    pub async fn upsert_agent(&self, agent: &NewAgent) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO agents
                (did, name, endpoint, public_key, wallet_address,
                 card_version, card_lineage, card_signature, card_raw)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (did) DO UPDATE SET
                name = EXCLUDED.name,
                endpoint = EXCLUDED.endpoint,
                public_key = EXCLUDED.public_key,
                wallet_address = COALESCE(EXCLUDED.wallet_address, agents.wallet_address),
                card_version = EXCLUDED.card_version,
                card_lineage = EXCLUDED.card_lineage,
                card_signature = EXCLUDED.card_signature,
                card_raw = EXCLUDED.card_raw",
        )
        .bind(&agent.did)
        .bind(&agent.name)
        .bind(&agent.endpoint)
        .bind(&agent.public_key)
        .bind(&agent.wallet_address)
        .bind(agent.card_version)
        .bind(&agent.card_lineage)
        .bind(&agent.card_signature)
        .bind(&agent.card_raw)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Batched metadata lookup for the discovery join
    pub async fn find_agents_by_dids(&self, dids: &[String]) -> Result<Vec<AgentRow>, sqlx::Error> {
        if dids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, AgentRow>(
            "SELECT did, name, endpoint, reputation, availability_score, last_seen
             FROM agents WHERE did = ANY($1)",
        )
        .bind(dids)
        .fetch_all(self.pool())
        .await
    }

    /// Returns the number of rows updated (0 when the did is unknown)
    pub async fn update_reputation(&self, did: &str, reputation: f64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE agents SET reputation = $2 WHERE did = $1")
            .bind(did)
            .bind(reputation)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Returns the number of rows updated (0 when the did is unknown)
    pub async fn update_availability(
        &self,
        did: &str,
        availability: f64,
        last_seen: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE agents SET availability_score = $2, last_seen = $3 WHERE did = $1",
        )
        .bind(did)
        .bind(availability)
        .bind(last_seen)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
