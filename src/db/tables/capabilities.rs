//! Database operations for the capabilities table

use serde_json::Value;
use sqlx::FromRow;

use crate::db::Database;

/// A capability row as used by discovery and reindexing.
#[derive(Debug, Clone, FromRow)]
pub struct CapabilityRow {
    pub agent_did: String,
    pub capability_id: String,
    pub description: String,
    pub tags: Value,
    pub output_schema: Option<Value>,
}

/// Escape ILIKE metacharacters so user input matches literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl Database {
    /// Delete every capability owned by an agent. Runs first in the
    /// replacement sequence; the vector-index delete follows it.
    pub async fn delete_capabilities(&self, did: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM capabilities WHERE agent_did = $1")
            .bind(did)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_capability(
        &self,
        did: &str,
        capability_id: &str,
        description: &str,
        tags: &Value,
        output_schema: Option<&Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO capabilities (agent_did, capability_id, description, tags, output_schema)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(did)
        .bind(capability_id)
        .bind(description)
        .bind(tags)
        .bind(output_schema)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Case-insensitive substring match on capability_id or description.
    /// The caller caps the merged result set; this bounds the raw scan.
    pub async fn search_capabilities_by_keyword(
        &self,
        keyword: &str,
    ) -> Result<Vec<CapabilityRow>, sqlx::Error> {
        let pattern = format!("%{}%", escape_like(keyword));
        sqlx::query_as::<_, CapabilityRow>(
            "SELECT agent_did, capability_id, description, tags, output_schema
             FROM capabilities
             WHERE capability_id ILIKE $1 OR description ILIKE $1
             LIMIT 100",
        )
        .bind(pattern)
        .fetch_all(self.pool())
        .await
    }

    /// Outer Option: capability exists; inner Option: schema present
    pub async fn get_capability_output_schema(
        &self,
        capability_id: &str,
    ) -> Result<Option<Option<Value>>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<Value>>(
            "SELECT output_schema FROM capabilities WHERE capability_id = $1 LIMIT 1",
        )
        .bind(capability_id)
        .fetch_optional(self.pool())
        .await
    }

    /// Full capability scan for the admin reindex, ordered so the
    /// reindexer can group per agent
    pub async fn list_all_capabilities(&self) -> Result<Vec<CapabilityRow>, sqlx::Error> {
        sqlx::query_as::<_, CapabilityRow>(
            "SELECT agent_did, capability_id, description, tags, output_schema
             FROM capabilities ORDER BY agent_did, id",
        )
        .fetch_all(self.pool())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_neutralizes_metacharacters() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }
}
