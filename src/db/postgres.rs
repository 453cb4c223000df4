//! PostgreSQL metadata store - schema migration and connection management
//!
//! This file contains:
//! - Database struct definition over a sqlx connection pool
//! - Idempotent schema creation and migrations
//!
//! All table operations live in the tables/ subdirectory.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Main database wrapper with a sqlx connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to Postgres and run the startup migration
    pub async fn connect(postgres_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(postgres_url)
            .await?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    #[inline]
    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Liveness probe used by /health
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Initialize tables and run migrations. Safe to run against an
    /// already-migrated database: every statement is conditional.
    async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agents (
                did TEXT PRIMARY KEY,
                name TEXT,
                endpoint TEXT NOT NULL,
                public_key TEXT,
                wallet_address TEXT,
                reputation DOUBLE PRECISION NOT NULL DEFAULT 0,
                availability_score DOUBLE PRECISION NOT NULL DEFAULT 0,
                last_seen TIMESTAMPTZ,
                card_version BIGINT,
                card_lineage TEXT,
                card_signature TEXT,
                card_raw JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS capabilities (
                id BIGSERIAL PRIMARY KEY,
                agent_did TEXT NOT NULL REFERENCES agents(did) ON DELETE CASCADE,
                capability_id TEXT NOT NULL,
                description TEXT NOT NULL,
                tags JSONB NOT NULL DEFAULT '[]',
                output_schema JSONB,
                price_cents BIGINT NOT NULL DEFAULT 10,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (agent_did, capability_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Columns added after the first deployed schema; tolerated on
        // databases that already have them
        for statement in [
            "ALTER TABLE agents ADD COLUMN IF NOT EXISTS wallet_address TEXT",
            "ALTER TABLE agents ADD COLUMN IF NOT EXISTS card_version BIGINT",
            "ALTER TABLE agents ADD COLUMN IF NOT EXISTS card_lineage TEXT",
            "ALTER TABLE agents ADD COLUMN IF NOT EXISTS card_signature TEXT",
            "ALTER TABLE agents ADD COLUMN IF NOT EXISTS card_raw JSONB",
            "ALTER TABLE capabilities ADD COLUMN IF NOT EXISTS output_schema JSONB",
            "ALTER TABLE capabilities ADD COLUMN IF NOT EXISTS price_cents BIGINT NOT NULL DEFAULT 10",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_agents_wallet
             ON agents (wallet_address) WHERE wallet_address IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
