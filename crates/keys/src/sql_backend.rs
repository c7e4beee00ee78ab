//! The relational key repository backend, preferred when `DATABASE_URL`
//! is configured and reachable at startup (spec §4.B).
//!
//! Uses `sqlx::AnyPool` so the same queries run against SQLite or
//! Postgres depending on the connection string's scheme.

use async_trait::async_trait;
use ovp_core::{
    ApiKeyPatch, ApiKeyRecord, ApiKeySummary, GatewayError, ProviderKeyPolicy, RateLimitPolicy,
    Result,
};
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::key_repository::{generate_plaintext, hash_plaintext, suffix_of, KeyRepository};

pub struct SqlKeyRepository {
    pool: AnyPool,
}

impl SqlKeyRepository {
    pub async fn connect(database_url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| GatewayError::Persistence(format!("connect: {e}")))?;

        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                is_admin INTEGER NOT NULL,
                active INTEGER NOT NULL,
                key_hash TEXT NOT NULL UNIQUE,
                suffix TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_used_at TEXT,
                request_count INTEGER NOT NULL DEFAULT 0,
                rate_limit_requests INTEGER NOT NULL,
                rate_limit_window_ms INTEGER NOT NULL,
                expires_at TEXT,
                engine_config TEXT NOT NULL DEFAULT '{}',
                allowed_voices TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Persistence(format!("schema: {e}")))?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::any::AnyRow) -> Result<ApiKeyRecord> {
        let engine_config_json: String = row.try_get("engine_config").unwrap_or_default();
        let engine_config: HashMap<String, ProviderKeyPolicy> =
            serde_json::from_str(&engine_config_json).unwrap_or_default();

        let allowed_voices_json: Option<String> = row.try_get("allowed_voices").ok();
        let allowed_voices = allowed_voices_json
            .filter(|s| !s.is_empty())
            .and_then(|s| serde_json::from_str(&s).ok());

        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| GatewayError::Persistence(e.to_string()))?;
        let last_used_at: Option<String> = row.try_get("last_used_at").ok();
        let expires_at: Option<String> = row.try_get("expires_at").ok();

        Ok(ApiKeyRecord {
            id: row.try_get("id").map_err(|e| GatewayError::Persistence(e.to_string()))?,
            name: row.try_get("name").map_err(|e| GatewayError::Persistence(e.to_string()))?,
            is_admin: row.try_get::<i64, _>("is_admin").map_err(|e| GatewayError::Persistence(e.to_string()))? != 0,
            active: row.try_get::<i64, _>("active").map_err(|e| GatewayError::Persistence(e.to_string()))? != 0,
            key_hash: row.try_get("key_hash").map_err(|e| GatewayError::Persistence(e.to_string()))?,
            suffix: row.try_get("suffix").map_err(|e| GatewayError::Persistence(e.to_string()))?,
            created_at: parse_timestamp(&created_at)?,
            last_used_at: last_used_at.map(|s| parse_timestamp(&s)).transpose()?,
            request_count: row
                .try_get::<i64, _>("request_count")
                .map_err(|e| GatewayError::Persistence(e.to_string()))? as u64,
            rate_limit: RateLimitPolicy {
                requests: row
                    .try_get::<i64, _>("rate_limit_requests")
                    .map_err(|e| GatewayError::Persistence(e.to_string()))? as u32,
                window_ms: row
                    .try_get::<i64, _>("rate_limit_window_ms")
                    .map_err(|e| GatewayError::Persistence(e.to_string()))?,
            },
            expires_at: expires_at.map(|s| parse_timestamp(&s)).transpose()?,
            engine_config,
            allowed_voices,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| GatewayError::Persistence(format!("bad timestamp '{s}': {e}")))
}

#[async_trait]
impl KeyRepository for SqlKeyRepository {
    async fn create(
        &self,
        name: String,
        is_admin: bool,
        active: bool,
        rate_limit: RateLimitPolicy,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
        allowed_voices: Option<Vec<String>>,
    ) -> Result<(String, ApiKeyRecord)> {
        let plaintext = generate_plaintext();
        let record = ApiKeyRecord {
            id: Uuid::new_v4().to_string(),
            name,
            is_admin,
            active,
            key_hash: hash_plaintext(&plaintext),
            suffix: suffix_of(&plaintext),
            created_at: chrono::Utc::now(),
            last_used_at: None,
            request_count: 0,
            rate_limit,
            expires_at,
            engine_config: HashMap::new(),
            allowed_voices,
        };

        sqlx::query(
            r#"
            INSERT INTO api_keys
                (id, name, is_admin, active, key_hash, suffix, created_at, last_used_at,
                 request_count, rate_limit_requests, rate_limit_window_ms, expires_at,
                 engine_config, allowed_voices)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.is_admin as i64)
        .bind(record.active as i64)
        .bind(&record.key_hash)
        .bind(&record.suffix)
        .bind(record.created_at.to_rfc3339())
        .bind(Option::<String>::None)
        .bind(record.request_count as i64)
        .bind(record.rate_limit.requests as i64)
        .bind(record.rate_limit.window_ms)
        .bind(record.expires_at.map(|d| d.to_rfc3339()))
        .bind("{}")
        .bind(record.allowed_voices.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default()))
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Persistence(format!("insert key: {e}")))?;

        Ok((plaintext, record))
    }

    async fn lookup_by_plaintext(&self, plaintext: &str) -> Result<Option<ApiKeyRecord>> {
        let hash = hash_plaintext(plaintext);
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = ? AND active = 1")
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GatewayError::Persistence(format!("lookup: {e}")))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(&self) -> Result<Vec<ApiKeySummary>> {
        let rows = sqlx::query("SELECT * FROM api_keys")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GatewayError::Persistence(format!("list: {e}")))?;

        rows.iter()
            .map(Self::row_to_record)
            .map(|r| r.map(|rec| ApiKeySummary::from(&rec)))
            .collect()
    }

    async fn update(&self, id: &str, patch: ApiKeyPatch) -> Result<ApiKeyRecord> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GatewayError::Persistence(format!("update lookup: {e}")))?
            .ok_or_else(|| GatewayError::NotFound(format!("no key with id {id}")))?;

        let mut record = Self::row_to_record(&row)?;

        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(active) = patch.active {
            record.active = active;
        }
        if let Some(is_admin) = patch.is_admin {
            record.is_admin = is_admin;
        }
        if let Some(rate_limit) = patch.rate_limit {
            record.rate_limit = rate_limit;
        }
        if let Some(expires_at) = patch.expires_at {
            record.expires_at = expires_at;
        }

        sqlx::query(
            r#"
            UPDATE api_keys SET
                name = ?, is_admin = ?, active = ?, rate_limit_requests = ?,
                rate_limit_window_ms = ?, expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.name)
        .bind(record.is_admin as i64)
        .bind(record.active as i64)
        .bind(record.rate_limit.requests as i64)
        .bind(record.rate_limit.window_ms)
        .bind(record.expires_at.map(|d| d.to_rfc3339()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Persistence(format!("update: {e}")))?;

        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| GatewayError::Persistence(format!("delete: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("no key with id {id}")));
        }
        Ok(())
    }

    async fn get_engine_config(&self, id: &str) -> Result<HashMap<String, ProviderKeyPolicy>> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GatewayError::Persistence(format!("engine config lookup: {e}")))?
            .ok_or_else(|| GatewayError::NotFound(format!("no key with id {id}")))?;

        Ok(Self::row_to_record(&row)?.engine_config)
    }

    async fn set_engine_config(
        &self,
        id: &str,
        config: HashMap<String, ProviderKeyPolicy>,
        allowed_voices: Option<Vec<String>>,
    ) -> Result<()> {
        let engine_config_json =
            serde_json::to_string(&config).map_err(|e| GatewayError::Internal(e.to_string()))?;

        if let Some(voices) = allowed_voices {
            let voices_json =
                serde_json::to_string(&voices).map_err(|e| GatewayError::Internal(e.to_string()))?;
            sqlx::query("UPDATE api_keys SET engine_config = ?, allowed_voices = ? WHERE id = ?")
                .bind(engine_config_json)
                .bind(voices_json)
                .bind(id)
                .execute(&self.pool)
                .await
        } else {
            sqlx::query("UPDATE api_keys SET engine_config = ? WHERE id = ?")
                .bind(engine_config_json)
                .bind(id)
                .execute(&self.pool)
                .await
        }
        .map_err(|e| GatewayError::Persistence(format!("set engine config: {e}")))?;

        Ok(())
    }

    async fn touch(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE api_keys SET last_used_at = ?, request_count = request_count + 1 WHERE id = ?",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Persistence(format!("touch: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqlKeyRepository {
        SqlKeyRepository::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_then_lookup_by_plaintext() {
        let repo = repo().await;
        let (plaintext, record) = repo
            .create("test".to_string(), false, true, RateLimitPolicy::default(), None, None)
            .await
            .unwrap();

        let found = repo.lookup_by_plaintext(&plaintext).await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
    }

    #[tokio::test]
    async fn update_rejects_unknown_id() {
        let repo = repo().await;
        let result = repo.update("no-such-id", ApiKeyPatch::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn touch_increments_request_count() {
        let repo = repo().await;
        let (_, record) = repo
            .create("test".to_string(), false, true, RateLimitPolicy::default(), None, None)
            .await
            .unwrap();
        repo.touch(&record.id).await.unwrap();
        let list = repo.list().await.unwrap();
        assert_eq!(list.iter().find(|s| s.id == record.id).unwrap().request_count, 1);
    }
}
