//! PostgreSQL plugin store over `plugin_status` and `plugin_option`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::status::{PluginOptions, PluginRecord, PluginStore};

const RECORD_COLUMNS: &str = "name, version, active, revision, installed_at, updated_at";

#[derive(Clone)]
pub struct PgPluginStore {
    pool: PgPool,
}

impl PgPluginStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PluginStore for PgPluginStore {
    async fn get(&self, name: &str) -> Result<Option<PluginRecord>> {
        let record = sqlx::query_as::<_, PluginRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM plugin_status WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to fetch status of plugin '{name}'"))?;

        Ok(record)
    }

    async fn all(&self) -> Result<Vec<PluginRecord>> {
        let records = sqlx::query_as::<_, PluginRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM plugin_status ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list plugin statuses")?;

        Ok(records)
    }

    async fn insert(&self, name: &str, version: &str, active: bool) -> Result<Option<PluginRecord>> {
        let now = chrono::Utc::now().timestamp();

        let record = sqlx::query_as::<_, PluginRecord>(&format!(
            "INSERT INTO plugin_status (name, version, active, revision, installed_at, updated_at) \
             VALUES ($1, $2, $3, 1, $4, $4) \
             ON CONFLICT (name) DO NOTHING \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(name)
        .bind(version)
        .bind(active)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to record installation of plugin '{name}'"))?;

        Ok(record)
    }

    async fn update(
        &self,
        name: &str,
        expected_revision: i64,
        version: &str,
        active: bool,
    ) -> Result<Option<PluginRecord>> {
        let now = chrono::Utc::now().timestamp();

        let record = sqlx::query_as::<_, PluginRecord>(&format!(
            "UPDATE plugin_status \
             SET version = $1, active = $2, revision = revision + 1, updated_at = $3 \
             WHERE name = $4 AND revision = $5 \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(version)
        .bind(active)
        .bind(now)
        .bind(name)
        .bind(expected_revision)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to update status of plugin '{name}'"))?;

        Ok(record)
    }

    async fn delete(&self, name: &str, expected_revision: i64) -> Result<bool> {
        // plugin_option rows go with the status row (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM plugin_status WHERE name = $1 AND revision = $2")
            .bind(name)
            .bind(expected_revision)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete status of plugin '{name}'"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn options(&self, name: &str) -> Result<PluginOptions> {
        let rows = sqlx::query("SELECT key, value FROM plugin_option WHERE plugin = $1")
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to load options of plugin '{name}'"))?;

        rows.iter()
            .map(|row| -> Result<(String, String)> {
                Ok((row.try_get("key")?, row.try_get("value")?))
            })
            .collect()
    }

    async fn set_options(&self, name: &str, options: &PluginOptions) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;

        for (key, value) in options {
            sqlx::query(
                "INSERT INTO plugin_option (plugin, key, value) VALUES ($1, $2, $3) \
                 ON CONFLICT (plugin, key) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(name)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to store option '{key}' of plugin '{name}'"))?;
        }

        tx.commit().await.context("failed to commit transaction")?;
        Ok(())
    }
}
