//! PostgreSQL tag store.
//!
//! Uniqueness is enforced by the `tag.name` and
//! `tagging (tag_id, record_kind, record_id, user_id)` unique constraints.
//! Inserts use `ON CONFLICT DO NOTHING` followed by a reselect, so concurrent
//! writers converge on the same rows instead of failing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::model::{RecordKind, RecordRef, Tag, Tagging};
use super::store::{AppliedChanges, TagChangeSet, TagStore};

/// Tag store backed by the `tag` and `tagging` tables.
#[derive(Clone)]
pub struct PgTagStore {
    pool: PgPool,
}

impl PgTagStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tagging_from_row(row: &PgRow) -> Result<Tagging> {
    let kind: String = row.try_get("record_kind")?;
    let kind: RecordKind = kind.parse()?;
    Ok(Tagging {
        id: row.try_get("id")?,
        tag_id: row.try_get("tag_id")?,
        record: RecordRef::new(kind, row.try_get("record_id")?),
        user_id: row.try_get("user_id")?,
        created: row.try_get("created")?,
    })
}

/// Names in a fixed order without repeats, so concurrent writers lock rows
/// in the same order.
fn sorted_unique(names: &[String]) -> Vec<&str> {
    let mut names: Vec<&str> = names.iter().map(String::as_str).collect();
    names.sort_unstable();
    names.dedup();
    names
}

async fn find_or_create_in(
    conn: &mut PgConnection,
    name: &str,
    created_by: Uuid,
    now: i64,
) -> Result<Tag> {
    sqlx::query(
        "INSERT INTO tag (name, created_by, created) VALUES ($1, $2, $3) \
         ON CONFLICT (name) DO NOTHING",
    )
    .bind(name)
    .bind(created_by)
    .bind(now)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("failed to insert tag '{name}'"))?;

    let tag = sqlx::query_as::<_, Tag>(
        "SELECT id, name, created_by, created FROM tag WHERE name = $1",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("failed to fetch tag '{name}'"))?;

    Ok(tag)
}

#[async_trait]
impl TagStore for PgTagStore {
    async fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>(
            "SELECT id, name, created_by, created FROM tag WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch tag")?;

        Ok(tag)
    }

    async fn find_or_create_tag(&self, name: &str, created_by: Uuid) -> Result<Tag> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection")?;
        find_or_create_in(&mut *conn, name, created_by, now).await
    }

    async fn tags_for(&self, record: RecordRef, user: Option<Uuid>) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT DISTINCT g.id, g.name, g.created_by, g.created
            FROM tag g
            JOIN tagging t ON t.tag_id = g.id
            WHERE t.record_kind = $1 AND t.record_id = $2
              AND ($3::uuid IS NULL OR t.user_id = $3)
            ORDER BY g.name
            "#,
        )
        .bind(record.kind.as_str())
        .bind(record.id)
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .context("failed to list record tags")?;

        Ok(tags)
    }

    async fn taggings_for(&self, record: RecordRef) -> Result<Vec<Tagging>> {
        let rows = sqlx::query(
            "SELECT id, tag_id, record_kind, record_id, user_id, created FROM tagging \
             WHERE record_kind = $1 AND record_id = $2 ORDER BY id",
        )
        .bind(record.kind.as_str())
        .bind(record.id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list taggings")?;

        rows.iter().map(tagging_from_row).collect()
    }

    async fn count_taggings(&self, tag: &str, record: RecordRef, user: Option<Uuid>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tagging t
            JOIN tag g ON g.id = t.tag_id
            WHERE g.name = $1 AND t.record_kind = $2 AND t.record_id = $3
              AND ($4::uuid IS NULL OR t.user_id = $4)
            "#,
        )
        .bind(tag)
        .bind(record.kind.as_str())
        .bind(record.id)
        .bind(user)
        .fetch_one(&self.pool)
        .await
        .context("failed to count taggings")?;

        Ok(count.max(0) as u64)
    }

    async fn apply(&self, changes: &TagChangeSet) -> Result<AppliedChanges> {
        let now = chrono::Utc::now().timestamp();
        let owner = (!changes.remove_for_all_owners).then_some(changes.user);
        let mut applied = AppliedChanges::default();

        // Tags are created and committed before the tagging transaction, one
        // statement each, so no transaction holds an uncommitted tag row that
        // a concurrent writer has to wait on.
        let mut tags = Vec::new();
        {
            let mut conn = self
                .pool
                .acquire()
                .await
                .context("failed to acquire connection")?;
            for name in sorted_unique(&changes.add) {
                tags.push(find_or_create_in(&mut *conn, name, changes.user, now).await?);
            }
        }
        tags.sort_by_key(|tag| tag.id);

        let mut tx = self.pool.begin().await.context("failed to start transaction")?;

        for name in sorted_unique(&changes.remove) {
            let result = sqlx::query(
                r#"
                DELETE FROM tagging t
                USING tag g
                WHERE t.tag_id = g.id AND g.name = $1
                  AND t.record_kind = $2 AND t.record_id = $3
                  AND ($4::uuid IS NULL OR t.user_id = $4)
                "#,
            )
            .bind(name)
            .bind(changes.record.kind.as_str())
            .bind(changes.record.id)
            .bind(owner)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to remove tag '{name}'"))?;

            applied.removed_taggings += result.rows_affected();
        }

        for tag in &tags {
            let result = sqlx::query(
                r#"
                INSERT INTO tagging (tag_id, record_kind, record_id, user_id, created)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (tag_id, record_kind, record_id, user_id) DO NOTHING
                "#,
            )
            .bind(tag.id)
            .bind(changes.record.kind.as_str())
            .bind(changes.record.id)
            .bind(changes.user)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to add tag '{}'", tag.name))?;

            applied.added_taggings += result.rows_affected();
        }

        tx.commit().await.context("failed to commit transaction")?;

        Ok(applied)
    }

    async fn delete_taggings_for(&self, record: RecordRef) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tagging WHERE record_kind = $1 AND record_id = $2")
            .bind(record.kind.as_str())
            .bind(record.id)
            .execute(&self.pool)
            .await
            .context("failed to delete record taggings")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_names_are_sorted_and_unique() {
        let names = vec!["q".to_string(), "p".to_string(), "q".to_string()];
        assert_eq!(sorted_unique(&names), vec!["p", "q"]);
        assert!(sorted_unique(&[]).is_empty());
    }
}
