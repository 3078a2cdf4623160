use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::common::{CategoryId, UserId};

/// Longest title the `categories.title` column accepts.
pub const MAX_CATEGORY_TITLE_LEN: usize = 100;

/// Category - one node of an owner's category forest.
///
/// Roots have `parent_id = NULL` and `group_id = id`; children carry their
/// root's id as `group_id` and `level = parent.level + 1`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub group_id: Option<CategoryId>,
    pub level: i32,
    pub parent_id: Option<CategoryId>,
    pub priority: i32,
    pub user_id: UserId,
    pub title: String, // unique per user, not globally

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Values written when a category does not exist yet.
#[derive(Debug, Clone)]
pub struct CategoryUpsert<'a> {
    pub id: CategoryId,
    pub user_id: UserId,
    pub title: &'a str,
    pub parent_id: Option<CategoryId>,
    pub group_id: CategoryId,
    pub level: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertedCategory {
    #[sqlx(flatten)]
    category: Category,
    inserted: bool,
}

// =============================================================================
// Writes (join the caller's transaction)
// =============================================================================

impl Category {
    /// Insert a category or touch the existing (user_id, title) row.
    ///
    /// The existing row keeps its id and tree position; it is returned as
    /// persisted together with `false` so the caller can check the position.
    /// A concurrent insert of the same title blocks on the unique index and
    /// then returns the winner's row.
    pub async fn upsert(
        input: &CategoryUpsert<'_>,
        conn: &mut PgConnection,
    ) -> sqlx::Result<(Self, bool)> {
        let row = sqlx::query_as::<_, UpsertedCategory>(
            r#"
            INSERT INTO categories (id, group_id, level, parent_id, user_id, title)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, title) WHERE deleted_at IS NULL
            DO UPDATE SET updated_at = now()
            RETURNING categories.*, (xmax = 0) AS inserted
            "#,
        )
        .bind(input.id)
        .bind(input.group_id)
        .bind(input.level)
        .bind(input.parent_id)
        .bind(input.user_id)
        .bind(input.title)
        .fetch_one(&mut *conn)
        .await?;

        Ok((row.category, row.inserted))
    }

    /// Rewrite `group_id` and `level` of a node whose parent is already correct.
    pub async fn repair_position(
        id: CategoryId,
        group_id: CategoryId,
        level: i32,
        conn: &mut PgConnection,
    ) -> sqlx::Result<Self> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET group_id = $2, level = $3, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(group_id)
        .bind(level)
        .fetch_one(&mut *conn)
        .await
    }
}

// =============================================================================
// Queries
// =============================================================================

impl Category {
    pub async fn find_by_id(id: CategoryId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Find the live category an owner uses for `title`
    pub async fn find_by_title(
        user_id: UserId,
        title: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE user_id = $1 AND title = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(title)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Direct children, by priority then title
    pub async fn find_children(id: CategoryId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE parent_id = $1 AND deleted_at IS NULL
            ORDER BY priority, title
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Path from the root down to (and including) `id`.
    pub async fn find_path(id: CategoryId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Category>(
            r#"
            WITH RECURSIVE ancestors AS (
                SELECT c.*, 0 AS depth
                FROM categories c
                WHERE c.id = $1
                UNION ALL
                SELECT p.*, a.depth + 1
                FROM categories p
                INNER JOIN ancestors a ON p.id = a.parent_id
            )
            SELECT id, group_id, level, parent_id, priority, user_id, title,
                   created_at, updated_at, deleted_at
            FROM ancestors
            ORDER BY depth DESC
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// All live categories of an owner, roots first
    pub async fn find_by_user(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY level, priority, title
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn count_by_user(user_id: UserId, pool: &PgPool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM categories WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
