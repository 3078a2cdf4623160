use anyhow::Result;
use sqlx::{PgConnection, PgPool};

use crate::common::{CategoryId, PostId};

/// Link between a post and every category on its resolved path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostCategory;

impl PostCategory {
    /// Link a post to a category. Re-linking only refreshes `updated_at`.
    pub async fn link(
        post_id: PostId,
        category_id: CategoryId,
        conn: &mut PgConnection,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_categories (post_id, category_id)
            VALUES ($1, $2)
            ON CONFLICT (post_id, category_id) DO UPDATE SET updated_at = now()
            "#,
        )
        .bind(post_id)
        .bind(category_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn find_category_ids_for_post(
        post_id: PostId,
        pool: &PgPool,
    ) -> Result<Vec<CategoryId>> {
        sqlx::query_scalar::<_, CategoryId>(
            r#"
            SELECT pc.category_id
            FROM post_categories pc
            INNER JOIN categories c ON c.id = pc.category_id
            WHERE pc.post_id = $1 AND pc.deleted_at IS NULL
            ORDER BY c.level, c.id
            "#,
        )
        .bind(post_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
