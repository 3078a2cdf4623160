//! Category path resolution.
//!
//! Maps an ordered list of category names (root first) onto an owner's
//! category forest in one pass, creating missing nodes and reusing existing
//! ones. Titles are unique per owner, so a title that already lives at a
//! different position is a conflict rather than a second node.

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};

use crate::common::{CategoryId, SnowflakeGenerator, UserId};
use crate::domains::publishing::{CategoryPosition, PublishError};

use super::models::{Category, CategoryUpsert, MAX_CATEGORY_TITLE_LEN};

/// Outcome of resolving one category path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedCategories {
    /// Ids in path order, root first.
    pub chain: Vec<CategoryId>,
    /// Last element of `chain`; the post's primary category.
    pub deepest: Option<CategoryId>,
    pub nodes: Vec<Category>,
}

pub struct CategoryResolver<'a> {
    ids: &'a SnowflakeGenerator,
}

impl<'a> CategoryResolver<'a> {
    pub fn new(ids: &'a SnowflakeGenerator) -> Self {
        Self { ids }
    }

    /// Trim every segment and reject empty or overlong names.
    pub fn normalize_path(path: &[String]) -> Result<Vec<String>, PublishError> {
        path.iter()
            .enumerate()
            .map(|(position, name)| {
                let name = name.trim();
                if name.is_empty() {
                    return Err(PublishError::validation(format!(
                        "category path segment {} is empty",
                        position
                    )));
                }
                if name.chars().count() > MAX_CATEGORY_TITLE_LEN {
                    return Err(PublishError::validation(format!(
                        "category \"{}\" exceeds {} characters",
                        name, MAX_CATEGORY_TITLE_LEN
                    )));
                }
                Ok(name.to_string())
            })
            .collect()
    }

    /// Resolve a path in its own transaction: the whole chain commits or
    /// nothing does.
    pub async fn resolve(
        &self,
        path: &[String],
        owner: UserId,
        pool: &PgPool,
    ) -> Result<ResolvedCategories, PublishError> {
        let names = Self::normalize_path(path)?;
        if names.is_empty() {
            return Ok(ResolvedCategories::default());
        }

        let mut tx = pool.begin().await?;
        let resolved = self.resolve_in(&names, owner, &mut *tx).await?;
        tx.commit().await?;

        Ok(resolved)
    }

    /// Resolve a path inside the caller's transaction.
    ///
    /// Errors leave partial writes in that transaction; the caller must roll
    /// it back.
    pub async fn resolve_in(
        &self,
        path: &[String],
        owner: UserId,
        conn: &mut PgConnection,
    ) -> Result<ResolvedCategories, PublishError> {
        let names = Self::normalize_path(path)?;

        let mut chain: Vec<CategoryId> = Vec::with_capacity(names.len());
        let mut nodes = Vec::with_capacity(names.len());
        let mut root: Option<CategoryId> = None;

        for (position, title) in names.iter().enumerate() {
            let level = position as i32;
            let parent_id = chain.last().copied();
            let id: CategoryId = self.ids.next()?;

            let (category, inserted) = Category::upsert(
                &CategoryUpsert {
                    id,
                    user_id: owner,
                    title,
                    parent_id,
                    group_id: root.unwrap_or(id),
                    level,
                },
                &mut *conn,
            )
            .await?;

            let category = if inserted {
                debug!(
                    category_id = %category.id,
                    user_id = %owner,
                    title = %title,
                    level,
                    "Created category"
                );
                category
            } else {
                self.reconcile(category, parent_id, root, level, conn).await?
            };

            root.get_or_insert(category.id);
            chain.push(category.id);
            nodes.push(category);
        }

        info!(
            user_id = %owner,
            path = %names.join(" > "),
            depth = chain.len(),
            "Resolved category path"
        );

        Ok(ResolvedCategories {
            deepest: chain.last().copied(),
            chain,
            nodes,
        })
    }

    /// Check a reused node against the position this path gives it.
    async fn reconcile(
        &self,
        category: Category,
        parent_id: Option<CategoryId>,
        root: Option<CategoryId>,
        level: i32,
        conn: &mut PgConnection,
    ) -> Result<Category, PublishError> {
        if category.parent_id != parent_id {
            warn!(
                category_id = %category.id,
                title = %category.title,
                existing_parent = ?category.parent_id,
                requested_parent = ?parent_id,
                "Category title already placed elsewhere"
            );
            return Err(PublishError::CategoryConflict {
                title: category.title,
                existing: CategoryPosition {
                    parent_id: category.parent_id,
                    level: category.level,
                },
                requested: CategoryPosition { parent_id, level },
            });
        }

        let group_id = root.unwrap_or(category.id);
        if category.group_id == Some(group_id) && category.level == level {
            return Ok(category);
        }

        info!(
            category_id = %category.id,
            stale_group = ?category.group_id,
            stale_level = category.level,
            group_id = %group_id,
            level,
            "Repairing category position"
        );
        Ok(Category::repair_position(category.id, group_id, level, conn).await?)
    }
}
