//! Publication state machine.
//!
//! ```text
//! Prepared -> CategoriesResolved -> PostUpserted -> Linked -> Committed
//!     \______________\_________________\______________\____-> Aborted
//! ```
//!
//! One `Publication` owns one database transaction for its whole life. Any
//! failed step rolls it back; so does dropping the publication before
//! `commit`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgConnection, Postgres, Transaction};
use tracing::{debug, info, warn};

use crate::common::{CategoryId, FileId, PostId, SnowflakeGenerator, TagId, UserId};
use crate::domains::categories::{CategoryResolver, ResolvedCategories};
use crate::domains::files::{File, FileUpsert};
use crate::domains::posts::{Post, PostCategory, PostTag, PostUpsert};
use crate::domains::tags::models::{Tag, MAX_TAG_TITLE_LEN};
use crate::kernel::PublisherDeps;

use super::error::{is_transient, AssetWarning, PublishError};
use super::payload::{AssetMetadata, PreparedPublication, PublicationPayload, UploadedAsset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationState {
    Prepared,
    CategoriesResolved,
    PostUpserted,
    Linked,
    Committed,
    Aborted,
}

impl PublicationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for PublicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepared => write!(f, "prepared"),
            Self::CategoriesResolved => write!(f, "categories_resolved"),
            Self::PostUpserted => write!(f, "post_upserted"),
            Self::Linked => write!(f, "linked"),
            Self::Committed => write!(f, "committed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Canonical identity of a published post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationResult {
    pub post_id: PostId,
    pub slug: String,
    /// Resolved category path, root first.
    pub category_ids: Vec<CategoryId>,
    pub primary_category_id: Option<CategoryId>,
    /// Recorded files, thumbnail first.
    pub file_ids: Vec<FileId>,
    pub tags: Vec<String>,
    pub warnings: Vec<AssetWarning>,
    pub published_url: Option<String>,
}

pub struct Publication<'d> {
    deps: &'d PublisherDeps,
    prepared: PreparedPublication,
    state: PublicationState,
    tx: Option<Transaction<'static, Postgres>>,
    categories: ResolvedCategories,
    post_id: Option<PostId>,
    linked: LinkOutcome,
}

impl<'d> Publication<'d> {
    /// Validate the payload and open the publication's transaction.
    ///
    /// Validation failures return before a connection is acquired.
    pub async fn begin(
        payload: PublicationPayload,
        deps: &'d PublisherDeps,
    ) -> Result<Publication<'d>, PublishError> {
        let prepared = payload.prepare(deps.default_user_id)?;
        let tx = deps.db_pool.begin().await?;

        info!(
            user_id = %prepared.user_id,
            slug = %prepared.slug,
            categories = prepared.categories.len(),
            tags = prepared.tags.len(),
            assets = prepared.assets.len(),
            "Publication prepared"
        );

        Ok(Self {
            deps,
            prepared,
            state: PublicationState::Prepared,
            tx: Some(tx),
            categories: ResolvedCategories::default(),
            post_id: None,
            linked: LinkOutcome::default(),
        })
    }

    pub fn state(&self) -> PublicationState {
        self.state
    }

    pub fn prepared(&self) -> &PreparedPublication {
        &self.prepared
    }

    /// Prepared → CategoriesResolved
    pub async fn resolve_categories(&mut self) -> Result<&ResolvedCategories, PublishError> {
        self.expect(PublicationState::Prepared)?;
        let deps = self.deps;

        let outcome = match self.tx.as_deref_mut() {
            Some(conn) => {
                CategoryResolver::new(&deps.ids)
                    .resolve_in(&self.prepared.categories, self.prepared.user_id, conn)
                    .await
            }
            None => return Err(self.missing_transaction(PublicationState::Prepared)),
        };

        match outcome {
            Ok(resolved) => {
                self.categories = resolved;
                self.transition(PublicationState::CategoriesResolved);
                Ok(&self.categories)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// CategoriesResolved → PostUpserted
    pub async fn upsert_post(&mut self) -> Result<PostId, PublishError> {
        self.expect(PublicationState::CategoriesResolved)?;
        let deps = self.deps;

        let outcome = match self.tx.as_deref_mut() {
            Some(conn) => {
                write_post(conn, &deps.ids, &self.prepared, self.categories.deepest).await
            }
            None => return Err(self.missing_transaction(PublicationState::CategoriesResolved)),
        };

        match outcome {
            Ok(post_id) => {
                self.post_id = Some(post_id);
                self.transition(PublicationState::PostUpserted);
                Ok(post_id)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// PostUpserted → Linked
    ///
    /// Category links are fatal on failure. Tags and files are each written
    /// inside their own savepoint; a permanent failure skips that one record
    /// and is returned as a warning.
    pub async fn link(&mut self) -> Result<&[AssetWarning], PublishError> {
        self.expect(PublicationState::PostUpserted)?;
        let deps = self.deps;

        let Some(post_id) = self.post_id else {
            return Err(self.missing_transaction(PublicationState::PostUpserted));
        };
        let outcome = match self.tx.as_deref_mut() {
            Some(conn) => {
                link_all(conn, &deps.ids, &self.prepared, &self.categories.chain, post_id).await
            }
            None => return Err(self.missing_transaction(PublicationState::PostUpserted)),
        };

        match outcome {
            Ok(linked) => {
                self.linked = linked;
                self.transition(PublicationState::Linked);
                Ok(&self.linked.warnings)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Linked → Committed
    ///
    /// A failed COMMIT leaves nothing behind and is reported as transient.
    pub async fn commit(&mut self) -> Result<PublicationResult, PublishError> {
        self.expect(PublicationState::Linked)?;
        let result = self.preview()?;

        let Some(tx) = self.tx.take() else {
            return Err(self.missing_transaction(PublicationState::Linked));
        };

        match tx.commit().await {
            Ok(()) => {
                self.transition(PublicationState::Committed);
                info!(
                    post_id = %result.post_id,
                    user_id = %self.prepared.user_id,
                    slug = %result.slug,
                    categories = result.category_ids.len(),
                    files = result.file_ids.len(),
                    warnings = result.warnings.len(),
                    "Publication committed"
                );
                Ok(result)
            }
            Err(err) => {
                self.state = PublicationState::Aborted;
                warn!(
                    error = %err,
                    user_id = %self.prepared.user_id,
                    slug = %self.prepared.slug,
                    "Publication commit failed"
                );
                Err(PublishError::TransientStore(err))
            }
        }
    }

    /// Roll back from any non-terminal state. Aborting twice is a no-op.
    pub async fn abort(&mut self) -> Result<(), PublishError> {
        match self.state {
            PublicationState::Committed => Err(PublishError::InvalidState {
                expected: PublicationState::Linked,
                actual: PublicationState::Committed,
            }),
            PublicationState::Aborted => Ok(()),
            from => {
                self.state = PublicationState::Aborted;
                if let Some(tx) = self.tx.take() {
                    tx.rollback().await?;
                }
                info!(
                    from = %from,
                    user_id = %self.prepared.user_id,
                    slug = %self.prepared.slug,
                    "Publication aborted"
                );
                Ok(())
            }
        }
    }

    /// The result `commit` would return, available once linking finished.
    pub fn preview(&self) -> Result<PublicationResult, PublishError> {
        let post_id = match (self.state, self.post_id) {
            (PublicationState::Linked | PublicationState::Committed, Some(post_id)) => post_id,
            (actual, _) => {
                return Err(PublishError::InvalidState {
                    expected: PublicationState::Linked,
                    actual,
                })
            }
        };

        Ok(PublicationResult {
            post_id,
            slug: self.prepared.slug.clone(),
            category_ids: self.categories.chain.clone(),
            primary_category_id: self.categories.deepest,
            file_ids: self.linked.file_ids.clone(),
            tags: self.linked.tags.clone(),
            warnings: self.linked.warnings.clone(),
            published_url: self
                .deps
                .published_url(self.prepared.username.as_deref(), &self.prepared.slug),
        })
    }

    fn expect(&self, expected: PublicationState) -> Result<(), PublishError> {
        if self.state != expected {
            return Err(PublishError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn missing_transaction(&self, expected: PublicationState) -> PublishError {
        PublishError::InvalidState {
            expected,
            actual: PublicationState::Aborted,
        }
    }

    fn transition(&mut self, next: PublicationState) {
        debug!(
            from = %self.state,
            to = %next,
            slug = %self.prepared.slug,
            "Publication state changed"
        );
        self.state = next;
    }

    async fn fail(&mut self, err: PublishError) -> PublishError {
        warn!(
            error = %err,
            kind = err.kind(),
            state = %self.state,
            user_id = %self.prepared.user_id,
            slug = %self.prepared.slug,
            "Publication aborted"
        );
        self.state = PublicationState::Aborted;
        if let Some(tx) = self.tx.take() {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed publication step failed");
            }
        }
        err
    }
}

impl Drop for Publication<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            // The transaction's own drop issues the rollback
            warn!(
                state = %self.state,
                slug = %self.prepared.slug,
                "Publication dropped before commit, rolling back"
            );
        }
    }
}

// =============================================================================
// Step bodies
// =============================================================================

#[derive(Debug, Default)]
struct LinkOutcome {
    tags: Vec<String>,
    file_ids: Vec<FileId>,
    warnings: Vec<AssetWarning>,
}

impl LinkOutcome {
    fn skip(&mut self, warning: AssetWarning) {
        warn!(
            kind = ?warning.kind,
            name = %warning.name,
            reason = %warning.reason,
            "Skipping asset"
        );
        self.warnings.push(warning);
    }
}

async fn write_post(
    conn: &mut PgConnection,
    ids: &SnowflakeGenerator,
    prepared: &PreparedPublication,
    category_id: Option<CategoryId>,
) -> Result<PostId, PublishError> {
    let id: PostId = ids.next()?;
    let post_id = Post::upsert(
        &PostUpsert {
            id,
            user_id: prepared.user_id,
            slug: &prepared.slug,
            title: &prepared.title,
            content: prepared.content.as_deref(),
            description: prepared.description.as_deref(),
            category_id,
            status: prepared.status,
            meta_title: prepared.meta_title.as_deref(),
            meta_description: prepared.meta_description.as_deref(),
            og_image_url: prepared.og_image_url.as_deref(),
            og_image_alt: prepared.og_image_alt.as_deref(),
        },
        conn,
    )
    .await?;

    let reused = post_id != id;
    debug!(
        post_id = %post_id,
        reused,
        slug = %prepared.slug,
        "Upserted post"
    );
    Ok(post_id)
}

async fn link_all(
    conn: &mut PgConnection,
    ids: &SnowflakeGenerator,
    prepared: &PreparedPublication,
    chain: &[CategoryId],
    post_id: PostId,
) -> Result<LinkOutcome, PublishError> {
    for category_id in chain {
        PostCategory::link(post_id, *category_id, &mut *conn).await?;
    }

    let mut outcome = LinkOutcome::default();

    // Tag rows are shared by every owner. Writing them in title order keeps
    // concurrent publications from locking the same rows in opposite orders.
    let mut write_order: Vec<usize> = (0..prepared.tags.len()).collect();
    write_order.sort_by(|a, b| prepared.tags[*a].cmp(&prepared.tags[*b]));

    let mut tag_results: Vec<Option<Result<String, String>>> = vec![None; prepared.tags.len()];
    for index in write_order {
        let title = &prepared.tags[index];
        tag_results[index] = Some(if title.chars().count() > MAX_TAG_TITLE_LEN {
            Err(format!("tag exceeds {} characters", MAX_TAG_TITLE_LEN))
        } else {
            link_tag(&mut *conn, ids, post_id, title).await?
        });
    }

    for (title, result) in prepared.tags.iter().zip(tag_results) {
        match result {
            Some(Ok(stored)) => outcome.tags.push(stored),
            Some(Err(reason)) => outcome.skip(AssetWarning::tag(title.as_str(), reason)),
            None => {}
        }
    }

    let mut thumbnail_id = None;
    for asset in &prepared.assets {
        let metadata = match asset.validate() {
            Ok(metadata) => metadata,
            Err(reason) => {
                outcome.skip(AssetWarning::file(asset.stored_name.as_str(), reason));
                continue;
            }
        };
        match record_file(&mut *conn, ids, prepared.user_id, post_id, asset, &metadata).await? {
            Ok(file_id) => {
                if asset.is_thumbnail {
                    thumbnail_id = Some(file_id);
                }
                outcome.file_ids.push(file_id);
            }
            Err(reason) => outcome.skip(AssetWarning::file(asset.stored_name.as_str(), reason)),
        }
    }

    // Files left flagged by an earlier publication of this post lose the flag
    if thumbnail_id.is_some() {
        File::set_thumbnail(post_id, thumbnail_id, &mut *conn).await?;
    }

    Ok(outcome)
}

async fn link_tag(
    conn: &mut PgConnection,
    ids: &SnowflakeGenerator,
    post_id: PostId,
    title: &str,
) -> Result<Result<String, String>, PublishError> {
    let id: TagId = ids.next()?;
    let mut savepoint = conn.begin().await?;

    let written = match Tag::upsert(title, id, &mut *savepoint).await {
        Ok(stored) => PostTag::link(post_id, &stored, &mut *savepoint)
            .await
            .map(|()| stored),
        Err(err) => Err(err),
    };

    settle(savepoint, written).await
}

async fn record_file(
    conn: &mut PgConnection,
    ids: &SnowflakeGenerator,
    user_id: UserId,
    post_id: PostId,
    asset: &UploadedAsset,
    metadata: &AssetMetadata,
) -> Result<Result<FileId, String>, PublishError> {
    let id: FileId = ids.next()?;
    let mut savepoint = conn.begin().await?;

    let written = File::upsert(
        &FileUpsert {
            id,
            user_id,
            post_id,
            original_filename: &asset.original_filename,
            stored_name: &asset.stored_name,
            stored_uri: &asset.object_store_uri,
            s3_key: asset.object_store_key.as_deref(),
            content_type: Some(metadata.content_type),
            ext: Some(metadata.ext.as_str()),
            file_size: metadata.file_size,
            is_thumbnail: asset.is_thumbnail,
        },
        &mut *savepoint,
    )
    .await;

    settle(savepoint, written).await
}

/// Release or roll back a per-asset savepoint. Permanent store errors become
/// the skip reason; transient ones abort the publication.
async fn settle<T>(
    savepoint: Transaction<'_, Postgres>,
    written: sqlx::Result<T>,
) -> Result<Result<T, String>, PublishError> {
    match written {
        Ok(value) => {
            savepoint.commit().await?;
            Ok(Ok(value))
        }
        Err(err) if is_transient(&err) => Err(err.into()),
        Err(err) => {
            savepoint.rollback().await?;
            Ok(Err(err.to_string()))
        }
    }
}
