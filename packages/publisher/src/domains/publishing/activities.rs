//! Publication entry points
//!
//! Each call runs one publication end to end on its own transaction.

use tracing::info;

use crate::kernel::PublisherDeps;

use super::error::PublishError;
use super::payload::PublicationPayload;
use super::transaction::{Publication, PublicationResult};

/// Publish a payload: resolve categories, upsert the post, link categories,
/// tags and files, then commit. Any fatal step rolls everything back.
pub async fn publish(
    payload: PublicationPayload,
    deps: &PublisherDeps,
) -> Result<PublicationResult, PublishError> {
    let mut publication = Publication::begin(payload, deps).await?;
    publication.resolve_categories().await?;
    publication.upsert_post().await?;
    publication.link().await?;
    publication.commit().await
}

/// Run every step of a publication, then roll back instead of committing.
/// Returns what `publish` would have returned.
pub async fn dry_run(
    payload: PublicationPayload,
    deps: &PublisherDeps,
) -> Result<PublicationResult, PublishError> {
    let mut publication = Publication::begin(payload, deps).await?;
    publication.resolve_categories().await?;
    publication.upsert_post().await?;
    publication.link().await?;

    let result = publication.preview()?;
    publication.abort().await?;

    info!(slug = %result.slug, "Dry run finished, nothing committed");
    Ok(result)
}
