//! End-to-end publication tests against a real Postgres.

mod common;

use crate::common::*;
use publisher_core::common::UserId;
use publisher_core::domains::categories::models::Category;
use publisher_core::domains::files::File;
use publisher_core::domains::posts::{Post, PostCategory, PostTag};
use publisher_core::domains::publishing::{
    dry_run, publish, AssetKind, Publication, PublicationPayload, PublicationState, PublishError,
};
use test_context::test_context;

fn hello_world(ctx: &TestHarness) -> PublicationPayload {
    PublicationPayload {
        tags: vec![tag(ctx.owner, "ml"), tag(ctx.owner, "llm")],
        thumbnail: Some(uploaded(ctx.owner, "hello-world", "cover.png")),
        ..payload(ctx.owner, "hello-world", &["tech", "ai"])
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn republishing_the_same_document_is_stable(ctx: &TestHarness) {
    let first = publish(hello_world(ctx), &ctx.deps).await.unwrap();
    let second = publish(hello_world(ctx), &ctx.deps).await.unwrap();

    assert_eq!(first.post_id, second.post_id);
    assert_eq!(first.category_ids, second.category_ids);
    assert_eq!(first.primary_category_id, second.primary_category_id);
    assert_eq!(first.file_ids, second.file_ids);
    assert_eq!(first.category_ids.len(), 2);
    assert_eq!(first.primary_category_id, Some(first.category_ids[1]));
    assert!(first.warnings.is_empty());

    let rows = owner_rows(ctx.owner, &ctx.db_pool).await.unwrap();
    assert_eq!(
        rows,
        OwnerRows {
            posts: 1,
            categories: 2,
            files: 1,
            post_categories: 2,
            post_tags: 2,
        }
    );

    let tags = vec![tag(ctx.owner, "ml"), tag(ctx.owner, "llm")];
    assert_eq!(count_tags(&tags, &ctx.db_pool).await.unwrap(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn published_post_references_its_deepest_category(ctx: &TestHarness) {
    let result = publish(hello_world(ctx), &ctx.deps).await.unwrap();

    let post = Post::find_by_id(result.post_id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.slug, "hello-world");
    assert_eq!(post.category_id, result.primary_category_id);
    assert_eq!(post.user_id, ctx.owner);

    let linked = PostCategory::find_category_ids_for_post(result.post_id, &ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(linked, result.category_ids);

    let mut tags = PostTag::find_titles_for_post(result.post_id, &ctx.db_pool)
        .await
        .unwrap();
    tags.sort();
    let mut expected = result.tags.clone();
    expected.sort();
    assert_eq!(tags, expected);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn changed_content_updates_the_same_post(ctx: &TestHarness) {
    let first = publish(hello_world(ctx), &ctx.deps).await.unwrap();

    let edited = PublicationPayload {
        title: "Hello again".to_string(),
        content: Some("Edited".to_string()),
        ..hello_world(ctx)
    };
    let second = publish(edited, &ctx.deps).await.unwrap();

    assert_eq!(first.post_id, second.post_id);
    let post = Post::find_by_id(first.post_id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.title, "Hello again");
    assert_eq!(post.content.as_deref(), Some("Edited"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn thumbnail_and_images_are_recorded_with_one_flag(ctx: &TestHarness) {
    let slug = "gallery";
    let input = PublicationPayload {
        thumbnail: Some(uploaded(ctx.owner, slug, "cover.png")),
        images: vec![
            uploaded(ctx.owner, slug, "one.jpg"),
            uploaded(ctx.owner, slug, "two.webp"),
            uploaded(ctx.owner, slug, "three.gif"),
        ],
        ..payload(ctx.owner, slug, &["photos"])
    };

    let result = publish(input.clone(), &ctx.deps).await.unwrap();
    assert_eq!(result.file_ids.len(), 4);

    let files = File::find_for_post(result.post_id, &ctx.db_pool).await.unwrap();
    assert_eq!(files.len(), 4);
    let flagged: Vec<_> = files.iter().filter(|f| f.is_thumbnail).collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].id, result.file_ids[0]);
    assert_eq!(flagged[0].original_filename, "cover.png");

    // Re-publishing with one extra image adds only that file
    let mut extended = input;
    extended.images.push(uploaded(ctx.owner, slug, "four.png"));
    let again = publish(extended, &ctx.deps).await.unwrap();

    assert_eq!(again.file_ids.len(), 5);
    assert_eq!(&again.file_ids[..4], &result.file_ids[..]);
    assert_eq!(File::count_for_user(ctx.owner, &ctx.db_pool).await.unwrap(), 5);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn new_thumbnail_replaces_the_old_flag(ctx: &TestHarness) {
    let slug = "new-cover";
    let first = publish(
        PublicationPayload {
            thumbnail: Some(uploaded(ctx.owner, slug, "old.png")),
            ..payload(ctx.owner, slug, &[])
        },
        &ctx.deps,
    )
    .await
    .unwrap();

    let second = publish(
        PublicationPayload {
            thumbnail: Some(uploaded(ctx.owner, slug, "new.png")),
            ..payload(ctx.owner, slug, &[])
        },
        &ctx.deps,
    )
    .await
    .unwrap();

    let thumbnail = File::find_thumbnail(first.post_id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(thumbnail.id, second.file_ids[0]);
    assert_eq!(thumbnail.original_filename, "new.png");

    let old = File::find_by_id(first.file_ids[0], &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert!(!old.is_thumbnail);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn stored_uri_is_the_cdn_url_not_the_storage_key(ctx: &TestHarness) {
    let asset = uploaded(ctx.owner, "uri-check", "cover.png");
    let result = publish(
        PublicationPayload {
            thumbnail: Some(asset.clone()),
            ..payload(ctx.owner, "uri-check", &[])
        },
        &ctx.deps,
    )
    .await
    .unwrap();

    let file = File::find_by_id(result.file_ids[0], &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.stored_uri, asset.object_store_uri);
    assert!(file.stored_uri.starts_with(CDN));
    assert_eq!(file.s3_key, asset.object_store_key);
    assert_ne!(Some(file.stored_uri.clone()), file.s3_key);
    assert_eq!(file.content_type.as_deref(), Some("image/png"));
    assert_eq!(file.ext.as_deref(), Some("png"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unsupported_files_are_skipped_with_a_warning(ctx: &TestHarness) {
    let slug = "bad-files";
    let mut no_extension = uploaded(ctx.owner, slug, "README");
    no_extension.local_reference = "README".to_string();

    let result = publish(
        PublicationPayload {
            thumbnail: Some(uploaded(ctx.owner, slug, "cover.png")),
            images: vec![
                uploaded(ctx.owner, slug, "notes.txt"),
                no_extension,
                uploaded(ctx.owner, slug, "ok.jpeg"),
            ],
            ..payload(ctx.owner, slug, &["misc"])
        },
        &ctx.deps,
    )
    .await
    .unwrap();

    assert_eq!(result.file_ids.len(), 2);
    assert_eq!(result.warnings.len(), 2);
    assert!(result.warnings.iter().all(|w| w.kind == AssetKind::File));
    assert!(result.warnings[0].reason.contains("unsupported"));
    assert!(result.warnings[1].reason.contains("no extension"));
    assert_eq!(File::count_for_user(ctx.owner, &ctx.db_pool).await.unwrap(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn failing_tag_is_rolled_back_alone(ctx: &TestHarness) {
    let good = tag(ctx.owner, "good");
    let result = publish(
        PublicationPayload {
            // Postgres rejects NUL bytes in text; only this tag's savepoint rolls back
            tags: vec!["bad\0tag".to_string(), good.clone(), "x".repeat(51)],
            ..payload(ctx.owner, "tag-savepoint", &["misc"])
        },
        &ctx.deps,
    )
    .await
    .unwrap();

    assert_eq!(result.tags, vec![good.clone()]);
    assert_eq!(result.warnings.len(), 2);
    assert!(result.warnings.iter().all(|w| w.kind == AssetKind::Tag));

    let stored = PostTag::find_titles_for_post(result.post_id, &ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(stored, vec![good]);

    let rows = owner_rows(ctx.owner, &ctx.db_pool).await.unwrap();
    assert_eq!(rows.posts, 1);
    assert_eq!(rows.post_categories, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn category_conflict_aborts_the_whole_publication(ctx: &TestHarness) {
    publish(payload(ctx.owner, "first", &["tech", "ai"]), &ctx.deps)
        .await
        .unwrap();
    let before = owner_rows(ctx.owner, &ctx.db_pool).await.unwrap();

    let err = publish(
        PublicationPayload {
            tags: vec![tag(ctx.owner, "never")],
            thumbnail: Some(uploaded(ctx.owner, "second", "cover.png")),
            ..payload(ctx.owner, "second", &["science", "ai"])
        },
        &ctx.deps,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PublishError::CategoryConflict { ref title, .. } if title == "ai"));
    assert!(!err.is_retryable());
    assert_eq!(owner_rows(ctx.owner, &ctx.db_pool).await.unwrap(), before);
    assert!(Post::find_by_slug(ctx.owner, "second", &ctx.db_pool)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        count_tags(&[tag(ctx.owner, "never")], &ctx.db_pool).await.unwrap(),
        0
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn invalid_payload_fails_before_any_write(ctx: &TestHarness) {
    let err = publish(
        PublicationPayload {
            title: "".to_string(),
            ..payload(ctx.owner, "no-title", &["tech"])
        },
        &ctx.deps,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PublishError::Validation(_)));
    assert_eq!(owner_rows(ctx.owner, &ctx.db_pool).await.unwrap(), OwnerRows::default());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn commit_failure_leaves_no_rows(ctx: &TestHarness) {
    let application_name = format!("publisher-commit-failure-{}", ctx.owner);
    let deps = ctx.tagged_deps(&application_name).await.unwrap();

    let mut publication = Publication::begin(hello_world(ctx), &deps).await.unwrap();
    publication.resolve_categories().await.unwrap();
    publication.upsert_post().await.unwrap();
    publication.link().await.unwrap();
    assert_eq!(publication.state(), PublicationState::Linked);

    let terminated = ctx.terminate_sessions(&application_name).await.unwrap();
    assert_eq!(terminated, 1);

    let err = publication.commit().await.unwrap_err();
    assert!(matches!(err, PublishError::TransientStore(_)));
    assert!(err.is_retryable());
    assert_eq!(publication.state(), PublicationState::Aborted);

    assert_eq!(owner_rows(ctx.owner, &ctx.db_pool).await.unwrap(), OwnerRows::default());
    let tags = vec![tag(ctx.owner, "ml"), tag(ctx.owner, "llm")];
    assert_eq!(count_tags(&tags, &ctx.db_pool).await.unwrap(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn dropping_a_publication_rolls_it_back(ctx: &TestHarness) {
    {
        let mut publication = Publication::begin(hello_world(ctx), &ctx.deps).await.unwrap();
        publication.resolve_categories().await.unwrap();
        publication.upsert_post().await.unwrap();
        publication.link().await.unwrap();
    }

    assert_eq!(owner_rows(ctx.owner, &ctx.db_pool).await.unwrap(), OwnerRows::default());

    // The connection went back to the pool clean
    let result = publish(hello_world(ctx), &ctx.deps).await.unwrap();
    assert_eq!(result.category_ids.len(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn out_of_order_steps_are_rejected(ctx: &TestHarness) {
    let mut publication = Publication::begin(hello_world(ctx), &ctx.deps).await.unwrap();

    let err = publication.link().await.unwrap_err();
    assert!(matches!(
        err,
        PublishError::InvalidState {
            expected: PublicationState::PostUpserted,
            actual: PublicationState::Prepared,
        }
    ));
    // Rejected calls have no effect on the state
    assert_eq!(publication.state(), PublicationState::Prepared);
    assert!(publication.preview().is_err());

    publication.resolve_categories().await.unwrap();
    assert!(publication.resolve_categories().await.is_err());

    publication.abort().await.unwrap();
    assert_eq!(publication.state(), PublicationState::Aborted);
    assert!(publication.upsert_post().await.is_err());
    publication.abort().await.unwrap();

    assert_eq!(Category::count_by_user(ctx.owner, &ctx.db_pool).await.unwrap(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn dry_run_reports_without_committing(ctx: &TestHarness) {
    let preview = dry_run(hello_world(ctx), &ctx.deps).await.unwrap();
    assert_eq!(preview.category_ids.len(), 2);
    assert_eq!(preview.file_ids.len(), 1);

    assert_eq!(owner_rows(ctx.owner, &ctx.db_pool).await.unwrap(), OwnerRows::default());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn result_carries_published_url_and_og_image(ctx: &TestHarness) {
    let input = hello_world(ctx);
    let username = input.username.clone().unwrap();
    let thumbnail_uri = input.thumbnail.as_ref().unwrap().object_store_uri.clone();

    let result = publish(input, &ctx.deps).await.unwrap();
    assert_eq!(
        result.published_url,
        Some(format!("{}/blog/@{}/hello-world", TEST_BLOG_URL, username))
    );

    let post = Post::find_by_id(result.post_id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.og_image_url, Some(thumbnail_uri));

    let by_author = publish(
        PublicationPayload {
            username: None,
            author: Some("Jane Doe".to_string()),
            ..payload(ctx.owner, "by-author", &[])
        },
        &ctx.deps,
    )
    .await
    .unwrap();
    assert_eq!(
        by_author.published_url,
        Some(format!("{}/blog/@jane-doe/by-author", TEST_BLOG_URL))
    );

    let anonymous = publish(
        PublicationPayload {
            username: None,
            ..payload(ctx.owner, "no-author", &[])
        },
        &ctx.deps,
    )
    .await
    .unwrap();
    assert_eq!(
        anonymous.published_url,
        Some(format!(
            "{}/blog/@{}/no-author",
            TEST_BLOG_URL, TEST_DEFAULT_USERNAME
        ))
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn omitted_seo_fields_are_derived(ctx: &TestHarness) {
    let title = format!("A Rather Long Title {}", "x".repeat(80));
    let result = publish(
        PublicationPayload {
            title: title.clone(),
            description: Some("Short summary".to_string()),
            ..payload(ctx.owner, "long-title", &[])
        },
        &ctx.deps,
    )
    .await
    .unwrap();

    let post = Post::find_by_id(result.post_id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    let meta_title = post.meta_title.unwrap();
    assert_eq!(meta_title.chars().count(), 70);
    assert!(title.starts_with(&meta_title));
    assert_eq!(post.meta_description.as_deref(), Some("Short summary"));
    assert_eq!(post.og_image_alt, Some(format!("{} thumbnail", title)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn content_image_links_point_at_the_cdn(ctx: &TestHarness) {
    let image = uploaded(ctx.owner, "linked-images", "diagram.png");
    let result = publish(
        PublicationPayload {
            content: Some("See ![diagram](./diagram.png) below".to_string()),
            images: vec![image.clone()],
            ..payload(ctx.owner, "linked-images", &[])
        },
        &ctx.deps,
    )
    .await
    .unwrap();

    let post = Post::find_by_id(result.post_id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        post.content,
        Some(format!("See ![diagram]({}) below", image.object_store_uri))
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn concurrent_publications_of_one_slug_converge(ctx: &TestHarness) {
    let tasks = (0..4).map(|_| {
        let deps = ctx.deps.clone();
        let input = hello_world(ctx);
        tokio::spawn(async move { publish(input, &deps).await })
    });

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(results.windows(2).all(|w| w[0].post_id == w[1].post_id));
    assert_eq!(Post::count_by_user(ctx.owner, &ctx.db_pool).await.unwrap(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn reversed_tag_lists_publish_in_parallel(ctx: &TestHarness) {
    let other_owner: UserId = ctx.ids().next().unwrap();
    let titles: Vec<String> = ["rust", "ai", "db", "web"]
        .iter()
        .map(|name| tag(ctx.owner, name))
        .collect();
    let mut reversed = titles.clone();
    reversed.reverse();

    let tasks = (0..8).map(|round| {
        let deps = ctx.deps.clone();
        let (owner, tags) = if round % 2 == 0 {
            (ctx.owner, titles.clone())
        } else {
            (other_owner, reversed.clone())
        };
        let input = PublicationPayload {
            tags,
            ..payload(owner, &format!("shared-tags-{}", round), &[])
        };
        tokio::spawn(async move { publish(input, &deps).await })
    });

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    for (round, result) in results.iter().enumerate() {
        let result = result.as_ref().unwrap_or_else(|err| panic!("round {}: {}", round, err));
        assert!(result.warnings.is_empty());
        let expected = if round % 2 == 0 { &titles } else { &reversed };
        assert_eq!(&result.tags, expected);
    }
    assert_eq!(count_tags(&titles, &ctx.db_pool).await.unwrap(), 4);
}
