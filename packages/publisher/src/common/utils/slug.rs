//! Pure slug helpers
//!
//! No I/O here: slugs are derived from titles before anything touches the
//! database, so the same title always maps to the same natural key.

/// Longest slug the `posts.slug` column accepts.
pub const MAX_SLUG_LEN: usize = 255;

/// Build a URL-safe slug from a title.
///
/// Lowercases ASCII letters, keeps other alphanumeric characters as-is,
/// collapses every run of anything else into a single `-` and trims dashes
/// from both ends. Falls back to `untitled` when nothing survives.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            // Lowercasing can emit combining marks ('İ' -> "i\u{307}")
            slug.extend(c.to_lowercase().filter(|l| l.is_alphanumeric()));
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return "untitled".to_string();
    }

    truncate_slug(slug)
}

/// Whether a caller-supplied slug is usable as a natural key as-is.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c == '-' || c == '_' || (c.is_alphanumeric() && !c.is_uppercase()))
}

fn truncate_slug(mut slug: String) -> String {
    if slug.len() <= MAX_SLUG_LEN {
        return slug;
    }
    let mut cut = MAX_SLUG_LEN;
    while !slug.is_char_boundary(cut) {
        cut -= 1;
    }
    slug.truncate(cut);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
