//! Markdown rewriting applied before a post is stored.

use regex::{Captures, Regex};

use super::payload::UploadedAsset;

/// Point every markdown image that references an asset's original file name
/// at the asset's public URI.
///
/// Matches `![alt](anything/original_filename)` and `![alt](original_filename)`.
/// The file name must be a whole path segment, so `a.png` never rewrites
/// `./data.png`. The alt text is kept. Assets with an empty file name or URI are ignored.
pub fn rewrite_asset_links<'a>(
    content: &str,
    assets: impl IntoIterator<Item = &'a UploadedAsset>,
) -> String {
    let mut content = content.to_string();

    for asset in assets {
        if asset.original_filename.is_empty() || asset.object_store_uri.is_empty() {
            continue;
        }

        let pattern = format!(
            r"!\[([^\]]*)\]\((?:[^)]*/)?{}\)",
            regex::escape(&asset.original_filename)
        );
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };

        let uri = asset.object_store_uri.as_str();
        content = re
            .replace_all(&content, |caps: &Captures| format!("![{}]({})", &caps[1], uri))
            .into_owned();
    }

    content
}
