//! Attachment classification: links, videos, photos and documents.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    download::Downloader,
    slug::slug_filename,
    sources::{Attachment, FeedSource, PhotoSize},
    text::WALL_HOST,
};

/// Documents above this are not downloaded at all.
pub const MAX_DOWNLOAD_SIZE: u64 = 50_000_000;

/// Size tags from largest to smallest.
const PHOTO_SIZE_PRIORITY: &[&str] = &["w", "z", "y", "x", "r", "q", "p", "o", "m", "s"];

lazy_static! {
    /// Signed tokens like `&c_uniq_tag=...` that expire with the URL.
    static ref SIGNED_PARAM: Regex = Regex::new(r"&([a-zA-Z]+(_[a-zA-Z]+)+)=([a-zA-Z0-9_-]+)").unwrap();
}

/// Document saved to the scratch area.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub title: String,
    pub local_path: PathBuf,
    pub source_url: String,
}

#[derive(Debug, Default, PartialEq)]
pub struct Extracted {
    pub urls: Vec<String>,
    pub videos: Vec<String>,
    pub photos: Vec<String>,
    pub documents: Vec<Document>,
}

pub struct Extractor<'a> {
    pub feed: &'a dyn FeedSource,
    pub downloader: &'a dyn Downloader,
    /// Where this post-part's documents go.
    pub scratch: &'a Path,
}

impl Extractor<'_> {
    /// `text` is the already normalized text, used to drop links it already shows.
    pub async fn extract(&self, attachments: &[Attachment], text: &str) -> Extracted {
        let mut out = Extracted::default();

        for attachment in attachments {
            match attachment {
                Attachment::Link { url } => {
                    if !text.contains(url.as_str()) {
                        out.urls.push(url.clone());
                    }
                }
                Attachment::Video { owner_id, video_id, kind, access_key } => {
                    let url = self
                        .feed
                        .resolve_video_url(*owner_id, *video_id, access_key.as_deref())
                        .await
                        .unwrap_or_else(|| fallback_video_url(*owner_id, *video_id, kind.as_deref()));
                    out.videos.push(url);
                }
                Attachment::Photo { sizes } => {
                    if let Some(url) = best_photo(sizes) {
                        out.photos.push(url);
                    }
                }
                Attachment::Document { title, url, size } => {
                    if let Some(doc) = self.download_document(title, url, *size).await {
                        out.documents.push(doc);
                    }
                }
            }
        }

        out
    }

    async fn download_document(&self, title: &str, url: &str, size: u64) -> Option<Document> {
        if size > MAX_DOWNLOAD_SIZE {
            info!(size, "The document was skipped due to its size exceeding the 50MB limit");
            return None;
        }

        let local_path = self.scratch.join(slug_filename(title));
        if local_path.exists() {
            warn!(path = %local_path.display(), "Document name collides within one post, skipped");
            return None;
        }

        let bytes = match self.downloader.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(title, "Failed to download document: {e}");
                return None;
            }
        };

        if let Err(e) = tokio::fs::write(&local_path, bytes).await {
            warn!(path = %local_path.display(), "Failed to store document: {e}");
            return None;
        }

        Some(Document { title: title.into(), local_path, source_url: url.into() })
    }
}

/// Viewer URL for videos the feed would not resolve. Clips have their own path.
pub fn fallback_video_url(owner_id: i64, video_id: i64, kind: Option<&str>) -> String {
    let path = if kind == Some("short_video") { "clip" } else { "video" };
    format!("{WALL_HOST}/{path}{owner_id}_{video_id}")
}

/// Largest available size with signed parameters stripped, or `None`
/// if no known size tag is present.
pub fn best_photo(sizes: &[PhotoSize]) -> Option<String> {
    PHOTO_SIZE_PRIORITY
        .iter()
        .find_map(|tag| sizes.iter().find(|s| s.kind == *tag))
        .map(|size| SIGNED_PARAM.replace_all(&size.url, "").into_owned())
}
