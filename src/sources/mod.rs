use async_trait::async_trait;

use crate::checkpoint::Checkpoint;

mod post;
pub mod vk;

pub use post::{Attachment, PhotoSize, Post};

/// Upstream wall feed. Failures are logged by the implementation
/// and never surface as errors.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Posts newer than the checkpoint, in whatever order the feed returns them.
    /// Returns `None` if the feed answered with an error.
    async fn fetch_since(&self, checkpoint: &Checkpoint) -> Option<Vec<Post>>;

    /// Direct playable URL of a video, if the feed exposes one.
    async fn resolve_video_url(
        &self,
        owner_id: i64,
        video_id: i64,
        access_key: Option<&str>,
    ) -> Option<String>;

    /// Display name of a wall owner: community name for negative ids,
    /// person name otherwise. Empty string on fail.
    async fn resolve_attribution_name(&self, owner_id: i64) -> String;
}
