use std::path::Path;

use tracing::info;

use crate::{
    download::Downloader,
    extract::{Document, Extractor},
    repost::{apply_repost_banner, PostPart},
    sources::{FeedSource, Post},
    text::{append_urls, escape_html, rewrite_wall_links},
};

/// Channel-ready rendering of one post-part.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentUnit {
    /// Telegram HTML. May be empty if the post has media only.
    pub text: String,
    /// Photo URLs, in attachment order.
    pub photos: Vec<String>,
    pub documents: Vec<Document>,
    /// Post is a profile photo change: the photo also becomes the channel avatar.
    pub avatar_update: bool,
}

pub struct Assembler<'a> {
    pub feed: &'a dyn FeedSource,
    pub downloader: &'a dyn Downloader,
    pub show_original_post_link: bool,
}

impl Assembler<'_> {
    /// Renders `post` as `part`.
    ///
    /// `repost` is the reposted post when reposts are rendered as their own
    /// message, `attribution` its author's display name.
    pub async fn assemble(
        &self,
        post: &Post,
        part: PostPart,
        repost: Option<&Post>,
        attribution: &str,
        scratch: &Path,
    ) -> ContentUnit {
        let mut text = escape_html(&post.text);

        if let Some(repost) = repost {
            text = apply_repost_banner(text, part, repost, attribution);
        } else if self.show_original_post_link {
            text = format!("<a href=\"{}\"><b>Original post</b></a>\n\n{text}", post.wall_url());
        }

        let text = rewrite_wall_links(&text);

        let extractor = Extractor { feed: self.feed, downloader: self.downloader, scratch };
        let extracted = extractor.extract(&post.attachments, &text).await;

        let avatar_update = extracted.photos.len() == 1 && post.is_profile_photo_update();
        let text = append_urls(&text, &extracted.urls, &extracted.videos);

        info!("{} parsing is complete.", capitalize(part.name()));

        ContentUnit {
            text,
            photos: extracted.photos,
            documents: extracted.documents,
            avatar_update,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
