use crate::{sources::Post, text::escape_html};

/// Which layer of a post is being rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostPart {
    Post,
    Repost,
}

impl PostPart {
    pub fn name(self) -> &'static str {
        match self {
            PostPart::Post => "post",
            PostPart::Repost => "repost",
        }
    }
}

/// `REPOST ↓ name`, linked to the reposted post.
pub fn repost_banner(repost: &Post, attribution: &str) -> String {
    format!(
        "<a href=\"{}\"><b>REPOST ↓ {}</b></a>",
        repost.author_wall_url(),
        escape_html(attribution)
    )
}

/// Adds the repost banner to already normalized text.
///
/// The outer post gets it appended (only when it has text of its own),
/// the repost itself always starts with it.
pub fn apply_repost_banner(text: String, part: PostPart, repost: &Post, attribution: &str) -> String {
    let banner = repost_banner(repost, attribution);
    match part {
        PostPart::Post if text.is_empty() => text,
        PostPart::Post => format!("{text}\n\n{banner}"),
        PostPart::Repost => format!("{banner}\n\n{text}"),
    }
}
