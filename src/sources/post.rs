use crate::text::WALL_HOST;

/// Wall post, already shaped from the feed's JSON.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Post {
    pub id: i64,
    /// Wall owner. Negative for communities.
    pub source_id: i64,
    /// Author of the post. Equals `source_id` for community posts.
    pub from_id: i64,
    /// Unix time.
    pub date: i64,
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// `copy_history[0]` of the raw payload, if this post is a repost.
    pub repost: Option<Box<Post>>,
    pub is_deleted: bool,
    pub deleted_reason: Option<String>,
    pub marked_as_ads: bool,
    pub copyrighted: bool,
    /// `post_source.data`, e.g. `profile_photo`.
    pub source_data: Option<String>,
}

impl Post {
    /// `https://vk.com/wall{owner}_{id}`
    pub fn wall_url(&self) -> String {
        format!("{}/wall{}_{}", WALL_HOST, self.source_id, self.id)
    }

    /// Same as [`Post::wall_url`] but addressed by author.
    pub fn author_wall_url(&self) -> String {
        format!("{}/wall{}_{}", WALL_HOST, self.from_id, self.id)
    }

    pub fn is_profile_photo_update(&self) -> bool {
        self.source_data.as_deref() == Some("profile_photo")
    }

    /// Feed-unique label for logs.
    pub fn label(&self) -> String {
        format!("{}_{}", self.source_id, self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Attachment {
    Link {
        url: String,
    },
    Video {
        owner_id: i64,
        video_id: i64,
        /// `short_video` for clips.
        kind: Option<String>,
        access_key: Option<String>,
    },
    Photo {
        sizes: Vec<PhotoSize>,
    },
    Document {
        title: String,
        url: String,
        /// Bytes.
        size: u64,
    },
}

/// One resolution of a photo. `kind` is the size tag (`s`, `m`, `x`, `w`, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct PhotoSize {
    pub kind: String,
    pub url: String,
}
