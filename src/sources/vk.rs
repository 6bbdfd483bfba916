use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, error, info, warn};

use super::{Attachment, FeedSource, PhotoSize, Post};
use crate::{checkpoint::Checkpoint, config::VkConfig};

const API_URL: &str = "https://api.vk.com/method";

pub struct VkClient {
    client: reqwest::Client,
    config: VkConfig,
}

#[derive(Deserialize)]
struct VkReply<T> {
    response: Option<T>,
    error: Option<VkApiError>,
}
#[derive(Deserialize)]
struct VkApiError {
    error_msg: String,
}
#[derive(Deserialize)]
struct VkItems<T> {
    items: Vec<T>,
}

/// Newsfeed items carry `post_id`/`source_id`, wall items and reposts carry `id`/`owner_id`.
#[derive(Deserialize)]
struct VkRawPost {
    id: Option<i64>,
    post_id: Option<i64>,
    source_id: Option<i64>,
    owner_id: Option<i64>,
    from_id: Option<i64>,
    #[serde(default)]
    date: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    attachments: Vec<VkRawAttachment>,
    #[serde(default)]
    copy_history: Vec<VkRawPost>,
    is_deleted: Option<VkFlag>,
    deleted_reason: Option<String>,
    marked_as_ads: Option<VkFlag>,
    copyright: Option<serde_json::Value>,
    post_source: Option<VkRawPostSource>,
}
/// VK mixes `true` and `1` for boolean fields.
#[derive(Deserialize)]
#[serde(untagged)]
enum VkFlag {
    Bool(bool),
    Int(i64),
}
#[derive(Deserialize)]
struct VkRawPostSource {
    data: Option<String>,
}
#[derive(Deserialize)]
struct VkRawAttachment {
    r#type: String,
    link: Option<VkRawLink>,
    video: Option<VkRawVideo>,
    photo: Option<VkRawPhoto>,
    doc: Option<VkRawDoc>,
}
#[derive(Deserialize)]
struct VkRawLink {
    url: String,
}
#[derive(Deserialize)]
struct VkRawVideo {
    owner_id: i64,
    id: i64,
    r#type: Option<String>,
    access_key: Option<String>,
}
#[derive(Deserialize)]
struct VkRawPhoto {
    sizes: Vec<VkRawPhotoSize>,
}
#[derive(Deserialize)]
struct VkRawPhotoSize {
    r#type: String,
    url: String,
}
#[derive(Deserialize)]
struct VkRawDoc {
    title: String,
    url: String,
    #[serde(default)]
    size: u64,
}
#[derive(Deserialize)]
struct VkRawVideoItem {
    files: Option<VkRawVideoFiles>,
}
#[derive(Deserialize)]
struct VkRawVideoFiles {
    external: Option<String>,
}
/// `groups.getById` answers with a bare list before API 5.194 and wraps it after.
#[derive(Deserialize)]
#[serde(untagged)]
enum VkGroups {
    List(Vec<VkGroup>),
    Wrapped { groups: Vec<VkGroup> },
}
#[derive(Deserialize)]
struct VkGroup {
    name: String,
}
#[derive(Deserialize)]
struct VkUser {
    first_name: String,
    last_name: String,
}

impl VkFlag {
    fn is_set(&self) -> bool {
        match self {
            VkFlag::Bool(b) => *b,
            VkFlag::Int(i) => *i != 0,
        }
    }
}

impl VkRawPost {
    fn into_post(self) -> Option<Post> {
        let id = self.id.or(self.post_id)?;
        let source_id = self.source_id.or(self.owner_id).or(self.from_id)?;

        Some(Post {
            id,
            source_id,
            from_id: self.from_id.unwrap_or(source_id),
            date: self.date,
            text: self.text,
            attachments: self.attachments.into_iter().filter_map(VkRawAttachment::into_attachment).collect(),
            repost: self.copy_history.into_iter().next().and_then(VkRawPost::into_post).map(Box::new),
            is_deleted: self.is_deleted.map_or(false, |f| f.is_set()),
            deleted_reason: self.deleted_reason,
            marked_as_ads: self.marked_as_ads.map_or(false, |f| f.is_set()),
            copyrighted: self.copyright.is_some(),
            source_data: self.post_source.and_then(|s| s.data),
        })
    }
}

impl VkRawAttachment {
    fn into_attachment(self) -> Option<Attachment> {
        let attachment = match self.r#type.as_str() {
            "link" => self.link.map(|l| Attachment::Link { url: l.url }),
            "video" => self.video.map(|v| Attachment::Video {
                owner_id: v.owner_id,
                video_id: v.id,
                kind: v.r#type,
                access_key: v.access_key.filter(|k| !k.is_empty()),
            }),
            "photo" => self.photo.map(|p| Attachment::Photo {
                sizes: p.sizes.into_iter().map(|s| PhotoSize { kind: s.r#type, url: s.url }).collect(),
            }),
            "doc" => self.doc.map(|d| Attachment::Document { title: d.title, url: d.url, size: d.size }),
            _ => None,
        };

        if attachment.is_none() {
            debug!(kind = %self.r#type, "Unsupported attachment dropped");
        }
        attachment
    }
}

/// Shapes a `newsfeed.get` body into posts. Malformed items and items
/// without identity are dropped one by one.
fn parse_feed(body: &str) -> Option<Vec<Post>> {
    let items: VkItems<serde_json::Value> = unwrap_reply(body)?;
    let total = items.items.len();

    let posts: Vec<Post> = items
        .items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<VkRawPost>(item) {
            Ok(raw) => raw.into_post(),
            Err(e) => {
                warn!("Malformed feed item dropped: {e}");
                None
            }
        })
        .collect();

    if posts.len() != total {
        warn!(dropped = total - posts.len(), "Some feed items were dropped");
    }
    Some(posts)
}

fn unwrap_reply<T: DeserializeOwned>(body: &str) -> Option<T> {
    match serde_json::from_str::<VkReply<T>>(body) {
        Ok(VkReply { response: Some(response), .. }) => Some(response),
        Ok(VkReply { error: Some(e), .. }) => {
            error!("Error was detected when requesting data from VK: {}", e.error_msg);
            None
        }
        Ok(_) => {
            error!("VK replied with neither response nor error");
            None
        }
        Err(e) => {
            error!("Failed to parse VK reply: {e}");
            None
        }
    }
}

impl VkClient {
    pub fn new(client: reqwest::Client, config: VkConfig) -> Self {
        Self { client, config }
    }

    async fn call(&self, method: &str, params: &[(&str, String)]) -> Option<String> {
        let res = self
            .client
            .get(format!("{API_URL}/{method}"))
            .query(&[("access_token", self.config.token.as_str()), ("v", self.config.version.as_str())])
            .query(params)
            .send()
            .await;

        match res {
            Ok(res) => match res.text().await {
                Ok(body) => Some(body),
                Err(e) => {
                    error!(method, "Failed to read VK reply: {e}");
                    None
                }
            },
            Err(e) => {
                error!(method, "Failed to reach VK: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl FeedSource for VkClient {
    async fn fetch_since(&self, checkpoint: &Checkpoint) -> Option<Vec<Post>> {
        info!("Trying to get posts from VK.");

        let mut params = vec![
            ("filters", self.config.filter.clone()),
            ("start_time", checkpoint.last_seen_time.to_string()),
        ];
        if let Some(source_ids) = &self.config.source_ids {
            params.push(("source_ids", source_ids.clone()));
        }
        if let Some(count) = self.config.count {
            params.push(("count", count.to_string()));
        }
        if let Some(return_banned) = self.config.return_banned {
            params.push(("return_banned", return_banned.to_string()));
        }

        let body = self.call("newsfeed.get", &params).await?;
        parse_feed(&body)
    }

    async fn resolve_video_url(&self, owner_id: i64, video_id: i64, access_key: Option<&str>) -> Option<String> {
        let videos = match access_key {
            Some(key) => format!("{owner_id}_{video_id}_{key}"),
            None => format!("{owner_id}_{video_id}"),
        };

        let body = self.call("video.get", &[("videos", videos)]).await?;
        let items: VkItems<VkRawVideoItem> = unwrap_reply(&body)?;

        items
            .items
            .into_iter()
            .next()
            .and_then(|v| v.files)
            .and_then(|f| f.external)
            .filter(|url| !url.is_empty())
    }

    async fn resolve_attribution_name(&self, owner_id: i64) -> String {
        let name = if owner_id < 0 {
            let body = self.call("groups.getById", &[("group_id", owner_id.abs().to_string())]).await;
            body.and_then(|b| unwrap_reply::<VkGroups>(&b))
                .and_then(|groups| match groups {
                    VkGroups::List(list) | VkGroups::Wrapped { groups: list } => list.into_iter().next(),
                })
                .map(|g| g.name)
        } else {
            let body = self.call("users.get", &[("user_ids", owner_id.to_string())]).await;
            body.and_then(|b| unwrap_reply::<Vec<VkUser>>(&b))
                .and_then(|users| users.into_iter().next())
                .map(|u| format!("{} {}", u.first_name, u.last_name))
        };

        name.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{"response":{"items":[
        {"type":"post","source_id":-1,"post_id":11,"date":1700000100,"text":"hello",
         "marked_as_ads":1,"copyright":{"link":"x"},"post_source":{"type":"api","data":"profile_photo"},
         "attachments":[
            {"type":"photo","photo":{"sizes":[{"type":"s","url":"https://s"},{"type":"w","url":"https://w"}]}},
            {"type":"poll","poll":{"id":1}},
            {"type":"doc","doc":{"title":"a.pdf","url":"https://doc","size":10}}
         ],
         "copy_history":[{"id":5,"owner_id":-2,"from_id":-2,"date":1690000000,"text":"orig",
            "attachments":[{"type":"video","video":{"owner_id":-2,"id":7,"type":"short_video","access_key":""}}]}]},
        {"type":"post","source_id":-1,"date":1700000200,"text":"no id"}
    ]}}"#;

    #[test]
    fn shapes_feed_items_into_posts() {
        let posts = parse_feed(FEED).unwrap();
        assert_eq!(posts.len(), 1);

        let post = &posts[0];
        assert_eq!((post.id, post.source_id, post.from_id, post.date), (11, -1, -1, 1_700_000_100));
        assert!(post.marked_as_ads && post.copyrighted && post.is_profile_photo_update());
        assert_eq!(post.attachments.len(), 2);
        assert!(matches!(post.attachments[1], Attachment::Document { size: 10, .. }));

        let repost = post.repost.as_ref().unwrap();
        assert_eq!(repost.author_wall_url(), "https://vk.com/wall-2_5");
        assert_eq!(
            repost.attachments[0],
            Attachment::Video { owner_id: -2, video_id: 7, kind: Some("short_video".into()), access_key: None }
        );
    }

    #[test]
    fn malformed_item_does_not_sink_the_batch() {
        let body = r#"{"response":{"items":[
            {"type":"post","source_id":-1,"post_id":11,"date":1700000100,"text":"good"},
            {"type":"post","source_id":-1,"post_id":12,"date":1700000200,"text":"bad",
             "attachments":[{"type":"doc","doc":{"title":"x.pdf","size":10}}]}
        ]}}"#;

        let posts = parse_feed(body).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, "good");
    }

    #[test]
    fn error_payload_means_no_posts() {
        let body = r#"{"error":{"error_code":5,"error_msg":"User authorization failed"}}"#;
        assert!(parse_feed(body).is_none());
    }

    #[test]
    fn groups_reply_in_both_shapes() {
        let old: VkGroups = unwrap_reply(r#"{"response":[{"name":"Old"}]}"#).unwrap();
        let new: VkGroups = unwrap_reply(r#"{"response":{"groups":[{"name":"New"}]}}"#).unwrap();
        assert!(matches!(old, VkGroups::List(l) if l[0].name == "Old"));
        assert!(matches!(new, VkGroups::Wrapped { groups } if groups[0].name == "New"));
    }
}
