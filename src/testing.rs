//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    checkpoint::Checkpoint,
    download::{DownloadError, Downloader},
    sources::{FeedSource, Post},
    telegram::{Channel, InputFile, InputMedia, TelegramError},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Text(String),
    Photo(InputFile, Option<String>),
    Document(InputFile, Option<String>),
    MediaGroup(Vec<InputMedia>),
    ChatPhoto(InputFile),
}

/// Records every call. Pops one scripted failure per call until none are left.
#[derive(Default)]
pub struct FakeChannel {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<VecDeque<TelegramError>>,
    deny_chat_photo: bool,
}

impl FakeChannel {
    pub fn failing(errors: impl IntoIterator<Item = TelegramError>) -> Self {
        Self { failures: Mutex::new(errors.into_iter().collect()), ..Self::default() }
    }

    /// Every `setChatPhoto` fails as if the bot lacked the right to change chat info.
    pub fn denying_chat_photo() -> Self {
        Self { deny_chat_photo: true, ..Self::default() }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<(), TelegramError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Channel for FakeChannel {
    async fn send_text(&self, text: &str) -> Result<(), TelegramError> {
        self.record(Call::Text(text.into()))
    }
    async fn send_photo(&self, photo: InputFile, caption: Option<&str>) -> Result<(), TelegramError> {
        self.record(Call::Photo(photo, caption.map(Into::into)))
    }
    async fn send_document(&self, document: InputFile, caption: Option<&str>) -> Result<(), TelegramError> {
        self.record(Call::Document(document, caption.map(Into::into)))
    }
    async fn send_media_group(&self, media: Vec<InputMedia>) -> Result<(), TelegramError> {
        self.record(Call::MediaGroup(media))
    }
    async fn set_chat_photo(&self, photo: InputFile) -> Result<(), TelegramError> {
        self.record(Call::ChatPhoto(photo))?;
        if self.deny_chat_photo {
            return Err(TelegramError::BadRequest("not enough rights to change chat photo".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFeed {
    pub posts: Option<Vec<Post>>,
    pub video: Option<String>,
    pub name: String,
    pub attribution_lookups: Mutex<Vec<i64>>,
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn fetch_since(&self, _: &Checkpoint) -> Option<Vec<Post>> {
        self.posts.clone()
    }
    async fn resolve_video_url(&self, _: i64, _: i64, _: Option<&str>) -> Option<String> {
        self.video.clone()
    }
    async fn resolve_attribution_name(&self, owner_id: i64) -> String {
        self.attribution_lookups.lock().unwrap().push(owner_id);
        self.name.clone()
    }
}

/// Serves `url` as bytes, fails for URLs containing `missing`.
pub struct FakeDownloader;

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        if url.contains("missing") {
            return Err(DownloadError::Status { url: url.into(), status: 404 });
        }
        Ok(url.as_bytes().to_vec())
    }
}
