//! Sends content units to the channel.
//!
//! One attempt dispatches the whole unit. Flood control and transient
//! failures restart the unit after a wait; after [`MAX_RETRIES`] retries the
//! unit is abandoned and only logged.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::{
    content::ContentUnit,
    download::Downloader,
    extract::Document,
    telegram::{Channel, InputFile, InputMedia, MediaKind, TelegramError},
    text::{decorate_fragments, split_text, text_len},
};

pub const MAX_RETRIES: u32 = 3;
/// Single message cap.
pub const TEXT_LIMIT: usize = 4096;
/// Cap for captions on photos, documents and media groups.
pub const CAPTION_LIMIT: usize = 1024;
/// Leaves room for the ` (...)` decorations.
pub const FRAGMENT_SIZE: usize = 4084;
/// Bot API upload cap for documents.
pub const MAX_DOC_SIZE: u64 = 20 * 1024 * 1024;
pub const FRAGMENT_PACING: Duration = Duration::from_millis(500);

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Delivered { attempts: u32 },
    Abandoned { attempts: u32 },
}

pub struct Delivery<'a> {
    pub channel: &'a dyn Channel,
    pub downloader: &'a dyn Downloader,
}

impl Delivery<'_> {
    pub async fn deliver(&self, unit: &ContentUnit) -> Outcome {
        let mut attempt = 0;

        loop {
            let err = match self.dispatch(unit, attempt).await {
                Ok(()) => return Outcome::Delivered { attempts: attempt + 1 },
                Err(err) => err,
            };

            let delay = match err.retry_delay() {
                Some(delay) if attempt < MAX_RETRIES => delay,
                Some(_) => {
                    error!(attempts = attempt + 1, "Post was not sent to Telegram. Too many tries. {err}");
                    return Outcome::Abandoned { attempts: attempt + 1 };
                }
                None => {
                    error!(attempts = attempt + 1, "Post was not sent to Telegram: {err}");
                    return Outcome::Abandoned { attempts: attempt + 1 };
                }
            };

            warn!(try_no = attempt + 1, "{err}. Sleep {} seconds.", delay.as_secs());
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn dispatch(&self, unit: &ContentUnit, attempt: u32) -> Result<(), TelegramError> {
        match unit.photos.as_slice() {
            [] if unit.documents.is_empty() => self.send_text_post(&unit.text).await?,
            [] => {}
            [photo] => self.send_photo_post(&unit.text, photo, unit.avatar_update, attempt).await?,
            photos => self.send_photos_post(&unit.text, photos, attempt).await?,
        }

        if !unit.documents.is_empty() {
            let caption = if unit.photos.is_empty() { unit.text.clone() } else { String::new() };
            self.send_docs_post(&unit.documents, caption).await?;
        }

        Ok(())
    }

    /// First attempt lets telegram fetch the URL, retries upload the bytes
    /// in case the upstream URL went stale.
    async fn photo_file(&self, url: &str, attempt: u32) -> Result<InputFile, TelegramError> {
        if attempt == 0 {
            return Ok(InputFile::Url(url.into()));
        }

        let data = self.downloader.fetch(url).await?;
        Ok(InputFile::Memory { name: "photo.jpg".into(), data })
    }

    async fn send_text_post(&self, text: &str) -> Result<(), TelegramError> {
        if text.is_empty() {
            return Ok(());
        }

        if text_len(text) <= TEXT_LIMIT {
            self.channel.send_text(text).await?;
        } else {
            let parts = decorate_fragments(split_text(text, FRAGMENT_SIZE));
            let last = parts.len() - 1;
            for (i, part) in parts.iter().enumerate() {
                self.channel.send_text(part).await?;
                if i != last {
                    tokio::time::sleep(FRAGMENT_PACING).await;
                }
            }
        }

        info!("Text post sent to Telegram.");
        Ok(())
    }

    async fn send_photo_post(
        &self,
        text: &str,
        photo: &str,
        avatar_update: bool,
        attempt: u32,
    ) -> Result<(), TelegramError> {
        if avatar_update {
            self.update_avatar(photo).await;
        }

        if text_len(text) <= CAPTION_LIMIT {
            let caption = (!text.is_empty()).then_some(text);
            self.channel.send_photo(self.photo_file(photo, attempt).await?, caption).await?;
            info!("Text post (<=1024) with photo sent to Telegram.");
            return Ok(());
        }

        let anchored = format!("<a href=\"{photo}\"> </a>{text}");
        if text_len(&anchored) <= TEXT_LIMIT {
            self.channel.send_text(&anchored).await?;
        } else {
            self.send_text_post(text).await?;
            self.channel.send_photo(self.photo_file(photo, attempt).await?, None).await?;
        }
        info!("Text post (>1024) with photo sent to Telegram.");
        Ok(())
    }

    /// Failures are logged only; the photo message goes out regardless.
    async fn update_avatar(&self, photo: &str) {
        let data = match self.downloader.fetch(photo).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to fetch the new channel avatar: {e}");
                return;
            }
        };

        match self.channel.set_chat_photo(InputFile::Memory { name: "avatar.jpg".into(), data }).await {
            Ok(()) => info!("Channel avatar updated."),
            Err(e) => warn!("Failed to update channel avatar: {e}"),
        }
    }

    async fn send_photos_post(&self, text: &str, photos: &[String], attempt: u32) -> Result<(), TelegramError> {
        let mut media = Vec::with_capacity(photos.len());
        for photo in photos {
            media.push(InputMedia {
                kind: MediaKind::Photo,
                file: self.photo_file(photo, attempt).await?,
                caption: None,
            });
        }

        let len = text_len(text);
        if len > CAPTION_LIMIT {
            self.send_text_post(text).await?;
        } else if len > 0 {
            media[0].caption = Some(text.into());
        }

        self.channel.send_media_group(media).await?;
        info!("Text post with photos sent to Telegram.");
        Ok(())
    }

    /// Documents over the upload cap are replaced by their source URL in the caption.
    async fn send_docs_post(&self, documents: &[Document], mut caption: String) -> Result<(), TelegramError> {
        let mut media = Vec::with_capacity(documents.len());

        for doc in documents {
            match tokio::fs::metadata(&doc.local_path).await {
                Ok(meta) if meta.len() <= MAX_DOC_SIZE => media.push(InputMedia {
                    kind: MediaKind::Document,
                    file: InputFile::Path(doc.local_path.clone()),
                    caption: None,
                }),
                Ok(meta) => {
                    info!(size = meta.len(), title = %doc.title, "Document too big to upload, linking it instead");
                    push_line(&mut caption, &doc.source_url);
                }
                Err(e) => {
                    warn!(title = %doc.title, "Downloaded document is unreadable, linking it instead: {e}");
                    push_line(&mut caption, &doc.source_url);
                }
            }
        }

        if !caption.is_empty() {
            if !media.is_empty() && text_len(&caption) <= CAPTION_LIMIT {
                media[0].caption = Some(caption);
            } else {
                self.send_text_post(&caption).await?;
            }
        }

        match media.len() {
            0 => {}
            1 => {
                let doc = media.remove(0);
                self.channel.send_document(doc.file, doc.caption.as_deref()).await?;
            }
            _ => self.channel.send_media_group(media).await?,
        }

        info!("Documents sent to Telegram.");
        Ok(())
    }
}

fn push_line(text: &mut String, line: &str) {
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeChannel, FakeDownloader};
    use tokio::time::Instant;

    fn text_unit(text: &str) -> ContentUnit {
        ContentUnit { text: text.into(), ..ContentUnit::default() }
    }

    fn photos(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://p/{i}.jpg")).collect()
    }

    /// Paused clock still rounds timers to the millisecond.
    fn assert_elapsed(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "slept {elapsed:?}, expected {expected:?}"
        );
    }

    async fn deliver(channel: &FakeChannel, unit: &ContentUnit) -> Outcome {
        Delivery { channel, downloader: &FakeDownloader }.deliver(unit).await
    }

    #[tokio::test]
    async fn short_text_is_one_message() {
        let channel = FakeChannel::default();
        let outcome = deliver(&channel, &text_unit(&"a".repeat(50))).await;

        assert_eq!(outcome, Outcome::Delivered { attempts: 1 });
        assert_eq!(channel.calls(), vec![Call::Text("a".repeat(50))]);
    }

    #[tokio::test]
    async fn empty_unit_sends_nothing() {
        let channel = FakeChannel::default();
        assert_eq!(deliver(&channel, &ContentUnit::default()).await, Outcome::Delivered { attempts: 1 });
        assert!(channel.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn long_text_is_split_and_decorated() {
        let channel = FakeChannel::default();
        let text = "b".repeat(9000);
        let started = Instant::now();

        deliver(&channel, &text_unit(&text)).await;

        let calls = channel.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Call::Text(format!("{} (...)", "b".repeat(4084))));
        assert_eq!(calls[1], Call::Text(format!("(...) {} (...)", "b".repeat(4084))));
        assert_eq!(calls[2], Call::Text(format!("(...) {}", "b".repeat(832))));
        assert_elapsed(started, FRAGMENT_PACING * 2);
    }

    #[tokio::test]
    async fn single_photo_with_short_caption() {
        let channel = FakeChannel::default();
        let unit = ContentUnit { text: "hi".into(), photos: photos(1), ..ContentUnit::default() };

        deliver(&channel, &unit).await;

        assert_eq!(
            channel.calls(),
            vec![Call::Photo(InputFile::Url("https://p/0.jpg".into()), Some("hi".into()))]
        );
    }

    #[tokio::test]
    async fn single_photo_with_long_caption_uses_anchor() {
        let channel = FakeChannel::default();
        let text = "c".repeat(2000);
        let unit = ContentUnit { text: text.clone(), photos: photos(1), ..ContentUnit::default() };

        deliver(&channel, &unit).await;

        assert_eq!(channel.calls(), vec![Call::Text(format!("<a href=\"https://p/0.jpg\"> </a>{text}"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_photo_with_huge_text_goes_after_text() {
        let channel = FakeChannel::default();
        let unit = ContentUnit { text: "d".repeat(5000), photos: photos(1), ..ContentUnit::default() };

        deliver(&channel, &unit).await;

        let calls = channel.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], Call::Text(t) if t.ends_with(" (...)")));
        assert!(matches!(&calls[1], Call::Text(t) if t.starts_with("(...) ")));
        assert_eq!(calls[2], Call::Photo(InputFile::Url("https://p/0.jpg".into()), None));
    }

    #[tokio::test]
    async fn avatar_update_goes_first() {
        let channel = FakeChannel::default();
        let unit = ContentUnit { photos: photos(1), avatar_update: true, ..ContentUnit::default() };

        deliver(&channel, &unit).await;

        let calls = channel.calls();
        assert_eq!(
            calls[0],
            Call::ChatPhoto(InputFile::Memory { name: "avatar.jpg".into(), data: b"https://p/0.jpg".to_vec() })
        );
        assert_eq!(calls[1], Call::Photo(InputFile::Url("https://p/0.jpg".into()), None));
    }

    #[tokio::test]
    async fn rejected_avatar_does_not_block_photo() {
        let channel = FakeChannel::denying_chat_photo();
        let unit = ContentUnit { text: "new look".into(), photos: photos(1), avatar_update: true, ..ContentUnit::default() };

        let outcome = deliver(&channel, &unit).await;

        assert_eq!(outcome, Outcome::Delivered { attempts: 1 });
        let calls = channel.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::ChatPhoto(_)));
        assert_eq!(calls[1], Call::Photo(InputFile::Url("https://p/0.jpg".into()), Some("new look".into())));
    }

    #[tokio::test]
    async fn many_photos_with_long_text_send_text_first() {
        let channel = FakeChannel::default();
        let text = "e".repeat(2000);
        let unit = ContentUnit { text: text.clone(), photos: photos(3), ..ContentUnit::default() };

        deliver(&channel, &unit).await;

        let calls = channel.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::Text(text));
        match &calls[1] {
            Call::MediaGroup(media) => {
                assert_eq!(media.len(), 3);
                assert!(media.iter().all(|m| m.caption.is_none() && m.kind == MediaKind::Photo));
            }
            other => panic!("expected media group, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn many_photos_with_short_text_caption_first_item() {
        let channel = FakeChannel::default();
        let unit = ContentUnit { text: "short".into(), photos: photos(2), ..ContentUnit::default() };

        deliver(&channel, &unit).await;

        match channel.calls().as_slice() {
            [Call::MediaGroup(media)] => {
                assert_eq!(media[0].caption.as_deref(), Some("short"));
                assert_eq!(media[1].caption, None);
            }
            other => panic!("expected one media group, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn documents_carry_caption_only_without_photos() {
        let dir = tempfile::tempdir().unwrap();
        let docs: Vec<Document> = ["a.pdf", "b.pdf"]
            .iter()
            .map(|name| {
                let local_path = dir.path().join(name);
                std::fs::write(&local_path, b"doc").unwrap();
                Document { title: (*name).into(), local_path, source_url: format!("https://vk.com/{name}") }
            })
            .collect();

        let channel = FakeChannel::default();
        let unit = ContentUnit { text: "files".into(), documents: docs.clone(), ..ContentUnit::default() };
        deliver(&channel, &unit).await;

        match channel.calls().as_slice() {
            [Call::MediaGroup(media)] => {
                assert_eq!(media.len(), 2);
                assert_eq!(media[0].caption.as_deref(), Some("files"));
                assert_eq!(media[0].file, InputFile::Path(dir.path().join("a.pdf")));
            }
            other => panic!("expected one document group, got {other:?}"),
        }

        let channel = FakeChannel::default();
        let unit = ContentUnit { text: "files".into(), photos: photos(1), documents: docs, ..ContentUnit::default() };
        deliver(&channel, &unit).await;

        let calls = channel.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[1], Call::MediaGroup(media) if media.iter().all(|m| m.caption.is_none())));
    }

    #[tokio::test]
    async fn unreadable_document_becomes_link() {
        let dir = tempfile::tempdir().unwrap();
        let doc = Document {
            title: "gone.pdf".into(),
            local_path: dir.path().join("gone.pdf"),
            source_url: "https://vk.com/doc1_2".into(),
        };

        let channel = FakeChannel::default();
        let unit = ContentUnit { text: "see".into(), documents: vec![doc], ..ContentUnit::default() };
        deliver(&channel, &unit).await;

        assert_eq!(channel.calls(), vec![Call::Text("see\nhttps://vk.com/doc1_2".into())]);
    }

    #[tokio::test]
    async fn oversized_document_becomes_link() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.pdf");
        std::fs::write(&small, b"doc").unwrap();
        let big = dir.path().join("big.iso");
        std::fs::File::create(&big).unwrap().set_len(MAX_DOC_SIZE + 1).unwrap();

        let docs = vec![
            Document { title: "small.pdf".into(), local_path: small.clone(), source_url: "https://vk.com/doc1_1".into() },
            Document { title: "big.iso".into(), local_path: big, source_url: "https://vk.com/doc1_2".into() },
        ];
        let channel = FakeChannel::default();
        deliver(&channel, &ContentUnit { text: "files".into(), documents: docs, ..ContentUnit::default() }).await;

        assert_eq!(
            channel.calls(),
            vec![Call::Document(InputFile::Path(small), Some("files\nhttps://vk.com/doc1_2".into()))]
        );
    }

    #[tokio::test]
    async fn single_document_is_sent_alone() {
        let dir = tempfile::tempdir().unwrap();
        let local_path = dir.path().join("one.pdf");
        std::fs::write(&local_path, b"doc").unwrap();
        let doc = Document { title: "one.pdf".into(), local_path: local_path.clone(), source_url: "https://d".into() };

        let channel = FakeChannel::default();
        deliver(&channel, &ContentUnit { documents: vec![doc], ..ContentUnit::default() }).await;

        assert_eq!(channel.calls(), vec![Call::Document(InputFile::Path(local_path), None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn flood_control_waits_reported_time_plus_margin() {
        let channel = FakeChannel::failing([TelegramError::FloodControl { retry_after: 5 }]);
        let started = Instant::now();

        let outcome = deliver(&channel, &text_unit("hello")).await;

        assert_eq!(outcome, Outcome::Delivered { attempts: 2 });
        assert_elapsed(started, Duration::from_secs(15));
        assert_eq!(channel.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_fourth_failure() {
        let errors = (0..10).map(|_| TelegramError::Server { code: 502, description: "Bad Gateway".into() });
        let channel = FakeChannel::failing(errors);
        let started = Instant::now();

        let outcome = deliver(&channel, &text_unit("hello")).await;

        assert_eq!(outcome, Outcome::Abandoned { attempts: 4 });
        assert_eq!(channel.calls().len(), 4);
        assert_elapsed(started, Duration::from_secs(180));
    }

    #[tokio::test]
    async fn non_retryable_error_abandons_at_once() {
        let channel = FakeChannel::failing([TelegramError::Api { code: 403, description: "Forbidden".into() }]);
        assert_eq!(deliver(&channel, &text_unit("x")).await, Outcome::Abandoned { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn retry_uploads_photo_bytes() {
        let channel = FakeChannel::failing([TelegramError::BadRequest("wrong file identifier".into())]);
        let unit = ContentUnit { photos: photos(1), ..ContentUnit::default() };

        deliver(&channel, &unit).await;

        let calls = channel.calls();
        assert_eq!(calls[0], Call::Photo(InputFile::Url("https://p/0.jpg".into()), None));
        assert_eq!(
            calls[1],
            Call::Photo(InputFile::Memory { name: "photo.jpg".into(), data: b"https://p/0.jpg".to_vec() }, None)
        );
    }
}
