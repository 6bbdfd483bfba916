use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::download::DownloadError;

/// Added on top of telegram's own `retry_after`.
pub const FLOOD_MARGIN: Duration = Duration::from_secs(10);
/// Wait after bad requests, server and network errors.
pub const TRANSIENT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("flood limit is exceeded, retry after {retry_after}s")]
    FloodControl { retry_after: u64 },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("server error {code}: {description}")]
    Server { code: u16, description: String },

    #[error("telegram api error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to read {path} for upload: {source}")]
    Upload { path: PathBuf, source: std::io::Error },

    #[error("failed to fetch media for upload: {0}")]
    Fetch(#[from] DownloadError),

    #[error("failed to encode media group: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TelegramError {
    /// How long to wait before the next attempt, or `None` if retrying is pointless.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            TelegramError::FloodControl { retry_after } => Some(Duration::from_secs(*retry_after) + FLOOD_MARGIN),
            TelegramError::BadRequest(_)
            | TelegramError::Server { .. }
            | TelegramError::Network(_)
            | TelegramError::Fetch(_) => Some(TRANSIENT_WAIT),
            TelegramError::Api { .. } | TelegramError::Upload { .. } | TelegramError::Encode(_) => None,
        }
    }
}

/// Something telegram can take as a photo or document.
#[derive(Clone, Debug, PartialEq)]
pub enum InputFile {
    /// Telegram fetches it itself.
    Url(String),
    Memory { name: String, data: Vec<u8> },
    Path(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputMedia {
    pub kind: MediaKind,
    pub file: InputFile,
    /// HTML caption, at most 1024 characters.
    pub caption: Option<String>,
}

/// Destination channel. Every text is sent in HTML parse mode.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), TelegramError>;
    async fn send_photo(&self, photo: InputFile, caption: Option<&str>) -> Result<(), TelegramError>;
    async fn send_document(&self, document: InputFile, caption: Option<&str>) -> Result<(), TelegramError>;
    /// 2 to 10 items of the same kind.
    async fn send_media_group(&self, media: Vec<InputMedia>) -> Result<(), TelegramError>;
    async fn set_chat_photo(&self, photo: InputFile) -> Result<(), TelegramError>;
}

pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct TelegramInputMedia {
    r#type: &'static str,
    media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Deserialize)]
struct TelegramReply {
    ok: bool,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<TelegramReplyParameters>,
}

#[derive(Deserialize)]
struct TelegramReplyParameters {
    retry_after: Option<u64>,
}

impl TelegramClient {
    pub fn new(client: reqwest::Client, token: String, chat_id: String) -> Self {
        Self { client, token, chat_id }
    }

    fn method_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    async fn post_form(&self, method: &str, params: &[(&str, &str)]) -> Result<(), TelegramError> {
        let res = self.client.post(self.method_url(method)).form(params).send().await?;
        check_reply(res.status().as_u16(), &res.text().await?)
    }

    async fn post_multipart(&self, method: &str, form: Form) -> Result<(), TelegramError> {
        let res = self.client.post(self.method_url(method)).multipart(form).send().await?;
        check_reply(res.status().as_u16(), &res.text().await?)
    }

    /// Sends a single file, by URL through a form or by upload through multipart.
    async fn send_file(
        &self,
        method: &str,
        field: &str,
        file: InputFile,
        caption: Option<&str>,
    ) -> Result<(), TelegramError> {
        if let InputFile::Url(url) = &file {
            let mut params = vec![("chat_id", self.chat_id.as_str()), (field, url.as_str())];
            if let Some(caption) = caption {
                params.push(("caption", caption));
                params.push(("parse_mode", "HTML"));
            }
            return self.post_form(method, &params).await;
        }

        let mut form = Form::new().text("chat_id", self.chat_id.clone());
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_owned()).text("parse_mode", "HTML");
        }
        if let Some(part) = upload_part(file).await? {
            form = form.part(field.to_owned(), part);
        }
        self.post_multipart(method, form).await
    }
}

/// Multipart part for uploads, `None` for URLs.
async fn upload_part(file: InputFile) -> Result<Option<Part>, TelegramError> {
    match file {
        InputFile::Url(_) => Ok(None),
        InputFile::Memory { name, data } => Ok(Some(Part::bytes(data).file_name(name))),
        InputFile::Path(path) => {
            let data = tokio::fs::read(&path)
                .await
                .map_err(|source| TelegramError::Upload { path: path.clone(), source })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".into());
            Ok(Some(Part::bytes(data).file_name(name)))
        }
    }
}

fn check_reply(status: u16, body: &str) -> Result<(), TelegramError> {
    let reply: TelegramReply = match serde_json::from_str(body) {
        Ok(reply) => reply,
        Err(_) if (200..300).contains(&status) => return Ok(()),
        Err(_) => {
            return Err(classify(status, None, "(vktgbot) Unreadable telegram reply".into()));
        }
    };

    if reply.ok {
        return Ok(());
    }

    let code = reply.error_code.unwrap_or(status);
    let retry_after = reply.parameters.and_then(|p| p.retry_after);
    Err(classify(code, retry_after, reply.description.unwrap_or_default()))
}

fn classify(code: u16, retry_after: Option<u64>, description: String) -> TelegramError {
    match (code, retry_after) {
        (_, Some(retry_after)) => TelegramError::FloodControl { retry_after },
        (429, None) => TelegramError::FloodControl { retry_after: 0 },
        (400, _) => TelegramError::BadRequest(description),
        (500..=599, _) => TelegramError::Server { code, description },
        _ => TelegramError::Api { code, description },
    }
}

#[async_trait]
impl Channel for TelegramClient {
    async fn send_text(&self, text: &str) -> Result<(), TelegramError> {
        self.post_form(
            "sendMessage",
            &[("chat_id", self.chat_id.as_str()), ("text", text), ("parse_mode", "HTML")],
        )
        .await
    }

    async fn send_photo(&self, photo: InputFile, caption: Option<&str>) -> Result<(), TelegramError> {
        self.send_file("sendPhoto", "photo", photo, caption).await
    }

    async fn send_document(&self, document: InputFile, caption: Option<&str>) -> Result<(), TelegramError> {
        self.send_file("sendDocument", "document", document, caption).await
    }

    async fn send_media_group(&self, media: Vec<InputMedia>) -> Result<(), TelegramError> {
        let mut form = Form::new().text("chat_id", self.chat_id.clone());
        let mut items = Vec::with_capacity(media.len());

        for (i, item) in media.into_iter().enumerate() {
            let reference = match &item.file {
                InputFile::Url(url) => url.clone(),
                _ => format!("attach://file{i}"),
            };
            if let Some(part) = upload_part(item.file).await? {
                form = form.part(format!("file{i}"), part);
            }

            items.push(TelegramInputMedia {
                r#type: match item.kind {
                    MediaKind::Photo => "photo",
                    MediaKind::Document => "document",
                },
                media: reference,
                parse_mode: item.caption.as_ref().map(|_| "HTML"),
                caption: item.caption,
            });
        }

        let form = form.text("media", serde_json::to_string(&items)?);
        self.post_multipart("sendMediaGroup", form).await
    }

    async fn set_chat_photo(&self, photo: InputFile) -> Result<(), TelegramError> {
        let mut form = Form::new().text("chat_id", self.chat_id.clone());
        if let Some(part) = upload_part(photo).await? {
            form = form.part("photo", part);
        }
        self.post_multipart("setChatPhoto", form).await
    }
}
