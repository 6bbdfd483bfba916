use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to open {path} for reading: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

#[derive(Serialize, Deserialize)]
pub struct Config {
    /// Checkpoint file. Can be redefined from the command line.
    pub state: Option<String>,

    pub telegram: TelegramConfig,
    pub vk: VkConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    /// `@channelname` or numeric chat id.
    pub channel: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VkConfig {
    pub token: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Comma separated, e.g. `g123,-456`.
    pub source_ids: Option<String>,
    pub count: Option<u32>,
    pub return_banned: Option<u8>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Seconds between polling cycles.
    pub time_to_sleep: u64,
    pub single_start: bool,
    pub skip_reposts: bool,
    pub skip_ads_posts: bool,
    pub skip_copyrighted_posts: bool,
    pub show_original_post_link: bool,
    /// Case-insensitive substrings. A match anywhere skips the post.
    pub blacklist: Vec<String>,
    /// If non-empty, posts must contain at least one of these.
    pub whitelist: Vec<String>,
    /// Scratch area for downloaded documents, emptied at start.
    pub temp_dir: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            time_to_sleep: 120,
            single_start: false,
            skip_reposts: false,
            skip_ads_posts: false,
            skip_copyrighted_posts: false,
            show_original_post_link: false,
            blacklist: vec![],
            whitelist: vec![],
            temp_dir: "temp".into(),
        }
    }
}

fn default_version() -> String {
    "5.131".into()
}

fn default_filter() -> String {
    "post".into()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read { path: path.into(), source })?;
        let cfg = String::from_utf8_lossy(&bytes);
        toml::from_str(&cfg).map_err(|source| ConfigError::Parse { path: path.into(), source })
    }
}
