//! One polling cycle: fetch, filter, render, deliver, checkpoint.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, TimeZone, Utc};
use tracing::{debug, error, info};

use crate::{
    checkpoint::{CheckpointError, CheckpointStore},
    config::BotConfig,
    content::Assembler,
    delivery::{Delivery, Outcome},
    download::Downloader,
    filter::skip_reason,
    repost::PostPart,
    scratch::ScratchDir,
    sources::{FeedSource, Post},
    telegram::Channel,
};

/// An empty poll moves the checkpoint to `now` minus this, so posts the
/// feed indexes late are still picked up.
pub const EMPTY_POLL_MARGIN: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("scratch directory unavailable: {0}")]
    Scratch(#[from] io::Error),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub delivered: usize,
    pub skipped: usize,
    /// Post-parts given up on after retries. Their posts still count as delivered.
    pub abandoned_parts: usize,
}

pub struct Poller {
    pub feed: Arc<dyn FeedSource>,
    pub channel: Arc<dyn Channel>,
    pub downloader: Arc<dyn Downloader>,
    pub store: CheckpointStore,
    pub settings: BotConfig,
    pub scratch_root: PathBuf,
}

impl Poller {
    pub async fn run_cycle(&self) -> Result<CycleReport, PollError> {
        let now = Utc::now().timestamp();
        let mut checkpoint = self.store.load_or_init(now)?;
        // Every post of the cycle is judged against where the cycle started.
        let start = checkpoint;
        let mut report = CycleReport::default();

        info!("Last check: {}", format_time(checkpoint.last_seen_time));

        let mut posts = match self.feed.fetch_since(&checkpoint).await {
            Some(posts) if !posts.is_empty() => posts,
            _ => {
                checkpoint.touch(now - EMPTY_POLL_MARGIN);
                self.store.save(&checkpoint)?;
                info!("No new posts.");
                return Ok(report);
            }
        };

        posts.sort_by_key(|p| (p.date, p.id));
        report.fetched = posts.len();
        if let (Some(first), Some(last)) = (posts.first(), posts.last()) {
            info!("Got a few posts with IDs: {} - {}.", first.label(), last.label());
        }

        let scratch = ScratchDir::create_in(&self.scratch_root)?;
        debug!(path = %scratch.path().display(), "Scratch directory created");

        for post in &posts {
            if let Some(reason) = skip_reason(post, &start, &self.settings) {
                info!(post = %post.label(), "Post was skipped: {reason}.");
                report.skipped += 1;
                continue;
            }

            info!("Working with post with ID: {}.", post.label());
            report.abandoned_parts += self.process(post, &scratch).await?;

            checkpoint.advance(post.id, post.date);
            self.store.save(&checkpoint)?;
            info!(
                last_post_id = checkpoint.last_post_id,
                last_seen_time = checkpoint.last_seen_time,
                "Checkpoint advanced"
            );
            report.delivered += 1;
        }

        Ok(report)
    }

    /// Renders and delivers the post, then its repost. Returns how many parts were abandoned.
    async fn process(&self, post: &Post, scratch: &ScratchDir) -> io::Result<usize> {
        let repost = post.repost.as_deref().filter(|_| !self.settings.skip_reposts);

        let attribution = match repost {
            Some(repost) => {
                info!("Detected repost in the post.");
                self.feed.resolve_attribution_name(repost.source_id).await
            }
            None => String::new(),
        };

        let mut parts = vec![(PostPart::Post, post)];
        if let Some(repost) = repost {
            parts.push((PostPart::Repost, repost));
        }

        let assembler = Assembler {
            feed: self.feed.as_ref(),
            downloader: self.downloader.as_ref(),
            show_original_post_link: self.settings.show_original_post_link,
        };
        let delivery = Delivery { channel: self.channel.as_ref(), downloader: self.downloader.as_ref() };

        let mut abandoned = 0;
        for (part, item) in parts {
            let dir = scratch.part_dir(&format!("{}_{}", post.label(), part.name()))?;

            info!("Starting parsing of the {}", part.name());
            let unit = assembler.assemble(item, part, repost, &attribution, &dir).await;

            info!("Starting sending of the {}", part.name());
            if let Outcome::Abandoned { attempts } = delivery.deliver(&unit).await {
                error!(post = %post.label(), part = part.name(), attempts, "Post-part abandoned");
                abandoned += 1;
            }
        }

        Ok(abandoned)
    }
}

fn format_time(unix: i64) -> String {
    match Local.timestamp_opt(unix, 0).single() {
        Some(time) => time.format("%d %b %Y %H:%M:%S").to_string(),
        None => unix.to_string(),
    }
}
