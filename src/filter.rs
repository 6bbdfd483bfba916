use std::fmt;

use crate::{checkpoint::Checkpoint, config::BotConfig, sources::Post};

#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySeen,
    Deleted(Option<String>),
    Blacklisted(String),
    NotWhitelisted,
    Advertisement,
    Copyrighted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadySeen => write!(f, "post is not newer than the checkpoint"),
            SkipReason::Deleted(reason) => write!(f, "post was deleted: {}", reason.as_deref().unwrap_or("no reason")),
            SkipReason::Blacklisted(word) => write!(f, "blacklisted word detected: {word}"),
            SkipReason::NotWhitelisted => write!(f, "no whitelist words were found"),
            SkipReason::Advertisement => write!(f, "post is an advertisement"),
            SkipReason::Copyrighted => write!(f, "post is copyrighted"),
        }
    }
}

/// Why `post` must not be delivered, if at all. Checks run in a fixed order.
pub fn skip_reason(post: &Post, checkpoint: &Checkpoint, settings: &BotConfig) -> Option<SkipReason> {
    if post.date <= checkpoint.last_seen_time {
        return Some(SkipReason::AlreadySeen);
    }
    if post.is_deleted {
        return Some(SkipReason::Deleted(post.deleted_reason.clone()));
    }
    if let Some(word) = blacklisted(&settings.blacklist, &post.text) {
        return Some(SkipReason::Blacklisted(word.into()));
    }
    if !whitelisted(&settings.whitelist, &post.text) {
        return Some(SkipReason::NotWhitelisted);
    }
    if settings.skip_ads_posts && post.marked_as_ads {
        return Some(SkipReason::Advertisement);
    }
    if settings.skip_copyrighted_posts && post.copyrighted {
        return Some(SkipReason::Copyrighted);
    }
    None
}

/// First blacklist entry found anywhere in the text, ignoring case.
pub fn blacklisted<'a>(blacklist: &'a [String], text: &str) -> Option<&'a str> {
    let text = text.to_lowercase();
    blacklist
        .iter()
        .find(|word| text.contains(&word.to_lowercase()))
        .map(String::as_str)
}

/// An empty whitelist lets everything through.
pub fn whitelisted(whitelist: &[String], text: &str) -> bool {
    if whitelist.is_empty() {
        return true;
    }
    let text = text.to_lowercase();
    whitelist.iter().any(|word| text.contains(&word.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str) -> Post {
        Post { id: 1, date: 200, text: text.into(), ..Post::default() }
    }

    fn checkpoint() -> Checkpoint {
        Checkpoint { last_post_id: 0, last_seen_time: 100 }
    }

    #[test]
    fn lists_ignore_case() {
        let list = vec!["Casino".to_string()];
        assert_eq!(blacklisted(&list, "best CASINO in town"), Some("Casino"));
        assert!(whitelisted(&list, "casino night"));
        assert!(!whitelisted(&list, "poker night"));
        assert!(whitelisted(&[], "anything"));
    }

    #[test]
    fn stale_posts_are_skipped() {
        let stale = Post { date: 100, ..post("x") };
        assert_eq!(skip_reason(&stale, &checkpoint(), &BotConfig::default()), Some(SkipReason::AlreadySeen));
        assert_eq!(skip_reason(&post("x"), &checkpoint(), &BotConfig::default()), None);
    }

    #[test]
    fn ads_and_copyright_only_when_configured() {
        let ad = Post { marked_as_ads: true, copyrighted: true, ..post("x") };
        assert_eq!(skip_reason(&ad, &checkpoint(), &BotConfig::default()), None);

        let settings = BotConfig { skip_ads_posts: true, ..BotConfig::default() };
        assert_eq!(skip_reason(&ad, &checkpoint(), &settings), Some(SkipReason::Advertisement));

        let settings = BotConfig { skip_copyrighted_posts: true, ..BotConfig::default() };
        assert_eq!(skip_reason(&ad, &checkpoint(), &settings), Some(SkipReason::Copyrighted));
    }

    #[test]
    fn deleted_posts_are_skipped() {
        let deleted = Post { is_deleted: true, deleted_reason: Some("spam".into()), ..post("x") };
        assert_eq!(
            skip_reason(&deleted, &checkpoint(), &BotConfig::default()),
            Some(SkipReason::Deleted(Some("spam".into())))
        );
    }
}
