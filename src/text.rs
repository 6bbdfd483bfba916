use lazy_static::lazy_static;
use regex::Regex;

/// Host that wall-style `[domain|label]` links point to.
pub const WALL_HOST: &str = "https://vk.com";

lazy_static! {
    static ref WALL_LINK: Regex = Regex::new(r"\[([\w.:/]+?)\|(.+?)\]").unwrap();
}

/// Escapes text for telegram's HTML parse mode.
/// `&` goes first so entities introduced later are not escaped twice.
pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Rewrites every `[domain|label]` into `<a href="https://vk.com/domain">label</a>`,
/// always taking the leftmost match first.
pub fn rewrite_wall_links(text: &str) -> String {
    let mut out = text.to_owned();

    // A rewrite can never create more matches than there are characters.
    for _ in 0..=text.chars().count() {
        let (range, replacement) = match WALL_LINK.captures(&out) {
            Some(caps) => {
                let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
                let link = format!(r#"<a href="{}/{}">{}</a>"#, WALL_HOST, &caps[1], &caps[2]);
                (whole, link)
            }
            None => break,
        };
        out.replace_range(range, &replacement);
    }

    out
}

/// Appends video and link URLs to the text, videos first.
///
/// The first URL that is not already part of the text becomes an invisible
/// anchor in front of the text so telegram renders its preview. If the text is
/// empty, that URL becomes the whole text instead.
pub fn append_urls(text: &str, urls: &[String], videos: &[String]) -> String {
    let mut text = text.to_owned();
    let mut first = true;

    for url in videos.iter().chain(urls) {
        if text.contains(url.as_str()) {
            continue;
        }

        if first {
            text = if text.is_empty() {
                url.clone()
            } else {
                format!("<a href=\"{url}\"> </a>{text}\n\n{url}")
            };
            first = false;
        } else {
            text.push('\n');
            text.push_str(url);
        }
    }

    text
}

/// Hard split on character boundaries, no word awareness.
pub fn split_text(text: &str, fragment_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(fragment_size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Marks continuation on split fragments: `a (...)`, `(...) b (...)`, `(...) c`.
pub fn decorate_fragments(fragments: Vec<String>) -> Vec<String> {
    let last = fragments.len().saturating_sub(1);
    fragments
        .into_iter()
        .enumerate()
        .map(|(i, part)| match i {
            _ if last == 0 => part,
            0 => format!("{part} (...)"),
            i if i == last => format!("(...) {part}"),
            _ => format!("(...) {part} (...)"),
        })
        .collect()
}

/// Length as telegram limits count it here: in characters, not bytes.
pub fn text_len(text: &str) -> usize {
    text.chars().count()
}
