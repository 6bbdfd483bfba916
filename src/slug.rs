const ILLEGAL_CHARS: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "CONIN$", "CONOUT$", "PRN", "AUX", "CLOCK$", "NUL",
    "COM0", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9",
    "LPT0", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    "LST", "KEYBD$", "SCREEN$", "$IDLE$", "CONFIG$",
];

/// Offset from an ASCII character to its fullwidth form.
const FULLWIDTH_OFFSET: u32 = 0xFF00 - 0x20;

/// Makes a document title usable as a file name.
///
/// Illegal characters are swapped for their fullwidth look-alikes instead of
/// being dropped, so the name stays readable in the channel.
pub fn slug_filename(title: &str) -> String {
    let cleaned = title
        .chars()
        .filter(|&c| !is_unprintable(c))
        .map(|c| {
            if ILLEGAL_CHARS.contains(&c) {
                char::from_u32(c as u32 + FULLWIDTH_OFFSET).unwrap_or(c)
            } else {
                c
            }
        })
        .collect::<String>()
        .trim_end()
        .to_owned();

    if RESERVED_NAMES.contains(&stem(&cleaned).to_uppercase().as_str()) {
        return format!("__{cleaned}");
    }

    if !cleaned.is_empty() && cleaned.chars().all(|c| c == '.') {
        return cleaned.replacen('.', "\u{FF0E}", 1);
    }

    cleaned
}

fn is_unprintable(c: char) -> bool {
    (c as u32) < 31 || c as u32 == 127
}

/// Name without its last extension. Leading dots don't start an extension.
fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if name[..i].chars().any(|c| c != '.') => &name[..i],
        _ => name,
    }
}
