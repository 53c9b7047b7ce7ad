use std::sync::OnceLock;

use regex::Regex;

const MAX_TITLE_CHARS: usize = 180;

fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"))
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Turns a video title into something every filesystem accepts.
pub fn sanitize_title(title: &str) -> String {
    let cleaned = whitespace().replace_all(title, " ");
    let cleaned = illegal_chars().replace_all(&cleaned, "_");
    let cleaned: String = cleaned
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    let cleaned = cleaned.trim_end().to_string();

    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

/// File stem for a job. Playlist items get a zero-padded ordinal so two
/// entries with the same title never write the same file.
pub fn output_stem(title: &str, position: Option<usize>, width: usize) -> String {
    let title = sanitize_title(title);
    match position {
        Some(pos) => format!("{:0width$} - {}", pos, title, width = width),
        None => title,
    }
}
