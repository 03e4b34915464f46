const DEFAULT_GAME_PORT: u16 = 5588;

pub fn get_default_game_port() -> u16 {
    DEFAULT_GAME_PORT
}

const DEFAULT_SAMPLES: usize = 4;

pub fn get_default_samples() -> usize {
    DEFAULT_SAMPLES
}

/// Cut `text` down to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    if max == 0 {
        return String::new();
    }

    let mut truncated: String = text.chars().take(max - 1).collect();
    truncated.push('…');
    truncated
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
