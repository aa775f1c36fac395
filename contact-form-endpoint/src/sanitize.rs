use regex::Regex;
use std::{fmt::Display, sync::OnceLock};

/// Text taken from the visitor which is safe to place into an HTML document
/// or a log row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Sanitized(String);

impl Sanitized {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl AsRef<str> for Sanitized {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Sanitized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trims `raw`, removes backslashes escaping quotes and HTML-escapes the
/// result. Sanitizing an already sanitized value returns it unchanged.
pub fn sanitize(raw: &str) -> Sanitized {
    let unescaped = unescape_quotes(raw.trim());
    Sanitized(escape_html(&unescaped))
}

fn unescape_quotes(value: &str) -> String {
    value.replace("\\'", "'").replace("\\\"", "\"")
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (index, c) in value.char_indices() {
        match c {
            '&' if starts_with_character_reference(&value[index..]) => escaped.push('&'),
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn starts_with_character_reference(value: &str) -> bool {
    static CHARACTER_REFERENCE: OnceLock<Regex> = OnceLock::new();
    CHARACTER_REFERENCE
        .get_or_init(|| {
            Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+);").unwrap()
        })
        .is_match(value)
}
