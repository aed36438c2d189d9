//! Text transform applied before storing and before publishing

use regex::Regex;
use std::sync::LazyLock;

pub(crate) static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("invalid email pattern")
});

pub(crate) static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>]+").expect("invalid url pattern")
});

/// Phone-shaped digit runs: `+` country prefix with groups, `(555) 123-4567`,
/// `555-123-4567`, `555-1234`, or 10-11 unbroken digits. Dates and plain
/// number lists don't have these shapes.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:\+\d{1,3}[\s.\-]?(?:\(\d{1,4}\)[\s.\-]?)?\d{2,4}(?:[\s.\-]?\d{2,4}){1,4}",
        r"|(?:\(\d{3}\)\s?|\b\d{3}[\s.\-])\d{3}[\s.\-]\d{4}",
        r"|\b\d{3}-\d{4}",
        r"|\b\d{10,11})\b",
    ))
    .expect("invalid phone pattern")
});

/// `@handle` mentions not preceded by a word character (so emails don't match)
static HANDLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\w@])@\w{1,30}").expect("invalid handle pattern"));

static MARKUP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("invalid markup pattern"));

pub const EMAIL_PLACEHOLDER: &str = "[email]";
pub const PHONE_PLACEHOLDER: &str = "[phone]";
pub const HANDLE_PLACEHOLDER: &str = "[user]";

/// Converts raw user text for storage and for public display
pub trait TextTransform: Send + Sync {
    /// Plain text safe to store: markup and control characters removed, trimmed
    fn sanitize(&self, raw: &str) -> String;

    /// Text safe to show publicly: emails, phone numbers and @handles removed
    fn anonymize(&self, text: &str) -> String;
}

/// Regex-based transform used by the server
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextTransform;

impl TextTransform for PlainTextTransform {
    fn sanitize(&self, raw: &str) -> String {
        let without_markup = MARKUP_PATTERN.replace_all(raw, "");
        without_markup
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn anonymize(&self, text: &str) -> String {
        // Emails first so their local part is never taken for a handle
        let text = EMAIL_PATTERN.replace_all(text, EMAIL_PLACEHOLDER);
        let text = HANDLE_PATTERN.replace_all(&text, format!("${{1}}{}", HANDLE_PLACEHOLDER));
        let text = PHONE_PATTERN.replace_all(&text, |caps: &regex::Captures| {
            let digits = caps[0].chars().filter(|c| c.is_ascii_digit()).count();
            if digits >= 7 {
                PHONE_PLACEHOLDER.to_string()
            } else {
                caps[0].to_string()
            }
        });
        text.into_owned()
    }
}
