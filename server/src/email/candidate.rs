use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// A fetched email that passed the cheap newsletter-likelihood filter,
/// awaiting classification. Ephemeral: dropped once its batch completes,
/// never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEmail {
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl CandidateEmail {
    /// Calendar date of the source email, which becomes the record's date
    /// (not the date of processing).
    pub fn date(&self) -> NaiveDate {
        self.received_at.date_naive()
    }
}

static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*(html|body|div|p|br|table|td|span|a)[\s>/]").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// Footer boilerplate that adds noise without content
static ARTIFACT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)View this email in your browser").unwrap(),
        Regex::new(r"(?i)If you .{0,80}unsubscribe[^.]*").unwrap(),
        Regex::new(r"(?i)This email was sent to \S*").unwrap(),
    ]
});

/// Prepare a raw email body for the gateway prompt: render HTML down to
/// text, collapse whitespace, strip footer artifacts, and cap the length.
pub fn clean_body(body: &str, max_content_length: usize) -> String {
    let text = if HTML_TAG_RE.is_match(body) {
        html2text::from_read(body.as_bytes(), 120)
    } else {
        body.to_string()
    };

    let mut cleaned = WHITESPACE_RE.replace_all(&text, " ").into_owned();
    for re in ARTIFACT_RES.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = cleaned.trim();

    if cleaned.chars().count() > max_content_length {
        let truncated: String = cleaned.chars().take(max_content_length).collect();
        format!("{}...", truncated)
    } else {
        cleaned.to_string()
    }
}
