use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use super::candidate::CandidateEmail;

/// Boundary to the mail-fetching collaborator. Implementations produce
/// plain-text email records for a window; connection management stays on
/// their side of the line.
pub trait CandidateSource {
    fn fetch_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl std::future::Future<Output = anyhow::Result<Vec<CandidateEmail>>> + Send;
}

/// Reads raw `.eml` files dropped into a spool directory by the fetching
/// side. Files older than the cutoff are left in place and ignored.
#[derive(Debug, Clone)]
pub struct SpoolSource {
    dir: PathBuf,
}

impl SpoolSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CandidateSource for SpoolSource {
    async fn fetch_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<CandidateEmail>> {
        let mut candidates = Vec::new();

        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Could not read spool dir {}", self.dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("eml") {
                continue;
            }

            let raw = std::fs::read(&path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            let modified_at: DateTime<Utc> = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());

            match parse_eml(&raw, modified_at) {
                Some(email) if email.received_at >= cutoff => candidates.push(email),
                Some(_) => {}
                None => {
                    tracing::warn!("Skipping unparseable spool file {}", path.display());
                }
            }
        }

        candidates.sort_by_key(|c| c.received_at);
        tracing::info!(
            "Fetched {} emails from spool since {}",
            candidates.len(),
            cutoff
        );

        Ok(candidates)
    }
}

/// Parse one raw MIME message into a candidate. The Date header wins; the
/// file timestamp is the fallback for malformed headers.
fn parse_eml(raw: &[u8], fallback_received: DateTime<Utc>) -> Option<CandidateEmail> {
    let parsed = MessageParser::default().parse(raw)?;

    let sender = parsed.from().and_then(|f| f.first()).map(|addr| {
        if let Some(name) = addr.name() {
            format!("{} <{}>", name, addr.address().unwrap_or_default())
        } else {
            addr.address().unwrap_or_default().to_string()
        }
    })?;

    let subject = parsed.subject()?.to_string();

    let body = parsed
        .body_text(0)
        .map(|b| b.to_string())
        .or_else(|| parsed.body_html(0).map(|b| b.to_string()))
        .unwrap_or_default();

    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(fallback_received);

    Some(CandidateEmail {
        sender,
        subject,
        body,
        received_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_EML: &str = "From: Tech Weekly <news@techweekly.dev>\r\n\
        Subject: AI Breakthroughs\r\n\
        Date: Mon, 3 Mar 2025 10:00:00 +0000\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        This week in AI. Unsubscribe at the bottom.\r\n";

    #[test]
    fn test_parse_eml_reads_headers_and_body() {
        let email = parse_eml(SAMPLE_EML.as_bytes(), Utc::now()).unwrap();
        assert_eq!(email.sender, "Tech Weekly <news@techweekly.dev>");
        assert_eq!(email.subject, "AI Breakthroughs");
        assert!(email.body.contains("This week in AI"));
        assert_eq!(
            email.received_at,
            Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_spool_respects_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("recent.eml"), SAMPLE_EML).unwrap();
        std::fs::write(
            dir.path().join("old.eml"),
            SAMPLE_EML.replace("3 Mar 2025", "3 Mar 2019"),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an email").unwrap();

        let source = SpoolSource::new(dir.path());
        let cutoff = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let candidates = source.fetch_since(cutoff).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].subject, "AI Breakthroughs");
    }
}
