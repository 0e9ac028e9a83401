//! The weekly digest artifact: an ordered sequence of per-category sections
//! assembled by the aggregation engine, rendered to markdown and handed to a
//! publishing sink. Write-once; nothing here mutates after assembly.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use minijinja::render;
use serde::Serialize;

use crate::model::category::Category;

#[derive(Debug, Clone, Serialize)]
pub struct DigestSection {
    pub category: Category,
    pub unified_summary: String,
    pub contributing_record_ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct Digest {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Sections in deterministic category order; categories with no records
    /// that week are absent, never empty.
    pub sections: Vec<DigestSection>,
    pub total_newsletters: usize,
}

const DIGEST_TEMPLATE: &str = r#"# Weekly Newsletter Digest
## {{ date_range }}

{% for section in sections %}## {{ section.title }}
*{{ section.count }} newsletters*

{{ section.summary }}

{% endfor %}---

*{{ total }} total newsletters processed*
"#;

#[derive(Serialize)]
struct SectionContext {
    title: String,
    count: usize,
    summary: String,
}

impl Digest {
    pub fn date_range(&self) -> String {
        // The window is half-open, so the last covered date is end - 1 day
        let last_day = self.window_end.pred_opt().unwrap_or(self.window_end);
        format!(
            "{} - {}",
            self.window_start.format("%B %d"),
            last_day.format("%B %d, %Y")
        )
    }

    pub fn render(&self) -> String {
        let sections: Vec<SectionContext> = self
            .sections
            .iter()
            .map(|section| SectionContext {
                title: section.category.to_string(),
                count: section.contributing_record_ids.len(),
                summary: section.unified_summary.clone(),
            })
            .collect();

        render!(
            DIGEST_TEMPLATE,
            date_range => self.date_range(),
            sections => sections,
            total => self.total_newsletters,
        )
    }
}

/// Publishing boundary. The digest text goes out through this and nothing
/// else; where it lands is the sink's business.
pub trait DigestSink {
    fn publish(&self, digest: &Digest) -> anyhow::Result<PathBuf>;
}

/// Writes the rendered digest as a markdown file into the digest directory.
#[derive(Debug, Clone)]
pub struct FileDigestSink {
    dir: PathBuf,
}

impl FileDigestSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DigestSink for FileDigestSink {
    fn publish(&self, digest: &Digest) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Could not create digest dir {}", self.dir.display()))?;

        let filename = format!("weekly_digest_{}.md", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = Path::new(&self.dir).join(filename);

        std::fs::write(&path, digest.render())
            .with_context(|| format!("Could not write digest to {}", path.display()))?;

        tracing::info!("Digest saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_digest() -> Digest {
        Digest {
            window_start: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            window_end: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            sections: vec![
                DigestSection {
                    category: Category::Technology,
                    unified_summary: "The week in tech.".to_string(),
                    contributing_record_ids: vec![1, 2, 3, 4, 5],
                },
                DigestSection {
                    category: Category::Finance,
                    unified_summary: "Markets moved.".to_string(),
                    contributing_record_ids: vec![6, 7],
                },
            ],
            total_newsletters: 7,
        }
    }

    #[test]
    fn test_render_includes_header_sections_and_footer() {
        let rendered = sample_digest().render();

        assert!(rendered.starts_with("# Weekly Newsletter Digest"));
        assert!(rendered.contains("## March 03 - March 09, 2025"));
        assert!(rendered.contains("## Technology"));
        assert!(rendered.contains("*5 newsletters*"));
        assert!(rendered.contains("The week in tech."));
        assert!(rendered.contains("## Finance"));
        assert!(rendered.contains("*7 total newsletters processed*"));

        // Technology section comes before Finance
        let tech = rendered.find("## Technology").unwrap();
        let finance = rendered.find("## Finance").unwrap();
        assert!(tech < finance);
    }

    #[test]
    fn test_render_empty_digest() {
        let digest = Digest {
            window_start: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            window_end: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            sections: vec![],
            total_newsletters: 0,
        };

        let rendered = digest.render();
        assert!(rendered.contains("*0 total newsletters processed*"));
        assert!(!rendered.contains("## Technology"));
    }

    #[test]
    fn test_file_sink_writes_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileDigestSink::new(dir.path().join("digests"));

        let path = sink.publish(&sample_digest()).unwrap();

        assert!(path.exists());
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("# Weekly Newsletter Digest"));
    }
}
