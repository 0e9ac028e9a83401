//! Weekly aggregation engine: re-group the week's records by category and
//! drive one rate-limited synthesis call per category, assembling the
//! resulting sections into the digest artifact.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use tokio::time::sleep;

use crate::{
    db_core::prelude::newsletter,
    digest::{Digest, DigestSection},
    error::AppResult,
    model::{category::Category, newsletter::NewsletterCtrl},
    prompt::{CategoryItem, SummaryGateway},
    server_config::cfg,
};

pub struct WeeklyAggregator<'a, G> {
    gateway: &'a G,
    genre_interval: Duration,
    retry_attempts: u32,
    retry_interval: Duration,
}

impl<'a, G: SummaryGateway> WeeklyAggregator<'a, G> {
    pub fn new(
        gateway: &'a G,
        genre_interval: Duration,
        retry_attempts: u32,
        retry_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            genre_interval,
            retry_attempts,
            retry_interval,
        }
    }

    pub fn from_config(gateway: &'a G) -> Self {
        Self::new(
            gateway,
            cfg.genre_interval(),
            cfg.weekly.retry_attempts,
            cfg.weekly_retry_interval(),
        )
    }

    /// Build the digest for records dated in `[window_start, window_end)`.
    /// One synthesis call per non-empty category, in deterministic category
    /// order, waiting `genre_interval` between calls (not before the first).
    /// A category whose call exhausts its retries is omitted and logged; the
    /// rest of the digest is unaffected. An empty window yields an empty
    /// digest, not an error.
    pub async fn aggregate(
        &self,
        conn: &DatabaseConnection,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> AppResult<Digest> {
        let records =
            NewsletterCtrl::in_date_range(conn, window_start, window_end, None).await?;
        tracing::info!(
            "Aggregating {} records from {} to {}",
            records.len(),
            window_start,
            window_end
        );

        let groups = group_by_category(&records);
        let mut sections = Vec::new();

        for (position, (category, group)) in groups.iter().enumerate() {
            if position > 0 {
                tracing::info!(
                    "Waiting {:?} before next genre ({})",
                    self.genre_interval,
                    category
                );
                sleep(self.genre_interval).await;
            }

            tracing::info!(
                "Synthesizing {} ({} newsletters) - {}/{}",
                category,
                group.len(),
                position + 1,
                groups.len()
            );

            match self.synthesize_with_retries(*category, group).await {
                Some(unified_summary) => {
                    sections.push(DigestSection {
                        category: *category,
                        unified_summary,
                        contributing_record_ids: group.iter().map(|r| r.id).collect(),
                    });
                }
                None => {
                    tracing::error!(
                        "Omitting {} section after exhausting retries ({} newsletters dropped from digest)",
                        category,
                        group.len()
                    );
                }
            }
        }

        let total_newsletters = sections
            .iter()
            .map(|s| s.contributing_record_ids.len())
            .sum();

        Ok(Digest {
            window_start,
            window_end,
            sections,
            total_newsletters,
        })
    }

    /// Same attempt-loop shape as the batch processor: initial call plus up
    /// to `retry_attempts` retries with `retry_interval` waits.
    async fn synthesize_with_retries(
        &self,
        category: Category,
        group: &[&newsletter::Model],
    ) -> Option<String> {
        let items: Vec<CategoryItem> = group
            .iter()
            .map(|record| CategoryItem {
                sender: record.sender.clone(),
                subject: record.subject.clone(),
                date: record.date,
                summary: record.summary.clone(),
            })
            .collect();

        let total_attempts = self.retry_attempts + 1;
        for attempt in 0..total_attempts {
            if attempt > 0 {
                tracing::info!(
                    "Waiting {:?} before retrying {} synthesis",
                    self.retry_interval,
                    category
                );
                sleep(self.retry_interval).await;
            }

            match self.gateway.summarize_category(category, &items).await {
                Ok(summary) => {
                    if attempt > 0 {
                        tracing::info!("{} synthesis succeeded on retry {}", category, attempt);
                    }
                    return Some(summary);
                }
                Err(err) => {
                    tracing::warn!(
                        "{} synthesis attempt {}/{} failed: {}",
                        category,
                        attempt + 1,
                        total_attempts,
                        err
                    );
                }
            }
        }

        None
    }
}

/// Group records by their stored category label. The BTreeMap keeps groups
/// in the enum's declaration order, which is the digest order. Rows whose
/// label no longer parses are logged and left out rather than trusted.
fn group_by_category(records: &[newsletter::Model]) -> BTreeMap<Category, Vec<&newsletter::Model>> {
    let mut groups: BTreeMap<Category, Vec<&newsletter::Model>> = BTreeMap::new();

    for record in records {
        match Category::parse(&record.category) {
            Some(category) => groups.entry(category).or_default().push(record),
            None => {
                tracing::warn!(
                    "Record {} has category '{}' outside the approved set, excluding from digest",
                    record.id,
                    record.category
                );
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::GatewayError;
    use crate::testing::common::{new_record, setup_db, MockGateway};
    use tokio::time::Instant;

    const GENRE_INTERVAL: Duration = Duration::from_secs(1800);
    const RETRY_INTERVAL: Duration = Duration::from_secs(600);

    fn aggregator<'a>(gateway: &'a MockGateway) -> WeeklyAggregator<'a, MockGateway> {
        WeeklyAggregator::new(gateway, GENRE_INTERVAL, 2, RETRY_INTERVAL)
    }

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
    }

    async fn seed(conn: &DatabaseConnection, count: usize, date: &str, category: Category) {
        for _ in 0..count {
            NewsletterCtrl::insert(conn, new_record(date, category))
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_window_produces_empty_digest() {
        let conn = setup_db().await;
        let gateway = MockGateway::echo();
        let (start, end) = window();

        let digest = aggregator(&gateway).aggregate(&conn, start, end).await.unwrap();

        assert!(digest.sections.is_empty());
        assert_eq!(digest.total_newsletters, 0);
        assert_eq!(gateway.category_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sections_follow_deterministic_order_with_intergenre_waits() {
        let conn = setup_db().await;
        let gateway = MockGateway::echo();
        let (start, end) = window();

        // Inserted Finance first; the digest still orders Technology first
        seed(&conn, 2, "2025-03-04", Category::Finance).await;
        seed(&conn, 5, "2025-03-05", Category::Technology).await;

        let started = Instant::now();
        let digest = aggregator(&gateway).aggregate(&conn, start, end).await.unwrap();

        assert_eq!(digest.sections.len(), 2);
        assert_eq!(digest.sections[0].category, Category::Technology);
        assert_eq!(digest.sections[0].contributing_record_ids.len(), 5);
        assert_eq!(digest.sections[1].category, Category::Finance);
        assert_eq!(digest.sections[1].contributing_record_ids.len(), 2);
        assert_eq!(digest.total_newsletters, 7);
        assert_eq!(gateway.category_calls(), 2);
        // one inter-genre wait, none before the first category
        assert_eq!(started.elapsed(), GENRE_INTERVAL);

        let rendered = digest.render();
        assert!(rendered.contains("*7 total newsletters processed*"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_duplicate_sections_and_no_empty_sections() {
        let conn = setup_db().await;
        let gateway = MockGateway::echo();
        let (start, end) = window();

        seed(&conn, 3, "2025-03-04", Category::Science).await;
        seed(&conn, 1, "2025-03-06", Category::Science).await;

        let digest = aggregator(&gateway).aggregate(&conn, start, end).await.unwrap();

        assert_eq!(digest.sections.len(), 1);
        assert_eq!(digest.sections[0].contributing_record_ids.len(), 4);
        assert_eq!(gateway.category_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_excludes_end_date() {
        let conn = setup_db().await;
        let gateway = MockGateway::echo();
        let (start, end) = window();

        seed(&conn, 1, "2025-03-09", Category::Health).await;
        seed(&conn, 1, "2025-03-10", Category::Health).await;

        let digest = aggregator(&gateway).aggregate(&conn, start, end).await.unwrap();

        assert_eq!(digest.total_newsletters, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_transparent_to_digest() {
        let conn = setup_db().await;
        let (start, end) = window();
        seed(&conn, 2, "2025-03-04", Category::Business).await;

        let flaky = MockGateway::echo();
        flaky.push_category_response(Err(GatewayError::RateLimited));

        let started = Instant::now();
        let digest = aggregator(&flaky).aggregate(&conn, start, end).await.unwrap();

        assert_eq!(flaky.category_calls(), 2);
        assert_eq!(started.elapsed(), RETRY_INTERVAL);
        assert_eq!(digest.sections.len(), 1);
        assert_eq!(
            digest.sections[0].unified_summary,
            "Unified Business synthesis covering 2 newsletters."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_category_is_omitted_and_others_continue() {
        let conn = setup_db().await;
        let (start, end) = window();

        seed(&conn, 5, "2025-03-04", Category::Technology).await;
        seed(&conn, 2, "2025-03-05", Category::Finance).await;

        // Technology is synthesized first and fails every attempt
        let gateway = MockGateway::echo();
        for _ in 0..3 {
            gateway.push_category_response(Err(GatewayError::Timeout));
        }

        let digest = aggregator(&gateway).aggregate(&conn, start, end).await.unwrap();

        // retry_attempts + 1 calls for Technology, one for Finance
        assert_eq!(gateway.category_calls(), 4);
        assert_eq!(digest.sections.len(), 1);
        assert_eq!(digest.sections[0].category, Category::Finance);
        // the failed category's records do not count toward the footer
        assert_eq!(digest.total_newsletters, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rows_with_unknown_stored_category_are_excluded() {
        let conn = setup_db().await;
        let (start, end) = window();
        seed(&conn, 1, "2025-03-04", Category::Culture).await;

        let records = NewsletterCtrl::in_date_range(&conn, start, end, None)
            .await
            .unwrap();

        // a legacy row whose label fell out of the approved set
        let legacy = newsletter::Model {
            id: 99,
            date: start,
            sender: "old@example.com".to_string(),
            subject: "Legacy".to_string(),
            summary: "one two".to_string(),
            category: "Gossip".to_string(),
            word_count: 2,
            created_at: chrono::Utc::now(),
        };

        let groups = group_by_category(&[records[0].clone(), legacy]);
        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key(&Category::Culture));
    }
}
