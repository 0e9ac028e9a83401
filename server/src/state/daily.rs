//! Daily ingestion pipeline: fetch the 24-hour candidate window, apply the
//! cheap newsletter heuristics, run the batch processor, and persist the
//! finalized records. Failures are confined to the current run.

use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::{
    email::{candidate::clean_body, filters, spool::CandidateSource},
    error::AppResult,
    model::newsletter::NewsletterCtrl,
    prompt::SummaryGateway,
    server_config::cfg,
    state::batch_processor::BatchProcessor,
};

#[derive(Debug, Default, Serialize)]
pub struct DailyReport {
    pub fetched: usize,
    pub candidates: usize,
    pub stored: usize,
    pub failed_batches: usize,
    pub invalid_items: usize,
    pub skipped_inserts: usize,
}

pub async fn run_daily_ingestion<S, G>(
    conn: &DatabaseConnection,
    source: &S,
    gateway: &G,
) -> AppResult<DailyReport>
where
    S: CandidateSource + Sync,
    G: SummaryGateway,
{
    let cutoff = Utc::now() - Duration::hours(cfg.settings.candidate_window_hours);
    let processor = BatchProcessor::from_config(gateway);

    ingest_window(conn, source, &processor, cutoff).await
}

pub(crate) async fn ingest_window<S, G>(
    conn: &DatabaseConnection,
    source: &S,
    processor: &BatchProcessor<'_, G>,
    cutoff: DateTime<Utc>,
) -> AppResult<DailyReport>
where
    S: CandidateSource + Sync,
    G: SummaryGateway,
{
    tracing::info!("Starting daily ingestion for emails since {}", cutoff);

    let fetched = source.fetch_since(cutoff).await?;
    let mut report = DailyReport {
        fetched: fetched.len(),
        ..Default::default()
    };

    let mut candidates = filters::newsletter_candidates(fetched);
    report.candidates = candidates.len();
    if candidates.is_empty() {
        tracing::info!("No newsletter candidates in window, ingestion complete");
        return Ok(report);
    }

    for candidate in &mut candidates {
        candidate.body = clean_body(&candidate.body, cfg.settings.max_content_length);
    }

    let batch_report = processor.process(&candidates).await;
    report.failed_batches = batch_report.failed_batches;
    report.invalid_items = batch_report.invalid_items;

    for record in batch_report.records {
        let context = format!("{} ({})", record.sender, record.subject);
        match NewsletterCtrl::insert(conn, record).await {
            Ok(_) => report.stored += 1,
            Err(err) => {
                // Siblings from the same batch are unaffected
                report.skipped_inserts += 1;
                tracing::error!("Dropping record {} that failed to store: {}", context, err);
            }
        }
    }

    tracing::info!(
        "Daily ingestion complete: {} fetched, {} candidates, {} stored, {} failed batches",
        report.fetched,
        report.candidates,
        report.stored,
        report.failed_batches
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::candidate::CandidateEmail;
    use crate::prompt::GatewayError;
    use crate::testing::common::{candidate, setup_db, MockGateway};
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    struct StubSource {
        emails: Vec<CandidateEmail>,
    }

    impl CandidateSource for StubSource {
        async fn fetch_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<CandidateEmail>> {
            Ok(self
                .emails
                .iter()
                .filter(|e| e.received_at >= cutoff)
                .cloned()
                .collect())
        }
    }

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap()
    }

    fn fast_processor<'a>(gateway: &'a MockGateway) -> BatchProcessor<'a, MockGateway> {
        BatchProcessor::new(
            gateway,
            10,
            1,
            StdDuration::from_secs(1),
            StdDuration::from_secs(2),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_then_stores_classified_candidates() {
        let conn = setup_db().await;
        let gateway = MockGateway::echo();
        let source = StubSource {
            emails: vec![
                candidate(
                    "news@weekly.dev",
                    "This Week in Rust",
                    "Big release. Unsubscribe here.",
                ),
                candidate("friend@example.com", "lunch?", "see you at noon"),
            ],
        };

        let processor = fast_processor(&gateway);
        let report = ingest_window(&conn, &source, &processor, cutoff())
            .await
            .unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(report.skipped_inserts, 0);
        assert_eq!(NewsletterCtrl::count(&conn).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_window_makes_no_gateway_call() {
        let conn = setup_db().await;
        let gateway = MockGateway::echo();
        let source = StubSource { emails: vec![] };

        let processor = fast_processor(&gateway);
        let report = ingest_window(&conn, &source, &processor, cutoff())
            .await
            .unwrap();

        assert_eq!(gateway.batch_calls(), 0);
        assert_eq!(report.stored, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_confined_to_run() {
        let conn = setup_db().await;
        let gateway = MockGateway::echo();
        gateway.push_batch_response(Err(GatewayError::Timeout));
        gateway.push_batch_response(Err(GatewayError::Timeout));

        let source = StubSource {
            emails: vec![candidate(
                "news@weekly.dev",
                "This Week in Rust",
                "Big release. Unsubscribe here.",
            )],
        };

        let processor = fast_processor(&gateway);
        let report = ingest_window(&conn, &source, &processor, cutoff())
            .await
            .unwrap();

        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.stored, 0);
        assert_eq!(NewsletterCtrl::count(&conn).await.unwrap(), 0);
    }
}
