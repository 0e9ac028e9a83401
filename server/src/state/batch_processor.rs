//! Batch Processing Module
//!
//! Drives the classification gateway over a pool of candidate emails in
//! fixed-size batches, with retry-and-backoff discipline and per-item
//! response validation. The daily ingestion pipeline feeds its output into
//! the newsletter store.

use std::time::Duration;

use tokio::time::sleep;

use crate::{
    email::candidate::CandidateEmail,
    model::{category::Category, newsletter::NewNewsletter},
    prompt::{BatchEntry, SummaryGateway},
    server_config::cfg,
};

pub struct BatchProcessor<'a, G> {
    gateway: &'a G,
    batch_size: usize,
    retry_attempts: u32,
    retry_interval: Duration,
    batch_interval: Duration,
}

/// What happened to one candidate pool. `records` preserves batch order;
/// the counters exist for logging and the status surface.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<NewNewsletter>,
    pub failed_batches: usize,
    pub invalid_items: usize,
    pub missing_items: usize,
}

impl<'a, G: SummaryGateway> BatchProcessor<'a, G> {
    pub fn new(
        gateway: &'a G,
        batch_size: usize,
        retry_attempts: u32,
        retry_interval: Duration,
        batch_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            batch_size,
            retry_attempts,
            retry_interval,
            batch_interval,
        }
    }

    pub fn from_config(gateway: &'a G) -> Self {
        Self::new(
            gateway,
            cfg.batch.batch_size,
            cfg.batch.retry_attempts,
            cfg.batch_retry_interval(),
            cfg.batch_interval(),
        )
    }

    /// Partition the pool into consecutive batches and run each through the
    /// gateway in order. Empty input makes no gateway call. The inter-batch
    /// wait elapses between successive calls regardless of the prior batch's
    /// outcome; rate limiting is per call, not per success.
    pub async fn process(&self, candidates: &[CandidateEmail]) -> BatchReport {
        let mut report = BatchReport::default();

        if candidates.is_empty() {
            tracing::info!("No candidates to process");
            return report;
        }

        let total_batches = candidates.len().div_ceil(self.batch_size);
        tracing::info!(
            "Processing {} newsletters in {} batches of up to {}",
            candidates.len(),
            total_batches,
            self.batch_size
        );

        for (batch_idx, batch) in candidates.chunks(self.batch_size).enumerate() {
            let batch_no = batch_idx + 1;

            if batch_idx > 0 {
                tracing::info!(
                    "Waiting {:?} before batch {}/{}",
                    self.batch_interval,
                    batch_no,
                    total_batches
                );
                sleep(self.batch_interval).await;
            }

            match self.run_batch_with_retries(batch, batch_no).await {
                Some(entries) => {
                    self.collect_batch(batch, entries, &mut report);
                }
                None => {
                    report.failed_batches += 1;
                    log_permanent_failure(batch, batch_no);
                }
            }
        }

        tracing::info!(
            "Batch processing complete: {} records, {} failed batches, {} invalid items, {} items without entry",
            report.records.len(),
            report.failed_batches,
            report.invalid_items,
            report.missing_items
        );

        report
    }

    /// One batch through the gateway: the initial attempt plus up to
    /// `retry_attempts` retries, waiting `retry_interval` before each retry.
    /// Any gateway error retries the whole batch; `None` means exhaustion.
    async fn run_batch_with_retries(
        &self,
        batch: &[CandidateEmail],
        batch_no: usize,
    ) -> Option<Vec<BatchEntry>> {
        let total_attempts = self.retry_attempts + 1;

        for attempt in 0..total_attempts {
            if attempt > 0 {
                tracing::info!(
                    "Waiting {:?} before retrying batch {}",
                    self.retry_interval,
                    batch_no
                );
                sleep(self.retry_interval).await;
            }

            match self.gateway.classify_batch(batch).await {
                Ok(entries) => {
                    if attempt > 0 {
                        tracing::info!("Batch {} succeeded on retry {}", batch_no, attempt);
                    }
                    return Some(entries);
                }
                Err(err) => {
                    tracing::warn!(
                        "Batch {} attempt {}/{} failed: {}",
                        batch_no,
                        attempt + 1,
                        total_attempts,
                        err
                    );
                }
            }
        }

        None
    }

    /// Per-item validation of a well-formed response. Entries are matched to
    /// inputs by their 1-based id, so a wrong item count never retries the
    /// batch: out-of-range, duplicate, empty-summary and unknown-category
    /// entries each skip exactly that item, and inputs the model returned no
    /// entry for are counted as skipped (the prompt tells it to omit
    /// non-newsletters).
    fn collect_batch(
        &self,
        batch: &[CandidateEmail],
        entries: Vec<BatchEntry>,
        report: &mut BatchReport,
    ) {
        let mut has_entry = vec![false; batch.len()];

        for entry in entries {
            if entry.item == 0 || entry.item > batch.len() {
                tracing::warn!(
                    "Dropping response entry with out-of-range id {} (batch of {})",
                    entry.item,
                    batch.len()
                );
                report.invalid_items += 1;
                continue;
            }

            let idx = entry.item - 1;
            if has_entry[idx] {
                tracing::warn!("Dropping duplicate response entry for item {}", entry.item);
                report.invalid_items += 1;
                continue;
            }
            has_entry[idx] = true;

            let source = &batch[idx];
            let summary = entry.summary.trim();
            if summary.is_empty() {
                tracing::warn!(
                    "Empty summary for newsletter from {} ({}), skipping",
                    source.sender,
                    source.subject
                );
                report.invalid_items += 1;
                continue;
            }

            let Some(category) = Category::parse(&entry.category) else {
                tracing::warn!(
                    "Genre '{}' is not in the approved set, skipping newsletter from {} ({})",
                    entry.category,
                    source.sender,
                    source.subject
                );
                report.invalid_items += 1;
                continue;
            };

            report.records.push(NewNewsletter {
                date: source.date(),
                sender: source.sender.clone(),
                subject: source.subject.clone(),
                summary: summary.to_string(),
                category,
                word_count: summary.split_whitespace().count() as i32,
            });
        }

        let missing = has_entry.iter().filter(|seen| !**seen).count();
        if missing > 0 {
            tracing::debug!("{} items in batch had no response entry", missing);
            report.missing_items += missing;
        }
    }
}

/// Identifying fields of every item in the batch go to the log so the run
/// can be reprocessed by hand.
fn log_permanent_failure(batch: &[CandidateEmail], batch_no: usize) {
    let contents = batch
        .iter()
        .map(|email| format!("{} | {} | {}", email.date(), email.sender, email.subject))
        .collect::<Vec<_>>()
        .join("\n");
    tracing::error!(
        "Batch {} permanently failed after exhausting retries, dropping {} items:\n{}",
        batch_no,
        batch.len(),
        contents
    );
}
