use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use std::sync::Mutex;

use chrono::{NaiveDate, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};

use crate::email::candidate::CandidateEmail;
use crate::model::category::Category;
use crate::model::newsletter::{NewNewsletter, NewsletterCtrl};
use crate::prompt::{BatchEntry, CategoryItem, GatewayError, SummaryGateway};

/// Fresh in-memory SQLite store with the newsletter schema applied.
pub async fn setup_db() -> DatabaseConnection {
    let conn = Database::connect("sqlite::memory:")
        .await
        .expect("In-memory database connection failed");

    NewsletterCtrl::ensure_schema(&conn)
        .await
        .expect("Failed to create newsletter schema");

    conn
}

pub fn candidate(sender: &str, subject: &str, body: &str) -> CandidateEmail {
    CandidateEmail {
        sender: sender.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        received_at: Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap(),
    }
}

pub fn candidates(count: usize) -> Vec<CandidateEmail> {
    (0..count)
        .map(|i| {
            candidate(
                &format!("sender{}@example.com", i),
                &format!("Issue #{}", i),
                &format!("Content of issue {}. Unsubscribe here.", i),
            )
        })
        .collect()
}

pub fn new_record(date: &str, category: Category) -> NewNewsletter {
    let summary = "alpha beta gamma".to_string();
    NewNewsletter {
        date: date.parse::<NaiveDate>().unwrap(),
        sender: "news@example.com".to_string(),
        subject: "Test issue".to_string(),
        word_count: summary.split_whitespace().count() as i32,
        summary,
        category,
    }
}

/// Scripted gateway double. Pushed responses are consumed in order; once the
/// script runs dry it echoes a successful classification/synthesis so tests
/// only script the interesting calls.
#[derive(Default)]
pub struct MockGateway {
    batch_responses: Mutex<VecDeque<Result<Vec<BatchEntry>, GatewayError>>>,
    category_responses: Mutex<VecDeque<Result<String, GatewayError>>>,
    batch_calls: AtomicUsize,
    category_calls: AtomicUsize,
}

impl MockGateway {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn push_batch_response(&self, response: Result<Vec<BatchEntry>, GatewayError>) {
        self.batch_responses.lock().unwrap().push_back(response);
    }

    pub fn push_category_response(&self, response: Result<String, GatewayError>) {
        self.category_responses.lock().unwrap().push_back(response);
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Relaxed)
    }

    pub fn category_calls(&self) -> usize {
        self.category_calls.load(Relaxed)
    }
}

pub fn echo_entries(batch: &[CandidateEmail]) -> Vec<BatchEntry> {
    batch
        .iter()
        .enumerate()
        .map(|(i, email)| BatchEntry {
            item: i + 1,
            summary: format!("Summary of {}", email.subject),
            category: "Technology".to_string(),
        })
        .collect()
}

impl SummaryGateway for MockGateway {
    async fn classify_batch(
        &self,
        batch: &[CandidateEmail],
    ) -> Result<Vec<BatchEntry>, GatewayError> {
        self.batch_calls.fetch_add(1, Relaxed);

        if let Some(scripted) = self.batch_responses.lock().unwrap().pop_front() {
            return scripted;
        }

        Ok(echo_entries(batch))
    }

    async fn summarize_category(
        &self,
        category: Category,
        items: &[CategoryItem],
    ) -> Result<String, GatewayError> {
        self.category_calls.fetch_add(1, Relaxed);

        if let Some(scripted) = self.category_responses.lock().unwrap().pop_front() {
            return scripted;
        }

        Ok(format!(
            "Unified {} synthesis covering {} newsletters.",
            category,
            items.len()
        ))
    }
}
