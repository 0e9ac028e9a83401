use chrono::NaiveDate;
use indoc::formatdoc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::{email::candidate::CandidateEmail, model::category::Category, HttpClient};

use super::{
    chat::{chat_completion, ChatMessage},
    GatewayError,
};

/// One classified line of a batch response, aligned to its input by the
/// 1-based `item` id carried in the response itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub item: usize,
    pub summary: String,
    pub category: String,
}

/// A stored summary handed to the weekly synthesis call.
#[derive(Debug, Clone)]
pub struct CategoryItem {
    pub sender: String,
    pub subject: String,
    pub date: NaiveDate,
    pub summary: String,
}

/// The classification/summarization service, as seen by the pipelines: one
/// request in, a structured response or a `GatewayError` out.
pub trait SummaryGateway: Send + Sync {
    /// Classify and summarize a batch of candidate emails in one call.
    fn classify_batch(
        &self,
        batch: &[CandidateEmail],
    ) -> impl std::future::Future<Output = Result<Vec<BatchEntry>, GatewayError>> + Send;

    /// Produce one unified, non-redundant synthesis of a category's summaries.
    fn summarize_category(
        &self,
        category: Category,
        items: &[CategoryItem],
    ) -> impl std::future::Future<Output = Result<String, GatewayError>> + Send;
}

pub struct LlmGateway {
    http_client: HttpClient,
}

impl LlmGateway {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }
}

impl SummaryGateway for LlmGateway {
    async fn classify_batch(
        &self,
        batch: &[CandidateEmail],
    ) -> Result<Vec<BatchEntry>, GatewayError> {
        let prompt = batch_analysis_prompt(batch);
        let response = chat_completion(&self.http_client, vec![ChatMessage::user(prompt)]).await?;

        parse_batch_response(&response)
    }

    async fn summarize_category(
        &self,
        category: Category,
        items: &[CategoryItem],
    ) -> Result<String, GatewayError> {
        let prompt = category_synthesis_prompt(category, items);
        let response = chat_completion(&self.http_client, vec![ChatMessage::user(prompt)]).await?;

        let synthesis = response.trim();
        if synthesis.len() < MIN_SYNTHESIS_LEN {
            return Err(GatewayError::MalformedResponse(format!(
                "inadequate synthesis for {}: {} chars",
                category,
                synthesis.len()
            )));
        }

        Ok(synthesis.to_string())
    }
}

/// Below this the model almost certainly returned an apology or an empty
/// shell rather than a synthesis.
const MIN_SYNTHESIS_LEN: usize = 50;

static JSON_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

#[derive(Debug, Deserialize)]
struct BatchEnvelope {
    newsletters: Vec<RawBatchEntry>,
}

#[derive(Debug, Deserialize)]
struct RawBatchEntry {
    newsletter_id: usize,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    genre: String,
}

/// Pull the JSON envelope out of the completion text. Models wrap the object
/// in prose or code fences often enough that we scan for the outermost braces
/// instead of parsing the raw text directly. A missing or undecodable
/// envelope is a malformed (retryable) response; per-entry content is left
/// for the batch processor to judge.
pub(crate) fn parse_batch_response(response: &str) -> Result<Vec<BatchEntry>, GatewayError> {
    let json_str = JSON_OBJECT_RE.find(response).ok_or_else(|| {
        GatewayError::MalformedResponse("no JSON object in batch response".to_string())
    })?;

    let envelope: BatchEnvelope = serde_json::from_str(json_str.as_str())
        .map_err(|e| GatewayError::MalformedResponse(format!("invalid batch envelope: {}", e)))?;

    Ok(envelope
        .newsletters
        .into_iter()
        .map(|raw| BatchEntry {
            item: raw.newsletter_id,
            summary: raw.summary,
            category: raw.genre,
        })
        .collect())
}

fn batch_analysis_prompt(batch: &[CandidateEmail]) -> String {
    let newsletters_text = batch
        .iter()
        .enumerate()
        .map(|(i, email)| {
            formatdoc! {r#"
                Newsletter {n}:
                Subject: {subject}
                Content: {content}"#,
            n = i + 1,
            subject = email.subject,
            content = email.body}
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    formatdoc! {r#"
        You are an expert newsletter analyst. Analyze these {count} newsletters and provide structured output.

        For each newsletter, provide:
        1. A comprehensive summary that captures the main content, key insights, and valuable information.
        2. A genre classification from the approved list (a single genre for each newsletter).

        APPROVED GENRES (use one of these for each): {genres}

        NEWSLETTERS TO ANALYZE:
        {newsletters_text}

        RESPOND WITH VALID JSON ONLY (no other text):
        {{
            "newsletters": [
                {{"newsletter_id": 1, "summary": "Comprehensive summary of newsletter content...", "genre": "Technology"}},
                {{"newsletter_id": 2, "summary": "Another newsletter summary...", "genre": "Business"}}
            ]
        }}

        IMPORTANT:
        - newsletter_id must match the newsletter number (1, 2, 3, etc.)
        - genre must be exactly one of the approved genres
        - summary should be comprehensive and valuable for a weekly digest
        - skip any emails that are not newsletters
        - respond with valid JSON only"#,
    count = batch.len(),
    genres = Category::approved_labels().join(", ")}
}

fn category_synthesis_prompt(category: Category, items: &[CategoryItem]) -> String {
    let newsletters_text = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            formatdoc! {r#"
                Newsletter {n}:
                Subject: {subject}
                From: {sender}
                Date: {date}
                Summary: {summary}"#,
            n = i + 1,
            subject = item.subject,
            sender = item.sender,
            date = item.date,
            summary = item.summary}
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    formatdoc! {r#"
        You are an expert newsletter curator creating a comprehensive weekly digest summary for the {category} genre.

        Your task is to create a unified, comprehensive, and non-redundant summary that captures all the key insights, trends, and important information from these {count} newsletters.

        GUIDELINES:
        1. CREATE A COHESIVE NARRATIVE: Don't just list summaries - weave the information together into a flowing narrative
        2. IDENTIFY COMMON THEMES: Look for patterns, trends, and connections across the newsletters
        3. AVOID REDUNDANCY: If multiple newsletters cover the same topic, synthesize them into one coherent discussion
        4. MAINTAIN CONTEXT: Include specific details, examples, and data points that add value
        5. WRITE ENGAGINGLY: Make it interesting and readable for someone who wants to stay informed

        NEWSLETTERS TO SYNTHESIZE:
        {newsletters_text}

        RESPOND WITH THE SUMMARY ONLY - NO PREFIXES OR EXPLANATIONS."#,
    category = category,
    count = items.len(),
    newsletters_text = newsletters_text}
}
