pub(crate) mod chat;
pub(crate) mod gateway;

pub use gateway::{BatchEntry, CategoryItem, LlmGateway, SummaryGateway};

use derive_more::derive::Display;

/// Failure modes of one gateway round trip. Every variant is transient from
/// the caller's perspective and retried at batch/category granularity;
/// per-item problems inside a well-formed response are not errors here.
#[derive(Debug, Display)]
pub enum GatewayError {
    #[display("request timed out")]
    Timeout,
    #[display("rate limited by provider")]
    RateLimited,
    #[display("network error: {_0}")]
    Network(reqwest::Error),
    #[display("api error: {_0}")]
    Api(String),
    #[display("malformed response: {_0}")]
    MalformedResponse(String),
}

impl std::error::Error for GatewayError {}
