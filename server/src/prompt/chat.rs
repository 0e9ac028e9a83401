use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{server_config::cfg, HttpClient};

use super::GatewayError;

pub async fn chat_completion(
    http_client: &HttpClient,
    messages: Vec<ChatMessage>,
) -> Result<String, GatewayError> {
    let endpoint = format!("{}/chat/completions", cfg.api.base_url);

    let resp = http_client
        .post(&endpoint)
        .bearer_auth(&cfg.api.key)
        .json(&json!(
          {
            "model": &cfg.api.model,
            "temperature": cfg.api.temperature,
            "messages": messages,
          }
        ))
        .send()
        .await
        .map_err(classify_transport_error)?;

    match resp.status() {
        StatusCode::TOO_MANY_REQUESTS => return Err(GatewayError::RateLimited),
        StatusCode::REQUEST_TIMEOUT => return Err(GatewayError::Timeout),
        _ => {}
    }

    let value = resp
        .json::<serde_json::Value>()
        .await
        .map_err(classify_transport_error)?;

    let parsed = serde_json::from_value::<ChatApiResponseOrError>(value.clone()).map_err(|_| {
        GatewayError::MalformedResponse(format!("Could not parse chat response: {}", value))
    })?;

    let parsed = match parsed {
        ChatApiResponseOrError::Error(err) => {
            if err.error.message.to_lowercase().contains("rate limit") {
                return Err(GatewayError::RateLimited);
            }
            return Err(GatewayError::Api(err.error.message));
        }
        ChatApiResponseOrError::Response(parsed) => parsed,
    };

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedResponse("No choices in response".to_string()))?;

    Ok(choice.message.content)
}

fn classify_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else if error.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        GatewayError::RateLimited
    } else {
        GatewayError::Network(error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatErrorBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatApiError {
    pub error: ChatErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}
