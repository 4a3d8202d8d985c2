use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{message} ({code}, HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

/// Thin client for the gateway REST API. Unwraps the success envelope and
/// turns error bodies into [`ClientError::Api`].
pub struct GateClient {
    base_url: String,
    http: reqwest::Client,
}

impl GateClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        let response = self.http.get(self.url(path)).send().await?;
        Self::data(response).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Self::data(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        let response = self.http.delete(self.url(path)).send().await?;
        Self::data(response).await
    }

    /// Raw `/health` status and body; a degraded server still answers
    pub async fn health(&self) -> Result<(StatusCode, Value), ClientError> {
        let response = self
            .http
            .get(self.url("/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let status = response.status();
        let body = response.json().await?;
        Ok((status, body))
    }

    async fn data(response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|_| ClientError::Malformed(format!("HTTP {}: {}", status.as_u16(), text)))?;

        if status.is_success() && body["success"] == Value::Bool(true) {
            return Ok(body.get("data").cloned().unwrap_or(Value::Null));
        }

        Err(ClientError::Api {
            status: status.as_u16(),
            code: body["code"].as_str().unwrap_or("UNKNOWN").to_string(),
            message: body["message"].as_str().unwrap_or("request failed").to_string(),
        })
    }
}
