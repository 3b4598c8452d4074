//! Bedrock runtime provider
//!
//! Posts the request body to `{endpoint}/model/{model_id}/invoke` and
//! authenticates with a Bedrock API key sent as a bearer token.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{InferenceError, InvokeRequest, InvokeResponse, ModelBackend, THROTTLING_CODES};

/// Error body returned by the runtime on non-2xx responses
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, rename = "__type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

pub struct BedrockBackend {
    client: Client,
    endpoint: String,
    model_id: String,
    api_key: Option<String>,
}

impl BedrockBackend {
    pub fn new(
        endpoint: impl Into<String>,
        model_id: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model_id: model_id.into(),
            api_key,
        })
    }

    /// Regional runtime endpoint
    pub fn regional_endpoint(region: &str) -> String {
        format!("https://bedrock-runtime.{}.amazonaws.com", region)
    }

    fn invoke_url(&self) -> String {
        format!("{}/model/{}/invoke", self.endpoint, self.model_id)
    }
}

/// Strip the `:http://...` suffix AWS appends to error type names
fn normalize_code(raw: &str) -> &str {
    let raw = raw.split(':').next().unwrap_or(raw);
    raw.rsplit('#').next().unwrap_or(raw)
}

fn classify_error(status: StatusCode, headers: &HeaderMap, body: &str) -> InferenceError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    let code = headers
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(parsed.error_type)
        .or(parsed.code)
        .map(|c| normalize_code(&c).to_string());

    let message = parsed.message.unwrap_or_else(|| body.to_string());
    let label = code.clone().unwrap_or_else(|| status.to_string());

    let throttled = status == StatusCode::TOO_MANY_REQUESTS
        || code
            .as_deref()
            .map_or(false, |c| THROTTLING_CODES.contains(&c));

    if throttled {
        InferenceError::throttled(format!("{}: {}", label, message))
    } else {
        InferenceError::permanent(format!("{}: {}", label, message))
    }
}

#[async_trait]
impl ModelBackend for BedrockBackend {
    async fn invoke(&self, request: &InvokeRequest) -> Result<String, InferenceError> {
        let mut builder = self
            .client
            .post(self.invoke_url())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");

        if let Some(ref api_key) = self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.json(request).send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_error(status, &headers, &body));
        }

        let parsed: InvokeResponse = serde_json::from_str(&body).map_err(|e| {
            InferenceError::invalid_response(format!(
                "Failed to parse response: {} - Body: {}",
                e, body
            ))
        })?;

        parsed.into_text()
    }
}
