use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument};

use parley_core::errors::BackendError;
use parley_core::generation::{ImagePayload, SamplingConfig};
use parley_core::generator::{GenerationRequest, TextGenerator, TokenStream};
use parley_core::prompt::{Prompt, PromptEntry};

use crate::ndjson::NdjsonStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Slot id the backend binds an inline image to.
const IMAGE_SLOT: u32 = 10;

/// Connection settings for a llama.cpp-style completion server.
#[derive(Clone, Debug)]
pub struct LlamaCppConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub api_key: Option<SecretString>,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for LlamaCppConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8080,
            use_tls: false,
            api_key: None,
            connect_timeout: CONNECT_TIMEOUT,
            idle_timeout: STREAM_IDLE_TIMEOUT,
        }
    }
}

impl LlamaCppConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum PromptField<'a> {
    Prompt(&'a str),
    Messages(&'a [PromptEntry]),
}

#[derive(Serialize)]
struct ImageData<'a> {
    data: &'a str,
    id: u32,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    #[serde(flatten)]
    prompt: PromptField<'a>,
    stream: bool,
    stop: &'a [String],
    #[serde(flatten)]
    sampling: &'a SamplingConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    image_data: Vec<ImageData<'a>>,
}

/// Streaming client for the `/completion` endpoint.
pub struct LlamaCppGenerator {
    client: Client,
    config: LlamaCppConfig,
}

impl LlamaCppGenerator {
    pub fn new(config: LlamaCppConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| BackendError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.bearer_auth(key.expose_secret()),
            None => req,
        }
    }

    /// Ask the backend to drop its cached context before the next completion.
    pub async fn clear_context(&self) -> Result<(), BackendError> {
        let resp = self
            .authorize(self.client.post(self.url("/clear-context")))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !resp.status().is_success() {
            return Err(BackendError::ClearContextFailed(resp.status().as_u16()));
        }
        Ok(())
    }

    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.config.connect_timeout)
        } else {
            BackendError::NetworkError(e.to_string())
        }
    }
}

/// JSON body for one streamed completion.
pub fn completion_body(request: &GenerationRequest) -> Result<serde_json::Value, BackendError> {
    let prompt = match &request.prompt {
        Prompt::Text(text) => PromptField::Prompt(text),
        Prompt::Messages(entries) => PromptField::Messages(entries),
    };
    let image_data = match (&request.prompt, &request.image) {
        (Prompt::Text(_), Some(ImagePayload::Base64 { data, .. })) => vec![ImageData {
            data,
            id: IMAGE_SLOT,
        }],
        _ => Vec::new(),
    };
    let body = CompletionBody {
        prompt,
        stream: true,
        stop: &request.stop,
        sampling: &request.sampling,
        image_data,
    };
    serde_json::to_value(&body).map_err(|e| BackendError::InvalidRequest(e.to_string()))
}

#[async_trait]
impl TextGenerator for LlamaCppGenerator {
    fn name(&self) -> &str {
        "llamacpp"
    }

    #[instrument(skip(self, request), fields(host = %self.config.host, port = self.config.port))]
    async fn stream(&self, request: &GenerationRequest) -> Result<TokenStream, BackendError> {
        if request.clear_context {
            self.clear_context().await?;
        }

        let body = completion_body(request)?;
        debug!(stop = ?request.stop, "posting completion request");

        let resp = self
            .authorize(self.client.post(self.url("/completion")))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, body));
        }

        Ok(Box::pin(NdjsonStream::new(
            resp.bytes_stream(),
            request.stop.clone(),
            self.config.idle_timeout,
        )))
    }
}
