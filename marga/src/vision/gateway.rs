//! Blocking client for the embedding gateway HTTP service.
//!
//! Endpoints:
//! - `GET  /health`              model status
//! - `POST /encode`              plain image embedding (single-model gateway)
//! - `POST /encode/navigation`   raw embedding, fast path for live navigation
//! - `POST /encode/preprocessed` people painted out before embedding, used
//!                               while recording so taught waypoints do not
//!                               depend on who happened to walk by
//! - `POST /encode/inpainted`    people inpainted instead of painted out
//! - `POST /detect/people`       person detection only
//! - `POST /encode/text`         text embedding (`{"text": ...}`)
//!
//! Image endpoints take a multipart form with a single `image` field and
//! answer `{"embedding": [...], "dimensions": n}`.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Embedder;
use crate::config::GatewayConfig;
use crate::core::{Embedding, Frame};
use crate::error::{MargaError, Result};

/// Which image endpoint an embedding request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// Gateways that expose a single image endpoint.
    Raw,
    /// Real-time navigation frames.
    Navigation,
    /// Recording frames, with people removed first.
    Recording,
    /// Recording frames, with people inpainted.
    Inpainted,
}

impl EmbedMode {
    fn path(&self) -> &'static str {
        match self {
            EmbedMode::Raw => "/encode",
            EmbedMode::Navigation => "/encode/navigation",
            EmbedMode::Recording => "/encode/preprocessed",
            EmbedMode::Inpainted => "/encode/inpainted",
        }
    }
}

/// `/health` response.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayHealth {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dimensions: Option<usize>,
}

/// `/detect/people` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PeopleDetection {
    pub people_detected: bool,
    pub people_count: u32,
    pub confidence_scores: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
    dimensions: usize,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

/// Gateway client bound to one embed mode.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    mode: EmbedMode,
    dimensions: usize,
    max_retries: usize,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig, dimensions: usize, mode: EmbedMode) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(MargaError::Config("gateway.base_url is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| MargaError::Config(format!("failed to build gateway client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            mode,
            dimensions,
            max_retries: config.max_retries.max(1),
        })
    }

    /// Same connection, different endpoint.
    pub fn with_mode(&self, mode: EmbedMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    pub fn health(&self) -> Result<GatewayHealth> {
        let resp = self.send_with_retry(|| self.client.get(self.url("/health")))?;
        resp.json()
            .map_err(|e| MargaError::Embedding(format!("invalid health response: {}", e)))
    }

    pub fn detect_people(&self, frame: &Frame) -> Result<PeopleDetection> {
        let resp = self.send_with_retry(|| {
            self.client
                .post(self.url("/detect/people"))
                .multipart(image_form(frame))
        })?;
        resp.json()
            .map_err(|e| MargaError::Embedding(format!("invalid detection response: {}", e)))
    }

    pub fn embed_text(&self, text: &str) -> Result<Embedding> {
        let resp = self.send_with_retry(|| {
            self.client
                .post(self.url("/encode/text"))
                .json(&TextRequest { text })
        })?;
        self.parse_embedding(resp)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn parse_embedding(&self, resp: Response) -> Result<Embedding> {
        let parsed: EmbeddingResponse = resp
            .json()
            .map_err(|e| MargaError::Embedding(format!("invalid embedding response: {}", e)))?;
        if parsed.dimensions != parsed.embedding.len() {
            return Err(MargaError::Embedding(format!(
                "gateway reported {} dimensions but sent {}",
                parsed.dimensions,
                parsed.embedding.len()
            )));
        }
        Embedding::with_dim(parsed.embedding, self.dimensions)
            .map_err(|e| MargaError::Embedding(e.to_string()))
    }

    fn send_with_retry(&self, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut attempt = 0usize;
        loop {
            match build().send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!("Gateway returned {}, retrying (attempt {})", status, attempt);
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(MargaError::Embedding(format!(
                        "gateway request failed ({}): {}",
                        status, body
                    )));
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!("Gateway unreachable ({}), retrying (attempt {})", err, attempt);
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(MargaError::Embedding(format!("gateway request failed: {}", err)));
                }
            }
        }
    }
}

impl Embedder for GatewayClient {
    fn embed(&self, frame: &Frame) -> Result<Embedding> {
        debug!(
            "Embedding frame {} ({} bytes) via {}",
            frame.sequence,
            frame.len(),
            self.mode.path()
        );
        let resp = self.send_with_retry(|| {
            self.client
                .post(self.url(self.mode.path()))
                .multipart(image_form(frame))
        })?;
        self.parse_embedding(resp)
    }
}

fn image_form(frame: &Frame) -> multipart::Form {
    let part = multipart::Part::bytes(frame.data.to_vec()).file_name("frame.jpg");
    multipart::Form::new().part("image", part)
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(4) as u32;
    Duration::from_millis(250 * (1 << capped))
}
