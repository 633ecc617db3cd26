//! HTTP client for a Segment Anything inference service.
//!
//! The service keeps image embeddings server side:
//! - `GET  {base_url}/health` answers 2xx once the model is loaded.
//! - `POST {base_url}/embed` takes a base64 PNG and returns an `image_id`.
//! - `POST {base_url}/predict` takes the `image_id` plus point prompts and
//!   returns candidate masks as base64 little-endian `f32` logits.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use super::segmenter::{Candidate, MaskLogits, SegmentationError, SegmentationModel};
use crate::prompt::{ImageSize, PixelPrompts};

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Default request timeout in seconds. Embedding large images on CPU is slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Transport level errors.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Max retries exceeded after {0} attempts: {1}")]
    MaxRetriesExceeded(u32, String),
}

/// Configuration for the segmentation service.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub base_url: String,
    pub api_key: String,
    /// SAM backbone the service should use ("vit_b", "vit_l", "vit_h").
    pub model_type: String,
    /// Maximum number of retry attempts for failed requests.
    pub max_retries: u32,
    /// Delay between retry attempts in seconds.
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: "EMPTY".to_string(),
            model_type: "vit_b".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SegmenterConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = model_type.into();
        self
    }

    /// Set the maximum number of retry attempts for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between retry attempts in seconds.
    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    image_id: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    masks: Vec<MaskPayload>,
    scores: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct MaskPayload {
    width: u32,
    height: u32,
    /// Base64 of little-endian `f32` values, row-major.
    data: String,
}

/// Image currently embedded on the service.
#[derive(Debug, Clone)]
struct BoundImage {
    image_id: String,
    size: ImageSize,
}

/// [`SegmentationModel`] backed by a remote SAM service.
pub struct HttpSegmenter {
    config: SegmenterConfig,
    client: Client,
    bound: Option<BoundImage>,
}

impl HttpSegmenter {
    /// Create the client and verify the service is up.
    ///
    /// Any failure here means the model cannot be used at all.
    pub async fn connect(config: SegmenterConfig) -> Result<Self, SegmentationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SegmentationError::ModelUnavailable(e.to_string()))?;

        let segmenter = Self {
            config,
            client,
            bound: None,
        };
        segmenter.health_check().await?;
        Ok(segmenter)
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    async fn health_check(&self) -> Result<(), SegmentationError> {
        let url = format!("{}/health", self.config.base_url);
        tracing::debug!("Checking segmentation service at {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| SegmentationError::ModelUnavailable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(SegmentationError::ModelUnavailable(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        tracing::info!(
            "Segmentation service ready at {} ({})",
            self.config.base_url,
            self.config.model_type
        );
        Ok(())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    /// POST a JSON body, retrying transient failures.
    async fn post_json<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, ClientError> {
        let mut last_error: Option<ClientError> = None;
        let max_attempts = self.config.max_retries + 1; // +1 for the initial attempt

        for attempt in 1..=max_attempts {
            match self.send_request(url, body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !Self::is_retryable_error(&e) {
                        return Err(e);
                    }
                    if attempt < max_attempts {
                        tracing::warn!(
                            "Request to {} failed (attempt {}/{}): {}. Retrying in {}s",
                            url,
                            attempt,
                            max_attempts,
                            e,
                            self.config.retry_delay_secs
                        );
                        sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(ClientError::MaxRetriesExceeded(
            max_attempts,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }

    /// Check if an error is retryable (network errors, server errors, rate limits).
    fn is_retryable_error(error: &ClientError) -> bool {
        match error {
            ClientError::RequestFailed(_) => true,
            ClientError::ApiError { status, .. } => *status >= 500 || *status == 429,
            ClientError::ParseError(_) => false,
            ClientError::MaxRetriesExceeded(_, _) => false,
        }
    }

    async fn send_request<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, ClientError> {
        let response = self
            .authorized(self.client.post(url))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ClientError::ParseError(e.to_string()))
    }
}

impl SegmentationModel for HttpSegmenter {
    async fn set_image(&mut self, image: &DynamicImage) -> Result<(), SegmentationError> {
        // A failed upload leaves no image bound.
        self.bound = None;

        let size = ImageSize::of(image);
        let body = json!({
            "image": encode_png_base64(image)?,
            "model_type": self.config.model_type,
        });
        let url = format!("{}/embed", self.config.base_url);
        let response: EmbedResponse = self
            .post_json(&url, &body)
            .await
            .map_err(|e| SegmentationError::Inference(format!("Embedding failed: {}", e)))?;

        tracing::debug!("Bound image {} as {}", size, response.image_id);
        self.bound = Some(BoundImage {
            image_id: response.image_id,
            size,
        });
        Ok(())
    }

    async fn predict(
        &self,
        prompts: &PixelPrompts,
        multimask_output: bool,
    ) -> Result<Vec<Candidate>, SegmentationError> {
        let bound = self.bound.as_ref().ok_or(SegmentationError::NoImageBound)?;
        let body = build_predict_body(&bound.image_id, bound.size, prompts, multimask_output)?;

        let url = format!("{}/predict", self.config.base_url);
        let response: PredictResponse = self
            .post_json(&url, &body)
            .await
            .map_err(|e| SegmentationError::Inference(e.to_string()))?;

        decode_candidates(response, bound.size)
    }
}

/// Encode an image as base64 PNG (RGB, 8 bit).
fn encode_png_base64(image: &DynamicImage) -> Result<String, SegmentationError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| SegmentationError::Inference(format!("Failed to encode image: {}", e)))?;
    Ok(STANDARD.encode(buffer.into_inner()))
}

fn build_predict_body(
    image_id: &str,
    size: ImageSize,
    prompts: &PixelPrompts,
    multimask_output: bool,
) -> Result<Value, SegmentationError> {
    if prompts.is_empty() {
        return Err(SegmentationError::Inference("Empty prompt set".to_string()));
    }
    if let Some(outside) = prompts.iter().find(|p| !size.contains(p.point)) {
        return Err(SegmentationError::Inference(format!(
            "Prompt ({}, {}) lies outside the bound image {}",
            outside.point.x, outside.point.y, size
        )));
    }

    let point_coords: Vec<[u32; 2]> = prompts.iter().map(|p| [p.point.x, p.point.y]).collect();
    let point_labels: Vec<u8> = prompts.iter().map(|p| p.label.model_value()).collect();

    Ok(json!({
        "image_id": image_id,
        "point_coords": point_coords,
        "point_labels": point_labels,
        "multimask_output": multimask_output,
    }))
}

fn decode_candidates(
    response: PredictResponse,
    expected: ImageSize,
) -> Result<Vec<Candidate>, SegmentationError> {
    if response.masks.len() != response.scores.len() {
        return Err(SegmentationError::Inference(format!(
            "Got {} masks but {} scores",
            response.masks.len(),
            response.scores.len()
        )));
    }

    response
        .masks
        .into_iter()
        .zip(response.scores)
        .map(|(payload, score)| {
            let mask = decode_mask(payload)?;
            if mask.size() != expected {
                return Err(SegmentationError::Inference(format!(
                    "Mask is {} but the bound image is {}",
                    mask.size(),
                    expected
                )));
            }
            Ok(Candidate { mask, score })
        })
        .collect()
}

fn decode_mask(payload: MaskPayload) -> Result<MaskLogits, SegmentationError> {
    let bytes = STANDARD
        .decode(payload.data.as_bytes())
        .map_err(|e| SegmentationError::Inference(format!("Invalid mask encoding: {}", e)))?;
    if bytes.len() % 4 != 0 {
        return Err(SegmentationError::Inference(format!(
            "Mask payload length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    let values = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    MaskLogits::new(payload.width, payload.height, values)
}
