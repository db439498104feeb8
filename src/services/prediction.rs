// src/services/prediction.rs
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde_json::Value;

use crate::errors::MontageError;
use crate::models::Prediction;

pub const PRIMARY_MODEL: &str = "black-forest-labs/flux-kontext-pro";
pub const COMPARISON_MODEL: &str = "black-forest-labs/flux-kontext-max";

/// Seam over the external prediction service so the orchestrator can be
/// driven by a scripted double in tests.
#[async_trait]
pub trait PredictionApi: Send + Sync {
    async fn create(&self, model: &str, input: Value) -> Result<Prediction, MontageError>;
    async fn get(&self, id: &str) -> Result<Prediction, MontageError>;
}

pub struct ReplicateClient {
    api_base: String,
    token: String,
    client: Client,
}

impl ReplicateClient {
    pub fn new(token: String) -> Self {
        Self {
            api_base: "https://api.replicate.com/v1".to_string(),
            token,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PredictionApi for ReplicateClient {
    async fn create(&self, model: &str, input: Value) -> Result<Prediction, MontageError> {
        let response = self
            .client
            .post(format!("{}/models/{}/predictions", self.api_base, model))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|e| MontageError::Prediction(format!("Submit request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MontageError::Prediction(format!(
                "Submit error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MontageError::Prediction(format!("Failed to parse prediction: {}", e)))
    }

    async fn get(&self, id: &str) -> Result<Prediction, MontageError> {
        let response = self
            .client
            .get(format!("{}/predictions/{}", self.api_base, id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| MontageError::Prediction(format!("Poll request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MontageError::Prediction(format!(
                "Poll error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MontageError::Prediction(format!("Failed to parse prediction: {}", e)))
    }
}

/// Builds the model input for an enhancement job. Aspect ratio always follows
/// the source image; output is jpg at a fixed moderate safety tier.
pub fn enhancement_input(prompt: &str, input_image: &str) -> Value {
    serde_json::json!({
        "prompt": prompt,
        "input_image": input_image,
        "aspect_ratio": "match_input_image",
        "output_format": "jpg",
        "safety_tolerance": 2,
    })
}

/// Resolves the four accepted source-image forms into something the
/// prediction service accepts: absolute URLs and data URIs pass through,
/// site-relative paths are read from the static asset root, anything else is
/// treated as a local file path. File contents are re-encoded as a data URI.
pub async fn resolve_input_image(
    source: &str,
    static_root: &Path,
) -> Result<String, MontageError> {
    if source.starts_with("http") || source.starts_with("data:") {
        return Ok(source.to_string());
    }

    let path: PathBuf = match source.strip_prefix('/') {
        Some(relative) => static_root.join(relative),
        None => PathBuf::from(source),
    };
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        MontageError::ImageProcessing(format!(
            "Unable to read source image {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(format!(
        "data:application/octet-stream;base64,{}",
        general_purpose::STANDARD.encode(bytes)
    ))
}
