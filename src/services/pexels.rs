// src/services/pexels.rs
use reqwest::Client;

use crate::errors::MontageError;
use crate::models::PexelsPhoto;

const SEARCH_URL: &str = "https://api.pexels.com/v1/search";
const RESULTS_PER_PAGE: u32 = 12;

/// Thin client for the Pexels photo search API plus the image download used
/// when a result is dropped onto the canvas.
pub struct PexelsClient {
    api_key: Option<String>,
    client: Client,
}

impl PexelsClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<PexelsPhoto>, MontageError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| MontageError::Configuration("PEXELS_API_KEY not configured".into()))?;

        let response = self
            .client
            .get(SEARCH_URL)
            .header("Authorization", api_key)
            .query(&[
                ("query", query),
                ("per_page", &RESULTS_PER_PAGE.to_string()),
                ("orientation", "landscape"),
            ])
            .send()
            .await
            .map_err(|e| MontageError::Search(format!("Pexels request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MontageError::Search(format!(
                "Pexels API error: {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MontageError::Search(format!("Failed to parse Pexels response: {}", e)))?;

        // The medium rendition keeps thumbnails light.
        let photos = data["photos"]
            .as_array()
            .map(|photos| {
                photos
                    .iter()
                    .filter_map(|photo| {
                        Some(PexelsPhoto {
                            id: photo["id"].as_u64()?,
                            url: photo["src"]["medium"].as_str()?.to_string(),
                            alt: photo["alt"].as_str().unwrap_or("").to_string(),
                            photographer: photo["photographer"].as_str().unwrap_or("").to_string(),
                            photographer_url: photo["photographer_url"]
                                .as_str()
                                .unwrap_or("")
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(photos)
    }

    /// Fetches image bytes for insertion onto the canvas.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, MontageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MontageError::ImageProcessing(format!("Image download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MontageError::ImageProcessing(format!(
                "Image download failed: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MontageError::ImageProcessing(format!("Image download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
