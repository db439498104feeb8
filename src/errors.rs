// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MontageError {
    #[error("Session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("Layer not found: {0}")]
    LayerNotFound(uuid::Uuid),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Stock search error: {0}")]
    Search(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ResponseError for MontageError {
    fn error_response(&self) -> HttpResponse {
        match self {
            MontageError::SessionNotFound(_) | MontageError::LayerNotFound(_) => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "Not found",
                    "message": self.to_string()
                }))
            }
            MontageError::Prediction(_) => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "AI service error",
                "message": self.to_string()
            })),
            MontageError::ImageProcessing(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Image processing error",
                    "message": self.to_string()
                }))
            }
            MontageError::Search(_) => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "Stock search error",
                "message": self.to_string()
            })),
            MontageError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation error",
                "message": self.to_string()
            })),
            MontageError::Configuration(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Configuration error",
                    "message": self.to_string()
                }))
            }
        }
    }
}
