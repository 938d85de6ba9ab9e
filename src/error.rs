//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info};

use crate::generate::GenerateError;
use crate::imaging::InvalidOpacity;
use crate::imaging::compositor::CompositeError;
use crate::imaging::pipeline::PipelineError;
use crate::imaging::retrieval::RetrievalError;

/// Errors surfaced by the HTTP layer.
#[derive(Debug)]
pub enum AppError {
    /// The request was malformed; the message says how.
    BadRequest(String),
    /// Route does not exist
    NotFound(String),
    /// The generation provider failed
    Generation(GenerateError),
    /// Fetching, decoding or compositing an image failed
    Image(PipelineError),
    /// The image the provider produced could not be fetched or processed
    GeneratedImage(PipelineError),
}

impl AppError {
    /// Attributes `err` to the provider's output rather than the caller's input.
    pub fn generated(err: impl Into<PipelineError>) -> Self {
        AppError::GeneratedImage(err.into())
    }
}

impl From<GenerateError> for AppError {
    fn from(err: GenerateError) -> Self {
        AppError::Generation(err)
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Image(err)
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        AppError::Image(PipelineError::Retrieval(err))
    }
}

impl From<InvalidOpacity> for AppError {
    fn from(err: InvalidOpacity) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

fn json_error(
    status: StatusCode,
    error: &str,
    details: Option<String>,
) -> axum::response::Response {
    let body = match details {
        Some(details) => json!({ "error": error, "details": details }),
        None => json!({ "error": error }),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::BadRequest(message) => {
                info!("Bad request received: {}", message);
                json_error(StatusCode::BAD_REQUEST, &message, None)
            }
            AppError::NotFound(target) => {
                info!("404 - Route not found: {target}");
                json_error(StatusCode::NOT_FOUND, "Route not found", None)
            }
            AppError::Generation(err) => {
                error!("Error generating image: {}", err);
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to generate image",
                    Some(err.to_string()),
                )
            }
            AppError::GeneratedImage(err) => {
                error!("Error processing generated image: {}", err);
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to generate image",
                    Some(err.to_string()),
                )
            }
            AppError::Image(PipelineError::Composite(
                err @ CompositeError::InvalidDimensions { .. },
            )) => {
                info!("Rejected image dimensions: {}", err);
                json_error(
                    StatusCode::BAD_REQUEST,
                    "Invalid image dimensions",
                    Some(err.to_string()),
                )
            }
            // bytes the caller handed us that do not decode
            AppError::Image(PipelineError::Retrieval(RetrievalError::DecodeFailed(reason))) => {
                info!("Undecodable image in request: {}", reason);
                json_error(
                    StatusCode::BAD_REQUEST,
                    "Invalid image",
                    Some(RetrievalError::DecodeFailed(reason).to_string()),
                )
            }
            AppError::Image(err) => {
                error!("Error processing image: {}", err);
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process image",
                    Some(err.to_string()),
                )
            }
        }
    }
}
