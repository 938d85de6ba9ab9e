pub(crate) use crate::error::AppError;
pub(crate) use crate::imaging::retrieval::ImageSource;
pub(crate) use crate::web::AppState;
pub(crate) use axum::Json;
pub(crate) use axum::extract::State;
pub(crate) use serde::{Deserialize, Serialize};
pub(crate) use serde_json::Value;
pub(crate) use tracing::{debug, info, instrument};
