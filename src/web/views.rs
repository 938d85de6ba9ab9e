//! Request handlers and the JSON bodies they speak.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};

use super::prelude::*;
use crate::constants::FILM_STYLE;
use crate::imaging::compositor::LogoSettings;
use crate::imaging::geometry::LogoPosition;
use crate::generate::GenerateError;
use crate::imaging::retrieval::{decode_blocking, to_data_uri};
use crate::imaging::{CompositeResult, Opacity};

#[derive(Deserialize, Debug)]
pub(crate) struct LogoRequest {
    uri: String,
    position: Option<String>,
    size_fraction: Option<f32>,
    padding: Option<u32>,
    opacity: Option<f32>,
}

impl LogoRequest {
    fn source(&self) -> Result<ImageSource, AppError> {
        request_source(&self.uri)
    }

    fn settings(&self) -> Result<LogoSettings, AppError> {
        let defaults = LogoSettings::default();
        let size_fraction = match self.size_fraction {
            Some(fraction) if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 => {
                return Err(AppError::BadRequest(format!(
                    "size_fraction must be greater than 0 and at most 1, got {fraction}"
                )));
            }
            Some(fraction) => fraction,
            None => defaults.size_fraction,
        };
        let opacity = match self.opacity {
            Some(opacity) => Opacity::new(opacity)?,
            None => defaults.opacity,
        };
        Ok(LogoSettings {
            position: self
                .position
                .as_deref()
                .map(LogoPosition::parse_lenient)
                .unwrap_or_default(),
            size_fraction,
            padding: self.padding.unwrap_or(defaults.padding),
            opacity,
        })
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct GenerateImageRequest {
    prompt: Option<String>,
    style: Option<String>,
    aspect_ratio: Option<String>,
    logo: Option<LogoRequest>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ApplyGrainRequest {
    image: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ApplyLogoRequest {
    image: String,
    logo: LogoRequest,
}

#[derive(Serialize, Debug)]
pub(crate) struct ImageResponse {
    success: bool,
    #[serde(rename = "imageData")]
    image_data: String,
}

impl ImageResponse {
    fn new(media_type: &str, bytes: &[u8]) -> Self {
        info!("Converted {} bytes of {} to base64", bytes.len(), media_type);
        Self {
            success: true,
            image_data: to_data_uri(media_type, bytes),
        }
    }
}

impl From<CompositeResult> for ImageResponse {
    fn from(result: CompositeResult) -> Self {
        Self::new(result.media_type(), &result.bytes)
    }
}

fn elapsed_ms(started: Instant) -> u128 {
    started.elapsed().as_millis()
}

/// Callers may only name images by `http(s)` or `data:` URI, never by path.
fn request_source(value: &str) -> Result<ImageSource, AppError> {
    let source =
        ImageSource::parse(value).map_err(|err| AppError::BadRequest(err.to_string()))?;
    if !source.is_uri() {
        return Err(AppError::BadRequest(
            "Images must be given as an http(s) or data URI".to_string(),
        ));
    }
    Ok(source)
}

/// Same rule for the location the provider hands back.
fn generated_source(location: &str) -> Result<ImageSource, AppError> {
    match ImageSource::parse(location) {
        Ok(source) if source.is_uri() => Ok(source),
        Ok(_) => Err(AppError::Generation(GenerateError::Failed(
            "provider returned a location that is not an http(s) or data URI".to_string(),
        ))),
        Err(err) => Err(AppError::Generation(GenerateError::Failed(format!(
            "provider returned an unusable location: {err}"
        )))),
    }
}

fn sniffed_media_type(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

async fn load_source(state: &AppState, image: &str) -> Result<Vec<u8>, AppError> {
    let source = request_source(image)?;
    debug!("Loading image from {}", source.describe());
    Ok(state.pipeline.retriever().load_bytes(&source).await?)
}

/// handles POST /generate-image
#[instrument(skip_all, fields(style = ?request.style))]
pub(crate) async fn generate_image_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateImageRequest>,
) -> Result<Json<ImageResponse>, AppError> {
    let prompt = request
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(|| AppError::BadRequest("No prompt provided".to_string()))?;

    // checked before the provider is paid for anything
    let logo = match request.logo.as_ref() {
        Some(logo) => Some((logo.source()?, logo.settings()?)),
        None => None,
    };

    info!("Generating image with prompt: {}", prompt);
    let mut options = state.generation.as_ref().clone();
    if let Some(aspect_ratio) = request.aspect_ratio.as_deref() {
        options.aspect_ratio = aspect_ratio.to_string();
    }

    let started = Instant::now();
    let location = state.generator.generate(prompt, &options).await?;
    info!("Generation finished in {}ms", elapsed_ms(started));

    let started = Instant::now();
    let source = generated_source(&location)?;
    let mut bytes = state
        .pipeline
        .retriever()
        .load_bytes(&source)
        .await
        .map_err(AppError::generated)?;
    info!(
        "Fetched image buffer, size: {} ({}ms)",
        bytes.len(),
        elapsed_ms(started)
    );

    let mut grain_format = None;
    if request.style.as_deref() == Some(FILM_STYLE) {
        let started = Instant::now();
        let result = state
            .pipeline
            .apply_grain(bytes)
            .await
            .map_err(AppError::generated)?;
        info!("Film grain applied in {}ms", elapsed_ms(started));
        grain_format = Some(result.format);
        bytes = result.bytes;
    }

    let Some((logo_source, settings)) = logo else {
        let media_type = match grain_format {
            Some(format) => format.media_type(),
            None => sniffed_media_type(&bytes),
        };
        return Ok(Json(ImageResponse::new(media_type, &bytes)));
    };

    // provider output is decoded apart from the logo
    let base = decode_blocking(bytes).await.map_err(AppError::generated)?;
    let started = Instant::now();
    let result = state
        .pipeline
        .apply_logo_to(base, &logo_source, settings)
        .await?;
    info!("Logo applied in {}ms", elapsed_ms(started));
    Ok(Json(result.into()))
}

/// handles POST /apply-grain
#[instrument(skip_all)]
pub(crate) async fn apply_grain_handler(
    State(state): State<AppState>,
    Json(request): Json<ApplyGrainRequest>,
) -> Result<Json<ImageResponse>, AppError> {
    let bytes = load_source(&state, &request.image).await?;
    let started = Instant::now();
    let result = state.pipeline.apply_grain(bytes).await?;
    info!("Film grain applied in {}ms", elapsed_ms(started));
    Ok(Json(result.into()))
}

/// handles POST /apply-logo
#[instrument(skip_all, fields(position = ?request.logo.position))]
pub(crate) async fn apply_logo_handler(
    State(state): State<AppState>,
    Json(request): Json<ApplyLogoRequest>,
) -> Result<Json<ImageResponse>, AppError> {
    let settings = request.logo.settings()?;
    let logo_source = request.logo.source()?;
    let bytes = load_source(&state, &request.image).await?;
    let started = Instant::now();
    let result = state
        .pipeline
        .apply_logo(bytes, &logo_source, settings)
        .await?;
    info!("Logo applied in {}ms", elapsed_ms(started));
    Ok(Json(result.into()))
}

/// Echoes the request back; handy when wiring up a client.
pub(crate) async fn debug_handler(headers: HeaderMap, body: Bytes) -> Json<Value> {
    info!("Debug route hit");
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect();
    let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    debug!("Debug body: {}", body);
    Json(serde_json::json!({ "status": "ok", "headers": headers, "body": body }))
}

pub(crate) async fn not_found_handler(method: Method, uri: Uri) -> AppError {
    AppError::NotFound(format!("{method} {uri}"))
}
