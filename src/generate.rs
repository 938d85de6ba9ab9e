//! Text-to-image generation.
//!
//! [`ImageGenerator`] is the seam the web layer depends on; [`ReplicateGenerator`]
//! is the production implementation talking to Replicate's predictions API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::constants::{PREDICTION_MAX_POLLS, PREDICTION_POLL_INTERVAL};

/// Provider parameters sent with every prompt.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationOptions {
    /// `owner/name` of the model.
    #[serde(skip)]
    pub model: String,
    /// Skip the model's prompt upsampling.
    pub raw: bool,
    /// Width:height, eg `3:2`.
    pub aspect_ratio: String,
    /// `jpg` or `png`.
    pub output_format: String,
    /// 1 is strict, 6 is permissive.
    pub safety_tolerance: u8,
    /// Weight of an image prompt, when one is supplied.
    pub image_prompt_strength: f64,
}

/// Errors from the generation provider.
#[derive(Debug)]
pub enum GenerateError {
    /// The request never got a usable response.
    Request(String),
    /// The provider answered with a non-success status.
    Provider {
        /// HTTP status.
        status: u16,
        /// Response body, as text.
        body: String,
    },
    /// The prediction failed, was cancelled or never finished.
    Failed(String),
    /// The prediction succeeded without producing an image.
    NoOutput,
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(reason) => write!(f, "Generation request failed: {reason}"),
            Self::Provider { status, body } => {
                write!(f, "Generation provider error {status}: {body}")
            }
            Self::Failed(reason) => write!(f, "Generation failed: {reason}"),
            Self::NoOutput => write!(f, "No output received from the generation provider"),
        }
    }
}

impl std::error::Error for GenerateError {}

impl From<reqwest::Error> for GenerateError {
    fn from(err: reqwest::Error) -> Self {
        GenerateError::Request(err.to_string())
    }
}

/// Turns a prompt into the location of a generated image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns an `http(s)` or `data:` URI for the generated image.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerateError>;
}

#[derive(Serialize, Debug)]
struct PredictionInput<'a> {
    prompt: &'a str,
    #[serde(flatten)]
    options: &'a GenerationOptions,
}

#[derive(Serialize, Debug)]
struct PredictionRequest<'a> {
    input: PredictionInput<'a>,
}

#[derive(Deserialize, Debug)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Deserialize, Debug)]
struct PredictionUrls {
    get: Option<String>,
}

impl Prediction {
    fn is_running(&self) -> bool {
        matches!(self.status.as_str(), "starting" | "processing")
    }

    /// First output location; models return either a string or a list.
    fn first_output(&self) -> Option<String> {
        match &self.output {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|item| item.as_str()).map(str::to_owned),
            _ => None,
        }
    }
}

/// Replicate predictions client.
#[derive(Clone, Debug)]
pub struct ReplicateGenerator {
    client: reqwest::Client,
    api_base: String,
    api_token: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReplicateGenerator {
    /// `api_base` is the REST root, eg `https://api.replicate.com/v1`.
    pub fn new(client: reqwest::Client, api_base: &str, api_token: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            poll_interval: PREDICTION_POLL_INTERVAL,
            max_polls: PREDICTION_MAX_POLLS,
        }
    }

    /// Overrides the polling cadence.
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    async fn read_prediction(response: reqwest::Response) -> Result<Prediction, GenerateError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(GenerateError::Provider {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).to_string(),
            });
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            GenerateError::Request(format!("Failed to parse prediction JSON: {err}"))
        })
    }

    async fn wait_for(&self, mut prediction: Prediction) -> Result<Prediction, GenerateError> {
        let mut polls = 0;
        while prediction.is_running() {
            if polls >= self.max_polls {
                return Err(GenerateError::Failed(format!(
                    "prediction still {} after {polls} polls",
                    prediction.status
                )));
            }
            let Some(get_url) = prediction.urls.as_ref().and_then(|urls| urls.get.clone()) else {
                return Err(GenerateError::Failed(
                    "running prediction has no status URL".to_string(),
                ));
            };
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;
            debug!(
                "Polling prediction {} ({polls})",
                prediction.id.as_deref().unwrap_or("?")
            );
            let response = self
                .client
                .get(get_url)
                .bearer_auth(&self.api_token)
                .send()
                .await?;
            prediction = Self::read_prediction(response).await?;
        }
        Ok(prediction)
    }
}

#[async_trait]
impl ImageGenerator for ReplicateGenerator {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerateError> {
        let url = format!("{}/models/{}/predictions", self.api_base, options.model);
        let body = PredictionRequest {
            input: PredictionInput { prompt, options },
        };
        debug!("Sending prediction request to {url}: {:?}", body);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let prediction = Self::read_prediction(response).await?;
        let prediction = self.wait_for(prediction).await?;

        match prediction.status.as_str() {
            "succeeded" => {
                let output = prediction.first_output().ok_or(GenerateError::NoOutput)?;
                info!("Generated image URL: {output}");
                Ok(output)
            }
            status => Err(GenerateError::Failed(
                prediction
                    .error
                    .map(|err| match err {
                        Value::String(message) => message,
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| format!("prediction {status}")),
            )),
        }
    }
}
