//! Getting image bytes from wherever they live.

use std::fmt;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose;
use url::Url;

use super::ImageAsset;

/// Errors raised while fetching or decoding an image.
#[derive(Debug)]
pub enum RetrievalError {
    /// The bytes could not be obtained: transport failure, non-success status
    /// or an unreadable local file.
    FetchFailed {
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        /// What went wrong.
        reason: String,
    },
    /// The bytes were obtained but are not a valid payload or image.
    DecodeFailed(String),
}

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed {
                status: Some(status),
                reason,
            } => write!(f, "Failed to fetch image (HTTP {status}): {reason}"),
            Self::FetchFailed {
                status: None,
                reason,
            } => write!(f, "Failed to fetch image: {reason}"),
            Self::DecodeFailed(reason) => write!(f, "Failed to decode image: {reason}"),
        }
    }
}

impl std::error::Error for RetrievalError {}

/// Where an image comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageSource {
    /// A remote `http` or `https` resource.
    Uri(Url),
    /// A `data:<media type>;base64,<payload>` URI.
    Inline {
        /// Declared media type, eg `image/png`. May be empty.
        media_type: String,
        /// The base64 text after the comma.
        data: String,
    },
    /// A file on local disk.
    File(PathBuf),
}

impl ImageSource {
    /// Classifies `value` as a data URI, an http(s) URI or a file path.
    pub fn parse(value: &str) -> Result<Self, RetrievalError> {
        let value = value.trim();
        if let Some(rest) = value.strip_prefix("data:") {
            let (header, data) = rest.split_once(',').ok_or_else(|| {
                RetrievalError::DecodeFailed("data URI has no payload".to_string())
            })?;
            let media_type = header.strip_suffix(";base64").ok_or_else(|| {
                RetrievalError::DecodeFailed("data URI payload is not base64".to_string())
            })?;
            return Ok(Self::Inline {
                media_type: media_type.to_string(),
                data: data.to_string(),
            });
        }

        let lowered = value.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            let url = Url::parse(value).map_err(|err| RetrievalError::FetchFailed {
                status: None,
                reason: format!("invalid URI {value}: {err}"),
            })?;
            return Ok(Self::Uri(url));
        }

        Ok(Self::File(PathBuf::from(value)))
    }

    /// True for `http(s)` and `data:` sources, false for local files.
    pub fn is_uri(&self) -> bool {
        !matches!(self, Self::File(_))
    }

    /// Builds an inline source from raw bytes.
    pub fn inline(media_type: &str, bytes: &[u8]) -> Self {
        Self::Inline {
            media_type: media_type.to_string(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Short description for error messages; never includes inline payloads.
    pub fn describe(&self) -> String {
        match self {
            Self::Uri(url) => url.to_string(),
            Self::Inline { media_type, data } => {
                format!("inline {media_type} ({} base64 chars)", data.len())
            }
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Formats bytes as a `data:` URI.
pub fn to_data_uri(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{media_type};base64,{}",
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Fetches image bytes, one attempt per call, no caching.
#[derive(Clone, Debug, Default)]
pub struct Retriever {
    client: reqwest::Client,
}

impl Retriever {
    /// Uses `client` for remote sources.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Single GET of `uri`; anything other than a 2xx is a failure.
    pub async fn fetch_bytes(&self, uri: &Url) -> Result<Vec<u8>, RetrievalError> {
        let response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .map_err(|err| RetrievalError::FetchFailed {
                status: None,
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::FetchFailed {
                status: Some(status.as_u16()),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| RetrievalError::FetchFailed {
                status: Some(status.as_u16()),
                reason: format!("failed reading body: {err}"),
            })?;
        Ok(bytes.to_vec())
    }

    /// Loads the undecoded bytes behind `source`.
    pub async fn load_bytes(&self, source: &ImageSource) -> Result<Vec<u8>, RetrievalError> {
        match source {
            ImageSource::Uri(url) => self.fetch_bytes(url).await,
            ImageSource::Inline { data, .. } => general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|err| RetrievalError::DecodeFailed(format!("invalid base64: {err}"))),
            ImageSource::File(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|err| RetrievalError::FetchFailed {
                        status: None,
                        reason: format!("{}: {err}", path.display()),
                    })
            }
        }
    }

    /// Loads and decodes `source`. Decoding runs on the blocking pool.
    pub async fn fetch_image(&self, source: &ImageSource) -> Result<ImageAsset, RetrievalError> {
        let bytes = self.load_bytes(source).await?;
        decode_blocking(bytes).await
    }
}

/// Decodes `bytes` on the blocking pool.
pub async fn decode_blocking(bytes: Vec<u8>) -> Result<ImageAsset, RetrievalError> {
    tokio::task::spawn_blocking(move || ImageAsset::decode(&bytes))
        .await
        .map_err(|err| RetrievalError::DecodeFailed(format!("decode task failed: {err}")))?
}
