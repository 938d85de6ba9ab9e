//! Byte-level entry points used by the web layer.
//!
//! Decoding, resizing, blending and encoding are CPU bound, so they run on the
//! blocking pool and a slow request never stalls the async workers.

use std::fmt;
use std::sync::Arc;

use super::compositor::{CompositeError, Compositor, LogoSettings, apply_logo};
use super::retrieval::{ImageSource, RetrievalError, Retriever, decode_blocking};
use super::{CompositeResult, ImageAsset};

/// The stage a composite request failed in.
#[derive(Debug)]
pub enum PipelineError {
    /// Fetching or decoding an input failed.
    Retrieval(RetrievalError),
    /// Compositing or encoding failed.
    Composite(CompositeError),
    /// The blocking worker panicked or was cancelled.
    Worker(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retrieval(err) => err.fmt(f),
            Self::Composite(err) => err.fmt(f),
            Self::Worker(reason) => write!(f, "Image worker failed: {reason}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<RetrievalError> for PipelineError {
    fn from(err: RetrievalError) -> Self {
        PipelineError::Retrieval(err)
    }
}

impl From<CompositeError> for PipelineError {
    fn from(err: CompositeError) -> Self {
        PipelineError::Composite(err)
    }
}

async fn run_blocking<F>(work: F) -> Result<CompositeResult, PipelineError>
where
    F: FnOnce() -> Result<CompositeResult, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| PipelineError::Worker(err.to_string()))?
}

/// Retrieval plus compositing, shared by all requests.
#[derive(Clone, Debug)]
pub struct Pipeline {
    retriever: Retriever,
    compositor: Arc<Compositor>,
}

impl Pipeline {
    /// Wraps a ready compositor; its grain texture is already loaded.
    pub fn new(retriever: Retriever, compositor: Compositor) -> Self {
        Self {
            retriever,
            compositor: Arc::new(compositor),
        }
    }

    /// Loads the grain texture once, before any request can ask for it.
    pub async fn load_grain(
        retriever: &Retriever,
        source: &ImageSource,
    ) -> Result<Arc<ImageAsset>, RetrievalError> {
        retriever.fetch_image(source).await.map(Arc::new)
    }

    /// The retriever used for logos and generated images.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// The grain compositor.
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Decodes `base` and applies the configured grain.
    pub async fn apply_grain(&self, base: Vec<u8>) -> Result<CompositeResult, PipelineError> {
        let compositor = Arc::clone(&self.compositor);
        run_blocking(move || {
            let base = ImageAsset::decode(&base)?;
            Ok(compositor.apply_grain(&base)?)
        })
        .await
    }

    /// Decodes `base`, then fetches the logo from `logo` and places it on it.
    pub async fn apply_logo(
        &self,
        base: Vec<u8>,
        logo: &ImageSource,
        settings: LogoSettings,
    ) -> Result<CompositeResult, PipelineError> {
        let base = decode_blocking(base).await?;
        self.apply_logo_to(base, logo, settings).await
    }

    /// Fetches the logo from `logo` and places it on an already decoded `base`.
    pub async fn apply_logo_to(
        &self,
        base: ImageAsset,
        logo: &ImageSource,
        settings: LogoSettings,
    ) -> Result<CompositeResult, PipelineError> {
        let logo = self.retriever.load_bytes(logo).await?;
        run_blocking(move || {
            let logo = ImageAsset::decode(&logo)?;
            Ok(apply_logo(&base, &logo, &settings)?)
        })
        .await
    }
}
