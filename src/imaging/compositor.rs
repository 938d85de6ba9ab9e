//! Grain and logo compositing.
//!
//! Both operations work on private copies of their inputs and return freshly
//! encoded bytes, so they can run concurrently for independent requests.

use std::fmt;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use super::blend::{BlendMode, blend_layer};
use super::geometry::{LogoPosition, center_crop, cover_dimensions, logo_dimensions};
use super::{
    ChannelFormat, CompositeResult, ImageAsset, Opacity, OutputFormat, encode_jpeg, encode_png,
};
use crate::constants::{
    DEFAULT_LOGO_OPACITY, DEFAULT_LOGO_PADDING, DEFAULT_LOGO_SIZE_FRACTION, JPEG_QUALITY,
};

const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Errors raised while compositing.
#[derive(Debug, Eq, PartialEq)]
pub enum CompositeError {
    /// An input or computed size has a zero side, or a logo would not fit
    /// on its canvas.
    InvalidDimensions {
        /// Offending width.
        width: u32,
        /// Offending height.
        height: u32,
    },
    /// The result could not be encoded.
    EncodeFailed(String),
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { width, height } => {
                write!(f, "Invalid image dimensions {width}x{height}")
            }
            Self::EncodeFailed(reason) => write!(f, "Failed to encode image: {reason}"),
        }
    }
}

impl std::error::Error for CompositeError {}

impl From<image::ImageError> for CompositeError {
    fn from(err: image::ImageError) -> Self {
        CompositeError::EncodeFailed(err.to_string())
    }
}

/// How the grain texture is applied. No `Default`: callers always pick the opacity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrainSettings {
    /// Blend formula.
    pub blend_mode: BlendMode,
    /// Strength of the blend.
    pub opacity: Opacity,
    /// Output encoding.
    pub format: OutputFormat,
}

/// Logo size and placement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogoSettings {
    /// Anchor on the canvas.
    pub position: LogoPosition,
    /// Logo width as a fraction of the canvas width.
    pub size_fraction: f32,
    /// Distance from the edges for corner positions.
    pub padding: u32,
    /// Applied on top of the logo's own alpha.
    pub opacity: Opacity,
}

impl Default for LogoSettings {
    fn default() -> Self {
        Self {
            position: LogoPosition::Center,
            size_fraction: DEFAULT_LOGO_SIZE_FRACTION,
            padding: DEFAULT_LOGO_PADDING,
            opacity: Opacity(DEFAULT_LOGO_OPACITY),
        }
    }
}

/// Computed logo box on the canvas.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LogoPlacement {
    /// Left edge; negative when the logo overhangs.
    pub x: i64,
    /// Top edge; negative when the logo overhangs.
    pub y: i64,
    /// Resized logo width.
    pub width: u32,
    /// Resized logo height.
    pub height: u32,
}

fn ensure_dimensions(width: u32, height: u32) -> Result<(), CompositeError> {
    if width == 0 || height == 0 {
        return Err(CompositeError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Resizes `texture` to exactly `width`x`height`, scaling to cover and then
/// cropping the centre so the texture is never distorted.
pub fn cover_fit(texture: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if texture.dimensions() == (width, height) {
        return texture.clone();
    }
    let covered = cover_dimensions(texture.dimensions(), (width, height));
    let resized = imageops::resize(texture, covered.0, covered.1, RESIZE_FILTER);
    let crop = center_crop(covered, (width, height));
    imageops::crop_imm(&resized, crop.x, crop.y, crop.width, crop.height).to_image()
}

fn encode(
    pixels: RgbaImage,
    channels: ChannelFormat,
    format: OutputFormat,
) -> Result<CompositeResult, CompositeError> {
    let image = match channels {
        ChannelFormat::Rgba => DynamicImage::ImageRgba8(pixels),
        ChannelFormat::Rgb => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(pixels).to_rgb8()),
    };
    let bytes = match format {
        OutputFormat::Png => encode_png(&image)?,
        OutputFormat::Jpeg => encode_jpeg(&image, JPEG_QUALITY)?,
    };
    Ok(CompositeResult { bytes, format })
}

/// Holds the process-wide grain texture and how to apply it.
#[derive(Clone, Debug)]
pub struct Compositor {
    grain: Arc<ImageAsset>,
    settings: GrainSettings,
}

impl Compositor {
    /// `grain` must already be loaded; it is only ever read from here on.
    pub fn new(grain: Arc<ImageAsset>, settings: GrainSettings) -> Self {
        Self { grain, settings }
    }

    /// The configured grain settings.
    pub fn settings(&self) -> &GrainSettings {
        &self.settings
    }

    /// The shared grain texture.
    pub fn grain(&self) -> &ImageAsset {
        &self.grain
    }

    /// Blends the grain texture over `base`, keeping the canvas size.
    pub fn apply_grain(&self, base: &ImageAsset) -> Result<CompositeResult, CompositeError> {
        ensure_dimensions(base.width(), base.height())?;
        ensure_dimensions(self.grain.width(), self.grain.height())?;

        let texture = cover_fit(&self.grain.to_rgba(), base.width(), base.height());
        let blended = blend_layer(
            &base.to_rgba(),
            &texture,
            self.settings.blend_mode,
            self.settings.opacity,
        )
        .ok_or(CompositeError::InvalidDimensions {
            width: texture.width(),
            height: texture.height(),
        })?;

        encode(blended, base.channel_format(), self.settings.format)
    }
}

/// Works out the resized logo box for a `canvas`-sized base image.
pub fn plan_logo(
    canvas: (u32, u32),
    logo: (u32, u32),
    settings: &LogoSettings,
) -> Result<LogoPlacement, CompositeError> {
    ensure_dimensions(canvas.0, canvas.1)?;
    ensure_dimensions(logo.0, logo.1)?;
    let (width, height) = logo_dimensions(canvas.0, logo, settings.size_fraction);
    ensure_dimensions(width, height)?;
    // checked before anything is resized
    if width > canvas.0 || height > canvas.1 {
        return Err(CompositeError::InvalidDimensions { width, height });
    }
    let (x, y) = settings
        .position
        .offset(canvas, (width, height), settings.padding);
    Ok(LogoPlacement {
        x,
        y,
        width,
        height,
    })
}

/// Places `logo` on `base` with source-over blending, returning a JPEG.
pub fn apply_logo(
    base: &ImageAsset,
    logo: &ImageAsset,
    settings: &LogoSettings,
) -> Result<CompositeResult, CompositeError> {
    let placement = plan_logo(
        (base.width(), base.height()),
        (logo.width(), logo.height()),
        settings,
    )?;

    let mut mark = imageops::resize(
        &logo.to_rgba(),
        placement.width,
        placement.height,
        RESIZE_FILTER,
    );
    let opacity = settings.opacity.get();
    for pixel in mark.pixels_mut() {
        pixel[3] = (f32::from(pixel[3]) * opacity).round().clamp(0.0, 255.0) as u8;
    }

    let mut canvas = base.to_rgba();
    imageops::overlay(&mut canvas, &mark, placement.x, placement.y);

    encode(canvas, ChannelFormat::Rgb, OutputFormat::Jpeg)
}
