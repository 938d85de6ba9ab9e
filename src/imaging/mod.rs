//! Image decoding, blending and compositing.
//!
//! Everything in here is request-scoped and free of logging; the web layer
//! decides what to report.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};

pub mod blend;
pub mod compositor;
pub mod geometry;
pub mod pipeline;
pub mod retrieval;

use retrieval::RetrievalError;

/// Channel layout of a decoded [`ImageAsset`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelFormat {
    /// Three 8-bit channels, no alpha.
    Rgb,
    /// Four 8-bit channels with straight alpha.
    Rgba,
}

/// An owned, decoded raster. Never mutated once built.
#[derive(Clone, Debug)]
pub struct ImageAsset {
    image: DynamicImage,
}

impl ImageAsset {
    /// Decodes encoded bytes (PNG or JPEG), normalising to 8-bit RGB or RGBA.
    pub fn decode(bytes: &[u8]) -> Result<Self, RetrievalError> {
        if bytes.is_empty() {
            return Err(RetrievalError::DecodeFailed("empty image payload".to_string()));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|err| RetrievalError::DecodeFailed(err.to_string()))?;
        Ok(Self::from_dynamic(image))
    }

    /// Wraps an already decoded image.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let image = if image.color().has_alpha() {
            if matches!(image, DynamicImage::ImageRgba8(_)) {
                image
            } else {
                DynamicImage::ImageRgba8(image.to_rgba8())
            }
        } else if matches!(image, DynamicImage::ImageRgb8(_)) {
            image
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };
        Self { image }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Channel layout of the pixel buffer.
    pub fn channel_format(&self) -> ChannelFormat {
        if self.image.color().has_alpha() {
            ChannelFormat::Rgba
        } else {
            ChannelFormat::Rgb
        }
    }

    /// Copies the pixels out as RGBA.
    pub fn to_rgba(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    /// The underlying decoded image.
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }
}

impl From<RgbaImage> for ImageAsset {
    fn from(image: RgbaImage) -> Self {
        Self::from_dynamic(DynamicImage::ImageRgba8(image))
    }
}

impl From<RgbImage> for ImageAsset {
    fn from(image: RgbImage) -> Self {
        Self::from_dynamic(DynamicImage::ImageRgb8(image))
    }
}

/// Encoding used for a [`CompositeResult`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// Baseline JPEG at the given quality.
    #[value(alias = "jpg")]
    Jpeg,
}

impl OutputFormat {
    /// Media type for the encoded bytes.
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Maps a sniffed `image` format onto the encodings we emit.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// Encoded output of a composite operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompositeResult {
    /// The encoded image.
    pub bytes: Vec<u8>,
    /// How `bytes` is encoded.
    pub format: OutputFormat,
}

impl CompositeResult {
    /// Media type of the payload.
    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }
}

/// A blend strength in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Opacity(f32);

impl Opacity {
    /// Fully transparent: the blend has no effect.
    pub const ZERO: Self = Self(0.0);
    /// Fully opaque: the blend result replaces the base.
    pub const FULL: Self = Self(1.0);

    /// Validates that `value` is a finite number within `[0, 1]`.
    pub fn new(value: f32) -> Result<Self, InvalidOpacity> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidOpacity(value))
        }
    }

    /// The raw factor.
    pub fn get(self) -> f32 {
        self.0
    }
}

impl FromStr for Opacity {
    type Err = InvalidOpacity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s.trim().parse().map_err(|_| InvalidOpacity(f32::NAN))?;
        Self::new(value)
    }
}

/// Returned when an opacity is outside `[0, 1]` or not a number.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvalidOpacity(pub f32);

impl fmt::Display for InvalidOpacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "opacity must be a number between 0 and 1, got {}", self.0)
    }
}

impl std::error::Error for InvalidOpacity {}

/// Identifies the format of encoded bytes, if it is one we understand.
pub fn sniff_format(bytes: &[u8]) -> Option<OutputFormat> {
    image::guess_format(bytes)
        .ok()
        .and_then(OutputFormat::from_image_format)
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut output = Vec::new();
    image.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

pub(crate) fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = image.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
    encoder.encode_image(&rgb)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    #[test]
    fn decode_normalises_channel_format() {
        let png = encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            3,
            2,
            Rgb([10, 20, 30]),
        )))
        .expect("encode rgb png");
        let asset = ImageAsset::decode(&png).expect("decode");
        assert_eq!((asset.width(), asset.height()), (3, 2));
        assert_eq!(asset.channel_format(), ChannelFormat::Rgb);

        let png = encode_png(&DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            2,
            2,
            Rgba([1, 2, 3, 128]),
        )))
        .expect("encode rgba png");
        assert_eq!(
            ImageAsset::decode(&png).expect("decode rgba").channel_format(),
            ChannelFormat::Rgba
        );

        let jpeg = encode_jpeg(&DynamicImage::ImageRgba8(RgbaImage::new(4, 4)), 90)
            .expect("encode jpeg");
        let asset = ImageAsset::decode(&jpeg).expect("decode jpeg");
        assert_eq!(asset.channel_format(), ChannelFormat::Rgb);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            ImageAsset::decode(&[]),
            Err(RetrievalError::DecodeFailed(_))
        ));
        assert!(matches!(
            ImageAsset::decode(b"definitely not a png"),
            Err(RetrievalError::DecodeFailed(_))
        ));
    }

    #[test]
    fn opacity_bounds() {
        assert!(Opacity::new(0.0).is_ok());
        assert!(Opacity::new(1.0).is_ok());
        assert!(Opacity::new(-0.1).is_err());
        assert!(Opacity::new(1.5).is_err());
        assert!(Opacity::new(f32::NAN).is_err());
        assert_eq!("0.25".parse::<Opacity>().map(Opacity::get), Ok(0.25));
        assert!("lots".parse::<Opacity>().is_err());
    }

    #[test]
    fn sniffs_encodings() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        let png = encode_png(&image).expect("png");
        let jpeg = encode_jpeg(&image, 80).expect("jpeg");
        assert_eq!(sniff_format(&png), Some(OutputFormat::Png));
        assert_eq!(sniff_format(&jpeg), Some(OutputFormat::Jpeg));
        assert_eq!(sniff_format(b"GIF89a"), None);
    }
}
