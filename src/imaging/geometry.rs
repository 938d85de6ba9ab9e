//! Pure size and placement calculations.
//!
//! Nothing here touches pixels, so it is all testable without images.

/// Dimensions that completely cover `target` while keeping the aspect ratio of
/// `source`. One side matches the target exactly, the other may exceed it.
pub fn cover_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = f64::from(src_w) / f64::from(src_h);
    let tgt_aspect = f64::from(tgt_w) / f64::from(tgt_h);

    if src_aspect > tgt_aspect {
        // wider: match height, overflow width
        let w = (f64::from(tgt_h) * src_aspect).round() as u32;
        (w.max(tgt_w), tgt_h)
    } else {
        let h = (f64::from(tgt_w) / src_aspect).round() as u32;
        (tgt_w, h.max(tgt_h))
    }
}

/// A rectangle inside an image, origin top-left.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CropRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width of the rectangle.
    pub width: u32,
    /// Height of the rectangle.
    pub height: u32,
}

/// The centred `target`-sized window of an image that is at least `target` big.
pub fn center_crop(covered: (u32, u32), target: (u32, u32)) -> CropRect {
    let width = target.0.min(covered.0);
    let height = target.1.min(covered.1);
    CropRect {
        x: (covered.0 - width) / 2,
        y: (covered.1 - height) / 2,
        width,
        height,
    }
}

/// Logo size for a canvas of `canvas_width`: the width is `fraction` of the
/// canvas, the height follows the logo's own aspect ratio.
pub fn logo_dimensions(canvas_width: u32, logo: (u32, u32), fraction: f32) -> (u32, u32) {
    let width = (f64::from(canvas_width) * f64::from(fraction)).round() as u32;
    let height = (f64::from(logo.1) * f64::from(width) / f64::from(logo.0)).round() as u32;
    (width, height)
}

/// Where a logo sits on the canvas.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogoPosition {
    /// Against the top and left edges.
    TopLeft,
    /// Against the top and right edges.
    TopRight,
    /// Against the bottom and left edges.
    BottomLeft,
    /// Against the bottom and right edges.
    BottomRight,
    /// Centred on both axes; used for anything unrecognised.
    #[default]
    Center,
}

impl LogoPosition {
    /// Parses names like `top-left`, `bottom_right` or `Top Right`.
    /// Unknown names fall back to [`LogoPosition::Center`].
    pub fn parse_lenient(value: &str) -> Self {
        let normalised: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalised.as_str() {
            "topleft" => Self::TopLeft,
            "topright" => Self::TopRight,
            "bottomleft" => Self::BottomLeft,
            "bottomright" => Self::BottomRight,
            _ => Self::Center,
        }
    }

    /// Top-left offset of a `logo`-sized box on a `canvas`-sized image.
    ///
    /// Offsets may be negative when the logo plus padding does not fit.
    pub fn offset(self, canvas: (u32, u32), logo: (u32, u32), padding: u32) -> (i64, i64) {
        let (canvas_w, canvas_h) = (i64::from(canvas.0), i64::from(canvas.1));
        let (logo_w, logo_h) = (i64::from(logo.0), i64::from(logo.1));
        let padding = i64::from(padding);

        let right = canvas_w - logo_w - padding;
        let bottom = canvas_h - logo_h - padding;
        match self {
            Self::TopLeft => (padding, padding),
            Self::TopRight => (right, padding),
            Self::BottomLeft => (padding, bottom),
            Self::BottomRight => (right, bottom),
            Self::Center => (
                (canvas_w - logo_w).div_euclid(2),
                (canvas_h - logo_h).div_euclid(2),
            ),
        }
    }
}
