//! Per-channel blend arithmetic.
//!
//! Channel values are normalised to `[0, 1]` before blending. `a` is always the
//! base (backdrop) channel and `b` the layer being applied on top of it.

use image::{Rgba, RgbaImage};

use super::Opacity;

/// How a layer's colour combines with the base underneath it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum BlendMode {
    /// Multiply the darks, screen the lights, keyed on the base channel.
    Overlay,
    /// A gentler overlay (W3C compositing formula).
    #[value(alias = "softlight")]
    SoftLight,
    /// Plain source-over: the layer replaces the base.
    #[value(alias = "over")]
    Normal,
}

impl BlendMode {
    /// Blends normalised channel `b` onto `a`.
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Overlay => {
                if a < 0.5 {
                    2.0 * a * b
                } else {
                    1.0 - 2.0 * (1.0 - a) * (1.0 - b)
                }
            }
            Self::SoftLight => {
                if b <= 0.5 {
                    a - (1.0 - 2.0 * b) * a * (1.0 - a)
                } else {
                    let d = if a <= 0.25 {
                        ((16.0 * a - 12.0) * a + 4.0) * a
                    } else {
                        a.sqrt()
                    };
                    a + (2.0 * b - 1.0) * (d - a)
                }
            }
            Self::Normal => b,
        }
    }
}

fn normalise(value: u8) -> f32 {
    f32::from(value) / 255.0
}

fn quantise(value: f32) -> u8 {
    // clamped first, so the cast cannot truncate
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blends one pixel. The layer's own alpha scales `opacity`; the base alpha is kept.
pub fn blend_pixel(mode: BlendMode, base: Rgba<u8>, layer: Rgba<u8>, opacity: Opacity) -> Rgba<u8> {
    let strength = opacity.get() * normalise(layer[3]);
    let mut out = base;
    for channel in 0..3 {
        let a = normalise(base[channel]);
        let blended = mode.apply(a, normalise(layer[channel]));
        out[channel] = quantise(a + (blended - a) * strength);
    }
    out
}

/// Blends `layer` over `base` pixel for pixel into a fresh buffer.
///
/// Returns `None` when the two buffers differ in size.
pub fn blend_layer(
    base: &RgbaImage,
    layer: &RgbaImage,
    mode: BlendMode,
    opacity: Opacity,
) -> Option<RgbaImage> {
    if base.dimensions() != layer.dimensions() {
        return None;
    }
    let mut output = base.clone();
    for (out, source) in output.pixels_mut().zip(layer.pixels()) {
        *out = blend_pixel(mode, *out, *source, opacity);
    }
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-6
    }

    #[test]
    fn overlay_formula_branches_on_base() {
        assert!(close(BlendMode::Overlay.apply(0.25, 0.5), 0.25));
        assert!(close(BlendMode::Overlay.apply(0.25, 1.0), 0.5));
        assert!(close(BlendMode::Overlay.apply(0.75, 0.5), 0.75));
        assert!(close(BlendMode::Overlay.apply(0.75, 0.0), 0.5));
        assert!(close(BlendMode::Overlay.apply(0.0, 1.0), 0.0));
        assert!(close(BlendMode::Overlay.apply(1.0, 0.0), 1.0));
    }

    #[test]
    fn soft_light_is_neutral_at_mid_grey() {
        for a in [0.0, 0.1, 0.3, 0.5, 0.9, 1.0] {
            assert!(close(BlendMode::SoftLight.apply(a, 0.5), a), "a = {a}");
        }
        // darkening and lightening branches
        assert!(close(BlendMode::SoftLight.apply(0.5, 0.0), 0.25));
        assert!(close(BlendMode::SoftLight.apply(0.25, 1.0), 0.5));
        assert!(close(BlendMode::SoftLight.apply(0.2, 1.0), 0.2 + (((16.0 * 0.2 - 12.0) * 0.2 + 4.0) * 0.2 - 0.2)));
    }

    #[test]
    fn normal_takes_the_layer() {
        assert!(close(BlendMode::Normal.apply(0.1, 0.8), 0.8));
    }

    #[test]
    fn zero_opacity_leaves_base_untouched() {
        let base = Rgba([12, 128, 250, 255]);
        let layer = Rgba([255, 0, 33, 255]);
        for mode in [BlendMode::Overlay, BlendMode::SoftLight, BlendMode::Normal] {
            assert_eq!(blend_pixel(mode, base, layer, Opacity::ZERO), base);
        }
    }

    #[test]
    fn transparent_layer_pixels_are_ignored() {
        let base = Rgba([40, 80, 120, 200]);
        let layer = Rgba([255, 255, 255, 0]);
        assert_eq!(blend_pixel(BlendMode::Normal, base, layer, Opacity::FULL), base);
    }

    #[test]
    fn half_opacity_interpolates() {
        let base = Rgba([0, 0, 0, 255]);
        let layer = Rgba([200, 100, 50, 255]);
        let out = blend_pixel(BlendMode::Normal, base, layer, Opacity::new(0.5).expect("opacity"));
        assert_eq!(out, Rgba([100, 50, 25, 255]));
    }

    #[test]
    fn layer_size_must_match() {
        let base = RgbaImage::new(4, 4);
        let layer = RgbaImage::new(4, 3);
        assert!(blend_layer(&base, &layer, BlendMode::Overlay, Opacity::FULL).is_none());
        assert!(blend_layer(&base, &RgbaImage::new(4, 4), BlendMode::Overlay, Opacity::FULL).is_some());
    }
}
