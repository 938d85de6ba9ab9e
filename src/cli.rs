//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;

use crate::constants::{DEFAULT_MODEL, DEFAULT_PORT, REPLICATE_API_BASE};
use crate::generate::GenerationOptions;
use crate::imaging::blend::BlendMode;
use crate::imaging::compositor::GrainSettings;
use crate::imaging::{Opacity, OutputFormat};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "GRAINBOOTH_DEBUG")]
    /// Enable debug logging. Env: GRAINBOOTH_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = DEFAULT_PORT, env = "GRAINBOOTH_PORT")]
    /// http listener, defaults to `3005`.
    /// Env: GRAINBOOTH_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "GRAINBOOTH_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: GRAINBOOTH_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    /// Replicate API token. Env: REPLICATE_API_TOKEN
    pub replicate_api_token: String,
    #[clap(long, default_value = REPLICATE_API_BASE, env = "GRAINBOOTH_REPLICATE_API_BASE")]
    /// Replicate REST root. Env: GRAINBOOTH_REPLICATE_API_BASE
    pub replicate_api_base: String,
    #[clap(long, default_value = DEFAULT_MODEL, env = "GRAINBOOTH_MODEL")]
    /// Model to run, as `owner/name`. Env: GRAINBOOTH_MODEL
    pub model: String,
    #[clap(long, default_value = "3:2", env = "GRAINBOOTH_ASPECT_RATIO")]
    /// Aspect ratio requested from the model. Env: GRAINBOOTH_ASPECT_RATIO
    pub aspect_ratio: String,
    #[clap(long, default_value = "jpg", env = "GRAINBOOTH_GENERATION_FORMAT")]
    /// Format the model should produce, `jpg` or `png`.
    /// Env: GRAINBOOTH_GENERATION_FORMAT
    pub generation_format: String,
    #[clap(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=6), env = "GRAINBOOTH_SAFETY_TOLERANCE")]
    /// 1 (strict) to 6 (permissive). Env: GRAINBOOTH_SAFETY_TOLERANCE
    pub safety_tolerance: u8,
    #[clap(long, default_value_t = 0.1, env = "GRAINBOOTH_IMAGE_PROMPT_STRENGTH")]
    /// Image prompt weight. Env: GRAINBOOTH_IMAGE_PROMPT_STRENGTH
    pub image_prompt_strength: f64,
    #[clap(long, env = "GRAINBOOTH_RAW")]
    /// Ask for less processed, more natural images. Env: GRAINBOOTH_RAW
    pub raw: bool,

    #[clap(long, default_value = "./assets/grain.png", env = "GRAINBOOTH_GRAIN_TEXTURE")]
    /// Grain texture: a file path, an http(s) URI or a data URI.
    /// Env: GRAINBOOTH_GRAIN_TEXTURE
    pub grain_texture: String,
    #[clap(long, value_enum, default_value = "overlay", env = "GRAINBOOTH_GRAIN_BLEND")]
    /// Blend mode for the grain. Env: GRAINBOOTH_GRAIN_BLEND
    pub grain_blend: BlendMode,
    #[clap(long, env = "GRAINBOOTH_GRAIN_OPACITY")]
    /// Grain strength between 0 and 1; there is no default.
    /// Env: GRAINBOOTH_GRAIN_OPACITY
    pub grain_opacity: Opacity,
    #[clap(long, value_enum, default_value = "png", env = "GRAINBOOTH_GRAIN_FORMAT")]
    /// Encoding of grain output. Env: GRAINBOOTH_GRAIN_FORMAT
    pub grain_format: OutputFormat,
}

impl CliOptions {
    /// Grain compositing settings from the flags.
    pub fn grain_settings(&self) -> GrainSettings {
        GrainSettings {
            blend_mode: self.grain_blend,
            opacity: self.grain_opacity,
            format: self.grain_format,
        }
    }

    /// Provider parameters from the flags.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            raw: self.raw,
            aspect_ratio: self.aspect_ratio.clone(),
            output_format: self.generation_format.clone(),
            safety_tolerance: self.safety_tolerance,
            image_prompt_strength: self.image_prompt_strength,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: [&str; 2] = ["--replicate-api-token", "r8_test"];

    #[test]
    fn grain_opacity_is_required() {
        let result = CliOptions::try_parse_from(["grainbooth", TOKEN[0], TOKEN[1]]);
        assert!(result.is_err());
    }

    #[test]
    fn defaults() {
        let cli = CliOptions::try_parse_from([
            "grainbooth",
            TOKEN[0],
            TOKEN[1],
            "--grain-opacity",
            "0.5",
        ])
        .expect("parse");
        assert_eq!(cli.port.get(), 3005);
        assert_eq!(cli.listen_address, "127.0.0.1");

        let grain = cli.grain_settings();
        assert_eq!(grain.blend_mode, BlendMode::Overlay);
        assert_eq!(grain.format, OutputFormat::Png);
        assert!((grain.opacity.get() - 0.5).abs() < f32::EPSILON);

        let generation = cli.generation_options();
        assert_eq!(generation.model, DEFAULT_MODEL);
        assert_eq!(generation.aspect_ratio, "3:2");
        assert_eq!(generation.output_format, "jpg");
        assert_eq!(generation.safety_tolerance, 2);
        assert!(!generation.raw);
    }

    #[test]
    fn blend_and_format_aliases() {
        let cli = CliOptions::try_parse_from([
            "grainbooth",
            TOKEN[0],
            TOKEN[1],
            "--grain-opacity",
            "0.1",
            "--grain-blend",
            "soft-light",
            "--grain-format",
            "jpg",
        ])
        .expect("parse");
        assert_eq!(cli.grain_blend, BlendMode::SoftLight);
        assert_eq!(cli.grain_format, OutputFormat::Jpeg);

        let cli = CliOptions::try_parse_from([
            "grainbooth",
            TOKEN[0],
            TOKEN[1],
            "--grain-opacity",
            "1",
            "--grain-blend",
            "over",
        ])
        .expect("parse");
        assert_eq!(cli.grain_blend, BlendMode::Normal);
    }

    #[test]
    fn out_of_range_opacity_is_rejected() {
        let result = CliOptions::try_parse_from([
            "grainbooth",
            TOKEN[0],
            TOKEN[1],
            "--grain-opacity",
            "1.5",
        ]);
        assert!(result.is_err());
    }
}
