//! Shared constants/defaults for things
//!

use std::time::Duration;

/// Logo width as a fraction of the base image width.
pub const DEFAULT_LOGO_SIZE_FRACTION: f32 = 0.2;

/// Gap in pixels between a corner-placed logo and the canvas edges.
pub const DEFAULT_LOGO_PADDING: u32 = 20;

/// Logo opacity when a request doesn't set one.
pub const DEFAULT_LOGO_OPACITY: f32 = 0.8;

/// JPEG quality for logo composites, and for grain output when JPEG is configured.
pub const JPEG_QUALITY: u8 = 90;

/// Maximum accepted request body, inline images included.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Default port, matching the service this replaces.
pub const DEFAULT_PORT: &str = "3005";

/// Replicate REST API root.
pub const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-1.1-pro-ultra";

/// Delay between prediction status polls.
pub const PREDICTION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls before a prediction that is still running is given up on.
pub const PREDICTION_MAX_POLLS: u32 = 120;

/// The `style` value that switches the film grain on.
pub const FILM_STYLE: &str = "film";
