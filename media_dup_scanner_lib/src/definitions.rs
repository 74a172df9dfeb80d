use std::time::Duration;

pub use ffmpeg_thumb_utils::{THUMB_PIXELS, THUMB_SIZE};

/// The default similarity threshold, in percent. Two files whose fingerprint
/// distance is within `1 - percent/100` are considered duplicates. Recommend
/// to start high (95+) and lower it only if near-duplicates are being missed,
/// as low thresholds produce many false positives.
pub const DEFAULT_SIMILARITY_PERCENT: f64 = 95.0;

/// The default tolerated difference between the durations of two videos, in
/// percent. Pairs outside this window are never compared.
pub const DEFAULT_DURATION_DIFFERENCE_PERCENT: f64 = 20.0;

/// Mean-luminance limit below which an image fingerprint is considered too
/// dark to be meaningful. Such images are permanently excluded from scans.
pub const TOO_DARK_MEAN_LIMIT: u8 = 25;

/// Pixels at or below this luminance count as "black" for the
/// ignore-black-pixels comparison mask.
pub const BLACK_PIXEL_LIMIT: u8 = 30;

/// Pixels at or above this luminance count as "white" for the
/// ignore-white-pixels comparison mask.
pub const WHITE_PIXEL_LIMIT: u8 = 225;

// Workers poll the pause flag at this granularity.
pub(crate) const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

// Progress events are throttled to one per interval (the final item always
// emits).
pub(crate) const PROGRESS_EMIT_INTERVAL: Duration = Duration::from_millis(300);

pub(crate) const CATALOG_FORMAT_VERSION: u32 = 1;
pub(crate) const CATALOG_FILE_NAME: &str = "media_dup_catalog.db";

/// File extensions treated as video files.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "asf", "avi", "divx", "f4v", "flv", "m2t", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg",
    "mpg", "mts", "ogv", "ts", "vob", "webm", "wmv",
];

/// File extensions treated as image files (considered only when
/// `include_images` is set).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "bmp", "gif", "jpeg", "jpg", "png", "tif", "tiff", "webp",
];

/// Extension-table membership test, ascii-case-insensitive.
pub(crate) fn has_extension_in(path: &std::path::Path, table: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| table.iter().any(|t| t.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_extension_membership_is_case_insensitive() {
        assert!(has_extension_in(Path::new("/a/b.MP4"), VIDEO_EXTENSIONS));
        assert!(has_extension_in(Path::new("/a/b.jpeg"), IMAGE_EXTENSIONS));
        assert!(!has_extension_in(Path::new("/a/b.txt"), VIDEO_EXTENSIONS));
        assert!(!has_extension_in(Path::new("/a/noext"), IMAGE_EXTENSIONS));
    }
}
