use std::path::Path;
use std::sync::Arc;

use log::warn;

use ffmpeg_thumb_utils::{ExtractOptions, FfmpegError, MediaInfo};

use crate::settings::ScanSettings;

/// The decoder seam: everything the scan engine needs from an external
/// media decoder.
///
/// Implementations are invoked concurrently from worker threads and must be
/// reentrant. A call already in flight is never interrupted by
/// pause/cancel; workers observe those signals between calls.
pub trait Thumbnailer: Send + Sync {
    /// Obtain stream properties for a media file.
    fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError>;

    /// One 16×16 grayscale thumbnail (256 luma bytes, row-major) per entry
    /// of `fractions`, each a fraction of `duration_secs` in `[0, 1]`.
    /// Failure of any position fails the whole call.
    fn gray_thumbnails(
        &self,
        path: &Path,
        fractions: &[f64],
        duration_secs: f64,
    ) -> Result<Vec<Vec<u8>>, FfmpegError>;

    /// An encoded color frame at `timestamp_secs`, for display only.
    fn color_thumbnail(&self, path: &Path, timestamp_secs: f64) -> Result<Vec<u8>, FfmpegError>;
}

/// [`Thumbnailer`] backed by ffmpeg/ffprobe subprocess invocations.
#[derive(Debug, Default, Clone)]
pub struct FfmpegThumbnailer {
    opts: ExtractOptions,
}

impl FfmpegThumbnailer {
    pub fn from_settings(settings: &ScanSettings) -> Self {
        Self {
            opts: ExtractOptions {
                hw_accel: settings.hardware_acceleration_mode.clone(),
                custom_args: settings.custom_ff_arguments.clone(),
                verbose: settings.extended_fftools_logging,
            },
        }
    }

    /// Whether ffmpeg and ffprobe can be executed at all.
    pub fn available() -> bool {
        ffmpeg_thumb_utils::decoder_is_callable()
    }
}

impl Thumbnailer for FfmpegThumbnailer {
    fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError> {
        MediaInfo::probe(path)
    }

    fn gray_thumbnails(
        &self,
        path: &Path,
        fractions: &[f64],
        duration_secs: f64,
    ) -> Result<Vec<Vec<u8>>, FfmpegError> {
        let thumbs =
            ffmpeg_thumb_utils::gray_thumbnails(path, fractions, duration_secs, &self.opts)?;

        Ok(thumbs.into_iter().map(|img| img.into_raw()).collect())
    }

    fn color_thumbnail(&self, path: &Path, timestamp_secs: f64) -> Result<Vec<u8>, FfmpegError> {
        ffmpeg_thumb_utils::color_thumbnail(path, timestamp_secs, &self.opts)
    }
}

/// Pick the decoder backend for the given settings. Only the subprocess
/// backend is compiled in; asking for a native binding falls back with a
/// warning.
pub(crate) fn backend_for(settings: &ScanSettings) -> Arc<dyn Thumbnailer> {
    if settings.use_native_binding {
        warn!(target: "scan", "no native decoder binding is compiled in; using the ffmpeg command line backend");
    }

    Arc::new(FfmpegThumbnailer::from_settings(settings))
}
