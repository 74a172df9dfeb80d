//! Thin wrappers around the `ffmpeg` and `ffprobe` command line tools.
//!
//! This crate provides the two decoder operations needed by a duplicate
//! scanner: probing a media file for its stream properties, and extracting
//! small single-channel thumbnails at chosen points in time. A third
//! operation produces an encoded color preview for display purposes.
//!
//! Ffmpeg and ffprobe must be installed and visible on the command line.
//! Use [`decoder_is_callable`] to check this before starting any long
//! running work.

mod error;
mod probe;
mod thumbs;

pub use error::FfmpegError;
pub use probe::{MediaInfo, StreamInfo};
pub use thumbs::{
    color_thumbnail, decoder_is_callable, gray_thumbnails, ExtractOptions, THUMB_PIXELS,
    THUMB_SIZE,
};

pub(crate) type FfmpegResult<T> = Result<T, FfmpegError>;
