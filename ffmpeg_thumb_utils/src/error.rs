use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Various causes of failure for ffmpeg/ffprobe operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum FfmpegError {
    /// The ffmpeg/ffprobe command was not found. Make sure ffmpeg is installed
    /// and can be found on the command line.
    #[error("ffmpeg/ffprobe not found. Make sure ffmpeg/ffprobe are installed and visible on the command line")]
    FfmpegNotFound,

    /// Io error occurred while executing an ffmpeg/ffprobe command.
    #[error("ffmpeg IO error: {0}")]
    Io(String),

    /// Ffmpeg/ffprobe returned a nonzero exit code. Ffmpeg sometimes prints
    /// very long error strings to stderr, so the message is truncated to the
    /// first few hundred characters.
    #[error("internal ffmpeg failure: {0}")]
    FfmpegInternal(String),

    /// Failed to interpret ffmpeg/ffprobe output as utf8.
    #[error("utf8 parsing/conversion failure")]
    Utf8Conversion,

    /// Ffprobe output could not be parsed into media properties.
    #[error("error parsing probe output: {0}")]
    ProbeParse(String),

    /// The probed file has no video stream, or a stream with a zero
    /// dimension. Sometimes occurs when decoding frames from an audio file.
    #[error("no usable video stream in file")]
    NoVideoStream,

    /// Ffmpeg exited successfully but produced no frame (or a short frame)
    /// for a requested position.
    #[error("ffmpeg produced no frame at position {0}")]
    NoFrame(f64),
}

impl From<serde_json::Error> for FfmpegError {
    fn from(e: serde_json::Error) -> Self {
        // limit maximum number of characters
        let error_string = format!("{e}").chars().take(500).collect::<String>();
        FfmpegError::ProbeParse(error_string)
    }
}

impl From<std::num::ParseIntError> for FfmpegError {
    fn from(e: std::num::ParseIntError) -> Self {
        FfmpegError::ProbeParse(format!("{e}"))
    }
}

impl From<std::num::ParseFloatError> for FfmpegError {
    fn from(e: std::num::ParseFloatError) -> Self {
        FfmpegError::ProbeParse(format!("{e}"))
    }
}
