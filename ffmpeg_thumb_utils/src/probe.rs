use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::thumbs::run_probe_command;
use crate::{FfmpegError, FfmpegResult};

/// Width and height of a single stream, in pixels.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize, Default)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
}

/// Media properties obtained with ffprobe.
///
/// For videos every field is populated (insofar as ffprobe reports it).
/// Image files constructed elsewhere carry only a single stream entry with
/// the picture dimensions.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize, Default)]
pub struct MediaInfo {
    /// Total duration in seconds. Zero if ffprobe did not report one.
    pub duration_secs: f64,
    /// Average framerate of the first video stream.
    pub fps: f32,
    /// Overall bitrate in kilobits per second.
    pub bitrate_kbps: u32,
    /// Sample rate of the first audio stream, in Hz. Zero if there is no
    /// audio stream.
    pub audio_sample_rate: u32,
    /// One entry per video stream.
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// Use ffprobe to get the properties of a media file.
    ///
    /// # Errors
    /// * The file cannot be read or is not recognized by ffprobe.
    /// * The output from ffprobe could not be parsed as JSON.
    /// * The file contains no video stream, or a stream with zero dimensions.
    pub fn probe<P>(src_path: P) -> FfmpegResult<Self>
    where
        P: AsRef<Path>,
    {
        let stats_string = run_probe_command(src_path.as_ref())?;
        let stats_parsed: Value = serde_json::from_str(&stats_string)?;

        Self::from_probe_json(&stats_parsed)
    }

    /// Largest video frame area over all streams, in pixels.
    pub fn frame_area(&self) -> u64 {
        self.streams
            .iter()
            .map(|s| u64::from(s.width) * u64::from(s.height))
            .max()
            .unwrap_or(0)
    }

    fn from_probe_json(stats_parsed: &Value) -> FfmpegResult<Self> {
        let duration_secs = match &stats_parsed["format"]["duration"] {
            Value::String(d) => d.parse::<f64>()?,
            _ => 0.0,
        };

        let bitrate_kbps = match &stats_parsed["format"]["bit_rate"] {
            Value::String(b) => (b.parse::<u64>()? / 1000) as u32,
            _ => 0,
        };

        let video_streams =
            streams_of_type(stats_parsed, "video").ok_or(FfmpegError::NoVideoStream)?;
        if video_streams.is_empty() {
            return Err(FfmpegError::NoVideoStream);
        }

        let fps = video_streams
            .first()
            .and_then(|s| fps_of_stream(s))
            .unwrap_or(0.0);

        let audio_sample_rate = streams_of_type(stats_parsed, "audio")
            .unwrap_or_default()
            .first()
            .and_then(|s| match &s["sample_rate"] {
                Value::String(sr) => sr.parse::<u32>().ok(),
                _ => None,
            })
            .unwrap_or(0);

        // If the metadata declares that a stream is rotated then ffmpeg will
        // autorotate each decoded frame, but the raw width/height fields
        // still describe the unrotated picture. Swap the axes for 90/270.
        let streams = video_streams
            .iter()
            .map(|s| {
                let width = field_u32(s, "width");
                let height = field_u32(s, "height");
                if rotation_swaps_axes(s) {
                    StreamInfo {
                        width: height,
                        height: width,
                    }
                } else {
                    StreamInfo { width, height }
                }
            })
            .collect::<Vec<_>>();

        if streams.iter().all(|s| s.width == 0 || s.height == 0) {
            return Err(FfmpegError::NoVideoStream);
        }

        Ok(MediaInfo {
            duration_secs,
            fps,
            bitrate_kbps,
            audio_sample_rate,
            streams,
        })
    }
}

fn streams_of_type<'a>(stats_parsed: &'a Value, stream_type: &str) -> Option<Vec<&'a Value>> {
    if let Value::Array(streams) = &stats_parsed["streams"] {
        let ret = streams
            .iter()
            .filter(|s| match &s["codec_type"] {
                Value::String(codec_type) => codec_type == stream_type,
                _ => false,
            })
            .collect();

        Some(ret)
    } else {
        None
    }
}

fn field_u32(stream: &Value, field_name: &str) -> u32 {
    match &stream[field_name] {
        Value::Number(v) => v.as_u64().unwrap_or(0) as u32,
        _ => 0,
    }
}

//ffprobe reports framerates as integer fractions, e.g "30000/1001".
fn fps_of_stream(stream: &Value) -> Option<f32> {
    let raw = match &stream["avg_frame_rate"] {
        Value::String(s) if s != "0/0" => s.as_str(),
        _ => match &stream["r_frame_rate"] {
            Value::String(s) => s.as_str(),
            _ => return None,
        },
    };

    let (num, den) = raw.split_once('/')?;
    let num = num.trim().parse::<f32>().ok()?;
    let den = den.trim().parse::<f32>().ok()?;
    if den == 0.0 {
        return None;
    }

    Some(num / den)
}

fn rotation_swaps_axes(stream: &Value) -> bool {
    let rotation = stream
        .get("side_data_list")
        .and_then(|side_data| side_data.get(0))
        .and_then(|entry| entry.get("rotation"));

    //the rotation may be either a JSON string or a JSON number, so unify
    let rotation = match rotation {
        Some(Value::Number(val)) => val.as_i64(),
        Some(Value::String(val)) => val.parse::<i64>().ok(),
        _ => None,
    };

    match rotation {
        Some(90) | Some(-270) | Some(-90) | Some(270) => true,
        Some(other) if other.rem_euclid(180) != 0 => {
            warn!("unexpected rotation value from ffprobe: {other}");
            false
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn probe_json(streams: Value, format: Value) -> Value {
        json!({ "streams": streams, "format": format })
    }

    #[test]
    fn test_parse_typical_video() {
        let parsed = probe_json(
            json!([
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30000/1001"},
                {"codec_type": "audio", "sample_rate": "44100"}
            ]),
            json!({"duration": "63.5", "bit_rate": "2500000"}),
        );

        let info = MediaInfo::from_probe_json(&parsed).unwrap();
        assert_eq!(info.duration_secs, 63.5);
        assert_eq!(info.bitrate_kbps, 2500);
        assert_eq!(info.audio_sample_rate, 44100);
        assert_eq!(info.streams, vec![StreamInfo { width: 1920, height: 1080 }]);
        assert!((info.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_rotated_video_swaps_axes() {
        let parsed = probe_json(
            json!([
                {"codec_type": "video", "width": 1920, "height": 1080,
                 "avg_frame_rate": "25/1",
                 "side_data_list": [{"rotation": -90}]}
            ]),
            json!({"duration": "10.0"}),
        );

        let info = MediaInfo::from_probe_json(&parsed).unwrap();
        assert_eq!(info.streams, vec![StreamInfo { width: 1080, height: 1920 }]);
    }

    #[test]
    fn test_audio_only_file_is_rejected() {
        let parsed = probe_json(
            json!([{"codec_type": "audio", "sample_rate": "48000"}]),
            json!({"duration": "180.0"}),
        );

        assert!(matches!(
            MediaInfo::from_probe_json(&parsed),
            Err(FfmpegError::NoVideoStream)
        ));
    }

    #[test]
    fn test_missing_duration_defaults_to_zero() {
        let parsed = probe_json(
            json!([{"codec_type": "video", "width": 640, "height": 480, "avg_frame_rate": "25/1"}]),
            json!({}),
        );

        let info = MediaInfo::from_probe_json(&parsed).unwrap();
        assert_eq!(info.duration_secs, 0.0);
        assert_eq!(info.bitrate_kbps, 0);
    }
}
