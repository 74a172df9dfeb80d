use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

use ffmpeg_thumb_utils::MediaInfo;

use crate::definitions::{has_extension_in, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::settings::{PositionKey, PositionSetting};

/// Per-record condition flags, persisted across scans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFlags {
    /// Excluded by the user. Permanent until unset.
    pub manually_excluded: bool,
    /// Image fingerprint had too little brightness to compare. Permanent.
    pub too_dark: bool,
    /// The metadata probe failed. Cleared on retry.
    pub metadata_error: bool,
    /// Thumbnail extraction failed. Cleared on retry.
    pub thumbnail_error: bool,
}

impl RecordFlags {
    pub fn any_error(self) -> bool {
        self.metadata_error || self.thumbnail_error
    }
}

/// One catalog entry: a media file, its stat metadata, and the fingerprints
/// extracted from it.
///
/// Identity is the absolute path; two records are equal iff their paths are
/// equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    path: PathBuf,
    pub file_size: u64,
    pub date_created: SystemTime,
    pub date_modified: SystemTime,
    /// Stream properties. For images, a single stream entry holding the
    /// picture dimensions; rate fields are zero.
    pub media_info: Option<MediaInfo>,
    /// Grayscale fingerprint per sample key, or `None` where extraction
    /// produced no data for the position.
    pub fingerprints: BTreeMap<PositionKey, Option<Vec<u8>>>,
    pub flags: RecordFlags,
    /// Transient per-scan exclusion marker; reset at the start of each scan
    /// and never persisted.
    #[serde(skip)]
    pub invalid: bool,
}

impl FileRecord {
    /// A stat-only candidate, as produced by the enumerator. Fingerprints
    /// and media info are filled in later by the fingerprint builder.
    pub fn new_candidate(
        path: PathBuf,
        file_size: u64,
        date_created: SystemTime,
        date_modified: SystemTime,
    ) -> Self {
        Self {
            path,
            file_size,
            date_created,
            date_modified,
            media_info: None,
            fingerprints: BTreeMap::new(),
            flags: RecordFlags::default(),
            invalid: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The containing folder.
    pub fn folder(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    /// Whether the file is an image, judged by extension.
    pub fn is_image(&self) -> bool {
        has_extension_in(&self.path, IMAGE_EXTENSIONS)
    }

    /// Whether the file is a video, judged by extension.
    pub fn is_video(&self) -> bool {
        has_extension_in(&self.path, VIDEO_EXTENSIONS)
    }

    /// Duration in seconds; zero when unknown or an image.
    pub fn duration_secs(&self) -> f64 {
        self.media_info
            .as_ref()
            .map(|info| info.duration_secs)
            .unwrap_or(0.0)
    }

    /// Largest frame area (width × height) over the record's streams.
    pub fn frame_area(&self) -> u64 {
        self.media_info
            .as_ref()
            .map(MediaInfo::frame_area)
            .unwrap_or(0)
    }

    pub fn gray_at(&self, key: PositionKey) -> Option<&[u8]> {
        self.fingerprints
            .get(&key)
            .and_then(|v| v.as_deref())
    }

    /// True when a non-null fingerprint is stored for every key the given
    /// position settings derive for this record's duration.
    ///
    /// Distinct settings may collide on one key; the map then holds a single
    /// entry, which satisfies all colliding settings at once.
    pub fn has_complete_fingerprints(&self, positions: &[PositionSetting]) -> bool {
        let duration = self.duration_secs();
        positions
            .iter()
            .all(|p| self.gray_at(p.key_for(duration)).is_some())
    }

    /// Whether the record can participate in duplicate comparison. Images
    /// additionally need their key-zero fingerprint at lookup time.
    pub(crate) fn is_comparable(&self, position_count: usize) -> bool {
        !self.invalid
            && !self.flags.manually_excluded
            && !self.flags.too_dark
            && self.media_info.is_some()
            && !self.flags.thumbnail_error
            && (self.is_image() || self.fingerprints.len() >= position_count)
    }
}

impl PartialEq for FileRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileRecord {}

impl std::hash::Hash for FileRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

//Utilities for constructing synthetic records in tests.
#[doc(hidden)]
pub mod test_util {
    use super::*;
    use ffmpeg_thumb_utils::StreamInfo;

    impl FileRecord {
        /// An image record carrying the given fingerprint at key zero.
        pub fn synthetic_image(path: impl AsRef<Path>, gray: Vec<u8>, (width, height): (u32, u32)) -> Self {
            let mut record = Self::new_candidate(
                path.as_ref().to_path_buf(),
                gray.len() as u64,
                SystemTime::UNIX_EPOCH,
                SystemTime::UNIX_EPOCH,
            );
            record.media_info = Some(MediaInfo {
                duration_secs: 0.0,
                fps: 0.0,
                bitrate_kbps: 0,
                audio_sample_rate: 0,
                streams: vec![StreamInfo { width, height }],
            });
            record.fingerprints.insert(PositionKey::ZERO, Some(gray));
            record
        }

        /// A video record with one fingerprint per position setting, derived
        /// for the given duration.
        pub fn synthetic_video(
            path: impl AsRef<Path>,
            duration_secs: f64,
            positions: &[PositionSetting],
            grays: Vec<Vec<u8>>,
        ) -> Self {
            assert_eq!(positions.len(), grays.len());

            let mut record = Self::new_candidate(
                path.as_ref().to_path_buf(),
                0,
                SystemTime::UNIX_EPOCH,
                SystemTime::UNIX_EPOCH,
            );
            record.media_info = Some(MediaInfo {
                duration_secs,
                fps: 25.0,
                bitrate_kbps: 1000,
                audio_sample_rate: 44100,
                streams: vec![StreamInfo {
                    width: 640,
                    height: 480,
                }],
            });
            for (position, gray) in positions.iter().zip(grays) {
                record
                    .fingerprints
                    .insert(position.key_for(duration_secs), Some(gray));
            }
            record
        }

        pub fn with_file_size(mut self, file_size: u64) -> Self {
            self.file_size = file_size;
            self
        }

        pub fn with_date_modified(mut self, date_modified: SystemTime) -> Self {
            self.date_modified = date_modified;
            self
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_identity_is_by_path() {
        let a = FileRecord::synthetic_image("/x/a.png", vec![0; 256], (16, 16));
        let mut b = FileRecord::synthetic_image("/x/a.png", vec![255; 256], (32, 32));
        assert_eq!(a, b);

        b.set_path(PathBuf::from("/x/b.png"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_complete_fingerprints_uses_derived_keys() {
        let positions = [
            PositionSetting::percentage(25.0),
            PositionSetting::percentage(75.0),
        ];
        let record =
            FileRecord::synthetic_video("/x/a.mp4", 100.0, &positions, vec![vec![0; 256]; 2]);

        assert!(record.has_complete_fingerprints(&positions));
        //a different duration derives different keys, so the set is incomplete
        assert!(!FileRecord {
            media_info: Some(MediaInfo {
                duration_secs: 50.0,
                ..record.media_info.clone().unwrap()
            }),
            ..record.clone()
        }
        .has_complete_fingerprints(&positions));
    }
}
