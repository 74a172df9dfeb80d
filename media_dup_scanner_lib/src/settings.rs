use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::definitions::{DEFAULT_DURATION_DIFFERENCE_PERCENT, DEFAULT_SIMILARITY_PERCENT};

/// How a [`PositionSetting`] value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionType {
    /// Value is a percentage of the file duration (0–100).
    Percentage,
    /// Value is an offset in seconds from the start of the file.
    OffsetFromStart,
    /// Value is an offset in seconds from the end of the file.
    OffsetFromEnd,
}

/// A symbolic description of where in a media file to sample a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSetting {
    pub kind: PositionType,
    pub value: f64,
}

impl PositionSetting {
    pub const fn percentage(value: f64) -> Self {
        Self {
            kind: PositionType::Percentage,
            value,
        }
    }

    pub const fn from_start(seconds: f64) -> Self {
        Self {
            kind: PositionType::OffsetFromStart,
            value: seconds,
        }
    }

    pub const fn from_end(seconds: f64) -> Self {
        Self {
            kind: PositionType::OffsetFromEnd,
            value: seconds,
        }
    }

    /// The fraction of the duration this setting resolves to, in `[0, 1]`.
    ///
    /// A zero duration resolves offsets to fraction 0 so that image files
    /// (and broken videos) still derive a stable key.
    pub fn fraction_for(&self, duration_secs: f64) -> f64 {
        let p = match self.kind {
            PositionType::Percentage => self.value / 100.0,
            PositionType::OffsetFromStart => {
                if duration_secs == 0.0 {
                    0.0
                } else {
                    self.value / duration_secs
                }
            }
            PositionType::OffsetFromEnd => {
                if duration_secs == 0.0 {
                    0.0
                } else {
                    (duration_secs - self.value) / duration_secs
                }
            }
        };

        p.clamp(0.0, 1.0)
    }

    /// The fingerprint key this setting derives for a file of the given
    /// duration. Keys are seconds into the file.
    ///
    /// This is the single derivation used both when building fingerprints
    /// and when looking them up for comparison, so equal inputs always
    /// produce bit-identical keys.
    pub fn key_for(&self, duration_secs: f64) -> PositionKey {
        PositionKey::from_seconds(duration_secs * self.fraction_for(duration_secs))
    }
}

/// An absolute sample time in seconds, usable as a map key.
///
/// Equality and ordering are by bit pattern / total order of the underlying
/// `f64`; keys are only ever produced by [`PositionSetting::key_for`], so two
/// equal derivations compare equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(f64);

impl PositionKey {
    /// The key under which image fingerprints are stored.
    pub const ZERO: Self = Self(0.0);

    pub fn from_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl PartialEq for PositionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for PositionKey {}

impl PartialOrd for PositionKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PositionKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for PositionKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// All configuration recognized by the scan engine.
///
/// The `Default` impl carries sensible starting values; embedders typically
/// deserialize this from their own settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Root directories to scan.
    pub include_list: Vec<PathBuf>,
    /// Folders excluded from scanning, matched as path prefixes.
    pub blacklist: Vec<PathBuf>,
    /// Walk include roots recursively, or only their immediate children.
    pub include_subdirectories: bool,
    /// Also consider image files (otherwise only videos).
    pub include_images: bool,
    /// Skip directories marked read-only.
    pub ignore_read_only_folders: bool,
    /// Skip symlinked/junction directories and symlinked files.
    pub ignore_reparse_points: bool,
    /// Compare every catalog record, not only records under the include
    /// list.
    pub scan_against_entire_database: bool,
    /// Keep (and compare) records whose file no longer exists on disk.
    pub include_non_existing_files: bool,

    pub filter_by_file_size: bool,
    pub minimum_file_size_mb: u64,
    pub maximum_file_size_mb: u64,

    pub filter_by_file_path_contains: bool,
    /// Glob patterns; at least one must match a file's path.
    pub file_path_contains_globs: Vec<String>,
    pub filter_by_file_path_not_contains: bool,
    /// Glob patterns; none may match a file's path.
    pub file_path_not_contains_globs: Vec<String>,

    /// Ordered sample positions for video fingerprints.
    pub positions: Vec<PositionSetting>,
    /// Similarity threshold in percent, `(0, 100]`.
    pub percent: f64,
    /// Tolerated video duration difference, in percent.
    pub percent_duration_difference: f64,
    pub ignore_black_pixels: bool,
    pub ignore_white_pixels: bool,
    /// Also compare each pair against a horizontally mirrored fingerprint.
    pub compare_horizontally_flipped: bool,
    /// Never report two paths that are hardlinks of the same inode.
    /// (Detection compares device/inode identity; on platforms without
    /// that notion the setting has no effect.)
    pub exclude_hardlinks: bool,
    pub enable_time_limited_scan: bool,
    /// With `enable_time_limited_scan`, only files modified within this many
    /// seconds of scan start are compared.
    pub time_limit_seconds: u64,
    /// Re-attempt extraction for records that previously failed with
    /// metadata or thumbnail errors.
    pub always_retry_failed_sampling: bool,

    /// Worker thread count for fingerprinting and comparison.
    pub max_degree_of_parallelism: usize,

    /// Decoder hardware acceleration mode, passed through verbatim.
    pub hardware_acceleration_mode: Option<String>,
    /// Extra decoder arguments, passed through verbatim.
    pub custom_ff_arguments: Vec<String>,
    /// Prefer an in-process decoder binding over subprocess invocation,
    /// where one is compiled in.
    pub use_native_binding: bool,
    /// Run the decoder with verbose logging forwarded to the log.
    pub extended_fftools_logging: bool,

    /// Directory holding the catalog snapshot. Defaults to the current
    /// directory.
    pub custom_database_folder: Option<PathBuf>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            include_list: vec![],
            blacklist: vec![],
            include_subdirectories: true,
            include_images: false,
            ignore_read_only_folders: false,
            ignore_reparse_points: false,
            scan_against_entire_database: false,
            include_non_existing_files: false,
            filter_by_file_size: false,
            minimum_file_size_mb: 0,
            maximum_file_size_mb: u64::MAX / (1024 * 1024),
            filter_by_file_path_contains: false,
            file_path_contains_globs: vec![],
            filter_by_file_path_not_contains: false,
            file_path_not_contains_globs: vec![],
            positions: vec![
                PositionSetting::percentage(35.0),
                PositionSetting::percentage(50.0),
                PositionSetting::percentage(65.0),
            ],
            percent: DEFAULT_SIMILARITY_PERCENT,
            percent_duration_difference: DEFAULT_DURATION_DIFFERENCE_PERCENT,
            ignore_black_pixels: false,
            ignore_white_pixels: false,
            compare_horizontally_flipped: false,
            exclude_hardlinks: false,
            enable_time_limited_scan: false,
            time_limit_seconds: 0,
            always_retry_failed_sampling: false,
            max_degree_of_parallelism: 0,
            hardware_acceleration_mode: None,
            custom_ff_arguments: vec![],
            use_native_binding: false,
            extended_fftools_logging: false,
            custom_database_folder: None,
        }
    }
}

impl ScanSettings {
    /// The similarity distance limit `L = 1 - percent/100`. Pair distances
    /// at or below this limit are matches.
    pub fn distance_limit(&self) -> f64 {
        1.0 - self.percent / 100.0
    }

    pub(crate) fn min_size_bytes(&self) -> u64 {
        self.minimum_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub(crate) fn max_size_bytes(&self) -> u64 {
        self.maximum_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub(crate) fn worker_count(&self) -> usize {
        // rayon interprets zero as "pick for me"
        self.max_degree_of_parallelism
    }

    /// True if `path` lies under (or is) any include root.
    pub(crate) fn is_under_include_list(&self, path: &Path) -> bool {
        self.include_list
            .iter()
            .any(|root| path.starts_with(root))
    }

    /// True if `path` is a blacklisted folder or lies under one.
    ///
    /// `Path::starts_with` matches whole components only, so `/a/b` never
    /// blacklists `/a/bc`.
    pub(crate) fn is_blacklisted(&self, path: &Path) -> bool {
        self.blacklist.iter().any(|folder| path.starts_with(folder))
    }
}

/// Glob filters from the settings, compiled once per scan.
#[derive(Debug, Default)]
pub(crate) struct PathFilters {
    contains: Option<Vec<glob::Pattern>>,
    not_contains: Option<Vec<glob::Pattern>>,
}

impl PathFilters {
    pub fn compile(settings: &ScanSettings) -> Self {
        let compile_list = |globs: &[String]| {
            globs
                .iter()
                .filter_map(|g| match glob::Pattern::new(g) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(target: "scan", "invalid glob pattern {g:?}: {e}");
                        None
                    }
                })
                .collect::<Vec<_>>()
        };

        Self {
            contains: settings
                .filter_by_file_path_contains
                .then(|| compile_list(&settings.file_path_contains_globs)),
            not_contains: settings
                .filter_by_file_path_not_contains
                .then(|| compile_list(&settings.file_path_not_contains_globs)),
        }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if let Some(ref patterns) = self.contains {
            if !patterns.is_empty() && !patterns.iter().any(|p| p.matches_path(path)) {
                return false;
            }
        }

        if let Some(ref patterns) = self.not_contains {
            if patterns.iter().any(|p| p.matches_path(path)) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_percentage_key_derivation() {
        let p = PositionSetting::percentage(50.0);
        assert_eq!(p.key_for(120.0), PositionKey::from_seconds(60.0));
        assert_eq!(p.key_for(0.0), PositionKey::ZERO);
    }

    #[test]
    fn test_offset_keys_clamp_to_duration() {
        let start = PositionSetting::from_start(30.0);
        assert_eq!(start.key_for(120.0), PositionKey::from_seconds(30.0));
        //offset beyond the end clamps to the end
        assert_eq!(start.key_for(10.0), PositionKey::from_seconds(10.0));
        //zero duration always derives key zero
        assert_eq!(start.key_for(0.0), PositionKey::ZERO);

        let end = PositionSetting::from_end(30.0);
        assert_eq!(end.key_for(120.0), PositionKey::from_seconds(90.0));
        //offset before the start clamps to the start
        assert_eq!(end.key_for(10.0), PositionKey::ZERO);
    }

    #[test]
    fn test_percentage_key_is_monotone_in_duration() {
        let p = PositionSetting::percentage(35.0);
        let mut last = p.key_for(0.0);
        for d in 1..200 {
            let key = p.key_for(f64::from(d));
            assert!(key > last);
            last = key;
        }
    }

    #[test]
    fn test_key_derivation_is_pure() {
        let p = PositionSetting::percentage(33.3);
        assert_eq!(p.key_for(77.7), p.key_for(77.7));
    }

    #[test]
    fn test_blacklist_respects_component_boundaries() {
        let settings = ScanSettings {
            blacklist: vec![PathBuf::from("/a/b")],
            ..Default::default()
        };

        assert!(settings.is_blacklisted(Path::new("/a/b")));
        assert!(settings.is_blacklisted(Path::new("/a/b/c.mp4")));
        assert!(!settings.is_blacklisted(Path::new("/a/bc")));
        assert!(!settings.is_blacklisted(Path::new("/a")));
    }

    #[test]
    fn test_path_filters() {
        let settings = ScanSettings {
            filter_by_file_path_contains: true,
            file_path_contains_globs: vec!["*holiday*".into()],
            filter_by_file_path_not_contains: true,
            file_path_not_contains_globs: vec!["*backup*".into()],
            ..Default::default()
        };
        let filters = PathFilters::compile(&settings);

        assert!(filters.accepts(Path::new("/vids/holiday/a.mp4")));
        assert!(!filters.accepts(Path::new("/vids/other/a.mp4")));
        assert!(!filters.accepts(Path::new("/vids/holiday/backup/a.mp4")));
    }
}
