use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::debug;
use parking_lot::Mutex;
use rayon::prelude::*;
use uuid::Uuid;

use crate::catalog::FileRecord;
use crate::control::{Cancelled, ProgressTracker, ScanControl};
use crate::events::EventSink;
use crate::hardlinks::is_hardlink_pair;
use crate::settings::ScanSettings;

use super::similarity::{flipped_fingerprints, pair_distance, PixelMask};

/// Display metrics of a duplicate, denormalized from its record at match
/// time. Rate fields are zero for images.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ItemMetrics {
    pub file_size: u64,
    pub duration_secs: f64,
    pub fps: f32,
    pub bitrate_kbps: u32,
    pub audio_sample_rate: u32,
    /// Width × height of the largest stream.
    pub frame_area: u64,
}

impl ItemMetrics {
    fn from_record(record: &FileRecord) -> Self {
        let info = record.media_info.as_ref();
        Self {
            file_size: record.file_size,
            duration_secs: record.duration_secs(),
            fps: info.map(|i| i.fps).unwrap_or(0.0),
            bitrate_kbps: info.map(|i| i.bitrate_kbps).unwrap_or(0),
            audio_sample_rate: info.map(|i| i.audio_sample_rate).unwrap_or(0),
            frame_area: record.frame_area(),
        }
    }
}

/// Which metric axes this item wins within its group (ties all win).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BestFlags {
    pub duration: bool,
    /// Smallest file size wins this axis.
    pub size: bool,
    pub fps: bool,
    pub bitrate: bool,
    pub audio_sample_rate: bool,
    pub frame_size: bool,
}

/// One member of a duplicate group.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateItem {
    pub path: PathBuf,
    /// Opaque group token; all items sharing it are mutually similar.
    pub group_id: Uuid,
    /// Similarity distance of the pair that introduced this item. When
    /// groups merge, existing members keep their original distances, so
    /// intra-group distances are not recomputed and may be inconsistent.
    pub distance: f64,
    /// The introducing match only succeeded against the mirrored
    /// fingerprint.
    pub flipped: bool,
    pub is_image: bool,
    pub metrics: ItemMetrics,
    pub best: BestFlags,
}

impl DuplicateItem {
    fn new(record: &FileRecord, group_id: Uuid, distance: f64, flipped: bool) -> Self {
        Self {
            path: record.path().to_path_buf(),
            group_id,
            distance,
            flipped,
            is_image: record.is_image(),
            metrics: ItemMetrics::from_record(record),
            best: BestFlags::default(),
        }
    }
}

// All insertions and merges happen with the map locked. Merging reassigns
// every member of the second group; existing items are otherwise untouched
// (no distance or flip updates).
#[derive(Default)]
struct GroupMap {
    items: HashMap<PathBuf, DuplicateItem>,
}

impl GroupMap {
    fn record_match(
        &mut self,
        first: &FileRecord,
        second: &FileRecord,
        distance: f64,
        flipped: bool,
    ) {
        let first_group = self.items.get(first.path()).map(|item| item.group_id);
        let second_group = self.items.get(second.path()).map(|item| item.group_id);

        match (first_group, second_group) {
            (Some(keep), Some(absorb)) if keep != absorb => {
                for item in self.items.values_mut() {
                    if item.group_id == absorb {
                        item.group_id = keep;
                    }
                }
            }
            //already grouped together
            (Some(_), Some(_)) => {}
            (Some(group), None) => {
                self.items.insert(
                    second.path().to_path_buf(),
                    DuplicateItem::new(second, group, distance, flipped),
                );
            }
            (None, Some(group)) => {
                self.items.insert(
                    first.path().to_path_buf(),
                    DuplicateItem::new(first, group, distance, flipped),
                );
            }
            (None, None) => {
                let group = Uuid::new_v4();
                // the first-seen side of a fresh group never carries the
                // flipped flag
                self.items.insert(
                    first.path().to_path_buf(),
                    DuplicateItem::new(first, group, distance, false),
                );
                self.items.insert(
                    second.path().to_path_buf(),
                    DuplicateItem::new(second, group, distance, flipped),
                );
            }
        }
    }

    fn into_items(self) -> Vec<DuplicateItem> {
        let mut items = self.items.into_values().collect::<Vec<_>>();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        items
    }
}

/// Compare every unordered pair of records and group the matches.
///
/// `records` is the scan set: the caller has already applied the
/// eligibility filter. Returned items are unranked (see
/// [`mark_best_members`](super::ranker::mark_best_members)) and sorted by
/// path.
pub(crate) fn compare_records(
    records: &[&FileRecord],
    settings: &ScanSettings,
    control: &ScanControl,
    sink: &Arc<dyn EventSink>,
) -> Result<Vec<DuplicateItem>, Cancelled> {
    let limit = settings.distance_limit();
    let mask = PixelMask::from_settings(settings);
    let cutoff = settings
        .enable_time_limited_scan
        .then(|| SystemTime::now() - Duration::from_secs(settings.time_limit_seconds));

    let progress = ProgressTracker::new(control, sink, records.len());
    let groups = Mutex::new(GroupMap::default());

    (0..records.len())
        .into_par_iter()
        .try_for_each(|i| -> Result<(), Cancelled> {
            control.checkpoint()?;

            let first = records[i];

            //mirror the row's fingerprints once, not once per pair
            let flipped_prints = settings
                .compare_horizontally_flipped
                .then(|| flipped_fingerprints(&first.fingerprints));

            for second in &records[i + 1..] {
                if let Some(cutoff) = cutoff {
                    if first.date_modified < cutoff || second.date_modified < cutoff {
                        continue;
                    }
                }

                if first.is_image() != second.is_image() {
                    continue;
                }

                if !first.is_image() {
                    let tolerance = settings.percent_duration_difference;
                    let ratio = first.duration_secs() / second.duration_secs() * 100.0;
                    if !(100.0 - tolerance..=100.0 + tolerance).contains(&ratio) {
                        continue;
                    }
                }

                let straight = pair_distance(
                    first,
                    second,
                    &first.fingerprints,
                    &settings.positions,
                    limit,
                    mask,
                );
                let mirrored = flipped_prints.as_ref().and_then(|prints| {
                    pair_distance(first, second, prints, &settings.positions, limit, mask)
                });

                let straight_match = straight.filter(|&d| d <= limit);
                let mirrored_match = mirrored.filter(|&d| d <= limit);

                // the mirrored result wins only when it matches and is
                // strictly closer
                let (distance, use_mirrored) = match (straight_match, mirrored_match) {
                    (None, None) => continue,
                    (Some(d), None) => (d, false),
                    (None, Some(d)) => (d, true),
                    (Some(d), Some(dm)) if dm < d => (dm, true),
                    (Some(d), Some(_)) => (d, false),
                };

                if settings.exclude_hardlinks
                    && first.file_size == second.file_size
                    && first.duration_secs() == second.duration_secs()
                    && is_hardlink_pair(first.path(), second.path())
                {
                    debug!(target: "scan",
                        "dropping hardlink pair: {} / {}",
                        first.path().display(),
                        second.path().display()
                    );
                    continue;
                }

                groups
                    .lock()
                    .record_match(first, second, distance, use_mirrored);
            }

            progress.tick(first.path());
            Ok(())
        })?;

    Ok(groups.into_inner().into_items())
}
