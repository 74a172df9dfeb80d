#![allow(clippy::let_and_return)]
#![allow(clippy::len_without_is_empty)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::todo)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::panic)]
#![allow(clippy::doc_markdown)]

//! # Overview
//! `media_dup_scanner_lib` finds near-duplicate videos and images across
//! directory trees. Every media file is reduced to a compact perceptual
//! fingerprint (16×16 grayscale thumbnails sampled at configured positions);
//! fingerprints are compared pairwise under a similarity threshold and the
//! matches are merged into duplicate groups.
//!
//! The engine also detects sub-clip containment: a shorter video whose
//! fingerprint sequence appears as a contiguous window inside a longer
//! video's sequence.
//!
//! # High level API
//! Configure a [`ScanSettings`], register an [`EventSink`] for progress and
//! lifecycle events, and drive a [`Scanner`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use media_dup_scanner_lib::{NullEventSink, Scanner, ScanSettings};
//!
//! let settings = ScanSettings {
//!     include_list: vec!["/home/me/videos".into()],
//!     include_images: true,
//!     ..ScanSettings::default()
//! };
//!
//! let scanner = Scanner::new(settings, Arc::new(NullEventSink))?;
//! scanner.start_search()?;
//!
//! for item in scanner.duplicates() {
//!     println!("{} (group {})", item.path.display(), item.group_id);
//! }
//! # Ok::<(), media_dup_scanner_lib::ScanError>(())
//! ```
//!
//! Fingerprints are kept in a persistent catalog (a versioned binary
//! snapshot, saved atomically), so repeated scans only decode files that
//! are new or changed.
//!
//! The lower-level [`find_duplicates`] and [`find_subclip_matches`]
//! functions compare prepared [`FileRecord`]s directly, without touching
//! the catalog or the decoder.
//!
//! # Prerequisites
//! The default decoder backend calls ffmpeg and ffprobe on the command
//! line; both must be installed and visible on `PATH`. An embedder can
//! supply its own decoder through the [`Thumbnailer`] trait instead.
//!
//! # A note on grouping
//! Groups are the transitive closure of the pairwise match relation: if A
//! matches B and B matches C, all three share one group even when A and C
//! were never close enough on their own. Each item records the similarity
//! distance of the pair that introduced it; distances are not recomputed
//! when groups merge, so distances inside a merged group may come from
//! different pairs.

mod catalog;
mod compare;
mod control;
mod definitions;
mod errors;
mod events;
mod fingerprint;
mod hardlinks;
mod scanner;
mod settings;
mod thumbnailer;

pub use catalog::{Catalog, FileRecord, RecordFlags};
pub use compare::{BestFlags, DuplicateItem, ItemMetrics, SubClipMatch};
pub use errors::{CatalogError, ScanError, ScanResult};
pub use events::{EventSink, NullEventSink, ScanEvent, ScanProgress};
pub use scanner::Scanner;
pub use settings::{PositionKey, PositionSetting, PositionType, ScanSettings};
pub use thumbnailer::{FfmpegThumbnailer, Thumbnailer};

pub use definitions::{
    DEFAULT_DURATION_DIFFERENCE_PERCENT, DEFAULT_SIMILARITY_PERCENT, IMAGE_EXTENSIONS,
    THUMB_PIXELS, THUMB_SIZE, VIDEO_EXTENSIONS,
};

// The decoder wrapper's types appear in this crate's public API.
pub use ffmpeg_thumb_utils::{FfmpegError, MediaInfo, StreamInfo};

use std::sync::Arc;

/// Compare prepared records for duplicates, without a catalog or decoder.
///
/// Records that do not qualify for comparison (invalid, missing media info,
/// failed extraction, incomplete fingerprints) are filtered out first. The
/// returned items are grouped, ranked and sorted by path.
pub fn find_duplicates<'a>(
    records: impl IntoIterator<Item = &'a FileRecord>,
    settings: &ScanSettings,
) -> Vec<DuplicateItem> {
    let eligible = comparable(records, settings);

    let control = control::ScanControl::default();
    let sink: Arc<dyn EventSink> = Arc::new(NullEventSink);

    let mut items = compare::duplicates::compare_records(&eligible, settings, &control, &sink)
        .expect("scan without a controller cannot be cancelled");
    compare::ranker::mark_best_members(&mut items);
    items
}

/// Search prepared records for sub-clip containment, without a catalog or
/// decoder. The same eligibility filter as [`find_duplicates`] applies.
pub fn find_subclip_matches<'a>(
    records: impl IntoIterator<Item = &'a FileRecord>,
    settings: &ScanSettings,
) -> Vec<SubClipMatch> {
    let eligible = comparable(records, settings);

    let control = control::ScanControl::default();
    let sink: Arc<dyn EventSink> = Arc::new(NullEventSink);

    compare::subclip::find_subclips(&eligible, settings, &control, &sink)
        .expect("scan without a controller cannot be cancelled")
}

fn comparable<'a>(
    records: impl IntoIterator<Item = &'a FileRecord>,
    settings: &ScanSettings,
) -> Vec<&'a FileRecord> {
    let mut eligible = records
        .into_iter()
        .filter(|record| record.is_comparable(settings.positions.len()))
        .collect::<Vec<_>>();

    // deterministic pair order regardless of caller ordering
    eligible.sort_by_key(|record| record.path().to_path_buf());
    eligible
}
