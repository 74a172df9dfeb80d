use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;

use ffmpeg_thumb_utils::{MediaInfo, StreamInfo, THUMB_SIZE};

use crate::catalog::{Catalog, FileRecord};
use crate::control::{Cancelled, ProgressTracker, ScanControl};
use crate::definitions::TOO_DARK_MEAN_LIMIT;
use crate::events::EventSink;
use crate::settings::{PathFilters, PositionKey, ScanSettings};
use crate::thumbnailer::Thumbnailer;

/// Builds fingerprints for every catalog record, in parallel.
///
/// The builder never fails a scan over a single file: problems are recorded
/// as flags on the affected record and the record is excluded from the
/// current comparison via its transient `invalid` marker.
pub(crate) struct FingerprintBuilder<'a> {
    settings: &'a ScanSettings,
    filters: PathFilters,
    thumbnailer: Arc<dyn Thumbnailer>,
}

impl<'a> FingerprintBuilder<'a> {
    pub fn new(settings: &'a ScanSettings, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        Self {
            settings,
            filters: PathFilters::compile(settings),
            thumbnailer,
        }
    }

    /// Fan out over all records. Caller is expected to run this inside the
    /// scan's thread pool.
    pub fn build_all(
        &self,
        catalog: &mut Catalog,
        control: &ScanControl,
        sink: &Arc<dyn EventSink>,
    ) -> Result<(), Cancelled> {
        let progress = ProgressTracker::new(control, sink, catalog.len());

        catalog
            .records_map_mut()
            .par_iter_mut()
            .try_for_each(|(path, record)| {
                control.checkpoint()?;
                self.build_one(record);
                progress.tick(path);
                Ok(())
            })
    }

    fn build_one(&self, record: &mut FileRecord) {
        if !self.validate(record) {
            record.invalid = true;
            return;
        }

        if self.settings.always_retry_failed_sampling && record.flags.any_error() {
            debug!(target: "scan", "retrying failed extraction: {}", record.path().display());
            record.flags.metadata_error = false;
            record.flags.thumbnail_error = false;
            record.fingerprints.clear();
        }

        // errors from a previous scan exclude the record until retried
        if record.flags.any_error() {
            record.invalid = true;
            return;
        }

        let is_image = record.is_image();

        if record.media_info.is_none() && !is_image {
            match self.thumbnailer.probe(record.path()) {
                Ok(info) => record.media_info = Some(info),
                Err(e) => {
                    warn!(target: "scan", "probe failed for {}: {e}", record.path().display());
                    record.flags.metadata_error = true;
                    record.invalid = true;
                    return;
                }
            }
        }

        if is_image {
            self.build_image(record);
        } else {
            if self.settings.positions.is_empty() {
                record.fingerprints.clear();
                return;
            }
            if record.has_complete_fingerprints(&self.settings.positions) {
                return;
            }
            self.build_video(record);
        }
    }

    // Inclusion rules re-applied per record: the catalog may hold records
    // that the current settings no longer cover.
    fn validate(&self, record: &FileRecord) -> bool {
        let path = record.path();

        if record.flags.manually_excluded || record.flags.too_dark {
            return false;
        }

        if !record.is_video() && !(self.settings.include_images && record.is_image()) {
            return false;
        }

        if self.settings.is_blacklisted(path) {
            return false;
        }

        if !self.settings.scan_against_entire_database && !self.settings.is_under_include_list(path)
        {
            return false;
        }

        if !path.exists() {
            // cached fingerprints may stand in for a file that is gone
            let usable_from_cache =
                self.settings.include_non_existing_files && !record.fingerprints.is_empty();
            if !usable_from_cache {
                return false;
            }
        }

        if self.settings.filter_by_file_size
            && !(self.settings.min_size_bytes()..=self.settings.max_size_bytes())
                .contains(&record.file_size)
        {
            return false;
        }

        if !self.filters.accepts(path) {
            return false;
        }

        true
    }

    fn build_image(&self, record: &mut FileRecord) {
        if record.media_info.is_some() && record.gray_at(PositionKey::ZERO).is_some() {
            return;
        }

        let img = match image::open(record.path()) {
            Ok(img) => img,
            Err(e) => {
                warn!(target: "scan", "cannot decode image {}: {e}", record.path().display());
                record.flags.thumbnail_error = true;
                record.invalid = true;
                return;
            }
        };

        record.media_info = Some(MediaInfo {
            duration_secs: 0.0,
            fps: 0.0,
            bitrate_kbps: 0,
            audio_sample_rate: 0,
            streams: vec![StreamInfo {
                width: img.width(),
                height: img.height(),
            }],
        });

        let gray = image::imageops::resize(
            &img.to_luma8(),
            THUMB_SIZE,
            THUMB_SIZE,
            image::imageops::FilterType::Triangle,
        );
        let bytes = gray.into_raw();

        let mean = bytes.iter().map(|&b| u32::from(b)).sum::<u32>() / bytes.len() as u32;
        let too_dark = mean < u32::from(TOO_DARK_MEAN_LIMIT);

        record.fingerprints.insert(PositionKey::ZERO, Some(bytes));

        if too_dark {
            debug!(target: "scan", "image too dark to compare: {}", record.path().display());
            record.flags.too_dark = true;
            record.invalid = true;
        }
    }

    fn build_video(&self, record: &mut FileRecord) {
        let duration = record.duration_secs();
        if duration <= 0.0 {
            record.invalid = true;
            return;
        }

        let fractions = self
            .settings
            .positions
            .iter()
            .map(|p| p.fraction_for(duration))
            .collect::<Vec<_>>();

        match self
            .thumbnailer
            .gray_thumbnails(record.path(), &fractions, duration)
        {
            Ok(grays) => {
                for (position, gray) in self.settings.positions.iter().zip(grays) {
                    record
                        .fingerprints
                        .insert(position.key_for(duration), Some(gray));
                }
            }
            Err(e) => {
                warn!(target: "scan", "thumbnail extraction failed for {}: {e}", record.path().display());
                record.flags.thumbnail_error = true;
                record.invalid = true;
            }
        }
    }
}
