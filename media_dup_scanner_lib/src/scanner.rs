use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use crate::catalog::{enumerator, Catalog, FileRecord};
use crate::compare::{duplicates, ranker, subclip, DuplicateItem, SubClipMatch};
use crate::control::ScanControl;
use crate::definitions::CATALOG_FILE_NAME;
use crate::errors::{ScanError, ScanResult};
use crate::events::{EventSink, ScanEvent};
use crate::fingerprint::FingerprintBuilder;
use crate::settings::ScanSettings;
use crate::thumbnailer::{backend_for, FfmpegThumbnailer, Thumbnailer};

/// The scan engine's control surface.
///
/// A `Scanner` owns the catalog, the worker pool and the pause/cancel
/// state. All methods take `&self`; [`pause`](Self::pause),
/// [`resume`](Self::resume) and [`stop`](Self::stop) may be called from any
/// thread while [`start_search`](Self::start_search) runs on another.
///
/// Lifecycle events and throttled progress reports are delivered to the
/// [`EventSink`] registered at construction.
pub struct Scanner {
    settings: ScanSettings,
    catalog: RwLock<Catalog>,
    catalog_loaded: AtomicBool,
    control: ScanControl,
    sink: Arc<dyn EventSink>,
    thumbnailer: Arc<dyn Thumbnailer>,
    duplicates: Mutex<Vec<DuplicateItem>>,
    pool: rayon::ThreadPool,
}

impl Scanner {
    /// Create a scanner using the ffmpeg command line decoder.
    ///
    /// # Errors
    /// [`ScanError::DecoderNotFound`] when ffmpeg/ffprobe cannot be
    /// executed; no scan is possible in that case.
    pub fn new(settings: ScanSettings, sink: Arc<dyn EventSink>) -> ScanResult<Self> {
        if !FfmpegThumbnailer::available() {
            return Err(ScanError::DecoderNotFound);
        }

        let thumbnailer = backend_for(&settings);
        Self::with_thumbnailer(settings, sink, thumbnailer)
    }

    /// Create a scanner with a caller-supplied decoder. No availability
    /// preflight is performed.
    pub fn with_thumbnailer(
        settings: ScanSettings,
        sink: Arc<dyn EventSink>,
        thumbnailer: Arc<dyn Thumbnailer>,
    ) -> ScanResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_count())
            .build()
            .map_err(|e| ScanError::WorkerPool(e.to_string()))?;

        let catalog_path = database_path(&settings);

        Ok(Self {
            settings,
            catalog: RwLock::new(Catalog::new(catalog_path)),
            catalog_loaded: AtomicBool::new(false),
            control: ScanControl::default(),
            sink,
            thumbnailer,
            duplicates: Mutex::new(vec![]),
            pool,
        })
    }

    /// Run a full scan: reload the catalog, enumerate the include roots,
    /// build missing fingerprints, persist the catalog, then compare and
    /// rank.
    ///
    /// Cancellation is not an error: the scan stops at the next worker
    /// boundary, emits [`ScanEvent::ScanAborted`] and returns `Ok`.
    pub fn start_search(&self) -> ScanResult<()> {
        self.control.reset();

        {
            let mut catalog = self.catalog.write();
            catalog.load()?;
            self.catalog_loaded.store(true, Relaxed);

            match enumerator::enumerate_into(&mut catalog, &self.settings, &self.control) {
                Ok(seen) => {
                    info!(target: "scan", "enumerated {seen} files, catalog holds {}", catalog.len());
                }
                Err(_cancelled) => return self.abort(),
            }
        }
        self.sink.on_event(ScanEvent::FilesEnumerated);

        {
            let mut catalog = self.catalog.write();
            catalog.reset_transient_state();

            let builder = FingerprintBuilder::new(&self.settings, self.thumbnailer.clone());
            let catalog_ref: &mut Catalog = &mut catalog;
            let build_result = self
                .pool
                .install(|| builder.build_all(catalog_ref, &self.control, &self.sink));

            // partial fingerprints from a cancelled run are still worth
            // keeping for the next scan
            catalog.save_if_dirty()?;

            if build_result.is_err() {
                return self.abort();
            }
        }
        self.sink.on_event(ScanEvent::BuildingHashesDone);

        self.compare_and_rank()
    }

    /// Compare and rank only; fingerprints are assumed current (a previous
    /// [`start_search`](Self::start_search) or an unchanged catalog).
    pub fn start_compare(&self) -> ScanResult<()> {
        self.control.reset();
        self.ensure_catalog_loaded()?;
        self.compare_and_rank()
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// Cancel the running scan. Resumes first so paused workers can
    /// observe the cancellation; returns without waiting for them.
    pub fn stop(&self) {
        self.control.cancel();
    }

    /// The duplicate set produced by the most recent comparison.
    pub fn duplicates(&self) -> Vec<DuplicateItem> {
        self.duplicates.lock().clone()
    }

    /// Search the catalog for sub-clip containment between videos.
    /// Cancellation empties the result and emits
    /// [`ScanEvent::ScanAborted`].
    pub fn find_subclip_matches(&self) -> ScanResult<Vec<SubClipMatch>> {
        self.control.reset();
        self.ensure_catalog_loaded()?;

        let catalog = self.catalog.read();
        let scan_set = self.comparable_records(&catalog);

        let result = self.pool.install(|| {
            subclip::find_subclips(&scan_set, &self.settings, &self.control, &self.sink)
        });

        match result {
            Ok(matches) => Ok(matches),
            Err(_cancelled) => {
                drop(catalog);
                self.abort()?;
                Ok(vec![])
            }
        }
    }

    /// Evict catalog records for missing or blacklisted files, then save.
    pub fn clean_database(&self) -> ScanResult<usize> {
        self.ensure_catalog_loaded()?;

        let removed = {
            let mut catalog = self.catalog.write();
            let removed = catalog.cleanup(&self.settings);
            catalog.save_if_dirty()?;
            removed
        };

        self.sink.on_event(ScanEvent::DatabaseCleaned { removed });
        Ok(removed)
    }

    /// Fetch an encoded preview image for every current duplicate. Items
    /// whose preview fails get a `None` placeholder; failures are never
    /// fatal.
    pub fn retrieve_thumbnails(&self) -> Vec<(PathBuf, Option<Vec<u8>>)> {
        let items = self.duplicates();

        let previews = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    if self.control.is_cancelled() {
                        return (item.path.clone(), None);
                    }

                    // sample videos mid-file; images at their only frame
                    let timestamp = item.metrics.duration_secs * 0.5;
                    let preview = match self.thumbnailer.color_thumbnail(&item.path, timestamp) {
                        Ok(bytes) => Some(bytes),
                        Err(e) => {
                            warn!(target: "scan", "preview failed for {}: {e}", item.path.display());
                            None
                        }
                    };
                    (item.path.clone(), preview)
                })
                .collect::<Vec<_>>()
        });

        self.sink.on_event(ScanEvent::ThumbnailsRetrieved);
        previews
    }

    /// Mark the record at `path` as manually excluded and persist the
    /// catalog.
    pub fn blacklist_record(&self, path: &std::path::Path) -> ScanResult<()> {
        self.ensure_catalog_loaded()?;
        let mut catalog = self.catalog.write();
        catalog.blacklist(path);
        catalog.save_if_dirty()?;
        Ok(())
    }

    fn ensure_catalog_loaded(&self) -> ScanResult<()> {
        if !self.catalog_loaded.load(Relaxed) {
            self.catalog.write().load()?;
            self.catalog_loaded.store(true, Relaxed);
        }
        Ok(())
    }

    fn abort(&self) -> ScanResult<()> {
        info!(target: "scan", "scan aborted");
        self.sink.on_event(ScanEvent::ScanAborted);
        Ok(())
    }

    // The comparison scan set: eligible records, restricted to the include
    // roots unless the whole database is in play, in deterministic order.
    fn comparable_records<'a>(&self, catalog: &'a Catalog) -> Vec<&'a FileRecord> {
        let position_count = self.settings.positions.len();

        let mut records = catalog
            .records()
            .filter(|record| record.is_comparable(position_count))
            .filter(|record| !self.settings.is_blacklisted(record.path()))
            .filter(|record| {
                self.settings.scan_against_entire_database
                    || self.settings.is_under_include_list(record.path())
            })
            .collect::<Vec<_>>();

        records.sort_by_key(|record| record.path().to_path_buf());
        records
    }

    fn compare_and_rank(&self) -> ScanResult<()> {
        let catalog = self.catalog.read();
        let scan_set = self.comparable_records(&catalog);

        let result = self.pool.install(|| {
            duplicates::compare_records(&scan_set, &self.settings, &self.control, &self.sink)
        });

        match result {
            Ok(mut items) => {
                ranker::mark_best_members(&mut items);
                info!(target: "scan", "comparison found {} duplicate items", items.len());
                *self.duplicates.lock() = items;
                self.sink.on_event(ScanEvent::ScanDone);
                Ok(())
            }
            Err(_cancelled) => {
                drop(catalog);
                self.abort()
            }
        }
    }
}

fn database_path(settings: &ScanSettings) -> PathBuf {
    settings
        .custom_database_folder
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CATALOG_FILE_NAME)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::NullEventSink;
    use crate::settings::PositionSetting;
    use crate::thumbnailer::Thumbnailer;
    use ffmpeg_thumb_utils::{FfmpegError, MediaInfo, StreamInfo};
    use std::path::Path;
    use std::time::Duration;

    //A decoder that reports a fixed duration and fabricates frames whose
    //luminance is derived from the file name, so files with equal names
    //(before the extension digit) collide.
    struct NamedLumaThumbnailer;

    impl Thumbnailer for NamedLumaThumbnailer {
        fn probe(&self, _path: &Path) -> Result<MediaInfo, FfmpegError> {
            Ok(MediaInfo {
                duration_secs: 60.0,
                fps: 25.0,
                bitrate_kbps: 900,
                audio_sample_rate: 44100,
                streams: vec![StreamInfo {
                    width: 640,
                    height: 480,
                }],
            })
        }

        fn gray_thumbnails(
            &self,
            path: &Path,
            fractions: &[f64],
            _duration_secs: f64,
        ) -> Result<Vec<Vec<u8>>, FfmpegError> {
            let level = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if stem.starts_with("dup") => 80u8,
                _ => 200u8,
            };
            Ok(fractions.iter().map(|_| vec![level; 256]).collect())
        }

        fn color_thumbnail(&self, _path: &Path, _ts: f64) -> Result<Vec<u8>, FfmpegError> {
            Err(FfmpegError::NoFrame(0.0))
        }
    }

    fn scanner_for(dir: &Path, sink: Arc<dyn EventSink>) -> Scanner {
        let settings = ScanSettings {
            include_list: vec![dir.to_path_buf()],
            positions: vec![PositionSetting::percentage(50.0)],
            custom_database_folder: Some(dir.to_path_buf()),
            max_degree_of_parallelism: 2,
            ..Default::default()
        };
        Scanner::with_thumbnailer(settings, sink, Arc::new(NamedLumaThumbnailer)).unwrap()
    }

    #[test]
    fn test_full_scan_finds_duplicates_and_emits_lifecycle_events() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["dup1.mp4", "dup2.mp4", "other.mp4"] {
            std::fs::write(dir.path().join(name), b"v").unwrap();
        }

        let (snd, rcv) = crossbeam_channel::unbounded();
        let scanner = scanner_for(dir.path(), Arc::new(snd));
        scanner.start_search().unwrap();

        let items = scanner.duplicates();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].group_id, items[1].group_id);
        let paths = items.iter().map(|i| i.path.clone()).collect::<Vec<_>>();
        assert!(paths.contains(&dir.path().join("dup1.mp4")));
        assert!(paths.contains(&dir.path().join("dup2.mp4")));

        let events = rcv.try_iter().collect::<Vec<_>>();
        let lifecycle = events
            .iter()
            .filter(|e| !matches!(e, ScanEvent::Progress(_)))
            .collect::<Vec<_>>();
        assert_eq!(
            lifecycle,
            vec![
                &ScanEvent::FilesEnumerated,
                &ScanEvent::BuildingHashesDone,
                &ScanEvent::ScanDone,
            ]
        );
        //the catalog snapshot was persisted
        assert!(dir.path().join(CATALOG_FILE_NAME).exists());
    }

    #[test]
    fn test_scan_twice_reuses_fingerprints_and_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["dup1.mp4", "dup2.mp4", "other.mp4"] {
            std::fs::write(dir.path().join(name), b"v").unwrap();
        }

        let scanner = scanner_for(dir.path(), Arc::new(NullEventSink));
        scanner.start_search().unwrap();
        let first = scanner
            .duplicates()
            .iter()
            .map(|i| i.path.clone())
            .collect::<Vec<_>>();

        scanner.start_search().unwrap();
        let second = scanner
            .duplicates()
            .iter()
            .map(|i| i.path.clone())
            .collect::<Vec<_>>();

        assert_eq!(first, second);
    }

    //A decoder slow enough that a running scan can be stopped mid-build.
    struct SlowThumbnailer(NamedLumaThumbnailer);

    impl Thumbnailer for SlowThumbnailer {
        fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError> {
            std::thread::sleep(Duration::from_millis(100));
            self.0.probe(path)
        }

        fn gray_thumbnails(
            &self,
            path: &Path,
            fractions: &[f64],
            duration_secs: f64,
        ) -> Result<Vec<Vec<u8>>, FfmpegError> {
            self.0.gray_thumbnails(path, fractions, duration_secs)
        }

        fn color_thumbnail(&self, path: &Path, ts: f64) -> Result<Vec<u8>, FfmpegError> {
            self.0.color_thumbnail(path, ts)
        }
    }

    #[test]
    fn test_stop_aborts_a_running_scan() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            std::fs::write(dir.path().join(format!("dup{i}.mp4")), b"v").unwrap();
        }

        let settings = ScanSettings {
            include_list: vec![dir.path().to_path_buf()],
            positions: vec![PositionSetting::percentage(50.0)],
            custom_database_folder: Some(dir.path().to_path_buf()),
            max_degree_of_parallelism: 1,
            ..Default::default()
        };
        let (snd, rcv) = crossbeam_channel::unbounded();
        let scanner = Arc::new(
            Scanner::with_thumbnailer(settings, Arc::new(snd), Arc::new(SlowThumbnailer(NamedLumaThumbnailer)))
                .unwrap(),
        );

        // eight 100 ms probes on one worker leave plenty of time to stop
        // mid-build
        let worker = {
            let scanner = Arc::clone(&scanner);
            std::thread::spawn(move || {
                scanner.start_search().unwrap();
            })
        };
        std::thread::sleep(Duration::from_millis(150));
        scanner.stop();
        worker.join().unwrap();

        let events = rcv.try_iter().collect::<Vec<_>>();
        assert!(events.contains(&ScanEvent::ScanAborted));
        assert!(!events.contains(&ScanEvent::ScanDone));
    }

    #[test]
    fn test_clean_database_reports_evictions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dup1.mp4"), b"v").unwrap();

        let (snd, rcv) = crossbeam_channel::unbounded();
        let scanner = scanner_for(dir.path(), Arc::new(snd));
        scanner.start_search().unwrap();

        // file disappears between scans
        std::fs::remove_file(dir.path().join("dup1.mp4")).unwrap();
        let removed = scanner.clean_database().unwrap();

        assert_eq!(removed, 1);
        let events = rcv.try_iter().collect::<Vec<_>>();
        assert!(events.contains(&ScanEvent::DatabaseCleaned { removed: 1 }));
    }
}
