use std::{
    collections::HashMap,
    io::BufWriter,
    path::{Path, PathBuf},
};

use log::{info, trace};
use serde::{Deserialize, Serialize};

use crate::definitions::CATALOG_FORMAT_VERSION;
use crate::errors::CatalogError;
use crate::settings::ScanSettings;

use super::file_record::FileRecord;

//On-disk shape of the catalog snapshot.
#[derive(Serialize, Deserialize)]
struct CatalogSnapshot {
    version: u32,
    records: HashMap<PathBuf, FileRecord>,
}

/// The persistent catalog: one [`FileRecord`] per known file, keyed by
/// absolute path.
///
/// The container itself is only mutated between scan phases (enumeration,
/// cleanup); during the fingerprint and comparison phases workers mutate
/// record fields through disjoint `&mut` borrows while the key set stays
/// fixed.
#[derive(Debug)]
pub struct Catalog {
    snapshot_path: PathBuf,
    records: HashMap<PathBuf, FileRecord>,
    dirty: bool,
}

impl Catalog {
    /// An empty catalog that will persist to `snapshot_path`.
    pub fn new(snapshot_path: PathBuf) -> Self {
        Self {
            snapshot_path,
            records: HashMap::new(),
            dirty: false,
        }
    }

    /// Load the snapshot at this catalog's path, replacing in-memory state.
    /// A missing file is not an error; it just means a fresh catalog.
    pub fn load(&mut self) -> Result<(), CatalogError> {
        if !self.snapshot_path.exists() {
            info!(target: "catalog", "creating new catalog at {}", self.snapshot_path.display());
            self.records = HashMap::new();
            self.dirty = false;
            return Ok(());
        }

        let file = std::fs::File::open(&self.snapshot_path).map_err(|e| {
            CatalogError::SnapshotIo {
                src: e,
                path: self.snapshot_path.clone(),
            }
        })?;

        let reader = std::io::BufReader::new(file);
        let snapshot: CatalogSnapshot =
            bincode::deserialize_from(reader).map_err(|e| CatalogError::Deserialization {
                src: format!("{e}"),
                path: self.snapshot_path.clone(),
            })?;

        if snapshot.version != CATALOG_FORMAT_VERSION {
            return Err(CatalogError::VersionMismatch {
                found: snapshot.version,
                expected: CATALOG_FORMAT_VERSION,
                path: self.snapshot_path.clone(),
            });
        }

        self.records = snapshot.records;
        self.dirty = false;

        trace!(target: "catalog",
            "loaded catalog. path: {}, entries: {}", self.snapshot_path.display(), self.records.len()
        );
        Ok(())
    }

    /// Write the catalog to disk. The snapshot is written to a temporary
    /// file and renamed into place, so a crash mid-save never corrupts the
    /// previous snapshot.
    pub fn save(&mut self) -> Result<(), CatalogError> {
        let snapshot_path = self.snapshot_path.clone();
        let io_err = |e: std::io::Error| CatalogError::SnapshotIo {
            src: e,
            path: snapshot_path.clone(),
        };

        if let Some(parent_dir) = snapshot_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                std::fs::create_dir_all(parent_dir).map_err(io_err)?;
            }
        }

        let temp_path = snapshot_path.with_extension("tmp");

        info!(
            target: "catalog",
            "saving catalog at {} with {} entries",
            snapshot_path.display(),
            self.records.len()
        );

        let temp_file = std::fs::File::create(&temp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(temp_file);

        let snapshot = CatalogSnapshot {
            version: CATALOG_FORMAT_VERSION,
            records: std::mem::take(&mut self.records),
        };
        let serialize_result = bincode::serialize_into(&mut writer, &snapshot);
        self.records = snapshot.records;

        if let Err(e) = serialize_result {
            return Err(CatalogError::Serialization {
                src: format!("{e}"),
                path: snapshot_path,
            });
        }

        let temp_file = writer
            .into_inner()
            .map_err(|e| CatalogError::SnapshotIo {
                src: e.into_error(),
                path: snapshot_path.clone(),
            })?;
        temp_file.sync_all().map_err(io_err)?;

        std::fs::rename(&temp_path, &snapshot_path).map_err(io_err)?;

        self.dirty = false;
        Ok(())
    }

    /// Insert a freshly enumerated candidate, or reconcile it against the
    /// existing record for its path: when size or timestamps differ the old
    /// record (and its now-stale fingerprints) is replaced wholesale.
    pub fn insert_or_reconcile(&mut self, candidate: FileRecord) {
        match self.records.get(candidate.path()) {
            Some(existing)
                if existing.file_size == candidate.file_size
                    && existing.date_created == candidate.date_created
                    && existing.date_modified == candidate.date_modified => {}
            Some(_) => {
                trace!(target: "catalog", "replacing stale record: {}", candidate.path().display());
                self.records
                    .insert(candidate.path().to_path_buf(), candidate);
                self.dirty = true;
            }
            None => {
                trace!(target: "catalog", "inserting: {}", candidate.path().display());
                self.records
                    .insert(candidate.path().to_path_buf(), candidate);
                self.dirty = true;
            }
        }
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        let removed = self.records.remove(path);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Re-key a record after a file was moved or renamed, keeping its
    /// fingerprints.
    pub fn update_path(&mut self, old: &Path, new: PathBuf) {
        if let Some(mut record) = self.records.remove(old) {
            record.set_path(new.clone());
            self.records.insert(new, record);
            self.dirty = true;
        }
    }

    /// Mark the record at `path` as manually excluded from all future scans.
    pub fn blacklist(&mut self, path: &Path) {
        if let Some(record) = self.records.get_mut(path) {
            record.flags.manually_excluded = true;
            self.dirty = true;
        }
    }

    /// Evict records whose file has disappeared (unless the settings keep
    /// non-existing files) and records under blacklisted folders. Returns
    /// the number of evicted records.
    pub fn cleanup(&mut self, settings: &ScanSettings) -> usize {
        let before = self.records.len();

        self.records.retain(|path, _record| {
            if settings.is_blacklisted(path) {
                return false;
            }
            if !settings.include_non_existing_files && !path.exists() {
                return false;
            }
            true
        });

        let removed = before - self.records.len();
        if removed > 0 {
            info!(target: "catalog", "cleanup evicted {removed} records");
            self.dirty = true;
        }
        removed
    }

    /// Clear every record's transient per-scan state.
    pub(crate) fn reset_transient_state(&mut self) {
        for record in self.records.values_mut() {
            record.invalid = false;
        }
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub(crate) fn records_map_mut(&mut self) -> &mut HashMap<PathBuf, FileRecord> {
        // fingerprint extraction mutates record fields in place; the caller
        // must not change the key set
        self.dirty = true;
        &mut self.records
    }

    /// Whether any modification occurred since the last successful
    /// load/save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

impl Catalog {
    /// Save only if something changed, logging instead of failing the scan.
    pub(crate) fn save_if_dirty(&mut self) -> Result<(), CatalogError> {
        if self.dirty {
            self.save()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::settings::PositionSetting;

    fn snapshot_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("catalog.db")
    }

    #[test]
    fn test_round_trip_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::new(snapshot_path(&dir));

        let positions = [PositionSetting::percentage(50.0)];
        let video =
            FileRecord::synthetic_video("/v/a.mp4", 60.0, &positions, vec![vec![7u8; 256]]);
        let image = FileRecord::synthetic_image("/v/b.png", vec![128u8; 256], (640, 480));

        catalog.insert_or_reconcile(video.clone());
        catalog.insert_or_reconcile(image.clone());
        catalog.save().unwrap();

        let mut reloaded = Catalog::new(snapshot_path(&dir));
        reloaded.load().unwrap();

        assert_eq!(reloaded.len(), 2);
        let video_back = reloaded.get(video.path()).unwrap();
        assert_eq!(video_back.media_info, video.media_info);
        assert_eq!(video_back.fingerprints, video.fingerprints);
        assert_eq!(video_back.flags, video.flags);
        assert_eq!(video_back.file_size, video.file_size);
        assert_eq!(video_back.date_modified, video.date_modified);
        assert!(reloaded.get(image.path()).is_some());
    }

    #[test]
    fn test_load_missing_snapshot_creates_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::new(snapshot_path(&dir));
        catalog.load().unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_reconcile_replaces_changed_records_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::new(snapshot_path(&dir));

        let positions = [PositionSetting::percentage(50.0)];
        let record =
            FileRecord::synthetic_video("/v/a.mp4", 60.0, &positions, vec![vec![7u8; 256]]);
        catalog.insert_or_reconcile(record.clone());

        // identical stat info: the fingerprinted record survives
        let unchanged = FileRecord::new_candidate(
            record.path().to_path_buf(),
            record.file_size,
            record.date_created,
            record.date_modified,
        );
        catalog.insert_or_reconcile(unchanged);
        assert!(!catalog.get(record.path()).unwrap().fingerprints.is_empty());

        // a size change discards the stale fingerprints
        let changed = FileRecord::new_candidate(
            record.path().to_path_buf(),
            record.file_size + 1,
            record.date_created,
            record.date_modified,
        );
        catalog.insert_or_reconcile(changed);
        assert!(catalog.get(record.path()).unwrap().fingerprints.is_empty());
    }

    #[test]
    fn test_update_path_rekeys_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::new(snapshot_path(&dir));

        let image = FileRecord::synthetic_image("/v/old.png", vec![1u8; 256], (16, 16));
        catalog.insert_or_reconcile(image);

        catalog.update_path(Path::new("/v/old.png"), PathBuf::from("/v/new.png"));
        assert!(catalog.get(Path::new("/v/old.png")).is_none());

        let moved = catalog.get(Path::new("/v/new.png")).unwrap();
        assert_eq!(moved.path(), Path::new("/v/new.png"));
        assert!(!moved.fingerprints.is_empty());
    }

    #[test]
    fn test_blacklist_sets_manual_exclusion() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::new(snapshot_path(&dir));
        let image = FileRecord::synthetic_image("/v/a.png", vec![1u8; 256], (16, 16));
        catalog.insert_or_reconcile(image);

        catalog.blacklist(Path::new("/v/a.png"));
        assert!(catalog.get(Path::new("/v/a.png")).unwrap().flags.manually_excluded);
    }

    #[test]
    fn test_cleanup_evicts_missing_and_blacklisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::new(snapshot_path(&dir));

        // exists on disk
        let kept_path = dir.path().join("kept.png");
        std::fs::write(&kept_path, b"x").unwrap();
        catalog.insert_or_reconcile(FileRecord::synthetic_image(&kept_path, vec![1; 256], (1, 1)));

        // never existed
        catalog.insert_or_reconcile(FileRecord::synthetic_image("/gone/a.png", vec![1; 256], (1, 1)));

        // exists but blacklisted
        let black_dir = dir.path().join("black");
        std::fs::create_dir(&black_dir).unwrap();
        let black_path = black_dir.join("b.png");
        std::fs::write(&black_path, b"x").unwrap();
        catalog.insert_or_reconcile(FileRecord::synthetic_image(&black_path, vec![1; 256], (1, 1)));

        let settings = ScanSettings {
            blacklist: vec![black_dir],
            ..Default::default()
        };
        let removed = catalog.cleanup(&settings);

        assert_eq!(removed, 2);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get(&kept_path).is_some());
    }
}
