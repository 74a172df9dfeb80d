use std::time::SystemTime;

use itertools::Itertools;
use log::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::control::{Cancelled, ScanControl};
use crate::definitions::{has_extension_in, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::settings::ScanSettings;

use super::file_record::FileRecord;
use super::store::Catalog;

/// Walk all include roots and reconcile every candidate media file into the
/// catalog. Returns the number of files seen.
///
/// The walk runs on its own thread and streams candidates through a bounded
/// channel; pausing the receiving side therefore back-pressures the walker,
/// and cancelling drops the channel which makes the walker exit on its next
/// send.
pub(crate) fn enumerate_into(
    catalog: &mut Catalog,
    settings: &ScanSettings,
    control: &ScanControl,
) -> Result<usize, Cancelled> {
    let receiver = spawn_walker(settings.clone());

    let mut seen = 0usize;
    while let Ok(candidate) = receiver.recv() {
        control.checkpoint()?;
        catalog.insert_or_reconcile(candidate);
        seen += 1;
    }

    Ok(seen)
}

fn spawn_walker(settings: ScanSettings) -> crossbeam_channel::Receiver<FileRecord> {
    let (snd, rcv) = crossbeam_channel::bounded(100);

    std::thread::spawn(move || {
        // include roots may repeat; walk each once
        for root in settings.include_list.iter().unique() {
            if !root.exists() {
                warn!(target: "scan", "include root does not exist: {}", root.display());
                continue;
            }

            let max_depth = if settings.include_subdirectories {
                usize::MAX
            } else {
                1
            };

            let walker = WalkDir::new(root)
                .follow_links(false)
                .max_depth(max_depth)
                .into_iter()
                .filter_entry(|entry| directory_allowed(entry, &settings));

            for dir_entry in walker {
                let entry = match dir_entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(target: "scan", "enumeration error: {e}");
                        continue;
                    }
                };

                if !entry.file_type().is_file() && !entry.path_is_symlink() {
                    continue;
                }

                if let Some(candidate) = candidate_from_entry(&entry, &settings) {
                    if snd.send(candidate).is_err() {
                        // receiver went away (scan cancelled)
                        return;
                    }
                }
            }
        }
    });

    rcv
}

// Walk-time pruning: a rejected directory is never descended into.
fn directory_allowed(entry: &DirEntry, settings: &ScanSettings) -> bool {
    let path = entry.path();

    if settings.is_blacklisted(path) {
        debug!(target: "scan", "skipping blacklisted folder: {}", path.display());
        return false;
    }

    if !entry.file_type().is_dir() {
        return true;
    }

    if settings.ignore_reparse_points && entry.path_is_symlink() {
        debug!(target: "scan", "skipping symlinked folder: {}", path.display());
        return false;
    }

    if settings.ignore_read_only_folders {
        match entry.metadata() {
            Ok(meta) if meta.permissions().readonly() => {
                debug!(target: "scan", "skipping read-only folder: {}", path.display());
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(target: "scan", "cannot stat folder {}: {e}", path.display());
                return false;
            }
        }
    }

    true
}

fn candidate_from_entry(entry: &DirEntry, settings: &ScanSettings) -> Option<FileRecord> {
    let path = entry.path();

    let is_video = has_extension_in(path, VIDEO_EXTENSIONS);
    let is_image = settings.include_images && has_extension_in(path, IMAGE_EXTENSIONS);
    if !is_video && !is_image {
        return None;
    }

    // A symlinked file resolves to contents stored elsewhere; with the
    // reparse-point policy on, the link itself is not cataloged.
    if settings.ignore_reparse_points && entry.path_is_symlink() {
        debug!(target: "scan", "skipping symlinked file: {}", path.display());
        return None;
    }

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(target: "scan", "cannot stat {}: {e}", path.display());
            return None;
        }
    };

    Some(FileRecord::new_candidate(
        path.to_path_buf(),
        metadata.len(),
        file_time(metadata.created().ok(), &metadata),
        file_time(metadata.modified().ok(), &metadata),
    ))
}

// Some filesystems report no creation time; fall back to mtime, then epoch.
fn file_time(time: Option<SystemTime>, metadata: &std::fs::Metadata) -> SystemTime {
    time.or_else(|| metadata.modified().ok())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
