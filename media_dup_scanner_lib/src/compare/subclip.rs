use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;

use crate::catalog::FileRecord;
use crate::control::{Cancelled, ProgressTracker, ScanControl};
use crate::events::EventSink;
use crate::settings::{PositionKey, ScanSettings};

use super::similarity::{gray_distance, PixelMask};

/// A shorter video whose full fingerprint sequence appears as a contiguous
/// window inside a longer video's sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubClipMatch {
    pub main: PathBuf,
    pub sub: PathBuf,
    /// The main video's fingerprint keys aligned with the start of each
    /// matched window, one entry per sub fingerprint.
    pub match_start_times: Vec<PositionKey>,
}

/// Search `records` for sub-clip containment.
///
/// For each ordered video pair `(main, sub)` with `main` strictly longer,
/// the sub's fingerprint sequence (sorted by key) is slid across the main's;
/// a window matches when every aligned position is within the similarity
/// limit.
pub(crate) fn find_subclips(
    records: &[&FileRecord],
    settings: &ScanSettings,
    control: &ScanControl,
    sink: &Arc<dyn EventSink>,
) -> Result<Vec<SubClipMatch>, Cancelled> {
    let limit = settings.distance_limit();
    let mask = PixelMask::from_settings(settings);
    let position_count = settings.positions.len();

    let eligible = |record: &FileRecord| {
        !record.is_image()
            && record.media_info.is_some()
            && record.fingerprints.len() >= position_count
    };

    let progress = ProgressTracker::new(control, sink, records.len());

    let per_main = (0..records.len())
        .into_par_iter()
        .map(|main_idx| -> Result<Vec<SubClipMatch>, Cancelled> {
            control.checkpoint()?;

            let main = records[main_idx];
            let mut found: Vec<SubClipMatch> = vec![];

            if eligible(main) {
                let (main_keys, main_prints) = sorted_prints(main);

                for sub in records {
                    if *sub == main
                        || !eligible(sub)
                        || main.duration_secs() <= sub.duration_secs()
                    {
                        continue;
                    }

                    let (_, sub_prints) = sorted_prints(sub);

                    let window = sub_prints.len();
                    if window < 1 || main_prints.len() < window {
                        continue;
                    }

                    for start in 0..=(main_prints.len() - window) {
                        let aligned = (0..window).all(|offset| {
                            gray_distance(main_prints[start + offset], sub_prints[offset], mask)
                                .is_some_and(|d| d <= limit)
                        });
                        if !aligned {
                            continue;
                        }

                        let candidate = SubClipMatch {
                            main: main.path().to_path_buf(),
                            sub: sub.path().to_path_buf(),
                            match_start_times: main_keys[start..start + window].to_vec(),
                        };
                        if !found.contains(&candidate) {
                            found.push(candidate);
                        }
                    }
                }
            }

            progress.tick(main.path());
            Ok(found)
        })
        .collect::<Result<Vec<_>, Cancelled>>()?;

    Ok(per_main.into_iter().flatten().collect())
}

// Fingerprints in key order, nulls dropped. BTreeMap iteration is already
// key-ascending.
fn sorted_prints(record: &FileRecord) -> (Vec<PositionKey>, Vec<&[u8]>) {
    let mut keys = vec![];
    let mut prints = vec![];
    for (&key, gray) in &record.fingerprints {
        if let Some(gray) = gray.as_deref() {
            keys.push(key);
            prints.push(gray);
        }
    }
    (keys, prints)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::NullEventSink;
    use crate::settings::PositionSetting;

    fn run_subclips(records: &[&FileRecord], settings: &ScanSettings) -> Vec<SubClipMatch> {
        let control = ScanControl::default();
        let sink: Arc<dyn EventSink> = Arc::new(NullEventSink);
        find_subclips(records, settings, &control, &sink).unwrap()
    }

    // ten distinct fingerprints for a long video, three for a short one
    // matching the long video's positions 4..=6
    fn containment_fixture() -> (FileRecord, FileRecord, Vec<PositionSetting>) {
        let main_positions = (0..10)
            .map(|i| PositionSetting::percentage(f64::from(i) * 10.0))
            .collect::<Vec<_>>();
        let main_prints = (0..10u8).map(|i| vec![i * 20; 256]).collect::<Vec<_>>();
        let main = FileRecord::synthetic_video("/v/main.mp4", 100.0, &main_positions, main_prints);

        let sub_positions = vec![
            PositionSetting::percentage(10.0),
            PositionSetting::percentage(50.0),
            PositionSetting::percentage(90.0),
        ];
        let sub_prints = (4..7u8).map(|i| vec![i * 20; 256]).collect::<Vec<_>>();
        let sub = FileRecord::synthetic_video("/v/sub.mp4", 30.0, &sub_positions, sub_prints);

        (main, sub, sub_positions)
    }

    #[test]
    fn test_contained_sequence_is_found_once() {
        let (main, sub, positions) = containment_fixture();

        let settings = ScanSettings {
            positions,
            percent: 99.0,
            ..Default::default()
        };
        let matches = run_subclips(&[&main, &sub], &settings);

        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.main, PathBuf::from("/v/main.mp4"));
        assert_eq!(m.sub, PathBuf::from("/v/sub.mp4"));

        // window starts at the main's 5th fingerprint (40% of 100 s)
        let expected_keys = [40.0, 50.0, 60.0]
            .iter()
            .map(|&s| PositionKey::from_seconds(s))
            .collect::<Vec<_>>();
        assert_eq!(m.match_start_times, expected_keys);
    }

    #[test]
    fn test_no_match_when_sequence_absent() {
        let (main, _sub, positions) = containment_fixture();

        let stranger_prints = vec![vec![7u8; 256], vec![99u8; 256], vec![201u8; 256]];
        let stranger = FileRecord::synthetic_video(
            "/v/stranger.mp4",
            30.0,
            &[
                PositionSetting::percentage(10.0),
                PositionSetting::percentage(50.0),
                PositionSetting::percentage(90.0),
            ],
            stranger_prints,
        );

        let settings = ScanSettings {
            positions,
            percent: 99.0,
            ..Default::default()
        };
        assert!(run_subclips(&[&main, &stranger], &settings).is_empty());
    }

    #[test]
    fn test_longer_file_is_never_the_sub() {
        let (main, sub, positions) = containment_fixture();
        let settings = ScanSettings {
            positions,
            percent: 99.0,
            ..Default::default()
        };

        let matches = run_subclips(&[&sub, &main], &settings);
        assert!(matches.iter().all(|m| m.main == PathBuf::from("/v/main.mp4")));
    }
}
