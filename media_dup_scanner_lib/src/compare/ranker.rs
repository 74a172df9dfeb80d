use std::collections::HashMap;

use uuid::Uuid;

use super::duplicates::DuplicateItem;

/// Flag the best member of each group along every metric axis.
///
/// All axes maximize except file size, where the smallest member wins.
/// Ties are flagged on every tied member. The rate/duration axes only apply
/// to video groups; image groups rank by size and frame area alone.
pub(crate) fn mark_best_members(items: &mut [DuplicateItem]) {
    let mut groups: HashMap<Uuid, Vec<usize>> = HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        groups.entry(item.group_id).or_default().push(idx);
    }

    for indices in groups.values() {
        let members = indices.iter().map(|&i| &items[i]).collect::<Vec<_>>();

        let smallest_size = members.iter().map(|m| m.metrics.file_size).min().unwrap_or(0);
        let largest_area = members.iter().map(|m| m.metrics.frame_area).max().unwrap_or(0);

        let is_video_group = members.first().is_some_and(|m| !m.is_image);
        let longest_duration = members
            .iter()
            .map(|m| m.metrics.duration_secs)
            .max_by(f64::total_cmp)
            .unwrap_or(0.0);
        let highest_fps = members
            .iter()
            .map(|m| m.metrics.fps)
            .max_by(f32::total_cmp)
            .unwrap_or(0.0);
        let highest_bitrate = members.iter().map(|m| m.metrics.bitrate_kbps).max().unwrap_or(0);
        let highest_sample_rate = members
            .iter()
            .map(|m| m.metrics.audio_sample_rate)
            .max()
            .unwrap_or(0);
        drop(members);

        for &idx in indices {
            let item = &mut items[idx];
            item.best.size = item.metrics.file_size == smallest_size;
            item.best.frame_size = item.metrics.frame_area == largest_area;

            if is_video_group {
                item.best.duration = item.metrics.duration_secs == longest_duration;
                item.best.fps = item.metrics.fps == highest_fps;
                item.best.bitrate = item.metrics.bitrate_kbps == highest_bitrate;
                item.best.audio_sample_rate =
                    item.metrics.audio_sample_rate == highest_sample_rate;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compare::duplicates::{BestFlags, ItemMetrics};
    use std::path::PathBuf;

    fn video_item(name: &str, group_id: Uuid, metrics: ItemMetrics) -> DuplicateItem {
        DuplicateItem {
            path: PathBuf::from(name),
            group_id,
            distance: 0.0,
            flipped: false,
            is_image: false,
            metrics,
            best: BestFlags::default(),
        }
    }

    #[test]
    fn test_axes_are_ranked_independently() {
        let group = Uuid::new_v4();
        let mut items = vec![
            video_item(
                "/a.mp4",
                group,
                ItemMetrics {
                    file_size: 100,
                    duration_secs: 60.0,
                    fps: 30.0,
                    bitrate_kbps: 800,
                    audio_sample_rate: 44100,
                    frame_area: 1920 * 1080,
                },
            ),
            video_item(
                "/b.mp4",
                group,
                ItemMetrics {
                    file_size: 50,
                    duration_secs: 59.0,
                    fps: 60.0,
                    bitrate_kbps: 700,
                    audio_sample_rate: 48000,
                    frame_area: 1280 * 720,
                },
            ),
        ];

        mark_best_members(&mut items);

        let a = &items[0];
        assert!(!a.best.size && a.best.duration && !a.best.fps);
        assert!(a.best.bitrate && !a.best.audio_sample_rate && a.best.frame_size);

        let b = &items[1];
        assert!(b.best.size && !b.best.duration && b.best.fps);
        assert!(!b.best.bitrate && b.best.audio_sample_rate && !b.best.frame_size);
    }

    #[test]
    fn test_ties_flag_every_member() {
        let group = Uuid::new_v4();
        let metrics = ItemMetrics {
            file_size: 10,
            duration_secs: 60.0,
            fps: 25.0,
            bitrate_kbps: 500,
            audio_sample_rate: 44100,
            frame_area: 100,
        };
        let mut items = vec![
            video_item("/a.mp4", group, metrics),
            video_item("/b.mp4", group, metrics),
        ];

        mark_best_members(&mut items);

        for item in &items {
            assert_eq!(
                item.best,
                BestFlags {
                    duration: true,
                    size: true,
                    fps: true,
                    bitrate: true,
                    audio_sample_rate: true,
                    frame_size: true,
                }
            );
        }
    }

    #[test]
    fn test_image_groups_skip_video_axes() {
        let group = Uuid::new_v4();
        let mut items = vec![
            DuplicateItem {
                is_image: true,
                ..video_item(
                    "/a.png",
                    group,
                    ItemMetrics {
                        file_size: 10,
                        frame_area: 100,
                        ..Default::default()
                    },
                )
            },
            DuplicateItem {
                is_image: true,
                ..video_item(
                    "/b.png",
                    group,
                    ItemMetrics {
                        file_size: 20,
                        frame_area: 400,
                        ..Default::default()
                    },
                )
            },
        ];

        mark_best_members(&mut items);

        assert!(items[0].best.size && !items[0].best.frame_size);
        assert!(!items[1].best.size && items[1].best.frame_size);
        for item in &items {
            assert!(!item.best.duration && !item.best.fps);
            assert!(!item.best.bitrate && !item.best.audio_sample_rate);
        }
    }
}
