use std::collections::BTreeMap;

use ffmpeg_thumb_utils::THUMB_SIZE;

use crate::catalog::FileRecord;
use crate::definitions::{BLACK_PIXEL_LIMIT, WHITE_PIXEL_LIMIT};
use crate::settings::{PositionKey, PositionSetting, ScanSettings};

/// Which luminance bands are excluded from distance computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PixelMask {
    pub ignore_black: bool,
    pub ignore_white: bool,
}

impl PixelMask {
    pub fn from_settings(settings: &ScanSettings) -> Self {
        Self {
            ignore_black: settings.ignore_black_pixels,
            ignore_white: settings.ignore_white_pixels,
        }
    }

    // A pixel pair is masked out only when BOTH sides sit in an ignored band.
    fn ignores(self, a: u8, b: u8) -> bool {
        (self.ignore_black && a <= BLACK_PIXEL_LIMIT && b <= BLACK_PIXEL_LIMIT)
            || (self.ignore_white && a >= WHITE_PIXEL_LIMIT && b >= WHITE_PIXEL_LIMIT)
    }
}

/// Normalized mean absolute difference between two grayscale vectors, in
/// `[0, 1]`. `None` when the vectors are incomparable or every pixel pair is
/// masked out.
pub(crate) fn gray_distance(a: &[u8], b: &[u8], mask: PixelMask) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut sum = 0u32;
    let mut counted = 0u32;
    for (&pa, &pb) in a.iter().zip(b) {
        if mask.ignores(pa, pb) {
            continue;
        }
        sum += u32::from(pa.abs_diff(pb));
        counted += 1;
    }

    (counted > 0).then(|| f64::from(sum) / (f64::from(counted) * 255.0))
}

/// Mirror a row-major [`THUMB_SIZE`]-wide grayscale vector left-to-right.
pub(crate) fn flip_horizontal(gray: &[u8]) -> Vec<u8> {
    let mut flipped = gray.to_vec();
    for row in flipped.chunks_mut(THUMB_SIZE as usize) {
        row.reverse();
    }
    flipped
}

/// A fingerprint map with every vector mirrored; keys are unchanged.
pub(crate) fn flipped_fingerprints(
    fingerprints: &BTreeMap<PositionKey, Option<Vec<u8>>>,
) -> BTreeMap<PositionKey, Option<Vec<u8>>> {
    fingerprints
        .iter()
        .map(|(&key, gray)| (key, gray.as_deref().map(flip_horizontal)))
        .collect()
}

/// The similarity distance between two records, using `a_prints` as the
/// first record's fingerprint source (pass a flipped map for mirrored
/// comparison).
///
/// Returns `None` when the pair cannot match: a required fingerprint is
/// missing, every comparison was masked out, or (videos) a single position's
/// distance already exceeds `limit` (per-position early exit; the mean is
/// not computed).
///
/// When `Some(d)` is returned for a video pair, `d ≤ limit` always holds;
/// for image pairs the caller still needs to check the limit.
pub(crate) fn pair_distance(
    a: &FileRecord,
    b: &FileRecord,
    a_prints: &BTreeMap<PositionKey, Option<Vec<u8>>>,
    positions: &[PositionSetting],
    limit: f64,
    mask: PixelMask,
) -> Option<f64> {
    if a.is_image() {
        let gray_a = a_prints.get(&PositionKey::ZERO)?.as_deref()?;
        let gray_b = b.gray_at(PositionKey::ZERO)?;
        return gray_distance(gray_a, gray_b, mask);
    }

    let duration_a = a.duration_secs();
    let duration_b = b.duration_secs();

    let mut sum = 0.0;
    let mut valid_comparisons = 0usize;
    for position in positions {
        let gray_a = a_prints
            .get(&position.key_for(duration_a))?
            .as_deref()?;
        let gray_b = b.gray_at(position.key_for(duration_b))?;

        match gray_distance(gray_a, gray_b, mask) {
            Some(d) if d > limit => return None,
            Some(d) => {
                sum += d;
                valid_comparisons += 1;
            }
            // fully masked position: contributes to neither side of the mean
            None => {}
        }
    }

    (valid_comparisons > 0).then(|| sum / valid_comparisons as f64)
}
