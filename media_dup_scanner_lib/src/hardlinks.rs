use std::path::Path;

/// Whether two paths name the same underlying file on disk.
///
/// Unix compares device and inode identity. On platforms without that
/// notion this always reports `false`, and hardlink exclusion is a no-op.
#[cfg(target_family = "unix")]
pub(crate) fn is_hardlink_pair(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let (Ok(meta_a), Ok(meta_b)) = (std::fs::metadata(a), std::fs::metadata(b)) else {
        return false;
    };

    meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino()
}

#[cfg(not(target_family = "unix"))]
pub(crate) fn is_hardlink_pair(_a: &Path, _b: &Path) -> bool {
    false
}

#[cfg(all(test, target_family = "unix"))]
mod test {
    use super::*;

    #[test]
    fn test_hardlinks_share_identity() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("a.mp4");
        let link = dir.path().join("b.mp4");
        let copy = dir.path().join("c.mp4");

        std::fs::write(&original, b"content").unwrap();
        std::fs::hard_link(&original, &link).unwrap();
        std::fs::write(&copy, b"content").unwrap();

        assert!(is_hardlink_pair(&original, &link));
        assert!(!is_hardlink_pair(&original, &copy));
        assert!(!is_hardlink_pair(&original, &dir.path().join("missing.mp4")));
    }
}
