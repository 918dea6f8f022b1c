use std::path::Path;

/// Extensions accepted as photos, compared case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "heic", "webp"];

/// Whether a path names an indexable image, judged by extension alone.
/// Performs no I/O; callers reject directories before asking.
pub fn is_image_path(path: &Path) -> bool {
    format_of(path).is_some()
}

/// Lower-case extension of an indexable image, or `None` if the path isn't one.
pub fn format_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Pixel dimensions read from the image header, `(0, 0)` when unknown.
/// Formats without a decoder (HEIC) and mislabeled files fall back to zero.
pub fn probe_dimensions(path: &Path) -> (u32, u32) {
    image::image_dimensions(path).unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_allow_list() {
        assert!(is_image_path(Path::new("/p/a.jpg")));
        assert!(is_image_path(Path::new("/p/B.JPEG")));
        assert!(is_image_path(Path::new("/p/c.HeIc")));
        assert!(!is_image_path(Path::new("/p/notes.txt")));
        assert!(!is_image_path(Path::new("/p/raw.nef")));
        assert!(!is_image_path(Path::new("/p/jpg")));
        assert_eq!(format_of(Path::new("/p/IMG.PNG")).as_deref(), Some("png"));
    }

    #[test]
    fn test_probe_dimensions_reads_header() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("tiny.png");
        image::RgbImage::new(3, 2).save(&png).unwrap();
        assert_eq!(probe_dimensions(&png), (3, 2));

        let fake = dir.path().join("fake.jpg");
        std::fs::write(&fake, b"not really a jpeg").unwrap();
        assert_eq!(probe_dimensions(&fake), (0, 0));
    }
}
