//! Scratch paths and model-ready encoding for screen captures.

use base64::Engine;
use image::GenericImageView;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::Screenshot;
use crate::AutomationError;

pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join("tern-screenshots")
}

/// Captures kept on disk; older ones are removed when a new path is handed out.
const KEPT_CAPTURES: usize = 5;

/// A fresh PNG path in the scratch directory.
pub fn scratch_path() -> Result<PathBuf, AutomationError> {
    let dir = scratch_dir();
    std::fs::create_dir_all(&dir)?;
    prune_captures(&dir, KEPT_CAPTURES - 1);
    Ok(dir.join(format!("capture-{}.png", uuid::Uuid::new_v4())))
}

/// Delete all but the `keep` most recent `capture-*.png` files in `dir`.
fn prune_captures(dir: &Path, keep: usize) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            return;
        }
    };

    let mut captures: Vec<(std::time::SystemTime, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.starts_with("capture-") && name.ends_with(".png")
        })
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();
    if captures.len() <= keep {
        return;
    }

    // Newest first
    captures.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in captures.into_iter().skip(keep) {
        if let Err(e) = std::fs::remove_file(&path) {
            debug!("Could not remove old capture {}: {}", path.display(), e);
        }
    }
}

/// Load a capture, scale it to at most `max_width` and encode it as base64 PNG.
pub fn encode_capture(path: &Path, max_width: u32) -> Result<Screenshot, AutomationError> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(AutomationError::CommandFailed {
            program: "screenshot".to_string(),
            status: None,
            detail: format!("capture at {} is empty", path.display()),
        });
    }

    let img = image::load_from_memory(&bytes).map_err(|e| AutomationError::CommandFailed {
        program: "screenshot".to_string(),
        status: None,
        detail: format!("could not decode capture: {}", e),
    })?;
    let (width, height) = img.dimensions();

    let (img, width, height) = if max_width > 0 && width > max_width {
        let new_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
        debug!("Scaling capture {}x{} to {}x{}", width, height, max_width, new_height);
        let scaled = img.resize_exact(max_width, new_height, image::imageops::FilterType::Triangle);
        (scaled, max_width, new_height)
    } else {
        (img, width, height)
    };

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .map_err(|e| AutomationError::CommandFailed {
            program: "screenshot".to_string(),
            status: None,
            detail: format!("could not encode capture: {}", e),
        })?;

    Ok(Screenshot {
        path: path.to_path_buf(),
        media_type: "image/png".to_string(),
        width,
        height,
        base64: base64::engine::general_purpose::STANDARD.encode(&png),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn write_png(path: &Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb([10, 20, 30]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_encode_scales_wide_captures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        write_png(&path, 400, 200);

        let shot = encode_capture(&path, 100).unwrap();
        assert_eq!((shot.width, shot.height), (100, 50));
        assert_eq!(shot.media_type, "image/png");

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&shot.base64)
            .unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn test_encode_keeps_small_captures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        write_png(&path, 40, 30);

        let shot = encode_capture(&path, 1568).unwrap();
        assert_eq!((shot.width, shot.height), (40, 30));
    }

    #[test]
    fn test_prune_keeps_newest_captures() {
        let dir = tempfile::tempdir().unwrap();
        let base = std::time::SystemTime::now() - std::time::Duration::from_secs(600);
        for i in 0..4u64 {
            let path = dir.path().join(format!("capture-{}.png", i));
            std::fs::write(&path, b"png").unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(base + std::time::Duration::from_secs(i * 10)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        prune_captures(dir.path(), 2);

        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["capture-2.png", "capture-3.png", "notes.txt"]);
    }

    #[test]
    fn test_prune_leaves_few_captures_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("capture-a.png"), b"png").unwrap();
        prune_captures(dir.path(), 4);
        assert!(dir.path().join("capture-a.png").exists());
    }

    #[test]
    fn test_encode_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(
            encode_capture(&path, 100),
            Err(AutomationError::CommandFailed { .. })
        ));
    }
}
