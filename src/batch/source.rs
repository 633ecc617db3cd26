//! Discovering and loading batch images.

use image::DynamicImage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File extensions treated as images (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Whether `path` has a supported image extension.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// List the images directly inside `dir`, sorted by file name.
///
/// Files whose stem ends with `exclude_suffix` are left out, so masks written
/// next to their sources are not picked up as inputs on the next run.
pub fn list_images(dir: &Path, exclude_suffix: Option<&str>) -> io::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_supported_image(path))
        .filter(|path| match exclude_suffix {
            Some(suffix) if !suffix.is_empty() => {
                let is_mask = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|stem| stem.ends_with(suffix))
                    .unwrap_or(false);
                if is_mask {
                    tracing::info!("Ignoring existing mask {}", image_name(path));
                }
                !is_mask
            }
            _ => true,
        })
        .collect();
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// Decode an image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, image::ImageError> {
    image::open(path)
}

/// Display name of an image path (its file name).
pub fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
