//! Destinations for binary masks.

use image::GrayImage;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix appended to the source stem for mask files.
pub const DEFAULT_MASK_SUFFIX: &str = "_mask";

/// Mask output errors.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to create output directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Cannot derive a mask name from {}", .0.display())]
    InvalidSource(PathBuf),
    #[error("{} was already written for {} in this run", .path.display(), .first.display())]
    NameCollision { path: PathBuf, first: PathBuf },
}

/// Receives one binary mask per processed image.
pub trait MaskSink {
    /// Store `mask` for the image at `source`; returns where it went.
    fn emit(&mut self, source: &Path, mask: &GrayImage) -> Result<PathBuf, SinkError>;
}

/// `<source-stem><suffix>.png`, e.g. `IMG_001.jpg` → `IMG_001_mask.png`.
pub fn mask_file_name(source: &Path, suffix: &str) -> Option<String> {
    let stem = source.file_stem()?.to_str()?;
    Some(format!("{}{}.png", stem, suffix))
}

/// Writes masks as PNG files into one directory.
///
/// Names depend only on the source file name, so re-running over the same
/// inputs overwrites the same outputs. Within one sink, two different sources
/// mapping to the same mask name (`a.png` and `a.jpg`) is an error; the first
/// mask is kept.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    output_dir: PathBuf,
    suffix: String,
    /// Mask path -> source it was written for.
    written: HashMap<PathBuf, PathBuf>,
}

impl DirectorySink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            suffix: DEFAULT_MASK_SUFFIX.to_string(),
            written: HashMap::new(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Path the mask for `source` is written to.
    pub fn output_path(&self, source: &Path) -> Result<PathBuf, SinkError> {
        mask_file_name(source, &self.suffix)
            .map(|name| self.output_dir.join(name))
            .ok_or_else(|| SinkError::InvalidSource(source.to_path_buf()))
    }
}

impl MaskSink for DirectorySink {
    fn emit(&mut self, source: &Path, mask: &GrayImage) -> Result<PathBuf, SinkError> {
        let path = self.output_path(source)?;
        if let Some(first) = self.written.get(&path) {
            if first != source {
                return Err(SinkError::NameCollision {
                    path,
                    first: first.clone(),
                });
            }
        }

        fs::create_dir_all(&self.output_dir).map_err(|source| SinkError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;
        mask.save_with_format(&path, image::ImageFormat::Png)
            .map_err(|source| SinkError::Write {
                path: path.clone(),
                source,
            })?;
        self.written.insert(path.clone(), source.to_path_buf());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scratch_dir;
    use image::Luma;

    #[test]
    fn test_mask_file_name() {
        assert_eq!(
            mask_file_name(Path::new("/data/IMG_001.jpg"), "_mask").as_deref(),
            Some("IMG_001_mask.png")
        );
        assert_eq!(
            mask_file_name(Path::new("scan.v2.tiff"), "_seg").as_deref(),
            Some("scan.v2_seg.png")
        );
        assert_eq!(mask_file_name(Path::new("/"), "_mask"), None);
    }

    #[test]
    fn test_directory_sink_writes_and_overwrites() {
        let dir = scratch_dir("sink");
        let out = dir.join("masks");
        let mut sink = DirectorySink::new(&out);

        let mut mask = GrayImage::new(3, 2);
        mask.put_pixel(0, 0, Luma([255]));
        let path = sink.emit(Path::new("inputs/cell.jpg"), &mask).unwrap();
        assert_eq!(path, out.join("cell_mask.png"));

        let second = GrayImage::from_pixel(3, 2, Luma([255]));
        let again = sink.emit(Path::new("inputs/cell.jpg"), &second).unwrap();
        assert_eq!(again, path);

        let written = image::open(&path).unwrap().to_luma8();
        assert_eq!(written.dimensions(), (3, 2));
        assert!(written.pixels().all(|p| p.0[0] == 255));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_directory_sink_rejects_name_collision() {
        let dir = scratch_dir("sink-collision");
        let mut sink = DirectorySink::new(&dir);

        let first = GrayImage::from_pixel(2, 2, Luma([255]));
        let path = sink.emit(Path::new("in/a.png"), &first).unwrap();

        let second = GrayImage::new(2, 2);
        let err = sink.emit(Path::new("in/a.jpg"), &second).unwrap_err();
        match err {
            SinkError::NameCollision { path: clash, first } => {
                assert_eq!(clash, path);
                assert_eq!(first, PathBuf::from("in/a.png"));
            }
            other => panic!("unexpected error: {}", other),
        }

        // The first mask survives.
        let written = image::open(&path).unwrap().to_luma8();
        assert!(written.pixels().all(|p| p.0[0] == 255));

        // A fresh sink is a new run and overwrites.
        let mut rerun = DirectorySink::new(&dir);
        assert_eq!(rerun.emit(Path::new("in/a.jpg"), &second).unwrap(), path);
        fs::remove_dir_all(dir).ok();
    }
}
