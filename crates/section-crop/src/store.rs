use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use section_data::{Coordinates, ItemError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{clamp_region, CropDerivatives, Dimensions};

/// Pixel sizes of the three written derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeDimensions {
    pub original: Dimensions,
    pub medium: Dimensions,
    pub thumbnail: Dimensions,
}

/// Where one section's derivatives were written, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CroppedFiles {
    pub full: String,
    pub medium: String,
    pub thumbnail: String,
    pub dimensions: DerivativeDimensions,
}

/// Directory layout for derivative images under an output root.
#[derive(Debug, Clone)]
pub struct DerivativeLayout {
    root: PathBuf,
}

impl DerivativeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn full_dir(&self) -> PathBuf {
        self.images_dir().join("full")
    }

    pub fn medium_dir(&self) -> PathBuf {
        self.images_dir().join("medium")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.images_dir().join("thumbnails")
    }

    pub fn create_dirs(&self) -> Result<()> {
        for dir in [self.full_dir(), self.medium_dir(), self.thumbnails_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Encode all three derivatives as PNG, named after `stem`. Either all
    /// three files end up on disk or none of them do.
    pub fn save(&self, stem: &str, derivatives: &CropDerivatives) -> Result<CroppedFiles> {
        let full_path = self.full_dir().join(format!("{}.png", stem));
        let medium_path = self.medium_dir().join(format!("{}_medium.png", stem));
        let thumb_path = self.thumbnails_dir().join(format!("{}_thumb.png", stem));

        let outputs = [
            (&derivatives.full, &full_path),
            (&derivatives.medium, &medium_path),
            (&derivatives.thumbnail, &thumb_path),
        ];
        for (written, (img, path)) in outputs.iter().enumerate() {
            if let Err(e) = write_png(img, path) {
                for (_, done) in &outputs[..written] {
                    if let Err(rm) = std::fs::remove_file(done) {
                        warn!("Failed to remove partial {}: {}", done.display(), rm);
                    }
                }
                return Err(e);
            }
        }

        Ok(CroppedFiles {
            full: self.relative(&full_path),
            medium: self.relative(&medium_path),
            thumbnail: self.relative(&thumb_path),
            dimensions: DerivativeDimensions {
                original: Dimensions::of(&derivatives.full),
                medium: Dimensions::of(&derivatives.medium),
                thumbnail: Dimensions::of(&derivatives.thumbnail),
            },
        })
    }
}

fn write_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Clamps, crops, derives and persists one section at a time.
#[derive(Debug, Clone)]
pub struct SectionCropper {
    layout: DerivativeLayout,
}

impl SectionCropper {
    pub fn new(layout: DerivativeLayout) -> Self {
        Self { layout }
    }

    /// Extract the section at `coords` and write its derivatives as `stem`.
    /// Degenerate regions and write failures come back as `ItemError`,
    /// naming the section by `label`.
    pub fn crop_section(
        &self,
        screenshot: &RgbImage,
        coords: &Coordinates,
        stem: &str,
        label: &str,
    ) -> Result<CroppedFiles, ItemError> {
        let region = clamp_region(coords, screenshot.width(), screenshot.height()).map_err(
            |clamped| ItemError::Geometry {
                section: label.to_string(),
                width: clamped.width,
                height: clamped.height,
            },
        )?;

        let clamped = (
            i64::from(region.x),
            i64::from(region.y),
            i64::from(region.width),
            i64::from(region.height),
        );
        if clamped != (coords.x, coords.y, coords.width, coords.height) {
            debug!(
                "{}: clamped {:?} to x={} y={} {}x{}",
                stem, coords, region.x, region.y, region.width, region.height
            );
        }

        let derivatives = CropDerivatives::derive(screenshot, region);
        self.layout
            .save(stem, &derivatives)
            .map_err(|e| ItemError::image(label, format!("{:#}", e)))
    }
}
