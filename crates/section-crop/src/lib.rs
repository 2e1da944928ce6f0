use image::imageops::FilterType;
use image::{DynamicImage, ImageResult, RgbImage};
use section_data::Coordinates;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

mod store;

pub use store::{CroppedFiles, DerivativeDimensions, DerivativeLayout, SectionCropper};

/// Pixel size of an image or a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(img: &RgbImage) -> Self {
        Self::new(img.width(), img.height())
    }
}

/// Upper bound for the medium derivative.
pub const MEDIUM_BOUND: Dimensions = Dimensions::new(400, 300);
/// Upper bound for the thumbnail derivative.
pub const THUMBNAIL_BOUND: Dimensions = Dimensions::new(200, 150);

/// Resampling filter for both downscaled tiers.
const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Absorbs float error so an exact fit (e.g. 1200 * (400/1200)) doesn't truncate to 399.
const FIT_EPSILON: f64 = 1e-6;

/// Crop rectangle guaranteed to lie inside the screenshot it was clamped against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Clamp annotated coordinates to a `image_width` x `image_height` image.
///
/// `x`/`y` are pulled into `[0, size]`, then width/height are shortened so the
/// rectangle ends inside the image. The origin is never shifted to make room.
/// When the result has no area the clamped coordinates come back as `Err`.
pub fn clamp_region(
    coords: &Coordinates,
    image_width: u32,
    image_height: u32,
) -> Result<CropRegion, Coordinates> {
    let (iw, ih) = (i64::from(image_width), i64::from(image_height));

    let x = coords.x.clamp(0, iw);
    let y = coords.y.clamp(0, ih);
    let width = coords.width.min(iw - x);
    let height = coords.height.min(ih - y);

    if width <= 0 || height <= 0 {
        return Err(Coordinates {
            x,
            y,
            width,
            height,
        });
    }

    // All four values are within [0, u32::MAX] after the clamps above.
    Ok(CropRegion {
        x: x as u32,
        y: y as u32,
        width: width as u32,
        height: height as u32,
    })
}

/// Largest size with the same aspect ratio as `src` that fits in `bound`.
/// Never upscales; a side that would truncate to 0 is kept at 1.
pub fn fit_within(src: Dimensions, bound: Dimensions) -> Dimensions {
    if src.width == 0 || src.height == 0 {
        return src;
    }
    let scale = (bound.width as f64 / src.width as f64)
        .min(bound.height as f64 / src.height as f64)
        .min(1.0);

    let scaled = |side: u32, limit: u32| -> u32 {
        let v = (side as f64 * scale + FIT_EPSILON).floor() as u32;
        v.clamp(1, limit.max(1)).min(side)
    };

    Dimensions::new(
        scaled(src.width, bound.width),
        scaled(src.height, bound.height),
    )
}

/// Convert any decoded screenshot to 8-bit RGB.
pub fn normalize_color(img: DynamicImage) -> RgbImage {
    match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    }
}

/// Decode a screenshot from disk and normalize it to RGB.
pub fn open_screenshot(path: &Path) -> ImageResult<RgbImage> {
    let img = image::open(path)?;
    debug!(
        "Decoded {} ({}x{}, {:?})",
        path.display(),
        img.width(),
        img.height(),
        img.color()
    );
    Ok(normalize_color(img))
}

/// The three images produced from one crop region.
#[derive(Debug, Clone)]
pub struct CropDerivatives {
    pub full: RgbImage,
    pub medium: RgbImage,
    pub thumbnail: RgbImage,
}

impl CropDerivatives {
    /// Crop `region` out of `screenshot` and derive both downscaled tiers
    /// from the full crop.
    pub fn derive(screenshot: &RgbImage, region: CropRegion) -> Self {
        let full = image::imageops::crop_imm(
            screenshot,
            region.x,
            region.y,
            region.width,
            region.height,
        )
        .to_image();

        let medium = downscale(&full, MEDIUM_BOUND);
        let thumbnail = downscale(&full, THUMBNAIL_BOUND);

        Self {
            full,
            medium,
            thumbnail,
        }
    }
}

fn downscale(full: &RgbImage, bound: Dimensions) -> RgbImage {
    let target = fit_within(Dimensions::of(full), bound);
    if target == Dimensions::of(full) {
        return full.clone();
    }
    image::imageops::resize(full, target.width, target.height, RESIZE_FILTER)
}
