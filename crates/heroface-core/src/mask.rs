//! Soft elliptical blend masks around the page face.
//!
//! Geometry comes from the page bounding box only, so mask shape does not
//! follow landmark jitter. The ellipse is drawn at full opacity and then
//! Gaussian-blurred so the mask is never binary.

use crate::types::BoundingBox;
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_ellipse_mut;
use imageproc::filter::separable_filter_equal;

/// Mask values strictly above this count as "inside" for color statistics.
pub const MASK_THRESHOLD: u8 = 128;

pub const FACE_EXPANSION: f32 = 1.3;
pub const HAIR_EXPANSION: f32 = 1.4;

/// Extra vertical stretch so the face ellipse reaches the forehead.
const FACE_HEIGHT_STRETCH: f32 = 1.2;
/// Extra vertical stretch so the hair ellipse reaches the scalp.
const HAIR_HEIGHT_STRETCH: f32 = 1.5;
const FACE_LIFT: f32 = 0.05;
const HAIR_LIFT: f32 = 0.15;

const FACE_BLUR_KSIZE: usize = 31;
const FACE_BLUR_SIGMA: f32 = 15.0;
const HAIR_BLUR_KSIZE: usize = 41;
const HAIR_BLUR_SIGMA: f32 = 20.0;

/// Which region of the page face the hero replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskVariant {
    /// Tight ellipse for face-only hero crops.
    FaceOnly,
    /// Taller, raised ellipse covering hair and scalp.
    HairExtended,
}

/// Single-channel blend opacity, 0–255, sized like the page image.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(GrayImage);

impl Mask {
    pub fn from_image(image: GrayImage) -> Self {
        Self(image)
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.0.get_pixel(x, y)[0]
    }

    /// Row-major opacity values.
    pub fn values(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Row-major selection of pixels above `threshold`.
    pub fn selection(&self, threshold: u8) -> Vec<bool> {
        self.0.as_raw().iter().map(|&v| v > threshold).collect()
    }

    pub fn count_above(&self, threshold: u8) -> usize {
        self.0.as_raw().iter().filter(|&&v| v > threshold).count()
    }

    /// Number of rows holding at least one pixel above `threshold`.
    pub fn vertical_extent(&self, threshold: u8) -> u32 {
        self.0
            .rows()
            .filter(|row| row.clone().any(|p| p[0] > threshold))
            .count() as u32
    }
}

/// Build the mask for `variant` with its default expansion.
pub fn build_mask(width: u32, height: u32, bbox: &BoundingBox, variant: MaskVariant) -> Mask {
    match variant {
        MaskVariant::FaceOnly => face_mask(width, height, bbox, FACE_EXPANSION),
        MaskVariant::HairExtended => hair_extended_mask(width, height, bbox, HAIR_EXPANSION),
    }
}

/// Ellipse over the face, slightly taller than wide and nudged up toward the forehead.
pub fn face_mask(width: u32, height: u32, bbox: &BoundingBox, expansion: f32) -> Mask {
    let face_w = bbox.width() * expansion;
    let face_h = bbox.height() * expansion * FACE_HEIGHT_STRETCH;
    let center = bbox.center();
    let cx = center.x as i32;
    let cy = (center.y - face_h * FACE_LIFT) as i32;
    let axes = ((face_w / 2.0) as i32, (face_h / 2.0) as i32);

    soft_ellipse(width, height, (cx, cy), axes, FACE_BLUR_KSIZE, FACE_BLUR_SIGMA)
}

/// Ellipse extended upward to include hair.
pub fn hair_extended_mask(width: u32, height: u32, bbox: &BoundingBox, expansion: f32) -> Mask {
    let face_w = bbox.width() * expansion;
    let face_h = bbox.height() * expansion;
    let center = bbox.center();
    let cx = center.x as i32;
    let cy = (center.y - face_h * HAIR_LIFT) as i32;
    let axes = ((face_w / 2.0) as i32, (face_h * HAIR_HEIGHT_STRETCH / 2.0) as i32);

    soft_ellipse(width, height, (cx, cy), axes, HAIR_BLUR_KSIZE, HAIR_BLUR_SIGMA)
}

fn soft_ellipse(
    width: u32,
    height: u32,
    center: (i32, i32),
    axes: (i32, i32),
    ksize: usize,
    sigma: f32,
) -> Mask {
    let mut canvas = GrayImage::new(width, height);
    if axes.0 > 0 && axes.1 > 0 {
        draw_filled_ellipse_mut(&mut canvas, center, axes.0, axes.1, Luma([255u8]));
    }
    let kernel = gaussian_kernel(ksize, sigma);
    Mask(separable_filter_equal(&canvas, &kernel))
}

/// Normalized 1-D Gaussian of `ksize` taps.
fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    let mid = (ksize as f32 - 1.0) / 2.0;
    let denom = 2.0 * sigma * sigma;
    let taps: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - mid;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}
