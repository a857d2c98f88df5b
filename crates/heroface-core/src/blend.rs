//! Fusing the recolored hero into the page.
//!
//! Gradient-domain cloning is supplied through [`SeamlessClone`]; when it
//! errors the blender falls back to a per-pixel alpha composite.

use crate::mask::Mask;
use crate::types::BoundingBox;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upward shift of the clone center, as a fraction of face height, for hair masks.
const HAIR_CENTER_LIFT: f32 = 0.1;

#[derive(Error, Debug)]
pub enum BlendError {
    #[error("seamless clone backend not available in this build")]
    Unavailable,
    #[error("size mismatch: source {source_dims:?}, target {target_dims:?}, mask {mask_dims:?}")]
    DimensionMismatch {
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        mask_dims: (u32, u32),
    },
    #[error("mask selects no pixels")]
    EmptyMask,
    #[error("seamless clone failed: {0}")]
    Backend(String),
}

/// How the final image was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMethod {
    SeamlessClone,
    AlphaBlend,
}

impl BlendMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMethod::SeamlessClone => "seamless_clone",
            BlendMethod::AlphaBlend => "alpha_blend",
        }
    }
}

/// Gradient-domain (Poisson) cloning in "normal" mode: source gradients
/// replace target gradients inside the mask, guided by `center`.
pub trait SeamlessClone {
    fn seamless_clone(
        &self,
        source: &RgbImage,
        target: &RgbImage,
        mask: &Mask,
        center: (i32, i32),
    ) -> Result<RgbImage, BlendError>;
}

impl<T: SeamlessClone + ?Sized> SeamlessClone for &T {
    fn seamless_clone(
        &self,
        source: &RgbImage,
        target: &RgbImage,
        mask: &Mask,
        center: (i32, i32),
    ) -> Result<RgbImage, BlendError> {
        (**self).seamless_clone(source, target, mask, center)
    }
}

impl<T: SeamlessClone + ?Sized> SeamlessClone for Box<T> {
    fn seamless_clone(
        &self,
        source: &RgbImage,
        target: &RgbImage,
        mask: &Mask,
        center: (i32, i32),
    ) -> Result<RgbImage, BlendError> {
        (**self).seamless_clone(source, target, mask, center)
    }
}

/// Backend for builds without a gradient-domain solver; always errors so
/// the alpha fallback runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSeamlessClone;

impl SeamlessClone for UnavailableSeamlessClone {
    fn seamless_clone(
        &self,
        _source: &RgbImage,
        _target: &RgbImage,
        _mask: &Mask,
        _center: (i32, i32),
    ) -> Result<RgbImage, BlendError> {
        Err(BlendError::Unavailable)
    }
}

/// OpenCV `seamlessClone` with `NORMAL_CLONE`.
#[cfg(feature = "opencv")]
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvSeamlessClone;

#[cfg(feature = "opencv")]
impl SeamlessClone for OpenCvSeamlessClone {
    fn seamless_clone(
        &self,
        source: &RgbImage,
        target: &RgbImage,
        mask: &Mask,
        center: (i32, i32),
    ) -> Result<RgbImage, BlendError> {
        use opencv::core::{Mat, Point, Vec3b, VecN};
        use opencv::prelude::*;

        check_dimensions(source, target, mask)?;
        if mask.count_above(0) == 0 {
            return Err(BlendError::EmptyMask);
        }
        let backend = |e: opencv::Error| BlendError::Backend(e.to_string());
        let (w, h) = target.dimensions();
        let to_vec3 = |img: &RgbImage| -> Vec<Vec3b> {
            img.pixels().map(|p| VecN([p[0], p[1], p[2]])).collect()
        };

        let src_px = to_vec3(source);
        let dst_px = to_vec3(target);
        let src_mat = Mat::new_rows_cols_with_data(h as i32, w as i32, &src_px).map_err(backend)?;
        let dst_mat = Mat::new_rows_cols_with_data(h as i32, w as i32, &dst_px).map_err(backend)?;
        let mask_mat =
            Mat::new_rows_cols_with_data(h as i32, w as i32, mask.values()).map_err(backend)?;

        let mut out = Mat::default();
        opencv::photo::seamless_clone(
            &*src_mat,
            &*dst_mat,
            &*mask_mat,
            Point::new(center.0, center.1),
            &mut out,
            opencv::photo::NORMAL_CLONE,
        )
        .map_err(backend)?;

        let bytes = out.data_bytes().map_err(backend)?.to_vec();
        RgbImage::from_raw(w, h, bytes)
            .ok_or_else(|| BlendError::Backend("unexpected output buffer size".into()))
    }
}

/// The default backend for this build.
pub fn default_seamless_clone() -> Box<dyn SeamlessClone + Send + Sync> {
    #[cfg(feature = "opencv")]
    {
        Box::new(OpenCvSeamlessClone)
    }
    #[cfg(not(feature = "opencv"))]
    {
        Box::new(UnavailableSeamlessClone)
    }
}

/// Output of [`blend`].
#[derive(Debug, Clone)]
pub struct Blended {
    pub image: RgbImage,
    pub method: BlendMethod,
}

/// Clone guide point: the page face center, raised by 10% of the face
/// height when the hair mask is used.
pub fn blend_center(bbox: &BoundingBox, include_hair: bool) -> (i32, i32) {
    let center = bbox.center();
    let cx = center.x as i32;
    let mut cy = center.y as i32;
    if include_hair {
        cy = (cy as f32 - bbox.height() * HAIR_CENTER_LIFT) as i32;
    }
    (cx, cy)
}

/// Blend `source` into `target` with `cloner`, falling back to
/// [`alpha_blend`] if cloning fails.
pub fn blend<C: SeamlessClone + ?Sized>(
    cloner: &C,
    source: &RgbImage,
    target: &RgbImage,
    mask: &Mask,
    center: (i32, i32),
) -> Result<Blended, BlendError> {
    check_dimensions(source, target, mask)?;

    match cloner.seamless_clone(source, target, mask, center) {
        Ok(image) if image.dimensions() == target.dimensions() => Ok(Blended {
            image,
            method: BlendMethod::SeamlessClone,
        }),
        Ok(image) => {
            tracing::warn!(
                got = ?image.dimensions(),
                want = ?target.dimensions(),
                "seamless clone returned wrong size, falling back to alpha blend"
            );
            alpha_blend(source, target, mask).map(Blended::alpha)
        }
        Err(err) => {
            tracing::warn!(error = %err, "seamless clone failed, falling back to alpha blend");
            alpha_blend(source, target, mask).map(Blended::alpha)
        }
    }
}

impl Blended {
    fn alpha(image: RgbImage) -> Self {
        Self { image, method: BlendMethod::AlphaBlend }
    }
}

/// `result = source * alpha + target * (1 - alpha)`, alpha = mask / 255,
/// truncated to 8 bits.
pub fn alpha_blend(
    source: &RgbImage,
    target: &RgbImage,
    mask: &Mask,
) -> Result<RgbImage, BlendError> {
    check_dimensions(source, target, mask)?;

    Ok(RgbImage::from_fn(target.width(), target.height(), |x, y| {
        let alpha = f32::from(mask.get(x, y)) / 255.0;
        let s = source.get_pixel(x, y);
        let t = target.get_pixel(x, y);
        Rgb(std::array::from_fn(|c| {
            (f32::from(s[c]) * alpha + f32::from(t[c]) * (1.0 - alpha)) as u8
        }))
    }))
}

fn check_dimensions(source: &RgbImage, target: &RgbImage, mask: &Mask) -> Result<(), BlendError> {
    if source.dimensions() != target.dimensions() || mask.dimensions() != target.dimensions() {
        return Err(BlendError::DimensionMismatch {
            source_dims: source.dimensions(),
            target_dims: target.dimensions(),
            mask_dims: mask.dimensions(),
        });
    }
    Ok(())
}
