//! One-shot compositing pipeline.
//!
//! Stages run strictly in order; the first failure ends the run and is
//! reported as a [`CompositeResult::Failure`] tagged with the last stage
//! that completed.

use crate::alignment::{estimate_landmark_transform, warp_similarity};
use crate::analyzer::FaceAnalyzer;
use crate::blend::{blend, blend_center, default_seamless_clone, SeamlessClone};
use crate::color::match_colors;
use crate::error::CompositeError;
use crate::mask::{build_mask, MaskVariant};
use crate::result::{CompositeResult, CompositeSuccess};
use crate::selection::{select_largest_face, select_main_face};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Pipeline progress, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    HeroLoaded,
    HeroFaceDetected,
    PageLoaded,
    PageFacesDetected,
    MainFaceSelected,
    TransformEstimated,
    Warped,
    MaskBuilt,
    ColorMatched,
    Blended,
    Saved,
    Done,
}

/// Inputs for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeRequest {
    pub hero_path: PathBuf,
    pub page_path: PathBuf,
    pub output_path: PathBuf,
    /// Use the hair-extended mask instead of the face-only one.
    pub include_hair: bool,
}

impl CompositeRequest {
    pub fn mask_variant(&self) -> MaskVariant {
        if self.include_hair {
            MaskVariant::HairExtended
        } else {
            MaskVariant::FaceOnly
        }
    }
}

/// Sequences detection, alignment, masking, color matching and blending.
pub struct Compositor<A, C = Box<dyn SeamlessClone + Send + Sync>> {
    analyzer: A,
    cloner: C,
}

impl<A: FaceAnalyzer> Compositor<A> {
    /// Compositor using this build's default seamless-clone backend.
    pub fn new(analyzer: A) -> Self {
        Self {
            analyzer,
            cloner: default_seamless_clone(),
        }
    }
}

impl<A: FaceAnalyzer, C: SeamlessClone> Compositor<A, C> {
    pub fn with_cloner(analyzer: A, cloner: C) -> Self {
        Self { analyzer, cloner }
    }

    /// Run the whole pipeline. Never panics on bad input; every failure is
    /// returned as a typed outcome.
    pub fn run(&self, request: &CompositeRequest) -> CompositeResult {
        let mut stage = Stage::Start;
        match self.execute(request, &mut stage) {
            Ok(success) => {
                tracing::info!(
                    output = %success.output_path.display(),
                    method = success.blend_method.as_str(),
                    "composite complete"
                );
                CompositeResult::Success(success)
            }
            Err(error) => {
                tracing::warn!(?stage, kind = %error.kind(), %error, "composite failed");
                CompositeResult::failure(error, stage)
            }
        }
    }

    fn execute(
        &self,
        req: &CompositeRequest,
        stage: &mut Stage,
    ) -> Result<CompositeSuccess, CompositeError> {
        let hero = load_image(&req.hero_path).map_err(|e| {
            CompositeError::HeroHeadNotFound(format!(
                "Cannot read hero_head: {}: {e}",
                req.hero_path.display()
            ))
        })?;
        advance(stage, Stage::HeroLoaded);

        let hero_faces = self.analyzer.analyze(&hero).map_err(|e| {
            CompositeError::NoFaceInHero(format!("Face detection failed on hero_head: {e}"))
        })?;
        let hero_face = select_largest_face(&hero_faces).ok_or_else(|| {
            CompositeError::NoFaceInHero("No face detected in hero_head image".into())
        })?;
        tracing::debug!(bbox = ?hero_face.bbox, faces = hero_faces.len(), "hero face");
        advance(stage, Stage::HeroFaceDetected);

        let page = load_image(&req.page_path).map_err(|e| {
            CompositeError::PageImageNotFound(format!(
                "Cannot read page image: {}: {e}",
                req.page_path.display()
            ))
        })?;
        advance(stage, Stage::PageLoaded);

        let page_faces = self
            .analyzer
            .analyze(&page)
            .map_err(|e| CompositeError::PageFaceDetectionFailed(e.to_string()))?;
        advance(stage, Stage::PageFacesDetected);

        let (width, height) = page.dimensions();
        let page_face = select_main_face(&page_faces, width, height)
            .ok_or_else(|| CompositeError::NoFaceInPage("No face detected in page image".into()))?;
        tracing::debug!(bbox = ?page_face.bbox, faces = page_faces.len(), "page main face");
        advance(stage, Stage::MainFaceSelected);

        let transform = estimate_landmark_transform(&hero_face.landmarks, &page_face.landmarks)
            .map_err(|e| {
                CompositeError::TransformFailed(format!(
                    "Could not compute similarity transform: {e}"
                ))
            })?;
        tracing::debug!(
            scale = transform.scale(),
            rotation = transform.rotation(),
            matrix = ?transform.matrix(),
            "hero-to-page transform"
        );
        advance(stage, Stage::TransformEstimated);

        let warped = warp_similarity(&hero, &transform, width, height).ok_or_else(|| {
            CompositeError::TransformFailed("Similarity transform is not invertible".into())
        })?;
        advance(stage, Stage::Warped);

        let mask = build_mask(width, height, &page_face.bbox, req.mask_variant());
        advance(stage, Stage::MaskBuilt);

        let matched = match_colors(&warped, &page, &mask);
        advance(stage, Stage::ColorMatched);

        let center = blend_center(&page_face.bbox, req.include_hair);
        let blended = blend(&self.cloner, &matched, &page, &mask, center).map_err(|e| {
            CompositeError::TransformFailed(format!("Warped hero does not fit the page: {e}"))
        })?;
        advance(stage, Stage::Blended);

        save_image(&blended.image, &req.output_path).map_err(|e| {
            CompositeError::OutputWriteFailed(format!(
                "Cannot write output: {}: {e}",
                req.output_path.display()
            ))
        })?;
        advance(stage, Stage::Saved);

        advance(stage, Stage::Done);
        Ok(CompositeSuccess {
            output_path: req.output_path.clone(),
            blend_method: blended.method,
            hero_bbox: hero_face.bbox,
            page_bbox: page_face.bbox,
            transform,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug_assert!(next > *stage, "stage went backwards: {stage:?} -> {next:?}");
    tracing::debug!(from = ?*stage, to = ?next, "stage");
    *stage = next;
}

fn load_image(path: &Path) -> Result<RgbImage, image::ImageError> {
    Ok(image::ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgb8())
}

/// Write `image`, creating the parent directory if needed.
fn save_image(image: &RgbImage, path: &Path) -> Result<(), image::ImageError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    image.save(path)
}
