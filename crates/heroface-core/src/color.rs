//! Mean/std color transfer in CIE Lab.
//!
//! Lab values are held in the 8-bit-scaled layout (L·255/100, a+128, b+128)
//! so every channel shares the `0..=255` range that results are clipped to.

use crate::mask::{Mask, MASK_THRESHOLD};
use image::{Rgb, RgbImage};
use palette::{FromColor, Lab, Srgb};

const CHANNEL_MAX: f32 = 255.0;
const AB_OFFSET: f32 = 128.0;
const L_SCALE: f32 = 255.0 / 100.0;
/// Floor for the source deviation so near-flat channels don't explode.
const MIN_STD: f64 = 1.0;

/// Planar Lab image in the 8-bit-scaled layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LabImage {
    pub width: u32,
    pub height: u32,
    /// L, a, b planes, each `width * height` long, row-major.
    pub planes: [Vec<f32>; 3],
}

impl LabImage {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let n = image.as_raw().len() / 3;
        let mut planes = [Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n)];
        for px in image.pixels() {
            let [l, a, b] = encode(px);
            planes[0].push(l);
            planes[1].push(a);
            planes[2].push(b);
        }
        Self { width: image.width(), height: image.height(), planes }
    }

    pub fn to_rgb(&self) -> RgbImage {
        let w = self.width as usize;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let i = y as usize * w + x as usize;
            decode([self.planes[0][i], self.planes[1][i], self.planes[2][i]])
        })
    }
}

fn encode(px: &Rgb<u8>) -> [f32; 3] {
    let rgb: Srgb<f32> = Srgb::new(px[0], px[1], px[2]).into_format();
    let lab: Lab = Lab::from_color(rgb);
    [lab.l * L_SCALE, lab.a + AB_OFFSET, lab.b + AB_OFFSET]
}

fn decode(values: [f32; 3]) -> Rgb<u8> {
    let [l, a, b] = values.map(|v| v.clamp(0.0, CHANNEL_MAX));
    let lab: Lab = Lab::new(l / L_SCALE, a - AB_OFFSET, b - AB_OFFSET);
    let rgb: Srgb<f32> = Srgb::from_color(lab);
    let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * CHANNEL_MAX).round() as u8;
    Rgb([to_u8(rgb.red), to_u8(rgb.green), to_u8(rgb.blue)])
}

/// Per-channel mean and standard deviation over a pixel selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStats {
    pub mean: [f64; 3],
    pub std: [f64; 3],
}

impl ColorStats {
    /// Statistics over pixels where `selection` is true, or over the whole
    /// image when `selection` picks nothing.
    pub fn measure(image: &LabImage, selection: &[bool]) -> Self {
        let any_selected = selection.iter().any(|&s| s);
        let mut mean = [0.0; 3];
        let mut dev = [0.0; 3];

        for (c, plane) in image.planes.iter().enumerate() {
            let values = || {
                plane
                    .iter()
                    .zip(selection.iter().copied().chain(std::iter::repeat(false)))
                    .filter(move |&(_, s)| s || !any_selected)
                    .map(|(&v, _)| f64::from(v))
            };
            let count = values().count().max(1) as f64;
            let m = values().sum::<f64>() / count;
            let var = values().map(|v| (v - m) * (v - m)).sum::<f64>() / count;
            mean[c] = m;
            dev[c] = var.sqrt();
        }

        Self { mean, std: dev }
    }
}

/// Remap `source` so its statistics inside `selection` match `target`'s.
///
/// Every pixel of the source is remapped (not just the selected ones) and
/// results are clipped to the channel range.
pub fn transfer_statistics(source: &LabImage, target: &LabImage, selection: &[bool]) -> LabImage {
    let src = ColorStats::measure(source, selection);
    let tgt = ColorStats::measure(target, selection);
    tracing::debug!(?src, ?tgt, "color statistics");

    let planes = std::array::from_fn(|c| {
        let src_std = src.std[c].max(MIN_STD);
        let gain = tgt.std[c] / src_std;
        source.planes[c]
            .iter()
            .map(|&v| {
                let mapped = (f64::from(v) - src.mean[c]) * gain + tgt.mean[c];
                mapped.clamp(0.0, f64::from(CHANNEL_MAX)) as f32
            })
            .collect()
    });

    LabImage { width: source.width, height: source.height, planes }
}

/// Recolor the warped hero so its tone inside the mask matches the page.
pub fn match_colors(source: &RgbImage, target: &RgbImage, mask: &Mask) -> RgbImage {
    let selection = mask.selection(MASK_THRESHOLD);
    let source = LabImage::from_rgb(source);
    let target = LabImage::from_rgb(target);
    transfer_statistics(&source, &target, &selection).to_rgb()
}
