//! Multi-scale SSIM comparison: walks two channel pyramids in lockstep,
//! computes per-pixel SSIM via blurred statistics, and combines the
//! per-channel per-scale means into a single DSSIM value.

use imgref::ImgVec;

use crate::blur;
use crate::image::{Channel, DssimImage};

const C1: f32 = 0.0001;
const C2: f32 = 0.0009;

/// Per-pixel SSIM map for channel 0, scale 0, requested via
/// [`crate::Dssim::compare_with_map`].
pub type SsimMap = ImgVec<f32>;

/// Compares `original` against `modified` (consumed) and returns the DSSIM
/// value plus, if channel 0 scale 0 produced one, the per-pixel SSIM map.
///
/// `scratch` is the attribute bundle's own scratch buffer, reused here
/// rather than allocated fresh per channel/scale.
pub(crate) fn compare(original: &DssimImage, modified: DssimImage, color_weight: f64, scale_weights: &[f64], scratch: &mut Vec<f32>) -> (f64, Option<SsimMap>) {
    let mut total_weighted = 0.0f64;
    let mut total_weight = 0.0f64;
    let mut map = None;

    let channel_count = original.channel_count().min(modified.channel_count());

    for (ch_idx, (orig_pyramid, mod_pyramid)) in original.pyramids.iter().zip(modified.pyramids.into_iter()).take(channel_count).enumerate() {
        let is_chroma = orig_pyramid.first().map(|c| c.is_chroma).unwrap_or(false);

        for (scale, (orig_ch, mod_ch)) in orig_pyramid.iter().zip(mod_pyramid.into_iter()).enumerate() {
            if scale >= scale_weights.len() {
                break;
            }
            let weight = (if is_chroma { color_weight } else { 1.0 }) * scale_weights[scale];

            if orig_ch.width != mod_ch.width || orig_ch.height != mod_ch.height {
                // A mismatched sub-measure contributes no dissimilarity (mean = 1,
                // i.e. ssim = 1 for this channel/scale) rather than being excluded
                // from the weighted sum, so a single-scale all-mismatched compare
                // still yields 0 instead of diverging to infinity.
                total_weighted += weight;
                total_weight += weight;
                continue;
            }

            let want_map = ch_idx == 0 && scale == 0;
            let (mean, scale_map) = compare_channel(orig_ch, mod_ch, want_map, scratch);
            total_weighted += weight * mean as f64;
            total_weight += weight;
            if want_map {
                map = scale_map;
            }
        }
    }

    let dssim = if total_weight > 0.0 {
        1.0 / (total_weighted / total_weight) - 1.0
    } else {
        f64::NAN
    };

    (dssim, map)
}

/// Computes the mean SSIM over one channel at one scale, destructively
/// reusing `modified`'s buffers, and optionally returns the per-pixel map.
fn compare_channel(original: &Channel, modified: Channel, want_map: bool, scratch: &mut Vec<f32>) -> (f32, Option<SsimMap>) {
    let width = original.width;
    let height = original.height;
    let area = width * height;

    let mu_a = original.mu.as_ref().expect("original channel must be preprocessed");
    let sq_blur_a = original.img_sq_blur.as_ref().expect("original channel must be preprocessed");
    let mu_b = modified.mu.as_ref().expect("modified channel must be preprocessed");
    let sq_blur_b = modified.img_sq_blur.as_ref().expect("modified channel must be preprocessed");

    let img_a = original.img.as_ref().expect("original channel must retain its image for the product blur");
    let mut product: Vec<f32> = modified.img.expect("modified channel must retain its image for the product blur");
    debug_assert_eq!(product.len(), area);
    for (p, &a) in product.iter_mut().zip(img_a.iter()) {
        *p *= a;
    }

    let needed = blur::scratch_len(width, height);
    if scratch.len() < needed {
        scratch.resize(needed, 0.0);
    }
    let mut product_blur = vec![0.0f32; area];
    blur::blur_into(&product, &mut scratch[..needed], &mut product_blur, width, height, modified.blur_size);

    let mut sum = 0.0f64;
    let mut map_buf = if want_map { Some(vec![0.0f32; area]) } else { None };

    for i in 0..area {
        let m1 = mu_a[i];
        let m2 = mu_b[i];
        let mu1_sq = m1 * m1;
        let mu2_sq = m2 * m2;
        let mu1_mu2 = m1 * m2;

        let sigma1_sq = sq_blur_a[i] - mu1_sq;
        let sigma2_sq = sq_blur_b[i] - mu2_sq;
        let sigma12 = product_blur[i] - mu1_mu2;

        let ssim = ((2.0 * mu1_mu2 + C1) * (2.0 * sigma12 + C2)) / ((mu1_sq + mu2_sq + C1) * (sigma1_sq + sigma2_sq + C2));
        sum += ssim as f64;
        if let Some(buf) = map_buf.as_mut() {
            buf[i] = ssim;
        }
    }

    let mean = (sum / area as f64) as f32;
    let map = map_buf.map(|buf| ImgVec::new(buf, width, height));
    (mean, map)
}
