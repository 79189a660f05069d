//! Configuration and entry points: the [`Dssim`] attribute bundle owns the
//! tunable parameters and the reusable scratch buffer, and is the thing
//! callers construct images and run comparisons through.

use crate::blur;
use crate::compare::{self, SsimMap};
use crate::image::{self, BytesRowProducer, ColorType, DssimImage, RowProducer};

const DEFAULT_SCALE_WEIGHTS: [f64; 5] = [0.0448, 0.2856, 0.3001, 0.2363, 0.1333];
const MAX_SCALES: usize = 5;

/// Holds tunable parameters and a reusable scratch buffer for image
/// preprocessing.
///
/// Construct with [`Dssim::new`], configure with the `set_*` methods, then
/// build images with [`Dssim::create_image`] or [`Dssim::create_image_bytes`]
/// and compare them with [`Dssim::compare`].
#[derive(Debug)]
pub struct Dssim {
    color_weight: f64,
    num_scales: usize,
    scale_weights: Vec<f64>,
    detail_size: usize,
    subsample_chroma: bool,
    tmp: Vec<f32>,
}

impl Default for Dssim {
    fn default() -> Self {
        Dssim::new()
    }
}

impl Dssim {
    /// Creates an attribute bundle with the default 4-scale weighting,
    /// `color_weight = 0.95`, `detail_size = 1`, and chroma subsampling on.
    pub fn new() -> Self {
        let mut attr = Dssim {
            color_weight: 0.95,
            num_scales: 4,
            scale_weights: Vec::new(),
            detail_size: 1,
            subsample_chroma: true,
            tmp: Vec::new(),
        };
        attr.set_scales(4, None);
        attr
    }

    /// Sets the number of pyramid scales (clamped to `[1, 5]`) and their
    /// weights. `weights`, if given, must have `num_scales` entries and all
    /// positive; `None` uses the built-in defaults truncated/padded to
    /// `num_scales`. The stored weights are always renormalized to sum to 1.
    pub fn set_scales(&mut self, num_scales: usize, weights: Option<&[f64]>) {
        let num_scales = num_scales.clamp(1, MAX_SCALES);
        let mut w: Vec<f64> = match weights {
            Some(w) if w.len() == num_scales && w.iter().all(|&x| x > 0.0) => w.to_vec(),
            _ => DEFAULT_SCALE_WEIGHTS[..num_scales].to_vec(),
        };
        let total: f64 = w.iter().sum();
        for v in w.iter_mut() {
            *v /= total;
        }
        self.num_scales = num_scales;
        self.scale_weights = w;
    }

    /// Sets the weight applied to chroma channels relative to luma (default
    /// `0.95`).
    pub fn set_color_weight(&mut self, color_weight: f64) {
        self.color_weight = color_weight;
    }

    /// Sets whether chroma channels are subsampled to half resolution
    /// (default `true`).
    pub fn set_subsample_chroma(&mut self, subsample: bool) {
        self.subsample_chroma = subsample;
    }

    /// Sets the detail size: higher values smooth over finer single-pixel
    /// differences (default `1`).
    pub fn set_detail_size(&mut self, detail_size: usize) {
        self.detail_size = detail_size;
    }

    #[must_use]
    pub fn num_scales(&self) -> usize {
        self.num_scales
    }

    #[must_use]
    pub fn scale_weights(&self) -> &[f64] {
        &self.scale_weights
    }

    fn ensure_scratch(&mut self, width: usize, height: usize) {
        let needed = blur::scratch_len(width, height);
        if self.tmp.len() < needed {
            self.tmp.resize(needed, 0.0);
        }
    }

    /// Builds an image from raw 8-bit (or pre-converted float) pixel bytes.
    ///
    /// Returns `None` if `bytes` doesn't match `width * height` pixels at
    /// `color_type`'s layout, or if the resulting channel count isn't 1 or 3.
    #[must_use]
    pub fn create_image_bytes(&mut self, color_type: ColorType, bytes: &[u8], width: usize, height: usize, gamma: f64) -> Option<DssimImage> {
        let producer = BytesRowProducer::new(bytes, color_type, width, height, gamma)?;
        self.create_image(producer)
    }

    /// Builds an image from a caller-supplied [`RowProducer`].
    ///
    /// Returns `None` if the producer reports 0 width/height, or a channel
    /// count other than 1 or 3.
    #[must_use]
    pub fn create_image<P: RowProducer>(&mut self, producer: P) -> Option<DssimImage> {
        let width = producer.width();
        let height = producer.height();
        self.ensure_scratch(width, height);
        image::build_image(producer, self.num_scales, self.detail_size, self.subsample_chroma, &mut self.tmp)
    }

    /// Compares a reference image against a modified one and returns the
    /// DSSIM value (`>= 0`, or `NaN` if every scale/channel was skipped).
    ///
    /// `modified` is consumed: its buffers are reused internally during the
    /// comparison, so a second `compare` call against the same image value
    /// is impossible rather than merely unsupported.
    #[must_use]
    pub fn compare(&mut self, original: &DssimImage, modified: DssimImage) -> f64 {
        self.compare_with_map(original, modified).0
    }

    /// Like [`Dssim::compare`], but also returns the channel-0/scale-0
    /// per-pixel SSIM map when requested.
    #[must_use]
    pub fn compare_with_map(&mut self, original: &DssimImage, modified: DssimImage) -> (f64, Option<SsimMap>) {
        compare::compare(original, modified, self.color_weight, &self.scale_weights, &mut self.tmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let attr = Dssim::new();
        let sum: f64 = attr.scale_weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "{sum}");
    }

    #[test]
    fn explicit_default_weights_match_implicit_default() {
        let mut with_none = Dssim::new();
        with_none.set_scales(4, None);

        let mut with_explicit = Dssim::new();
        with_explicit.set_scales(4, Some(&[0.0448, 0.2856, 0.3001, 0.2363]));

        for (a, b) in with_none.scale_weights().iter().zip(with_explicit.scale_weights()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn num_scales_is_clamped_to_valid_range() {
        let mut attr = Dssim::new();
        attr.set_scales(0, None);
        assert_eq!(attr.num_scales(), 1);
        attr.set_scales(99, None);
        assert_eq!(attr.num_scales(), MAX_SCALES);
    }

    #[test]
    fn weights_renormalize_after_custom_set() {
        let mut attr = Dssim::new();
        attr.set_scales(3, Some(&[1.0, 1.0, 2.0]));
        let sum: f64 = attr.scale_weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((attr.scale_weights()[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mismatched_weight_length_falls_back_to_defaults() {
        let mut attr = Dssim::new();
        attr.set_scales(3, Some(&[1.0, 1.0]));
        let sum: f64 = attr.scale_weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(attr.scale_weights().len(), 3);
    }
}
