//! Channel pyramids and the image construction API: converting caller pixels
//! into the per-channel float planes the preprocessor and comparator work
//! on.

use crate::blur;
use crate::color::{self, GammaLut, Lab};

/// Color layouts accepted at the raw-bytes entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorType {
    /// 1 byte/pixel, 1 channel.
    Gray,
    /// 3 bytes/pixel, 3 channels.
    Rgb,
    /// 4 bytes/pixel, 3 channels after alpha compositing.
    Rgba,
    /// 4 bytes/pixel, 1 channel (luma only; chroma is discarded).
    RgbaToGray,
    /// 1 float/pixel, already normalized to `[0, 1]`.
    Luma,
    /// 3 floats/pixel, each already in `[0, 1]`.
    Lab,
}

impl ColorType {
    pub(crate) fn channel_count(self) -> usize {
        match self {
            ColorType::Gray | ColorType::RgbaToGray | ColorType::Luma => 1,
            ColorType::Rgb | ColorType::Rgba | ColorType::Lab => 3,
        }
    }
}

/// Fills one luma-resolution output row per call, one mutable slice per
/// channel.
///
/// Implementations are asked exactly once per row, in increasing `y`, and
/// must fill every slice in `rows` to `width` floats. Chroma channels
/// receive the same full-width row as luma; the core averages row pairs
/// internally when subsampling.
pub trait RowProducer {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn channels(&self) -> usize;
    fn row(&mut self, y: usize, rows: &mut [&mut [f32]]);
}

/// One color channel at one pyramid scale.
#[derive(Clone, Debug)]
pub(crate) struct Channel {
    pub width: usize,
    pub height: usize,
    pub img: Option<Vec<f32>>,
    pub mu: Option<Vec<f32>>,
    pub img_sq_blur: Option<Vec<f32>>,
    pub blur_size: usize,
    pub is_chroma: bool,
}

impl Channel {
    fn new(width: usize, height: usize, img: Vec<f32>, is_chroma: bool, blur_size: usize) -> Self {
        debug_assert_eq!(img.len(), width * height);
        Channel {
            width,
            height,
            img: Some(img),
            mu: None,
            img_sq_blur: None,
            blur_size,
            is_chroma,
        }
    }
}

/// An ingested, preprocessed image: one pyramid (`Vec<Channel>`, one entry
/// per scale) per color channel.
#[derive(Clone, Debug)]
pub struct DssimImage {
    pub(crate) pyramids: Vec<Vec<Channel>>,
}

impl DssimImage {
    pub(crate) fn channel_count(&self) -> usize {
        self.pyramids.len()
    }
}

/// Average of four pixels at `(2x, 2y)`, `(2x+1, 2y)`, `(2x, 2y+1)`,
/// `(2x+1, 2y+1)` in a `src_width`-wide plane. Shared by 2x2 pyramid
/// downsampling and chroma row-pair subsampling during ingestion: both are
/// the same box-averaging operation.
fn subsampled_copy(src: &[f32], src_width: usize, dst: &mut [f32], dst_width: usize, dst_height: usize) {
    for dy in 0..dst_height {
        for dx in 0..dst_width {
            let x0 = 2 * dx;
            let y0 = 2 * dy;
            let a = src[y0 * src_width + x0];
            let b = src[y0 * src_width + x0 + 1];
            let c = src[(y0 + 1) * src_width + x0];
            let d = src[(y0 + 1) * src_width + x0 + 1];
            dst[dy * dst_width + dx] = 0.25 * (a + b + c + d);
        }
    }
}

/// Builds the pyramid tail for one channel: repeatedly 2x2-downsamples the
/// top level until `num_scales` levels exist or a dimension would reach
/// zero.
fn build_pyramid(top: Channel, num_scales: usize) -> Vec<Channel> {
    let mut levels = Vec::with_capacity(num_scales);
    levels.push(top);
    while levels.len() < num_scales {
        let prev = levels.last().unwrap();
        let (pw, ph) = (prev.width, prev.height);
        let (nw, nh) = (pw / 2, ph / 2);
        if nw == 0 || nh == 0 {
            break;
        }
        let prev_img = prev.img.as_ref().expect("pyramid source level must still own its image");
        let mut next_img = vec![0.0f32; nw * nh];
        subsampled_copy(prev_img, pw, &mut next_img, nw, nh);
        levels.push(Channel::new(nw, nh, next_img, prev.is_chroma, prev.blur_size));
    }
    levels
}

/// Collects each channel's rows from a [`RowProducer`] into full-resolution
/// float planes, subsampling chroma row pairs if requested, then builds and
/// preprocesses the pyramid.
pub(crate) fn build_image<P: RowProducer>(
    mut producer: P,
    num_scales: usize,
    detail_size: usize,
    subsample_chroma: bool,
    scratch: &mut Vec<f32>,
) -> Option<DssimImage> {
    let width = producer.width();
    let height = producer.height();
    let channels = producer.channels();
    if width == 0 || height == 0 || (channels != 1 && channels != 3) {
        return None;
    }

    let chroma_subsampled = subsample_chroma && channels == 3;
    // Floor division, matching the grounding source: a trailing unpaired row
    // or column is dropped rather than folded in, not averaged against itself.
    let (chroma_w, chroma_h) = if chroma_subsampled { (width / 2, height / 2) } else { (width, height) };

    let mut planes: Vec<Vec<f32>> = (0..channels)
        .map(|c| {
            let (w, h) = if c == 0 || !chroma_subsampled { (width, height) } else { (chroma_w, chroma_h) };
            vec![0.0f32; w * h]
        })
        .collect();

    let mut row_bufs: Vec<Vec<f32>> = (0..channels).map(|_| vec![0.0f32; width]).collect();
    let mut pending_chroma: Option<Vec<Vec<f32>>> = if chroma_subsampled {
        Some((1..channels).map(|_| vec![0.0f32; width]).collect())
    } else {
        None
    };

    for y in 0..height {
        {
            let mut refs: Vec<&mut [f32]> = row_bufs.iter_mut().map(|r| r.as_mut_slice()).collect();
            producer.row(y, &mut refs);
        }

        planes[0][y * width..(y + 1) * width].copy_from_slice(&row_bufs[0]);

        if chroma_subsampled {
            let pending = pending_chroma.as_mut().unwrap();
            if y % 2 == 0 {
                // A trailing unpaired row (odd height) is never folded in: no
                // further action is taken once its partner row never arrives.
                for c in 1..channels {
                    pending[c - 1].copy_from_slice(&row_bufs[c]);
                }
            } else {
                let out_y = y / 2;
                for c in 1..channels {
                    average_row_pair_into(&pending[c - 1], &row_bufs[c], &mut planes[c], out_y, chroma_w);
                }
            }
        } else {
            for c in 1..channels {
                planes[c][y * width..(y + 1) * width].copy_from_slice(&row_bufs[c]);
            }
        }
    }

    let mut pyramids = Vec::with_capacity(channels);
    for (c, plane) in planes.into_iter().enumerate() {
        let is_chroma = channels == 3 && c != 0;
        let (w, h) = if c == 0 || !chroma_subsampled { (width, height) } else { (chroma_w, chroma_h) };
        let blur_size = if is_chroma { 2 } else { 1 } * (detail_size + 1);
        let top = Channel::new(w, h, plane, is_chroma, blur_size);
        pyramids.push(build_pyramid(top, num_scales));
    }

    preprocess(&mut pyramids, scratch);

    Some(DssimImage { pyramids })
}

/// Averages two consecutive full-width rows into one half-width chroma row.
/// `dst_width` is `src_width / 2` (floor), so a trailing unpaired column on an
/// odd-width image is simply never read, matching the source's own
/// `subsampled_copy`.
fn average_row_pair_into(row_a: &[f32], row_b: &[f32], dst_plane: &mut [f32], out_y: usize, dst_width: usize) {
    let dst_row = &mut dst_plane[out_y * dst_width..(out_y + 1) * dst_width];
    for (dx, slot) in dst_row.iter_mut().enumerate() {
        let x0 = 2 * dx;
        let x1 = x0 + 1;
        *slot = 0.25 * (row_a[x0] + row_a[x1] + row_b[x0] + row_b[x1]);
    }
}

/// Runs the μ / E[x²] blur statistics over every channel and scale of a
/// freshly built pyramid.
fn preprocess(pyramids: &mut [Vec<Channel>], scratch: &mut Vec<f32>) {
    for pyramid in pyramids.iter_mut() {
        for ch in pyramid.iter_mut() {
            let needed = blur::scratch_len(ch.width, ch.height);
            if scratch.len() < needed {
                scratch.resize(needed, 0.0);
            }

            if ch.is_chroma {
                let img = ch.img.as_mut().expect("channel must have img before preprocessing");
                blur::blur_in_place(img, &mut scratch[..needed], ch.width, ch.height, 2);
            }

            let img = ch.img.as_ref().expect("channel must have img before preprocessing");
            let mut mu = vec![0.0f32; img.len()];
            blur::blur_into(img, &mut scratch[..needed], &mut mu, ch.width, ch.height, ch.blur_size);

            let mut sq_blur = vec![0.0f32; img.len()];
            blur::blur_squared_into(img, &mut scratch[..needed], &mut sq_blur, ch.width, ch.height, ch.blur_size);

            ch.mu = Some(mu);
            ch.img_sq_blur = Some(sq_blur);
        }
    }
}

/// A [`RowProducer`] adapter over raw bytes in one of [`ColorType`]'s 8-bit
/// layouts.
pub(crate) struct BytesRowProducer<'a> {
    bytes: &'a [u8],
    width: usize,
    height: usize,
    color_type: ColorType,
    lut: GammaLut,
    gray_lut: [f32; 256],
}

impl<'a> BytesRowProducer<'a> {
    pub(crate) fn new(bytes: &'a [u8], color_type: ColorType, width: usize, height: usize, gamma: f64) -> Option<Self> {
        let bytes_per_pixel = match color_type {
            ColorType::Gray => 1,
            ColorType::Rgb => 3,
            ColorType::Rgba | ColorType::RgbaToGray => 4,
            ColorType::Luma => 4, // f32 stored as 4 bytes
            ColorType::Lab => 12, // 3 x f32
        };
        if bytes.len() != bytes_per_pixel * width * height {
            return None;
        }
        Some(BytesRowProducer {
            bytes,
            width,
            height,
            color_type,
            lut: GammaLut::new(gamma),
            gray_lut: color::gray_lut(gamma),
        })
    }

    fn lab_at(&self, x: usize, y: usize) -> Lab {
        let w = self.width;
        match self.color_type {
            ColorType::Gray => {
                let byte = self.bytes[y * w + x];
                Lab { l: self.gray_lut[byte as usize], a: 0.5, b: 0.5 }
            }
            ColorType::Rgb => {
                let i = (y * w + x) * 3;
                let px = rgb::RGB8::new(self.bytes[i], self.bytes[i + 1], self.bytes[i + 2]);
                color::rgb_to_lab(&self.lut, px)
            }
            ColorType::Rgba | ColorType::RgbaToGray => {
                let i = (y * w + x) * 4;
                let px = rgb::RGBA8::new(self.bytes[i], self.bytes[i + 1], self.bytes[i + 2], self.bytes[i + 3]);
                color::rgba_to_lab_composited(&self.lut, px, x, y)
            }
            ColorType::Luma => {
                let i = (y * w + x) * 4;
                let l = f32::from_le_bytes([self.bytes[i], self.bytes[i + 1], self.bytes[i + 2], self.bytes[i + 3]]);
                Lab { l, a: 0.5, b: 0.5 }
            }
            ColorType::Lab => {
                let i = (y * w + x) * 12;
                let get = |off: usize| f32::from_le_bytes([self.bytes[i + off], self.bytes[i + off + 1], self.bytes[i + off + 2], self.bytes[i + off + 3]]);
                Lab { l: get(0), a: get(4), b: get(8) }
            }
        }
    }
}

impl<'a> RowProducer for BytesRowProducer<'a> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn channels(&self) -> usize {
        self.color_type.channel_count()
    }

    fn row(&mut self, y: usize, rows: &mut [&mut [f32]]) {
        match rows.len() {
            1 => {
                for x in 0..self.width {
                    rows[0][x] = self.lab_at(x, y).l;
                }
            }
            3 => {
                for x in 0..self.width {
                    let lab = self.lab_at(x, y);
                    rows[0][x] = lab.l;
                    rows[1][x] = lab.a;
                    rows[2][x] = lab.b;
                }
            }
            _ => unreachable!("channel count already validated to be 1 or 3"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstProducer {
        width: usize,
        height: usize,
        channels: usize,
        value: f32,
    }

    impl RowProducer for ConstProducer {
        fn width(&self) -> usize {
            self.width
        }
        fn height(&self) -> usize {
            self.height
        }
        fn channels(&self) -> usize {
            self.channels
        }
        fn row(&mut self, _y: usize, rows: &mut [&mut [f32]]) {
            for row in rows.iter_mut() {
                row.iter_mut().for_each(|v| *v = self.value);
            }
        }
    }

    #[test]
    fn constant_image_preprocesses_to_matching_mu_and_variance() {
        let producer = ConstProducer { width: 6, height: 6, channels: 3, value: 0.4 };
        let mut scratch = Vec::new();
        let image = build_image(producer, 3, 1, true, &mut scratch).unwrap();
        for pyramid in &image.pyramids {
            for ch in pyramid {
                let mu = ch.mu.as_ref().unwrap();
                for &v in mu {
                    assert!((v - 0.4).abs() < 1e-5, "{v}");
                }
                let sq = ch.img_sq_blur.as_ref().unwrap();
                for &v in sq {
                    assert!((v - 0.16).abs() < 1e-4, "{v}");
                }
            }
        }
    }

    #[test]
    fn pyramid_terminates_before_requested_scales_on_small_images() {
        let producer = ConstProducer { width: 3, height: 1, channels: 1, value: 0.1 };
        let mut scratch = Vec::new();
        let image = build_image(producer, 5, 0, true, &mut scratch).unwrap();
        assert!(image.pyramids[0].len() < 5);
        assert_eq!(image.pyramids[0][0].width, 3);
        assert_eq!(image.pyramids[0][0].height, 1);
    }

    #[test]
    fn chroma_channels_are_half_resolution_when_subsampling() {
        let producer = ConstProducer { width: 8, height: 8, channels: 3, value: 0.2 };
        let mut scratch = Vec::new();
        let image = build_image(producer, 1, 0, true, &mut scratch).unwrap();
        assert_eq!(image.pyramids[0][0].width, 8);
        assert_eq!(image.pyramids[1][0].width, 4);
        assert_eq!(image.pyramids[2][0].height, 4);
    }

    #[test]
    fn chroma_channels_keep_full_resolution_when_not_subsampling() {
        let producer = ConstProducer { width: 8, height: 6, channels: 3, value: 0.2 };
        let mut scratch = Vec::new();
        let image = build_image(producer, 1, 0, false, &mut scratch).unwrap();
        assert_eq!(image.pyramids[1][0].width, 8);
        assert_eq!(image.pyramids[1][0].height, 6);
    }

    struct ColumnRamp {
        width: usize,
        height: usize,
    }

    impl RowProducer for ColumnRamp {
        fn width(&self) -> usize {
            self.width
        }
        fn height(&self) -> usize {
            self.height
        }
        fn channels(&self) -> usize {
            3
        }
        fn row(&mut self, _y: usize, rows: &mut [&mut [f32]]) {
            for x in 0..self.width {
                rows[0][x] = 0.0;
                rows[1][x] = x as f32;
                rows[2][x] = x as f32;
            }
        }
    }

    #[test]
    fn odd_dimensions_floor_chroma_and_drop_the_trailing_row_and_column() {
        let producer = ColumnRamp { width: 5, height: 5 };
        let mut scratch = Vec::new();
        let image = build_image(producer, 1, 0, true, &mut scratch).unwrap();

        // Floor division, not ceil: a 5-wide/5-tall luma plane yields a
        // 2x2 chroma plane, with column 4 and row 4 dropped rather than
        // folded in or duplicated.
        assert_eq!(image.pyramids[1][0].width, 2);
        assert_eq!(image.pyramids[1][0].height, 2);

        // Before preprocessing blurs it, the raw chroma plane at (0,0) is the
        // average of columns 0 and 1 (0.5); at (1,0) it's columns 2 and 3 (2.5).
        // Reconstruct the pre-blur values the same way build_image did, since
        // `image.pyramids` only exposes the preprocessed channel.
        let mut raw = vec![0.0f32; 2 * 2];
        average_row_pair_into(&[0.0, 1.0, 2.0, 3.0, 4.0], &[0.0, 1.0, 2.0, 3.0, 4.0], &mut raw, 0, 2);
        average_row_pair_into(&[0.0, 1.0, 2.0, 3.0, 4.0], &[0.0, 1.0, 2.0, 3.0, 4.0], &mut raw, 1, 2);
        assert!((raw[0] - 0.5).abs() < 1e-6);
        assert!((raw[1] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn invalid_channel_count_is_rejected() {
        let producer = ConstProducer { width: 4, height: 4, channels: 2, value: 0.0 };
        let mut scratch = Vec::new();
        assert!(build_image(producer, 1, 0, true, &mut scratch).is_none());
    }

    #[test]
    fn bytes_row_producer_rejects_mismatched_buffer_length() {
        let bytes = vec![0u8; 10];
        assert!(BytesRowProducer::new(&bytes, ColorType::Rgb, 4, 4, 0.45455).is_none());
    }
}
