//! Separable box blur used to approximate a Gaussian at every pyramid scale.
//!
//! A single [`blur`]/[`blur_in_place`] call runs `passes` 3-tap box blurs
//! horizontally, transposes, runs `passes` more, then transposes back. The
//! two transposes are what make a separable *horizontal-only* kernel act as
//! a 2D blur.

/// A function applied to a row before its first blur pass, fusing a
/// preprocessing step (e.g. squaring) into pass 0 instead of running it as a
/// separate full pass over the image.
pub(crate) type RowOp = fn(&[f32], &mut [f32]);

pub(crate) fn square_row(src: &[f32], dst: &mut [f32]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s * s;
    }
}

/// Minimum length the shared scratch buffer must have to blur a
/// `width x height` image: room for the full transposed image, plus two
/// row-length ping-pong buffers sized to the longer dimension.
///
/// The `2 * max(width, height)` term is a deliberate generalization of the
/// original pointer-aliasing scheme, which assumed `width * height` was
/// always large enough to host two lines; that assumption fails for images
/// one pixel wide or tall.
pub(crate) fn scratch_len(width: usize, height: usize) -> usize {
    width * height + 2 * width.max(height)
}

#[inline(always)]
fn box_blur_row(src: &[f32], dst: &mut [f32]) {
    let width = src.len();
    for i in 0..width {
        let prev = src[i.saturating_sub(1)];
        let next = src[(i + 1).min(width - 1)];
        dst[i] = (prev + src[i] + next) / 3.0;
    }
}

/// Runs `passes` box-blur passes over a single row, in place.
///
/// `row_op`, if present, is applied once to produce the input to pass 0
/// (fusing e.g. squaring into the first pass); it does not count as a pass
/// itself. `line_a`/`line_b` are scratch rows of length `row.len()` used to
/// ping-pong between passes; the final result is always copied back into
/// `row`, so this is safe to call with `row` aliasing the channel's own
/// storage.
fn blur_row_in_place(row: &mut [f32], passes: usize, row_op: Option<RowOp>, line_a: &mut [f32], line_b: &mut [f32]) {
    debug_assert!(passes >= 1);
    match row_op {
        Some(op) => op(row, line_a),
        None => line_a.copy_from_slice(row),
    }

    let mut result_in_a = true;
    for _ in 0..passes {
        if result_in_a {
            box_blur_row(line_a, line_b);
        } else {
            box_blur_row(line_b, line_a);
        }
        result_in_a = !result_in_a;
    }

    if result_in_a {
        row.copy_from_slice(line_a);
    } else {
        row.copy_from_slice(line_b);
    }
}

/// Transposes a `width x height` row-major plane into a `height x width`
/// one. Done four rows at a time to keep the inner loop's writes to
/// reasonably nearby cache lines.
fn transpose(src: &[f32], dst: &mut [f32], width: usize, height: usize) {
    debug_assert_eq!(src.len(), width * height);
    debug_assert_eq!(dst.len(), width * height);

    let mut j = 0;
    while j + 4 <= height {
        let row0 = &src[(j) * width..(j + 1) * width];
        let row1 = &src[(j + 1) * width..(j + 2) * width];
        let row2 = &src[(j + 2) * width..(j + 3) * width];
        let row3 = &src[(j + 3) * width..(j + 4) * width];
        for i in 0..width {
            dst[i * height + j] = row0[i];
            dst[i * height + j + 1] = row1[i];
            dst[i * height + j + 2] = row2[i];
            dst[i * height + j + 3] = row3[i];
        }
        j += 4;
    }
    while j < height {
        let row = &src[j * width..(j + 1) * width];
        for i in 0..width {
            dst[i * height + j] = row[i];
        }
        j += 1;
    }
}

/// Blurs `buf` (a `width x height` row-major plane) in place.
///
/// `scratch` must be at least [`scratch_len`] long; it is used both as the
/// transposed-image workspace and, in the other phase, as the row
/// ping-pong area.
pub(crate) fn blur_in_place(buf: &mut [f32], scratch: &mut [f32], width: usize, height: usize, passes: usize) {
    blur_core(buf, scratch, width, height, passes, None);
}

/// Blurs `src` into `dst` (leaving `src` untouched), applying `square_row`
/// to fuse the squaring into pass 0.
pub(crate) fn blur_squared_into(src: &[f32], scratch: &mut [f32], dst: &mut [f32], width: usize, height: usize, passes: usize) {
    dst.copy_from_slice(src);
    blur_core(dst, scratch, width, height, passes, Some(square_row));
}

/// Blurs `src` into `dst` (leaving `src` untouched).
pub(crate) fn blur_into(src: &[f32], scratch: &mut [f32], dst: &mut [f32], width: usize, height: usize, passes: usize) {
    dst.copy_from_slice(src);
    blur_core(dst, scratch, width, height, passes, None);
}

fn blur_core(buf: &mut [f32], scratch: &mut [f32], width: usize, height: usize, passes: usize, row_op: Option<RowOp>) {
    let area = width * height;
    debug_assert_eq!(buf.len(), area);
    debug_assert!(scratch.len() >= scratch_len(width, height));

    let m = width.max(height);
    let (workspace, lines) = scratch.split_at_mut(area);
    let (line_a, line_b) = lines.split_at_mut(m);

    // Phase 1: horizontal blur, in place within `buf`.
    for y in 0..height {
        let row = &mut buf[y * width..(y + 1) * width];
        blur_row_in_place(row, passes, row_op, &mut line_a[..width], &mut line_b[..width]);
    }

    // Phase 2: transpose into the workspace (now logically height x width).
    transpose(buf, workspace, width, height);

    // Phase 3: horizontal blur on the transposed data, in place.
    for y in 0..width {
        let row = &mut workspace[y * height..(y + 1) * height];
        blur_row_in_place(row, passes, None, &mut line_a[..height], &mut line_b[..height]);
    }

    // Phase 4: transpose back into `buf`, restoring the original orientation.
    transpose(workspace, buf, height, width);
}
