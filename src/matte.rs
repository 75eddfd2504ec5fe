//! Turns raw person probabilities into a soft alpha matte.

use crate::frame::Mask;

/// Probability above which a pixel counts as part of the person
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Side of the square all-ones structuring element used to grow the person region
pub const DILATE_KERNEL: usize = 10;

/// Side of the square box filter that softens the matte edge
pub const BLUR_KERNEL: usize = 30;

/// Threshold, dilate once, then box blur.
///
/// Dilation closes small holes at the cost of a slight halo; the blur turns the
/// hard cut-out edge into a gradient.
#[derive(Debug, Clone, Copy)]
pub struct MaskRefiner {
    threshold: f32,
    dilate_kernel: usize,
    blur_kernel: usize,
}

impl Default for MaskRefiner {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl MaskRefiner {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            dilate_kernel: DILATE_KERNEL,
            blur_kernel: BLUR_KERNEL,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn refine(&self, raw: &Mask) -> Mask {
        let _span = tracing::debug_span!("refine").entered();

        let (width, height) = raw.dimensions();
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 {
            return raw.clone();
        }

        let binary: Vec<f32> = raw
            .data()
            .iter()
            .map(|&p| if p > self.threshold { 1.0 } else { 0.0 })
            .collect();

        let dilated = dilate(&binary, w, h, self.dilate_kernel);
        let blurred = box_blur(&dilated, w, h, self.blur_kernel);

        let matte = blurred.into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
        Mask::from_parts(width, height, matte)
    }
}

/// Window of a `kernel` wide filter anchored at its centre: (samples before, samples after)
fn window(kernel: usize) -> (usize, usize) {
    let before = kernel / 2;
    (before, kernel.saturating_sub(before + 1))
}

/// Rectangular max filter, applied as a horizontal then a vertical pass.
/// Samples outside the image are ignored.
fn dilate(src: &[f32], w: usize, h: usize, kernel: usize) -> Vec<f32> {
    let (before, after) = window(kernel);

    let mut rows = vec![0.0f32; src.len()];
    for y in 0..h {
        let line = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(before);
            let hi = (x + after).min(w - 1);
            rows[y * w + x] = line[lo..=hi].iter().copied().fold(f32::MIN, f32::max);
        }
    }

    let mut out = vec![0.0f32; src.len()];
    for x in 0..w {
        for y in 0..h {
            let lo = y.saturating_sub(before);
            let hi = (y + after).min(h - 1);
            out[y * w + x] = (lo..=hi).map(|yy| rows[yy * w + x]).fold(f32::MIN, f32::max);
        }
    }
    out
}

/// Mirror an out of range index back into `0..n` without repeating the edge sample
/// (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// Normalised box filter with reflect-101 borders, separable sliding sums.
fn box_blur(src: &[f32], w: usize, h: usize, kernel: usize) -> Vec<f32> {
    let horizontal = box_pass(src, h, w, kernel, |row, x| row * w + x);
    box_pass(&horizontal, w, h, kernel, |column, y| y * w + column)
}

/// One dimension of the box filter. `lines` is the number of independent lines,
/// `len` their length and `index(line, i)` maps a position to the buffer offset.
fn box_pass(
    src: &[f32],
    lines: usize,
    len: usize,
    kernel: usize,
    index: impl Fn(usize, usize) -> usize,
) -> Vec<f32> {
    let (before, after) = window(kernel);
    let (before, after) = (before as isize, after as isize);
    let scale = 1.0 / kernel as f64;

    let mut out = vec![0.0f32; src.len()];
    for line in 0..lines {
        let sample = |i: isize| src[index(line, reflect_101(i, len))] as f64;

        let mut sum: f64 = (-before..=after).map(sample).sum();
        out[index(line, 0)] = (sum * scale) as f32;
        for i in 1..len as isize {
            sum += sample(i + after) - sample(i - 1 - before);
            out[index(line, i as usize)] = (sum * scale) as f32;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> f32) -> Mask {
        let data = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Mask::from_vec(w, h, data).unwrap()
    }

    #[test]
    fn refine_keeps_dimensions_and_range() {
        let raw = mask_from_fn(97, 61, |x, y| ((x * 7 + y * 13) % 100) as f32 / 99.0);
        let matte = MaskRefiner::default().refine(&raw);

        assert_eq!(matte.dimensions(), (97, 61));
        assert!(matte.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn uniform_probabilities_give_uniform_matte() {
        let refiner = MaskRefiner::default();

        let person = refiner.refine(&Mask::filled(40, 40, 0.9));
        assert!(person.data().iter().all(|v| (v - 1.0).abs() < 1e-5));

        let empty = refiner.refine(&Mask::filled(40, 40, 0.2));
        assert!(empty.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn threshold_is_exclusive() {
        let refiner = MaskRefiner::default();
        let at_threshold = refiner.refine(&Mask::filled(8, 8, DEFAULT_THRESHOLD));
        assert!(at_threshold.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn dilation_grows_a_single_pixel_to_the_kernel_footprint() {
        let mut src = vec![0.0f32; 20 * 20];
        src[10 * 20 + 10] = 1.0;
        let out = dilate(&src, 20, 20, DILATE_KERNEL);

        // anchor at 5: the source pixel is reached from x in 6..=15
        let lit: Vec<usize> = (0..20).filter(|&x| out[10 * 20 + x] == 1.0).collect();
        assert_eq!(lit, (6..=15).collect::<Vec<_>>());
        assert_eq!(out.iter().filter(|&&v| v == 1.0).count(), 100);
    }

    #[test]
    fn blur_softens_a_hard_edge() {
        let raw = mask_from_fn(120, 10, |x, _| if x < 60 { 1.0 } else { 0.0 });
        let matte = MaskRefiner::default().refine(&raw);

        let row: Vec<f32> = (0..120).map(|x| matte.get(x, 5)).collect();
        assert_eq!(row[0], 1.0);
        assert_eq!(row[119], 0.0);
        assert!(row.windows(2).all(|pair| pair[0] >= pair[1] - 1e-6));
        assert!(row.iter().any(|&v| v > 0.1 && v < 0.9));
    }

    #[test]
    fn reflect_101_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(-20, 3), 0);
        assert_eq!(reflect_101(7, 1), 0);
    }
}
