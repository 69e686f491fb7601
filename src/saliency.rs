use crate::arrays::{Array2D, OrgbImage};
use crate::common::{split_length_to_ranges, InvalidInput, Normalization};
use multiversion::multiversion;
use rayon::current_num_threads;

/// Floor for the logistic slope when auto-derived statistics collapse
/// (a spatially uniform field has zero mean and would divide by zero).
const MIN_LOGISTIC_SLOPE: f32 = 1e-6;

/// Discrete Gaussian kernel, radius `ceil(3 * sigma)`, normalized to sum 1.
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    debug_assert!(sigma > 0.0);
    let radius = (3.0 * sigma).ceil() as usize;
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);
    let mut kernel: Vec<f32> = (0..2 * radius + 1)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x * inv_two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

#[multiversion(targets = "simd")]
fn blur_row(input_row: &[f32], output_row: &mut [f32], width: usize, kernel: &[f32]) {
    let radius = kernel.len() / 2;
    for x in 0..width {
        let lo = x.saturating_sub(radius);
        let hi = (x + radius).min(width - 1);
        let mut acc = [0f32; 3];
        for sx in lo..=hi {
            let w = kernel[sx + radius - x];
            let p = &input_row[sx * 3..sx * 3 + 3];
            acc[0] += w * p[0];
            acc[1] += w * p[1];
            acc[2] += w * p[2];
        }
        output_row[x * 3..x * 3 + 3].copy_from_slice(&acc);
    }
}

#[multiversion(targets = "simd")]
fn blur_column(image: &OrgbImage, output_row: &mut [f32], y: usize, kernel: &[f32]) {
    let radius = kernel.len() / 2;
    let lo = y.saturating_sub(radius);
    let hi = (y + radius).min(image.height - 1);
    output_row.fill(0.0);
    for sy in lo..=hi {
        let w = kernel[sy + radius - y];
        for (acc, v) in output_row.iter_mut().zip(image.get_row(sy)) {
            *acc += w * v;
        }
    }
}

/// Separable Gaussian blur over a packed 3-channel raster, channels
/// independent, rows distributed over the rayon pool.
///
/// Borders are zero-padded: out-of-bounds taps contribute nothing and the
/// kernel is not renormalized, so pixels within `~3 * sigma` of an edge are
/// underweighted. Downstream band-pass differences rely on both blur scales
/// sharing this behavior.
pub(crate) fn gaussian_blur(image: &OrgbImage, sigma: f32) -> OrgbImage {
    let kernel = gaussian_kernel(sigma);
    let row_len = image.width * 3;
    let ranges = split_length_to_ranges(image.height, current_num_threads());

    let mut tmp = OrgbImage::from_fill_color([0.0; 3], image.width, image.height);
    rayon::scope(|s| {
        let mut rest: &mut [f32] = &mut tmp.orgb_data;
        for range in &ranges {
            let (band, tail) = rest.split_at_mut(range.len() * row_len);
            rest = tail;
            let range = range.clone();
            let kernel = &kernel;
            s.spawn(move |_| {
                for (local_row, row) in range.enumerate() {
                    let output_row = &mut band[local_row * row_len..(local_row + 1) * row_len];
                    blur_row(image.get_row(row), output_row, image.width, kernel);
                }
            });
        }
    });

    let mut output = OrgbImage::from_fill_color([0.0; 3], image.width, image.height);
    rayon::scope(|s| {
        let mut rest: &mut [f32] = &mut output.orgb_data;
        for range in &ranges {
            let (band, tail) = rest.split_at_mut(range.len() * row_len);
            rest = tail;
            let range = range.clone();
            let tmp = &tmp;
            let kernel = &kernel;
            s.spawn(move |_| {
                for (local_row, row) in range.enumerate() {
                    let output_row = &mut band[local_row * row_len..(local_row + 1) * row_len];
                    blur_column(tmp, output_row, row, kernel);
                }
            });
        }
    });
    output
}

/// Raw multi-scale band-pass contrast field, before normalization.
///
/// For each scale k in {1, 2, 3} the difference of the `small_sigma * k` and
/// `large_sigma * k` blurs is reduced per pixel to its Euclidean norm over
/// the three channels divided by 3; the three scalar responses are averaged.
/// All three scale pairs are distinct band-pass responses.
#[multiversion(targets = "simd")]
pub(crate) fn multi_scale_contrast(
    image: &OrgbImage,
    small_sigma: f32,
    large_sigma: f32,
) -> Array2D<f32> {
    let mut raw = Array2D::from_fill(0f32, image.width, image.height);
    for scale in 1..=3u32 {
        let small = gaussian_blur(image, small_sigma * scale as f32);
        let large = gaussian_blur(image, large_sigma * scale as f32);
        for (acc, (ps, pl)) in raw.data.iter_mut().zip(
            small
                .orgb_data
                .chunks_exact(3)
                .zip(large.orgb_data.chunks_exact(3)),
        ) {
            let d0 = ps[0] - pl[0];
            let d1 = ps[1] - pl[1];
            let d2 = ps[2] - pl[2];
            *acc += (d0 * d0 + d1 * d1 + d2 * d2).sqrt() / 3.0;
        }
    }
    raw.data.iter_mut().for_each(|v| *v /= 3.0);
    raw
}

/// Per-pixel visual saliency in [0, 1] from an oRGB raster.
///
/// Multi-scale band-pass contrast followed by a logistic squashing around the
/// field's own statistics (or an explicit `(a, b, c)` triple). Validation is
/// fail-fast: bad sigmas or a non-positive fixed slope are rejected before
/// any blur runs.
pub fn estimate_saliency(
    image: &OrgbImage,
    small_sigma: f32,
    large_sigma: f32,
    normalization: &Normalization,
) -> Result<Array2D<f32>, InvalidInput> {
    if small_sigma <= 0.0 {
        return Err(InvalidInput::NonPositiveSigma(small_sigma));
    }
    if large_sigma <= small_sigma {
        return Err(InvalidInput::SigmaOrder {
            small: small_sigma,
            large: large_sigma,
        });
    }
    if let Normalization::Fixed { a, .. } = normalization {
        if *a <= 0.0 {
            return Err(InvalidInput::NonPositiveSlope(*a));
        }
    }

    let mut saliency = multi_scale_contrast(image, small_sigma, large_sigma);
    let (a, b, c) = match *normalization {
        Normalization::Auto => {
            let len = saliency.data.len() as f32;
            let mean = saliency.data.iter().sum::<f32>() / len;
            let variance = saliency
                .data
                .iter()
                .map(|v| {
                    let d = v - mean;
                    d * d
                })
                .sum::<f32>()
                / len;
            ((mean / 2.0).max(MIN_LOGISTIC_SLOPE), variance.sqrt(), 1.0)
        }
        Normalization::Fixed { a, b, c } => (a, b, c),
    };
    for v in saliency.data.iter_mut() {
        let logistic = 1.0 / (1.0 + (-(*v - b) / a).exp());
        *v = ((1.0 - c) * *v + c * logistic).clamp(0.0, 1.0);
    }
    Ok(saliency)
}
