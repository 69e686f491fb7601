use std::f32::consts::{FRAC_PI_3, FRAC_PI_4};

/// Fixed linear RGB decomposition into (luminance, red-green, yellow-blue).
///
/// Rows are applied to channel values normalized to [0, 1]; the first row is
/// the usual luma weighting, the other two span the opponent chroma plane.
pub(crate) const ORGB_PRE_TRANSFORM: [[f32; 3]; 3] = [
    [0.2990, 0.5870, 0.1140],
    [0.8660, -0.8660, 0.0],
    [0.5000, 0.5000, -1.0000],
];

/// Piecewise-linear hue rotation target.
///
/// The raw chroma angle `t = atan2(rg, yb)` is remapped so the perceptual
/// yellow band is widened relative to raw chroma: slope 1.5 inside
/// `[-pi/3, pi/3]` (boundary included), slope 0.75 outside. The sector
/// boundaries are continuous: both branches meet at `+-pi/2` for
/// `t = +-pi/3`.
#[inline(always)]
pub fn remap_hue(t: f32) -> f32 {
    if t >= 0.0 {
        if t <= FRAC_PI_3 {
            1.5 * t
        } else {
            FRAC_PI_4 + 0.75 * t
        }
    } else if t >= -FRAC_PI_3 {
        1.5 * t
    } else {
        -FRAC_PI_4 + 0.75 * t
    }
}

/// Convert one packed RGB24 pixel to oRGB.
///
/// Returns (luminance, red-green, yellow-blue) with the chroma pair rotated
/// by `remap_hue(t) - t`. Luminance stays in [0, 1]; the chroma channels are
/// unrestricted floats.
#[inline(always)]
pub fn rgb_to_orgb_pixel(rgb: &[u8]) -> [f32; 3] {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;
    let lu = ORGB_PRE_TRANSFORM[0][0] * r + ORGB_PRE_TRANSFORM[0][1] * g + ORGB_PRE_TRANSFORM[0][2] * b;
    let rg = ORGB_PRE_TRANSFORM[1][0] * r + ORGB_PRE_TRANSFORM[1][1] * g + ORGB_PRE_TRANSFORM[1][2] * b;
    let yb = ORGB_PRE_TRANSFORM[2][0] * r + ORGB_PRE_TRANSFORM[2][1] * g + ORGB_PRE_TRANSFORM[2][2] * b;
    let t = rg.atan2(yb);
    let rt = remap_hue(t);
    let (sin_dt, cos_dt) = (rt - t).sin_cos();
    let r_yb = cos_dt * yb - sin_dt * rg;
    let r_rg = sin_dt * yb + cos_dt * rg;
    [lu, r_rg, r_yb]
}
