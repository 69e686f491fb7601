use crate::arrays::Array2D;
use static_init::dynamic;

/// Fixed 256-entry hue ramp from blue (cold) to red (hot).
///
/// Entry `i` is the HSV color `(h = 240 * (1 - i / 255), s = 1, v = 255)`
/// converted to RGB24.
#[dynamic(65535)]
pub static HEATMAP_PALETTE: [[u8; 3]; 256] = core::array::from_fn(|i| heatmap_entry(i as u8));

fn heatmap_entry(idx: u8) -> [u8; 3] {
    let s = 1.0f32;
    let v = 255.0f32;
    let h = 240.0 * (1.0 - idx as f32 / 255.0);
    let sector = (h / 60.0).floor();
    let f = h / 60.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match (sector as i32) % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [(r + 0.5) as u8, (g + 0.5) as u8, (b + 0.5) as u8]
}

/// Render a saliency field as a packed RGB24 heatmap raster.
///
/// Purely a visualization convenience for consumers of the numeric core;
/// values are clamped to [0, 1] before the palette lookup.
pub fn eval_heatmap(saliency: &Array2D<f32>) -> Vec<u8> {
    let mut heatmap = Vec::with_capacity(saliency.data.len() * 3);
    for v in saliency.data.iter() {
        let idx = (255.0 * v.clamp(0.0, 1.0) + 0.5) as usize;
        let rgb = unsafe { HEATMAP_PALETTE[idx.min(255)] };
        heatmap.extend_from_slice(&rgb);
    }
    heatmap
}
