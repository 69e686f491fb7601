use crate::arrays::{Array2D, OrgbImage};
use crate::cluster::Cluster;
use crate::common::{split_length_to_ranges, InvalidInput, SlicConfig};
use crate::connectivity::enforce_connectivity;
use assume::assume;
use multiversion::multiversion;
use rayon::current_num_threads;
use rayon::prelude::*;
use std::ops::Range;

/// Label grid value of a pixel no cluster has claimed yet.
pub const UNASSIGNED: u32 = u32::MAX;

/// Smallest supported sampling-lattice pitch.
pub const MIN_CELL_SIZE: usize = 4;

/// Convenient struct for passing values around.
#[derive(Debug)]
pub struct Clusters {
    /// For every pixel in the image this stores the id of the owning cluster
    /// (see `Cluster.number`), or `UNASSIGNED` before the first sweep.
    pub assignments: Array2D<u32>,
    pub clusters: Vec<Cluster>,
}

/// Lattice point count and margin for one axis, or `None` when not even one
/// margin-padded cell fits.
///
/// Points sit at `margin + k * cell_size` with a symmetric margin of at
/// least 2 pixels, which is exactly what the 5x5 seed-relocation search
/// needs to stay inside the raster.
fn sampling_lattice(dim: usize, cell_size: usize) -> Option<(usize, f32)> {
    if dim < 5 {
        return None;
    }
    let points = (dim - 5) / cell_size + 1;
    let margin = (dim - 1 - (points - 1) * cell_size) as f32 / 2.0;
    debug_assert!(margin >= 2.0);
    Some((points, margin))
}

#[inline(always)]
fn norm3(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Relocate a lattice point to the lowest color-gradient position in its 5x5
/// neighborhood, so clusters are not seeded directly on strong edges.
///
/// The gradient at a candidate is the norm of the mean horizontal finite
/// difference over a 3-pixel window plus the same for the vertical one.
/// Strict `<` keeps the first minimum in scan order, making seeding
/// deterministic on flat regions.
fn lowest_gradient_position(image: &OrgbImage, x: f32, y: f32) -> (usize, usize) {
    let nx = (x + 0.5) as usize;
    let ny = (y + 0.5) as usize;
    debug_assert!(nx >= 2 && nx + 2 < image.width);
    debug_assert!(ny >= 2 && ny + 2 < image.height);
    let mut opt = (nx, ny);
    let mut min_grad = f32::MAX;
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            let cx = (nx as i32 + dx) as usize;
            let cy = (ny as i32 + dy) as usize;
            let mut diff_x = [0f32; 3];
            let mut diff_y = [0f32; 3];
            for w in 0..3usize {
                let wy = cy - 1 + w;
                let left = image.get_pixel(cx - 1, wy);
                let right = image.get_pixel(cx + 1, wy);
                let wx = cx - 1 + w;
                let up = image.get_pixel(wx, cy - 1);
                let down = image.get_pixel(wx, cy + 1);
                for c in 0..3 {
                    diff_x[c] += (left[c] - right[c]) / 3.0;
                    diff_y[c] += (up[c] - down[c]) / 3.0;
                }
            }
            let grad = norm3(diff_x) + norm3(diff_y);
            if grad < min_grad {
                min_grad = grad;
                opt = (cx, cy);
            }
        }
    }
    opt
}

impl Clusters {
    /// Default initialize clusters function.
    ///
    /// Lays a regular sampling lattice with pitch `cell_size` over the image,
    /// relocates every seed to the lowest-gradient spot nearby and takes the
    /// raster color at the relocated position as the initial cluster color.
    ///
    /// Geometric preconditions are validated here, before any seeding work:
    /// `cell_size >= 4` and at least one margin-padded lattice point per axis.
    pub fn initialize_clusters(
        image: &OrgbImage,
        config: &SlicConfig,
    ) -> Result<Clusters, InvalidInput> {
        if config.cell_size < MIN_CELL_SIZE {
            return Err(InvalidInput::CellSizeTooSmall(config.cell_size));
        }
        let lattice_x = sampling_lattice(image.width, config.cell_size);
        let lattice_y = sampling_lattice(image.height, config.cell_size);
        let (Some((points_x, margin_x)), Some((points_y, margin_y))) = (lattice_x, lattice_y)
        else {
            return Err(InvalidInput::ImageTooSmall {
                width: image.width,
                height: image.height,
                cell_size: config.cell_size,
            });
        };
        let mut clusters = Clusters {
            assignments: Array2D::from_fill(UNASSIGNED, image.width, image.height),
            clusters: Vec::with_capacity(points_x * points_y),
        };
        let mut number = 0u32;
        for ny in 0..points_y {
            let y = margin_y + (ny * config.cell_size) as f32;
            for nx in 0..points_x {
                let x = margin_x + (nx * config.cell_size) as f32;
                let (seed_x, seed_y) = lowest_gradient_position(image, x, y);
                let p = image.get_pixel(seed_x, seed_y);
                clusters.clusters.push(Cluster {
                    x: seed_x as f32,
                    y: seed_y as f32,
                    color: [p[0], p[1], p[2]],
                    number,
                    num_members: 0,
                });
                number += 1;
            }
        }
        debug_assert_eq!(clusters.clusters.len(), points_x * points_y);
        Ok(clusters)
    }
}

#[multiversion(targets = "simd")]
fn assign_rows(
    image: &OrgbImage,
    clusters: &[Cluster],
    alpha: f32,
    cell_size: usize,
    rows: Range<usize>,
    labels_band: &mut [u32],
    distances_band: &mut [f32],
) {
    let width = image.width;
    for cluster in clusters {
        let top = cluster.top(cell_size).max(rows.start);
        let bottom = cluster.bottom(image, cell_size).min(rows.end);
        if top >= bottom {
            continue;
        }
        let left = cluster.left(cell_size);
        let right = cluster.right(image, cell_size);
        let [c0, c1, c2] = cluster.color;
        for y in top..bottom {
            let dy = y as f32 - cluster.y;
            let dy_sq = dy * dy;
            let band_offset = (y - rows.start) * width;
            let image_row = image.get_row(y);
            for x in left..right {
                let p = &image_row[x * 3..x * 3 + 3];
                let d0 = p[0] - c0;
                let d1 = p[1] - c1;
                let d2 = p[2] - c2;
                let color_dist = (d0 * d0 + d1 * d1 + d2 * d2).sqrt() / 3.0;
                let dx = x as f32 - cluster.x;
                let dist = color_dist + alpha * (dx * dx + dy_sq).sqrt();
                let idx = band_offset + x;
                assume!(unsafe: idx < distances_band.len(), "index {idx} > {}", distances_band.len());
                assume!(unsafe: idx < labels_band.len(), "index {idx} > {}", labels_band.len());
                if dist < distances_band[idx] {
                    distances_band[idx] = dist;
                    labels_band[idx] = cluster.number;
                }
            }
        }
    }
}

/// One assignment sweep: every cluster claims the pixels of its search
/// window for which it holds the smallest joint distance seen so far.
///
/// The image is split into disjoint row bands, one writer per band. Every
/// band sweeps the clusters that intersect it in ascending id order, so for
/// each pixel the outcome is identical to the sequential sweep no matter how
/// the bands are scheduled.
pub fn assign(
    image: &OrgbImage,
    config: &SlicConfig,
    clusters: &mut Clusters,
    min_distances: &mut Array2D<f32>,
) {
    clusters.assignments.fill(UNASSIGNED);
    min_distances.fill(f32::INFINITY);
    let ranges = split_length_to_ranges(image.height, current_num_threads());
    let cluster_list: &[Cluster] = &clusters.clusters;
    let label_bands = clusters.assignments.split_rows_mut(&ranges);
    let distance_bands = min_distances.split_rows_mut(&ranges);
    rayon::scope(|s| {
        for ((range, labels_band), distances_band) in
            ranges.iter().cloned().zip(label_bands).zip(distance_bands)
        {
            s.spawn(move |_| {
                assign_rows(
                    image,
                    cluster_list,
                    config.alpha,
                    config.cell_size,
                    range,
                    labels_band,
                    distances_band,
                );
            });
        }
    });
}

/// This function does the update step.
///
/// Every cluster center and color is recomputed as the arithmetic mean of its
/// current members; a cluster that lost all members keeps its previous state
/// instead of dividing by zero. Accumulation runs as a parallel fold over row
/// bands followed by an elementwise reduce.
#[multiversion(targets = "simd")]
pub fn update(clusters: &mut Clusters, image: &OrgbImage) {
    let num_clusters = clusters.clusters.len();
    let assignments = &clusters.assignments;
    let ranges = split_length_to_ranges(image.height, current_num_threads());
    let (counts, acc) = ranges
        .into_par_iter()
        .map(|rows| {
            let mut counts = vec![0u32; num_clusters];
            let mut acc = vec![[0f64; 5]; num_clusters];
            for y in rows {
                let image_row = image.get_row(y);
                let labels_row = assignments.get_row(y);
                for (x, label) in labels_row.iter().enumerate() {
                    if *label == UNASSIGNED {
                        continue;
                    }
                    let k = *label as usize;
                    counts[k] += 1;
                    let a = &mut acc[k];
                    a[0] += x as f64;
                    a[1] += y as f64;
                    let p = &image_row[x * 3..x * 3 + 3];
                    a[2] += p[0] as f64;
                    a[3] += p[1] as f64;
                    a[4] += p[2] as f64;
                }
            }
            (counts, acc)
        })
        .reduce(
            || (vec![0u32; num_clusters], vec![[0f64; 5]; num_clusters]),
            |mut merged, part| {
                for k in 0..num_clusters {
                    merged.0[k] += part.0[k];
                    for j in 0..5 {
                        merged.1[k][j] += part.1[k][j];
                    }
                }
                merged
            },
        );
    for cluster in clusters.clusters.iter_mut() {
        let k = cluster.number as usize;
        let members = counts[k];
        cluster.num_members = members;
        if members == 0 {
            continue;
        }
        let inv = 1.0 / members as f64;
        cluster.x = (acc[k][0] * inv) as f32;
        cluster.y = (acc[k][1] * inv) as f32;
        cluster.color = [
            (acc[k][2] * inv) as f32,
            (acc[k][3] * inv) as f32,
            (acc[k][4] * inv) as f32,
        ];
    }
}

/// This function is the main loop.
///
/// The steps are generally:
/// - N iterations
///     - assign
///     - update
/// - full assign (so the grid is populated even for zero iterations)
/// - enforce_connectivity (CCA)
pub fn iterate(image: &OrgbImage, config: &SlicConfig, clusters: &mut Clusters) {
    let mut min_distances = Array2D::from_fill(f32::INFINITY, image.width, image.height);
    for _ in 0..config.iterations {
        assign(image, config, clusters, &mut min_distances);
        update(clusters, image);
    }
    assign(image, config, clusters, &mut min_distances);
    enforce_connectivity(clusters, config);
}

/// Partition the image into superpixels and return the label grid.
///
/// Convenience wrapper over `initialize_clusters` + `iterate`. Callers that
/// also need the cluster centers and mean colors can drive those functions
/// directly and run `update` once more after the repair pass.
pub fn cluster_superpixels(
    image: &OrgbImage,
    config: &SlicConfig,
) -> Result<Array2D<u32>, InvalidInput> {
    let mut clusters = Clusters::initialize_clusters(image, config)?;
    iterate(image, config, &mut clusters);
    Ok(clusters.assignments)
}

#[cfg(test)]
mod tests {
    use super::{cluster_superpixels, sampling_lattice, Clusters, UNASSIGNED};
    use crate::arrays::OrgbImage;
    use crate::common::{InvalidInput, SlicConfig};

    fn gradient_image(width: usize, height: usize) -> OrgbImage {
        let raster: Vec<u8> = (0..height)
            .flat_map(|y| {
                (0..width).flat_map(move |x| {
                    [
                        (x * 255 / width) as u8,
                        (y * 255 / height) as u8,
                        ((x + y) % 256) as u8,
                    ]
                })
            })
            .collect();
        OrgbImage::from_rgb_raster(&raster, width, height, 3).unwrap()
    }

    #[test]
    fn lattice_matches_expected_counts() {
        assert_eq!(sampling_lattice(40, 8), Some((5, 3.5)));
        assert_eq!(sampling_lattice(5, 4), Some((1, 2.0)));
        assert_eq!(sampling_lattice(4, 4), None);
    }

    #[test]
    fn rejects_bad_geometry() {
        let image = OrgbImage::from_fill_color([0.5, 0.0, 0.0], 40, 40);
        let too_small_cell = SlicConfig {
            cell_size: 3,
            ..SlicConfig::default()
        };
        assert_eq!(
            Clusters::initialize_clusters(&image, &too_small_cell).unwrap_err(),
            InvalidInput::CellSizeTooSmall(3)
        );
        let tiny = OrgbImage::from_fill_color([0.5, 0.0, 0.0], 4, 40);
        assert_eq!(
            Clusters::initialize_clusters(&tiny, &SlicConfig::default()).unwrap_err(),
            InvalidInput::ImageTooSmall {
                width: 4,
                height: 40,
                cell_size: 16
            }
        );
    }

    #[test]
    fn label_grid_is_complete_and_in_range() {
        let image = gradient_image(61, 47);
        let config = SlicConfig {
            cell_size: 8,
            alpha: 0.5,
            iterations: 3,
            min_size_factor: 0.25,
        };
        let clusters = Clusters::initialize_clusters(&image, &config).unwrap();
        let cluster_count = clusters.clusters.len() as u32;
        let labels = cluster_superpixels(&image, &config).unwrap();
        assert_eq!(labels.width, 61);
        assert_eq!(labels.height, 47);
        for label in labels.data.iter() {
            assert_ne!(*label, UNASSIGNED);
            assert!(*label < cluster_count);
        }
    }

    #[test]
    fn init_only_run_is_deterministic() {
        let image = gradient_image(50, 40);
        let config = SlicConfig {
            cell_size: 8,
            alpha: 1.0,
            iterations: 0,
            min_size_factor: 0.25,
        };
        let first = cluster_superpixels(&image, &config).unwrap();
        let second = cluster_superpixels(&image, &config).unwrap();
        assert_eq!(first.data.as_slice(), second.data.as_slice());
    }

    #[test]
    fn uniform_image_relaxes_to_regular_grid() {
        let raster = vec![128u8; 40 * 40 * 3];
        let image = OrgbImage::from_rgb_raster(&raster, 40, 40, 3).unwrap();
        let config = SlicConfig {
            cell_size: 8,
            alpha: 1.0,
            iterations: 5,
            min_size_factor: 0.25,
        };
        let labels = cluster_superpixels(&image, &config).unwrap();
        let mut sizes = vec![0u32; 25];
        let mut bounds = vec![(40usize, 0usize, 40usize, 0usize); 25];
        for (i, label) in labels.data.iter().enumerate() {
            let (x, y) = labels.get_x_y_index(i);
            let k = *label as usize;
            assert!(k < 25);
            sizes[k] += 1;
            let b = &mut bounds[k];
            b.0 = b.0.min(x);
            b.1 = b.1.max(x);
            b.2 = b.2.min(y);
            b.3 = b.3.max(y);
        }
        for (k, size) in sizes.iter().enumerate() {
            assert!(
                (36..=100).contains(size),
                "region {k} has irregular size {size}"
            );
            let (min_x, max_x, min_y, max_y) = bounds[k];
            assert!(max_x - min_x < 12, "region {k} spans too many columns");
            assert!(max_y - min_y < 12, "region {k} spans too many rows");
        }
    }
}
