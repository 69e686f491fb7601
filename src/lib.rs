//! Sight-spot detection primitives in Rust.
//!
//! This crate provides the numeric core for sight-spot / attention-region
//! detection: a perceptual oRGB color-space transform, a multi-scale
//! band-pass saliency estimator, and SLIC superpixel segmentation with a
//! connectivity repair pass (CCA).
//!
//! The three stages are pure in-memory transforms. Saliency estimation and
//! superpixel clustering both consume the oRGB raster and are independent of
//! each other, so callers can run them in parallel and combine the outputs
//! into per-region mean saliency themselves. Image file decoding and
//! encoding stay outside of this crate.
//!
//! The following example describes how to process an image in packed RGB24
//! (RGB 8bit) format (default for image crate):
//!
//! ```rust
//! use sight_spot_rust::arrays::OrgbImage;
//! use sight_spot_rust::common::{Normalization, SlicConfig};
//! use sight_spot_rust::heatmap::eval_heatmap;
//! use sight_spot_rust::saliency::estimate_saliency;
//! use sight_spot_rust::slic::cluster_superpixels;
//!
//! fn main() {
//!     let width = 64usize;
//!     let height = 48usize;
//!     // Any packed RGB24 buffer works, e.g. `image::open(..).to_rgb8().into_raw()`.
//!     let raster: Vec<u8> = (0..width * height * 3).map(|i| (i % 256) as u8).collect();
//!     // Convert the image to packed oRGB
//!     let image = OrgbImage::from_rgb_raster(&raster, width, height, 3).unwrap();
//!     // Per-pixel saliency in [0, 1], normalized around the field's own statistics
//!     let saliency = estimate_saliency(&image, 1.0, 10.0, &Normalization::Auto).unwrap();
//!     // Superpixel label grid with the same dimensions
//!     let mut config = SlicConfig::default();
//!     config.cell_size = 8;
//!     let labels = cluster_superpixels(&image, &config).unwrap();
//!     assert_eq!(labels.data.len(), saliency.data.len());
//!     // Optional visualization ramp for the saliency field
//!     let _heatmap_rgb = eval_heatmap(&saliency);
//! }
//! ```
//!
//! It's also possible to drive the clustering directly through
//! `slic::Clusters::initialize_clusters` and `slic::iterate()` to keep the
//! cluster centers and mean colors around, or to write a custom initializer
//! (e.g. to seed a ROI).
//!
//! All configuration is passed explicitly per call and every invocation owns
//! its working buffers exclusively, so the functions are safe to call from
//! multiple threads at once. Hot loops are compiled with `multiversion` and
//! the heavy sweeps distribute over the rayon pool; the per-pixel results do
//! not depend on the number of threads.
//!
//! Validation is fail-fast: wrong channel counts, non-positive or inverted
//! sigmas, malformed normalization triples and images too small for one
//! padded sampling cell are all reported as `common::InvalidInput` before
//! any numeric work starts.

pub mod arrays;
pub mod cluster;
pub mod common;
pub mod connectivity;
pub mod heatmap;
pub mod orgb;
pub mod saliency;
pub mod slic;
