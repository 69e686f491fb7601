use crate::common::{split_length_to_ranges, InvalidInput};
use crate::orgb::rgb_to_orgb_pixel;
use aligned_vec::{AVec, ConstAlign};
use rayon::current_num_threads;
use std::ops::{Index, IndexMut, Range};

const ALIGN: usize = 64;

/// Row-major 2D grid over a 64-byte aligned buffer.
///
/// Used for the single-channel rasters of the pipeline: the saliency field,
/// the label grid and the per-iteration distance field.
#[derive(Debug)]
pub struct Array2D<T> {
    pub data: AVec<T, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
}

impl<T> Array2D<T> {
    pub fn from_slice(data: &[T], width: usize, height: usize) -> Result<Self, InvalidInput>
    where
        T: Clone,
    {
        if data.len() != width * height {
            return Err(InvalidInput::RasterSize {
                expected: width * height,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: AVec::from_slice(ALIGN, data),
        })
    }

    pub fn from_fill(value: T, width: usize, height: usize) -> Self
    where
        T: Clone + Copy,
    {
        let data: AVec<T, ConstAlign<ALIGN>> =
            AVec::from_iter(ALIGN, (0..width * height).map(|_| value));
        Self {
            width,
            height,
            data,
        }
    }

    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.data.fill(value)
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[T] {
        debug_assert!(row < self.height);
        &self.data[(self.width * row)..(self.width * row + self.width)]
    }

    #[inline(always)]
    pub fn get_row_mut(&mut self, row: usize) -> &mut [T] {
        debug_assert!(row < self.height);
        &mut self.data[(self.width * row)..(self.width * row + self.width)]
    }

    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(self.width > x);
        debug_assert!(self.height > y);
        self.width * y + x
    }

    pub fn get_x_y_index(&self, ind: usize) -> (usize, usize) {
        debug_assert!(ind < self.data.len());
        let y = ind / self.width;
        let x = ind % self.width;
        (x, y)
    }

    /// Splits the grid into disjoint mutable row bands, one per range.
    ///
    /// The ranges must be contiguous, ascending and cover `0..height`; this is
    /// what allows parallel writers to own their bands without synchronization.
    pub fn split_rows_mut(&mut self, ranges: &[Range<usize>]) -> Vec<&mut [T]> {
        debug_assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), self.height);
        let mut bands = Vec::with_capacity(ranges.len());
        let mut rest: &mut [T] = &mut self.data;
        for range in ranges {
            let (band, tail) = rest.split_at_mut(range.len() * self.width);
            bands.push(band);
            rest = tail;
        }
        bands
    }
}

impl<T> Index<(usize, usize)> for Array2D<T> {
    type Output = T;
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.data[self.get_index(x, y)]
    }
}

impl<T> IndexMut<(usize, usize)> for Array2D<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        let idx = self.get_index(x, y);
        &mut self.data[idx]
    }
}

/// Packed 3-channel f32 raster in the oRGB color space.
///
/// Channel order per pixel is (luminance, red-green, yellow-blue). The
/// perceptual rotation applied during conversion makes Euclidean distances
/// over these channels meaningful for the downstream stages.
#[derive(Debug)]
pub struct OrgbImage {
    pub orgb_data: AVec<f32, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
}

impl OrgbImage {
    /// Converts a packed 8-bit raster to oRGB, in parallel.
    ///
    /// `channels` describes the input layout and must be 3; the buffer length
    /// must match `width * height * channels`. Both are checked before any
    /// conversion work starts.
    pub fn from_rgb_raster(
        rgb_image: &[u8],
        width: usize,
        height: usize,
        channels: usize,
    ) -> Result<Self, InvalidInput> {
        assert!(width > 0);
        assert!(height > 0);
        if channels != 3 {
            return Err(InvalidInput::ChannelCount(channels));
        }
        if rgb_image.len() != width * height * channels {
            return Err(InvalidInput::RasterSize {
                expected: width * height * channels,
                got: rgb_image.len(),
            });
        }
        let mut orgb_output: AVec<f32, ConstAlign<ALIGN>> =
            AVec::from_iter(ALIGN, (0..width * height * 3).map(|_| 0f32));
        let ranges = split_length_to_ranges(width * height, current_num_threads());
        rayon::scope(|s| {
            let mut rgb_input: &[u8] = rgb_image;
            let mut data_output: &mut [f32] = &mut orgb_output;
            for range in ranges {
                let (chunk_in, rest_in) = rgb_input.split_at(range.len() * 3);
                rgb_input = rest_in;
                let (chunk_out, rest_out) = data_output.split_at_mut(range.len() * 3);
                data_output = rest_out;
                s.spawn(move |_| {
                    for (pixel_in, pixel_out) in
                        chunk_in.chunks_exact(3).zip(chunk_out.chunks_exact_mut(3))
                    {
                        pixel_out.copy_from_slice(&rgb_to_orgb_pixel(pixel_in));
                    }
                });
            }
        });
        Ok(Self {
            width,
            height,
            orgb_data: orgb_output,
        })
    }

    /// Wraps an already converted packed oRGB buffer.
    pub fn from_raw_slice(
        orgb_data: &[f32],
        width: usize,
        height: usize,
    ) -> Result<Self, InvalidInput> {
        assert!(width > 0);
        assert!(height > 0);
        if orgb_data.len() != width * height * 3 {
            return Err(InvalidInput::RasterSize {
                expected: width * height * 3,
                got: orgb_data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            orgb_data: AVec::from_slice(ALIGN, orgb_data),
        })
    }

    pub fn from_fill_color(color: [f32; 3], width: usize, height: usize) -> Self {
        assert!(width > 0);
        assert!(height > 0);
        let orgb_data = AVec::from_iter(
            ALIGN,
            (0..width * height * 3).map(|i| color[i % 3]),
        );
        Self {
            width,
            height,
            orgb_data,
        }
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[f32] {
        debug_assert!(row < self.height);
        &self.orgb_data[(self.width * 3 * row)..(self.width * 3 * row + self.width * 3)]
    }

    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(self.width > x);
        debug_assert!(self.height > y);
        self.width * y * 3 + x * 3
    }

    #[inline(always)]
    pub fn get_pixel(&self, x: usize, y: usize) -> &[f32] {
        let idx = self.get_index(x, y);
        &self.orgb_data[idx..idx + 3]
    }
}

impl Index<(usize, usize)> for OrgbImage {
    type Output = [f32];
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        let idx = self.get_index(x, y);
        &self.orgb_data[idx..idx + 3]
    }
}

#[cfg(test)]
mod tests {
    use super::{Array2D, OrgbImage};
    use crate::common::InvalidInput;

    #[test]
    fn array2d_from_slice_checks_dimensions() {
        let err = Array2D::from_slice(&[0u32; 5], 2, 3).unwrap_err();
        assert_eq!(
            err,
            InvalidInput::RasterSize {
                expected: 6,
                got: 5
            }
        );
        let arr = Array2D::from_slice(&[0u32, 1, 2, 3, 4, 5], 3, 2).unwrap();
        assert_eq!(arr[(2, 1)], 5);
        assert_eq!(arr.get_x_y_index(arr.get_index(2, 1)), (2, 1));
    }

    #[test]
    fn array2d_split_rows() {
        let mut arr = Array2D::from_fill(0u32, 4, 10);
        let ranges = [0..3, 3..7, 7..10];
        let mut bands = arr.split_rows_mut(&ranges);
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[0].len(), 12);
        assert_eq!(bands[1].len(), 16);
        bands[2].fill(9);
        assert_eq!(arr[(0, 7)], 9);
        assert_eq!(arr[(3, 9)], 9);
        assert_eq!(arr[(3, 6)], 0);
    }

    #[test]
    fn orgb_image_rejects_wrong_channel_count() {
        let raster = vec![0u8; 4 * 4 * 4];
        let err = OrgbImage::from_rgb_raster(&raster, 4, 4, 4).unwrap_err();
        assert_eq!(err, InvalidInput::ChannelCount(4));
    }

    #[test]
    fn orgb_image_rejects_short_buffer() {
        let raster = vec![0u8; 10];
        let err = OrgbImage::from_rgb_raster(&raster, 4, 4, 3).unwrap_err();
        assert_eq!(
            err,
            InvalidInput::RasterSize {
                expected: 48,
                got: 10
            }
        );
    }

    #[test]
    fn orgb_image_from_raw_slice_round_trips() {
        let data: Vec<f32> = (0..5 * 4 * 3).map(|i| i as f32 * 0.25).collect();
        let image = OrgbImage::from_raw_slice(&data, 5, 4).unwrap();
        assert_eq!(image.get_pixel(4, 3), &data[5 * 4 * 3 - 3..]);
        let err = OrgbImage::from_raw_slice(&data[1..], 5, 4).unwrap_err();
        assert_eq!(
            err,
            InvalidInput::RasterSize {
                expected: 60,
                got: 59
            }
        );
    }

    #[test]
    fn orgb_image_preserves_dimensions() {
        let raster: Vec<u8> = (0..31 * 17 * 3).map(|i| (i % 251) as u8).collect();
        let image = OrgbImage::from_rgb_raster(&raster, 31, 17, 3).unwrap();
        assert_eq!(image.width, 31);
        assert_eq!(image.height, 17);
        assert_eq!(image.orgb_data.len(), 31 * 17 * 3);
        assert_eq!(image.get_row(0).len(), 31 * 3);
        assert_eq!(image.get_pixel(30, 16).len(), 3);
    }
}
