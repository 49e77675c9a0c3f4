//! Grayscale pixel buffers and integral images.
//!
//! An integral image stores `(W+1) x (H+1)` cumulative sums so any
//! rectangle sum is four lookups. [`NormIntegral`] additionally keeps
//! squared-intensity sums for O(1) window variance, from which the
//! detector derives its brightness normalization factor.

use crate::geometry::Rect;

/// O(1) rectangle sums. The seam between features and whichever
/// integral variant (plain or squared-sum) backs them.
pub trait RectSum {
    fn rect_sum(&self, rect: &Rect) -> i64;
}

/// An 8-bit single-channel image. Decoding image files is the caller's
/// concern; this type only wraps an owned pixel buffer.
#[derive(Clone, Debug)]
pub struct GrayImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl GrayImage {
    /// Wrap a row-major pixel buffer.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "pixel buffer length {} does not match {width}x{height}",
            data.len(),
        );
        Self { width, height, data }
    }

    /// A constant-intensity image. Handy in tests.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self { width, height, data: vec![value; width * height] }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

/// Cumulative intensity sums.
///
/// `value(x, y)` is the sum of all pixels strictly above and to the left
/// of `(x, y)`, so row 0 and column 0 are zero and
/// `rect_sum = S(x1,y1) - S(x0,y1) - S(x1,y0) + S(x0,y0)`.
#[derive(Clone, Debug)]
pub struct Integral {
    width: usize,  // image width + 1
    height: usize, // image height + 1
    sums: Vec<u32>,
}

impl Integral {
    pub fn from_image(image: &GrayImage) -> Self {
        let width = image.width() + 1;
        let height = image.height() + 1;
        let mut sums = vec![0u32; width * height];
        for y in 0..image.height() {
            let mut row_sum = 0u32;
            for x in 0..image.width() {
                row_sum += u32::from(image.get(x, y));
                sums[(y + 1) * width + (x + 1)] = row_sum + sums[y * width + (x + 1)];
            }
        }
        Self { width, height, sums }
    }

    /// Resample a window of a larger integral image down to a
    /// `base_width x base_height` patch. Each output cell reads the
    /// source integral at the nearest scaled position, so the patch is a
    /// size-normalized view of the window starting at `(x, y)` with
    /// `scale = window_size / base_size`.
    pub fn from_subsample(
        src: &NormIntegral,
        x: usize,
        y: usize,
        base_width: usize,
        base_height: usize,
        scale: f32,
    ) -> Self {
        let width = base_width + 1;
        let height = base_height + 1;
        let mut sums = vec![0u32; width * height];
        for iy in 0..height {
            let sy = y + (iy as f32 * scale + 0.5) as usize;
            for ix in 0..width {
                let sx = x + (ix as f32 * scale + 0.5) as usize;
                sums[iy * width + ix] = src.value(sx, sy);
            }
        }
        Self { width, height, sums }
    }

    /// Width of the underlying image.
    pub fn image_width(&self) -> usize {
        self.width - 1
    }

    /// Height of the underlying image.
    pub fn image_height(&self) -> usize {
        self.height - 1
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u32 {
        self.sums[y * self.width + x]
    }

}

impl RectSum for Integral {
    /// Sum of pixel intensities inside `rect`, in O(1).
    #[inline(always)]
    fn rect_sum(&self, rect: &Rect) -> i64 {
        let w = self.width;
        let (x0, y0) = (rect.x_min as usize, rect.y_min as usize);
        let (x1, y1) = (rect.x_max as usize, rect.y_max as usize);
        let v00 = i64::from(self.sums[y0 * w + x0]);
        let v01 = i64::from(self.sums[y1 * w + x0]);
        let v10 = i64::from(self.sums[y0 * w + x1]);
        let v11 = i64::from(self.sums[y1 * w + x1]);
        (v11 - v01) - (v10 - v00)
    }
}

/// An [`Integral`] extended with squared-intensity sums, enough to
/// compute window variance in O(1).
#[derive(Clone, Debug)]
pub struct NormIntegral {
    width: usize,
    height: usize,
    sums: Vec<u32>,
    sq_sums: Vec<i64>,
}

impl NormIntegral {
    pub fn from_image(image: &GrayImage) -> Self {
        let width = image.width() + 1;
        let height = image.height() + 1;
        let mut sums = vec![0u32; width * height];
        let mut sq_sums = vec![0i64; width * height];
        for y in 0..image.height() {
            let mut row_sum = 0u32;
            let mut row_sq = 0i64;
            for x in 0..image.width() {
                let p = u32::from(image.get(x, y));
                row_sum += p;
                row_sq += i64::from(p) * i64::from(p);
                let idx = (y + 1) * width + (x + 1);
                let above = y * width + (x + 1);
                sums[idx] = row_sum + sums[above];
                sq_sums[idx] = row_sq + sq_sums[above];
            }
        }
        Self { width, height, sums, sq_sums }
    }

    pub fn image_width(&self) -> usize {
        self.width - 1
    }

    pub fn image_height(&self) -> usize {
        self.height - 1
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u32 {
        self.sums[y * self.width + x]
    }

    /// Inverse of the per-pixel standard deviation of the window,
    /// floored at 1 so near-flat windows are not amplified.
    /// Feature values are multiplied by this factor, never divided.
    pub fn inv_norm(&self, rect: &Rect) -> f32 {
        let w = self.width;
        let (x0, y0) = (rect.x_min as usize, rect.y_min as usize);
        let (x1, y1) = (rect.x_max as usize, rect.y_max as usize);

        let sum = {
            let v00 = i64::from(self.sums[y0 * w + x0]);
            let v01 = i64::from(self.sums[y1 * w + x0]);
            let v10 = i64::from(self.sums[y0 * w + x1]);
            let v11 = i64::from(self.sums[y1 * w + x1]);
            ((v11 - v01) - (v10 - v00)) as f64
        };
        let sum2 = {
            let s00 = self.sq_sums[y0 * w + x0];
            let s01 = self.sq_sums[y1 * w + x0];
            let s10 = self.sq_sums[y0 * w + x1];
            let s11 = self.sq_sums[y1 * w + x1];
            ((s11 - s01) - (s10 - s00)) as f64
        };

        let area = rect.area();
        let var = (sum2 * area - sum * sum).sqrt();
        if var <= area {
            1.0
        } else {
            (area / var) as f32
        }
    }
}

impl RectSum for NormIntegral {
    #[inline(always)]
    fn rect_sum(&self, rect: &Rect) -> i64 {
        let w = self.width;
        let (x0, y0) = (rect.x_min as usize, rect.y_min as usize);
        let (x1, y1) = (rect.x_max as usize, rect.y_max as usize);
        let v00 = i64::from(self.sums[y0 * w + x0]);
        let v01 = i64::from(self.sums[y1 * w + x0]);
        let v10 = i64::from(self.sums[y0 * w + x1]);
        let v11 = i64::from(self.sums[y1 * w + x1]);
        (v11 - v01) - (v10 - v00)
    }
}
