use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Size of a plane of `dim` (x, y) samples once stretched so that one x
    /// unit is `ratio` times as wide as one y unit. Never shrinks.
    pub(crate) fn get_aspect_dimensions(dim: (usize, usize), ratio: f64) -> (usize, usize) {
        let (nx, ny) = dim;
        if !ratio.is_finite() || ratio <= 0.0 {
            return dim;
        }
        if ratio >= 1.0 {
            (((nx as f64) * ratio).round().max(1.0) as usize, ny)
        } else {
            (nx, ((ny as f64) / ratio).round().max(1.0) as usize)
        }
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(plane: &ArrayView2<f64>, x: f64, y: f64) -> f64 {
        let (width, height) = plane.dim();

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);

        let dx = x - x0 as f64;
        let dy = y - y0 as f64;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = plane[[x0, y0]];
        let v10 = plane[[x1, y0]];
        let v01 = plane[[x0, y1]];
        let v11 = plane[[x1, y1]];

        let v0 = v00.mul_add(one_minus_dx, v10 * dx);
        let v1 = v01.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Resample a `[x, y]` plane to `width` x `height` samples.
    pub(crate) fn resample(plane: &ArrayView2<f64>, width: usize, height: usize) -> Array2<f64> {
        let (src_width, src_height) = plane.dim();
        if src_width == 0 || src_height == 0 || width == 0 || height == 0 {
            return Array2::zeros((width, height));
        }
        if (src_width, src_height) == (width, height) {
            return plane.to_owned();
        }

        let values: Vec<f64> = (0..width)
            .into_par_iter()
            .flat_map_iter(|x| {
                (0..height).map(move |y| {
                    // Half-pixel centres, clamped to the source grid
                    let src_x = (x as f64 + 0.5) / width as f64 * src_width as f64 - 0.5;
                    let src_y = (y as f64 + 0.5) / height as f64 * src_height as f64 - 0.5;
                    let src_x = src_x.clamp(0.0, (src_width - 1) as f64);
                    let src_y = src_y.clamp(0.0, (src_height - 1) as f64);
                    Self::bilinear_interpolate(plane, src_x, src_y)
                })
            })
            .collect();
        Array2::from_shape_vec((width, height), values)
            .unwrap_or_else(|_| Array2::zeros((width, height)))
    }
}
