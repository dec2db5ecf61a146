use crate::codec::spacing_to_ratio;
use crate::enums::ElementType;
use crate::enums::Orientation;

use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::parallel::prelude::*;
use std::path::Path;
use std::path::PathBuf;

/// A decoded volume in canonical (Z, X, Y) order.
///
/// Samples are kept as `f64`, which holds every on-disk scalar type the
/// codecs read without loss (64-bit integers above 2^53 excepted).
#[derive(Debug, Clone)]
pub struct VolumeStack {
    data: Array3<f64>,
    element_type: ElementType,
    spacing_ratios: Option<[f64; 3]>,
    source: Option<PathBuf>,
    intensity_range: (f64, f64),
}

/// Binned intensity distribution of a stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Left edge of each bin.
    pub x: Vec<f64>,
    /// Sample count of each bin.
    pub y: Vec<u64>,
}

impl VolumeStack {
    pub fn new(data: Array3<f64>, element_type: ElementType) -> Self {
        let intensity_range = Self::data_range(&data);
        Self {
            data,
            element_type,
            spacing_ratios: None,
            source: None,
            intensity_range,
        }
    }

    /// Attach spacing ratios (see [`spacing_to_ratio`]). Non-finite or
    /// non-positive ratios are ignored so the stack falls back to defaults.
    pub fn with_spacing_ratios(mut self, ratios: Option<[f64; 3]>) -> Self {
        self.spacing_ratios = ratios.filter(|r| r.iter().all(|v| v.is_finite() && *v > 0.0));
        self
    }

    /// Attach ratios derived from raw per-axis spacing values.
    pub fn with_spacing(self, spacing: [f64; 3]) -> Self {
        let ratios = spacing_to_ratio(spacing);
        if ratios.is_none() {
            log::warn!("Ignoring invalid voxel spacing {spacing:?}");
        }
        self.with_spacing_ratios(ratios)
    }

    pub fn with_source(mut self, path: impl AsRef<Path>) -> Self {
        self.source = Some(path.as_ref().to_path_buf());
        self
    }

    /// Get the dimensions of the volume (Z, X, Y)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Ratios used to lock the aspect of each projection axis; 1:1:1 if the
    /// file carried no spacing.
    pub fn spacing_ratios(&self) -> [f64; 3] {
        self.spacing_ratios.unwrap_or([1.0; 3])
    }

    pub fn has_native_spacing(&self) -> bool {
        self.spacing_ratios.is_some()
    }

    pub fn intensity_range(&self) -> (f64, f64) {
        self.intensity_range
    }

    pub fn set_intensity_range(&mut self, min: f64, max: f64) {
        self.intensity_range = if min <= max { (min, max) } else { (max, min) };
    }

    /// Number of slices along `orientation`.
    pub fn depth(&self, orientation: Orientation) -> usize {
        self.data.len_of(Axis(orientation.index()))
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f64>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        Some(self.data.index_axis(Axis(orientation.index()), index))
    }

    /// The plane shown by a projection axis, indexed `[x, y]` in screen
    /// coordinates. Sagittal planes are transposed so the first index is
    /// always the X voxel dimension where the view shows it.
    pub fn plane(&self, index: usize, orientation: Orientation) -> Option<ArrayView2<'_, f64>> {
        let slice = self.get_slice_from_axis(index, orientation)?;
        match orientation {
            Orientation::Sagittal => Some(slice.reversed_axes()),
            Orientation::Axial | Orientation::Coronal => Some(slice),
        }
    }

    /// Sample at a (Z, X, Y) voxel, or `None` outside the volume.
    pub fn value_at(&self, voxel: [i64; 3]) -> Option<f64> {
        let (d0, d1, d2) = self.dim();
        let [z, x, y] = voxel;
        if z < 0 || x < 0 || y < 0 {
            return None;
        }
        let (z, x, y) = (z as usize, x as usize, y as usize);
        if z >= d0 || x >= d1 || y >= d2 {
            return None;
        }
        Some(self.data[[z, x, y]])
    }

    pub fn histogram(&self, bins: usize) -> Histogram {
        let bins = bins.max(1);
        let (min, max) = Self::data_range(&self.data);
        let width = if max > min { (max - min) / bins as f64 } else { 1.0 };
        let y = self
            .data
            .par_iter()
            .fold(
                || vec![0u64; bins],
                |mut counts, &v| {
                    if v.is_finite() {
                        let bin = (((v - min) / width) as usize).min(bins - 1);
                        counts[bin] += 1;
                    }
                    counts
                },
            )
            .reduce(
                || vec![0u64; bins],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(a, b)| *a += b);
                    a
                },
            );
        let x = (0..bins).map(|i| min + i as f64 * width).collect();
        Histogram { x, y }
    }

    fn data_range(data: &Array3<f64>) -> (f64, f64) {
        let (min, max) = data
            .par_iter()
            .fold(
                || (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &v| (lo.min(v), hi.max(v)),
            )
            .reduce(
                || (f64::INFINITY, f64::NEG_INFINITY),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            );
        if min.is_finite() && max.is_finite() {
            (min, max)
        } else {
            (0.0, 0.0)
        }
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        index < self.depth(orientation)
    }
}
