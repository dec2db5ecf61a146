//! Ingredients: the drawable units a session manages.
//!
//! An ingredient owns its data (a volume or a point set) plus display
//! parameters, and knows how to describe itself for one projection axis at
//! one slice. Drawing the description is left to the caller.

use crate::enums::{IngredientKind, Orientation, Symbol};
use crate::interpolator::Interpolator;
use crate::points::PointSet;
use crate::volume::VolumeStack;

use image::{ImageBuffer, Rgba, RgbaImage};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A named colour or an explicit RGB triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    Named(String),
    Rgb([u8; 3]),
}

impl Color {
    pub fn named(name: &str) -> Self {
        Color::Named(name.to_string())
    }

    pub fn rgb(&self) -> Option<[u8; 3]> {
        match self {
            Color::Rgb(rgb) => Some(*rgb),
            Color::Named(name) => match name.to_ascii_lowercase().as_str() {
                "red" | "r" => Some([255, 0, 0]),
                "green" | "g" => Some([0, 255, 0]),
                "blue" | "b" => Some([0, 0, 255]),
                "magenta" | "m" => Some([255, 0, 255]),
                "cyan" | "c" => Some([0, 255, 255]),
                "yellow" | "y" => Some([255, 255, 0]),
                "gray" | "grey" | "white" | "w" => Some([255, 255, 255]),
                "black" | "k" => Some([0, 0, 0]),
                _ => None,
            },
        }
    }
}

/// Colour look-up table applied to an image layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Lut {
    Gray,
    Tint(Color),
    Table(Vec<[u8; 4]>),
}

impl Lut {
    /// Build a LUT from a colour-order entry such as `"red"` or `"gray"`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "gray" | "grey" => Lut::Gray,
            _ => Lut::Tint(Color::named(name)),
        }
    }

    /// Map a normalised intensity in `[0, 1]` to RGBA.
    pub fn map(&self, t: f64, alpha: u8) -> [u8; 4] {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let scale = |c: u8| (c as f64 * t).round() as u8;
        match self {
            Lut::Gray => {
                let v = scale(255);
                [v, v, v, alpha]
            }
            Lut::Tint(color) => {
                let [r, g, b] = color.rgb().unwrap_or([255, 255, 255]);
                [scale(r), scale(g), scale(b), alpha]
            }
            Lut::Table(table) if !table.is_empty() => {
                let index = (t * (table.len() - 1) as f64).round() as usize;
                let [r, g, b, a] = table[index];
                [r, g, b, ((a as u16 * alpha as u16) / 255) as u8]
            }
            Lut::Table(_) => [0, 0, 0, 0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointStyle {
    pub symbol: Symbol,
    pub size: f64,
    pub opacity: u8,
    pub color: Color,
    pub line_width: f64,
}

impl Default for PointStyle {
    fn default() -> Self {
        Self {
            symbol: Symbol::Circle,
            size: 5.0,
            opacity: 255,
            color: Color::named("red"),
            line_width: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageStackLayer {
    pub stack: VolumeStack,
    pub lut: Lut,
    pub opacity: u8,
}

#[derive(Debug, Clone)]
pub struct PointLayer {
    pub points: PointSet,
    pub style: PointStyle,
    /// Points within this distance of the slice (per axis) are shown.
    pub z_spread: [f64; 3],
}

#[derive(Debug, Clone)]
pub enum IngredientData {
    ImageStack(ImageStackLayer),
    SparsePoints(PointLayer),
}

#[derive(Debug, Clone)]
pub struct Ingredient {
    name: String,
    pub enabled: bool,
    data: IngredientData,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, data: IngredientData) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            data,
        }
    }

    pub fn image_stack(name: impl Into<String>, stack: VolumeStack) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            data: IngredientData::ImageStack(ImageStackLayer {
                stack,
                lut: Lut::Gray,
                opacity: 255,
            }),
        }
    }

    pub fn sparse_points(name: impl Into<String>, points: PointSet, style: PointStyle) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            data: IngredientData::SparsePoints(PointLayer {
                points,
                style,
                z_spread: [0.0; 3],
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> IngredientKind {
        match self.data {
            IngredientData::ImageStack(_) => IngredientKind::ImageStack,
            IngredientData::SparsePoints(_) => IngredientKind::SparsePoints,
        }
    }

    pub fn data(&self) -> &IngredientData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut IngredientData {
        &mut self.data
    }

    pub fn as_stack(&self) -> Option<&ImageStackLayer> {
        match &self.data {
            IngredientData::ImageStack(layer) => Some(layer),
            IngredientData::SparsePoints(_) => None,
        }
    }

    pub fn as_stack_mut(&mut self) -> Option<&mut ImageStackLayer> {
        match &mut self.data {
            IngredientData::ImageStack(layer) => Some(layer),
            IngredientData::SparsePoints(_) => None,
        }
    }

    pub fn as_points(&self) -> Option<&PointLayer> {
        match &self.data {
            IngredientData::SparsePoints(layer) => Some(layer),
            IngredientData::ImageStack(_) => None,
        }
    }

    pub fn as_points_mut(&mut self) -> Option<&mut PointLayer> {
        match &mut self.data {
            IngredientData::SparsePoints(layer) => Some(layer),
            IngredientData::ImageStack(_) => None,
        }
    }

    /// Number of slices along `orientation`, for image stacks.
    pub fn depth(&self, orientation: Orientation) -> Option<usize> {
        self.as_stack().map(|layer| layer.stack.depth(orientation))
    }

    /// Describe what to draw on `orientation` at `slice`.
    pub fn render_slice(&self, orientation: Orientation, slice: usize) -> RenderableLayer {
        match &self.data {
            IngredientData::ImageStack(layer) => {
                let plane = layer
                    .stack
                    .plane(slice, orientation)
                    .map(|view| view.to_owned())
                    .unwrap_or_else(|| Array2::zeros((0, 0)));
                RenderableLayer::Image(ImagePlane {
                    name: self.name.clone(),
                    plane,
                    levels: layer.stack.intensity_range(),
                    lut: layer.lut.clone(),
                    opacity: layer.opacity,
                })
            }
            IngredientData::SparsePoints(layer) => {
                let axis = orientation.index();
                let spread = layer.z_spread[axis];
                let target = slice as f64;
                let mut xy = Vec::new();
                let mut categories = Vec::new();
                for (i, p) in layer.points.points().iter().enumerate() {
                    if (p[axis] - target).abs() > spread {
                        continue;
                    }
                    xy.push(match orientation {
                        Orientation::Axial => [p[1], p[2]],
                        Orientation::Coronal => [p[0], p[2]],
                        Orientation::Sagittal => [p[1], p[0]],
                    });
                    if let Some(all) = layer.points.categories() {
                        categories.push(all[i]);
                    }
                }
                RenderableLayer::Points(PointMarkers {
                    name: self.name.clone(),
                    xy,
                    categories,
                    style: layer.style.clone(),
                })
            }
        }
    }
}

/// A 2D description of one ingredient on one axis.
#[derive(Debug, Clone)]
pub enum RenderableLayer {
    Image(ImagePlane),
    Points(PointMarkers),
}

impl RenderableLayer {
    pub fn name(&self) -> &str {
        match self {
            RenderableLayer::Image(image) => &image.name,
            RenderableLayer::Points(points) => &points.name,
        }
    }

    pub fn as_image(&self) -> Option<&ImagePlane> {
        match self {
            RenderableLayer::Image(image) => Some(image),
            RenderableLayer::Points(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImagePlane {
    pub name: String,
    /// Samples indexed `[x, y]`.
    pub plane: Array2<f64>,
    pub levels: (f64, f64),
    pub lut: Lut,
    pub opacity: u8,
}

impl ImagePlane {
    /// Sample at screen position (x, y); 0 outside the plane.
    pub fn sample(&self, x: i64, y: i64) -> f64 {
        let (width, height) = self.plane.dim();
        if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
            return 0.0;
        }
        self.plane[[x as usize, y as usize]]
    }

    #[inline]
    fn normalize(value: f64, levels: (f64, f64)) -> f64 {
        let (lo, hi) = levels;
        if hi > lo {
            (value - lo) / (hi - lo)
        } else if value > lo {
            1.0
        } else {
            0.0
        }
    }

    /// Rasterise through the LUT, stretching for the axis aspect ratio.
    pub fn to_rgba_image(&self, aspect_ratio: f64) -> Option<RgbaImage> {
        let view = self.plane.view();
        let (width, height) = Interpolator::get_aspect_dimensions(view.dim(), aspect_ratio);
        let resampled = Interpolator::resample(&view, width, height);
        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                let resampled = &resampled;
                (0..width).flat_map(move |x| {
                    let t = Self::normalize(resampled[[x, y]], self.levels);
                    self.lut.map(t, self.opacity)
                })
            })
            .collect();
        ImageBuffer::<Rgba<u8>, _>::from_raw(width as u32, height as u32, pixel_data)
    }
}

#[derive(Debug, Clone)]
pub struct PointMarkers {
    pub name: String,
    /// Screen positions of the points lying on the slice.
    pub xy: Vec<[f64; 2]>,
    /// Category per shown point; empty when the set has none.
    pub categories: Vec<u32>,
    pub style: PointStyle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::ElementType;
    use ndarray::Array3;

    fn stack_ingredient() -> Ingredient {
        let data = Array3::from_shape_fn((3, 4, 5), |(z, x, y)| (z * 100 + x * 10 + y) as f64);
        Ingredient::image_stack("stack", VolumeStack::new(data, ElementType::U16))
    }

    fn point_ingredient() -> Ingredient {
        let points = PointSet::new(vec![[1.0, 2.0, 3.0], [1.0, 4.0, 5.0], [2.0, 2.0, 3.0]]);
        Ingredient::sparse_points("points", points, PointStyle::default())
    }

    #[test]
    fn image_slice_extracts_plane_at_index() {
        let ingredient = stack_ingredient();
        let RenderableLayer::Image(image) = ingredient.render_slice(Orientation::Coronal, 2) else {
            panic!("expected an image layer");
        };
        assert_eq!(image.plane.dim(), (3, 5));
        assert_eq!(image.sample(1, 4), 124.0);
        assert_eq!(image.sample(-1, 0), 0.0);
        assert_eq!(image.sample(3, 0), 0.0);
        assert_eq!(image.levels, (0.0, 234.0));
    }

    #[test]
    fn out_of_range_image_slice_is_empty() {
        let ingredient = stack_ingredient();
        let RenderableLayer::Image(image) = ingredient.render_slice(Orientation::Axial, 9) else {
            panic!("expected an image layer");
        };
        assert_eq!(image.plane.dim(), (0, 0));
    }

    #[test]
    fn points_are_filtered_and_projected() {
        let ingredient = point_ingredient();
        let RenderableLayer::Points(markers) = ingredient.render_slice(Orientation::Axial, 1) else {
            panic!("expected point markers");
        };
        assert_eq!(markers.xy, vec![[2.0, 3.0], [4.0, 5.0]]);

        let RenderableLayer::Points(markers) = ingredient.render_slice(Orientation::Coronal, 2) else {
            panic!("expected point markers");
        };
        assert_eq!(markers.xy, vec![[1.0, 3.0], [2.0, 3.0]]);
    }

    #[test]
    fn sagittal_points_swap_remaining_coordinates() {
        let ingredient = point_ingredient();
        let RenderableLayer::Points(markers) = ingredient.render_slice(Orientation::Sagittal, 3) else {
            panic!("expected point markers");
        };
        // (z, x) of the two points at y == 3, shown as (x, z)
        assert_eq!(markers.xy, vec![[2.0, 1.0], [2.0, 2.0]]);
    }

    #[test]
    fn z_spread_widens_the_slab() {
        let mut ingredient = point_ingredient();
        ingredient.as_points_mut().unwrap().z_spread = [1.0, 0.0, 0.0];
        let RenderableLayer::Points(markers) = ingredient.render_slice(Orientation::Axial, 2) else {
            panic!("expected point markers");
        };
        assert_eq!(markers.xy.len(), 3);
    }

    #[test]
    fn luts_map_intensity_to_rgba() {
        assert_eq!(Lut::Gray.map(1.0, 255), [255, 255, 255, 255]);
        assert_eq!(Lut::from_name("red").map(0.5, 200), [128, 0, 0, 200]);
        assert_eq!(Lut::from_name("grey"), Lut::Gray);
        let table = Lut::Table(vec![[0, 0, 0, 255], [10, 20, 30, 255]]);
        assert_eq!(table.map(1.0, 255), [10, 20, 30, 255]);
        assert_eq!(table.map(f64::NAN, 255), [0, 0, 0, 255]);
    }

    #[test]
    fn rasterising_respects_aspect_ratio() {
        let ingredient = stack_ingredient();
        let RenderableLayer::Image(image) = ingredient.render_slice(Orientation::Axial, 0) else {
            panic!("expected an image layer");
        };
        let raster = image.to_rgba_image(1.0).unwrap();
        assert_eq!((raster.width(), raster.height()), (4, 5));
        let raster = image.to_rgba_image(2.0).unwrap();
        assert_eq!((raster.width(), raster.height()), (8, 5));
    }

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(stack_ingredient().kind(), IngredientKind::ImageStack);
        assert_eq!(point_ingredient().kind(), IngredientKind::SparsePoints);
        assert_eq!(stack_ingredient().depth(Orientation::Sagittal), Some(5));
        assert_eq!(point_ingredient().depth(Orientation::Axial), None);
    }
}
