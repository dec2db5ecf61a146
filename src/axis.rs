//! One orthogonal projection through the loaded volumes.
//!
//! An axis owns no ingredients. It keeps the layers rendered from them at
//! its current slice, and refers to its sibling axes by [`Orientation`]
//! only; the session resolves those ids when propagating links.

use crate::enums::{IngredientKind, Orientation};
use crate::ingredient::{ImagePlane, Ingredient, PointMarkers, RenderableLayer};

use image::{Pixel, Rgba, RgbaImage, imageops};

/// A screen dimension of a projection axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlotDim {
    X,
    Y,
}

/// Declares that panning or zooming this axis drives `target`.
///
/// `link_x` names the dimension of `target` that follows this axis's x
/// range, `link_y` the one that follows its y range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisLink {
    pub target: Orientation,
    pub link_x: Option<PlotDim>,
    pub link_y: Option<PlotDim>,
    pub link_zoom: bool,
}

/// Visible data range of an axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewRange {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl Default for ViewRange {
    fn default() -> Self {
        Self {
            x: (0.0, 1.0),
            y: (0.0, 1.0),
        }
    }
}

impl ViewRange {
    pub fn get(&self, dim: PlotDim) -> (f64, f64) {
        match dim {
            PlotDim::X => self.x,
            PlotDim::Y => self.y,
        }
    }

    pub fn set(&mut self, dim: PlotDim, range: (f64, f64)) {
        match dim {
            PlotDim::X => self.x = range,
            PlotDim::Y => self.y = range,
        }
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: (self.x.0 + dx, self.x.1 + dx),
            y: (self.y.0 + dy, self.y.1 + dy),
        }
    }

    /// Scale both ranges about their centres; `factor > 1` zooms out.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |(lo, hi): (f64, f64)| {
            let centre = (lo + hi) / 2.0;
            let half = (hi - lo) / 2.0 * factor;
            (centre - half, centre + half)
        };
        Self {
            x: scale(self.x),
            y: scale(self.y),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionAxis {
    orientation: Orientation,
    current_slice: Option<usize>,
    aspect_ratio: f64,
    layers: Vec<RenderableLayer>,
    links: Vec<AxisLink>,
    linked_x_projection: Orientation,
    linked_y_projection: Orientation,
    view_range: ViewRange,
    /// Set while the user control-drags across this axis.
    pub control_drag: bool,
}

impl ProjectionAxis {
    pub fn new(orientation: Orientation, aspect_ratio: f64) -> Self {
        Self {
            orientation,
            current_slice: None,
            aspect_ratio: if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
                aspect_ratio
            } else {
                1.0
            },
            layers: Vec::new(),
            links: Vec::new(),
            linked_x_projection: orientation,
            linked_y_projection: orientation,
            view_range: ViewRange::default(),
            control_drag: false,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn current_slice(&self) -> Option<usize> {
        self.current_slice
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, ratio: f64) {
        if ratio.is_finite() && ratio > 0.0 {
            self.aspect_ratio = ratio;
        } else {
            log::warn!("Ignoring invalid aspect ratio {ratio} for {} axis", self.orientation);
        }
    }

    pub fn layers(&self) -> &[RenderableLayer] {
        &self.layers
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&RenderableLayer> {
        self.layers.iter().find(|layer| layer.name() == name)
    }

    pub fn image_layers(&self) -> impl Iterator<Item = &ImagePlane> {
        self.layers.iter().filter_map(RenderableLayer::as_image)
    }

    /// Link (or re-link) this axis to `target`.
    pub fn link(
        &mut self,
        target: Orientation,
        link_x: Option<PlotDim>,
        link_y: Option<PlotDim>,
        link_zoom: bool,
    ) {
        self.links.retain(|link| link.target != target);
        self.links.push(AxisLink {
            target,
            link_x,
            link_y,
            link_zoom,
        });
    }

    pub fn links(&self) -> &[AxisLink] {
        &self.links
    }

    /// Axes whose slices follow this axis's cursor: the linked-Y projection
    /// takes the cursor x, the linked-X projection the cursor y.
    pub fn set_linked_projections(&mut self, x: Orientation, y: Orientation) {
        self.linked_x_projection = x;
        self.linked_y_projection = y;
    }

    pub fn linked_x_projection(&self) -> Orientation {
        self.linked_x_projection
    }

    pub fn linked_y_projection(&self) -> Orientation {
        self.linked_y_projection
    }

    pub fn view_range(&self) -> ViewRange {
        self.view_range
    }

    pub fn set_view_range(&mut self, range: ViewRange) {
        self.view_range = range;
    }

    /// Frame the first image layer.
    pub fn reset_view(&mut self) {
        let dims = self.image_layers().next().map(|image| image.plane.dim());
        if let Some((width, height)) = dims {
            self.view_range = ViewRange {
                x: (0.0, width as f64),
                y: (0.0, height as f64),
            };
        }
    }

    /// Tallest image stack along this axis, if any is loaded.
    pub fn max_depth(&self, ingredients: &[Ingredient]) -> Option<usize> {
        ingredients
            .iter()
            .filter_map(|ingredient| ingredient.depth(self.orientation))
            .max()
    }

    /// Re-render every enabled ingredient. Image stacks go first so that
    /// other layers overlay them. With no slice (or on reset) the middle
    /// slice of the tallest stack is shown.
    pub fn update_layers(
        &mut self,
        ingredients: &[Ingredient],
        slice: Option<usize>,
        reset_to_middle: bool,
    ) {
        let Some(depth) = self.max_depth(ingredients).filter(|d| *d > 0) else {
            self.layers.clear();
            self.current_slice = None;
            return;
        };
        let slice = match slice {
            Some(slice) if !reset_to_middle => slice.min(depth - 1),
            _ => depth / 2,
        };
        self.current_slice = Some(slice);

        let enabled = ingredients.iter().filter(|ingredient| ingredient.enabled);
        let (images, others): (Vec<_>, Vec<_>) =
            enabled.partition(|ingredient| ingredient.kind() == IngredientKind::ImageStack);
        self.layers = images
            .into_iter()
            .chain(others)
            .map(|ingredient| ingredient.render_slice(self.orientation, slice))
            .collect();
        log::trace!(
            "{} axis shows slice {slice} with {} layers",
            self.orientation,
            self.layers.len()
        );
    }

    /// Move to slice `k`, clamped into range, and re-render.
    pub fn set_slice(&mut self, ingredients: &[Ingredient], k: i64) {
        let Some(depth) = self.max_depth(ingredients).filter(|d| *d > 0) else {
            return;
        };
        let clamped = k.clamp(0, depth as i64 - 1) as usize;
        self.update_layers(ingredients, Some(clamped), false);
    }

    pub fn step_by(&mut self, ingredients: &[Ingredient], delta: i64) {
        let current = self.current_slice.unwrap_or(0) as i64;
        self.set_slice(ingredients, current.saturating_add(delta));
    }

    /// Voxel (Z, X, Y) under screen position (x, y) at the current slice.
    pub fn voxel_position(&self, x: i64, y: i64) -> Option<[i64; 3]> {
        let s = self.current_slice? as i64;
        Some(match self.orientation {
            Orientation::Axial => [s, x, y],
            Orientation::Coronal => [x, s, y],
            Orientation::Sagittal => [y, x, s],
        })
    }

    /// Value of every image layer at (x, y), in layer order.
    pub fn sample(&self, x: i64, y: i64) -> Vec<f64> {
        self.image_layers().map(|image| image.sample(x, y)).collect()
    }

    /// Push display levels to the named image layer immediately.
    pub fn set_levels(&mut self, name: &str, levels: (f64, f64)) -> bool {
        for layer in &mut self.layers {
            if let RenderableLayer::Image(image) = layer {
                if image.name == name {
                    image.levels = levels;
                    return true;
                }
            }
        }
        false
    }

    pub fn remove_layer(&mut self, name: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|layer| layer.name() != name);
        self.layers.len() < before
    }

    /// Flatten the current layers into one aspect-corrected RGBA image:
    /// image layers are composited in order, point markers drawn on top.
    /// `None` if there is no image layer to size the canvas.
    pub fn rasterise(&self) -> Option<RgbaImage> {
        let mut images = self.image_layers();
        let base = images.next()?;
        let mut canvas = base.to_rgba_image(self.aspect_ratio)?;
        for image in images {
            if let Some(top) = image.to_rgba_image(self.aspect_ratio) {
                imageops::overlay(&mut canvas, &top, 0, 0);
            }
        }

        let (plane_width, plane_height) = base.plane.dim();
        if plane_width == 0 || plane_height == 0 {
            return Some(canvas);
        }
        let scale_x = canvas.width() as f64 / plane_width as f64;
        let scale_y = canvas.height() as f64 / plane_height as f64;
        for layer in &self.layers {
            if let RenderableLayer::Points(markers) = layer {
                draw_markers(&mut canvas, markers, scale_x, scale_y);
            }
        }
        Some(canvas)
    }
}

fn draw_markers(canvas: &mut RgbaImage, markers: &PointMarkers, scale_x: f64, scale_y: f64) {
    let style = &markers.style;
    let [r, g, b] = style.color.rgb().unwrap_or([255, 0, 0]);
    let colour = Rgba([r, g, b, style.opacity]);
    let half = (style.size / 2.0).max(0.5);
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);

    for [x, y] in &markers.xy {
        // Pixel centres, as the cross hairs use
        let cx = (x + 0.5) * scale_x;
        let cy = (y + 0.5) * scale_y;
        let x0 = ((cx - half).floor() as i64).max(0);
        let x1 = ((cx + half).ceil() as i64).min(width);
        let y0 = ((cy - half).floor() as i64).max(0);
        let y1 = ((cy + half).ceil() as i64).min(height);
        for py in y0..y1 {
            for px in x0..x1 {
                canvas.get_pixel_mut(px as u32, py as u32).blend(&colour);
            }
        }
    }
}
