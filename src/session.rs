//! The viewer session: ingredients, the three projection axes, hooks,
//! plugins and preferences, and every operation that coordinates them.

use crate::axis::{PlotDim, ProjectionAxis, ViewRange};
use crate::codec::{self, CodecError, StackFormat};
use crate::config::Preferences;
use crate::enums::{IngredientKind, Orientation, Symbol, UnknownKind};
use crate::hooks::{HookArgs, HookError, HookFn, HookId, HookPoint, HookRegistry};
use crate::ingredient::{Color, Ingredient, IngredientData, Lut, PointStyle};
use crate::plugin::{Plugin, PluginError};
use crate::points::{self, PointsError};
use crate::volume::Histogram;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    #[error("Ingredient kind {found} does not match requested kind {expected}")]
    KindMismatch {
        expected: IngredientKind,
        found: IngredientKind,
    },

    #[error("No ingredient named '{0}'")]
    NoSuchIngredient(String),

    #[error("No image stack is selected")]
    NoStackSelected,

    #[error("No recent file at position {0}")]
    NoSuchRecentFile(usize),

    #[error("Only MHD stacks can be saved: {path:?}")]
    SaveUnsupported { path: Option<PathBuf> },

    #[error("Hook on {point} failed: {source}")]
    Hook { point: HookPoint, source: HookError },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Points(#[from] PointsError),
}

/// Where the mouse last was, in screen and voxel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseState {
    pub axis: Orientation,
    pub x: i64,
    pub y: i64,
    pub voxel: [i64; 3],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossHairs {
    pub axis: Orientation,
    pub x: f64,
    pub y: f64,
    /// Drawn highlighted while control-dragging.
    pub highlighted: bool,
}

struct PluginSlot {
    plugin: Option<Box<dyn Plugin>>,
    running: bool,
}

pub struct Session {
    ingredients: Vec<Ingredient>,
    axes: [ProjectionAxis; 3],
    hooks: HookRegistry,
    plugins: BTreeMap<String, PluginSlot>,
    preferences: Preferences,
    selected_stack: Option<String>,
    status_text: String,
    status_draft: Option<String>,
    mouse: Option<MouseState>,
    cross_hairs: Option<CrossHairs>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Preferences::default())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ingredients", &self.ingredient_names())
            .field("selected_stack", &self.selected_stack)
            .field("status_text", &self.status_text)
            .field("hooks", &self.hooks)
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Session {
    pub fn new(preferences: Preferences) -> Self {
        let ratios = preferences.default_axis_ratios;
        let mut axes = Orientation::ALL.map(|o| ProjectionAxis::new(o, ratios[o.index()]));

        use Orientation::*;
        use PlotDim::*;
        let [axial, coronal, sagittal] = &mut axes;
        axial.link(Coronal, None, Some(Y), true);
        axial.link(Sagittal, Some(X), None, true);
        axial.set_linked_projections(Sagittal, Coronal);
        coronal.link(Axial, None, Some(Y), true);
        coronal.link(Sagittal, Some(Y), None, true);
        coronal.set_linked_projections(Sagittal, Axial);
        sagittal.link(Axial, Some(X), None, true);
        sagittal.link(Coronal, None, Some(X), true);
        sagittal.set_linked_projections(Axial, Coronal);

        Self {
            ingredients: Vec::new(),
            axes,
            hooks: HookRegistry::new(),
            plugins: BTreeMap::new(),
            preferences,
            selected_stack: None,
            status_text: String::new(),
            status_draft: None,
            mouse: None,
            cross_hairs: None,
        }
    }

    // ---------------------------------------------------------------
    // Accessors

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn preferences_mut(&mut self) -> &mut Preferences {
        &mut self.preferences
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    pub fn ingredient_names(&self) -> Vec<&str> {
        self.ingredients.iter().map(Ingredient::name).collect()
    }

    pub fn ingredient(&self, name: &str) -> Option<&Ingredient> {
        self.ingredients.iter().find(|i| i.name() == name)
    }

    /// Mutable access; call [`refresh`](Self::refresh) afterwards to redraw.
    pub fn ingredient_mut(&mut self, name: &str) -> Option<&mut Ingredient> {
        self.ingredients.iter_mut().find(|i| i.name() == name)
    }

    pub fn ingredients_of_kind(&self, kind: IngredientKind) -> impl Iterator<Item = &Ingredient> {
        self.ingredients.iter().filter(move |i| i.kind() == kind)
    }

    /// Image stack names in the order they were added.
    pub fn stack_names(&self) -> Vec<String> {
        self.ingredients_of_kind(IngredientKind::ImageStack)
            .map(|i| i.name().to_string())
            .collect()
    }

    pub fn has_stacks(&self) -> bool {
        self.ingredients_of_kind(IngredientKind::ImageStack).next().is_some()
    }

    pub fn axes(&self) -> &[ProjectionAxis; 3] {
        &self.axes
    }

    pub fn axis(&self, orientation: Orientation) -> &ProjectionAxis {
        &self.axes[orientation.index()]
    }

    pub fn axis_mut(&mut self, orientation: Orientation) -> &mut ProjectionAxis {
        &mut self.axes[orientation.index()]
    }

    pub fn selected_stack_name(&self) -> Option<&str> {
        self.selected_stack.as_deref()
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn mouse(&self) -> Option<MouseState> {
        self.mouse
    }

    pub fn cross_hairs(&self) -> Option<CrossHairs> {
        self.cross_hairs
    }

    // ---------------------------------------------------------------
    // Hooks

    pub fn register_hook(&mut self, point: HookPoint, callback: HookFn) -> HookId {
        self.hooks.register(point, callback)
    }

    pub fn detach_hook(&mut self, id: HookId) -> bool {
        self.hooks.detach(id)
    }

    pub fn hook_count(&self, point: HookPoint) -> usize {
        self.hooks.len(point)
    }

    /// Run every callback on `point`, stopping at the first error.
    pub fn fire(&mut self, point: HookPoint, args: HookArgs) -> Result<(), SessionError> {
        self.run_hooks(point, args, true)
    }

    /// Run every callback on `point`, logging and skipping failures.
    pub fn fire_lenient(&mut self, point: HookPoint, args: HookArgs) {
        let _ = self.run_hooks(point, args, false);
    }

    fn run_hooks(&mut self, point: HookPoint, args: HookArgs, strict: bool) -> Result<(), SessionError> {
        let mut entries = self.hooks.take(point);
        let mut outcome = Ok(());
        for entry in &mut entries {
            if self.hooks.is_detached(entry.id()) {
                continue;
            }
            if let Err(source) = entry.call(self, &args) {
                if strict {
                    outcome = Err(SessionError::Hook { point, source });
                    break;
                }
                log::error!("Hook {:?} on {point} failed: {source}", entry.id());
            }
        }
        self.hooks.restore(point, entries);
        outcome
    }

    // ---------------------------------------------------------------
    // Ingredient management

    /// Add an ingredient, replacing any existing one with the same name.
    pub fn add_ingredient(&mut self, ingredient: Ingredient) {
        if self.remove_ingredient_by_name(ingredient.name()) {
            log::debug!("Replaced existing ingredient {}", ingredient.name());
        }
        log::info!("Adding {} ingredient: {}", ingredient.kind(), ingredient.name());
        let is_stack = ingredient.kind() == IngredientKind::ImageStack;
        self.ingredients.push(ingredient);
        if is_stack {
            self.apply_default_colours();
        }
        self.reselect_stack();
    }

    /// Add by kind name, as plugins do.
    pub fn add_ingredient_of_kind(
        &mut self,
        kind: &str,
        name: &str,
        data: IngredientData,
    ) -> Result<(), SessionError> {
        let expected: IngredientKind = kind.parse()?;
        let ingredient = Ingredient::new(name, data);
        if ingredient.kind() != expected {
            return Err(SessionError::KindMismatch {
                expected,
                found: ingredient.kind(),
            });
        }
        self.add_ingredient(ingredient);
        Ok(())
    }

    /// A lone stack is gray. Otherwise stacks are tinted from
    /// `color_order` by position, and only the newest is recoloured once
    /// there are more than two.
    fn apply_default_colours(&mut self) {
        let order = self.preferences.color_order.clone();
        let mut stacks: Vec<&mut Ingredient> = self
            .ingredients
            .iter_mut()
            .filter(|i| i.kind() == IngredientKind::ImageStack)
            .collect();
        let colour = |n: usize| {
            if order.is_empty() {
                Lut::Gray
            } else {
                Lut::from_name(&order[n % order.len()])
            }
        };
        match stacks.len() {
            0 => {}
            1 => {
                if let Some(layer) = stacks[0].as_stack_mut() {
                    layer.lut = Lut::Gray;
                }
            }
            2 => {
                for (n, ingredient) in stacks.iter_mut().enumerate() {
                    if let Some(layer) = ingredient.as_stack_mut() {
                        layer.lut = colour(n);
                    }
                }
            }
            n => {
                if let Some(layer) = stacks[n - 1].as_stack_mut() {
                    layer.lut = colour(n - 1);
                }
            }
        }
    }

    /// Returns `false` (and changes nothing) if no such ingredient exists.
    pub fn remove_ingredient_by_name(&mut self, name: &str) -> bool {
        let before = self.ingredients.len();
        self.ingredients.retain(|i| i.name() != name);
        if self.ingredients.len() == before {
            return false;
        }
        log::debug!("Removed ingredient {name}");
        for axis in &mut self.axes {
            axis.remove_layer(name);
        }
        self.reselect_stack();
        self.initialise_axes(false);
        true
    }

    /// Remove every ingredient of `kind`, returning how many went.
    pub fn remove_ingredients_by_kind(&mut self, kind: IngredientKind) -> usize {
        let doomed: Vec<String> = self
            .ingredients_of_kind(kind)
            .map(|i| i.name().to_string())
            .collect();
        doomed
            .iter()
            .filter(|name| self.remove_ingredient_by_name(name))
            .count()
    }

    fn reselect_stack(&mut self) {
        let stacks = self.stack_names();
        let still_there = self
            .selected_stack
            .as_ref()
            .is_some_and(|name| stacks.contains(name));
        if !still_there {
            self.selected_stack = stacks.into_iter().next();
        }
    }

    pub fn select_stack(&mut self, name: &str) -> Result<(), SessionError> {
        match self.ingredient(name) {
            Some(i) if i.kind() == IngredientKind::ImageStack => {
                self.selected_stack = Some(name.to_string());
                Ok(())
            }
            _ => Err(SessionError::NoSuchIngredient(name.to_string())),
        }
    }

    // ---------------------------------------------------------------
    // Axes

    /// Re-render every axis, optionally snapping to the middle slices and
    /// reframing the views.
    pub fn initialise_axes(&mut self, reset: bool) {
        for axis in &mut self.axes {
            let slice = axis.current_slice();
            axis.update_layers(&self.ingredients, slice, reset);
            if reset {
                axis.reset_view();
            }
        }
    }

    /// Re-render after editing ingredients in place.
    pub fn refresh(&mut self) {
        self.initialise_axes(false);
    }

    pub fn set_axis_ratios(&mut self, ratios: [f64; 3]) {
        for (axis, ratio) in self.axes.iter_mut().zip(ratios) {
            axis.set_aspect_ratio(ratio);
        }
    }

    pub fn wheel(&mut self, axis: Orientation, delta: i64) {
        self.axes[axis.index()].step_by(&self.ingredients, delta);
    }

    pub fn set_slice(&mut self, axis: Orientation, slice: i64) {
        self.axes[axis.index()].set_slice(&self.ingredients, slice);
    }

    pub fn pan(&mut self, axis: Orientation, dx: f64, dy: f64) {
        let range = self.axes[axis.index()].view_range().translated(dx, dy);
        self.propagate_view_range(axis, range, false);
    }

    pub fn zoom(&mut self, axis: Orientation, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let range = self.axes[axis.index()].view_range().scaled(factor);
        self.propagate_view_range(axis, range, true);
    }

    pub fn set_view_range(&mut self, axis: Orientation, x: (f64, f64), y: (f64, f64)) {
        self.propagate_view_range(axis, ViewRange { x, y }, false);
    }

    /// Apply `range` to `axis` and push it one hop along its links.
    fn propagate_view_range(&mut self, axis: Orientation, range: ViewRange, zooming: bool) {
        let source = &mut self.axes[axis.index()];
        source.set_view_range(range);
        let links = source.links().to_vec();
        for link in links {
            if zooming && !link.link_zoom {
                continue;
            }
            let target = &mut self.axes[link.target.index()];
            let mut linked = target.view_range();
            if let Some(dim) = link.link_x {
                linked.set(dim, range.x);
            }
            if let Some(dim) = link.link_y {
                linked.set(dim, range.y);
            }
            target.set_view_range(linked);
        }
    }

    pub fn axis_clicked(&mut self, axis: Orientation) {
        self.fire_lenient(HookPoint::AxisClicked, HookArgs::Axis(axis));
    }

    /// Start or end a control-drag on `axis`, during which mouse moves
    /// drive the slices of the linked projections.
    pub fn set_control_drag(&mut self, axis: Orientation, active: bool) {
        self.axes[axis.index()].control_drag = active;
    }

    // ---------------------------------------------------------------
    // Loading

    /// Load an image stack from disk and add it as an ingredient named after
    /// the file. On failure the ingredient list is left untouched.
    pub fn load_image_stack(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        self.fire(HookPoint::LoadImageStackStart, HookArgs::None)?;

        if !path.is_file() {
            self.status_text = format!("Unable to find {}", path.display());
            log::warn!("{}", self.status_text);
            return Err(CodecError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        log::info!("Loading image stack {path:?}");
        let stack = match codec::decode(path) {
            Ok(stack) => stack,
            Err(err) => {
                log::error!("Failed to load {path:?}: {err}");
                self.status_text = format!("Failed to load {}: {err}", path.display());
                return Err(err.into());
            }
        };

        let ratios = if stack.has_native_spacing() {
            stack.spacing_ratios()
        } else {
            self.preferences.default_axis_ratios
        };
        self.set_axis_ratios(ratios);

        let name = file_name(path);
        self.add_ingredient(Ingredient::image_stack(name, stack));
        self.initialise_axes(true);
        self.preferences.push_recent_file(path);

        self.fire(HookPoint::LoadImageStackEnd, HookArgs::None)
    }

    /// Load a point file as a sparse-points ingredient styled from the
    /// preferences.
    pub fn load_points(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        let points = points::load(path).inspect_err(|err| {
            log::error!("Failed to load points {path:?}: {err}");
        })?;
        self.add_point_set(path, points);
        Ok(())
    }

    /// Load `series,z,x,y` rows; the series number is kept as each point's
    /// category.
    pub fn load_line_series(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        let points = points::read_line_series(path).inspect_err(|err| {
            log::error!("Failed to load line series {path:?}: {err}");
        })?;
        self.add_point_set(path, points);
        Ok(())
    }

    fn add_point_set(&mut self, path: &Path, points: points::PointSet) {
        let prefs = &self.preferences;
        let style = PointStyle {
            symbol: prefs.symbol_order.first().copied().unwrap_or_default(),
            size: prefs.default_symbol_size,
            opacity: prefs.default_symbol_opacity,
            line_width: prefs.default_line_width,
            ..PointStyle::default()
        };
        let mut ingredient = Ingredient::sparse_points(file_name(path), points, style);
        if let Some(layer) = ingredient.as_points_mut() {
            layer.z_spread = prefs.default_point_z_spread;
        }
        log::info!("Loaded {} points from {path:?}", ingredient.as_points().map_or(0, |l| l.points.len()));
        self.add_ingredient(ingredient);
        self.initialise_axes(false);
    }

    /// Ask `picker` for a file. The picker receives the file filter and the
    /// last directory loaded from, and returns `None` when cancelled.
    pub fn show_file_load_dialog<F>(
        &mut self,
        filter: &str,
        picker: F,
    ) -> Result<Option<PathBuf>, SessionError>
    where
        F: FnOnce(&str, Option<&Path>) -> Option<PathBuf>,
    {
        self.fire(HookPoint::ShowFileLoadDialogStart, HookArgs::None)?;
        let Some(path) = picker(filter, self.preferences.last_load_dir.as_deref()) else {
            return Ok(None);
        };
        self.preferences.last_load_dir = path.parent().map(Path::to_path_buf);
        self.preferences.push_recent_file(&path);
        self.fire(HookPoint::ShowFileLoadDialogEnd, HookArgs::None)?;
        Ok(Some(path))
    }

    /// Pick and load an image stack. Returns `false` if the picker was
    /// cancelled or the chosen file does not exist.
    pub fn load_stack_via_dialog<F>(&mut self, picker: F) -> Result<bool, SessionError>
    where
        F: FnOnce(&str, Option<&Path>) -> Option<PathBuf>,
    {
        self.fire(HookPoint::ShowStackLoadDialogStart, HookArgs::None)?;
        let Some(path) = self.show_file_load_dialog(&codec::image_filter(), picker)? else {
            return Ok(false);
        };
        let loaded = if path.is_file() {
            self.load_image_stack(&path)?;
            self.initialise_axes(false);
            true
        } else {
            self.status_text = format!("Unable to find {}", path.display());
            false
        };
        self.fire(HookPoint::ShowStackLoadDialogEnd, HookArgs::None)?;
        Ok(loaded)
    }

    pub fn load_recent_file(&mut self, index: usize) -> Result<(), SessionError> {
        self.fire(HookPoint::LoadRecentFileStart, HookArgs::None)?;
        let path = self
            .preferences
            .recent_files
            .get(index)
            .cloned()
            .ok_or(SessionError::NoSuchRecentFile(index))?;
        self.load_image_stack(path)?;
        self.initialise_axes(false);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Navigation and status

    /// Track the mouse at screen position (x, y) on `axis`.
    pub fn mouse_moved(&mut self, axis: Orientation, x: i64, y: i64, control_held: bool) {
        if !self.has_stacks() {
            return;
        }
        self.remove_cross_hairs();
        let index = axis.index();
        if !control_held {
            self.axes[index].control_drag = false;
        }
        let Some(voxel) = self.axes[index].voxel_position(x, y) else {
            return;
        };
        self.mouse = Some(MouseState { axis, x, y, voxel });

        let dragging = control_held && self.axes[index].control_drag;
        if dragging {
            let linked_y = self.axes[index].linked_y_projection().index();
            let linked_x = self.axes[index].linked_x_projection().index();
            self.axes[linked_y].set_slice(&self.ingredients, x);
            self.axes[linked_x].set_slice(&self.ingredients, y);
        }

        self.fire_lenient(HookPoint::MouseMoveStart, HookArgs::Axis(axis));
        self.update_cross_hairs(dragging);
        self.update_status_bar();
        self.fire_lenient(HookPoint::MouseMoveEnd, HookArgs::Axis(axis));
    }

    fn remove_cross_hairs(&mut self) {
        self.fire_lenient(HookPoint::RemoveCrossHairsStart, HookArgs::None);
        if self.preferences.show_cross_hairs {
            self.cross_hairs = None;
        }
    }

    fn update_cross_hairs(&mut self, highlighted: bool) {
        if !self.preferences.show_cross_hairs {
            return;
        }
        if let Some(mouse) = self.mouse {
            self.cross_hairs = Some(CrossHairs {
                axis: mouse.axis,
                x: mouse.x as f64 + 0.5,
                y: mouse.y as f64 + 0.5,
                highlighted,
            });
        }
    }

    /// Rebuild the status text for the current mouse position. Values are
    /// listed last-added layer first.
    pub fn update_status_bar(&mut self) {
        let Some(mouse) = self.mouse else {
            return;
        };
        let values = self.axes[mouse.axis.index()].sample(mouse.x, mouse.y);
        let values: Vec<String> = values.iter().rev().map(|v| (*v as i64).to_string()).collect();
        self.status_draft = Some(format!(
            "X={}, Y={}, val=[{}]",
            mouse.x,
            mouse.y,
            values.join(",")
        ));
        self.fire_lenient(HookPoint::UpdateStatusBarEnd, HookArgs::None);
        if let Some(text) = self.status_draft.take() {
            self.status_text = text;
        }
    }

    /// Status text being built, visible to `UpdateStatusBarEnd` hooks.
    pub fn status_draft(&self) -> Option<&str> {
        self.status_draft.as_deref()
    }

    /// Append to the status text being built, or to the shown text when
    /// no update is in progress.
    pub fn append_status(&mut self, text: &str) {
        match &mut self.status_draft {
            Some(draft) => draft.push_str(text),
            None => self.status_text.push_str(text),
        }
    }

    pub fn set_status_text(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
    }

    // ---------------------------------------------------------------
    // Display parameters

    /// Set the display window of the selected stack and apply it to that
    /// stack's layers on all three axes at once.
    pub fn set_intensity_range(&mut self, min: f64, max: f64) -> Result<(), SessionError> {
        let name = self
            .selected_stack
            .clone()
            .ok_or(SessionError::NoStackSelected)?;
        let layer = self
            .ingredient_mut(&name)
            .and_then(Ingredient::as_stack_mut)
            .ok_or_else(|| SessionError::NoSuchIngredient(name.clone()))?;
        layer.stack.set_intensity_range(min, max);
        let levels = layer.stack.intensity_range();
        for axis in &mut self.axes {
            axis.set_levels(&name, levels);
        }
        Ok(())
    }

    /// Intensity histogram of the selected stack, for windowing controls.
    pub fn selected_histogram(&self, bins: usize) -> Option<Histogram> {
        let name = self.selected_stack.as_deref()?;
        let layer = self.ingredient(name)?.as_stack()?;
        Some(layer.stack.histogram(bins))
    }

    pub fn set_lut(&mut self, name: &str, lut: Lut) -> Result<(), SessionError> {
        let layer = self
            .ingredient_mut(name)
            .and_then(Ingredient::as_stack_mut)
            .ok_or_else(|| SessionError::NoSuchIngredient(name.to_string()))?;
        layer.lut = lut;
        self.initialise_axes(false);
        self.fire_lenient(HookPoint::ChangeColorMapEnd, HookArgs::None);
        Ok(())
    }

    /// Opacity 0-255, used as the layer's alpha.
    pub fn set_opacity(&mut self, name: &str, alpha: u8) -> Result<(), SessionError> {
        let ingredient = self
            .ingredient_mut(name)
            .ok_or_else(|| SessionError::NoSuchIngredient(name.to_string()))?;
        match ingredient.data_mut() {
            IngredientData::ImageStack(layer) => layer.opacity = alpha,
            IngredientData::SparsePoints(layer) => layer.style.opacity = alpha,
        }
        self.initialise_axes(false);
        Ok(())
    }

    pub fn delete_selected_stack(&mut self) -> Result<String, SessionError> {
        let name = self
            .selected_stack
            .clone()
            .ok_or(SessionError::NoStackSelected)?;
        self.remove_ingredient_by_name(&name);
        log::info!("Removed {name}");
        self.fire_lenient(HookPoint::DeleteLayerEnd, HookArgs::None);
        Ok(name)
    }

    /// Write the selected stack back over its MHD source.
    pub fn save_selected_stack(&mut self) -> Result<PathBuf, SessionError> {
        let name = self
            .selected_stack
            .clone()
            .ok_or(SessionError::NoStackSelected)?;
        let layer = self
            .ingredient(&name)
            .and_then(Ingredient::as_stack)
            .ok_or_else(|| SessionError::NoSuchIngredient(name.clone()))?;
        let source = layer.stack.source().map(Path::to_path_buf);
        match &source {
            Some(path) if StackFormat::from_path(path) == Some(StackFormat::Mhd) => {
                codec::mhd::write(&layer.stack, path)?;
                log::info!("Saved {name} to {path:?}");
                Ok(path.clone())
            }
            _ => Err(SessionError::SaveUnsupported { path: source }),
        }
    }

    fn with_point_style(
        &mut self,
        name: &str,
        update: impl FnOnce(&mut PointStyle),
    ) -> Result<(), SessionError> {
        let layer = self
            .ingredient_mut(name)
            .and_then(Ingredient::as_points_mut)
            .ok_or_else(|| SessionError::NoSuchIngredient(name.to_string()))?;
        update(&mut layer.style);
        self.initialise_axes(false);
        Ok(())
    }

    pub fn set_point_symbol(&mut self, name: &str, symbol: Symbol) -> Result<(), SessionError> {
        self.with_point_style(name, |style| style.symbol = symbol)
    }

    pub fn set_point_size(&mut self, name: &str, size: f64) -> Result<(), SessionError> {
        self.with_point_style(name, |style| style.size = size.max(0.0))
    }

    pub fn set_point_color(&mut self, name: &str, color: Color) -> Result<(), SessionError> {
        self.with_point_style(name, |style| style.color = color)
    }

    pub fn set_point_line_width(&mut self, name: &str, width: f64) -> Result<(), SessionError> {
        self.with_point_style(name, |style| style.line_width = width.max(0.0))
    }

    /// Set how far from the slice points on `axis` are still shown, for
    /// every point layer.
    pub fn set_point_z_spread(&mut self, axis: Orientation, spread: f64) {
        let spread = spread.max(0.0);
        for ingredient in &mut self.ingredients {
            if let Some(layer) = ingredient.as_points_mut() {
                layer.z_spread[axis.index()] = spread;
            }
        }
        self.preferences.default_point_z_spread[axis.index()] = spread;
        self.initialise_axes(false);
    }

    // ---------------------------------------------------------------
    // Plugins

    /// Make a plugin available to start by name.
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) {
        let name = plugin.name().to_string();
        log::debug!("Registered plugin {name}");
        self.plugins.insert(
            name,
            PluginSlot {
                plugin: Some(plugin),
                running: false,
            },
        );
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn is_plugin_running(&self, name: &str) -> bool {
        self.plugins.get(name).is_some_and(|slot| slot.running)
    }

    pub fn start_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        let slot = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
        if slot.running {
            return Err(PluginError::AlreadyRunning(name.to_string()));
        }
        let mut plugin = slot
            .plugin
            .take()
            .ok_or_else(|| PluginError::AlreadyRunning(name.to_string()))?;
        log::info!("Starting {name}");
        let result = plugin.start(self);
        if let Some(slot) = self.plugins.get_mut(name) {
            slot.plugin = Some(plugin);
            slot.running = result.is_ok();
        }
        result
    }

    pub fn stop_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        let slot = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
        if !slot.running {
            return Err(PluginError::NotRunning(name.to_string()));
        }
        let Some(mut plugin) = slot.plugin.take() else {
            return Err(PluginError::NotRunning(name.to_string()));
        };
        log::info!("Stopping {name}");
        let result = plugin.stop(self);
        if let Err(err) = &result {
            log::error!("Failed to properly close plugin {name}: {err}");
        }
        if let Some(slot) = self.plugins.get_mut(name) {
            slot.plugin = Some(plugin);
            slot.running = false;
        }
        result
    }

    /// Stop every running plugin, logging failures.
    pub fn shutdown(&mut self) {
        let running: Vec<String> = self
            .plugins
            .iter()
            .filter(|(_, slot)| slot.running)
            .map(|(name, _)| name.clone())
            .collect();
        for name in running {
            let _ = self.stop_plugin(&name);
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::ElementType;
    use crate::ingredient::RenderableLayer;
    use crate::points::PointSet;
    use crate::volume::VolumeStack;
    use ndarray::Array3;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    fn stack(fill: f64) -> VolumeStack {
        let data = Array3::from_shape_fn((4, 6, 8), |(z, x, y)| fill + (z * 100 + x * 10 + y) as f64);
        VolumeStack::new(data, ElementType::U16)
    }

    fn points_ingredient(name: &str) -> Ingredient {
        Ingredient::sparse_points(name, PointSet::new(vec![[1.0, 1.0, 1.0]]), PointStyle::default())
    }

    fn write_mhd(dir: &Path, name: &str) -> PathBuf {
        let raw: Vec<u8> = (0..2 * 3 * 4u16).flat_map(|v| v.to_le_bytes()).collect();
        fs::write(dir.join(format!("{name}.raw")), raw).unwrap();
        let header = dir.join(format!("{name}.mhd"));
        fs::write(
            &header,
            format!(
                "ObjectType = Image\nNDims = 3\nDimSize = 2 3 4\nDataType = ushort\nElementType = MET_USHORT\n\
                 ElementSpacing = 1 1 1\nElementDataFile = {name}.raw\n"
            ),
        )
        .unwrap();
        header
    }

    fn lut_of(session: &Session, name: &str) -> Lut {
        session.ingredient(name).unwrap().as_stack().unwrap().lut.clone()
    }

    #[test]
    fn duplicate_names_replace() {
        let mut session = Session::default();
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        session.add_ingredient(points_ingredient("p"));
        session.add_ingredient(Ingredient::image_stack("a", stack(1000.0)));
        assert_eq!(session.ingredients().len(), 2);
        let value = session.ingredient("a").unwrap().as_stack().unwrap().stack.data()[[0, 0, 0]];
        assert_eq!(value, 1000.0);

        let style = PointStyle {
            symbol: Symbol::Square,
            size: 11.0,
            opacity: 40,
            color: Color::named("cyan"),
            line_width: 3.0,
        };
        session.add_ingredient(Ingredient::sparse_points(
            "p",
            PointSet::new(vec![[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]]),
            style.clone(),
        ));
        assert_eq!(session.ingredients().len(), 2);
        let layer = session.ingredient("p").unwrap().as_points().unwrap();
        assert_eq!(layer.style, style);
        assert_eq!(layer.points.len(), 2);
    }

    #[test]
    fn remove_by_kind_keeps_other_kinds() {
        let mut session = Session::default();
        session.add_ingredient(Ingredient::image_stack("A", stack(0.0)));
        session.add_ingredient(points_ingredient("B"));
        session.add_ingredient(Ingredient::image_stack("C", stack(0.0)));
        session.initialise_axes(true);

        assert_eq!(session.remove_ingredients_by_kind(IngredientKind::ImageStack), 2);
        assert_eq!(session.ingredient_names(), vec!["B"]);
        assert_eq!(session.selected_stack_name(), None);
        assert!(session.axis(Orientation::Axial).layers().is_empty());
    }

    #[test]
    fn removing_missing_name_changes_nothing() {
        let mut session = Session::default();
        session.add_ingredient(Ingredient::image_stack("A", stack(0.0)));
        assert!(!session.remove_ingredient_by_name("nope"));
        assert_eq!(session.ingredients().len(), 1);
    }

    #[test]
    fn kind_names_are_checked() {
        let mut session = Session::default();
        let data = points_ingredient("x").data().clone();
        assert!(matches!(
            session.add_ingredient_of_kind("lines", "x", data.clone()),
            Err(SessionError::UnknownKind(_))
        ));
        assert!(matches!(
            session.add_ingredient_of_kind("imagestack", "x", data.clone()),
            Err(SessionError::KindMismatch { .. })
        ));
        session.add_ingredient_of_kind("sparsepoints", "x", data).unwrap();
        assert_eq!(session.ingredient_names(), vec!["x"]);
    }

    #[test]
    fn default_colours_follow_stack_count() {
        let mut session = Session::default();
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        assert_eq!(lut_of(&session, "a"), Lut::Gray);

        session.add_ingredient(Ingredient::image_stack("b", stack(0.0)));
        assert_eq!(lut_of(&session, "a"), Lut::from_name("red"));
        assert_eq!(lut_of(&session, "b"), Lut::from_name("green"));

        session.add_ingredient(Ingredient::image_stack("c", stack(0.0)));
        assert_eq!(lut_of(&session, "c"), Lut::from_name("blue"));
    }

    #[test]
    fn failed_load_leaves_session_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("broken.mhd");
        fs::write(&header, "NDims = 3\nDimSize = 2 2 2\nElementType = MET_UCHAR\n").unwrap();

        let mut session = Session::default();
        session.add_ingredient(points_ingredient("p"));
        let err = session.load_image_stack(&header).unwrap_err();
        assert!(matches!(err, SessionError::Codec(CodecError::MalformedHeader(_))));
        assert_eq!(session.ingredient_names(), vec!["p"]);
        assert!(session.status_text().starts_with("Failed to load"));

        assert!(matches!(
            session.load_image_stack(dir.path().join("missing.mhd")),
            Err(SessionError::Codec(CodecError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn load_adds_stack_and_initialises_axes() {
        let dir = tempfile::tempdir().unwrap();
        let header = write_mhd(dir.path(), "vol");
        let mut session = Session::default();
        session.load_image_stack(&header).unwrap();

        assert_eq!(session.ingredient_names(), vec!["vol.mhd"]);
        assert_eq!(session.selected_stack_name(), Some("vol.mhd"));
        assert_eq!(session.preferences().recent_files, vec![header.clone()]);
        // shape (4, 2, 3): middle slices
        assert_eq!(session.axis(Orientation::Axial).current_slice(), Some(2));
        assert_eq!(session.axis(Orientation::Coronal).current_slice(), Some(1));
        assert_eq!(session.axis(Orientation::Sagittal).current_slice(), Some(1));
        assert_eq!(session.axis(Orientation::Axial).view_range().x, (0.0, 2.0));
    }

    #[test]
    fn status_values_are_listed_last_layer_first() {
        let mut session = Session::default();
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        session.add_ingredient(Ingredient::image_stack("b", stack(1000.0)));
        session.initialise_axes(true);

        session.mouse_moved(Orientation::Axial, 1, 2, false);
        assert_eq!(session.status_text(), "X=1, Y=2, val=[1212,212]");
        assert_eq!(session.mouse().unwrap().voxel, [2, 1, 2]);

        session.mouse_moved(Orientation::Axial, -1, 2, false);
        assert_eq!(session.status_text(), "X=-1, Y=2, val=[0,0]");
    }

    #[test]
    fn mouse_is_ignored_without_stacks() {
        let mut session = Session::default();
        session.add_ingredient(points_ingredient("p"));
        session.mouse_moved(Orientation::Axial, 1, 1, false);
        assert!(session.mouse().is_none());
        assert_eq!(session.status_text(), "");
    }

    #[test]
    fn status_hook_appends_before_commit() {
        let mut session = Session::default();
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        session.initialise_axes(true);
        session.register_hook(
            HookPoint::UpdateStatusBarEnd,
            Box::new(|session, _| {
                session.append_status(", hello");
                Ok(())
            }),
        );
        session.mouse_moved(Orientation::Axial, 0, 0, false);
        assert_eq!(session.status_text(), "X=0, Y=0, val=[200], hello");
    }

    #[test]
    fn control_drag_moves_linked_slices() {
        let mut session = Session::default();
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        session.initialise_axes(true);

        session.set_control_drag(Orientation::Axial, true);
        session.mouse_moved(Orientation::Axial, 3, 5, true);
        assert_eq!(session.axis(Orientation::Coronal).current_slice(), Some(3));
        assert_eq!(session.axis(Orientation::Sagittal).current_slice(), Some(5));
        assert!(session.cross_hairs().unwrap().highlighted);

        session.mouse_moved(Orientation::Axial, 1, 1, false);
        assert_eq!(session.axis(Orientation::Coronal).current_slice(), Some(3));
        assert!(!session.axis(Orientation::Axial).control_drag);
        assert_eq!(
            session.cross_hairs(),
            Some(CrossHairs {
                axis: Orientation::Axial,
                x: 1.5,
                y: 1.5,
                highlighted: false
            })
        );
    }

    #[test]
    fn intensity_range_reaches_every_axis() {
        let mut session = Session::default();
        assert!(matches!(
            session.set_intensity_range(0.0, 1.0),
            Err(SessionError::NoStackSelected)
        ));
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        session.add_ingredient(Ingredient::image_stack("b", stack(0.0)));
        session.initialise_axes(true);
        session.select_stack("b").unwrap();
        session.set_intensity_range(50.0, 10.0).unwrap();

        for axis in session.axes() {
            let levels: Vec<_> = axis.image_layers().map(|l| (l.name.as_str(), l.levels)).collect();
            assert_eq!(levels[1], ("b", (10.0, 50.0)));
            assert_ne!(levels[0].1, (10.0, 50.0));
        }
        // kept through later re-renders
        session.refresh();
        let RenderableLayer::Image(layer) = &session.axis(Orientation::Axial).layers()[1] else {
            panic!("expected an image layer");
        };
        assert_eq!(layer.levels, (10.0, 50.0));
    }

    #[test]
    fn strict_hooks_abort_loading() {
        let dir = tempfile::tempdir().unwrap();
        let header = write_mhd(dir.path(), "vol");
        let mut session = Session::default();
        session.register_hook(
            HookPoint::LoadImageStackStart,
            Box::new(|_, _| Err(HookError::msg("nope"))),
        );
        let err = session.load_image_stack(&header).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Hook {
                point: HookPoint::LoadImageStackStart,
                ..
            }
        ));
        assert!(session.ingredients().is_empty());
    }

    #[test]
    fn lenient_hooks_keep_going() {
        let mut session = Session::default();
        let calls = Rc::new(RefCell::new(Vec::new()));
        session.register_hook(HookPoint::AxisClicked, Box::new(|_, _| Err(HookError::msg("boom"))));
        let seen = Rc::clone(&calls);
        session.register_hook(
            HookPoint::AxisClicked,
            Box::new(move |_, args| {
                seen.borrow_mut().push(*args);
                Ok(())
            }),
        );
        session.axis_clicked(Orientation::Sagittal);
        assert_eq!(*calls.borrow(), vec![HookArgs::Axis(Orientation::Sagittal)]);
    }

    #[test]
    fn hooks_may_mutate_registry_while_firing() {
        let mut session = Session::default();
        let calls = Rc::new(RefCell::new(0));
        let victim = session.register_hook(HookPoint::DeleteLayerEnd, Box::new(|_, _| Ok(())));

        let counter = Rc::clone(&calls);
        session.register_hook(
            HookPoint::AxisClicked,
            Box::new(move |session, _| {
                *counter.borrow_mut() += 1;
                session.detach_hook(victim);
                let inner = Rc::clone(&counter);
                session.register_hook(
                    HookPoint::AxisClicked,
                    Box::new(move |_, _| {
                        *inner.borrow_mut() += 100;
                        Ok(())
                    }),
                );
                Ok(())
            }),
        );

        session.axis_clicked(Orientation::Axial);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(session.hook_count(HookPoint::AxisClicked), 2);
        assert_eq!(session.hook_count(HookPoint::DeleteLayerEnd), 0);

        session.axis_clicked(Orientation::Axial);
        assert_eq!(*calls.borrow(), 102);
    }

    #[test]
    fn callbacks_detached_mid_fire_do_not_run() {
        let mut session = Session::default();
        let calls = Rc::new(RefCell::new(0));
        let second_id = Rc::new(RefCell::new(None));

        let id_slot = Rc::clone(&second_id);
        session.register_hook(
            HookPoint::MouseMoveEnd,
            Box::new(move |session, _| {
                if let Some(id) = *id_slot.borrow() {
                    session.detach_hook(id);
                }
                Ok(())
            }),
        );
        let counter = Rc::clone(&calls);
        let id = session.register_hook(
            HookPoint::MouseMoveEnd,
            Box::new(move |_, _| {
                *counter.borrow_mut() += 1;
                Ok(())
            }),
        );
        *second_id.borrow_mut() = Some(id);

        session.fire_lenient(HookPoint::MouseMoveEnd, HookArgs::None);
        assert_eq!(*calls.borrow(), 0);
        assert_eq!(session.hook_count(HookPoint::MouseMoveEnd), 1);
    }

    #[test]
    fn pan_and_zoom_follow_links() {
        let mut session = Session::default();
        session.set_view_range(Orientation::Axial, (0.0, 10.0), (0.0, 20.0));
        assert_eq!(session.axis(Orientation::Coronal).view_range().y, (0.0, 20.0));
        assert_eq!(session.axis(Orientation::Sagittal).view_range().x, (0.0, 10.0));

        session.set_view_range(Orientation::Coronal, (5.0, 6.0), (1.0, 2.0));
        assert_eq!(session.axis(Orientation::Sagittal).view_range().y, (5.0, 6.0));
        assert_eq!(session.axis(Orientation::Axial).view_range().y, (1.0, 2.0));

        session.pan(Orientation::Sagittal, 1.0, 0.0);
        let sagittal = session.axis(Orientation::Sagittal).view_range();
        assert_eq!(session.axis(Orientation::Axial).view_range().x, sagittal.x);
        assert_eq!(session.axis(Orientation::Coronal).view_range().x, sagittal.y);

        session.zoom(Orientation::Axial, 2.0);
        assert_eq!(session.axis(Orientation::Axial).view_range().x, (-4.0, 16.0));
        assert_eq!(session.axis(Orientation::Sagittal).view_range().x, (-4.0, 16.0));
    }

    #[test]
    fn wheel_steps_within_bounds() {
        let mut session = Session::default();
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        session.initialise_axes(true);
        session.wheel(Orientation::Axial, 1);
        assert_eq!(session.axis(Orientation::Axial).current_slice(), Some(3));
        session.wheel(Orientation::Axial, 5);
        assert_eq!(session.axis(Orientation::Axial).current_slice(), Some(3));
    }

    #[test]
    fn histogram_follows_selection() {
        let mut session = Session::default();
        assert!(session.selected_histogram(4).is_none());
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        let histogram = session.selected_histogram(4).unwrap();
        assert_eq!(histogram.y.iter().sum::<u64>(), 4 * 6 * 8);
    }

    #[test]
    fn colour_map_and_delete_fire_hooks() {
        let mut session = Session::default();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for point in [HookPoint::ChangeColorMapEnd, HookPoint::DeleteLayerEnd] {
            let log = Rc::clone(&fired);
            session.register_hook(
                point,
                Box::new(move |_, _| {
                    log.borrow_mut().push(point);
                    Ok(())
                }),
            );
        }
        session.add_ingredient(Ingredient::image_stack("a", stack(0.0)));
        session.set_lut("a", Lut::from_name("cyan")).unwrap();
        assert_eq!(lut_of(&session, "a"), Lut::from_name("cyan"));
        assert_eq!(session.delete_selected_stack().unwrap(), "a");
        assert!(session.ingredients().is_empty());
        assert_eq!(
            *fired.borrow(),
            vec![HookPoint::ChangeColorMapEnd, HookPoint::DeleteLayerEnd]
        );
        assert!(matches!(
            session.delete_selected_stack(),
            Err(SessionError::NoStackSelected)
        ));
    }

    #[test]
    fn point_files_become_styled_point_layers() {
        let dir = tempfile::tempdir().unwrap();
        let points = dir.path().join("cells.csv");
        fs::write(&points, "1,2,3\n2,3,4\n").unwrap();
        let tree = dir.path().join("tree.csv");
        fs::write(&tree, "0,1,1,1\n0,2,2,2\n3,2,2,2\n").unwrap();

        let mut session = Session::default();
        session.load_points(&points).unwrap();
        session.load_line_series(&tree).unwrap();
        assert_eq!(session.ingredient_names(), vec!["cells.csv", "tree.csv"]);

        let layer = session.ingredient("cells.csv").unwrap().as_points().unwrap();
        assert_eq!(layer.points.len(), 2);
        assert_eq!(layer.style.opacity, 255);
        let layer = session.ingredient("tree.csv").unwrap().as_points().unwrap();
        assert_eq!(layer.points.categories(), Some(&[0, 0, 3][..]));

        assert!(session.load_line_series(&points).is_err());
        assert_eq!(session.ingredients().len(), 2);
    }

    #[test]
    fn point_style_setters() {
        let mut session = Session::default();
        session.add_ingredient(points_ingredient("p"));
        session.set_point_symbol("p", Symbol::Diamond).unwrap();
        session.set_point_size("p", 9.0).unwrap();
        session.set_point_color("p", Color::Rgb([1, 2, 3])).unwrap();
        session.set_point_line_width("p", 4.0).unwrap();
        session.set_opacity("p", 200).unwrap();
        let style = &session.ingredient("p").unwrap().as_points().unwrap().style;
        assert_eq!(style.symbol, Symbol::Diamond);
        assert_eq!(style.size, 9.0);
        assert_eq!(style.color, Color::Rgb([1, 2, 3]));
        assert_eq!(style.line_width, 4.0);
        assert_eq!(style.opacity, 200);
        assert!(session.set_point_size("missing", 1.0).is_err());

        session.set_point_z_spread(Orientation::Coronal, 2.0);
        let layer = session.ingredient("p").unwrap().as_points().unwrap();
        assert_eq!(layer.z_spread, [0.0, 2.0, 0.0]);
    }

    #[test]
    fn save_only_writes_mhd() {
        let dir = tempfile::tempdir().unwrap();
        let header = write_mhd(dir.path(), "vol");
        let mut session = Session::default();
        session.load_image_stack(&header).unwrap();
        session.set_intensity_range(0.0, 1.0).unwrap();
        assert_eq!(session.save_selected_stack().unwrap(), header);

        session.add_ingredient(Ingredient::image_stack("mem", stack(0.0)));
        session.select_stack("mem").unwrap();
        assert!(matches!(
            session.save_selected_stack(),
            Err(SessionError::SaveUnsupported { path: None })
        ));
    }

    #[test]
    fn dialog_and_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        let header = write_mhd(dir.path(), "vol");
        let mut session = Session::default();

        assert!(!session.load_stack_via_dialog(|_, _| None).unwrap());
        let chosen = header.clone();
        let loaded = session
            .load_stack_via_dialog(move |filter, _| {
                assert!(filter.contains("*.mhd"));
                Some(chosen)
            })
            .unwrap();
        assert!(loaded);
        assert_eq!(session.preferences().last_load_dir.as_deref(), Some(dir.path()));

        session.remove_ingredient_by_name("vol.mhd");
        session.load_recent_file(0).unwrap();
        assert_eq!(session.ingredient_names(), vec!["vol.mhd"]);
        assert!(matches!(
            session.load_recent_file(7),
            Err(SessionError::NoSuchRecentFile(7))
        ));
    }

    struct Counter {
        hook: Option<HookId>,
    }

    impl Plugin for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn start(&mut self, session: &mut Session) -> Result<(), PluginError> {
            self.hook = Some(session.register_hook(
                HookPoint::UpdateStatusBarEnd,
                Box::new(|session, _| {
                    session.append_status("!");
                    Ok(())
                }),
            ));
            Ok(())
        }

        fn stop(&mut self, session: &mut Session) -> Result<(), PluginError> {
            if let Some(id) = self.hook.take() {
                session.detach_hook(id);
            }
            Ok(())
        }
    }

    #[test]
    fn plugins_start_and_stop() {
        let mut session = Session::default();
        session.register_plugin(Box::new(Counter { hook: None }));
        assert_eq!(session.plugin_names(), vec!["counter"]);
        assert!(matches!(
            session.start_plugin("other"),
            Err(PluginError::UnknownPlugin(_))
        ));

        session.start_plugin("counter").unwrap();
        assert!(session.is_plugin_running("counter"));
        assert!(matches!(
            session.start_plugin("counter"),
            Err(PluginError::AlreadyRunning(_))
        ));
        assert_eq!(session.hook_count(HookPoint::UpdateStatusBarEnd), 1);

        session.shutdown();
        assert!(!session.is_plugin_running("counter"));
        assert_eq!(session.hook_count(HookPoint::UpdateStatusBarEnd), 0);
    }
}
