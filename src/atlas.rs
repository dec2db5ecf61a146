//! Brain atlas plugin.
//!
//! Loads an annotated atlas volume with its label tree, colours it with a
//! discrete look-up table and names the brain area under the mouse in the
//! status text.

use crate::config;
use crate::enums::IngredientKind;
use crate::hooks::{HookId, HookPoint};
use crate::ingredient::Lut;
use crate::labels::LabelTree;
use crate::plugin::{Plugin, PluginError};
use crate::session::Session;

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Files making up one atlas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasPaths {
    /// Segmented volume whose voxels hold label ids.
    pub atlas: PathBuf,
    /// Label table, `.csv` or `.json`.
    pub labels: PathBuf,
    /// Average template volume. Not loaded; kept so atlas files round-trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub atlas_paths: BTreeMap<String, AtlasPaths>,
    pub load_first_atlas_on_startup: bool,
    pub enable_name_in_status_bar: bool,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            atlas_paths: BTreeMap::from([("1".to_string(), AtlasPaths::default())]),
            load_first_atlas_on_startup: true,
            enable_name_in_status_bar: true,
        }
    }
}

impl AtlasConfig {
    pub fn load_or_bootstrap(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        Ok(config::load_json_or_bootstrap(path.as_ref())?)
    }

    /// Entries whose atlas and label files both exist, keyed by the atlas
    /// file name. Later entries with an already used file name are skipped.
    pub fn valid_atlases(&self) -> BTreeMap<String, AtlasPaths> {
        let mut found = BTreeMap::new();
        for paths in self.atlas_paths.values() {
            if paths.atlas.as_os_str().is_empty() || paths.labels.as_os_str().is_empty() {
                log::debug!("Skipping empty atlas paths entry");
                continue;
            }
            if let Some(missing) = [&paths.atlas, &paths.labels].into_iter().find(|p| !p.exists()) {
                log::warn!("Can not find {missing:?}. Skipping.");
                continue;
            }
            let Some(name) = paths.atlas.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if found.contains_key(&name) {
                log::warn!("Skipping as a file called {name} is already in the list");
                continue;
            }
            found.insert(name, paths.clone());
        }
        found
    }
}

/// Piecewise-linear colour map with sharp jumps, sampled to 256 entries so
/// neighbouring label ids get clearly different colours.
pub fn atlas_lut() -> Lut {
    const STOPS: [(f64, [u8; 4]); 7] = [
        (0.0, [0, 0, 0, 255]),
        (0.001, [255, 0, 0, 255]),
        (0.25, [0, 2, 230, 255]),
        (0.35, [7, 255, 112, 255]),
        (0.45, [255, 240, 7, 255]),
        (0.65, [7, 153, 255, 255]),
        (0.9, [255, 7, 235, 255]),
    ];
    let table = (0..256)
        .map(|i| {
            let t = i as f64 / 255.0;
            let upper = STOPS.iter().position(|(pos, _)| *pos >= t);
            match upper {
                Some(0) => STOPS[0].1,
                None => STOPS[STOPS.len() - 1].1,
                Some(k) => {
                    let (p0, c0) = STOPS[k - 1];
                    let (p1, c1) = STOPS[k];
                    let f = (t - p0) / (p1 - p0);
                    std::array::from_fn(|c| {
                        (c0[c] as f64 + (c1[c] as f64 - c0[c] as f64) * f).round() as u8
                    })
                }
            }
        })
        .collect();
    Lut::Table(table)
}

#[derive(Debug, Default)]
struct AtlasState {
    labels: Option<LabelTree>,
    loaded: Option<String>,
    name_in_status_bar: bool,
}

pub struct AtlasPlugin {
    config: AtlasConfig,
    state: Rc<RefCell<AtlasState>>,
    hooks: Vec<HookId>,
}

impl AtlasPlugin {
    pub const NAME: &'static str = "ara_explorer";

    pub fn new(config: AtlasConfig) -> Self {
        let state = AtlasState {
            name_in_status_bar: config.enable_name_in_status_bar,
            ..AtlasState::default()
        };
        Self {
            config,
            state: Rc::new(RefCell::new(state)),
            hooks: Vec::new(),
        }
    }

    /// Name of the loaded atlas ingredient, if any.
    pub fn loaded(&self) -> Option<String> {
        self.state.borrow().loaded.clone()
    }

    pub fn set_name_in_status_bar(&self, enabled: bool) {
        self.state.borrow_mut().name_in_status_bar = enabled;
    }

    /// Replace any loaded atlas with the one called `name`.
    pub fn load_atlas(&mut self, session: &mut Session, name: &str) -> Result<(), PluginError> {
        let atlases = self.config.valid_atlases();
        let paths = atlases
            .get(name)
            .ok_or_else(|| PluginError::NotConfigured(format!("no atlas called {name}")))?;

        let previous = self.state.borrow_mut().loaded.take();
        if let Some(previous) = previous {
            session.remove_ingredient_by_name(&previous);
        }
        let labels = LabelTree::load(&paths.labels)?;
        session.load_image_stack(&paths.atlas)?;
        {
            let mut state = self.state.borrow_mut();
            state.labels = Some(labels);
            state.loaded = Some(name.to_string());
        }

        session.set_lut(name, atlas_lut())?;
        session.initialise_axes(true);
        session.select_stack(name)?;
        session.set_intensity_range(0.0, 2000.0)?;
        Ok(())
    }
}

/// Describe the area under the mouse for the status text.
fn area_under_mouse(session: &Session, state: &AtlasState) -> Option<String> {
    let stack_name = state.loaded.as_deref()?;
    let mouse = session.mouse()?;
    let axis = session.axis(mouse.axis);
    let image = axis.image_layers().find(|layer| layer.name == stack_name)?;
    let (width, height) = image.plane.dim();

    if mouse.x < 0 || mouse.y < 0 || mouse.x as usize >= width || mouse.y as usize >= height {
        return Some("outside image area".into());
    }
    let value = image.sample(mouse.x, mouse.y);
    if value == 0.0 {
        return Some("outside brain".into());
    }
    let name = state
        .labels
        .as_ref()
        .and_then(|labels| labels.name(value as i64))
        .unwrap_or("UNKNOWN");
    Some(name.to_string())
}

impl Plugin for AtlasPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn long_name(&self) -> &str {
        "Allen Reference Atlas explorer"
    }

    fn start(&mut self, session: &mut Session) -> Result<(), PluginError> {
        let atlases = self.config.valid_atlases();
        if atlases.is_empty() {
            return Err(PluginError::NotConfigured(
                "found no valid atlas paths in the plugin preferences".into(),
            ));
        }

        session.remove_ingredients_by_kind(IngredientKind::ImageStack);

        let state = Rc::clone(&self.state);
        self.hooks.push(session.register_hook(
            HookPoint::UpdateStatusBarEnd,
            Box::new(move |session, _| {
                let state = state.borrow();
                if !state.name_in_status_bar {
                    return Ok(());
                }
                if let Some(area) = area_under_mouse(session, &state) {
                    session.append_status(&format!(", area: {area}"));
                }
                Ok(())
            }),
        ));

        if self.config.load_first_atlas_on_startup {
            if let Some(first) = atlases.keys().next() {
                log::info!("Auto-loading {first}");
                if let Err(err) = self.load_atlas(session, first) {
                    self.stop(session)?;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self, session: &mut Session) -> Result<(), PluginError> {
        for id in self.hooks.drain(..) {
            session.detach_hook(id);
        }
        Ok(())
    }
}
