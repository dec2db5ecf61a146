//! # triview
//!
//! Headless core of a three-view volume viewer for microscopy and brain
//! atlas image stacks.
//!
//! Stacks are decoded from TIFF, MHD/raw or NRRD files into a canonical
//! (Z, X, Y) [`VolumeStack`]. Stacks and sparse point sets become named
//! [`Ingredient`]s of a [`Session`], which shows them on three linked
//! orthogonal projection axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! Moving the mouse over an axis tracks the voxel under the cursor and
//! builds a status line with the value of every image layer; control-drag
//! moves the slices shown on the two other axes. Panning and zooming
//! follow the links between the axes.
//!
//! The session exposes named [`HookPoint`]s. Plugins register callbacks on
//! them to change or extend what the core does; the bundled
//! [`AtlasPlugin`] loads an annotated atlas and names the brain area under
//! the cursor.
//!
//! Drawing is left to the caller: axes hand out [`RenderableLayer`]
//! descriptions, and can rasterise them to an RGBA image.
//!
//! # Examples
//!
//! ## Loading a stack and exporting the middle slices
//!
//! ```no_run
//! # use triview::{Orientation, Session};
//! let mut session = Session::default();
//! session
//!     .load_image_stack("brain.mhd")
//!     .expect("should have loaded the stack");
//! for orientation in Orientation::ALL {
//!     if let Some(image) = session.axis(orientation).rasterise() {
//!         image.save(format!("{orientation}.png")).expect("should have saved png");
//!     }
//! }
//! ```
//!
//! ## Appending to the status line from a hook
//!
//! ```
//! # use triview::{HookPoint, Session};
//! let mut session = Session::default();
//! session.register_hook(
//!     HookPoint::UpdateStatusBarEnd,
//!     Box::new(|session, _| {
//!         session.append_status(" (hooked)");
//!         Ok(())
//!     }),
//! );
//! ```

pub mod atlas;
pub mod axis;
pub mod codec;
pub mod config;
pub mod enums;
pub mod hooks;
pub mod ingredient;
mod interpolator;
pub mod labels;
pub mod plugin;
pub mod points;
pub mod session;
pub mod volume;

pub use atlas::{AtlasConfig, AtlasPlugin};
pub use axis::ProjectionAxis;
pub use codec::{CodecError, decode};
pub use config::Preferences;
pub use enums::{IngredientKind, Orientation};
pub use hooks::{HookArgs, HookError, HookPoint};
pub use ingredient::{Ingredient, RenderableLayer};
pub use plugin::{Plugin, PluginError};
pub use session::{Session, SessionError};
pub use volume::VolumeStack;
