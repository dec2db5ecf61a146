//! Named extension points and the callbacks attached to them.
//!
//! Callbacks receive the whole [`Session`] mutably. To make that sound the
//! session takes a hook point's list out of the registry while firing it
//! and puts it back afterwards: callbacks registered in the meantime are
//! appended behind the restored ones, and callbacks detached in the
//! meantime are dropped on restore.

use crate::enums::Orientation;
use crate::session::{Session, SessionError};

use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPoint {
    UpdateStatusBarEnd,
    LoadImageStackStart,
    LoadImageStackEnd,
    ShowStackLoadDialogStart,
    ShowStackLoadDialogEnd,
    ShowFileLoadDialogStart,
    ShowFileLoadDialogEnd,
    LoadRecentFileStart,
    MouseMoveStart,
    MouseMoveEnd,
    RemoveCrossHairsStart,
    ChangeColorMapEnd,
    DeleteLayerEnd,
    AxisClicked,
}

impl HookPoint {
    pub const ALL: [HookPoint; 14] = [
        HookPoint::UpdateStatusBarEnd,
        HookPoint::LoadImageStackStart,
        HookPoint::LoadImageStackEnd,
        HookPoint::ShowStackLoadDialogStart,
        HookPoint::ShowStackLoadDialogEnd,
        HookPoint::ShowFileLoadDialogStart,
        HookPoint::ShowFileLoadDialogEnd,
        HookPoint::LoadRecentFileStart,
        HookPoint::MouseMoveStart,
        HookPoint::MouseMoveEnd,
        HookPoint::RemoveCrossHairsStart,
        HookPoint::ChangeColorMapEnd,
        HookPoint::DeleteLayerEnd,
        HookPoint::AxisClicked,
    ];
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Extra context passed to a callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookArgs {
    None,
    Axis(Orientation),
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Session(Box<SessionError>),
}

impl HookError {
    pub fn msg(message: impl Into<String>) -> Self {
        HookError::Message(message.into())
    }
}

impl From<SessionError> for HookError {
    fn from(err: SessionError) -> Self {
        HookError::Session(Box::new(err))
    }
}

pub type HookFn = Box<dyn FnMut(&mut Session, &HookArgs) -> Result<(), HookError>>;

/// Handle returned by [`HookRegistry::register`], used to detach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookId(u64);

pub struct HookEntry {
    id: HookId,
    callback: HookFn,
}

impl HookEntry {
    pub fn id(&self) -> HookId {
        self.id
    }

    pub fn call(&mut self, session: &mut Session, args: &HookArgs) -> Result<(), HookError> {
        (self.callback)(session, args)
    }
}

#[derive(Default)]
pub struct HookRegistry {
    next_id: u64,
    hooks: HashMap<HookPoint, Vec<HookEntry>>,
    /// Ids of callbacks whose list is taken out for firing.
    in_flight: HashSet<HookId>,
    pending_detach: HashSet<HookId>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.hooks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, point: HookPoint, callback: HookFn) -> HookId {
        let id = HookId(self.next_id);
        self.next_id += 1;
        self.hooks
            .entry(point)
            .or_default()
            .push(HookEntry { id, callback });
        log::debug!("Registered hook {id:?} on {point}");
        id
    }

    /// Detach a callback. Returns `false` if it is unknown; a callback whose
    /// list is currently firing is removed when the list is restored.
    pub fn detach(&mut self, id: HookId) -> bool {
        for entries in self.hooks.values_mut() {
            if let Some(pos) = entries.iter().position(|entry| entry.id == id) {
                entries.remove(pos);
                return true;
            }
        }
        self.in_flight.contains(&id) && self.pending_detach.insert(id)
    }

    pub fn len(&self, point: HookPoint) -> usize {
        self.hooks.get(&point).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.values().all(Vec::is_empty)
    }

    pub fn is_detached(&self, id: HookId) -> bool {
        self.pending_detach.contains(&id)
    }

    /// Remove the list for `point` so it can be run against the session.
    pub fn take(&mut self, point: HookPoint) -> Vec<HookEntry> {
        let entries = self.hooks.remove(&point).unwrap_or_default();
        self.in_flight.extend(entries.iter().map(HookEntry::id));
        entries
    }

    /// Put back a list obtained from [`take`](Self::take).
    pub fn restore(&mut self, point: HookPoint, mut entries: Vec<HookEntry>) {
        for entry in &entries {
            self.in_flight.remove(&entry.id);
        }
        entries.retain(|entry| !self.pending_detach.remove(&entry.id));
        if let Some(added) = self.hooks.remove(&point) {
            entries.extend(added);
        }
        if !entries.is_empty() {
            self.hooks.insert(point, entries);
        }
    }
}
