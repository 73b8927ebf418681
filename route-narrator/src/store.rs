use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use thiserror::Error;

use route_narrator_model::{SavedRoute, Waypoint};

use crate::error::NavError;

/// Name of the single slot every saved route lives in.
pub const ROUTES_SLOT: &str = "savedRoutes";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("saved routes are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One named string slot, like a localStorage key or a file.
pub trait Slot {
    fn read(&self) -> Result<Option<String>, StoreError>;
    fn write(&mut self, value: &str) -> Result<(), StoreError>;
}

/// Saved routes are only ever read and written whole.
pub trait RouteStore {
    fn get_all(&self) -> Result<Vec<SavedRoute>, StoreError>;
    fn append(&mut self, route: SavedRoute) -> Result<(), StoreError>;
    fn remove_by_id(&mut self, id: i64) -> Result<(), StoreError>;
}

/// Keeps every route as one JSON array inside a `Slot`.
pub struct SlotStore<S: Slot> {
    slot: S,
}

impl<S: Slot> SlotStore<S> {
    pub fn new(slot: S) -> SlotStore<S> {
        SlotStore { slot }
    }

    fn put(&mut self, routes: &[SavedRoute]) -> Result<(), StoreError> {
        let value = serde_json::to_string(routes)?;
        self.slot.write(&value)
    }
}

impl<S: Slot> RouteStore for SlotStore<S> {
    fn get_all(&self) -> Result<Vec<SavedRoute>, StoreError> {
        match self.slot.read()? {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Ok(Vec::new()),
        }
    }

    fn append(&mut self, route: SavedRoute) -> Result<(), StoreError> {
        let mut routes = self.get_all()?;
        routes.push(route);
        self.put(&routes)
    }

    fn remove_by_id(&mut self, id: i64) -> Result<(), StoreError> {
        let mut routes = self.get_all()?;
        routes.retain(|route| route.id != id);
        self.put(&routes)
    }
}

/// Builds a route ready to append. The name is trimmed and must not end up empty. The id is the
/// creation timestamp, nudged forward if it collides with an `existing` route.
pub fn new_saved_route(
    existing: &[SavedRoute],
    now_ms: u64,
    name: &str,
    waypoints: Vec<Waypoint>,
) -> Result<SavedRoute, NavError> {
    if waypoints.is_empty() {
        return Err(NavError::ValidationFailed(
            "Add at least one waypoint before saving.".to_string(),
        ));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(NavError::ValidationFailed(
            "A route name is required.".to_string(),
        ));
    }
    if waypoints.len() < 2 {
        warn!("Saving \"{name}\" with a single waypoint, it can't be resolved");
    }

    let mut id = now_ms as i64;
    while existing.iter().any(|r| r.id == id) {
        id += 1;
    }
    Ok(SavedRoute {
        id,
        name: name.to_string(),
        waypoints,
    })
}

/// An in-memory slot, for hosts without persistent storage. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemorySlot {
    inner: Rc<RefCell<MemoryContents>>,
}

#[derive(Default)]
struct MemoryContents {
    value: Option<String>,
    writes: usize,
}

impl MemorySlot {
    pub fn new() -> MemorySlot {
        MemorySlot::default()
    }

    pub fn with_value(value: &str) -> MemorySlot {
        let slot = MemorySlot::new();
        slot.inner.borrow_mut().value = Some(value.to_string());
        slot
    }

    pub fn value(&self) -> Option<String> {
        self.inner.borrow().value.clone()
    }

    /// How many times the slot has been written to.
    pub fn writes(&self) -> usize {
        self.inner.borrow().writes
    }
}

impl Slot for MemorySlot {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.borrow().value.clone())
    }

    fn write(&mut self, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        inner.value = Some(value.to_string());
        inner.writes += 1;
        Ok(())
    }
}
