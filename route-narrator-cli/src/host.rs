//! Terminal and filesystem stand-ins for what a browser provides.

use std::cell::Cell;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use route_narrator::store::{Slot, StoreError};
use route_narrator::{Clock, Geolocation, NavError, Speech, UserPrompt, WatchId};

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Prints what would be spoken.
#[derive(Default)]
pub struct ConsoleSpeech {
    paused: bool,
}

impl Speech for ConsoleSpeech {
    fn speak(&mut self, text: &str) {
        if !self.paused {
            println!("  > {text}");
        }
    }
    fn stop(&mut self) {}
    fn pause(&mut self) {
        self.paused = true;
    }
    fn resume(&mut self) {
        self.paused = false;
    }
}

/// Saved routes live in a single JSON file.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: PathBuf) -> FileSlot {
        FileSlot { path }
    }
}

impl Slot for FileSlot {
    fn read(&self) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&self.path)
            .map(Some)
            .map_err(|err| StoreError::Unavailable(format!("{}: {err}", self.path.display())))
    }

    fn write(&mut self, value: &str) -> Result<(), StoreError> {
        std::fs::write(&self.path, value)
            .map_err(|err| StoreError::Unavailable(format!("{}: {err}", self.path.display())))
    }
}

/// There's no GPS here. The journey command feeds positions itself, using the id handed out
/// from `watch`.
#[derive(Clone, Default)]
pub struct SimulatedGeolocation {
    next_id: Rc<Cell<i32>>,
    active: Rc<Cell<Option<WatchId>>>,
}

impl SimulatedGeolocation {
    pub fn active(&self) -> Option<WatchId> {
        self.active.get()
    }
}

impl Geolocation for SimulatedGeolocation {
    fn watch(&mut self) -> Result<WatchId, NavError> {
        self.next_id.set(self.next_id.get() + 1);
        let id = WatchId(self.next_id.get());
        self.active.set(Some(id));
        Ok(id)
    }

    fn clear_watch(&mut self, id: WatchId) {
        if self.active.get() == Some(id) {
            self.active.set(None);
        }
    }
}

/// Asks on stdin. With `assume_yes`, every confirmation passes without asking.
pub struct CliPrompt {
    assume_yes: bool,
}

impl CliPrompt {
    pub fn new(assume_yes: bool) -> CliPrompt {
        CliPrompt { assume_yes }
    }
}

impl UserPrompt for CliPrompt {
    fn ask(&mut self, message: &str) -> Option<String> {
        print!("{message} ");
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        Some(line.trim().to_string())
    }

    fn confirm(&mut self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        match self.ask(&format!("{message} [y/N]")) {
            Some(answer) => matches!(answer.as_str(), "y" | "Y" | "yes"),
            None => false,
        }
    }

    fn alert(&mut self, message: &str) {
        info!("{message}");
        println!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use route_narrator::store::{RouteStore, SlotStore};
    use route_narrator::{SavedRoute, Waypoint};

    use super::*;

    #[test]
    fn test_file_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        let mut store = SlotStore::new(FileSlot::new(path.clone()));
        assert!(store.get_all().unwrap().is_empty());

        store
            .append(SavedRoute {
                id: 42,
                name: "Park loop".to_string(),
                waypoints: vec![Waypoint {
                    lat: 21.88,
                    lng: -102.29,
                }],
            })
            .unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"Park loop\""));

        let reopened = SlotStore::new(FileSlot::new(path));
        assert_eq!(reopened.get_all().unwrap()[0].id, 42);
    }

    #[test]
    fn test_simulated_geolocation() {
        let mut geolocation = SimulatedGeolocation::default();
        let id = geolocation.watch().unwrap();
        assert_eq!(geolocation.active(), Some(id));
        geolocation.clear_watch(WatchId(id.0 + 1));
        assert_eq!(geolocation.active(), Some(id));
        geolocation.clear_watch(id);
        assert_eq!(geolocation.active(), None);
    }
}
