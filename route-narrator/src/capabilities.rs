//! Everything the engine needs from its host. Browsers back these with web APIs, the CLI with
//! the terminal and filesystem, and tests with fakes.

use crate::error::NavError;
use crate::store::RouteStore;

pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Speech synthesis, with a fixed locale, rate and pitch.
pub trait Speech {
    fn speak(&mut self, text: &str);
    fn stop(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct WatchId(pub i32);

/// A source of continuous position updates. The host delivers each update to
/// `NavigationEngine::on_position` along with the `WatchId` it belongs to.
pub trait Geolocation {
    fn watch(&mut self) -> Result<WatchId, NavError>;
    fn clear_watch(&mut self, id: WatchId);
}

/// Blocking dialogs: the name prompt on save, the confirmation on delete, and notices.
pub trait UserPrompt {
    fn ask(&mut self, message: &str) -> Option<String>;
    fn confirm(&mut self, message: &str) -> bool;
    fn alert(&mut self, message: &str);
}

/// Speech and geolocation may be missing on some hosts; everything else is required.
pub struct Capabilities {
    pub clock: Box<dyn Clock>,
    pub speech: Option<Box<dyn Speech>>,
    pub geolocation: Option<Box<dyn Geolocation>>,
    pub prompt: Box<dyn UserPrompt>,
    pub store: Box<dyn RouteStore>,
}
