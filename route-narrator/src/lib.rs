pub mod capabilities;
pub mod config;
pub mod error;
pub mod narrator;
pub mod rate_limiter;
mod render;
pub mod resolver;
pub mod session;
pub mod store;
pub mod tracking;


use log::{debug, error, info, warn};

pub use route_narrator_model::{Instruction, Position, ResolvedPath, SavedRoute, Waypoint};

pub use crate::capabilities::{Capabilities, Clock, Geolocation, Speech, UserPrompt, WatchId};
pub use crate::config::NavConfig;
pub use crate::error::{Capability, NavError};
pub use crate::narrator::{NarrationTimer, Narrator};
pub use crate::rate_limiter::RateLimiter;
pub use crate::resolver::{ResolveError, RouteResolver};
pub use crate::session::{DraftRoute, SessionError, SessionState, Transition};
pub use crate::store::RouteStore;
pub use crate::tracking::Tracker;

/// Why a route is being resolved.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResolvePurpose {
    /// Drawing or loading a route. The steps are announced as soon as the path arrives.
    Preview,
    /// A position update during a journey. The steps feed the narrator.
    Journey,
}

/// Work for the host: resolve these waypoints, then hand the result to
/// `NavigationEngine::complete_resolution` with the same `seq`.
#[derive(Clone, PartialEq, Debug)]
pub struct ResolveRequest {
    pub seq: u64,
    pub waypoints: Vec<Waypoint>,
    pub purpose: ResolvePurpose,
}

/// Only one of the two menus is open at once.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Panels {
    pub create_open: bool,
    pub load_open: bool,
}

pub struct NavigationEngine {
    config: NavConfig,
    clock: Box<dyn Clock>,
    speech: Option<Box<dyn Speech>>,
    prompt: Box<dyn UserPrompt>,
    store: Box<dyn RouteStore>,
    tracker: Tracker,
    narrator: Narrator,
    limiter: RateLimiter,

    state: SessionState,
    saved_routes: Vec<SavedRoute>,
    panels: Panels,

    // Sequence tags for resolutions. Only the last one issued is ever applied.
    next_seq: u64,
    awaiting: Option<(u64, ResolvePurpose)>,
    outbox: Vec<ResolveRequest>,
}

impl NavigationEngine {
    pub fn new(config: NavConfig, capabilities: Capabilities) -> NavigationEngine {
        let Capabilities {
            clock,
            speech,
            geolocation,
            prompt,
            store,
        } = capabilities;
        if speech.is_none() {
            warn!("{} isn't available, nothing will be spoken", Capability::Speech);
        }

        let mut engine = NavigationEngine {
            config,
            clock,
            speech,
            prompt,
            store,
            tracker: Tracker::new(geolocation),
            narrator: Narrator::new(),
            limiter: RateLimiter::new(),

            state: SessionState::Idle,
            saved_routes: Vec::new(),
            panels: Panels::default(),

            next_seq: 0,
            awaiting: None,
            outbox: Vec::new(),
        };
        engine.refresh_routes();
        engine
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn saved_routes(&self) -> &[SavedRoute] {
        &self.saved_routes
    }

    pub fn panels(&self) -> Panels {
        self.panels
    }

    pub fn narrator(&self) -> &Narrator {
        &self.narrator
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    /// Re-reads saved routes from the store. A broken store is logged and shows as empty.
    pub fn refresh_routes(&mut self) {
        match self.store.get_all() {
            Ok(routes) => {
                self.saved_routes = routes;
            }
            Err(err) => {
                error!("Couldn't load saved routes: {err}");
                self.saved_routes.clear();
            }
        }
    }

    pub fn toggle_create_panel(&mut self) {
        self.panels.create_open = !self.panels.create_open;
        if self.panels.create_open {
            self.panels.load_open = false;
        }
    }

    pub fn toggle_load_panel(&mut self) {
        self.panels.load_open = !self.panels.load_open;
        if self.panels.load_open {
            self.panels.create_open = false;
        }
    }

    fn close_panels(&mut self) {
        self.panels = Panels::default();
    }

    pub fn start_route_creation(&mut self) -> Result<(), NavError> {
        let id = self.clock.now_ms() as i64;
        self.transition(Transition::StartCreation {
            id,
            name: session::DEFAULT_ROUTE_NAME.to_string(),
        })?;
        self.awaiting = None;
        info!("Started creating route {id}");
        Ok(())
    }

    pub fn add_waypoint(&mut self, waypt: Waypoint) -> Result<(), NavError> {
        if !waypt.is_finite() {
            return Err(NavError::ValidationFailed(format!(
                "{waypt:?} isn't a valid coordinate"
            )));
        }
        // Clicking the map outside of route creation does nothing, and doesn't count against the
        // rate limit
        if !self.state.is_creating() {
            debug!("Ignoring waypoint while {}", self.state.describe());
            return Err(SessionError::InvalidTransition {
                from: self.state.describe(),
                transition: "add a waypoint",
            }
            .into());
        }
        self.check_rate_limit()?;

        self.transition(Transition::AddWaypoint(waypt))?;
        self.limiter.record(self.clock.now_ms());
        info!("Added waypoint at ({}, {})", waypt.lat, waypt.lng);
        if self.state.waypoints().len() >= 2 {
            self.request_resolution(ResolvePurpose::Preview);
        }
        Ok(())
    }

    pub fn cancel_route_creation(&mut self) -> Result<(), NavError> {
        self.transition(Transition::Cancel)?;
        self.awaiting = None;
        self.close_panels();
        Ok(())
    }

    pub fn save_route(&mut self) -> Result<(), NavError> {
        let SessionState::Creating(draft) = &self.state else {
            return Err(SessionError::InvalidTransition {
                from: self.state.describe(),
                transition: "save a route",
            }
            .into());
        };
        let waypoints = draft.waypoints.clone();
        self.check_rate_limit()?;

        if waypoints.is_empty() {
            return Err(self.reject("Add at least one waypoint before saving."));
        }
        let name = self.prompt.ask("Route name:").unwrap_or_default();
        let route = match store::new_saved_route(
            &self.saved_routes,
            self.clock.now_ms(),
            &name,
            waypoints,
        ) {
            Ok(route) => route,
            Err(NavError::ValidationFailed(message)) => return Err(self.reject(&message)),
            Err(err) => return Err(err),
        };
        let id = route.id;
        self.store.append(route)?;
        self.limiter.record(self.clock.now_ms());
        self.transition(Transition::Saved)?;
        self.awaiting = None;
        self.close_panels();
        self.refresh_routes();
        info!("Saved route {id}");
        self.prompt.alert("Route saved.");
        Ok(())
    }

    pub fn load_route(&mut self, id: i64) -> Result<(), NavError> {
        let Some(route) = self.saved_routes.iter().find(|r| r.id == id).cloned() else {
            return Err(NavError::ValidationFailed(format!("No saved route {id}")));
        };
        let num_waypoints = route.waypoints.len();
        self.transition(Transition::Load(route))?;
        self.awaiting = None;
        if num_waypoints >= 2 {
            self.request_resolution(ResolvePurpose::Preview);
        }
        self.close_panels();
        Ok(())
    }

    pub fn start_journey(&mut self) -> Result<(), NavError> {
        match self.state.apply(Transition::StartJourney) {
            Ok(next) => {
                self.state = next;
            }
            Err(SessionError::NotEnoughWaypoints(n)) => {
                warn!("Not starting a journey with {n} waypoint(s)");
                return Err(self.reject("A journey needs a route with at least 2 waypoints."));
            }
            Err(err) => return Err(err.into()),
        }
        self.tracker.start();
        info!("Journey started");
        Ok(())
    }

    pub fn stop_journey(&mut self) -> Result<(), NavError> {
        self.transition(Transition::StopJourney)?;
        self.tracker.stop();
        self.narrator.stop();
        if let Some(speech) = self.speech.as_mut() {
            speech.stop();
        }
        self.awaiting = None;
        info!("Journey stopped");
        Ok(())
    }

    /// Works in any state and only touches the store. Returns false if the user backs out.
    pub fn delete_route(&mut self, id: i64) -> Result<bool, NavError> {
        let name = self
            .saved_routes
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| id.to_string());
        if !self
            .prompt
            .confirm(&format!("Are you sure you want to delete the route \"{name}\"?"))
        {
            return Ok(false);
        }
        self.store.remove_by_id(id)?;
        self.refresh_routes();
        // TODO If this was the selected route, it stays selected. Decide whether to deselect.
        info!("Deleted route {id}");
        Ok(true)
    }

    pub fn send_sos(&mut self) {
        self.prompt.alert("SOS sent");
    }

    pub fn pause_speech(&mut self) {
        if let Some(speech) = self.speech.as_mut() {
            speech.pause();
        }
    }

    pub fn resume_speech(&mut self) {
        if let Some(speech) = self.speech.as_mut() {
            speech.resume();
        }
    }

    /// Called by the host for every geolocation update.
    pub fn on_position(&mut self, watch: WatchId, position: Position) {
        if !self.tracker.accepts(watch) {
            debug!("Ignoring position from stale subscription {watch:?}");
            return;
        }
        if !self.state.is_journeying() {
            return;
        }
        debug!("At ({}, {})", position.lat, position.lng);
        // One journey resolution in flight at a time
        if matches!(self.awaiting, Some((_, ResolvePurpose::Journey))) {
            debug!("Still waiting on the last journey resolution");
            return;
        }
        // The position itself isn't used yet; each update just refreshes the instructions
        self.request_resolution(ResolvePurpose::Journey);
    }

    /// Resolutions the host should start now.
    pub fn take_resolve_requests(&mut self) -> Vec<ResolveRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Applies the result of a `ResolveRequest`. Results for anything but the most recently
    /// issued request are discarded. Failures leave the session untouched.
    pub fn complete_resolution(
        &mut self,
        seq: u64,
        result: Result<ResolvedPath, ResolveError>,
    ) -> Result<(), NavError> {
        let purpose = match self.awaiting {
            Some((latest, purpose)) if latest == seq => purpose,
            _ => {
                debug!("Discarding stale resolution {seq}");
                return Ok(());
            }
        };
        self.awaiting = None;

        let path = match result {
            Ok(path) => path,
            Err(err) => {
                warn!("Couldn't resolve route: {err}");
                return Err(err.into());
            }
        };
        info!(
            "Resolved route {seq}: {} points, {} steps",
            path.geometry.len(),
            path.instructions.len()
        );
        self.transition(Transition::Resolved(path.clone()))?;

        match purpose {
            ResolvePurpose::Preview => {
                for line in path.announcements() {
                    debug!("Step: {line}");
                    self.say(&line);
                }
            }
            ResolvePurpose::Journey => {
                let instructions = narrator::narration_lines(&path);
                if self.narrator.is_started() && self.narrator.instructions() == instructions {
                    return Ok(());
                }
                info!("Narrating {} instructions", instructions.len());
                let now = self.clock.now_ms();
                self.narrator.start(instructions, now);
                self.tick();
            }
        }
        Ok(())
    }

    /// The next narration emission the host should schedule, if any.
    pub fn narration_timer(&self) -> Option<NarrationTimer> {
        self.narrator.pending()
    }

    /// Fires a timer previously returned by `narration_timer`. Stale timers do nothing.
    pub fn fire_narration(&mut self, timer: NarrationTimer) {
        let now = self.clock.now_ms();
        if let Some(text) = self.narrator.fire(timer, now) {
            self.speak_instruction(&text);
        }
    }

    /// Fires narration that has come due. For hosts that poll instead of scheduling timers.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        while let Some(text) = self.narrator.tick(now) {
            self.speak_instruction(&text);
        }
    }

    fn speak_instruction(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        info!("Instruction: {text}");
        self.say(text);
    }

    fn say(&mut self, text: &str) {
        if let Some(speech) = self.speech.as_mut() {
            speech.speak(text);
        }
    }

    fn transition(&mut self, transition: Transition) -> Result<(), NavError> {
        self.state = self.state.apply(transition)?;
        Ok(())
    }

    // The cooldown itself is only recorded once an action succeeds
    fn check_rate_limit(&self) -> Result<(), NavError> {
        if self.limiter.check(self.clock.now_ms()) {
            Ok(())
        } else {
            warn!("Too many actions in a short period, please wait");
            Err(NavError::RateLimited)
        }
    }

    fn reject(&mut self, message: &str) -> NavError {
        self.prompt.alert(message);
        NavError::ValidationFailed(message.to_string())
    }

    fn request_resolution(&mut self, purpose: ResolvePurpose) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.awaiting = Some((seq, purpose));
        self.outbox.push(ResolveRequest {
            seq,
            waypoints: self.state.waypoints().to_vec(),
            purpose,
        });
    }
}
