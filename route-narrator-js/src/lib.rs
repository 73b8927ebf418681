mod browser;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Once;

use log::{debug, info, warn};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use route_narrator::store::{MemorySlot, SlotStore, ROUTES_SLOT};
use route_narrator::{
    Capabilities, Geolocation, NarrationTimer, NavConfig, NavError, NavigationEngine,
    RouteResolver, RouteStore, SessionState, Speech, Waypoint,
};

use crate::browser::{
    BrowserClock, BrowserGeolocation, BrowserPrompt, BrowserSpeech, LocalStorageSlot,
};

static START: Once = Once::new();

/// Everything asynchronous callbacks need to get back into the engine.
#[derive(Clone)]
pub(crate) struct Host {
    engine: Weak<RefCell<NavigationEngine>>,
    resolver: RouteResolver,
    on_change: Rc<RefCell<Option<js_sys::Function>>>,
    // The narration timer already handed to setTimeout
    scheduled: Rc<Cell<Option<NarrationTimer>>>,
}

#[wasm_bindgen]
pub struct JsNavigator {
    engine: Rc<RefCell<NavigationEngine>>,
    host: Host,
}

#[derive(Serialize)]
struct Status {
    mode: &'static str,
    route_name: Option<String>,
    num_waypoints: usize,
    num_instructions: usize,
    tracking: bool,
    create_panel_open: bool,
    load_panel_open: bool,
}

#[derive(Serialize)]
struct MapView<'a> {
    center: [f64; 2],
    zoom: u8,
    tile_api: &'a str,
}

#[wasm_bindgen]
impl JsNavigator {
    /// `config` is optional; see `NavConfig` for the fields.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<JsNavigator, JsValue> {
        START.call_once(|| {
            // Panics shouldn't happen, but if they do, console.log them.
            console_error_panic_hook::set_once();
            console_log::init_with_level(log::Level::Info).unwrap();
        });

        let config: NavConfig = if config.is_undefined() || config.is_null() {
            NavConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(err_to_js)?
        };
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let resolver = RouteResolver::new(&config.route_api);
        let on_change = Rc::new(RefCell::new(None));
        let scheduled = Rc::new(Cell::new(None));

        let engine = Rc::new_cyclic(|weak: &Weak<RefCell<NavigationEngine>>| {
            let host = Host {
                engine: weak.clone(),
                resolver: resolver.clone(),
                on_change: on_change.clone(),
                scheduled: scheduled.clone(),
            };
            let speech = BrowserSpeech::detect(&window, &config.speech_lang)
                .map(|x| Box::new(x) as Box<dyn Speech>);
            let geolocation = BrowserGeolocation::detect(&window, host)
                .map(|x| Box::new(x) as Box<dyn Geolocation>);
            let store: Box<dyn RouteStore> = match LocalStorageSlot::detect(&window, ROUTES_SLOT) {
                Some(slot) => Box::new(SlotStore::new(slot)),
                None => {
                    warn!("localStorage isn't available, routes won't survive a reload");
                    Box::new(SlotStore::new(MemorySlot::new()))
                }
            };
            RefCell::new(NavigationEngine::new(
                config.clone(),
                Capabilities {
                    clock: Box::new(BrowserClock),
                    speech,
                    geolocation,
                    prompt: Box::new(BrowserPrompt::new(window.clone())),
                    store,
                },
            ))
        });
        info!("Navigator ready, routing through {}", config.route_api);

        let host = Host {
            engine: Rc::downgrade(&engine),
            resolver,
            on_change,
            scheduled,
        };
        Ok(JsNavigator { engine, host })
    }

    /// `callback` runs whenever something changes asynchronously, like a route resolving. The
    /// caller should redraw.
    #[wasm_bindgen(js_name = setOnChange)]
    pub fn set_on_change(&mut self, callback: js_sys::Function) {
        *self.host.on_change.borrow_mut() = Some(callback);
    }

    #[wasm_bindgen(js_name = mapView)]
    pub fn map_view(&self) -> Result<JsValue, JsValue> {
        let engine = self.engine.borrow();
        let config = engine.config();
        serde_wasm_bindgen::to_value(&MapView {
            center: config.map_center,
            zoom: config.map_zoom,
            tile_api: &config.tile_api,
        })
        .map_err(err_to_js)
    }

    pub fn status(&self) -> Result<JsValue, JsValue> {
        let engine = self.engine.borrow();
        let state = engine.state();
        let route_name = match state {
            SessionState::Idle => None,
            SessionState::Creating(draft) => Some(draft.name.clone()),
            SessionState::Selected { route, .. } | SessionState::Journeying { route, .. } => {
                Some(route.name.clone())
            }
        };
        let panels = engine.panels();
        serde_wasm_bindgen::to_value(&Status {
            mode: match state {
                SessionState::Idle => "idle",
                SessionState::Creating(_) => "creating",
                SessionState::Selected { .. } => "selected",
                SessionState::Journeying { .. } => "journeying",
            },
            route_name,
            num_waypoints: state.waypoints().len(),
            num_instructions: state.path().map(|p| p.instructions.len()).unwrap_or(0),
            tracking: engine.is_tracking(),
            create_panel_open: panels.create_open,
            load_panel_open: panels.load_open,
        })
        .map_err(err_to_js)
    }

    #[wasm_bindgen(js_name = savedRoutes)]
    pub fn saved_routes(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.engine.borrow().saved_routes()).map_err(err_to_js)
    }

    #[wasm_bindgen(js_name = renderGeojson)]
    pub fn render_geojson(&self) -> String {
        self.engine.borrow().render_geojson()
    }

    #[wasm_bindgen(js_name = toFinalFeature)]
    pub fn to_final_feature(&self) -> Option<String> {
        self.engine.borrow().to_final_feature()
    }

    #[wasm_bindgen(js_name = toggleCreatePanel)]
    pub fn toggle_create_panel(&mut self) {
        self.engine.borrow_mut().toggle_create_panel();
    }

    #[wasm_bindgen(js_name = toggleLoadPanel)]
    pub fn toggle_load_panel(&mut self) {
        self.engine.borrow_mut().toggle_load_panel();
    }

    #[wasm_bindgen(js_name = startRouteCreation)]
    pub fn start_route_creation(&mut self) -> Result<(), JsValue> {
        let result = self.engine.borrow_mut().start_route_creation();
        self.finish(result)
    }

    /// Map clicks. Only does something while creating a route.
    #[wasm_bindgen(js_name = onClick)]
    pub fn on_click(&mut self, lat: f64, lng: f64) -> Result<(), JsValue> {
        let Some(waypt) = Waypoint::new(lat, lng) else {
            return Err(JsValue::from_str("Waypoint coordinates must be finite"));
        };
        let result = self.engine.borrow_mut().add_waypoint(waypt);
        self.finish(result)
    }

    #[wasm_bindgen(js_name = cancelRouteCreation)]
    pub fn cancel_route_creation(&mut self) -> Result<(), JsValue> {
        let result = self.engine.borrow_mut().cancel_route_creation();
        self.finish(result)
    }

    #[wasm_bindgen(js_name = saveRoute)]
    pub fn save_route(&mut self) -> Result<(), JsValue> {
        let result = self.engine.borrow_mut().save_route();
        self.finish(result)
    }

    #[wasm_bindgen(js_name = loadRoute)]
    pub fn load_route(&mut self, id: f64) -> Result<(), JsValue> {
        let result = self.engine.borrow_mut().load_route(id as i64);
        self.finish(result)
    }

    #[wasm_bindgen(js_name = deleteRoute)]
    pub fn delete_route(&mut self, id: f64) -> Result<bool, JsValue> {
        let result = self.engine.borrow_mut().delete_route(id as i64);
        result.map_err(err_to_js)
    }

    #[wasm_bindgen(js_name = startJourney)]
    pub fn start_journey(&mut self) -> Result<(), JsValue> {
        let result = self.engine.borrow_mut().start_journey();
        self.finish(result)
    }

    #[wasm_bindgen(js_name = stopJourney)]
    pub fn stop_journey(&mut self) -> Result<(), JsValue> {
        let result = self.engine.borrow_mut().stop_journey();
        self.finish(result)
    }

    #[wasm_bindgen(js_name = sendSos)]
    pub fn send_sos(&mut self) {
        self.engine.borrow_mut().send_sos();
    }

    #[wasm_bindgen(js_name = pauseSpeech)]
    pub fn pause_speech(&mut self) {
        self.engine.borrow_mut().pause_speech();
    }

    #[wasm_bindgen(js_name = resumeSpeech)]
    pub fn resume_speech(&mut self) {
        self.engine.borrow_mut().resume_speech();
    }
}

impl JsNavigator {
    // Starts whatever the action queued up, and decides which errors the page needs to see.
    // Rate limiting and validation have already been logged or shown to the user.
    fn finish(&self, result: Result<(), NavError>) -> Result<(), JsValue> {
        pump(&self.host);
        match result {
            Ok(()) => Ok(()),
            Err(NavError::RateLimited | NavError::ValidationFailed(_)) => Ok(()),
            Err(NavError::InvalidTransition(err)) => {
                debug!("{err}");
                Ok(())
            }
            Err(err) => Err(err_to_js(err)),
        }
    }
}

/// Starts queued resolutions and schedules the next narration emission.
pub(crate) fn pump(host: &Host) {
    let Some(engine) = host.engine.upgrade() else {
        return;
    };
    let (requests, timer) = {
        let mut engine = engine.borrow_mut();
        (engine.take_resolve_requests(), engine.narration_timer())
    };

    for req in requests {
        let host = host.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let result = host.resolver.resolve(&req.waypoints).await;
            let Some(engine) = host.engine.upgrade() else {
                return;
            };
            let outcome = engine.borrow_mut().complete_resolution(req.seq, result);
            if let Err(err) = outcome {
                warn!("{err}");
            }
            pump(&host);
            notify(&host);
        });
    }

    if let Some(timer) = timer {
        if host.scheduled.get() != Some(timer) {
            host.scheduled.set(Some(timer));
            schedule_narration(host, timer);
        }
    }
}

fn schedule_narration(host: &Host, timer: NarrationTimer) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let delay = timer
        .due_at_ms
        .saturating_sub(js_sys::Date::now() as u64)
        .min(i32::MAX as u64) as i32;
    let host = host.clone();
    let callback = Closure::once_into_js(move || {
        let Some(engine) = host.engine.upgrade() else {
            return;
        };
        engine.borrow_mut().fire_narration(timer);
        pump(&host);
    });
    if let Err(err) = window
        .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay)
    {
        warn!("Couldn't schedule narration: {err:?}");
    }
}

fn notify(host: &Host) {
    if let Some(callback) = host.on_change.borrow().as_ref() {
        if let Err(err) = callback.call0(&JsValue::NULL) {
            warn!("onChange callback failed: {err:?}");
        }
    }
}

fn err_to_js<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}
