//! Browser implementations of the engine's capabilities.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use route_narrator::store::{Slot, StoreError};
use route_narrator::{
    Capability, Clock, Geolocation, NavError, Position, Speech, UserPrompt, WatchId,
};

use crate::{pump, Host};

pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}

pub struct BrowserSpeech {
    synth: web_sys::SpeechSynthesis,
    lang: String,
}

impl BrowserSpeech {
    pub fn detect(window: &web_sys::Window, lang: &str) -> Option<BrowserSpeech> {
        let synth = window.speech_synthesis().ok()?;
        Some(BrowserSpeech {
            synth,
            lang: lang.to_string(),
        })
    }
}

impl Speech for BrowserSpeech {
    fn speak(&mut self, text: &str) {
        match web_sys::SpeechSynthesisUtterance::new_with_text(text) {
            Ok(utterance) => {
                utterance.set_lang(&self.lang);
                utterance.set_rate(1.0);
                utterance.set_pitch(1.0);
                self.synth.speak(&utterance);
            }
            Err(err) => {
                warn!("Couldn't speak {text:?}: {err:?}");
            }
        }
    }

    fn stop(&mut self) {
        self.synth.cancel();
    }

    fn pause(&mut self) {
        self.synth.pause();
    }

    fn resume(&mut self) {
        self.synth.resume();
    }
}

pub struct BrowserGeolocation {
    geolocation: web_sys::Geolocation,
    host: Host,
    // Closures have to outlive the watch they were registered for
    callbacks: HashMap<i32, Closure<dyn FnMut(JsValue)>>,
}

impl BrowserGeolocation {
    pub fn detect(window: &web_sys::Window, host: Host) -> Option<BrowserGeolocation> {
        let geolocation = window.navigator().geolocation().ok()?;
        Some(BrowserGeolocation {
            geolocation,
            host,
            callbacks: HashMap::new(),
        })
    }
}

impl Geolocation for BrowserGeolocation {
    fn watch(&mut self) -> Result<WatchId, NavError> {
        let host = self.host.clone();
        // The browser assigns the id only after the callback is registered
        let id_cell = Rc::new(Cell::new(-1));
        let id_for_callback = id_cell.clone();

        let callback = Closure::wrap(Box::new(move |raw: JsValue| {
            let Some(position) = parse_position(&raw) else {
                warn!("Ignoring a position update without coordinates");
                return;
            };
            let Some(engine) = host.engine.upgrade() else {
                return;
            };
            engine
                .borrow_mut()
                .on_position(WatchId(id_for_callback.get()), position);
            pump(&host);
        }) as Box<dyn FnMut(JsValue)>);

        let id = self
            .geolocation
            .watch_position(callback.as_ref().unchecked_ref())
            .map_err(|err| {
                warn!("watchPosition failed: {err:?}");
                NavError::UnsupportedCapability(Capability::Geolocation)
            })?;
        id_cell.set(id);
        self.callbacks.insert(id, callback);
        Ok(WatchId(id))
    }

    fn clear_watch(&mut self, id: WatchId) {
        self.geolocation.clear_watch(id.0);
        self.callbacks.remove(&id.0);
    }
}

fn parse_position(raw: &JsValue) -> Option<Position> {
    let coords = js_sys::Reflect::get(raw, &"coords".into()).ok()?;
    let number = |obj: &JsValue, key: &str| {
        js_sys::Reflect::get(obj, &key.into())
            .ok()
            .and_then(|x| x.as_f64())
    };
    Some(Position {
        lat: number(&coords, "latitude")?,
        lng: number(&coords, "longitude")?,
        accuracy_meters: number(&coords, "accuracy"),
        timestamp_ms: number(raw, "timestamp").unwrap_or_else(js_sys::Date::now) as u64,
    })
}

pub struct BrowserPrompt {
    window: web_sys::Window,
}

impl BrowserPrompt {
    pub fn new(window: web_sys::Window) -> BrowserPrompt {
        BrowserPrompt { window }
    }
}

impl UserPrompt for BrowserPrompt {
    fn ask(&mut self, message: &str) -> Option<String> {
        self.window.prompt_with_message(message).ok().flatten()
    }

    fn confirm(&mut self, message: &str) -> bool {
        self.window.confirm_with_message(message).unwrap_or(false)
    }

    fn alert(&mut self, message: &str) {
        if let Err(err) = self.window.alert_with_message(message) {
            warn!("alert failed: {err:?}");
        }
    }
}

/// One localStorage key.
pub struct LocalStorageSlot {
    storage: web_sys::Storage,
    key: String,
}

impl LocalStorageSlot {
    pub fn detect(window: &web_sys::Window, key: &str) -> Option<LocalStorageSlot> {
        let storage = window.local_storage().ok()??;
        Some(LocalStorageSlot {
            storage,
            key: key.to_string(),
        })
    }
}

impl Slot for LocalStorageSlot {
    fn read(&self) -> Result<Option<String>, StoreError> {
        self.storage
            .get_item(&self.key)
            .map_err(|err| StoreError::Unavailable(format!("{err:?}")))
    }

    fn write(&mut self, value: &str) -> Result<(), StoreError> {
        self.storage
            .set_item(&self.key, value)
            .map_err(|err| StoreError::Unavailable(format!("{err:?}")))
    }
}
