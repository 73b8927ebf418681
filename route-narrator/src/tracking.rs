use log::{debug, info, warn};

use crate::capabilities::{Geolocation, WatchId};
use crate::error::Capability;

/// Owns the one geolocation subscription used during a journey.
pub struct Tracker {
    geolocation: Option<Box<dyn Geolocation>>,
    active: Option<WatchId>,
}

impl Tracker {
    pub fn new(geolocation: Option<Box<dyn Geolocation>>) -> Tracker {
        if geolocation.is_none() {
            warn!("{} isn't available, journeys won't be tracked", Capability::Geolocation);
        }
        Tracker {
            geolocation,
            active: None,
        }
    }

    /// Subscribes, unless already subscribed. Without geolocation, this silently does nothing.
    pub fn start(&mut self) -> Option<WatchId> {
        if let Some(id) = self.active {
            debug!("Already tracking with {id:?}");
            return Some(id);
        }
        let geolocation = self.geolocation.as_mut()?;
        match geolocation.watch() {
            Ok(id) => {
                info!("Tracking position with {id:?}");
                self.active = Some(id);
                Some(id)
            }
            Err(err) => {
                warn!("Couldn't start tracking: {err}");
                None
            }
        }
    }

    pub fn stop(&mut self) {
        let Some(id) = self.active.take() else {
            return;
        };
        if let Some(geolocation) = self.geolocation.as_mut() {
            geolocation.clear_watch(id);
        }
        info!("Stopped tracking {id:?}");
    }

    /// Updates from anything but the current subscription are stale.
    pub fn accepts(&self, id: WatchId) -> bool {
        self.active == Some(id)
    }

    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::FakeGeolocation;

    #[test]
    fn test_single_subscription() {
        let geolocation = FakeGeolocation::default();
        let mut tracker = Tracker::new(Some(Box::new(geolocation.clone())));

        let id = tracker.start().unwrap();
        assert_eq!(tracker.start(), Some(id));
        assert_eq!(geolocation.active(), vec![id]);

        tracker.stop();
        assert!(geolocation.active().is_empty());
        assert!(!tracker.accepts(id));
        // Stopping again is harmless
        tracker.stop();
        assert_eq!(geolocation.cleared(), 1);
    }

    #[test]
    fn test_old_subscription_is_stale() {
        let geolocation = FakeGeolocation::default();
        let mut tracker = Tracker::new(Some(Box::new(geolocation.clone())));
        let first = tracker.start().unwrap();
        tracker.stop();
        let second = tracker.start().unwrap();
        assert_ne!(first, second);
        assert!(!tracker.accepts(first));
        assert!(tracker.accepts(second));
    }

    #[test]
    fn test_without_geolocation() {
        let mut tracker = Tracker::new(None);
        assert_eq!(tracker.start(), None);
        assert!(!tracker.is_tracking());
        tracker.stop();
    }
}
