/// Minimum time between two user actions that mutate a route.
pub const ACTION_COOLDOWN_MS: u64 = 2000;

/// Gates waypoint additions and saves. Deletion, selection and journey start/stop bypass it.
#[derive(Debug, Default)]
pub struct RateLimiter {
    // None until the first permitted action
    last_action_ms: Option<u64>,
}

impl RateLimiter {
    pub fn new() -> RateLimiter {
        RateLimiter::default()
    }

    /// True if enough time has passed since the last recorded action. Changes nothing.
    pub fn check(&self, now_ms: u64) -> bool {
        match self.last_action_ms {
            Some(last) => now_ms.saturating_sub(last) >= ACTION_COOLDOWN_MS,
            None => true,
        }
    }

    /// Starts the cooldown. Only call this once the action has actually happened.
    pub fn record(&mut self, now_ms: u64) {
        self.last_action_ms = Some(now_ms);
    }
}
