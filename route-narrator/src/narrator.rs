use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use route_narrator_model::ResolvedPath;

/// Time between the start of one spoken instruction and the start of the next.
pub const NARRATION_INTERVAL_MS: u64 = 3000;

/// Handle for the next scheduled emission. Only the most recently issued handle can fire.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NarrationTimer {
    pub id: u64,
    pub due_at_ms: u64,
}

/// Reads a list of instructions aloud, one every `NARRATION_INTERVAL_MS`, then stops.
#[derive(Debug, Default)]
pub struct Narrator {
    instructions: Vec<String>,
    // Index of the next instruction to speak. Never wraps.
    cursor: usize,
    pending: Option<NarrationTimer>,
    // Every timer ever handed out gets a fresh id, so stale ones can't match
    next_timer_id: u64,
    started: bool,
}

impl Narrator {
    pub fn new() -> Narrator {
        Narrator::default()
    }

    /// Begins again from the first instruction. Anything already scheduled is invalidated.
    pub fn start(&mut self, instructions: Vec<String>, now_ms: u64) -> Option<NarrationTimer> {
        self.instructions = instructions;
        self.cursor = 0;
        self.started = true;
        self.pending = None;
        if !self.instructions.is_empty() {
            self.schedule(now_ms);
        }
        self.pending
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.pending.take() {
            debug!("Cancelling narration timer {}", timer.id);
        }
        self.started = false;
    }

    pub fn pending(&self) -> Option<NarrationTimer> {
        self.pending
    }

    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True between `start` and `stop`, even after the last instruction has been spoken.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Emits the instruction at the cursor if `timer` is the one currently scheduled. Returns
    /// the sanitized text to speak.
    pub fn fire(&mut self, timer: NarrationTimer, now_ms: u64) -> Option<String> {
        if self.pending != Some(timer) {
            debug!("Ignoring stale narration timer {}", timer.id);
            return None;
        }
        self.pending = None;

        let text = sanitize(self.instructions.get(self.cursor)?);
        self.cursor += 1;
        if self.cursor < self.instructions.len() {
            self.schedule(now_ms);
        }
        Some(text)
    }

    /// For hosts without real timers: fires the pending emission once it's due.
    pub fn tick(&mut self, now_ms: u64) -> Option<String> {
        let timer = self.pending?;
        if now_ms < timer.due_at_ms {
            return None;
        }
        self.fire(timer, now_ms)
    }

    fn schedule(&mut self, emission_start_ms: u64) {
        // The first emission is due immediately; later ones follow the flat cadence
        let due_at_ms = if self.cursor == 0 {
            emission_start_ms
        } else {
            emission_start_ms + NARRATION_INTERVAL_MS
        };
        self.next_timer_id += 1;
        self.pending = Some(NarrationTimer {
            id: self.next_timer_id,
            due_at_ms,
        });
    }
}

/// Strips anything that looks like a markup tag, then surrounding whitespace.
pub fn sanitize(raw: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    tag.replace_all(raw, "").trim().to_string()
}

/// What a journey narrates: each step's sanitized text, with a step dropped when it reads the same
/// as the one right before it. Repeats further apart are kept.
pub fn narration_lines(path: &ResolvedPath) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for instruction in &path.instructions {
        let line = sanitize(&instruction.text);
        if out.last() != Some(&line) {
            out.push(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use route_narrator_model::Instruction;

    use super::*;

    fn texts(list: &[&str]) -> Vec<String> {
        list.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  <b>Turn left</b> onto <i>Main</i>  "), "Turn left onto Main");
        assert_eq!(sanitize("Turn left."), "Turn left.");
        assert_eq!(sanitize("<br/>"), "");
    }

    #[test]
    fn test_narration_lines_compare_sanitized_text() {
        let step = |text: &str| Instruction {
            text: text.to_string(),
            distance_meters: None,
        };
        let path = ResolvedPath {
            geometry: Vec::new(),
            instructions: vec![
                step("<b>Turn left.</b>"),
                step("Turn left."),
                step("Turn right."),
                step(" Turn left. "),
            ],
        };
        assert_eq!(
            narration_lines(&path),
            texts(&["Turn left.", "Turn right.", "Turn left."])
        );
    }

    #[test]
    fn test_cadence_then_halt() {
        let mut narrator = Narrator::new();
        narrator.start(texts(&["Turn left.", "Turn right."]), 0);

        assert_eq!(narrator.tick(0), Some("Turn left.".to_string()));
        assert_eq!(narrator.tick(2999), None);
        assert_eq!(narrator.tick(3000), Some("Turn right.".to_string()));
        // No third emission and no wrapping around
        assert_eq!(narrator.pending(), None);
        assert_eq!(narrator.tick(6000), None);
        assert_eq!(narrator.tick(60_000), None);
        assert_eq!(narrator.cursor(), 2);
    }

    #[test]
    fn test_interval_measured_from_emission_start() {
        let mut narrator = Narrator::new();
        narrator.start(texts(&["a", "b", "c"]), 1000);
        // Polled late
        assert_eq!(narrator.tick(1500), Some("a".to_string()));
        assert_eq!(narrator.pending().unwrap().due_at_ms, 4500);
    }

    #[test]
    fn test_stop_invalidates_pending() {
        let mut narrator = Narrator::new();
        narrator.start(texts(&["first", "second"]), 0);
        assert_eq!(narrator.tick(0), Some("first".to_string()));
        let timer = narrator.pending().unwrap();
        assert_eq!(timer.due_at_ms, 3000);

        narrator.stop();
        assert_eq!(narrator.fire(timer, 3000), None);
        assert_eq!(narrator.tick(3000), None);
    }

    #[test]
    fn test_restart_replaces_old_timers() {
        let mut narrator = Narrator::new();
        narrator.start(texts(&["old 1", "old 2"]), 0);
        narrator.tick(0);
        let old_timer = narrator.pending().unwrap();

        narrator.start(texts(&["new 1"]), 1000);
        assert_eq!(narrator.fire(old_timer, 3000), None);
        assert_eq!(narrator.tick(1000), Some("new 1".to_string()));
        assert_eq!(narrator.tick(4000), None);
    }

    #[test]
    fn test_same_timer_fires_once() {
        let mut narrator = Narrator::new();
        let timer = narrator.start(texts(&["a", "b"]), 0).unwrap();
        assert_eq!(narrator.fire(timer, 0), Some("a".to_string()));
        assert_eq!(narrator.fire(timer, 0), None);
    }

    #[test]
    fn test_empty_list_schedules_nothing() {
        let mut narrator = Narrator::new();
        assert_eq!(narrator.start(Vec::new(), 0), None);
        assert!(narrator.is_started());
    }
}
