use std::{
    cell::Cell,
    fmt,
    rc::Rc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{audio::AudioEngine, render::Renderer};

/// Monotonic time source. Each driver owns its own clock.
pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Wall-clock source backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced explicitly by its owner. Clones share the same reading so a
/// frame source can advance the clock a driver reads from.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }

    pub fn set(&self, now: Duration) {
        // never runs backwards
        if now > self.now.get() {
            self.now.set(now);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Normalised position within a sequence, always in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Progress(f32);

impl Progress {
    pub const START: Self = Self(0.0);
    pub const END: Self = Self(1.0);

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::START;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// `elapsed / total`, clamped. A zero-length sequence is already complete.
    pub fn from_elapsed(elapsed: Duration, total: Duration) -> Self {
        if total.is_zero() {
            return Self::END;
        }
        Self::new((elapsed.as_secs_f64() / total.as_secs_f64()) as f32)
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn is_complete(self) -> bool {
        self.0 >= 1.0
    }
}

/// Everything a cue action may touch when it fires.
pub struct CueContext<'a> {
    pub elapsed: Duration,
    pub progress: Progress,
    pub audio: &'a mut AudioEngine,
    pub renderer: &'a mut dyn Renderer,
}

pub type CueAction = Box<dyn FnMut(&mut CueContext<'_>)>;

struct Cue {
    at: Duration,
    label: String,
    action: CueAction,
}

/// Serializable view of a cue, used for listings and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueMark {
    pub at_seconds: f32,
    pub label: String,
}

/// Ordered list of timed cues for one sequence.
///
/// Trigger times are kept non-decreasing; cues with equal times fire in the
/// order they were added. Every cue fires at most once per run.
pub struct Timeline {
    total: Duration,
    cues: Vec<Cue>,
    next_cue: usize,
}

impl Timeline {
    pub fn new(total: Duration) -> Self {
        Self {
            total,
            cues: Vec::new(),
            next_cue: 0,
        }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Number of cues that have not fired in the current run.
    pub fn remaining(&self) -> usize {
        self.cues.len() - self.next_cue
    }

    /// Adds a cue at an absolute time. Times past the end are clamped to the
    /// total duration so the cue still fires on the final frame.
    pub fn at(
        mut self,
        at: Duration,
        label: impl Into<String>,
        action: impl FnMut(&mut CueContext<'_>) + 'static,
    ) -> Self {
        self.push(at, label, action);
        self
    }

    /// Adds a cue at a fraction of the total duration.
    pub fn at_progress(
        mut self,
        fraction: f32,
        label: impl Into<String>,
        action: impl FnMut(&mut CueContext<'_>) + 'static,
    ) -> Self {
        let at = self.total.mul_f32(Progress::new(fraction).value());
        self.push(at, label, action);
        self
    }

    pub fn push(
        &mut self,
        at: Duration,
        label: impl Into<String>,
        action: impl FnMut(&mut CueContext<'_>) + 'static,
    ) {
        let mut at = at.min(self.total);
        // a cue landing before the cursor moves up to the last fired cue so
        // it still fires this run and times stay non-decreasing
        if let Some(last_fired) = self.next_cue.checked_sub(1).map(|i| self.cues[i].at) {
            at = at.max(last_fired);
        }
        let index = self.cues.partition_point(|cue| cue.at <= at).max(self.next_cue);
        self.cues.insert(
            index,
            Cue {
                at,
                label: label.into(),
                action: Box::new(action),
            },
        );
    }

    /// Fires every cue whose trigger time is `<= ctx.elapsed` and has not yet
    /// fired. Returns how many fired.
    pub fn fire_due(&mut self, ctx: &mut CueContext<'_>) -> usize {
        let mut fired = 0;
        while let Some(cue) = self.cues.get_mut(self.next_cue) {
            if cue.at > ctx.elapsed {
                break;
            }
            self.next_cue += 1;
            tracing::debug!(
                cue = %cue.label,
                at = cue.at.as_secs_f32(),
                elapsed = ctx.elapsed.as_secs_f32(),
                "cue fired"
            );
            (cue.action)(ctx);
            fired += 1;
        }
        fired
    }

    /// Starts a fresh run: every cue becomes eligible again.
    pub fn rewind(&mut self) {
        self.next_cue = 0;
    }

    pub fn marks(&self) -> Vec<CueMark> {
        self.cues
            .iter()
            .map(|cue| CueMark {
                at_seconds: cue.at.as_secs_f32(),
                label: cue.label.clone(),
            })
            .collect()
    }
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeline")
            .field("total", &self.total)
            .field("cues", &self.marks())
            .field("next_cue", &self.next_cue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{audio::AudioEngine, render::NullRenderer, AudioConfig};

    fn fire(timeline: &mut Timeline, elapsed: Duration) -> usize {
        let mut audio = AudioEngine::disabled(AudioConfig::default());
        let mut renderer = NullRenderer::default();
        let mut ctx = CueContext {
            elapsed,
            progress: Progress::from_elapsed(elapsed, timeline.total()),
            audio: &mut audio,
            renderer: &mut renderer,
        };
        timeline.fire_due(&mut ctx)
    }

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> CueAction) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| -> CueAction {
            let sink = sink.clone();
            Box::new(move |_: &mut CueContext<'_>| sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn progress_is_clamped() {
        let total = Duration::from_secs(4);
        assert_eq!(Progress::from_elapsed(Duration::ZERO, total).value(), 0.0);
        assert_eq!(Progress::from_elapsed(Duration::from_secs(2), total).value(), 0.5);
        assert_eq!(Progress::from_elapsed(Duration::from_secs(9), total).value(), 1.0);
        assert_eq!(Progress::new(f32::NAN), Progress::START);
        assert!(Progress::from_elapsed(Duration::ZERO, Duration::ZERO).is_complete());
    }

    #[test]
    fn cues_are_sorted_and_fire_once_in_order() {
        let (log, make) = recorder();
        let mut timeline = Timeline::new(Duration::from_secs(4))
            .at_progress(0.95, "flash", make("flash"))
            .at_progress(0.5, "alarm", make("alarm"))
            .at_progress(0.8, "strobe", make("strobe"));

        let times: Vec<f32> = timeline.marks().iter().map(|m| m.at_seconds).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(fire(&mut timeline, Duration::from_millis(1_999)), 0);
        assert_eq!(fire(&mut timeline, Duration::from_secs(2)), 1);
        assert_eq!(fire(&mut timeline, Duration::from_secs(2)), 0);
        assert_eq!(fire(&mut timeline, Duration::from_secs(5)), 2);
        assert_eq!(fire(&mut timeline, Duration::from_secs(5)), 0);
        assert_eq!(*log.borrow(), vec!["alarm", "strobe", "flash"]);
    }

    #[test]
    fn equal_times_keep_insertion_order() {
        let (log, make) = recorder();
        let mut timeline = Timeline::new(Duration::from_secs(1))
            .at(Duration::from_millis(500), "a", make("a"))
            .at(Duration::from_millis(500), "b", make("b"));

        fire(&mut timeline, Duration::from_secs(1));
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn late_cues_clamp_to_total() {
        let (log, make) = recorder();
        let mut timeline = Timeline::new(Duration::from_secs(1)).at(Duration::from_secs(3), "late", make("late"));

        assert_eq!(timeline.marks()[0].at_seconds, 1.0);
        fire(&mut timeline, Duration::from_secs(1));
        assert_eq!(*log.borrow(), vec!["late"]);
    }

    #[test]
    fn rewind_allows_a_new_run() {
        let (log, make) = recorder();
        let mut timeline = Timeline::new(Duration::from_secs(1)).at(Duration::ZERO, "start", make("start"));

        fire(&mut timeline, Duration::ZERO);
        assert_eq!(timeline.remaining(), 0);
        timeline.rewind();
        fire(&mut timeline, Duration::ZERO);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn cue_pushed_behind_the_cursor_keeps_order() {
        let (log, make) = recorder();
        let mut timeline = Timeline::new(Duration::from_secs(4))
            .at(Duration::from_secs(1), "first", make("first"))
            .at(Duration::from_secs(3), "last", make("last"));
        assert_eq!(fire(&mut timeline, Duration::from_secs(2)), 1);

        timeline.push(Duration::from_millis(500), "early", make("early"));
        let times: Vec<f32> = timeline.marks().iter().map(|m| m.at_seconds).collect();
        assert_eq!(times, vec![1.0, 1.0, 3.0]);

        assert_eq!(fire(&mut timeline, Duration::from_secs(2)), 1);
        fire(&mut timeline, Duration::from_secs(4));
        assert_eq!(*log.borrow(), vec!["first", "early", "last"]);

        timeline.rewind();
        fire(&mut timeline, Duration::from_secs(4));
        assert_eq!(log.borrow()[3..], ["first", "early", "last"]);
    }

    #[test]
    fn manual_clock_is_shared_and_monotonic() {
        let clock = ManualClock::new();
        let reader = clock.clone();
        clock.advance(Duration::from_millis(16));
        clock.set(Duration::from_millis(5));
        assert_eq!(reader.now(), Duration::from_millis(16));
    }
}
