//! The sequence driver: one clock, one frame registration, one timeline
//! cursor, one renderer and one audio engine per mounted sequence.

use std::{
    fmt,
    thread,
    time::{Duration, Instant},
};

use crate::{
    audio::AudioEngine,
    completion::CompletionSignal,
    host::{ActiveFlag, FrameRegistration, FrameRegistry, Viewport},
    mapping::IntensityMatrix,
    render::{FrameContext, FrameRng, Renderer},
    timeline::{Clock, CueContext, ManualClock, Progress, Timeline},
};

/// Everything that makes up one sequence before it starts.
pub struct Sequence<R> {
    pub name: String,
    /// Completion token announced to the host.
    pub token: String,
    pub timeline: Timeline,
    pub intensities: IntensityMatrix,
    pub renderer: R,
    pub audio: AudioEngine,
}

impl<R> Sequence<R> {
    pub fn total(&self) -> Duration {
        self.timeline.total()
    }
}

impl<R> fmt::Debug for Sequence<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.name)
            .field("token", &self.token)
            .field("timeline", &self.timeline)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Running,
    /// Ran to the end and signalled completion.
    Complete,
    /// No surface was available; completion was signalled at start.
    Degraded,
    /// Unmounted.
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// This tick crossed the end of the sequence.
    Completed,
    /// The driver is no longer running; nothing happened.
    Inactive,
}

/// Drives one sequence run frame by frame.
pub struct SequenceDriver<R: Renderer> {
    name: String,
    clock: Box<dyn Clock>,
    timeline: Timeline,
    intensities: IntensityMatrix,
    renderer: R,
    audio: AudioEngine,
    completion: CompletionSignal,
    registration: Option<FrameRegistration>,
    rng: FrameRng,
    state: DriverState,
    last_elapsed: Duration,
    frame_index: u64,
    progress: Progress,
}

impl<R: Renderer> SequenceDriver<R> {
    /// Takes the sequence's frame registration and starts its clock.
    ///
    /// Without a rendering surface the driver starts degraded: audio is
    /// released and completion is signalled at once so the host never waits
    /// on a sequence that cannot be shown.
    pub fn start(
        sequence: Sequence<R>,
        mut completion: CompletionSignal,
        frames: &FrameRegistry,
        clock: Box<dyn Clock>,
        rng: FrameRng,
    ) -> Self {
        let Sequence {
            name,
            token,
            timeline,
            intensities,
            renderer,
            audio,
        } = sequence;
        // the sequence names its own completion
        completion.bind_token(token);
        let mut driver = Self {
            name,
            clock,
            timeline,
            intensities,
            renderer,
            audio,
            completion,
            registration: None,
            rng,
            state: DriverState::Running,
            last_elapsed: Duration::ZERO,
            frame_index: 0,
            progress: Progress::START,
        };

        match frames.request() {
            Ok(registration) => {
                tracing::debug!(
                    sequence = %driver.name,
                    registration = registration.id(),
                    total = driver.timeline.total().as_secs_f32(),
                    "sequence started"
                );
                driver.registration = Some(registration);
            }
            Err(err) => {
                tracing::warn!(
                    %err,
                    sequence = %driver.name,
                    "no rendering surface, skipping to completion"
                );
                driver.state = DriverState::Degraded;
                driver.audio.dispose();
                driver.completion.fire();
            }
        }
        driver
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == DriverState::Running
            && self
                .registration
                .as_ref()
                .is_some_and(FrameRegistration::is_active)
    }

    /// Frames rendered so far.
    pub fn ticks(&self) -> u64 {
        self.frame_index
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn total(&self) -> Duration {
        self.timeline.total()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn audio(&self) -> &AudioEngine {
        &self.audio
    }

    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    /// Flag a frame loop polls before each tick; `None` once the driver has
    /// no registration.
    pub fn active_flag(&self) -> Option<ActiveFlag> {
        self.registration.as_ref().map(FrameRegistration::active_flag)
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.renderer.resize(viewport);
    }

    /// Runs one frame: fire due cues, render, and finish if the end has been
    /// reached.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Inactive;
        }

        let elapsed = self.clock.now().max(self.last_elapsed);
        let delta = elapsed - self.last_elapsed;
        self.last_elapsed = elapsed;
        let total = self.timeline.total();
        self.progress = Progress::from_elapsed(elapsed, total);

        self.audio.advance(elapsed);
        let mut cues = CueContext {
            elapsed,
            progress: self.progress,
            audio: &mut self.audio,
            renderer: &mut self.renderer,
        };
        self.timeline.fire_due(&mut cues);

        let frame = FrameContext {
            elapsed,
            delta,
            progress: self.progress,
            frame_index: self.frame_index,
        };
        let intensities = self.intensities.evaluate(self.progress);
        self.renderer.render(&frame, &intensities, &mut self.rng);
        self.frame_index += 1;

        if elapsed < total {
            return TickOutcome::Continue;
        }

        self.completion.fire();
        self.state = DriverState::Complete;
        self.release();
        tracing::debug!(sequence = %self.name, frames = self.frame_index, "sequence finished");
        TickOutcome::Completed
    }

    /// Unmount: completion can no longer fire, no further tick runs, audio
    /// is released. Repeated calls do nothing.
    pub fn teardown(&mut self) {
        if self.state == DriverState::TornDown {
            return;
        }
        self.completion.disarm();
        self.release();
        if self.state == DriverState::Running {
            tracing::debug!(
                sequence = %self.name,
                frames = self.frame_index,
                "sequence torn down early"
            );
        }
        self.state = DriverState::TornDown;
    }

    fn release(&mut self) {
        if let Some(mut registration) = self.registration.take() {
            registration.cancel();
        }
        self.audio.dispose();
    }
}

impl<R: Renderer> Drop for SequenceDriver<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<R: Renderer> fmt::Debug for SequenceDriver<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceDriver")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("frame_index", &self.frame_index)
            .field("progress", &self.progress)
            .field("audio", &self.audio)
            .finish_non_exhaustive()
    }
}

/// Paces frames for a [`FrameLoop`].
pub trait FrameSource {
    /// Waits for the next frame. Returns `false` when the host will not
    /// deliver any more frames.
    fn next_frame(&mut self) -> bool;
}

/// Deterministic pacing: every frame advances a [`ManualClock`] by a fixed
/// step. The first frame lands at zero elapsed time.
#[derive(Debug, Clone)]
pub struct FixedStepFrames {
    clock: ManualClock,
    step: Duration,
    limit: Option<u64>,
    issued: u64,
}

impl FixedStepFrames {
    pub fn new(clock: ManualClock, step: Duration) -> Self {
        Self {
            clock,
            step,
            limit: None,
            issued: 0,
        }
    }

    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }
}

impl FrameSource for FixedStepFrames {
    fn next_frame(&mut self) -> bool {
        if self.limit.is_some_and(|limit| self.issued >= limit) {
            return false;
        }
        if self.issued > 0 {
            self.clock.advance(self.step);
        }
        self.issued += 1;
        true
    }
}

/// Wall-clock pacing: sleeps until the next frame deadline.
#[derive(Debug, Clone)]
pub struct RealtimeFrames {
    interval: Duration,
    next: Option<Instant>,
}

impl RealtimeFrames {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next: None,
        }
    }

    pub fn at_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs(1) / fps.max(1))
    }
}

impl FrameSource for RealtimeFrames {
    fn next_frame(&mut self) -> bool {
        let now = Instant::now();
        let deadline = self.next.unwrap_or(now);
        if deadline > now {
            thread::sleep(deadline - now);
        }
        // late frames re-anchor instead of bursting to catch up
        self.next = Some(deadline.max(now) + self.interval);
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub completed: bool,
}

/// Runs a tick function while its registration stays active.
pub struct FrameLoop {
    source: Box<dyn FrameSource>,
    max_frames: Option<u64>,
}

impl FrameLoop {
    pub fn new(source: impl FrameSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            max_frames: None,
        }
    }

    /// Stops after `frames` iterations even if the sequence is still active.
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Polls `active` before every iteration; stops once it is cleared, the
    /// source dries up or `tick` reports anything but
    /// [`TickOutcome::Continue`].
    pub fn run(
        &mut self,
        active: &ActiveFlag,
        mut tick: impl FnMut() -> TickOutcome,
    ) -> LoopSummary {
        let mut summary = LoopSummary::default();
        while active.is_active() {
            if self.max_frames.is_some_and(|max| summary.frames >= max) {
                break;
            }
            if !self.source.next_frame() {
                break;
            }
            match tick() {
                TickOutcome::Continue => summary.frames += 1,
                TickOutcome::Completed => {
                    summary.frames += 1;
                    summary.completed = true;
                    break;
                }
                TickOutcome::Inactive => break,
            }
        }
        summary
    }

    pub fn drive<R: Renderer>(&mut self, driver: &mut SequenceDriver<R>) -> LoopSummary {
        match driver.active_flag() {
            Some(active) => self.run(&active, || driver.tick()),
            None => LoopSummary::default(),
        }
    }
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoop")
            .field("max_frames", &self.max_frames)
            .finish_non_exhaustive()
    }
}
