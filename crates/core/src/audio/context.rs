//! Audio contexts: the clocked sinks voices are scheduled into.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use super::graph::{AudioGraph, Voice};
use crate::{AudioConfig, Result, SequenceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Closed,
}

/// A running audio clock plus the graph it plays.
pub trait AudioContext {
    /// Seconds on the audio clock since the context was created.
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    fn state(&self) -> ContextState;

    /// Adds a voice whose times are already absolute on this context's clock.
    fn schedule(&mut self, voice: Voice) -> Result<()>;

    /// Silences every scheduled voice immediately.
    fn stop_all(&mut self) -> Result<()>;

    /// Releases the context. Closing a closed context is an error the caller
    /// is expected to avoid.
    fn close(&mut self) -> Result<()>;

    /// Voices that have not yet passed their stop time.
    fn active_voices(&self) -> usize;

    /// Brings the clock up to `until` seconds. Contexts driven by a device
    /// clock ignore this.
    fn advance(&mut self, _until: f64) -> Result<()> {
        Ok(())
    }
}

/// Creates audio contexts on demand. Creation may fail (no user gesture, no
/// output device); the engine treats that as "play silently".
pub trait ContextFactory {
    fn create(&self, config: &AudioConfig) -> Result<Box<dyn AudioContext>>;
}

impl<F> ContextFactory for F
where
    F: Fn(&AudioConfig) -> Result<Box<dyn AudioContext>>,
{
    fn create(&self, config: &AudioConfig) -> Result<Box<dyn AudioContext>> {
        self(config)
    }
}

/// Tracks whether the user has interacted with the host yet. Audio output is
/// only allowed after the first gesture.
#[derive(Debug, Clone, Default)]
pub struct GestureGate(Rc<Cell<bool>>);

impl GestureGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open() -> Self {
        let gate = Self::default();
        gate.record_gesture();
        gate
    }

    pub fn record_gesture(&self) {
        self.0.set(true);
    }

    pub fn is_open(&self) -> bool {
        self.0.get()
    }
}

struct OfflineState {
    graph: AudioGraph,
    rendered: u64,
    block_size: usize,
    state: ContextState,
    capture: Vec<f32>,
    history: Vec<Voice>,
}

/// Context that renders into memory instead of a device. Clones share state,
/// so a caller can keep a handle and read the capture after the engine that
/// owned the context has been disposed.
#[derive(Clone)]
pub struct OfflineContext {
    inner: Rc<RefCell<OfflineState>>,
}

impl OfflineContext {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(OfflineState {
                graph: AudioGraph::new(config.sample_rate, config.master_gain, config.noise_seed),
                rendered: 0,
                block_size: config.block_size.max(1),
                state: ContextState::Running,
                capture: Vec::new(),
                history: Vec::new(),
            })),
        }
    }

    /// Renders `frames` more samples, appends them to the capture and returns
    /// them.
    pub fn render(&self, frames: usize) -> Result<Vec<f32>> {
        let mut inner = self.inner.borrow_mut();
        if inner.state == ContextState::Closed {
            return Err(SequenceError::ContextClosed);
        }
        let mut block = vec![0.0; frames];
        let start = inner.rendered as f64 / f64::from(inner.graph.sample_rate());
        inner.graph.render(start, &mut block);
        inner.rendered += frames as u64;
        inner.capture.extend_from_slice(&block);
        Ok(block)
    }

    /// Everything rendered so far.
    pub fn capture(&self) -> Vec<f32> {
        self.inner.borrow().capture.clone()
    }

    /// Every voice ever scheduled, with absolute times.
    pub fn history(&self) -> Vec<Voice> {
        self.inner.borrow().history.clone()
    }
}

impl AudioContext for OfflineContext {
    fn current_time(&self) -> f64 {
        let inner = self.inner.borrow();
        inner.rendered as f64 / f64::from(inner.graph.sample_rate())
    }

    fn sample_rate(&self) -> u32 {
        self.inner.borrow().graph.sample_rate()
    }

    fn state(&self) -> ContextState {
        self.inner.borrow().state
    }

    fn schedule(&mut self, voice: Voice) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.state == ContextState::Closed {
            return Err(SequenceError::ContextClosed);
        }
        inner.history.push(voice.clone());
        inner.graph.add(voice);
        Ok(())
    }

    fn stop_all(&mut self) -> Result<()> {
        let now = self.current_time();
        let mut inner = self.inner.borrow_mut();
        if inner.state == ContextState::Closed {
            return Err(SequenceError::ContextClosed);
        }
        inner.graph.stop_all(now);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.state == ContextState::Closed {
            return Err(SequenceError::ContextClosed);
        }
        inner.graph.clear();
        inner.state = ContextState::Closed;
        Ok(())
    }

    fn active_voices(&self) -> usize {
        self.inner.borrow().graph.voice_count()
    }

    fn advance(&mut self, until: f64) -> Result<()> {
        let (target, block_size) = {
            let inner = self.inner.borrow();
            if inner.state == ContextState::Closed {
                return Ok(());
            }
            let target = (until.max(0.0) * f64::from(inner.graph.sample_rate())).round() as u64;
            (target, inner.block_size)
        };
        loop {
            let rendered = self.inner.borrow().rendered;
            if rendered >= target {
                return Ok(());
            }
            let frames = ((target - rendered) as usize).min(block_size);
            self.render(frames)?;
        }
    }
}

impl fmt::Debug for OfflineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("OfflineContext")
            .field("state", &inner.state)
            .field("rendered", &inner.rendered)
            .field("voices", &inner.graph.voice_count())
            .finish()
    }
}

/// Factory for [`OfflineContext`]s that remembers what it created.
#[derive(Debug, Clone, Default)]
pub struct OfflineFactory {
    gate: Option<GestureGate>,
    created: Rc<RefCell<Vec<OfflineContext>>>,
}

impl OfflineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses to create a context until `gate` has seen a gesture.
    pub fn gated(gate: GestureGate) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Most recently created context, if any.
    pub fn last(&self) -> Option<OfflineContext> {
        self.created.borrow().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.created.borrow().len()
    }
}

impl ContextFactory for OfflineFactory {
    fn create(&self, config: &AudioConfig) -> Result<Box<dyn AudioContext>> {
        if let Some(gate) = &self.gate {
            if !gate.is_open() {
                return Err(SequenceError::AudioUnavailable(
                    "audio output requires a user gesture".into(),
                ));
            }
        }
        let context = OfflineContext::new(config);
        self.created.borrow_mut().push(context.clone());
        Ok(Box::new(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{param::AudioParam, Waveform};

    fn config() -> AudioConfig {
        AudioConfig {
            sample_rate: 1_000,
            block_size: 64,
            ..AudioConfig::default()
        }
    }

    #[test]
    fn advance_renders_up_to_target_time() {
        let mut context = OfflineContext::new(&config());
        context.advance(0.25).unwrap();
        assert_eq!(context.current_time(), 0.25);
        assert_eq!(context.capture().len(), 250);

        context.advance(0.1).unwrap();
        assert_eq!(context.capture().len(), 250);
    }

    #[test]
    fn closed_context_rejects_work() {
        let mut context = OfflineContext::new(&config());
        context.close().unwrap();

        assert!(matches!(context.close(), Err(SequenceError::ContextClosed)));
        let voice = Voice::oscillator("t", Waveform::Sine, AudioParam::new(100.0)).between(0.0, 1.0);
        assert!(matches!(context.schedule(voice), Err(SequenceError::ContextClosed)));
        assert!(context.advance(1.0).is_ok());
    }

    #[test]
    fn gated_factory_waits_for_gesture() {
        let gate = GestureGate::new();
        let factory = OfflineFactory::gated(gate.clone());
        assert!(matches!(
            factory.create(&config()),
            Err(SequenceError::AudioUnavailable(_))
        ));

        gate.record_gesture();
        assert!(factory.create(&config()).is_ok());
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn closures_are_factories() {
        let failing = |_: &AudioConfig| -> Result<Box<dyn AudioContext>> {
            Err(SequenceError::AudioUnavailable("no device".into()))
        };
        assert!(failing.create(&config()).is_err());
    }
}
