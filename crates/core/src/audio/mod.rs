//! Procedural audio: automation, voices, contexts and the engine that owns
//! them for one sequence.

mod context;
#[cfg(feature = "realtime")]
mod device;
mod graph;
mod param;
mod sounds;

use std::{fmt, time::Duration};

pub use context::{
    AudioContext, ContextFactory, ContextState, GestureGate, OfflineContext, OfflineFactory,
};
#[cfg(feature = "realtime")]
pub use device::{DeviceContext, DeviceFactory};
pub use graph::{AudioGraph, Filter, FilterKind, Source, Voice, Waveform};
pub use param::{exp_safe, AudioParam, Automation, MIN_EXP_VALUE};
pub use sounds::Sound;

use crate::AudioConfig;

/// Lifecycle of an [`AudioEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No context yet; one is created on first use.
    Pending,
    Running,
    /// Context creation failed or audio is disabled. Sounds are dropped.
    Silent,
    Disposed,
}

enum Slot {
    Pending,
    Ready(Box<dyn AudioContext>),
    Silent,
    Disposed,
}

/// Owns the audio context of one sequence.
///
/// The context is created lazily through the injected factory; failures are
/// logged and leave the engine silent so visuals carry on. [`dispose`] stops
/// every voice and closes the context exactly once.
///
/// [`dispose`]: AudioEngine::dispose
pub struct AudioEngine {
    config: AudioConfig,
    factory: Option<Box<dyn ContextFactory>>,
    slot: Slot,
    /// Sequence time at which the context clock started.
    origin: Duration,
    elapsed: Duration,
    voices_scheduled: usize,
}

impl AudioEngine {
    pub fn new(config: AudioConfig, factory: impl ContextFactory + 'static) -> Self {
        let slot = if config.enabled {
            Slot::Pending
        } else {
            Slot::Silent
        };
        Self {
            config,
            factory: Some(Box::new(factory)),
            slot,
            origin: Duration::ZERO,
            elapsed: Duration::ZERO,
            voices_scheduled: 0,
        }
    }

    /// An engine that never produces sound.
    pub fn disabled(config: AudioConfig) -> Self {
        Self {
            config,
            factory: None,
            slot: Slot::Silent,
            origin: Duration::ZERO,
            elapsed: Duration::ZERO,
            voices_scheduled: 0,
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        match self.slot {
            Slot::Pending => EngineState::Pending,
            Slot::Ready(_) => EngineState::Running,
            Slot::Silent => EngineState::Silent,
            Slot::Disposed => EngineState::Disposed,
        }
    }

    pub fn voices_scheduled(&self) -> usize {
        self.voices_scheduled
    }

    /// Voices still playing or waiting to play.
    pub fn active_voices(&self) -> usize {
        match &self.slot {
            Slot::Ready(context) => context.active_voices(),
            _ => 0,
        }
    }

    /// Creates the context if it does not exist yet. Returns whether audio
    /// is available afterwards.
    pub fn resume(&mut self) -> bool {
        if matches!(self.slot, Slot::Pending) {
            self.slot = match self.factory.as_ref().map(|f| f.create(&self.config)) {
                Some(Ok(context)) => {
                    self.origin = self.elapsed;
                    tracing::debug!(
                        sample_rate = context.sample_rate(),
                        origin = self.origin.as_secs_f32(),
                        "audio context created"
                    );
                    Slot::Ready(context)
                }
                Some(Err(err)) => {
                    tracing::warn!(%err, "audio unavailable, continuing without sound");
                    Slot::Silent
                }
                None => Slot::Silent,
            };
        }
        matches!(self.slot, Slot::Ready(_))
    }

    /// Informs the engine of the sequence's elapsed time. Offline contexts
    /// render up to it; device contexts keep their own clock.
    pub fn advance(&mut self, elapsed: Duration) {
        self.elapsed = self.elapsed.max(elapsed);
        if let Slot::Ready(context) = &mut self.slot {
            let until = self.elapsed.saturating_sub(self.origin).as_secs_f64();
            if let Err(err) = context.advance(until) {
                tracing::warn!(%err, "audio context failed to advance");
            }
        }
    }

    /// Schedules `sound` relative to the current audio time. Returns the
    /// number of voices scheduled, 0 when silent.
    pub fn play(&mut self, sound: &Sound) -> usize {
        if !self.resume() {
            return 0;
        }
        let Slot::Ready(context) = &mut self.slot else {
            return 0;
        };

        let now = context.current_time();
        let mut scheduled = 0;
        for voice in sound.voices() {
            match context.schedule(voice.shifted(now)) {
                Ok(()) => scheduled += 1,
                Err(err) => {
                    tracing::warn!(%err, sound = sound.name(), "voice dropped");
                    break;
                }
            }
        }
        self.voices_scheduled += scheduled;
        tracing::trace!(sound = sound.name(), voices = scheduled, at = now, "sound scheduled");
        scheduled
    }

    pub fn rising_tone(&mut self, delay: f64, duration: f64, from_hz: f32, to_hz: f32, peak: f32) -> usize {
        self.play(&Sound::RisingTone {
            delay,
            duration,
            from_hz,
            to_hz,
            peak,
            waveform: Waveform::Sawtooth,
        })
    }

    pub fn click(&mut self, delay: f64, peak: f32) -> usize {
        self.play(&Sound::Click {
            delay,
            peak,
            tone_hz: None,
        })
    }

    pub fn noise_sweep(&mut self, delay: f64, duration: f64, from_cutoff: f32, to_cutoff: f32, peak: f32) -> usize {
        self.play(&Sound::NoiseSweep {
            delay,
            duration,
            from_cutoff,
            to_cutoff,
            peak,
            q: 1.0,
        })
    }

    pub fn siren(&mut self, delay: f64, duration: f64, low_hz: f32, high_hz: f32, cycles: u32) -> usize {
        self.play(&Sound::Siren {
            delay,
            duration,
            low_hz,
            high_hz,
            cycles,
            peak: 0.25,
        })
    }

    /// Stops every voice and closes the context. Safe to call repeatedly and
    /// on an engine whose context was already closed elsewhere.
    pub fn dispose(&mut self) {
        match std::mem::replace(&mut self.slot, Slot::Disposed) {
            Slot::Ready(mut context) => {
                if context.state() == ContextState::Closed {
                    tracing::debug!("audio context already closed");
                    return;
                }
                if let Err(err) = context.stop_all() {
                    tracing::debug!(%err, "stopping voices failed");
                }
                match context.close() {
                    Ok(()) => tracing::debug!(voices = self.voices_scheduled, "audio context closed"),
                    Err(err) => tracing::debug!(%err, "closing audio context failed"),
                }
            }
            Slot::Pending | Slot::Silent | Slot::Disposed => {}
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("state", &self.state())
            .field("origin", &self.origin)
            .field("voices_scheduled", &self.voices_scheduled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Result, SequenceError};

    fn config() -> AudioConfig {
        AudioConfig {
            sample_rate: 8_000,
            block_size: 256,
            ..AudioConfig::default()
        }
    }

    #[test]
    fn context_is_created_lazily() {
        let factory = OfflineFactory::new();
        let mut engine = AudioEngine::new(config(), factory.clone());
        assert_eq!(engine.state(), EngineState::Pending);
        assert_eq!(factory.created(), 0);

        assert_eq!(engine.click(0.0, 0.5), 1);
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn creation_failure_leaves_engine_silent() {
        let failing = |_: &AudioConfig| -> Result<Box<dyn AudioContext>> {
            Err(SequenceError::AudioUnavailable("no device".into()))
        };
        let mut engine = AudioEngine::new(config(), failing);

        assert_eq!(engine.rising_tone(0.0, 1.0, 100.0, 400.0, 0.3), 0);
        assert_eq!(engine.state(), EngineState::Silent);
        engine.advance(Duration::from_secs(1));
        engine.dispose();
        assert_eq!(engine.state(), EngineState::Disposed);
    }

    #[test]
    fn gesture_gate_blocks_until_opened() {
        let gate = GestureGate::new();
        let mut engine = AudioEngine::new(config(), OfflineFactory::gated(gate.clone()));
        assert!(!engine.resume());
        assert_eq!(engine.state(), EngineState::Silent);

        // a failed context stays failed for the life of the sequence
        gate.record_gesture();
        assert!(!engine.resume());
    }

    #[test]
    fn disabled_config_never_creates_context() {
        let factory = OfflineFactory::new();
        let mut engine = AudioEngine::new(AudioConfig { enabled: false, ..config() }, factory.clone());
        assert_eq!(engine.click(0.0, 1.0), 0);
        assert_eq!(factory.created(), 0);
    }

    #[test]
    fn dispose_closes_once() {
        let factory = OfflineFactory::new();
        let mut engine = AudioEngine::new(config(), factory.clone());
        engine.siren(0.0, 2.0, 500.0, 900.0, 3);
        assert!(engine.active_voices() > 0);

        engine.dispose();
        engine.dispose();
        let context = factory.last().unwrap();
        assert_eq!(context.state(), ContextState::Closed);
        assert_eq!(context.active_voices(), 0);
    }

    #[test]
    fn dispose_tolerates_externally_closed_context() {
        let factory = OfflineFactory::new();
        let mut engine = AudioEngine::new(config(), factory.clone());
        engine.resume();
        factory.last().unwrap().close().unwrap();

        engine.dispose();
        assert_eq!(engine.state(), EngineState::Disposed);
        assert_eq!(engine.click(0.0, 1.0), 0);
    }

    #[test]
    fn sounds_are_scheduled_on_the_context_clock() {
        let factory = OfflineFactory::new();
        let mut engine = AudioEngine::new(config(), factory.clone());
        engine.resume();
        engine.advance(Duration::from_millis(500));
        engine.click(0.25, 0.5);

        let history = factory.last().unwrap().history();
        assert_eq!(history.len(), 1);
        assert!((history[0].start - 0.75).abs() < 1e-9);
    }

    #[test]
    fn context_origin_follows_lazy_creation() {
        let factory = OfflineFactory::new();
        let mut engine = AudioEngine::new(config(), factory.clone());
        engine.advance(Duration::from_secs(2));
        engine.click(0.0, 0.5);
        engine.advance(Duration::from_millis(2_500));

        let context = factory.last().unwrap();
        assert!((context.current_time() - 0.5).abs() < 1e-3);
        assert_eq!(context.capture().len(), 4_000);
    }
}
