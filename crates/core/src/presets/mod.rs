//! Ready-made sequences assembled from the engine.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    assets::AssetStore,
    audio::{AudioEngine, OfflineFactory, Sound, Voice, Waveform},
    completion::{CompletionReceiver, CompletionSignal},
    driver::{FixedStepFrames, FrameLoop, Sequence},
    host::Viewport,
    mapping::{Channel, IntensityCurve, IntensityMatrix},
    render::{BuildupRenderer, Color, OrbitRenderer, Renderer, VisualFlag},
    scene::SceneDescriptor,
    timeline::{CueContext, CueMark, ManualClock, Timeline},
    view::{Host, MountOptions, SequenceView},
    AppConfig, Result, SequenceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetKind {
    /// Four seconds of rising tension ending in a white flash.
    Buildup,
    /// Glitchy text cutscene that resolves into a gold reveal.
    Cutscene,
    /// Orbiting 3D item viewer with a shockwave and reveal chime.
    RevealViewer,
}

impl PresetKind {
    pub const ALL: [PresetKind; 3] = [Self::Buildup, Self::Cutscene, Self::RevealViewer];

    pub fn name(self) -> &'static str {
        match self {
            Self::Buildup => "buildup",
            Self::Cutscene => "cutscene",
            Self::RevealViewer => "reveal-viewer",
        }
    }

    /// Completion token announced to the host.
    pub fn token(self) -> &'static str {
        match self {
            Self::Buildup => "buildup-complete",
            Self::Cutscene => "cutscene-complete",
            Self::RevealViewer => "reveal-complete",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Buildup => "rising tone, alarm, strobe and a final flash",
            Self::Cutscene => "glitch text over a drone, resolving to a gold reveal",
            Self::RevealViewer => "orbiting 3D relic with shockwave and chime",
        }
    }

    pub fn default_duration(self) -> Duration {
        match self {
            Self::Buildup => Duration::from_secs(4),
            Self::Cutscene => Duration::from_secs(6),
            Self::RevealViewer => Duration::from_secs(8),
        }
    }

    /// Duration after applying the configured override. An override that is
    /// not a usable duration falls back to the preset default.
    pub fn duration(self, config: &AppConfig) -> Duration {
        let Some(seconds) = config.sequence.duration_seconds else {
            return self.default_duration();
        };
        match Duration::try_from_secs_f32(seconds) {
            Ok(duration) if !duration.is_zero() => duration,
            _ => {
                tracing::warn!(preset = self.name(), seconds, "unusable duration, using default");
                self.default_duration()
            }
        }
    }

    /// Assembles the sequence. `audio` is injected so callers choose between
    /// offline and device output.
    pub fn build(
        self,
        config: &AppConfig,
        audio: AudioEngine,
        assets: &AssetStore,
    ) -> Sequence<Box<dyn Renderer>> {
        let total = self.duration(config);
        let (timeline, intensities, renderer) = match self {
            Self::Buildup => (
                buildup_timeline(total),
                IntensityMatrix::buildup(),
                Box::new(BuildupRenderer::new(&config.render, "SIGNAL INCOMING")) as Box<dyn Renderer>,
            ),
            Self::Cutscene => (
                cutscene_timeline(total),
                cutscene_intensities(),
                Box::new(BuildupRenderer::new(&config.render, "ACCESS GRANTED")) as Box<dyn Renderer>,
            ),
            Self::RevealViewer => {
                let mut renderer = OrbitRenderer::new(SceneDescriptor::reveal_viewer(), assets);
                renderer.resize(render_viewport(config));
                (
                    viewer_timeline(total),
                    IntensityMatrix::viewer(),
                    Box::new(renderer) as Box<dyn Renderer>,
                )
            }
        };
        tracing::debug!(
            preset = self.name(),
            total = total.as_secs_f32(),
            cues = timeline.len(),
            "preset built"
        );
        Sequence {
            name: self.name().to_string(),
            token: self.token().to_string(),
            timeline,
            intensities,
            renderer,
            audio,
        }
    }
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PresetKind {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SequenceError::msg(format!("unknown preset `{s}`")))
    }
}

pub fn render_viewport(config: &AppConfig) -> Viewport {
    Viewport::new(config.render.width, config.render.height)
        .with_pixel_ratio(config.render.device_pixel_ratio)
}

fn buildup_timeline(total: Duration) -> Timeline {
    let secs = total.as_secs_f64();
    Timeline::new(total)
        .at(Duration::ZERO, "rise", move |cue: &mut CueContext<'_>| {
            cue.audio.rising_tone(0.0, secs, 90.0, 900.0, 0.22);
            cue.audio.noise_sweep(0.0, secs, 300.0, 9_000.0, 0.12);
        })
        .at_progress(0.5, "start alarm", move |cue: &mut CueContext<'_>| {
            cue.renderer.apply_flag(VisualFlag::Alarm);
            cue.audio.siren(0.0, secs * 0.45, 520.0, 980.0, 4);
        })
        .at_progress(0.8, "begin strobe", move |cue: &mut CueContext<'_>| {
            cue.renderer.apply_flag(VisualFlag::Strobe);
            for i in 0..8 {
                cue.audio.click(f64::from(i) * secs * 0.018, 0.35);
            }
        })
        .at_progress(0.95, "final flash", move |cue: &mut CueContext<'_>| {
            cue.renderer.apply_flag(VisualFlag::Flash {
                color: Color::WHITE,
                seconds: (secs * 0.05) as f32,
            });
            cue.audio.play(&Sound::Impact {
                delay: 0.0,
                from_hz: 140.0,
                to_hz: 38.0,
                decay: 0.9,
                peak: 0.6,
            });
        })
}

fn cutscene_timeline(total: Duration) -> Timeline {
    let secs = total.as_secs_f64();
    Timeline::new(total)
        .at(Duration::ZERO, "drone", move |cue: &mut CueContext<'_>| {
            cue.audio.play(&Sound::Drone {
                delay: 0.0,
                duration: secs,
                hz: 55.0,
                detune_cents: 7.0,
                cutoff: 600.0,
                peak: 0.2,
            });
        })
        .at_progress(0.3, "glitch burst", |cue: &mut CueContext<'_>| {
            cue.renderer.apply_flag(VisualFlag::Shockwave);
            cue.audio.play(&Sound::NoiseSweep {
                delay: 0.0,
                duration: 0.6,
                from_cutoff: 6_000.0,
                to_cutoff: 400.0,
                peak: 0.18,
                q: 2.0,
            });
        })
        .at_progress(0.6, "tension", move |cue: &mut CueContext<'_>| {
            cue.renderer.apply_flag(VisualFlag::Alarm);
            cue.audio.play(&Sound::RisingTone {
                delay: 0.0,
                duration: secs * 0.32,
                from_hz: 110.0,
                to_hz: 660.0,
                peak: 0.18,
                waveform: Waveform::Triangle,
            });
        })
        .at_progress(0.92, "reveal", |cue: &mut CueContext<'_>| {
            cue.renderer.apply_flag(VisualFlag::Calm);
            cue.renderer.apply_flag(VisualFlag::Flash {
                color: Color::GOLD,
                seconds: 0.3,
            });
            cue.audio.play(&Sound::Chime {
                delay: 0.0,
                root_hz: 523.25,
                partials: 4,
                decay: 2.5,
                peak: 0.3,
            });
        })
}

fn cutscene_intensities() -> IntensityMatrix {
    IntensityMatrix::new()
        .with(Channel::Shake, IntensityCurve::Power { exponent: 4.0 }, 0.5)
        .with(Channel::Corruption, IntensityCurve::SmoothStep { from: 0.0, to: 0.9 }, 0.6)
        .with(Channel::SpawnRate, IntensityCurve::Power { exponent: 2.0 }, 0.7)
        .with(Channel::Glow, IntensityCurve::Linear, 1.0)
}

fn viewer_timeline(total: Duration) -> Timeline {
    let secs = total.as_secs_f64();
    Timeline::new(total)
        .at(Duration::ZERO, "bed", move |cue: &mut CueContext<'_>| {
            cue.audio.play(&Sound::Drone {
                delay: 0.0,
                duration: secs,
                hz: 73.4,
                detune_cents: 5.0,
                cutoff: 900.0,
                peak: 0.15,
            });
        })
        .at_progress(0.25, "shockwave", |cue: &mut CueContext<'_>| {
            cue.renderer.apply_flag(VisualFlag::Shockwave);
            cue.audio.play(&Sound::Impact {
                delay: 0.0,
                from_hz: 120.0,
                to_hz: 45.0,
                decay: 0.7,
                peak: 0.45,
            });
        })
        .at_progress(0.5, "swell", move |cue: &mut CueContext<'_>| {
            cue.audio.rising_tone(0.0, secs * 0.35, 146.8, 587.3, 0.16);
        })
        .at_progress(0.85, "reveal", |cue: &mut CueContext<'_>| {
            cue.renderer.apply_flag(VisualFlag::Flash {
                color: Color::GOLD,
                seconds: 0.5,
            });
            cue.audio.play(&Sound::Chime {
                delay: 0.0,
                root_hz: 659.25,
                partials: 5,
                decay: 3.0,
                peak: 0.3,
            });
        })
}

/// Voices a preset schedules, with the cue list that scheduled them.
#[derive(Debug, Clone, Serialize)]
pub struct AudioSchedule {
    pub preset: PresetKind,
    pub duration_seconds: f32,
    pub sample_rate: u32,
    pub cues: Vec<CueMark>,
    pub voices: Vec<Voice>,
}

/// Result of playing a preset headless at the configured frame rate.
#[derive(Debug, Clone)]
pub struct OfflineRun {
    pub preset: PresetKind,
    pub duration: Duration,
    pub frames: u64,
    pub completed: bool,
    /// Tokens the host side acknowledged.
    pub acknowledged: Vec<String>,
    pub cues: Vec<CueMark>,
    pub voices: Vec<Voice>,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSchedule {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl OfflineRun {
    pub fn schedule(&self) -> AudioSchedule {
        AudioSchedule {
            preset: self.preset,
            duration_seconds: self.duration.as_secs_f32(),
            sample_rate: self.sample_rate,
            cues: self.cues.clone(),
            voices: self.voices.clone(),
        }
    }
}

/// Plays `kind` on a manual clock with offline audio and collects what it
/// produced.
pub fn render_offline(
    kind: PresetKind,
    config: &AppConfig,
    assets: &AssetStore,
) -> Result<OfflineRun> {
    config.validate()?;
    let factory = OfflineFactory::new();
    let audio = AudioEngine::new(config.audio.clone(), factory.clone());
    let sequence = kind.build(config, audio, assets);
    let cues = sequence.timeline.marks();
    let duration = sequence.total();

    let host = Host::new();
    let clock = ManualClock::new();
    let (sender, mut receiver) = CompletionReceiver::pair();
    let options = MountOptions {
        skip: false,
        seed: config.sequence.seed,
        viewport: Some(render_viewport(config)),
    };
    let mut view = SequenceView::mount(
        sequence,
        options,
        &host,
        CompletionSignal::channel(kind.token(), sender),
        Box::new(clock.clone()),
    );
    let frames = FixedStepFrames::new(clock, config.sequence.frame_interval());
    let mut frame_loop = FrameLoop::new(frames);
    let summary = view.run(&mut frame_loop);
    view.unmount();

    let context = factory.last();
    let run = OfflineRun {
        preset: kind,
        duration,
        frames: summary.frames,
        completed: summary.completed,
        acknowledged: receiver.poll(),
        cues,
        voices: context.as_ref().map(|c| c.history()).unwrap_or_default(),
        samples: context.as_ref().map(|c| c.capture()).unwrap_or_default(),
        sample_rate: config.audio.sample_rate,
    };
    tracing::debug!(
        preset = kind.name(),
        frames = run.frames,
        voices = run.voices.len(),
        samples = run.samples.len(),
        "offline run finished"
    );
    Ok(run)
}
