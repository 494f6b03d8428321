//! Voices and the sample renderer that plays them.
//!
//! A voice is a fixed chain: source (oscillator or noise) → optional filter →
//! gain. Voices carry absolute start/stop times on the audio clock and are
//! dropped from the graph once the clock passes their stop time.

use std::f32::consts::{PI, TAU};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::param::AudioParam;

/// Oscillator waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    fn sample(self, phase01: f32) -> f32 {
        match self {
            Self::Sine => (TAU * phase01).sin(),
            Self::Square => {
                if phase01 < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Sawtooth => 2.0 * phase01 - 1.0,
            Self::Triangle => 4.0 * (phase01 - 0.5).abs() - 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    Oscillator {
        waveform: Waveform,
        frequency: AudioParam,
    },
    /// White noise read from the graph's shared noise buffer.
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub kind: FilterKind,
    pub cutoff: AudioParam,
    pub q: f32,
}

impl Filter {
    pub fn new(kind: FilterKind, cutoff: AudioParam) -> Self {
        Self {
            kind,
            cutoff,
            q: std::f32::consts::FRAC_1_SQRT_2,
        }
    }

    pub fn with_q(mut self, q: f32) -> Self {
        self.q = q.max(1e-4);
        self
    }
}

/// A scheduled source → filter → gain chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub label: String,
    pub source: Source,
    pub filter: Option<Filter>,
    pub gain: AudioParam,
    pub start: f64,
    pub stop: f64,
}

impl Voice {
    pub fn oscillator(label: impl Into<String>, waveform: Waveform, frequency: AudioParam) -> Self {
        Self::with_source(label, Source::Oscillator { waveform, frequency })
    }

    pub fn noise(label: impl Into<String>) -> Self {
        Self::with_source(label, Source::Noise)
    }

    fn with_source(label: impl Into<String>, source: Source) -> Self {
        Self {
            label: label.into(),
            source,
            filter: None,
            gain: AudioParam::new(1.0),
            start: 0.0,
            stop: 0.0,
        }
    }

    pub fn filtered(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn gain(mut self, gain: AudioParam) -> Self {
        self.gain = gain;
        self
    }

    pub fn between(mut self, start: f64, stop: f64) -> Self {
        self.start = start.max(0.0);
        self.stop = stop.max(self.start);
        self
    }

    /// Moves the voice and all of its automation by `offset` seconds.
    pub fn shifted(mut self, offset: f64) -> Self {
        self.start += offset;
        self.stop += offset;
        self.gain.shift(offset);
        if let Source::Oscillator { frequency, .. } = &mut self.source {
            frequency.shift(offset);
        }
        if let Some(filter) = &mut self.filter {
            filter.cutoff.shift(offset);
        }
        self
    }

    pub fn is_audible_at(&self, t: f64) -> bool {
        t >= self.start && t < self.stop
    }
}

/// State-variable filter, topology-preserving transform form.
#[derive(Debug, Clone, Copy, Default)]
struct Svf {
    ic1eq: f32,
    ic2eq: f32,
}

impl Svf {
    fn process(&mut self, kind: FilterKind, x: f32, cutoff: f32, q: f32, sample_rate: f32) -> f32 {
        let nyquist_guard = sample_rate * 0.49;
        let g = (PI * cutoff.clamp(10.0, nyquist_guard) / sample_rate).tan();
        let r = 1.0 / (2.0 * q);
        let h = 1.0 / (1.0 + 2.0 * r * g + g * g);

        let hp = (x - (2.0 * r + g) * self.ic1eq - self.ic2eq) * h;
        let bp = g * hp + self.ic1eq;
        let lp = g * bp + self.ic2eq;
        self.ic1eq = kill_denormals(g * hp + bp);
        self.ic2eq = kill_denormals(g * bp + lp);

        match kind {
            FilterKind::LowPass => lp,
            FilterKind::HighPass => hp,
            FilterKind::BandPass => bp,
        }
    }
}

fn kill_denormals(x: f32) -> f32 {
    if x.abs() < 1e-20 {
        0.0
    } else {
        x
    }
}

#[derive(Debug, Clone)]
struct ActiveVoice {
    voice: Voice,
    phase: f32,
    noise_cursor: usize,
    svf: Svf,
}

/// Renders scheduled voices into mono sample blocks.
#[derive(Debug, Clone)]
pub struct AudioGraph {
    sample_rate: u32,
    master_gain: f32,
    noise: Vec<f32>,
    voices: Vec<ActiveVoice>,
    scheduled: usize,
}

impl AudioGraph {
    /// Creates a graph with a one-second white-noise buffer generated from
    /// `noise_seed`.
    pub fn new(sample_rate: u32, master_gain: f32, noise_seed: u64) -> Self {
        let sample_rate = sample_rate.max(1);
        let mut rng = SmallRng::seed_from_u64(noise_seed);
        let noise = (0..sample_rate as usize)
            .map(|_| rng.gen_range(-1.0_f32..=1.0))
            .collect();
        Self {
            sample_rate,
            master_gain,
            noise,
            voices: Vec::new(),
            scheduled: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn add(&mut self, voice: Voice) {
        // spread noise voices across the buffer so stacked bursts decorrelate
        let noise_cursor = (self.scheduled * 7_919) % self.noise.len();
        self.scheduled += 1;
        self.voices.push(ActiveVoice {
            voice,
            phase: 0.0,
            noise_cursor,
            svf: Svf::default(),
        });
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Cuts every voice off at `at`.
    pub fn stop_all(&mut self, at: f64) {
        self.voices.retain(|active| active.voice.start < at);
        for active in &mut self.voices {
            active.voice.stop = active.voice.stop.min(at);
        }
        self.prune(at);
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Drops voices whose stop time is at or before `now`.
    pub fn prune(&mut self, now: f64) {
        self.voices.retain(|active| active.voice.stop > now);
    }

    /// Mixes all voices into `out`, whose first sample sits at `start_time`.
    pub fn render(&mut self, start_time: f64, out: &mut [f32]) {
        let sr = self.sample_rate as f32;
        let dt = 1.0 / f64::from(self.sample_rate);
        out.iter_mut().for_each(|sample| *sample = 0.0);

        for active in &mut self.voices {
            let voice = &active.voice;
            for (index, sample) in out.iter_mut().enumerate() {
                let t = start_time + index as f64 * dt;
                if !voice.is_audible_at(t) {
                    continue;
                }

                let raw = match &voice.source {
                    Source::Oscillator { waveform, frequency } => {
                        let hz = frequency.value_at(t).max(0.0);
                        let value = waveform.sample(active.phase);
                        active.phase = (active.phase + hz / sr).fract();
                        value
                    }
                    Source::Noise => {
                        let value = self.noise[active.noise_cursor];
                        active.noise_cursor = (active.noise_cursor + 1) % self.noise.len();
                        value
                    }
                };

                let shaped = match &voice.filter {
                    Some(filter) => active.svf.process(
                        filter.kind,
                        raw,
                        filter.cutoff.value_at(t),
                        filter.q,
                        sr,
                    ),
                    None => raw,
                };

                *sample += shaped * voice.gain.value_at(t);
            }
        }

        for sample in out.iter_mut() {
            *sample = (*sample * self.master_gain).clamp(-1.0, 1.0);
        }

        let end_time = start_time + out.len() as f64 * dt;
        self.prune(end_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(start: f64, stop: f64) -> Voice {
        Voice::oscillator("tone", Waveform::Sine, AudioParam::new(440.0)).between(start, stop)
    }

    #[test]
    fn renders_silence_outside_voice_window() {
        let mut graph = AudioGraph::new(1_000, 1.0, 1);
        graph.add(tone(0.5, 1.0));

        let mut block = vec![0.0; 500];
        graph.render(0.0, &mut block);
        assert!(block.iter().all(|s| *s == 0.0));

        graph.render(0.5, &mut block);
        assert!(block.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn voices_are_pruned_after_stop() {
        let mut graph = AudioGraph::new(1_000, 1.0, 1);
        graph.add(tone(0.0, 0.1));
        graph.add(tone(0.0, 2.0));

        let mut block = vec![0.0; 200];
        graph.render(0.0, &mut block);
        assert_eq!(graph.voice_count(), 1);
    }

    #[test]
    fn stop_all_cuts_everything() {
        let mut graph = AudioGraph::new(1_000, 1.0, 1);
        graph.add(tone(0.0, 5.0));
        graph.add(Voice::noise("hiss").between(1.0, 3.0));
        graph.stop_all(0.5);
        graph.stop_all(0.5);
        assert_eq!(graph.voice_count(), 0);

        let mut block = vec![0.0; 100];
        graph.render(0.5, &mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn output_is_clamped() {
        let mut graph = AudioGraph::new(1_000, 4.0, 1);
        for _ in 0..8 {
            graph.add(tone(0.0, 1.0));
        }
        let mut block = vec![0.0; 1_000];
        graph.render(0.0, &mut block);
        assert!(block.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn shifted_voice_moves_automation() {
        let mut gain = AudioParam::new(0.0);
        gain.set_value_at_time(1.0, 0.2);
        let voice = Voice::noise("burst").gain(gain).between(0.1, 0.5).shifted(1.0);

        assert_eq!(voice.start, 1.1);
        assert_eq!(voice.stop, 1.5);
        assert_eq!(voice.gain.value_at(1.1), 0.0);
        assert_eq!(voice.gain.value_at(1.3), 1.0);
    }

    #[test]
    fn noise_buffer_is_seeded() {
        let mut a = AudioGraph::new(1_000, 1.0, 42);
        let mut b = AudioGraph::new(1_000, 1.0, 42);
        a.add(Voice::noise("n").between(0.0, 1.0));
        b.add(Voice::noise("n").between(0.0, 1.0));

        let mut block_a = vec![0.0; 64];
        let mut block_b = vec![0.0; 64];
        a.render(0.0, &mut block_a);
        b.render(0.0, &mut block_b);
        assert_eq!(block_a, block_b);
    }
}
