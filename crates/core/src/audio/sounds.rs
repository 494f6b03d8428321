//! Intent-level sounds and the voices they expand to.
//!
//! All times in a [`Sound`] are relative to the moment it is played; the
//! engine shifts the voices onto the context clock. Every parameter change is
//! scheduled up front, nothing is updated per frame.

use serde::{Deserialize, Serialize};

use super::{
    graph::{Filter, FilterKind, Voice, Waveform},
    param::{AudioParam, MIN_EXP_VALUE},
};

/// Tail added after a voice's last gain event so the final snap renders.
const RELEASE_TAIL: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sound", rename_all = "snake_case")]
pub enum Sound {
    /// Oscillator whose pitch rises exponentially while it swells.
    RisingTone {
        delay: f64,
        duration: f64,
        from_hz: f32,
        to_hz: f32,
        peak: f32,
        waveform: Waveform,
    },
    /// Short percussive tick.
    Click { delay: f64, peak: f32, tone_hz: Option<f32> },
    /// White noise through a low-pass whose cutoff rises exponentially.
    NoiseSweep {
        delay: f64,
        duration: f64,
        from_cutoff: f32,
        to_cutoff: f32,
        peak: f32,
        q: f32,
    },
    /// Alternating linear pitch sweeps between two frequencies.
    Siren {
        delay: f64,
        duration: f64,
        low_hz: f32,
        high_hz: f32,
        cycles: u32,
        peak: f32,
    },
    /// Low sine drop plus a noise burst, for final hits.
    Impact {
        delay: f64,
        from_hz: f32,
        to_hz: f32,
        decay: f64,
        peak: f32,
    },
    /// Stacked harmonic partials with a long decay, for reveals.
    Chime {
        delay: f64,
        root_hz: f32,
        partials: u32,
        decay: f64,
        peak: f32,
    },
    /// Detuned saw pair through a low-pass, held as a bed.
    Drone {
        delay: f64,
        duration: f64,
        hz: f32,
        detune_cents: f32,
        cutoff: f32,
        peak: f32,
    },
}

impl Sound {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RisingTone { .. } => "rising_tone",
            Self::Click { .. } => "click",
            Self::NoiseSweep { .. } => "noise_sweep",
            Self::Siren { .. } => "siren",
            Self::Impact { .. } => "impact",
            Self::Chime { .. } => "chime",
            Self::Drone { .. } => "drone",
        }
    }

    /// Expands the sound into voices with times relative to "now".
    pub fn voices(&self) -> Vec<Voice> {
        match *self {
            Self::RisingTone {
                delay,
                duration,
                from_hz,
                to_hz,
                peak,
                waveform,
            } => rising_tone(delay, duration, from_hz, to_hz, peak, waveform),
            Self::Click { delay, peak, tone_hz } => click(delay, peak, tone_hz),
            Self::NoiseSweep {
                delay,
                duration,
                from_cutoff,
                to_cutoff,
                peak,
                q,
            } => noise_sweep(delay, duration, from_cutoff, to_cutoff, peak, q),
            Self::Siren {
                delay,
                duration,
                low_hz,
                high_hz,
                cycles,
                peak,
            } => siren(delay, duration, low_hz, high_hz, cycles, peak),
            Self::Impact {
                delay,
                from_hz,
                to_hz,
                decay,
                peak,
            } => impact(delay, from_hz, to_hz, decay, peak),
            Self::Chime {
                delay,
                root_hz,
                partials,
                decay,
                peak,
            } => chime(delay, root_hz, partials, decay, peak),
            Self::Drone {
                delay,
                duration,
                hz,
                detune_cents,
                cutoff,
                peak,
            } => drone(delay, duration, hz, detune_cents, cutoff, peak),
        }
    }
}

fn rising_tone(
    delay: f64,
    duration: f64,
    from_hz: f32,
    to_hz: f32,
    peak: f32,
    waveform: Waveform,
) -> Vec<Voice> {
    let start = delay.max(0.0);
    let duration = duration.max(0.01);
    let end = start + duration;

    let mut frequency = AudioParam::new(from_hz);
    frequency
        .set_value_at_time(from_hz, start)
        .exponential_ramp_to_value_at_time(to_hz, end);

    // swell over most of the duration, then a short fade
    let mut gain = AudioParam::new(0.0);
    gain.set_value_at_time(MIN_EXP_VALUE, start)
        .exponential_ramp_to_value_at_time(peak, start + duration * 0.9)
        .linear_ramp_to_value_at_time(0.0, end);

    vec![Voice::oscillator("rising_tone", waveform, frequency)
        .gain(gain)
        .between(start, end + RELEASE_TAIL)]
}

fn click(delay: f64, peak: f32, tone_hz: Option<f32>) -> Vec<Voice> {
    let start = delay.max(0.0);
    let mut gain = AudioParam::new(0.0);
    gain.envelope(start, 0.001, peak, 0.04);
    let stop = gain.last_event_time().unwrap_or(start) + RELEASE_TAIL;

    let voice = match tone_hz {
        Some(hz) => Voice::oscillator("click", Waveform::Square, AudioParam::new(hz)),
        None => Voice::noise("click").filtered(
            Filter::new(FilterKind::HighPass, AudioParam::new(2_000.0)).with_q(0.9),
        ),
    };
    vec![voice.gain(gain).between(start, stop)]
}

fn noise_sweep(
    delay: f64,
    duration: f64,
    from_cutoff: f32,
    to_cutoff: f32,
    peak: f32,
    q: f32,
) -> Vec<Voice> {
    let start = delay.max(0.0);
    let duration = duration.max(0.01);
    let end = start + duration;

    let mut cutoff = AudioParam::new(from_cutoff);
    cutoff
        .set_value_at_time(from_cutoff, start)
        .exponential_ramp_to_value_at_time(to_cutoff, end);

    let mut gain = AudioParam::new(0.0);
    gain.set_value_at_time(0.0, start)
        .linear_ramp_to_value_at_time(peak, start + duration * 0.8)
        .linear_ramp_to_value_at_time(0.0, end);

    vec![Voice::noise("noise_sweep")
        .filtered(Filter::new(FilterKind::LowPass, cutoff).with_q(q))
        .gain(gain)
        .between(start, end + RELEASE_TAIL)]
}

fn siren(delay: f64, duration: f64, low_hz: f32, high_hz: f32, cycles: u32, peak: f32) -> Vec<Voice> {
    let start = delay.max(0.0);
    let duration = duration.max(0.01);
    let end = start + duration;
    let cycles = cycles.max(1);
    let half = duration / f64::from(cycles * 2);

    let mut frequency = AudioParam::new(low_hz);
    frequency.set_value_at_time(low_hz, start);
    for step in 1..=cycles * 2 {
        let target = if step % 2 == 1 { high_hz } else { low_hz };
        frequency.linear_ramp_to_value_at_time(target, start + half * f64::from(step));
    }

    let mut gain = AudioParam::new(0.0);
    gain.set_value_at_time(0.0, start)
        .linear_ramp_to_value_at_time(peak, start + 0.05)
        .set_value_at_time(peak, end - 0.05)
        .linear_ramp_to_value_at_time(0.0, end);

    vec![Voice::oscillator("siren", Waveform::Sawtooth, frequency)
        .filtered(Filter::new(FilterKind::LowPass, AudioParam::new(high_hz * 3.0)))
        .gain(gain)
        .between(start, end + RELEASE_TAIL)]
}

fn impact(delay: f64, from_hz: f32, to_hz: f32, decay: f64, peak: f32) -> Vec<Voice> {
    let start = delay.max(0.0);
    let decay = decay.max(0.05);

    let mut frequency = AudioParam::new(from_hz);
    frequency
        .set_value_at_time(from_hz, start)
        .exponential_ramp_to_value_at_time(to_hz, start + decay);
    let mut body_gain = AudioParam::new(0.0);
    body_gain.envelope(start, 0.005, peak, decay);
    let body_stop = body_gain.last_event_time().unwrap_or(start) + RELEASE_TAIL;

    let mut burst_gain = AudioParam::new(0.0);
    burst_gain.envelope(start, 0.002, peak * 0.6, decay * 0.3);
    let burst_stop = burst_gain.last_event_time().unwrap_or(start) + RELEASE_TAIL;
    let mut burst_cutoff = AudioParam::new(8_000.0);
    burst_cutoff
        .set_value_at_time(8_000.0, start)
        .exponential_ramp_to_value_at_time(300.0, start + decay * 0.3);

    vec![
        Voice::oscillator("impact_body", Waveform::Sine, frequency)
            .gain(body_gain)
            .between(start, body_stop),
        Voice::noise("impact_burst")
            .filtered(Filter::new(FilterKind::LowPass, burst_cutoff))
            .gain(burst_gain)
            .between(start, burst_stop),
    ]
}

fn chime(delay: f64, root_hz: f32, partials: u32, decay: f64, peak: f32) -> Vec<Voice> {
    let start = delay.max(0.0);
    let partials = partials.max(1);
    (1..=partials)
        .map(|n| {
            let n_f = n as f32;
            let mut gain = AudioParam::new(0.0);
            // upper partials are quieter and die sooner
            gain.envelope(start, 0.004, peak / n_f, decay / f64::from(n).sqrt());
            let stop = gain.last_event_time().unwrap_or(start) + RELEASE_TAIL;
            Voice::oscillator(format!("chime_{n}"), Waveform::Sine, AudioParam::new(root_hz * n_f))
                .gain(gain)
                .between(start, stop)
        })
        .collect()
}

fn drone(delay: f64, duration: f64, hz: f32, detune_cents: f32, cutoff: f32, peak: f32) -> Vec<Voice> {
    let start = delay.max(0.0);
    let duration = duration.max(0.1);
    let end = start + duration;
    let ratio = (detune_cents / 1_200.0).exp2();

    [("drone_low", hz / ratio), ("drone_high", hz * ratio)]
        .into_iter()
        .map(|(label, freq)| {
            let mut gain = AudioParam::new(0.0);
            gain.set_value_at_time(0.0, start)
                .linear_ramp_to_value_at_time(peak * 0.5, start + duration * 0.2)
                .set_value_at_time(peak * 0.5, end - duration * 0.1)
                .linear_ramp_to_value_at_time(0.0, end);
            Voice::oscillator(label, Waveform::Sawtooth, AudioParam::new(freq))
                .filtered(Filter::new(FilterKind::LowPass, AudioParam::new(cutoff)))
                .gain(gain)
                .between(start, end + RELEASE_TAIL)
        })
        .collect()
}
